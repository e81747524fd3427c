//! Validation helpers for DTOs.

use validator::ValidationError;

/// Validates that a password is strong enough to be stored.
///
/// The rules match what the signup form advertises: at least 8
/// characters with an uppercase letter, a lowercase letter, and a
/// digit.
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    if password.len() < 8 {
        let mut err = ValidationError::new("password_length");
        err.message = Some("Password must be at least 8 characters long".into());
        return Err(err);
    }

    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        let mut err = ValidationError::new("password_uppercase");
        err.message = Some("Password must contain at least one uppercase letter".into());
        return Err(err);
    }

    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        let mut err = ValidationError::new("password_lowercase");
        err.message = Some("Password must contain at least one lowercase letter".into());
        return Err(err);
    }

    if !password.chars().any(|c| c.is_ascii_digit()) {
        let mut err = ValidationError::new("password_digit");
        err.message = Some("Password must contain at least one digit".into());
        return Err(err);
    }

    Ok(())
}

/// Validates a chat question: not blank, bounded length.
pub fn validate_question(question: &str) -> Result<(), ValidationError> {
    if question.trim().is_empty() {
        let mut err = ValidationError::new("question_empty");
        err.message = Some("Question must not be empty".into());
        return Err(err);
    }

    if question.chars().count() > 4000 {
        let mut err = ValidationError::new("question_length");
        err.message = Some("Question must be at most 4000 characters".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that a session identifier looks like something we issued.
///
/// Session ids are opaque to the server but they end up in SQL
/// queries and export filenames, so an upper bound and a sane
/// character set keep them boring.
pub fn validate_session_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() || id.len() > 64 {
        let mut err = ValidationError::new("session_id_length");
        err.message = Some("Session id must be between 1 and 64 characters".into());
        return Err(err);
    }

    if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        let mut err = ValidationError::new("session_id_format");
        err.message =
            Some("Session id must contain only letters, digits, and dashes".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_password_strength_valid() {
        assert!(validate_password_strength("Orbit4Mars").is_ok());
        assert!(validate_password_strength("aB3aB3aB").is_ok());
    }

    #[test]
    fn test_validate_password_strength_too_short() {
        let err = validate_password_strength("Ab1").unwrap_err();
        assert_eq!(err.code, "password_length");
    }

    #[test]
    fn test_validate_password_strength_missing_classes() {
        assert_eq!(
            validate_password_strength("lowercase1only").unwrap_err().code,
            "password_uppercase"
        );
        assert_eq!(
            validate_password_strength("UPPERCASE1ONLY").unwrap_err().code,
            "password_lowercase"
        );
        assert_eq!(
            validate_password_strength("NoDigitsHere").unwrap_err().code,
            "password_digit"
        );
    }

    #[test]
    fn test_validate_question_rejects_blank_and_oversized() {
        assert!(validate_question("How did Cassini reach Saturn?").is_ok());
        assert_eq!(validate_question("").unwrap_err().code, "question_empty");
        assert_eq!(validate_question("   ").unwrap_err().code, "question_empty");
        assert_eq!(
            validate_question(&"q".repeat(4001)).unwrap_err().code,
            "question_length"
        );
        assert!(validate_question(&"q".repeat(4000)).is_ok());
    }

    #[test]
    fn test_validate_session_id_valid() {
        assert!(validate_session_id("0af3b2d41c9e4f7a8b6c5d4e3f2a1b0c").is_ok());
        assert!(validate_session_id("session-1").is_ok());
    }

    #[test]
    fn test_validate_session_id_invalid() {
        assert!(validate_session_id("").is_err());
        assert!(validate_session_id(&"a".repeat(65)).is_err());
        assert!(validate_session_id("../etc/passwd").is_err());
        assert!(validate_session_id("has space").is_err());
    }
}
