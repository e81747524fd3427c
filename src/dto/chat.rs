//! DTOs for the question answering endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::dto::validation::{validate_question, validate_session_id};
use crate::rag::SourceDocument;

/// Payload for asking the assistant a question.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct AskRequest {
    /// Conversation the question belongs to.
    #[validate(custom(function = validate_session_id))]
    pub session_id: String,
    /// Question text; must not be blank and is capped at 4000 characters.
    #[validate(custom(function = validate_question))]
    pub question: String,
}

/// One retrieved document chunk cited by an answer.
#[derive(Debug, Serialize, ToSchema)]
pub struct SourceDto {
    /// Mission document title.
    pub title: String,
    /// Chunk text that was put in front of the model.
    pub text: String,
    /// Similarity score in `[0, 1]`, higher is closer.
    pub score: f32,
}

impl From<SourceDocument> for SourceDto {
    fn from(source: SourceDocument) -> Self {
        Self {
            title: source.title,
            text: source.text,
            score: source.score,
        }
    }
}

/// Answer produced for one question.
#[derive(Debug, Serialize, ToSchema)]
pub struct AskResponse {
    /// Conversation the exchange was stored under, echoed from the request.
    pub session_id: String,
    pub answer: String,
    /// Chunks the answer was grounded on, best match first.
    pub sources: Vec<SourceDto>,
    /// Time spent answering, in milliseconds.
    pub response_time_ms: u64,
    /// Questions left in the caller's current rate window.
    pub remaining_requests: u32,
}

/// Fresh conversation identifier.
#[derive(Debug, Serialize, ToSchema)]
pub struct NewSessionResponse {
    pub session_id: String,
}
