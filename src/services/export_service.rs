use time::{OffsetDateTime, macros::format_description};

use crate::{
    auth::SessionUser,
    dto::{
        export::{ExportDocument, ExportFormat},
        format_timestamp,
        history::HistoryMessage,
    },
    error::ServiceError,
    services::history_service::require_account,
    state::SharedState,
};

/// A rendered transcript ready to be served as a download.
#[derive(Debug)]
pub struct ExportFile {
    /// Suggested filename for the `Content-Disposition` header.
    pub filename: String,
    /// MIME type matching the rendered format.
    pub content_type: &'static str,
    pub body: String,
}

/// Render one conversation of the calling account in the requested format.
///
/// Conversations without stored messages cannot be exported; that also
/// covers conversations owned by someone else.
pub async fn export_session(
    state: &SharedState,
    user: &SessionUser,
    session_id: String,
    format: ExportFormat,
) -> Result<ExportFile, ServiceError> {
    let user_id = require_account(user)?;
    let store = state.require_history_store().await?;

    let messages = store.session_history(user_id, session_id.clone()).await?;
    if messages.is_empty() {
        return Err(ServiceError::NotFound(format!(
            "session `{session_id}` has no stored messages"
        )));
    }

    let exported_at = OffsetDateTime::now_utc();
    let messages: Vec<HistoryMessage> = messages.into_iter().map(HistoryMessage::from).collect();

    let body = match format {
        ExportFormat::Json => render_json(&session_id, exported_at, messages)?,
        ExportFormat::Markdown => render_markdown(&session_id, exported_at, &messages),
        ExportFormat::Text => render_text(&messages),
    };

    Ok(ExportFile {
        filename: export_filename(exported_at, format),
        content_type: format.content_type(),
        body,
    })
}

/// Download filename carrying the export moment, second precision.
fn export_filename(exported_at: OffsetDateTime, format: ExportFormat) -> String {
    let stamp = format_description!("[year][month][day]_[hour][minute][second]");
    let stamp = exported_at
        .format(&stamp)
        .unwrap_or_else(|_| "00000000_000000".into());
    format!("chat_export_{stamp}.{}", format.file_extension())
}

fn render_json(
    session_id: &str,
    exported_at: OffsetDateTime,
    messages: Vec<HistoryMessage>,
) -> Result<String, ServiceError> {
    let document = ExportDocument {
        session_id: session_id.to_owned(),
        exported_at: format_timestamp(exported_at),
        messages,
    };
    serde_json::to_string_pretty(&document).map_err(ServiceError::ExportRender)
}

fn render_markdown(
    session_id: &str,
    exported_at: OffsetDateTime,
    messages: &[HistoryMessage],
) -> String {
    let mut out = String::new();
    out.push_str("# Space Mission Design Assistant transcript\n\n");
    out.push_str(&format!("- Session: `{session_id}`\n"));
    out.push_str(&format!(
        "- Exported: {}\n\n",
        format_timestamp(exported_at)
    ));

    for message in messages {
        let heading = if message.role == "user" {
            "## You"
        } else {
            "## Assistant"
        };
        out.push_str(&format!("{heading} ({})\n\n", message.created_at));
        out.push_str(&message.content);
        out.push_str("\n\n");
        if let Some(titles) = source_titles(message) {
            out.push_str(&format!("*Sources: {titles}*\n\n"));
        }
    }

    out
}

fn render_text(messages: &[HistoryMessage]) -> String {
    let mut out = String::new();
    for message in messages {
        let speaker = if message.role == "user" {
            "You"
        } else {
            "Assistant"
        };
        out.push_str(&format!("[{}] {speaker}:\n", message.created_at));
        out.push_str(&message.content);
        out.push_str("\n\n");
    }
    out
}

/// Comma-separated source titles with their scores, if the message has any.
fn source_titles(message: &HistoryMessage) -> Option<String> {
    let sources = message.sources.as_ref()?.as_array()?;
    let rendered: Vec<String> = sources
        .iter()
        .filter_map(|source| {
            let title = source.get("title")?.as_str()?;
            let score = source.get("score").and_then(|s| s.as_f64());
            Some(match score {
                Some(score) => format!("{title} ({score:.2})"),
                None => title.to_owned(),
            })
        })
        .collect();
    if rendered.is_empty() {
        None
    } else {
        Some(rendered.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn fixture_messages() -> Vec<HistoryMessage> {
        vec![
            HistoryMessage {
                role: "user".into(),
                content: "What launch vehicle carried Cassini?".into(),
                sources: None,
                created_at: "2024-03-01T12:29:58Z".into(),
                session_id: "mission-a".into(),
            },
            HistoryMessage {
                role: "assistant".into(),
                content: "Cassini launched on a Titan IVB/Centaur.".into(),
                sources: Some(serde_json::json!([
                    { "title": "Cassini", "text": "Titan IVB/Centaur.", "score": 0.91 }
                ])),
                created_at: "2024-03-01T12:30:02Z".into(),
                session_id: "mission-a".into(),
            },
        ]
    }

    #[test]
    fn filename_carries_timestamp_and_extension() {
        let name = export_filename(datetime!(2024-03-01 12:30:00 UTC), ExportFormat::Json);
        assert_eq!(name, "chat_export_20240301_123000.json");
        let name = export_filename(datetime!(2024-03-01 12:30:00 UTC), ExportFormat::Markdown);
        assert_eq!(name, "chat_export_20240301_123000.md");
    }

    #[test]
    fn json_export_has_the_documented_shape() {
        let body = render_json(
            "mission-a",
            datetime!(2024-03-01 12:31:00 UTC),
            fixture_messages(),
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["session_id"], "mission-a");
        assert_eq!(value["exported_at"], "2024-03-01T12:31:00Z");
        assert_eq!(value["messages"].as_array().unwrap().len(), 2);
        assert_eq!(value["messages"][0]["role"], "user");
    }

    #[test]
    fn markdown_export_includes_speakers_and_sources() {
        let body = render_markdown(
            "mission-a",
            datetime!(2024-03-01 12:31:00 UTC),
            &fixture_messages(),
        );
        assert!(body.contains("## You"));
        assert!(body.contains("## Assistant"));
        assert!(body.contains("*Sources: Cassini (0.91)*"));
    }

    #[test]
    fn text_export_is_plain_blocks() {
        let body = render_text(&fixture_messages());
        assert!(body.starts_with("[2024-03-01T12:29:58Z] You:\n"));
        assert!(body.contains("Assistant:\nCassini launched"));
        assert!(!body.contains('#'));
    }
}
