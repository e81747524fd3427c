//! DTOs for the conversation export endpoint.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::dto::history::HistoryMessage;

/// Rendering formats the export endpoint can produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Structured document with timestamps and sources.
    #[default]
    Json,
    /// Human readable transcript with headings.
    Markdown,
    /// Plain transcript, one block per message.
    Text,
}

impl ExportFormat {
    /// Extension used in the download filename.
    pub fn file_extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Markdown => "md",
            ExportFormat::Text => "txt",
        }
    }

    /// Value of the `Content-Type` header for the download.
    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Markdown => "text/markdown; charset=utf-8",
            ExportFormat::Text => "text/plain; charset=utf-8",
        }
    }
}

/// Query parameters for the export endpoint.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ExportQuery {
    /// Output format, `json` when omitted.
    #[serde(default)]
    pub format: ExportFormat,
}

/// Top-level structure of a JSON export.
#[derive(Debug, Serialize, ToSchema)]
pub struct ExportDocument {
    pub session_id: String,
    /// RFC 3339 timestamp of when the export was produced.
    pub exported_at: String,
    pub messages: Vec<HistoryMessage>,
}
