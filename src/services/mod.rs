/// Account management and session issuance.
pub mod auth_service;
/// Question answering pipeline.
pub mod chat_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Conversation export rendering.
pub mod export_service;
/// Health check service.
pub mod health_service;
/// Conversation browsing and deletion.
pub mod history_service;
/// Storage reconnection coordinator.
pub mod storage_supervisor;
