use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the mission chat backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::auth::signup,
        crate::routes::auth::login,
        crate::routes::auth::guest,
        crate::routes::auth::me,
        crate::routes::chat::create_session,
        crate::routes::chat::ask,
        crate::routes::history::list_messages,
        crate::routes::history::list_sessions,
        crate::routes::history::session_messages,
        crate::routes::history::delete_session,
        crate::routes::history::user_stats,
        crate::routes::export::export_session,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::ComponentHealth,
            crate::dto::auth::SignupRequest,
            crate::dto::auth::LoginRequest,
            crate::dto::auth::SessionResponse,
            crate::dto::auth::UserProfile,
            crate::dto::auth::MeResponse,
            crate::dto::chat::AskRequest,
            crate::dto::chat::AskResponse,
            crate::dto::chat::SourceDto,
            crate::dto::chat::NewSessionResponse,
            crate::dto::history::HistoryMessage,
            crate::dto::history::SessionSummary,
            crate::dto::history::UserStats,
            crate::dto::export::ExportFormat,
            crate::dto::export::ExportDocument,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Account management and session tokens"),
        (name = "chat", description = "Question answering against the mission knowledge base"),
        (name = "history", description = "Stored conversations of registered users"),
        (name = "export", description = "Conversation downloads"),
    )
)]
pub struct ApiDoc;
