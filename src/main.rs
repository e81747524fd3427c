//! Mission chat backend entrypoint wiring REST, storage, and retrieval layers.

use std::{env, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mission_chat_back::{
    auth::SessionKeys,
    config::{AppSettings, Secrets},
    dao::history_store,
    rag::{ChromaClient, OpenAiClient, QueryEngine},
    routes,
    services::storage_supervisor,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = AppSettings::load();
    init_tracing(&settings);

    let secrets = Secrets::load();

    info!(
        llm_model = %settings.retrieval.llm_model,
        collection = %settings.retrieval.collection,
        "starting mission chat backend"
    );

    let session_keys = SessionKeys::from_configured(secrets.auth_secret_key.as_deref());
    let query_engine = build_query_engine(&secrets, &settings)?;

    let app_state = AppState::new(settings, session_keys, query_engine);

    let database_url = secrets.database_url();
    let max_connections = app_state.settings().database.max_connections;
    tokio::spawn(storage_supervisor::run(app_state.clone(), move || {
        let url = database_url.clone();
        async move { history_store::connect(&url, max_connections).await }
    }));
    tokio::spawn(prune_rate_limiter(app_state.clone()));

    let app = build_router(app_state.clone());

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(app_state.settings().server.port);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Build the retrieval pipeline, or skip it when its secrets are missing.
///
/// A missing secret only disables chat answers; the server still
/// serves auth, history, and health so the gap is visible instead of
/// fatal.
fn build_query_engine(
    secrets: &Secrets,
    settings: &AppSettings,
) -> anyhow::Result<Option<Arc<QueryEngine>>> {
    let missing = secrets.missing_retrieval_keys();
    if !missing.is_empty() {
        warn!(
            missing = %missing.join(", "),
            "retrieval secrets missing; chat will answer 503 until they are configured"
        );
        return Ok(None);
    }

    // The check above guarantees every key is present.
    let openai_key = secrets.openai_api_key.as_deref().unwrap_or_default();
    let chroma_key = secrets.chromadb_api_key.as_deref().unwrap_or_default();
    let tenant = secrets.chromadb_tenant.as_deref().unwrap_or_default();
    let database = secrets.chromadb_database.as_deref().unwrap_or_default();

    let retrieval = settings.retrieval.clone();
    let chroma = ChromaClient::new(&retrieval.chroma_base_url, chroma_key, tenant, database)
        .context("building ChromaDB client")?;
    let openai = OpenAiClient::new(&retrieval.openai_base_url, openai_key)
        .context("building OpenAI client")?;

    Ok(Some(Arc::new(QueryEngine::new(chroma, openai, retrieval))))
}

/// Drop lapsed rate windows so idle sessions do not accumulate forever.
async fn prune_rate_limiter(state: SharedState) {
    let mut interval = tokio::time::interval(Duration::from_secs(300));
    loop {
        interval.tick().await;
        state.rate_limiter().prune();
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing(settings: &AppSettings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(settings.default_log_filter()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
