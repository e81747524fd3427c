use tracing::warn;

use crate::{
    dto::health::{ComponentHealth, HealthResponse},
    state::SharedState,
};

/// Probe every dependency and build the combined health report.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let storage = match state.history_store().await {
        Some(store) => match store.health_check().await {
            Ok(()) => ComponentHealth::ok(),
            Err(err) => {
                warn!(error = %err, "storage health check failed");
                ComponentHealth::degraded(err.to_string())
            }
        },
        None => {
            warn!("storage unavailable (degraded mode)");
            ComponentHealth::degraded("storage unavailable (degraded mode)".into())
        }
    };

    let retrieval = match state.query_engine() {
        Some(engine) => match engine.heartbeat().await {
            Ok(()) => ComponentHealth::ok(),
            Err(err) => {
                warn!(error = %err, "vector store heartbeat failed");
                ComponentHealth::degraded(err.to_string())
            }
        },
        None => ComponentHealth::unconfigured("retrieval secrets missing"),
    };

    HealthResponse::from_components(storage, retrieval)
}
