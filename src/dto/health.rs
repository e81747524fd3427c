use serde::Serialize;
use utoipa::ToSchema;

/// State of one dependency in the health report.
#[derive(Debug, Serialize, ToSchema)]
pub struct ComponentHealth {
    /// "ok", "degraded", or "unconfigured".
    pub status: String,
    /// Failure detail when the component is not ok.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ComponentHealth {
    /// The component answered its probe.
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            detail: None,
        }
    }

    /// The component is configured but currently failing.
    pub fn degraded(detail: String) -> Self {
        Self {
            status: "degraded".to_string(),
            detail: Some(detail),
        }
    }

    /// The component was never configured.
    pub fn unconfigured(detail: &str) -> Self {
        Self {
            status: "unconfigured".to_string(),
            detail: Some(detail.to_string()),
        }
    }

    /// Whether this component counts as healthy overall.
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Health report returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Overall status ("ok" or "degraded").
    pub status: String,
    /// Chat history storage backend.
    pub storage: ComponentHealth,
    /// Vector store and language model pipeline.
    pub retrieval: ComponentHealth,
}

impl HealthResponse {
    /// Combine per-component probes into the overall report.
    pub fn from_components(storage: ComponentHealth, retrieval: ComponentHealth) -> Self {
        let status = if storage.is_ok() && retrieval.is_ok() {
            "ok"
        } else {
            "degraded"
        };
        Self {
            status: status.to_string(),
            storage,
            retrieval,
        }
    }
}
