use serde::Serialize;
use utoipa::ToSchema;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Store backend in use ("redis" or "memory").
    pub backend: String,
}

impl HealthResponse {
    /// The store answered its ping.
    pub fn ok(backend: &str) -> Self {
        Self {
            status: "ok".to_string(),
            backend: backend.to_string(),
        }
    }

    /// The store is unreachable; live games cannot progress.
    pub fn degraded(backend: &str) -> Self {
        Self {
            status: "degraded".to_string(),
            backend: backend.to_string(),
        }
    }
}
