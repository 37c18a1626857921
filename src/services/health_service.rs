use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Ping the store and report degraded mode when it does not answer.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let backend = state.backend().as_str();
    match state.store().health_check().await {
        Ok(()) => HealthResponse::ok(backend),
        Err(err) => {
            warn!(error = %err, "storage health check failed");
            HealthResponse::degraded(backend)
        }
    }
}
