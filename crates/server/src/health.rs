use axum::Json;
use serde::Serialize;

/// Liveness report, serialized as `{"status":"healthy"}`.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub(crate) enum Liveness {
    Healthy,
}

/// Liveness probe. Mounted outside the admission layer.
pub(crate) async fn health() -> Json<Liveness> {
    Json(Liveness::Healthy)
}
