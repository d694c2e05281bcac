//! Transport handlers.

pub mod messages;
pub mod socket;
pub mod stream;

use axum::Json;
use axum::response::IntoResponse;
use serde_json::json;

/// Health probe for `GET /`.
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
