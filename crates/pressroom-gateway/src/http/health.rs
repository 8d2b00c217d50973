use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health: liveness check with job and observer counts.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": pressroom_protocol::PROTOCOL_VERSION,
        "observers": state.broadcast.len(),
        "jobs": state.scheduler.list().len(),
    }))
}
