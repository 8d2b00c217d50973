use axum::{routing::get, Router};
use pressroom_core::config::PressroomConfig;
use pressroom_scheduler::Scheduler;
use std::sync::Arc;

use crate::ws::broadcast::BroadcastManager;

/// Central shared state, passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: PressroomConfig,
    pub broadcast: BroadcastManager,
    pub scheduler: Arc<Scheduler>,
}

impl AppState {
    pub fn new(config: PressroomConfig, scheduler: Arc<Scheduler>) -> Self {
        let broadcast = BroadcastManager::new(&config.broadcast);
        Self {
            config,
            broadcast,
            scheduler,
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/ws", get(crate::ws::connection::ws_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
