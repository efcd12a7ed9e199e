use std::sync::Arc;

use axum::{routing::get, Router};
use residio_core::config::ResidioConfig;
use residio_scheduler::SchedulerStatus;
use tokio::sync::watch;

/// Central shared state, passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: ResidioConfig,
    /// Live scheduler status; `None` when the scheduler is disabled in config.
    pub scheduler: Option<watch::Receiver<SchedulerStatus>>,
}

impl AppState {
    pub fn new(
        config: ResidioConfig,
        scheduler: Option<watch::Receiver<SchedulerStatus>>,
    ) -> Self {
        Self { config, scheduler }
    }
}

/// Assemble the Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
