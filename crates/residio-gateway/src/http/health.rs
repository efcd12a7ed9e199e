use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health: liveness probe, returns server metadata and the debt
/// scheduler's latest status.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let scheduler = match state.scheduler {
        Some(ref rx) => serde_json::to_value(&*rx.borrow()).unwrap_or(Value::Null),
        None => Value::Null,
    };
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "scheduler_enabled": state.config.scheduler.enabled,
        "scheduler": scheduler,
    }))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use residio_core::config::ResidioConfig;
    use residio_scheduler::SchedulerStatus;
    use tokio::sync::watch;
    use tower::ServiceExt;

    use super::*;
    use crate::app::build_router;

    async fn get_health(state: AppState) -> Value {
        let router = build_router(Arc::new(state));
        let res = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = to_bytes(res.into_body(), 64 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn reports_scheduler_status() {
        let status = SchedulerStatus {
            cycles: 3,
            last_error: Some("Database error: database is locked".to_string()),
            ..SchedulerStatus::default()
        };
        let (_tx, rx) = watch::channel(status);
        let body = get_health(AppState::new(ResidioConfig::default(), Some(rx))).await;

        assert_eq!(body["status"], "ok");
        assert_eq!(body["scheduler_enabled"], true);
        assert_eq!(body["scheduler"]["cycles"], 3);
        assert_eq!(body["scheduler"]["state"], "sleeping");
        assert_eq!(
            body["scheduler"]["last_error"],
            "Database error: database is locked"
        );
    }

    #[tokio::test]
    async fn disabled_scheduler_is_reported() {
        let mut config = ResidioConfig::default();
        config.scheduler.enabled = false;
        let body = get_health(AppState::new(config, None)).await;
        assert_eq!(body["scheduler_enabled"], false);
        assert!(body["scheduler"].is_null());
    }
}
