use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    routing::get,
};
use serde_json::{json, Value};

use appointment_cell::{appointment_routes, AppointmentState};
use shared_config::AppConfig;

pub fn create_router(config: Arc<AppConfig>) -> Router {
    let appointments = Arc::new(AppointmentState::new(&config));
    appointments.flows.spawn_sweeper();

    Router::new()
        .route("/", get(|| async { "Visa medical appointment portal is running!" }))
        .route("/health", get(health_check).with_state(config))
        .merge(appointment_routes(appointments))
}

async fn health_check(State(config): State<Arc<AppConfig>>) -> Json<Value> {
    Json(json!({
        "status": if config.is_configured() { "ok" } else { "degraded" },
        "appointment_service_configured": config.is_configured(),
        "otp_timer_duration_secs": config.otp_timer_duration_secs
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use shared_utils::test_utils::TestConfig;

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health_reports_configuration() {
        let app = create_router(TestConfig::default().to_arc());
        let (status, body) = get_json(app, "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["appointment_service_configured"], true);
    }

    #[tokio::test]
    async fn test_health_degraded_without_service_url() {
        let app = create_router(TestConfig::with_service_url("").to_arc());
        let (_, body) = get_json(app, "/health").await;

        assert_eq!(body["status"], "degraded");
    }

    #[tokio::test]
    async fn test_flow_routes_are_mounted() {
        let app = create_router(TestConfig::default().to_arc());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/flows")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
