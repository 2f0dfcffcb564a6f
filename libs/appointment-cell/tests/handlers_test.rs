use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::services::gateway::{
    APPOINTMENT_CANCEL_PATH, APPOINTMENT_REPORT_PATH, GENERATE_OTP_PATH, VALIDATE_OTP_PATH,
};
use appointment_cell::{appointment_routes, AppointmentState};
use shared_utils::test_utils::{MockAppointmentResponses, TestConfig, TEST_MOBILE, TEST_OTP, TEST_REFERENCE};

struct TestPortal {
    app: Router,
    server: MockServer,
}

impl TestPortal {
    async fn start() -> Self {
        let server = MockServer::start().await;
        let config = TestConfig::with_service_url(server.uri()).to_app_config();
        let app = appointment_routes(Arc::new(AppointmentState::new(&config)));
        Self { app, server }
    }

    async fn mock(&self, route: &str, body: Value) {
        Mock::given(method("POST"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn new_flow(&self) -> String {
        let (status, body) = self.call(Method::POST, "/flows", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["flow"]["state"], "IDLE");
        body["flow"]["flow_id"].as_str().unwrap().to_string()
    }

    async fn looked_up_flow(&self) -> String {
        self.mock(
            APPOINTMENT_REPORT_PATH,
            MockAppointmentResponses::lookup_single(101, TEST_REFERENCE),
        )
        .await;
        let flow_id = self.new_flow().await;
        let (status, body) = self
            .call(
                Method::POST,
                &format!("/flows/{}/lookup", flow_id),
                Some(json!({
                    "searchType": "referenceId",
                    "searchValue": TEST_REFERENCE,
                    "contactType": "mobile",
                    "contactValue": TEST_MOBILE
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["flow"]["state"], "LOOKED_UP");
        flow_id
    }
}

#[tokio::test]
async fn test_cancel_over_http() {
    let portal = TestPortal::start().await;
    portal.mock(GENERATE_OTP_PATH, MockAppointmentResponses::otp_sent()).await;
    portal.mock(VALIDATE_OTP_PATH, MockAppointmentResponses::otp_validated()).await;
    portal.mock(APPOINTMENT_CANCEL_PATH, MockAppointmentResponses::mutation_success()).await;
    let flow_id = portal.looked_up_flow().await;

    let (status, body) = portal
        .call(
            Method::POST,
            &format!("/flows/{}/mutation", flow_id),
            Some(json!({"kind": "cancel", "scope": "single", "appointment_id": "101"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["flow"]["state"], "OTP_PENDING");
    assert_eq!(body["flow"]["countdown"], "05:00");
    assert_eq!(body["flow"]["challenge"]["target"], "******3210");
    assert_eq!(body["flow"]["affordances"]["can_confirm"], false);

    let (status, body) = portal
        .call(Method::PUT, &format!("/flows/{}/otp", flow_id), Some(json!({"code": TEST_OTP})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["flow"]["affordances"]["can_verify"], true);

    let (status, body) = portal
        .call(Method::POST, &format!("/flows/{}/otp/verify", flow_id), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["flow"]["state"], "OTP_VERIFIED");
    assert_eq!(body["flow"]["affordances"]["can_confirm"], true);

    let (status, body) = portal
        .call(Method::POST, &format!("/flows/{}/confirm", flow_id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["flow"]["state"], "MUTATION_CONFIRMED");
    assert_eq!(body["flow"]["records"][0]["booking_status"], "cancelled");
}

#[tokio::test]
async fn test_invalid_search_is_unprocessable() {
    let portal = TestPortal::start().await;
    let flow_id = portal.new_flow().await;

    let (status, body) = portal
        .call(
            Method::POST,
            &format!("/flows/{}/lookup", flow_id),
            Some(json!({
                "searchType": "passport",
                "searchValue": "abc",
                "contactType": "email",
                "contactValue": "not-an-email"
            })),
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("uppercase letters/numbers"));
}

#[tokio::test]
async fn test_confirm_before_verification_conflicts() {
    let portal = TestPortal::start().await;
    let flow_id = portal.looked_up_flow().await;

    let (status, _) = portal
        .call(Method::POST, &format!("/flows/{}/confirm", flow_id), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = portal
        .call(Method::POST, &format!("/flows/{}/otp/resend", flow_id), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_flow_is_not_found() {
    let portal = TestPortal::start().await;

    let (status, body) = portal
        .call(
            Method::GET,
            "/flows/00000000-0000-0000-0000-000000000000",
            None,
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("Flow not found"));
}

#[tokio::test]
async fn test_snapshot_and_resume_over_http() {
    let portal = TestPortal::start().await;
    let flow_id = portal.looked_up_flow().await;

    let (status, _) = portal
        .call(
            Method::PUT,
            &format!("/flows/{}/pending-slot", flow_id),
            Some(json!({"appointment_id": "101", "date_booked": "2026-11-20", "booked_time": "10:15"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, snapshot) = portal
        .call(Method::GET, &format!("/flows/{}/snapshot", flow_id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["records"][0]["pending_slot"]["booked_time"], "10:15");

    let (status, body) = portal.call(Method::POST, "/flows/resume", Some(snapshot)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["flow"]["state"], "LOOKED_UP");
    assert_ne!(body["flow"]["flow_id"], flow_id.as_str());
    assert_eq!(body["flow"]["records"][0]["pending_slot"]["date_booked"], "2026-11-20");

    let (status, _) = portal
        .call(Method::DELETE, &format!("/flows/{}", flow_id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = portal.call(Method::GET, &format!("/flows/{}", flow_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_otp_keystrokes_over_http() {
    let portal = TestPortal::start().await;
    portal.mock(GENERATE_OTP_PATH, MockAppointmentResponses::otp_sent()).await;
    let flow_id = portal.looked_up_flow().await;
    portal
        .call(
            Method::POST,
            &format!("/flows/{}/mutation", flow_id),
            Some(json!({"kind": "cancel", "scope": "single", "appointment_id": "101"})),
        )
        .await;

    let keys = format!("/flows/{}/otp/keys", flow_id);
    portal.call(Method::POST, &keys, Some(json!({"index": 0, "text": "4"}))).await;
    portal.call(Method::POST, &keys, Some(json!({"index": 1, "text": "2"}))).await;
    let (status, body) = portal
        .call(Method::POST, &keys, Some(json!({"index": 2, "backspace": true})))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["flow"]["otp_cells"], json!(["4", "", "", "", "", ""]));
    assert_eq!(body["flow"]["otp_focus"], 1);
    assert_eq!(body["flow"]["affordances"]["can_verify"], false);
}
