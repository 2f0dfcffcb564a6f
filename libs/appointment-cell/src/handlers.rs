// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::models::{
    AppointmentError, LookupRequest, MutationKind, MutationTarget, PendingSlot,
};
use crate::services::flow::{AppointmentFlow, FlowSettings, FlowSnapshot};
use crate::services::gateway::{AppointmentGateway, HttpAppointmentGateway};
use crate::services::otp_input::OtpKey;
use crate::services::session::FlowRegistry;

/// Shared state behind every appointment route.
pub struct AppointmentState {
    pub flows: FlowRegistry,
}

impl AppointmentState {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_gateway(config, Arc::new(HttpAppointmentGateway::new(config)))
    }

    pub fn with_gateway(config: &AppConfig, gateway: Arc<dyn AppointmentGateway>) -> Self {
        Self {
            flows: FlowRegistry::new(gateway, FlowSettings::from(config)),
        }
    }
}

// ==============================================================================
// REQUEST BODIES
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct PendingSlotRequest {
    pub appointment_id: String,
    pub date_booked: NaiveDate,
    pub booked_time: String,
}

#[derive(Debug, Deserialize)]
pub struct MutationRequest {
    pub kind: MutationKind,
    #[serde(flatten)]
    pub target: MutationTarget,
}

#[derive(Debug, Deserialize)]
pub struct OtpKeyRequest {
    pub index: usize,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub backspace: bool,
}

impl From<OtpKeyRequest> for OtpKey {
    fn from(request: OtpKeyRequest) -> Self {
        if request.backspace {
            OtpKey::Backspace
        } else {
            OtpKey::Text(request.text.unwrap_or_default())
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OtpCodeRequest {
    pub code: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct VerifyOtpRequest {
    #[serde(default)]
    pub code: Option<String>,
}

// ==============================================================================
// ERROR MAPPING
// ==============================================================================

fn map_flow_error(e: AppointmentError) -> AppError {
    match e {
        AppointmentError::InvalidSearch(_) | AppointmentError::ValidationError(_) => {
            AppError::ValidationError(e.to_string())
        }
        AppointmentError::OperationNotAllowed { .. }
        | AppointmentError::InvalidTransition { .. }
        | AppointmentError::ResendCooldown { .. }
        | AppointmentError::OperationInFlight => AppError::Conflict(e.to_string()),
        AppointmentError::AppointmentNotFound(_)
        | AppointmentError::FlowNotFound(_)
        | AppointmentError::LookupFailed(_) => AppError::NotFound(e.to_string()),
        AppointmentError::NotBooked { .. }
        | AppointmentError::MissingPendingSlot(_)
        | AppointmentError::EmptySelection
        | AppointmentError::OtpRejected(_) => AppError::BadRequest(e.to_string()),
        AppointmentError::MutationRejected(_) | AppointmentError::ExternalServiceError(_) => {
            AppError::ExternalService(e.to_string())
        }
    }
}

fn flow_response(flow: &AppointmentFlow, message: &str) -> Json<Value> {
    Json(json!({
        "success": true,
        "flow": flow.view(),
        "message": message
    }))
}

// ==============================================================================
// FLOW HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_flow(State(state): State<Arc<AppointmentState>>) -> Result<Json<Value>, AppError> {
    let view = state.flows.create().await;

    Ok(Json(json!({
        "success": true,
        "flow": view,
        "message": "Flow started"
    })))
}

pub async fn get_flow(
    State(state): State<Arc<AppointmentState>>,
    Path(flow_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let view = state.flows.view(flow_id).await.map_err(map_flow_error)?;

    Ok(Json(json!({
        "success": true,
        "flow": view
    })))
}

pub async fn delete_flow(
    State(state): State<Arc<AppointmentState>>,
    Path(flow_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    state.flows.remove(flow_id).await.map_err(map_flow_error)?;

    Ok(Json(json!({
        "success": true,
        "message": "Flow discarded"
    })))
}

#[axum::debug_handler]
pub async fn lookup_appointments(
    State(state): State<Arc<AppointmentState>>,
    Path(flow_id): Path<Uuid>,
    Json(request): Json<LookupRequest>,
) -> Result<Json<Value>, AppError> {
    let mut flow = state.flows.acquire(flow_id).await.map_err(map_flow_error)?;
    flow.lookup(request).await.map_err(map_flow_error)?;

    Ok(flow_response(&flow, "Appointments found"))
}

pub async fn reset_flow(
    State(state): State<Arc<AppointmentState>>,
    Path(flow_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let mut flow = state.flows.acquire(flow_id).await.map_err(map_flow_error)?;
    flow.reset().map_err(map_flow_error)?;

    Ok(flow_response(&flow, "Search cleared"))
}

pub async fn toggle_selection(
    State(state): State<Arc<AppointmentState>>,
    Path((flow_id, appointment_id)): Path<(Uuid, String)>,
) -> Result<Json<Value>, AppError> {
    let mut flow = state.flows.acquire(flow_id).await.map_err(map_flow_error)?;
    let selected = flow.toggle_selection(&appointment_id).map_err(map_flow_error)?;

    Ok(flow_response(
        &flow,
        if selected { "Appointment selected" } else { "Appointment deselected" },
    ))
}

pub async fn set_pending_slot(
    State(state): State<Arc<AppointmentState>>,
    Path(flow_id): Path<Uuid>,
    Json(request): Json<PendingSlotRequest>,
) -> Result<Json<Value>, AppError> {
    if request.booked_time.trim().is_empty() {
        return Err(AppError::ValidationError("booked_time is required".to_string()));
    }

    let mut flow = state.flows.acquire(flow_id).await.map_err(map_flow_error)?;
    flow.set_pending_slot(
        &request.appointment_id,
        PendingSlot {
            date_booked: request.date_booked,
            booked_time: request.booked_time.trim().to_string(),
        },
    )
    .map_err(map_flow_error)?;

    Ok(flow_response(&flow, "New slot held for confirmation"))
}

// ==============================================================================
// MUTATION & OTP HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn request_mutation(
    State(state): State<Arc<AppointmentState>>,
    Path(flow_id): Path<Uuid>,
    Json(request): Json<MutationRequest>,
) -> Result<Json<Value>, AppError> {
    debug!("Flow {} requesting {} for {:?}", flow_id, request.kind, request.target);

    let mut flow = state.flows.acquire(flow_id).await.map_err(map_flow_error)?;
    flow.request_mutation(request.kind, request.target)
        .await
        .map_err(map_flow_error)?;

    Ok(flow_response(&flow, "OTP sent"))
}

pub async fn press_otp_key(
    State(state): State<Arc<AppointmentState>>,
    Path(flow_id): Path<Uuid>,
    Json(request): Json<OtpKeyRequest>,
) -> Result<Json<Value>, AppError> {
    let index = request.index;
    let mut flow = state.flows.acquire(flow_id).await.map_err(map_flow_error)?;
    let applied = flow
        .press_otp_key(index, OtpKey::from(request))
        .map_err(map_flow_error)?;

    Ok(flow_response(&flow, if applied { "OTP updated" } else { "Input ignored" }))
}

pub async fn enter_otp(
    State(state): State<Arc<AppointmentState>>,
    Path(flow_id): Path<Uuid>,
    Json(request): Json<OtpCodeRequest>,
) -> Result<Json<Value>, AppError> {
    let mut flow = state.flows.acquire(flow_id).await.map_err(map_flow_error)?;
    flow.enter_otp(&request.code).map_err(map_flow_error)?;

    Ok(flow_response(&flow, "OTP updated"))
}

#[axum::debug_handler]
pub async fn verify_otp(
    State(state): State<Arc<AppointmentState>>,
    Path(flow_id): Path<Uuid>,
    Json(request): Json<VerifyOtpRequest>,
) -> Result<Json<Value>, AppError> {
    let mut flow = state.flows.acquire(flow_id).await.map_err(map_flow_error)?;
    let verified = match request.code {
        Some(code) => flow.verify_otp(code.trim()).await,
        None => flow.verify_entered_otp().await,
    };
    verified.map_err(map_flow_error)?;

    Ok(flow_response(&flow, "OTP verified"))
}

pub async fn resend_otp(
    State(state): State<Arc<AppointmentState>>,
    Path(flow_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let mut flow = state.flows.acquire(flow_id).await.map_err(map_flow_error)?;
    flow.resend_otp().await.map_err(map_flow_error)?;

    Ok(flow_response(&flow, "OTP resent"))
}

#[axum::debug_handler]
pub async fn confirm_mutation(
    State(state): State<Arc<AppointmentState>>,
    Path(flow_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let mut flow = state.flows.acquire(flow_id).await.map_err(map_flow_error)?;
    flow.confirm().await.map_err(map_flow_error)?;

    Ok(flow_response(&flow, "Appointment updated"))
}

pub async fn go_back(
    State(state): State<Arc<AppointmentState>>,
    Path(flow_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let mut flow = state.flows.acquire(flow_id).await.map_err(map_flow_error)?;
    flow.back().map_err(map_flow_error)?;

    Ok(flow_response(&flow, "Returned to appointment details"))
}

// ==============================================================================
// HANDOFF HANDLERS
// ==============================================================================

pub async fn get_snapshot(
    State(state): State<Arc<AppointmentState>>,
    Path(flow_id): Path<Uuid>,
) -> Result<Json<FlowSnapshot>, AppError> {
    let flow = state.flows.get(flow_id).await.map_err(map_flow_error)?;
    let guard = flow.lock().await;

    Ok(Json(guard.snapshot()))
}

pub async fn resume_flow(
    State(state): State<Arc<AppointmentState>>,
    Json(snapshot): Json<FlowSnapshot>,
) -> Result<Json<Value>, AppError> {
    let view = state.flows.resume(snapshot).await.map_err(map_flow_error)?;

    Ok(Json(json!({
        "success": true,
        "flow": view,
        "message": "Flow resumed"
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::response::IntoResponse;
    use axum::Router;
    use tower::ServiceExt;

    use crate::router::appointment_routes;
    use crate::services::lifecycle::FlowState;
    use crate::services::testing::ScriptedGateway;

    async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_group_selection_over_http() {
        let state = AppointmentState::with_gateway(&AppConfig::default(), Arc::new(ScriptedGateway::group()));
        let app = appointment_routes(Arc::new(state));

        let (_, body) = post(&app, "/flows", json!({})).await;
        let flow_id = body["flow"]["flow_id"].as_str().unwrap().to_string();
        let (status, body) = post(
            &app,
            &format!("/flows/{}/lookup", flow_id),
            json!({
                "searchType": "referenceId",
                "searchValue": "AP2001",
                "contactType": "mobile",
                "contactValue": "9876543210"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["flow"]["is_group"], true);
        assert_eq!(body["flow"]["affordances"]["can_mutate_selection"], false);

        let (status, body) = post(&app, &format!("/flows/{}/selection/202", flow_id), json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Appointment selected");
        assert_eq!(body["flow"]["records"][1]["selected"], true);
        assert_eq!(body["flow"]["affordances"]["can_mutate_selection"], true);

        let (status, body) = post(
            &app,
            &format!("/flows/{}/mutation", flow_id),
            json!({"kind": "cancel", "scope": "group"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["flow"]["state"], "OTP_PENDING");
        assert_eq!(body["flow"]["active_mutation"]["appointment_ids"], json!(["202"]));
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (AppointmentError::OperationInFlight, StatusCode::CONFLICT),
            (AppointmentError::ResendCooldown { remaining_secs: 12 }, StatusCode::CONFLICT),
            (
                AppointmentError::OperationNotAllowed { operation: "confirm", state: FlowState::Idle },
                StatusCode::CONFLICT,
            ),
            (AppointmentError::ValidationError("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (AppointmentError::LookupFailed("none".into()), StatusCode::NOT_FOUND),
            (AppointmentError::OtpRejected("Invalid OTP".into()), StatusCode::BAD_REQUEST),
            (AppointmentError::EmptySelection, StatusCode::BAD_REQUEST),
            (AppointmentError::ExternalServiceError("down".into()), StatusCode::BAD_GATEWAY),
        ];

        for (error, status) in cases {
            assert_eq!(map_flow_error(error).into_response().status(), status);
        }
    }

    #[test]
    fn test_otp_key_body() {
        let key: OtpKeyRequest = serde_json::from_value(json!({"index": 3, "text": "7"})).unwrap();
        assert_eq!(OtpKey::from(key), OtpKey::Text("7".into()));

        let key: OtpKeyRequest = serde_json::from_value(json!({"index": 3, "backspace": true})).unwrap();
        assert_eq!(OtpKey::from(key), OtpKey::Backspace);
    }

    #[test]
    fn test_mutation_body_flattens_target() {
        let body: MutationRequest = serde_json::from_value(json!({
            "kind": "cancel",
            "scope": "single",
            "appointment_id": "101"
        }))
        .unwrap();
        assert_eq!(body.kind, MutationKind::Cancel);
        assert_eq!(
            body.target,
            MutationTarget::Single { appointment_id: "101".into() }
        );

        let group: MutationRequest =
            serde_json::from_value(json!({"kind": "reschedule", "scope": "group"})).unwrap();
        assert_eq!(group.target, MutationTarget::Group);
    }
}
