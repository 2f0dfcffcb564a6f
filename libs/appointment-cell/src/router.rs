// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::handlers::{self, AppointmentState};

pub fn appointment_routes(state: Arc<AppointmentState>) -> Router {
    Router::new()
        // Flow lifecycle
        .route("/flows", post(handlers::create_flow))
        .route("/flows/resume", post(handlers::resume_flow))
        .route(
            "/flows/{flow_id}",
            get(handlers::get_flow).delete(handlers::delete_flow),
        )
        .route("/flows/{flow_id}/snapshot", get(handlers::get_snapshot))

        // Lookup & selection
        .route("/flows/{flow_id}/lookup", post(handlers::lookup_appointments))
        .route("/flows/{flow_id}/reset", post(handlers::reset_flow))
        .route(
            "/flows/{flow_id}/selection/{appointment_id}",
            post(handlers::toggle_selection),
        )
        .route("/flows/{flow_id}/pending-slot", put(handlers::set_pending_slot))

        // Mutation & OTP
        .route("/flows/{flow_id}/mutation", post(handlers::request_mutation))
        .route("/flows/{flow_id}/otp", put(handlers::enter_otp))
        .route("/flows/{flow_id}/otp/keys", post(handlers::press_otp_key))
        .route("/flows/{flow_id}/otp/verify", post(handlers::verify_otp))
        .route("/flows/{flow_id}/otp/resend", post(handlers::resend_otp))
        .route("/flows/{flow_id}/confirm", post(handlers::confirm_mutation))
        .route("/flows/{flow_id}/back", post(handlers::go_back))
        .with_state(state)
}
