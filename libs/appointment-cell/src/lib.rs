// libs/appointment-cell/src/lib.rs
//! # Appointment Cell
//!
//! Applicant-facing appointment lifecycle for visa medical bookings: find an
//! existing appointment, then reschedule or cancel it behind a one-time
//! password.
//!
//! ## Flow
//!
//! ```text
//! IDLE -> LOOKED_UP -> MUTATION_REQUESTED -> OTP_PENDING <-> OTP_REJECTED
//!                                                |
//!                                          OTP_VERIFIED -> MUTATION_CONFIRMED
//! ```
//!
//! Failures loop back (`MUTATION_FAILED` settles in `OTP_VERIFIED`, an aborted
//! mutation settles in `LOOKED_UP`). Group bookings batch every selected
//! member into a single request.
//!
//! ## Architecture
//!
//! ```text
//! +-----------------------------------------------------+
//! |                 Appointment Cell                    |
//! +-----------------------------------------------------+
//! |  handlers.rs     |  HTTP endpoint handlers          |
//! |  router.rs       |  Route definitions               |
//! |  models.rs       |  Wire types, errors              |
//! |  services/       |                                  |
//! |    flow.rs       |  Lifecycle state machine         |
//! |    gateway.rs    |  Appointment service client      |
//! |    session.rs    |  Live flow registry              |
//! |    otp_input.rs  |  Six-cell OTP entry              |
//! |    countdown.rs  |  Resend timer                    |
//! +-----------------------------------------------------+
//! ```
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use appointment_cell::{appointment_routes, AppointmentState};
//! use shared_config::AppConfig;
//!
//! let config = AppConfig::from_env();
//! let state = Arc::new(AppointmentState::new(&config));
//! state.flows.spawn_sweeper();
//! let routes = appointment_routes(state);
//! ```

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use handlers::AppointmentState;

pub use models::{
    AppointmentError, AppointmentRecord, BookingStatus, ContactType, LookupRequest,
    MutationKind, MutationTarget, PendingSlot, SearchType,
};

pub use services::{
    AppointmentFlow, AppointmentGateway, FlowRegistry, FlowSettings, FlowSnapshot, FlowState,
    FlowView, HttpAppointmentGateway,
};

pub use router::appointment_routes;
