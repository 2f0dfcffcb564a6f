// libs/appointment-cell/src/services/lifecycle.rs
use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::models::AppointmentError;

/// Client-side state of one appointment lifecycle flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowState {
    Idle,
    LookedUp,
    LookupFailed,
    MutationRequested,
    OtpPending,
    OtpRejected,
    OtpVerified,
    MutationConfirmed,
    MutationFailed,
    MutationAborted,
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlowState::Idle => "IDLE",
            FlowState::LookedUp => "LOOKED_UP",
            FlowState::LookupFailed => "LOOKUP_FAILED",
            FlowState::MutationRequested => "MUTATION_REQUESTED",
            FlowState::OtpPending => "OTP_PENDING",
            FlowState::OtpRejected => "OTP_REJECTED",
            FlowState::OtpVerified => "OTP_VERIFIED",
            FlowState::MutationConfirmed => "MUTATION_CONFIRMED",
            FlowState::MutationFailed => "MUTATION_FAILED",
            FlowState::MutationAborted => "MUTATION_ABORTED",
        };
        write!(f, "{}", name)
    }
}

impl FlowState {
    /// A lookup may (re)start from any state where no mutation is underway.
    pub fn accepts_lookup(self) -> bool {
        matches!(
            self,
            FlowState::Idle
                | FlowState::LookupFailed
                | FlowState::LookedUp
                | FlowState::MutationConfirmed
        )
    }

    /// States in which an OTP challenge is live.
    pub fn has_live_challenge(self) -> bool {
        matches!(
            self,
            FlowState::OtpPending | FlowState::OtpRejected | FlowState::OtpVerified
        )
    }

    pub fn is_terminal(self) -> bool {
        self == FlowState::MutationConfirmed
    }
}

pub struct FlowLifecycleService;

impl FlowLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a flow transition is allowed
    pub fn validate_transition(&self, from: FlowState, to: FlowState) -> Result<(), AppointmentError> {
        if !self.get_valid_transitions(from).contains(&to) {
            warn!("Invalid flow transition attempted: {} -> {}", from, to);
            return Err(AppointmentError::InvalidTransition { from, to });
        }

        debug!("Flow transition validated: {} -> {}", from, to);
        Ok(())
    }

    /// Get all valid next states for a given current state
    pub fn get_valid_transitions(&self, from: FlowState) -> Vec<FlowState> {
        match from {
            FlowState::Idle | FlowState::LookupFailed => {
                vec![FlowState::LookedUp, FlowState::LookupFailed, FlowState::Idle]
            }
            FlowState::LookedUp => vec![
                FlowState::MutationRequested,
                FlowState::LookedUp,
                FlowState::LookupFailed,
                FlowState::Idle,
            ],
            FlowState::MutationRequested => {
                vec![FlowState::OtpPending, FlowState::MutationAborted]
            }
            FlowState::OtpPending => vec![
                FlowState::OtpVerified,
                FlowState::OtpRejected,
                FlowState::MutationAborted,
                FlowState::OtpPending, // resend
            ],
            FlowState::OtpRejected => vec![FlowState::OtpPending, FlowState::MutationAborted],
            FlowState::OtpVerified => vec![
                FlowState::MutationConfirmed,
                FlowState::MutationFailed,
                FlowState::MutationAborted,
            ],
            FlowState::MutationFailed => vec![FlowState::OtpVerified],
            FlowState::MutationAborted => vec![FlowState::LookedUp],
            FlowState::MutationConfirmed => {
                vec![FlowState::LookedUp, FlowState::LookupFailed, FlowState::Idle]
            }
        }
    }
}

impl Default for FlowLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}
