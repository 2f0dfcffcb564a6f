// libs/appointment-cell/src/services/flow.rs
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::models::{
    AppointmentError, AppointmentRecord, CommitMutationRequest, FinalizeSlot, GenerateOtpRequest,
    GroupMember, LookupRequest, MutationKind, MutationTarget, OtpAttemptState, OtpChallenge,
    OtpPurpose, OtpSendMode, PendingSlot, ValidateOtpRequest,
};
use crate::services::countdown::OtpCountdown;
use crate::services::gateway::AppointmentGateway;
use crate::services::lifecycle::{FlowLifecycleService, FlowState};
use crate::services::notice::{FlowNotice, NoticeKind, NoticeView};
use crate::services::otp_input::{OtpInput, OtpKey};
use crate::services::validation::SearchValidator;

const LOOKUP_MISS_MESSAGE: &str = "No appointment found for the given details.";
const LOOKUP_ERROR_MESSAGE: &str = "Error fetching appointment";
const OTP_SENT_MESSAGE: &str = "OTP sent to your registered contact number.";
const OTP_INVALID_MESSAGE: &str = "Invalid OTP";
const OTP_VALIDATION_FAILED_MESSAGE: &str = "OTP validation failed";
const OTP_VERIFIED_MESSAGE: &str = "OTP verified successfully.";

#[derive(Debug, Clone)]
pub struct FlowSettings {
    pub otp_lifetime_secs: u64,
    pub otp_error_display: Duration,
    /// An untouched flow is evicted from the registry after this long.
    pub idle_timeout: Duration,
    /// Shorter eviction window once the mutation is confirmed.
    pub confirmed_grace: Duration,
}

impl From<&AppConfig> for FlowSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            otp_lifetime_secs: config.otp_timer_duration_secs,
            otp_error_display: Duration::from_secs(config.otp_error_display_secs),
            idle_timeout: Duration::from_secs(config.flow_idle_timeout_secs),
            confirmed_grace: Duration::from_secs(config.confirmed_flow_grace_secs),
        }
    }
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

/// The mutation a flow is currently driving through OTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveMutation {
    pub kind: MutationKind,
    pub appointment_ids: Vec<String>,
    pub is_group: bool,
}

/// Plain session state carried across a navigation (for example to the slot
/// picker and back). Nothing in it is secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSnapshot {
    pub records: Vec<AppointmentRecord>,
    pub is_group: bool,
    #[serde(default)]
    pub selection: Vec<String>,
}

/// Drives one user's appointment through lookup, OTP-gated mutation and
/// resolution. Every affordance the UI shows is derived from `state`.
pub struct AppointmentFlow {
    id: Uuid,
    gateway: Arc<dyn AppointmentGateway>,
    settings: FlowSettings,
    lifecycle: FlowLifecycleService,
    validator: SearchValidator,
    state: FlowState,
    records: Vec<AppointmentRecord>,
    is_group: bool,
    selection: BTreeSet<String>,
    mutation: Option<ActiveMutation>,
    challenge: Option<OtpChallenge>,
    countdown: Option<OtpCountdown>,
    otp_input: OtpInput,
    verified_code: Option<String>,
    notice: Option<FlowNotice>,
    last_outcome: Option<MutationKind>,
}

impl fmt::Debug for AppointmentFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppointmentFlow")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("records", &self.records.len())
            .field("is_group", &self.is_group)
            .field("mutation", &self.mutation)
            .finish_non_exhaustive()
    }
}

impl AppointmentFlow {
    pub fn new(gateway: Arc<dyn AppointmentGateway>, settings: FlowSettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            gateway,
            settings,
            lifecycle: FlowLifecycleService::new(),
            validator: SearchValidator::new(),
            state: FlowState::Idle,
            records: Vec::new(),
            is_group: false,
            selection: BTreeSet::new(),
            mutation: None,
            challenge: None,
            countdown: None,
            otp_input: OtpInput::new(),
            verified_code: None,
            notice: None,
            last_outcome: None,
        }
    }

    /// Rebuild a flow from a snapshot, landing in LOOKED_UP with any pending
    /// slots the user picked meanwhile.
    pub fn resume(
        gateway: Arc<dyn AppointmentGateway>,
        settings: FlowSettings,
        snapshot: FlowSnapshot,
    ) -> Result<Self, AppointmentError> {
        if snapshot.records.is_empty() {
            return Err(AppointmentError::ValidationError(
                "Snapshot contains no appointments".to_string(),
            ));
        }

        let mut flow = Self::new(gateway, settings);
        flow.lifecycle.validate_transition(flow.state, FlowState::LookedUp)?;
        flow.state = FlowState::LookedUp;
        flow.is_group = snapshot.is_group || snapshot.records.len() > 1;
        flow.selection = snapshot
            .selection
            .into_iter()
            .filter(|id| {
                snapshot
                    .records
                    .iter()
                    .any(|record| &record.id == id && record.is_booked())
            })
            .collect();
        flow.records = snapshot.records;

        info!("Flow {} resumed with {} record(s)", flow.id, flow.records.len());
        Ok(flow)
    }

    pub fn snapshot(&self) -> FlowSnapshot {
        FlowSnapshot {
            records: self.records.clone(),
            is_group: self.is_group,
            selection: self.selection.iter().cloned().collect(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn records(&self) -> &[AppointmentRecord] {
        &self.records
    }

    pub fn is_group(&self) -> bool {
        self.is_group
    }

    pub fn selection(&self) -> impl Iterator<Item = &str> {
        self.selection.iter().map(String::as_str)
    }

    pub fn challenge(&self) -> Option<&OtpChallenge> {
        self.challenge.as_ref()
    }

    pub fn active_mutation(&self) -> Option<&ActiveMutation> {
        self.mutation.as_ref()
    }

    pub fn otp_input(&self) -> &OtpInput {
        &self.otp_input
    }

    pub fn countdown_display(&self) -> Option<String> {
        self.countdown.as_ref().and_then(OtpCountdown::display)
    }

    /// The notice currently on screen, if its display window has not passed.
    pub fn visible_notice(&self) -> Option<&FlowNotice> {
        self.notice.as_ref().filter(|notice| notice.is_visible())
    }

    // ==========================================================================
    // LOOKUP
    // ==========================================================================

    pub async fn lookup(&mut self, request: LookupRequest) -> Result<(), AppointmentError> {
        self.ensure(self.state.accepts_lookup(), "lookup")?;
        self.validator.validate_lookup(&request)?;

        let outcome = self.gateway.lookup(&request).await;

        let message = match outcome {
            Ok(response) if response.is_success() && !response.detail.is_empty() => {
                self.transition(FlowState::LookedUp)?;
                self.discard_mutation();
                self.is_group = response.is_group();
                self.records = response.detail;
                self.selection.clear();
                self.notice = None;
                self.last_outcome = None;
                info!(
                    "Flow {} found {} appointment(s){}",
                    self.id,
                    self.records.len(),
                    if self.is_group { " (group booking)" } else { "" }
                );
                return Ok(());
            }
            Ok(response) => {
                if response.message.trim().is_empty() || response.is_success() {
                    LOOKUP_MISS_MESSAGE.to_string()
                } else {
                    response.message
                }
            }
            Err(e) => {
                error!("Flow {} lookup error: {}", self.id, e);
                LOOKUP_ERROR_MESSAGE.to_string()
            }
        };

        warn!("Flow {} lookup failed: {}", self.id, message);
        self.transition(FlowState::LookupFailed)?;
        self.discard_mutation();
        self.records.clear();
        self.selection.clear();
        self.is_group = false;
        self.notice = Some(FlowNotice::persistent(NoticeKind::Warning, message.clone()));
        Err(AppointmentError::LookupFailed(message))
    }

    /// Drop every record and return to the search form.
    pub fn reset(&mut self) -> Result<(), AppointmentError> {
        self.ensure(self.state.accepts_lookup(), "reset")?;
        self.transition(FlowState::Idle)?;
        self.discard_mutation();
        self.records.clear();
        self.selection.clear();
        self.is_group = false;
        self.notice = None;
        self.last_outcome = None;
        Ok(())
    }

    // ==========================================================================
    // SELECTION & PENDING SLOT
    // ==========================================================================

    /// Toggle a group member in or out of the batch. Returns whether it is
    /// selected afterwards.
    pub fn toggle_selection(&mut self, appointment_id: &str) -> Result<bool, AppointmentError> {
        self.ensure(self.state == FlowState::LookedUp && self.is_group, "toggle_selection")?;
        let record = self.record(appointment_id)?;
        if !record.is_booked() {
            return Err(AppointmentError::NotBooked {
                appointment_id: record.id.clone(),
                status: record.booking_status,
            });
        }

        if self.selection.remove(appointment_id) {
            Ok(false)
        } else {
            self.selection.insert(appointment_id.to_string());
            Ok(true)
        }
    }

    pub fn set_pending_slot(
        &mut self,
        appointment_id: &str,
        slot: PendingSlot,
    ) -> Result<(), AppointmentError> {
        self.ensure(self.state == FlowState::LookedUp, "set_pending_slot")?;
        let record = self.record_mut(appointment_id)?;
        if !record.is_booked() {
            return Err(AppointmentError::NotBooked {
                appointment_id: record.id.clone(),
                status: record.booking_status,
            });
        }

        info!(
            "Pending slot {} {} picked for appointment {}",
            slot.date_string(),
            slot.booked_time,
            appointment_id
        );
        record.pending_slot = Some(slot);
        Ok(())
    }

    // ==========================================================================
    // MUTATION REQUEST & OTP
    // ==========================================================================

    pub async fn request_mutation(
        &mut self,
        kind: MutationKind,
        target: MutationTarget,
    ) -> Result<(), AppointmentError> {
        self.ensure(self.state == FlowState::LookedUp, "request_mutation")?;

        let appointment_ids = self.resolve_target(&target)?;
        for appointment_id in &appointment_ids {
            let record = self.record(appointment_id)?;
            if !record.is_booked() {
                return Err(AppointmentError::NotBooked {
                    appointment_id: record.id.clone(),
                    status: record.booking_status,
                });
            }
            if kind == MutationKind::Reschedule && record.pending_slot.is_none() {
                return Err(AppointmentError::MissingPendingSlot(record.id.clone()));
            }
        }

        self.transition(FlowState::MutationRequested)?;
        self.mutation = Some(ActiveMutation {
            kind,
            appointment_ids,
            is_group: matches!(target, MutationTarget::Group),
        });

        match self.issue_otp(kind, OtpSendMode::New).await {
            Ok(message) => {
                self.transition(FlowState::OtpPending)?;
                self.notice = Some(FlowNotice::persistent(NoticeKind::Success, message));
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                warn!("Flow {} could not issue OTP: {}", self.id, message);
                self.abort()?;
                self.show_otp_error(message);
                Err(e)
            }
        }
    }

    /// One keystroke on an OTP cell. Editing after a rejection re-arms the
    /// challenge for another attempt.
    pub fn press_otp_key(&mut self, index: usize, key: OtpKey) -> Result<bool, AppointmentError> {
        self.ensure(self.accepts_otp_entry(), "press_otp_key")?;
        let applied = self.otp_input.apply(index, key);
        if applied {
            self.rearm_after_rejection()?;
        }
        Ok(applied)
    }

    /// Replace the whole code, as on paste.
    pub fn enter_otp(&mut self, code: &str) -> Result<(), AppointmentError> {
        self.ensure(self.accepts_otp_entry(), "enter_otp")?;
        self.otp_input.fill(code);
        self.rearm_after_rejection()
    }

    pub async fn verify_entered_otp(&mut self) -> Result<(), AppointmentError> {
        let code = self.otp_input.code();
        self.verify_otp(&code).await
    }

    pub async fn verify_otp(&mut self, code: &str) -> Result<(), AppointmentError> {
        self.ensure(self.accepts_otp_entry(), "verify_otp")?;
        self.validator.validate_otp(code)?;
        if self.otp_input.code() != code {
            self.otp_input.fill(code);
        }
        self.rearm_after_rejection()?;

        let (kind, first) = self.mutation_head()?;
        let request = ValidateOtpRequest {
            phone_number: first.contact_number.clone(),
            applicant_number: first.applicant_number.clone(),
            otp: code.to_string(),
            otp_type: kind.otp_type().to_string(),
        };

        let rejection = match self.gateway.validate_otp(&request).await {
            Ok(response) if response.status == Some(true) => {
                self.transition(FlowState::OtpVerified)?;
                if let Some(challenge) = self.challenge.as_mut() {
                    challenge.attempt_state = OtpAttemptState::Verified;
                }
                if let Some(countdown) = self.countdown.as_mut() {
                    countdown.stop();
                }
                self.verified_code = Some(code.to_string());
                let message = response
                    .message
                    .unwrap_or_else(|| OTP_VERIFIED_MESSAGE.to_string());
                self.notice = Some(FlowNotice::persistent(NoticeKind::Success, message));
                info!("Flow {} verified OTP", self.id);
                return Ok(());
            }
            Ok(response) => response
                .message
                .unwrap_or_else(|| OTP_INVALID_MESSAGE.to_string()),
            Err(e) => {
                error!("Flow {} OTP validation error: {}", self.id, e);
                OTP_VALIDATION_FAILED_MESSAGE.to_string()
            }
        };

        warn!("Flow {} OTP rejected: {}", self.id, rejection);
        self.transition(FlowState::OtpRejected)?;
        if let Some(challenge) = self.challenge.as_mut() {
            challenge.attempt_state = OtpAttemptState::Failed;
        }
        self.show_otp_error(rejection.clone());
        Err(AppointmentError::OtpRejected(rejection))
    }

    /// Resend is gated by the countdown while the challenge is pending, and
    /// always available right after a rejected attempt.
    pub async fn resend_otp(&mut self) -> Result<(), AppointmentError> {
        self.ensure(self.accepts_otp_entry(), "resend_otp")?;
        if self.state == FlowState::OtpPending {
            if let Some(countdown) = self.countdown.as_ref().filter(|c| !c.is_elapsed()) {
                return Err(AppointmentError::ResendCooldown {
                    remaining_secs: countdown.remaining_secs(),
                });
            }
        }

        let (kind, _) = self.mutation_head()?;
        match self.issue_otp(kind, OtpSendMode::Resend).await {
            Ok(message) => {
                self.transition(FlowState::OtpPending)?;
                self.notice = Some(FlowNotice::persistent(NoticeKind::Success, message));
                Ok(())
            }
            Err(e) => {
                warn!("Flow {} could not resend OTP: {}", self.id, e);
                self.show_otp_error(e.to_string());
                Err(e)
            }
        }
    }

    // ==========================================================================
    // COMMIT
    // ==========================================================================

    /// Commit whichever mutation the flow is driving.
    pub async fn confirm(&mut self) -> Result<(), AppointmentError> {
        match self.mutation.as_ref().map(|m| m.kind) {
            Some(kind) => self.commit(kind).await,
            None => Err(AppointmentError::OperationNotAllowed {
                operation: "confirm",
                state: self.state,
            }),
        }
    }

    pub async fn confirm_reschedule(&mut self) -> Result<(), AppointmentError> {
        self.commit(MutationKind::Reschedule).await
    }

    pub async fn confirm_cancel(&mut self) -> Result<(), AppointmentError> {
        self.commit(MutationKind::Cancel).await
    }

    async fn commit(&mut self, kind: MutationKind) -> Result<(), AppointmentError> {
        let matches_kind = self.mutation.as_ref().map(|m| m.kind) == Some(kind);
        self.ensure(self.state == FlowState::OtpVerified && matches_kind, "confirm")?;

        let request = self.build_commit_request(kind)?;
        let outcome = self.gateway.commit_mutation(&request).await;

        let failure = match outcome {
            Ok(response) if response.is_success() => {
                let new_slots = self.apply_confirmed(kind);
                self.transition(FlowState::MutationConfirmed)?;
                let message = response.message.unwrap_or_else(|| match kind {
                    MutationKind::Cancel => "Your appointment has been cancelled successfully.".to_string(),
                    MutationKind::Reschedule => {
                        "Your appointment has been rescheduled successfully.".to_string()
                    }
                });
                self.notice = Some(FlowNotice::persistent(NoticeKind::Success, message));

                if kind == MutationKind::Reschedule {
                    self.finalize_reschedule(&new_slots).await;
                }

                self.challenge = None;
                self.countdown = None;
                self.verified_code = None;
                self.otp_input.clear();
                self.selection.clear();
                self.mutation = None;
                self.last_outcome = Some(kind);
                info!("Flow {} confirmed {}", self.id, kind);
                return Ok(());
            }
            Ok(response) => response.message.unwrap_or_else(|| match kind {
                MutationKind::Cancel => "Cancellation failed. Try again.".to_string(),
                MutationKind::Reschedule => "Reschedule failed. Try again.".to_string(),
            }),
            Err(e) => {
                error!("Flow {} commit error: {}", self.id, e);
                "Something went wrong. Please try again.".to_string()
            }
        };

        warn!("Flow {} {} failed: {}", self.id, kind, failure);
        self.transition(FlowState::MutationFailed)?;
        self.notice = Some(FlowNotice::persistent(NoticeKind::Error, failure.clone()));
        self.transition(FlowState::OtpVerified)?;
        Err(AppointmentError::MutationRejected(failure))
    }

    /// Abandon the mutation client-side. The server-side challenge is left to
    /// expire on its own.
    pub fn back(&mut self) -> Result<(), AppointmentError> {
        self.ensure(self.state.has_live_challenge(), "back")?;
        self.abort()?;
        self.notice = None;
        Ok(())
    }

    // ==========================================================================
    // DERIVED VIEW
    // ==========================================================================

    pub fn affordances(&self) -> FlowAffordances {
        let looked_up = self.state == FlowState::LookedUp;
        let selection_ready = self.is_group
            && !self.selection.is_empty()
            && self
                .selection
                .iter()
                .all(|id| self.records.iter().any(|r| &r.id == id && r.is_booked()));
        let otp_entry = self.accepts_otp_entry();

        FlowAffordances {
            can_lookup: self.state.accepts_lookup(),
            can_select: looked_up && self.is_group,
            can_mutate_selection: looked_up && selection_ready,
            can_verify: otp_entry && self.validator.is_valid_otp(&self.otp_input.code()),
            can_resend: match self.state {
                FlowState::OtpRejected => true,
                FlowState::OtpPending => self
                    .countdown
                    .as_ref()
                    .map(OtpCountdown::is_elapsed)
                    .unwrap_or(true),
                _ => false,
            },
            can_confirm: self.state == FlowState::OtpVerified,
            can_go_back: self.state.has_live_challenge(),
        }
    }

    pub fn view(&self) -> FlowView {
        let looked_up = self.state == FlowState::LookedUp;
        let now = Utc::now();

        FlowView {
            flow_id: self.id,
            state: self.state,
            is_group: self.is_group,
            records: self
                .records
                .iter()
                .map(|record| RecordView {
                    selected: self.selection.contains(&record.id),
                    can_reschedule: looked_up && record.is_booked(),
                    can_cancel: looked_up && record.is_booked(),
                    record: record.clone(),
                })
                .collect(),
            active_mutation: self.mutation.clone(),
            last_outcome: self.last_outcome,
            challenge: self.challenge.as_ref().map(|challenge| ChallengeView {
                id: challenge.id,
                purpose: challenge.purpose,
                target: mask_contact(&challenge.target),
                expires_at: challenge.expires_at,
                attempt_state: challenge.observed_state(now),
            }),
            otp_cells: self.otp_input.cells(),
            otp_focus: self.otp_input.focus(),
            countdown: self.countdown_display(),
            notice: self.visible_notice().map(NoticeView::from),
            affordances: self.affordances(),
        }
    }

    // ==========================================================================
    // INTERNALS
    // ==========================================================================

    fn ensure(&self, allowed: bool, operation: &'static str) -> Result<(), AppointmentError> {
        if allowed {
            Ok(())
        } else {
            warn!("Flow {} rejected '{}' in state {}", self.id, operation, self.state);
            Err(AppointmentError::OperationNotAllowed {
                operation,
                state: self.state,
            })
        }
    }

    fn transition(&mut self, to: FlowState) -> Result<(), AppointmentError> {
        self.lifecycle.validate_transition(self.state, to)?;
        info!("Flow {}: {} -> {}", self.id, self.state, to);
        self.state = to;
        Ok(())
    }

    fn accepts_otp_entry(&self) -> bool {
        matches!(self.state, FlowState::OtpPending | FlowState::OtpRejected)
    }

    fn rearm_after_rejection(&mut self) -> Result<(), AppointmentError> {
        if self.state == FlowState::OtpRejected {
            self.transition(FlowState::OtpPending)?;
        }
        Ok(())
    }

    fn record(&self, appointment_id: &str) -> Result<&AppointmentRecord, AppointmentError> {
        self.records
            .iter()
            .find(|record| record.id == appointment_id)
            .ok_or_else(|| AppointmentError::AppointmentNotFound(appointment_id.to_string()))
    }

    fn record_mut(&mut self, appointment_id: &str) -> Result<&mut AppointmentRecord, AppointmentError> {
        self.records
            .iter_mut()
            .find(|record| record.id == appointment_id)
            .ok_or_else(|| AppointmentError::AppointmentNotFound(appointment_id.to_string()))
    }

    fn resolve_target(&self, target: &MutationTarget) -> Result<Vec<String>, AppointmentError> {
        match target {
            MutationTarget::Single { appointment_id } => {
                Ok(vec![self.record(appointment_id)?.id.clone()])
            }
            MutationTarget::Group => {
                if !self.is_group {
                    return Err(AppointmentError::OperationNotAllowed {
                        operation: "group mutation",
                        state: self.state,
                    });
                }
                if self.selection.is_empty() {
                    return Err(AppointmentError::EmptySelection);
                }
                // lookup order, not selection order
                Ok(self
                    .records
                    .iter()
                    .filter(|record| self.selection.contains(&record.id))
                    .map(|record| record.id.clone())
                    .collect())
            }
        }
    }

    /// Kind of the active mutation and the record whose contact receives the
    /// OTP.
    fn mutation_head(&self) -> Result<(MutationKind, &AppointmentRecord), AppointmentError> {
        let mutation = self.mutation.as_ref().ok_or(AppointmentError::OperationNotAllowed {
            operation: "otp",
            state: self.state,
        })?;
        let first = mutation
            .appointment_ids
            .first()
            .ok_or(AppointmentError::EmptySelection)?;
        Ok((mutation.kind, self.record(first)?))
    }

    async fn issue_otp(&mut self, purpose: OtpPurpose, mode: OtpSendMode) -> Result<String, AppointmentError> {
        let (_, first) = self.mutation_head()?;
        let request = GenerateOtpRequest {
            applicant_number: first.applicant_number.clone(),
            contact_number: first.contact_number.clone(),
            otp_type: purpose.otp_type().to_string(),
            center_id: first.center_id.clone(),
            newtype: mode,
        };

        let response = self.gateway.generate_otp(&request).await?;
        if response.status == Some(false) {
            return Err(AppointmentError::ExternalServiceError(
                response
                    .message
                    .unwrap_or_else(|| "Unable to send OTP. Please try again.".to_string()),
            ));
        }

        let challenge = OtpChallenge::issue(
            purpose,
            &request.contact_number,
            self.settings.otp_lifetime_secs,
            Utc::now(),
        );
        info!(
            "Flow {} issued {} challenge {} ({:?})",
            self.id, purpose, challenge.id, mode
        );
        self.challenge = Some(challenge);
        self.countdown = Some(OtpCountdown::start(self.settings.otp_lifetime_secs));
        self.otp_input.clear();
        self.verified_code = None;

        Ok(response
            .message
            .unwrap_or_else(|| OTP_SENT_MESSAGE.to_string()))
    }

    fn show_otp_error(&mut self, message: String) {
        self.notice = Some(FlowNotice::transient(
            NoticeKind::Error,
            message,
            self.settings.otp_error_display,
        ));
    }

    fn build_commit_request(&self, kind: MutationKind) -> Result<CommitMutationRequest, AppointmentError> {
        let mutation = self.mutation.as_ref().ok_or(AppointmentError::OperationNotAllowed {
            operation: "confirm",
            state: self.state,
        })?;
        let otp = self.verified_code.clone().ok_or(AppointmentError::OperationNotAllowed {
            operation: "confirm",
            state: self.state,
        })?;
        let status_code = kind.resulting_status().code();

        let mut members = Vec::with_capacity(mutation.appointment_ids.len());
        for appointment_id in &mutation.appointment_ids {
            let record = self.record(appointment_id)?;
            let (date_booked, booked_time) = match (kind, &record.pending_slot) {
                (MutationKind::Reschedule, Some(slot)) => (slot.date_string(), slot.booked_time.clone()),
                (MutationKind::Reschedule, None) => {
                    return Err(AppointmentError::MissingPendingSlot(record.id.clone()))
                }
                (MutationKind::Cancel, _) => (record.date_booked.clone(), record.booked_time.clone()),
            };
            members.push(GroupMember {
                id: record.id.clone(),
                booked_time,
                date_booked,
                visa_number: record.visa_number.clone(),
                booking_status: status_code,
            });
        }

        let head = members.first().cloned().ok_or(AppointmentError::EmptySelection)?;
        let (appointment_type, groupdata) = if mutation.is_group {
            (Some("group".to_string()), members)
        } else {
            (None, Vec::new())
        };

        Ok(CommitMutationRequest {
            booked_time: head.booked_time,
            booking_status: status_code,
            date_booked: head.date_booked,
            id: head.id,
            visa_number: head.visa_number,
            otp,
            appointment_type,
            groupdata,
        })
    }

    /// Mirror the confirmed status on every affected record. The pending slot
    /// is consumed either way; only a reschedule moves the booking onto it.
    fn apply_confirmed(&mut self, kind: MutationKind) -> Vec<FinalizeSlot> {
        let ids = self
            .mutation
            .as_ref()
            .map(|m| m.appointment_ids.clone())
            .unwrap_or_default();
        let mut new_slots = Vec::new();

        for record in self.records.iter_mut().filter(|r| ids.contains(&r.id)) {
            record.booking_status = kind.resulting_status();
            let pending = record.pending_slot.take();
            if let (MutationKind::Reschedule, Some(slot)) = (kind, pending) {
                record.date_booked = slot.date_string();
                record.booked_time = slot.booked_time;
                new_slots.push(FinalizeSlot {
                    id: record.id.clone(),
                    applicant_number: record.applicant_number.clone(),
                    center_id: record.center_id.clone(),
                    date_booked: record.date_booked.clone(),
                    booked_time: record.booked_time.clone(),
                });
            }
        }

        new_slots
    }

    async fn finalize_reschedule(&mut self, slots: &[FinalizeSlot]) {
        if slots.is_empty() {
            return;
        }

        let problem = match self.gateway.finalize_reschedule(slots).await {
            Ok(response) if response.status != Some(false) => return,
            Ok(response) => response
                .message
                .unwrap_or_else(|| "applicant details were not updated".to_string()),
            Err(e) => e.to_string(),
        };

        warn!("Flow {} reschedule finalisation failed: {}", self.id, problem);
        self.notice = Some(FlowNotice::persistent(
            NoticeKind::Warning,
            format!("Appointment rescheduled, but {}", problem),
        ));
    }

    fn abort(&mut self) -> Result<(), AppointmentError> {
        self.transition(FlowState::MutationAborted)?;
        self.discard_mutation();
        for record in &mut self.records {
            record.pending_slot = None;
        }
        self.selection.clear();
        self.transition(FlowState::LookedUp)
    }

    fn discard_mutation(&mut self) {
        self.mutation = None;
        self.challenge = None;
        self.countdown = None;
        self.verified_code = None;
        self.otp_input.clear();
    }
}

fn mask_contact(contact: &str) -> String {
    let visible: String = contact
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    let hidden = contact.chars().count().saturating_sub(visible.chars().count());
    format!("{}{}", "*".repeat(hidden), visible)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowAffordances {
    pub can_lookup: bool,
    pub can_select: bool,
    pub can_mutate_selection: bool,
    pub can_verify: bool,
    pub can_resend: bool,
    pub can_confirm: bool,
    pub can_go_back: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordView {
    #[serde(flatten)]
    pub record: AppointmentRecord,
    pub selected: bool,
    pub can_reschedule: bool,
    pub can_cancel: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChallengeView {
    pub id: Uuid,
    pub purpose: OtpPurpose,
    pub target: String,
    pub expires_at: DateTime<Utc>,
    pub attempt_state: OtpAttemptState,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowView {
    pub flow_id: Uuid,
    pub state: FlowState,
    pub is_group: bool,
    pub records: Vec<RecordView>,
    pub active_mutation: Option<ActiveMutation>,
    pub last_outcome: Option<MutationKind>,
    pub challenge: Option<ChallengeView>,
    pub otp_cells: Vec<String>,
    pub otp_focus: usize,
    pub countdown: Option<String>,
    pub notice: Option<NoticeView>,
    pub affordances: FlowAffordances,
}
