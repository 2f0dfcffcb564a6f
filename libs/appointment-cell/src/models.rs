// libs/appointment-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use uuid::Uuid;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

/// Server-authoritative lifecycle tag of an appointment. The service sends the
/// numeric code, sometimes as a string ("1"), sometimes as a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BookingStatus {
    Booked,
    Cancelled,
    Rescheduled,
    Completed,
}

impl BookingStatus {
    pub fn code(self) -> u8 {
        match self {
            BookingStatus::Booked => 1,
            BookingStatus::Cancelled => 2,
            BookingStatus::Rescheduled => 3,
            BookingStatus::Completed => 4,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            1 => Some(BookingStatus::Booked),
            2 => Some(BookingStatus::Cancelled),
            3 => Some(BookingStatus::Rescheduled),
            4 => Some(BookingStatus::Completed),
            _ => None,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "booked" => Some(BookingStatus::Booked),
            "cancelled" | "canceled" => Some(BookingStatus::Cancelled),
            "rescheduled" => Some(BookingStatus::Rescheduled),
            "completed" => Some(BookingStatus::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingStatus::Booked => write!(f, "booked"),
            BookingStatus::Cancelled => write!(f, "cancelled"),
            BookingStatus::Rescheduled => write!(f, "rescheduled"),
            BookingStatus::Completed => write!(f, "completed"),
        }
    }
}

impl Serialize for BookingStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BookingStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        let parsed = match &raw {
            Value::Number(n) => n.as_u64().and_then(BookingStatus::from_code),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<u64>()
                    .ok()
                    .and_then(BookingStatus::from_code)
                    .or_else(|| BookingStatus::from_name(s))
            }
            _ => None,
        };
        parsed.ok_or_else(|| de::Error::custom(format!("unknown booking status: {}", raw)))
    }
}

/// Replacement date/time chosen for a reschedule, held until the OTP-gated
/// commit succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSlot {
    pub date_booked: NaiveDate,
    pub booked_time: String,
}

impl PendingSlot {
    pub fn date_string(&self) -> String {
        self.date_booked.format("%Y-%m-%d").to_string()
    }
}

/// Read-only projection of one appointment as returned by the lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentRecord {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub reappoint_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub applicant_number: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub passport_number: String,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub patient_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub contact_number: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub date_booked: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub booked_time: String,
    pub booking_status: BookingStatus,
    #[serde(rename = "service__name", default, deserialize_with = "lenient_opt_string")]
    pub service_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub center_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub visa_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_slot: Option<PendingSlot>,
}

impl AppointmentRecord {
    pub fn is_booked(&self) -> bool {
        self.booking_status == BookingStatus::Booked
    }
}

// ==============================================================================
// LOOKUP MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchType {
    ReferenceId,
    HapId,
    Passport,
    ApplicantNumber,
}

impl SearchType {
    pub fn as_wire(self) -> &'static str {
        match self {
            SearchType::ReferenceId => "referenceId",
            SearchType::HapId => "hapId",
            SearchType::Passport => "passport",
            SearchType::ApplicantNumber => "applicantNumber",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SearchType::ReferenceId => "Reference ID",
            SearchType::HapId => "HAP ID",
            SearchType::Passport => "Passport Number",
            SearchType::ApplicantNumber => "Applicant Number",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContactType {
    Mobile,
    Email,
}

impl ContactType {
    pub fn as_wire(self) -> &'static str {
        match self {
            ContactType::Mobile => "mobile",
            ContactType::Email => "email",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ContactType::Mobile => "Mobile Number",
            ContactType::Email => "Email ID",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupRequest {
    pub search_type: SearchType,
    pub search_value: String,
    pub contact_type: ContactType,
    pub contact_value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LookupResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default, deserialize_with = "detail_records")]
    pub detail: Vec<AppointmentRecord>,
    #[serde(rename = "RegistrationType", default, deserialize_with = "lenient_opt_string")]
    pub registration_type: Option<String>,
}

impl LookupResponse {
    pub fn is_success(&self) -> bool {
        self.message.eq_ignore_ascii_case("success")
    }

    pub fn is_group(&self) -> bool {
        let declared_group = self
            .registration_type
            .as_deref()
            .map(|kind| kind.eq_ignore_ascii_case("group"))
            .unwrap_or(false);
        declared_group || self.detail.len() > 1
    }
}

/// Per-field messages for the search form, shown inline before any call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFieldErrors {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_value: Option<String>,
}

impl SearchFieldErrors {
    pub fn is_empty(&self) -> bool {
        self.search_value.is_none() && self.contact_value.is_none()
    }
}

impl fmt::Display for SearchFieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = [self.search_value.as_deref(), self.contact_value.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

// ==============================================================================
// MUTATION & OTP MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Reschedule,
    Cancel,
}

impl MutationKind {
    pub fn otp_type(self) -> &'static str {
        match self {
            MutationKind::Reschedule => "RescheduleOTP",
            MutationKind::Cancel => "CancelOTP",
        }
    }

    pub fn resulting_status(self) -> BookingStatus {
        match self {
            MutationKind::Reschedule => BookingStatus::Rescheduled,
            MutationKind::Cancel => BookingStatus::Cancelled,
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationKind::Reschedule => write!(f, "reschedule"),
            MutationKind::Cancel => write!(f, "cancel"),
        }
    }
}

/// What an OTP challenge authorises.
pub type OtpPurpose = MutationKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum MutationTarget {
    Single { appointment_id: String },
    Group,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpAttemptState {
    NotSent,
    Sent,
    Verified,
    Failed,
    Expired,
}

#[derive(Debug, Clone, Serialize)]
pub struct OtpChallenge {
    pub id: Uuid,
    pub purpose: OtpPurpose,
    pub target: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub attempt_state: OtpAttemptState,
}

impl OtpChallenge {
    pub fn issue(purpose: OtpPurpose, target: &str, lifetime_secs: u64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            purpose,
            target: target.to_string(),
            issued_at: now,
            expires_at: now + chrono::Duration::seconds(lifetime_secs as i64),
            attempt_state: OtpAttemptState::Sent,
        }
    }

    /// Attempt state as seen at `now`. Expiry is only reported, the server
    /// still decides at verification time.
    pub fn observed_state(&self, now: DateTime<Utc>) -> OtpAttemptState {
        match self.attempt_state {
            OtpAttemptState::Sent | OtpAttemptState::Failed if now >= self.expires_at => {
                OtpAttemptState::Expired
            }
            state => state,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpSendMode {
    New,
    Resend,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateOtpRequest {
    pub applicant_number: String,
    pub contact_number: String,
    pub otp_type: String,
    pub center_id: Option<String>,
    pub newtype: OtpSendMode,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidateOtpRequest {
    pub phone_number: String,
    pub applicant_number: String,
    pub otp: String,
    pub otp_type: String,
}

/// Answer of both OTP endpoints. `status` is a bool on validation and is
/// sometimes omitted on issuance.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OtpResponse {
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_flag")]
    pub status: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupMember {
    pub id: String,
    pub booked_time: String,
    pub date_booked: String,
    pub visa_number: Option<String>,
    pub booking_status: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitMutationRequest {
    pub booked_time: String,
    pub booking_status: u8,
    pub date_booked: String,
    pub id: String,
    pub visa_number: Option<String>,
    pub otp: String,
    #[serde(rename = "appointmentType", skip_serializing_if = "Option::is_none")]
    pub appointment_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub groupdata: Vec<GroupMember>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MutationResponse {
    #[serde(default, deserialize_with = "lenient_opt_code")]
    pub status: Option<i64>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub message: Option<String>,
}

impl MutationResponse {
    pub fn is_success(&self) -> bool {
        self.status == Some(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalizeSlot {
    pub id: String,
    pub applicant_number: String,
    pub center_id: Option<String>,
    pub date_booked: String,
    pub booked_time: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FinalizeResponse {
    #[serde(default, deserialize_with = "lenient_opt_flag")]
    pub status: Option<bool>,
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub message: Option<String>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppointmentError {
    #[error("{0}")]
    InvalidSearch(SearchFieldErrors),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Operation '{operation}' is not allowed in state {state}")]
    OperationNotAllowed {
        operation: &'static str,
        state: crate::services::lifecycle::FlowState,
    },

    #[error("Invalid flow transition from {from} to {to}")]
    InvalidTransition {
        from: crate::services::lifecycle::FlowState,
        to: crate::services::lifecycle::FlowState,
    },

    #[error("Appointment {appointment_id} is {status}, only booked appointments can be changed")]
    NotBooked {
        appointment_id: String,
        status: BookingStatus,
    },

    #[error("Appointment not found: {0}")]
    AppointmentNotFound(String),

    #[error("Pick a new slot for appointment {0} before rescheduling")]
    MissingPendingSlot(String),

    #[error("Select at least one appointment")]
    EmptySelection,

    #[error("Resend is available in {remaining_secs} seconds")]
    ResendCooldown { remaining_secs: u64 },

    #[error("Another operation is already in progress for this flow")]
    OperationInFlight,

    #[error("Flow not found: {0}")]
    FlowNotFound(Uuid),

    #[error("{0}")]
    LookupFailed(String),

    #[error("{0}")]
    OtpRejected(String),

    #[error("{0}")]
    MutationRejected(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),
}

// ==============================================================================
// LENIENT WIRE DECODING
// ==============================================================================

fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(value_to_string(Value::deserialize(deserializer)?).unwrap_or_default())
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(value_to_string(Value::deserialize(deserializer)?).filter(|s| !s.trim().is_empty()))
}

fn lenient_opt_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    let flag = match Value::deserialize(deserializer)? {
        Value::Bool(b) => Some(b),
        Value::Number(n) => Some(n.as_i64() == Some(1)),
        Value::String(s) => {
            let s = s.trim().to_ascii_lowercase();
            Some(matches!(s.as_str(), "true" | "1" | "success"))
        }
        _ => None,
    };
    Ok(flag)
}

fn lenient_opt_code<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    let code = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(true) => Some(1),
        _ => None,
    };
    Ok(code)
}

/// `detail` is an array of records on a hit and an arbitrary object on a miss.
fn detail_records<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<AppointmentRecord>, D::Error> {
    match Value::deserialize(deserializer)? {
        array @ Value::Array(_) => serde_json::from_value(array).map_err(de::Error::custom),
        _ => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_booking_status_accepts_codes_and_names() {
        let from_string: BookingStatus = serde_json::from_value(json!("1")).unwrap();
        let from_number: BookingStatus = serde_json::from_value(json!(3)).unwrap();
        let from_name: BookingStatus = serde_json::from_value(json!("cancelled")).unwrap();

        assert_eq!(from_string, BookingStatus::Booked);
        assert_eq!(from_number, BookingStatus::Rescheduled);
        assert_eq!(from_name, BookingStatus::Cancelled);
        assert!(serde_json::from_value::<BookingStatus>(json!("9")).is_err());
    }

    #[test]
    fn test_record_decodes_mixed_wire_types() {
        let record: AppointmentRecord = serde_json::from_value(json!({
            "id": 42,
            "applicant_number": "AP1002",
            "passport_number": "N1234567",
            "contact_number": 9876543210u64,
            "email": "applicant@example.com",
            "date_booked": "2025-07-01",
            "booked_time": "10:30 AM",
            "booking_status": "1",
            "service__name": "Visa Medical",
            "center_id": 7,
            "visa_number": null
        }))
        .unwrap();

        assert_eq!(record.id, "42");
        assert_eq!(record.contact_number, "9876543210");
        assert_eq!(record.center_id.as_deref(), Some("7"));
        assert_eq!(record.visa_number, None);
        assert_eq!(record.service_name.as_deref(), Some("Visa Medical"));
        assert!(record.is_booked());
        assert!(record.pending_slot.is_none());
    }

    #[test]
    fn test_lookup_response_miss_has_no_records() {
        let response: LookupResponse = serde_json::from_value(json!({
            "message": "No appointment found",
            "detail": { "legend": 0 }
        }))
        .unwrap();

        assert!(!response.is_success());
        assert!(response.detail.is_empty());
    }

    #[test]
    fn test_lookup_response_group_detection() {
        let response: LookupResponse = serde_json::from_value(json!({
            "message": "success",
            "RegistrationType": "Group",
            "detail": [{ "id": "1", "booking_status": 1 }]
        }))
        .unwrap();

        assert!(response.is_success());
        assert!(response.is_group());
    }

    #[test]
    fn test_commit_request_omits_group_fields_for_single() {
        let request = CommitMutationRequest {
            booked_time: "10:30 AM".into(),
            booking_status: BookingStatus::Cancelled.code(),
            date_booked: "2025-07-01".into(),
            id: "42".into(),
            visa_number: None,
            otp: "123456".into(),
            appointment_type: None,
            groupdata: Vec::new(),
        };

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["booking_status"], 2);
        assert!(body.get("groupdata").is_none());
        assert!(body.get("appointmentType").is_none());
    }

    #[test]
    fn test_mutation_response_success_code() {
        let ok: MutationResponse = serde_json::from_value(json!({"status": 1})).unwrap();
        let ok_str: MutationResponse = serde_json::from_value(json!({"status": "1"})).unwrap();
        let failed: MutationResponse =
            serde_json::from_value(json!({"status": 0, "message": "Slot taken"})).unwrap();

        assert!(ok.is_success());
        assert!(ok_str.is_success());
        assert!(!failed.is_success());
        assert_eq!(failed.message.as_deref(), Some("Slot taken"));
    }

    #[test]
    fn test_challenge_reports_expiry_without_changing_state() {
        let now = Utc::now();
        let challenge = OtpChallenge::issue(MutationKind::Cancel, "9876543210", 300, now);

        assert_eq!(challenge.observed_state(now), OtpAttemptState::Sent);
        assert_eq!(
            challenge.observed_state(now + chrono::Duration::seconds(301)),
            OtpAttemptState::Expired
        );
        assert_eq!(challenge.attempt_state, OtpAttemptState::Sent);
    }
}
