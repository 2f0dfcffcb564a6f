// libs/appointment-cell/src/services/testing.rs
use std::sync::Mutex;

use async_trait::async_trait;

use crate::models::{
    AppointmentError, AppointmentRecord, BookingStatus, CommitMutationRequest, FinalizeResponse,
    FinalizeSlot, GenerateOtpRequest, LookupRequest, LookupResponse, MutationResponse,
    OtpResponse, ValidateOtpRequest,
};
use crate::services::gateway::AppointmentGateway;

pub const VALID_CODE: &str = "123456";
pub const UNKNOWN_REFERENCE: &str = "AP0000";

pub fn booked_record(id: &str, applicant_number: &str) -> AppointmentRecord {
    AppointmentRecord {
        id: id.to_string(),
        reappoint_code: None,
        applicant_number: applicant_number.to_string(),
        passport_number: "N1234567".to_string(),
        patient_name: Some(format!("Applicant {}", applicant_number)),
        contact_number: "9876543210".to_string(),
        email: "applicant@example.com".to_string(),
        date_booked: "2026-11-02".to_string(),
        booked_time: "09:30".to_string(),
        booking_status: BookingStatus::Booked,
        service_name: Some("Visa Medical".to_string()),
        center_id: Some("7".to_string()),
        visa_number: Some(format!("V-{}", id)),
        pending_slot: None,
    }
}

/// In-process gateway answering from a fixed script and recording every
/// request it receives.
pub struct ScriptedGateway {
    pub records: Vec<AppointmentRecord>,
    pub registration_type: Option<String>,
    pub lookup_fails: bool,
    pub issue_fails: bool,
    pub commit_fails: bool,
    pub finalize_fails: bool,
    pub generated: Mutex<Vec<GenerateOtpRequest>>,
    pub validated: Mutex<Vec<ValidateOtpRequest>>,
    pub commits: Mutex<Vec<CommitMutationRequest>>,
    pub finalized: Mutex<Vec<Vec<FinalizeSlot>>>,
}

impl ScriptedGateway {
    pub fn with_records(records: Vec<AppointmentRecord>) -> Self {
        Self {
            records,
            registration_type: None,
            lookup_fails: false,
            issue_fails: false,
            commit_fails: false,
            finalize_fails: false,
            generated: Mutex::new(Vec::new()),
            validated: Mutex::new(Vec::new()),
            commits: Mutex::new(Vec::new()),
            finalized: Mutex::new(Vec::new()),
        }
    }

    pub fn single() -> Self {
        Self::with_records(vec![booked_record("101", "AP1002")])
    }

    pub fn group() -> Self {
        let mut gateway = Self::with_records(vec![
            booked_record("201", "AP2001"),
            booked_record("202", "AP2002"),
            booked_record("203", "AP2003"),
        ]);
        gateway.registration_type = Some("group".to_string());
        gateway
    }
}

#[async_trait]
impl AppointmentGateway for ScriptedGateway {
    async fn lookup(&self, request: &LookupRequest) -> Result<LookupResponse, AppointmentError> {
        if self.lookup_fails {
            return Err(AppointmentError::ExternalServiceError(
                "Appointment lookup failed".into(),
            ));
        }
        let detail = if request.search_value.trim() == UNKNOWN_REFERENCE {
            Vec::new()
        } else {
            self.records.clone()
        };

        Ok(LookupResponse {
            message: if detail.is_empty() { "No record found".into() } else { "success".into() },
            detail,
            registration_type: self.registration_type.clone(),
        })
    }

    async fn generate_otp(&self, request: &GenerateOtpRequest) -> Result<OtpResponse, AppointmentError> {
        self.generated.lock().unwrap().push(request.clone());
        if self.issue_fails {
            return Ok(OtpResponse {
                message: Some("OTP service unavailable".into()),
                status: Some(false),
            });
        }
        Ok(OtpResponse {
            message: Some("OTP sent".into()),
            status: Some(true),
        })
    }

    async fn validate_otp(&self, request: &ValidateOtpRequest) -> Result<OtpResponse, AppointmentError> {
        self.validated.lock().unwrap().push(request.clone());
        if request.otp == VALID_CODE {
            Ok(OtpResponse {
                message: Some("OTP verified".into()),
                status: Some(true),
            })
        } else {
            Ok(OtpResponse {
                message: Some("Invalid OTP".into()),
                status: Some(false),
            })
        }
    }

    async fn commit_mutation(
        &self,
        request: &CommitMutationRequest,
    ) -> Result<MutationResponse, AppointmentError> {
        self.commits.lock().unwrap().push(request.clone());
        if self.commit_fails {
            return Ok(MutationResponse {
                status: Some(0),
                message: Some("Slot no longer available".into()),
            });
        }
        Ok(MutationResponse {
            status: Some(1),
            message: None,
        })
    }

    async fn finalize_reschedule(
        &self,
        slots: &[FinalizeSlot],
    ) -> Result<FinalizeResponse, AppointmentError> {
        self.finalized.lock().unwrap().push(slots.to_vec());
        if self.finalize_fails {
            return Err(AppointmentError::ExternalServiceError(
                "Reschedule finalisation failed".into(),
            ));
        }
        Ok(FinalizeResponse {
            status: Some(true),
            data: Vec::new(),
            message: None,
        })
    }
}
