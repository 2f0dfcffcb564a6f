// libs/appointment-cell/src/services/gateway.rs
use async_trait::async_trait;
use tracing::{debug, error, info};

use shared_api_client::{ApiError, AppointmentServiceClient};
use shared_config::AppConfig;

use crate::models::{
    AppointmentError, CommitMutationRequest, FinalizeResponse, FinalizeSlot, GenerateOtpRequest,
    LookupRequest, LookupResponse, MutationResponse, OtpResponse, ValidateOtpRequest,
};

pub const APPOINTMENT_REPORT_PATH: &str = "/transaction/appointment-report";
pub const GENERATE_OTP_PATH: &str = "/notification/GenerateOTP";
pub const VALIDATE_OTP_PATH: &str = "/notification/validate-otp";
pub const APPOINTMENT_CANCEL_PATH: &str = "/transaction/appointment/cancel";
pub const APPLICANT_APPOINTMENT_DETAILS_PATH: &str = "/transaction/applicant-appointment/details";

/// The appointment service as seen by the lifecycle flow. Every method
/// returns the decoded payload; interpreting success flags is left to the
/// flow so server messages can be surfaced verbatim.
#[async_trait]
pub trait AppointmentGateway: Send + Sync {
    async fn lookup(&self, request: &LookupRequest) -> Result<LookupResponse, AppointmentError>;

    async fn generate_otp(&self, request: &GenerateOtpRequest) -> Result<OtpResponse, AppointmentError>;

    async fn validate_otp(&self, request: &ValidateOtpRequest) -> Result<OtpResponse, AppointmentError>;

    async fn commit_mutation(
        &self,
        request: &CommitMutationRequest,
    ) -> Result<MutationResponse, AppointmentError>;

    async fn finalize_reschedule(
        &self,
        slots: &[FinalizeSlot],
    ) -> Result<FinalizeResponse, AppointmentError>;
}

pub struct HttpAppointmentGateway {
    client: AppointmentServiceClient,
    application_id: String,
}

impl HttpAppointmentGateway {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: AppointmentServiceClient::new(config),
            application_id: config.application_id.clone(),
        }
    }
}

/// Keep the service's own message when it sent one.
fn map_service_error(context: &str, err: anyhow::Error) -> AppointmentError {
    error!("{} failed: {:#}", context, err);
    match err.downcast_ref::<ApiError>() {
        Some(api_error) if !api_error.message.is_empty() => {
            AppointmentError::ExternalServiceError(api_error.message.clone())
        }
        _ => AppointmentError::ExternalServiceError(format!("{} failed", context)),
    }
}

#[async_trait]
impl AppointmentGateway for HttpAppointmentGateway {
    async fn lookup(&self, request: &LookupRequest) -> Result<LookupResponse, AppointmentError> {
        debug!(
            "Looking up appointments by {} with {}",
            request.search_type.as_wire(),
            request.contact_type.as_wire()
        );

        let search_value = request.search_value.trim();
        let contact_value = request.contact_value.trim();
        let fields = [
            ("application", self.application_id.as_str()),
            ("getAppointment", "yes"),
            ("searchType", request.search_type.as_wire()),
            ("searchValue", search_value),
            ("contactType", request.contact_type.as_wire()),
            ("contactValue", contact_value),
        ];

        let response: LookupResponse = self
            .client
            .post_form(APPOINTMENT_REPORT_PATH, &fields)
            .await
            .map_err(|e| map_service_error("Appointment lookup", e))?;

        info!("Lookup returned {} record(s)", response.detail.len());
        Ok(response)
    }

    async fn generate_otp(&self, request: &GenerateOtpRequest) -> Result<OtpResponse, AppointmentError> {
        debug!("Requesting {} ({:?})", request.otp_type, request.newtype);

        self.client
            .post_json(GENERATE_OTP_PATH, request)
            .await
            .map_err(|e| map_service_error("OTP issuance", e))
    }

    async fn validate_otp(&self, request: &ValidateOtpRequest) -> Result<OtpResponse, AppointmentError> {
        debug!("Validating {} for applicant {}", request.otp_type, request.applicant_number);

        self.client
            .post_json(VALIDATE_OTP_PATH, request)
            .await
            .map_err(|e| map_service_error("OTP validation", e))
    }

    async fn commit_mutation(
        &self,
        request: &CommitMutationRequest,
    ) -> Result<MutationResponse, AppointmentError> {
        debug!(
            "Committing booking_status={} for appointment {} ({} group member(s))",
            request.booking_status,
            request.id,
            request.groupdata.len()
        );

        self.client
            .post_json(APPOINTMENT_CANCEL_PATH, request)
            .await
            .map_err(|e| map_service_error("Appointment update", e))
    }

    async fn finalize_reschedule(
        &self,
        slots: &[FinalizeSlot],
    ) -> Result<FinalizeResponse, AppointmentError> {
        debug!("Finalising {} rescheduled slot(s)", slots.len());

        self.client
            .post_json(APPLICANT_APPOINTMENT_DETAILS_PATH, slots)
            .await
            .map_err(|e| map_service_error("Reschedule finalisation", e))
    }
}
