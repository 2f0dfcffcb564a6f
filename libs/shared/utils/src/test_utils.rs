use std::sync::Arc;

use serde_json::{json, Value};

use shared_config::AppConfig;

pub const TEST_REFERENCE: &str = "AP1002";
pub const TEST_MOBILE: &str = "9876543210";
pub const TEST_OTP: &str = "123456";

pub struct TestConfig {
    pub appointment_service_url: String,
    pub application_id: String,
    pub otp_timer_duration_secs: u64,
    pub otp_error_display_secs: u64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            appointment_service_url: "http://localhost:8000".to_string(),
            application_id: "1".to_string(),
            otp_timer_duration_secs: 300,
            otp_error_display_secs: 5,
        }
    }
}

impl TestConfig {
    /// Point the config at a mock appointment service.
    pub fn with_service_url(url: impl Into<String>) -> Self {
        Self {
            appointment_service_url: url.into(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            appointment_service_url: self.appointment_service_url.clone(),
            appointment_service_token: None,
            application_id: self.application_id.clone(),
            otp_timer_duration_secs: self.otp_timer_duration_secs,
            otp_error_display_secs: self.otp_error_display_secs,
            portal_port: 0,
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

/// Canned payloads in the appointment service's wire format.
pub struct MockAppointmentResponses;

impl MockAppointmentResponses {
    pub fn appointment(id: u64, applicant_number: &str, booking_status: &str) -> Value {
        json!({
            "id": id,
            "reappoint_code": null,
            "applicant_number": applicant_number,
            "passport_number": "N1234567",
            "patient_name": "Test Applicant",
            "contact_number": TEST_MOBILE,
            "email": "applicant@example.com",
            "date_booked": "2026-11-02",
            "booked_time": "09:30",
            "booking_status": booking_status,
            "service__name": "Visa Medical",
            "center_id": 7,
            "visa_number": format!("V-{}", id)
        })
    }

    pub fn lookup_single(id: u64, applicant_number: &str) -> Value {
        json!({
            "message": "success",
            "detail": [Self::appointment(id, applicant_number, "1")],
            "RegistrationType": "individual"
        })
    }

    pub fn lookup_group(members: &[(u64, &str)]) -> Value {
        let detail: Vec<Value> = members
            .iter()
            .map(|(id, applicant)| Self::appointment(*id, applicant, "1"))
            .collect();
        json!({
            "message": "success",
            "detail": detail,
            "RegistrationType": "group"
        })
    }

    pub fn lookup_miss() -> Value {
        json!({
            "message": "No appointment found for the given details.",
            "detail": "Not found"
        })
    }

    pub fn otp_sent() -> Value {
        json!({ "message": "OTP sent successfully", "status": true })
    }

    pub fn otp_validated() -> Value {
        json!({ "message": "OTP verified", "status": true })
    }

    pub fn otp_rejected() -> Value {
        json!({ "message": "Invalid OTP", "status": false })
    }

    pub fn mutation_success() -> Value {
        json!({ "status": 1, "message": "Appointment updated successfully" })
    }

    pub fn mutation_failure(message: &str) -> Value {
        json!({ "status": 0, "message": message })
    }

    pub fn finalize_success() -> Value {
        json!({ "status": true, "data": [], "message": "Updated" })
    }

    pub fn error_response(message: &str) -> Value {
        json!({ "message": message })
    }
}
