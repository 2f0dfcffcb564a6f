// libs/appointment-cell/src/services/validation.rs
use regex::Regex;
use tracing::debug;

use crate::models::{AppointmentError, ContactType, LookupRequest, SearchFieldErrors, SearchType};

const PASSPORT_PATTERN: &str = r"^[A-Z0-9]{6,12}$";
const MOBILE_PATTERN: &str = r"^[0-9]{10}$";
const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]{2,}$";
const OTP_PATTERN: &str = r"^[0-9]{6}$";

pub const OTP_LENGTH: usize = 6;

/// Client-side format checks run before any call reaches the service.
pub struct SearchValidator {
    passport: Regex,
    mobile: Regex,
    email: Regex,
    otp: Regex,
}

impl SearchValidator {
    pub fn new() -> Self {
        Self {
            passport: Regex::new(PASSPORT_PATTERN).expect("passport pattern compiles"),
            mobile: Regex::new(MOBILE_PATTERN).expect("mobile pattern compiles"),
            email: Regex::new(EMAIL_PATTERN).expect("email pattern compiles"),
            otp: Regex::new(OTP_PATTERN).expect("otp pattern compiles"),
        }
    }

    pub fn field_errors(&self, request: &LookupRequest) -> SearchFieldErrors {
        let mut errors = SearchFieldErrors::default();
        let search_value = request.search_value.trim();
        let contact_value = request.contact_value.trim();

        if search_value.is_empty() {
            errors.search_value = Some(format!("{} is required.", request.search_type.label()));
        } else if request.search_type == SearchType::Passport && !self.passport.is_match(search_value) {
            errors.search_value = Some("6-12 characters, uppercase letters/numbers only.".to_string());
        }

        if contact_value.is_empty() {
            errors.contact_value = Some(format!("{} is required.", request.contact_type.label()));
        } else {
            match request.contact_type {
                ContactType::Email if !self.email.is_match(contact_value) => {
                    errors.contact_value =
                        Some("Enter a valid email (e.g., name@example.com)".to_string());
                }
                ContactType::Mobile if !self.mobile.is_match(contact_value) => {
                    errors.contact_value = Some("Enter a valid 10-digit mobile number.".to_string());
                }
                _ => {}
            }
        }

        errors
    }

    pub fn validate_lookup(&self, request: &LookupRequest) -> Result<(), AppointmentError> {
        let errors = self.field_errors(request);
        if errors.is_empty() {
            return Ok(());
        }

        debug!("Lookup rejected by client-side validation: {}", errors);
        Err(AppointmentError::InvalidSearch(errors))
    }

    pub fn is_valid_otp(&self, code: &str) -> bool {
        self.otp.is_match(code)
    }

    pub fn validate_otp(&self, code: &str) -> Result<(), AppointmentError> {
        if self.is_valid_otp(code) {
            Ok(())
        } else {
            Err(AppointmentError::ValidationError(format!(
                "OTP must be exactly {} digits",
                OTP_LENGTH
            )))
        }
    }
}

impl Default for SearchValidator {
    fn default() -> Self {
        Self::new()
    }
}
