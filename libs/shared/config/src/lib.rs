use std::env;
use tracing::warn;

pub const DEFAULT_OTP_TIMER_DURATION_SECS: u64 = 300;
pub const DEFAULT_OTP_ERROR_DISPLAY_SECS: u64 = 5;
pub const DEFAULT_FLOW_IDLE_TIMEOUT_SECS: u64 = 1800;
pub const DEFAULT_CONFIRMED_FLOW_GRACE_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub appointment_service_url: String,
    pub appointment_service_token: Option<String>,
    pub application_id: String,
    pub otp_timer_duration_secs: u64,
    pub otp_error_display_secs: u64,
    pub flow_idle_timeout_secs: u64,
    pub confirmed_flow_grace_secs: u64,
    pub portal_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            appointment_service_url: env::var("APPOINTMENT_SERVICE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| {
                    warn!("APPOINTMENT_SERVICE_URL not set, using empty value");
                    String::new()
                }),
            appointment_service_token: env::var("APPOINTMENT_SERVICE_TOKEN")
                .ok()
                .filter(|token| !token.is_empty()),
            application_id: env::var("APPLICATION_ID")
                .unwrap_or_else(|_| "1".to_string()),
            otp_timer_duration_secs: parse_or_default(
                "OTP_TIMER_DURATION",
                DEFAULT_OTP_TIMER_DURATION_SECS,
            ),
            otp_error_display_secs: parse_or_default(
                "OTP_ERROR_DISPLAY_SECS",
                DEFAULT_OTP_ERROR_DISPLAY_SECS,
            ),
            flow_idle_timeout_secs: parse_or_default(
                "FLOW_IDLE_TIMEOUT_SECS",
                DEFAULT_FLOW_IDLE_TIMEOUT_SECS,
            ),
            confirmed_flow_grace_secs: parse_or_default(
                "CONFIRMED_FLOW_GRACE_SECS",
                DEFAULT_CONFIRMED_FLOW_GRACE_SECS,
            ),
            portal_port: parse_or_default("PORTAL_PORT", 3000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.appointment_service_url.is_empty()
    }
}

fn parse_or_default<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display + Copy,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            appointment_service_url: String::new(),
            appointment_service_token: None,
            application_id: "1".to_string(),
            otp_timer_duration_secs: DEFAULT_OTP_TIMER_DURATION_SECS,
            otp_error_display_secs: DEFAULT_OTP_ERROR_DISPLAY_SECS,
            flow_idle_timeout_secs: DEFAULT_FLOW_IDLE_TIMEOUT_SECS,
            confirmed_flow_grace_secs: DEFAULT_CONFIRMED_FLOW_GRACE_SECS,
            portal_port: 3000,
        }
    }
}
