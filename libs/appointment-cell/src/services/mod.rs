pub mod countdown;
pub mod flow;
pub mod gateway;
pub mod lifecycle;
pub mod notice;
pub mod otp_input;
pub mod session;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

pub use countdown::{format_mm_ss, OtpCountdown};
pub use flow::{AppointmentFlow, FlowAffordances, FlowSettings, FlowSnapshot, FlowView};
pub use gateway::{AppointmentGateway, HttpAppointmentGateway};
pub use lifecycle::{FlowLifecycleService, FlowState};
pub use notice::{FlowNotice, NoticeKind};
pub use otp_input::{OtpInput, OtpKey};
pub use session::FlowRegistry;
pub use validation::SearchValidator;
