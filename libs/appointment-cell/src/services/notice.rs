// libs/appointment-cell/src/services/notice.rs
use serde::Serialize;
use tokio::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Success,
    Warning,
    Error,
}

/// User-visible message attached to a flow. Notices with a display window
/// disappear on their own once it passes; the rest stay until replaced.
#[derive(Debug, Clone)]
pub struct FlowNotice {
    pub kind: NoticeKind,
    pub message: String,
    shown_at: Instant,
    display_window: Option<Duration>,
}

impl FlowNotice {
    pub fn persistent(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            shown_at: Instant::now(),
            display_window: None,
        }
    }

    pub fn transient(kind: NoticeKind, message: impl Into<String>, display_window: Duration) -> Self {
        Self {
            kind,
            message: message.into(),
            shown_at: Instant::now(),
            display_window: Some(display_window),
        }
    }

    pub fn is_visible(&self) -> bool {
        match self.display_window {
            Some(window) => self.shown_at.elapsed() < window,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NoticeView {
    pub kind: NoticeKind,
    pub message: String,
}

impl From<&FlowNotice> for NoticeView {
    fn from(notice: &FlowNotice) -> Self {
        Self {
            kind: notice.kind,
            message: notice.message.clone(),
        }
    }
}
