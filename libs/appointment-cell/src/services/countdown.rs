// libs/appointment-cell/src/services/countdown.rs
use tokio::time::{Duration, Instant};

/// Render whole seconds as `MM:SS`.
pub fn format_mm_ss(total_secs: u64) -> String {
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}

/// Resend cooldown and visible timer for the live OTP challenge.
#[derive(Debug, Clone)]
pub struct OtpCountdown {
    started_at: Instant,
    duration: Duration,
    stopped: bool,
}

impl OtpCountdown {
    pub fn start(duration_secs: u64) -> Self {
        Self {
            started_at: Instant::now(),
            duration: Duration::from_secs(duration_secs),
            stopped: false,
        }
    }

    /// Whole seconds left; counts down one per elapsed second.
    pub fn remaining_secs(&self) -> u64 {
        self.duration
            .as_secs()
            .saturating_sub(self.started_at.elapsed().as_secs())
    }

    pub fn is_elapsed(&self) -> bool {
        self.remaining_secs() == 0
    }

    /// Hide the timer once the challenge is verified.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    /// Shown until stopped; an elapsed timer stays on screen at `00:00`.
    pub fn is_visible(&self) -> bool {
        !self.stopped
    }

    pub fn display(&self) -> Option<String> {
        self.is_visible().then(|| format_mm_ss(self.remaining_secs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_mm_ss() {
        assert_eq!(format_mm_ss(300), "05:00");
        assert_eq!(format_mm_ss(299), "04:59");
        assert_eq!(format_mm_ss(61), "01:01");
        assert_eq!(format_mm_ss(9), "00:09");
        assert_eq!(format_mm_ss(0), "00:00");
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_ticks_in_whole_seconds() {
        let countdown = OtpCountdown::start(300);
        assert_eq!(countdown.display().as_deref(), Some("05:00"));

        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(countdown.remaining_secs(), 299);
        assert_eq!(countdown.display().as_deref(), Some("04:59"));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(countdown.is_elapsed());
        assert_eq!(countdown.display().as_deref(), Some("00:00"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_countdown_is_hidden() {
        let mut countdown = OtpCountdown::start(300);
        countdown.stop();
        assert!(!countdown.is_visible());
        assert_eq!(countdown.display(), None);
        assert!(!countdown.is_elapsed());
    }
}
