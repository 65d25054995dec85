//! Silence watchdog.
//!
//! Holds at most one pending deadline. The owning actor polls [`SilenceWatchdog::expired`]
//! inside its `select!` loop and decides what an expiry means; the watchdog
//! itself only tracks time.

use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
pub struct SilenceWatchdog {
    period: Duration,
    deadline: Option<Instant>,
}

impl SilenceWatchdog {
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            deadline: None,
        }
    }

    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Drop any pending deadline and schedule a new one a full period out.
    pub fn reset(&mut self) {
        let deadline = Instant::now() + self.period;
        debug!(
            target: "rc.audio.watchdog",
            period_ms = self.period.as_millis() as u64,
            "Silence watchdog armed"
        );
        self.deadline = Some(deadline);
    }

    pub fn disarm(&mut self) {
        if self.deadline.take().is_some() {
            debug!(target: "rc.audio.watchdog", "Silence watchdog disarmed");
        }
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Resolves when the pending deadline passes. Never resolves while disarmed.
    ///
    /// Resolving does not clear the deadline; the caller must `reset` or
    /// `disarm` before polling again.
    pub async fn expired(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const PERIOD: Duration = Duration::from_secs(30);

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_starts_disarmed() {
        let watchdog = SilenceWatchdog::new(PERIOD);
        assert!(!watchdog.is_armed());

        let result = tokio::time::timeout(Duration::from_secs(3600), watchdog.expired()).await;
        assert!(result.is_err(), "disarmed watchdog must never expire");
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_expires_after_period() {
        let mut watchdog = SilenceWatchdog::new(PERIOD);
        watchdog.reset();

        let early = tokio::time::timeout(Duration::from_secs(29), watchdog.expired()).await;
        assert!(early.is_err());

        watchdog.expired().await;
        assert!(watchdog.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_reset_pushes_deadline_out() {
        let mut watchdog = SilenceWatchdog::new(PERIOD);
        watchdog.reset();
        let first = watchdog.deadline().unwrap();

        tokio::time::advance(Duration::from_secs(29)).await;
        watchdog.reset();
        let second = watchdog.deadline().unwrap();

        assert_eq!(second - first, Duration::from_secs(29));

        // 29s after the reset the watchdog is still quiet.
        let result = tokio::time::timeout(Duration::from_secs(29), watchdog.expired()).await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_disarm_clears_deadline() {
        let mut watchdog = SilenceWatchdog::new(PERIOD);
        watchdog.reset();
        watchdog.disarm();

        assert!(!watchdog.is_armed());
        assert!(watchdog.deadline().is_none());

        let result = tokio::time::timeout(Duration::from_secs(60), watchdog.expired()).await;
        assert!(result.is_err());
    }
}
