//! Leading-edge throttle for change-feed driven resyncs.

use std::time::Duration;
use tokio::time::Instant;

/// Lets the first event of a burst through and drops the rest of the window.
#[derive(Debug)]
pub struct ResyncThrottle {
    window: Duration,
    last_fired: Option<Instant>,
}

impl ResyncThrottle {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_fired: None,
        }
    }

    /// Returns true if a resync may run at `now`, and starts a new window if so.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        match self.last_fired {
            Some(last) if now.saturating_duration_since(last) < self.window => false,
            _ => {
                self.last_fired = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(3000);

    #[test]
    fn test_first_event_passes() {
        let mut throttle = ResyncThrottle::new(WINDOW);
        assert!(throttle.try_acquire(Instant::now()));
    }

    #[test]
    fn test_burst_inside_window_is_dropped() {
        let mut throttle = ResyncThrottle::new(WINDOW);
        let start = Instant::now();

        assert!(throttle.try_acquire(start));
        assert!(!throttle.try_acquire(start + Duration::from_millis(10)));
        assert!(!throttle.try_acquire(start + Duration::from_millis(2999)));
    }

    #[test]
    fn test_window_reopens_after_elapsed() {
        let mut throttle = ResyncThrottle::new(WINDOW);
        let start = Instant::now();

        assert!(throttle.try_acquire(start));
        assert!(throttle.try_acquire(start + WINDOW));
        // Dropped events do not extend the window.
        assert!(!throttle.try_acquire(start + WINDOW + Duration::from_millis(1)));
        assert!(throttle.try_acquire(start + WINDOW * 2));
    }
}
