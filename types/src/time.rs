//! Epoch-seconds timestamps.
//!
//! Rate limits and the error quota window are measured in whole seconds.
//! All arithmetic saturates, so a clock stepped backwards never underflows.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch (UTC).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    pub fn new(secs: u64) -> Self {
        Self(secs)
    }

    /// Current system time, clamped to zero should the system clock read
    /// earlier than 1970.
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// Seconds elapsed from this timestamp to `now`; zero when `now` lies
    /// before it.
    pub fn elapsed_since(&self, now: Timestamp) -> u64 {
        now.0.saturating_sub(self.0)
    }

    /// Whether strictly more than `window_secs` have passed since this
    /// timestamp. At exactly the boundary the window has not elapsed, so a
    /// rate-limited action is still blocked.
    pub fn window_elapsed(&self, window_secs: u64, now: Timestamp) -> bool {
        self.elapsed_since(now) > window_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_saturates_at_zero() {
        let t = Timestamp::new(100);
        assert_eq!(t.elapsed_since(Timestamp::new(160)), 60);
        assert_eq!(t.elapsed_since(Timestamp::new(50)), 0);
    }

    #[test]
    fn window_boundary_is_still_inside() {
        let t = Timestamp::new(100);
        assert!(!t.window_elapsed(60, Timestamp::new(159)));
        assert!(!t.window_elapsed(60, Timestamp::new(160)));
        assert!(t.window_elapsed(60, Timestamp::new(161)));
    }
}
