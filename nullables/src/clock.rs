//! Nullable clock and sleeper — deterministic time for testing.

use attesta_clients::{Clock, Sleeper};
use attesta_types::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A deterministic clock for testing.
///
/// Time only advances when you tell it to.
pub struct NullClock {
    current: AtomicU64,
}

impl NullClock {
    pub fn new(initial_secs: u64) -> Self {
        Self {
            current: AtomicU64::new(initial_secs),
        }
    }

    /// Advance time by a number of seconds.
    pub fn advance(&self, secs: u64) {
        self.current.fetch_add(secs, Ordering::SeqCst);
    }

    /// Set the time to a specific value.
    pub fn set(&self, secs: u64) {
        self.current.store(secs, Ordering::SeqCst);
    }
}

impl Clock for NullClock {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.current.load(Ordering::SeqCst))
    }
}

/// A sleeper that records requested delays instead of waiting.
#[derive(Default)]
pub struct NullSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl NullSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// All delays requested so far (for assertions).
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

impl Sleeper for NullSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}
