//! Injectable time sources.
//!
//! Rate limits, the error-quota window, and backoff delays all read time and
//! sleep through these traits so tests can drive them deterministically.

use attesta_types::Timestamp;
use std::time::Duration;

/// Source of "now".
pub trait Clock {
    fn now(&self) -> Timestamp;
}

/// Asynchronous delay between retry attempts.
pub trait Sleeper {
    async fn sleep(&self, duration: Duration);
}

impl<T: Clock> Clock for &T {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

impl<T: Sleeper> Sleeper for &T {
    async fn sleep(&self, duration: Duration) {
        (**self).sleep(duration).await
    }
}

/// The real system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Sleeps on the tokio timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
