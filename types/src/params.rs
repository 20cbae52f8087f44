//! Protocol parameters for the verification flow.
//!
//! Fixed protocol constants live here; operator-tunable knobs (circuit
//! breaker window, backoff base) live in the verification config and default
//! to the values below.

use serde::{Deserialize, Serialize};

/// Number of completed attestations required for a phone number to count as
/// verified.
pub const NUM_ATTESTATIONS_REQUIRED: u32 = 3;

/// Parameters governing retry bounds and rate limits in the verification flow.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerificationParams {
    /// Attestations required for full verification.
    pub num_attestations_required: u32,

    /// Maximum relay liveness probes before giving up.
    pub readiness_retries: u32,

    /// Maximum meta-transaction wallet deploy attempts for transient failures.
    pub deploy_retries: u32,

    /// Base delay for exponential backoff between readiness probes, in
    /// seconds. Attempt `i` sleeps `backoff_base_secs * 2^i`.
    pub backoff_base_secs: u64,

    /// Minimum seconds between attestation message resend requests.
    pub reveal_timeout_secs: u64,

    /// Rolling window for the relay error-quota circuit breaker, in seconds.
    pub error_quota_window_secs: u64,

    /// Relay errors tolerated within the window; the breaker trips once the
    /// count exceeds this.
    pub error_quota_threshold: usize,
}

impl VerificationParams {
    /// The defaults used in production.
    pub fn defaults() -> Self {
        Self {
            num_attestations_required: NUM_ATTESTATIONS_REQUIRED,
            readiness_retries: 3,
            deploy_retries: 3,
            backoff_base_secs: 5,
            reveal_timeout_secs: 60,
            error_quota_window_secs: 1800,
            error_quota_threshold: 3,
        }
    }
}

impl Default for VerificationParams {
    fn default() -> Self {
        Self::defaults()
    }
}
