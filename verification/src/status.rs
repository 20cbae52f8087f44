//! On-chain verification status, derived from attestation statistics.

use attesta_clients::AttestationStat;
use serde::{Deserialize, Serialize};

/// Snapshot of how far along verification is, recomputed after every
/// accepted code and after wallet resolution. Read-only to consumers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationStatus {
    pub is_verified: bool,
    pub num_attestations_remaining: u32,
    pub completed: u32,
    pub total: u32,
}

impl VerificationStatus {
    /// Status before anything has been observed on chain.
    pub fn unknown(required: u32) -> Self {
        Self {
            is_verified: false,
            num_attestations_remaining: required,
            completed: 0,
            total: 0,
        }
    }

    /// Derive from a chain stat given the protocol's required count.
    pub fn from_stat(stat: AttestationStat, required: u32) -> Self {
        Self {
            is_verified: stat.completed >= required,
            num_attestations_remaining: required.saturating_sub(stat.completed),
            completed: stat.completed,
            total: stat.total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_from_stat() {
        let s = VerificationStatus::from_stat(
            AttestationStat {
                completed: 2,
                total: 3,
            },
            3,
        );
        assert!(!s.is_verified);
        assert_eq!(s.num_attestations_remaining, 1);

        let s = VerificationStatus::from_stat(
            AttestationStat {
                completed: 3,
                total: 3,
            },
            3,
        );
        assert!(s.is_verified);
        assert_eq!(s.num_attestations_remaining, 0);
    }
}
