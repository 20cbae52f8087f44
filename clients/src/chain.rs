//! Chain client interface — attestation contract reads and calls.

use attesta_types::{AccountAddress, PhoneHash};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// On-chain attestation statistics for one (identifier, account) pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationStat {
    /// Attestations completed (proofs accepted on chain).
    pub completed: u32,
    /// Attestations requested in total.
    pub total: u32,
}

impl AttestationStat {
    /// Whether this account counts as verified for the identifier.
    pub fn is_verified(&self, required: u32) -> bool {
        self.completed >= required
    }
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("transaction reverted: {0}")]
    TxRevert(String),

    #[error("contract call failed: {0}")]
    Contract(String),
}

impl ChainError {
    /// Whether a retry within the owning component's bound is worthwhile.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout | Self::TxRevert(_) => true,
            Self::Contract(_) => false,
        }
    }
}

/// Read and write access to the attestations contract.
///
/// Mutating calls (`request_attestations`, `reveal_attestations`,
/// `complete_attestation`) are submitted on behalf of `account` — a
/// meta-transaction wallet when the relay session is in use, otherwise the
/// externally-owned account.
pub trait ChainClient {
    /// All accounts linked on-chain to the given phone identifier.
    async fn lookup_accounts_for_identifier(
        &self,
        identifier: &PhoneHash,
    ) -> Result<Vec<AccountAddress>, ChainError>;

    /// Attestation statistics for one linked account.
    async fn attestation_stat(
        &self,
        identifier: &PhoneHash,
        account: &AccountAddress,
    ) -> Result<AttestationStat, ChainError>;

    /// Request `count` additional attestations for the identifier.
    async fn request_attestations(
        &self,
        identifier: &PhoneHash,
        account: &AccountAddress,
        count: u32,
    ) -> Result<(), ChainError>;

    /// Ask the issuers of all unrevealed attestations to (re)send their
    /// SMS messages.
    async fn reveal_attestations(
        &self,
        identifier: &PhoneHash,
        account: &AccountAddress,
    ) -> Result<(), ChainError>;

    /// Submit an attestation completion proof for a received code.
    async fn complete_attestation(
        &self,
        identifier: &PhoneHash,
        account: &AccountAddress,
        issuer: Option<&AccountAddress>,
        code: &str,
    ) -> Result<(), ChainError>;
}

impl<T: ChainClient> ChainClient for &T {
    async fn lookup_accounts_for_identifier(
        &self,
        identifier: &PhoneHash,
    ) -> Result<Vec<AccountAddress>, ChainError> {
        (**self).lookup_accounts_for_identifier(identifier).await
    }

    async fn attestation_stat(
        &self,
        identifier: &PhoneHash,
        account: &AccountAddress,
    ) -> Result<AttestationStat, ChainError> {
        (**self).attestation_stat(identifier, account).await
    }

    async fn request_attestations(
        &self,
        identifier: &PhoneHash,
        account: &AccountAddress,
        count: u32,
    ) -> Result<(), ChainError> {
        (**self).request_attestations(identifier, account, count).await
    }

    async fn reveal_attestations(
        &self,
        identifier: &PhoneHash,
        account: &AccountAddress,
    ) -> Result<(), ChainError> {
        (**self).reveal_attestations(identifier, account).await
    }

    async fn complete_attestation(
        &self,
        identifier: &PhoneHash,
        account: &AccountAddress,
        issuer: Option<&AccountAddress>,
        code: &str,
    ) -> Result<(), ChainError> {
        (**self)
            .complete_attestation(identifier, account, issuer, code)
            .await
    }
}
