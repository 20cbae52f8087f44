//! Top-level error type for the verification flow.

use attesta_clients::{ChainError, RelayError, WalletValidationError};
use thiserror::Error;

use crate::ledger::LedgerError;
use crate::resolver::ResolverError;
use crate::session::SessionError;

/// Everything that can abort a verification attempt.
///
/// Component errors keep their own taxonomies; this enum only adds the
/// failures that belong to the orchestrator itself.
#[derive(Debug, Error)]
pub enum VerificationError {
    /// Readiness probing gave up: the relay is down, not erroring.
    #[error("relay service unavailable")]
    RelayUnavailable,

    /// The pepper for the phone number could not be obtained, so no
    /// identifier can be derived.
    #[error("could not obtain phone number pepper: {0}")]
    PepperUnavailable(#[source] RelayError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Resolver(#[from] ResolverError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error(transparent)]
    Validation(#[from] WalletValidationError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
