//! Phone-number attestation verification core.
//!
//! Coordinates the end-to-end "Komenci-assisted" verification flow:
//! 1. **Phone hash derivation** — privacy-preserving identifier from the
//!    E.164 number plus a per-user pepper.
//! 2. **Relay session acquisition** — readiness checks, session
//!    start/resume, quota tracking, error-quota circuit breaker.
//! 3. **Meta-transaction wallet resolution** — discover or deploy the MTW,
//!    validate its implementation, short-circuit if already verified.
//! 4. **Attestation request and code collection** — request attestations,
//!    collect SMS / manually entered codes, submit completion proofs.
//!
//! External collaborators (chain, relay, wallet validation, SMS retrieval)
//! enter through the traits in `attesta-clients`; the orchestrator emits
//! status events for the host UI to drain.

pub mod cancel;
pub mod config;
pub mod error;
pub mod intake;
pub mod ledger;
pub mod orchestrator;
pub mod resolver;
pub mod session;
pub mod status;

pub use cancel::CancellationToken;
pub use config::{ConfigError, VerificationConfig};
pub use error::VerificationError;
pub use intake::{CodeIntakeValidator, IntakeDecision};
pub use ledger::{AttestationCode, AttestationLedger, CodeInputStatus, CodeInputType, LedgerError};
pub use orchestrator::{
    FlowState, VerificationEvent, VerificationOrchestrator, VerificationSnapshot,
};
pub use resolver::{MetaTxWalletResolver, Resolution, ResolverError};
pub use session::{KomenciAvailable, KomenciContext, KomenciSessionManager, SessionError, SessionState};
pub use status::VerificationStatus;
