//! External collaborator interfaces for the Attesta verification core.
//!
//! The core never talks to the chain, the relay service, or the OS SMS
//! retriever directly. Every external dependency is a trait defined here with
//! a closed error enum, so that:
//! - retry classification is an exhaustive `match`, never a type probe;
//! - tests swap in deterministic nullable implementations.
//!
//! Only the error *classification* (transient vs fatal) is meant to cross
//! component boundaries; raw transport detail stays inside the owning
//! component.

pub mod chain;
pub mod clock;
pub mod relay;
pub mod sms;
pub mod wallet;

pub use chain::{AttestationStat, ChainClient, ChainError};
pub use clock::{Clock, Sleeper, SystemClock, TokioSleeper};
pub use relay::{CheckSessionResp, QuotaLeft, RelayClient, RelayError, StartSessionResp};
pub use sms::SmsEvent;
pub use wallet::{WalletValidationError, WalletValidator};
