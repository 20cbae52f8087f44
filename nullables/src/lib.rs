//! Nullable infrastructure for deterministic testing.
//!
//! All external dependencies (clock, delays, chain, relay, wallet validation)
//! are abstracted behind traits in `attesta-clients`. This crate provides
//! test-friendly implementations that:
//! - Return deterministic values
//! - Can be scripted programmatically (queue failures, preload chain state)
//! - Record every call for assertions, and never touch time or network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod chain;
pub mod clock;
pub mod relay;
pub mod wallet;

pub use chain::NullChainClient;
pub use clock::{NullClock, NullSleeper};
pub use relay::NullRelayClient;
pub use wallet::{InvalidReason, NullWalletValidator};
