//! Fundamental types for the Attesta verification core.
//!
//! This crate defines the core types shared across every other crate in the
//! workspace: account addresses, phone-number types and phone-hash derivation,
//! timestamps, and protocol parameters.

pub mod address;
pub mod params;
pub mod phone;
pub mod time;

pub use address::AccountAddress;
pub use params::{VerificationParams, NUM_ATTESTATIONS_REQUIRED};
pub use phone::{derive_phone_hash, E164Number, Pepper, PhoneHash, PhoneHashDetails};
pub use time::Timestamp;
