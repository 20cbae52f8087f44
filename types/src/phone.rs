//! Phone-number types and phone-hash derivation.
//!
//! The on-chain identifier for a phone number is a hash of the E.164 number
//! together with a per-user secret pepper, so that the bare number never
//! appears on chain.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain separator for phone-hash derivation.
const PHONE_HASH_PREFIX: &str = "attesta://phone/";

/// A phone number in E.164 format (`+` followed by up to 15 digits).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct E164Number(String);

impl E164Number {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the number is plausibly E.164: leading `+`, 4–15 digits.
    pub fn is_valid(&self) -> bool {
        let digits = match self.0.strip_prefix('+') {
            Some(d) => d,
            None => return false,
        };
        (4..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
    }
}

impl fmt::Display for E164Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The per-user secret pepper mixed into the phone hash.
///
/// Distributed once per user by the pepper service (via relay quota); cached
/// locally afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pepper(String);

impl Pepper {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The privacy-preserving on-chain identifier for a phone number.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhoneHash(String);

impl PhoneHash {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything derived from the phone number for one verification session.
///
/// Immutable once computed; recomputed only if the phone number changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneHashDetails {
    pub e164_number: E164Number,
    pub phone_hash: PhoneHash,
    pub pepper: Pepper,
}

impl PhoneHashDetails {
    pub fn derive(e164_number: E164Number, pepper: Pepper) -> Self {
        let phone_hash = derive_phone_hash(&e164_number, &pepper);
        Self {
            e164_number,
            phone_hash,
            pepper,
        }
    }
}

/// Derive the on-chain phone identifier from a number and its pepper.
///
/// `blake2b-256(prefix ++ e164 ++ "::" ++ pepper)`, hex-encoded with a `0x`
/// prefix.
pub fn derive_phone_hash(e164_number: &E164Number, pepper: &Pepper) -> PhoneHash {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(PHONE_HASH_PREFIX.as_bytes());
    hasher.update(e164_number.as_str().as_bytes());
    hasher.update(b"::");
    hasher.update(pepper.as_str().as_bytes());
    let digest = hasher.finalize();
    PhoneHash(format!("0x{}", hex::encode(digest)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn e164_validation() {
        assert!(E164Number::new("+14155550123").is_valid());
        assert!(E164Number::new("+4930123456").is_valid());
        assert!(!E164Number::new("14155550123").is_valid());
        assert!(!E164Number::new("+1415555abc").is_valid());
        assert!(!E164Number::new("+12").is_valid());
    }

    #[test]
    fn derivation_is_deterministic() {
        let n = E164Number::new("+14155550123");
        let p = Pepper::new("pepper-1");
        assert_eq!(derive_phone_hash(&n, &p), derive_phone_hash(&n, &p));
    }

    #[test]
    fn pepper_changes_hash() {
        let n = E164Number::new("+14155550123");
        let a = derive_phone_hash(&n, &Pepper::new("pepper-1"));
        let b = derive_phone_hash(&n, &Pepper::new("pepper-2"));
        assert_ne!(a, b);
    }

    proptest! {
        #[test]
        fn hash_is_always_hex_encoded_32_bytes(num in "\\+[0-9]{4,15}", pep in "[a-zA-Z0-9]{1,32}") {
            let hash = derive_phone_hash(&E164Number::new(num), &Pepper::new(pep));
            prop_assert_eq!(hash.as_str().len(), 2 + 64);
            prop_assert!(hash.as_str().starts_with("0x"));
        }
    }
}
