//! Account address type with `0x` prefix.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An on-chain account address: `0x` followed by 40 hex characters.
///
/// Used for both externally-owned accounts (the signer wallet) and
/// meta-transaction wallet contracts.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountAddress(String);

impl AccountAddress {
    /// The standard prefix for all account addresses.
    pub const PREFIX: &'static str = "0x";

    /// Create a new account address from a raw string.
    ///
    /// The address is stored lowercased so that comparisons are
    /// checksum-insensitive.
    ///
    /// # Panics
    /// Panics if the string does not start with `0x`.
    pub fn new(raw: impl Into<String>) -> Self {
        let s = raw.into().to_lowercase();
        assert!(s.starts_with(Self::PREFIX), "address must start with 0x");
        Self(s)
    }

    /// Return the raw address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validate that this address is well-formed.
    pub fn is_valid(&self) -> bool {
        self.0.len() == 42
            && self.0.starts_with(Self::PREFIX)
            && self.0[2..].chars().all(|c| c.is_ascii_hexdigit())
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AccountAddress {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_on_construction() {
        let a = AccountAddress::new("0xABCDEF0123456789abcdef0123456789ABCDEF01");
        let b = AccountAddress::new("0xabcdef0123456789abcdef0123456789abcdef01");
        assert_eq!(a, b);
        assert!(a.is_valid());
    }

    #[test]
    fn short_address_is_invalid() {
        assert!(!AccountAddress::new("0x1234").is_valid());
    }

    #[test]
    #[should_panic]
    fn missing_prefix_panics() {
        AccountAddress::new("abcdef");
    }
}
