//! Verification flow configuration, loadable from a TOML file.

use attesta_types::{AccountAddress, VerificationParams};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Operator-facing configuration for the verification flow.
///
/// Everything except the MTW implementation address has a sensible default,
/// so a minimal config file is one line.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Recognize the 8-digit short-code SMS format (full attestation
    /// messages always work).
    #[serde(default)]
    pub short_codes_enabled: bool,

    /// Implementation address used when deploying a fresh MTW.
    pub current_mtw_implementation: AccountAddress,

    /// Implementation addresses accepted during wallet validation. The
    /// current implementation is always included.
    #[serde(default)]
    pub allowed_mtw_implementations: Vec<AccountAddress>,

    /// Retry bounds and rate limits.
    #[serde(default)]
    pub params: VerificationParams,
}

impl VerificationConfig {
    pub fn new(current_mtw_implementation: AccountAddress) -> Self {
        Self {
            short_codes_enabled: false,
            allowed_mtw_implementations: vec![current_mtw_implementation.clone()],
            current_mtw_implementation,
            params: VerificationParams::defaults(),
        }
    }

    /// Load from a TOML file, normalizing the allowed-implementation list.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&text)?;
        if !config
            .allowed_mtw_implementations
            .contains(&config.current_mtw_implementation)
        {
            config
                .allowed_mtw_implementations
                .push(config.current_mtw_implementation.clone());
        }
        Ok(config)
    }
}
