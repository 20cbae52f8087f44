//! Attestation code intake — extraction, normalization, and pre-validation
//! of raw code strings before they reach the ledger.
//!
//! Two wire formats exist:
//! - **short code**: an 8-digit security code embedded in the SMS body,
//!   used when `short_codes_enabled` is set;
//! - **full message**: `attesta://wallet/v/[<issuer>/]<payload>` where the
//!   payload is the base64url-encoded attestation code.
//!
//! The validator is pure: it returns a decision, the orchestrator applies it.

use attesta_types::AccountAddress;

use crate::ledger::AttestationCode;

/// Case-folded, whitespace-free form used as the dedupe key. Never
/// submitted anywhere: the payload is base64url and case-sensitive, so the
/// verbatim extraction is what goes on chain.
pub fn normalize_code(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// Extract an 8-digit security code from a message body.
///
/// The code is the first maximal run of exactly 8 ASCII digits.
pub fn extract_security_code_with_prefix(message: &str) -> Option<String> {
    let bytes = message.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i - start == 8 {
                return Some(message[start..i].to_string());
            }
        } else {
            i += 1;
        }
    }
    None
}

/// Extract the code payload (and embedded issuer, if present) from a full
/// attestation message.
pub fn extract_attestation_code_from_message(
    message: &str,
) -> Option<(Option<AccountAddress>, String)> {
    const PREFIX: &str = "attesta://wallet/v/";
    let start = message.find(PREFIX)? + PREFIX.len();
    let rest: &str = message[start..]
        .split(char::is_whitespace)
        .next()
        .filter(|s| !s.is_empty())?;

    match rest.split_once('/') {
        Some((issuer, payload)) if issuer.starts_with("0x") && !payload.is_empty() => {
            Some((Some(AccountAddress::new(issuer)), payload.to_string()))
        }
        _ => Some((None, rest.to_string())),
    }
}

/// Outcome of validating one raw input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IntakeDecision {
    /// A well-formed, previously unseen code.
    Ok(AttestationCode),
    /// Normalizes to a code already recorded.
    Duplicate,
    /// Neither wire format matched.
    Unrecognized,
}

/// Validates incoming code strings against the recorded set.
#[derive(Clone, Copy, Debug)]
pub struct CodeIntakeValidator {
    short_codes_enabled: bool,
}

impl CodeIntakeValidator {
    pub fn new(short_codes_enabled: bool) -> Self {
        Self {
            short_codes_enabled,
        }
    }

    /// Validate a raw input against previously recorded codes.
    ///
    /// With short codes enabled the 8-digit extractor is tried first, with
    /// the full-message format as fallback; otherwise only the full format
    /// is recognized.
    pub fn validate(&self, raw: &str, existing: &[AttestationCode]) -> IntakeDecision {
        let (short_code, issuer, payload) = if self.short_codes_enabled {
            match extract_security_code_with_prefix(raw) {
                Some(code) => (Some(code.clone()), None, code),
                None => match extract_attestation_code_from_message(raw) {
                    Some((issuer, payload)) => (None, issuer, payload),
                    None => return IntakeDecision::Unrecognized,
                },
            }
        } else {
            match extract_attestation_code_from_message(raw) {
                Some((issuer, payload)) => (None, issuer, payload),
                None => return IntakeDecision::Unrecognized,
            }
        };

        let key = normalize_code(&payload);
        if existing
            .iter()
            .any(|c| normalize_code(&c.payload) == key)
        {
            return IntakeDecision::Duplicate;
        }

        IntakeDecision::Ok(AttestationCode {
            raw_message: raw.to_string(),
            short_code,
            issuer,
            payload,
        })
    }
}
