//! Relay (Komenci) client interface — session lifecycle, quota, and
//! gas-subsidized wallet deployment.

use attesta_types::{AccountAddress, E164Number, Pepper};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Response to a successful session start.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StartSessionResp {
    pub token: String,
    pub callback_url: Option<String>,
}

/// Remaining subsidized-operation quota on a session.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct QuotaLeft {
    /// Pepper lookups remaining.
    pub distributed_blinded_pepper: u32,
    /// Subsidized attestation requests remaining.
    pub request_subsidised_attestation: u32,
    /// Meta-transaction submissions remaining.
    pub submit_meta_transaction: u32,
}

/// Response to a session status check.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckSessionResp {
    pub quota_left: QuotaLeft,
    /// The MTW the relay knows for this session. Sometimes absent even for
    /// an active session; callers fall back to their locally cached address.
    pub meta_tx_wallet_address: Option<AccountAddress>,
}

/// Closed error taxonomy for relay calls.
///
/// Mirrors the failure classes the relay actually produces; retry policy is
/// decided by [`RelayError::is_transient`], exhaustively.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The relay explicitly reported itself down (distinct from a transport
    /// fault — the readiness loop backs off and retries on this one).
    #[error("relay service is down")]
    ServiceDown,

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("request rejected: {0}")]
    Request(String),

    #[error("resource not found")]
    NotFound,

    #[error("could not decode relay response: {0}")]
    ResponseDecode(String),

    #[error("relayed transaction timed out")]
    TxTimeout,

    #[error("relayed transaction reverted: {0}")]
    TxRevert(String),

    #[error("expected event not found in relayed transaction receipt")]
    TxEventNotFound,

    /// Captcha or session authentication rejected by the relay.
    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("login signature invalid")]
    LoginSignature,

    /// The relay handed back a wallet that is structurally unusable.
    #[error("relay returned an invalid wallet: {0}")]
    InvalidWallet(String),
}

impl RelayError {
    /// Whether a bounded retry is worthwhile. Everything else is fatal and
    /// must abort the calling component immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ServiceDown
            | Self::Network(_)
            | Self::Timeout
            | Self::Request(_)
            | Self::NotFound
            | Self::ResponseDecode(_)
            | Self::TxTimeout
            | Self::TxRevert(_)
            | Self::TxEventNotFound => true,
            Self::AuthenticationFailed | Self::LoginSignature | Self::InvalidWallet(_) => false,
        }
    }
}

/// The relay service (KomenciKit surface).
///
/// One instance per verification session, owned by the session manager —
/// never a process-global handle.
pub trait RelayClient {
    /// Liveness probe.
    async fn check_service(&self) -> Result<(), RelayError>;

    /// Start a new session with a solved captcha.
    async fn start_session(&self, captcha_token: &str) -> Result<StartSessionResp, RelayError>;

    /// Check quota and state of the current session.
    async fn check_session(&self) -> Result<CheckSessionResp, RelayError>;

    /// Deploy a meta-transaction wallet with the given implementation.
    async fn deploy_wallet(
        &self,
        implementation: &AccountAddress,
    ) -> Result<AccountAddress, RelayError>;

    /// Fetch the distributed blinded pepper for a phone number
    /// (quota-consuming).
    async fn get_pepper(&self, e164_number: &E164Number) -> Result<Pepper, RelayError>;

    /// Register the data encryption key and wallet address through the MTW.
    async fn register_wallet_and_dek(
        &self,
        mtw: &AccountAddress,
        wallet: &AccountAddress,
    ) -> Result<(), RelayError>;
}

impl<T: RelayClient> RelayClient for &T {
    async fn check_service(&self) -> Result<(), RelayError> {
        (**self).check_service().await
    }

    async fn start_session(&self, captcha_token: &str) -> Result<StartSessionResp, RelayError> {
        (**self).start_session(captcha_token).await
    }

    async fn check_session(&self) -> Result<CheckSessionResp, RelayError> {
        (**self).check_session().await
    }

    async fn deploy_wallet(
        &self,
        implementation: &AccountAddress,
    ) -> Result<AccountAddress, RelayError> {
        (**self).deploy_wallet(implementation).await
    }

    async fn get_pepper(&self, e164_number: &E164Number) -> Result<Pepper, RelayError> {
        (**self).get_pepper(e164_number).await
    }

    async fn register_wallet_and_dek(
        &self,
        mtw: &AccountAddress,
        wallet: &AccountAddress,
    ) -> Result<(), RelayError> {
        (**self).register_wallet_and_dek(mtw, wallet).await
    }
}
