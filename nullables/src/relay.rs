//! Nullable relay client — scriptable responses, recorded calls.

use attesta_clients::{CheckSessionResp, QuotaLeft, RelayClient, RelayError, StartSessionResp};
use attesta_types::{AccountAddress, E164Number, Pepper};
use std::collections::VecDeque;
use std::sync::Mutex;

/// A relay client that replays scripted results and records every call.
///
/// Each method pops from its own script queue; an empty queue yields a
/// deterministic success so happy-path tests need no setup.
#[derive(Default)]
pub struct NullRelayClient {
    check_service: Mutex<VecDeque<Result<(), RelayError>>>,
    start_session: Mutex<VecDeque<Result<StartSessionResp, RelayError>>>,
    check_session: Mutex<VecDeque<Result<CheckSessionResp, RelayError>>>,
    deploy_wallet: Mutex<VecDeque<Result<AccountAddress, RelayError>>>,
    get_pepper: Mutex<VecDeque<Result<Pepper, RelayError>>>,
    register: Mutex<VecDeque<Result<(), RelayError>>>,
    calls: Mutex<Vec<String>>,
}

impl NullRelayClient {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Scripting ────────────────────────────────────────────────────────

    pub fn script_check_service(&self, result: Result<(), RelayError>) {
        self.check_service.lock().unwrap().push_back(result);
    }

    pub fn script_start_session(&self, result: Result<StartSessionResp, RelayError>) {
        self.start_session.lock().unwrap().push_back(result);
    }

    pub fn script_check_session(&self, result: Result<CheckSessionResp, RelayError>) {
        self.check_session.lock().unwrap().push_back(result);
    }

    pub fn script_deploy_wallet(&self, result: Result<AccountAddress, RelayError>) {
        self.deploy_wallet.lock().unwrap().push_back(result);
    }

    pub fn script_get_pepper(&self, result: Result<Pepper, RelayError>) {
        self.get_pepper.lock().unwrap().push_back(result);
    }

    pub fn script_register(&self, result: Result<(), RelayError>) {
        self.register.lock().unwrap().push_back(result);
    }

    // ── Assertions ───────────────────────────────────────────────────────

    /// Every call made so far, in order, by method name.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls to a given method.
    pub fn call_count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| *c == method)
            .count()
    }

    fn record(&self, method: &str) {
        self.calls.lock().unwrap().push(method.to_string());
    }
}

/// Default response for an unscripted `check_session`: active session with
/// full quota and no wallet address.
fn default_check_session() -> CheckSessionResp {
    CheckSessionResp {
        quota_left: QuotaLeft {
            distributed_blinded_pepper: 1,
            request_subsidised_attestation: 10,
            submit_meta_transaction: 10,
        },
        meta_tx_wallet_address: None,
    }
}

impl RelayClient for NullRelayClient {
    async fn check_service(&self) -> Result<(), RelayError> {
        self.record("check_service");
        self.check_service
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn start_session(&self, _captcha_token: &str) -> Result<StartSessionResp, RelayError> {
        self.record("start_session");
        self.start_session
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(StartSessionResp {
                    token: "null-session-token".to_string(),
                    callback_url: Some("https://relay.null/callback".to_string()),
                })
            })
    }

    async fn check_session(&self) -> Result<CheckSessionResp, RelayError> {
        self.record("check_session");
        self.check_session
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(default_check_session()))
    }

    async fn deploy_wallet(
        &self,
        _implementation: &AccountAddress,
    ) -> Result<AccountAddress, RelayError> {
        self.record("deploy_wallet");
        self.deploy_wallet
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(AccountAddress::new(
                    "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
                ))
            })
    }

    async fn get_pepper(&self, _e164_number: &E164Number) -> Result<Pepper, RelayError> {
        self.record("get_pepper");
        self.get_pepper
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Pepper::new("null-pepper")))
    }

    async fn register_wallet_and_dek(
        &self,
        _mtw: &AccountAddress,
        _wallet: &AccountAddress,
    ) -> Result<(), RelayError> {
        self.record("register_wallet_and_dek");
        self.register.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}
