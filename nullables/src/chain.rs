//! Nullable chain client — in-memory attestation contract state.

use attesta_clients::{AttestationStat, ChainClient, ChainError};
use attesta_types::{AccountAddress, PhoneHash};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// A chain client backed by in-memory maps.
///
/// `request_attestations` raises `total` and `complete_attestation` raises
/// `completed` for the touched (identifier, account) pair, so end-to-end
/// tests observe the same stat progression a real chain would produce.
/// Failures are scripted per method and consumed in order.
#[derive(Default)]
pub struct NullChainClient {
    accounts: Mutex<HashMap<PhoneHash, Vec<AccountAddress>>>,
    stats: Mutex<HashMap<(PhoneHash, AccountAddress), AttestationStat>>,
    fail_stat: Mutex<VecDeque<ChainError>>,
    fail_request: Mutex<VecDeque<ChainError>>,
    fail_complete: Mutex<VecDeque<ChainError>>,
    fail_reveal: Mutex<VecDeque<ChainError>>,
    calls: Mutex<Vec<String>>,
    completed_codes: Mutex<Vec<String>>,
}

impl NullChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Scripting ────────────────────────────────────────────────────────

    /// Link an account to an identifier with the given stat.
    pub fn link_account(
        &self,
        identifier: &PhoneHash,
        account: &AccountAddress,
        stat: AttestationStat,
    ) {
        self.accounts
            .lock()
            .unwrap()
            .entry(identifier.clone())
            .or_default()
            .push(account.clone());
        self.stats
            .lock()
            .unwrap()
            .insert((identifier.clone(), account.clone()), stat);
    }

    pub fn fail_next_stat(&self, error: ChainError) {
        self.fail_stat.lock().unwrap().push_back(error);
    }

    pub fn fail_next_request(&self, error: ChainError) {
        self.fail_request.lock().unwrap().push_back(error);
    }

    pub fn fail_next_complete(&self, error: ChainError) {
        self.fail_complete.lock().unwrap().push_back(error);
    }

    pub fn fail_next_reveal(&self, error: ChainError) {
        self.fail_reveal.lock().unwrap().push_back(error);
    }

    // ── Assertions ───────────────────────────────────────────────────────

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| *c == method)
            .count()
    }

    pub fn stat_for(
        &self,
        identifier: &PhoneHash,
        account: &AccountAddress,
    ) -> Option<AttestationStat> {
        self.stats
            .lock()
            .unwrap()
            .get(&(identifier.clone(), account.clone()))
            .copied()
    }

    /// Code strings passed to `complete_attestation`, in submission order.
    pub fn completed_codes(&self) -> Vec<String> {
        self.completed_codes.lock().unwrap().clone()
    }

    fn record(&self, method: &str) {
        self.calls.lock().unwrap().push(method.to_string());
    }
}

impl ChainClient for NullChainClient {
    async fn lookup_accounts_for_identifier(
        &self,
        identifier: &PhoneHash,
    ) -> Result<Vec<AccountAddress>, ChainError> {
        self.record("lookup_accounts_for_identifier");
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .get(identifier)
            .cloned()
            .unwrap_or_default())
    }

    async fn attestation_stat(
        &self,
        identifier: &PhoneHash,
        account: &AccountAddress,
    ) -> Result<AttestationStat, ChainError> {
        self.record("attestation_stat");
        if let Some(err) = self.fail_stat.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(self
            .stats
            .lock()
            .unwrap()
            .get(&(identifier.clone(), account.clone()))
            .copied()
            .unwrap_or(AttestationStat {
                completed: 0,
                total: 0,
            }))
    }

    async fn request_attestations(
        &self,
        identifier: &PhoneHash,
        account: &AccountAddress,
        count: u32,
    ) -> Result<(), ChainError> {
        self.record("request_attestations");
        if let Some(err) = self.fail_request.lock().unwrap().pop_front() {
            return Err(err);
        }
        let mut stats = self.stats.lock().unwrap();
        let stat = stats
            .entry((identifier.clone(), account.clone()))
            .or_insert(AttestationStat {
                completed: 0,
                total: 0,
            });
        stat.total += count;
        Ok(())
    }

    async fn reveal_attestations(
        &self,
        _identifier: &PhoneHash,
        _account: &AccountAddress,
    ) -> Result<(), ChainError> {
        self.record("reveal_attestations");
        if let Some(err) = self.fail_reveal.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(())
    }

    async fn complete_attestation(
        &self,
        identifier: &PhoneHash,
        account: &AccountAddress,
        _issuer: Option<&AccountAddress>,
        code: &str,
    ) -> Result<(), ChainError> {
        self.record("complete_attestation");
        self.completed_codes.lock().unwrap().push(code.to_string());
        if let Some(err) = self.fail_complete.lock().unwrap().pop_front() {
            return Err(err);
        }
        let mut stats = self.stats.lock().unwrap();
        let stat = stats
            .entry((identifier.clone(), account.clone()))
            .or_insert(AttestationStat {
                completed: 0,
                total: 0,
            });
        stat.completed += 1;
        Ok(())
    }
}
