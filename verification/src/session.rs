//! Komenci relay session lifecycle — readiness probes, session
//! start/resume, quota tracking, and the error-quota circuit breaker.
//!
//! Session state machine:
//! `NoSession -> Starting -> Active -> (Exhausted | Expired) -> NoSession`.
//! Transitions happen only on explicit checks, never on timers.
//!
//! The manager exclusively owns the [`KomenciContext`]; the resolver writes
//! the MTW address through [`KomenciSessionManager::relay_and_context_mut`].

use attesta_clients::{Clock, RelayClient, RelayError, Sleeper};
use attesta_types::{AccountAddress, E164Number, Timestamp, VerificationParams};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Whether the relay can currently be used for a gas-subsidized flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KomenciAvailable {
    Unknown,
    Yes,
    No,
}

/// Relay session lifecycle states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    NoSession,
    Starting,
    Active,
    /// Session exists but its quota is spent; a new one is needed.
    Exhausted,
    /// Remote no longer recognizes the session.
    Expired,
}

/// Mutable relay-session state for one account.
///
/// One context per active account session — never shared across accounts.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct KomenciContext {
    pub session_token: String,
    pub callback_url: String,
    pub session_active: bool,
    pub captcha_token: String,
    /// MTW deployed (or recovered) for this session, not yet verified.
    pub unverified_mtw_address: Option<AccountAddress>,
    /// Append-only ring of relay error timestamps; entries older than the
    /// breaker window are pruned lazily on insert.
    pub error_timestamps: Vec<Timestamp>,
}

impl KomenciContext {
    /// Record a relay error at `now`, pruning entries outside the window.
    pub fn record_error(&mut self, now: Timestamp, window_secs: u64) {
        self.error_timestamps
            .retain(|t| t.elapsed_since(now) <= window_secs);
        self.error_timestamps.push(now);
    }

    /// Number of recorded errors within the rolling window ending at `now`.
    pub fn errors_in_window(&self, now: Timestamp, window_secs: u64) -> usize {
        self.error_timestamps
            .iter()
            .filter(|t| t.elapsed_since(now) <= window_secs)
            .count()
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// Circuit breaker tripped: too many relay errors inside the rolling
    /// window. Fatal — the flow must not keep hammering the relay.
    #[error("relay error quota exceeded")]
    ErrorQuotaExceeded,

    /// A session start was attempted without a captcha token. This is a
    /// caller contract violation, not a retryable condition.
    #[error("cannot start a relay session without a captcha token")]
    SessionInvalid,

    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl SessionError {
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::ErrorQuotaExceeded | Self::SessionInvalid => true,
            Self::Relay(e) => !e.is_transient(),
        }
    }
}

/// Owns the relay client and drives the session lifecycle.
pub struct KomenciSessionManager<R, C, S> {
    relay: R,
    clock: C,
    sleeper: S,
    params: VerificationParams,
    context: KomenciContext,
    state: SessionState,
}

impl<R: RelayClient, C: Clock, S: Sleeper> KomenciSessionManager<R, C, S> {
    pub fn new(relay: R, clock: C, sleeper: S, params: VerificationParams) -> Self {
        Self {
            relay,
            clock,
            sleeper,
            params,
            context: KomenciContext::default(),
            state: SessionState::NoSession,
        }
    }

    pub fn context(&self) -> &KomenciContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut KomenciContext {
        &mut self.context
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn relay(&self) -> &R {
        &self.relay
    }

    /// Split borrow for callers that drive the relay while updating the
    /// context (the wallet resolver).
    pub fn relay_and_context_mut(&mut self) -> (&R, &mut KomenciContext) {
        (&self.relay, &mut self.context)
    }

    /// Breaker trips when errors in the window exceed the threshold.
    fn quota_exceeded(&self) -> bool {
        self.context
            .errors_in_window(self.clock.now(), self.params.error_quota_window_secs)
            > self.params.error_quota_threshold
    }

    fn record_error(&mut self) {
        self.context
            .record_error(self.clock.now(), self.params.error_quota_window_secs);
    }

    /// Probe relay liveness with bounded retries and exponential backoff.
    ///
    /// Every failure feeds the error quota, and a tripped breaker fails
    /// fast before any further network call. Only an explicit service-down
    /// report is retried (delay `backoff_base_secs * 2^attempt`); any other
    /// failure surfaces immediately.
    pub async fn check_readiness(&mut self) -> Result<bool, SessionError> {
        if self.quota_exceeded() {
            return Err(SessionError::ErrorQuotaExceeded);
        }

        for attempt in 0..self.params.readiness_retries {
            match self.relay.check_service().await {
                Ok(()) => return Ok(true),
                Err(err) => {
                    self.record_error();
                    if self.quota_exceeded() {
                        return Err(SessionError::ErrorQuotaExceeded);
                    }
                    match err {
                        RelayError::ServiceDown => {
                            let delay = self.params.backoff_base_secs * (1 << attempt);
                            tracing::debug!(attempt, delay_secs = delay, "relay down, backing off");
                            self.sleeper.sleep(Duration::from_secs(delay)).await;
                        }
                        other => return Err(SessionError::Relay(other)),
                    }
                }
            }
        }

        tracing::warn!(
            retries = self.params.readiness_retries,
            "relay still down after readiness retries"
        );
        Ok(false)
    }

    /// Readiness probe folded into the UI-facing availability gate.
    pub async fn check_availability(&mut self) -> KomenciAvailable {
        match self.check_readiness().await {
            Ok(true) => KomenciAvailable::Yes,
            Ok(false) => KomenciAvailable::No,
            Err(err) => {
                tracing::debug!(%err, "relay unavailable");
                KomenciAvailable::No
            }
        }
    }

    /// Ensure a usable session, starting a new one if needed.
    ///
    /// An inactive or tokenless session requires a non-empty captcha token;
    /// calling without one is a contract violation and makes no network
    /// call.
    pub async fn start_or_resume_session(&mut self, captcha_token: &str) -> Result<(), SessionError> {
        if self.context.session_active && !self.context.session_token.is_empty() {
            tracing::debug!("resuming existing relay session");
            self.state = SessionState::Active;
            return Ok(());
        }

        if captcha_token.is_empty() {
            return Err(SessionError::SessionInvalid);
        }
        if self.quota_exceeded() {
            return Err(SessionError::ErrorQuotaExceeded);
        }

        self.context.captcha_token = captcha_token.to_string();
        self.state = SessionState::Starting;

        match self.relay.start_session(captcha_token).await {
            Ok(resp) => {
                self.context.session_token = resp.token;
                self.context.callback_url = resp.callback_url.unwrap_or_default();
                self.context.session_active = true;
                self.state = SessionState::Active;
                tracing::info!("relay session started");
                Ok(())
            }
            Err(err) => {
                self.record_error();
                self.state = SessionState::NoSession;
                Err(SessionError::Relay(err))
            }
        }
    }

    /// Query remote session quota and reconcile local state.
    ///
    /// A failed or quota-exhausted check is non-fatal: the session is just
    /// marked inactive so the next cycle starts a fresh one. Zero pepper
    /// quota only matters when no pepper is cached locally — the relay
    /// fetches each user's pepper once, so a cached pepper keeps the
    /// session usable.
    pub async fn fetch_session_state(
        &mut self,
        e164_number: &E164Number,
        pepper_cached: bool,
    ) -> (bool, Option<AccountAddress>) {
        tracing::debug!(number = %e164_number, "checking relay session state");

        match self.relay.check_session().await {
            Err(err) => {
                tracing::debug!(%err, "no active relay session");
                self.context.session_active = false;
                self.state = SessionState::Expired;
            }
            Ok(resp) => {
                // The relay sometimes omits the MTW for an active session;
                // keep the locally cached address in that case.
                if let Some(mtw) = resp.meta_tx_wallet_address {
                    self.context.unverified_mtw_address = Some(mtw);
                }

                let quota = resp.quota_left;
                let pepper_ok = pepper_cached || quota.distributed_blinded_pepper > 0;
                if !pepper_ok
                    || quota.request_subsidised_attestation == 0
                    || quota.submit_meta_transaction == 0
                {
                    tracing::debug!("relay session out of quota, will start a new one");
                    self.context.session_active = false;
                    self.state = SessionState::Exhausted;
                } else {
                    self.context.session_active = true;
                    self.state = SessionState::Active;
                }
            }
        }

        (
            self.context.session_active,
            self.context.unverified_mtw_address.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attesta_clients::{CheckSessionResp, QuotaLeft, StartSessionResp};
    use attesta_nullables::{NullClock, NullRelayClient, NullSleeper};

    fn addr(n: u8) -> AccountAddress {
        AccountAddress::new(format!("0x{:040x}", n))
    }

    fn manager<'a>(
        relay: &'a NullRelayClient,
        clock: &'a NullClock,
        sleeper: &'a NullSleeper,
    ) -> KomenciSessionManager<&'a NullRelayClient, &'a NullClock, &'a NullSleeper> {
        KomenciSessionManager::new(relay, clock, sleeper, VerificationParams::defaults())
    }

    fn session_resp(pepper: u32, attest: u32, meta: u32) -> CheckSessionResp {
        CheckSessionResp {
            quota_left: QuotaLeft {
                distributed_blinded_pepper: pepper,
                request_subsidised_attestation: attest,
                submit_meta_transaction: meta,
            },
            meta_tx_wallet_address: None,
        }
    }

    // ── Readiness & backoff ─────────────────────────────────────────────

    #[tokio::test]
    async fn readiness_retries_service_down_with_backoff() {
        let relay = NullRelayClient::new();
        let clock = NullClock::new(1_000);
        let sleeper = NullSleeper::new();
        relay.script_check_service(Err(RelayError::ServiceDown));
        relay.script_check_service(Err(RelayError::ServiceDown));
        relay.script_check_service(Ok(()));

        let mut mgr = manager(&relay, &clock, &sleeper);
        assert!(mgr.check_readiness().await.unwrap());

        assert_eq!(relay.call_count("check_service"), 3);
        assert_eq!(
            sleeper.slept(),
            vec![Duration::from_secs(5), Duration::from_secs(10)]
        );
    }

    #[tokio::test]
    async fn readiness_gives_up_after_bounded_retries() {
        let relay = NullRelayClient::new();
        let clock = NullClock::new(1_000);
        let sleeper = NullSleeper::new();
        for _ in 0..3 {
            relay.script_check_service(Err(RelayError::ServiceDown));
        }

        let mut mgr = manager(&relay, &clock, &sleeper);
        assert!(!mgr.check_readiness().await.unwrap());

        assert_eq!(relay.call_count("check_service"), 3);
        assert_eq!(
            sleeper.slept(),
            vec![
                Duration::from_secs(5),
                Duration::from_secs(10),
                Duration::from_secs(20)
            ]
        );
    }

    #[tokio::test]
    async fn non_service_down_error_surfaces_immediately() {
        let relay = NullRelayClient::new();
        let clock = NullClock::new(1_000);
        let sleeper = NullSleeper::new();
        relay.script_check_service(Err(RelayError::Network("refused".into())));

        let mut mgr = manager(&relay, &clock, &sleeper);
        let err = mgr.check_readiness().await.unwrap_err();
        assert!(matches!(err, SessionError::Relay(RelayError::Network(_))));
        assert_eq!(relay.call_count("check_service"), 1);
        assert!(sleeper.slept().is_empty());
    }

    #[tokio::test]
    async fn availability_gate_folds_errors_into_no() {
        let relay = NullRelayClient::new();
        let clock = NullClock::new(1_000);
        let sleeper = NullSleeper::new();
        relay.script_check_service(Err(RelayError::Network("refused".into())));

        let mut mgr = manager(&relay, &clock, &sleeper);
        assert_eq!(mgr.check_availability().await, KomenciAvailable::No);

        let mut mgr = manager(&relay, &clock, &sleeper);
        assert_eq!(mgr.check_availability().await, KomenciAvailable::Yes);
    }

    // ── Circuit breaker ─────────────────────────────────────────────────

    #[tokio::test]
    async fn tripped_breaker_fails_fast_without_network_calls() {
        let relay = NullRelayClient::new();
        let clock = NullClock::new(10_000);
        let sleeper = NullSleeper::new();

        let mut mgr = manager(&relay, &clock, &sleeper);
        // threshold is 3: four recent errors is one beyond the quota
        for _ in 0..4 {
            mgr.context_mut().record_error(Timestamp::new(9_900), 1800);
        }

        let err = mgr.check_readiness().await.unwrap_err();
        assert!(matches!(err, SessionError::ErrorQuotaExceeded));
        assert_eq!(relay.call_count("check_service"), 0);

        let err = mgr.start_or_resume_session("captcha").await.unwrap_err();
        assert!(matches!(err, SessionError::ErrorQuotaExceeded));
        assert_eq!(relay.call_count("start_session"), 0);
    }

    #[tokio::test]
    async fn errors_outside_window_do_not_trip_breaker() {
        let relay = NullRelayClient::new();
        let clock = NullClock::new(10_000);
        let sleeper = NullSleeper::new();

        let mut mgr = manager(&relay, &clock, &sleeper);
        for _ in 0..5 {
            // 1800s window; these are well outside it at t=10_000
            mgr.context_mut().record_error(Timestamp::new(100), 1800);
        }

        assert!(mgr.check_readiness().await.unwrap());
        assert_eq!(relay.call_count("check_service"), 1);
    }

    // ── Session start/resume ────────────────────────────────────────────

    #[tokio::test]
    async fn empty_captcha_with_inactive_session_is_contract_violation() {
        let relay = NullRelayClient::new();
        let clock = NullClock::new(0);
        let sleeper = NullSleeper::new();

        let mut mgr = manager(&relay, &clock, &sleeper);
        let err = mgr.start_or_resume_session("").await.unwrap_err();
        assert!(matches!(err, SessionError::SessionInvalid));
        assert!(relay.calls().is_empty());
    }

    #[tokio::test]
    async fn starting_a_session_stores_token_and_activates() {
        let relay = NullRelayClient::new();
        let clock = NullClock::new(0);
        let sleeper = NullSleeper::new();
        relay.script_start_session(Ok(StartSessionResp {
            token: "tok-1".into(),
            callback_url: Some("https://relay/cb".into()),
        }));

        let mut mgr = manager(&relay, &clock, &sleeper);
        mgr.start_or_resume_session("captcha").await.unwrap();

        assert_eq!(mgr.state(), SessionState::Active);
        assert!(mgr.context().session_active);
        assert_eq!(mgr.context().session_token, "tok-1");
        assert_eq!(mgr.context().callback_url, "https://relay/cb");
    }

    #[tokio::test]
    async fn active_session_resumes_without_network_call() {
        let relay = NullRelayClient::new();
        let clock = NullClock::new(0);
        let sleeper = NullSleeper::new();

        let mut mgr = manager(&relay, &clock, &sleeper);
        mgr.context_mut().session_active = true;
        mgr.context_mut().session_token = "tok".into();

        mgr.start_or_resume_session("").await.unwrap();
        assert_eq!(mgr.state(), SessionState::Active);
        assert!(relay.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_session_start_records_error_and_resets_state() {
        let relay = NullRelayClient::new();
        let clock = NullClock::new(50);
        let sleeper = NullSleeper::new();
        relay.script_start_session(Err(RelayError::AuthenticationFailed));

        let mut mgr = manager(&relay, &clock, &sleeper);
        let err = mgr.start_or_resume_session("captcha").await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(mgr.state(), SessionState::NoSession);
        assert_eq!(mgr.context().error_timestamps.len(), 1);
    }

    // ── Session state fetch ─────────────────────────────────────────────

    #[tokio::test]
    async fn failed_check_marks_session_inactive_not_fatal() {
        let relay = NullRelayClient::new();
        let clock = NullClock::new(0);
        let sleeper = NullSleeper::new();
        relay.script_check_session(Err(RelayError::NotFound));

        let mut mgr = manager(&relay, &clock, &sleeper);
        mgr.context_mut().session_active = true;

        let (active, _) = mgr
            .fetch_session_state(&E164Number::new("+14155550123"), false)
            .await;
        assert!(!active);
        assert_eq!(mgr.state(), SessionState::Expired);
    }

    #[tokio::test]
    async fn zero_pepper_quota_without_cache_exhausts_session() {
        let relay = NullRelayClient::new();
        let clock = NullClock::new(0);
        let sleeper = NullSleeper::new();
        relay.script_check_session(Ok(session_resp(0, 5, 5)));

        let mut mgr = manager(&relay, &clock, &sleeper);
        let (active, _) = mgr
            .fetch_session_state(&E164Number::new("+14155550123"), false)
            .await;
        assert!(!active);
        assert_eq!(mgr.state(), SessionState::Exhausted);
    }

    #[tokio::test]
    async fn zero_pepper_quota_with_cached_pepper_keeps_session_usable() {
        let relay = NullRelayClient::new();
        let clock = NullClock::new(0);
        let sleeper = NullSleeper::new();
        relay.script_check_session(Ok(session_resp(0, 5, 5)));

        let mut mgr = manager(&relay, &clock, &sleeper);
        let (active, _) = mgr
            .fetch_session_state(&E164Number::new("+14155550123"), true)
            .await;
        assert!(active);
        assert_eq!(mgr.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn remote_mtw_address_supersedes_local_cache() {
        let relay = NullRelayClient::new();
        let clock = NullClock::new(0);
        let sleeper = NullSleeper::new();
        relay.script_check_session(Ok(CheckSessionResp {
            quota_left: QuotaLeft {
                distributed_blinded_pepper: 1,
                request_subsidised_attestation: 1,
                submit_meta_transaction: 1,
            },
            meta_tx_wallet_address: Some(addr(2)),
        }));

        let mut mgr = manager(&relay, &clock, &sleeper);
        mgr.context_mut().unverified_mtw_address = Some(addr(1));

        let (_, mtw) = mgr
            .fetch_session_state(&E164Number::new("+14155550123"), true)
            .await;
        assert_eq!(mtw, Some(addr(2)));
    }

    #[tokio::test]
    async fn absent_remote_mtw_keeps_local_cache() {
        let relay = NullRelayClient::new();
        let clock = NullClock::new(0);
        let sleeper = NullSleeper::new();
        relay.script_check_session(Ok(session_resp(1, 1, 1)));

        let mut mgr = manager(&relay, &clock, &sleeper);
        mgr.context_mut().unverified_mtw_address = Some(addr(1));

        let (_, mtw) = mgr
            .fetch_session_state(&E164Number::new("+14155550123"), true)
            .await;
        assert_eq!(mtw, Some(addr(1)));
    }
}
