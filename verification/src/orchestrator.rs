//! Verification flow orchestrator.
//!
//! Drives one verification attempt through its phases:
//!
//! ```text
//! Idle -> PhoneHashDerivation -> SessionAcquisition -> WalletResolution
//!      -> AttestationRequestPending -> CodeCollection
//!      -> Completed | Failed | Cancelled
//! ```
//!
//! [`VerificationOrchestrator::run`] advances through attestation request
//! and returns in `CodeCollection` (or `Completed` when the identifier is
//! already verified); the host then feeds codes through
//! [`VerificationOrchestrator::receive_code`] until completion. State
//! changes surface as events the host drains with
//! [`VerificationOrchestrator::drain_events`].
//!
//! Cancellation is checked between phases only: an in-flight remote call
//! always finishes, its result is discarded, and committed side effects (a
//! deployed wallet, an active session) stay in the context for the next
//! attempt.

use attesta_clients::{ChainClient, Clock, RelayClient, Sleeper, SmsEvent, WalletValidator};
use attesta_types::{AccountAddress, E164Number, Pepper, PhoneHashDetails, Timestamp};
use serde::{Deserialize, Serialize};

use crate::cancel::CancellationToken;
use crate::config::VerificationConfig;
use crate::error::VerificationError;
use crate::intake::{CodeIntakeValidator, IntakeDecision};
use crate::ledger::{AttestationLedger, CodeInputStatus, CodeInputType, LedgerError};
use crate::resolver::{MetaTxWalletResolver, Resolution};
use crate::session::{KomenciContext, KomenciSessionManager};
use crate::status::VerificationStatus;

/// Phase of the verification flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    PhoneHashDerivation,
    SessionAcquisition,
    WalletResolution,
    AttestationRequestPending,
    CodeCollection,
    Completed,
    Failed,
    Cancelled,
}

impl FlowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Events emitted for the host UI, drained in order.
#[derive(Clone, Debug, PartialEq)]
pub enum VerificationEvent {
    StateChanged(FlowState),
    StatusUpdated(VerificationStatus),
    SlotStatusChanged { slot: usize, status: CodeInputStatus },
    CodeAccepted { slot: usize },
    /// A code arrived before slots opened and was held for replay.
    CodeBuffered,
    InvalidCode,
    DuplicateCodeEntered,
    /// Resend requested inside the rate-limit window; no chain call made.
    ResendTooSoon { wait_secs: u64 },
    MessagesResent,
    ResendFailed,
    AlreadyVerified,
    Completed,
    Failed(String),
    Cancelled,
}

/// Persistable slice of orchestrator state, enough to resume a flow after a
/// restart without repeating committed side effects.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerificationSnapshot {
    pub context: KomenciContext,
    pub pepper: Option<Pepper>,
    pub mtw: Option<AccountAddress>,
    pub status: VerificationStatus,
    pub last_reveal_attempt: Option<Timestamp>,
}

/// Coordinates one phone number's verification against the chain through a
/// relay session.
pub struct VerificationOrchestrator<Ch, R, V, C, S> {
    chain: Ch,
    validator: V,
    clock: C,
    session: KomenciSessionManager<R, C, S>,
    config: VerificationConfig,
    intake: CodeIntakeValidator,
    /// The externally-owned account backing this user.
    wallet: AccountAddress,
    e164_number: E164Number,
    pepper: Option<Pepper>,
    phone_details: Option<PhoneHashDetails>,
    mtw: Option<AccountAddress>,
    ledger: AttestationLedger,
    state: FlowState,
    status: VerificationStatus,
    last_reveal_attempt: Option<Timestamp>,
    /// Raw messages that arrived before code collection opened.
    buffered_codes: Vec<String>,
    pending_events: Vec<VerificationEvent>,
    cancel: CancellationToken,
}

impl<Ch, R, V, C, S> VerificationOrchestrator<Ch, R, V, C, S>
where
    Ch: ChainClient,
    R: RelayClient,
    V: WalletValidator,
    C: Clock + Clone,
    S: Sleeper,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain: Ch,
        relay: R,
        validator: V,
        clock: C,
        sleeper: S,
        config: VerificationConfig,
        wallet: AccountAddress,
        e164_number: E164Number,
    ) -> Self {
        let required = config.params.num_attestations_required;
        let session =
            KomenciSessionManager::new(relay, clock.clone(), sleeper, config.params.clone());
        Self {
            chain,
            validator,
            clock,
            session,
            intake: CodeIntakeValidator::new(config.short_codes_enabled),
            config,
            wallet,
            e164_number,
            pepper: None,
            phone_details: None,
            mtw: None,
            ledger: AttestationLedger::new(required),
            state: FlowState::Idle,
            status: VerificationStatus::unknown(required),
            last_reveal_attempt: None,
            buffered_codes: Vec::new(),
            pending_events: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    // ── Host surface ────────────────────────────────────────────────────

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn status(&self) -> VerificationStatus {
        self.status
    }

    pub fn slot_statuses(&self) -> &[CodeInputStatus] {
        self.ledger.slot_statuses()
    }

    /// Handle the host holds to cancel the flow from outside.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Take all pending events, oldest first.
    pub fn drain_events(&mut self) -> Vec<VerificationEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// The account on-chain calls are made as: the MTW once resolved,
    /// otherwise the externally-owned account.
    pub fn komenci_aware_account(&self) -> &AccountAddress {
        self.mtw.as_ref().unwrap_or(&self.wallet)
    }

    pub fn snapshot(&self) -> VerificationSnapshot {
        VerificationSnapshot {
            context: self.session.context().clone(),
            pepper: self.pepper.clone(),
            mtw: self.mtw.clone(),
            status: self.status,
            last_reveal_attempt: self.last_reveal_attempt,
        }
    }

    pub fn restore(&mut self, snapshot: VerificationSnapshot) {
        *self.session.context_mut() = snapshot.context;
        self.pepper = snapshot.pepper;
        self.mtw = snapshot.mtw;
        self.status = snapshot.status;
        self.last_reveal_attempt = snapshot.last_reveal_attempt;
    }

    // ── Flow ────────────────────────────────────────────────────────────

    /// Run the flow up to code collection.
    ///
    /// Returns the state reached: `CodeCollection` when attestations are
    /// outstanding, `Completed` when the identifier turned out to be
    /// verified already, `Cancelled` when the token fired. Any error marks
    /// the flow `Failed` before propagating.
    pub async fn run(&mut self, captcha_token: &str) -> Result<FlowState, VerificationError> {
        match self.run_flow(captcha_token).await {
            Ok(state) => Ok(state),
            Err(err) => {
                tracing::warn!(%err, "verification attempt failed");
                self.set_state(FlowState::Failed);
                self.push(VerificationEvent::Failed(err.to_string()));
                Err(err)
            }
        }
    }

    async fn run_flow(&mut self, captcha_token: &str) -> Result<FlowState, VerificationError> {
        self.set_state(FlowState::PhoneHashDerivation);
        if self.pepper.is_some() {
            self.ensure_phone_details().await?;
        }
        if self.cancelled() {
            return Ok(FlowState::Cancelled);
        }

        self.set_state(FlowState::SessionAcquisition);
        if !self.session.check_readiness().await? {
            return Err(VerificationError::RelayUnavailable);
        }
        let pepper_cached = self.pepper.is_some();
        if self.session.context().session_active {
            self.session
                .fetch_session_state(&self.e164_number, pepper_cached)
                .await;
        }
        if !self.session.context().session_active {
            self.session.start_or_resume_session(captcha_token).await?;
        }
        if self.cancelled() {
            return Ok(FlowState::Cancelled);
        }

        // Pepper fetch consumes session quota, so it had to wait for an
        // active session when nothing was cached.
        let details = self.ensure_phone_details().await?;
        if self.cancelled() {
            return Ok(FlowState::Cancelled);
        }

        self.set_state(FlowState::WalletResolution);
        let required = self.config.params.num_attestations_required;
        let resolver = MetaTxWalletResolver::new(
            self.config.params.clone(),
            self.wallet.clone(),
            self.config.current_mtw_implementation.clone(),
            self.config.allowed_mtw_implementations.clone(),
        );
        let (relay, context) = self.session.relay_and_context_mut();
        let resolution = resolver
            .resolve(
                &self.chain,
                relay,
                &self.validator,
                &self.clock,
                &details.phone_hash,
                context,
            )
            .await?;
        match resolution {
            Resolution::AlreadyVerified { mtw, stat } => {
                self.mtw = Some(mtw);
                self.status = VerificationStatus::from_stat(stat, required);
                self.push(VerificationEvent::StatusUpdated(self.status));
                self.push(VerificationEvent::AlreadyVerified);
                self.set_state(FlowState::Completed);
                self.push(VerificationEvent::Completed);
                return Ok(FlowState::Completed);
            }
            Resolution::Unverified { mtw } => self.mtw = Some(mtw),
        }
        if self.cancelled() {
            return Ok(FlowState::Cancelled);
        }

        self.set_state(FlowState::AttestationRequestPending);
        let account = self.komenci_aware_account().clone();
        let stat = self
            .chain
            .attestation_stat(&details.phone_hash, &account)
            .await?;
        self.status = VerificationStatus::from_stat(stat, required);
        self.push(VerificationEvent::StatusUpdated(self.status));
        if self.status.is_verified {
            self.set_state(FlowState::Completed);
            self.push(VerificationEvent::Completed);
            return Ok(FlowState::Completed);
        }

        // Outstanding requests (total - completed) still produce codes, so
        // only top up to the required count.
        let to_request = required.saturating_sub(stat.total);
        if to_request > 0 {
            self.chain
                .request_attestations(&details.phone_hash, &account, to_request)
                .await?;
        }
        self.chain
            .reveal_attestations(&details.phone_hash, &account)
            .await?;
        self.last_reveal_attempt = Some(self.clock.now());
        if self.cancelled() {
            return Ok(FlowState::Cancelled);
        }

        self.set_state(FlowState::CodeCollection);
        self.ledger.open_slots();
        for raw in std::mem::take(&mut self.buffered_codes) {
            self.process_code(&raw, CodeInputType::Automatic, None).await?;
            if self.state == FlowState::Completed {
                break;
            }
        }
        Ok(self.state)
    }

    /// Feed one raw code string (SMS body or manual input) into the flow.
    ///
    /// Before code collection opens the message is buffered and replayed
    /// later; after a terminal state it is ignored. Errors escaping code
    /// processing mark the flow `Failed`, mirroring [`Self::run`].
    pub async fn receive_code(
        &mut self,
        raw: &str,
        input_type: CodeInputType,
        slot: Option<usize>,
    ) -> Result<(), VerificationError> {
        match self.state {
            FlowState::CodeCollection => {
                match self.process_code(raw, input_type, slot).await {
                    Ok(()) => Ok(()),
                    Err(err) => {
                        tracing::warn!(%err, "code processing failed");
                        self.set_state(FlowState::Failed);
                        self.push(VerificationEvent::Failed(err.to_string()));
                        Err(err)
                    }
                }
            }
            state if state.is_terminal() => Ok(()),
            _ => {
                if self.buffered_codes.len() < self.ledger.total() as usize
                    && !self.buffered_codes.iter().any(|m| m == raw)
                {
                    self.buffered_codes.push(raw.to_string());
                    self.push(VerificationEvent::CodeBuffered);
                }
                Ok(())
            }
        }
    }

    /// Feed one event from the OS SMS retriever.
    ///
    /// Only retrieved messages enter the flow; retriever errors and timeouts
    /// are logged and dropped (the user can still type the code).
    pub async fn handle_sms_event(&mut self, event: SmsEvent) -> Result<(), VerificationError> {
        match event {
            SmsEvent::Message(body) => {
                self.receive_code(&body, CodeInputType::Automatic, None).await
            }
            SmsEvent::Error(reason) => {
                tracing::warn!(%reason, "sms retriever error");
                Ok(())
            }
            SmsEvent::Timeout => {
                tracing::debug!("sms retriever timed out");
                Ok(())
            }
        }
    }

    /// Ask attestation issuers to resend their messages.
    ///
    /// Rate-limited against the last reveal: allowed only once strictly more
    /// than the reveal timeout has passed, so a request at the boundary
    /// still emits `ResendTooSoon` and makes no chain call. A failed reveal
    /// is reported as an event, not a flow failure.
    pub async fn resend_messages(&mut self) -> Result<(), VerificationError> {
        if self.state != FlowState::CodeCollection {
            return Ok(());
        }
        let now = self.clock.now();
        let timeout = self.config.params.reveal_timeout_secs;
        if let Some(last) = self.last_reveal_attempt {
            if !last.window_elapsed(timeout, now) {
                let wait_secs = timeout.saturating_sub(last.elapsed_since(now));
                self.push(VerificationEvent::ResendTooSoon { wait_secs });
                return Ok(());
            }
        }
        let Some(details) = self.phone_details.clone() else {
            return Ok(());
        };
        let account = self.komenci_aware_account().clone();
        match self
            .chain
            .reveal_attestations(&details.phone_hash, &account)
            .await
        {
            Ok(()) => {
                self.last_reveal_attempt = Some(now);
                self.push(VerificationEvent::MessagesResent);
            }
            Err(err) => {
                tracing::warn!(%err, "attestation message resend failed");
                self.push(VerificationEvent::ResendFailed);
            }
        }
        Ok(())
    }

    // ── Internals ───────────────────────────────────────────────────────

    async fn ensure_phone_details(&mut self) -> Result<PhoneHashDetails, VerificationError> {
        if let Some(details) = &self.phone_details {
            return Ok(details.clone());
        }
        let pepper = match &self.pepper {
            Some(p) => p.clone(),
            None => {
                let p = self
                    .session
                    .relay()
                    .get_pepper(&self.e164_number)
                    .await
                    .map_err(VerificationError::PepperUnavailable)?;
                self.pepper = Some(p.clone());
                p
            }
        };
        let details = PhoneHashDetails::derive(self.e164_number.clone(), pepper);
        tracing::debug!(phone_hash = %details.phone_hash, "phone identifier derived");
        self.phone_details = Some(details.clone());
        Ok(details)
    }

    async fn process_code(
        &mut self,
        raw: &str,
        input_type: CodeInputType,
        slot: Option<usize>,
    ) -> Result<(), VerificationError> {
        let Some(details) = self.phone_details.clone() else {
            return Ok(());
        };

        let code = match self.intake.validate(raw, self.ledger.codes()) {
            IntakeDecision::Ok(code) => code,
            IntakeDecision::Duplicate => {
                self.push(VerificationEvent::DuplicateCodeEntered);
                return Ok(());
            }
            IntakeDecision::Unrecognized => {
                self.push(VerificationEvent::InvalidCode);
                return Ok(());
            }
        };

        let slot = match self.ledger.receive(code.clone(), input_type, slot) {
            Ok(slot) => slot,
            Err(LedgerError::DuplicateCode) => {
                self.push(VerificationEvent::DuplicateCodeEntered);
                return Ok(());
            }
            Err(LedgerError::SlotOutOfRange(slot)) => {
                // bad manual input, not a flow failure
                tracing::warn!(slot, "manual code entry targeted a nonexistent slot");
                self.push(VerificationEvent::InvalidCode);
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        self.push(VerificationEvent::SlotStatusChanged {
            slot,
            status: CodeInputStatus::Received,
        });

        self.ledger.set_slot_status(slot, CodeInputStatus::Processing)?;
        self.push(VerificationEvent::SlotStatusChanged {
            slot,
            status: CodeInputStatus::Processing,
        });

        let account = self.komenci_aware_account().clone();
        match self
            .chain
            .complete_attestation(
                &details.phone_hash,
                &account,
                code.issuer.as_ref(),
                &code.payload,
            )
            .await
        {
            Ok(()) => {
                self.ledger.set_slot_status(slot, CodeInputStatus::Accepted)?;
                self.push(VerificationEvent::CodeAccepted { slot });
            }
            Err(err) => {
                // The slot reopens; the flow survives. A transient fault
                // says nothing about the code itself, so its record is
                // evicted and the identical value can be resubmitted.
                tracing::warn!(slot, %err, "attestation completion rejected");
                self.ledger.set_slot_status(slot, CodeInputStatus::Error)?;
                if err.is_transient() {
                    self.ledger.evict_code(slot);
                }
                self.push(VerificationEvent::SlotStatusChanged {
                    slot,
                    status: CodeInputStatus::Error,
                });
                return Ok(());
            }
        }

        let required = self.config.params.num_attestations_required;
        let stat = self
            .chain
            .attestation_stat(&details.phone_hash, &account)
            .await?;
        self.status = VerificationStatus::from_stat(stat, required);
        self.push(VerificationEvent::StatusUpdated(self.status));

        if self.ledger.count_accepted() >= required && self.status.is_verified {
            self.set_state(FlowState::Completed);
            self.push(VerificationEvent::Completed);
        }
        Ok(())
    }

    fn cancelled(&mut self) -> bool {
        if self.cancel.is_cancelled() {
            tracing::info!("verification attempt cancelled");
            self.set_state(FlowState::Cancelled);
            self.push(VerificationEvent::Cancelled);
            true
        } else {
            false
        }
    }

    fn set_state(&mut self, state: FlowState) {
        if self.state != state {
            tracing::debug!(from = ?self.state, to = ?state, "flow state change");
            self.state = state;
            self.push(VerificationEvent::StateChanged(state));
        }
    }

    fn push(&mut self, event: VerificationEvent) {
        self.pending_events.push(event);
    }
}
