//! Meta-transaction wallet (MTW) resolution — find an already-verified
//! wallet for the phone identifier, or deploy and register a fresh one
//! through the relay.
//!
//! Resolution is the one place where on-chain lookup, relay deployment, and
//! structural wallet validation meet. The resolver is stateless; everything
//! it learns is written into the shared [`KomenciContext`] so an interrupted
//! attempt resumes where it left off.

use attesta_clients::{
    AttestationStat, ChainClient, ChainError, Clock, RelayClient, RelayError,
    WalletValidationError, WalletValidator,
};
use attesta_types::{AccountAddress, PhoneHash, VerificationParams};
use thiserror::Error;

use crate::session::KomenciContext;

/// Outcome of wallet resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// An MTW linked to the identifier already holds enough attestations.
    AlreadyVerified {
        mtw: AccountAddress,
        stat: AttestationStat,
    },
    /// A deployed, validated, registered MTW ready to collect attestations.
    Unverified { mtw: AccountAddress },
}

#[derive(Debug, Error)]
pub enum ResolverError {
    /// More than one valid verified MTW is linked to the identifier. The
    /// account state is ambiguous and must not be auto-resolved.
    #[error("{0} verified wallets linked to the same identifier")]
    InconsistentWalletState(usize),

    /// Deploy retries exhausted without obtaining a wallet.
    #[error("could not obtain a meta-transaction wallet")]
    MtwUnavailable,

    /// The relay session died underneath the deploy. The deployed address
    /// stays cached; the next attempt reuses it under a fresh session.
    #[error("relay session inactive after wallet deploy")]
    SessionInactive,

    /// Too many relay errors inside the rolling window.
    #[error("relay error quota exceeded")]
    ErrorQuotaExceeded,

    #[error(transparent)]
    Validation(#[from] WalletValidationError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Resolves the MTW to run verification against.
pub struct MetaTxWalletResolver {
    params: VerificationParams,
    /// The externally-owned account that must control every accepted MTW.
    wallet: AccountAddress,
    current_implementation: AccountAddress,
    allowed_implementations: Vec<AccountAddress>,
}

impl MetaTxWalletResolver {
    pub fn new(
        params: VerificationParams,
        wallet: AccountAddress,
        current_implementation: AccountAddress,
        allowed_implementations: Vec<AccountAddress>,
    ) -> Self {
        Self {
            params,
            wallet,
            current_implementation,
            allowed_implementations,
        }
    }

    /// Resolve the wallet for `identifier`.
    ///
    /// Checks for an already-verified MTW first; otherwise deploys one
    /// (reusing a cached unverified address when present), confirms the
    /// session survived the deploy, validates the wallet structurally, and
    /// registers the wallet and data encryption key through it.
    pub async fn resolve<Ch, R, V, C>(
        &self,
        chain: &Ch,
        relay: &R,
        validator: &V,
        clock: &C,
        identifier: &PhoneHash,
        context: &mut KomenciContext,
    ) -> Result<Resolution, ResolverError>
    where
        Ch: ChainClient,
        R: RelayClient,
        V: WalletValidator,
        C: Clock,
    {
        if let Some(resolution) = self.fetch_verified_mtw(chain, validator, identifier).await? {
            return Ok(resolution);
        }

        let mtw = self.fetch_or_deploy_mtw(relay, clock, context).await?;

        // A deploy consumes session quota; confirm the session survived
        // before doing anything else through it.
        match relay.check_session().await {
            Ok(resp) if resp.quota_left.submit_meta_transaction > 0 => {}
            Ok(_) | Err(_) => {
                context.session_active = false;
                return Err(ResolverError::SessionInactive);
            }
        }

        validator
            .verify_wallet(&mtw, &self.allowed_implementations, &self.wallet)
            .await?;

        relay.register_wallet_and_dek(&mtw, &self.wallet).await?;

        tracing::info!(mtw = %mtw, "meta-transaction wallet ready");
        Ok(Resolution::Unverified { mtw })
    }

    /// Look for an MTW that already carries enough attestations for the
    /// identifier and is structurally ours.
    async fn fetch_verified_mtw<Ch, V>(
        &self,
        chain: &Ch,
        validator: &V,
        identifier: &PhoneHash,
    ) -> Result<Option<Resolution>, ResolverError>
    where
        Ch: ChainClient,
        V: WalletValidator,
    {
        let accounts = chain.lookup_accounts_for_identifier(identifier).await?;

        let mut verified = Vec::new();
        for account in accounts {
            let stat = chain.attestation_stat(identifier, &account).await?;
            if stat.is_verified(self.params.num_attestations_required) {
                verified.push((account, stat));
            }
        }

        // Of the verified accounts, only those we actually control count.
        let mut valid = Vec::new();
        for (account, stat) in verified {
            match validator
                .verify_wallet(&account, &self.allowed_implementations, &self.wallet)
                .await
            {
                Ok(()) => valid.push((account, stat)),
                Err(err) => {
                    tracing::debug!(account = %account, %err, "ignoring foreign verified wallet")
                }
            }
        }

        match valid.len() {
            0 => Ok(None),
            1 => {
                let (mtw, stat) = valid.remove(0);
                tracing::info!(mtw = %mtw, "identifier already verified");
                Ok(Some(Resolution::AlreadyVerified { mtw, stat }))
            }
            n => Err(ResolverError::InconsistentWalletState(n)),
        }
    }

    /// Reuse the cached unverified MTW, or deploy one with bounded retries.
    ///
    /// Only transient relay failures are retried; each one feeds the error
    /// quota. A successful deploy is cached immediately so a later failure
    /// in the same attempt never orphans the wallet.
    async fn fetch_or_deploy_mtw<R, C>(
        &self,
        relay: &R,
        clock: &C,
        context: &mut KomenciContext,
    ) -> Result<AccountAddress, ResolverError>
    where
        R: RelayClient,
        C: Clock,
    {
        if let Some(mtw) = context.unverified_mtw_address.clone() {
            tracing::debug!(mtw = %mtw, "reusing cached unverified wallet");
            return Ok(mtw);
        }

        for attempt in 0..self.params.deploy_retries {
            match relay.deploy_wallet(&self.current_implementation).await {
                Ok(mtw) => {
                    context.unverified_mtw_address = Some(mtw.clone());
                    return Ok(mtw);
                }
                Err(err) if err.is_transient() => {
                    tracing::debug!(attempt, %err, "wallet deploy failed, retrying");
                    context.record_error(clock.now(), self.params.error_quota_window_secs);
                    if context.errors_in_window(clock.now(), self.params.error_quota_window_secs)
                        > self.params.error_quota_threshold
                    {
                        return Err(ResolverError::ErrorQuotaExceeded);
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(ResolverError::MtwUnavailable)
    }
}
