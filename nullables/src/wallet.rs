//! Nullable wallet validator — every address passes unless marked invalid.

use attesta_clients::{WalletValidationError, WalletValidator};
use attesta_types::AccountAddress;
use std::collections::HashMap;
use std::sync::Mutex;

/// Reason an address should fail validation.
#[derive(Clone, Copy, Debug)]
pub enum InvalidReason {
    DisallowedImplementation,
    WrongSigner,
    NotAContract,
}

#[derive(Default)]
pub struct NullWalletValidator {
    invalid: Mutex<HashMap<AccountAddress, InvalidReason>>,
    calls: Mutex<Vec<AccountAddress>>,
}

impl NullWalletValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make validation of `wallet` fail with the given reason.
    pub fn mark_invalid(&self, wallet: &AccountAddress, reason: InvalidReason) {
        self.invalid.lock().unwrap().insert(wallet.clone(), reason);
    }

    /// All wallets validated so far, in order.
    pub fn validated(&self) -> Vec<AccountAddress> {
        self.calls.lock().unwrap().clone()
    }
}

impl WalletValidator for NullWalletValidator {
    async fn verify_wallet(
        &self,
        wallet: &AccountAddress,
        _allowed_implementations: &[AccountAddress],
        expected_signer: &AccountAddress,
    ) -> Result<(), WalletValidationError> {
        self.calls.lock().unwrap().push(wallet.clone());
        match self.invalid.lock().unwrap().get(wallet) {
            None => Ok(()),
            Some(InvalidReason::DisallowedImplementation) => Err(
                WalletValidationError::DisallowedImplementation(wallet.clone()),
            ),
            Some(InvalidReason::WrongSigner) => Err(WalletValidationError::WrongSigner {
                wallet: wallet.clone(),
                signer: expected_signer.clone(),
            }),
            Some(InvalidReason::NotAContract) => {
                Err(WalletValidationError::NotAContract(wallet.clone()))
            }
        }
    }
}
