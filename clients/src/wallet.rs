//! Meta-transaction wallet validation interface.

use attesta_types::AccountAddress;
use thiserror::Error;

/// A wallet-validation failure is always fatal: the address is structurally
/// wrong for this signer and no retry can fix it.
#[derive(Debug, Error)]
pub enum WalletValidationError {
    #[error("wallet {0} has a disallowed implementation")]
    DisallowedImplementation(AccountAddress),

    #[error("wallet {wallet} is not controlled by expected signer {signer}")]
    WrongSigner {
        wallet: AccountAddress,
        signer: AccountAddress,
    },

    #[error("no contract deployed at {0}")]
    NotAContract(AccountAddress),

    #[error("could not inspect wallet {0}: {1}")]
    Inspection(AccountAddress, String),
}

/// Validates that an address is a proper meta-transaction wallet: one of the
/// allowed implementation bytecodes, controlled by the expected signer.
pub trait WalletValidator {
    async fn verify_wallet(
        &self,
        wallet: &AccountAddress,
        allowed_implementations: &[AccountAddress],
        expected_signer: &AccountAddress,
    ) -> Result<(), WalletValidationError>;
}

impl<T: WalletValidator> WalletValidator for &T {
    async fn verify_wallet(
        &self,
        wallet: &AccountAddress,
        allowed_implementations: &[AccountAddress],
        expected_signer: &AccountAddress,
    ) -> Result<(), WalletValidationError> {
        (**self)
            .verify_wallet(wallet, allowed_implementations, expected_signer)
            .await
    }
}
