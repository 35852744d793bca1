//! Error types shared by every Safebox contract.
//!
//! Each failure is local to the call that raised it: nothing is retried,
//! nothing is queued, and prior state is left exactly as it was.

use safebox_protocol::{Address, AssetError, StorageError};
use thiserror::Error;

/// Errors returned by vault, proxy and factory operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VaultError {
    /// The caller lacks the administrator privilege the operation requires.
    #[error("NOT owner!: {caller} is not the administrator ({owner})")]
    NotOwner {
        /// Who attempted the call.
        caller: Address,
        /// Who is allowed to make it.
        owner: Address,
    },

    /// Withdrawal exceeds the caller's recorded balance.
    #[error("Insufficent balance!: {depositor} holds {available} of {asset}, requested {requested}")]
    InsufficientBalance {
        /// Depositor attempting the withdrawal.
        depositor: Address,
        /// Asset being withdrawn.
        asset: Address,
        /// Recorded balance.
        available: u64,
        /// Amount requested.
        requested: u64,
    },

    /// The asset ledger refused a pull or push.
    #[error("transfer of {asset} failed: {source}")]
    TransferFailed {
        /// Asset being moved.
        asset: Address,
        /// What the asset ledger reported.
        #[source]
        source: AssetError,
    },

    /// `initialize` was already run on this storage.
    #[error("already initialized")]
    AlreadyInitialized,

    /// A mutating call reached storage that was never initialized.
    #[error("not initialized")]
    NotInitialized,

    /// The target address carries no vault implementation code.
    #[error("implementation is not contract: {0}")]
    ImplementationNotContract(Address),

    /// The implementation's storage layout does not extend the recorded one.
    #[error("incompatible storage layout: {0}")]
    IncompatibleLayout(StorageError),

    /// A storage slot held a value of the wrong kind.
    #[error("corrupted storage: {0}")]
    StorageTypeMismatch(StorageError),

    /// Deposit amounts must be strictly positive.
    #[error("invalid amount: deposits must be greater than zero")]
    InvalidAmount,

    /// The fee for this deposit would consume more than the deposit itself.
    #[error("deposit of {amount} is below the fee of {fee}")]
    DepositBelowFee {
        /// Deposited amount.
        amount: u64,
        /// Fee the schedule charges for it.
        fee: u64,
    },

    /// An internal balance would exceed `u64::MAX`.
    #[error("arithmetic overflow updating {0}")]
    Overflow(&'static str),

    /// No contract instance of the expected kind lives at this address.
    #[error("no contract instance at {0}")]
    UnknownInstance(Address),
}

impl From<StorageError> for VaultError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::IncompatibleLayout { .. } => VaultError::IncompatibleLayout(err),
            StorageError::TypeMismatch { .. } => VaultError::StorageTypeMismatch(err),
        }
    }
}

impl VaultError {
    /// Wraps an asset ledger failure for `asset`.
    pub fn transfer_failed(asset: Address, source: AssetError) -> Self {
        VaultError::TransferFailed { asset, source }
    }
}
