//! # Upgradeable Vault Implementations
//!
//! Logic modules that keep no state of their own. Each one executes
//! [`SafeCall`]s against whatever [`SlotStorage`] it is handed — its own
//! when called directly, a proxy's when reached through
//! [`SafeProxy`](crate::proxy::SafeProxy).
//!
//! ## Storage layout
//!
//! Every generation shares one append-only layout:
//!
//! | slot | field         | kind                         |
//! |------|---------------|------------------------------|
//! | 0    | `owner`       | Address                      |
//! | 1    | `initialized` | Bool                         |
//! | 2    | `balances`    | Map(depositor, asset) → u64  |
//! | 3    | `fee`         | Map(asset) → u64             |
//!
//! New generations may append fields; they must never move, retype or drop
//! one. The layout is checked against the storage's recorded schema on
//! every call and on every upgrade.
//!
//! ## Generations
//!
//! - [`SafeUpgradeable`] — 0.1% above the threshold, 1 unit flat below.
//! - [`SafeUpgradeableV2`] — 0.2% above the threshold, 2 units flat below.

use safebox_protocol::config::VAULT_SCHEMA_VERSION;
use safebox_protocol::{Address, AssetLedger, SlotKey, SlotStorage, StorageLayout, StorageValue, ValueKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::error::VaultError;
use crate::fee::FeeSchedule;
use crate::init_guard::InitState;
use crate::ledger::{self, CallContext, DepositReceipt, FeeHarvest, LedgerStore, WithdrawReceipt};

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Slot of the fee-harvest administrator.
pub const OWNER_SLOT: u16 = 0;
/// Slot of the initialization flag.
pub const INITIALIZED_SLOT: u16 = 1;
/// Slot of the `(depositor, asset)` balance mapping.
pub const BALANCES_SLOT: u16 = 2;
/// Slot of the per-asset fee accrual mapping.
pub const FEES_SLOT: u16 = 3;

/// The storage layout shared by all vault generations.
pub fn vault_layout() -> StorageLayout {
    StorageLayout::new(VAULT_SCHEMA_VERSION)
        .scalar(OWNER_SLOT, "owner", ValueKind::Address)
        .scalar(INITIALIZED_SLOT, "initialized", ValueKind::Bool)
        .mapping(BALANCES_SLOT, "balances", 2, ValueKind::Amount)
        .mapping(FEES_SLOT, "fee", 1, ValueKind::Amount)
}

// ---------------------------------------------------------------------------
// Calls
// ---------------------------------------------------------------------------

/// A call on the vault surface. Anything a proxy does not handle itself is
/// one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum SafeCall {
    /// One-time setup of the fee administrator.
    Initialize {
        /// Administrator to record.
        admin: Address,
    },
    /// Deposit `amount` of `asset` on behalf of the caller.
    Deposit {
        /// Asset to deposit.
        asset: Address,
        /// Gross amount to pull.
        amount: u64,
    },
    /// Withdraw `amount` of `asset` to the caller.
    Withdraw {
        /// Asset to withdraw.
        asset: Address,
        /// Amount to return.
        amount: u64,
    },
    /// Harvest accrued fees in `asset`.
    TakeFee {
        /// Asset to harvest.
        asset: Address,
    },
    /// Query the fee administrator.
    Owner,
    /// Query the initialization flag.
    IsInitialized,
    /// Query accrued fees in `asset`.
    Fee {
        /// Asset to query.
        asset: Address,
    },
    /// Query a depositor's balance.
    Balances {
        /// Depositor to query.
        depositor: Address,
        /// Asset to query.
        asset: Address,
    },
}

impl SafeCall {
    /// Returns `true` for calls that may write storage.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            SafeCall::Initialize { .. }
                | SafeCall::Deposit { .. }
                | SafeCall::Withdraw { .. }
                | SafeCall::TakeFee { .. }
        )
    }
}

/// Result of a [`SafeCall`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CallOutput {
    /// No return value.
    Unit,
    /// An address.
    Address(Address),
    /// A flag.
    Bool(bool),
    /// An amount.
    Amount(u64),
    /// Deposit receipt.
    Deposit(DepositReceipt),
    /// Withdrawal receipt.
    Withdraw(WithdrawReceipt),
    /// Fee harvest.
    Harvest(FeeHarvest),
}

impl CallOutput {
    /// The amount, if this output is one.
    pub fn amount(&self) -> Option<u64> {
        match self {
            CallOutput::Amount(n) => Some(*n),
            _ => None,
        }
    }

    /// The address, if this output is one.
    pub fn address(&self) -> Option<Address> {
        match self {
            CallOutput::Address(a) => Some(*a),
            _ => None,
        }
    }

    /// The flag, if this output is one.
    pub fn flag(&self) -> Option<bool> {
        match self {
            CallOutput::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Slot-backed ledger store
// ---------------------------------------------------------------------------

/// [`LedgerStore`] view over slot storage using [`vault_layout`].
pub struct SlotLedger<'a> {
    storage: &'a mut SlotStorage,
}

impl<'a> SlotLedger<'a> {
    /// Wraps `storage`.
    pub fn new(storage: &'a mut SlotStorage) -> Self {
        Self { storage }
    }
}

impl LedgerStore for SlotLedger<'_> {
    fn owner(&self) -> Result<Address, VaultError> {
        Ok(self.storage.read_address(&SlotKey::scalar(OWNER_SLOT))?)
    }

    fn balance(&self, depositor: &Address, asset: &Address) -> Result<u64, VaultError> {
        Ok(self
            .storage
            .read_amount(&SlotKey::mapped(BALANCES_SLOT, &[*depositor, *asset]))?)
    }

    fn set_balance(
        &mut self,
        depositor: &Address,
        asset: &Address,
        amount: u64,
    ) -> Result<(), VaultError> {
        self.storage.set(
            SlotKey::mapped(BALANCES_SLOT, &[*depositor, *asset]),
            StorageValue::Amount(amount),
        );
        Ok(())
    }

    fn fee(&self, asset: &Address) -> Result<u64, VaultError> {
        Ok(self.storage.read_amount(&SlotKey::mapped(FEES_SLOT, &[*asset]))?)
    }

    fn set_fee(&mut self, asset: &Address, amount: u64) -> Result<(), VaultError> {
        self.storage
            .set(SlotKey::mapped(FEES_SLOT, &[*asset]), StorageValue::Amount(amount));
        Ok(())
    }
}

fn init_state(storage: &SlotStorage) -> Result<InitState, VaultError> {
    Ok(InitState::from_flag(
        storage.read_bool(&SlotKey::scalar(INITIALIZED_SLOT))?,
    ))
}

fn initialize(storage: &mut SlotStorage, ctx: &CallContext, admin: Address) -> Result<(), VaultError> {
    let next = init_state(storage)?.initialize()?;
    storage.set(SlotKey::scalar(OWNER_SLOT), StorageValue::Address(admin));
    storage.set(
        SlotKey::scalar(INITIALIZED_SLOT),
        StorageValue::Bool(next.as_flag()),
    );
    info!(vault = %ctx.this, admin = %admin, caller = %ctx.caller, "vault storage initialized");
    Ok(())
}

// ---------------------------------------------------------------------------
// Implementation interface
// ---------------------------------------------------------------------------

/// A vault logic generation that can sit behind a proxy.
///
/// Implementors supply identity, layout and pricing; the provided
/// [`execute`](SafeImplementation::execute) runs the shared ledger engine.
/// A generation that changes behavior beyond pricing overrides `execute`.
pub trait SafeImplementation: fmt::Debug + Send + Sync {
    /// Human-readable name, used in logs and reports.
    fn name(&self) -> &'static str;

    /// Logic generation number.
    fn version(&self) -> u32;

    /// Storage layout this generation reads and writes.
    fn layout(&self) -> &StorageLayout;

    /// Fee schedule charged on deposits.
    fn fee_schedule(&self) -> FeeSchedule;

    /// Executes `call` against `storage`.
    ///
    /// Not atomic on its own: a failing call may leave partial writes.
    /// Callers go through [`execute_atomic`].
    fn execute(
        &self,
        storage: &mut SlotStorage,
        ctx: &CallContext,
        call: &SafeCall,
        assets: &mut dyn AssetLedger,
    ) -> Result<CallOutput, VaultError> {
        if call.is_mutating() {
            storage.adopt_schema(self.layout())?;
        } else {
            storage.check_schema(self.layout())?;
        }

        match *call {
            SafeCall::Initialize { admin } => {
                initialize(storage, ctx, admin)?;
                Ok(CallOutput::Unit)
            }
            SafeCall::Deposit { asset, amount } => {
                init_state(storage)?.require_initialized()?;
                let schedule = self.fee_schedule();
                ledger::deposit(&mut SlotLedger::new(storage), &schedule, ctx, assets, asset, amount)
                    .map(CallOutput::Deposit)
            }
            SafeCall::Withdraw { asset, amount } => {
                init_state(storage)?.require_initialized()?;
                ledger::withdraw(&mut SlotLedger::new(storage), ctx, assets, asset, amount)
                    .map(CallOutput::Withdraw)
            }
            SafeCall::TakeFee { asset } => {
                init_state(storage)?.require_initialized()?;
                ledger::take_fee(&mut SlotLedger::new(storage), ctx, assets, asset)
                    .map(CallOutput::Harvest)
            }
            SafeCall::Owner => Ok(CallOutput::Address(
                storage.read_address(&SlotKey::scalar(OWNER_SLOT))?,
            )),
            SafeCall::IsInitialized => Ok(CallOutput::Bool(init_state(storage)?.as_flag())),
            SafeCall::Fee { asset } => Ok(CallOutput::Amount(
                storage.read_amount(&SlotKey::mapped(FEES_SLOT, &[asset]))?,
            )),
            SafeCall::Balances { depositor, asset } => Ok(CallOutput::Amount(
                storage.read_amount(&SlotKey::mapped(BALANCES_SLOT, &[depositor, asset]))?,
            )),
        }
    }
}

/// Runs `call` and rolls `storage` back if it fails.
pub fn execute_atomic(
    logic: &dyn SafeImplementation,
    storage: &mut SlotStorage,
    ctx: &CallContext,
    call: &SafeCall,
    assets: &mut dyn AssetLedger,
) -> Result<CallOutput, VaultError> {
    if !call.is_mutating() {
        return logic.execute(storage, ctx, call, assets);
    }
    let checkpoint = storage.clone();
    let result = logic.execute(storage, ctx, call, assets);
    if result.is_err() {
        *storage = checkpoint;
    }
    result
}

// ---------------------------------------------------------------------------
// Generations
// ---------------------------------------------------------------------------

/// First upgradeable generation: 0.1% / 1 unit.
#[derive(Debug, Clone)]
pub struct SafeUpgradeable {
    layout: StorageLayout,
}

impl SafeUpgradeable {
    pub fn new() -> Self {
        Self {
            layout: vault_layout(),
        }
    }
}

impl Default for SafeUpgradeable {
    fn default() -> Self {
        Self::new()
    }
}

impl SafeImplementation for SafeUpgradeable {
    fn name(&self) -> &'static str {
        "SafeUpgradeable"
    }

    fn version(&self) -> u32 {
        1
    }

    fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    fn fee_schedule(&self) -> FeeSchedule {
        FeeSchedule::V1
    }
}

/// Second upgradeable generation: 0.2% / 2 units, same layout.
#[derive(Debug, Clone)]
pub struct SafeUpgradeableV2 {
    layout: StorageLayout,
}

impl SafeUpgradeableV2 {
    pub fn new() -> Self {
        Self {
            layout: vault_layout(),
        }
    }
}

impl Default for SafeUpgradeableV2 {
    fn default() -> Self {
        Self::new()
    }
}

impl SafeImplementation for SafeUpgradeableV2 {
    fn name(&self) -> &'static str {
        "SafeUpgradeable_v2"
    }

    fn version(&self) -> u32 {
        2
    }

    fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    fn fee_schedule(&self) -> FeeSchedule {
        FeeSchedule::V2
    }
}

/// Selector for the shipped generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImplementationVersion {
    /// [`SafeUpgradeable`].
    V1,
    /// [`SafeUpgradeableV2`].
    V2,
}

impl ImplementationVersion {
    /// Instantiates the logic module.
    pub fn build(self) -> Arc<dyn SafeImplementation> {
        match self {
            ImplementationVersion::V1 => Arc::new(SafeUpgradeable::new()),
            ImplementationVersion::V2 => Arc::new(SafeUpgradeableV2::new()),
        }
    }
}
