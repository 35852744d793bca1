//! # Ledger Engine
//!
//! The deposit / withdraw / fee-harvest logic shared by every vault
//! variant. The engine is written against [`LedgerStore`], so the same code
//! drives the plain [`Safe`](crate::safe::Safe) (typed in-memory state) and
//! the upgradeable implementations (slot storage living in a proxy).
//!
//! ## Atomicity
//!
//! Every operation validates and computes all new values before it touches
//! the asset ledger, and writes its own bookkeeping only after the asset
//! ledger reported success. A failure at any step leaves the store exactly
//! as it was.

use safebox_protocol::{Address, AssetLedger};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::VaultError;
use crate::fee::FeeSchedule;

// ---------------------------------------------------------------------------
// Call context
// ---------------------------------------------------------------------------

/// Who is calling, and on whose behalf the logic executes.
///
/// `this` is the address whose custody and storage the logic acts on. For a
/// call forwarded through a proxy it is the proxy's address, not the
/// implementation's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    /// The original caller.
    pub caller: Address,
    /// The executing contract address.
    pub this: Address,
}

impl CallContext {
    /// Builds a context.
    pub fn new(caller: Address, this: Address) -> Self {
        Self { caller, this }
    }
}

// ---------------------------------------------------------------------------
// Store abstraction
// ---------------------------------------------------------------------------

/// Persistent fields the engine reads and writes.
pub trait LedgerStore {
    /// Administrator allowed to harvest fees.
    fn owner(&self) -> Result<Address, VaultError>;

    /// Net balance of `depositor` in `asset`.
    fn balance(&self, depositor: &Address, asset: &Address) -> Result<u64, VaultError>;

    /// Overwrites the net balance of `depositor` in `asset`.
    fn set_balance(
        &mut self,
        depositor: &Address,
        asset: &Address,
        amount: u64,
    ) -> Result<(), VaultError>;

    /// Accrued fees in `asset`.
    fn fee(&self, asset: &Address) -> Result<u64, VaultError>;

    /// Overwrites the accrued fees in `asset`.
    fn set_fee(&mut self, asset: &Address, amount: u64) -> Result<(), VaultError>;
}

// ---------------------------------------------------------------------------
// Receipts
// ---------------------------------------------------------------------------

/// Outcome of a successful deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositReceipt {
    /// Depositor credited.
    pub depositor: Address,
    /// Asset deposited.
    pub asset: Address,
    /// Units pulled from the depositor.
    pub gross: u64,
    /// Units retained as fee.
    pub fee: u64,
    /// Units credited to the depositor.
    pub net: u64,
    /// Depositor's balance after the deposit.
    pub balance: u64,
}

/// Outcome of a successful withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawReceipt {
    /// Depositor debited.
    pub depositor: Address,
    /// Asset withdrawn.
    pub asset: Address,
    /// Units returned.
    pub amount: u64,
    /// Balance left in the vault.
    pub remaining: u64,
}

/// Outcome of a fee harvest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeHarvest {
    /// Asset harvested.
    pub asset: Address,
    /// Administrator paid.
    pub recipient: Address,
    /// Units paid out. Zero when nothing had accrued.
    pub amount: u64,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Pulls `amount` of `asset` from the caller into `ctx.this` and credits the
/// caller with the amount net of the schedule's fee.
///
/// The caller must have approved `ctx.this` for at least `amount` on the
/// asset ledger beforehand.
///
/// # Errors
///
/// - [`VaultError::InvalidAmount`] / [`VaultError::DepositBelowFee`] for
///   amounts the schedule cannot price.
/// - [`VaultError::Overflow`] if the balance or fee total would overflow.
/// - [`VaultError::TransferFailed`] if the pull is refused.
pub fn deposit<S: LedgerStore + ?Sized>(
    store: &mut S,
    schedule: &FeeSchedule,
    ctx: &CallContext,
    assets: &mut dyn AssetLedger,
    asset: Address,
    amount: u64,
) -> Result<DepositReceipt, VaultError> {
    let quote = schedule.quote(amount)?;

    let new_balance = store
        .balance(&ctx.caller, &asset)?
        .checked_add(quote.net)
        .ok_or(VaultError::Overflow("depositor balance"))?;
    let new_fee = store
        .fee(&asset)?
        .checked_add(quote.fee)
        .ok_or(VaultError::Overflow("fee accrual"))?;

    assets
        .transfer_from(&asset, &ctx.this, &ctx.caller, &ctx.this, amount)
        .map_err(|e| VaultError::transfer_failed(asset, e))?;

    store.set_balance(&ctx.caller, &asset, new_balance)?;
    store.set_fee(&asset, new_fee)?;

    debug!(
        vault = %ctx.this,
        depositor = %ctx.caller,
        asset = %asset,
        gross = amount,
        fee = quote.fee,
        net = quote.net,
        "deposit recorded"
    );

    Ok(DepositReceipt {
        depositor: ctx.caller,
        asset,
        gross: amount,
        fee: quote.fee,
        net: quote.net,
        balance: new_balance,
    })
}

/// Returns `amount` of `asset` from `ctx.this` to the caller.
///
/// # Errors
///
/// - [`VaultError::InsufficientBalance`] if the caller's recorded balance is
///   smaller than `amount`.
/// - [`VaultError::TransferFailed`] if the push is refused; the balance is
///   left untouched.
pub fn withdraw<S: LedgerStore + ?Sized>(
    store: &mut S,
    ctx: &CallContext,
    assets: &mut dyn AssetLedger,
    asset: Address,
    amount: u64,
) -> Result<WithdrawReceipt, VaultError> {
    let available = store.balance(&ctx.caller, &asset)?;
    if available < amount {
        return Err(VaultError::InsufficientBalance {
            depositor: ctx.caller,
            asset,
            available,
            requested: amount,
        });
    }
    let remaining = available - amount;

    assets
        .transfer(&asset, &ctx.this, &ctx.caller, amount)
        .map_err(|e| VaultError::transfer_failed(asset, e))?;

    store.set_balance(&ctx.caller, &asset, remaining)?;

    debug!(
        vault = %ctx.this,
        depositor = %ctx.caller,
        asset = %asset,
        amount,
        remaining,
        "withdrawal paid"
    );

    Ok(WithdrawReceipt {
        depositor: ctx.caller,
        asset,
        amount,
        remaining,
    })
}

/// Pays everything accrued in `asset` to the administrator and resets the
/// accrual to zero. Harvesting an empty accrual succeeds and pays nothing.
///
/// # Errors
///
/// - [`VaultError::NotOwner`] unless the caller is the administrator.
/// - [`VaultError::TransferFailed`] if the payout is refused; the accrual is
///   left untouched.
pub fn take_fee<S: LedgerStore + ?Sized>(
    store: &mut S,
    ctx: &CallContext,
    assets: &mut dyn AssetLedger,
    asset: Address,
) -> Result<FeeHarvest, VaultError> {
    let owner = store.owner()?;
    if ctx.caller != owner {
        warn!(vault = %ctx.this, caller = %ctx.caller, "fee harvest rejected: caller is not owner");
        return Err(VaultError::NotOwner {
            caller: ctx.caller,
            owner,
        });
    }

    let accrued = store.fee(&asset)?;
    if accrued > 0 {
        assets
            .transfer(&asset, &ctx.this, &owner, accrued)
            .map_err(|e| VaultError::transfer_failed(asset, e))?;
        store.set_fee(&asset, 0)?;
        info!(vault = %ctx.this, asset = %asset, amount = accrued, "fees harvested");
    }

    Ok(FeeHarvest {
        asset,
        recipient: owner,
        amount: accrued,
    })
}
