//! # Safe — the self-contained vault
//!
//! A [`Safe`] owns its ledger state directly and has its administrator fixed
//! at construction. It charges the first-generation fee schedule unless
//! built with another via [`Safe::with_schedule`].

use safebox_protocol::{Address, AssetLedger};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::VaultError;
use crate::fee::FeeSchedule;
use crate::ledger::{self, CallContext, DepositReceipt, FeeHarvest, LedgerStore, WithdrawReceipt};
use crate::upgradeable::{CallOutput, SafeCall};

/// Typed ledger state: administrator, per-depositor balances and per-asset
/// fee accrual.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    owner: Address,
    /// `depositor -> (asset -> net balance)`.
    balances: HashMap<Address, HashMap<Address, u64>>,
    /// `asset -> accrued fee`.
    fees: HashMap<Address, u64>,
}

impl LedgerStore for LedgerState {
    fn owner(&self) -> Result<Address, VaultError> {
        Ok(self.owner)
    }

    fn balance(&self, depositor: &Address, asset: &Address) -> Result<u64, VaultError> {
        Ok(self
            .balances
            .get(depositor)
            .and_then(|m| m.get(asset))
            .copied()
            .unwrap_or(0))
    }

    fn set_balance(
        &mut self,
        depositor: &Address,
        asset: &Address,
        amount: u64,
    ) -> Result<(), VaultError> {
        self.balances
            .entry(*depositor)
            .or_default()
            .insert(*asset, amount);
        Ok(())
    }

    fn fee(&self, asset: &Address) -> Result<u64, VaultError> {
        Ok(self.fees.get(asset).copied().unwrap_or(0))
    }

    fn set_fee(&mut self, asset: &Address, amount: u64) -> Result<(), VaultError> {
        self.fees.insert(*asset, amount);
        Ok(())
    }
}

/// A non-upgradeable vault instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Safe {
    address: Address,
    schedule: FeeSchedule,
    state: LedgerState,
}

impl Safe {
    /// Creates a vault at `address` administered by `owner`.
    pub fn new(address: Address, owner: Address) -> Self {
        Self::with_schedule(address, owner, FeeSchedule::V1)
    }

    /// Creates a vault with a custom fee schedule.
    pub fn with_schedule(address: Address, owner: Address, schedule: FeeSchedule) -> Self {
        Self {
            address,
            schedule,
            state: LedgerState {
                owner,
                ..Default::default()
            },
        }
    }

    /// The vault's own address; depositors approve this address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Administrator entitled to harvest fees.
    pub fn owner(&self) -> Address {
        self.state.owner
    }

    /// Fee schedule charged on deposits.
    pub fn fee_schedule(&self) -> FeeSchedule {
        self.schedule
    }

    /// Accrued, unharvested fees in `asset`.
    pub fn fee(&self, asset: &Address) -> u64 {
        self.state.fees.get(asset).copied().unwrap_or(0)
    }

    /// Net balance of `depositor` in `asset`.
    pub fn balances(&self, depositor: &Address, asset: &Address) -> u64 {
        self.state
            .balances
            .get(depositor)
            .and_then(|m| m.get(asset))
            .copied()
            .unwrap_or(0)
    }

    /// See [`ledger::deposit`].
    pub fn deposit(
        &mut self,
        caller: Address,
        assets: &mut dyn AssetLedger,
        asset: Address,
        amount: u64,
    ) -> Result<DepositReceipt, VaultError> {
        let ctx = CallContext::new(caller, self.address);
        ledger::deposit(&mut self.state, &self.schedule, &ctx, assets, asset, amount)
    }

    /// See [`ledger::withdraw`].
    pub fn withdraw(
        &mut self,
        caller: Address,
        assets: &mut dyn AssetLedger,
        asset: Address,
        amount: u64,
    ) -> Result<WithdrawReceipt, VaultError> {
        let ctx = CallContext::new(caller, self.address);
        ledger::withdraw(&mut self.state, &ctx, assets, asset, amount)
    }

    /// See [`ledger::take_fee`].
    pub fn take_fee(
        &mut self,
        caller: Address,
        assets: &mut dyn AssetLedger,
        asset: Address,
    ) -> Result<FeeHarvest, VaultError> {
        let ctx = CallContext::new(caller, self.address);
        ledger::take_fee(&mut self.state, &ctx, assets, asset)
    }

    /// Executes a [`SafeCall`] so a `Safe` answers the same call surface as
    /// an upgradeable vault. A `Safe` is initialized at construction, so
    /// `Initialize` always fails with [`VaultError::AlreadyInitialized`].
    pub fn execute(
        &mut self,
        caller: Address,
        call: &SafeCall,
        assets: &mut dyn AssetLedger,
    ) -> Result<CallOutput, VaultError> {
        match *call {
            SafeCall::Initialize { .. } => Err(VaultError::AlreadyInitialized),
            SafeCall::Deposit { asset, amount } => self
                .deposit(caller, assets, asset, amount)
                .map(CallOutput::Deposit),
            SafeCall::Withdraw { asset, amount } => self
                .withdraw(caller, assets, asset, amount)
                .map(CallOutput::Withdraw),
            SafeCall::TakeFee { asset } => self
                .take_fee(caller, assets, asset)
                .map(CallOutput::Harvest),
            SafeCall::Owner => Ok(CallOutput::Address(self.owner())),
            SafeCall::IsInitialized => Ok(CallOutput::Bool(true)),
            SafeCall::Fee { asset } => Ok(CallOutput::Amount(self.fee(&asset))),
            SafeCall::Balances { depositor, asset } => {
                Ok(CallOutput::Amount(self.balances(&depositor, &asset)))
            }
        }
    }
}
