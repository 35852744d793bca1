//! # Asset Interface & Reference Token Ledger
//!
//! Safebox never issues the assets it custodies. It talks to them through
//! the [`AssetLedger`] trait — balance-of, transfer, transfer-from with an
//! allowance, approve — and treats every one of those calls as able to fail.
//!
//! [`TokenLedger`] is the in-memory implementation used by the runtime, the
//! CLI and the test suites. It hosts any number of fungible tokens, each
//! addressed by the [`Address`] it was deployed at.
//!
//! ## Semantics
//!
//! - **Atomic operations**: every mutating call either fully applies or
//!   leaves all balances and allowances untouched.
//! - **Allowances are consumed**: a successful `transfer_from` decreases the
//!   spender's allowance by the moved amount.
//! - **Open minting**: [`TokenLedger::mint`] credits anyone. That matches the
//!   test token the vault was built against; issuance policy is out of
//!   scope for Safebox.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::address::Address;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors reported by an asset ledger.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssetError {
    /// No asset is deployed at this address.
    #[error("unknown asset: {0}")]
    UnknownAsset(Address),

    /// An asset is already deployed at this address.
    #[error("asset already exists at {0}")]
    DuplicateAsset(Address),

    /// The debited account holds fewer units than requested.
    #[error("insufficient funds: {account} holds {balance}, needs {amount}")]
    InsufficientFunds {
        /// Account being debited.
        account: Address,
        /// Its current balance.
        balance: u64,
        /// Amount requested.
        amount: u64,
    },

    /// The spender's allowance does not cover the transfer.
    #[error("insufficient allowance: {spender} may move {allowance} from {owner}, needs {amount}")]
    InsufficientAllowance {
        /// Account whose funds are being moved.
        owner: Address,
        /// Account attempting the move.
        spender: Address,
        /// Currently approved amount.
        allowance: u64,
        /// Amount requested.
        amount: u64,
    },

    /// Crediting would exceed `u64::MAX`.
    #[error("asset overflow: crediting {amount} would exceed u64::MAX")]
    Overflow {
        /// Amount that was being credited.
        amount: u64,
    },
}

// ---------------------------------------------------------------------------
// Asset Interface
// ---------------------------------------------------------------------------

/// The capabilities Safebox needs from an external fungible-asset ledger.
///
/// `sender`, `spender` and `owner` are the identity of whoever invokes the
/// asset — for vault operations that is the vault's own address, never the
/// depositor's.
pub trait AssetLedger {
    /// Units of `asset` held by `account`.
    fn balance_of(&self, asset: &Address, account: &Address) -> Result<u64, AssetError>;

    /// Units of `asset` that `spender` may still move out of `owner`.
    fn allowance(
        &self,
        asset: &Address,
        owner: &Address,
        spender: &Address,
    ) -> Result<u64, AssetError>;

    /// Moves `amount` from `sender` (the invoker) to `to`.
    fn transfer(
        &mut self,
        asset: &Address,
        sender: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), AssetError>;

    /// Moves `amount` from `from` to `to` on behalf of `spender`, consuming
    /// allowance that `from` granted to `spender`.
    fn transfer_from(
        &mut self,
        asset: &Address,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), AssetError>;

    /// Sets the allowance `owner` grants to `spender`, replacing any
    /// previous value.
    fn approve(
        &mut self,
        asset: &Address,
        owner: &Address,
        spender: &Address,
        amount: u64,
    ) -> Result<(), AssetError>;
}

// ---------------------------------------------------------------------------
// TokenInfo
// ---------------------------------------------------------------------------

/// Metadata and supply information for a hosted token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Address the token lives at. Doubles as its asset identifier.
    pub address: Address,
    /// Human-readable name (e.g. "PeTeCoin").
    pub name: String,
    /// Ticker symbol (e.g. "PTC").
    pub symbol: String,
    /// Account that deployed the token and received the initial supply.
    pub issuer: Address,
    /// Units in existence.
    pub total_supply: u64,
}

// ---------------------------------------------------------------------------
// TokenLedger
// ---------------------------------------------------------------------------

/// In-memory host for any number of fungible tokens.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenLedger {
    /// Token metadata keyed by token address.
    tokens: HashMap<Address, TokenInfo>,
    /// `asset -> (account -> balance)`.
    balances: HashMap<Address, HashMap<Address, u64>>,
    /// `asset -> owner -> (spender -> allowance)`.
    allowances: HashMap<Address, HashMap<Address, HashMap<Address, u64>>>,
}

impl TokenLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a token at `address` and mints `initial_supply` to `issuer`.
    ///
    /// # Errors
    ///
    /// Returns [`AssetError::DuplicateAsset`] if the address is taken.
    pub fn create_token(
        &mut self,
        address: Address,
        name: impl Into<String>,
        symbol: impl Into<String>,
        issuer: Address,
        initial_supply: u64,
    ) -> Result<&TokenInfo, AssetError> {
        if self.tokens.contains_key(&address) {
            return Err(AssetError::DuplicateAsset(address));
        }

        let info = TokenInfo {
            address,
            name: name.into(),
            symbol: symbol.into(),
            issuer,
            total_supply: initial_supply,
        };
        let mut holders = HashMap::new();
        if initial_supply > 0 {
            holders.insert(issuer, initial_supply);
        }
        self.balances.insert(address, holders);
        self.allowances.insert(address, HashMap::new());

        tracing::debug!(asset = %address, issuer = %issuer, supply = initial_supply, "token created");
        Ok(self.tokens.entry(address).or_insert(info))
    }

    /// Mints `amount` new units to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`AssetError::UnknownAsset`] or [`AssetError::Overflow`].
    pub fn mint(&mut self, asset: &Address, to: &Address, amount: u64) -> Result<u64, AssetError> {
        let info = self
            .tokens
            .get_mut(asset)
            .ok_or(AssetError::UnknownAsset(*asset))?;
        let holders = self
            .balances
            .get_mut(asset)
            .ok_or(AssetError::UnknownAsset(*asset))?;

        let new_supply = info
            .total_supply
            .checked_add(amount)
            .ok_or(AssetError::Overflow { amount })?;
        let current = holders.get(to).copied().unwrap_or(0);
        let new_balance = current
            .checked_add(amount)
            .ok_or(AssetError::Overflow { amount })?;

        info.total_supply = new_supply;
        holders.insert(*to, new_balance);
        Ok(new_balance)
    }

    /// Returns metadata for a token, or `None` if nothing lives at `asset`.
    pub fn token_info(&self, asset: &Address) -> Option<&TokenInfo> {
        self.tokens.get(asset)
    }

    /// Total supply of a token, or 0 if it does not exist.
    pub fn total_supply(&self, asset: &Address) -> u64 {
        self.tokens.get(asset).map(|t| t.total_supply).unwrap_or(0)
    }

    /// Returns `true` if a token is deployed at `asset`.
    pub fn contains(&self, asset: &Address) -> bool {
        self.tokens.contains_key(asset)
    }

    /// Number of hosted tokens.
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    fn move_units(
        &mut self,
        asset: &Address,
        from: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), AssetError> {
        let holders = self
            .balances
            .get_mut(asset)
            .ok_or(AssetError::UnknownAsset(*asset))?;

        let from_balance = holders.get(from).copied().unwrap_or(0);
        if from_balance < amount {
            return Err(AssetError::InsufficientFunds {
                account: *from,
                balance: from_balance,
                amount,
            });
        }
        if from == to {
            return Ok(());
        }

        let to_balance = holders.get(to).copied().unwrap_or(0);
        let new_to = to_balance
            .checked_add(amount)
            .ok_or(AssetError::Overflow { amount })?;

        holders.insert(*from, from_balance - amount);
        holders.insert(*to, new_to);
        Ok(())
    }
}

impl AssetLedger for TokenLedger {
    fn balance_of(&self, asset: &Address, account: &Address) -> Result<u64, AssetError> {
        let holders = self
            .balances
            .get(asset)
            .ok_or(AssetError::UnknownAsset(*asset))?;
        Ok(holders.get(account).copied().unwrap_or(0))
    }

    fn allowance(
        &self,
        asset: &Address,
        owner: &Address,
        spender: &Address,
    ) -> Result<u64, AssetError> {
        let approvals = self
            .allowances
            .get(asset)
            .ok_or(AssetError::UnknownAsset(*asset))?;
        Ok(approvals
            .get(owner)
            .and_then(|s| s.get(spender))
            .copied()
            .unwrap_or(0))
    }

    fn transfer(
        &mut self,
        asset: &Address,
        sender: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), AssetError> {
        self.move_units(asset, sender, to, amount)
    }

    fn transfer_from(
        &mut self,
        asset: &Address,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), AssetError> {
        let allowance = self.allowance(asset, from, spender)?;
        if allowance < amount {
            return Err(AssetError::InsufficientAllowance {
                owner: *from,
                spender: *spender,
                allowance,
                amount,
            });
        }

        self.move_units(asset, from, to, amount)?;

        if let Some(entry) = self
            .allowances
            .get_mut(asset)
            .and_then(|a| a.get_mut(from))
            .and_then(|s| s.get_mut(spender))
        {
            *entry -= amount;
        }
        Ok(())
    }

    fn approve(
        &mut self,
        asset: &Address,
        owner: &Address,
        spender: &Address,
        amount: u64,
    ) -> Result<(), AssetError> {
        let approvals = self
            .allowances
            .get_mut(asset)
            .ok_or(AssetError::UnknownAsset(*asset))?;
        approvals.entry(*owner).or_default().insert(*spender, amount);
        Ok(())
    }
}
