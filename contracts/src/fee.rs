//! # Deposit Fee Schedule
//!
//! Two-tier pricing: deposits at or above the threshold pay a proportional
//! rate in basis points, deposits below it pay a flat fee. The flat tier
//! exists so small deposits never round their fee down to zero.
//!
//! ```text
//! amount >= threshold  ->  fee = floor(amount * rate_bps / 10_000)
//! amount <  threshold  ->  fee = flat_fee
//! net = amount - fee
//! ```

use safebox_protocol::config::{
    BPS_DENOMINATOR, FEE_THRESHOLD, V1_FEE_RATE_BPS, V1_FLAT_FEE, V2_FEE_RATE_BPS, V2_FLAT_FEE,
};
use serde::{Deserialize, Serialize};

use crate::error::VaultError;

/// Fee parameters for one vault generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Smallest amount charged the proportional rate.
    pub threshold: u64,
    /// Proportional rate in basis points.
    pub rate_bps: u64,
    /// Fee charged below the threshold.
    pub flat_fee: u64,
}

/// Split of a deposit into fee and net credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeQuote {
    /// Units retained as fee.
    pub fee: u64,
    /// Units credited to the depositor.
    pub net: u64,
}

impl FeeSchedule {
    /// 0.1% above the threshold, 1 unit below it.
    pub const V1: FeeSchedule = FeeSchedule {
        threshold: FEE_THRESHOLD,
        rate_bps: V1_FEE_RATE_BPS,
        flat_fee: V1_FLAT_FEE,
    };

    /// 0.2% above the threshold, 2 units below it.
    pub const V2: FeeSchedule = FeeSchedule {
        threshold: FEE_THRESHOLD,
        rate_bps: V2_FEE_RATE_BPS,
        flat_fee: V2_FLAT_FEE,
    };

    /// Fee charged on a deposit of `amount`. Always rounds down.
    pub fn fee_for(&self, amount: u64) -> u64 {
        if amount >= self.threshold {
            // u128 so that `amount * rate` cannot overflow; the quotient is
            // at most `amount` as long as rate_bps <= BPS_DENOMINATOR.
            let fee = (amount as u128 * self.rate_bps as u128) / BPS_DENOMINATOR as u128;
            u64::try_from(fee).unwrap_or(u64::MAX)
        } else {
            self.flat_fee
        }
    }

    /// Splits `amount` into fee and net credit.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidAmount`] for zero and
    /// [`VaultError::DepositBelowFee`] when the fee exceeds the deposit.
    pub fn quote(&self, amount: u64) -> Result<FeeQuote, VaultError> {
        if amount == 0 {
            return Err(VaultError::InvalidAmount);
        }
        let fee = self.fee_for(amount);
        let net = amount
            .checked_sub(fee)
            .ok_or(VaultError::DepositBelowFee { amount, fee })?;
        Ok(FeeQuote { fee, net })
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        FeeSchedule::V1
    }
}
