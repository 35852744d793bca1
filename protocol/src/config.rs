//! # Protocol Configuration & Constants
//!
//! Every fee parameter and sizing constant in Safebox lives here. The
//! contracts crate reads these when it builds its fee schedules, so a change
//! here is a change to what every depositor pays. Treat edits accordingly.

// ---------------------------------------------------------------------------
// Addresses
// ---------------------------------------------------------------------------

/// Length of an account address in bytes. Matches the 20-byte accounts of
/// the host ledgers Safebox was first deployed against.
pub const ADDRESS_LENGTH: usize = 20;

/// Prefix used when rendering addresses as text.
pub const ADDRESS_HEX_PREFIX: &str = "0x";

// ---------------------------------------------------------------------------
// Fee Parameters
// ---------------------------------------------------------------------------

/// Basis-point denominator. 10_000 bps = 100%.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Deposits at or above this amount pay the proportional rate; deposits
/// below it pay the flat fee. A policy constant, not derived from anything.
pub const FEE_THRESHOLD: u64 = 1_000;

/// Proportional rate of the first-generation vault: 10 bps = 0.1%.
pub const V1_FEE_RATE_BPS: u64 = 10;

/// Flat fee of the first-generation vault for deposits under the threshold.
pub const V1_FLAT_FEE: u64 = 1;

/// Proportional rate of the second-generation vault: 20 bps = 0.2%.
pub const V2_FEE_RATE_BPS: u64 = 20;

/// Flat fee of the second-generation vault.
pub const V2_FLAT_FEE: u64 = 2;

// ---------------------------------------------------------------------------
// Storage Schema
// ---------------------------------------------------------------------------

/// Version tag of the vault storage schema shipped with this release.
/// Bumped whenever a field is appended to the layout.
pub const VAULT_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Reference Asset
// ---------------------------------------------------------------------------

/// Supply minted to the issuer when a reference token is created without an
/// explicit amount.
pub const DEFAULT_TOKEN_SUPPLY: u64 = 5_000;
