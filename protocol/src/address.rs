//! # Account Addresses
//!
//! Every participant in Safebox — depositors, administrators, assets, vaults,
//! proxies, factories — is named by a 20-byte [`Address`]. Contract
//! addresses are derived deterministically from the deployer and the
//! deployer's nonce, so the same deployment sequence always yields the same
//! addresses:
//!
//! ```text
//! address = BLAKE3("safebox.deploy" || deployer || nonce_be)[..20]
//! ```
//!
//! Externally-owned accounts (people) are usually derived from a label via
//! [`Address::from_label`], which keeps test fixtures and scenario files
//! readable.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::config::{ADDRESS_HEX_PREFIX, ADDRESS_LENGTH};

const DEPLOY_DOMAIN: &[u8] = b"safebox.deploy";
const LABEL_DOMAIN: &[u8] = b"safebox.label";

/// Errors produced when parsing an address from text.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AddressParseError {
    /// The text was not valid hexadecimal.
    #[error("invalid hex in address: {0}")]
    InvalidHex(String),

    /// The decoded byte string had the wrong length.
    #[error("invalid address length: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// Required byte length.
        expected: usize,
        /// Decoded byte length.
        got: usize,
    },
}

/// A 20-byte account identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    /// The all-zero address. Never holds code and never signs anything.
    pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

    /// Wraps raw bytes.
    pub const fn from_bytes(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Returns the raw 20 bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    /// Returns `true` for [`Address::ZERO`].
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LENGTH]
    }

    /// Derives the address of the contract that `deployer` creates with
    /// its `nonce`-th deployment.
    pub fn derive(deployer: &Address, nonce: u64) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(DEPLOY_DOMAIN);
        hasher.update(&deployer.0);
        hasher.update(&nonce.to_be_bytes());
        Self::truncate(hasher.finalize().as_bytes())
    }

    /// Derives a stable address from a human-readable label such as
    /// `"alice"`. Distinct labels give distinct addresses; the domain
    /// separator keeps these from ever colliding with deployment addresses.
    pub fn from_label(label: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(LABEL_DOMAIN);
        hasher.update(label.as_bytes());
        Self::truncate(hasher.finalize().as_bytes())
    }

    /// Hex encoding with the `0x` prefix.
    pub fn to_hex(&self) -> String {
        format!("{}{}", ADDRESS_HEX_PREFIX, hex::encode(self.0))
    }

    /// Parses a hex address, with or without the `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, AddressParseError> {
        let body = s.strip_prefix(ADDRESS_HEX_PREFIX).unwrap_or(s);
        let bytes = hex::decode(body).map_err(|e| AddressParseError::InvalidHex(e.to_string()))?;
        if bytes.len() != ADDRESS_LENGTH {
            return Err(AddressParseError::InvalidLength {
                expected: ADDRESS_LENGTH,
                got: bytes.len(),
            });
        }
        let mut arr = [0u8; ADDRESS_LENGTH];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    fn truncate(digest: &[u8; 32]) -> Self {
        let mut arr = [0u8; ADDRESS_LENGTH];
        arr.copy_from_slice(&digest[..ADDRESS_LENGTH]);
        Self(arr)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({}...)", &self.to_hex()[..10])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

// Addresses serialize as hex strings so they can key JSON objects.
impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
