// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Safebox Protocol — Core Primitives
//!
//! The building blocks every Safebox contract stands on. Nothing in here
//! knows what a vault is; it only knows how accounts are named, how an
//! external fungible asset is moved, and how persistent contract state is
//! laid out so that logic can be swapped underneath it.
//!
//! ## Modules
//!
//! - **address** — 20-byte account identifiers and deterministic derivation.
//! - **asset** — the Asset Interface the vault consumes, plus an in-memory
//!   multi-token ledger that implements it.
//! - **storage** — slot-addressed persistent storage and the versioned
//!   schema descriptors that make upgrades safe.
//! - **config** — protocol constants. Fee parameters live here and nowhere
//!   else.
//!
//! ## Design Philosophy
//!
//! 1. All amounts are `u64` in the asset's smallest unit. No floating point.
//! 2. Every fallible operation returns a typed error. No panics on input.
//! 3. Every public state type is serde-serializable.

pub mod address;
pub mod asset;
pub mod config;
pub mod storage;

pub use address::Address;
pub use asset::{AssetError, AssetLedger, TokenInfo, TokenLedger};
pub use storage::{
    FieldDescriptor, FieldKind, SlotKey, SlotStorage, StorageError, StorageLayout, StorageValue,
    ValueKind,
};
