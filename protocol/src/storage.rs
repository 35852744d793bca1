//! # Slot Storage & Schema Descriptors
//!
//! Contract state that must outlive the logic operating on it lives in a
//! [`SlotStorage`]: a flat map from [`SlotKey`] to [`StorageValue`]. A slot
//! key is a stable field number plus zero or more mapping keys, so
//! `balances[alice][ptc]` is `SlotKey { slot: 2, keys: [alice, ptc] }`.
//!
//! Because the bytes outlive the code, every piece of logic that touches a
//! storage publishes a [`StorageLayout`] naming each field it uses, its slot
//! number and its kind. Storage remembers the layout it was last adopted
//! with, and a new layout is only accepted if it *extends* that one:
//!
//! ```text
//! recorded:  [0 owner: Address] [1 initialized: Bool] [2 balances: Map2<Amount>]
//! candidate: [0 owner: Address] [1 initialized: Bool] [2 balances: Map2<Amount>] [3 ...]
//!            └──────────── identical prefix ─────────────────────────────────┘  appended
//! ```
//!
//! Renaming, retyping, reordering or dropping a field is rejected, which is
//! what keeps a logic swap from ever reinterpreting old values as the wrong
//! field.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use thiserror::Error;

use crate::address::Address;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by slot storage and layout checks.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// A slot holds a value of a different kind than the reader expected.
    #[error("storage type mismatch at slot {slot}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Field number being read.
        slot: u16,
        /// Kind the reader asked for.
        expected: ValueKind,
        /// Kind actually stored.
        found: ValueKind,
    },

    /// A candidate layout does not extend the recorded one.
    #[error("incompatible storage layout (v{recorded} -> v{candidate}): {reason}")]
    IncompatibleLayout {
        /// Version of the layout the storage was written with.
        recorded: u32,
        /// Version of the layout being adopted.
        candidate: u32,
        /// What broke compatibility.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// The kind of value a field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// An [`Address`].
    Address,
    /// A boolean flag.
    Bool,
    /// A `u64` amount.
    Amount,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Address => write!(f, "Address"),
            ValueKind::Bool => write!(f, "Bool"),
            ValueKind::Amount => write!(f, "Amount"),
        }
    }
}

/// A single stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageValue {
    /// An address.
    Address(Address),
    /// A boolean.
    Bool(bool),
    /// An amount.
    Amount(u64),
}

impl StorageValue {
    /// The kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            StorageValue::Address(_) => ValueKind::Address,
            StorageValue::Bool(_) => ValueKind::Bool,
            StorageValue::Amount(_) => ValueKind::Amount,
        }
    }
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Shape of a field: a single value, or a mapping from `keys` addresses to
/// a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    /// One value.
    Scalar(ValueKind),
    /// A mapping keyed by `keys` addresses.
    Mapping {
        /// Number of address keys.
        keys: u8,
        /// Kind of the mapped value.
        value: ValueKind,
    },
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Scalar(v) => write!(f, "{}", v),
            FieldKind::Mapping { keys, value } => write!(f, "Map{}<{}>", keys, value),
        }
    }
}

/// One persistent field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Stable field number. Never reused for another field.
    pub slot: u16,
    /// Field name, part of the compatibility check.
    pub name: String,
    /// Shape of the field.
    pub kind: FieldKind,
}

/// Versioned, ordered list of the fields a piece of logic persists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLayout {
    /// Schema version. Must not decrease across upgrades.
    pub version: u32,
    /// Fields in declaration order.
    pub fields: Vec<FieldDescriptor>,
}

impl StorageLayout {
    /// Starts an empty layout.
    pub fn new(version: u32) -> Self {
        Self {
            version,
            fields: Vec::new(),
        }
    }

    /// Appends a scalar field.
    pub fn scalar(mut self, slot: u16, name: &str, value: ValueKind) -> Self {
        self.fields.push(FieldDescriptor {
            slot,
            name: name.to_string(),
            kind: FieldKind::Scalar(value),
        });
        self
    }

    /// Appends a mapping field.
    pub fn mapping(mut self, slot: u16, name: &str, keys: u8, value: ValueKind) -> Self {
        self.fields.push(FieldDescriptor {
            slot,
            name: name.to_string(),
            kind: FieldKind::Mapping { keys, value },
        });
        self
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Checks that `self` is an append-only extension of `recorded`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::IncompatibleLayout`] if the version goes
    /// backwards, a recorded field is missing or changed, or slot numbers
    /// repeat.
    pub fn check_extends(&self, recorded: &StorageLayout) -> Result<(), StorageError> {
        let incompatible = |reason: String| StorageError::IncompatibleLayout {
            recorded: recorded.version,
            candidate: self.version,
            reason,
        };

        if self.version < recorded.version {
            return Err(incompatible("schema version decreased".into()));
        }
        if self.fields.len() < recorded.fields.len() {
            return Err(incompatible(format!(
                "{} recorded fields, candidate declares only {}",
                recorded.fields.len(),
                self.fields.len()
            )));
        }
        for (old, new) in recorded.fields.iter().zip(&self.fields) {
            if old != new {
                return Err(incompatible(format!(
                    "field {} `{}`: {} changed to slot {} `{}`: {}",
                    old.slot, old.name, old.kind, new.slot, new.name, new.kind
                )));
            }
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.slot) {
                return Err(incompatible(format!("slot {} declared twice", field.slot)));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SlotStorage
// ---------------------------------------------------------------------------

/// Address of one stored value: field number plus mapping keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotKey {
    /// Field number.
    pub slot: u16,
    /// Mapping keys, empty for scalars.
    pub keys: Vec<Address>,
}

impl SlotKey {
    /// Key of a scalar field.
    pub fn scalar(slot: u16) -> Self {
        Self {
            slot,
            keys: Vec::new(),
        }
    }

    /// Key of a mapping entry.
    pub fn mapped(slot: u16, keys: &[Address]) -> Self {
        Self {
            slot,
            keys: keys.to_vec(),
        }
    }
}

/// Persistent key/value storage owned by a contract instance.
///
/// Reads of absent slots return the zero value of the requested kind, the
/// same way a fresh account's storage reads as all zeros.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotStorage {
    #[serde(with = "slot_entries")]
    slots: BTreeMap<SlotKey, StorageValue>,
    /// Layout the storage was last adopted with.
    schema: Option<StorageLayout>,
}

impl SlotStorage {
    /// Creates blank storage with no recorded schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// The layout this storage was last adopted with, if any.
    pub fn schema(&self) -> Option<&StorageLayout> {
        self.schema.as_ref()
    }

    /// Checks `layout` against the recorded schema without adopting it.
    pub fn check_schema(&self, layout: &StorageLayout) -> Result<(), StorageError> {
        match &self.schema {
            Some(recorded) => layout.check_extends(recorded),
            None => Ok(()),
        }
    }

    /// Records `layout` as the storage schema if it extends the current one.
    pub fn adopt_schema(&mut self, layout: &StorageLayout) -> Result<(), StorageError> {
        self.check_schema(layout)?;
        if self.schema.as_ref() != Some(layout) {
            tracing::debug!(version = layout.version, fields = layout.fields.len(), "storage schema adopted");
            self.schema = Some(layout.clone());
        }
        Ok(())
    }

    /// Raw read.
    pub fn get(&self, key: &SlotKey) -> Option<&StorageValue> {
        self.slots.get(key)
    }

    /// Raw write.
    pub fn set(&mut self, key: SlotKey, value: StorageValue) {
        self.slots.insert(key, value);
    }

    /// Reads an address, defaulting to [`Address::ZERO`].
    pub fn read_address(&self, key: &SlotKey) -> Result<Address, StorageError> {
        match self.slots.get(key) {
            None => Ok(Address::ZERO),
            Some(StorageValue::Address(a)) => Ok(*a),
            Some(other) => Err(mismatch(key, ValueKind::Address, other)),
        }
    }

    /// Reads a flag, defaulting to `false`.
    pub fn read_bool(&self, key: &SlotKey) -> Result<bool, StorageError> {
        match self.slots.get(key) {
            None => Ok(false),
            Some(StorageValue::Bool(b)) => Ok(*b),
            Some(other) => Err(mismatch(key, ValueKind::Bool, other)),
        }
    }

    /// Reads an amount, defaulting to 0.
    pub fn read_amount(&self, key: &SlotKey) -> Result<u64, StorageError> {
        match self.slots.get(key) {
            None => Ok(0),
            Some(StorageValue::Amount(n)) => Ok(*n),
            Some(other) => Err(mismatch(key, ValueKind::Amount, other)),
        }
    }

    /// Number of populated slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if nothing has ever been written.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

fn mismatch(key: &SlotKey, expected: ValueKind, found: &StorageValue) -> StorageError {
    StorageError::TypeMismatch {
        slot: key.slot,
        expected,
        found: found.kind(),
    }
}

/// Serializes the slot map as a list of `{ key, value }` entries, since
/// [`SlotKey`] cannot be a JSON object key.
mod slot_entries {
    use super::{SlotKey, StorageValue};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    #[derive(Serialize, Deserialize)]
    struct Entry {
        key: SlotKey,
        value: StorageValue,
    }

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<SlotKey, StorageValue>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeSeq;
        let mut seq = serializer.serialize_seq(Some(map.len()))?;
        for (key, value) in map {
            seq.serialize_element(&Entry {
                key: key.clone(),
                value: *value,
            })?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<SlotKey, StorageValue>, D::Error> {
        let entries: Vec<Entry> = Vec::deserialize(deserializer)?;
        Ok(entries.into_iter().map(|e| (e.key, e.value)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_layout() -> StorageLayout {
        StorageLayout::new(1)
            .scalar(0, "owner", ValueKind::Address)
            .scalar(1, "initialized", ValueKind::Bool)
            .mapping(2, "balances", 2, ValueKind::Amount)
    }

    #[test]
    fn absent_slots_read_as_zero() {
        let storage = SlotStorage::new();
        assert_eq!(storage.read_address(&SlotKey::scalar(0)).unwrap(), Address::ZERO);
        assert!(!storage.read_bool(&SlotKey::scalar(1)).unwrap());
        assert_eq!(storage.read_amount(&SlotKey::scalar(2)).unwrap(), 0);
        assert!(storage.is_empty());
    }

    #[test]
    fn typed_reads_reject_wrong_kind() {
        let mut storage = SlotStorage::new();
        storage.set(SlotKey::scalar(0), StorageValue::Bool(true));
        assert_eq!(
            storage.read_address(&SlotKey::scalar(0)).unwrap_err(),
            StorageError::TypeMismatch {
                slot: 0,
                expected: ValueKind::Address,
                found: ValueKind::Bool,
            }
        );
    }

    #[test]
    fn mapped_keys_are_distinct() {
        let mut storage = SlotStorage::new();
        let alice = Address::from_label("alice");
        let ptc = Address::from_label("ptc");
        storage.set(SlotKey::mapped(2, &[alice, ptc]), StorageValue::Amount(7));
        assert_eq!(storage.read_amount(&SlotKey::mapped(2, &[alice, ptc])).unwrap(), 7);
        assert_eq!(storage.read_amount(&SlotKey::mapped(2, &[ptc, alice])).unwrap(), 0);
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn identical_layout_extends_itself() {
        assert!(base_layout().check_extends(&base_layout()).is_ok());
    }

    #[test]
    fn appended_field_is_compatible() {
        let extended = StorageLayout::new(2)
            .scalar(0, "owner", ValueKind::Address)
            .scalar(1, "initialized", ValueKind::Bool)
            .mapping(2, "balances", 2, ValueKind::Amount)
            .mapping(3, "fees", 1, ValueKind::Amount);
        assert!(extended.check_extends(&base_layout()).is_ok());
    }

    #[test]
    fn retyped_field_is_incompatible() {
        let retyped = StorageLayout::new(2)
            .scalar(0, "owner", ValueKind::Address)
            .scalar(1, "initialized", ValueKind::Amount)
            .mapping(2, "balances", 2, ValueKind::Amount);
        assert!(matches!(
            retyped.check_extends(&base_layout()),
            Err(StorageError::IncompatibleLayout { recorded: 1, candidate: 2, .. })
        ));
    }

    #[test]
    fn reordered_fields_are_incompatible() {
        let reordered = StorageLayout::new(1)
            .scalar(1, "initialized", ValueKind::Bool)
            .scalar(0, "owner", ValueKind::Address)
            .mapping(2, "balances", 2, ValueKind::Amount);
        assert!(reordered.check_extends(&base_layout()).is_err());
    }

    #[test]
    fn dropped_field_is_incompatible() {
        let shorter = StorageLayout::new(1).scalar(0, "owner", ValueKind::Address);
        assert!(shorter.check_extends(&base_layout()).is_err());
    }

    #[test]
    fn version_must_not_decrease() {
        let mut older = base_layout();
        older.version = 0;
        assert!(older.check_extends(&base_layout()).is_err());
    }

    #[test]
    fn duplicate_slot_is_rejected() {
        let dup = base_layout().scalar(2, "shadow", ValueKind::Amount);
        assert!(dup.check_extends(&base_layout()).is_err());
    }

    #[test]
    fn adopt_schema_records_and_guards() {
        let mut storage = SlotStorage::new();
        assert!(storage.schema().is_none());
        storage.adopt_schema(&base_layout()).unwrap();
        assert_eq!(storage.schema(), Some(&base_layout()));

        let shorter = StorageLayout::new(1).scalar(0, "owner", ValueKind::Address);
        assert!(storage.adopt_schema(&shorter).is_err());
        assert_eq!(storage.schema(), Some(&base_layout()));
    }

    #[test]
    fn storage_serialization_roundtrip() {
        let mut storage = SlotStorage::new();
        let alice = Address::from_label("alice");
        storage.adopt_schema(&base_layout()).unwrap();
        storage.set(SlotKey::scalar(0), StorageValue::Address(alice));
        storage.set(SlotKey::mapped(2, &[alice, alice]), StorageValue::Amount(42));

        let json = serde_json::to_string(&storage).expect("serialize");
        let recovered: SlotStorage = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(recovered, storage);
    }
}
