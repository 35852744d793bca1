//! # Initialization Guard
//!
//! Logic deployed behind a proxy never gets its constructor run against the
//! proxy's storage, so setup happens through an explicit `initialize` call
//! instead. [`InitState`] is the two-state machine that makes that call
//! one-shot:
//!
//! ```text
//! Uninitialized --initialize--> Initialized   (terminal)
//! ```
//!
//! The state is derived from the storage flag on every call, so it is per
//! storage: initializing an implementation's own storage says nothing about
//! any proxy pointing at it.

use serde::{Deserialize, Serialize};

use crate::error::VaultError;

/// Lifecycle of a vault's persistent storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitState {
    /// Storage is blank; only `initialize` is accepted.
    Uninitialized,
    /// Administrator set; `initialize` is no longer accepted.
    Initialized,
}

impl InitState {
    /// Reads the state from the persisted flag.
    pub fn from_flag(initialized: bool) -> Self {
        if initialized {
            InitState::Initialized
        } else {
            InitState::Uninitialized
        }
    }

    /// The flag value to persist for this state.
    pub fn as_flag(self) -> bool {
        matches!(self, InitState::Initialized)
    }

    /// Performs the `initialize` transition.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::AlreadyInitialized`] from the terminal state.
    pub fn initialize(self) -> Result<InitState, VaultError> {
        match self {
            InitState::Uninitialized => Ok(InitState::Initialized),
            InitState::Initialized => Err(VaultError::AlreadyInitialized),
        }
    }

    /// Gate for every mutating operation other than `initialize`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NotInitialized`] before setup has run.
    pub fn require_initialized(self) -> Result<(), VaultError> {
        match self {
            InitState::Initialized => Ok(()),
            InitState::Uninitialized => Err(VaultError::NotInitialized),
        }
    }
}
