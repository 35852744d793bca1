//! # Safebox Contracts
//!
//! Custodial fee vaults and the machinery to upgrade and mass-deploy them:
//!
//! - **Safe** — a self-contained vault. Depositors park assets, a fee is
//!   withheld on every deposit, and the administrator harvests accrued fees.
//! - **SafeUpgradeable / SafeUpgradeableV2** — stateless vault logic that
//!   runs against a proxy's storage. Generations differ only in pricing and
//!   share one append-only storage layout.
//! - **SafeProxy** — holds storage and an implementation pointer, forwards
//!   every vault call, and lets its administrator swap the pointer.
//! - **SafeFactory** — deploys safes and proxies for callers and keeps a
//!   log of what it deployed.
//! - **Runtime** — an in-memory host that owns instances, allocates
//!   addresses and routes calls.
//!
//! ## Design Principles
//!
//! 1. All monetary operations use checked arithmetic. Overflow is an error,
//!    never a wrap.
//! 2. Every operation validates and precomputes before the first external
//!    transfer, and a failed call leaves vault storage unchanged.
//! 3. Lifecycle is explicit: [`init_guard::InitState`], not a loose flag.
//! 4. Every privileged operation checks its caller against the right
//!    administrator.

pub mod error;
pub mod factory;
pub mod fee;
pub mod init_guard;
pub mod ledger;
pub mod proxy;
pub mod runtime;
pub mod safe;
pub mod upgradeable;

pub use error::VaultError;
pub use factory::{DeploymentKind, DeploymentRecord, Deployer, SafeFactory};
pub use fee::{FeeQuote, FeeSchedule};
pub use init_guard::InitState;
pub use ledger::{CallContext, DepositReceipt, FeeHarvest, LedgerStore, WithdrawReceipt};
pub use proxy::{CodeResolver, SafeProxy};
pub use runtime::Runtime;
pub use safe::Safe;
pub use upgradeable::{
    execute_atomic, vault_layout, CallOutput, ImplementationVersion, SafeCall, SafeImplementation,
    SafeUpgradeable, SafeUpgradeableV2,
};
