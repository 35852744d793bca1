//! # SafeProxy — upgradeable dispatch shell
//!
//! A proxy owns storage and a pointer to an implementation, and nothing
//! else. Its own surface is four calls:
//!
//! - [`get_owner`](SafeProxy::get_owner) — the proxy administrator
//! - [`get_implementation`](SafeProxy::get_implementation) — the pointer
//! - [`set_implementation`](SafeProxy::set_implementation) — bootstrap
//!   hook, no code check
//! - [`upgrade_to`](SafeProxy::upgrade_to) — checked pointer swap
//!
//! Every other call goes through [`forward`](SafeProxy::forward): the
//! pointer is resolved to a [`SafeImplementation`] at call time and run
//! against the proxy's storage, with the proxy's address as `this` and the
//! original caller preserved.
//!
//! The proxy administrator (who may upgrade) is a field of the proxy
//! itself. The vault administrator (who may harvest fees) lives in the
//! forwarded storage and is set through `initialize`. The two are
//! independent and may differ.

use safebox_protocol::{Address, AssetLedger, SlotStorage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::VaultError;
use crate::ledger::CallContext;
use crate::upgradeable::{execute_atomic, CallOutput, SafeCall, SafeImplementation};

/// Resolves an address to deployed implementation code.
pub trait CodeResolver {
    /// The logic deployed at `address`, or `None` if there is no
    /// implementation code there.
    fn resolve(&self, address: &Address) -> Option<Arc<dyn SafeImplementation>>;
}

/// A proxy instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafeProxy {
    address: Address,
    owner: Address,
    implementation: Address,
    storage: SlotStorage,
}

impl SafeProxy {
    /// Creates a proxy at `address` administered by `owner`, pointing at
    /// `implementation`. The pointer is not checked, matching
    /// [`set_implementation`](Self::set_implementation).
    pub fn new(address: Address, owner: Address, implementation: Address) -> Self {
        Self {
            address,
            owner,
            implementation,
            storage: SlotStorage::new(),
        }
    }

    /// The proxy's address. Depositors approve this address, and forwarded
    /// logic custodies assets here.
    pub fn address(&self) -> Address {
        self.address
    }

    /// The proxy administrator.
    pub fn get_owner(&self) -> Address {
        self.owner
    }

    /// The current implementation pointer.
    pub fn get_implementation(&self) -> Address {
        self.implementation
    }

    /// The proxy's storage, as written by forwarded calls.
    pub fn storage(&self) -> &SlotStorage {
        &self.storage
    }

    fn ensure_owner(&self, caller: &Address, action: &str) -> Result<(), VaultError> {
        if *caller != self.owner {
            warn!(proxy = %self.address, caller = %caller, action, "rejected: caller is not proxy owner");
            return Err(VaultError::NotOwner {
                caller: *caller,
                owner: self.owner,
            });
        }
        Ok(())
    }

    /// Points the proxy at `target` without checking for code.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NotOwner`] unless `caller` is the proxy
    /// administrator.
    pub fn set_implementation(&mut self, caller: Address, target: Address) -> Result<(), VaultError> {
        self.ensure_owner(&caller, "set_implementation")?;
        info!(proxy = %self.address, from = %self.implementation, to = %target, "implementation pointer set");
        self.implementation = target;
        Ok(())
    }

    /// Swaps the implementation to `target`.
    ///
    /// No data is migrated: the new logic reads the same storage. That is
    /// only safe because the target's layout is checked to extend the layout
    /// the storage was written with, and the storage then records the new
    /// layout.
    ///
    /// # Errors
    ///
    /// - [`VaultError::NotOwner`] unless `caller` is the proxy administrator.
    /// - [`VaultError::ImplementationNotContract`] if `target` has no
    ///   implementation code.
    /// - [`VaultError::IncompatibleLayout`] if the target's layout does not
    ///   extend the recorded one.
    pub fn upgrade_to(
        &mut self,
        caller: Address,
        target: Address,
        code: &dyn CodeResolver,
    ) -> Result<(), VaultError> {
        self.ensure_owner(&caller, "upgrade_to")?;

        let logic = code
            .resolve(&target)
            .ok_or(VaultError::ImplementationNotContract(target))?;
        self.storage.adopt_schema(logic.layout())?;

        info!(
            proxy = %self.address,
            from = %self.implementation,
            to = %target,
            logic = logic.name(),
            version = logic.version(),
            "proxy upgraded"
        );
        self.implementation = target;
        Ok(())
    }

    /// Forwards `call` to the current implementation, executing against the
    /// proxy's storage. Failed calls leave the storage unchanged.
    ///
    /// # Errors
    ///
    /// [`VaultError::ImplementationNotContract`] if the pointer has no code,
    /// plus whatever the implementation returns.
    pub fn forward(
        &mut self,
        caller: Address,
        call: &SafeCall,
        code: &dyn CodeResolver,
        assets: &mut dyn AssetLedger,
    ) -> Result<CallOutput, VaultError> {
        let logic = code
            .resolve(&self.implementation)
            .ok_or(VaultError::ImplementationNotContract(self.implementation))?;
        let ctx = CallContext::new(caller, self.address);
        execute_atomic(logic.as_ref(), &mut self.storage, &ctx, call, assets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upgradeable::{ImplementationVersion, SafeUpgradeable};
    use safebox_protocol::{StorageLayout, TokenLedger, ValueKind};
    use std::collections::HashMap;

    #[derive(Default)]
    struct Code(HashMap<Address, Arc<dyn SafeImplementation>>);

    impl CodeResolver for Code {
        fn resolve(&self, address: &Address) -> Option<Arc<dyn SafeImplementation>> {
            self.0.get(address).cloned()
        }
    }

    /// A generation that renamed a field. Must never be accepted over
    /// storage written by the shipped layout.
    #[derive(Debug)]
    struct RenamedFields {
        layout: StorageLayout,
    }

    impl SafeImplementation for RenamedFields {
        fn name(&self) -> &'static str {
            "RenamedFields"
        }
        fn version(&self) -> u32 {
            3
        }
        fn layout(&self) -> &StorageLayout {
            &self.layout
        }
        fn fee_schedule(&self) -> crate::fee::FeeSchedule {
            crate::fee::FeeSchedule::V1
        }
    }

    struct Fixture {
        proxy: SafeProxy,
        code: Code,
        assets: TokenLedger,
        owner: Address,
        wallet: Address,
        asset: Address,
        v1: Address,
        v2: Address,
    }

    fn fixture() -> Fixture {
        let owner = Address::from_label("owner");
        let wallet = Address::from_label("test_wallet");
        let asset = Address::from_label("ptc");
        let v1 = Address::from_label("impl_v1");
        let v2 = Address::from_label("impl_v2");
        let mut code = Code::default();
        code.0.insert(v1, ImplementationVersion::V1.build());
        code.0.insert(v2, ImplementationVersion::V2.build());

        let proxy = SafeProxy::new(Address::from_label("proxy"), owner, v1);
        let mut assets = TokenLedger::new();
        assets
            .create_token(asset, "PeTeCoin", "PTC", wallet, 5_000)
            .unwrap();
        assets.approve(&asset, &wallet, &proxy.address(), 5_000).unwrap();

        Fixture { proxy, code, assets, owner, wallet, asset, v1, v2 }
    }

    #[test]
    fn deployed_with_owner_and_pointer() {
        let f = fixture();
        assert_eq!(f.proxy.get_owner(), f.owner);
        assert_eq!(f.proxy.get_implementation(), f.v1);
    }

    #[test]
    fn forwarded_state_lives_in_proxy() {
        let mut f = fixture();
        f.proxy
            .forward(f.owner, &SafeCall::Initialize { admin: f.owner }, &f.code, &mut f.assets)
            .unwrap();
        f.proxy
            .forward(f.wallet, &SafeCall::Deposit { asset: f.asset, amount: 1_000 }, &f.code, &mut f.assets)
            .unwrap();

        assert_eq!(f.assets.balance_of(&f.asset, &f.wallet).unwrap(), 4_000);
        assert_eq!(f.assets.balance_of(&f.asset, &f.proxy.address()).unwrap(), 1_000);
        let balance = f
            .proxy
            .forward(f.wallet, &SafeCall::Balances { depositor: f.wallet, asset: f.asset }, &f.code, &mut f.assets)
            .unwrap();
        assert_eq!(balance.amount(), Some(999));
        assert!(!f.proxy.storage().is_empty());
    }

    #[test]
    fn non_owner_cannot_upgrade() {
        let mut f = fixture();
        let err = f.proxy.upgrade_to(f.wallet, f.v2, &f.code).unwrap_err();
        assert!(matches!(err, VaultError::NotOwner { .. }));
        assert_eq!(f.proxy.get_implementation(), f.v1);
    }

    #[test]
    fn upgrade_target_must_be_contract() {
        let mut f = fixture();
        let err = f.proxy.upgrade_to(f.owner, Address::ZERO, &f.code).unwrap_err();
        assert_eq!(err, VaultError::ImplementationNotContract(Address::ZERO));
        assert_eq!(f.proxy.get_implementation(), f.v1);
    }

    #[test]
    fn owner_can_upgrade() {
        let mut f = fixture();
        f.proxy.upgrade_to(f.owner, f.v2, &f.code).unwrap();
        assert_eq!(f.proxy.get_implementation(), f.v2);
    }

    #[test]
    fn set_implementation_skips_code_check_but_forward_fails() {
        let mut f = fixture();
        let eoa = Address::from_label("newimp");
        f.proxy.set_implementation(f.owner, eoa).unwrap();
        assert_eq!(f.proxy.get_implementation(), eoa);
        let err = f
            .proxy
            .forward(f.wallet, &SafeCall::Owner, &f.code, &mut f.assets)
            .unwrap_err();
        assert_eq!(err, VaultError::ImplementationNotContract(eoa));
    }

    #[test]
    fn set_implementation_requires_owner() {
        let mut f = fixture();
        assert!(matches!(
            f.proxy.set_implementation(f.wallet, f.v2),
            Err(VaultError::NotOwner { .. })
        ));
    }

    #[test]
    fn incompatible_layout_rejected_after_storage_written() {
        let mut f = fixture();
        let renamed = Address::from_label("renamed");
        f.code.0.insert(
            renamed,
            Arc::new(RenamedFields {
                layout: StorageLayout::new(2)
                    .scalar(0, "admin", ValueKind::Address)
                    .scalar(1, "initialized", ValueKind::Bool)
                    .mapping(2, "balances", 2, ValueKind::Amount)
                    .mapping(3, "fee", 1, ValueKind::Amount),
            }),
        );
        f.proxy
            .forward(f.owner, &SafeCall::Initialize { admin: f.owner }, &f.code, &mut f.assets)
            .unwrap();

        let err = f.proxy.upgrade_to(f.owner, renamed, &f.code).unwrap_err();
        assert!(matches!(err, VaultError::IncompatibleLayout(_)));
        assert_eq!(f.proxy.get_implementation(), f.v1);
    }

    #[test]
    fn proxy_owner_and_vault_owner_are_independent() {
        let mut f = fixture();
        let treasurer = Address::from_label("treasurer");
        f.proxy
            .forward(f.owner, &SafeCall::Initialize { admin: treasurer }, &f.code, &mut f.assets)
            .unwrap();
        let vault_owner = f
            .proxy
            .forward(f.wallet, &SafeCall::Owner, &f.code, &mut f.assets)
            .unwrap();
        assert_eq!(vault_owner.address(), Some(treasurer));
        assert_eq!(f.proxy.get_owner(), f.owner);

        // The fee administrator cannot upgrade; the proxy owner cannot harvest.
        assert!(f.proxy.upgrade_to(treasurer, f.v2, &f.code).is_err());
        let err = f
            .proxy
            .forward(f.owner, &SafeCall::TakeFee { asset: f.asset }, &f.code, &mut f.assets)
            .unwrap_err();
        assert!(matches!(err, VaultError::NotOwner { .. }));
    }

    #[test]
    fn implementation_module_is_reusable_across_proxies() {
        let mut f = fixture();
        let logic: Arc<dyn SafeImplementation> = Arc::new(SafeUpgradeable::new());
        let shared = Address::from_label("shared");
        f.code.0.insert(shared, logic);

        let mut a = SafeProxy::new(Address::from_label("a"), f.owner, shared);
        let mut b = SafeProxy::new(Address::from_label("b"), f.owner, shared);
        a.forward(f.owner, &SafeCall::Initialize { admin: f.owner }, &f.code, &mut f.assets)
            .unwrap();
        b.forward(f.owner, &SafeCall::Initialize { admin: f.wallet }, &f.code, &mut f.assets)
            .unwrap();

        let owner_a = a.forward(f.wallet, &SafeCall::Owner, &f.code, &mut f.assets).unwrap();
        let owner_b = b.forward(f.wallet, &SafeCall::Owner, &f.code, &mut f.assets).unwrap();
        assert_eq!(owner_a.address(), Some(f.owner));
        assert_eq!(owner_b.address(), Some(f.wallet));
    }
}
