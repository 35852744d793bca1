//! # Runtime host
//!
//! An in-memory host that owns every deployed instance and routes calls
//! between them. It plays the part the execution environment plays for the
//! contracts:
//!
//! - deterministic addresses, derived from the deployer and a per-deployer
//!   nonce,
//! - a code table answering "is there implementation code at this address",
//! - call routing by target address: plain [`Safe`]s, implementations
//!   called directly against their own storage, and [`SafeProxy`]s that
//!   forward,
//! - the reference [`TokenLedger`] as the asset interface.

use safebox_protocol::{Address, AssetError, AssetLedger, SlotStorage, TokenLedger};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::VaultError;
use crate::factory::{Deployer, SafeFactory};
use crate::fee::FeeSchedule;
use crate::ledger::CallContext;
use crate::proxy::{CodeResolver, SafeProxy};
use crate::safe::Safe;
use crate::upgradeable::{execute_atomic, CallOutput, SafeCall, SafeImplementation};

/// Implementation code deployed at an address, together with the storage it
/// owns when called directly.
#[derive(Debug, Clone)]
pub struct ImplementationContract {
    logic: Arc<dyn SafeImplementation>,
    storage: SlotStorage,
}

impl ImplementationContract {
    pub fn logic(&self) -> &Arc<dyn SafeImplementation> {
        &self.logic
    }

    /// Storage written by direct calls. Never touched by proxy calls.
    pub fn storage(&self) -> &SlotStorage {
        &self.storage
    }
}

/// The code table.
#[derive(Debug, Default)]
pub struct CodeStore {
    contracts: HashMap<Address, ImplementationContract>,
}

impl CodeStore {
    /// Returns `true` if implementation code is deployed at `address`.
    pub fn is_contract(&self, address: &Address) -> bool {
        self.contracts.contains_key(address)
    }

    pub fn get(&self, address: &Address) -> Option<&ImplementationContract> {
        self.contracts.get(address)
    }
}

impl CodeResolver for CodeStore {
    fn resolve(&self, address: &Address) -> Option<Arc<dyn SafeImplementation>> {
        self.contracts.get(address).map(|c| Arc::clone(&c.logic))
    }
}

/// Deployed vault instances and the address allocator.
#[derive(Debug, Default)]
pub struct Instances {
    safes: HashMap<Address, Safe>,
    proxies: HashMap<Address, SafeProxy>,
    nonces: HashMap<Address, u64>,
}

impl Instances {
    /// Allocates the next address for `deployer`.
    pub fn next_address(&mut self, deployer: &Address) -> Address {
        let nonce = self.nonces.entry(*deployer).or_insert(0);
        let address = Address::derive(deployer, *nonce);
        *nonce += 1;
        address
    }

    pub fn safe(&self, address: &Address) -> Option<&Safe> {
        self.safes.get(address)
    }

    pub fn proxy(&self, address: &Address) -> Option<&SafeProxy> {
        self.proxies.get(address)
    }
}

impl Deployer for Instances {
    fn deploy_safe(&mut self, factory: &Address, owner: Address) -> Address {
        let address = self.next_address(factory);
        self.safes.insert(address, Safe::new(address, owner));
        debug!(address = %address, owner = %owner, deployer = %factory, "safe deployed");
        address
    }

    fn deploy_proxy(&mut self, factory: &Address, owner: Address, implementation: Address) -> Address {
        let address = self.next_address(factory);
        self.proxies
            .insert(address, SafeProxy::new(address, owner, implementation));
        debug!(address = %address, owner = %owner, implementation = %implementation, deployer = %factory, "proxy deployed");
        address
    }
}

/// The host. Owns the asset ledger, the code table, every instance and
/// every factory.
#[derive(Debug, Default)]
pub struct Runtime {
    assets: TokenLedger,
    code: CodeStore,
    instances: Instances,
    factories: HashMap<Address, SafeFactory>,
}

impl Runtime {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Assets ---

    /// Deploys a reference token with `initial_supply` credited to `issuer`.
    pub fn deploy_token(
        &mut self,
        issuer: Address,
        name: &str,
        symbol: &str,
        initial_supply: u64,
    ) -> Result<Address, AssetError> {
        let address = self.instances.next_address(&issuer);
        self.assets
            .create_token(address, name, symbol, issuer, initial_supply)?;
        debug!(address = %address, symbol, issuer = %issuer, initial_supply, "token deployed");
        Ok(address)
    }

    /// `owner` allows `spender` to pull up to `amount` of `asset`.
    pub fn token_approve(
        &mut self,
        owner: Address,
        asset: Address,
        spender: Address,
        amount: u64,
    ) -> Result<(), AssetError> {
        self.assets.approve(&asset, &owner, &spender, amount)
    }

    /// Mints `amount` of `asset` to `to`. Returns the new balance.
    pub fn token_mint(&mut self, asset: Address, to: Address, amount: u64) -> Result<u64, AssetError> {
        self.assets.mint(&asset, &to, amount)
    }

    pub fn balance_of(&self, asset: &Address, account: &Address) -> Result<u64, AssetError> {
        self.assets.balance_of(asset, account)
    }

    pub fn assets(&self) -> &TokenLedger {
        &self.assets
    }

    // --- Deployment ---

    /// Deploys a plain vault owned by `owner`.
    pub fn deploy_safe(&mut self, deployer: Address, owner: Address) -> Address {
        self.instances.deploy_safe(&deployer, owner)
    }

    /// Deploys a plain vault charging `schedule` instead of the default.
    pub fn deploy_safe_with_schedule(
        &mut self,
        deployer: Address,
        owner: Address,
        schedule: FeeSchedule,
    ) -> Address {
        let address = self.instances.next_address(&deployer);
        self.instances
            .safes
            .insert(address, Safe::with_schedule(address, owner, schedule));
        debug!(address = %address, owner = %owner, ?schedule, "safe deployed");
        address
    }

    /// Deploys implementation code. Its own storage starts blank and
    /// uninitialized.
    pub fn deploy_implementation(
        &mut self,
        deployer: Address,
        logic: Arc<dyn SafeImplementation>,
    ) -> Address {
        let address = self.instances.next_address(&deployer);
        debug!(address = %address, logic = logic.name(), version = logic.version(), "implementation deployed");
        self.code.contracts.insert(
            address,
            ImplementationContract {
                logic,
                storage: SlotStorage::new(),
            },
        );
        address
    }

    /// Deploys a proxy administered by `owner` pointing at `implementation`.
    pub fn deploy_proxy(&mut self, deployer: Address, owner: Address, implementation: Address) -> Address {
        self.instances.deploy_proxy(&deployer, owner, implementation)
    }

    /// Deploys a factory administered by `deployer`.
    pub fn deploy_factory(&mut self, deployer: Address, implementation: Address) -> Address {
        let address = self.instances.next_address(&deployer);
        self.factories
            .insert(address, SafeFactory::new(address, deployer, implementation));
        debug!(address = %address, owner = %deployer, implementation = %implementation, "factory deployed");
        address
    }

    // --- Calls ---

    /// Delivers `call` from `caller` to the vault surface at `target`.
    ///
    /// # Errors
    ///
    /// [`VaultError::UnknownInstance`] if nothing answering the vault surface
    /// lives at `target`, plus whatever the instance returns.
    pub fn call(&mut self, caller: Address, target: Address, call: &SafeCall) -> Result<CallOutput, VaultError> {
        if let Some(safe) = self.instances.safes.get_mut(&target) {
            return safe.execute(caller, call, &mut self.assets);
        }
        if let Some(proxy) = self.instances.proxies.get_mut(&target) {
            return proxy.forward(caller, call, &self.code, &mut self.assets);
        }
        if let Some(contract) = self.code.contracts.get_mut(&target) {
            let ctx = CallContext::new(caller, target);
            return execute_atomic(
                contract.logic.as_ref(),
                &mut contract.storage,
                &ctx,
                call,
                &mut self.assets,
            );
        }
        Err(VaultError::UnknownInstance(target))
    }

    /// See [`SafeProxy::upgrade_to`].
    pub fn proxy_upgrade_to(&mut self, caller: Address, proxy: Address, target: Address) -> Result<(), VaultError> {
        let instance = self
            .instances
            .proxies
            .get_mut(&proxy)
            .ok_or(VaultError::UnknownInstance(proxy))?;
        instance.upgrade_to(caller, target, &self.code)
    }

    /// See [`SafeProxy::set_implementation`].
    pub fn proxy_set_implementation(
        &mut self,
        caller: Address,
        proxy: Address,
        target: Address,
    ) -> Result<(), VaultError> {
        self.instances
            .proxies
            .get_mut(&proxy)
            .ok_or(VaultError::UnknownInstance(proxy))?
            .set_implementation(caller, target)
    }

    /// See [`SafeFactory::deploy_safe`].
    pub fn factory_deploy_safe(&mut self, caller: Address, factory: Address) -> Result<Address, VaultError> {
        let instance = self
            .factories
            .get_mut(&factory)
            .ok_or(VaultError::UnknownInstance(factory))?;
        Ok(instance.deploy_safe(caller, &mut self.instances))
    }

    /// See [`SafeFactory::deploy_safe_proxy`].
    pub fn factory_deploy_safe_proxy(&mut self, caller: Address, factory: Address) -> Result<Address, VaultError> {
        let instance = self
            .factories
            .get_mut(&factory)
            .ok_or(VaultError::UnknownInstance(factory))?;
        Ok(instance.deploy_safe_proxy(caller, &mut self.instances))
    }

    /// See [`SafeFactory::update_implementation`].
    pub fn factory_update_implementation(
        &mut self,
        caller: Address,
        factory: Address,
        target: Address,
    ) -> Result<(), VaultError> {
        self.factories
            .get_mut(&factory)
            .ok_or(VaultError::UnknownInstance(factory))?
            .update_implementation(caller, target)
    }

    // --- Inspection ---

    pub fn safe(&self, address: &Address) -> Option<&Safe> {
        self.instances.safe(address)
    }

    pub fn proxy(&self, address: &Address) -> Option<&SafeProxy> {
        self.instances.proxy(address)
    }

    pub fn factory(&self, address: &Address) -> Option<&SafeFactory> {
        self.factories.get(address)
    }

    pub fn implementation(&self, address: &Address) -> Option<&ImplementationContract> {
        self.code.get(address)
    }

    /// Returns `true` if implementation code is deployed at `address`.
    pub fn is_contract(&self, address: &Address) -> bool {
        self.code.is_contract(address)
    }
}
