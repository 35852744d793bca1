//! # Safe Factory — instance registry
//!
//! Deploys vaults on behalf of callers. Two flavors:
//!
//! - [`deploy_safe`](SafeFactory::deploy_safe) — a self-contained
//!   [`Safe`](crate::safe::Safe) owned by the caller.
//! - [`deploy_safe_proxy`](SafeFactory::deploy_safe_proxy) — a
//!   [`SafeProxy`](crate::proxy::SafeProxy) owned by the caller and wired to
//!   the factory's current default implementation.
//!
//! The factory keeps the most recent address of each flavor for quick
//! lookup, and an append-only log of every deployment so that no earlier
//! deployment is lost when a later one overwrites the "last" pointers.

use chrono::{DateTime, Utc};
use safebox_protocol::Address;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::VaultError;

/// What a factory deployment produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentKind {
    /// A self-contained vault.
    Safe,
    /// A proxy wired to an implementation.
    Proxy,
}

/// One entry of the deployment log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// Sequence number within this factory, starting at 0.
    pub id: u64,
    /// What was deployed.
    pub kind: DeploymentKind,
    /// Who asked for it; also the owner of the new instance.
    pub deployer: Address,
    /// Where it lives.
    pub address: Address,
    /// Implementation a proxy was wired to. `None` for safes.
    pub implementation: Option<Address>,
    /// When it was deployed.
    pub deployed_at: DateTime<Utc>,
}

/// Host capability the factory needs: creating instances.
pub trait Deployer {
    /// Creates a [`Safe`](crate::safe::Safe) owned by `owner`, deployed by
    /// `factory`. Returns its address.
    fn deploy_safe(&mut self, factory: &Address, owner: Address) -> Address;

    /// Creates a proxy owned by `owner` pointing at `implementation`,
    /// deployed by `factory`. Returns its address.
    fn deploy_proxy(&mut self, factory: &Address, owner: Address, implementation: Address) -> Address;
}

/// A factory instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafeFactory {
    address: Address,
    owner: Address,
    implementation: Address,
    last_safe: Address,
    last_proxy: Address,
    deployments: Vec<DeploymentRecord>,
}

impl SafeFactory {
    /// Creates a factory at `address` administered by `owner`, handing out
    /// proxies wired to `implementation`.
    pub fn new(address: Address, owner: Address, implementation: Address) -> Self {
        Self {
            address,
            owner,
            implementation,
            last_safe: Address::ZERO,
            last_proxy: Address::ZERO,
            deployments: Vec::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// The factory administrator.
    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Default implementation wired into new proxies.
    pub fn implementation(&self) -> Address {
        self.implementation
    }

    /// Most recently deployed safe, or [`Address::ZERO`].
    pub fn last_safe_address(&self) -> Address {
        self.last_safe
    }

    /// Most recently deployed proxy, or [`Address::ZERO`].
    pub fn last_proxy_address(&self) -> Address {
        self.last_proxy
    }

    /// Log entry `id`.
    pub fn deployment(&self, id: u64) -> Option<&DeploymentRecord> {
        usize::try_from(id).ok().and_then(|i| self.deployments.get(i))
    }

    /// Every deployment made for `deployer`, oldest first.
    pub fn deployments_by(&self, deployer: &Address) -> Vec<&DeploymentRecord> {
        self.deployments
            .iter()
            .filter(|r| r.deployer == *deployer)
            .collect()
    }

    /// Total deployments made by this factory.
    pub fn deployment_count(&self) -> u64 {
        self.deployments.len() as u64
    }

    /// Deploys a safe owned by `caller`.
    pub fn deploy_safe(&mut self, caller: Address, deployer: &mut dyn Deployer) -> Address {
        let address = deployer.deploy_safe(&self.address, caller);
        self.last_safe = address;
        self.record(DeploymentKind::Safe, caller, address, None);
        address
    }

    /// Deploys a proxy owned by `caller`, wired to the current default
    /// implementation.
    pub fn deploy_safe_proxy(&mut self, caller: Address, deployer: &mut dyn Deployer) -> Address {
        let address = deployer.deploy_proxy(&self.address, caller, self.implementation);
        self.last_proxy = address;
        self.record(DeploymentKind::Proxy, caller, address, Some(self.implementation));
        address
    }

    /// Changes the implementation used by later proxy deployments.
    /// Existing proxies are not touched.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NotOwner`] unless `caller` is the factory
    /// administrator.
    pub fn update_implementation(&mut self, caller: Address, target: Address) -> Result<(), VaultError> {
        if caller != self.owner {
            warn!(factory = %self.address, caller = %caller, "implementation update rejected: caller is not owner");
            return Err(VaultError::NotOwner {
                caller,
                owner: self.owner,
            });
        }
        info!(factory = %self.address, from = %self.implementation, to = %target, "default implementation updated");
        self.implementation = target;
        Ok(())
    }

    fn record(
        &mut self,
        kind: DeploymentKind,
        deployer: Address,
        address: Address,
        implementation: Option<Address>,
    ) {
        let id = self.deployment_count();
        info!(factory = %self.address, id, ?kind, deployer = %deployer, address = %address, "instance deployed");
        self.deployments.push(DeploymentRecord {
            id,
            kind,
            deployer,
            address,
            implementation,
            deployed_at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        nonce: u64,
        safes: Vec<(Address, Address)>,
        proxies: Vec<(Address, Address, Address)>,
    }

    impl Deployer for Recorder {
        fn deploy_safe(&mut self, factory: &Address, owner: Address) -> Address {
            let address = Address::derive(factory, self.nonce);
            self.nonce += 1;
            self.safes.push((address, owner));
            address
        }

        fn deploy_proxy(&mut self, factory: &Address, owner: Address, implementation: Address) -> Address {
            let address = Address::derive(factory, self.nonce);
            self.nonce += 1;
            self.proxies.push((address, owner, implementation));
            address
        }
    }

    fn factory() -> (SafeFactory, Address, Address) {
        let owner = Address::from_label("owner");
        let implementation = Address::from_label("impl_v1");
        (
            SafeFactory::new(Address::from_label("factory"), owner, implementation),
            owner,
            implementation,
        )
    }

    #[test]
    fn deployed_with_owner() {
        let (f, owner, implementation) = factory();
        assert_eq!(f.owner(), owner);
        assert_eq!(f.implementation(), implementation);
        assert_eq!(f.last_safe_address(), Address::ZERO);
        assert_eq!(f.last_proxy_address(), Address::ZERO);
    }

    #[test]
    fn deploy_safe_is_owned_by_caller() {
        let (mut f, _, _) = factory();
        let mut host = Recorder::default();
        let user = Address::from_label("user");
        let address = f.deploy_safe(user, &mut host);
        assert_eq!(f.last_safe_address(), address);
        assert_eq!(host.safes, vec![(address, user)]);
    }

    #[test]
    fn deploy_proxy_wires_default_implementation() {
        let (mut f, _, implementation) = factory();
        let mut host = Recorder::default();
        let user = Address::from_label("user");
        let address = f.deploy_safe_proxy(user, &mut host);
        assert_eq!(f.last_proxy_address(), address);
        assert_eq!(host.proxies, vec![(address, user, implementation)]);
    }

    #[test]
    fn update_implementation_requires_owner() {
        let (mut f, _, implementation) = factory();
        let user = Address::from_label("user");
        let err = f
            .update_implementation(user, Address::from_label("addr1"))
            .unwrap_err();
        assert!(matches!(err, VaultError::NotOwner { .. }));
        assert_eq!(f.implementation(), implementation);
    }

    #[test]
    fn update_implementation_affects_only_later_proxies() {
        let (mut f, owner, v1) = factory();
        let mut host = Recorder::default();
        let v2 = Address::from_label("impl_v2");
        let first = f.deploy_safe_proxy(owner, &mut host);
        f.update_implementation(owner, v2).unwrap();
        let second = f.deploy_safe_proxy(owner, &mut host);

        assert_eq!(f.implementation(), v2);
        assert_eq!(host.proxies[0], (first, owner, v1));
        assert_eq!(host.proxies[1], (second, owner, v2));
    }

    #[test]
    fn deployment_log_keeps_every_instance() {
        let (mut f, _, _) = factory();
        let mut host = Recorder::default();
        let alice = Address::from_label("alice");
        let bob = Address::from_label("bob");

        let s1 = f.deploy_safe(alice, &mut host);
        let p1 = f.deploy_safe_proxy(bob, &mut host);
        let s2 = f.deploy_safe(alice, &mut host);

        assert_eq!(f.deployment_count(), 3);
        assert_eq!(f.last_safe_address(), s2);
        assert_eq!(f.last_proxy_address(), p1);

        let by_alice: Vec<Address> = f.deployments_by(&alice).iter().map(|r| r.address).collect();
        assert_eq!(by_alice, vec![s1, s2]);

        let record = f.deployment(1).unwrap();
        assert_eq!(record.kind, DeploymentKind::Proxy);
        assert_eq!(record.deployer, bob);
        assert!(record.implementation.is_some());
        assert!(f.deployment(3).is_none());
    }
}
