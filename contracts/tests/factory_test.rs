//! Integration tests for the safe factory.
//!
//! Covers both deployment flavors, administrator-only implementation
//! updates, and the deployment log that survives later deployments.

use safebox_contracts::{DeploymentKind, ImplementationVersion, Runtime, SafeCall, VaultError};
use safebox_protocol::Address;

struct World {
    rt: Runtime,
    owner: Address,
    user: Address,
    v1: Address,
    factory: Address,
}

/// Helper: the owner deploys V1 and a factory defaulting to it.
fn world() -> World {
    let mut rt = Runtime::new();
    let owner = Address::from_label("owner");
    let user = Address::from_label("user");
    let v1 = rt.deploy_implementation(owner, ImplementationVersion::V1.build());
    let factory = rt.deploy_factory(owner, v1);
    World { rt, owner, user, v1, factory }
}

// ---------------------------------------------------------------------------
// Deployment
// ---------------------------------------------------------------------------

#[test]
fn should_deploy_with_owner() {
    let w = world();
    let factory = w.rt.factory(&w.factory).unwrap();
    assert_eq!(factory.owner(), w.owner);
    assert_eq!(factory.implementation(), w.v1);
    assert_eq!(factory.last_safe_address(), Address::ZERO);
    assert_eq!(factory.last_proxy_address(), Address::ZERO);
}

#[test]
fn deployed_safe_belongs_to_caller() {
    let mut w = world();
    let (user, factory) = (w.user, w.factory);
    let safe = w.rt.factory_deploy_safe(user, factory).unwrap();

    assert_eq!(w.rt.factory(&factory).unwrap().last_safe_address(), safe);
    assert_eq!(w.rt.safe(&safe).unwrap().owner(), user);
}

#[test]
fn deployed_proxy_is_wired_and_usable() {
    let mut w = world();
    let (user, factory, v1) = (w.user, w.factory, w.v1);
    let token = w.rt.deploy_token(user, "PeTeCoin", "PTC", 5_000).unwrap();
    let proxy = w.rt.factory_deploy_safe_proxy(user, factory).unwrap();

    let instance = w.rt.proxy(&proxy).unwrap();
    assert_eq!(instance.get_owner(), user);
    assert_eq!(instance.get_implementation(), v1);
    assert_eq!(w.rt.factory(&factory).unwrap().last_proxy_address(), proxy);

    w.rt.call(user, proxy, &SafeCall::Initialize { admin: user })
        .unwrap();
    w.rt.token_approve(user, token, proxy, 2_000).unwrap();
    w.rt.call(user, proxy, &SafeCall::Deposit { asset: token, amount: 2_000 })
        .unwrap();
    let balance = w
        .rt
        .call(user, proxy, &SafeCall::Balances { depositor: user, asset: token })
        .unwrap();
    assert_eq!(balance.amount(), Some(1_998));
}

// ---------------------------------------------------------------------------
// Administration
// ---------------------------------------------------------------------------

#[test]
fn owner_can_update_implementation() {
    let mut w = world();
    let (owner, factory) = (w.owner, w.factory);
    let addr1 = Address::from_label("addr1");
    w.rt.factory_update_implementation(owner, factory, addr1).unwrap();
    assert_eq!(w.rt.factory(&factory).unwrap().implementation(), addr1);
}

#[test]
fn non_owner_cannot_update_implementation() {
    let mut w = world();
    let (user, factory, v1) = (w.user, w.factory, w.v1);
    let err = w
        .rt
        .factory_update_implementation(user, factory, Address::from_label("addr1"))
        .unwrap_err();
    assert!(err.to_string().starts_with("NOT owner!"));
    assert_eq!(w.rt.factory(&factory).unwrap().implementation(), v1);
}

#[test]
fn update_does_not_touch_existing_proxies() {
    let mut w = world();
    let (owner, user, factory, v1) = (w.owner, w.user, w.factory, w.v1);
    let v2 = w.rt.deploy_implementation(owner, ImplementationVersion::V2.build());

    let before = w.rt.factory_deploy_safe_proxy(user, factory).unwrap();
    w.rt.factory_update_implementation(owner, factory, v2).unwrap();
    let after = w.rt.factory_deploy_safe_proxy(user, factory).unwrap();

    assert_eq!(w.rt.proxy(&before).unwrap().get_implementation(), v1);
    assert_eq!(w.rt.proxy(&after).unwrap().get_implementation(), v2);
}

#[test]
fn proxy_wired_to_account_fails_on_first_call() {
    let mut w = world();
    let (owner, user, factory) = (w.owner, w.user, w.factory);
    let addr1 = Address::from_label("addr1");
    w.rt.factory_update_implementation(owner, factory, addr1).unwrap();

    let proxy = w.rt.factory_deploy_safe_proxy(user, factory).unwrap();
    assert_eq!(
        w.rt.call(user, proxy, &SafeCall::Initialize { admin: user }),
        Err(VaultError::ImplementationNotContract(addr1))
    );
}

// ---------------------------------------------------------------------------
// Deployment log
// ---------------------------------------------------------------------------

#[test]
fn log_keeps_earlier_deployments() {
    let mut w = world();
    let (owner, user, factory) = (w.owner, w.user, w.factory);

    let first = w.rt.factory_deploy_safe(user, factory).unwrap();
    let second = w.rt.factory_deploy_safe(owner, factory).unwrap();
    let proxy = w.rt.factory_deploy_safe_proxy(user, factory).unwrap();

    let registry = w.rt.factory(&factory).unwrap();
    assert_eq!(registry.last_safe_address(), second);
    assert_eq!(registry.deployment_count(), 3);

    let mine = registry.deployments_by(&user);
    assert_eq!(mine.len(), 2);
    assert_eq!(mine[0].address, first);
    assert_eq!(mine[0].kind, DeploymentKind::Safe);
    assert_eq!(mine[1].address, proxy);
    assert_eq!(mine[1].kind, DeploymentKind::Proxy);

    let record = registry.deployment(0).unwrap();
    assert_eq!(record.id, 0);
    assert!(record.deployed_at <= registry.deployment(2).unwrap().deployed_at);
}

#[test]
fn unknown_factory_is_rejected() {
    let mut w = world();
    let user = w.user;
    let bogus = Address::from_label("bogus");
    assert_eq!(
        w.rt.factory_deploy_safe_proxy(user, bogus),
        Err(VaultError::UnknownInstance(bogus))
    );
}
