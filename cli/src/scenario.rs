//! # Scenario Scripts
//!
//! A scenario is a JSON document naming some actors and listing steps to
//! run, in order, against a fresh [`Runtime`]:
//!
//! ```json
//! {
//!   "actors": ["owner", "test_wallet"],
//!   "steps": [
//!     { "op": "deploy_token", "as": "test_wallet", "name": "ptc",
//!       "token_name": "PeTeCoin", "symbol": "PTC" },
//!     { "op": "deploy_safe", "as": "owner", "name": "vault" },
//!     { "op": "approve", "as": "test_wallet", "token": "ptc",
//!       "spender": "vault", "amount": 5000 },
//!     { "op": "call", "as": "test_wallet", "target": "vault",
//!       "call": { "call": "deposit", "asset": "ptc", "amount": 1000 } }
//!   ]
//! }
//! ```
//!
//! Every deployment binds a name; later steps refer to instances and actors
//! by name or by `0x` address. A step may carry `expect_error`, a substring
//! of the error message it must fail with. A step that fails without one
//! aborts the scenario.

use safebox_contracts::{
    CallOutput, DeploymentRecord, FeeSchedule, ImplementationVersion, Runtime, SafeCall, VaultError,
};
use safebox_protocol::config::DEFAULT_TOKEN_SUPPLY;
use safebox_protocol::{Address, AssetError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures while running a scenario.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("unknown name `{0}`")]
    UnknownName(String),

    #[error("name `{0}` is already bound")]
    DuplicateName(String),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error("step {index} ({op}) failed: {message}")]
    StepFailed {
        index: usize,
        op: &'static str,
        message: String,
    },

    #[error("step {index} ({op}) succeeded, expected error containing `{expected}`")]
    UnexpectedSuccess {
        index: usize,
        op: &'static str,
        expected: String,
    },

    #[error("step {index} ({op}) failed with `{actual}`, expected `{expected}`")]
    ErrorMismatch {
        index: usize,
        op: &'static str,
        expected: String,
        actual: String,
    },
}

impl ScenarioError {
    /// Contract and asset failures are what `expect_error` may match.
    /// Script mistakes never are.
    fn is_contract_failure(&self) -> bool {
        matches!(self, ScenarioError::Vault(_) | ScenarioError::Asset(_))
    }
}

// ---------------------------------------------------------------------------
// Script
// ---------------------------------------------------------------------------

/// A parsed scenario file.
#[derive(Debug, Deserialize)]
pub struct Scenario {
    /// Externally-owned accounts. Each gets the address derived from its
    /// name.
    #[serde(default)]
    pub actors: Vec<String>,
    pub steps: Vec<Step>,
}

/// One step: who acts, what they do, and optionally how it must fail.
#[derive(Debug, Deserialize)]
pub struct Step {
    #[serde(rename = "as")]
    pub actor: String,
    #[serde(default)]
    pub expect_error: Option<String>,
    #[serde(flatten)]
    pub action: Action,
}

fn default_supply() -> u64 {
    DEFAULT_TOKEN_SUPPLY
}

/// Everything a step can do.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Action {
    DeployToken {
        name: String,
        token_name: String,
        symbol: String,
        #[serde(default = "default_supply")]
        supply: u64,
    },
    DeploySafe {
        name: String,
        /// Defaults to the acting account.
        #[serde(default)]
        owner: Option<String>,
        #[serde(default)]
        fee_schedule: Option<FeeSchedule>,
    },
    DeployImplementation {
        name: String,
        version: ImplementationVersion,
    },
    DeployProxy {
        name: String,
        implementation: String,
        /// Defaults to the acting account.
        #[serde(default)]
        owner: Option<String>,
    },
    DeployFactory {
        name: String,
        implementation: String,
    },
    FactoryDeploySafe {
        factory: String,
        name: String,
    },
    FactoryDeploySafeProxy {
        factory: String,
        name: String,
    },
    FactoryUpdateImplementation {
        factory: String,
        target: String,
    },
    Approve {
        token: String,
        spender: String,
        amount: u64,
    },
    Mint {
        token: String,
        /// Defaults to the acting account.
        #[serde(default)]
        to: Option<String>,
        amount: u64,
    },
    BalanceOf {
        token: String,
        /// Defaults to the acting account.
        #[serde(default)]
        account: Option<String>,
    },
    Call {
        target: String,
        call: CallSpec,
    },
    UpgradeTo {
        proxy: String,
        target: String,
    },
    SetImplementation {
        proxy: String,
        target: String,
    },
}

impl Action {
    /// Name used in reports and errors.
    pub fn op(&self) -> &'static str {
        match self {
            Action::DeployToken { .. } => "deploy_token",
            Action::DeploySafe { .. } => "deploy_safe",
            Action::DeployImplementation { .. } => "deploy_implementation",
            Action::DeployProxy { .. } => "deploy_proxy",
            Action::DeployFactory { .. } => "deploy_factory",
            Action::FactoryDeploySafe { .. } => "factory_deploy_safe",
            Action::FactoryDeploySafeProxy { .. } => "factory_deploy_safe_proxy",
            Action::FactoryUpdateImplementation { .. } => "factory_update_implementation",
            Action::Approve { .. } => "approve",
            Action::Mint { .. } => "mint",
            Action::BalanceOf { .. } => "balance_of",
            Action::Call { .. } => "call",
            Action::UpgradeTo { .. } => "upgrade_to",
            Action::SetImplementation { .. } => "set_implementation",
        }
    }
}

/// A vault call with names in place of addresses.
#[derive(Debug, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum CallSpec {
    Initialize { admin: String },
    Deposit { asset: String, amount: u64 },
    Withdraw { asset: String, amount: u64 },
    TakeFee { asset: String },
    Owner,
    IsInitialized,
    Fee { asset: String },
    Balances { depositor: String, asset: String },
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// What a step produced.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepOutput {
    Deployed { address: Address },
    Call { result: CallOutput },
    Balance { amount: u64 },
    Done,
}

/// Outcome of one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub op: &'static str,
    pub actor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<StepOutput>,
    /// Set when the step failed as expected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a whole scenario.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub steps: Vec<StepReport>,
    /// Every bound name.
    pub addresses: BTreeMap<String, Address>,
    /// Deployment log of every factory, by factory name.
    pub deployments: BTreeMap<String, Vec<DeploymentRecord>>,
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Names {
    bound: HashMap<String, Address>,
}

impl Names {
    fn bind(&mut self, name: &str, address: Address) -> Result<(), ScenarioError> {
        if self.bound.contains_key(name) {
            return Err(ScenarioError::DuplicateName(name.to_string()));
        }
        self.bound.insert(name.to_string(), address);
        Ok(())
    }

    fn resolve(&self, reference: &str) -> Result<Address, ScenarioError> {
        if let Some(address) = self.bound.get(reference) {
            return Ok(*address);
        }
        reference
            .parse::<Address>()
            .map_err(|_| ScenarioError::UnknownName(reference.to_string()))
    }

    fn resolve_or(&self, reference: Option<&String>, fallback: Address) -> Result<Address, ScenarioError> {
        reference.map_or(Ok(fallback), |r| self.resolve(r))
    }
}

/// Runs `scenario` against a fresh runtime.
///
/// # Errors
///
/// Fails on the first step that errors without `expect_error`, that
/// succeeds despite `expect_error`, or that refers to an unknown name.
pub fn run(scenario: &Scenario) -> Result<Report, ScenarioError> {
    let mut rt = Runtime::new();
    let mut names = Names::default();
    for actor in &scenario.actors {
        names.bind(actor, Address::from_label(actor))?;
    }

    let mut steps = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.iter().enumerate() {
        let op = step.action.op();
        let caller = names.resolve(&step.actor)?;
        let result = apply(&mut rt, &mut names, caller, &step.action);

        let report = match (result, &step.expect_error) {
            (Ok(output), None) => StepReport {
                index,
                op,
                actor: step.actor.clone(),
                output: Some(output),
                error: None,
            },
            (Ok(_), Some(expected)) => {
                return Err(ScenarioError::UnexpectedSuccess {
                    index,
                    op,
                    expected: expected.clone(),
                })
            }
            (Err(err), Some(expected)) if err.is_contract_failure() => {
                let actual = err.to_string();
                if !actual.contains(expected.as_str()) {
                    return Err(ScenarioError::ErrorMismatch {
                        index,
                        op,
                        expected: expected.clone(),
                        actual,
                    });
                }
                debug!(index, op, error = %actual, "step failed as expected");
                StepReport {
                    index,
                    op,
                    actor: step.actor.clone(),
                    output: None,
                    error: Some(actual),
                }
            }
            (Err(err), _) if err.is_contract_failure() => {
                return Err(ScenarioError::StepFailed {
                    index,
                    op,
                    message: err.to_string(),
                })
            }
            (Err(err), _) => return Err(err),
        };
        steps.push(report);
    }

    let mut deployments = BTreeMap::new();
    for (name, address) in &names.bound {
        if let Some(factory) = rt.factory(address) {
            let log = (0..factory.deployment_count())
                .filter_map(|id| factory.deployment(id).cloned())
                .collect();
            deployments.insert(name.clone(), log);
        }
    }

    info!(steps = steps.len(), "scenario complete");
    Ok(Report {
        steps,
        addresses: names.bound.into_iter().collect(),
        deployments,
    })
}

fn apply(
    rt: &mut Runtime,
    names: &mut Names,
    caller: Address,
    action: &Action,
) -> Result<StepOutput, ScenarioError> {
    match action {
        Action::DeployToken { name, token_name, symbol, supply } => {
            let address = rt.deploy_token(caller, token_name, symbol, *supply)?;
            deployed(names, name, address)
        }
        Action::DeploySafe { name, owner, fee_schedule } => {
            let owner = names.resolve_or(owner.as_ref(), caller)?;
            let address = match fee_schedule {
                Some(schedule) => rt.deploy_safe_with_schedule(caller, owner, *schedule),
                None => rt.deploy_safe(caller, owner),
            };
            deployed(names, name, address)
        }
        Action::DeployImplementation { name, version } => {
            let address = rt.deploy_implementation(caller, version.build());
            deployed(names, name, address)
        }
        Action::DeployProxy { name, implementation, owner } => {
            let implementation = names.resolve(implementation)?;
            let owner = names.resolve_or(owner.as_ref(), caller)?;
            let address = rt.deploy_proxy(caller, owner, implementation);
            deployed(names, name, address)
        }
        Action::DeployFactory { name, implementation } => {
            let implementation = names.resolve(implementation)?;
            let address = rt.deploy_factory(caller, implementation);
            deployed(names, name, address)
        }
        Action::FactoryDeploySafe { factory, name } => {
            let factory = names.resolve(factory)?;
            let address = rt.factory_deploy_safe(caller, factory)?;
            deployed(names, name, address)
        }
        Action::FactoryDeploySafeProxy { factory, name } => {
            let factory = names.resolve(factory)?;
            let address = rt.factory_deploy_safe_proxy(caller, factory)?;
            deployed(names, name, address)
        }
        Action::FactoryUpdateImplementation { factory, target } => {
            let factory = names.resolve(factory)?;
            let target = names.resolve(target)?;
            rt.factory_update_implementation(caller, factory, target)?;
            Ok(StepOutput::Done)
        }
        Action::Approve { token, spender, amount } => {
            let token = names.resolve(token)?;
            let spender = names.resolve(spender)?;
            rt.token_approve(caller, token, spender, *amount)?;
            Ok(StepOutput::Done)
        }
        Action::Mint { token, to, amount } => {
            let token = names.resolve(token)?;
            let to = names.resolve_or(to.as_ref(), caller)?;
            let amount = rt.token_mint(token, to, *amount)?;
            Ok(StepOutput::Balance { amount })
        }
        Action::BalanceOf { token, account } => {
            let token = names.resolve(token)?;
            let account = names.resolve_or(account.as_ref(), caller)?;
            let amount = rt.balance_of(&token, &account)?;
            Ok(StepOutput::Balance { amount })
        }
        Action::Call { target, call } => {
            let target = names.resolve(target)?;
            let call = to_safe_call(names, call)?;
            let result = rt.call(caller, target, &call)?;
            Ok(StepOutput::Call { result })
        }
        Action::UpgradeTo { proxy, target } => {
            let proxy = names.resolve(proxy)?;
            let target = names.resolve(target)?;
            rt.proxy_upgrade_to(caller, proxy, target)?;
            Ok(StepOutput::Done)
        }
        Action::SetImplementation { proxy, target } => {
            let proxy = names.resolve(proxy)?;
            let target = names.resolve(target)?;
            rt.proxy_set_implementation(caller, proxy, target)?;
            Ok(StepOutput::Done)
        }
    }
}

fn deployed(names: &mut Names, name: &str, address: Address) -> Result<StepOutput, ScenarioError> {
    names.bind(name, address)?;
    Ok(StepOutput::Deployed { address })
}

fn to_safe_call(names: &Names, spec: &CallSpec) -> Result<SafeCall, ScenarioError> {
    Ok(match spec {
        CallSpec::Initialize { admin } => SafeCall::Initialize {
            admin: names.resolve(admin)?,
        },
        CallSpec::Deposit { asset, amount } => SafeCall::Deposit {
            asset: names.resolve(asset)?,
            amount: *amount,
        },
        CallSpec::Withdraw { asset, amount } => SafeCall::Withdraw {
            asset: names.resolve(asset)?,
            amount: *amount,
        },
        CallSpec::TakeFee { asset } => SafeCall::TakeFee {
            asset: names.resolve(asset)?,
        },
        CallSpec::Owner => SafeCall::Owner,
        CallSpec::IsInitialized => SafeCall::IsInitialized,
        CallSpec::Fee { asset } => SafeCall::Fee {
            asset: names.resolve(asset)?,
        },
        CallSpec::Balances { depositor, asset } => SafeCall::Balances {
            depositor: names.resolve(depositor)?,
            asset: names.resolve(asset)?,
        },
    })
}
