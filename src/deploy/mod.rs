// ABOUTME: Function deployment using the type state pattern.
// ABOUTME: Exports the deployer, per-function states and deploy errors.

mod deployer;
mod deployment;
mod error;
mod inventory;
mod state;
mod transitions;

pub use deployer::{DeployOptions, DeploySummary, Deployer};
pub use deployment::FunctionDeploy;
pub use error::{DeployError, DeployErrorKind};
pub use inventory::Inventory;
pub use state::{Pending, Planned, Ready, Staged, UpsertAction};
pub use transitions::Plan;
