// ABOUTME: Top-level error for the edgefn library and CLI.
// ABOUTME: Wraps deploy, bundle and API failures next to config and environment errors.

use crate::api::ApiError;
use crate::bundle::BundleError;
use crate::deploy::DeployError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("refusing to overwrite {0}: file already exists")]
    AlreadyExists(PathBuf),

    #[error("no edgefn.yml, edgefn.yaml or .edgefn/config.yml in {0}")]
    ConfigNotFound(PathBuf),

    #[error("{0} is not set; export an access token to talk to the control plane")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("project ref not set: pass --project-ref, set EDGEFN_PROJECT_REF or add project_ref to the config file")]
    MissingProjectRef,

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl Error {
    /// True for the "nothing to deploy" outcome, which is not a failure.
    pub fn is_no_deploy(&self) -> bool {
        matches!(self, Error::Deploy(DeployError::NoDeploy))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
