// ABOUTME: Configuration types and parsing for edgefn.yml.
// ABOUTME: Handles YAML parsing, discovery, and project/credential resolution.

mod deserialize;
mod function;
mod init;

pub use function::{Function, FunctionConfig, FunctionOverrides, FunctionSet, ImportMapSource};
pub use init::init_config;

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::types::{FunctionSlug, ProjectRef};
use deserialize::deserialize_project_ref;
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const CONFIG_FILENAME: &str = "edgefn.yml";
pub const CONFIG_FILENAME_ALT: &str = "edgefn.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".edgefn/config.yml";

pub const ACCESS_TOKEN_ENV: &str = "EDGEFN_ACCESS_TOKEN";
pub const PROJECT_REF_ENV: &str = "EDGEFN_PROJECT_REF";

pub const DEFAULT_API_URL: &str = "https://api.supabase.com";
pub const DEFAULT_RUNTIME_BIN: &str = "edge-runtime";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default, deserialize_with = "deserialize_project_ref")]
    pub project_ref: Option<ProjectRef>,

    #[serde(default = "default_api_url")]
    pub api_url: Url,

    #[serde(default = "default_functions_dir")]
    pub functions_dir: PathBuf,

    /// Fallback import map for functions without one of their own.
    #[serde(default)]
    pub import_map: Option<PathBuf>,

    #[serde(default = "default_max_jobs")]
    pub max_jobs: usize,

    #[serde(default, with = "humantime_serde")]
    pub request_timeout: Option<Duration>,

    #[serde(default)]
    pub bundler: BundlerConfig,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub functions: IndexMap<FunctionSlug, FunctionConfig>,
}

/// How function bundles are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundlerMode {
    /// Build an eszip locally with the edge runtime.
    #[default]
    Native,
    /// Upload sources and let the control plane bundle them.
    Stream,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BundlerConfig {
    #[serde(default)]
    pub mode: BundlerMode,

    #[serde(default = "default_runtime_bin")]
    pub runtime_bin: PathBuf,

    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl Default for BundlerConfig {
    fn default() -> Self {
        Self {
            mode: BundlerMode::default(),
            runtime_bin: default_runtime_bin(),
            timeout: None,
        }
    }
}

fn default_api_url() -> Url {
    Url::parse(DEFAULT_API_URL).expect("default API URL is valid")
}

fn default_functions_dir() -> PathBuf {
    PathBuf::from("functions")
}

fn default_max_jobs() -> usize {
    1
}

fn default_runtime_bin() -> PathBuf {
    PathBuf::from(DEFAULT_RUNTIME_BIN)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_ref: None,
            api_url: default_api_url(),
            functions_dir: default_functions_dir(),
            import_map: None,
            max_jobs: default_max_jobs(),
            request_timeout: None,
            bundler: BundlerConfig::default(),
            retry: RetryPolicy::default(),
            functions: IndexMap::new(),
        }
    }
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                tracing::debug!("Loading config from {}", path.display());
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Like [`Config::discover`], but falls back to defaults when no file exists.
    pub fn discover_or_default(dir: &Path) -> Result<Self> {
        match Self::discover(dir) {
            Err(Error::ConfigNotFound(_)) => {
                tracing::debug!("No config file in {}, using defaults", dir.display());
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Project ref from the flag, then the environment, then the config file.
    pub fn resolve_project_ref(&self, flag: Option<&str>) -> Result<ProjectRef> {
        let from_env = std::env::var(PROJECT_REF_ENV).ok();
        let value = flag
            .map(str::to_string)
            .or(from_env)
            .filter(|v| !v.trim().is_empty());

        match value {
            Some(v) => ProjectRef::new(&v).map_err(|e| Error::InvalidConfig(e.to_string())),
            None => self.project_ref.clone().ok_or(Error::MissingProjectRef),
        }
    }
}

/// Access token for the control plane, read from the environment.
pub fn access_token() -> Result<String> {
    match std::env::var(ACCESS_TOKEN_ENV) {
        Ok(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        _ => Err(Error::MissingEnvVar(ACCESS_TOKEN_ENV.to_string())),
    }
}
