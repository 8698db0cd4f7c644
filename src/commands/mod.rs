// ABOUTME: Command module aggregator for the edgefn CLI.
// ABOUTME: Re-exports the deploy, bundle and list handlers plus shared setup.

mod bundle;
mod deploy;
mod list;

pub use bundle::bundle;
pub use deploy::deploy;
pub use list::list;

use edgefn::api::{ApiClient, ApiConfig};
use edgefn::bundle::{Bundler, NativeBundler, StreamingBundler};
use edgefn::config::{self, BundlerMode, Config};
use edgefn::error::Result;
use edgefn::fs::FileSystem;
use edgefn::types::ProjectRef;
use std::sync::Arc;

/// Control plane client for `project_ref`, authenticated from the environment.
fn api_client(config: &Config, project_ref: ProjectRef) -> Result<ApiClient> {
    let client = ApiClient::new(ApiConfig {
        base_url: config.api_url.clone(),
        access_token: config::access_token()?,
        project_ref,
        timeout: config.request_timeout,
    })?;
    Ok(client)
}

fn bundler(
    config: &Config,
    use_api: bool,
    fs: Arc<dyn FileSystem>,
    verbose: bool,
) -> Arc<dyn Bundler> {
    let mode = if use_api {
        BundlerMode::Stream
    } else {
        config.bundler.mode
    };

    match mode {
        BundlerMode::Native => Arc::new(
            NativeBundler::new(fs, config.bundler.runtime_bin.clone())
                .with_timeout(config.bundler.timeout)
                .with_verbose(verbose),
        ),
        BundlerMode::Stream => Arc::new(StreamingBundler::new(fs)),
    }
}
