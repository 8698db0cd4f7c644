// ABOUTME: Deploy command implementation.
// ABOUTME: Resolves functions, builds the bundler and API client, and runs the deployer.

use crate::cli::DeployArgs;
use edgefn::config::{Config, FunctionOverrides};
use edgefn::deploy::{DeployOptions, Deployer};
use edgefn::diagnostics::Diagnostics;
use edgefn::error::Result;
use edgefn::fs::{FileSystem, OsFs};
use edgefn::output::{Output, OutputMode};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Deploy the selected functions of the project rooted at `cwd`.
pub async fn deploy(
    cwd: &Path,
    args: DeployArgs,
    verbose: bool,
    output: &Output,
    cancel: &CancellationToken,
) -> Result<()> {
    let config = Config::discover_or_default(cwd)?;
    let project_ref = config.resolve_project_ref(args.project_ref.as_deref())?;
    let api = super::api_client(&config, project_ref.clone())?;

    let fs: Arc<dyn FileSystem> = Arc::new(OsFs::new(cwd));
    let overrides = FunctionOverrides {
        import_map: args.import_map,
        no_verify_jwt: args.no_verify_jwt,
    };
    let mut diag = Diagnostics::default();
    let functions = config.function_set(&args.slugs, &overrides, fs.as_ref(), &mut diag)?;

    for warning in diag.warnings() {
        output.warning(&warning.message);
    }

    let options = DeployOptions {
        max_jobs: args.jobs.unwrap_or(config.max_jobs).max(1),
        retry: config.retry,
    };
    let bundler = super::bundler(&config, args.use_api, fs, verbose);

    output.progress(&format!(
        "Deploying {} function(s) to project {}",
        functions.len(),
        project_ref
    ));

    let summary = Deployer::new(Arc::new(api), bundler, options)
        .deploy(&functions, cancel)
        .await?;

    for slug in &summary.unchanged {
        output.progress(&format!("No change found in Function: {slug}"));
    }

    let message = format!(
        "Deployed Functions on project {}: {}",
        project_ref,
        summary.deployed.join(", ")
    );
    match output.mode() {
        OutputMode::Json => output.record(&summary, &message),
        OutputMode::Normal | OutputMode::Quiet => output.success(&message),
    }
    Ok(())
}
