// ABOUTME: List command implementation.
// ABOUTME: Prints the functions deployed to a project with their status and version.

use chrono::DateTime;
use edgefn::api::{FunctionResponse, FunctionsApi};
use edgefn::config::Config;
use edgefn::error::Result;
use edgefn::output::Output;
use std::path::Path;
use tokio_util::sync::CancellationToken;

pub async fn list(
    cwd: &Path,
    project_ref: Option<&str>,
    output: &Output,
    cancel: &CancellationToken,
) -> Result<()> {
    let config = Config::discover_or_default(cwd)?;
    let project_ref = config.resolve_project_ref(project_ref)?;
    let api = super::api_client(&config, project_ref.clone())?;

    let mut backoff = config.retry.backoff();
    let functions = backoff
        .retry(cancel, || api.list_functions(cancel))
        .await?;

    if functions.is_empty() {
        output.success(&format!("No Functions deployed to project {project_ref}"));
        return Ok(());
    }

    for function in &functions {
        output.record(function, &format_row(function));
    }
    Ok(())
}

fn format_row(function: &FunctionResponse) -> String {
    let updated = DateTime::from_timestamp_millis(function.updated_at)
        .filter(|_| function.updated_at > 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string());

    format!(
        "{:<32} {:<10} v{:<6} {}",
        function.slug, function.status, function.version, updated
    )
}
