// ABOUTME: Bundle command implementation.
// ABOUTME: Writes one function's bundle to a local file without contacting the API.

use crate::cli::BundleArgs;
use edgefn::config::{Config, FunctionOverrides};
use edgefn::diagnostics::Diagnostics;
use edgefn::error::{Error, Result};
use edgefn::fs::{FileSystem, OsFs};
use edgefn::output::Output;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub async fn bundle(
    cwd: &Path,
    args: BundleArgs,
    verbose: bool,
    output: &Output,
    cancel: &CancellationToken,
) -> Result<()> {
    let config = Config::discover_or_default(cwd)?;
    let fs: Arc<dyn FileSystem> = Arc::new(OsFs::new(cwd));
    let overrides = FunctionOverrides {
        import_map: args.import_map,
        no_verify_jwt: false,
    };
    let mut diag = Diagnostics::default();
    let functions = config.function_set(
        std::slice::from_ref(&args.slug),
        &overrides,
        fs.as_ref(),
        &mut diag,
    )?;
    for warning in diag.warnings() {
        output.warning(&warning.message);
    }

    let function = functions
        .get(&args.slug)
        .ok_or_else(|| Error::InvalidConfig(format!("unknown function: {}", args.slug)))?;
    let request = function.bundle_request(&args.slug);

    let extension = if args.use_api { "form" } else { "eszip" };
    let path = args
        .output
        .unwrap_or_else(|| PathBuf::from(format!("{}.{}", args.slug, extension)));

    let bundler = super::bundler(&config, args.use_api, fs, verbose);
    let mut file = BufWriter::new(File::create(&path)?);
    let result = bundler.bundle(&request, &mut file, cancel).await;
    let metadata = match result.map_err(Error::from).and_then(|m| {
        file.flush()?;
        Ok(m)
    }) {
        Ok(metadata) => metadata,
        Err(e) => {
            drop(file);
            let _ = std::fs::remove_file(&path);
            return Err(e);
        }
    };

    match metadata.sha256 {
        Some(sha) => output.success(&format!(
            "Bundled {} to {} (sha256 {})",
            args.slug,
            path.display(),
            sha
        )),
        None => output.success(&format!("Bundled {} to {}", args.slug, path.display())),
    }
    Ok(())
}
