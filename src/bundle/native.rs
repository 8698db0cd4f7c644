// ABOUTME: Native bundler that shells out to the edge runtime to build an eszip.
// ABOUTME: Output is framed as EZBR magic followed by a brotli stream.

use super::{Bundle, BundleBody, BundleError, BundleRequest, Bundler, HashingWriter};
use crate::api::FunctionDeployMetadata;
use crate::fs::FileSystem;
use crate::import_map::is_deno_config;
use async_trait::async_trait;
use bytes::Bytes;
use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Prefix of every compressed eszip upload.
pub const EZBR_MAGIC: &[u8; 4] = b"EZBR";

const BROTLI_BUFFER_SIZE: usize = 4096;
const BROTLI_QUALITY: u32 = 6;
const BROTLI_LGWIN: u32 = 22;
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Bundles functions by running `<runtime> bundle` in a subprocess.
pub struct NativeBundler {
    fs: Arc<dyn FileSystem>,
    program: PathBuf,
    timeout: Option<Duration>,
    verbose: bool,
}

impl NativeBundler {
    pub fn new(fs: Arc<dyn FileSystem>, program: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            program: program.into(),
            timeout: None,
            verbose: false,
        }
    }

    /// Kill the runtime if a single bundle takes longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Pass `--verbose` to the runtime.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn args(&self, request: &BundleRequest, output: &Path) -> Result<Vec<OsString>, BundleError> {
        let mut args: Vec<OsString> = vec![
            "bundle".into(),
            "--entrypoint".into(),
            self.fs.abs_path(&request.entrypoint).into(),
            "--output".into(),
            output.into(),
        ];

        if let Some(import_map) = &request.import_map {
            if !self.discovers_import_map(request, import_map) {
                args.push("--import-map".into());
                args.push(self.fs.abs_path(import_map).into());
            }
        }

        for file in self.static_files(request)? {
            args.push("--static".into());
            args.push(self.fs.abs_path(Path::new(&file)).into());
        }

        if self.verbose {
            args.push("--verbose".into());
        }
        Ok(args)
    }

    fn static_files(&self, request: &BundleRequest) -> Result<Vec<String>, BundleError> {
        let mut files: Vec<String> = Vec::new();
        for pattern in &request.static_files {
            let matched = self
                .fs
                .glob(pattern)
                .map_err(|source| BundleError::StaticFiles {
                    pattern: pattern.clone(),
                    source,
                })?;
            for file in matched {
                if !files.contains(&file) {
                    files.push(file);
                }
            }
        }
        Ok(files)
    }

    /// A deno.json next to the entrypoint is picked up by the runtime itself.
    fn discovers_import_map(&self, request: &BundleRequest, import_map: &Path) -> bool {
        is_deno_config(import_map)
            && self.fs.abs_path(import_map).parent()
                == self.fs.abs_path(&request.entrypoint).parent()
    }

    fn use_package_json(&self, request: &BundleRequest) -> bool {
        if request.import_map.is_some() {
            return false;
        }
        let dir = request.entrypoint.parent().unwrap_or(Path::new(""));
        self.fs.exists(&dir.join("package.json"))
    }

    fn file_url(&self, path: &Path) -> Result<String, BundleError> {
        let abs = self.fs.abs_path(path);
        url::Url::from_file_path(&abs)
            .map(String::from)
            .map_err(|()| BundleError::InvalidPath(abs))
    }

    fn static_patterns(&self, request: &BundleRequest) -> Result<Option<Vec<String>>, BundleError> {
        if request.static_files.is_empty() {
            return Ok(None);
        }
        request
            .static_files
            .iter()
            .map(|pattern| self.file_url(Path::new(pattern)))
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    fn metadata(&self, request: &BundleRequest) -> Result<FunctionDeployMetadata, BundleError> {
        let import_map_path = match &request.import_map {
            Some(path) => Some(self.file_url(path)?),
            None => None,
        };
        Ok(FunctionDeployMetadata {
            name: request.slug.to_string(),
            entrypoint_path: self.file_url(&request.entrypoint)?,
            import_map_path,
            static_patterns: self.static_patterns(request)?,
            verify_jwt: Some(request.verify_jwt),
            sha256: None,
        })
    }

    async fn run(
        &self,
        request: &BundleRequest,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), BundleError> {
        let args = self.args(request, output)?;
        let program = self.program.display().to_string();

        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if !self.use_package_json(request) {
            command.env("DENO_NO_PACKAGE_JSON", "1");
        }
        if let Ok(registry) = std::env::var("NPM_CONFIG_REGISTRY") {
            tracing::debug!("Using npm registry {}", registry);
            command.env("NPM_CONFIG_REGISTRY", registry);
        }

        tracing::debug!("Running {} {:?}", program, args);
        let child = command.spawn().map_err(|source| BundleError::Spawn {
            program: program.clone(),
            source,
        })?;

        let wait = async {
            let output = child.wait_with_output();
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, output)
                    .await
                    .map_err(|_| BundleError::Timeout(limit))?,
                None => output.await,
            }
            .map_err(|source| BundleError::Spawn {
                program: program.clone(),
                source,
            })
        };

        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(BundleError::Cancelled),
            output = wait => output?,
        };

        if !output.status.success() {
            return Err(BundleError::Subprocess {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    /// Run the runtime, then compress its archive off the async workers.
    async fn build(
        &self,
        request: &BundleRequest,
        cancel: &CancellationToken,
    ) -> Result<(FunctionDeployMetadata, Vec<u8>), BundleError> {
        let dir = tempfile::Builder::new()
            .prefix("edgefn-")
            .tempdir()
            .map_err(BundleError::Write)?;
        let eszip = dir.path().join("output.eszip");

        self.run(request, &eszip, cancel).await?;

        let (body, digest) = {
            let cancel = cancel.clone();
            tokio::task::spawn_blocking(move || compress(&eszip, &cancel))
                .await
                .map_err(|e| BundleError::Task(e.to_string()))??
        };

        let mut metadata = self.metadata(request)?;
        tracing::debug!(
            "Bundled {} ({} bytes, sha256 {})",
            request.slug,
            body.len(),
            digest
        );
        metadata.sha256 = Some(digest);
        Ok((metadata, body))
    }
}

/// Read the archive at `eszip` as `EZBR || brotli(archive)`, with its digest.
fn compress(eszip: &Path, cancel: &CancellationToken) -> Result<(Vec<u8>, String), BundleError> {
    let mut archive = std::fs::File::open(eszip).map_err(|source| BundleError::Read {
        path: eszip.display().to_string(),
        source,
    })?;

    let mut hashing = HashingWriter::new(Vec::new());
    hashing.write_all(EZBR_MAGIC).map_err(BundleError::Write)?;
    {
        let mut compressor = brotli::CompressorWriter::new(
            &mut hashing,
            BROTLI_BUFFER_SIZE,
            BROTLI_QUALITY,
            BROTLI_LGWIN,
        );
        let mut buf = vec![0; READ_CHUNK_SIZE];
        loop {
            if cancel.is_cancelled() {
                return Err(BundleError::Cancelled);
            }
            let n = archive.read(&mut buf).map_err(|source| BundleError::Read {
                path: eszip.display().to_string(),
                source,
            })?;
            if n == 0 {
                break;
            }
            compressor.write_all(&buf[..n]).map_err(BundleError::Write)?;
        }
        compressor.flush().map_err(BundleError::Write)?;
        // Finishes the brotli stream.
        compressor.into_inner();
    }

    Ok(hashing.finish())
}

#[async_trait]
impl Bundler for NativeBundler {
    async fn bundle(
        &self,
        request: &BundleRequest,
        out: &mut (dyn Write + Send),
        cancel: &CancellationToken,
    ) -> Result<FunctionDeployMetadata, BundleError> {
        let (metadata, body) = self.build(request, cancel).await?;
        out.write_all(&body).map_err(BundleError::Write)?;
        out.flush().map_err(BundleError::Write)?;
        Ok(metadata)
    }

    async fn prepare(
        &self,
        request: &BundleRequest,
        cancel: &CancellationToken,
    ) -> Result<Bundle, BundleError> {
        let (metadata, body) = self.build(request, cancel).await?;
        Ok(Bundle {
            metadata,
            body: BundleBody::Eszip(Bytes::from(body)),
        })
    }
}
