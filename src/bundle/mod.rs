// ABOUTME: Function bundling: native eszip via an external runtime, or streamed multipart.
// ABOUTME: Both produce deploy metadata plus a SHA-256 digest of the bundle.

mod native;
mod stream;

pub use native::{EZBR_MAGIC, NativeBundler};
pub use stream::{FormSource, FormUpload, ProducerHandle, StreamingBundler};

use crate::api::FunctionDeployMetadata;
use crate::import_map::{ImportMapError, NotFound};
use crate::types::FunctionSlug;
use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Everything needed to bundle one function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleRequest {
    pub slug: FunctionSlug,
    /// Entrypoint, relative to the project root.
    pub entrypoint: PathBuf,
    pub import_map: Option<PathBuf>,
    /// Glob patterns of extra files shipped with the function.
    pub static_files: Vec<String>,
    pub verify_jwt: bool,
}

/// A bundle ready for upload.
#[derive(Debug)]
pub struct Bundle {
    pub metadata: FunctionDeployMetadata,
    pub body: BundleBody,
}

impl Bundle {
    /// Hex SHA-256 of the bundle contents.
    pub fn sha256(&self) -> Option<&str> {
        self.metadata.sha256.as_deref()
    }
}

/// Upload payload of a [`Bundle`].
#[derive(Debug)]
pub enum BundleBody {
    /// Compressed eszip, sent as one request body.
    Eszip(Bytes),
    /// Multipart form built on demand, once per upload attempt.
    Multipart(FormSource),
}

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("file not found: {path}")]
    NotFound { path: String },

    #[error("file path is a directory: {path}")]
    IsDirectory { path: String },

    #[error("failed to read {path}: {source}")]
    Read { path: String, source: io::Error },

    #[error(transparent)]
    ImportMap(#[from] ImportMapError),

    #[error("invalid static file pattern {pattern}: {source}")]
    StaticFiles { pattern: String, source: io::Error },

    #[error("failed to write bundle: {0}")]
    Write(#[source] io::Error),

    #[error("path cannot be expressed as a file URL: {0}")]
    InvalidPath(PathBuf),

    #[error("failed to start bundler {program}: {source}")]
    Spawn { program: String, source: io::Error },

    #[error("failed to bundle function: {status}\n{stderr}")]
    Subprocess { status: ExitStatus, stderr: String },

    #[error("bundler timed out after {0:?}")]
    Timeout(Duration),

    #[error("bundling cancelled")]
    Cancelled,

    #[error("bundler task failed: {0}")]
    Task(String),
}

impl NotFound for BundleError {
    fn is_not_found(&self) -> bool {
        matches!(self, BundleError::NotFound { .. })
    }
}

impl BundleError {
    pub(crate) fn from_open(path: &str, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => BundleError::NotFound {
                path: path.to_string(),
            },
            io::ErrorKind::IsADirectory => BundleError::IsDirectory {
                path: path.to_string(),
            },
            _ => BundleError::Read {
                path: path.to_string(),
                source,
            },
        }
    }
}

/// Produces function bundles.
#[async_trait]
pub trait Bundler: Send + Sync {
    /// Write the bundle for `request` to `out` and return its metadata,
    /// including the digest of the bytes written.
    async fn bundle(
        &self,
        request: &BundleRequest,
        out: &mut (dyn Write + Send),
        cancel: &CancellationToken,
    ) -> Result<FunctionDeployMetadata, BundleError>;

    /// Build an uploadable bundle whose digest is known before upload starts.
    async fn prepare(
        &self,
        request: &BundleRequest,
        cancel: &CancellationToken,
    ) -> Result<Bundle, BundleError>;
}

/// Forwards writes while hashing every byte that passes through.
pub(crate) struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> HashingWriter<W> {
    pub(crate) fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    pub(crate) fn finish(self) -> (W, String) {
        (self.inner, hex::encode(self.hasher.finalize()))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
