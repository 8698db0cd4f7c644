// ABOUTME: In-process bundler that uploads function sources as multipart/form-data.
// ABOUTME: A blocking producer feeds each file part of a reqwest form through a bounded channel.

use super::{Bundle, BundleBody, BundleError, BundleRequest, Bundler};
use crate::api::FunctionDeployMetadata;
use crate::fs::{FileSystem, to_slash};
use crate::import_map::{ImportMap, LoadHook, clean_slash};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use reqwest::Body;
use reqwest::multipart::{Form, Part};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const CHANNEL_CAPACITY: usize = 8;
const CHUNK_SIZE: usize = 64 * 1024;

/// Uploads raw sources and lets the control plane bundle them.
pub struct StreamingBundler {
    fs: Arc<dyn FileSystem>,
}

impl StreamingBundler {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    fn source(&self, request: &BundleRequest) -> FormSource {
        let metadata = FunctionDeployMetadata {
            name: request.slug.to_string(),
            entrypoint_path: slash_path(&request.entrypoint),
            import_map_path: request.import_map.as_deref().map(slash_path),
            static_patterns: (!request.static_files.is_empty())
                .then(|| request.static_files.clone()),
            verify_jwt: Some(request.verify_jwt),
            sha256: None,
        };
        FormSource {
            fs: Arc::clone(&self.fs),
            request: request.clone(),
            metadata,
            files: Vec::new(),
        }
    }

    /// Walk the function on a blocking task, fixing its files and digest.
    async fn plan(
        &self,
        request: &BundleRequest,
        cancel: &CancellationToken,
    ) -> Result<FormSource, BundleError> {
        let mut source = self.source(request);
        let planned = {
            let source = source.clone();
            let cancel = cancel.clone();
            let dispatch = tracing::dispatcher::get_default(|dispatch| dispatch.clone());
            tokio::task::spawn_blocking(move || {
                tracing::dispatcher::with_default(&dispatch, || source.plan(&cancel))
            })
            .await
            .map_err(|e| BundleError::Task(e.to_string()))??
        };
        source.metadata.sha256 = Some(planned.sha256);
        source.files = planned.files;
        Ok(source)
    }
}

#[async_trait]
impl Bundler for StreamingBundler {
    async fn bundle(
        &self,
        request: &BundleRequest,
        out: &mut (dyn Write + Send),
        cancel: &CancellationToken,
    ) -> Result<FunctionDeployMetadata, BundleError> {
        let source = self.plan(request, cancel).await?;
        let FormUpload { form, producer } = source.start(cancel)?;

        let mut body = std::pin::pin!(form.into_stream());
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    return Err(producer
                        .take_cause()
                        .unwrap_or_else(|| BundleError::Write(io::Error::other(e))));
                }
            };
            out.write_all(&chunk).map_err(BundleError::Write)?;
        }
        if let Some(cause) = producer.take_cause() {
            return Err(cause);
        }
        out.flush().map_err(BundleError::Write)?;

        Ok(source.metadata)
    }

    async fn prepare(
        &self,
        request: &BundleRequest,
        cancel: &CancellationToken,
    ) -> Result<Bundle, BundleError> {
        let source = self.plan(request, cancel).await?;
        Ok(Bundle {
            metadata: source.metadata.clone(),
            body: BundleBody::Multipart(source),
        })
    }
}

/// Files and digest found by walking a function once.
struct Planned {
    files: Vec<String>,
    sha256: String,
}

/// Recipe for a multipart upload body, replayable once per attempt.
///
/// The file list is fixed when the bundle is prepared; each attempt reads
/// those files again.
#[derive(Clone)]
pub struct FormSource {
    fs: Arc<dyn FileSystem>,
    request: BundleRequest,
    metadata: FunctionDeployMetadata,
    files: Vec<String>,
}

impl fmt::Debug for FormSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormSource")
            .field("request", &self.request)
            .field("metadata", &self.metadata)
            .field("files", &self.files)
            .finish()
    }
}

/// A form ready to send, plus a handle on the task filling its file parts.
pub struct FormUpload {
    pub form: Form,
    pub producer: ProducerHandle,
}

/// Observes the producer of a [`FormUpload`].
///
/// When the producer fails it stores the cause and cancels [`token`], so the
/// request can stop early and report why.
///
/// [`token`]: ProducerHandle::token
#[derive(Debug, Clone)]
pub struct ProducerHandle {
    token: CancellationToken,
    cause: Arc<Mutex<Option<BundleError>>>,
}

impl ProducerHandle {
    /// Cancelled when the caller cancels or the producer fails.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The producer's error, if it failed.
    pub fn take_cause(&self) -> Option<BundleError> {
        self.cause.lock().take()
    }

    fn fail(&self, name: &str, cause: BundleError) {
        tracing::debug!("Upload producer for {} failed: {}", name, cause);
        *self.cause.lock() = Some(cause);
        self.token.cancel();
    }
}

type PartSender = mpsc::Sender<io::Result<Bytes>>;

impl FormSource {
    /// Project-relative paths of the file parts, in upload order.
    pub fn files(&self) -> &[String] {
        &self.files
    }

    /// Build the form and start filling its file parts on a blocking task.
    pub fn start(&self, cancel: &CancellationToken) -> Result<FormUpload, BundleError> {
        let metadata = serde_json::to_string(&self.metadata)
            .map_err(|e| BundleError::Write(e.into()))?;
        let mut form = Form::new().part(
            "metadata",
            Part::text(metadata)
                .mime_str("application/json")
                .map_err(form_error)?,
        );

        let mut senders: Vec<(String, PartSender)> = Vec::with_capacity(self.files.len());
        for name in &self.files {
            let (tx, mut rx) = mpsc::channel(CHANNEL_CAPACITY);
            let body = Body::wrap_stream(futures::stream::poll_fn(move |cx| rx.poll_recv(cx)));
            let part = Part::stream(body)
                .file_name(name.clone())
                .mime_str("application/octet-stream")
                .map_err(form_error)?;
            form = form.part("file", part);
            senders.push((name.clone(), tx));
        }

        let producer = ProducerHandle {
            token: cancel.child_token(),
            cause: Arc::new(Mutex::new(None)),
        };

        let source = self.clone();
        let handle = producer.clone();
        let dispatch = tracing::dispatcher::get_default(|dispatch| dispatch.clone());
        tokio::task::spawn_blocking(move || {
            tracing::dispatcher::with_default(&dispatch, || source.produce(senders, &handle))
        });

        Ok(FormUpload { form, producer })
    }

    /// Stream every planned file into its part, in order.
    fn produce(&self, parts: Vec<(String, PartSender)>, handle: &ProducerHandle) {
        for (name, tx) in parts {
            match self.send_file(&name, &tx, handle.token()) {
                Ok(true) => {}
                // The request stopped reading; it reports its own error.
                Ok(false) => return,
                Err(cause) => {
                    handle.fail(&self.metadata.name, cause);
                    // Fail the part so a truncated form is never sent as complete.
                    let _ = tx.try_send(Err(io::Error::other("upload producer failed")));
                    return;
                }
            }
        }
    }

    /// Returns `false` once the receiving side of the part has gone away.
    fn send_file(
        &self,
        name: &str,
        tx: &PartSender,
        cancel: &CancellationToken,
    ) -> Result<bool, BundleError> {
        let mut file = self
            .fs
            .open(Path::new(name))
            .map_err(|e| BundleError::from_open(name, e))?;
        let mut buf = vec![0; CHUNK_SIZE];
        loop {
            if cancel.is_cancelled() {
                return Err(BundleError::Cancelled);
            }
            let n = file.read(&mut buf).map_err(|source| BundleError::Read {
                path: name.to_string(),
                source,
            })?;
            if n == 0 {
                return Ok(true);
            }
            if tx.blocking_send(Ok(Bytes::copy_from_slice(&buf[..n]))).is_err() {
                return Ok(false);
            }
        }
    }

    /// Resolve the files to upload and their digest.
    ///
    /// The import map comes first, then static files, then sources reached
    /// from the entrypoint. The digest covers the metadata and every file's
    /// name and contents, so a rename changes it too.
    fn plan(&self, cancel: &CancellationToken) -> Result<Planned, BundleError> {
        let entrypoint = slash_path(&self.request.entrypoint);
        if !self.fs.exists(&self.request.entrypoint) {
            return Err(BundleError::NotFound { path: entrypoint });
        }

        let mut hasher = Sha256::new();
        let metadata = serde_json::to_vec(&self.metadata).map_err(|e| BundleError::Write(e.into()))?;
        hasher.update(&metadata);

        let mut plan = PlanBuilder {
            files: Vec::new(),
            seen: HashSet::new(),
            hasher,
        };

        let import_map = match &self.request.import_map {
            Some(path) => {
                let (map, loaded) = self.load_import_map(path)?;
                if let Some((path, data)) = loaded {
                    plan.add(&slash_path(&path), &data);
                }
                map
            }
            None => ImportMap::default(),
        };

        for pattern in &self.request.static_files {
            if cancel.is_cancelled() {
                return Err(BundleError::Cancelled);
            }
            let files = self
                .fs
                .glob(pattern)
                .map_err(|source| BundleError::StaticFiles {
                    pattern: pattern.clone(),
                    source,
                })?;
            for file in files {
                if plan.contains(&file) {
                    continue;
                }
                let data = self
                    .fs
                    .read(Path::new(&file))
                    .map_err(|e| BundleError::from_open(&file, e))?;
                plan.add(&file, &data);
            }
        }

        import_map.walk_import_paths(&entrypoint, |path, buf: &mut Vec<u8>| {
            if cancel.is_cancelled() {
                return Err(BundleError::Cancelled);
            }
            let mut file = self
                .fs
                .open(Path::new(path))
                .map_err(|e| BundleError::from_open(path, e))?;
            file.read_to_end(buf).map_err(|source| BundleError::Read {
                path: path.to_string(),
                source,
            })?;
            plan.add(path, buf);
            Ok(())
        })?;

        Ok(Planned {
            files: plan.files,
            sha256: hex::encode(plan.hasher.finalize()),
        })
    }

    /// Load the import map, returning the last file actually read after
    /// following any deno.json reference.
    fn load_import_map(
        &self,
        path: &Path,
    ) -> Result<(ImportMap, Option<(PathBuf, Vec<u8>)>), BundleError> {
        let mut loaded = None;
        let map = {
            let capture: LoadHook<'_> = Box::new(|path: &Path, data: &[u8]| {
                loaded = Some((path.to_path_buf(), data.to_vec()));
                Ok(())
            });
            let mut hooks = [capture];
            ImportMap::load_as_deno(path, self.fs.as_ref(), &mut hooks)?
        };
        Ok((map, loaded))
    }
}

struct PlanBuilder {
    files: Vec<String>,
    seen: HashSet<String>,
    hasher: Sha256,
}

impl PlanBuilder {
    fn contains(&self, name: &str) -> bool {
        self.seen.contains(name)
    }

    /// Record a file once. Names and contents are length-prefixed in the digest.
    fn add(&mut self, name: &str, data: &[u8]) {
        if !self.seen.insert(name.to_string()) {
            return;
        }
        self.hasher.update((name.len() as u64).to_be_bytes());
        self.hasher.update(name.as_bytes());
        self.hasher.update((data.len() as u64).to_be_bytes());
        self.hasher.update(data);
        self.files.push(name.to_string());
    }
}

fn slash_path(path: &Path) -> String {
    clean_slash(&to_slash(path))
}

fn form_error(e: reqwest::Error) -> BundleError {
    BundleError::Write(io::Error::other(e))
}
