// ABOUTME: Test support utilities.
// ABOUTME: Provides tracing setup, temporary projects and control plane fixtures.

use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, Once};
use tracing_subscriber::fmt::MakeWriter;

static TRACING_INIT: Once = Once::new();

pub const PROJECT_REF: &str = "abcdefghijklmnopqrst";

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("edgefn=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Log output collected by [`capture_logs`].
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

#[allow(dead_code)]
impl CapturedLogs {
    /// Lines logged at WARN level.
    pub fn warnings(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .filter(|line| line.contains("WARN"))
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Capture edgefn logs on this thread until the guard is dropped.
#[allow(dead_code)]
pub fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("edgefn=debug"))
        .with_writer(logs.clone())
        .with_ansi(false)
        .finish();
    (logs, tracing::subscriber::set_default(subscriber))
}

/// Create a temporary project tree from `(path, contents)` pairs.
#[allow(dead_code)]
pub fn project(files: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_files(dir.path(), files);
    dir
}

#[allow(dead_code)]
pub fn write_files(root: &Path, files: &[(&str, &str)]) {
    for (path, contents) in files {
        let full = root.join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, contents).unwrap();
    }
}

/// A function record as the control plane returns it.
#[allow(dead_code)]
pub fn function_json(slug: &str, version: i64, sha: Option<&str>) -> serde_json::Value {
    let mut value = serde_json::json!({
        "id": format!("id-{slug}"),
        "slug": slug,
        "name": slug,
        "version": version,
        "status": "ACTIVE",
        "verify_jwt": true,
        "entrypoint_path": format!("functions/{slug}/index.ts"),
        "created_at": 1_700_000_000_000_i64,
        "updated_at": 1_700_000_000_000_i64,
    });
    if let Some(sha) = sha {
        value["ezbr_sha256"] = serde_json::Value::String(sha.to_string());
    }
    value
}
