// ABOUTME: Filesystem seam used by the import-map resolver and bundlers.
// ABOUTME: OsFs resolves relative paths against a project root directory.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

/// Read-only view of the project tree.
///
/// Paths handed to these methods may be relative (resolved against the
/// implementation's root) or absolute.
pub trait FileSystem: Send + Sync {
    /// Read a whole file into memory.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Open a file for streaming reads.
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;

    /// Whether anything exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Whether `path` is a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Expand a glob pattern into root-relative slash paths, sorted.
    fn glob(&self, pattern: &str) -> io::Result<Vec<String>>;

    /// Absolute host path for `path`.
    fn abs_path(&self, path: &Path) -> PathBuf;
}

/// The real filesystem, rooted at a project directory.
#[derive(Debug, Clone)]
pub struct OsFs {
    root: PathBuf,
}

impl OsFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl FileSystem for OsFs {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(self.resolve(path))
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        let resolved = self.resolve(path);
        if resolved.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("file path is a directory: {}", path.display()),
            ));
        }
        Ok(Box::new(File::open(resolved)?))
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.resolve(path).is_dir()
    }

    fn glob(&self, pattern: &str) -> io::Result<Vec<String>> {
        let full = self.resolve(Path::new(pattern));
        let full = full.to_string_lossy();
        let paths = glob::glob(&full)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

        let mut files = Vec::new();
        for entry in paths {
            let path = entry.map_err(|e| e.into_error())?;
            if path.is_dir() {
                continue;
            }
            let relative = path.strip_prefix(&self.root).unwrap_or(&path);
            files.push(to_slash(relative));
        }
        files.sort();

        if files.is_empty() {
            tracing::warn!("no files matched pattern: {}", pattern);
        }
        Ok(files)
    }

    fn abs_path(&self, path: &Path) -> PathBuf {
        clean_path(&self.resolve(path))
    }
}

/// Render a path with forward slashes regardless of platform.
pub fn to_slash(path: &Path) -> String {
    let rendered = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '\\' {
        rendered.replace('\\', "/")
    } else {
        rendered.into_owned()
    }
}

/// Lexically clean a host path, collapsing `.` and `..` without touching disk.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}
