// ABOUTME: Dependency walker that follows import/export statements from an entrypoint.
// ABOUTME: Applies import map aliases and yields each reachable local file once.

use super::ImportMap;
use regex::Regex;
use std::collections::HashSet;
use std::io;
use std::sync::LazyLock;

/// Matches `import ... from "x"`, `export ... from "x"` and `import("x")`.
pub const IMPORT_PATH_PATTERN: &str = r#"(?i)(?:import|export)\s+(?:\{[^{}]+\}|.*?)\s*(?:from)?\s*['"](.*?)['"]|import\(\s*['"](.*?)['"]\)"#;

static IMPORT_PATH_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(IMPORT_PATH_PATTERN).expect("import path pattern is a valid regex")
});

/// Errors that can signal a file missing from disk.
///
/// The walker logs and skips missing files instead of failing.
pub trait NotFound {
    fn is_not_found(&self) -> bool;
}

impl NotFound for io::Error {
    fn is_not_found(&self) -> bool {
        self.kind() == io::ErrorKind::NotFound
    }
}

impl ImportMap {
    /// Visit every local source file reachable from `entrypoint`.
    ///
    /// `read_file` is called exactly once per unique path, in depth-first
    /// discovery order, and must append the file's contents to the buffer.
    /// Module references are found by regex, not by parsing: commented-out
    /// imports are followed too. References without an extension, and those
    /// not starting with `./`, `../` or `/` after alias substitution, are
    /// ignored.
    pub fn walk_import_paths<E, F>(&self, entrypoint: &str, mut read_file: F) -> Result<(), E>
    where
        E: NotFound + std::fmt::Display,
        F: FnMut(&str, &mut Vec<u8>) -> Result<(), E>,
    {
        let mut seen = HashSet::new();
        let mut stack = vec![clean_slash(&entrypoint.replace('\\', "/"))];
        let mut buf = Vec::new();

        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }

            buf.clear();
            match read_file(&current, &mut buf) {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    tracing::warn!("{}", e);
                    continue;
                }
                Err(e) => return Err(e),
            }

            let text = String::from_utf8_lossy(&buf);
            for captures in IMPORT_PATH_REGEX.captures_iter(&text) {
                let Some(module) = captures.get(1).or_else(|| captures.get(2)) else {
                    continue;
                };
                if let Some(next) = self.next_path(&current, module.as_str().trim()) {
                    stack.push(next);
                }
            }
        }

        Ok(())
    }

    /// Turn a module reference found in `current` into a local path to visit.
    fn next_path(&self, current: &str, module: &str) -> Option<String> {
        let (module, substituted) = match self.longest_alias(module) {
            Some((alias, target)) => (format!("{}{}", target, &module[alias.len()..]), true),
            None => (module.to_string(), false),
        };

        // Bare specifiers and directory imports
        if !has_extension(&module) {
            return None;
        }
        if !is_relative(&module) && !module.starts_with('/') {
            return None;
        }

        if is_relative(&module) && !substituted {
            Some(clean_slash(&format!("{}/{}", dir_slash(current), module)))
        } else {
            Some(clean_slash(&module))
        }
    }

    fn longest_alias(&self, module: &str) -> Option<(&str, &str)> {
        self.imports
            .iter()
            .filter(|(alias, _)| !alias.is_empty() && module.starts_with(alias.as_str()))
            .max_by_key(|(alias, _)| alias.len())
            .map(|(alias, target)| (alias.as_str(), target.as_str()))
    }
}

fn is_relative(module: &str) -> bool {
    module.starts_with("./") || module.starts_with("../")
}

fn has_extension(module: &str) -> bool {
    module.rsplit('/').next().is_some_and(|base| base.contains('.'))
}

fn dir_slash(path: &str) -> String {
    match path.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => clean_slash(&path[..idx]),
        None => ".".to_string(),
    }
}

/// Lexically clean a slash-separated path.
///
/// Collapses repeated slashes, `.` elements and `..` elements that follow a
/// named element. Leading `..` elements of relative paths are kept; `..` at
/// the root is dropped. An empty result becomes `.`.
pub fn clean_slash(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if rooted => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}
