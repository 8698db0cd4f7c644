// ABOUTME: Import map loading, normalization and alias resolution.
// ABOUTME: Understands deno.json files that only reference another import map.

mod jsonc;
mod walk;

pub use walk::{IMPORT_PATH_PATTERN, NotFound, clean_slash};

use crate::fs::{FileSystem, clean_path, to_slash};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Callback invoked with the path and raw bytes of every import map file loaded.
pub type LoadHook<'a> = Box<dyn FnMut(&Path, &[u8]) -> Result<(), ImportMapError> + Send + 'a>;

#[derive(Debug, Error)]
pub enum ImportMapError {
    #[error("import map not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to load import map {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("failed to parse import map {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("import map hook failed for {}: {message}", path.display())]
    Hook { path: PathBuf, message: String },
}

/// A module alias map in the Deno import map format.
///
/// Aliases are matched by prefix. Module references inside sources are found
/// with a regular expression rather than a parser, so imports inside comments
/// and strings are followed as well; see [`ImportMap::walk_import_paths`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportMap {
    #[serde(default)]
    pub imports: IndexMap<String, String>,

    #[serde(default)]
    pub scopes: IndexMap<String, IndexMap<String, String>>,

    /// Reference to another import map file, as used by `deno.json`.
    #[serde(
        default,
        rename = "importMap",
        skip_serializing_if = "Option::is_none"
    )]
    pub import_map: Option<String>,
}

impl ImportMap {
    /// Parse import map bytes, tolerating comments and trailing commas.
    pub fn parse(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(&jsonc::to_json(data))
    }

    /// True when this map carries no aliases and only points at another file.
    pub fn is_reference(&self) -> bool {
        self.imports.is_empty()
            && self.scopes.is_empty()
            && self.import_map.as_deref().is_some_and(|r| !r.is_empty())
    }

    /// Load the import map at `path`, resolving relative targets against its directory.
    pub fn load(
        path: &Path,
        fs: &dyn FileSystem,
        hooks: &mut [LoadHook<'_>],
    ) -> Result<Self, ImportMapError> {
        let data = fs.read(path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => ImportMapError::NotFound {
                path: path.to_path_buf(),
            },
            _ => ImportMapError::Io {
                path: path.to_path_buf(),
                source,
            },
        })?;

        let parsed = Self::parse(&data).map_err(|source| ImportMapError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let resolved = parsed.resolve(path, fs);

        for hook in hooks.iter_mut() {
            hook(path, &data)?;
        }

        tracing::debug!(
            "Loaded import map {} ({} imports, {} scopes)",
            path.display(),
            resolved.imports.len(),
            resolved.scopes.len()
        );
        Ok(resolved)
    }

    /// Like [`ImportMap::load`], but follows the `importMap` reference of a
    /// `deno.json` or `deno.jsonc` that declares no aliases of its own.
    pub fn load_as_deno(
        path: &Path,
        fs: &dyn FileSystem,
        hooks: &mut [LoadHook<'_>],
    ) -> Result<Self, ImportMapError> {
        let map = Self::load(path, fs, hooks)?;
        if !is_deno_config(path) || !map.is_reference() {
            return Ok(map);
        }

        let reference = map.import_map.as_deref().unwrap_or_default();
        let dir = path.parent().unwrap_or(Path::new(""));
        let referenced = clean_path(&dir.join(reference));
        tracing::debug!(
            "{} references import map {}",
            path.display(),
            referenced.display()
        );
        Self::load(&referenced, fs, hooks)
    }

    /// Resolve every relative target against the directory of `map_path`.
    ///
    /// Targets that do not exist on disk are kept verbatim so that URLs and
    /// virtual modules survive.
    pub fn resolve(&self, map_path: &Path, fs: &dyn FileSystem) -> Self {
        let imports = self
            .imports
            .iter()
            .map(|(k, v)| (k.clone(), resolve_host_path(map_path, v, fs)))
            .collect();

        let scopes = self
            .scopes
            .iter()
            .map(|(scope, mapping)| {
                let mapping = mapping
                    .iter()
                    .map(|(k, v)| (k.clone(), resolve_host_path(map_path, v, fs)))
                    .collect();
                (scope.clone(), mapping)
            })
            .collect();

        Self {
            imports,
            scopes,
            import_map: self.import_map.clone(),
        }
    }
}

/// Whether `path` names a modern Deno configuration file.
pub fn is_deno_config(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy())
        .is_some_and(|name| {
            name.eq_ignore_ascii_case("deno.json") || name.eq_ignore_ascii_case("deno.jsonc")
        })
}

fn resolve_host_path(map_path: &Path, target: &str, fs: &dyn FileSystem) -> String {
    if Path::new(target).is_absolute() {
        return target.to_string();
    }

    let dir = map_path.parent().unwrap_or(Path::new(""));
    let resolved = clean_path(&dir.join(target));
    if !fs.exists(&resolved) {
        return target.to_string();
    }

    let mut resolved = to_slash(&resolved);
    // Directory aliases must keep their trailing slash to act as prefixes.
    if target.ends_with('/') && !resolved.ends_with('/') {
        resolved.push('/');
    }
    if !Path::new(&resolved).is_absolute() {
        resolved = format!("./{resolved}");
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::OsFs;
    use std::fs;

    fn project() -> (tempfile::TempDir, OsFs) {
        let dir = tempfile::tempdir().unwrap();
        let fs = OsFs::new(dir.path());
        (dir, fs)
    }

    fn write(dir: &tempfile::TempDir, path: &str, contents: &str) {
        let full = dir.path().join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, contents).unwrap();
    }

    #[test]
    fn reference_requires_empty_aliases() {
        let map = ImportMap {
            import_map: Some("./import_map.json".to_string()),
            ..Default::default()
        };
        assert!(map.is_reference());

        let mut with_imports = map.clone();
        with_imports
            .imports
            .insert("a".to_string(), "b".to_string());
        assert!(!with_imports.is_reference());

        assert!(!ImportMap::default().is_reference());
    }

    #[test]
    fn resolves_existing_directory_alias() {
        let (dir, fs) = project();
        write(&dir, "functions/shared/mod.ts", "");
        write(
            &dir,
            "functions/hello/import_map.json",
            r#"{ "imports": { "shared/": "../shared/" } }"#,
        );

        let map = ImportMap::load(Path::new("functions/hello/import_map.json"), &fs, &mut [])
            .unwrap();
        assert_eq!(map.imports["shared/"], "./functions/shared/");
    }

    #[test]
    fn keeps_unresolved_targets_verbatim() {
        let (dir, fs) = project();
        write(
            &dir,
            "import_map.json",
            r#"{
                "imports": {
                    "std/": "https://deno.land/std@0.200.0/",
                    "npm:": "npm:",
                    "missing": "./missing.ts"
                }
            }"#,
        );

        let map = ImportMap::load(Path::new("import_map.json"), &fs, &mut []).unwrap();
        assert_eq!(map.imports["std/"], "https://deno.land/std@0.200.0/");
        assert_eq!(map.imports["npm:"], "npm:");
        assert_eq!(map.imports["missing"], "./missing.ts");
    }

    #[test]
    fn keeps_absolute_targets() {
        let (dir, fs) = project();
        write(
            &dir,
            "import_map.json",
            r#"{ "imports": { "abs": "/opt/lib/mod.ts" } }"#,
        );

        let map = ImportMap::load(Path::new("import_map.json"), &fs, &mut []).unwrap();
        assert_eq!(map.imports["abs"], "/opt/lib/mod.ts");
    }

    #[test]
    fn resolves_scoped_targets() {
        let (dir, fs) = project();
        write(&dir, "vendor/lib.ts", "");
        write(
            &dir,
            "import_map.json",
            r#"{ "scopes": { "https://example.com/": { "lib": "./vendor/lib.ts" } } }"#,
        );

        let map = ImportMap::load(Path::new("import_map.json"), &fs, &mut []).unwrap();
        assert_eq!(map.scopes["https://example.com/"]["lib"], "./vendor/lib.ts");
    }

    #[test]
    fn missing_file_is_not_found() {
        let (_dir, fs) = project();
        let err = ImportMap::load(Path::new("nope.json"), &fs, &mut []).unwrap_err();
        assert!(matches!(err, ImportMapError::NotFound { .. }));
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let (dir, fs) = project();
        write(&dir, "import_map.json", "{ \"imports\": ");

        let err = ImportMap::load(Path::new("import_map.json"), &fs, &mut []).unwrap_err();
        assert!(matches!(err, ImportMapError::Parse { .. }));
        assert!(err.to_string().contains("import_map.json"));
    }

    #[test]
    fn hooks_receive_path_and_bytes() {
        let (dir, fs) = project();
        let contents = "// aliases\n{ \"imports\": {} }";
        write(&dir, "import_map.json", contents);

        let mut seen = Vec::new();
        {
            let mut hooks: Vec<LoadHook<'_>> = vec![Box::new(|path: &Path, data: &[u8]| {
                seen.push((path.to_path_buf(), data.to_vec()));
                Ok(())
            })];
            ImportMap::load(Path::new("import_map.json"), &fs, &mut hooks).unwrap();
        }

        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, PathBuf::from("import_map.json"));
        assert_eq!(seen[0].1, contents.as_bytes());
    }

    #[test]
    fn deno_json_follows_reference_once() {
        let (dir, fs) = project();
        write(&dir, "functions/shared/util.ts", "");
        write(
            &dir,
            "functions/hello/deno.json",
            r#"{ "importMap": "../import_map.json" }"#,
        );
        write(
            &dir,
            "functions/import_map.json",
            r#"{ "imports": { "util": "./shared/util.ts" } }"#,
        );

        let mut loaded = Vec::new();
        {
            let mut hooks: Vec<LoadHook<'_>> = vec![Box::new(|path: &Path, _: &[u8]| {
                loaded.push(path.to_path_buf());
                Ok(())
            })];
            let map =
                ImportMap::load_as_deno(Path::new("functions/hello/deno.json"), &fs, &mut hooks)
                    .unwrap();
            assert_eq!(map.imports["util"], "./functions/shared/util.ts");
        }

        assert_eq!(
            loaded,
            vec![
                PathBuf::from("functions/hello/deno.json"),
                PathBuf::from("functions/import_map.json"),
            ]
        );
    }

    #[test]
    fn plain_import_map_reference_is_not_followed() {
        let (dir, fs) = project();
        write(
            &dir,
            "import_map.json",
            r#"{ "importMap": "./other.json" }"#,
        );

        let map = ImportMap::load_as_deno(Path::new("import_map.json"), &fs, &mut []).unwrap();
        assert!(map.is_reference());
    }

    #[test]
    fn serialization_round_trip_preserves_keys() {
        let (dir, fs) = project();
        write(&dir, "lib/mod.ts", "");
        write(
            &dir,
            "import_map.json",
            r#"{ "imports": { "z": "https://x.dev/z.ts", "lib/": "./lib/", "a": "/abs/a.ts" } }"#,
        );

        let map = ImportMap::load(Path::new("import_map.json"), &fs, &mut []).unwrap();
        let json = serde_json::to_string(&map).unwrap();
        let back: ImportMap = serde_json::from_str(&json).unwrap();

        let keys: Vec<_> = back.imports.keys().cloned().collect();
        assert_eq!(keys, vec!["z", "lib/", "a"]);
        assert_eq!(back.imports["z"], "https://x.dev/z.ts");
        assert_eq!(back.imports["a"], "/abs/a.ts");
        assert_eq!(back.imports["lib/"], "./lib/");
    }
}
