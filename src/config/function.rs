// ABOUTME: Per-function configuration and discovery of the functions to deploy.
// ABOUTME: Resolves entrypoints and picks each function's import map by precedence.

use crate::bundle::BundleRequest;
use crate::diagnostics::{Diagnostics, Warning};
use crate::error::{Error, Result};
use crate::fs::{FileSystem, clean_path, to_slash};
use crate::types::FunctionSlug;
use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::Config;

/// A function entry under `functions:` in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FunctionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub verify_jwt: bool,

    #[serde(default)]
    pub entrypoint: Option<PathBuf>,

    #[serde(default)]
    pub import_map: Option<PathBuf>,

    #[serde(default)]
    pub static_files: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Default for FunctionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            verify_jwt: true,
            entrypoint: None,
            import_map: None,
            static_files: Vec::new(),
        }
    }
}

/// Command-line settings that override the config file.
#[derive(Debug, Clone, Default)]
pub struct FunctionOverrides {
    pub import_map: Option<PathBuf>,
    pub no_verify_jwt: bool,
}

/// Where a function's import map came from, highest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMapSource {
    Flag,
    Config,
    DenoJson,
    DenoJsonc,
    /// `import_map.json` next to the entrypoint.
    LegacyImportMap,
    /// Top-level `import_map` in the config file.
    Global,
    /// `import_map.json` at the root of the functions directory.
    GlobalFallback,
}

impl ImportMapSource {
    pub fn is_deprecated(self) -> bool {
        matches!(
            self,
            ImportMapSource::LegacyImportMap | ImportMapSource::GlobalFallback
        )
    }
}

/// A function with every setting resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub enabled: bool,
    pub verify_jwt: bool,
    pub entrypoint: PathBuf,
    pub import_map: Option<PathBuf>,
    pub import_map_source: Option<ImportMapSource>,
    pub static_files: Vec<String>,
}

impl Function {
    pub fn bundle_request(&self, slug: &FunctionSlug) -> BundleRequest {
        BundleRequest {
            slug: slug.clone(),
            entrypoint: self.entrypoint.clone(),
            import_map: self.import_map.clone(),
            static_files: self.static_files.clone(),
            verify_jwt: self.verify_jwt,
        }
    }

    pub fn uses_deprecated_import_map(&self) -> bool {
        self.import_map_source.is_some_and(ImportMapSource::is_deprecated)
    }
}

/// Functions to deploy, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionSet {
    functions: IndexMap<FunctionSlug, Function>,
}

impl FunctionSet {
    pub fn insert(&mut self, slug: FunctionSlug, function: Function) {
        self.functions.insert(slug, function);
    }

    pub fn get(&self, slug: &FunctionSlug) -> Option<&Function> {
        self.functions.get(slug)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FunctionSlug, &Function)> {
        self.functions.iter()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl FromIterator<(FunctionSlug, Function)> for FunctionSet {
    fn from_iter<I: IntoIterator<Item = (FunctionSlug, Function)>>(iter: I) -> Self {
        Self {
            functions: iter.into_iter().collect(),
        }
    }
}

impl Config {
    /// Resolve the functions named by `slugs`, or every known function when
    /// `slugs` is empty: configured ones first, then discovered directories.
    pub fn function_set(
        &self,
        slugs: &[FunctionSlug],
        overrides: &FunctionOverrides,
        fs: &dyn FileSystem,
        diagnostics: &mut Diagnostics,
    ) -> Result<FunctionSet> {
        let slugs = if slugs.is_empty() {
            self.known_slugs(fs, diagnostics)?
        } else {
            slugs.to_vec()
        };

        let mut set = FunctionSet::default();
        let mut entrypoints: HashMap<PathBuf, FunctionSlug> = HashMap::new();
        for slug in slugs {
            let function = self.resolve_function(&slug, overrides, fs);
            if let Some(other) = entrypoints.insert(clean_path(&function.entrypoint), slug.clone()) {
                return Err(Error::InvalidConfig(format!(
                    "functions {} and {} share the entrypoint {}",
                    other,
                    slug,
                    to_slash(&function.entrypoint)
                )));
            }
            if !fs.exists(&function.entrypoint) {
                diagnostics.warn(Warning::missing_entrypoint(&slug, &function.entrypoint));
            }
            set.insert(slug, function);
        }
        Ok(set)
    }

    fn known_slugs(
        &self,
        fs: &dyn FileSystem,
        diagnostics: &mut Diagnostics,
    ) -> Result<Vec<FunctionSlug>> {
        let mut slugs: Vec<FunctionSlug> = self.functions.keys().cloned().collect();

        let pattern = format!("{}/*/index.ts", to_slash(&self.functions_dir));
        for entrypoint in fs.glob(&pattern)? {
            let Some(name) = Path::new(&entrypoint)
                .parent()
                .and_then(Path::file_name)
                .map(|n| n.to_string_lossy().into_owned())
            else {
                continue;
            };

            match FunctionSlug::new(&name) {
                Ok(slug) if !slugs.contains(&slug) => slugs.push(slug),
                Ok(_) => {}
                Err(e) => diagnostics.warn(Warning::invalid_function_name(&name, e)),
            }
        }
        Ok(slugs)
    }

    fn resolve_function(
        &self,
        slug: &FunctionSlug,
        overrides: &FunctionOverrides,
        fs: &dyn FileSystem,
    ) -> Function {
        let declared = self.functions.get(slug).cloned().unwrap_or_default();
        let dir = self.functions_dir.join(slug.as_str());
        let entrypoint = declared
            .entrypoint
            .clone()
            .unwrap_or_else(|| dir.join("index.ts"));
        let (import_map, import_map_source) =
            match self.resolve_import_map(&dir, &declared, overrides, fs) {
                Some((path, source)) => (Some(path), Some(source)),
                None => (None, None),
            };

        Function {
            enabled: declared.enabled,
            verify_jwt: declared.verify_jwt && !overrides.no_verify_jwt,
            entrypoint,
            import_map,
            import_map_source,
            static_files: declared.static_files,
        }
    }

    fn resolve_import_map(
        &self,
        dir: &Path,
        declared: &FunctionConfig,
        overrides: &FunctionOverrides,
        fs: &dyn FileSystem,
    ) -> Option<(PathBuf, ImportMapSource)> {
        if let Some(path) = &overrides.import_map {
            return Some((path.clone(), ImportMapSource::Flag));
        }
        if let Some(path) = &declared.import_map {
            return Some((path.clone(), ImportMapSource::Config));
        }

        let local = [
            ("deno.json", ImportMapSource::DenoJson),
            ("deno.jsonc", ImportMapSource::DenoJsonc),
            ("import_map.json", ImportMapSource::LegacyImportMap),
        ];
        for (name, source) in local {
            let candidate = dir.join(name);
            if fs.exists(&candidate) {
                return Some((candidate, source));
            }
        }

        if let Some(path) = &self.import_map {
            return Some((path.clone(), ImportMapSource::Global));
        }
        let fallback = self.functions_dir.join("import_map.json");
        fs.exists(&fallback)
            .then_some((fallback, ImportMapSource::GlobalFallback))
    }
}
