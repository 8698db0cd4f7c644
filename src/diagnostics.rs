// ABOUTME: Non-fatal problems found while resolving which functions to deploy.
// ABOUTME: Warnings are logged as they are recorded and later shown by the CLI.

use std::fmt;
use std::path::Path;

use crate::types::FunctionSlug;

/// Warnings gathered during function resolution, in the order found.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning and log it.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Warnings of one kind.
    pub fn of_kind(&self, kind: WarningKind) -> impl Iterator<Item = &Warning> {
        self.warnings.iter().filter(move |w| w.kind == kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub kind: WarningKind,
    /// Directory or file the warning is about.
    pub subject: String,
    pub message: String,
}

impl Warning {
    /// A function directory whose name is not a valid slug.
    pub fn invalid_function_name(name: &str, reason: impl fmt::Display) -> Self {
        Self {
            kind: WarningKind::InvalidFunctionName,
            subject: name.to_string(),
            message: format!("Skipping function directory {name}: {reason}"),
        }
    }

    /// A requested function whose entrypoint does not exist.
    pub fn missing_entrypoint(slug: &FunctionSlug, entrypoint: &Path) -> Self {
        Self {
            kind: WarningKind::MissingEntrypoint,
            subject: entrypoint.display().to_string(),
            message: format!(
                "Entrypoint of function {} not found: {}",
                slug,
                entrypoint.display()
            ),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Directory skipped during function discovery.
    InvalidFunctionName,
    /// Entrypoint file missing; bundling will fail.
    MissingEntrypoint,
}
