// ABOUTME: Deploy error types with SNAFU pattern.
// ABOUTME: Each variant names the failed operation and chains the underlying cause.

use snafu::Snafu;

use crate::api::ApiError;
use crate::bundle::BundleError;
use crate::queue::JobErrors;
use crate::types::FunctionSlug;

/// Errors from a deploy run.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DeployError {
    /// Nothing was uploaded: no functions matched, or none changed.
    #[snafu(display("No Functions specified or found"))]
    NoDeploy,

    #[snafu(display("failed to list functions: {source}"))]
    ListFunctions { source: ApiError },

    #[snafu(display("failed to bundle function {slug}: {source}"))]
    Bundle {
        slug: FunctionSlug,
        source: BundleError,
    },

    #[snafu(display("failed to create function {slug}: {source}"))]
    CreateFunction {
        slug: FunctionSlug,
        source: ApiError,
    },

    #[snafu(display("failed to update function {slug}: {source}"))]
    UpdateFunction {
        slug: FunctionSlug,
        source: ApiError,
    },

    #[snafu(display("failed to bulk update: {source}"))]
    BulkUpdate { source: ApiError },

    /// More than one upload failed.
    #[snafu(display("failed to deploy functions:\n{source}"))]
    Upload { source: JobErrors<DeployError> },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployErrorKind {
    /// Nothing to deploy.
    NoDeploy,
    /// The run was cancelled.
    Cancelled,
    /// Could not reach the control plane.
    Network,
    /// The control plane rejected a request.
    Rejected,
    /// A function could not be bundled.
    Bundle,
    /// Several uploads failed for different reasons.
    Multiple,
}

impl DeployError {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> DeployErrorKind {
        match self {
            DeployError::NoDeploy => DeployErrorKind::NoDeploy,
            DeployError::Bundle { source, .. } => bundle_kind(source),
            DeployError::ListFunctions { source }
            | DeployError::CreateFunction { source, .. }
            | DeployError::UpdateFunction { source, .. }
            | DeployError::BulkUpdate { source } => api_kind(source),
            DeployError::Upload { source } => {
                let mut kinds = source.errors.iter().map(DeployError::kind);
                match kinds.next() {
                    Some(first) if source.panicked == 0 && kinds.all(|k| k == first) => first,
                    _ => DeployErrorKind::Multiple,
                }
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == DeployErrorKind::Cancelled
    }

    /// Slug of the function that failed, if the error concerns one.
    pub fn slug(&self) -> Option<&FunctionSlug> {
        match self {
            DeployError::Bundle { slug, .. }
            | DeployError::CreateFunction { slug, .. }
            | DeployError::UpdateFunction { slug, .. } => Some(slug),
            _ => None,
        }
    }
}

fn bundle_kind(source: &BundleError) -> DeployErrorKind {
    match source {
        BundleError::Cancelled => DeployErrorKind::Cancelled,
        _ => DeployErrorKind::Bundle,
    }
}

fn api_kind(source: &ApiError) -> DeployErrorKind {
    match source {
        ApiError::Cancelled => DeployErrorKind::Cancelled,
        ApiError::Network(_) => DeployErrorKind::Network,
        ApiError::Producer(cause) => bundle_kind(cause),
        ApiError::Status { .. } | ApiError::DuplicateSlug { .. } | ApiError::Decode(_) => {
            DeployErrorKind::Rejected
        }
    }
}
