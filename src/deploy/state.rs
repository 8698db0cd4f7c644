// ABOUTME: Function deploy state types for the type state pattern.
// ABOUTME: Each state carries the data that exists at that point of the pipeline.

use crate::api::BulkUpdateFunctionBody;
use crate::bundle::{Bundle, BundleRequest};

/// Selected for deployment.
/// Available actions: `bundle()`
#[derive(Debug)]
pub struct Planned {
    pub(crate) request: BundleRequest,
}

/// Bundled and hashed.
/// Available actions: `plan()`
#[derive(Debug)]
pub struct Ready {
    pub(crate) bundle: Bundle,
}

/// Changed since the last deploy, waiting for upload.
/// Available actions: `upload()`
#[derive(Debug)]
pub struct Pending {
    pub(crate) bundle: Bundle,
    pub(crate) action: UpsertAction,
}

/// Uploaded. Active unless uploaded with `bundle_only`, in which case it
/// waits for the bulk update.
/// Available actions: `into_record()`
#[derive(Debug)]
pub struct Staged {
    pub(crate) record: BulkUpdateFunctionBody,
    pub(crate) action: UpsertAction,
}

/// Whether the upload creates a new function or updates an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    Create,
    Update,
}
