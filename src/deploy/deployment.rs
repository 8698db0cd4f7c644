// ABOUTME: Generic per-function deploy struct parameterized by state.
// ABOUTME: State types carry their own data for compile-time guarantees.

use crate::api::BulkUpdateFunctionBody;
use crate::bundle::BundleRequest;
use crate::types::FunctionSlug;

use super::state::{Pending, Planned, Ready, Staged, UpsertAction};

/// One function moving through bundle, plan and upload.
///
/// The state type parameter `S` carries what is known at each step, so an
/// upload can only be attempted on a bundle that was planned against the
/// remote inventory.
#[derive(Debug)]
pub struct FunctionDeploy<S> {
    pub(crate) slug: FunctionSlug,
    pub(crate) state: S,
}

impl FunctionDeploy<Planned> {
    pub fn new(slug: FunctionSlug, request: BundleRequest) -> Self {
        FunctionDeploy {
            slug,
            state: Planned { request },
        }
    }
}

impl<S> FunctionDeploy<S> {
    pub fn slug(&self) -> &FunctionSlug {
        &self.slug
    }
}

impl FunctionDeploy<Ready> {
    pub fn sha256(&self) -> Option<&str> {
        self.state.bundle.sha256()
    }
}

impl FunctionDeploy<Pending> {
    pub fn action(&self) -> UpsertAction {
        self.state.action
    }
}

impl FunctionDeploy<Staged> {
    /// The action that finally succeeded; a create may end as an update.
    pub fn action(&self) -> UpsertAction {
        self.state.action
    }

    pub fn record(&self) -> &BulkUpdateFunctionBody {
        &self.state.record
    }

    pub fn into_record(self) -> BulkUpdateFunctionBody {
        self.state.record
    }
}
