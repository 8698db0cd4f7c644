// ABOUTME: Snapshot of the functions already deployed to the project.
// ABOUTME: Maps each remote slug to the digest of its last uploaded bundle.

use std::collections::HashMap;

use crate::api::FunctionResponse;
use crate::types::FunctionSlug;

/// Remote functions keyed by slug. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    digests: HashMap<String, Option<String>>,
}

impl Inventory {
    pub fn new(functions: Vec<FunctionResponse>) -> Self {
        let digests = functions
            .into_iter()
            .map(|f| (f.slug, f.ezbr_sha256))
            .collect();
        Self { digests }
    }

    pub fn contains(&self, slug: &FunctionSlug) -> bool {
        self.digests.contains_key(slug.as_str())
    }

    /// Digest of the deployed bundle, if the function exists and has one.
    pub fn digest(&self, slug: &FunctionSlug) -> Option<&str> {
        self.digests.get(slug.as_str()).and_then(|d| d.as_deref())
    }
}
