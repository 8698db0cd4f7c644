// ABOUTME: Reconciles local functions with the control plane.
// ABOUTME: Bundles on the caller's task, uploads on a job queue, then bulk-activates.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use snafu::ResultExt;
use tokio_util::sync::CancellationToken;

use crate::api::{BulkUpdateFunctionBody, FunctionsApi};
use crate::bundle::Bundler;
use crate::config::FunctionSet;
use crate::queue::JobQueue;
use crate::retry::RetryPolicy;
use crate::types::FunctionSlug;

use super::FunctionDeploy;
use super::error::{BulkUpdateSnafu, DeployError, ListFunctionsSnafu};
use super::inventory::Inventory;
use super::transitions::Plan;

type SlugFilter = Box<dyn Fn(&FunctionSlug) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeployOptions {
    /// Uploads running at once.
    pub max_jobs: usize,
    pub retry: RetryPolicy,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            max_jobs: 1,
            retry: RetryPolicy::default(),
        }
    }
}

/// What a successful deploy did to each function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeploySummary {
    pub deployed: Vec<String>,
    pub unchanged: Vec<FunctionSlug>,
    pub disabled: Vec<FunctionSlug>,
    pub filtered: Vec<FunctionSlug>,
    /// Functions still relying on a deprecated import map location.
    pub deprecated_import_maps: Vec<FunctionSlug>,
}

/// Deploys a [`FunctionSet`] to one project.
pub struct Deployer {
    api: Arc<dyn FunctionsApi>,
    bundler: Arc<dyn Bundler>,
    options: DeployOptions,
    filters: Vec<SlugFilter>,
}

impl Deployer {
    pub fn new(
        api: Arc<dyn FunctionsApi>,
        bundler: Arc<dyn Bundler>,
        options: DeployOptions,
    ) -> Self {
        Self {
            api,
            bundler,
            options,
            filters: Vec::new(),
        }
    }

    /// Only deploy functions accepted by `filter`.
    pub fn with_filter(
        mut self,
        filter: impl Fn(&FunctionSlug) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    /// Bundle every enabled function, upload the changed ones and activate them.
    ///
    /// Several functions are uploaded without activation and then activated
    /// together by one bulk update, which is skipped if any upload fails.
    /// Fails with [`DeployError::NoDeploy`] when nothing was uploaded.
    pub async fn deploy(
        &self,
        functions: &FunctionSet,
        cancel: &CancellationToken,
    ) -> Result<DeploySummary, DeployError> {
        let mut summary = DeploySummary::default();

        let mut selected = Vec::new();
        for (slug, function) in functions.iter() {
            if !function.enabled {
                tracing::info!("Skipped deploying Function: {} (disabled)", slug);
                summary.disabled.push(slug.clone());
            } else if !self.filters.iter().all(|accept| accept(slug)) {
                tracing::debug!("Skipped deploying Function: {} (filtered)", slug);
                summary.filtered.push(slug.clone());
            } else {
                selected.push((slug, function));
            }
        }
        if selected.is_empty() {
            return Err(DeployError::NoDeploy);
        }

        let inventory = self.inventory(cancel).await?;
        let bundle_only = selected.len() > 1;

        let mut queue: JobQueue<DeployError> = JobQueue::new(self.options.max_jobs);
        let slots: Arc<Mutex<Vec<Option<BulkUpdateFunctionBody>>>> = Arc::default();

        for (slug, function) in selected {
            if function.uses_deprecated_import_map() {
                summary.deprecated_import_maps.push(slug.clone());
            }

            let ready = FunctionDeploy::new(slug.clone(), function.bundle_request(slug))
                .bundle(self.bundler.as_ref(), cancel)
                .await?;

            let pending = match ready.plan(&inventory) {
                Plan::Unchanged(ready) => {
                    tracing::info!("No change found in Function: {}", ready.slug());
                    summary.unchanged.push(ready.slug().clone());
                    continue;
                }
                Plan::Upload(pending) => pending,
            };

            let index = {
                let mut slots = slots.lock();
                slots.push(None);
                slots.len() - 1
            };
            let api = Arc::clone(&self.api);
            let slots = Arc::clone(&slots);
            let mut backoff = self.options.retry.backoff();
            let cancel = cancel.clone();

            queue
                .put(async move {
                    let staged = pending
                        .upload(api.as_ref(), &mut backoff, bundle_only, &cancel)
                        .await?;
                    slots.lock()[index] = Some(staged.into_record());
                    Ok(())
                })
                .await?;
        }

        if !summary.deprecated_import_maps.is_empty() {
            let names: Vec<&str> = summary
                .deprecated_import_maps
                .iter()
                .map(FunctionSlug::as_str)
                .collect();
            tracing::warn!(
                "Functions using deprecated import_map.json (please migrate to deno.json): {}",
                names.join(", ")
            );
        }

        if let Err(mut errors) = queue.collect().await {
            if errors.panicked == 0 && errors.errors.len() == 1 {
                return Err(errors.errors.remove(0));
            }
            return Err(DeployError::Upload { source: errors });
        }

        let records: Vec<BulkUpdateFunctionBody> =
            slots.lock().drain(..).flatten().collect();
        if records.is_empty() {
            return Err(DeployError::NoDeploy);
        }

        if bundle_only {
            tracing::info!("Updating {} Functions...", records.len());
            self.api
                .bulk_update_functions(&records, cancel)
                .await
                .context(BulkUpdateSnafu)?;
        }

        summary.deployed = records.into_iter().map(|r| r.slug).collect();
        Ok(summary)
    }

    async fn inventory(&self, cancel: &CancellationToken) -> Result<Inventory, DeployError> {
        let api = self.api.as_ref();
        let mut backoff = self.options.retry.backoff();
        let functions = backoff
            .retry(cancel, || api.list_functions(cancel))
            .await
            .context(ListFunctionsSnafu)?;

        tracing::debug!("Found {} deployed functions", functions.len());
        Ok(Inventory::new(functions))
    }
}
