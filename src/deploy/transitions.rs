// ABOUTME: State transition methods for per-function deploys.
// ABOUTME: Each method consumes self and returns the next state on success.

use std::sync::atomic::{AtomicBool, Ordering};

use snafu::ResultExt;
use tokio_util::sync::CancellationToken;

use crate::api::{ApiError, BulkUpdateFunctionBody, DeployParams, FunctionsApi};
use crate::bundle::Bundler;
use crate::retry::Backoff;

use super::FunctionDeploy;
use super::error::{BundleSnafu, CreateFunctionSnafu, DeployError, UpdateFunctionSnafu};
use super::inventory::Inventory;
use super::state::{Pending, Planned, Ready, Staged, UpsertAction};

/// Outcome of comparing a bundle against the remote inventory.
#[derive(Debug)]
pub enum Plan {
    /// The remote digest matches; nothing to upload.
    Unchanged(FunctionDeploy<Ready>),
    Upload(FunctionDeploy<Pending>),
}

impl FunctionDeploy<Planned> {
    /// Bundle and hash the function.
    pub async fn bundle(
        self,
        bundler: &dyn Bundler,
        cancel: &CancellationToken,
    ) -> Result<FunctionDeploy<Ready>, DeployError> {
        tracing::info!("Bundling Function: {}", self.slug);
        let bundle = bundler
            .prepare(&self.state.request, cancel)
            .await
            .context(BundleSnafu {
                slug: self.slug.clone(),
            })?;

        Ok(FunctionDeploy {
            slug: self.slug,
            state: Ready { bundle },
        })
    }
}

impl FunctionDeploy<Ready> {
    /// Decide between skip, create and update.
    pub fn plan(self, inventory: &Inventory) -> Plan {
        let remote = inventory.digest(&self.slug);
        if remote.is_some() && remote == self.sha256() {
            return Plan::Unchanged(self);
        }

        let action = if inventory.contains(&self.slug) {
            UpsertAction::Update
        } else {
            UpsertAction::Create
        };
        Plan::Upload(FunctionDeploy {
            slug: self.slug,
            state: Pending {
                bundle: self.state.bundle,
                action,
            },
        })
    }
}

impl FunctionDeploy<Pending> {
    /// Upload the bundle, retrying transient failures within `backoff`.
    ///
    /// A create rejected because the slug already exists is sent again as an
    /// update in the same attempt; later retries share one budget.
    pub async fn upload(
        self,
        api: &dyn FunctionsApi,
        backoff: &mut Backoff,
        bundle_only: bool,
        cancel: &CancellationToken,
    ) -> Result<FunctionDeploy<Staged>, DeployError> {
        let params = DeployParams::from_metadata(&self.state.bundle.metadata, bundle_only);
        let exists = AtomicBool::new(self.state.action == UpsertAction::Update);

        let result = {
            let (slug, params, body, exists) =
                (&self.slug, &params, &self.state.bundle.body, &exists);
            backoff
                .retry(cancel, || async move {
                    if exists.load(Ordering::SeqCst) {
                        return api.update_function(slug, params, body, cancel).await;
                    }
                    match api.create_function(params, body, cancel).await {
                        Err(ApiError::DuplicateSlug { .. }) => {
                            tracing::warn!("Function {} already exists, updating instead", slug);
                            exists.store(true, Ordering::SeqCst);
                            api.update_function(slug, params, body, cancel).await
                        }
                        result => result,
                    }
                })
                .await
        };

        let action = if exists.load(Ordering::SeqCst) {
            UpsertAction::Update
        } else {
            UpsertAction::Create
        };
        let response = match action {
            UpsertAction::Create => result.context(CreateFunctionSnafu {
                slug: self.slug.clone(),
            })?,
            UpsertAction::Update => result.context(UpdateFunctionSnafu {
                slug: self.slug.clone(),
            })?,
        };

        tracing::info!(
            "Deployed Function {} (version {}){}",
            self.slug,
            response.version,
            if bundle_only { ", pending activation" } else { "" }
        );

        Ok(FunctionDeploy {
            slug: self.slug,
            state: Staged {
                record: BulkUpdateFunctionBody::from(response),
                action,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{FunctionDeployMetadata, FunctionResponse, FunctionStatus};
    use crate::bundle::{Bundle, BundleBody};
    use crate::retry::RetryPolicy;
    use crate::types::FunctionSlug;
    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct ScriptedApi {
        creates: Mutex<VecDeque<Result<FunctionResponse, ApiError>>>,
        updates: Mutex<VecDeque<Result<FunctionResponse, ApiError>>>,
        calls: Mutex<Vec<&'static str>>,
        bundle_only: Mutex<Vec<bool>>,
    }

    impl ScriptedApi {
        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl FunctionsApi for ScriptedApi {
        async fn list_functions(
            &self,
            _cancel: &CancellationToken,
        ) -> Result<Vec<FunctionResponse>, ApiError> {
            Ok(Vec::new())
        }

        async fn create_function(
            &self,
            params: &DeployParams,
            _body: &BundleBody,
            _cancel: &CancellationToken,
        ) -> Result<FunctionResponse, ApiError> {
            self.calls.lock().push("create");
            self.bundle_only.lock().push(params.bundle_only);
            self.creates
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(response(&params.slug)))
        }

        async fn update_function(
            &self,
            slug: &FunctionSlug,
            params: &DeployParams,
            _body: &BundleBody,
            _cancel: &CancellationToken,
        ) -> Result<FunctionResponse, ApiError> {
            self.calls.lock().push("update");
            self.bundle_only.lock().push(params.bundle_only);
            self.updates
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(response(slug.as_str())))
        }

        async fn bulk_update_functions(
            &self,
            _records: &[BulkUpdateFunctionBody],
            _cancel: &CancellationToken,
        ) -> Result<(), ApiError> {
            Ok(())
        }
    }

    fn response(slug: &str) -> FunctionResponse {
        FunctionResponse {
            id: format!("id-{slug}"),
            slug: slug.to_string(),
            name: slug.to_string(),
            version: 2,
            status: FunctionStatus::Active,
            entrypoint_path: None,
            import_map_path: None,
            verify_jwt: Some(true),
            import_map: None,
            ezbr_sha256: Some("new".to_string()),
            created_at: 1,
            updated_at: 2,
        }
    }

    fn unavailable() -> ApiError {
        ApiError::Status {
            status: 503,
            body: "unavailable".to_string(),
        }
    }

    fn duplicate() -> ApiError {
        ApiError::DuplicateSlug {
            message: "Duplicated function slug".to_string(),
        }
    }

    fn ready(sha: &str) -> FunctionDeploy<Ready> {
        FunctionDeploy {
            slug: FunctionSlug::new("hello").unwrap(),
            state: Ready {
                bundle: Bundle {
                    metadata: FunctionDeployMetadata {
                        name: "hello".to_string(),
                        entrypoint_path: "functions/hello/index.ts".to_string(),
                        sha256: Some(sha.to_string()),
                        ..Default::default()
                    },
                    body: BundleBody::Eszip(Bytes::from_static(b"EZBR")),
                },
            },
        }
    }

    fn pending(action: UpsertAction) -> FunctionDeploy<Pending> {
        let ready = ready("new");
        FunctionDeploy {
            slug: ready.slug,
            state: Pending {
                bundle: ready.state.bundle,
                action,
            },
        }
    }

    fn inventory(sha: Option<&str>) -> Inventory {
        let mut remote = response("hello");
        remote.ezbr_sha256 = sha.map(str::to_string);
        Inventory::new(vec![remote])
    }

    #[test]
    fn plan_skips_matching_digest() {
        assert!(matches!(
            ready("abc").plan(&inventory(Some("abc"))),
            Plan::Unchanged(_)
        ));
    }

    #[test]
    fn plan_updates_existing_and_creates_missing() {
        match ready("abc").plan(&inventory(Some("old"))) {
            Plan::Upload(p) => assert_eq!(p.action(), UpsertAction::Update),
            other => panic!("unexpected plan: {other:?}"),
        }
        match ready("abc").plan(&inventory(None)) {
            Plan::Upload(p) => assert_eq!(p.action(), UpsertAction::Update),
            other => panic!("unexpected plan: {other:?}"),
        }
        match ready("abc").plan(&Inventory::default()) {
            Plan::Upload(p) => assert_eq!(p.action(), UpsertAction::Create),
            other => panic!("unexpected plan: {other:?}"),
        }
    }

    #[tokio::test]
    async fn upload_creates_and_stages_record() {
        let api = ScriptedApi::default();
        let mut backoff = RetryPolicy::immediate(3).backoff();

        let staged = pending(UpsertAction::Create)
            .upload(&api, &mut backoff, true, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(staged.action(), UpsertAction::Create);
        assert_eq!(staged.record().version, 2);
        assert_eq!(api.calls(), vec!["create"]);
        assert_eq!(*api.bundle_only.lock(), vec![true]);
    }

    #[tokio::test]
    async fn duplicate_slug_switches_to_update() {
        let api = ScriptedApi::default();
        api.creates.lock().push_back(Err(duplicate()));
        let mut backoff = RetryPolicy::immediate(3).backoff();

        let staged = pending(UpsertAction::Create)
            .upload(&api, &mut backoff, false, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(staged.action(), UpsertAction::Update);
        assert_eq!(api.calls(), vec!["create", "update"]);
    }

    #[tokio::test]
    async fn duplicate_slug_switches_without_a_retry_budget() {
        let api = ScriptedApi::default();
        api.creates.lock().push_back(Err(duplicate()));
        let mut backoff = RetryPolicy::immediate(0).backoff();

        let staged = pending(UpsertAction::Create)
            .upload(&api, &mut backoff, false, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(staged.action(), UpsertAction::Update);
        assert_eq!(api.calls(), vec!["create", "update"]);
        assert_eq!(backoff.retries(), 0);
    }

    #[tokio::test]
    async fn duplicate_slug_shares_the_retry_budget() {
        let api = ScriptedApi::default();
        api.creates.lock().push_back(Err(duplicate()));
        for _ in 0..5 {
            api.updates.lock().push_back(Err(unavailable()));
        }
        let mut backoff = RetryPolicy::immediate(3).backoff();

        let err = pending(UpsertAction::Create)
            .upload(&api, &mut backoff, false, &CancellationToken::new())
            .await
            .unwrap_err();

        // The switch is free; the update then gets the remaining three retries.
        assert_eq!(
            api.calls(),
            vec!["create", "update", "update", "update", "update"]
        );
        assert_eq!(backoff.retries(), 3);
        assert!(matches!(err, DeployError::UpdateFunction { .. }));
        assert!(err.to_string().starts_with("failed to update function hello"));
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let api = ScriptedApi::default();
        api.creates.lock().push_back(Err(ApiError::Status {
            status: 400,
            body: "bad entrypoint".to_string(),
        }));
        let mut backoff = RetryPolicy::immediate(3).backoff();

        let err = pending(UpsertAction::Create)
            .upload(&api, &mut backoff, false, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(api.calls(), vec!["create"]);
        assert!(matches!(err, DeployError::CreateFunction { .. }));
    }

    #[tokio::test]
    async fn transient_update_failures_are_retried() {
        let api = ScriptedApi::default();
        api.updates.lock().push_back(Err(unavailable()));
        api.updates.lock().push_back(Err(unavailable()));
        let mut backoff = RetryPolicy::immediate(3).backoff();

        pending(UpsertAction::Update)
            .upload(&api, &mut backoff, false, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(api.calls(), vec!["update", "update", "update"]);
        assert_eq!(backoff.retries(), 2);
    }
}
