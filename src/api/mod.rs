// ABOUTME: Client for the functions control plane: list, create, update, bulk update.
// ABOUTME: Every call races a cancellation token; errors are classified for retry.

mod error;
mod types;

pub use error::{ApiError, DUPLICATE_SLUG_MARKER};
pub use types::{
    BulkUpdateFunctionBody, DeployParams, FunctionDeployMetadata, FunctionResponse,
    FunctionStatus,
};

use crate::bundle::{BundleBody, FormUpload};
use crate::types::{FunctionSlug, ProjectRef};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Content type of a compressed eszip upload.
pub const ESZIP_CONTENT_TYPE: &str = "application/vnd.denoland.eszip";

const USER_AGENT: &str = concat!("edgefn/", env!("CARGO_PKG_VERSION"));

/// Operations the deployer needs from the control plane.
#[async_trait]
pub trait FunctionsApi: Send + Sync {
    async fn list_functions(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<FunctionResponse>, ApiError>;

    async fn create_function(
        &self,
        params: &DeployParams,
        body: &BundleBody,
        cancel: &CancellationToken,
    ) -> Result<FunctionResponse, ApiError>;

    async fn update_function(
        &self,
        slug: &FunctionSlug,
        params: &DeployParams,
        body: &BundleBody,
        cancel: &CancellationToken,
    ) -> Result<FunctionResponse, ApiError>;

    async fn bulk_update_functions(
        &self,
        records: &[BulkUpdateFunctionBody],
        cancel: &CancellationToken,
    ) -> Result<(), ApiError>;
}

/// Connection settings for [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: Url,
    pub access_token: String,
    pub project_ref: ProjectRef,
    pub timeout: Option<Duration>,
}

/// HTTP implementation of [`FunctionsApi`].
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    access_token: String,
    project_ref: ProjectRef,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let mut builder = Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(ApiError::Network)?;

        Ok(Self {
            client,
            base_url: config.base_url.as_str().trim_end_matches('/').to_string(),
            access_token: config.access_token,
            project_ref: config.project_ref,
        })
    }

    pub fn project_ref(&self) -> &ProjectRef {
        &self.project_ref
    }

    fn functions_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/functions",
            self.base_url, self.project_ref
        )
    }

    /// Send `request` with `body` attached, racing `cancel`.
    ///
    /// Streamed bodies are produced afresh for every call. A producer failure
    /// wins over whatever the transport reports.
    async fn upload(
        &self,
        request: RequestBuilder,
        body: &BundleBody,
        cancel: &CancellationToken,
    ) -> Result<FunctionResponse, ApiError> {
        match body {
            BundleBody::Eszip(bytes) => {
                let request = request
                    .header(CONTENT_TYPE, ESZIP_CONTENT_TYPE)
                    .body(bytes.clone());
                let body = call(request, cancel).await?;
                decode(&body)
            }
            BundleBody::Multipart(source) => {
                let FormUpload { form, producer } =
                    source.start(cancel).map_err(ApiError::Producer)?;
                let request = request.multipart(form);

                let result = call(request, producer.token()).await;
                if cancel.is_cancelled() {
                    return Err(ApiError::Cancelled);
                }
                if let Some(cause) = producer.take_cause() {
                    return Err(ApiError::Producer(cause));
                }
                decode(&result?)
            }
        }
    }
}

#[async_trait]
impl FunctionsApi for ApiClient {
    async fn list_functions(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<FunctionResponse>, ApiError> {
        let request = self
            .client
            .get(self.functions_url())
            .bearer_auth(&self.access_token);
        let body = call(request, cancel).await?;
        decode(&body)
    }

    async fn create_function(
        &self,
        params: &DeployParams,
        body: &BundleBody,
        cancel: &CancellationToken,
    ) -> Result<FunctionResponse, ApiError> {
        tracing::debug!("Creating function {}", params.slug);
        let request = self
            .client
            .post(self.functions_url())
            .bearer_auth(&self.access_token)
            .query(params);
        self.upload(request, body, cancel).await
    }

    async fn update_function(
        &self,
        slug: &FunctionSlug,
        params: &DeployParams,
        body: &BundleBody,
        cancel: &CancellationToken,
    ) -> Result<FunctionResponse, ApiError> {
        tracing::debug!("Updating function {}", slug);
        let request = self
            .client
            .patch(format!("{}/{}", self.functions_url(), slug))
            .bearer_auth(&self.access_token)
            .query(params);
        self.upload(request, body, cancel).await
    }

    async fn bulk_update_functions(
        &self,
        records: &[BulkUpdateFunctionBody],
        cancel: &CancellationToken,
    ) -> Result<(), ApiError> {
        tracing::debug!("Activating {} functions", records.len());
        let request = self
            .client
            .put(self.functions_url())
            .bearer_auth(&self.access_token)
            .json(records);
        call(request, cancel).await.map(drop)
    }
}

/// Send a request and read the whole response, unless `cancel` fires first.
async fn call(request: RequestBuilder, cancel: &CancellationToken) -> Result<Bytes, ApiError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(ApiError::Cancelled),
        result = execute(request) => result,
    }
}

async fn execute(request: RequestBuilder) -> Result<Bytes, ApiError> {
    let response = request.send().await.map_err(ApiError::Network)?;
    let status = response.status();
    let body = response.bytes().await.map_err(ApiError::Network)?;

    if !status.is_success() {
        let body = String::from_utf8_lossy(&body).into_owned();
        return Err(ApiError::from_status(status.as_u16(), body));
    }
    Ok(body)
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(ApiError::Decode)
}
