// ABOUTME: Wire types exchanged with the functions control plane.
// ABOUTME: Function records, upload metadata, deploy query parameters and bulk bodies.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status reported for a deployed function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FunctionStatus {
    Active,
    Removed,
    Throttled,
}

impl fmt::Display for FunctionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FunctionStatus::Active => "ACTIVE",
            FunctionStatus::Removed => "REMOVED",
            FunctionStatus::Throttled => "THROTTLED",
        };
        f.pad(s)
    }
}

/// A function as returned by the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub version: i64,
    pub status: FunctionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_map_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_jwt: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_map: Option<bool>,

    /// Digest of the last uploaded bundle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ezbr_sha256: Option<String>,

    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub created_at: i64,

    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub updated_at: i64,
}

/// Metadata describing one function bundle.
///
/// Paths are `file://` URLs for native bundles and project-relative slash
/// paths for streamed uploads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDeployMetadata {
    pub name: String,

    pub entrypoint_path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_map_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_patterns: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_jwt: Option<bool>,

    /// Hex SHA-256 of the bundle contents, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Query parameters for create and update calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeployParams {
    pub slug: String,

    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_jwt: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub entrypoint_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_map_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ezbr_sha256: Option<String>,

    /// Stage the new version without activating it.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub bundle_only: bool,
}

impl DeployParams {
    pub fn from_metadata(metadata: &FunctionDeployMetadata, bundle_only: bool) -> Self {
        Self {
            slug: metadata.name.clone(),
            name: metadata.name.clone(),
            verify_jwt: metadata.verify_jwt,
            entrypoint_path: Some(metadata.entrypoint_path.clone()),
            import_map_path: metadata.import_map_path.clone(),
            ezbr_sha256: metadata.sha256.clone(),
            bundle_only,
        }
    }
}

/// One entry of a bulk activation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkUpdateFunctionBody {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub version: i64,
    pub status: FunctionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_map_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_jwt: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ezbr_sha256: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

impl From<FunctionResponse> for BulkUpdateFunctionBody {
    fn from(response: FunctionResponse) -> Self {
        Self {
            id: response.id,
            slug: response.slug,
            name: response.name,
            version: response.version,
            status: response.status,
            entrypoint_path: response.entrypoint_path,
            import_map_path: response.import_map_path,
            verify_jwt: response.verify_jwt,
            ezbr_sha256: response.ezbr_sha256,
            created_at: Some(response.created_at),
        }
    }
}
