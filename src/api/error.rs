// ABOUTME: Errors returned by the functions control-plane client.
// ABOUTME: Classifies failures as transient or permanent for the retry loop.

use crate::bundle::BundleError;
use crate::retry::Retryable;
use thiserror::Error;

/// Body fragment the control plane uses to reject a create for an existing slug.
pub const DUPLICATE_SLUG_MARKER: &str = "Duplicated function slug";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// A create was rejected because the slug already exists remotely.
    #[error("{message}")]
    DuplicateSlug { message: String },

    #[error("failed to decode response: {0}")]
    Decode(#[source] serde_json::Error),

    /// The streaming bundle producer failed mid-upload.
    #[error("failed to bundle upload body: {0}")]
    Producer(#[source] BundleError),

    #[error("request cancelled")]
    Cancelled,
}

impl ApiError {
    pub(crate) fn from_status(status: u16, body: String) -> Self {
        if status == 400 && body.contains(DUPLICATE_SLUG_MARKER) {
            ApiError::DuplicateSlug { message: body }
        } else {
            ApiError::Status { status, body }
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::DuplicateSlug { .. } => Some(400),
            _ => None,
        }
    }
}

impl Retryable for ApiError {
    /// Network failures and 5xx responses are retried. A duplicate slug is
    /// handled by the caller switching to an update.
    fn is_transient(&self) -> bool {
        match self {
            ApiError::Network(_) => true,
            ApiError::Status { status, .. } => *status >= 500,
            ApiError::DuplicateSlug { .. }
            | ApiError::Decode(_)
            | ApiError::Producer(_)
            | ApiError::Cancelled => false,
        }
    }
}
