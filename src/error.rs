//! Error taxonomy exposed at the service boundary (spec.md §7).
//!
//! Internal components (the store, the token codec) raise their own
//! domain-specific errors; this module is where those get translated into
//! the handful of kinds a caller is allowed to see.

use thiserror::Error;
use tracing::error;

use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, ApiError>;

/// The RPC-facing error taxonomy from spec.md §7.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid argument: {0}")]
    Invalid(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("unimplemented: {0}")]
    Unimplemented(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ObjectNotFound(msg) => ApiError::NotFound(msg),
            StoreError::BucketNotFound(msg) => ApiError::NotFound(msg),
            StoreError::SegmentNotFound(msg) => ApiError::NotFound(msg),
            StoreError::BucketNotEmpty(msg) => ApiError::FailedPrecondition(msg),
            StoreError::AlreadyExists(msg) => ApiError::AlreadyExists(msg),
            StoreError::InvalidRequest(msg) => ApiError::Invalid(msg),
            StoreError::Internal(msg) => {
                error!(error = %msg, "metabase store invariant violation");
                ApiError::Internal(msg)
            }
        }
    }
}

/// Shorthand for `ApiError::Invalid` with a formatted message.
pub fn invalid(msg: impl Into<String>) -> ApiError {
    ApiError::Invalid(msg.into())
}
