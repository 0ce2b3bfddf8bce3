//! Store-internal error tags (spec.md §7: "the Metabase Store raises
//! domain-specific error tags that upper layers translate").

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    ObjectNotFound(String),
    #[error("bucket not found: {0}")]
    BucketNotFound(String),
    #[error("segment not found: {0}")]
    SegmentNotFound(String),
    #[error("bucket not empty: {0}")]
    BucketNotEmpty(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("internal store invariant violation: {0}")]
    Internal(String),
}

pub fn invalid_request(msg: impl Into<String>) -> StoreError {
    StoreError::InvalidRequest(msg.into())
}
