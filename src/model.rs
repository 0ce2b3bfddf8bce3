//! Data model for objects, segments and copy edges (spec.md §3).
//!
//! Plain data-only structs, no behavior beyond small constructors and
//! invariant checks that are cheap to evaluate inline.

use smallvec::SmallVec;
use std::collections::BTreeMap;
use time::OffsetDateTime;

use crate::error::{invalid, ApiError};
use crate::ids::{PieceId, ProjectId, SegmentPosition, StorageNodeId, StreamId};

/// A bucket name: flat, UTF-8, non-empty.
pub type BucketName = String;

/// The object key as the server sees it: the client's encryption makes this
/// opaque ciphertext, so the server never interprets its contents beyond
/// length and the `/`-free "collapse" rule in `IterateObjectsAllVersions`.
pub type ObjectKey = Vec<u8>;

/// Monotonically increasing per-(project, bucket, key) version number.
pub type Version = i64;

/// The tuple identifying an object regardless of version (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ObjectLocation {
    pub project_id: ProjectId,
    pub bucket_name: BucketName,
    pub object_key: ObjectKey,
}

/// An object location pinned to one version — what most Metabase Store
/// operations key off of.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ObjectStream {
    pub location: ObjectLocation,
    pub version: Version,
    pub stream_id: StreamId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectStatus {
    Pending,
    Committed,
}

/// Encryption cipher parameters recorded at `BeginObject` time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionParameters {
    pub cipher_suite: u8,
    pub block_size: i32,
}

/// Erasure-coding scheme parameters (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedundancyScheme {
    pub required_shares: u16,
    pub repair_shares: u16,
    pub optimal_shares: u16,
    pub total_shares: u16,
    pub share_size: i32,
}

impl RedundancyScheme {
    /// The storage upper bound: `(encryptedSize / requiredShares) *
    /// totalShares`, generalized to the scheme's `total_shares` rather than
    /// the piece count actually uploaded.
    pub fn max_stored_bytes(&self, encrypted_size: i64) -> i64 {
        let piece_size = encrypted_size / self.required_shares as i64;
        piece_size * self.total_shares as i64
    }
}

/// One erasure-coded share of a segment, stored on one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Piece {
    pub number: u16,
    pub storage_node: StorageNodeId,
}

/// A fully-described object row (spec.md §3).
#[derive(Debug, Clone)]
pub struct Object {
    pub stream: ObjectStream,
    pub status: ObjectStatus,
    pub created_at: OffsetDateTime,
    pub expires_at: Option<OffsetDateTime>,
    pub zombie_deletion_deadline: Option<OffsetDateTime>,
    pub segment_count: i32,
    pub total_plain_size: i64,
    pub total_encrypted_size: i64,
    pub fixed_segment_size: i32,
    pub encryption: EncryptionParameters,
    pub encrypted_metadata: Vec<u8>,
    pub encrypted_metadata_key: Vec<u8>,
    pub encrypted_metadata_nonce: Vec<u8>,
}

impl Object {
    pub fn is_committed(&self) -> bool {
        matches!(self.status, ObjectStatus::Committed)
    }
}

/// A segment row (spec.md §3). `pieces` is empty iff the segment is inline.
#[derive(Debug, Clone)]
pub struct Segment {
    pub stream_id: StreamId,
    pub position: SegmentPosition,
    pub root_piece_id: PieceId,
    pub redundancy: RedundancyScheme,
    pub encrypted_key: Vec<u8>,
    pub encrypted_key_nonce: Vec<u8>,
    pub encrypted_size: i32,
    pub plain_size: i32,
    pub plain_offset: i64,
    pub expires_at: Option<OffsetDateTime>,
    pub pieces: SmallVec<[Piece; 16]>,
    pub inline_data: Vec<u8>,
}

impl Segment {
    pub fn is_inline(&self) -> bool {
        self.encrypted_size == 0 || !self.inline_data.is_empty()
    }

    /// Validates the remote-vs-inline mutual exclusion invariant
    /// (spec.md §3: "a remote segment has EncryptedSize > 0 and a
    /// non-empty Pieces set; an inline segment has Pieces empty and
    /// InlineData non-empty").
    pub fn validate_shape(&self) -> Result<(), ApiError> {
        if self.is_inline() {
            if !self.pieces.is_empty() {
                return Err(invalid("inline segment must not carry pieces"));
            }
            if self.inline_data.is_empty() {
                return Err(invalid("inline segment must carry inline data"));
            }
        } else {
            if self.pieces.is_empty() {
                return Err(invalid("remote segment must carry at least one piece"));
            }
            if self.encrypted_size <= 0 {
                return Err(invalid("remote segment must have positive encrypted size"));
            }
        }
        Ok(())
    }
}

/// Exchanged with clients during copy negotiation (spec.md §3).
#[derive(Debug, Clone)]
pub struct EncryptedKeyAndNonce {
    pub position: SegmentPosition,
    pub encrypted_key_nonce: Vec<u8>,
    pub encrypted_key: Vec<u8>,
}

/// One entry of a `ListObjects`/`IterateObjectsAllVersions` page.
#[derive(Debug, Clone)]
pub struct ObjectEntry {
    pub object_key: ObjectKey,
    pub version: Version,
    pub status: ObjectStatus,
    pub stream_id: StreamId,
    pub created_at: OffsetDateTime,
    pub is_prefix: bool,
}

/// A segment descriptor surfaced to the piece-deletion dispatcher after a
/// delete (spec.md §4.6).
#[derive(Debug, Clone)]
pub struct DeletedSegmentInfo {
    pub stream_id: StreamId,
    pub root_piece_id: PieceId,
    pub pieces: SmallVec<[Piece; 16]>,
}

/// An object removed by `DeleteObjectsAllVersions`, plus ancestor-promotion
/// bookkeeping (spec.md §4.5).
#[derive(Debug, Clone)]
pub struct DeletedObject {
    pub object: Object,
    /// Set when this object was an ancestor for other copies: the stream id
    /// of the copy chosen to become the new ancestor of record.
    pub promoted_ancestor: Option<StreamId>,
}

/// Encryption-key material the client supplies for a property re-keyed
/// metadata blob — used only by `CommitObject`/copy metadata override paths.
#[derive(Debug, Clone, Default)]
pub struct EncryptedMetadata {
    pub data: Vec<u8>,
    pub key: Vec<u8>,
    pub nonce: Vec<u8>,
}

pub type Properties = BTreeMap<String, Vec<u8>>;
