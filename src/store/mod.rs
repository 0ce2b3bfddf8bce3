//! The Metabase Store (spec.md §4.2, C2): transactional persistence of
//! objects, segments, and copy-ancestry.
//!
//! One struct (`MetabaseStore`) owning the tables behind a lock, with the
//! actual query logic split across sibling modules by table family.

mod copy;
mod error;
mod objects;
mod segments;
mod tables;

use parking_lot::RwLock;
use time::OffsetDateTime;
use tracing::info;

use crate::ids::{ProjectId, SegmentPosition, StreamId};
use crate::model::{
    BucketName, DeletedObject, EncryptedKeyAndNonce, EncryptedMetadata, EncryptionParameters,
    Object, ObjectKey, ObjectLocation, ObjectStatus, ObjectStream, Piece, RedundancyScheme,
    Segment, Version,
};

pub use copy::{FinishCopyRequest, FinishCopyResult};
pub use error::{invalid_request, Result, StoreError};
pub use objects::ObjectsPage;
pub use segments::SegmentsPage;
use tables::Tables;

/// Transactional in-process store, guarded by a single read-write lock.
/// Read-only operations take a read guard so concurrent readers never block
/// each other; every mutating operation takes the write guard for the
/// duration of the whole transactional algorithm it implements, matching
/// spec.md §5's "internally serializing on database transactions".
pub struct MetabaseStore {
    tables: RwLock<Tables>,
}

impl Default for MetabaseStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetabaseStore {
    pub fn new() -> Self {
        info!("metabase store opened (in-memory)");
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    pub fn begin_object_exact_version(
        &self,
        stream: ObjectStream,
        encryption: EncryptionParameters,
        expires_at: Option<OffsetDateTime>,
    ) -> Result<Object> {
        let mut tables = self.tables.write();
        objects::begin_object_exact_version(&mut tables, stream, encryption, expires_at)
    }

    pub fn commit_object(
        &self,
        stream_id: StreamId,
        encrypted_metadata: Vec<u8>,
        encrypted_metadata_key: Vec<u8>,
        encrypted_metadata_nonce: Vec<u8>,
    ) -> Result<Object> {
        let mut tables = self.tables.write();
        objects::commit_object(
            &mut tables,
            stream_id,
            encrypted_metadata,
            encrypted_metadata_key,
            encrypted_metadata_nonce,
        )
    }

    pub fn get_object_latest_version(&self, location: &ObjectLocation) -> Result<Object> {
        let tables = self.tables.read();
        objects::get_object_latest_version(&tables, location)
    }

    pub fn get_object_exact_version(
        &self,
        location: &ObjectLocation,
        version: Version,
    ) -> Result<Object> {
        let tables = self.tables.read();
        objects::get_object_exact_version(&tables, location, version)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn iterate_objects_all_versions(
        &self,
        project_id: ProjectId,
        bucket: &BucketName,
        prefix: &[u8],
        cursor: Option<(ObjectKey, Version)>,
        batch_size: usize,
        recursive: bool,
        status: Option<ObjectStatus>,
    ) -> ObjectsPage {
        let tables = self.tables.read();
        objects::iterate_objects_all_versions(
            &tables, project_id, bucket, prefix, cursor, batch_size, recursive, status,
        )
    }

    pub fn delete_objects_all_versions(
        &self,
        locations: &[ObjectLocation],
    ) -> Result<Vec<DeletedObject>> {
        let mut tables = self.tables.write();
        objects::delete_objects_all_versions(&mut tables, locations)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn commit_segment(
        &self,
        stream_id: StreamId,
        position: SegmentPosition,
        root_piece_id: crate::ids::PieceId,
        redundancy: RedundancyScheme,
        encrypted_key: Vec<u8>,
        encrypted_key_nonce: Vec<u8>,
        plain_size: i32,
        encrypted_size: i32,
        plain_offset: i64,
        pieces: Vec<Piece>,
        expires_at: Option<OffsetDateTime>,
    ) -> Result<Segment> {
        let mut tables = self.tables.write();
        segments::commit_segment(
            &mut tables,
            stream_id,
            position,
            root_piece_id,
            redundancy,
            encrypted_key,
            encrypted_key_nonce,
            plain_size,
            encrypted_size,
            plain_offset,
            pieces,
            expires_at,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn commit_inline_segment(
        &self,
        stream_id: StreamId,
        position: SegmentPosition,
        root_piece_id: crate::ids::PieceId,
        encrypted_key: Vec<u8>,
        encrypted_key_nonce: Vec<u8>,
        plain_size: i32,
        inline_data: Vec<u8>,
        expires_at: Option<OffsetDateTime>,
    ) -> Result<Segment> {
        let mut tables = self.tables.write();
        segments::commit_inline_segment(
            &mut tables,
            stream_id,
            position,
            root_piece_id,
            encrypted_key,
            encrypted_key_nonce,
            plain_size,
            inline_data,
            expires_at,
        )
    }

    pub fn get_segment_by_position(
        &self,
        stream_id: StreamId,
        position: SegmentPosition,
    ) -> Result<Segment> {
        let tables = self.tables.read();
        segments::get_segment_by_position(&tables, stream_id, position)
    }

    pub fn get_latest_object_last_segment(&self, stream_id: StreamId) -> Result<Segment> {
        let tables = self.tables.read();
        segments::get_latest_object_last_segment(&tables, stream_id)
    }

    pub fn list_segments(
        &self,
        stream_id: StreamId,
        cursor: Option<SegmentPosition>,
        limit: usize,
    ) -> SegmentsPage {
        let tables = self.tables.read();
        segments::list_segments(&tables, stream_id, cursor, limit)
    }

    /// The copy-edge ancestor recorded for `stream_id`, if any. Exposed for
    /// tests asserting the depth-1 forest invariant (spec.md §8).
    pub fn ancestor_of(&self, stream_id: StreamId) -> Option<StreamId> {
        self.tables.read().copy_edges.get(&stream_id).copied()
    }

    /// `FinishCopyObject` (spec.md §4.5).
    pub fn finish_copy_object(
        &self,
        req: FinishCopyRequest,
        max_copy_segments: usize,
    ) -> Result<FinishCopyResult> {
        let mut tables = self.tables.write();
        copy::finish_copy_object(&mut tables, req, max_copy_segments)
    }
}

/// Convenience re-export so callers outside `store` can build a
/// `FinishCopyRequest` without reaching into submodules.
pub type CopyMetadataOverride = EncryptedMetadata;
pub type CopySegmentKey = EncryptedKeyAndNonce;
