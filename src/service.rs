//! Service façade (SPEC_FULL.md §4.11, A5): one struct composing the
//! Metabase Store, config, and collaborators, exposing the RPC surface of
//! spec.md §6 as async methods. This is the boundary a transport layer
//! (never implemented here) would sit in front of.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use time::OffsetDateTime;

use crate::collab::{Auth, Orders, Overlay, PieceDeletion, ProjectUsage};
use crate::config::Config;
use crate::copy::{BeginCopyResult, CopyEngine};
use crate::deletion::PieceDeletionDispatcher;
use crate::error::Result;
use crate::ids::token::SegmentToken;
use crate::ids::{ProjectId, SegmentPosition, StreamId};
use crate::metrics::ServiceMetrics;
use crate::lifecycle::object::BeginObjectResult;
use crate::lifecycle::segment::DownloadSegmentResult;
use crate::lifecycle::{ObjectLifecycle, SegmentLifecycle};
use crate::model::{
    BucketName, EncryptedKeyAndNonce, EncryptedMetadata, EncryptionParameters, Object,
    ObjectEntry, ObjectKey, ObjectLocation, ObjectStatus, Piece, RedundancyScheme, Segment,
    Version,
};
use crate::store::MetabaseStore;

/// The collaborator bundle a `MetabaseService` is wired against. Grouped so
/// callers construct it once (production wiring or the admin CLI's demo
/// doubles) rather than threading five `Arc`s through every constructor.
pub struct Collaborators {
    pub auth: Arc<dyn Auth>,
    pub overlay: Arc<dyn Overlay>,
    pub orders: Arc<dyn Orders>,
    pub piece_deletion: Arc<dyn PieceDeletion>,
    pub project_usage: Arc<dyn ProjectUsage>,
}

pub struct MetabaseService {
    store: Arc<MetabaseStore>,
    config: Config,
    collaborators: Collaborators,
    objects: ObjectLifecycle,
    segments: SegmentLifecycle,
    copy: CopyEngine,
    deletion: PieceDeletionDispatcher,
    pub metrics: ServiceMetrics,
}

impl MetabaseService {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        let store = Arc::new(MetabaseStore::new());
        let objects = ObjectLifecycle::new(store.clone(), config.clone());
        let segments = SegmentLifecycle::new(store.clone(), config.clone());
        let copy = CopyEngine::new(store.clone(), config.max_copy_segments);
        let deletion = PieceDeletionDispatcher::new(
            collaborators.piece_deletion.clone(),
            config.piece_deletion_success_threshold,
        );
        Self {
            store,
            config,
            collaborators,
            objects,
            segments,
            copy,
            deletion,
            metrics: ServiceMetrics::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<MetabaseStore> {
        &self.store
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn begin_object(
        &self,
        auth_header: &str,
        location: ObjectLocation,
        encryption: EncryptionParameters,
        redundancy: RedundancyScheme,
        expires_at: Option<OffsetDateTime>,
        caller_has_delete_permission: bool,
    ) -> Result<BeginObjectResult> {
        self.collaborators.auth.authorize(auth_header, "BeginObject").await?;
        let result = self
            .objects
            .begin_object(
                self.collaborators.auth.as_ref(),
                location,
                encryption,
                redundancy,
                expires_at,
                caller_has_delete_permission,
            )
            .await?;
        self.metrics.objects_begun.fetch_add(1, Ordering::Relaxed);
        Ok(result)
    }

    pub async fn begin_segment(
        &self,
        signed_stream_token: &str,
        position: SegmentPosition,
        redundancy: RedundancyScheme,
        project_id: ProjectId,
    ) -> Result<(SegmentToken, String)> {
        self.segments
            .begin_segment(
                signed_stream_token,
                position,
                redundancy,
                project_id,
                self.config.max_encrypted_segment_size as i64,
                self.collaborators.overlay.as_ref(),
                self.collaborators.orders.as_ref(),
                self.collaborators.project_usage.as_ref(),
            )
            .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn commit_segment(
        &self,
        signed_segment_token: &str,
        redundancy: RedundancyScheme,
        encrypted_key: Vec<u8>,
        encrypted_key_nonce: Vec<u8>,
        plain_size: i32,
        encrypted_size: i32,
        upload_results: Vec<Piece>,
        project_id: ProjectId,
    ) -> Result<Segment> {
        let segment = self
            .segments
            .commit_segment(
                signed_segment_token,
                redundancy,
                encrypted_key,
                encrypted_key_nonce,
                plain_size,
                encrypted_size,
                upload_results,
                project_id,
                self.collaborators.project_usage.as_ref(),
            )
            .await?;
        self.metrics.segments_committed.fetch_add(1, Ordering::Relaxed);
        Ok(segment)
    }

    pub fn make_inline_segment(
        &self,
        signed_stream_token: &str,
        position: SegmentPosition,
        encrypted_key: Vec<u8>,
        encrypted_key_nonce: Vec<u8>,
        plain_size: i32,
        inline_data: Vec<u8>,
    ) -> Result<Segment> {
        self.segments.make_inline_segment(
            signed_stream_token,
            position,
            encrypted_key,
            encrypted_key_nonce,
            plain_size,
            inline_data,
        )
    }

    pub fn commit_object(
        &self,
        signed_stream_token: &str,
        encrypted_metadata: Vec<u8>,
        encrypted_metadata_key: Vec<u8>,
        encrypted_metadata_nonce: Vec<u8>,
    ) -> Result<Object> {
        let object = self.objects.commit_object(
            signed_stream_token,
            encrypted_metadata,
            encrypted_metadata_key,
            encrypted_metadata_nonce,
        )?;
        self.metrics.objects_committed.fetch_add(1, Ordering::Relaxed);
        Ok(object)
    }

    pub fn get_object(&self, location: &ObjectLocation) -> Result<Object> {
        self.objects.get_object(location)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn list_objects(
        &self,
        project_id: ProjectId,
        bucket: &BucketName,
        prefix: &[u8],
        cursor: Option<(ObjectKey, Version)>,
        batch_size: usize,
        recursive: bool,
        status: Option<ObjectStatus>,
    ) -> (Vec<ObjectEntry>, bool) {
        self.objects
            .list_objects(project_id, bucket, prefix, cursor, batch_size, recursive, status)
    }

    /// `BeginDeleteObject` (spec.md §6): deletes metadata synchronously,
    /// then dispatches piece deletion detached from this call's own
    /// cancellation (spec.md §4.6 scenario 6) and returns as soon as the
    /// metadata delete lands.
    pub fn begin_delete_object(&self, location: &ObjectLocation) -> Result<()> {
        let deleted = self.objects.begin_delete_object(location)?;
        let mut segment_infos = Vec::new();
        for deleted_object in &deleted {
            let stream_id = deleted_object.object.stream.stream_id;
            let page = self.store.list_segments(stream_id, None, usize::MAX);
            for segment in page.segments {
                if !segment.is_inline() {
                    segment_infos.push(crate::model::DeletedSegmentInfo {
                        stream_id,
                        root_piece_id: segment.root_piece_id,
                        pieces: segment.pieces,
                    });
                }
            }
        }
        self.metrics
            .objects_deleted
            .fetch_add(deleted.len() as u64, Ordering::Relaxed);
        if !segment_infos.is_empty() {
            self.metrics.piece_deletion_rounds.fetch_add(1, Ordering::Relaxed);
        }
        self.deletion.dispatch(segment_infos);
        Ok(())
    }

    pub fn begin_copy_object(
        &self,
        source: &ObjectLocation,
        source_version: Version,
    ) -> Result<BeginCopyResult> {
        self.copy.begin_copy_object(source, source_version)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn finish_copy_object(
        &self,
        source: ObjectLocation,
        source_version: Version,
        destination: ObjectLocation,
        new_stream_id: StreamId,
        override_metadata: Option<EncryptedMetadata>,
        new_segment_keys: Vec<EncryptedKeyAndNonce>,
    ) -> Result<Object> {
        let result = self.copy.finish_copy_object(
            source,
            source_version,
            destination,
            new_stream_id,
            override_metadata,
            new_segment_keys,
        )?;
        self.metrics.copies_finished.fetch_add(1, Ordering::Relaxed);
        Ok(result.object)
    }

    pub fn list_segments(
        &self,
        stream_id: StreamId,
        cursor: Option<SegmentPosition>,
        limit: usize,
    ) -> (Vec<Segment>, bool) {
        self.segments.list_segments(stream_id, cursor, limit)
    }

    pub async fn download_segment(
        &self,
        stream_id: StreamId,
        position: SegmentPosition,
        project_id: ProjectId,
    ) -> Result<DownloadSegmentResult> {
        self.segments
            .download_segment(
                stream_id,
                position,
                project_id,
                self.collaborators.orders.as_ref(),
                self.collaborators.project_usage.as_ref(),
            )
            .await
    }
}
