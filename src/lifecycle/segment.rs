//! Segment Lifecycle (spec.md §4.3 steps 2-4, §4.4, C4): BeginSegment,
//! CommitSegment, MakeInlineSegment, ListSegments, DownloadSegment.

use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{instrument, warn};

use crate::collab::{Orders, Overlay, ProjectUsage};
use crate::config::Config;
use crate::error::{invalid, ApiError, Result};
use crate::ids::token::SegmentToken;
use crate::ids::{PieceId, ProjectId, SegmentPosition};
use crate::model::{Piece, RedundancyScheme, Segment};
use crate::store::MetabaseStore;

pub struct SegmentLifecycle {
    store: Arc<MetabaseStore>,
    config: Config,
}

/// `DownloadSegment` result (spec.md §4.4): either the inline payload, or
/// remote per-piece order limits sorted by Number with sentinel gaps.
pub enum DownloadSegmentResult {
    Inline(Vec<u8>),
    Remote {
        limits: Vec<Option<Vec<u8>>>,
        private_key: Vec<u8>,
    },
}

impl SegmentLifecycle {
    pub fn new(store: Arc<MetabaseStore>, config: Config) -> Self {
        Self { store, config }
    }

    /// `BeginSegment` (spec.md §4.3 step 2): pick nodes, issue per-piece
    /// authorization limits, and return a signed segment token.
    #[instrument(skip(self, overlay, orders, usage))]
    pub async fn begin_segment(
        &self,
        signed_stream_token: &str,
        position: SegmentPosition,
        redundancy: RedundancyScheme,
        project_id: ProjectId,
        max_encrypted_segment_size: i64,
        overlay: &dyn Overlay,
        orders: &dyn Orders,
        usage: &dyn ProjectUsage,
    ) -> Result<(SegmentToken, String)> {
        let stream_token = crate::ids::token::StreamToken::verify(
            signed_stream_token,
            &self.config.signing_key,
            self.config.token_ttl,
        )?;

        if usage
            .exceeds_storage_usage(project_id, max_encrypted_segment_size)
            .await?
        {
            return Err(ApiError::ResourceExhausted(
                "project storage limit already reached".into(),
            ));
        }

        let nodes = overlay.find_upload_nodes(redundancy.total_shares).await?;
        let limits = orders.create_put_order_limits(&nodes).await?;

        let now = OffsetDateTime::now_utc().unix_timestamp();
        let token = SegmentToken {
            stream_id: stream_token.stream_id,
            position,
            root_piece_id: PieceId::new(),
            created_at: now,
            expires_at: now + self.config.token_ttl.as_secs() as i64,
            original_limits: limits,
        };
        let signed = token.sign(&self.config.signing_key);
        Ok((token, signed))
    }

    /// `CommitSegment` (spec.md §4.3 step 3).
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip(self, usage, upload_results))]
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
        usage: &dyn ProjectUsage,
    ) -> Result<Segment> {
        if encrypted_size as usize > self.config.max_encrypted_segment_size {
            return Err(invalid("encrypted segment size exceeds the configured maximum"));
        }
        let token = SegmentToken::verify(
            signed_segment_token,
            &self.config.signing_key,
            self.config.token_ttl,
        )?;

        let segment = self.store.commit_segment(
            token.stream_id,
            token.position,
            token.root_piece_id,
            redundancy,
            encrypted_key,
            encrypted_key_nonce,
            plain_size,
            encrypted_size,
            0,
            upload_results,
            None,
        )?;

        // Best-effort: storage-usage tracking failures are logged, never
        // fatal (spec.md §4.3 step 3, §7).
        if let Err(err) = usage
            .add_project_storage_usage(project_id, encrypted_size as i64)
            .await
        {
            warn!(error = %err, "failed to record project storage usage");
        }

        Ok(segment)
    }

    /// `MakeInlineSegment` (spec.md §4.3 step 4). `plain_size` is the
    /// caller-supplied decrypted length (SPEC_FULL.md §9).
    pub fn make_inline_segment(
        &self,
        signed_stream_token: &str,
        position: SegmentPosition,
        encrypted_key: Vec<u8>,
        encrypted_key_nonce: Vec<u8>,
        plain_size: i32,
        inline_data: Vec<u8>,
    ) -> Result<Segment> {
        if inline_data.len() > self.config.max_inline_segment_size {
            return Err(invalid("inline segment exceeds the configured maximum size"));
        }
        let stream_token = crate::ids::token::StreamToken::verify(
            signed_stream_token,
            &self.config.signing_key,
            self.config.token_ttl,
        )?;
        Ok(self.store.commit_inline_segment(
            stream_token.stream_id,
            position,
            PieceId::new(),
            encrypted_key,
            encrypted_key_nonce,
            plain_size,
            inline_data,
            None,
        )?)
    }

    /// `ListSegments` (spec.md §4.4).
    pub fn list_segments(
        &self,
        stream_id: crate::ids::StreamId,
        cursor: Option<SegmentPosition>,
        limit: usize,
    ) -> (Vec<Segment>, bool) {
        let page = self.store.list_segments(stream_id, cursor, limit);
        (page.segments, page.more)
    }

    /// `DownloadSegment` (spec.md §4.4): inline payload, or remote limits
    /// sorted by piece Number with sentinel gaps so client-side positional
    /// indexing works directly.
    #[instrument(skip(self, orders, usage))]
    pub async fn download_segment(
        &self,
        stream_id: crate::ids::StreamId,
        position: SegmentPosition,
        project_id: ProjectId,
        orders: &dyn Orders,
        usage: &dyn ProjectUsage,
    ) -> Result<DownloadSegmentResult> {
        let segment = self.store.get_segment_by_position(stream_id, position)?;

        if let Err(err) = usage
            .update_project_bandwidth_usage(project_id, segment.encrypted_size as i64)
            .await
        {
            warn!(error = %err, "failed to record bandwidth usage");
        }

        if segment.is_inline() {
            return Ok(DownloadSegmentResult::Inline(segment.inline_data));
        }

        let max_number = segment.pieces.iter().map(|p| p.number).max().unwrap_or(0);
        let nodes: Vec<_> = segment.pieces.iter().map(|p| p.storage_node).collect();
        let raw_limits = orders.create_get_order_limits(&nodes).await?;

        let mut limits: Vec<Option<Vec<u8>>> = vec![None; max_number as usize + 1];
        for (piece, limit) in segment.pieces.iter().zip(raw_limits.into_iter()) {
            limits[piece.number as usize] = Some(limit);
        }

        Ok(DownloadSegmentResult::Remote {
            limits,
            private_key: segment.encrypted_key,
        })
    }
}
