//! Segment table operations (spec.md §4.2, §4.4).

use time::OffsetDateTime;

use crate::ids::{PieceId, SegmentPosition, StreamId};
use crate::model::{Piece, RedundancyScheme, Segment};
use crate::store::error::{invalid_request, Result, StoreError};
use crate::store::tables::Tables;

/// `BeginSegment` + `CommitSegment` combined into one call for the in-memory
/// store, since there is no separate "reserved but unwritten" segment row to
/// track once the piece uploads are known: the gap between the two exists
/// only to let the client upload pieces in between, which is out of scope
/// here (spec.md §1 Non-goals: piece transfer).
#[allow(clippy::too_many_arguments)]
pub fn commit_segment(
    tables: &mut Tables,
    stream_id: StreamId,
    position: SegmentPosition,
    root_piece_id: PieceId,
    redundancy: RedundancyScheme,
    encrypted_key: Vec<u8>,
    encrypted_key_nonce: Vec<u8>,
    plain_size: i32,
    encrypted_size: i32,
    plain_offset: i64,
    pieces: Vec<Piece>,
    expires_at: Option<OffsetDateTime>,
) -> Result<Segment> {
    ensure_object_pending(tables, stream_id)?;

    if (pieces.len() as u16) < redundancy.optimal_shares {
        return Err(invalid_request(format!(
            "number of pieces ({}) is below the optimal threshold ({})",
            pieces.len(),
            redundancy.optimal_shares
        )));
    }
    if (pieces.len() as u16) > redundancy.total_shares {
        return Err(invalid_request(format!(
            "number of pieces ({}) exceeds the redundancy total ({})",
            pieces.len(),
            redundancy.total_shares
        )));
    }

    let mut seen_numbers = std::collections::HashSet::new();
    for piece in &pieces {
        if !seen_numbers.insert(piece.number) {
            return Err(invalid_request("duplicate piece number in upload results"));
        }
    }

    let piece_size = encrypted_size as i64 / redundancy.required_shares.max(1) as i64;
    let stored = piece_size * pieces.len() as i64;
    if stored > redundancy.max_stored_bytes(encrypted_size as i64) {
        return Err(invalid_request(
            "total stored size exceeds the redundancy upper bound",
        ));
    }

    let mut piece_vec = smallvec::SmallVec::new();
    piece_vec.extend(pieces);

    let segment = Segment {
        stream_id,
        position,
        root_piece_id,
        redundancy,
        encrypted_key,
        encrypted_key_nonce,
        encrypted_size,
        plain_size,
        plain_offset,
        expires_at,
        pieces: piece_vec,
        inline_data: Vec::new(),
    };
    segment.validate_shape().map_err(|e| invalid_request(e.to_string()))?;

    if tables.get_segment(stream_id, position).is_some() {
        return Err(StoreError::AlreadyExists(format!(
            "segment at position {position} already committed"
        )));
    }

    tables.insert_segment(segment.clone());
    Ok(segment)
}

/// `CommitInlineSegment` (spec.md §4.2).
pub fn commit_inline_segment(
    tables: &mut Tables,
    stream_id: StreamId,
    position: SegmentPosition,
    root_piece_id: PieceId,
    encrypted_key: Vec<u8>,
    encrypted_key_nonce: Vec<u8>,
    plain_size: i32,
    inline_data: Vec<u8>,
    expires_at: Option<OffsetDateTime>,
) -> Result<Segment> {
    ensure_object_pending(tables, stream_id)?;

    if inline_data.is_empty() {
        return Err(invalid_request("inline segment data must not be empty"));
    }

    let segment = Segment {
        stream_id,
        position,
        root_piece_id,
        redundancy: RedundancyScheme {
            required_shares: 0,
            repair_shares: 0,
            optimal_shares: 0,
            total_shares: 0,
            share_size: 0,
        },
        encrypted_key,
        encrypted_key_nonce,
        encrypted_size: 0,
        plain_size,
        plain_offset: 0,
        expires_at,
        pieces: smallvec::SmallVec::new(),
        inline_data,
    };
    segment.validate_shape().map_err(|e| invalid_request(e.to_string()))?;

    if tables.get_segment(stream_id, position).is_some() {
        return Err(StoreError::AlreadyExists(format!(
            "segment at position {position} already committed"
        )));
    }

    tables.insert_segment(segment.clone());
    Ok(segment)
}

fn ensure_object_pending(tables: &Tables, stream_id: StreamId) -> Result<()> {
    let key = tables
        .stream_locations
        .get(&stream_id)
        .ok_or_else(|| StoreError::ObjectNotFound(format!("stream {stream_id} not found")))?;
    let object = tables
        .objects
        .get(key)
        .ok_or_else(|| StoreError::ObjectNotFound(format!("stream {stream_id} not found")))?;
    if object.is_committed() {
        return Err(invalid_request(
            "cannot add segments to an already-committed object",
        ));
    }
    Ok(())
}

/// `GetSegmentByPosition` (spec.md §4.2).
pub fn get_segment_by_position(
    tables: &Tables,
    stream_id: StreamId,
    position: SegmentPosition,
) -> Result<Segment> {
    tables
        .get_segment(stream_id, position)
        .cloned()
        .ok_or_else(|| StoreError::SegmentNotFound(format!("no segment at position {position}")))
}

/// `GetLatestObjectLastSegment` (spec.md §4.2): the highest-positioned
/// segment of a stream.
pub fn get_latest_object_last_segment(tables: &Tables, stream_id: StreamId) -> Result<Segment> {
    tables
        .segments_of(stream_id)
        .max_by_key(|s| s.position)
        .cloned()
        .ok_or_else(|| StoreError::SegmentNotFound("stream has no segments".into()))
}

/// A page of `ListSegments` results (spec.md §4.2).
pub struct SegmentsPage {
    pub segments: Vec<Segment>,
    pub more: bool,
}

/// `ListSegments`: ordered ascending by Position (spec.md §4.2, §4.4).
pub fn list_segments(
    tables: &Tables,
    stream_id: StreamId,
    cursor: Option<SegmentPosition>,
    limit: usize,
) -> SegmentsPage {
    let start = cursor.map(|c| c.encode().saturating_add(1)).unwrap_or(0);
    let mut segments = Vec::new();
    let mut more = false;
    for (_, segment) in tables.segments.range((stream_id, start)..(stream_id, u64::MAX)) {
        if segments.len() == limit {
            more = true;
            break;
        }
        segments.push(segment.clone());
    }
    SegmentsPage { segments, more }
}
