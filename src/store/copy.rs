//! Server-side copy algorithm (spec.md §4.5), grounded directly in
//! `copy_object.go`'s `finishCopyObject`: one fetch of source + ancestor +
//! destination, ancestor determination, destination-overwrite handling via
//! ancestor promotion, and a bulk segment insert.

use time::OffsetDateTime;

use crate::ids::StreamId;
use crate::model::{
    EncryptedKeyAndNonce, EncryptedMetadata, Object, ObjectLocation, ObjectStatus, ObjectStream,
    Segment,
};
use crate::store::error::{invalid_request, Result, StoreError};
use crate::store::objects::promote_ancestor_if_needed;
use crate::store::tables::Tables;

/// Everything `FinishCopyObject` needs beyond the store itself.
pub struct FinishCopyRequest {
    pub source: ObjectLocation,
    pub source_version: crate::model::Version,
    pub destination_location: ObjectLocation,
    pub new_stream_id: StreamId,
    pub override_metadata: Option<EncryptedMetadata>,
    pub new_segment_keys: Vec<EncryptedKeyAndNonce>,
}

pub struct FinishCopyResult {
    pub object: Object,
    pub segments: Vec<Segment>,
}

/// `FinishCopyObject` (spec.md §4.5): the ten-step transactional clone.
pub fn finish_copy_object(
    tables: &mut Tables,
    req: FinishCopyRequest,
    max_copy_segments: usize,
) -> Result<FinishCopyResult> {
    // Step 0 (validation, spec.md §4.5 "Inputs"): reject identical stream ids.
    let source_key = Tables::object_key(
        req.source.project_id,
        &req.source.bucket_name,
        &req.source.object_key,
        req.source_version,
    );
    let source = tables
        .objects
        .get(&source_key)
        .cloned()
        .ok_or_else(|| StoreError::ObjectNotFound("source object not found".into()))?;
    if source.stream.stream_id == req.new_stream_id {
        return Err(invalid_request("source and destination stream ids must differ"));
    }
    if !source.is_committed() {
        return Err(invalid_request("source object is not committed"));
    }

    // Step 1: single fetch of source + its ancestor edge + destination.
    let source_ancestor = tables.copy_edges.get(&source.stream.stream_id).copied();
    let destination_latest = latest_committed_at(tables, &req.destination_location);

    // Step 2: determine ancestorStreamID.
    let mut ancestor_stream_id = source_ancestor.unwrap_or(source.stream.stream_id);

    // Step 3: load source segments in Position order, capped at SegmentCount.
    let mut segments: Vec<Segment> = tables.segments_of(source.stream.stream_id).cloned().collect();
    segments.sort_by_key(|s| s.position);
    if segments.len() != source.segment_count as usize {
        return Err(invalid_request(
            "loaded segment count differs from the object's recorded segment_count",
        ));
    }
    if segments.len() > max_copy_segments {
        return Err(invalid_request(format!(
            "source object has more than {max_copy_segments} segments, refusing to copy"
        )));
    }

    // Step 4: NewSegmentKeys must line up positionally with source segments.
    if req.new_segment_keys.len() != segments.len() {
        return Err(invalid_request(
            "new_segment_keys length does not match source segment count",
        ));
    }
    for (segment, keys) in segments.iter().zip(req.new_segment_keys.iter()) {
        if segment.position != keys.position {
            return Err(invalid_request(
                "new_segment_keys positions do not match source segment positions",
            ));
        }
    }

    // Step 5: onlyInlineSegments.
    let only_inline_segments = segments.iter().all(|s| s.is_inline());

    // Step 6: choose metadata.
    let (encrypted_metadata, encrypted_metadata_key, encrypted_metadata_nonce) =
        match req.override_metadata {
            Some(ref meta) => (meta.data.clone(), meta.key.clone(), meta.nonce.clone()),
            None => (
                source.encrypted_metadata.clone(),
                source.encrypted_metadata_key.clone(),
                source.encrypted_metadata_nonce.clone(),
            ),
        };

    // Step 7: if a destination object exists, delete it in this same
    // transaction, handling the ancestor-is-the-destination race.
    if let Some(destination) = destination_latest {
        let dest_points_at_ancestor = ancestor_stream_id == destination.stream.stream_id;

        delete_destination_all_versions(tables, &req.destination_location);
        let promoted = promote_ancestor_if_needed(tables, destination.stream.stream_id);

        if dest_points_at_ancestor {
            match promoted {
                Some(new_ancestor) => ancestor_stream_id = new_ancestor,
                None => {
                    return Err(StoreError::Internal(
                        "ancestor is gone, please retry".into(),
                    ))
                }
            }
        }
    }
    // Step 8: insert the new object row cloning source fields.
    let new_object = Object {
        stream: ObjectStream {
            location: req.destination_location.clone(),
            version: 1,
            stream_id: req.new_stream_id,
        },
        status: ObjectStatus::Committed,
        created_at: OffsetDateTime::now_utc(),
        expires_at: source.expires_at,
        zombie_deletion_deadline: None,
        segment_count: source.segment_count,
        total_plain_size: source.total_plain_size,
        total_encrypted_size: source.total_encrypted_size,
        fixed_segment_size: source.fixed_segment_size,
        encryption: source.encryption,
        encrypted_metadata,
        encrypted_metadata_key,
        encrypted_metadata_nonce,
    };

    let new_key = Tables::object_key(
        new_object.stream.location.project_id,
        &new_object.stream.location.bucket_name,
        &new_object.stream.location.object_key,
        new_object.stream.version,
    );
    tables
        .stream_locations
        .insert(req.new_stream_id, new_key.clone());
    tables.objects.insert(new_key, new_object.clone());

    // Step 9: bulk-insert the new segment rows, sharing RootPieceID/pieces
    // and inline bytes with the source, re-keyed per NewSegmentKeys.
    let mut new_segments = Vec::with_capacity(segments.len());
    for (source_segment, keys) in segments.iter().zip(req.new_segment_keys.iter()) {
        let mut new_segment = source_segment.clone();
        new_segment.stream_id = req.new_stream_id;
        new_segment.encrypted_key = keys.encrypted_key.clone();
        new_segment.encrypted_key_nonce = keys.encrypted_key_nonce.clone();
        tables.insert_segment(new_segment.clone());
        new_segments.push(new_segment);
    }

    // Step 10: record the copy edge, unless every segment is inline.
    if !only_inline_segments {
        tables.copy_edges.insert(req.new_stream_id, ancestor_stream_id);
    }

    Ok(FinishCopyResult {
        object: new_object,
        segments: new_segments,
    })
}

fn latest_committed_at(tables: &Tables, location: &ObjectLocation) -> Option<Object> {
    let lower = Tables::object_key(
        location.project_id,
        &location.bucket_name,
        &location.object_key,
        crate::model::Version::MIN,
    );
    let upper = Tables::object_key(
        location.project_id,
        &location.bucket_name,
        &location.object_key,
        crate::model::Version::MAX,
    );
    tables
        .objects
        .range(lower..=upper)
        .rev()
        .map(|(_, obj)| obj)
        .find(|obj| obj.is_committed())
        .cloned()
}

fn delete_destination_all_versions(tables: &mut Tables, location: &ObjectLocation) {
    let lower = Tables::object_key(
        location.project_id,
        &location.bucket_name,
        &location.object_key,
        crate::model::Version::MIN,
    );
    let upper = Tables::object_key(
        location.project_id,
        &location.bucket_name,
        &location.object_key,
        crate::model::Version::MAX,
    );
    let keys: Vec<_> = tables.objects.range(lower..=upper).map(|(k, _)| k.clone()).collect();
    for key in keys {
        if let Some(object) = tables.objects.remove(&key) {
            tables.stream_locations.remove(&object.stream.stream_id);
            tables.remove_segments_of(object.stream.stream_id);
        }
    }
}
