//! Object table operations (spec.md §4.2).

use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::ids::{ProjectId, StreamId};
use crate::model::{
    BucketName, EncryptionParameters, Object, ObjectEntry, ObjectKey, ObjectLocation,
    ObjectStatus, ObjectStream, Version,
};
use crate::store::error::{invalid_request, Result, StoreError};
use crate::store::tables::Tables;

/// `BeginObjectExactVersion` (spec.md §4.2).
pub fn begin_object_exact_version(
    tables: &mut Tables,
    stream: ObjectStream,
    encryption: EncryptionParameters,
    expires_at: Option<OffsetDateTime>,
) -> Result<Object> {
    let key = Tables::object_key(
        stream.location.project_id,
        &stream.location.bucket_name,
        &stream.location.object_key,
        stream.version,
    );
    if tables.objects.contains_key(&key) {
        return Err(StoreError::AlreadyExists(format!(
            "object already exists at version {}",
            stream.version
        )));
    }
    if tables.stream_locations.contains_key(&stream.stream_id) {
        return Err(StoreError::AlreadyExists("stream id already in use".into()));
    }

    let object = Object {
        stream: stream.clone(),
        status: ObjectStatus::Pending,
        created_at: OffsetDateTime::now_utc(),
        expires_at,
        zombie_deletion_deadline: Some(OffsetDateTime::now_utc() + time::Duration::hours(24)),
        segment_count: 0,
        total_plain_size: 0,
        total_encrypted_size: 0,
        fixed_segment_size: 0,
        encryption,
        encrypted_metadata: Vec::new(),
        encrypted_metadata_key: Vec::new(),
        encrypted_metadata_nonce: Vec::new(),
    };

    tables.stream_locations.insert(stream.stream_id, key.clone());
    tables.objects.insert(key, object.clone());
    debug!(stream_id = %stream.stream_id, "began pending object");
    Ok(object)
}

/// `CommitObject` (spec.md §4.2): transition Pending -> Committed, deriving
/// segment_count/total sizes/fixed_segment_size from the committed segments.
pub fn commit_object(
    tables: &mut Tables,
    stream_id: StreamId,
    encrypted_metadata: Vec<u8>,
    encrypted_metadata_key: Vec<u8>,
    encrypted_metadata_nonce: Vec<u8>,
) -> Result<Object> {
    let key = tables
        .stream_locations
        .get(&stream_id)
        .cloned()
        .ok_or_else(|| StoreError::ObjectNotFound(format!("stream {stream_id} not found")))?;

    let mut segments: Vec<_> = tables.segments_of(stream_id).cloned().collect();
    segments.sort_by_key(|s| s.position);

    verify_contiguous_positions(&segments)?;

    let segment_count = segments.len() as i32;
    let total_plain_size: i64 = segments.iter().map(|s| s.plain_size as i64).sum();
    let total_encrypted_size: i64 = segments.iter().map(|s| s.encrypted_size as i64).sum();
    let fixed_segment_size = segments.first().map(|s| s.plain_size).unwrap_or(0);

    let object = tables
        .objects
        .get_mut(&key)
        .ok_or_else(|| StoreError::ObjectNotFound(format!("stream {stream_id} not found")))?;

    if object.is_committed() {
        return Err(invalid_request("object is already committed"));
    }
    if let Some(expires_at) = object.expires_at {
        if expires_at <= object.created_at {
            return Err(invalid_request(
                "expires_at must be strictly after created_at",
            ));
        }
    }

    object.status = ObjectStatus::Committed;
    object.segment_count = segment_count;
    object.total_plain_size = total_plain_size;
    object.total_encrypted_size = total_encrypted_size;
    object.fixed_segment_size = fixed_segment_size;
    object.encrypted_metadata = encrypted_metadata;
    object.encrypted_metadata_key = encrypted_metadata_key;
    object.encrypted_metadata_nonce = encrypted_metadata_nonce;
    object.zombie_deletion_deadline = None;

    Ok(object.clone())
}

fn verify_contiguous_positions(segments: &[crate::model::Segment]) -> Result<()> {
    for (expected_index, segment) in segments.iter().enumerate() {
        if segment.position.encode() != expected_index as u64 {
            return Err(invalid_request(format!(
                "segments are not contiguous: expected position {}, found {}",
                expected_index, segment.position
            )));
        }
    }
    Ok(())
}

/// `GetObjectLatestVersion` (spec.md §4.2).
pub fn get_object_latest_version(tables: &Tables, location: &ObjectLocation) -> Result<Object> {
    let lower = Tables::object_key(
        location.project_id,
        &location.bucket_name,
        &location.object_key,
        Version::MIN,
    );
    let upper = Tables::object_key(
        location.project_id,
        &location.bucket_name,
        &location.object_key,
        Version::MAX,
    );
    tables
        .objects
        .range(lower..=upper)
        .rev()
        .map(|(_, obj)| obj)
        .find(|obj| obj.is_committed())
        .cloned()
        .ok_or_else(|| StoreError::ObjectNotFound("no committed version found".into()))
}

/// `GetObjectExactVersion`: point lookup used by the Copy Engine and
/// download path.
pub fn get_object_exact_version(
    tables: &Tables,
    location: &ObjectLocation,
    version: Version,
) -> Result<Object> {
    let key = Tables::object_key(
        location.project_id,
        &location.bucket_name,
        &location.object_key,
        version,
    );
    tables
        .objects
        .get(&key)
        .cloned()
        .ok_or_else(|| StoreError::ObjectNotFound(format!("object at version {version} not found")))
}

/// A page of `IterateObjectsAllVersions` results (spec.md §4.2).
pub struct ObjectsPage {
    pub entries: Vec<ObjectEntry>,
    pub more: bool,
}

/// `IterateObjectsAllVersions`: sorted ascending by (ObjectKey, Version),
/// collapsing non-recursive listings at the first `/` past `prefix`.
#[allow(clippy::too_many_arguments)]
pub fn iterate_objects_all_versions(
    tables: &Tables,
    project_id: ProjectId,
    bucket: &BucketName,
    prefix: &[u8],
    cursor: Option<(ObjectKey, Version)>,
    batch_size: usize,
    recursive: bool,
    status: Option<ObjectStatus>,
) -> ObjectsPage {
    // `cursor` names the last entry already returned to the caller; resume
    // strictly after it.
    let (cursor_key, cursor_version) = cursor.unwrap_or((prefix.to_vec(), Version::MIN));
    let resume_version = cursor_version.saturating_add(1);
    let lower = Tables::object_key(project_id, bucket, &cursor_key, resume_version);

    let mut entries = Vec::new();
    let mut more = false;
    let mut last_prefix_entry: Option<Vec<u8>> = None;

    for (key, object) in tables.objects.range(lower..) {
        let (k_project, k_bucket, k_object_key, k_version) = key;
        if *k_project != project_id || k_bucket != bucket {
            break;
        }
        if !k_object_key.starts_with(prefix) {
            break;
        }
        if let Some(want) = status {
            if !matches!(
                (want, object.status),
                (ObjectStatus::Pending, ObjectStatus::Pending)
                    | (ObjectStatus::Committed, ObjectStatus::Committed)
            ) {
                continue;
            }
        }

        let remainder = &k_object_key[prefix.len()..];
        let entry = if !recursive {
            if let Some(delim_pos) = remainder.iter().position(|&b| b == b'/') {
                let collapsed_key = [prefix, &remainder[..=delim_pos]].concat();
                if last_prefix_entry.as_deref() == Some(collapsed_key.as_slice()) {
                    continue;
                }
                last_prefix_entry = Some(collapsed_key.clone());
                Some(ObjectEntry {
                    object_key: collapsed_key,
                    version: 0,
                    status: ObjectStatus::Committed,
                    stream_id: object.stream.stream_id,
                    created_at: object.created_at,
                    is_prefix: true,
                })
            } else {
                Some(ObjectEntry {
                    object_key: k_object_key.clone(),
                    version: *k_version,
                    status: object.status,
                    stream_id: object.stream.stream_id,
                    created_at: object.created_at,
                    is_prefix: false,
                })
            }
        } else {
            Some(ObjectEntry {
                object_key: k_object_key.clone(),
                version: *k_version,
                status: object.status,
                stream_id: object.stream.stream_id,
                created_at: object.created_at,
                is_prefix: false,
            })
        };

        if let Some(entry) = entry {
            if entries.len() == batch_size {
                more = true;
                break;
            }
            entries.push(entry);
        }
    }

    ObjectsPage { entries, more }
}

/// `DeleteObjectsAllVersions` (spec.md §4.2, §4.5 "ancestor promotion"):
/// removes every version at each location, rewriting copy edges so any
/// surviving copy keeps working.
pub fn delete_objects_all_versions(
    tables: &mut Tables,
    locations: &[ObjectLocation],
) -> Result<Vec<crate::model::DeletedObject>> {
    let mut deleted = Vec::new();

    for location in locations {
        let lower = Tables::object_key(
            location.project_id,
            &location.bucket_name,
            &location.object_key,
            Version::MIN,
        );
        let upper = Tables::object_key(
            location.project_id,
            &location.bucket_name,
            &location.object_key,
            Version::MAX,
        );
        let keys: Vec<_> = tables
            .objects
            .range(lower..=upper)
            .map(|(k, _)| k.clone())
            .collect();

        for key in keys {
            if let Some(object) = tables.objects.remove(&key) {
                tables.stream_locations.remove(&object.stream.stream_id);
                tables.remove_segments_of(object.stream.stream_id);
                let promoted_ancestor = promote_ancestor_if_needed(tables, object.stream.stream_id);
                deleted.push(crate::model::DeletedObject {
                    object,
                    promoted_ancestor,
                });
            }
        }
    }

    Ok(deleted)
}

/// If `removed` was an ancestor for one or more copies, pick a surviving
/// copy, rewrite the other copies' edges to point at it, and drop its own
/// edge — preserving the depth-1 forest invariant (spec.md §4.5).
pub(crate) fn promote_ancestor_if_needed(
    tables: &mut Tables,
    removed: StreamId,
) -> Option<StreamId> {
    let copies = tables.copies_of(removed);
    if copies.is_empty() {
        tables.copy_edges.remove(&removed);
        return None;
    }

    // Implementation-defined tie-break: lowest StreamID, matching spec.md
    // §4.5's suggested rule.
    let promoted = *copies.iter().min()?;
    tables.copy_edges.remove(&promoted);

    for child in copies {
        if child == promoted {
            continue;
        }
        tables.copy_edges.insert(child, promoted);
    }

    warn!(removed = %removed, promoted = %promoted, "promoted copy to ancestor of record");
    Some(promoted)
}
