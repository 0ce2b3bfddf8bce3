//! In-process table storage backing the Metabase Store (SPEC_FULL.md §4.2).
//!
//! The real system persists to CockroachDB; the relational driver is out of
//! scope here (spec.md §1). This module provides the same transactional
//! contract over ordered, lock-guarded in-memory maps.

use std::collections::{BTreeMap, HashMap};

use crate::ids::{ProjectId, SegmentPosition, StreamId};
use crate::model::{BucketName, Object, ObjectKey, Segment, Version};

/// Lexicographic key giving the exact iteration order
/// `IterateObjectsAllVersions` needs: ascending by (ObjectKey, Version)
/// within a fixed (ProjectID, BucketName) scope.
pub type ObjectTableKey = (ProjectId, BucketName, ObjectKey, Version);

#[derive(Default)]
pub struct Tables {
    pub objects: BTreeMap<ObjectTableKey, Object>,
    /// StreamID is globally unique (spec.md §3 invariant); this is the
    /// reverse index used to find an object's location from its stream.
    pub stream_locations: HashMap<StreamId, ObjectTableKey>,
    pub segments: BTreeMap<(StreamId, u64), Segment>,
    /// child stream id -> ancestor stream id (spec.md §3: "a forest of
    /// depth at most one").
    pub copy_edges: HashMap<StreamId, StreamId>,
}

impl Tables {
    pub fn object_key(project_id: ProjectId, bucket: &str, key: &[u8], version: Version) -> ObjectTableKey {
        (project_id, bucket.to_string(), key.to_vec(), version)
    }

    pub fn segments_of(&self, stream_id: StreamId) -> impl Iterator<Item = &Segment> {
        self.segments
            .range((stream_id, 0)..(stream_id, u64::MAX))
            .map(|(_, seg)| seg)
    }

    pub fn segment_count(&self, stream_id: StreamId) -> usize {
        self.segments_of(stream_id).count()
    }

    pub fn remove_segments_of(&mut self, stream_id: StreamId) -> Vec<Segment> {
        let keys: Vec<(StreamId, u64)> = self
            .segments
            .range((stream_id, 0)..(stream_id, u64::MAX))
            .map(|(k, _)| *k)
            .collect();
        keys.into_iter()
            .filter_map(|k| self.segments.remove(&k))
            .collect()
    }

    pub fn insert_segment(&mut self, segment: Segment) {
        let key = (segment.stream_id, segment.position.encode());
        self.segments.insert(key, segment);
    }

    pub fn get_segment(&self, stream_id: StreamId, position: SegmentPosition) -> Option<&Segment> {
        self.segments.get(&(stream_id, position.encode()))
    }

    /// Children of `ancestor` in the copy-edges forest (spec.md §4.5
    /// ancestor promotion needs to enumerate these). The in-memory store
    /// scans; a SQL backend would index on `ancestor_stream_id`.
    pub fn copies_of(&self, ancestor: StreamId) -> Vec<StreamId> {
        let mut children: Vec<StreamId> = self
            .copy_edges
            .iter()
            .filter(|(_, anc)| **anc == ancestor)
            .map(|(child, _)| *child)
            .collect();
        children.sort();
        children
    }
}
