//! Copy Engine (spec.md §4.5, C5): request validation and the thin async
//! wrapper around the store's transactional `FinishCopyObject` algorithm
//! (`crate::store::copy`, not exposed outside the crate).

use std::sync::Arc;
use tracing::instrument;

use crate::error::{invalid, Result};
use crate::ids::StreamId;
use crate::model::{EncryptedKeyAndNonce, EncryptedMetadata, ObjectLocation, Version};
use crate::store::{FinishCopyRequest, FinishCopyResult, MetabaseStore};

pub struct CopyEngine {
    store: Arc<MetabaseStore>,
    max_copy_segments: usize,
}

/// `BeginCopyObject` result: enough for the client to re-encrypt its
/// per-segment keys under the destination object key without touching
/// piece data (spec.md §3 `EncryptedKeyAndNonce`).
pub struct BeginCopyResult {
    pub source_stream_id: StreamId,
    pub segment_keys: Vec<EncryptedKeyAndNonce>,
}

impl CopyEngine {
    pub fn new(store: Arc<MetabaseStore>, max_copy_segments: usize) -> Self {
        Self {
            store,
            max_copy_segments,
        }
    }

    /// `BeginCopyObject` (spec.md §6): hands back the source's current
    /// per-segment key material for the client to re-encrypt.
    pub fn begin_copy_object(
        &self,
        source: &ObjectLocation,
        source_version: Version,
    ) -> Result<BeginCopyResult> {
        let object = self.store.get_object_exact_version(source, source_version)?;
        let (segments, _more) = {
            let page = self.store.list_segments(object.stream.stream_id, None, usize::MAX);
            (page.segments, page.more)
        };
        let segment_keys = segments
            .into_iter()
            .map(|s| EncryptedKeyAndNonce {
                position: s.position,
                encrypted_key_nonce: s.encrypted_key_nonce,
                encrypted_key: s.encrypted_key,
            })
            .collect();
        Ok(BeginCopyResult {
            source_stream_id: object.stream.stream_id,
            segment_keys,
        })
    }

    /// `FinishCopyObject` (spec.md §4.5): validates the input shapes the
    /// spec calls out, then runs the transactional clone.
    #[instrument(skip(self, new_segment_keys, override_metadata))]
    pub fn finish_copy_object(
        &self,
        source: ObjectLocation,
        source_version: Version,
        destination: ObjectLocation,
        new_stream_id: StreamId,
        override_metadata: Option<EncryptedMetadata>,
        new_segment_keys: Vec<EncryptedKeyAndNonce>,
    ) -> Result<FinishCopyResult> {
        if destination.bucket_name.is_empty() || destination.object_key.is_empty() {
            return Err(invalid("destination bucket and object key are required"));
        }
        if let Some(ref meta) = override_metadata {
            let has_key_material = !meta.key.is_empty() || !meta.nonce.is_empty();
            if meta.data.is_empty() != !has_key_material {
                return Err(invalid(
                    "override metadata and its key/nonce must be supplied together",
                ));
            }
        }

        let req = FinishCopyRequest {
            source,
            source_version,
            destination_location: destination,
            new_stream_id,
            override_metadata,
            new_segment_keys,
        };
        Ok(self.store.finish_copy_object(req, self.max_copy_segments)?)
    }
}
