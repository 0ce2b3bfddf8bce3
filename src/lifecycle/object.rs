//! Object Lifecycle (spec.md §4.3, C3): Begin/Commit/Get/List/Delete
//! objects, and the version/permission rules around them.

use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, instrument};

use crate::collab::Auth;
use crate::config::Config;
use crate::error::{invalid, ApiError, Result};
use crate::ids::token::{SigningKey, StreamToken};
use crate::ids::StreamId;
use crate::model::{
    BucketName, EncryptionParameters, ObjectEntry, ObjectKey, ObjectLocation, ObjectStatus,
    ObjectStream, RedundancyScheme, Version,
};
use crate::store::MetabaseStore;

pub struct BeginObjectResult {
    pub stream_id: StreamId,
    pub signed_stream_token: String,
}

/// Everything the C3 upload protocol's object-facing steps need: the store,
/// config, and the signing key used to mint stream tokens.
pub struct ObjectLifecycle {
    store: Arc<MetabaseStore>,
    config: Config,
}

impl ObjectLifecycle {
    pub fn new(store: Arc<MetabaseStore>, config: Config) -> Self {
        Self { store, config }
    }

    /// `BeginObject` (spec.md §4.3 step 1). A prior object at the same key
    /// is deleted if `caller_has_delete_permission`; otherwise its presence
    /// is a `PermissionDenied`, not a silent overwrite.
    #[instrument(skip(self, _auth))]
    #[allow(clippy::too_many_arguments)]
    pub async fn begin_object(
        &self,
        _auth: &dyn Auth,
        location: ObjectLocation,
        encryption: EncryptionParameters,
        redundancy: RedundancyScheme,
        expires_at: Option<OffsetDateTime>,
        caller_has_delete_permission: bool,
    ) -> Result<BeginObjectResult> {
        if let Ok(existing) = self.store.get_object_latest_version(&location) {
            if !caller_has_delete_permission {
                return Err(ApiError::PermissionDenied(
                    "an object already exists at this key".into(),
                ));
            }
            self.store
                .delete_objects_all_versions(std::slice::from_ref(&location))?;
            info!(stream_id = %existing.stream.stream_id, "deleted prior object before begin");
        }

        let stream_id = StreamId::new();
        let stream = ObjectStream {
            location: location.clone(),
            version: 1,
            stream_id,
        };
        self.store
            .begin_object_exact_version(stream.clone(), encryption, expires_at)?;

        let now = now_unix();
        let token = StreamToken {
            bucket: location.bucket_name.clone(),
            encrypted_object_key: location.object_key.clone(),
            version: 1,
            redundancy,
            created_at: now,
            expires_at: expires_at.map(to_unix).unwrap_or(0),
            stream_id,
        };
        let signed_stream_token = token.sign(&self.config.signing_key);

        Ok(BeginObjectResult {
            stream_id,
            signed_stream_token,
        })
    }

    /// `CommitObject` (spec.md §4.3 step 5).
    #[instrument(skip(self))]
    pub fn commit_object(
        &self,
        signed_stream_token: &str,
        encrypted_metadata: Vec<u8>,
        encrypted_metadata_key: Vec<u8>,
        encrypted_metadata_nonce: Vec<u8>,
    ) -> Result<crate::model::Object> {
        if encrypted_metadata.len() > self.config.max_metadata_size {
            return Err(invalid("encrypted metadata exceeds the configured maximum"));
        }
        let token = self.verify_stream_token(signed_stream_token)?;
        Ok(self.store.commit_object(
            token.stream_id,
            encrypted_metadata,
            encrypted_metadata_key,
            encrypted_metadata_nonce,
        )?)
    }

    /// `GetObject` (spec.md §6): latest committed version at a location.
    pub fn get_object(&self, location: &ObjectLocation) -> Result<crate::model::Object> {
        Ok(self.store.get_object_latest_version(location)?)
    }

    /// `GetObjectExactVersion`, used by the download and copy paths.
    pub fn get_object_exact_version(
        &self,
        location: &ObjectLocation,
        version: Version,
    ) -> Result<crate::model::Object> {
        Ok(self.store.get_object_exact_version(location, version)?)
    }

    /// `ListObjects` (spec.md §6 / §4.2 `IterateObjectsAllVersions`).
    #[allow(clippy::too_many_arguments)]
    pub fn list_objects(
        &self,
        project_id: crate::ids::ProjectId,
        bucket: &BucketName,
        prefix: &[u8],
        cursor: Option<(ObjectKey, Version)>,
        batch_size: usize,
        recursive: bool,
        status: Option<ObjectStatus>,
    ) -> (Vec<ObjectEntry>, bool) {
        let page = self.store.iterate_objects_all_versions(
            project_id, bucket, prefix, cursor, batch_size, recursive, status,
        );
        (page.entries, page.more)
    }

    /// `BeginDeleteObject` (spec.md §6): deletion is detached from the
    /// caller's cancellation per spec.md §4.6/§5; this method only performs
    /// the metadata delete and returns the deleted-segment descriptors the
    /// piece-deletion dispatcher needs — the caller is responsible for
    /// dispatching those without awaiting on the request's own cancellation.
    pub fn begin_delete_object(
        &self,
        location: &ObjectLocation,
    ) -> Result<Vec<crate::model::DeletedObject>> {
        Ok(self
            .store
            .delete_objects_all_versions(std::slice::from_ref(location))?)
    }

    fn verify_stream_token(&self, raw: &str) -> Result<StreamToken> {
        StreamToken::verify(raw, &self.config.signing_key, self.config.token_ttl)
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.config.signing_key
    }
}

fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn to_unix(t: OffsetDateTime) -> i64 {
    t.unix_timestamp()
}
