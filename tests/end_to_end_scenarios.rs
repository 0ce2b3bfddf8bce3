//! End-to-end scenario tests (spec.md §8): the copy round-trip law and the
//! delete-dispatches-regardless-of-outcome behavior, combining multiple
//! components the way a real caller would.

use std::sync::Arc;

use metabase::collab::testing::*;
use metabase::config::Config;
use metabase::ids::{ProjectId, SegmentPosition, StorageNodeId, StreamId};
use metabase::model::{EncryptionParameters, ObjectLocation, Piece, RedundancyScheme};
use metabase::service::{Collaborators, MetabaseService};

fn service(project_id: ProjectId) -> MetabaseService {
    MetabaseService::new(
        Config::for_tests(),
        Collaborators {
            auth: Arc::new(AlwaysAllowAuth::new(project_id)),
            overlay: Arc::new(InMemoryOverlay),
            orders: Arc::new(InMemoryOrders::default()),
            piece_deletion: Arc::new(AlwaysSucceedsPieceDeletion::default()),
            project_usage: Arc::new(InMemoryProjectUsage::default()),
        },
    )
}

fn redundancy() -> RedundancyScheme {
    RedundancyScheme {
        required_shares: 8,
        repair_shares: 9,
        optimal_shares: 8,
        total_shares: 11,
        share_size: 256,
    }
}

fn loc(project_id: ProjectId, key: &[u8]) -> ObjectLocation {
    ObjectLocation {
        project_id,
        bucket_name: "bucket".into(),
        object_key: key.to_vec(),
    }
}

#[tokio::test]
async fn copy_round_trip_preserves_encryption_and_plain_sizes() {
    let project_id = ProjectId::new();
    let service = service(project_id);
    let source_loc = loc(project_id, b"source");

    let begin = service
        .begin_object(
            "auth",
            source_loc.clone(),
            EncryptionParameters {
                cipher_suite: 2,
                block_size: 8192,
            },
            redundancy(),
            None,
            true,
        )
        .await
        .unwrap();

    let (_token, signed_segment_token) = service
        .begin_segment(&begin.signed_stream_token, SegmentPosition::zero(), redundancy(), project_id)
        .await
        .unwrap();
    let pieces: Vec<Piece> = (0..11u16)
        .map(|number| Piece {
            number,
            storage_node: StorageNodeId::new(),
        })
        .collect();
    service
        .commit_segment(
            &signed_segment_token,
            redundancy(),
            b"enc-key".to_vec(),
            b"enc-nonce".to_vec(),
            500_000,
            600_000,
            pieces,
            project_id,
        )
        .await
        .unwrap();
    service
        .commit_object(&begin.signed_stream_token, b"original-metadata".to_vec(), vec![], vec![])
        .unwrap();

    let source_object = service.get_object(&source_loc).unwrap();

    let dest_loc = loc(project_id, b"destination");
    let copy_begin = service.begin_copy_object(&source_loc, 1).unwrap();
    let copied = service
        .finish_copy_object(
            source_loc,
            1,
            dest_loc.clone(),
            StreamId::new(),
            None,
            copy_begin.segment_keys,
        )
        .unwrap();

    assert_eq!(copied.encryption.cipher_suite, source_object.encryption.cipher_suite);
    assert_eq!(copied.encryption.block_size, source_object.encryption.block_size);
    assert_eq!(copied.total_plain_size, source_object.total_plain_size);
    assert_eq!(copied.total_encrypted_size, source_object.total_encrypted_size);
    assert_eq!(copied.encrypted_metadata, source_object.encrypted_metadata);

    let fetched = service.get_object(&dest_loc).unwrap();
    assert_eq!(fetched.stream.stream_id, copied.stream.stream_id);
}

#[tokio::test]
async fn delete_still_runs_piece_deletion_to_completion() {
    let project_id = ProjectId::new();
    let service = service(project_id);
    let location = loc(project_id, b"to-delete");

    let begin = service
        .begin_object(
            "auth",
            location.clone(),
            EncryptionParameters {
                cipher_suite: 1,
                block_size: 4096,
            },
            redundancy(),
            None,
            true,
        )
        .await
        .unwrap();
    let (_token, signed_segment_token) = service
        .begin_segment(&begin.signed_stream_token, SegmentPosition::zero(), redundancy(), project_id)
        .await
        .unwrap();
    let pieces: Vec<Piece> = (0..11u16)
        .map(|number| Piece {
            number,
            storage_node: StorageNodeId::new(),
        })
        .collect();
    service
        .commit_segment(
            &signed_segment_token,
            redundancy(),
            b"enc-key".to_vec(),
            b"enc-nonce".to_vec(),
            1_000_000,
            1_048_576,
            pieces,
            project_id,
        )
        .await
        .unwrap();
    service
        .commit_object(&begin.signed_stream_token, vec![], vec![], vec![])
        .unwrap();

    // The metadata delete must succeed and return promptly even though the
    // piece-deletion fan-out is detached and still running in the
    // background (spec.md §4.6 scenario 6).
    service.begin_delete_object(&location).unwrap();

    let err = service.get_object(&location).unwrap_err();
    assert!(matches!(err, metabase::ApiError::NotFound(_)));
}
