//! Segment lifecycle integration tests (spec.md §8 scenario 2, §4.4).

use std::sync::Arc;

use metabase::collab::testing::*;
use metabase::config::Config;
use metabase::ids::{ProjectId, SegmentPosition, StorageNodeId};
use metabase::lifecycle::DownloadSegmentResult;
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

#[tokio::test]
async fn inline_small_object_downloads_its_payload_directly() {
    let project_id = ProjectId::new();
    let service = service(project_id);
    let loc = ObjectLocation {
        project_id,
        bucket_name: "bucket".into(),
        object_key: b"inline-key".to_vec(),
    };

    let begin = service
        .begin_object(
            "auth",
            loc,
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

    let segment = service
        .make_inline_segment(
            &begin.signed_stream_token,
            SegmentPosition::zero(),
            b"enc-key".to_vec(),
            b"enc-nonce".to_vec(),
            256,
            vec![7u8; 256],
        )
        .unwrap();
    assert!(segment.is_inline());

    service
        .commit_object(&begin.signed_stream_token, vec![], vec![], vec![])
        .unwrap();

    let result = service
        .download_segment(begin.stream_id, SegmentPosition::zero(), project_id)
        .await
        .unwrap();
    match result {
        DownloadSegmentResult::Inline(bytes) => assert_eq!(bytes, vec![7u8; 256]),
        DownloadSegmentResult::Remote { .. } => panic!("expected an inline download result"),
    }
}

#[tokio::test]
async fn remote_download_limits_are_sorted_by_piece_number_with_gaps() {
    let project_id = ProjectId::new();
    let service = service(project_id);
    let loc = ObjectLocation {
        project_id,
        bucket_name: "bucket".into(),
        object_key: b"remote-key".to_vec(),
    };

    let begin = service
        .begin_object(
            "auth",
            loc,
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

    // Skip piece number 3 to exercise the sentinel-gap behavior.
    let numbers = [0u16, 1, 2, 4, 5, 6, 7, 8, 9, 10];
    let pieces: Vec<Piece> = numbers
        .iter()
        .map(|&number| Piece {
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

    let result = service
        .download_segment(begin.stream_id, SegmentPosition::zero(), project_id)
        .await
        .unwrap();
    match result {
        DownloadSegmentResult::Remote { limits, .. } => {
            assert_eq!(limits.len(), 11);
            assert!(limits[3].is_none(), "gap at piece number 3 must be a sentinel");
            assert!(limits[0].is_some());
            assert!(limits[10].is_some());
        }
        DownloadSegmentResult::Inline(_) => panic!("expected a remote download result"),
    }
}
