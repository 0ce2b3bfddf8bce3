//! Copy engine integration tests (spec.md §8 scenarios 3, 4).

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

async fn upload_single_segment_object(
    service: &MetabaseService,
    project_id: ProjectId,
    key: &[u8],
) -> ObjectLocation {
    let location = loc(project_id, key);
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
        .commit_object(&begin.signed_stream_token, b"metadata".to_vec(), vec![], vec![])
        .unwrap();
    location
}

fn copy_object(
    service: &MetabaseService,
    source: &ObjectLocation,
    destination: &ObjectLocation,
) -> metabase::model::Object {
    let begin = service.begin_copy_object(source, 1).unwrap();
    let new_stream_id = StreamId::new();
    service
        .finish_copy_object(
            source.clone(),
            1,
            destination.clone(),
            new_stream_id,
            None,
            begin.segment_keys,
        )
        .unwrap()
}

#[tokio::test]
async fn copy_of_copy_points_at_the_original_ancestor() {
    let project_id = ProjectId::new();
    let service = service(project_id);

    let o1 = upload_single_segment_object(&service, project_id, b"o1").await;
    let o1_stream_id = service.get_object(&o1).unwrap().stream.stream_id;

    let o2 = loc(project_id, b"o2");
    let o2_object = copy_object(&service, &o1, &o2);

    let o3 = loc(project_id, b"o3");
    let o3_object = copy_object(&service, &o2, &o3);

    let store = service.store();
    assert_eq!(
        store.ancestor_of(o2_object.stream.stream_id),
        Some(o1_stream_id)
    );
    assert_eq!(
        store.ancestor_of(o3_object.stream.stream_id),
        Some(o1_stream_id),
        "a copy of a copy must point at the original ancestor, not its immediate parent"
    );
}

#[tokio::test]
async fn overwriting_the_ancestor_promotes_a_surviving_copy() {
    let project_id = ProjectId::new();
    let service = service(project_id);

    let o1 = upload_single_segment_object(&service, project_id, b"o1").await;
    let o2 = loc(project_id, b"o2");
    let o2_object = copy_object(&service, &o1, &o2);
    let o3 = loc(project_id, b"o3");
    let o3_object = copy_object(&service, &o2, &o3);

    let old_o1_stream_id = service.get_object(&o1).unwrap().stream.stream_id;

    // Copy O3 -> O1, overwriting the ancestor of record.
    let new_o1 = copy_object(&service, &o3, &o1);

    let store = service.store();
    let new_ancestor = store
        .ancestor_of(new_o1.stream.stream_id)
        .expect("the new O1 copy must have an ancestor");

    // The tie-break among surviving copies is implementation-defined
    // (spec.md §4.5): either O2 or O3 may be promoted. What's invariant is
    // that the old O1 is gone from the ancestry, the promoted copy has no
    // copy edge of its own, and the other survivor now points at it.
    assert_ne!(new_ancestor, old_o1_stream_id, "the deleted O1 must not remain an ancestor");
    assert!(
        new_ancestor == o2_object.stream.stream_id || new_ancestor == o3_object.stream.stream_id,
        "the promoted ancestor must be one of the surviving copies"
    );
    assert_eq!(
        store.ancestor_of(new_ancestor),
        None,
        "the promoted ancestor of record must not itself have a copy edge"
    );

    let other_survivor = if new_ancestor == o2_object.stream.stream_id {
        o3_object.stream.stream_id
    } else {
        o2_object.stream.stream_id
    };
    assert_eq!(
        store.ancestor_of(other_survivor),
        Some(new_ancestor),
        "the other survivor's edge must be rewritten to the promoted ancestor"
    );
}
