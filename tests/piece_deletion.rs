//! Piece-deletion dispatcher integration tests (spec.md §4.6, §8 scenario 6).

use std::time::Duration;

use async_trait::async_trait;
use metabase::collab::{DeleteRequest, PieceDeletion};
use metabase::deletion::PieceDeletionDispatcher;
use metabase::ids::{PieceId, StorageNodeId};
use metabase::model::{DeletedSegmentInfo, Piece};
use smallvec::SmallVec;
use tokio::sync::mpsc;

struct RecordingPieceDeletion {
    sender: mpsc::UnboundedSender<Vec<DeleteRequest>>,
}

#[async_trait]
impl PieceDeletion for RecordingPieceDeletion {
    async fn delete(&self, requests: &[DeleteRequest], _success_threshold: f64) -> metabase::Result<()> {
        let _ = self.sender.send(requests.to_vec());
        Ok(())
    }
}

#[tokio::test]
async fn dispatch_groups_pieces_by_storage_node() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let dispatcher = PieceDeletionDispatcher::new(
        std::sync::Arc::new(RecordingPieceDeletion { sender: tx }),
        0.75,
    );

    let node_a = StorageNodeId::new();
    let node_b = StorageNodeId::new();
    let root_piece_id = PieceId::new();

    let mut pieces_a: SmallVec<[Piece; 16]> = SmallVec::new();
    pieces_a.push(Piece {
        number: 0,
        storage_node: node_a,
    });
    pieces_a.push(Piece {
        number: 1,
        storage_node: node_b,
    });

    let segment = DeletedSegmentInfo {
        stream_id: metabase::ids::StreamId::new(),
        root_piece_id,
        pieces: pieces_a,
    };

    dispatcher.dispatch(vec![segment]);

    let requests = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("dispatch must complete promptly")
        .expect("channel must not close before sending");

    assert_eq!(requests.len(), 2, "pieces must be grouped into one request per node");
    let nodes: std::collections::HashSet<_> = requests.iter().map(|r| r.node).collect();
    assert!(nodes.contains(&node_a));
    assert!(nodes.contains(&node_b));
    for request in &requests {
        assert_eq!(request.pieces.len(), 1);
    }
}

#[tokio::test]
async fn dispatch_with_no_remote_pieces_does_not_contact_the_collaborator() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let dispatcher = PieceDeletionDispatcher::new(
        std::sync::Arc::new(RecordingPieceDeletion { sender: tx }),
        0.75,
    );

    dispatcher.dispatch(vec![]);

    let result = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(result.is_err(), "no dispatch should have been sent for an empty segment list");
}
