//! Piece-Deletion Dispatcher (spec.md §4.6, C6): group deleted segments by
//! storage node and fan out best-effort deletes, detached from the
//! caller's cancellation.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::collab::{DeleteRequest, PieceDeletion};
use crate::ids::StorageNodeId;
use crate::model::DeletedSegmentInfo;

pub struct PieceDeletionDispatcher {
    collaborator: Arc<dyn PieceDeletion>,
    success_threshold: f64,
}

impl PieceDeletionDispatcher {
    pub fn new(collaborator: Arc<dyn PieceDeletion>, success_threshold: f64) -> Self {
        Self {
            collaborator,
            success_threshold,
        }
    }

    /// Groups by storage node, derives concrete piece ids, and spawns a
    /// detached task to dispatch the deletes — the caller's request can be
    /// cancelled without orphaning pieces (spec.md §4.6 "cancellation
    /// immunity"). Returns immediately; errors from the dispatch are logged,
    /// never surfaced (garbage collection is the backstop).
    pub fn dispatch(&self, segments: Vec<DeletedSegmentInfo>) {
        let mut by_node: HashMap<StorageNodeId, Vec<crate::ids::PieceId>> = HashMap::new();
        for segment in &segments {
            for piece in &segment.pieces {
                let piece_id = segment.root_piece_id.derive(piece.storage_node, piece.number);
                by_node.entry(piece.storage_node).or_default().push(piece_id);
            }
        }

        if by_node.is_empty() {
            return;
        }

        let requests: Vec<DeleteRequest> = by_node
            .into_iter()
            .map(|(node, pieces)| DeleteRequest { node, pieces })
            .collect();

        let collaborator = self.collaborator.clone();
        let success_threshold = self.success_threshold;
        let node_count = requests.len();

        // `tokio::spawn` rather than awaiting inline: detaches this work
        // from the request handler's task, so dropping/cancelling the
        // handler does not cancel the dispatch in flight.
        tokio::spawn(async move {
            match collaborator.delete(&requests, success_threshold).await {
                Ok(()) => info!(nodes = node_count, "piece deletion dispatch completed"),
                Err(err) => warn!(error = %err, nodes = node_count, "piece deletion dispatch failed"),
            }
        });
    }
}
