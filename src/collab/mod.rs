//! Collaborator contracts (spec.md §6) — everything this crate treats as an
//! external boundary: authentication, the storage-node overlay, per-piece
//! order limits, piece deletion, and project usage accounting. None of
//! these are implemented for real here; each trait ships one in-memory test
//! double to stand in for its external seam.

use async_trait::async_trait;

use crate::error::Result;
use crate::ids::{PieceId, ProjectId, StorageNodeId};

/// Capability-token verification (spec.md §6: "Authorize(ctx, header,
/// action) -> keyInfo | error").
#[async_trait]
pub trait Auth: Send + Sync {
    async fn authorize(&self, header: &str, action: &str) -> Result<ProjectId>;
}

/// The storage-node selector (spec.md §6: "FindUploadNodes" / "NodeAddress").
#[async_trait]
pub trait Overlay: Send + Sync {
    async fn find_upload_nodes(&self, count: u16) -> Result<Vec<StorageNodeId>>;
    async fn node_address(&self, ids: &[StorageNodeId]) -> Result<Vec<String>>;
}

/// Per-piece authorization limits (spec.md §6: "CreatePutOrderLimits /
/// CreateGetOrderLimits / UpdateBandwidth / UpdateInlineOrder").
#[async_trait]
pub trait Orders: Send + Sync {
    async fn create_put_order_limits(&self, nodes: &[StorageNodeId]) -> Result<Vec<Vec<u8>>>;
    async fn create_get_order_limits(&self, nodes: &[StorageNodeId]) -> Result<Vec<Vec<u8>>>;
    async fn update_bandwidth(&self, project_id: ProjectId, amount: i64) -> Result<()>;
    async fn update_inline_order(&self, project_id: ProjectId, amount: i64) -> Result<()>;
}

/// One storage node's share of a piece-deletion request (spec.md §4.6).
#[derive(Debug, Clone)]
pub struct DeleteRequest {
    pub node: StorageNodeId,
    pub pieces: Vec<PieceId>,
}

/// Fan-out piece deletion (spec.md §6: "Delete(ctx, []Request,
/// successThreshold)").
#[async_trait]
pub trait PieceDeletion: Send + Sync {
    async fn delete(&self, requests: &[DeleteRequest], success_threshold: f64) -> Result<()>;
}

/// Project storage/bandwidth quota accounting (spec.md §6).
#[async_trait]
pub trait ProjectUsage: Send + Sync {
    async fn exceeds_storage_usage(&self, project_id: ProjectId, additional: i64) -> Result<bool>;
    async fn exceeds_bandwidth_usage(&self, project_id: ProjectId, additional: i64)
        -> Result<bool>;
    async fn add_project_storage_usage(&self, project_id: ProjectId, amount: i64) -> Result<()>;
    async fn update_project_bandwidth_usage(
        &self,
        project_id: ProjectId,
        amount: i64,
    ) -> Result<()>;
}

pub mod testing {
    //! In-memory collaborator doubles used by the integration tests and the
    //! admin CLI's `demo` command.

    use std::collections::HashSet;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;

    /// Accepts every request and attributes it to a single fixed project.
    pub struct AlwaysAllowAuth {
        pub project_id: ProjectId,
    }

    impl AlwaysAllowAuth {
        pub fn new(project_id: ProjectId) -> Self {
            Self { project_id }
        }
    }

    #[async_trait]
    impl Auth for AlwaysAllowAuth {
        async fn authorize(&self, _header: &str, _action: &str) -> Result<ProjectId> {
            Ok(self.project_id)
        }
    }

    /// Hands out freshly generated storage-node ids and loopback addresses.
    #[derive(Default)]
    pub struct InMemoryOverlay;

    #[async_trait]
    impl Overlay for InMemoryOverlay {
        async fn find_upload_nodes(&self, count: u16) -> Result<Vec<StorageNodeId>> {
            Ok((0..count).map(|_| StorageNodeId::new()).collect())
        }

        async fn node_address(&self, ids: &[StorageNodeId]) -> Result<Vec<String>> {
            Ok(ids.iter().map(|id| format!("node-{id}.test:7777")).collect())
        }
    }

    /// Returns opaque placeholder limits; tracks cumulative bandwidth for
    /// assertions in tests.
    #[derive(Default)]
    pub struct InMemoryOrders {
        pub bandwidth_used: Mutex<i64>,
    }

    #[async_trait]
    impl Orders for InMemoryOrders {
        async fn create_put_order_limits(&self, nodes: &[StorageNodeId]) -> Result<Vec<Vec<u8>>> {
            Ok(nodes.iter().map(|id| id.as_bytes().to_vec()).collect())
        }

        async fn create_get_order_limits(&self, nodes: &[StorageNodeId]) -> Result<Vec<Vec<u8>>> {
            self.create_put_order_limits(nodes).await
        }

        async fn update_bandwidth(&self, _project_id: ProjectId, amount: i64) -> Result<()> {
            *self.bandwidth_used.lock() += amount;
            Ok(())
        }

        async fn update_inline_order(&self, _project_id: ProjectId, amount: i64) -> Result<()> {
            *self.bandwidth_used.lock() += amount;
            Ok(())
        }
    }

    /// Always succeeds; records every node it was asked to delete from, for
    /// assertions about fan-out grouping in tests.
    #[derive(Default)]
    pub struct AlwaysSucceedsPieceDeletion {
        pub contacted_nodes: Mutex<HashSet<StorageNodeId>>,
    }

    #[async_trait]
    impl PieceDeletion for AlwaysSucceedsPieceDeletion {
        async fn delete(&self, requests: &[DeleteRequest], _success_threshold: f64) -> Result<()> {
            let mut contacted = self.contacted_nodes.lock();
            for request in requests {
                contacted.insert(request.node);
            }
            Ok(())
        }
    }

    /// Never reports quota exhaustion; tracks storage/bandwidth totals.
    #[derive(Default)]
    pub struct InMemoryProjectUsage {
        pub storage: Mutex<i64>,
        pub bandwidth: Mutex<i64>,
    }

    #[async_trait]
    impl ProjectUsage for InMemoryProjectUsage {
        async fn exceeds_storage_usage(&self, _project_id: ProjectId, _additional: i64) -> Result<bool> {
            Ok(false)
        }

        async fn exceeds_bandwidth_usage(
            &self,
            _project_id: ProjectId,
            _additional: i64,
        ) -> Result<bool> {
            Ok(false)
        }

        async fn add_project_storage_usage(&self, _project_id: ProjectId, amount: i64) -> Result<()> {
            *self.storage.lock() += amount;
            Ok(())
        }

        async fn update_project_bandwidth_usage(
            &self,
            _project_id: ProjectId,
            amount: i64,
        ) -> Result<()> {
            *self.bandwidth.lock() += amount;
            Ok(())
        }
    }
}
