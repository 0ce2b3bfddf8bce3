//! # metabase — object metadata service for an erasure-coded object store
//!
//! `metabase` is the metadata-only core of a distributed object store:
//! clients coordinate uploads and downloads with it, but piece data moves
//! directly between clients and storage nodes. This crate covers the hard
//! part of that coordination:
//!
//! - The **object lifecycle** state machine (pending -> committed,
//!   versioning) and its multi-step upload protocol, secured by signed
//!   session tokens instead of server-held per-upload state.
//! - The **server-side copy engine**, which clones object/segment metadata
//!   transactionally, sharing physical piece storage through a one-level
//!   ancestor indirection graph.
//! - The **piece-deletion fan-out**, which groups deletes by storage node
//!   and dispatches them best-effort, detached from client cancellation.
//!
//! ## Quick start
//!
//! ```rust
//! use metabase::collab::testing::*;
//! use metabase::config::Config;
//! use metabase::ids::ProjectId;
//! use metabase::service::{Collaborators, MetabaseService};
//! use std::sync::Arc;
//!
//! # async fn run() -> metabase::error::Result<()> {
//! let project_id = ProjectId::new();
//! let service = MetabaseService::new(
//!     Config::for_tests(),
//!     Collaborators {
//!         auth: Arc::new(AlwaysAllowAuth::new(project_id)),
//!         overlay: Arc::new(InMemoryOverlay),
//!         orders: Arc::new(InMemoryOrders::default()),
//!         piece_deletion: Arc::new(AlwaysSucceedsPieceDeletion::default()),
//!         project_usage: Arc::new(InMemoryProjectUsage::default()),
//!     },
//! );
//! # let _ = service;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **Identifiers & Codec** (`ids`): UUID-backed identifiers, segment
//!   position encoding, signed session tokens.
//! - **Metabase Store** (`store`): in-process transactional tables standing
//!   in for the relational driver, which is out of scope for this crate.
//! - **Object & Segment Lifecycle** (`lifecycle`): the upload protocol.
//! - **Copy Engine** (`copy`): server-side object copy.
//! - **Piece-Deletion Dispatcher** (`deletion`): best-effort fan-out delete.
//! - **Collaborators** (`collab`): trait boundaries for everything this
//!   crate treats as external (auth, overlay, orders, usage accounting).
//! - **Service façade** (`service`): the RPC-surface-shaped entry point a
//!   transport layer would sit in front of.

pub mod collab;
pub mod config;
pub mod copy;
pub mod deletion;
pub mod error;
pub mod ids;
pub mod lifecycle;
pub mod metrics;
pub mod model;
pub mod service;
pub mod store;

pub use crate::config::Config;
pub use crate::error::{ApiError, Result};
pub use crate::service::{Collaborators, MetabaseService};
pub use crate::store::MetabaseStore;
