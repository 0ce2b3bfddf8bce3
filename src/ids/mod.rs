//! Identifiers & Codec (spec.md §4.1, C1).

mod position;
pub mod token;
mod uuid_ext;

pub use position::SegmentPosition;
pub use token::{SegmentToken, SigningKey, StreamToken};
pub use uuid_ext::{PieceId, ProjectId, StorageNodeId, StreamId};
