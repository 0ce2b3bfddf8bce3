//! UUID-backed identifiers for streams, projects, storage nodes and pieces.
//!
//! All of these preserve the byte order of the underlying 128-bit value, as
//! spec.md §4.1 requires, by wrapping `uuid::Uuid` rather than a generic
//! byte vector.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Uuid::from_bytes(bytes))
            }

            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_newtype!(StreamId);
uuid_newtype!(ProjectId);
uuid_newtype!(StorageNodeId);

/// A single erasure-coded share's identifier on a storage node.
///
/// Derived deterministically from the segment's `RootPieceId`, the storage
/// node it is stored on, and the piece number within the segment, via a
/// keyed digest (`derive(node, number)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PieceId(pub [u8; 32]);

impl PieceId {
    pub fn new() -> Self {
        let mut hasher = Sha256::new();
        hasher.update(Uuid::new_v4().as_bytes());
        Self(hasher.finalize().into())
    }

    /// The root piece id recorded on a segment; pieces actually stored on
    /// nodes are derived from it with [`PieceId::derive`].
    pub fn derive(&self, node: StorageNodeId, piece_number: u16) -> PieceId {
        let mut hasher = Sha256::new();
        hasher.update(self.0);
        hasher.update(node.as_bytes());
        hasher.update(piece_number.to_le_bytes());
        PieceId(hasher.finalize().into())
    }
}

impl Default for PieceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PieceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}
