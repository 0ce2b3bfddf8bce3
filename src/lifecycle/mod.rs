//! Object & Segment Lifecycle (spec.md §4.3–§4.4, C3/C4): the multi-step
//! upload protocol built on top of the Metabase Store and the signed
//! session tokens from [`crate::ids::token`].

pub mod object;
pub mod segment;

pub use object::{BeginObjectResult, ObjectLifecycle};
pub use segment::{DownloadSegmentResult, SegmentLifecycle};
