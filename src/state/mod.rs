//! Snapshot management module for the Strato topology compiler.
//!
//! This module provides persistent snapshot storage for tracking applied
//! resources, including provider IDs, symbolic attributes, emergent outputs,
//! and apply history.

mod store;
mod local;
mod s3;
mod lock;
mod types;

pub use store::SnapshotStore;
pub use local::LocalSnapshotStore;
pub use s3::S3SnapshotStore;
pub use lock::{LockInfo, generate_holder_id};
pub use types::{
    AppliedSnapshot, ApplyHistoryEntry, ApplyOperation, NodeRecord, STATE_VERSION,
};
