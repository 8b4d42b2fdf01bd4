//! Snapshot Layer
//!
//! In-memory state of the block graph that builders read and the commit
//! dispatcher writes:
//!
//! - [`BlockSnapshot`]: blocks and workspace views, with atomic transaction apply
//! - [`CommitEvent`]: pipeline notifications broadcast to subscribers
//!
//! Persistence lives behind the `TransactionPersister` trait in `services`;
//! nothing in this module performs I/O.

mod error;
pub mod events;
mod snapshot;

pub use error::SnapshotError;
pub use events::CommitEvent;
pub use snapshot::{get_block_from_snapshot, BlockSnapshot};
