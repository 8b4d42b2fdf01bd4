//! Error types for the operation builders
//!
//! Builders are pure: an error means no operation list was produced, so
//! nothing was dispatched.

use thiserror::Error;

use crate::db::SnapshotError;

/// Errors that can occur while computing an operation list
#[derive(Error, Debug)]
pub enum OperationError {
    /// A lookup against the snapshot failed
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// The fragment lists an id it carries no data for
    #[error("Fragment lists block '{block_id}' but carries no data for it")]
    FragmentBlockMissing { block_id: String },

    /// Sibling placement needs a parent block, but the target is a document root
    #[error("Block '{target_id}' has no parent block to insert siblings into")]
    TargetIsRoot { target_id: String },

    /// A block would become its own ancestor
    ///
    /// Raised when moving a block next to or into itself or one of its descendants.
    #[error("Cannot move block '{block_id}' relative to '{target_id}': circular reference")]
    CircularMove { block_id: String, target_id: String },

    /// Block record could not be encoded as operation arguments
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl OperationError {
    pub fn fragment_block_missing(block_id: impl Into<String>) -> Self {
        Self::FragmentBlockMissing {
            block_id: block_id.into(),
        }
    }

    pub fn target_is_root(target_id: impl Into<String>) -> Self {
        Self::TargetIsRoot {
            target_id: target_id.into(),
        }
    }

    pub fn circular_move(block_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self::CircularMove {
            block_id: block_id.into(),
            target_id: target_id.into(),
        }
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }
}

impl From<serde_json::Error> for OperationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
