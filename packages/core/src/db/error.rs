//! Snapshot Error Types
//!
//! Errors raised while reading from or applying operations to a
//! [`BlockSnapshot`](super::BlockSnapshot). Any error while applying a
//! transaction leaves the snapshot untouched.

use thiserror::Error;

use crate::operations::{Command, Table};

#[derive(Error, Debug)]
pub enum SnapshotError {
    /// Block not found by ID
    #[error("Block not found: {id}")]
    BlockNotFound { id: String },

    /// Workspace view not found by ID
    #[error("Workspace view not found: {id}")]
    WorkspaceViewNotFound { id: String },

    /// Path does not address a list the record carries
    #[error("Invalid list path {path:?} for {table:?} '{id}'")]
    InvalidListPath {
        table: Table,
        id: String,
        path: Vec<String>,
    },

    /// Arguments do not match what the command expects
    #[error("Malformed {cmd:?} arguments for '{id}': {reason}")]
    MalformedArgs {
        cmd: Command,
        id: String,
        reason: String,
    },

    /// Command is not supported on this table
    #[error("Command {cmd:?} is not supported on {table:?}")]
    UnsupportedCommand { cmd: Command, table: Table },
}

impl SnapshotError {
    pub fn block_not_found(id: impl Into<String>) -> Self {
        Self::BlockNotFound { id: id.into() }
    }

    pub fn workspace_view_not_found(id: impl Into<String>) -> Self {
        Self::WorkspaceViewNotFound { id: id.into() }
    }

    pub fn invalid_list_path(table: Table, id: impl Into<String>, path: &[String]) -> Self {
        Self::InvalidListPath {
            table,
            id: id.into(),
            path: path.to_vec(),
        }
    }

    pub fn malformed_args(cmd: Command, id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedArgs {
            cmd,
            id: id.into(),
            reason: reason.into(),
        }
    }
}
