//! Data Models
//!
//! This module contains the records the transaction layer reads and writes:
//!
//! - `Block` - Document tree node (stories, queries, visualizations, ...)
//! - `Permission` - Sharing records and the list utilities over them
//! - `WorkspaceView` - Per-user workspace state (pinned stories)
//!
//! New blocks are only ever minted by the block factory.

mod block;
mod block_factory;
mod permission;

pub use block::{Block, BlockType, ListPath, ParentTable, WorkspaceView};
pub use block_factory::{block_id_generator, create_empty_block, visualization_from_source, NewBlock};
pub use permission::{
    is_private, is_read_only, remove_permission, upsert_permission, workspace_access_permissions,
    Permission, PermissionRole, PermissionType,
};
