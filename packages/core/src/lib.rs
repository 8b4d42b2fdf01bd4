//! Blockdoc Core Transaction Layer
//!
//! This crate turns editing intents on a notebook's block tree ("insert these
//! blocks here", "move this subtree", "duplicate this story", "change these
//! permissions") into ordered operation batches, applies them to a local
//! snapshot and hands them to a persistence backend.
//!
//! # Architecture
//!
//! - **Operations, not mutations**: every edit is a list of primitive
//!   operations (`set`, `update`, `listBefore`, `listAfter`, `listRemove`,
//!   `setPermissions`) grouped into an atomic transaction
//! - **Pure builders**: builders read the snapshot and return operations; only
//!   the dispatcher writes
//! - **Optimistic commit**: transactions apply locally first and persist in the
//!   background with retries
//! - **Logical deletion**: removed blocks are tombstoned (`alive = false`)
//!
//! # Modules
//!
//! - [`models`] - Blocks, permissions, workspace views and the block factory
//! - [`operations`] - Operation types, builders and transaction assembly
//! - [`db`] - In-memory snapshot and commit events
//! - [`services`] - Commit dispatcher and the block transaction facade
//! - [`config`] - Commit pipeline configuration

pub mod config;
pub mod db;
pub mod models;
pub mod operations;
pub mod services;

// Re-export commonly used types
pub use config::CommitConfig;
pub use db::{BlockSnapshot, CommitEvent};
pub use models::*;
pub use operations::{Operation, Transaction, TransactionRequest};
pub use services::*;
