//! Business Services
//!
//! This module contains the transaction services:
//!
//! - `BlockTransactions` - Public action surface (insert, move, remove, duplicate, ...)
//! - `LocalCommitDispatcher` - Optimistic local apply with background persistence
//! - `BlockSource` / `CommitDispatcher` / `TransactionPersister` - Collaborator seams
//!
//! Services sit between the UI layer and the operation builders. They resolve
//! lookups, assemble transactions and dispatch them.

pub mod block_transactions;
pub mod commit;
pub mod error;
pub mod local_commit;

pub use block_transactions::{BlockTransactions, FacadeContext, InsertBlocks};
pub use commit::{BlockSource, CommitDispatcher, CommitHandle, CommitRequest, TransactionPersister};
pub use error::TransactionError;
pub use local_commit::LocalCommitDispatcher;
