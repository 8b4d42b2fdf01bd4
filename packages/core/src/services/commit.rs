//! Commit Collaborators
//!
//! The facade talks to the rest of the application through three traits:
//!
//! - [`BlockSource`]: async block lookup
//! - [`CommitDispatcher`]: optimistic apply plus asynchronous persistence
//! - [`TransactionPersister`]: backend write path (`saveTransactions`)
//!
//! # Design Decisions
//!
//! 1. **Async-First**: lookups and persistence may cross the network
//! 2. **Error Handling**: collaborator-defined failures use `anyhow::Result`;
//!    the dispatcher reports [`TransactionError`] since callers branch on it
//! 3. **Ownership**: requests and transactions are taken by value
//!
//! # Examples
//!
//! ```rust,no_run
//! use blockdoc_core::operations::{create_transaction, Operation};
//! use blockdoc_core::services::{CommitDispatcher, CommitRequest};
//!
//! # async fn example(dispatcher: &dyn CommitDispatcher) -> anyhow::Result<()> {
//! let request = CommitRequest::new(create_transaction(vec![Operation::tombstone("b1")]))
//!     .story("s1");
//! let handle = dispatcher.commit(request).await?;
//! dispatcher.wait_for_transaction_applied(&handle.transaction_id).await?;
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use async_trait::async_trait;

use super::error::TransactionError;
use crate::models::Block;
use crate::operations::{Transaction, TransactionRequest};

/// Async block lookup
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// `Ok(None)` when no block has this id
    async fn get_block(&self, id: &str) -> Result<Option<Block>>;
}

/// Backend write path
#[async_trait]
pub trait TransactionPersister: Send + Sync {
    /// Store `transactions` in order. All or nothing.
    async fn save_transactions(&self, transactions: Vec<Transaction>) -> Result<()>;
}

#[async_trait]
pub trait CommitDispatcher: Send + Sync {
    /// Apply locally and schedule persistence.
    ///
    /// Returns once the local apply happened. Use
    /// [`wait_for_transaction_applied`](Self::wait_for_transaction_applied)
    /// for durability.
    async fn commit(&self, request: CommitRequest) -> Result<CommitHandle, TransactionError>;

    /// Resolves once the transaction was persisted
    async fn wait_for_transaction_applied(&self, transaction_id: &str) -> Result<(), TransactionError>;
}

/// One commit: the transaction plus rendering hints
#[derive(Debug)]
pub struct CommitRequest {
    pub transaction: TransactionRequest,
    /// Story to re-render once applied
    pub story_id: Option<String>,
    pub should_reformat: bool,
}

impl CommitRequest {
    pub fn new(transaction: impl Into<TransactionRequest>) -> Self {
        Self {
            transaction: transaction.into(),
            story_id: None,
            should_reformat: true,
        }
    }

    pub fn story(mut self, story_id: impl Into<String>) -> Self {
        self.story_id = Some(story_id.into());
        self
    }

    pub fn should_reformat(mut self, should_reformat: bool) -> Self {
        self.should_reformat = should_reformat;
        self
    }
}

/// What a commit hands back: enough to await its acknowledgement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitHandle {
    pub transaction_id: String,
    pub story_id: Option<String>,
}
