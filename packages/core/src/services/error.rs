//! Service Layer Error Types
//!
//! Errors surfaced by the block transaction facade and the commit dispatcher.
//! A builder failure means nothing was dispatched.

use crate::operations::OperationError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransactionError {
    /// Block not found by ID
    #[error("Block not found: {id}")]
    BlockNotFound { id: String },

    /// The block source itself failed
    #[error("Block lookup failed: {0}")]
    LookupFailed(String),

    /// Operations could not be built
    #[error("Failed to build operations: {0}")]
    Build(#[from] OperationError),

    /// Applying the transaction to the snapshot failed; nothing was applied
    #[error("Transaction {transaction_id} rejected: {reason}")]
    Rejected {
        transaction_id: String,
        reason: String,
    },

    /// Persistence gave up after its retries
    #[error("Transaction {transaction_id} could not be persisted: {reason}")]
    PersistenceFailed {
        transaction_id: String,
        reason: String,
    },

    /// No acknowledgement within the configured timeout
    #[error("Timed out after {timeout_ms}ms waiting for transaction {transaction_id}")]
    AckTimeout {
        transaction_id: String,
        timeout_ms: u64,
    },

    /// The dispatcher never saw this transaction id
    #[error("Unknown transaction: {transaction_id}")]
    UnknownTransaction { transaction_id: String },

    /// A duplicate of this story is already being committed
    #[error("Story {story_id} is already being duplicated")]
    DuplicateInFlight { story_id: String },

    /// Commit configuration failed validation
    #[error("Invalid commit config: {0}")]
    InvalidConfig(String),

    /// Session context is incomplete
    #[error("Invalid facade context: {0}")]
    InvalidContext(String),

    /// Background worker or event channel is gone
    #[error("Channel closed: {0}")]
    ChannelClosed(String),
}

impl TransactionError {
    pub fn block_not_found(id: impl Into<String>) -> Self {
        Self::BlockNotFound { id: id.into() }
    }

    pub fn lookup_failed(err: anyhow::Error) -> Self {
        Self::LookupFailed(format!("{:#}", err))
    }

    pub fn rejected(transaction_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            transaction_id: transaction_id.into(),
            reason: reason.into(),
        }
    }

    pub fn persistence_failed(transaction_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PersistenceFailed {
            transaction_id: transaction_id.into(),
            reason: reason.into(),
        }
    }

    pub fn ack_timeout(transaction_id: impl Into<String>, timeout_ms: u64) -> Self {
        Self::AckTimeout {
            transaction_id: transaction_id.into(),
            timeout_ms,
        }
    }

    pub fn unknown_transaction(transaction_id: impl Into<String>) -> Self {
        Self::UnknownTransaction {
            transaction_id: transaction_id.into(),
        }
    }

    pub fn duplicate_in_flight(story_id: impl Into<String>) -> Self {
        Self::DuplicateInFlight {
            story_id: story_id.into(),
        }
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn invalid_context(msg: impl Into<String>) -> Self {
        Self::InvalidContext(msg.into())
    }

    pub fn channel_closed(msg: impl Into<String>) -> Self {
        Self::ChannelClosed(msg.into())
    }
}
