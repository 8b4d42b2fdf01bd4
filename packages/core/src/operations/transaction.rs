//! Transaction assembly
//!
//! A [`Transaction`] is an ordered operation batch with a generated id. The id
//! only serves to correlate the commit with its acknowledgement.
//!
//! Actions that depend on tree state submit a [`TransactionRequest::Deferred`]
//! instead: a closure evaluated once, against the snapshot current at commit
//! time rather than the one current when the action was created.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Operation, OperationError};
use crate::db::BlockSnapshot;
use crate::models::block_id_generator;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub operations: Vec<Operation>,
    /// Set on the direct-persist path (workspace view edits)
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
}

impl Transaction {
    pub fn with_workspace(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Wrap `operations` into a transaction with a fresh id
pub fn create_transaction(operations: Vec<Operation>) -> Transaction {
    Transaction {
        id: block_id_generator(),
        operations,
        workspace_id: None,
    }
}

type DeferredBuilder =
    Box<dyn FnOnce(&BlockSnapshot) -> Result<Transaction, OperationError> + Send + 'static>;

/// What a caller hands to the commit dispatcher
pub enum TransactionRequest {
    /// Operations computed up front
    Ready(Transaction),
    /// Operations computed from the snapshot at dispatch
    Deferred(DeferredBuilder),
}

impl TransactionRequest {
    pub fn deferred<F>(builder: F) -> Self
    where
        F: FnOnce(&BlockSnapshot) -> Result<Transaction, OperationError> + Send + 'static,
    {
        Self::Deferred(Box::new(builder))
    }

    /// Produce the transaction. Consumes the request so a deferred builder runs once.
    pub fn resolve(self, snapshot: &BlockSnapshot) -> Result<Transaction, OperationError> {
        match self {
            TransactionRequest::Ready(transaction) => Ok(transaction),
            TransactionRequest::Deferred(builder) => builder(snapshot),
        }
    }
}

impl From<Transaction> for TransactionRequest {
    fn from(transaction: Transaction) -> Self {
        TransactionRequest::Ready(transaction)
    }
}

impl fmt::Debug for TransactionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionRequest::Ready(transaction) => {
                f.debug_tuple("Ready").field(transaction).finish()
            }
            TransactionRequest::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{create_empty_block, BlockType, NewBlock};
    use crate::operations::Table;
    use serde_json::json;

    #[test]
    fn test_create_transaction_generates_distinct_ids() {
        let a = create_transaction(vec![]);
        let b = create_transaction(vec![]);
        assert_ne!(a.id, b.id);
        assert!(a.is_empty());
        assert_eq!(a.workspace_id, None);
    }

    #[test]
    fn test_deferred_request_sees_snapshot_at_resolution() {
        let mut snapshot = BlockSnapshot::new();
        let request = TransactionRequest::deferred(|snapshot: &BlockSnapshot| {
            let ops = snapshot
                .blocks()
                .map(|block| Operation::tombstone(block.id.clone()))
                .collect();
            Ok(create_transaction(ops))
        });

        // inserted after the request was built
        snapshot.insert_block(create_empty_block(NewBlock::new(BlockType::Story).id("s1")));

        let transaction = request.resolve(&snapshot).unwrap();
        assert_eq!(transaction.operations, vec![Operation::tombstone("s1")]);
    }

    #[test]
    fn test_workspace_transaction_serializes_workspace_id() {
        let transaction = create_transaction(vec![Operation::update(
            Table::WorkspaceView,
            "v1",
            vec![],
            json!({}),
        )])
        .with_workspace("ws-1");

        let value = serde_json::to_value(&transaction).unwrap();
        assert_eq!(value["workspaceId"], "ws-1");
    }
}
