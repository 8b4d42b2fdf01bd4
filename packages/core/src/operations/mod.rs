//! Primitive Operations
//!
//! Every mutation of the block graph is expressed as an [`Operation`]:
//! `{ cmd, table, id, path, args }`. Operations are grouped into a
//! [`Transaction`] and handed to the commit dispatcher, which applies them in
//! order as one unit.
//!
//! # List Commands
//!
//! `listBefore` / `listAfter` take `args = { "id": <item>, "before" | "after": <neighbour> }`.
//! Without a neighbour, `listBefore` prepends and `listAfter` appends. An item
//! already present in the list is moved rather than duplicated.
//!
//! # Modules
//!
//! - [`builders`] - Intent → operation list (insert, move, remove, duplicate, ...)
//! - [`transaction`] - Transaction assembly and deferred requests

pub mod builders;
mod error;
pub mod transaction;

pub use builders::{
    create_story_operations, create_thought_transaction, duplicate_story_transaction,
    import_query_operation, insert_blocks_and_move_operations, move_blocks_transaction,
    pin_story_operation, remove_blocks_operations, story_format_operation, unpin_story_operation,
    DuplicateStory, MoveBlocks,
};
pub use error::OperationError;
pub use transaction::{create_transaction, Transaction, TransactionRequest};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::models::{Block, ListPath, Permission};

/// Primitive command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Command {
    /// Replace the record (empty path) or the value at `path`
    Set,
    /// Merge objects into the record (empty path) or the value at `path`
    Update,
    ListBefore,
    ListAfter,
    ListRemove,
    SetPermissions,
}

/// Entity collection an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Table {
    Block,
    WorkspaceView,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub cmd: Command,
    pub table: Table,
    pub id: String,
    #[serde(default)]
    pub path: Vec<String>,
    #[serde(default)]
    pub args: Value,
}

impl Operation {
    /// `set` of a whole block record
    pub fn set_block(block: &Block) -> Result<Self, OperationError> {
        Ok(Self {
            cmd: Command::Set,
            table: Table::Block,
            id: block.id.clone(),
            path: Vec::new(),
            args: serde_json::to_value(block)?,
        })
    }

    pub fn set(table: Table, id: impl Into<String>, path: Vec<String>, args: Value) -> Self {
        Self {
            cmd: Command::Set,
            table,
            id: id.into(),
            path,
            args,
        }
    }

    pub fn update(table: Table, id: impl Into<String>, path: Vec<String>, args: Value) -> Self {
        Self {
            cmd: Command::Update,
            table,
            id: id.into(),
            path,
            args,
        }
    }

    pub fn list_before(
        table: Table,
        id: impl Into<String>,
        list: ListPath,
        item_id: &str,
        before: Option<&str>,
    ) -> Self {
        let mut args = json!({ "id": item_id });
        if let Some(before) = before {
            args["before"] = json!(before);
        }
        Self {
            cmd: Command::ListBefore,
            table,
            id: id.into(),
            path: vec![list.as_str().to_string()],
            args,
        }
    }

    pub fn list_after(
        table: Table,
        id: impl Into<String>,
        list: ListPath,
        item_id: &str,
        after: Option<&str>,
    ) -> Self {
        let mut args = json!({ "id": item_id });
        if let Some(after) = after {
            args["after"] = json!(after);
        }
        Self {
            cmd: Command::ListAfter,
            table,
            id: id.into(),
            path: vec![list.as_str().to_string()],
            args,
        }
    }

    pub fn list_remove(table: Table, id: impl Into<String>, list: ListPath, item_id: &str) -> Self {
        Self {
            cmd: Command::ListRemove,
            table,
            id: id.into(),
            path: vec![list.as_str().to_string()],
            args: json!({ "id": item_id }),
        }
    }

    pub fn set_permissions(
        block_id: impl Into<String>,
        permissions: &[Permission],
    ) -> Result<Self, OperationError> {
        Ok(Self {
            cmd: Command::SetPermissions,
            table: Table::Block,
            id: block_id.into(),
            path: vec!["permissions".to_string()],
            args: serde_json::to_value(permissions)?,
        })
    }

    /// `update .alive = false`
    pub fn tombstone(block_id: impl Into<String>) -> Self {
        Self::update(
            Table::Block,
            block_id,
            vec!["alive".to_string()],
            Value::Bool(false),
        )
    }

    /// Item id carried by a list command
    pub fn list_item(&self) -> Option<&str> {
        match self.cmd {
            Command::ListBefore | Command::ListAfter | Command::ListRemove => {
                self.args.get("id").and_then(Value::as_str)
            }
            _ => None,
        }
    }
}

/// Where a fragment lands relative to its target block
///
/// `Child` inserts into the target's own list. The other four place the
/// fragment as siblings of the target: `Top`/`Left` before it,
/// `Bottom`/`Right` after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    Top,
    Bottom,
    Left,
    Right,
    Child,
}

/// New or moved blocks plus their intended order, not yet attached to a parent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockFragment {
    pub children: Vec<String>,
    pub data: HashMap<String, Block>,
}

impl BlockFragment {
    /// Fragment keeping `blocks` in the given order
    pub fn from_blocks(blocks: impl IntoIterator<Item = Block>) -> Self {
        let mut fragment = Self::default();
        for block in blocks {
            fragment.children.push(block.id.clone());
            fragment.data.insert(block.id.clone(), block);
        }
        fragment
    }

    /// Blocks in fragment order
    pub fn ordered_blocks(&self) -> Result<Vec<&Block>, OperationError> {
        self.children
            .iter()
            .map(|id| {
                self.data
                    .get(id)
                    .ok_or_else(|| OperationError::fragment_block_missing(id.clone()))
            })
            .collect()
    }
}
