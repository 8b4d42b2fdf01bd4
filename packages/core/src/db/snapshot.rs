//! Block Snapshot
//!
//! Point-in-time view of the block graph plus workspace views. Builders read
//! it; only [`BlockSnapshot::apply_transaction`] writes it.
//!
//! # Atomicity
//!
//! A transaction is applied to a working copy. The copy replaces the snapshot
//! only when every operation succeeded, so a partially applied transaction is
//! never observable.
//!
//! # Command Semantics
//!
//! | cmd              | empty path                     | non-empty path                         |
//! |------------------|--------------------------------|----------------------------------------|
//! | `set`            | insert/replace the whole record| replace the value at path              |
//! | `update`         | shallow-merge into the record  | merge objects / replace other values   |
//! | `listBefore`     | -                              | insert `args.id` before `args.before`  |
//! | `listAfter`      | -                              | insert `args.id` after `args.after`    |
//! | `listRemove`     | -                              | remove `args.id`                       |
//! | `setPermissions` | -                              | replace `permissions`                  |
//!
//! A list neighbour that is not in the list is ignored: `listBefore` then
//! prepends and `listAfter` appends.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

use super::error::SnapshotError;
use crate::models::{Block, ListPath, Permission, WorkspaceView};
use crate::operations::{Command, Operation, Table, Transaction};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSnapshot {
    #[serde(default)]
    blocks: HashMap<String, Block>,

    #[serde(default)]
    workspace_views: HashMap<String, WorkspaceView>,

    /// Number of transactions applied
    #[serde(default)]
    version: u64,
}

/// Synchronous lookup against a snapshot
pub fn get_block_from_snapshot<'a>(
    id: &str,
    snapshot: &'a BlockSnapshot,
) -> Result<&'a Block, SnapshotError> {
    snapshot
        .get_block(id)
        .ok_or_else(|| SnapshotError::block_not_found(id))
}

impl BlockSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_blocks(blocks: impl IntoIterator<Item = Block>) -> Self {
        let mut snapshot = Self::new();
        for block in blocks {
            snapshot.insert_block(block);
        }
        snapshot
    }

    /// Seed a record directly (loading, tests). Edits go through transactions.
    pub fn insert_block(&mut self, block: Block) {
        self.blocks.insert(block.id.clone(), block);
    }

    pub fn insert_workspace_view(&mut self, view: WorkspaceView) {
        self.workspace_views.insert(view.id.clone(), view);
    }

    pub fn get_block(&self, id: &str) -> Option<&Block> {
        self.blocks.get(id)
    }

    pub fn workspace_view(&self, id: &str) -> Option<&WorkspaceView> {
        self.workspace_views.get(id)
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Live blocks reachable from `root_id` in pre-order.
    ///
    /// Follows `children` then `resources` of every block. Tombstoned and
    /// dangling entries are skipped, and each block is visited once.
    pub fn reachable_blocks(&self, root_id: &str) -> Vec<&Block> {
        let mut visited = HashSet::new();
        let mut reachable = Vec::new();
        let mut stack: Vec<&str> = vec![root_id];

        while let Some(id) = stack.pop() {
            let Some(block) = self.blocks.get(id) else {
                continue;
            };
            if !block.alive || !visited.insert(id) {
                continue;
            }
            reachable.push(block);
            for list in ListPath::BLOCK_LISTS.iter().rev() {
                if let Some(ids) = block.list(*list) {
                    stack.extend(ids.iter().rev().map(String::as_str));
                }
            }
        }
        reachable
    }

    /// Apply every operation of `transaction` in order, all or nothing.
    ///
    /// Returns the new snapshot version.
    pub fn apply_transaction(&mut self, transaction: &Transaction) -> Result<u64, SnapshotError> {
        let mut next = self.clone();
        for operation in &transaction.operations {
            next.apply_operation(operation)?;
        }
        next.version += 1;
        *self = next;
        Ok(self.version)
    }

    fn apply_operation(&mut self, op: &Operation) -> Result<(), SnapshotError> {
        match op.table {
            Table::Block => self.apply_block_operation(op),
            Table::WorkspaceView => self.apply_view_operation(op),
        }
    }

    fn apply_block_operation(&mut self, op: &Operation) -> Result<(), SnapshotError> {
        match op.cmd {
            Command::Set if op.path.is_empty() => {
                let block: Block = decode(op, op.args.clone())?;
                if block.id != op.id {
                    return Err(SnapshotError::malformed_args(
                        op.cmd,
                        &op.id,
                        format!("record id '{}' does not match target", block.id),
                    ));
                }
                self.blocks.insert(block.id.clone(), block);
                Ok(())
            }
            Command::Set | Command::Update => {
                let block = self
                    .blocks
                    .get_mut(&op.id)
                    .ok_or_else(|| SnapshotError::block_not_found(&op.id))?;
                *block = write_record(op, block)?;
                Ok(())
            }
            Command::ListBefore | Command::ListAfter | Command::ListRemove => {
                let block = self
                    .blocks
                    .get_mut(&op.id)
                    .ok_or_else(|| SnapshotError::block_not_found(&op.id))?;
                let list = list_path(op)
                    .and_then(|path| block.list_mut(path))
                    .ok_or_else(|| SnapshotError::invalid_list_path(op.table, &op.id, &op.path))?;
                apply_list_command(op, list)
            }
            Command::SetPermissions => {
                let permissions: Vec<Permission> = decode(op, op.args.clone())?;
                let block = self
                    .blocks
                    .get_mut(&op.id)
                    .ok_or_else(|| SnapshotError::block_not_found(&op.id))?;
                block.permissions = permissions;
                Ok(())
            }
        }
    }

    fn apply_view_operation(&mut self, op: &Operation) -> Result<(), SnapshotError> {
        match op.cmd {
            Command::Set if op.path.is_empty() => {
                let view: WorkspaceView = decode(op, op.args.clone())?;
                self.workspace_views.insert(op.id.clone(), view);
                Ok(())
            }
            Command::Set | Command::Update => {
                let view = self
                    .workspace_views
                    .get_mut(&op.id)
                    .ok_or_else(|| SnapshotError::workspace_view_not_found(&op.id))?;
                *view = write_record(op, view)?;
                Ok(())
            }
            Command::ListBefore | Command::ListAfter | Command::ListRemove => {
                let view = self
                    .workspace_views
                    .get_mut(&op.id)
                    .ok_or_else(|| SnapshotError::workspace_view_not_found(&op.id))?;
                if list_path(op) != Some(ListPath::PinnedList) {
                    return Err(SnapshotError::invalid_list_path(op.table, &op.id, &op.path));
                }
                apply_list_command(op, &mut view.pinned_list)
            }
            Command::SetPermissions => Err(SnapshotError::UnsupportedCommand {
                cmd: op.cmd,
                table: op.table,
            }),
        }
    }
}

fn decode<T: DeserializeOwned>(op: &Operation, value: Value) -> Result<T, SnapshotError> {
    serde_json::from_value(value)
        .map_err(|e| SnapshotError::malformed_args(op.cmd, &op.id, e.to_string()))
}

fn list_path(op: &Operation) -> Option<ListPath> {
    match op.path.as_slice() {
        [name] => ListPath::parse(name),
        _ => None,
    }
}

/// `set` / `update` at `op.path` through the record's JSON form
fn write_record<T>(op: &Operation, record: &T) -> Result<T, SnapshotError>
where
    T: Serialize + DeserializeOwned,
{
    let mut value = serde_json::to_value(record)
        .map_err(|e| SnapshotError::malformed_args(op.cmd, &op.id, e.to_string()))?;

    let merge = op.cmd == Command::Update;
    let mut slot = &mut value;
    for segment in &op.path {
        let fields = slot.as_object_mut().ok_or_else(|| {
            SnapshotError::malformed_args(op.cmd, &op.id, format!("'{segment}' is not inside an object"))
        })?;
        slot = fields
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    match (slot, op.args.clone()) {
        (Value::Object(existing), Value::Object(incoming)) if merge => existing.extend(incoming),
        (slot, incoming) => *slot = incoming,
    }

    if value.get("id").and_then(Value::as_str) != Some(op.id.as_str()) {
        return Err(SnapshotError::malformed_args(op.cmd, &op.id, "record id cannot change"));
    }
    decode(op, value)
}

fn apply_list_command(op: &Operation, list: &mut Vec<String>) -> Result<(), SnapshotError> {
    let item = op
        .list_item()
        .ok_or_else(|| SnapshotError::malformed_args(op.cmd, &op.id, "missing list item id"))?
        .to_string();
    list.retain(|id| *id != item);

    match op.cmd {
        Command::ListBefore => {
            let neighbour = op.args.get("before").and_then(Value::as_str);
            let index = neighbour
                .and_then(|before| list.iter().position(|id| id == before))
                .unwrap_or(0);
            list.insert(index, item);
        }
        Command::ListAfter => {
            let neighbour = op.args.get("after").and_then(Value::as_str);
            let index = neighbour
                .and_then(|after| list.iter().position(|id| id == after))
                .map_or(list.len(), |position| position + 1);
            list.insert(index, item);
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{create_empty_block, BlockType, NewBlock};
    use crate::operations::create_transaction;
    use serde_json::json;

    fn story_with_children(children: &[&str]) -> BlockSnapshot {
        let mut snapshot = BlockSnapshot::new();
        let mut story = create_empty_block(NewBlock::new(BlockType::Story).id("s1").parent_id("ws"));
        story.children = children.iter().map(|id| id.to_string()).collect();
        snapshot.insert_block(story);
        for id in children {
            snapshot.insert_block(create_empty_block(
                NewBlock::new(BlockType::Text).id(*id).story_id("s1"),
            ));
        }
        snapshot
    }

    fn apply(snapshot: &mut BlockSnapshot, ops: Vec<Operation>) -> Result<u64, SnapshotError> {
        snapshot.apply_transaction(&create_transaction(ops))
    }

    #[test]
    fn test_list_before_and_after_with_neighbours() {
        let mut snapshot = story_with_children(&["a", "c"]);

        apply(
            &mut snapshot,
            vec![
                Operation::list_before(Table::Block, "s1", ListPath::Children, "b", Some("c")),
                Operation::list_after(Table::Block, "s1", ListPath::Children, "d", Some("c")),
                Operation::list_before(Table::Block, "s1", ListPath::Children, "z", None),
            ],
        )
        .unwrap();

        assert_eq!(
            snapshot.get_block("s1").unwrap().children,
            vec!["z", "a", "b", "c", "d"]
        );
    }

    #[test]
    fn test_list_insert_moves_existing_item() {
        let mut snapshot = story_with_children(&["a", "b", "c"]);

        apply(
            &mut snapshot,
            vec![Operation::list_after(Table::Block, "s1", ListPath::Children, "a", Some("c"))],
        )
        .unwrap();

        assert_eq!(snapshot.get_block("s1").unwrap().children, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_missing_neighbour_falls_back_to_ends() {
        let mut snapshot = story_with_children(&["a"]);

        apply(
            &mut snapshot,
            vec![
                Operation::list_after(Table::Block, "s1", ListPath::Children, "x", Some("ghost")),
                Operation::list_before(Table::Block, "s1", ListPath::Children, "y", Some("ghost")),
            ],
        )
        .unwrap();

        assert_eq!(snapshot.get_block("s1").unwrap().children, vec!["y", "a", "x"]);
    }

    #[test]
    fn test_failed_operation_leaves_snapshot_untouched() {
        let mut snapshot = story_with_children(&["a"]);
        let before = snapshot.clone();

        let result = apply(
            &mut snapshot,
            vec![
                Operation::tombstone("a"),
                Operation::list_remove(Table::Block, "missing", ListPath::Children, "a"),
            ],
        );

        assert!(matches!(result, Err(SnapshotError::BlockNotFound { .. })));
        assert_eq!(snapshot, before);
        assert!(snapshot.get_block("a").unwrap().alive);
    }

    #[test]
    fn test_update_merges_and_set_replaces() {
        let mut snapshot = story_with_children(&[]);

        apply(
            &mut snapshot,
            vec![
                Operation::update(Table::Block, "s1", vec!["format".into()], json!({"locked": true})),
                Operation::update(Table::Block, "s1", vec!["format".into()], json!({"showBorder": false})),
                Operation::set(Table::Block, "s1", vec!["content".into(), "sql".into()], json!("select 1")),
            ],
        )
        .unwrap();

        let story = snapshot.get_block("s1").unwrap();
        assert_eq!(story.format.get("locked"), Some(&json!(true)));
        assert_eq!(story.format.get("showBorder"), Some(&json!(false)));
        assert_eq!(story.content["sql"], "select 1");
        assert_eq!(snapshot.version(), 1);
    }

    #[test]
    fn test_update_cannot_change_record_id() {
        let mut snapshot = story_with_children(&[]);
        let result = apply(
            &mut snapshot,
            vec![Operation::update(Table::Block, "s1", vec![], json!({"id": "other"}))],
        );
        assert!(matches!(result, Err(SnapshotError::MalformedArgs { .. })));
    }

    #[test]
    fn test_resources_path_and_invalid_path() {
        let mut snapshot = story_with_children(&[]);

        apply(
            &mut snapshot,
            vec![Operation::list_after(Table::Block, "s1", ListPath::Resources, "q1", None)],
        )
        .unwrap();
        assert_eq!(snapshot.get_block("s1").unwrap().resources, vec!["q1"]);

        let result = apply(
            &mut snapshot,
            vec![Operation::list_after(Table::Block, "s1", ListPath::PinnedList, "q1", None)],
        );
        assert!(matches!(result, Err(SnapshotError::InvalidListPath { .. })));
    }

    #[test]
    fn test_workspace_view_pinned_list() {
        let mut snapshot = BlockSnapshot::new();
        snapshot.insert_workspace_view(WorkspaceView::new("v1", "ws"));

        apply(
            &mut snapshot,
            vec![
                Operation::list_before(Table::WorkspaceView, "v1", ListPath::PinnedList, "s1", None),
                Operation::list_before(Table::WorkspaceView, "v1", ListPath::PinnedList, "s2", None),
                Operation::list_remove(Table::WorkspaceView, "v1", ListPath::PinnedList, "s1"),
            ],
        )
        .unwrap();

        assert_eq!(snapshot.workspace_view("v1").unwrap().pinned_list, vec!["s2"]);
    }

    #[test]
    fn test_reachable_blocks_preorder_skips_tombstones() {
        let mut snapshot = story_with_children(&["a", "b"]);
        let mut dead = create_empty_block(NewBlock::new(BlockType::Text).id("dead").story_id("s1"));
        dead.alive = false;
        snapshot.insert_block(dead);
        snapshot.insert_block(create_empty_block(NewBlock::new(BlockType::Sql).id("q").story_id("s1")));

        apply(
            &mut snapshot,
            vec![
                Operation::list_after(Table::Block, "a", ListPath::Children, "dead", None),
                Operation::list_after(Table::Block, "s1", ListPath::Resources, "q", None),
            ],
        )
        .unwrap();

        let ids: Vec<&str> = snapshot
            .reachable_blocks("s1")
            .iter()
            .map(|block| block.id.as_str())
            .collect();
        assert_eq!(ids, vec!["s1", "a", "b", "q"]);
    }
}
