//! Operation Builders
//!
//! One builder per edit intent. Builders are pure: they read their arguments
//! (and the snapshot, when one is passed) and return operations. They never
//! write to the snapshot.
//!
//! # Ordering Rules
//!
//! - A block's `set` precedes the list insertion that makes it reachable.
//! - A moved block is removed from its old list before it is inserted in the new one.
//! - Fragment order is preserved at the destination:
//!   - `Child`: each block is appended to the target's list
//!   - `Top` / `Left`: each block goes directly before the target
//!   - `Bottom` / `Right`: the first block goes after the target, each next one
//!     after its predecessor

use serde_json::{json, Value};
use std::collections::HashMap;

use super::{
    create_transaction, BlockFragment, Direction, Operation, OperationError, Table, Transaction,
};
use crate::db::{get_block_from_snapshot, BlockSnapshot};
use crate::models::{
    block_id_generator, create_empty_block, Block, BlockType, ListPath, NewBlock, ParentTable,
    Permission, PermissionRole,
};

/// Content keys holding a reference to another block of the same story
const CONTENT_REFERENCE_KEYS: [&str; 2] = ["queryId", "fromDataAssetId"];

/// Parent and list a fragment lands in
fn destination(
    target: &Block,
    direction: Direction,
    path: ListPath,
) -> Result<(String, ListPath), OperationError> {
    match direction {
        Direction::Child => Ok((target.id.clone(), path)),
        _ if target.parent_table == ParentTable::Workspace => {
            Err(OperationError::target_is_root(target.id.clone()))
        }
        _ => Ok((target.parent_id.clone(), path)),
    }
}

/// List insertions placing `ids` at `direction` of `target`, in order
fn list_insertions(
    parent_id: &str,
    list: ListPath,
    target: &Block,
    direction: Direction,
    ids: &[&str],
) -> Vec<Operation> {
    match direction {
        Direction::Child => ids
            .iter()
            .map(|id| Operation::list_after(Table::Block, parent_id, list, id, None))
            .collect(),
        Direction::Top | Direction::Left => ids
            .iter()
            .map(|id| Operation::list_before(Table::Block, parent_id, list, id, Some(target.id.as_str())))
            .collect(),
        Direction::Bottom | Direction::Right => {
            let mut previous = target.id.as_str();
            ids.iter()
                .map(|id| {
                    let op = Operation::list_after(Table::Block, parent_id, list, id, Some(previous));
                    previous = *id;
                    op
                })
                .collect()
        }
    }
}

/// Insert new blocks at `direction` of `target`.
///
/// For every fragment block, emits a `set` of the record (re-parented and
/// assigned to `story_id`) followed by its list insertion.
pub fn insert_blocks_and_move_operations(
    story_id: &str,
    fragment: &BlockFragment,
    target: &Block,
    direction: Direction,
    path: ListPath,
) -> Result<Vec<Operation>, OperationError> {
    let (parent_id, list) = destination(target, direction, path)?;
    let blocks = fragment.ordered_blocks()?;
    let ids: Vec<&str> = blocks.iter().map(|block| block.id.as_str()).collect();
    let insertions = list_insertions(&parent_id, list, target, direction, &ids);

    let mut operations = Vec::with_capacity(blocks.len() * 2);
    for (block, insertion) in blocks.into_iter().zip(insertions) {
        let mut block = block.clone();
        block.parent_id = parent_id.clone();
        block.parent_table = ParentTable::Block;
        block.story_id = story_id.to_string();
        operations.push(Operation::set_block(&block)?);
        operations.push(insertion);
    }
    Ok(operations)
}

/// Arguments for [`move_blocks_transaction`]
#[derive(Debug, Clone)]
pub struct MoveBlocks {
    pub story_id: String,
    pub source_block_fragment: BlockFragment,
    pub target_block: Block,
    pub direction: Direction,
    pub path: ListPath,
    /// `true`: the fragment's blocks exist and are detached from their
    /// current list. `false`: the fragment is new data (dragged in from the
    /// sidebar) and is written with `set`.
    pub delete_source_block: bool,
}

/// Reject a move that would make `block_id` its own ancestor
fn ensure_not_ancestor(
    snapshot: &BlockSnapshot,
    block_id: &str,
    target: &Block,
) -> Result<(), OperationError> {
    let mut current = target;
    // bounded walk, tolerates cyclic data
    for _ in 0..=snapshot.len() {
        if current.id == block_id {
            return Err(OperationError::circular_move(block_id, target.id.clone()));
        }
        if current.parent_table != ParentTable::Block {
            return Ok(());
        }
        match snapshot.get_block(&current.parent_id) {
            Some(parent) => current = parent,
            None => return Ok(()),
        }
    }
    Ok(())
}

/// `storyId` updates moving the blocks `root` owns below it into `story_id`.
/// References to other stories' blocks keep their owner.
fn restamp_descendants(snapshot: &BlockSnapshot, root: &Block, story_id: &str) -> Vec<Operation> {
    snapshot
        .reachable_blocks(&root.id)
        .into_iter()
        .skip(1)
        .filter(|block| block.story_id == root.story_id)
        .map(|block| {
            Operation::update(
                Table::Block,
                block.id.clone(),
                Vec::new(),
                json!({ "storyId": story_id }),
            )
        })
        .collect()
}

/// Move (or drop in) a fragment at `direction` of the target block.
///
/// Moved blocks, and the blocks they own, are re-assigned to the
/// destination story.
pub fn move_blocks_transaction(
    snapshot: &BlockSnapshot,
    args: MoveBlocks,
) -> Result<Transaction, OperationError> {
    let MoveBlocks {
        story_id,
        source_block_fragment,
        target_block,
        direction,
        path,
        delete_source_block,
    } = args;

    let (parent_id, list) = destination(&target_block, direction, path)?;
    let blocks = source_block_fragment.ordered_blocks()?;
    let ids: Vec<&str> = blocks.iter().map(|block| block.id.as_str()).collect();
    let insertions = list_insertions(&parent_id, list, &target_block, direction, &ids);

    let mut operations = Vec::new();
    for (block, insertion) in blocks.into_iter().zip(insertions) {
        if delete_source_block {
            ensure_not_ancestor(snapshot, &block.id, &target_block)?;
            let current = get_block_from_snapshot(&block.id, snapshot)?;

            if current.parent_table == ParentTable::Block {
                let old_list = snapshot
                    .get_block(&current.parent_id)
                    .and_then(|parent| parent.list_containing(&current.id));
                if let Some(old_list) = old_list {
                    operations.push(Operation::list_remove(
                        Table::Block,
                        current.parent_id.clone(),
                        old_list,
                        &current.id,
                    ));
                }
            }

            operations.push(Operation::update(
                Table::Block,
                current.id.clone(),
                Vec::new(),
                json!({
                    "parentId": parent_id,
                    "parentTable": ParentTable::Block,
                    "storyId": story_id,
                }),
            ));
            if current.story_id != story_id {
                operations.extend(restamp_descendants(snapshot, current, &story_id));
            }
        } else {
            let mut block = block.clone();
            block.parent_id = parent_id.clone();
            block.parent_table = ParentTable::Block;
            block.story_id = story_id.clone();
            operations.push(Operation::set_block(&block)?);
        }
        operations.push(insertion);
    }

    Ok(create_transaction(operations))
}

/// `listRemove` from every block of `story_id` whose `path` list holds
/// `block_id`, falling back to the story itself
fn foreign_unlinks(
    snapshot: &BlockSnapshot,
    story_id: &str,
    block_id: &str,
    path: ListPath,
) -> Vec<Operation> {
    let referencing: Vec<Operation> = snapshot
        .reachable_blocks(story_id)
        .into_iter()
        .filter(|parent| parent.story_id == story_id || parent.id == story_id)
        .filter(|parent| {
            parent
                .list(path)
                .is_some_and(|ids| ids.iter().any(|id| id == block_id))
        })
        .map(|parent| Operation::list_remove(Table::Block, parent.id.clone(), path, block_id))
        .collect();

    if referencing.is_empty() {
        vec![Operation::list_remove(Table::Block, story_id, path, block_id)]
    } else {
        referencing
    }
}

/// Unlink blocks from the `path` list they are shown in.
///
/// Blocks owned by `story_id` are removed from their parent's list and
/// tombstoned. Blocks owned by another story (imported queries) are only
/// unlinked from the `path` lists of `story_id`'s blocks that reference them,
/// so their story keeps them.
pub fn remove_blocks_operations(
    snapshot: &BlockSnapshot,
    story_id: &str,
    block_ids: &[String],
    path: ListPath,
) -> Result<Vec<Operation>, OperationError> {
    let mut operations = Vec::with_capacity(block_ids.len() * 2);
    for block_id in block_ids {
        let block = get_block_from_snapshot(block_id, snapshot)?;
        if block.story_id != story_id {
            operations.extend(foreign_unlinks(snapshot, story_id, &block.id, path));
            continue;
        }
        if block.parent_table == ParentTable::Block {
            operations.push(Operation::list_remove(
                Table::Block,
                block.parent_id.clone(),
                path,
                &block.id,
            ));
        }
        operations.push(Operation::tombstone(block.id.clone()));
    }
    Ok(operations)
}

/// `set` operation creating a new story at workspace level
pub fn create_story_operations(
    story_id: &str,
    workspace_id: &str,
    title: Option<&str>,
) -> Result<Vec<Operation>, OperationError> {
    let title = match title {
        Some(title) => json!([[title]]),
        None => json!([]),
    };
    let story = create_empty_block(
        NewBlock::new(BlockType::Story)
            .id(story_id)
            .story_id(story_id)
            .parent_id(workspace_id)
            .parent_table(ParentTable::Workspace)
            .content(json!({ "title": title }))
            .permissions(vec![Permission::workspace(PermissionRole::Manager)]),
    );
    Ok(vec![Operation::set_block(&story)?])
}

/// Transaction creating a new thought owned by `user_id`
pub fn create_thought_transaction(
    thought_id: &str,
    workspace_id: &str,
    user_id: &str,
) -> Result<Transaction, OperationError> {
    let thought = create_empty_block(
        NewBlock::new(BlockType::Thought)
            .id(thought_id)
            .story_id(thought_id)
            .parent_id(workspace_id)
            .parent_table(ParentTable::Workspace)
            .permissions(vec![Permission::user(user_id, PermissionRole::Manager)])
            .created_by(user_id),
    );
    Ok(create_transaction(vec![Operation::set_block(&thought)?]))
}

/// Arguments for [`duplicate_story_transaction`]
#[derive(Debug, Clone)]
pub struct DuplicateStory {
    pub story_id: String,
    pub new_story_id: String,
    pub workspace_id: String,
}

/// Copy plan for one duplication: original id → new id, in pre-order
struct CopyPlan<'a> {
    ids: HashMap<String, String>,
    order: Vec<&'a Block>,
}

fn plan_copy<'a>(
    snapshot: &'a BlockSnapshot,
    root: &'a Block,
    new_root_id: &str,
) -> CopyPlan<'a> {
    let mut plan = CopyPlan {
        ids: HashMap::from([(root.id.clone(), new_root_id.to_string())]),
        order: Vec::new(),
    };
    let mut stack = vec![root];

    while let Some(block) = stack.pop() {
        plan.order.push(block);
        let mut pending = Vec::new();
        for list in ListPath::BLOCK_LISTS {
            for child_id in block.list(list).unwrap_or_default() {
                let Some(child) = snapshot.get_block(child_id) else {
                    tracing::warn!(
                        "Dropping dangling child '{}' of '{}' while duplicating",
                        child_id,
                        block.id
                    );
                    continue;
                };
                if !child.alive || child.story_id != root.story_id || plan.ids.contains_key(child_id)
                {
                    continue;
                }
                plan.ids.insert(child.id.clone(), block_id_generator());
                pending.push(child);
            }
        }
        // reversed so the stack pops children in list order
        stack.extend(pending.into_iter().rev());
    }
    plan
}

/// Remap one child list of a copied block
///
/// Copied children get their new id, referenced children (other stories)
/// keep theirs, tombstoned and dangling entries are dropped.
fn remap_list(
    snapshot: &BlockSnapshot,
    ids: &HashMap<String, String>,
    list: &[String],
) -> Vec<String> {
    list.iter()
        .filter_map(|child_id| {
            let child = snapshot.get_block(child_id)?;
            if !child.alive {
                return None;
            }
            Some(ids.get(child_id).cloned().unwrap_or_else(|| child_id.clone()))
        })
        .collect()
}

fn remap_content_references(content: &mut Value, ids: &HashMap<String, String>) {
    let Some(fields) = content.as_object_mut() else {
        return;
    };
    for key in CONTENT_REFERENCE_KEYS {
        if let Some(Value::String(reference)) = fields.get_mut(key) {
            if let Some(new_id) = ids.get(reference.as_str()) {
                *reference = new_id.clone();
            }
        }
    }
}

/// Duplicate a story and every block it owns under `new_story_id`.
///
/// Walks `children` and `resources` from the story, giving each owned, live
/// block a fresh id. Blocks owned by another story are referenced by their
/// original id and not copied. Each copy is written by one `set` that already
/// carries its remapped child lists; sets are emitted children-first so no
/// block becomes reachable before its record exists. The new story's set is
/// last.
pub fn duplicate_story_transaction(
    snapshot: &BlockSnapshot,
    args: DuplicateStory,
) -> Result<Transaction, OperationError> {
    let source = get_block_from_snapshot(&args.story_id, snapshot)?;
    let plan = plan_copy(snapshot, source, &args.new_story_id);
    let now = chrono::Utc::now();

    let mut operations = Vec::with_capacity(plan.order.len());
    for original in plan.order.iter().rev() {
        let mut copy = (*original).clone();
        copy.id = plan.ids[&original.id].clone();
        copy.story_id = args.new_story_id.clone();
        copy.created_at = now;
        if original.id == source.id {
            copy.parent_id = args.workspace_id.clone();
            copy.parent_table = ParentTable::Workspace;
        } else if let Some(parent_id) = plan.ids.get(&original.parent_id) {
            copy.parent_id = parent_id.clone();
        }
        copy.children = remap_list(snapshot, &plan.ids, &original.children);
        copy.resources = remap_list(snapshot, &plan.ids, &original.resources);
        remap_content_references(&mut copy.content, &plan.ids);

        operations.push(Operation::set_block(&copy)?);
    }

    tracing::debug!(
        "Duplicating story '{}' as '{}': {} block(s) copied",
        args.story_id,
        args.new_story_id,
        operations.len()
    );
    Ok(create_transaction(operations))
}

/// Reference an existing query in the story's resources (no copy)
pub fn import_query_operation(story_id: &str, query_id: &str) -> Operation {
    Operation::list_before(Table::Block, story_id, ListPath::Resources, query_id, None)
}

/// `update` writing the story's full format with one key changed
pub fn story_format_operation(story: &Block, key: &str, value: Value) -> Operation {
    let mut format = story.format.clone();
    format.insert(key.to_string(), value);
    Operation::update(
        Table::Block,
        story.id.clone(),
        vec!["format".to_string()],
        Value::Object(format),
    )
}

pub fn pin_story_operation(workspace_view_id: &str, story_id: &str) -> Operation {
    Operation::list_before(
        Table::WorkspaceView,
        workspace_view_id,
        ListPath::PinnedList,
        story_id,
        None,
    )
}

pub fn unpin_story_operation(workspace_view_id: &str, story_id: &str) -> Operation {
    Operation::list_remove(
        Table::WorkspaceView,
        workspace_view_id,
        ListPath::PinnedList,
        story_id,
    )
}

/// Ids of every block reachable from `operations`' list commands and sets
///
/// Used by tests to check that a duplicate never links back into the source tree.
#[cfg(test)]
pub(crate) fn referenced_ids(operations: &[Operation]) -> std::collections::HashSet<String> {
    let mut ids = std::collections::HashSet::new();
    for op in operations {
        ids.insert(op.id.clone());
        if let Some(item) = op.list_item() {
            ids.insert(item.to_string());
        }
        for list in ["children", "resources"] {
            if let Some(children) = op.args.get(list).and_then(Value::as_array) {
                ids.extend(children.iter().filter_map(Value::as_str).map(str::to_string));
            }
        }
    }
    ids
}

#[cfg(test)]
#[path = "builders_test.rs"]
mod builders_test;
