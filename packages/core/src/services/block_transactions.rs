//! Block Transaction Facade
//!
//! Public action surface for editing the block graph. Every action follows
//! the same flow:
//!
//! 1. Resolve the blocks it needs through the [`BlockSource`]
//! 2. Build operations (immediately, or deferred until commit time)
//! 3. Dispatch through the [`CommitDispatcher`] and return its handle
//!
//! Pin and unpin skip the dispatcher and go straight to the
//! [`TransactionPersister`] with the workspace id attached.
//!
//! # Re-entrancy
//!
//! `duplicate_story` refuses to start while a duplicate of the same story is
//! still waiting for its acknowledgement, including when the caller gave up
//! on an earlier call by dropping its future. Other actions may be invoked
//! concurrently; the dispatcher serializes their commits.

use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use super::commit::{
    BlockSource, CommitDispatcher, CommitHandle, CommitRequest, TransactionPersister,
};
use super::error::TransactionError;
use crate::db::BlockSnapshot;
use crate::models::{
    block_id_generator, create_empty_block, workspace_access_permissions, Block, BlockType,
    ListPath, NewBlock, Permission, PermissionRole,
};
use crate::operations::{
    create_story_operations, create_thought_transaction, create_transaction,
    duplicate_story_transaction, import_query_operation, insert_blocks_and_move_operations,
    move_blocks_transaction, pin_story_operation, remove_blocks_operations,
    story_format_operation, unpin_story_operation, BlockFragment, Direction, DuplicateStory,
    MoveBlocks, Operation, Table, Transaction, TransactionRequest,
};

/// Session the facade acts for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacadeContext {
    workspace_id: String,
    user_id: String,
}

impl FacadeContext {
    /// Fails when either id is empty
    pub fn new(
        workspace_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Result<Self, TransactionError> {
        let workspace_id = workspace_id.into();
        let user_id = user_id.into();
        if workspace_id.is_empty() {
            return Err(TransactionError::invalid_context("workspace_id cannot be empty"));
        }
        if user_id.is_empty() {
            return Err(TransactionError::invalid_context("user_id cannot be empty"));
        }
        Ok(Self {
            workspace_id,
            user_id,
        })
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

/// Arguments for [`BlockTransactions::insert_blocks`]
#[derive(Debug, Clone)]
pub struct InsertBlocks {
    pub blocks_fragment: BlockFragment,
    pub target_block_id: String,
    pub direction: Direction,
    pub path: ListPath,
}

type InFlight = Mutex<HashSet<String>>;

fn lock_in_flight(in_flight: &InFlight) -> MutexGuard<'_, HashSet<String>> {
    in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Marks a story as being duplicated until dropped
struct DuplicateGuard<'a> {
    in_flight: &'a InFlight,
    story_id: String,
}

impl<'a> DuplicateGuard<'a> {
    fn acquire(in_flight: &'a InFlight, story_id: &str) -> Option<Self> {
        lock_in_flight(in_flight)
            .insert(story_id.to_string())
            .then(|| Self {
                in_flight,
                story_id: story_id.to_string(),
            })
    }
}

impl Drop for DuplicateGuard<'_> {
    fn drop(&mut self) {
        lock_in_flight(self.in_flight).remove(&self.story_id);
    }
}

pub struct BlockTransactions {
    context: FacadeContext,
    blocks: Arc<dyn BlockSource>,
    dispatcher: Arc<dyn CommitDispatcher>,
    persister: Arc<dyn TransactionPersister>,
    duplicates_in_flight: InFlight,
}

impl BlockTransactions {
    pub fn new(
        context: FacadeContext,
        blocks: Arc<dyn BlockSource>,
        dispatcher: Arc<dyn CommitDispatcher>,
        persister: Arc<dyn TransactionPersister>,
    ) -> Self {
        Self {
            context,
            blocks,
            dispatcher,
            persister,
            duplicates_in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn context(&self) -> &FacadeContext {
        &self.context
    }

    async fn lookup(&self, id: &str) -> Result<Block, TransactionError> {
        self.blocks
            .get_block(id)
            .await
            .map_err(TransactionError::lookup_failed)?
            .ok_or_else(|| TransactionError::block_not_found(id))
    }

    async fn commit_operations(
        &self,
        story_id: &str,
        operations: Vec<Operation>,
    ) -> Result<CommitHandle, TransactionError> {
        self.dispatcher
            .commit(CommitRequest::new(create_transaction(operations)).story(story_id))
            .await
    }

    /// Insert new blocks at `direction` of the target block
    pub async fn insert_blocks(
        &self,
        story_id: &str,
        args: InsertBlocks,
    ) -> Result<CommitHandle, TransactionError> {
        let target = self.lookup(&args.target_block_id).await?;
        tracing::debug!(
            "insert_blocks: {} block(s) {:?} of '{}' in story '{}'",
            args.blocks_fragment.children.len(),
            args.direction,
            target.id,
            story_id
        );

        let owner = story_id.to_string();
        let request = TransactionRequest::deferred(move |_: &BlockSnapshot| {
            let operations = insert_blocks_and_move_operations(
                &owner,
                &args.blocks_fragment,
                &target,
                args.direction,
                args.path,
            )?;
            Ok(create_transaction(operations))
        });
        self.dispatcher
            .commit(CommitRequest::new(request).story(story_id))
            .await
    }

    /// Move existing blocks to `direction` of the target block
    pub async fn move_blocks(
        &self,
        story_id: &str,
        blocks_fragment: BlockFragment,
        target_block_id: &str,
        direction: Direction,
    ) -> Result<CommitHandle, TransactionError> {
        let target = self.lookup(target_block_id).await?;
        tracing::debug!(
            "move_blocks: {:?} {:?} of '{}'",
            blocks_fragment.children,
            direction,
            target_block_id
        );

        let args = MoveBlocks {
            story_id: story_id.to_string(),
            source_block_fragment: blocks_fragment,
            target_block: target,
            direction,
            path: ListPath::Children,
            delete_source_block: true,
        };
        let request = TransactionRequest::deferred(move |snapshot: &BlockSnapshot| {
            move_blocks_transaction(snapshot, args)
        });
        self.dispatcher
            .commit(CommitRequest::new(request).story(story_id))
            .await
    }

    /// Unlink blocks from their parent's `path` list, tombstoning the ones
    /// `story_id` owns
    pub async fn remove_blocks(
        &self,
        story_id: &str,
        block_ids: Vec<String>,
        path: ListPath,
    ) -> Result<CommitHandle, TransactionError> {
        tracing::debug!("remove_blocks: {:?} from story '{}'", block_ids, story_id);

        let owner = story_id.to_string();
        let request = TransactionRequest::deferred(move |snapshot: &BlockSnapshot| {
            let operations = remove_blocks_operations(snapshot, &owner, &block_ids, path)?;
            Ok(create_transaction(operations))
        });
        self.dispatcher
            .commit(CommitRequest::new(request).story(story_id))
            .await
    }

    /// Replace the story's permission list
    pub async fn update_block_permissions(
        &self,
        story_id: &str,
        permissions: &[Permission],
    ) -> Result<CommitHandle, TransactionError> {
        let operation = Operation::set_permissions(story_id, permissions)?;
        self.commit_operations(story_id, vec![operation]).await
    }

    /// `set` an arbitrary value at `path` of a block
    pub async fn update_block_props(
        &self,
        story_id: &str,
        block_id: &str,
        path: Vec<String>,
        args: Value,
    ) -> Result<CommitHandle, TransactionError> {
        let operation = Operation::set(Table::Block, block_id, path, args);
        self.commit_operations(story_id, vec![operation]).await
    }

    pub async fn pin_story(
        &self,
        workspace_view_id: &str,
        story_id: &str,
    ) -> Result<(), TransactionError> {
        self.save_workspace_operation(pin_story_operation(workspace_view_id, story_id))
            .await
    }

    pub async fn unpin_story(
        &self,
        workspace_view_id: &str,
        story_id: &str,
    ) -> Result<(), TransactionError> {
        self.save_workspace_operation(unpin_story_operation(workspace_view_id, story_id))
            .await
    }

    async fn save_workspace_operation(&self, operation: Operation) -> Result<(), TransactionError> {
        let transaction: Transaction =
            create_transaction(vec![operation]).with_workspace(self.context.workspace_id());
        let transaction_id = transaction.id.clone();

        self.persister
            .save_transactions(vec![transaction])
            .await
            .map_err(|e| TransactionError::persistence_failed(transaction_id, format!("{:#}", e)))
    }

    pub async fn delete_story(&self, story_id: &str) -> Result<CommitHandle, TransactionError> {
        tracing::info!("Deleting story '{}'", story_id);
        self.commit_operations(story_id, vec![Operation::tombstone(story_id)])
            .await
    }

    /// Copy a story and its owned blocks, returning the new story id once the
    /// copy is persisted
    pub async fn duplicate_story(
        &self,
        story_id: &str,
        new_story_id: Option<String>,
    ) -> Result<String, TransactionError> {
        let Some(_guard) = DuplicateGuard::acquire(&self.duplicates_in_flight, story_id) else {
            return Err(TransactionError::duplicate_in_flight(story_id));
        };
        self.run_duplicate(story_id, new_story_id).await
    }

    async fn run_duplicate(
        &self,
        story_id: &str,
        new_story_id: Option<String>,
    ) -> Result<String, TransactionError> {
        let new_story_id = new_story_id.unwrap_or_else(block_id_generator);
        tracing::info!("Duplicating story '{}' as '{}'", story_id, new_story_id);

        let args = DuplicateStory {
            story_id: story_id.to_string(),
            new_story_id: new_story_id.clone(),
            workspace_id: self.context.workspace_id().to_string(),
        };
        let request = TransactionRequest::deferred(move |snapshot: &BlockSnapshot| {
            duplicate_story_transaction(snapshot, args)
        });

        let handle = self
            .dispatcher
            .commit(
                CommitRequest::new(request)
                    .story(story_id)
                    .should_reformat(false),
            )
            .await?;
        self.dispatcher
            .wait_for_transaction_applied(&handle.transaction_id)
            .await?;
        Ok(new_story_id)
    }

    pub async fn create_new_story(
        &self,
        id: Option<String>,
        title: Option<&str>,
    ) -> Result<CommitHandle, TransactionError> {
        let story_id = id.unwrap_or_else(block_id_generator);
        let operations = create_story_operations(&story_id, self.context.workspace_id(), title)?;
        self.commit_operations(&story_id, operations).await
    }

    pub async fn create_new_thought(&self, id: Option<String>) -> Result<CommitHandle, TransactionError> {
        let thought_id = id.unwrap_or_else(block_id_generator);
        let transaction = create_thought_transaction(
            &thought_id,
            self.context.workspace_id(),
            self.context.user_id(),
        )?;
        self.dispatcher.commit(CommitRequest::new(transaction)).await
    }

    /// Append an empty SQL block to the story's resources. Returns the new block id.
    pub async fn create_new_query(
        &self,
        story_id: &str,
    ) -> Result<(String, CommitHandle), TransactionError> {
        let query = create_empty_block(
            NewBlock::new(BlockType::Sql)
                .story_id(story_id)
                .parent_id(story_id),
        );
        let query_id = query.id.clone();

        let handle = self
            .insert_blocks(
                story_id,
                InsertBlocks {
                    blocks_fragment: BlockFragment::from_blocks([query]),
                    target_block_id: story_id.to_string(),
                    direction: Direction::Child,
                    path: ListPath::Resources,
                },
            )
            .await?;
        Ok((query_id, handle))
    }

    /// Reference a query owned by another story from this story's resources
    pub async fn import_query_to_story(
        &self,
        story_id: &str,
        query_id: &str,
    ) -> Result<CommitHandle, TransactionError> {
        self.commit_operations(story_id, vec![import_query_operation(story_id, query_id)])
            .await
    }

    /// Set one key of the story's `format`
    pub async fn set_story_format(
        &self,
        story_id: &str,
        key: &str,
        value: Value,
    ) -> Result<CommitHandle, TransactionError> {
        let story = self.lookup(story_id).await?;
        self.commit_operations(story_id, vec![story_format_operation(&story, key, value)])
            .await
    }

    /// Share the story with the workspace at `role`, or make it private (`None`).
    ///
    /// Returns `Ok(None)` without doing anything when `can_write` is false.
    pub async fn set_workspace_permission(
        &self,
        story_id: &str,
        role: Option<PermissionRole>,
        can_write: bool,
    ) -> Result<Option<CommitHandle>, TransactionError> {
        if !can_write {
            tracing::debug!("Skipping permission change on '{}': no write access", story_id);
            return Ok(None);
        }

        let story = self.lookup(story_id).await?;
        let permissions =
            workspace_access_permissions(&story.permissions, role, self.context.user_id());
        self.update_block_permissions(story_id, &permissions)
            .await
            .map(Some)
    }

    /// Live blocks in the story's `resources`, in list order
    pub async fn story_resources(&self, story_id: &str) -> Result<Vec<Block>, TransactionError> {
        let story = self.lookup(story_id).await?;

        let mut resources = Vec::with_capacity(story.resources.len());
        for resource_id in &story.resources {
            match self.blocks.get_block(resource_id).await {
                Ok(Some(block)) if block.alive => resources.push(block),
                Ok(_) => {}
                Err(e) => return Err(TransactionError::lookup_failed(e)),
            }
        }
        Ok(resources)
    }
}

#[cfg(test)]
#[path = "block_transactions_test.rs"]
mod block_transactions_test;
