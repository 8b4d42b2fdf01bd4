//! Block Factory
//!
//! Builds well-formed block records. This is the only place new block ids are
//! minted; everything else receives blocks from here or from a snapshot.
//!
//! # Examples
//!
//! ```rust
//! use blockdoc_core::models::{create_empty_block, BlockType, NewBlock};
//! use serde_json::json;
//!
//! let query = create_empty_block(
//!     NewBlock::new(BlockType::Sql)
//!         .story_id("story-1")
//!         .parent_id("story-1")
//!         .content(json!({"sql": ""})),
//! );
//! assert_eq!(query.content["sql"], "");
//! assert_eq!(query.story_id, "story-1");
//! ```

use chrono::Utc;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::block::{Block, BlockType, ParentTable};
use super::permission::Permission;

/// Generate a globally unique block id (UUID v4)
pub fn block_id_generator() -> String {
    Uuid::new_v4().to_string()
}

/// Parameters for [`create_empty_block`]
///
/// Only `block_type` is required. Missing fields fall back to:
///
/// - `id`: freshly generated
/// - `story_id`: the block's own id (a document is its own story)
/// - `parent_id`: the story id
/// - `parent_table`: `Workspace` for stories and thoughts, `Block` otherwise
/// - `content`: the type's default payload, with supplied keys layered on top
#[derive(Debug, Clone)]
pub struct NewBlock {
    pub id: Option<String>,
    pub block_type: BlockType,
    pub story_id: Option<String>,
    pub parent_id: Option<String>,
    pub parent_table: Option<ParentTable>,
    pub content: Option<Value>,
    pub format: Map<String, Value>,
    pub children: Vec<String>,
    pub permissions: Vec<Permission>,
    pub created_by_id: Option<String>,
}

impl NewBlock {
    pub fn new(block_type: BlockType) -> Self {
        Self {
            id: None,
            block_type,
            story_id: None,
            parent_id: None,
            parent_table: None,
            content: None,
            format: Map::new(),
            children: Vec::new(),
            permissions: Vec::new(),
            created_by_id: None,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn story_id(mut self, story_id: impl Into<String>) -> Self {
        self.story_id = Some(story_id.into());
        self
    }

    pub fn parent_id(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn parent_table(mut self, parent_table: ParentTable) -> Self {
        self.parent_table = Some(parent_table);
        self
    }

    pub fn content(mut self, content: Value) -> Self {
        self.content = Some(content);
        self
    }

    pub fn format(mut self, format: Map<String, Value>) -> Self {
        self.format = format;
        self
    }

    pub fn permissions(mut self, permissions: Vec<Permission>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn created_by(mut self, user_id: impl Into<String>) -> Self {
        self.created_by_id = Some(user_id.into());
        self
    }
}

fn default_content(block_type: BlockType) -> Value {
    match block_type {
        BlockType::Story | BlockType::Text | BlockType::Snapshot | BlockType::Dbt => {
            json!({"title": []})
        }
        BlockType::Thought => json!({"date": Utc::now().format("%Y-%m-%d").to_string()}),
        BlockType::Sql | BlockType::QueryBuilder => json!({"title": [], "sql": ""}),
        BlockType::Visualization => json!({}),
    }
}

/// Build a complete block record from `params`.
///
/// No side effects apart from id generation.
pub fn create_empty_block(params: NewBlock) -> Block {
    let id = params.id.unwrap_or_else(block_id_generator);
    let story_id = params.story_id.unwrap_or_else(|| id.clone());
    let parent_id = params.parent_id.unwrap_or_else(|| story_id.clone());
    let parent_table = params.parent_table.unwrap_or(if params.block_type.is_document() {
        ParentTable::Workspace
    } else {
        ParentTable::Block
    });

    let mut content = default_content(params.block_type);
    match (params.content, content.as_object_mut()) {
        (Some(Value::Object(supplied)), Some(defaults)) => defaults.extend(supplied),
        (Some(other), _) => content = other,
        (None, _) => {}
    }

    Block {
        id,
        block_type: params.block_type,
        parent_id,
        parent_table,
        story_id,
        content,
        children: params.children,
        resources: Vec::new(),
        format: params.format,
        permissions: params.permissions,
        alive: true,
        created_by_id: params.created_by_id,
        created_at: Utc::now(),
    }
}

/// Visualization block charting an existing query or data asset
///
/// Data assets are referenced through `fromDataAssetId`, plain queries
/// through `queryId`.
pub fn visualization_from_source(story_id: &str, source_id: &str, is_data_asset: bool) -> Block {
    let content = if is_data_asset {
        json!({"fromDataAssetId": source_id})
    } else {
        json!({"queryId": source_id})
    };

    create_empty_block(
        NewBlock::new(BlockType::Visualization)
            .story_id(story_id)
            .parent_id(story_id)
            .content(content),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_ids_do_not_collide() {
        let ids: HashSet<String> = (0..10_000).map(|_| block_id_generator()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn test_story_defaults_to_its_own_story() {
        let story = create_empty_block(NewBlock::new(BlockType::Story).parent_id("ws-1"));

        assert_eq!(story.story_id, story.id);
        assert_eq!(story.parent_id, "ws-1");
        assert_eq!(story.parent_table, ParentTable::Workspace);
        assert_eq!(story.content, json!({"title": []}));
        assert!(story.children.is_empty());
        assert!(story.alive);
    }

    #[test]
    fn test_supplied_content_layers_over_defaults() {
        let block = create_empty_block(
            NewBlock::new(BlockType::Sql)
                .id("q1")
                .story_id("s1")
                .content(json!({"sql": "select 1"})),
        );

        assert_eq!(block.id, "q1");
        assert_eq!(block.parent_id, "s1");
        assert_eq!(block.parent_table, ParentTable::Block);
        assert_eq!(block.content, json!({"title": [], "sql": "select 1"}));
    }

    #[test]
    fn test_thought_content_has_date() {
        let thought = create_empty_block(NewBlock::new(BlockType::Thought));
        let date = thought.content["date"].as_str().unwrap();
        assert_eq!(date.len(), "2024-01-01".len());
    }

    #[test]
    fn test_visualization_from_source() {
        let from_query = visualization_from_source("s1", "q1", false);
        assert_eq!(from_query.block_type, BlockType::Visualization);
        assert_eq!(from_query.content, json!({"queryId": "q1"}));

        let from_asset = visualization_from_source("s1", "asset-1", true);
        assert_eq!(from_asset.content, json!({"fromDataAssetId": "asset-1"}));
        assert_eq!(from_asset.parent_id, "s1");
    }
}
