//! Block Data Structures
//!
//! A block is a node in a story's document tree. Every piece of content
//! (the story itself, paragraphs, SQL queries, visualizations) is a block.
//!
//! # Ordered Lists
//!
//! A block owns more than one ordered list of child ids. `children` holds the
//! document body; `resources` holds attachments such as queries and data
//! assets shown in the sidebar. Lists are addressed by [`ListPath`].
//!
//! # Tombstones
//!
//! Deletion is logical: `alive = false` marks a removed block while the record
//! itself stays in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::permission::Permission;

/// Content shape discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Story,
    Thought,
    Text,
    #[serde(rename = "sql")]
    Sql,
    Visualization,
    Snapshot,
    QueryBuilder,
    #[serde(rename = "dbt")]
    Dbt,
}

impl BlockType {
    /// Root-level document types (parented by the workspace, not a block)
    pub fn is_document(self) -> bool {
        matches!(self, BlockType::Story | BlockType::Thought)
    }
}

/// Which collection owns a block's `parent_id`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParentTable {
    Workspace,
    Block,
}

/// Named ordered child list within a block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ListPath {
    #[default]
    Children,
    Resources,
    /// Pinned stories on a workspace view
    PinnedList,
}

impl ListPath {
    pub fn as_str(self) -> &'static str {
        match self {
            ListPath::Children => "children",
            ListPath::Resources => "resources",
            ListPath::PinnedList => "pinnedList",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "children" => Some(ListPath::Children),
            "resources" => Some(ListPath::Resources),
            "pinnedList" => Some(ListPath::PinnedList),
            _ => None,
        }
    }

    /// Lists a block record may carry
    pub const BLOCK_LISTS: [ListPath; 2] = [ListPath::Children, ListPath::Resources];
}

impl fmt::Display for ListPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node in the document tree.
///
/// # Fields
///
/// - `id`: Opaque unique identifier from the block factory
/// - `block_type`: Content shape (serialized as `type`)
/// - `parent_id` / `parent_table`: Owning parent and its collection
/// - `story_id`: The story this block belongs to. Differs from the
///   surrounding story when the block is referenced from another document
///   (imported queries)
/// - `content`: Type-dependent payload (`sql`, `title`, `queryId`, ...)
/// - `children` / `resources`: Ordered child lists
/// - `format`: Free-form display settings (`locked`, `connectorId`, ...)
/// - `permissions`: At most one entry per `(type, id)`
/// - `alive`: Tombstone flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub id: String,

    #[serde(rename = "type")]
    pub block_type: BlockType,

    pub parent_id: String,

    pub parent_table: ParentTable,

    pub story_id: String,

    #[serde(default)]
    pub content: serde_json::Value,

    #[serde(default)]
    pub children: Vec<String>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,

    #[serde(default)]
    pub format: serde_json::Map<String, serde_json::Value>,

    #[serde(default)]
    pub permissions: Vec<Permission>,

    #[serde(default = "default_alive")]
    pub alive: bool,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by_id: Option<String>,

    pub created_at: DateTime<Utc>,
}

fn default_alive() -> bool {
    true
}

impl Block {
    /// Ordered ids in the named list
    ///
    /// Returns `None` for lists a block record does not carry (`pinnedList`).
    pub fn list(&self, path: ListPath) -> Option<&[String]> {
        match path {
            ListPath::Children => Some(&self.children),
            ListPath::Resources => Some(&self.resources),
            ListPath::PinnedList => None,
        }
    }

    pub fn list_mut(&mut self, path: ListPath) -> Option<&mut Vec<String>> {
        match path {
            ListPath::Children => Some(&mut self.children),
            ListPath::Resources => Some(&mut self.resources),
            ListPath::PinnedList => None,
        }
    }

    /// The list of this block that contains `child_id`, if any
    pub fn list_containing(&self, child_id: &str) -> Option<ListPath> {
        ListPath::BLOCK_LISTS
            .into_iter()
            .find(|path| self.list(*path).is_some_and(|ids| ids.iter().any(|id| id == child_id)))
    }

    /// Story title text (first segment of each rich-text token)
    pub fn title(&self) -> String {
        self.content
            .get("title")
            .and_then(|title| title.as_array())
            .map(|tokens| {
                tokens
                    .iter()
                    .filter_map(|token| token.get(0).and_then(|text| text.as_str()))
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    pub fn is_locked(&self) -> bool {
        self.format
            .get("locked")
            .and_then(|locked| locked.as_bool())
            .unwrap_or(false)
    }
}

/// Per-user view of a workspace (pinned stories)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceView {
    pub id: String,

    pub workspace_id: String,

    #[serde(default)]
    pub pinned_list: Vec<String>,
}

impl WorkspaceView {
    pub fn new(id: impl Into<String>, workspace_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            workspace_id: workspace_id.into(),
            pinned_list: Vec::new(),
        }
    }
}
