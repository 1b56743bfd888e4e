//! Block model: pages, blocks and their partial-update records.
//!
//! A [`Page`] owns an ordered list of [`Block`]s. Blocks sorted by `order`
//! ascending reconstruct the document top-to-bottom. Block content is plain
//! text; inline formatting lives only in the editable tree (see
//! [`crate::projection`]).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::BlockpadError;

/// Title given to pages created without one.
pub const DEFAULT_PAGE_TITLE: &str = "Untitled";

/// Generate a fresh unique record id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// The kind of a content block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub enum BlockType {
    #[default]
    Paragraph,
    Heading1,
    Heading2,
    Heading3,
    BulletList,
    NumberedList,
    Quote,
    Code,
}

impl BlockType {
    /// Every block type, in toolbar order.
    pub const ALL: [BlockType; 8] = [
        BlockType::Paragraph,
        BlockType::Heading1,
        BlockType::Heading2,
        BlockType::Heading3,
        BlockType::BulletList,
        BlockType::NumberedList,
        BlockType::Quote,
        BlockType::Code,
    ];

    /// The serialized name of this block type.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockType::Paragraph => "paragraph",
            BlockType::Heading1 => "heading1",
            BlockType::Heading2 => "heading2",
            BlockType::Heading3 => "heading3",
            BlockType::BulletList => "bulletList",
            BlockType::NumberedList => "numberedList",
            BlockType::Quote => "quote",
            BlockType::Code => "code",
        }
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlockType {
    type Err = BlockpadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BlockType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| BlockpadError::InvalidBlockType(s.to_string()))
    }
}

/// A page: the unit of navigation, owning zero or more blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Page {
    /// Stable unique id, assigned at creation and never reused
    pub id: String,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Page {
    /// Create a page with a fresh id, stamped with `now`.
    pub fn new(title: impl Into<String>, icon: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            title: title.into(),
            icon,
            cover_image: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge partial fields into this page and re-stamp `updated_at`.
    pub fn apply(&mut self, update: PageUpdate, now: DateTime<Utc>) {
        if let Some(title) = update.title {
            self.title = title;
        }
        if let Some(icon) = update.icon {
            self.icon = icon;
        }
        if let Some(cover_image) = update.cover_image {
            self.cover_image = cover_image;
        }
        self.updated_at = now;
    }
}

/// A typed content block belonging to a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Block {
    /// Unique within the page and stable across save cycles
    pub id: String,

    #[serde(rename = "type")]
    pub block_type: BlockType,

    /// Plain text; inline marks are not persisted
    pub content: String,

    /// Position within the page; re-derived from the tree on every save
    pub order: i64,

    pub page_id: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Block {
    /// Apply a partial update and re-stamp `updated_at`.
    pub fn apply(&mut self, update: BlockUpdate, now: DateTime<Utc>) {
        if let Some(block_type) = update.block_type {
            self.block_type = block_type;
        }
        if let Some(content) = update.content {
            self.content = content;
        }
        if let Some(order) = update.order {
            self.order = order;
        }
        self.updated_at = now;
    }
}

/// Sort blocks into document order. Equal orders fall back to id so the
/// result is deterministic.
pub fn sort_blocks(blocks: &mut [Block]) {
    blocks.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
}

/// Partial page fields for `update_page`.
///
/// `icon` and `cover_image` are doubly optional: `Some(None)` clears the field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<Option<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<Option<String>>,
}

impl PageUpdate {
    /// An update that only changes the title.
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }
}

/// Input for the low-level `create_block` primitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBlock {
    pub page_id: String,
    #[serde(rename = "type")]
    pub block_type: BlockType,
    pub content: String,
    pub order: i64,
}

impl NewBlock {
    /// Materialize into a stored block with a fresh id.
    pub fn into_block(self, now: DateTime<Utc>) -> Block {
        Block {
            id: new_id(),
            block_type: self.block_type,
            content: self.content,
            order: self.order,
            page_id: self.page_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial block fields for `update_block`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockUpdate {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub block_type: Option<BlockType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
}
