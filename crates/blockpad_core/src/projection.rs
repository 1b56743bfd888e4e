//! Document projection between stored blocks and the editable tree.
//!
//! The editing surface works on a [`DocTree`]: top-level [`Element`]s, each
//! holding text leaves that may carry inline [`Marks`]. Storage holds a flat,
//! ordered list of [`Block`]s with plain-text content.
//!
//! - [`to_tree`] builds one element per block, keyed by the block id.
//! - [`to_blocks`] flattens every top-level element back into one block,
//!   deriving `order` from the element's position.
//!
//! Inline marks do not survive [`to_blocks`]; a block's content is the
//! concatenated text of its element.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::model::{Block, BlockType, new_id};

fn is_false(value: &bool) -> bool {
    !*value
}

/// Inline formatting carried by a text leaf.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Marks {
    #[serde(default, skip_serializing_if = "is_false")]
    pub bold: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub italic: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub underline: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub code: bool,
}

/// A run of text with uniform marks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TextLeaf {
    pub text: String,
    #[serde(default)]
    pub marks: Marks,
}

impl TextLeaf {
    /// An unformatted leaf.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            marks: Marks::default(),
        }
    }

    /// A leaf with the given marks.
    pub fn marked(text: impl Into<String>, marks: Marks) -> Self {
        Self {
            text: text.into(),
            marks,
        }
    }
}

/// A child of an element: either text or a nested element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "node", rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub enum Descendant {
    Text(TextLeaf),
    Element(Element),
}

/// A block-level node in the editable tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Element {
    /// Id of the block this node was loaded from; `None` for new nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub kind: BlockType,
    pub children: Vec<Descendant>,
}

impl Element {
    /// A new, unkeyed element holding one plain text leaf.
    pub fn new(kind: BlockType, text: impl Into<String>) -> Self {
        Self {
            key: None,
            kind,
            children: vec![Descendant::Text(TextLeaf::plain(text))],
        }
    }

    /// A new, unkeyed paragraph.
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::new(BlockType::Paragraph, text)
    }

    /// Attach a key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Concatenated text of every leaf below this element, depth-first.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                Descendant::Text(leaf) => out.push_str(&leaf.text),
                Descendant::Element(element) => element.collect_text(out),
            }
        }
    }
}

/// The editable document: top-level elements in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct DocTree {
    pub nodes: Vec<Element>,
}

impl DocTree {
    /// The canonical empty document: a single empty paragraph.
    pub fn empty() -> Self {
        Self {
            nodes: vec![Element::paragraph("")],
        }
    }

    pub fn from_nodes(nodes: Vec<Element>) -> Self {
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether this is the canonical empty document.
    pub fn is_blank(&self) -> bool {
        self.nodes.len() == 1
            && self.nodes[0].kind == BlockType::Paragraph
            && self.nodes[0].plain_text().is_empty()
    }

    pub fn push(&mut self, element: Element) {
        self.nodes.push(element);
    }

    /// Insert at `index`, clamped to the end of the document.
    pub fn insert(&mut self, index: usize, element: Element) {
        let index = index.min(self.nodes.len());
        self.nodes.insert(index, element);
    }

    pub fn remove(&mut self, index: usize) -> Option<Element> {
        (index < self.nodes.len()).then(|| self.nodes.remove(index))
    }

    /// Move the node at `from` so that it ends up at position `to`.
    pub fn move_node(&mut self, from: usize, to: usize) -> bool {
        if from >= self.nodes.len() || to >= self.nodes.len() {
            return false;
        }
        let node = self.nodes.remove(from);
        self.nodes.insert(to, node);
        true
    }

    /// Replace a node's children with a single plain leaf.
    pub fn set_text(&mut self, index: usize, text: impl Into<String>) -> bool {
        match self.nodes.get_mut(index) {
            Some(node) => {
                node.children = vec![Descendant::Text(TextLeaf::plain(text))];
                true
            }
            None => false,
        }
    }

    pub fn set_kind(&mut self, index: usize, kind: BlockType) -> bool {
        match self.nodes.get_mut(index) {
            Some(node) => {
                node.kind = kind;
                true
            }
            None => false,
        }
    }

    /// Give every node a usable key, in place.
    ///
    /// Nodes without a key, with an empty key, or repeating a key already used
    /// earlier in the document get a fresh id. Returns how many keys changed.
    /// After this, [`to_blocks`] persists each node under its key.
    pub fn assign_keys(&mut self) -> usize {
        let mut seen: HashSet<String> = HashSet::with_capacity(self.nodes.len());
        let mut assigned = 0;
        for node in &mut self.nodes {
            let usable = node
                .key
                .as_deref()
                .is_some_and(|key| !key.is_empty() && !seen.contains(key));
            if !usable {
                node.key = Some(new_id());
                assigned += 1;
            }
            if let Some(key) = &node.key {
                seen.insert(key.clone());
            }
        }
        assigned
    }
}

/// Build the editable tree for an ordered block sequence.
///
/// An empty sequence yields [`DocTree::empty`], so the surface is never handed
/// a structurally empty document.
pub fn to_tree(blocks: &[Block]) -> DocTree {
    if blocks.is_empty() {
        return DocTree::empty();
    }

    let nodes = blocks
        .iter()
        .map(|block| Element {
            key: Some(block.id.clone()),
            kind: block.block_type,
            children: vec![Descendant::Text(TextLeaf::plain(block.content.clone()))],
        })
        .collect();

    DocTree { nodes }
}

/// Flatten a tree into the blocks to persist for `page_id`.
///
/// `order` is the node's index. Nodes without a key get a fresh id, and so
/// does any node repeating a key already used earlier in the document.
pub fn to_blocks(tree: &DocTree, page_id: &str, now: DateTime<Utc>) -> Vec<Block> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(tree.nodes.len());

    tree.nodes
        .iter()
        .enumerate()
        .map(|(index, node)| {
            let id = match node.key.as_deref() {
                Some(key) if !key.is_empty() && seen.insert(key) => key.to_string(),
                _ => new_id(),
            };
            Block {
                id,
                block_type: node.kind,
                content: node.plain_text(),
                order: index as i64,
                page_id: page_id.to_string(),
                created_at: now,
                updated_at: now,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(id: &str, block_type: BlockType, content: &str, order: i64) -> Block {
        let now = Utc::now();
        Block {
            id: id.to_string(),
            block_type,
            content: content.to_string(),
            order,
            page_id: "page-1".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    fn sample() -> Vec<Block> {
        vec![
            block("h", BlockType::Heading1, "Title", 0),
            block("p", BlockType::Paragraph, "Body text", 1),
            block("l1", BlockType::BulletList, "one", 2),
            block("l2", BlockType::NumberedList, "two", 3),
            block("q", BlockType::Quote, "quoted", 4),
            block("c", BlockType::Code, "let x = 1;", 5),
        ]
    }

    #[test]
    fn test_round_trip_preserves_blocks() {
        let blocks = sample();
        let back = to_blocks(&to_tree(&blocks), "page-1", Utc::now());

        assert_eq!(back.len(), blocks.len());
        for (original, restored) in blocks.iter().zip(&back) {
            assert_eq!(restored.id, original.id);
            assert_eq!(restored.block_type, original.block_type);
            assert_eq!(restored.content, original.content);
            assert_eq!(restored.order, original.order);
            assert_eq!(restored.page_id, original.page_id);
        }
    }

    #[test]
    fn test_tree_stable_under_round_trip() {
        let tree = to_tree(&sample());
        let again = to_tree(&to_blocks(&tree, "page-1", Utc::now()));
        assert_eq!(again, tree);
    }

    #[test]
    fn test_empty_document_is_single_paragraph() {
        let tree = to_tree(&[]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.nodes[0].kind, BlockType::Paragraph);
        assert_eq!(tree.nodes[0].plain_text(), "");
        assert!(tree.is_blank());

        let blocks = to_blocks(&tree, "page-9", Utc::now());
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].block_type, BlockType::Paragraph);
        assert_eq!(blocks[0].content, "");
        assert_eq!(blocks[0].order, 0);
        assert_eq!(blocks[0].page_id, "page-9");
    }

    #[test]
    fn test_marks_flatten_to_plain_text() {
        let bold = Marks {
            bold: true,
            ..Default::default()
        };
        let tree = DocTree::from_nodes(vec![Element {
            key: Some("b1".to_string()),
            kind: BlockType::Paragraph,
            children: vec![
                Descendant::Text(TextLeaf::plain("Hello, ")),
                Descendant::Text(TextLeaf::marked("bold", bold)),
                Descendant::Element(Element {
                    key: None,
                    kind: BlockType::Paragraph,
                    children: vec![Descendant::Text(TextLeaf::marked(
                        " world",
                        Marks {
                            italic: true,
                            code: true,
                            ..Default::default()
                        },
                    ))],
                }),
            ],
        }]);

        let blocks = to_blocks(&tree, "p", Utc::now());
        assert_eq!(blocks[0].content, "Hello, bold world");
        assert_eq!(blocks[0].id, "b1");

        // Loading back yields a single unmarked leaf
        let reloaded = to_tree(&blocks);
        assert_eq!(
            reloaded.nodes[0].children,
            vec![Descendant::Text(TextLeaf::plain("Hello, bold world"))]
        );
    }

    #[test]
    fn test_new_nodes_get_fresh_ids() {
        let mut tree = to_tree(&sample());
        tree.insert(1, Element::paragraph("inserted"));

        let blocks = to_blocks(&tree, "page-1", Utc::now());
        assert_eq!(blocks[1].content, "inserted");
        assert!(!blocks[1].id.is_empty());
        assert!(sample().iter().all(|b| b.id != blocks[1].id));
    }

    #[test]
    fn test_duplicate_keys_are_reassigned() {
        let tree = DocTree::from_nodes(vec![
            Element::paragraph("first").with_key("same"),
            Element::paragraph("copy").with_key("same"),
            Element::paragraph("blank key").with_key(""),
        ]);

        let blocks = to_blocks(&tree, "p", Utc::now());
        assert_eq!(blocks[0].id, "same");
        assert_ne!(blocks[1].id, "same");
        assert!(!blocks[2].id.is_empty());
        let unique: HashSet<_> = blocks.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn test_assign_keys_fills_gaps_and_keeps_existing() {
        let mut tree = DocTree::from_nodes(vec![
            Element::paragraph("kept").with_key("a"),
            Element::paragraph("new"),
            Element::paragraph("copy").with_key("a"),
            Element::paragraph("blank").with_key(""),
        ]);

        assert_eq!(tree.assign_keys(), 3);
        let keys: Vec<_> = tree.nodes.iter().map(|n| n.key.clone().unwrap()).collect();
        assert_eq!(keys[0], "a");
        let unique: HashSet<_> = keys.iter().collect();
        assert_eq!(unique.len(), 4);
        assert!(keys.iter().all(|k| !k.is_empty()));

        // Stamped keys are what gets persisted, every time
        let first = to_blocks(&tree, "p", Utc::now());
        let second = to_blocks(&tree, "p", Utc::now());
        let ids = |blocks: &[Block]| blocks.iter().map(|b| b.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&first), keys);
        assert_eq!(ids(&second), keys);
        assert_eq!(tree.assign_keys(), 0);
    }

    #[test]
    fn test_order_is_rederived_from_position() {
        let blocks = vec![
            block("a", BlockType::Paragraph, "a", 0),
            block("b", BlockType::Paragraph, "b", 2),
            block("moved", BlockType::Paragraph, "moved", 5),
        ];
        let mut tree = to_tree(&blocks);
        assert!(tree.move_node(2, 0));

        let saved = to_blocks(&tree, "page-1", Utc::now());
        let layout: Vec<_> = saved.iter().map(|b| (b.id.as_str(), b.order)).collect();
        assert_eq!(layout, vec![("moved", 0), ("a", 1), ("b", 2)]);
    }

    #[test]
    fn test_tree_edit_helpers_bounds() {
        let mut tree = DocTree::empty();
        assert!(!tree.move_node(0, 3));
        assert!(!tree.set_text(4, "nope"));
        assert!(tree.remove(1).is_none());

        tree.insert(10, Element::new(BlockType::Quote, "end"));
        assert_eq!(tree.len(), 2);
        assert!(tree.set_kind(1, BlockType::Code));
        assert_eq!(tree.nodes[1].kind, BlockType::Code);
        assert!(!tree.is_blank());
    }

    #[test]
    fn test_tree_json_shape() {
        let tree = DocTree::from_nodes(vec![Element::new(BlockType::Heading2, "Hi").with_key("k")]);
        let value = serde_json::to_value(&tree).unwrap();
        assert_eq!(value["nodes"][0]["kind"], "heading2");
        assert_eq!(value["nodes"][0]["key"], "k");
        assert_eq!(value["nodes"][0]["children"][0]["node"], "text");
        assert_eq!(value["nodes"][0]["children"][0]["text"], "Hi");

        let parsed: DocTree = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, tree);
    }
}
