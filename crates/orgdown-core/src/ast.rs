// SPDX-License-Identifier: AGPL-3.0-or-later
//! Document tree consumed by the exporter
//!
//! The tree is an arena of typed nodes. Each node carries a kind tag, a map
//! of kind-specific properties and an ordered list of children. Parent links
//! are plain indices used for navigation only.
//!
//! Secondary strings (a headline title, an item tag, a caption, an inline
//! footnote definition) are stored as [`Value::Nodes`] properties. Their
//! objects point at the owning node as parent but do not appear in its
//! child sequence.

use crate::traits::{ExportError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable identity of a node within one [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node in the arena
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Well-known property keys.
///
/// Lowercase keys are structural. Uppercase keys mirror Org node properties
/// found in property drawers.
pub mod prop {
    pub const POST_BLANK: &str = "post_blank";
    pub const LEVEL: &str = "level";
    pub const TITLE: &str = "title";
    pub const RAW_TITLE: &str = "raw_title";
    pub const TODO_KEYWORD: &str = "todo_keyword";
    pub const PRIORITY: &str = "priority";
    pub const TAGS: &str = "tags";
    pub const COMMENTED: &str = "commented";
    pub const FOOTNOTE_SECTION: &str = "footnote_section";
    pub const VALUE: &str = "value";
    pub const KEY: &str = "key";
    pub const TYPE: &str = "type";
    pub const PATH: &str = "path";
    pub const RAW_LINK: &str = "raw_link";
    pub const SEARCH_OPTION: &str = "search_option";
    pub const CHECKBOX: &str = "checkbox";
    pub const BULLET: &str = "bullet";
    pub const COUNTER: &str = "counter";
    pub const TAG: &str = "tag";
    pub const LABEL: &str = "label";
    pub const INLINE_DEFINITION: &str = "inline_definition";
    pub const NAME: &str = "name";
    pub const CAPTION: &str = "caption";
    pub const LANGUAGE: &str = "language";
    pub const NUMBER_LINES: &str = "number_lines";
    pub const RETAIN_LABELS: &str = "retain_labels";
    pub const USE_LABELS: &str = "use_labels";
    pub const BACKEND: &str = "backend";
    pub const HTML: &str = "html";
    pub const LATEX: &str = "latex";

    pub const CUSTOM_ID: &str = "CUSTOM_ID";
    pub const ID: &str = "ID";
    pub const UNNUMBERED: &str = "UNNUMBERED";
    pub const ALT_TITLE: &str = "ALT_TITLE";
}

/// Closed set of node kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    Document,
    Section,
    Headline,
    Paragraph,
    PlainList,
    Item,
    PlainText,
    Bold,
    Italic,
    Underline,
    StrikeThrough,
    Code,
    Verbatim,
    InlineSrcBlock,
    Link,
    LineBreak,
    HorizontalRule,
    Keyword,
    PropertyDrawer,
    NodeProperty,
    Drawer,
    DynamicBlock,
    LatexFragment,
    LatexEnvironment,
    Table,
    TableRow,
    TableCell,
    SrcBlock,
    ExampleBlock,
    FixedWidth,
    QuoteBlock,
    CenterBlock,
    SpecialBlock,
    VerseBlock,
    ExportBlock,
    ExportSnippet,
    FootnoteReference,
    FootnoteDefinition,
    Target,
    RadioTarget,
    Timestamp,
    Entity,
    Subscript,
    Superscript,
    StatisticsCookie,
    Planning,
    Clock,
    Comment,
    CommentBlock,
}

/// Whether a kind is the root, a block-level element or an inline object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeClass {
    Root,
    Element,
    Object,
}

impl NodeKind {
    /// Every kind, in declaration order
    pub const ALL: [Self; 49] = [
        Self::Document,
        Self::Section,
        Self::Headline,
        Self::Paragraph,
        Self::PlainList,
        Self::Item,
        Self::PlainText,
        Self::Bold,
        Self::Italic,
        Self::Underline,
        Self::StrikeThrough,
        Self::Code,
        Self::Verbatim,
        Self::InlineSrcBlock,
        Self::Link,
        Self::LineBreak,
        Self::HorizontalRule,
        Self::Keyword,
        Self::PropertyDrawer,
        Self::NodeProperty,
        Self::Drawer,
        Self::DynamicBlock,
        Self::LatexFragment,
        Self::LatexEnvironment,
        Self::Table,
        Self::TableRow,
        Self::TableCell,
        Self::SrcBlock,
        Self::ExampleBlock,
        Self::FixedWidth,
        Self::QuoteBlock,
        Self::CenterBlock,
        Self::SpecialBlock,
        Self::VerseBlock,
        Self::ExportBlock,
        Self::ExportSnippet,
        Self::FootnoteReference,
        Self::FootnoteDefinition,
        Self::Target,
        Self::RadioTarget,
        Self::Timestamp,
        Self::Entity,
        Self::Subscript,
        Self::Superscript,
        Self::StatisticsCookie,
        Self::Planning,
        Self::Clock,
        Self::Comment,
        Self::CommentBlock,
    ];

    /// Org element type name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Document => "org-data",
            Self::Section => "section",
            Self::Headline => "headline",
            Self::Paragraph => "paragraph",
            Self::PlainList => "plain-list",
            Self::Item => "item",
            Self::PlainText => "plain-text",
            Self::Bold => "bold",
            Self::Italic => "italic",
            Self::Underline => "underline",
            Self::StrikeThrough => "strike-through",
            Self::Code => "code",
            Self::Verbatim => "verbatim",
            Self::InlineSrcBlock => "inline-src-block",
            Self::Link => "link",
            Self::LineBreak => "line-break",
            Self::HorizontalRule => "horizontal-rule",
            Self::Keyword => "keyword",
            Self::PropertyDrawer => "property-drawer",
            Self::NodeProperty => "node-property",
            Self::Drawer => "drawer",
            Self::DynamicBlock => "dynamic-block",
            Self::LatexFragment => "latex-fragment",
            Self::LatexEnvironment => "latex-environment",
            Self::Table => "table",
            Self::TableRow => "table-row",
            Self::TableCell => "table-cell",
            Self::SrcBlock => "src-block",
            Self::ExampleBlock => "example-block",
            Self::FixedWidth => "fixed-width",
            Self::QuoteBlock => "quote-block",
            Self::CenterBlock => "center-block",
            Self::SpecialBlock => "special-block",
            Self::VerseBlock => "verse-block",
            Self::ExportBlock => "export-block",
            Self::ExportSnippet => "export-snippet",
            Self::FootnoteReference => "footnote-reference",
            Self::FootnoteDefinition => "footnote-definition",
            Self::Target => "target",
            Self::RadioTarget => "radio-target",
            Self::Timestamp => "timestamp",
            Self::Entity => "entity",
            Self::Subscript => "subscript",
            Self::Superscript => "superscript",
            Self::StatisticsCookie => "statistics-cookie",
            Self::Planning => "planning",
            Self::Clock => "clock",
            Self::Comment => "comment",
            Self::CommentBlock => "comment-block",
        }
    }

    pub const fn class(&self) -> NodeClass {
        match self {
            Self::Document => NodeClass::Root,
            Self::PlainText
            | Self::Bold
            | Self::Italic
            | Self::Underline
            | Self::StrikeThrough
            | Self::Code
            | Self::Verbatim
            | Self::InlineSrcBlock
            | Self::Link
            | Self::LineBreak
            | Self::LatexFragment
            | Self::TableCell
            | Self::ExportSnippet
            | Self::FootnoteReference
            | Self::Target
            | Self::RadioTarget
            | Self::Timestamp
            | Self::Entity
            | Self::Subscript
            | Self::Superscript
            | Self::StatisticsCookie => NodeClass::Object,
            _ => NodeClass::Element,
        }
    }

    /// Elements whose children are other elements. Their transcoded
    /// contents are normalized to end with a single newline.
    pub const fn is_greater_element(&self) -> bool {
        matches!(
            self,
            Self::Section
                | Self::Headline
                | Self::PlainList
                | Self::Item
                | Self::PropertyDrawer
                | Self::Drawer
                | Self::DynamicBlock
                | Self::Table
                | Self::QuoteBlock
                | Self::CenterBlock
                | Self::SpecialBlock
                | Self::FootnoteDefinition
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Integer(i64),
    String(String),
    List(Vec<String>),
    Nodes(Vec<NodeId>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_list(&self) -> &[String] {
        match self {
            Value::List(items) => items,
            _ => &[],
        }
    }

    pub fn as_nodes(&self) -> &[NodeId] {
        match self {
            Value::Nodes(ids) => ids,
            _ => &[],
        }
    }

    /// Org truthiness: `nil`, `false`, empty strings and empty lists are false
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Integer(_) => true,
            Value::String(s) => !(s.is_empty() || s == "nil"),
            Value::List(items) => !items.is_empty(),
            Value::Nodes(ids) => !ids.is_empty(),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Integer(n as i64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Value::List(items)
    }
}

impl From<Vec<NodeId>> for Value {
    fn from(ids: Vec<NodeId>) -> Self {
        Value::Nodes(ids)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NodeData {
    kind: NodeKind,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    properties: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent: Option<NodeId>,
}

impl NodeData {
    fn new(kind: NodeKind, parent: Option<NodeId>) -> Self {
        Self {
            kind,
            properties: BTreeMap::new(),
            children: Vec::new(),
            parent,
        }
    }
}

/// A parsed document: the root node and everything below it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    nodes: Vec<NodeData>,
}

impl Document {
    /// Create a document holding only its root
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData::new(NodeKind::Document, None)],
        }
    }

    /// Load a tree serialized with serde_json and check its structure
    pub fn from_json(input: &str) -> Result<Self> {
        let doc: Document = serde_json::from_str(input)
            .map_err(|e| ExportError::SerializationError(e.to_string()))?;
        doc.validate()?;
        Ok(doc)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ExportError::SerializationError(e.to_string()))
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Number of nodes, secondary strings included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[0].children.is_empty()
    }

    /// Cursor on a node.
    ///
    /// # Panics
    /// When `id` does not belong to this document.
    pub fn node(&self, id: NodeId) -> Node<'_> {
        assert!(id.0 < self.nodes.len(), "node {} out of range", id.0);
        Node { tree: self, id }
    }

    pub fn get(&self, id: NodeId) -> Option<Node<'_>> {
        (id.0 < self.nodes.len()).then_some(Node { tree: self, id })
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.nodes[id.0].kind
    }

    /// Every node in arena order, secondary strings included
    pub fn iter(&self) -> impl Iterator<Item = Node<'_>> + '_ {
        (0..self.nodes.len()).map(move |i| Node {
            tree: self,
            id: NodeId(i),
        })
    }

    /// Append a new child at the end of `parent`'s children
    pub fn append(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData::new(kind, Some(parent)));
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Append an object to the secondary string stored under `key`
    pub fn append_secondary(&mut self, owner: NodeId, key: &str, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData::new(kind, Some(owner)));
        let props = &mut self.nodes[owner.0].properties;
        match props.get_mut(key) {
            Some(Value::Nodes(ids)) => ids.push(id),
            _ => {
                props.insert(key.to_string(), Value::Nodes(vec![id]));
            }
        }
        id
    }

    pub fn set(&mut self, id: NodeId, key: impl Into<String>, value: impl Into<Value>) {
        self.nodes[id.0].properties.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, id: NodeId, key: &str) -> Option<Value> {
        self.nodes[id.0].properties.remove(key)
    }

    /// Number of blank lines (elements) or spaces (objects) after the node
    pub fn set_post_blank(&mut self, id: NodeId, blank: usize) {
        self.set(id, prop::POST_BLANK, blank);
    }

    /// Append a plain-text object
    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        let id = self.append(parent, NodeKind::PlainText);
        self.set(id, prop::VALUE, text);
        id
    }

    /// Append a headline whose title is a single plain-text object
    pub fn push_headline(&mut self, parent: NodeId, level: usize, title: &str) -> NodeId {
        let id = self.append(parent, NodeKind::Headline);
        self.set(id, prop::LEVEL, level);
        self.set(id, prop::RAW_TITLE, title);
        let text = self.append_secondary(id, prop::TITLE, NodeKind::PlainText);
        self.set(text, prop::VALUE, title);
        id
    }

    /// Check the parent/child invariants of a tree built elsewhere.
    ///
    /// Every node must be reached from the root exactly once, through a
    /// child sequence or a secondary string of the node it names as parent.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| ExportError::SerializationError(message);

        let root = self.nodes.first().ok_or_else(|| invalid("empty tree".into()))?;
        if root.kind != NodeKind::Document || root.parent.is_some() {
            return Err(invalid("node 0 must be a parentless document".into()));
        }

        let mut seen = vec![false; self.nodes.len()];
        seen[0] = true;
        let mut pending = vec![NodeId(0)];
        while let Some(owner) = pending.pop() {
            let data = &self.nodes[owner.0];
            let secondary = data.properties.values().flat_map(Value::as_nodes);
            for id in data.children.iter().chain(secondary) {
                let child = self.nodes.get(id.0).ok_or_else(|| {
                    invalid(format!("node {}: child {} out of range", owner.0, id.0))
                })?;
                if child.parent != Some(owner) {
                    return Err(invalid(format!(
                        "node {}: child {} points elsewhere",
                        owner.0, id.0
                    )));
                }
                if child.kind == NodeKind::Document {
                    return Err(invalid(format!("node {}: nested document", id.0)));
                }
                if std::mem::replace(&mut seen[id.0], true) {
                    return Err(invalid(format!("node {}: listed twice", id.0)));
                }
                pending.push(*id);
            }
        }

        match seen.iter().position(|s| !s) {
            Some(index) => Err(invalid(format!("node {index}: not reachable from the root"))),
            None => Ok(()),
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// Borrowed cursor on one node of a [`Document`]
#[derive(Clone, Copy)]
pub struct Node<'a> {
    tree: &'a Document,
    id: NodeId,
}

impl<'a> Node<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tree(&self) -> &'a Document {
        self.tree
    }

    pub fn kind(&self) -> NodeKind {
        self.data().kind
    }

    fn data(&self) -> &'a NodeData {
        &self.tree.nodes[self.id.0]
    }

    pub fn is(&self, kind: NodeKind) -> bool {
        self.kind() == kind
    }

    pub fn parent(&self) -> Option<Node<'a>> {
        self.data().parent.map(|id| self.tree.node(id))
    }

    pub fn child_ids(&self) -> &'a [NodeId] {
        &self.data().children
    }

    pub fn children(&self) -> impl Iterator<Item = Node<'a>> + 'a {
        let tree = self.tree;
        self.data().children.iter().map(move |id| tree.node(*id))
    }

    pub fn first_child(&self) -> Option<Node<'a>> {
        self.data().children.first().map(|id| self.tree.node(*id))
    }

    pub fn has_children(&self) -> bool {
        !self.data().children.is_empty()
    }

    /// Siblings in the parent's child sequence; empty for secondary strings
    fn siblings(&self) -> &'a [NodeId] {
        match self.parent() {
            Some(parent) if parent.data().children.contains(&self.id) => &parent.data().children,
            _ => &[],
        }
    }

    pub fn previous_sibling(&self) -> Option<Node<'a>> {
        let siblings = self.siblings();
        let position = siblings.iter().position(|id| *id == self.id)?;
        position
            .checked_sub(1)
            .map(|p| self.tree.node(siblings[p]))
    }

    pub fn next_sibling(&self) -> Option<Node<'a>> {
        let siblings = self.siblings();
        let position = siblings.iter().position(|id| *id == self.id)?;
        siblings.get(position + 1).map(|id| self.tree.node(*id))
    }

    /// Ancestors from the parent up to the root
    pub fn ancestors(&self) -> impl Iterator<Item = Node<'a>> + 'a {
        std::iter::successors(self.parent(), |n| n.parent())
    }

    /// Nearest ancestor whose kind is one of `kinds`
    pub fn lineage(&self, kinds: &[NodeKind]) -> Option<Node<'a>> {
        self.ancestors().find(|n| kinds.contains(&n.kind()))
    }

    /// Pre-order walk of the children, excluding the node itself and
    /// secondary strings
    pub fn descendants(&self) -> impl Iterator<Item = Node<'a>> + 'a {
        let tree = self.tree;
        let mut stack: Vec<NodeId> = self.data().children.iter().rev().copied().collect();
        std::iter::from_fn(move || {
            let id = stack.pop()?;
            stack.extend(tree.nodes[id.0].children.iter().rev().copied());
            Some(tree.node(id))
        })
    }

    pub fn property(&self, key: &str) -> Option<&'a Value> {
        self.data().properties.get(key)
    }

    pub fn properties(&self) -> impl Iterator<Item = (&'a str, &'a Value)> + 'a {
        self.data().properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn str_property(&self, key: &str) -> Option<&'a str> {
        self.property(key).and_then(Value::as_str)
    }

    pub fn int_property(&self, key: &str) -> Option<i64> {
        self.property(key).and_then(Value::as_integer)
    }

    pub fn flag(&self, key: &str) -> bool {
        self.property(key).is_some_and(Value::is_truthy)
    }

    pub fn list_property(&self, key: &str) -> &'a [String] {
        self.property(key).map_or(&[], Value::as_list)
    }

    pub fn nodes_property(&self, key: &str) -> &'a [NodeId] {
        self.property(key).map_or(&[], Value::as_nodes)
    }

    pub fn post_blank(&self) -> usize {
        self.int_property(prop::POST_BLANK)
            .map_or(0, |n| usize::try_from(n).unwrap_or(0))
    }
}

impl PartialEq for Node<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tree, other.tree) && self.id == other.id
    }
}

impl fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id.0)
            .field("kind", &self.kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Document, NodeId, NodeId) {
        let mut doc = Document::new();
        let root = doc.root();
        let h1 = doc.push_headline(root, 1, "One");
        let section = doc.append(h1, NodeKind::Section);
        let para = doc.append(section, NodeKind::Paragraph);
        doc.append_text(para, "hello");
        let h2 = doc.push_headline(h1, 2, "Two");
        (doc, h1, h2)
    }

    #[test]
    fn test_document_new() {
        let doc = Document::new();
        assert_eq!(doc.kind(doc.root()), NodeKind::Document);
        assert!(doc.is_empty());
        assert_eq!(doc.len(), 1);
    }

    #[test]
    fn test_navigation() {
        let (doc, h1, h2) = sample();
        let h2 = doc.node(h2);
        assert_eq!(h2.parent().map(|p| p.id()), Some(h1));
        assert_eq!(h2.previous_sibling().map(|n| n.kind()), Some(NodeKind::Section));
        assert!(h2.next_sibling().is_none());
        assert_eq!(h2.ancestors().count(), 2);
        assert_eq!(
            h2.lineage(&[NodeKind::Headline]).map(|n| n.id()),
            Some(h1)
        );
    }

    #[test]
    fn test_descendants_skip_secondary_strings() {
        let (doc, ..) = sample();
        let kinds: Vec<_> = doc.node(doc.root()).descendants().map(|n| n.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                NodeKind::Headline,
                NodeKind::Section,
                NodeKind::Paragraph,
                NodeKind::PlainText,
                NodeKind::Headline,
            ]
        );
    }

    #[test]
    fn test_secondary_string_has_owner_but_no_siblings() {
        let (doc, h1, _) = sample();
        let title = doc.node(h1).nodes_property(prop::TITLE)[0];
        let title = doc.node(title);
        assert_eq!(title.parent().map(|p| p.id()), Some(h1));
        assert!(title.previous_sibling().is_none());
        assert!(title.next_sibling().is_none());
    }

    #[test]
    fn test_properties_and_truthiness() {
        let mut doc = Document::new();
        let kw = doc.append(doc.root(), NodeKind::Keyword);
        doc.set(kw, prop::KEY, "TOC");
        doc.set(kw, "flag", "nil");
        let kw = doc.node(kw);
        assert_eq!(kw.str_property(prop::KEY), Some("TOC"));
        assert!(!kw.flag("flag"));
        assert!(!kw.flag("missing"));
        assert_eq!(kw.post_blank(), 0);
    }

    #[test]
    fn test_json_roundtrip_validates() {
        let (doc, ..) = sample();
        let json = doc.to_json().unwrap();
        let back = Document::from_json(&json).unwrap();
        assert_eq!(back.len(), doc.len());
        assert_eq!(
            back.node(back.root()).descendants().count(),
            doc.node(doc.root()).descendants().count()
        );
    }

    #[test]
    fn test_validate_rejects_orphans() {
        let json = r#"{"nodes":[{"kind":"document"},{"kind":"paragraph","parent":0}]}"#;
        assert!(Document::from_json(json).is_err());
    }

    #[test]
    fn test_validate_rejects_unreachable_parent_cycle() {
        // Nodes 1 and 2 name each other as parent and hang off nothing
        let json = r#"{"nodes":[
            {"kind":"document"},
            {"kind":"paragraph","children":[2],"parent":2},
            {"kind":"bold","children":[1],"parent":1}
        ]}"#;
        assert!(Document::from_json(json).is_err());
    }

    #[test]
    fn test_validate_rejects_child_listed_twice() {
        let json = r#"{"nodes":[
            {"kind":"document","children":[1,1]},
            {"kind":"paragraph","parent":0}
        ]}"#;
        assert!(Document::from_json(json).is_err());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn kind_strategy() -> impl Strategy<Value = NodeKind> {
        (1..NodeKind::ALL.len()).prop_map(|i| NodeKind::ALL[i])
    }

    proptest! {
        // Appending anywhere keeps every child pointing back at its parent
        #[test]
        fn prop_append_keeps_parent_links(ops in proptest::collection::vec((0usize..64, kind_strategy()), 0..64)) {
            let mut doc = Document::new();
            for (pick, kind) in ops {
                let parent = NodeId(pick % doc.len());
                doc.append(parent, kind);
            }
            prop_assert!(doc.validate().is_ok());
            prop_assert_eq!(doc.node(doc.root()).descendants().count(), doc.len() - 1);
        }

        // Every kind has a distinct org name
        #[test]
        fn prop_kind_names_unique(a in kind_strategy(), b in kind_strategy()) {
            prop_assert_eq!(a == b, a.name() == b.name());
        }
    }
}
