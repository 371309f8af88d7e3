// SPDX-License-Identifier: AGPL-3.0-or-later
//! Export context: resolved options, tree-wide properties and caches
//!
//! Everything except [`Caches`] is fixed before transcoding starts.
//! Translators reach the caches only through [`ExportContext::reference`],
//! [`ExportContext::record_footnote`] and [`ExportContext::anchor_targets`].

use crate::ast::{prop, Document, Node, NodeId, NodeKind, Value};
use crate::options::{self, Options};
use once_cell::unsync::OnceCell;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Where the body of a recorded footnote lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FootnoteBody {
    /// A `[fn:label] ...` definition element
    Definition(NodeId),
    /// The inline definition held by this reference node
    Inline(NodeId),
    /// Referenced but never defined
    Missing,
}

/// A footnote in first-reference order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FootnoteEntry {
    pub number: usize,
    pub label: Option<String>,
    pub body: FootnoteBody,
    first_reference: NodeId,
}

/// Result of recording a footnote reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FootnoteMark {
    pub number: usize,
    /// Whether this reference is the first one for its footnote
    pub first: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum FootnoteKey {
    Label(String),
    Anonymous(NodeId),
}

#[derive(Debug, Default)]
struct Caches {
    references: HashMap<NodeId, String>,
    taken: HashSet<String>,
    footnotes: Vec<FootnoteEntry>,
    footnote_index: HashMap<FootnoteKey, usize>,
}

/// State shared by every translator during one export
#[derive(Debug)]
pub struct ExportContext {
    backend: String,
    options: Options,
    scope: Option<NodeId>,
    ignored: HashSet<NodeId>,
    min_level: usize,
    headline_numbers: HashMap<NodeId, Vec<usize>>,
    footnote_definitions: HashMap<String, NodeId>,
    caches: RefCell<Caches>,
    anchor_targets: OnceCell<HashSet<NodeId>>,
}

impl ExportContext {
    pub fn new(backend: impl Into<String>, options: Options) -> Self {
        Self {
            backend: backend.into(),
            options,
            scope: None,
            ignored: HashSet::new(),
            min_level: 1,
            headline_numbers: HashMap::new(),
            footnote_definitions: HashMap::new(),
            caches: RefCell::new(Caches::default()),
            anchor_targets: OnceCell::new(),
        }
    }

    /// Restrict the export to one headline and its subtree
    pub fn with_scope(mut self, headline: NodeId) -> Self {
        self.scope = Some(headline);
        self
    }

    /// Backend the export was started with
    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn scope(&self) -> Option<NodeId> {
        self.scope
    }

    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    pub fn flag(&self, key: &str) -> bool {
        self.option(key).is_some_and(Value::is_truthy)
    }

    pub fn integer(&self, key: &str) -> Option<i64> {
        self.option(key).and_then(Value::as_integer)
    }

    pub fn string(&self, key: &str) -> Option<&str> {
        self.option(key).and_then(Value::as_str)
    }

    pub fn list(&self, key: &str) -> &[String] {
        self.option(key).map_or(&[], Value::as_list)
    }

    /// `headline-levels` as a count
    pub fn headline_levels(&self) -> usize {
        self.integer(options::HEADLINE_LEVELS)
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(3)
    }

    /// Compute the ignore set. Must run before the parse-tree filters.
    pub fn prune(&mut self, tree: &Document) {
        self.ignored = crate::prune::ignored_nodes(tree, self);
        debug!(ignored = self.ignored.len(), "pruned tree");
    }

    pub fn is_ignored(&self, id: NodeId) -> bool {
        self.ignored.contains(&id)
    }

    /// Nodes transcoded for the root: the subtree headline when scoped,
    /// otherwise the root's children
    pub fn body_roots(&self, tree: &Document) -> Vec<NodeId> {
        match self.scope {
            Some(headline) => vec![headline],
            None => tree.node(tree.root()).child_ids().to_vec(),
        }
    }

    /// Children of `id` that take part in the export
    pub fn visible_children(&self, tree: &Document, id: NodeId) -> Vec<NodeId> {
        let children = if id == tree.root() {
            self.body_roots(tree)
        } else {
            tree.node(id).child_ids().to_vec()
        };
        children.into_iter().filter(|c| !self.is_ignored(*c)).collect()
    }

    /// Whether `node` ends up in the output: inside the scope, with neither
    /// itself nor an owner ignored. Secondary nodes count through their owner.
    /// Footnote definitions and the footnote section are skipped in place but
    /// their bodies are written out with the footnotes, so they hide nothing.
    pub fn is_exported(&self, node: Node<'_>) -> bool {
        let lineage: Vec<Node<'_>> = std::iter::once(node).chain(node.ancestors()).collect();
        let in_scope = self
            .scope
            .map_or(true, |scope| lineage.iter().any(|n| n.id() == scope));
        let holds_footnotes = |n: &Node<'_>| {
            n.is(NodeKind::FootnoteDefinition)
                || (n.is(NodeKind::Headline) && n.flag(prop::FOOTNOTE_SECTION))
        };
        in_scope
            && !lineage
                .iter()
                .any(|n| self.is_ignored(n.id()) && !holds_footnotes(n))
    }

    /// Pre-order walk below `id` that skips ignored subtrees
    pub fn visible_descendants<'t>(&self, tree: &'t Document, id: NodeId) -> Vec<Node<'t>> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.visible_children(tree, id);
        stack.reverse();
        while let Some(next) = stack.pop() {
            out.push(tree.node(next));
            let mut children = self.visible_children(tree, next);
            children.reverse();
            stack.extend(children);
        }
        out
    }

    /// Collect minimum level, numbering and footnote definitions.
    /// Runs after the parse-tree filters, on the tree that gets transcoded.
    pub fn collect_tree_properties(&mut self, tree: &Document) {
        let headlines: Vec<Node<'_>> = self
            .visible_descendants(tree, tree.root())
            .into_iter()
            .filter(|n| n.is(NodeKind::Headline))
            .collect();

        self.min_level = headlines
            .iter()
            .filter_map(|h| h.int_property(prop::LEVEL))
            .filter_map(|l| usize::try_from(l).ok())
            .min()
            .unwrap_or(1)
            .max(1);

        let mut numbers = HashMap::new();
        let mut counters: Vec<usize> = Vec::new();
        for headline in &headlines {
            if headline.flag(prop::FOOTNOTE_SECTION) || !self.numbered(*headline) {
                continue;
            }
            let level = self.relative_level(*headline);
            counters.resize(level, 0);
            counters[level - 1] += 1;
            numbers.insert(headline.id(), counters.clone());
        }
        self.headline_numbers = numbers;

        // Definitions are ignored for transcoding but still looked up here
        self.footnote_definitions = tree
            .node(tree.root())
            .descendants()
            .filter(|n| n.is(NodeKind::FootnoteDefinition))
            .filter_map(|n| Some((n.str_property(prop::LABEL)?.to_string(), n.id())))
            .fold(HashMap::new(), |mut acc, (label, id)| {
                acc.entry(label).or_insert(id);
                acc
            });

        debug!(
            min_level = self.min_level,
            numbered = self.headline_numbers.len(),
            definitions = self.footnote_definitions.len(),
            "collected tree properties"
        );
    }

    fn numbered(&self, headline: Node<'_>) -> bool {
        let unnumbered = std::iter::once(headline)
            .chain(headline.ancestors())
            .filter(|n| n.is(NodeKind::Headline))
            .any(|n| n.flag(prop::UNNUMBERED));
        if unnumbered {
            return false;
        }
        match self.option(options::SECTION_NUMBERS) {
            Some(Value::Integer(depth)) => {
                i64::try_from(self.relative_level(headline)).is_ok_and(|l| l <= *depth)
            }
            Some(value) => value.is_truthy(),
            None => true,
        }
    }

    /// Level of a headline relative to the shallowest exported one
    pub fn relative_level(&self, headline: Node<'_>) -> usize {
        let level = headline
            .int_property(prop::LEVEL)
            .and_then(|l| usize::try_from(l).ok())
            .unwrap_or(1);
        (level + 1).saturating_sub(self.min_level).max(1)
    }

    /// Whether the headline is deeper than `headline-levels`
    pub fn is_low_level(&self, headline: Node<'_>) -> bool {
        self.relative_level(headline) > self.headline_levels()
    }

    /// Number sequence of a numbered headline
    pub fn headline_number(&self, headline: NodeId) -> Option<&[usize]> {
        self.headline_numbers.get(&headline).map(Vec::as_slice)
    }

    pub fn footnote_definition(&self, label: &str) -> Option<NodeId> {
        self.footnote_definitions.get(label).copied()
    }

    /// Stable reference for a node, assigned on first request
    pub fn reference(&self, id: NodeId) -> String {
        let mut caches = self.caches.borrow_mut();
        if let Some(existing) = caches.references.get(&id) {
            return existing.clone();
        }
        let mut attempt = 0u64;
        let reference = loop {
            let candidate = reference_candidate(id, attempt);
            if !caches.taken.contains(&candidate) {
                break candidate;
            }
            attempt += 1;
        };
        caches.taken.insert(reference.clone());
        caches.references.insert(id, reference.clone());
        reference
    }

    /// Note a footnote reference and return its number
    pub fn record_footnote(&self, reference: Node<'_>) -> FootnoteMark {
        let label = reference.str_property(prop::LABEL);
        let key = match label {
            Some(label) => FootnoteKey::Label(label.to_string()),
            None => FootnoteKey::Anonymous(reference.id()),
        };

        let mut caches = self.caches.borrow_mut();
        if let Some(&index) = caches.footnote_index.get(&key) {
            let entry = &caches.footnotes[index];
            return FootnoteMark {
                number: entry.number,
                first: entry.first_reference == reference.id(),
            };
        }

        let body = if !reference.nodes_property(prop::INLINE_DEFINITION).is_empty() {
            FootnoteBody::Inline(reference.id())
        } else if let Some(definition) = label.and_then(|l| self.footnote_definition(l)) {
            FootnoteBody::Definition(definition)
        } else {
            FootnoteBody::Missing
        };
        let number = caches.footnotes.len() + 1;
        caches.footnotes.push(FootnoteEntry {
            number,
            label: label.map(str::to_string),
            body,
            first_reference: reference.id(),
        });
        caches.footnote_index.insert(key, number - 1);
        FootnoteMark {
            number,
            first: true,
        }
    }

    /// Headlines that need an anchor, computed by `collect` once per export
    pub fn anchor_targets(&self, collect: impl FnOnce() -> HashSet<NodeId>) -> &HashSet<NodeId> {
        self.anchor_targets.get_or_init(collect)
    }

    pub fn footnote_count(&self) -> usize {
        self.caches.borrow().footnotes.len()
    }

    /// Footnote by 1-based number
    pub fn footnote(&self, number: usize) -> Option<FootnoteEntry> {
        self.caches
            .borrow()
            .footnotes
            .get(number.checked_sub(1)?)
            .cloned()
    }
}

/// `org` followed by seven hex digits, derived from the node index
fn reference_candidate(id: NodeId, attempt: u64) -> String {
    let mut x = (id.index() as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ attempt.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x ^= x >> 31;
    x = x.wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^= x >> 29;
    format!("org{:07x}", x & 0x0fff_ffff)
}
