// SPDX-License-Identifier: AGPL-3.0-or-later
//! Link classification and target resolution

use crate::ast::{prop, Document, Node, NodeKind};
use crate::context::ExportContext;
use std::collections::HashMap;
use std::fmt;

/// Parts of a raw Org link target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkParts {
    pub link_type: String,
    pub path: String,
    pub search_option: Option<String>,
}

fn is_scheme(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-')
}

/// Split a raw link into type, path and search option
pub fn classify_link(raw: &str) -> LinkParts {
    let raw = raw.trim();
    let parts = |link_type: &str, path: &str| LinkParts {
        link_type: link_type.to_string(),
        path: path.to_string(),
        search_option: None,
    };

    if let Some(id) = raw.strip_prefix('#') {
        return parts("custom-id", id);
    }
    if raw.starts_with('*') {
        return parts("fuzzy", raw);
    }
    if let Some(label) = raw.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        return parts("coderef", label);
    }
    let (link_type, path) = if raw.starts_with('/')
        || raw.starts_with("./")
        || raw.starts_with("../")
        || raw.starts_with('~')
    {
        ("file", raw)
    } else {
        match raw.split_once(':') {
            Some((scheme, rest)) if is_scheme(scheme) => (scheme, rest),
            _ => return parts("fuzzy", raw),
        }
    };

    if link_type == "file" {
        if let Some((file, search)) = path.split_once("::") {
            return LinkParts {
                link_type: "file".into(),
                path: file.to_string(),
                search_option: Some(search.to_string()),
            };
        }
    }
    parts(link_type, path)
}

/// Outcome of resolving an internal link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A node of the exported tree
    Node(crate::ast::NodeId),
    /// A location outside the tree, usually another file
    External(String),
    Unresolved,
}

/// Position of a node among its numbered peers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ordinal {
    Number(usize),
    /// Hierarchical number, rendered dotted
    Sequence(Vec<usize>),
}

impl fmt::Display for Ordinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ordinal::Number(n) => write!(f, "{n}"),
            Ordinal::Sequence(numbers) => {
                let dotted: Vec<String> = numbers.iter().map(usize::to_string).collect();
                f.write_str(&dotted.join("."))
            }
        }
    }
}

/// Reference resolution used by link translators
pub trait Resolver {
    /// Resolve `path` of an internal link type (`custom-id`, `id`, `fuzzy`,
    /// `radio`)
    fn resolve_path(
        &self,
        tree: &Document,
        ctx: &ExportContext,
        link_type: &str,
        path: &str,
    ) -> Resolution;

    /// Resolve a link node
    fn resolve(&self, link: Node<'_>, ctx: &ExportContext) -> Resolution {
        let link_type = link.str_property(prop::TYPE).unwrap_or("fuzzy");
        let path = link.str_property(prop::PATH).unwrap_or_default();
        self.resolve_path(link.tree(), ctx, link_type, path)
    }

    /// Value a `coderef` link stands for: the label or a line number
    fn resolve_coderef(&self, tree: &Document, ctx: &ExportContext, label: &str) -> Option<String>;

    fn ordinal(&self, node: Node<'_>, ctx: &ExportContext) -> Option<Ordinal>;
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolver searching the exported tree
#[derive(Debug, Clone, Default)]
pub struct TreeResolver {
    external_ids: HashMap<String, String>,
}

impl TreeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locations of ids defined in other files, as `id → file`
    pub fn with_external_ids(mut self, ids: HashMap<String, String>) -> Self {
        self.external_ids = ids;
        self
    }

    fn find<'t>(
        tree: &'t Document,
        ctx: &ExportContext,
        matches: impl Fn(Node<'t>) -> bool,
    ) -> Option<Node<'t>> {
        ctx.visible_descendants(tree, tree.root())
            .into_iter()
            .find(|n| matches(*n))
    }

    fn fuzzy<'t>(tree: &'t Document, ctx: &ExportContext, path: &str) -> Option<Node<'t>> {
        let headline_titled = |wanted: &str| {
            let wanted = normalize(wanted);
            move |n: Node<'t>| {
                n.is(NodeKind::Headline)
                    && n.str_property(prop::RAW_TITLE).map(normalize).as_deref() == Some(wanted.as_str())
            }
        };

        if let Some(title) = path.strip_prefix('*') {
            return Self::find(tree, ctx, headline_titled(title));
        }
        let wanted = normalize(path);
        Self::find(tree, ctx, |n| {
            n.is(NodeKind::Target) && n.str_property(prop::VALUE).map(normalize) == Some(wanted.clone())
        })
        .or_else(|| {
            Self::find(tree, ctx, |n| {
                n.str_property(prop::NAME).map(normalize) == Some(wanted.clone())
                    && !n.is(NodeKind::Drawer)
            })
        })
        .or_else(|| Self::find(tree, ctx, headline_titled(path)))
    }

    fn position_in_parent(node: Node<'_>) -> usize {
        node.parent().map_or(1, |p| {
            p.children()
                .filter(|c| c.is(node.kind()))
                .position(|c| c.id() == node.id())
                .map_or(1, |i| i + 1)
        })
    }
}

impl Resolver for TreeResolver {
    fn resolve_path(
        &self,
        tree: &Document,
        ctx: &ExportContext,
        link_type: &str,
        path: &str,
    ) -> Resolution {
        let found = match link_type {
            "custom-id" => Self::find(tree, ctx, |n| {
                n.is(NodeKind::Headline) && n.str_property(prop::CUSTOM_ID) == Some(path)
            }),
            "id" => {
                let local = Self::find(tree, ctx, |n| {
                    n.is(NodeKind::Headline) && n.str_property(prop::ID) == Some(path)
                });
                if local.is_none() {
                    if let Some(file) = self.external_ids.get(path) {
                        return Resolution::External(file.clone());
                    }
                }
                local
            }
            "fuzzy" => Self::fuzzy(tree, ctx, path),
            "radio" => {
                let wanted = normalize(path).to_lowercase();
                Self::find(tree, ctx, |n| {
                    n.is(NodeKind::RadioTarget)
                        && n.str_property(prop::VALUE)
                            .map(|v| normalize(v).to_lowercase())
                            == Some(wanted.clone())
                })
            }
            _ => None,
        };
        found.map_or(Resolution::Unresolved, |n| Resolution::Node(n.id()))
    }

    fn resolve_coderef(&self, tree: &Document, ctx: &ExportContext, label: &str) -> Option<String> {
        let marker = format!("(ref:{label})");
        ctx.visible_descendants(tree, tree.root())
            .into_iter()
            .filter(|n| n.is(NodeKind::SrcBlock) || n.is(NodeKind::ExampleBlock))
            .find_map(|block| {
                let value = block.str_property(prop::VALUE)?;
                let line = value.lines().position(|l| l.contains(&marker))? + 1;
                let use_labels = block
                    .property(prop::USE_LABELS)
                    .map_or(true, |v| v.is_truthy());
                Some(if use_labels {
                    label.to_string()
                } else {
                    line.to_string()
                })
            })
    }

    fn ordinal(&self, node: Node<'_>, ctx: &ExportContext) -> Option<Ordinal> {
        match node.kind() {
            NodeKind::Headline => ctx
                .headline_number(node.id())
                .map(|n| Ordinal::Sequence(n.to_vec())),
            NodeKind::Item => {
                let mut chain: Vec<usize> = std::iter::once(node)
                    .chain(node.ancestors())
                    .filter(|n| n.is(NodeKind::Item))
                    .map(Self::position_in_parent)
                    .collect();
                chain.reverse();
                Some(Ordinal::Sequence(chain))
            }
            NodeKind::Target => node
                .lineage(&[NodeKind::Headline, NodeKind::Item, NodeKind::Table])
                .and_then(|owner| self.ordinal(owner, ctx)),
            NodeKind::Table
            | NodeKind::SrcBlock
            | NodeKind::ExampleBlock
            | NodeKind::LatexEnvironment
            | NodeKind::Paragraph => {
                let numbered =
                    |n: &Node<'_>| n.property(prop::CAPTION).is_some() || n.property(prop::NAME).is_some();
                if !numbered(&node) {
                    return None;
                }
                let tree = node.tree();
                ctx.visible_descendants(tree, tree.root())
                    .into_iter()
                    .filter(|n| n.is(node.kind()) && numbered(n))
                    .position(|n| n.id() == node.id())
                    .map(|i| Ordinal::Number(i + 1))
            }
            _ => None,
        }
    }
}
