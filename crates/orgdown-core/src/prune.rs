// SPDX-License-Identifier: AGPL-3.0-or-later
//! Which nodes take no part in an export

use crate::ast::{prop, Document, Node, NodeId, NodeKind, Value};
use crate::context::ExportContext;
use crate::options;
use std::collections::HashSet;

fn enabled(ctx: &ExportContext, key: &str, default: bool) -> bool {
    ctx.option(key).map_or(default, Value::is_truthy)
}

fn has_any_tag(headline: Node<'_>, tags: &[String]) -> bool {
    headline
        .list_property(prop::TAGS)
        .iter()
        .any(|t| tags.contains(t))
}

/// Headlines kept by `select-tags`, or `None` when no headline carries one
fn selected_trees(tree: &Document, ctx: &ExportContext) -> Option<HashSet<NodeId>> {
    let select = ctx.list(options::SELECT_TAGS);
    let roots: Vec<Node<'_>> = tree
        .node(tree.root())
        .descendants()
        .filter(|n| n.is(NodeKind::Headline) && has_any_tag(*n, select))
        .collect();
    if roots.is_empty() {
        return None;
    }
    let mut keep = HashSet::new();
    for headline in roots {
        keep.insert(headline.id());
        keep.extend(headline.ancestors().map(|n| n.id()));
        keep.extend(headline.descendants().map(|n| n.id()));
    }
    Some(keep)
}

fn drawer_ignored(drawer: Node<'_>, ctx: &ExportContext) -> bool {
    match ctx.option(options::WITH_DRAWERS) {
        Some(Value::List(names)) => {
            let name = drawer.str_property(prop::NAME).unwrap_or("");
            !names.iter().any(|n| n.eq_ignore_ascii_case(name))
        }
        Some(value) => !value.is_truthy(),
        None => false,
    }
}

fn should_ignore(node: Node<'_>, ctx: &ExportContext, selected: Option<&HashSet<NodeId>>) -> bool {
    match node.kind() {
        NodeKind::Comment | NodeKind::CommentBlock | NodeKind::FootnoteDefinition => true,
        NodeKind::Headline => {
            node.flag(prop::COMMENTED)
                || node.flag(prop::FOOTNOTE_SECTION)
                || has_any_tag(node, ctx.list(options::EXCLUDE_TAGS))
                || selected.is_some_and(|keep| !keep.contains(&node.id()))
                || (!enabled(ctx, options::WITH_TASKS, true)
                    && node.str_property(prop::TODO_KEYWORD).is_some())
        }
        NodeKind::Drawer => drawer_ignored(node, ctx),
        NodeKind::PropertyDrawer => !enabled(ctx, options::WITH_PROPERTIES, false),
        NodeKind::Planning => !enabled(ctx, options::WITH_PLANNING, false),
        NodeKind::Clock => !enabled(ctx, options::WITH_CLOCKS, false),
        NodeKind::Timestamp => !enabled(ctx, options::WITH_TIMESTAMPS, true),
        NodeKind::StatisticsCookie => !enabled(ctx, options::WITH_STATISTICS_COOKIES, true),
        NodeKind::FootnoteReference => !enabled(ctx, options::WITH_FOOTNOTES, true),
        _ => false,
    }
}

/// Ignore set for `tree` under the options and scope of `ctx`.
///
/// An ignored node hides its whole subtree; only the node itself is listed.
pub(crate) fn ignored_nodes(tree: &Document, ctx: &ExportContext) -> HashSet<NodeId> {
    let selected = selected_trees(tree, ctx);
    let scope_path: HashSet<NodeId> = ctx
        .scope()
        .map(|s| tree.node(s).ancestors().map(|n| n.id()).collect())
        .unwrap_or_default();

    let mut ignored = HashSet::new();
    let root = tree.node(tree.root());
    let mut stack: Vec<(NodeId, bool)> = root
        .child_ids()
        .iter()
        .rev()
        .map(|id| (*id, ctx.scope().is_none()))
        .collect();

    while let Some((id, inside)) = stack.pop() {
        let node = tree.node(id);
        let inside = inside || ctx.scope() == Some(id);
        if !inside && !scope_path.contains(&id) {
            ignored.insert(id);
            continue;
        }
        if inside && should_ignore(node, ctx, selected.as_ref()) {
            ignored.insert(id);
            continue;
        }
        stack.extend(node.child_ids().iter().rev().map(|c| (*c, inside)));
    }
    ignored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;

    fn ignored_with(doc: &Document, options: Options) -> HashSet<NodeId> {
        let ctx = ExportContext::new("md", options);
        ignored_nodes(doc, &ctx)
    }

    #[test]
    fn test_exclude_tags_and_comments() {
        let mut doc = Document::new();
        let keep = doc.push_headline(doc.root(), 1, "Keep");
        let drop = doc.push_headline(doc.root(), 1, "Drop");
        doc.set(drop, prop::TAGS, vec!["noexport".to_string()]);
        let child = doc.push_headline(drop, 2, "Child");
        let comment = doc.append(keep, NodeKind::Comment);
        let options = Options::from([(
            options::EXCLUDE_TAGS.to_string(),
            Value::List(vec!["noexport".into()]),
        )]);

        let ignored = ignored_with(&doc, options);
        assert!(ignored.contains(&drop));
        assert!(ignored.contains(&comment));
        assert!(!ignored.contains(&keep));
        // Hidden through its parent, not listed itself
        assert!(!ignored.contains(&child));
    }

    #[test]
    fn test_select_tags_keep_only_selected_trees() {
        let mut doc = Document::new();
        let parent = doc.push_headline(doc.root(), 1, "Parent");
        let chosen = doc.push_headline(parent, 2, "Chosen");
        doc.set(chosen, prop::TAGS, vec!["export".to_string()]);
        let sibling = doc.push_headline(parent, 2, "Sibling");
        let other = doc.push_headline(doc.root(), 1, "Other");
        let options = Options::from([(
            options::SELECT_TAGS.to_string(),
            Value::List(vec!["export".into()]),
        )]);

        let ignored = ignored_with(&doc, options);
        assert!(!ignored.contains(&parent));
        assert!(!ignored.contains(&chosen));
        assert!(ignored.contains(&sibling));
        assert!(ignored.contains(&other));
    }

    #[test]
    fn test_drawer_list_and_defaults() {
        let mut doc = Document::new();
        let h = doc.push_headline(doc.root(), 1, "H");
        let section = doc.append(h, NodeKind::Section);
        let logbook = doc.append(section, NodeKind::Drawer);
        doc.set(logbook, prop::NAME, "LOGBOOK");
        let notes = doc.append(section, NodeKind::Drawer);
        doc.set(notes, prop::NAME, "notes");
        let props = doc.append(section, NodeKind::PropertyDrawer);
        let options = Options::from([(
            options::WITH_DRAWERS.to_string(),
            Value::List(vec!["NOTES".into()]),
        )]);

        let ignored = ignored_with(&doc, options);
        assert!(ignored.contains(&logbook));
        assert!(!ignored.contains(&notes));
        assert!(ignored.contains(&props));
    }

    #[test]
    fn test_footnote_section_is_pruned() {
        let mut doc = Document::new();
        let notes = doc.push_headline(doc.root(), 1, "Footnotes");
        doc.set(notes, prop::FOOTNOTE_SECTION, true);
        assert!(ignored_with(&doc, Options::new()).contains(&notes));
    }

    #[test]
    fn test_definitions_always_ignored() {
        let mut doc = Document::new();
        let def = doc.append(doc.root(), NodeKind::FootnoteDefinition);
        assert!(ignored_with(&doc, Options::new()).contains(&def));
    }
}
