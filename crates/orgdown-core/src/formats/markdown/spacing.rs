// SPDX-License-Identifier: AGPL-3.0-or-later
//! Blank lines between Markdown blocks

use crate::ast::{Document, Node, NodeClass, NodeId, NodeKind};
use crate::backend::Backend;
use crate::context::ExportContext;
use crate::traits::Result;
use tracing::debug;

fn visible_siblings<'t>(node: Node<'t>, ctx: &ExportContext) -> Vec<Node<'t>> {
    node.parent()
        .map(|p| {
            p.children()
                .filter(|c| !ctx.is_ignored(c.id()))
                .collect()
        })
        .unwrap_or_default()
}

/// A paragraph opening an item and followed only by a sublist stays glued
/// to it, so the list remains tight
fn is_tight_lead(node: Node<'_>, ctx: &ExportContext) -> bool {
    if !node.is(NodeKind::Paragraph) || !node.parent().is_some_and(|p| p.is(NodeKind::Item)) {
        return false;
    }
    let siblings = visible_siblings(node, ctx);
    let Some(position) = siblings.iter().position(|s| s.id() == node.id()) else {
        return false;
    };
    position == 0
        && siblings.len() == 2
        && siblings[1].is(NodeKind::PlainList)
}

/// Give every element one trailing blank line, items and table rows aside
pub fn separate_elements(
    mut tree: Document,
    _: &Backend,
    ctx: &ExportContext,
) -> Result<Document> {
    let decisions: Vec<(NodeId, usize)> = tree
        .iter()
        .filter(|n| n.kind().class() == NodeClass::Element)
        .filter(|n| !matches!(n.kind(), NodeKind::Item | NodeKind::TableRow))
        .map(|n| (n.id(), if is_tight_lead(n, ctx) { 0 } else { 1 }))
        .collect();
    debug!(elements = decisions.len(), "separating elements");
    for (id, blank) in decisions {
        tree.set_post_blank(id, blank);
    }
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;
    use pretty_assertions::assert_eq;

    fn separated(doc: Document) -> Document {
        let mut ctx = ExportContext::new("md", Options::new());
        ctx.prune(&doc);
        separate_elements(doc, &Backend::new("md"), &ctx).unwrap()
    }

    #[test]
    fn test_elements_get_one_blank_line() {
        let mut doc = Document::new();
        let para = doc.append(doc.root(), NodeKind::Paragraph);
        doc.set_post_blank(para, 4);
        let text = doc.append_text(para, "x");
        let list = doc.append(doc.root(), NodeKind::PlainList);
        let item = doc.append(list, NodeKind::Item);
        doc.set_post_blank(item, 2);

        let doc = separated(doc);
        assert_eq!(doc.node(para).post_blank(), 1);
        assert_eq!(doc.node(list).post_blank(), 1);
        assert_eq!(doc.node(item).post_blank(), 2);
        assert_eq!(doc.node(text).post_blank(), 0);
    }

    #[test]
    fn test_item_lead_paragraph_before_sublist_is_tight() {
        let mut doc = Document::new();
        let list = doc.append(doc.root(), NodeKind::PlainList);
        let tight = doc.append(list, NodeKind::Item);
        let lead = doc.append(tight, NodeKind::Paragraph);
        let sublist = doc.append(tight, NodeKind::PlainList);

        let loose = doc.append(list, NodeKind::Item);
        let first = doc.append(loose, NodeKind::Paragraph);
        doc.append(loose, NodeKind::PlainList);
        let trailing = doc.append(loose, NodeKind::Paragraph);

        let doc = separated(doc);
        assert_eq!(doc.node(lead).post_blank(), 0);
        assert_eq!(doc.node(sublist).post_blank(), 1);
        assert_eq!(doc.node(first).post_blank(), 1);
        assert_eq!(doc.node(trailing).post_blank(), 1);
    }

    #[test]
    fn test_ignored_siblings_do_not_count() {
        let mut doc = Document::new();
        let list = doc.append(doc.root(), NodeKind::PlainList);
        let item = doc.append(list, NodeKind::Item);
        let lead = doc.append(item, NodeKind::Paragraph);
        doc.append(item, NodeKind::PlainList);
        doc.append(item, NodeKind::Comment);

        let doc = separated(doc);
        assert_eq!(doc.node(lead).post_blank(), 0);
    }
}
