// SPDX-License-Identifier: AGPL-3.0-or-later
//! Headlines: ATX and Setext headings, or list items past their depth

use super::{pad_bullet, toc, HEADLINE_STYLE, TOPLEVEL_HLEVEL};
use crate::ast::{prop, Node, NodeId, NodeKind, Value};
use crate::formats::html::headline_anchor;
use crate::formats::indent;
use crate::options;
use crate::resolve::Resolution;
use crate::transcoder::Transcoder;
use crate::traits::Result;
use std::collections::HashSet;
use unicode_segmentation::UnicodeSegmentation;

/// How headings are marked up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadlineStyle {
    /// `#` markers at every level
    Atx,
    /// Underlines only, for levels 1 and 2
    Setext,
    /// Underlines for levels 1 and 2, `#` markers below
    Mixed,
}

impl HeadlineStyle {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "atx" => Some(Self::Atx),
            "setext" => Some(Self::Setext),
            "mixed" => Some(Self::Mixed),
            _ => None,
        }
    }

    /// Deepest level this style can express as a heading
    pub const fn max_level(self) -> usize {
        match self {
            Self::Setext => 2,
            Self::Atx | Self::Mixed => 6,
        }
    }

    fn underlines(self, level: usize) -> bool {
        matches!(self, Self::Setext | Self::Mixed) && level < 3
    }
}

pub(super) fn style(tx: &Transcoder<'_>) -> Option<HeadlineStyle> {
    tx.context()
        .string(HEADLINE_STYLE)
        .and_then(HeadlineStyle::parse)
}

pub(super) fn toplevel(tx: &Transcoder<'_>) -> usize {
    tx.context()
        .integer(TOPLEVEL_HLEVEL)
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(1)
        .max(1)
}

/// A heading line with its surrounding blank lines
pub(super) fn headline_title(
    style: HeadlineStyle,
    level: usize,
    title: &str,
    anchor: Option<&str>,
    tags: &str,
) -> String {
    let anchor = anchor.map(|a| format!("{a}\n\n")).unwrap_or_default();
    if style.underlines(level) {
        let mark = if level == 1 { "=" } else { "-" };
        let underline = mark.repeat(title.graphemes(true).count());
        format!("\n{anchor}{title}{tags}\n{underline}\n\n")
    } else {
        format!("\n{anchor}{} {title}{tags}\n\n", "#".repeat(level))
    }
}

/// Tags shown for a headline, without the select and exclude markers
pub(super) fn visible_tags<'t>(node: Node<'t>, tx: &Transcoder<'_>) -> Vec<&'t str> {
    let ctx = tx.context();
    let hidden = |t: &String| {
        ctx.list(options::SELECT_TAGS).contains(t) || ctx.list(options::EXCLUDE_TAGS).contains(t)
    };
    node.list_property(prop::TAGS)
        .iter()
        .filter(|t| !hidden(t))
        .map(String::as_str)
        .collect()
}

/// `:a:b:`, or nothing without tags
pub(super) fn tag_string(tags: &[&str]) -> String {
    if tags.is_empty() {
        String::new()
    } else {
        format!(":{}:", tags.join(":"))
    }
}

fn priority(node: Node<'_>) -> Option<String> {
    match node.property(prop::PRIORITY)? {
        Value::String(s) => Some(s.clone()),
        Value::Integer(n) => u32::try_from(*n).ok().and_then(char::from_u32).map(String::from),
        _ => None,
    }
}

fn is_internal(link: Node<'_>) -> bool {
    matches!(
        link.str_property(prop::TYPE),
        Some("custom-id" | "id" | "fuzzy")
    )
}

/// Headlines a table of contents or an exported internal link points at
fn anchor_targets(tx: &Transcoder<'_>) -> HashSet<NodeId> {
    let ctx = tx.context();
    let tree = tx.tree();
    let mut targets = HashSet::new();

    if let Some(depth) = ctx.option(options::WITH_TOC).filter(|v| v.is_truthy()) {
        targets.extend(toc::collect_headlines(tx, toc::depth_of(depth), None).iter().map(|h| h.id()));
    }

    // `#+TOC:` keywords in the first section of a headline, or of the
    // document, point at headlines below it
    let owners = std::iter::once(tree.node(tree.root()))
        .chain(tree.iter().filter(|n| n.is(NodeKind::Headline) && ctx.is_exported(*n)));
    for owner in owners {
        let Some(section) = owner.first_child().filter(|s| s.is(NodeKind::Section)) else {
            continue;
        };
        let keywords = ctx
            .visible_descendants(tree, section.id())
            .into_iter()
            .filter(|n| n.is(NodeKind::Keyword));
        for keyword in keywords {
            let listed = toc::keyword_headlines(keyword, tx);
            targets.extend(
                listed
                    .iter()
                    .filter(|h| h.ancestors().any(|a| a.id() == owner.id()))
                    .map(|h| h.id()),
            );
        }
    }

    let links = tree
        .iter()
        .filter(|n| n.is(NodeKind::Link) && is_internal(*n) && ctx.is_exported(*n));
    for link in links {
        if let Resolution::Node(id) = tx.resolver().resolve(link, ctx) {
            targets.insert(id);
        }
    }
    targets
}

/// Whether `node` needs an anchor
fn referred(node: Node<'_>, tx: &Transcoder<'_>) -> bool {
    tx.context()
        .anchor_targets(|| anchor_targets(tx))
        .contains(&node.id())
}

pub(super) fn headline(node: Node<'_>, contents: Option<&str>, tx: &Transcoder<'_>) -> Result<Option<String>> {
    if node.flag(prop::FOOTNOTE_SECTION) {
        return Ok(None);
    }
    let ctx = tx.context();
    let level = ctx.relative_level(node) + toplevel(tx) - 1;
    let title = tx.data(node.nodes_property(prop::TITLE))?;
    let todo = node
        .str_property(prop::TODO_KEYWORD)
        .filter(|_| ctx.flag(options::WITH_TODO_KEYWORDS))
        .map(|kw| format!("{kw} "))
        .unwrap_or_default();
    let priority = priority(node)
        .filter(|_| ctx.flag(options::WITH_PRIORITY))
        .map(|p| format!("[#{p}] "))
        .unwrap_or_default();
    let tags = if ctx.flag(options::WITH_TAGS) {
        let tags = visible_tags(node, tx);
        if tags.is_empty() {
            String::new()
        } else {
            format!("     {}", tag_string(&tags))
        }
    } else {
        String::new()
    };
    let heading = format!("{todo}{priority}{title}");
    let contents = contents.unwrap_or_default();

    let style = style(tx).filter(|s| level <= s.max_level() && !ctx.is_low_level(node));
    let Some(style) = style else {
        let bullet = match ctx.headline_number(node.id()).and_then(|n| n.last()) {
            Some(last) => format!("{last}."),
            None => "-".to_string(),
        };
        return Ok(Some(format!(
            "{}{heading}{tags}\n\n{}",
            pad_bullet(&bullet),
            indent(contents, 4)
        )));
    };

    let anchor = referred(node, tx).then(|| format!("<a id=\"{}\"></a>", headline_anchor(node, tx)));
    Ok(Some(format!(
        "{}{contents}",
        headline_title(style, level, &heading, anchor.as_deref(), &tags)
    )))
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::ast::{Document, Value};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_deep_atx_headline_degrades_to_list_item() {
        let mut doc = Document::new();
        let top = doc.push_headline(doc.root(), 1, "Top");
        let deep = doc.push_headline(top, 8, "Deep");
        section(&mut doc, deep, "body");
        let out = export(
            doc,
            &[
                ("headline-levels", Value::Integer(10)),
                ("section-numbers", Value::Bool(false)),
            ],
        );
        assert_eq!(out, "\n# Top\n\n-   Deep\n\n    body\n");
        assert!(!out.contains("########"));
        assert_eq!(heading_levels(&out), vec![1]);
        assert_eq!(list_items(&out), 1);
    }

    #[test]
    fn test_low_level_headline_uses_its_number() {
        let mut doc = Document::new();
        let top = doc.push_headline(doc.root(), 1, "Top");
        doc.push_headline(top, 2, "First");
        doc.push_headline(top, 2, "Second");
        let out = export(doc, &[("headline-levels", Value::Integer(1))]);
        assert_eq!(out, "\n# Top\n\n1.  First\n\n2.  Second\n");
    }

    #[test]
    fn test_setext_underlines_title_length() {
        let mut doc = Document::new();
        let intro = doc.push_headline(doc.root(), 1, "Intro");
        section(&mut doc, intro, "Text.");
        let out = export(doc, &[("md-headline-style", "setext".into())]);
        assert_eq!(out, "\nIntro\n=====\n\nText.\n");
        assert_eq!(heading_levels(&out), vec![1]);
    }

    #[test]
    fn test_setext_level_three_degrades() {
        let mut doc = Document::new();
        let a = doc.push_headline(doc.root(), 1, "A");
        let b = doc.push_headline(a, 2, "B");
        doc.push_headline(b, 3, "C");
        let out = export(
            doc,
            &[
                ("md-headline-style", "setext".into()),
                ("section-numbers", Value::Bool(false)),
            ],
        );
        assert_eq!(out, "\nA\n=\n\n\nB\n-\n\n-   C\n");
    }

    #[test]
    fn test_mixed_style_switches_to_atx_at_level_three() {
        let mut doc = Document::new();
        let a = doc.push_headline(doc.root(), 1, "Über");
        let b = doc.push_headline(a, 2, "B");
        doc.push_headline(b, 3, "C");
        let out = export(doc, &[("md-headline-style", "mixed".into())]);
        assert_eq!(out, "\nÜber\n====\n\n\nB\n-\n\n\n### C\n");
        assert_eq!(heading_levels(&out), vec![1, 2, 3]);
    }

    #[test]
    fn test_unknown_style_degrades_everything() {
        let mut doc = Document::new();
        doc.push_headline(doc.root(), 1, "Only");
        let out = export(
            doc,
            &[
                ("md-headline-style", "fancy".into()),
                ("section-numbers", Value::Bool(false)),
            ],
        );
        assert_eq!(out, "-   Only\n");
    }

    #[test]
    fn test_toplevel_shifts_levels() {
        let mut doc = Document::new();
        doc.push_headline(doc.root(), 1, "Shifted");
        let out = export(doc, &[("md-toplevel-hlevel", Value::Integer(3))]);
        assert_eq!(out, "\n### Shifted\n");
    }

    #[test]
    fn test_todo_priority_and_tags() {
        let mut doc = Document::new();
        let h = doc.push_headline(doc.root(), 1, "Task");
        doc.set(h, prop::TODO_KEYWORD, "TODO");
        doc.set(h, prop::PRIORITY, "A");
        doc.set(h, prop::TAGS, vec!["work".to_string(), "export".to_string()]);
        let out = export(doc, &[("with-priority", Value::Bool(true))]);
        assert_eq!(out, "\n# TODO [#A] Task     :work:\n");
    }

    #[test]
    fn test_anchor_only_when_linked() {
        let mut doc = Document::new();
        let target = doc.push_headline(doc.root(), 1, "Target");
        doc.set(target, prop::CUSTOM_ID, "here");
        let other = doc.push_headline(doc.root(), 1, "Other");
        let section = doc.append(other, NodeKind::Section);
        let para = doc.append(section, NodeKind::Paragraph);
        let link = doc.append(para, NodeKind::Link);
        doc.set(link, prop::TYPE, "custom-id");
        doc.set(link, prop::PATH, "here");
        doc.set(link, prop::RAW_LINK, "#here");

        let out = export(doc, &[]);
        assert_eq!(
            out,
            "\n<a id=\"here\"></a>\n\n# Target\n\n\n# Other\n\n[1](#here)\n"
        );
    }

    #[test]
    fn test_links_in_excluded_subtrees_add_no_anchor() {
        let mut doc = Document::new();
        let target = doc.push_headline(doc.root(), 1, "Target");
        doc.set(target, prop::CUSTOM_ID, "tgt");
        let hidden = doc.push_headline(doc.root(), 1, "Hidden");
        doc.set(hidden, prop::TAGS, vec!["noexport".to_string()]);
        let section = doc.append(hidden, NodeKind::Section);
        let para = doc.append(section, NodeKind::Paragraph);
        let link = doc.append(para, NodeKind::Link);
        doc.set(link, prop::TYPE, "custom-id");
        doc.set(link, prop::PATH, "tgt");
        doc.set(link, prop::RAW_LINK, "#tgt");
        doc.append_text(link, "here");

        let out = export(doc, &[]);
        assert!(out.contains("# Target"));
        assert!(!out.contains("Hidden"));
        assert!(!out.contains("<a id"), "{out}");
    }

    #[test]
    fn test_link_in_footnote_adds_anchor() {
        let mut doc = Document::new();
        let target = doc.push_headline(doc.root(), 1, "Target");
        doc.set(target, prop::CUSTOM_ID, "tgt");
        let section = doc.append(target, NodeKind::Section);
        let para = doc.append(section, NodeKind::Paragraph);
        let fnref = doc.append(para, NodeKind::FootnoteReference);
        doc.set(fnref, prop::LABEL, "1");
        let def = doc.append(doc.root(), NodeKind::FootnoteDefinition);
        doc.set(def, prop::LABEL, "1");
        let body = doc.append(def, NodeKind::Paragraph);
        let link = doc.append(body, NodeKind::Link);
        doc.set(link, prop::TYPE, "custom-id");
        doc.set(link, prop::PATH, "tgt");
        doc.set(link, prop::RAW_LINK, "#tgt");

        let out = export(doc, &[]);
        assert!(out.starts_with("\n<a id=\"tgt\"></a>\n\n# Target\n"), "{out}");
    }

    #[test]
    fn test_link_in_title_adds_anchor() {
        let mut doc = Document::new();
        let target = doc.push_headline(doc.root(), 1, "Target");
        doc.set(target, prop::CUSTOM_ID, "tgt");
        let other = doc.push_headline(doc.root(), 1, "See ");
        let link = doc.append_secondary(other, prop::TITLE, NodeKind::Link);
        doc.set(link, prop::TYPE, "custom-id");
        doc.set(link, prop::PATH, "tgt");
        doc.set(link, prop::RAW_LINK, "#tgt");
        doc.append_text(link, "target");

        let out = export(doc, &[]);
        assert!(out.starts_with("\n<a id=\"tgt\"></a>\n\n# Target\n"), "{out}");
    }

    #[test]
    fn test_footnote_section_headline_is_dropped() {
        let mut doc = Document::new();
        let notes = doc.push_headline(doc.root(), 1, "Footnotes");
        doc.set(notes, prop::FOOTNOTE_SECTION, true);
        section(&mut doc, notes, "hidden");
        assert_eq!(export(doc, &[]), "");
    }
}
