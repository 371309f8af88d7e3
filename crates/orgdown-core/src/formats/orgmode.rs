// SPDX-License-Identifier: AGPL-3.0-or-later
//! Org reader using orgize
//!
//! Walks the orgize event stream and rebuilds it as a [`Document`]. Titles,
//! footnote definitions written inline and affiliated `#+NAME:` and
//! `#+CAPTION:` keywords end up as properties of their owner, so the
//! exporter never has to look sideways in the tree.

use crate::ast::{prop, Document, NodeClass, NodeId, NodeKind};
use crate::resolve::classify_link;
use crate::traits::{ParseConfig, Parser, Result};
use once_cell::sync::Lazy;
use orgize::elements::{Element, Table, TableRow};
use orgize::{Event, Org};
use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, trace};

static CHECKBOX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[([ X-])\][ \t]+").expect("valid regex"));
static COUNTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[@([0-9]+)\][ \t]+").expect("valid regex"));
static DESCRIPTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^\n]*?)[ \t]+::(?:[ \t]+|$)").expect("valid regex"));

/// Org-mode format handler
pub struct OrgModeHandler;

impl OrgModeHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OrgModeHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for OrgModeHandler {
    fn parse(&self, input: &str, config: &ParseConfig) -> Result<Document> {
        let org = Org::parse(input);
        let mut builder = TreeBuilder::new(config);
        for event in org.iter() {
            match event {
                Event::Start(element) => builder.start(element),
                Event::End(_) => builder.end(),
            }
        }
        let mut doc = builder.finish();
        list_item_markers(&mut doc);
        radio_target_values(&mut doc);
        debug!(nodes = doc.len(), "parsed org document");
        Ok(doc)
    }
}

/// Where the objects of the element being read go
#[derive(Debug, Clone, Copy)]
enum Slot {
    Node(NodeId),
    /// Objects of a secondary string, such as a headline title
    Secondary { owner: NodeId, key: &'static str },
    /// An element the tree does not keep, with everything inside it
    Skip,
}

struct TreeBuilder<'c> {
    doc: Document,
    stack: Vec<Slot>,
    config: &'c ParseConfig,
    /// `#+NAME:` and `#+CAPTION:` values waiting for the next element of
    /// the same parent
    affiliated: Vec<(NodeId, &'static str, String)>,
    /// Sections opened early to hold a headline's property drawer
    sections: HashMap<NodeId, NodeId>,
}

impl<'c> TreeBuilder<'c> {
    fn new(config: &'c ParseConfig) -> Self {
        Self {
            doc: Document::new(),
            stack: Vec::new(),
            config,
            affiliated: Vec::new(),
            sections: HashMap::new(),
        }
    }

    fn top(&self) -> Slot {
        self.stack.last().copied().unwrap_or(Slot::Node(self.doc.root()))
    }

    /// Create a node of `kind` under the current slot
    fn open(&mut self, kind: NodeKind) -> Option<NodeId> {
        let id = match self.top() {
            Slot::Node(parent) => {
                let id = self.doc.append(parent, kind);
                if kind.class() == NodeClass::Element {
                    self.attach_affiliated(parent, id);
                }
                id
            }
            Slot::Secondary { owner, key } => self.doc.append_secondary(owner, key, kind),
            Slot::Skip => {
                self.stack.push(Slot::Skip);
                return None;
            }
        };
        self.stack.push(Slot::Node(id));
        Some(id)
    }

    fn skip(&mut self) {
        self.stack.push(Slot::Skip);
    }

    fn attach_affiliated(&mut self, parent: NodeId, element: NodeId) {
        let (mine, rest): (Vec<_>, Vec<_>) = self
            .affiliated
            .drain(..)
            .partition(|(owner, _, _)| *owner == parent);
        self.affiliated = rest;
        for (_, key, value) in mine {
            if key == prop::CAPTION {
                let text = self.doc.append_secondary(element, prop::CAPTION, NodeKind::PlainText);
                self.doc.set(text, prop::VALUE, value);
            } else {
                self.doc.set(element, key, value);
            }
        }
    }

    fn text(&mut self, kind: NodeKind, value: &str) {
        if let Some(id) = self.open(kind) {
            self.doc.set(id, prop::VALUE, value);
        }
    }

    fn start(&mut self, element: &Element<'_>) {
        match element {
            Element::Document { .. } => self.stack.push(Slot::Node(self.doc.root())),
            Element::Headline { .. } => {
                self.open(NodeKind::Headline);
            }
            Element::Title(title) => {
                let Slot::Node(headline) = self.top() else {
                    self.skip();
                    return;
                };
                let raw = title.raw.trim();
                let commented = raw == "COMMENT" || raw.starts_with("COMMENT ");
                let doc = &mut self.doc;
                doc.set(headline, prop::LEVEL, title.level);
                doc.set(headline, prop::RAW_TITLE, raw);
                if commented {
                    doc.set(headline, prop::COMMENTED, true);
                }
                if raw == self.config.footnote_section {
                    doc.set(headline, prop::FOOTNOTE_SECTION, true);
                }
                if let Some(keyword) = &title.keyword {
                    doc.set(headline, prop::TODO_KEYWORD, keyword.to_string());
                }
                if let Some(priority) = title.priority {
                    doc.set(headline, prop::PRIORITY, priority.to_string());
                }
                if !title.tags.is_empty() {
                    let tags: Vec<String> = title.tags.iter().map(|t| t.to_string()).collect();
                    doc.set(headline, prop::TAGS, tags);
                }

                let mut drawer = None;
                for (key, value) in title.properties.iter() {
                    doc.set(headline, key.to_uppercase(), value.to_string());
                    let drawer = *drawer.get_or_insert_with(|| {
                        let section = doc.append(headline, NodeKind::Section);
                        self.sections.insert(headline, section);
                        doc.append(section, NodeKind::PropertyDrawer)
                    });
                    let property = doc.append(drawer, NodeKind::NodeProperty);
                    doc.set(property, prop::KEY, key.to_string());
                    if !value.is_empty() {
                        doc.set(property, prop::VALUE, value.to_string());
                    }
                }

                self.stack.push(Slot::Secondary {
                    owner: headline,
                    key: prop::TITLE,
                });
            }
            Element::Section => match self.top() {
                Slot::Node(parent) if self.sections.contains_key(&parent) => {
                    let section = self.sections[&parent];
                    self.stack.push(Slot::Node(section));
                }
                _ => {
                    self.open(NodeKind::Section);
                }
            },
            Element::Paragraph { post_blank } => {
                if let Some(id) = self.open(NodeKind::Paragraph) {
                    self.doc.set_post_blank(id, *post_blank);
                }
            }
            Element::List(list) => {
                if let Some(id) = self.open(NodeKind::PlainList) {
                    let kind = if list.ordered { "ordered" } else { "unordered" };
                    self.doc.set(id, prop::TYPE, kind);
                }
            }
            Element::ListItem(item) => {
                if let Some(id) = self.open(NodeKind::Item) {
                    self.doc.set(id, prop::BULLET, item.bullet.trim());
                }
            }
            Element::Text { value } => self.text(NodeKind::PlainText, value),
            Element::Bold => {
                self.open(NodeKind::Bold);
            }
            Element::Italic => {
                self.open(NodeKind::Italic);
            }
            Element::Strike => {
                self.open(NodeKind::StrikeThrough);
            }
            Element::Underline => {
                self.open(NodeKind::Underline);
            }
            Element::Code { value } => self.text(NodeKind::Code, value),
            Element::Verbatim { value } => self.text(NodeKind::Verbatim, value),
            Element::Link(link) => {
                let Some(id) = self.open(NodeKind::Link) else {
                    return;
                };
                let parts = classify_link(&link.path);
                self.doc.set(id, prop::TYPE, parts.link_type);
                self.doc.set(id, prop::PATH, parts.path);
                self.doc.set(id, prop::RAW_LINK, link.path.to_string());
                if let Some(search) = parts.search_option {
                    self.doc.set(id, prop::SEARCH_OPTION, search);
                }
                if let Some(desc) = &link.desc {
                    self.doc.append_text(id, desc);
                }
            }
            Element::SourceBlock(block) => {
                let Some(id) = self.open(NodeKind::SrcBlock) else {
                    return;
                };
                self.doc.set(id, prop::LANGUAGE, block.language.to_string());
                self.doc.set(id, prop::VALUE, block.contents.to_string());
                self.switches(id, &block.arguments);
            }
            Element::ExampleBlock(block) => {
                let Some(id) = self.open(NodeKind::ExampleBlock) else {
                    return;
                };
                self.doc.set(id, prop::VALUE, block.contents.to_string());
                if let Some(data) = &block.data {
                    self.switches(id, data);
                }
            }
            Element::ExportBlock(block) => {
                if let Some(id) = self.open(NodeKind::ExportBlock) {
                    self.doc.set(id, prop::TYPE, block.data.trim().to_lowercase());
                    self.doc.set(id, prop::VALUE, block.contents.to_string());
                }
            }
            Element::CommentBlock(block) => self.text(NodeKind::CommentBlock, &block.contents),
            Element::QuoteBlock(_) => {
                self.open(NodeKind::QuoteBlock);
            }
            Element::CenterBlock(_) => {
                self.open(NodeKind::CenterBlock);
            }
            Element::VerseBlock(_) => {
                self.open(NodeKind::VerseBlock);
            }
            Element::SpecialBlock(block) => {
                if let Some(id) = self.open(NodeKind::SpecialBlock) {
                    self.doc.set(id, prop::TYPE, block.name.to_string());
                }
            }
            Element::Drawer(drawer) => {
                if let Some(id) = self.open(NodeKind::Drawer) {
                    self.doc.set(id, prop::NAME, drawer.name.to_string());
                }
            }
            Element::DynBlock(_) => {
                self.open(NodeKind::DynamicBlock);
            }
            Element::Rule(_) => {
                self.open(NodeKind::HorizontalRule);
            }
            Element::FixedWidth(fixed) => self.text(NodeKind::FixedWidth, &fixed.value),
            Element::Comment(comment) => self.text(NodeKind::Comment, &comment.value),
            Element::Keyword(keyword) => self.keyword(&keyword.key, &keyword.value),
            Element::FnDef(def) => {
                if let Some(id) = self.open(NodeKind::FootnoteDefinition) {
                    self.doc.set(id, prop::LABEL, def.label.to_string());
                }
            }
            Element::FnRef(fn_ref) => {
                let Some(id) = self.open(NodeKind::FootnoteReference) else {
                    return;
                };
                if !fn_ref.label.is_empty() {
                    self.doc.set(id, prop::LABEL, fn_ref.label.to_string());
                }
                if let Some(definition) = &fn_ref.definition {
                    let text =
                        self.doc
                            .append_secondary(id, prop::INLINE_DEFINITION, NodeKind::PlainText);
                    self.doc.set(text, prop::VALUE, definition.to_string());
                }
            }
            Element::Target(target) => self.text(NodeKind::Target, &target.target),
            Element::RadioTarget => {
                self.open(NodeKind::RadioTarget);
            }
            Element::Snippet(snippet) => {
                if let Some(id) = self.open(NodeKind::ExportSnippet) {
                    self.doc.set(id, prop::BACKEND, snippet.name.to_lowercase());
                    self.doc.set(id, prop::VALUE, snippet.value.to_string());
                }
            }
            Element::InlineSrc(src) => {
                if let Some(id) = self.open(NodeKind::InlineSrcBlock) {
                    self.doc.set(id, prop::LANGUAGE, src.lang.to_string());
                    self.doc.set(id, prop::VALUE, src.body.to_string());
                }
            }
            Element::Cookie(cookie) => self.text(NodeKind::StatisticsCookie, &cookie.value),
            Element::Table(Table::Org { .. }) => {
                self.open(NodeKind::Table);
            }
            Element::TableRow(row) => {
                if let Some(id) = self.open(NodeKind::TableRow) {
                    let kind = match row {
                        TableRow::Header | TableRow::Body => "standard",
                        TableRow::HeaderRule | TableRow::BodyRule => "rule",
                    };
                    self.doc.set(id, prop::TYPE, kind);
                }
            }
            Element::TableCell(_) => {
                self.open(NodeKind::TableCell);
            }
            other => {
                trace!(element = ?other, "skipping element");
                self.skip();
            }
        }
    }

    fn end(&mut self) {
        self.stack.pop();
    }

    /// `-n`, `+n`, `-r` and `-k` switches of a source or example block
    fn switches(&mut self, block: NodeId, switches: &str) {
        let has = |switch: &str| switches.split_whitespace().any(|s| s == switch);
        let number_lines = if has("-n") {
            Some("new")
        } else if has("+n") {
            Some("continued")
        } else {
            None
        };
        if let Some(mode) = number_lines {
            self.doc.set(block, prop::NUMBER_LINES, mode);
        }
        let retain = !has("-r") || (number_lines.is_some() && has("-k"));
        let use_labels = retain && !has("-k");
        if !retain {
            self.doc.set(block, prop::RETAIN_LABELS, false);
        }
        if !use_labels {
            self.doc.set(block, prop::USE_LABELS, false);
        }
    }

    fn keyword(&mut self, key: &str, value: &str) {
        let key = key.to_uppercase();
        if let Slot::Node(parent) = self.top() {
            let affiliated = match key.as_str() {
                "NAME" => Some(prop::NAME),
                "CAPTION" => Some(prop::CAPTION),
                _ => None,
            };
            if let Some(affiliated) = affiliated {
                self.affiliated
                    .push((parent, affiliated, value.trim().to_string()));
                self.skip();
                return;
            }
        }
        if let Some(id) = self.open(NodeKind::Keyword) {
            self.doc.set(id, prop::KEY, key);
            self.doc.set(id, prop::VALUE, value.trim());
        }
    }

    fn finish(self) -> Document {
        if !self.affiliated.is_empty() {
            debug!(
                count = self.affiliated.len(),
                "dropping affiliated keywords with no element to attach to"
            );
        }
        self.doc
    }
}

/// Move `[X]`, `[@N]` and `tag ::` prefixes from item text into item
/// properties
fn list_item_markers(doc: &mut Document) {
    let items: Vec<NodeId> = doc
        .iter()
        .filter(|n| n.is(NodeKind::Item))
        .map(|n| n.id())
        .collect();

    for item in items {
        let node = doc.node(item);
        let list = node.parent().map(|p| p.id());
        let unordered = node.parent().and_then(|p| p.str_property(prop::TYPE)) != Some("ordered");
        let Some(text) = node
            .first_child()
            .filter(|p| p.is(NodeKind::Paragraph))
            .and_then(|p| p.first_child())
            .filter(|t| t.is(NodeKind::PlainText))
        else {
            continue;
        };
        let text_id = text.id();
        let mut value = text.str_property(prop::VALUE).unwrap_or_default().to_string();

        if let Some(caps) = COUNTER.captures(&value) {
            if let Ok(counter) = caps[1].parse::<i64>() {
                doc.set(item, prop::COUNTER, counter);
            }
            value = value[caps[0].len()..].to_string();
        }
        if let Some(caps) = CHECKBOX.captures(&value) {
            let state = match &caps[1] {
                "X" => "on",
                "-" => "trans",
                _ => "off",
            };
            doc.set(item, prop::CHECKBOX, state);
            value = value[caps[0].len()..].to_string();
        }
        if unordered {
            if let Some(caps) = DESCRIPTION.captures(&value) {
                let tag = doc.append_secondary(item, prop::TAG, NodeKind::PlainText);
                doc.set(tag, prop::VALUE, caps[1].trim());
                if let Some(list) = list {
                    doc.set(list, prop::TYPE, "descriptive");
                }
                value = value[caps[0].len()..].to_string();
            }
        }
        doc.set(text_id, prop::VALUE, value);
    }
}

/// A radio target is matched by its text
fn radio_target_values(doc: &mut Document) {
    let values: Vec<(NodeId, String)> = doc
        .iter()
        .filter(|n| n.is(NodeKind::RadioTarget))
        .map(|n| {
            let text: String = n
                .descendants()
                .filter_map(|d| d.str_property(prop::VALUE))
                .collect();
            (n.id(), text)
        })
        .collect();
    for (id, value) in values {
        doc.set(id, prop::VALUE, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::Exporter;
    use crate::traits::ExportConfig;
    use pretty_assertions::assert_eq;

    fn parse(input: &str) -> Document {
        OrgModeHandler::new()
            .parse(input, &ParseConfig::default())
            .unwrap()
    }

    fn kinds(doc: &Document, kind: NodeKind) -> Vec<crate::ast::Node<'_>> {
        doc.iter().filter(|n| n.is(kind)).collect()
    }

    fn to_markdown(input: &str) -> String {
        Exporter::new()
            .export(parse(input), &ExportConfig::default())
            .unwrap()
    }

    #[test]
    fn test_headline_properties() {
        let doc = parse("* TODO [#A] Plan :work:\n:PROPERTIES:\n:CUSTOM_ID: plan\n:END:\nBody\n");
        let headlines = kinds(&doc, NodeKind::Headline);
        assert_eq!(headlines.len(), 1);
        let h = headlines[0];
        assert_eq!(h.int_property(prop::LEVEL), Some(1));
        assert_eq!(h.str_property(prop::TODO_KEYWORD), Some("TODO"));
        assert_eq!(h.str_property(prop::PRIORITY), Some("A"));
        assert_eq!(h.list_property(prop::TAGS).to_vec(), vec!["work".to_string()]);
        assert_eq!(h.str_property(prop::CUSTOM_ID), Some("plan"));
        assert!(!h.nodes_property(prop::TITLE).is_empty());
        // The drawer shares the section with the body
        assert_eq!(kinds(&doc, NodeKind::Section).len(), 1);
        assert_eq!(kinds(&doc, NodeKind::NodeProperty).len(), 1);
    }

    #[test]
    fn test_footnote_section_and_comment_flags() {
        let doc = parse("* Footnotes\n[fn:1] Note.\n* COMMENT Draft\n");
        let headlines = kinds(&doc, NodeKind::Headline);
        assert!(headlines[0].flag(prop::FOOTNOTE_SECTION));
        assert!(headlines[1].flag(prop::COMMENTED));
    }

    #[test]
    fn test_link_is_classified() {
        let doc = parse("See [[https://example.com][the site]] now.\n");
        let link = kinds(&doc, NodeKind::Link)[0];
        assert_eq!(link.str_property(prop::TYPE), Some("https"));
        assert_eq!(link.str_property(prop::PATH), Some("//example.com"));
        assert_eq!(link.str_property(prop::RAW_LINK), Some("https://example.com"));
        assert_eq!(link.children().count(), 1);
    }

    #[test]
    fn test_affiliated_keywords_attach_to_next_element() {
        let doc = parse("#+NAME: listing\n#+CAPTION: A listing\n#+BEGIN_SRC rust -n\nfn main() {}\n#+END_SRC\n");
        let block = kinds(&doc, NodeKind::SrcBlock)[0];
        assert_eq!(block.str_property(prop::NAME), Some("listing"));
        assert_eq!(block.nodes_property(prop::CAPTION).len(), 1);
        assert_eq!(block.str_property(prop::LANGUAGE), Some("rust"));
        assert_eq!(block.str_property(prop::NUMBER_LINES), Some("new"));
        assert!(kinds(&doc, NodeKind::Keyword).is_empty());
    }

    #[test]
    fn test_item_markers() {
        let doc = parse("- [X] done\n- [ ] open\n");
        let items = kinds(&doc, NodeKind::Item);
        assert_eq!(items[0].str_property(prop::CHECKBOX), Some("on"));
        assert_eq!(items[1].str_property(prop::CHECKBOX), Some("off"));

        let doc = parse("- term :: meaning\n");
        let item = kinds(&doc, NodeKind::Item)[0];
        assert_eq!(item.nodes_property(prop::TAG).len(), 1);
        assert_eq!(
            item.parent().and_then(|l| l.str_property(prop::TYPE)),
            Some("descriptive")
        );
    }

    #[test]
    fn test_switches() {
        let doc = parse("#+BEGIN_EXAMPLE -r\nx (ref:a)\n#+END_EXAMPLE\n");
        let block = kinds(&doc, NodeKind::ExampleBlock)[0];
        assert_eq!(block.property(prop::RETAIN_LABELS).map(|v| v.is_truthy()), Some(false));
        assert_eq!(block.property(prop::USE_LABELS).map(|v| v.is_truthy()), Some(false));
    }

    #[test]
    fn test_org_to_markdown() {
        let out = to_markdown("* Intro\nSome *bold* text.\n\n- one\n- two\n");
        assert!(out.contains("# Intro\n\nSome **bold** text.\n"));
        assert!(out.contains("-   one\n-   two\n"));
    }

    #[test]
    fn test_counter_cookie_to_markdown() {
        let doc = parse("1. one\n2. [@100] hundred\n");
        let items = kinds(&doc, NodeKind::Item);
        assert_eq!(items[1].int_property(prop::COUNTER), Some(100));

        let out = to_markdown("1. one\n2. [@100] hundred\n");
        assert!(out.contains("1.  one\n100. hundred\n"), "{out}");
    }

    #[test]
    fn test_quote_block_to_markdown() {
        let out = to_markdown("#+BEGIN_QUOTE\nQuoted line.\n#+END_QUOTE\n");
        assert_eq!(out.trim_end(), "> Quoted line.");
    }

    #[test]
    fn test_parse_result_is_valid() {
        let doc = parse("* A\n** B\n| x | y |\n|---+---|\n| 1 | 2 |\n");
        doc.validate().unwrap();
        assert_eq!(kinds(&doc, NodeKind::TableRow).len(), 3);
        assert!(kinds(&doc, NodeKind::TableCell).len() >= 4);
    }
}
