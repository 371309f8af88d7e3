// SPDX-License-Identifier: AGPL-3.0-or-later
//! Markdown backend, derived from `html`
//!
//! Kinds without a Markdown form (tables, center and special blocks, raw
//! HTML keywords and blocks) are handed to the parent backend.

mod footnotes;
mod headline;
mod link;
mod spacing;
mod text;
mod toc;

pub use headline::HeadlineStyle;
pub use link::org_to_md_path;
pub use spacing::separate_elements;
pub use text::{escape_markdown, TextRules};
pub use toc::{collect_headlines, TocRequest};

use crate::ast::{prop, Node, NodeKind};
use crate::backend::{Backend, Filter, OptionSpec};
use crate::formats::{fill, indent, remove_indentation};
use crate::options;
use crate::transcoder::Transcoder;
use crate::traits::Result;
use once_cell::sync::Lazy;
use regex::Regex;

pub const HEADLINE_STYLE: &str = "md-headline-style";
pub const TOPLEVEL_HLEVEL: &str = "md-toplevel-hlevel";
pub const FOOTNOTE_FORMAT: &str = "md-footnote-format";
pub const FOOTNOTES_SECTION: &str = "md-footnotes-section";
pub const LINK_ORG_FILES_AS_MD: &str = "md-link-org-files-as-md";

type Output = Result<Option<String>>;

/// The `md` backend
pub fn backend() -> Backend {
    use NodeKind::*;
    Backend::derived("md", "html")
        .option(OptionSpec::new(HEADLINE_STYLE, "atx"))
        .option(OptionSpec::new(TOPLEVEL_HLEVEL, 1i64))
        .option(OptionSpec::new(FOOTNOTE_FORMAT, "<sup>%s</sup>"))
        .option(OptionSpec::new(FOOTNOTES_SECTION, "%s%s"))
        .option(OptionSpec::new(LINK_ORG_FILES_AS_MD, true))
        .filter(Filter::ParseTree(separate_elements))
        .translator(Document, template)
        .translator(Section, identity)
        .translator(Headline, headline::headline)
        .translator(Paragraph, paragraph)
        .translator(PlainList, identity)
        .translator(Item, item)
        .translator(PlainText, text::plain_text)
        .translator(Bold, |_, c, _| Ok(Some(format!("**{}**", c.unwrap_or_default()))))
        .translator(Italic, |_, c, _| Ok(Some(format!("*{}*", c.unwrap_or_default()))))
        .translator(Code, verbatim)
        .translator(Verbatim, verbatim)
        .translator(InlineSrcBlock, verbatim)
        .translator(Link, link::link)
        .translator(LineBreak, |_, _, _| Ok(Some("  \n".into())))
        .translator(HorizontalRule, |_, _, _| Ok(Some("---".into())))
        .translator(Keyword, keyword)
        .translator(PropertyDrawer, property_drawer)
        .translator(NodeProperty, node_property)
        .translator(Drawer, identity)
        .translator(DynamicBlock, identity)
        .translator(LatexFragment, latex_fragment)
        .translator(LatexEnvironment, latex_environment)
        .translator(Table, to_html)
        .translator(SrcBlock, example_block)
        .translator(ExampleBlock, example_block)
        .translator(FixedWidth, example_block)
        .translator(QuoteBlock, quote_block)
        .translator(CenterBlock, to_html)
        .translator(SpecialBlock, to_html)
        .translator(ExportBlock, export_block)
        .translator(ExportSnippet, export_snippet)
}

/// Backend rendering headline titles inside a table of contents
pub fn toc_entry_backend() -> Backend {
    use NodeKind::*;
    Backend::derived("md-toc-entry", "md")
        .translator(FootnoteReference, |_, _, _| Ok(None))
        .translator(Target, |_, _, _| Ok(None))
        .translator(LineBreak, |_, _, _| Ok(Some(" ".into())))
        .translator(RadioTarget, |_, c, _| Ok(c.map(str::to_string)))
        .translator(Link, |node, c, _| {
            Ok(Some(match c {
                Some(c) => c.to_string(),
                None => text::escape_markdown(node.str_property(prop::RAW_LINK).unwrap_or_default()),
            }))
        })
}

fn identity(_: Node<'_>, contents: Option<&str>, _: &Transcoder<'_>) -> Output {
    Ok(contents.map(str::to_string))
}

fn to_html(node: Node<'_>, contents: Option<&str>, tx: &Transcoder<'_>) -> Output {
    tx.with_backend("html", node, contents)
}

fn template(_: Node<'_>, contents: Option<&str>, tx: &Transcoder<'_>) -> Output {
    let ctx = tx.context();
    let mut out = String::new();
    if let Some(depth) = ctx.option(options::WITH_TOC).filter(|v| v.is_truthy()) {
        let toc = toc::build_toc(tx, toc::depth_of(depth), None)?;
        if !toc.is_empty() {
            out.push_str(&toc);
            out.push('\n');
        }
    }
    out.push_str(contents.unwrap_or_default());
    out.push('\n');
    out.push_str(&footnotes::footnote_section(tx)?);
    Ok(Some(out))
}

static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n(?:[ \t]*\n)+").expect("valid regex"));

fn paragraph(node: Node<'_>, contents: Option<&str>, _: &Transcoder<'_>) -> Output {
    let contents = BLANK_LINES.replace_all(contents.unwrap_or_default(), "\n");
    let hash_first = node
        .first_child()
        .filter(|c| c.is(NodeKind::PlainText))
        .and_then(|c| c.str_property(prop::VALUE))
        .is_some_and(|v| v.starts_with('#'));
    Ok(Some(if hash_first {
        format!("\\{contents}")
    } else {
        contents.into_owned()
    }))
}

/// Position of an item in its list, honouring `[@N]` counters
fn item_number(item: Node<'_>) -> usize {
    let Some(list) = item.parent() else {
        return 1;
    };
    let mut number = 0;
    for sibling in list.children().filter(|n| n.is(NodeKind::Item)) {
        number = sibling
            .int_property(prop::COUNTER)
            .and_then(|c| usize::try_from(c).ok())
            .unwrap_or(number + 1);
        if sibling.id() == item.id() {
            break;
        }
    }
    number
}

/// `bullet` followed by spaces up to four columns, at least one
fn pad_bullet(bullet: &str) -> String {
    let width = 4usize.saturating_sub(bullet.len()).max(1);
    format!("{bullet}{}", " ".repeat(width))
}

fn item(node: Node<'_>, contents: Option<&str>, tx: &Transcoder<'_>) -> Output {
    let ordered = node.parent().and_then(|p| p.str_property(prop::TYPE)) == Some("ordered");
    let bullet = if ordered {
        format!("{}.", item_number(node))
    } else {
        "-".to_string()
    };
    let checkbox = match node.str_property(prop::CHECKBOX) {
        Some("on") => "[X] ",
        Some("trans") => "[-] ",
        Some("off") => "[ ] ",
        _ => "",
    };
    let tag = node.nodes_property(prop::TAG);
    let tag = if tag.is_empty() {
        String::new()
    } else {
        format!("**{}:** ", tx.data(tag)?)
    };
    let body = contents
        .map(|c| indent(c, 4).trim().to_string())
        .unwrap_or_default();
    Ok(Some(format!("{}{checkbox}{tag}{body}", pad_bullet(&bullet))))
}

fn verbatim(node: Node<'_>, _: Option<&str>, _: &Transcoder<'_>) -> Output {
    let value = node.str_property(prop::VALUE).unwrap_or_default();
    Ok(Some(if !value.contains('`') {
        format!("`{value}`")
    } else if value.starts_with('`') || value.ends_with('`') {
        format!("`` {value} ``")
    } else {
        format!("``{value}``")
    }))
}

static CODEREF_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]*\(ref:[^)]+\)[ \t]*$").expect("valid regex"));

/// Block code with labels stripped and optional line numbers
fn format_code(node: Node<'_>) -> String {
    let value = node.str_property(prop::VALUE).unwrap_or_default();
    if value.trim().is_empty() {
        return String::new();
    }
    let retain_labels = node.property(prop::RETAIN_LABELS).map_or(true, |v| v.is_truthy());
    let lines: Vec<String> = value
        .lines()
        .map(|line| {
            if retain_labels {
                line.to_string()
            } else {
                CODEREF_LABEL.replace(line, "").into_owned()
            }
        })
        .collect();

    let Some(numbering) = node.property(prop::NUMBER_LINES).filter(|v| v.is_truthy()) else {
        return lines.iter().map(|l| format!("{l}\n")).collect();
    };
    let offset = numbering
        .as_integer()
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(0);
    let width = (offset + lines.len()).to_string().len();
    lines
        .iter()
        .enumerate()
        .map(|(i, l)| format!("{:>width$}  {l}\n", offset + i + 1))
        .collect()
}

fn example_block(node: Node<'_>, _: Option<&str>, _: &Transcoder<'_>) -> Output {
    Ok(Some(indent(&remove_indentation(&format_code(node)), 4)))
}

fn quote_block(_: Node<'_>, contents: Option<&str>, _: &Transcoder<'_>) -> Output {
    let body = contents.unwrap_or_default();
    let body = body.strip_suffix('\n').unwrap_or(body);
    Ok(Some(format!("> {}", body.replace('\n', "\n> "))))
}

fn keyword(node: Node<'_>, contents: Option<&str>, tx: &Transcoder<'_>) -> Output {
    let key = node.str_property(prop::KEY).unwrap_or_default();
    let value = node.str_property(prop::VALUE).unwrap_or_default();
    if key.eq_ignore_ascii_case("MARKDOWN") || key.eq_ignore_ascii_case("MD") {
        return Ok(Some(value.to_string()));
    }
    if key.eq_ignore_ascii_case("TOC") {
        return toc::toc_keyword(node, tx);
    }
    tx.with_backend("html", node, contents)
}

fn property_drawer(_: Node<'_>, contents: Option<&str>, _: &Transcoder<'_>) -> Output {
    Ok(contents
        .filter(|c| !c.trim().is_empty())
        .map(|c| indent(c, 4)))
}

fn node_property(node: Node<'_>, _: Option<&str>, _: &Transcoder<'_>) -> Output {
    let key = node.str_property(prop::KEY).unwrap_or_default();
    Ok(Some(match node.str_property(prop::VALUE) {
        Some(value) => format!("{key}: {value}"),
        None => format!("{key}:"),
    }))
}

fn latex_fragment(node: Node<'_>, _: Option<&str>, tx: &Transcoder<'_>) -> Output {
    if !tx.context().flag(options::WITH_LATEX) {
        return Ok(None);
    }
    let frag = node.str_property(prop::VALUE).unwrap_or_default();
    let inner = || frag.get(2..frag.len().saturating_sub(2)).unwrap_or_default();
    Ok(Some(if frag.starts_with("\\(") && frag.len() >= 4 {
        format!("${}$", inner())
    } else if frag.starts_with("\\[") && frag.len() >= 4 {
        format!("$${}$$", inner())
    } else {
        frag.to_string()
    }))
}

fn latex_environment(node: Node<'_>, _: Option<&str>, tx: &Transcoder<'_>) -> Output {
    if !tx.context().flag(options::WITH_LATEX) {
        return Ok(None);
    }
    let frag = remove_indentation(node.str_property(prop::VALUE).unwrap_or_default());
    if node.str_property(prop::NAME).is_none() {
        return Ok(Some(frag));
    }
    let label = tx.context().reference(node.id());
    Ok(Some(match frag.split_once('\n') {
        Some((first, rest)) => format!("{first}\n\\label{{{label}}}\n{rest}"),
        None => format!("{frag}\n\\label{{{label}}}"),
    }))
}

fn export_block(node: Node<'_>, contents: Option<&str>, tx: &Transcoder<'_>) -> Output {
    let markdown = node
        .str_property(prop::TYPE)
        .is_some_and(|t| t.eq_ignore_ascii_case("MARKDOWN") || t.eq_ignore_ascii_case("MD"));
    if markdown {
        return Ok(Some(remove_indentation(
            node.str_property(prop::VALUE).unwrap_or_default(),
        )));
    }
    tx.with_backend("html", node, contents)
}

fn export_snippet(node: Node<'_>, contents: Option<&str>, tx: &Transcoder<'_>) -> Output {
    match node.str_property(prop::BACKEND) {
        Some("md" | "markdown") => Ok(node.str_property(prop::VALUE).map(str::to_string)),
        _ => tx.with_backend("html", node, contents),
    }
}

/// `md-footnote-format` applied to a back-reference anchor
fn footnote_marker(tx: &Transcoder<'_>, number: usize) -> String {
    let anchor = format!("<a id=\"fn.{number}\" href=\"#fnr.{number}\">{number}</a>");
    fill(
        tx.context().string(FOOTNOTE_FORMAT).unwrap_or("%s"),
        &[&anchor],
    )
}


#[cfg(test)]
mod tests {
    use super::testing::{export, list_items, paragraph};
    use super::*;
    use crate::ast::{Document, Value};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_toc_entry_chain_reaches_html() {
        let registry = crate::backend::BackendRegistry::builtin();
        for kind in NodeKind::ALL {
            assert!(registry.resolve_handler("md-toc-entry", kind).is_ok(), "{kind}");
        }
    }

    #[test]
    fn test_plain_text_is_escaped() {
        let mut doc = Document::new();
        let root = doc.root();
        paragraph(&mut doc, root, "a *b* c");
        assert_eq!(export(doc, &[]), "a \\*b\\* c\n");
    }

    #[test]
    fn test_paragraph_leading_hash_is_protected() {
        let mut doc = Document::new();
        let root = doc.root();
        paragraph(&mut doc, root, "#hashtag and\n# not a heading");
        assert_eq!(export(doc, &[]), "\\#hashtag and\n\\# not a heading\n");
    }

    #[test]
    fn test_lists_and_items() {
        let mut doc = Document::new();
        let list = doc.append(doc.root(), NodeKind::PlainList);
        doc.set(list, prop::TYPE, "ordered");
        let first = doc.append(list, NodeKind::Item);
        paragraph(&mut doc, first, "one");
        let second = doc.append(list, NodeKind::Item);
        doc.set(second, prop::CHECKBOX, "on");
        paragraph(&mut doc, second, "two");
        let inner = doc.append(second, NodeKind::PlainList);
        doc.set(inner, prop::TYPE, "unordered");
        let nested = doc.append(inner, NodeKind::Item);
        paragraph(&mut doc, nested, "nested");

        let out = export(doc, &[]);
        assert_eq!(out, "1.  one\n2.  [X] two\n    -   nested\n");
        assert_eq!(list_items(&out), 3);
    }

    #[test]
    fn test_counter_restarts_numbering() {
        let mut doc = Document::new();
        let list = doc.append(doc.root(), NodeKind::PlainList);
        doc.set(list, prop::TYPE, "ordered");
        let a = doc.append(list, NodeKind::Item);
        doc.set(a, prop::COUNTER, 10i64);
        paragraph(&mut doc, a, "ten");
        let b = doc.append(list, NodeKind::Item);
        paragraph(&mut doc, b, "eleven");
        assert_eq!(export(doc, &[]), "10. ten\n11. eleven\n");
    }

    #[test]
    fn test_wide_bullets_keep_a_space() {
        let mut doc = Document::new();
        let list = doc.append(doc.root(), NodeKind::PlainList);
        doc.set(list, prop::TYPE, "ordered");
        let a = doc.append(list, NodeKind::Item);
        doc.set(a, prop::COUNTER, 100i64);
        paragraph(&mut doc, a, "hundred");
        let b = doc.append(list, NodeKind::Item);
        paragraph(&mut doc, b, "next");

        let out = export(doc, &[]);
        assert_eq!(out, "100. hundred\n101. next\n");
        assert_eq!(list_items(&out), 2);
    }

    #[test]
    fn test_pad_bullet() {
        assert_eq!(pad_bullet("-"), "-   ");
        assert_eq!(pad_bullet("9."), "9.  ");
        assert_eq!(pad_bullet("1000."), "1000. ");
    }

    #[test]
    fn test_descriptive_item_tag() {
        let mut doc = Document::new();
        let list = doc.append(doc.root(), NodeKind::PlainList);
        doc.set(list, prop::TYPE, "descriptive");
        let item = doc.append(list, NodeKind::Item);
        let tag = doc.append_secondary(item, prop::TAG, NodeKind::PlainText);
        doc.set(tag, prop::VALUE, "term");
        paragraph(&mut doc, item, "meaning");
        assert_eq!(export(doc, &[]), "-   **term:** meaning\n");
    }

    #[test]
    fn test_verbatim_fences() {
        let mut doc = Document::new();
        let para = doc.append(doc.root(), NodeKind::Paragraph);
        for (value, blank) in [("plain", 1), ("a`b", 1), ("`edge", 0)] {
            let code = doc.append(para, NodeKind::Verbatim);
            doc.set(code, prop::VALUE, value);
            doc.set_post_blank(code, blank);
        }
        assert_eq!(export(doc, &[]), "`plain` ``a`b`` `` `edge ``\n");
    }

    #[test]
    fn test_src_block_indented_with_line_numbers() {
        let mut doc = Document::new();
        let block = doc.append(doc.root(), NodeKind::SrcBlock);
        doc.set(block, prop::LANGUAGE, "rust");
        doc.set(block, prop::VALUE, "  fn main() {\n      run(); (ref:call)\n  }\n");
        doc.set(block, prop::NUMBER_LINES, "new");
        doc.set(block, prop::RETAIN_LABELS, false);
        assert_eq!(
            export(doc, &[]),
            "    1    fn main() {\n    2        run();\n    3    }\n"
        );
    }

    #[test]
    fn test_quote_block_prefixes_every_line() {
        let mut doc = Document::new();
        let quote = doc.append(doc.root(), NodeKind::QuoteBlock);
        paragraph(&mut doc, quote, "first");
        paragraph(&mut doc, quote, "second");
        assert_eq!(export(doc, &[]), "> first\n> \n> second\n");
    }

    #[test]
    fn test_keywords() {
        let mut doc = Document::new();
        for (key, value) in [("MD", "<!-- raw -->"), ("HTML", "<br/>"), ("AUTHOR", "me")] {
            let kw = doc.append(doc.root(), NodeKind::Keyword);
            doc.set(kw, prop::KEY, key);
            doc.set(kw, prop::VALUE, value);
        }
        assert_eq!(export(doc, &[]), "<!-- raw -->\n\n<br/>\n");
    }

    #[test]
    fn test_table_falls_back_to_html() {
        let mut doc = Document::new();
        let table = doc.append(doc.root(), NodeKind::Table);
        let row = doc.append(table, NodeKind::TableRow);
        doc.set(row, prop::TYPE, "standard");
        let cell = doc.append(row, NodeKind::TableCell);
        doc.append_text(cell, "x_y");
        assert_eq!(
            export(doc, &[]),
            "<table>\n<tbody>\n<tr><td>x\\_y</td></tr>\n</tbody>\n</table>\n"
        );
    }

    #[test]
    fn test_latex_fragments_follow_option() {
        let build = || {
            let mut doc = Document::new();
            let para = doc.append(doc.root(), NodeKind::Paragraph);
            let frag = doc.append(para, NodeKind::LatexFragment);
            doc.set(frag, prop::VALUE, "\\(x^2\\)");
            doc.set_post_blank(frag, 1);
            let frag = doc.append(para, NodeKind::LatexFragment);
            doc.set(frag, prop::VALUE, "\\[y\\]");
            doc
        };
        assert_eq!(export(build(), &[]), "$x^2$ $$y$$\n");
        assert_eq!(export(build(), &[("with-latex", Value::Bool(false))]), "");
    }

    #[test]
    fn test_property_drawer_is_indented() {
        let mut doc = Document::new();
        let drawer = doc.append(doc.root(), NodeKind::PropertyDrawer);
        let property = doc.append(drawer, NodeKind::NodeProperty);
        doc.set(property, prop::KEY, "CUSTOM");
        doc.set(property, prop::VALUE, "value");
        let property = doc.append(drawer, NodeKind::NodeProperty);
        doc.set(property, prop::KEY, "EMPTY");
        assert_eq!(
            export(doc, &[("with-properties", Value::Bool(true))]),
            "    CUSTOM: value\n    \n    EMPTY:\n"
        );
    }

    #[test]
    fn test_export_snippets() {
        let mut doc = Document::new();
        let para = doc.append(doc.root(), NodeKind::Paragraph);
        for backend in ["md", "html", "latex"] {
            let snippet = doc.append(para, NodeKind::ExportSnippet);
            doc.set(snippet, prop::BACKEND, backend);
            doc.set(snippet, prop::VALUE, backend.to_uppercase());
        }
        assert_eq!(export(doc, &[]), "MDHTML\n");
    }
}
