// SPDX-License-Identifier: AGPL-3.0-or-later
//! Compact HTML backend
//!
//! Complete enough to export a document on its own, and the parent of the
//! Markdown backend, which hands it every kind it has no Markdown form for.

use crate::ast::{prop, Node, NodeKind};
use crate::backend::{Backend, OptionSpec};
use crate::formats::{fill, footnote_bodies};
use crate::options;
use crate::resolve::Resolution;
use crate::transcoder::Transcoder;
use crate::traits::{ExportError, Result};
use tracing::warn;

pub const FOOTNOTE_FORMAT: &str = "html-footnote-format";
pub const FOOTNOTE_SEPARATOR: &str = "html-footnote-separator";

type Output = Result<Option<String>>;

/// The `html` backend
pub fn backend() -> Backend {
    use NodeKind::*;
    Backend::new("html")
        .option(OptionSpec::new(FOOTNOTE_FORMAT, "<sup>%s</sup>"))
        .option(OptionSpec::new(FOOTNOTE_SEPARATOR, "<sup>, </sup>"))
        .translator(Document, document)
        .translator(Section, pass_through)
        .translator(Headline, headline)
        .translator(Paragraph, |_, c, _| wrap("<p>\n", c, "</p>"))
        .translator(PlainList, plain_list)
        .translator(Item, item)
        .translator(PlainText, plain_text)
        .translator(Bold, |_, c, _| wrap("<b>", c, "</b>"))
        .translator(Italic, |_, c, _| wrap("<i>", c, "</i>"))
        .translator(Underline, |_, c, _| wrap("<span class=\"underline\">", c, "</span>"))
        .translator(StrikeThrough, |_, c, _| wrap("<del>", c, "</del>"))
        .translator(Subscript, |_, c, _| wrap("<sub>", c, "</sub>"))
        .translator(Superscript, |_, c, _| wrap("<sup>", c, "</sup>"))
        .translator(Code, code)
        .translator(Verbatim, code)
        .translator(InlineSrcBlock, inline_src_block)
        .translator(Link, link)
        .translator(LineBreak, |_, _, _| Ok(Some("<br>\n".into())))
        .translator(HorizontalRule, |_, _, _| Ok(Some("<hr>".into())))
        .translator(Keyword, keyword)
        .translator(PropertyDrawer, |_, c, _| wrap("<pre class=\"properties\">\n", c, "</pre>"))
        .translator(NodeProperty, node_property)
        .translator(Drawer, pass_through)
        .translator(DynamicBlock, pass_through)
        .translator(LatexFragment, raw_value)
        .translator(LatexEnvironment, raw_value)
        .translator(Table, |_, c, _| wrap("<table>\n", c, "</table>"))
        .translator(TableRow, table_row)
        .translator(TableCell, table_cell)
        .translator(SrcBlock, src_block)
        .translator(ExampleBlock, example_block)
        .translator(FixedWidth, example_block)
        .translator(QuoteBlock, |_, c, _| wrap("<blockquote>\n", c, "</blockquote>"))
        .translator(CenterBlock, |_, c, _| wrap("<div class=\"org-center\">\n", c, "</div>"))
        .translator(SpecialBlock, special_block)
        .translator(VerseBlock, verse_block)
        .translator(ExportBlock, export_block)
        .translator(ExportSnippet, export_snippet)
        .translator(FootnoteReference, footnote_reference)
        .translator(FootnoteDefinition, nothing)
        .translator(Target, target)
        .translator(RadioTarget, radio_target)
        .translator(Timestamp, timestamp)
        .translator(Entity, entity)
        .translator(StatisticsCookie, statistics_cookie)
        .translator(Planning, planning)
        .translator(Clock, clock)
        .translator(Comment, nothing)
        .translator(CommentBlock, nothing)
}

/// Escape `&`, `<` and `>`
pub(crate) fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn wrap(open: &str, contents: Option<&str>, close: &str) -> Output {
    Ok(Some(format!("{open}{}{close}", contents.unwrap_or_default())))
}

fn pass_through(_: Node<'_>, contents: Option<&str>, _: &Transcoder<'_>) -> Output {
    Ok(contents.map(str::to_string))
}

fn nothing(_: Node<'_>, _: Option<&str>, _: &Transcoder<'_>) -> Output {
    Ok(None)
}

fn raw_value(node: Node<'_>, _: Option<&str>, _: &Transcoder<'_>) -> Output {
    Ok(node.str_property(prop::VALUE).map(str::to_string))
}

fn escaped_value(node: Node<'_>) -> String {
    escape(node.str_property(prop::VALUE).unwrap_or_default())
}

fn document(_: Node<'_>, contents: Option<&str>, tx: &Transcoder<'_>) -> Output {
    let mut out = contents.unwrap_or_default().to_string();
    let bodies = footnote_bodies(tx)?;
    if !bodies.is_empty() {
        out.push_str("<div id=\"footnotes\">\n<h2 class=\"footnotes\">Footnotes: </h2>\n");
        out.push_str("<div id=\"text-footnotes\">\n");
        for (n, body) in bodies {
            out.push_str(&format!(
                "<div class=\"footdef\"><sup><a id=\"fn.{n}\" class=\"footnum\" href=\"#fnr.{n}\" role=\"doc-backlink\">{n}</a></sup> <div class=\"footpara\" role=\"doc-footnote\">{}</div></div>\n",
                body.trim()
            ));
        }
        out.push_str("</div>\n</div>\n");
    }
    Ok(Some(out))
}

/// Anchor of a headline: its custom id, else its generated reference
pub(crate) fn headline_anchor(headline: Node<'_>, tx: &Transcoder<'_>) -> String {
    headline
        .str_property(prop::CUSTOM_ID)
        .map(str::to_string)
        .unwrap_or_else(|| tx.context().reference(headline.id()))
}

fn headline(node: Node<'_>, contents: Option<&str>, tx: &Transcoder<'_>) -> Output {
    let ctx = tx.context();
    let level = (ctx.relative_level(node) + 1).min(6);
    let number = ctx
        .headline_number(node.id())
        .map(|n| {
            let dotted: Vec<String> = n.iter().map(usize::to_string).collect();
            format!("<span class=\"section-number\">{}</span> ", dotted.join("."))
        })
        .unwrap_or_default();
    let title = tx.data(node.nodes_property(prop::TITLE))?;
    Ok(Some(format!(
        "<h{level} id=\"{}\">{number}{title}</h{level}>\n{}",
        headline_anchor(node, tx),
        contents.unwrap_or_default()
    )))
}

fn plain_list(node: Node<'_>, contents: Option<&str>, _: &Transcoder<'_>) -> Output {
    let tag = match node.str_property(prop::TYPE) {
        Some("ordered") => "ol",
        Some("descriptive") => "dl",
        _ => "ul",
    };
    Ok(Some(format!("<{tag}>\n{}</{tag}>", contents.unwrap_or_default())))
}

fn checkbox(node: Node<'_>) -> &'static str {
    match node.str_property(prop::CHECKBOX) {
        Some("on") => "<code>[X]</code> ",
        Some("off") => "<code>[&#xa0;]</code> ",
        Some("trans") => "<code>[-]</code> ",
        _ => "",
    }
}

fn item(node: Node<'_>, contents: Option<&str>, tx: &Transcoder<'_>) -> Output {
    let body = contents.unwrap_or_default().trim_end();
    let descriptive = node
        .parent()
        .and_then(|p| p.str_property(prop::TYPE))
        == Some("descriptive");
    if descriptive {
        let tag = tx.data(node.nodes_property(prop::TAG))?;
        return Ok(Some(format!("<dt>{tag}</dt><dd>{}{body}</dd>", checkbox(node))));
    }
    Ok(Some(format!("<li>{}{body}</li>", checkbox(node))))
}

fn plain_text(node: Node<'_>, _: Option<&str>, tx: &Transcoder<'_>) -> Output {
    let mut text = escape(node.str_property(prop::VALUE).unwrap_or_default());
    if tx.context().flag(options::PRESERVE_BREAKS) {
        text = text.replace('\n', "<br>\n");
    }
    Ok(Some(text))
}

fn code(node: Node<'_>, _: Option<&str>, _: &Transcoder<'_>) -> Output {
    Ok(Some(format!("<code>{}</code>", escaped_value(node))))
}

fn inline_src_block(node: Node<'_>, _: Option<&str>, _: &Transcoder<'_>) -> Output {
    let lang = node.str_property(prop::LANGUAGE).unwrap_or_default();
    Ok(Some(format!(
        "<code class=\"src src-{lang}\">{}</code>",
        escaped_value(node)
    )))
}

fn link(node: Node<'_>, contents: Option<&str>, tx: &Transcoder<'_>) -> Output {
    let link_type = node.str_property(prop::TYPE).unwrap_or("fuzzy");
    let path = node.str_property(prop::PATH).unwrap_or_default();
    let label = |fallback: &str| {
        contents
            .filter(|c| !c.trim().is_empty())
            .map_or_else(|| escape(fallback), str::to_string)
    };

    if let Some(protocol) = tx.protocol(link_type) {
        if let Some(out) = protocol(path, contents, tx.backend().name()) {
            return Ok(Some(out));
        }
    }
    let href = match link_type {
        "custom-id" | "id" | "fuzzy" | "radio" => {
            match tx.resolver().resolve(node, tx.context()) {
                Resolution::Node(id) => {
                    let target = tx.node(id);
                    if target.is(NodeKind::Headline) {
                        format!("#{}", headline_anchor(target, tx))
                    } else {
                        format!("#{}", tx.context().reference(id))
                    }
                }
                Resolution::External(file) => file,
                Resolution::Unresolved => {
                    warn!(link_type, path, "unresolved link");
                    return Ok(Some(format!("<i>{}</i>", label(path))));
                }
            }
        }
        "file" => path.to_string(),
        other => format!("{other}:{path}"),
    };
    Ok(Some(format!("<a href=\"{}\">{}</a>", escape(&href), label(&href))))
}

fn keyword(node: Node<'_>, _: Option<&str>, _: &Transcoder<'_>) -> Output {
    let key = node.str_property(prop::KEY).unwrap_or_default();
    Ok(key
        .eq_ignore_ascii_case("HTML")
        .then(|| node.str_property(prop::VALUE).unwrap_or_default().to_string()))
}

fn node_property(node: Node<'_>, _: Option<&str>, _: &Transcoder<'_>) -> Output {
    let key = node.str_property(prop::KEY).unwrap_or_default();
    let line = match node.str_property(prop::VALUE).filter(|v| !v.is_empty()) {
        Some(value) => format!("{key}: {value}\n"),
        None => format!("{key}:\n"),
    };
    Ok(Some(escape(&line)))
}

/// The table holding `row`
fn table_of<'t>(row: Node<'t>) -> Result<Node<'t>> {
    row.parent()
        .filter(|p| p.is(NodeKind::Table))
        .ok_or_else(|| ExportError::translator(row, "row outside a table"))
}

/// Row group of a table row: `(is header, opens group, closes group)`
fn row_group(table: Node<'_>, row: Node<'_>) -> (bool, bool, bool) {
    let rows: Vec<Node<'_>> = table.children().collect();
    let is_rule = |n: &Node<'_>| n.str_property(prop::TYPE) == Some("rule");

    let mut group = 0;
    let mut seen_standard = false;
    let mut groups = Vec::with_capacity(rows.len());
    for r in &rows {
        if is_rule(r) {
            if seen_standard {
                group += 1;
                seen_standard = false;
            }
            groups.push(None);
        } else {
            seen_standard = true;
            groups.push(Some(group));
        }
    }
    let last_group = groups.iter().flatten().max().copied().unwrap_or(0);
    let has_header = last_group > 0;

    let index = rows.iter().position(|r| r.id() == row.id()).unwrap_or(0);
    let mine = groups.get(index).copied().flatten().unwrap_or(0);
    let opens = !groups[..index].iter().any(|g| *g == Some(mine));
    let closes = !groups[index + 1..].iter().any(|g| *g == Some(mine));
    (has_header && mine == 0, opens, closes)
}

fn table_row(node: Node<'_>, contents: Option<&str>, _: &Transcoder<'_>) -> Output {
    if node.str_property(prop::TYPE) == Some("rule") {
        return Ok(None);
    }
    let (header, opens, closes) = row_group(table_of(node)?, node);
    let group = if header { "thead" } else { "tbody" };
    let mut out = String::new();
    if opens {
        out.push_str(&format!("<{group}>\n"));
    }
    out.push_str(&format!("<tr>{}</tr>", contents.unwrap_or_default()));
    if closes {
        out.push_str(&format!("\n</{group}>"));
    }
    Ok(Some(out))
}

fn table_cell(node: Node<'_>, contents: Option<&str>, _: &Transcoder<'_>) -> Output {
    let row = node
        .parent()
        .filter(|p| p.is(NodeKind::TableRow))
        .ok_or_else(|| ExportError::translator(node, "cell outside a table row"))?;
    let header = row_group(table_of(row)?, row).0;
    let body = contents.unwrap_or_default().trim();
    Ok(Some(if header {
        format!("<th scope=\"col\">{body}</th>")
    } else {
        format!("<td>{body}</td>")
    }))
}

fn src_block(node: Node<'_>, _: Option<&str>, _: &Transcoder<'_>) -> Output {
    let lang = node.str_property(prop::LANGUAGE).unwrap_or_default();
    Ok(Some(format!(
        "<pre class=\"src src-{lang}\">{}</pre>",
        escaped_value(node)
    )))
}

fn example_block(node: Node<'_>, _: Option<&str>, _: &Transcoder<'_>) -> Output {
    Ok(Some(format!("<pre class=\"example\">\n{}</pre>", escaped_value(node))))
}

fn special_block(node: Node<'_>, contents: Option<&str>, _: &Transcoder<'_>) -> Output {
    let class = node.str_property(prop::TYPE).unwrap_or_default().to_lowercase();
    Ok(Some(format!(
        "<div class=\"{class}\">\n{}</div>",
        contents.unwrap_or_default()
    )))
}

fn verse_block(_: Node<'_>, contents: Option<&str>, _: &Transcoder<'_>) -> Output {
    let lines = contents.unwrap_or_default().trim_end().replace('\n', "<br>\n");
    Ok(Some(format!("<p class=\"verse\">\n{lines}</p>")))
}

fn export_block(node: Node<'_>, _: Option<&str>, _: &Transcoder<'_>) -> Output {
    let html = node
        .str_property(prop::TYPE)
        .is_some_and(|t| t.eq_ignore_ascii_case("HTML"));
    Ok(html.then(|| node.str_property(prop::VALUE).unwrap_or_default().to_string()))
}

fn export_snippet(node: Node<'_>, _: Option<&str>, _: &Transcoder<'_>) -> Output {
    let html = node.str_property(prop::BACKEND) == Some("html");
    Ok(html.then(|| node.str_property(prop::VALUE).unwrap_or_default().to_string()))
}

fn footnote_reference(node: Node<'_>, _: Option<&str>, tx: &Transcoder<'_>) -> Output {
    let ctx = tx.context();
    let separator = match node.previous_sibling() {
        Some(prev) if prev.is(NodeKind::FootnoteReference) && !ctx.is_ignored(prev.id()) => {
            ctx.string(FOOTNOTE_SEPARATOR).unwrap_or_default()
        }
        _ => "",
    };
    let mark = ctx.record_footnote(node);
    let n = mark.number;
    let id = if mark.first {
        format!("fnr.{n}")
    } else {
        format!("fnr.{n}.100")
    };
    let anchor = format!(
        "<a id=\"{id}\" class=\"footref\" href=\"#fn.{n}\" role=\"doc-backlink\">{n}</a>"
    );
    let format = ctx.string(FOOTNOTE_FORMAT).unwrap_or("%s");
    Ok(Some(format!("{separator}{}", fill(format, &[&anchor]))))
}

fn target(node: Node<'_>, _: Option<&str>, tx: &Transcoder<'_>) -> Output {
    Ok(Some(format!(
        "<a id=\"{}\"></a>",
        tx.context().reference(node.id())
    )))
}

fn radio_target(node: Node<'_>, contents: Option<&str>, tx: &Transcoder<'_>) -> Output {
    Ok(Some(format!(
        "<a id=\"{}\">{}</a>",
        tx.context().reference(node.id()),
        contents.unwrap_or_default()
    )))
}

fn timestamp(node: Node<'_>, _: Option<&str>, _: &Transcoder<'_>) -> Output {
    Ok(Some(format!(
        "<span class=\"timestamp-wrapper\"><span class=\"timestamp\">{}</span></span>",
        escaped_value(node)
    )))
}

fn entity(node: Node<'_>, _: Option<&str>, tx: &Transcoder<'_>) -> Output {
    let name = node.str_property(prop::NAME).unwrap_or_default();
    if !tx.context().flag(options::WITH_ENTITIES) {
        return Ok(Some(format!("\\{name}")));
    }
    Ok(Some(
        node.str_property(prop::HTML)
            .map_or_else(|| format!("&{name};"), str::to_string),
    ))
}

fn statistics_cookie(node: Node<'_>, _: Option<&str>, _: &Transcoder<'_>) -> Output {
    Ok(Some(format!("<code>{}</code>", escaped_value(node))))
}

fn planning(node: Node<'_>, _: Option<&str>, _: &Transcoder<'_>) -> Output {
    Ok(Some(format!(
        "<p><span class=\"timestamp-wrapper\">{}</span></p>",
        escaped_value(node)
    )))
}

fn clock(node: Node<'_>, _: Option<&str>, _: &Transcoder<'_>) -> Output {
    Ok(Some(format!(
        "<p><span class=\"timestamp-wrapper\"><span class=\"timestamp-kwd\">CLOCK:</span> <span class=\"timestamp\">{}</span></span></p>",
        escaped_value(node)
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Document;
    use crate::export::Exporter;
    use crate::traits::ExportConfig;
    use pretty_assertions::assert_eq;

    fn export_html(doc: Document) -> String {
        Exporter::new()
            .export(doc, &ExportConfig::default().with_backend("html"))
            .unwrap()
    }

    #[test]
    fn test_every_kind_has_a_translator() {
        let html = backend();
        for kind in NodeKind::ALL {
            assert!(html.own_translator(kind).is_some(), "{kind}");
        }
    }

    #[test]
    fn test_paragraph_escapes_text() {
        let mut doc = Document::new();
        let para = doc.append(doc.root(), NodeKind::Paragraph);
        doc.append_text(para, "a < b & c");
        assert_eq!(export_html(doc), "<p>\na &lt; b &amp; c</p>\n");
    }

    #[test]
    fn test_table_row_groups() {
        let mut doc = Document::new();
        let table = doc.append(doc.root(), NodeKind::Table);
        for cells in [Some("Name"), None, Some("Ada"), Some("Alan")] {
            let row = doc.append(table, NodeKind::TableRow);
            match cells {
                Some(text) => {
                    doc.set(row, prop::TYPE, "standard");
                    let cell = doc.append(row, NodeKind::TableCell);
                    doc.append_text(cell, text);
                }
                None => doc.set(row, prop::TYPE, "rule"),
            }
        }
        assert_eq!(
            export_html(doc),
            "<table>\n<thead>\n<tr><th scope=\"col\">Name</th></tr>\n</thead>\n\
             <tbody>\n<tr><td>Ada</td></tr>\n<tr><td>Alan</td></tr>\n</tbody>\n</table>\n"
        );
    }

    #[test]
    fn test_adjacent_footnote_references() {
        let mut doc = Document::new();
        let para = doc.append(doc.root(), NodeKind::Paragraph);
        doc.append_text(para, "Text");
        for label in ["a", "b", "a"] {
            let r = doc.append(para, NodeKind::FootnoteReference);
            doc.set(r, prop::LABEL, label);
        }
        for label in ["a", "b"] {
            let def = doc.append(doc.root(), NodeKind::FootnoteDefinition);
            doc.set(def, prop::LABEL, label);
            let p = doc.append(def, NodeKind::Paragraph);
            doc.append_text(p, &format!("note {label}"));
        }
        let out = export_html(doc);
        assert!(out.contains(
            "Text<sup><a id=\"fnr.1\" class=\"footref\" href=\"#fn.1\" role=\"doc-backlink\">1</a></sup>\
             <sup>, </sup><sup><a id=\"fnr.2\""
        ));
        assert!(out.contains("<a id=\"fnr.1.100\""));
        assert!(out.contains("<div class=\"footpara\" role=\"doc-footnote\"><p>\nnote b</p></div>"));
    }
}
