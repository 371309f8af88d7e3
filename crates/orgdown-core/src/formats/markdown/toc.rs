// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tables of contents, global or requested by a `#+TOC:` keyword

use super::headline::{headline_title, style, tag_string, toplevel, visible_tags, HeadlineStyle};
use super::text::escape_markdown;
use crate::ast::{prop, Node, NodeId, NodeKind, Value};
use crate::formats::html::headline_anchor;
use crate::formats::remove_indentation;
use crate::options;
use crate::resolve::{classify_link, Resolution};
use crate::transcoder::Transcoder;
use crate::traits::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

static HEADLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bheadlines\b").expect("valid regex"));
static DEPTH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[0-9]+\b").expect("valid regex"));
static LOCAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\blocal\b").expect("valid regex"));
static TARGET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#":target +("[^"]+?"|\S+)"#).expect("valid regex"));

/// A `#+TOC: headlines [N] [local] [:target LINK]` request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocRequest {
    pub depth: Option<usize>,
    pub local: bool,
    pub target: Option<String>,
}

impl TocRequest {
    /// `None` unless the value asks for headlines
    pub fn parse(value: &str) -> Option<Self> {
        if !HEADLINES.is_match(value) {
            return None;
        }
        let target = TARGET.captures(value).map(|c| c[1].trim_matches('"').to_string());
        let rest = TARGET.replace(value, "");
        Some(Self {
            depth: DEPTH.find(&rest).and_then(|m| m.as_str().parse().ok()),
            local: LOCAL.is_match(&rest),
            target,
        })
    }
}

/// Depth carried by a `with-toc` value, `None` meaning every level
pub(super) fn depth_of(value: &Value) -> Option<usize> {
    value.as_integer().and_then(|d| usize::try_from(d).ok())
}

fn notoc(headline: Node<'_>) -> bool {
    std::iter::once(headline)
        .chain(headline.ancestors())
        .filter(|n| n.is(NodeKind::Headline))
        .find_map(|n| n.str_property(prop::UNNUMBERED))
        == Some("notoc")
}

/// Headlines a table of contents lists, in document order.
///
/// `scope` narrows the collection to the headline containing it; `depth`
/// then counts from that headline's level.
pub fn collect_headlines<'t>(
    tx: &Transcoder<'t>,
    depth: Option<usize>,
    scope: Option<NodeId>,
) -> Vec<Node<'t>> {
    let ctx = tx.context();
    let tree = tx.tree();
    let scope = scope
        .map(|id| tree.node(id))
        .and_then(|n| {
            if n.is(NodeKind::Headline) {
                Some(n)
            } else {
                n.lineage(&[NodeKind::Headline])
            }
        });
    let limit = ctx.headline_levels();
    let depth = match (depth, scope) {
        (Some(n), Some(headline)) => (ctx.relative_level(headline) + n).min(limit),
        (Some(n), None) => n.min(limit),
        (None, _) => limit,
    };
    let under = scope.map_or(tree.root(), |h| h.id());

    ctx.visible_descendants(tree, under)
        .into_iter()
        .filter(|n| n.is(NodeKind::Headline))
        .filter(|h| !h.flag(prop::FOOTNOTE_SECTION) && !notoc(*h))
        .filter(|h| ctx.relative_level(*h) <= depth)
        .collect()
}

fn entry(headline: Node<'_>, tx: &Transcoder<'_>) -> Result<String> {
    let ctx = tx.context();
    let indentation = " ".repeat(4 * (ctx.relative_level(headline) - 1));
    let bullet = match ctx.headline_number(headline.id()).and_then(|n| n.last()) {
        Some(last) => {
            let prefix = format!("{last}.");
            let pad = 4usize.saturating_sub(prefix.len()).max(1);
            format!("{prefix}{}", " ".repeat(pad))
        }
        None => "-   ".to_string(),
    };
    let title = match headline.str_property(prop::ALT_TITLE) {
        Some(alt) => escape_markdown(alt),
        None => tx.data_with_backend(headline.nodes_property(prop::TITLE), "md-toc-entry")?,
    };
    let with_tags = ctx
        .option(options::WITH_TAGS)
        .is_some_and(|v| v.is_truthy() && v.as_str() != Some("not-in-toc"));
    let tags = if with_tags {
        tag_string(&visible_tags(headline, tx))
    } else {
        String::new()
    };
    Ok(format!(
        "{indentation}{bullet}[{title}](#{}){tags}",
        headline_anchor(headline, tx)
    ))
}

/// Render a table of contents, titled unless it is scoped.
/// Empty when no headline qualifies.
pub(super) fn build_toc(
    tx: &Transcoder<'_>,
    depth: Option<usize>,
    scope: Option<NodeId>,
) -> Result<String> {
    let headlines = collect_headlines(tx, depth, scope);
    if headlines.is_empty() {
        return Ok(String::new());
    }
    let entries = headlines
        .into_iter()
        .map(|h| entry(h, tx))
        .collect::<Result<Vec<_>>>()?;
    let mut out = String::new();
    if scope.is_none() {
        out.push_str(&headline_title(
            style(tx).unwrap_or(HeadlineStyle::Atx),
            toplevel(tx),
            "Table of Contents",
            None,
            "",
        ));
    }
    out.push_str(&entries.join("\n"));
    out.push('\n');
    Ok(out)
}

/// Scope of a keyword request: its resolved `:target`, or the keyword
/// itself when local
fn keyword_scope(keyword: Node<'_>, request: &TocRequest, tx: &Transcoder<'_>) -> Option<NodeId> {
    if let Some(target) = &request.target {
        let parts = classify_link(target);
        match tx
            .resolver()
            .resolve_path(tx.tree(), tx.context(), &parts.link_type, &parts.path)
        {
            Resolution::Node(id) => return Some(id),
            _ => warn!(target = target.as_str(), "table of contents target not found"),
        }
    }
    request.local.then(|| keyword.id())
}

fn request(keyword: Node<'_>) -> Option<TocRequest> {
    let key = keyword.str_property(prop::KEY)?;
    if !key.eq_ignore_ascii_case("TOC") {
        return None;
    }
    TocRequest::parse(keyword.str_property(prop::VALUE).unwrap_or_default())
}

/// Headlines listed by a `#+TOC:` keyword; empty for any other keyword
pub(super) fn keyword_headlines<'t>(keyword: Node<'_>, tx: &Transcoder<'t>) -> Vec<Node<'t>> {
    match request(keyword) {
        Some(request) => {
            let scope = keyword_scope(keyword, &request, tx);
            collect_headlines(tx, request.depth, scope)
        }
        None => Vec::new(),
    }
}

pub(super) fn toc_keyword(keyword: Node<'_>, tx: &Transcoder<'_>) -> Result<Option<String>> {
    let Some(request) = request(keyword) else {
        return Ok(None);
    };
    let scope = keyword_scope(keyword, &request, tx);
    let toc = build_toc(tx, request.depth, scope)?;
    Ok((!toc.is_empty()).then(|| remove_indentation(&toc)))
}
