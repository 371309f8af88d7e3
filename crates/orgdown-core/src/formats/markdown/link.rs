// SPDX-License-Identifier: AGPL-3.0-or-later
//! Links, classified by type before rendering

use super::text::escape_markdown;
use super::LINK_ORG_FILES_AS_MD;
use crate::ast::{prop, Node, NodeClass, NodeKind};
use crate::formats::fill;
use crate::formats::html::headline_anchor;
use crate::resolve::Resolution;
use crate::transcoder::Transcoder;
use crate::traits::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

static IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(jpeg|jpg|png|gif|svg|webp)$").expect("valid regex"));

/// `notes.org` becomes `notes.md`; any other path is returned unchanged
pub fn org_to_md_path(path: &str) -> String {
    let name_start = path.rfind('/').map_or(0, |i| i + 1);
    match path[name_start..].rfind('.') {
        Some(dot) if dot > 0 && path[name_start + dot + 1..].eq_ignore_ascii_case("org") => {
            format!("{}.md", &path[..name_start + dot])
        }
        _ => path.to_string(),
    }
}

fn is_inline_image(link_type: &str, path: &str, contents: Option<&str>) -> bool {
    contents.is_none() && matches!(link_type, "file" | "http" | "https") && IMAGE.is_match(path)
}

/// Caption of the element holding the link
fn caption(link: Node<'_>, tx: &Transcoder<'_>) -> Result<String> {
    let element = link
        .ancestors()
        .find(|n| n.kind().class() == NodeClass::Element);
    match element {
        Some(element) => tx.data(element.nodes_property(prop::CAPTION)),
        None => Ok(String::new()),
    }
}

fn internal(
    node: Node<'_>,
    desc: Option<&str>,
    rewrite: bool,
    tx: &Transcoder<'_>,
) -> Result<Option<String>> {
    let ctx = tx.context();
    match tx.resolver().resolve(node, ctx) {
        Resolution::External(file) => {
            let path = if rewrite { org_to_md_path(&file) } else { file };
            Ok(Some(match desc {
                Some(desc) => format!("[{desc}]({path})"),
                None => format!("<{path}>"),
            }))
        }
        Resolution::Node(id) => {
            let target = tx.node(id);
            if target.is(NodeKind::Headline) {
                let text = match (desc, ctx.headline_number(id)) {
                    (Some(desc), _) => desc.to_string(),
                    (None, Some(number)) => {
                        let dotted: Vec<String> = number.iter().map(usize::to_string).collect();
                        dotted.join(".")
                    }
                    (None, None) => tx.data(target.nodes_property(prop::TITLE))?,
                };
                return Ok(Some(format!("[{text}](#{})", headline_anchor(target, tx))));
            }
            let text = desc
                .map(str::to_string)
                .or_else(|| tx.resolver().ordinal(target, ctx).map(|o| o.to_string()));
            Ok(text.map(|text| format!("[{text}](#{})", ctx.reference(id))))
        }
        Resolution::Unresolved => {
            let path = node.str_property(prop::PATH).unwrap_or_default();
            warn!(path, "unresolved link");
            Ok(Some(desc.map_or_else(|| escape_markdown(path), str::to_string)))
        }
    }
}

pub(super) fn link(node: Node<'_>, contents: Option<&str>, tx: &Transcoder<'_>) -> Result<Option<String>> {
    let ctx = tx.context();
    let link_type = node.str_property(prop::TYPE).unwrap_or("fuzzy");
    let raw_path = node.str_property(prop::PATH).unwrap_or_default();
    let desc = contents.filter(|c| !c.trim().is_empty());
    let rewrite = ctx.flag(LINK_ORG_FILES_AS_MD);

    if let Some(protocol) = tx.protocol(link_type) {
        if let Some(out) = protocol(raw_path, desc, tx.backend().name()) {
            return Ok(Some(out));
        }
    }

    if matches!(link_type, "custom-id" | "id" | "fuzzy") {
        return internal(node, desc, rewrite, tx);
    }

    if is_inline_image(link_type, raw_path, contents) {
        let path = if link_type == "file" {
            raw_path.to_string()
        } else {
            format!("{link_type}:{raw_path}")
        };
        let caption = caption(node, tx)?;
        return Ok(Some(if caption.trim().is_empty() {
            format!("![img]({path})")
        } else {
            format!("![img]({path} \"{}\")", caption.trim())
        }));
    }

    match link_type {
        "coderef" => {
            let value = tx
                .resolver()
                .resolve_coderef(tx.tree(), ctx, raw_path)
                .unwrap_or_else(|| {
                    warn!(label = raw_path, "unresolved code reference");
                    raw_path.to_string()
                });
            let format = desc.map_or_else(|| "%s".to_string(), |d| d.replacen(raw_path, "%s", 1));
            Ok(Some(fill(&format, &[&value])))
        }
        "radio" => {
            let desc = desc.unwrap_or_default();
            Ok(Some(match tx.resolver().resolve(node, ctx) {
                Resolution::Node(id) => format!("<a href=\"#{}\">{desc}</a>", ctx.reference(id)),
                _ => desc.to_string(),
            }))
        }
        _ => {
            let path = match link_type {
                "http" | "https" | "ftp" | "mailto" => format!("{link_type}:{raw_path}"),
                "file" => {
                    let path = if rewrite {
                        org_to_md_path(raw_path)
                    } else {
                        raw_path.to_string()
                    };
                    if path.starts_with('/') {
                        format!("file://{path}")
                    } else {
                        path
                    }
                }
                _ => raw_path.to_string(),
            };
            Ok(Some(match desc {
                Some(desc) => format!("[{desc}]({path})"),
                None => format!("<{path}>"),
            }))
        }
    }
}
