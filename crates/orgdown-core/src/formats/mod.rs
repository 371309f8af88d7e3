// SPDX-License-Identifier: AGPL-3.0-or-later
//! Builtin backends and the Org reader

pub mod html;
pub mod markdown;
#[cfg(feature = "orgmode")]
pub mod orgmode;

#[cfg(feature = "orgmode")]
pub use orgmode::OrgModeHandler;

use crate::ast::prop;
use crate::context::FootnoteBody;
use crate::transcoder::Transcoder;
use crate::traits::Result;
use tracing::warn;

/// Substitute each `%s` of `template` with the next argument
pub(crate) fn fill(template: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut args = args.iter();
    let mut rest = template;
    while let Some(at) = rest.find("%s") {
        out.push_str(&rest[..at]);
        out.push_str(args.next().copied().unwrap_or_default());
        rest = &rest[at + 2..];
    }
    out.push_str(rest);
    out
}

/// Prefix every line of `text` with `width` spaces
pub(crate) fn indent(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    text.split_inclusive('\n')
        .map(|line| format!("{pad}{line}"))
        .collect()
}

/// Remove the indentation shared by every non-blank line
pub(crate) fn remove_indentation(text: &str) -> String {
    let common = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);
    text.split_inclusive('\n')
        .map(|line| {
            if line.trim().is_empty() {
                line.trim_start_matches([' ', '\t'])
            } else {
                &line[common..]
            }
        })
        .collect()
}

/// Transcoded body of every footnote, numbered in reference order.
///
/// Footnotes referenced from inside other footnotes are recorded while
/// this runs and are included.
pub(crate) fn footnote_bodies(tx: &Transcoder<'_>) -> Result<Vec<(usize, String)>> {
    let ctx = tx.context();
    let mut bodies = Vec::new();
    let mut number = 1;
    while let Some(entry) = ctx.footnote(number) {
        let body = match entry.body {
            FootnoteBody::Definition(def) => tx.contents(def)?.unwrap_or_default(),
            FootnoteBody::Inline(reference) => {
                tx.data(tx.node(reference).nodes_property(prop::INLINE_DEFINITION))?
            }
            FootnoteBody::Missing => {
                warn!(label = ?entry.label, "footnote referenced but never defined");
                String::new()
            }
        };
        bodies.push((entry.number, body));
        number += 1;
    }
    Ok(bodies)
}
