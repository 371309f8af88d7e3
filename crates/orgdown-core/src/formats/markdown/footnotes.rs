// SPDX-License-Identifier: AGPL-3.0-or-later
//! Footnote section appended after the body

use super::headline::{headline_title, style, toplevel, HeadlineStyle};
use super::{footnote_marker, FOOTNOTES_SECTION};
use crate::formats::{fill, footnote_bodies};
use crate::transcoder::Transcoder;
use crate::traits::Result;

/// Every referenced footnote, in first-reference order, or nothing when
/// the body referenced none
pub(super) fn footnote_section(tx: &Transcoder<'_>) -> Result<String> {
    let bodies = footnote_bodies(tx)?;
    if bodies.is_empty() {
        return Ok(String::new());
    }
    let items: Vec<String> = bodies
        .iter()
        .map(|(number, body)| format!("{} {}\n", footnote_marker(tx, *number), body.trim()))
        .collect();
    let title = headline_title(
        style(tx).unwrap_or(HeadlineStyle::Atx),
        toplevel(tx),
        "Footnotes",
        None,
        "",
    );
    let template = tx.context().string(FOOTNOTES_SECTION).unwrap_or("%s%s");
    Ok(fill(template, &[&title, &items.join("\n")]))
}
