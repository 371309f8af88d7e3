// SPDX-License-Identifier: AGPL-3.0-or-later
//! Plain text protection
//!
//! The steps run in a fixed order: typographic substitutions on the raw
//! text, then Markdown escaping, then hard line breaks. Moving the
//! substitutions after escaping would let them see inserted backslashes.

use crate::ast::{prop, Node, NodeKind};
use crate::context::ExportContext;
use crate::options;
use crate::transcoder::Transcoder;
use crate::traits::Result;
use once_cell::sync::Lazy;
use regex::Regex;

static SPECIAL_STRINGS: Lazy<[(Regex, &'static str); 4]> = Lazy::new(|| {
    [
        (Regex::new(r"\\-").expect("valid regex"), "&#x00ad;"),
        (Regex::new(r"---([^-])").expect("valid regex"), "&#x2014;$1"),
        (Regex::new(r"--([^-])").expect("valid regex"), "&#x2013;$1"),
        (Regex::new(r"\.\.\.").expect("valid regex"), "&#x2026;"),
    ]
});

static TRAILING_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]*\n").expect("valid regex"));

/// Backslash-escape the characters Markdown treats as inline markup
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '`' | '*' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn opens_quote(previous: Option<char>) -> bool {
    previous.map_or(true, |c| c.is_whitespace() || "([{<-/".contains(c))
}

/// Replace straight quotes with curly HTML entities.
///
/// `after_word` tells whether the text is glued to a preceding object, in
/// which case a leading quote closes rather than opens.
fn smart_quotes(text: &str, after_word: bool) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous = after_word.then_some('x');
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if opens_quote(previous) => out.push_str("&ldquo;"),
            '"' => out.push_str("&rdquo;"),
            '\'' => {
                let inside_word = previous.is_some_and(char::is_alphanumeric)
                    && chars.peek().is_some_and(|n| n.is_alphanumeric());
                if !inside_word && opens_quote(previous) {
                    out.push_str("&lsquo;");
                } else {
                    out.push_str("&rsquo;");
                }
            }
            _ => out.push(c),
        }
        previous = Some(c);
    }
    out
}

/// Which optional plain text substitutions are active
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextRules {
    pub smart_quotes: bool,
    pub special_strings: bool,
    pub preserve_breaks: bool,
}

impl TextRules {
    pub fn from_context(ctx: &ExportContext) -> Self {
        Self {
            smart_quotes: ctx.flag(options::WITH_SMART_QUOTES),
            special_strings: ctx.flag(options::WITH_SPECIAL_STRINGS),
            preserve_breaks: ctx.flag(options::PRESERVE_BREAKS),
        }
    }

    /// Protect raw `text` for Markdown output
    pub fn apply(&self, text: &str, after_word: bool) -> String {
        let mut text = if self.smart_quotes {
            smart_quotes(text, after_word)
        } else {
            text.to_string()
        };
        if self.special_strings {
            for (pattern, replacement) in SPECIAL_STRINGS.iter() {
                text = pattern.replace_all(&text, *replacement).into_owned();
            }
        }
        let mut text = escape_markdown(&text)
            .replace("\n#", "\n\\#")
            .replace("![", "\\![");
        if self.preserve_breaks {
            text = TRAILING_BREAK.replace_all(&text, "  \n").into_owned();
        }
        text
    }
}

pub(super) fn plain_text(
    node: Node<'_>,
    _: Option<&str>,
    tx: &Transcoder<'_>,
) -> Result<Option<String>> {
    let value = node.str_property(prop::VALUE).unwrap_or_default();
    let after_word = node
        .previous_sibling()
        .is_some_and(|p| !p.is(NodeKind::PlainText) && p.post_blank() == 0);
    Ok(Some(TextRules::from_context(tx.context()).apply(value, after_word)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ALL: TextRules = TextRules {
        smart_quotes: true,
        special_strings: true,
        preserve_breaks: true,
    };

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("a *b* c"), "a \\*b\\* c");
        assert_eq!(escape_markdown("snake_case `x` \\"), "snake\\_case \\`x\\` \\\\");
    }

    #[test]
    fn test_line_leading_hash_and_image_bang() {
        let rules = TextRules::default();
        assert_eq!(rules.apply("a\n# b", false), "a\n\\# b");
        assert_eq!(rules.apply("#top", false), "#top");
        assert_eq!(rules.apply("see ![this]", false), "see \\![this]");
    }

    #[test]
    fn test_special_strings_before_escaping() {
        let rules = TextRules {
            special_strings: true,
            ..TextRules::default()
        };
        assert_eq!(rules.apply("a--b", false), "a&#x2013;b");
        assert_eq!(rules.apply("a---b", false), "a&#x2014;b");
        assert_eq!(rules.apply("wait...", false), "wait&#x2026;");
        // A shy hyphen consumes its backslash instead of getting it escaped
        assert_eq!(rules.apply("hy\\-phen", false), "hy&#x00ad;phen");
        assert_eq!(TextRules::default().apply("hy\\-phen", false), "hy\\\\-phen");
    }

    #[test]
    fn test_smart_quotes() {
        assert_eq!(
            ALL.apply("\"quoted\" and 'single' don't", false),
            "&ldquo;quoted&rdquo; and &lsquo;single&rsquo; don&rsquo;t"
        );
        assert_eq!(ALL.apply("\" after", true), "&rdquo; after");
    }

    #[test]
    fn test_preserve_breaks_after_escaping() {
        assert_eq!(ALL.apply("one \t\ntwo_\n", false), "one  \ntwo\\_  \n");
    }
}
