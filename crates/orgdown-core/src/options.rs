// SPDX-License-Identifier: AGPL-3.0-or-later
//! Export options: generic specs, `#+OPTIONS:` parsing and resolution
//!
//! Precedence, highest first: document keywords, user values from
//! [`crate::ExportConfig`], the backend chain's defaults, generic defaults.

use crate::ast::{prop, Document, NodeKind, Value};
use crate::backend::OptionSpec;
use crate::traits::{ExportError, Result};
use std::collections::HashMap;
use tracing::warn;

/// Resolved option values for one export
pub type Options = HashMap<String, Value>;

pub const WITH_TOC: &str = "with-toc";
pub const HEADLINE_LEVELS: &str = "headline-levels";
pub const SECTION_NUMBERS: &str = "section-numbers";
pub const WITH_TAGS: &str = "with-tags";
pub const WITH_PRIORITY: &str = "with-priority";
pub const WITH_TODO_KEYWORDS: &str = "with-todo-keywords";
pub const WITH_FOOTNOTES: &str = "with-footnotes";
pub const WITH_SMART_QUOTES: &str = "with-smart-quotes";
pub const WITH_SPECIAL_STRINGS: &str = "with-special-strings";
pub const PRESERVE_BREAKS: &str = "preserve-breaks";
pub const WITH_LATEX: &str = "with-latex";
pub const WITH_DRAWERS: &str = "with-drawers";
pub const WITH_PROPERTIES: &str = "with-properties";
pub const WITH_PLANNING: &str = "with-planning";
pub const WITH_CLOCKS: &str = "with-clocks";
pub const WITH_TIMESTAMPS: &str = "with-timestamps";
pub const WITH_TASKS: &str = "with-tasks";
pub const WITH_ENTITIES: &str = "with-entities";
pub const WITH_STATISTICS_COOKIES: &str = "with-statistics-cookies";
pub const EXCLUDE_TAGS: &str = "exclude-tags";
pub const SELECT_TAGS: &str = "select-tags";
pub const TITLE: &str = "title";
pub const LANGUAGE: &str = "language";

/// Options every backend understands
pub fn generic_options() -> Vec<OptionSpec> {
    vec![
        OptionSpec::new(WITH_TOC, true).item("toc"),
        OptionSpec::new(HEADLINE_LEVELS, 3i64).item("H"),
        OptionSpec::new(SECTION_NUMBERS, true).item("num"),
        OptionSpec::new(WITH_TAGS, true).item("tags"),
        OptionSpec::new(WITH_PRIORITY, false).item("pri"),
        OptionSpec::new(WITH_TODO_KEYWORDS, true).item("todo"),
        OptionSpec::new(WITH_FOOTNOTES, true).item("f"),
        OptionSpec::new(WITH_SMART_QUOTES, false).item("'"),
        OptionSpec::new(WITH_SPECIAL_STRINGS, true).item("-"),
        OptionSpec::new(PRESERVE_BREAKS, false).item("\\n"),
        OptionSpec::new(WITH_LATEX, true).item("tex"),
        OptionSpec::new(WITH_DRAWERS, true).item("d"),
        OptionSpec::new(WITH_PROPERTIES, false).item("prop"),
        OptionSpec::new(WITH_PLANNING, false).item("p"),
        OptionSpec::new(WITH_CLOCKS, false).item("c"),
        OptionSpec::new(WITH_TIMESTAMPS, true).item("<"),
        OptionSpec::new(WITH_TASKS, true).item("tasks"),
        OptionSpec::new(WITH_ENTITIES, true).item("e"),
        OptionSpec::new(WITH_STATISTICS_COOKIES, true).item("stat"),
        OptionSpec::new(EXCLUDE_TAGS, vec!["noexport".to_string()])
            .keyword("EXCLUDE_TAGS")
            .split(),
        OptionSpec::new(SELECT_TAGS, vec!["export".to_string()])
            .keyword("SELECT_TAGS")
            .split(),
        OptionSpec::new(TITLE, "").keyword("TITLE"),
        OptionSpec::new(LANGUAGE, "en").keyword("LANGUAGE"),
    ]
}

/// Read one `#+OPTIONS:` value: `t`, `nil`, an integer, a parenthesized
/// list of names, or a bare symbol
pub fn parse_option_value(raw: &str) -> Value {
    match raw {
        "t" => Value::Bool(true),
        "nil" => Value::Bool(false),
        _ => {
            if let Ok(n) = raw.parse::<i64>() {
                Value::Integer(n)
            } else if let Some(inner) = raw.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
                Value::List(
                    inner
                        .split_whitespace()
                        .map(|s| s.trim_matches('"').to_string())
                        .collect(),
                )
            } else {
                Value::String(raw.trim_matches('"').to_string())
            }
        }
    }
}

/// Split an `#+OPTIONS:` line into `(item, value)` pairs.
///
/// Items are `name:value` words. A parenthesized value may contain spaces.
pub fn parse_options_line(line: &str) -> Vec<(String, Value)> {
    let mut pairs = Vec::new();
    let mut rest = line.trim_start();
    while !rest.is_empty() {
        let Some(colon) = rest.find(':') else { break };
        let item = &rest[..colon];
        if item.contains(char::is_whitespace) {
            // Stray word without a value; skip it
            let skip = rest.find(char::is_whitespace).unwrap_or(rest.len());
            rest = rest[skip..].trim_start();
            continue;
        }
        let after = &rest[colon + 1..];
        let end = if after.starts_with('(') {
            after.find(')').map_or(after.len(), |i| i + 1)
        } else {
            after.find(char::is_whitespace).unwrap_or(after.len())
        };
        pairs.push((item.to_string(), parse_option_value(&after[..end])));
        rest = after[end..].trim_start();
    }
    pairs
}

/// Keyword lines of the document, in order, as `(KEY, value)`
fn keywords(tree: &Document) -> impl Iterator<Item = (&str, &str)> {
    tree.node(tree.root())
        .descendants()
        .filter(|n| n.is(NodeKind::Keyword))
        .filter_map(|n| Some((n.str_property(prop::KEY)?, n.str_property(prop::VALUE).unwrap_or(""))))
}

/// Resolve every option in `specs` for `tree`.
///
/// `specs` must already be ordered nearest backend first (see
/// [`crate::BackendRegistry::option_specs`]).
pub fn resolve_options(tree: &Document, specs: &[OptionSpec], user: &Options) -> Result<Options> {
    let mut options: Options = specs
        .iter()
        .map(|spec| (spec.key.to_string(), spec.default.clone()))
        .collect();

    for (key, value) in user {
        options.insert(key.clone(), value.clone());
    }

    for (key, value) in keywords(tree) {
        if key.eq_ignore_ascii_case("OPTIONS") {
            for (item, value) in parse_options_line(value) {
                match specs.iter().find(|s| s.item == Some(item.as_str())) {
                    Some(spec) => {
                        options.insert(spec.key.to_string(), value);
                    }
                    None => warn!(item = %item, "ignoring unknown #+OPTIONS item"),
                }
            }
        } else if let Some(spec) = specs
            .iter()
            .find(|s| s.keyword.is_some_and(|k| k.eq_ignore_ascii_case(key)))
        {
            let value = if spec.split {
                Value::List(value.split_whitespace().map(str::to_string).collect())
            } else {
                Value::String(value.trim().to_string())
            };
            options.insert(spec.key.to_string(), value);
        }
    }

    validate(specs, &options)?;
    Ok(options)
}

/// Options declared with an integer default must stay positive integers
fn validate(specs: &[OptionSpec], options: &Options) -> Result<()> {
    for spec in specs {
        if !matches!(spec.default, Value::Integer(_)) {
            continue;
        }
        let Some(value) = options.get(spec.key) else {
            continue;
        };
        match value.as_integer() {
            Some(n) if n >= 1 => {}
            _ => {
                return Err(ExportError::InvalidOption {
                    key: spec.key.to_string(),
                    message: format!("expected a positive integer, got {value:?}"),
                })
            }
        }
    }
    Ok(())
}
