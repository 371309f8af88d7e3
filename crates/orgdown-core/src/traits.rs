// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error type, configuration, and the parser/renderer seams

use crate::ast::{Document, NodeId, NodeKind, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Error type for parsing and exporting
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("No translator for {kind} in backend {backend} or any of its parents")]
    MissingHandler { backend: String, kind: NodeKind },

    #[error("Unknown backend: {0}")]
    UnknownBackend(String),

    #[error("Backend already defined: {0}")]
    DuplicateBackend(String),

    #[error("Backend derivation cycle through {0}")]
    DerivationCycle(String),

    #[error("Invalid value for option {key}: {message}")]
    InvalidOption { key: String, message: String },

    #[error("Translator for {kind} failed: {message}")]
    Translator { kind: NodeKind, message: String },

    #[error("Export cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl ExportError {
    /// A translator gave up on `node`
    pub fn translator(node: crate::ast::Node<'_>, message: impl Into<String>) -> Self {
        Self::Translator {
            kind: node.kind(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ExportError>;

/// Configuration for parsing Org text into a [`Document`]
#[derive(Debug, Clone)]
pub struct ParseConfig {
    /// Title of the headline holding footnote definitions
    pub footnote_section: String,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            footnote_section: "Footnotes".to_string(),
        }
    }
}

/// Configuration for one export
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Name of the registered backend to export with
    pub backend: String,
    /// User-level option values, keyed by option name (`with-toc`, ...)
    pub options: HashMap<String, Value>,
    /// Export only this headline and its subtree
    #[serde(skip)]
    pub subtree: Option<NodeId>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            backend: "md".to_string(),
            options: HashMap::new(),
            subtree: None,
        }
    }
}

impl ExportConfig {
    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = backend.into();
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn with_subtree(mut self, headline: NodeId) -> Self {
        self.subtree = Some(headline);
        self
    }
}

/// Parser trait: turn source text into a document tree
pub trait Parser: Send + Sync {
    /// Parse a string into a Document
    fn parse(&self, input: &str, config: &ParseConfig) -> Result<Document>;
}

/// Renderer trait: turn a document tree into output text
pub trait Renderer {
    /// Render a Document to a string
    fn render(&self, doc: Document, config: &ExportConfig) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_config_defaults_to_markdown() {
        let config = ExportConfig::default();
        assert_eq!(config.backend, "md");
        assert!(config.options.is_empty());
    }

    #[test]
    fn test_export_config_from_json() {
        let config: ExportConfig =
            serde_json::from_str(r#"{"options": {"with-toc": false, "headline-levels": 4}}"#)
                .unwrap();
        assert_eq!(config.backend, "md");
        assert_eq!(config.options.get("with-toc"), Some(&Value::Bool(false)));
        assert_eq!(config.options.get("headline-levels"), Some(&Value::Integer(4)));
    }

    #[test]
    fn test_translator_error_names_kind() {
        let mut doc = Document::new();
        let row = doc.append(doc.root(), NodeKind::TableRow);
        let err = ExportError::translator(doc.node(row), "row outside a table");
        assert_eq!(
            err.to_string(),
            "Translator for table-row failed: row outside a table"
        );
    }

    #[test]
    fn test_missing_handler_message_names_kind() {
        let err = ExportError::MissingHandler {
            backend: "md".into(),
            kind: NodeKind::TableCell,
        };
        assert_eq!(
            err.to_string(),
            "No translator for table-cell in backend md or any of its parents"
        );
    }
}
