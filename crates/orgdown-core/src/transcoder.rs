// SPDX-License-Identifier: AGPL-3.0-or-later
//! Post-order dispatcher
//!
//! Children are transcoded first and concatenated into the parent's
//! `contents`; the parent's translator is then resolved through the backend
//! chain and called with the node, those contents and this transcoder.

use crate::ast::{Document, Node, NodeClass, NodeId, NodeKind};
use crate::backend::{Backend, BackendRegistry};
use crate::context::ExportContext;
use crate::resolve::Resolver;
use crate::traits::{ExportError, Result};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Renders links of a custom type: `(path, description, backend)`.
/// Returning `None` leaves the link to the backend's own rules.
pub type LinkProtocol = fn(&str, Option<&str>, &str) -> Option<String>;

/// End a non-blank string with exactly one newline, dropping trailing
/// blank lines. Blank strings are returned unchanged.
pub fn normalize_string(s: &str) -> String {
    if s.trim().is_empty() {
        return s.to_string();
    }
    let mut end = s.len();
    loop {
        let trimmed = s[..end].trim_end_matches([' ', '\t']);
        match trimmed.strip_suffix('\n') {
            Some(rest) => end = rest.len(),
            None => break,
        }
    }
    format!("{}\n", &s[..end])
}

/// Dispatcher bound to one tree, backend and context
#[derive(Clone, Copy)]
pub struct Transcoder<'a> {
    tree: &'a Document,
    registry: &'a BackendRegistry,
    backend: &'a Backend,
    ctx: &'a ExportContext,
    resolver: &'a dyn Resolver,
    protocols: &'a HashMap<String, LinkProtocol>,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> Transcoder<'a> {
    pub fn new(
        tree: &'a Document,
        registry: &'a BackendRegistry,
        backend: &str,
        ctx: &'a ExportContext,
        resolver: &'a dyn Resolver,
        protocols: &'a HashMap<String, LinkProtocol>,
    ) -> Result<Self> {
        Ok(Self {
            tree,
            registry,
            backend: registry.get(backend)?,
            ctx,
            resolver,
            protocols,
            cancel: None,
        })
    }

    /// Check `flag` between the document's top-level children
    pub fn with_cancellation(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn tree(&self) -> &'a Document {
        self.tree
    }

    pub fn context(&self) -> &'a ExportContext {
        self.ctx
    }

    pub fn backend(&self) -> &'a Backend {
        self.backend
    }

    pub fn registry(&self) -> &'a BackendRegistry {
        self.registry
    }

    pub fn resolver(&self) -> &'a dyn Resolver {
        self.resolver
    }

    pub fn node(&self, id: NodeId) -> Node<'a> {
        self.tree.node(id)
    }

    /// Custom renderer registered for a link type
    pub fn protocol(&self, link_type: &str) -> Option<LinkProtocol> {
        self.protocols.get(link_type).copied()
    }

    /// Verify that every kind present in the tree has a translator
    pub fn preflight(&self) -> Result<()> {
        let kinds: BTreeSet<NodeKind> = self.tree.iter().map(|n| n.kind()).collect();
        for kind in kinds {
            self.registry.resolve_handler(self.backend.name(), kind)?;
        }
        Ok(())
    }

    fn check_cancelled(&self) -> Result<()> {
        match self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => {
                debug!("export cancelled");
                Err(ExportError::Cancelled)
            }
            _ => Ok(()),
        }
    }

    /// Concatenated output of the node's exported children, or `None` when
    /// the node has no children at all
    pub fn contents(&self, id: NodeId) -> Result<Option<String>> {
        let node = self.tree.node(id);
        let is_root = id == self.tree.root();
        let children = self.ctx.visible_children(self.tree, id);
        if !node.has_children() && !(is_root && self.ctx.scope().is_some()) {
            return Ok(None);
        }
        let mut out = String::new();
        for child in children {
            if is_root {
                self.check_cancelled()?;
            }
            out.push_str(&self.export_data(child)?);
        }
        Ok(Some(out))
    }

    /// Translate one node without layout
    pub fn transcode(&self, id: NodeId) -> Result<Option<String>> {
        let node = self.tree.node(id);
        let kind = node.kind();
        let translator = self.registry.resolve_handler(self.backend.name(), kind)?;
        let contents = match self.contents(id)? {
            Some(c) if kind.is_greater_element() => Some(normalize_string(&c)),
            other => other,
        };
        translator(node, contents.as_deref(), self)
    }

    /// Translate one node and apply its trailing blank lines or spaces
    pub fn export_data(&self, id: NodeId) -> Result<String> {
        if self.ctx.is_ignored(id) {
            return Ok(String::new());
        }
        let node = self.tree.node(id);
        let Some(out) = self.transcode(id)? else {
            return Ok(String::new());
        };
        Ok(match node.kind().class() {
            NodeClass::Root => out,
            NodeClass::Object if node.is(NodeKind::PlainText) => out,
            NodeClass::Object => out + &" ".repeat(node.post_blank()),
            NodeClass::Element => normalize_string(&out) + &"\n".repeat(node.post_blank()),
        })
    }

    /// Concatenated output of a node sequence, such as a secondary string
    pub fn data(&self, ids: &[NodeId]) -> Result<String> {
        ids.iter().map(|id| self.export_data(*id)).collect()
    }

    /// The same transcoder dispatching through another backend
    pub fn rebind(&self, backend: &str) -> Result<Transcoder<'a>> {
        Ok(Self {
            backend: self.registry.get(backend)?,
            ..*self
        })
    }

    /// Translate `node` with `backend`'s translator for its kind, keeping
    /// the contents already computed
    pub fn with_backend(
        &self,
        backend: &str,
        node: Node<'_>,
        contents: Option<&str>,
    ) -> Result<Option<String>> {
        let other = self.rebind(backend)?;
        let translator = self.registry.resolve_handler(backend, node.kind())?;
        translator(node, contents, &other)
    }

    /// Export a node sequence entirely through another backend
    pub fn data_with_backend(&self, ids: &[NodeId], backend: &str) -> Result<String> {
        self.rebind(backend)?.data(ids)
    }
}
