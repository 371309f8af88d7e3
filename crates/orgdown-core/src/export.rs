// SPDX-License-Identifier: AGPL-3.0-or-later
//! Export lifecycle: options, pruning, filters, transcoding, output

use crate::ast::{Document, NodeKind};
use crate::backend::BackendRegistry;
use crate::context::ExportContext;
use crate::filters;
use crate::options;
use crate::resolve::{Resolver, TreeResolver};
use crate::traits::{ExportConfig, ExportError, Renderer, Result};
use crate::transcoder::{normalize_string, LinkProtocol, Transcoder};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use tracing::debug;

/// Runs exports against a backend registry
pub struct Exporter {
    registry: BackendRegistry,
    resolver: Box<dyn Resolver + Send + Sync>,
    protocols: HashMap<String, LinkProtocol>,
}

impl Default for Exporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Exporter {
    /// Exporter with the builtin `html`, `md` and `md-toc-entry` backends
    pub fn new() -> Self {
        Self::with_registry(BackendRegistry::builtin())
    }

    pub fn with_registry(registry: BackendRegistry) -> Self {
        Self {
            registry,
            resolver: Box::new(TreeResolver::new()),
            protocols: HashMap::new(),
        }
    }

    pub fn with_resolver(mut self, resolver: impl Resolver + Send + Sync + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    /// Claim every link of `link_type` before the backend's own rules
    pub fn with_protocol(mut self, link_type: impl Into<String>, protocol: LinkProtocol) -> Self {
        self.protocols.insert(link_type.into(), protocol);
        self
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut BackendRegistry {
        &mut self.registry
    }

    pub fn export(&self, tree: Document, config: &ExportConfig) -> Result<String> {
        self.run(tree, config, None)
    }

    /// Export, giving up with [`ExportError::Cancelled`] once `cancel` is set
    pub fn export_cancellable(
        &self,
        tree: Document,
        config: &ExportConfig,
        cancel: &AtomicBool,
    ) -> Result<String> {
        self.run(tree, config, Some(cancel))
    }

    fn run(&self, tree: Document, config: &ExportConfig, cancel: Option<&AtomicBool>) -> Result<String> {
        let backend = config.backend.as_str();
        self.registry.get(backend)?;
        debug!(backend, nodes = tree.len(), "starting export");

        let specs = self.registry.option_specs(backend)?;
        let options = options::resolve_options(&tree, &specs, &config.options)?;
        let mut ctx = ExportContext::new(backend, options);
        if let Some(headline) = config.subtree {
            match tree.get(headline) {
                Some(node) if node.is(NodeKind::Headline) => ctx = ctx.with_scope(headline),
                _ => {
                    return Err(ExportError::InvalidOption {
                        key: "subtree".into(),
                        message: format!("node {} is not a headline", headline.index()),
                    })
                }
            }
        }

        ctx.prune(&tree);
        let tree = filters::apply_tree_filters(tree, backend, &self.registry, &ctx)?;
        ctx.collect_tree_properties(&tree);

        let mut tx = Transcoder::new(
            &tree,
            &self.registry,
            backend,
            &ctx,
            self.resolver.as_ref(),
            &self.protocols,
        )?;
        if let Some(flag) = cancel {
            tx = tx.with_cancellation(flag);
        }
        tx.preflight()?;

        let body = tx.transcode(tree.root())?.unwrap_or_default();
        let output = filters::apply_output_filters(body, backend, &self.registry, &ctx)?;
        debug!(backend, bytes = output.len(), footnotes = ctx.footnote_count(), "export finished");
        if output.trim().is_empty() {
            return Ok(String::new());
        }
        Ok(normalize_string(&output))
    }
}

impl Renderer for Exporter {
    fn render(&self, doc: Document, config: &ExportConfig) -> Result<String> {
        self.export(doc, config)
    }
}
