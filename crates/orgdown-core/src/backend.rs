// SPDX-License-Identifier: AGPL-3.0-or-later
//! Named export backends and their derivation chains
//!
//! A backend is a declarative record: a translator per node kind, option
//! specs and filters. A derived backend lists only what it overrides. Lookup
//! walks `self → parent → ...` and stops at the first hit, so an override
//! hides the parent's translator entirely.

use crate::ast::{Document, Node, NodeKind, Value};
use crate::context::ExportContext;
use crate::options;
use crate::transcoder::Transcoder;
use crate::traits::{ExportError, Result};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::trace;

/// Converts one node, given its already-transcoded contents
///
/// `None` means the node contributes nothing, which differs from an empty
/// string: empty element output still receives its trailing blank lines.
pub type Translator = fn(Node<'_>, Option<&str>, &Transcoder<'_>) -> Result<Option<String>>;

/// Rewrites the whole tree before transcoding
pub type TreeFilter = fn(Document, &Backend, &ExportContext) -> Result<Document>;

/// Rewrites the final output string
pub type OutputFilter = fn(String, &Backend, &ExportContext) -> Result<String>;

/// Hook points of the filter pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterStage {
    ParseTree,
    FinalOutput,
}

/// A filter registered on a backend, tagged with its stage
#[derive(Clone, Copy)]
pub enum Filter {
    ParseTree(TreeFilter),
    FinalOutput(OutputFilter),
}

impl Filter {
    pub fn stage(&self) -> FilterStage {
        match self {
            Filter::ParseTree(_) => FilterStage::ParseTree,
            Filter::FinalOutput(_) => FilterStage::FinalOutput,
        }
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Filter({:?})", self.stage())
    }
}

/// Declaration of an export option
#[derive(Debug, Clone, PartialEq)]
pub struct OptionSpec {
    /// Name used in the export context and in [`crate::ExportConfig::options`]
    pub key: &'static str,
    /// In-document keyword (`#+EXCLUDE_TAGS:`)
    pub keyword: Option<&'static str>,
    /// Item of the `#+OPTIONS:` line (`toc`, `H`, ...)
    pub item: Option<&'static str>,
    pub default: Value,
    /// Split keyword values on whitespace into a list
    pub split: bool,
}

impl OptionSpec {
    pub fn new(key: &'static str, default: impl Into<Value>) -> Self {
        Self {
            key,
            keyword: None,
            item: None,
            default: default.into(),
            split: false,
        }
    }

    pub fn keyword(mut self, keyword: &'static str) -> Self {
        self.keyword = Some(keyword);
        self
    }

    pub fn item(mut self, item: &'static str) -> Self {
        self.item = Some(item);
        self
    }

    pub fn split(mut self) -> Self {
        self.split = true;
        self
    }
}

/// A named set of translators, filters and option defaults
#[derive(Clone)]
pub struct Backend {
    name: String,
    parent: Option<String>,
    translators: HashMap<NodeKind, Translator>,
    filters: Vec<Filter>,
    options: Vec<OptionSpec>,
}

impl Backend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            translators: HashMap::new(),
            filters: Vec::new(),
            options: Vec::new(),
        }
    }

    /// A backend inheriting every translator of `parent` it does not override
    pub fn derived(name: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            parent: Some(parent.into()),
            ..Self::new(name)
        }
    }

    pub fn translator(mut self, kind: NodeKind, translator: Translator) -> Self {
        self.translators.insert(kind, translator);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn option(mut self, spec: OptionSpec) -> Self {
        self.options.push(spec);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Translator defined by this backend itself, ignoring parents
    pub fn own_translator(&self, kind: NodeKind) -> Option<Translator> {
        self.translators.get(&kind).copied()
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn options(&self) -> &[OptionSpec] {
        &self.options
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.translators.keys().collect();
        kinds.sort();
        f.debug_struct("Backend")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("translators", &kinds)
            .field("filters", &self.filters)
            .finish()
    }
}

/// Registry of backends, keyed by name
#[derive(Debug, Default, Clone)]
pub struct BackendRegistry {
    backends: HashMap<String, Backend>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
        }
    }

    /// Registry holding `html`, `md` and `md-toc-entry`
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for backend in [
            crate::formats::html::backend(),
            crate::formats::markdown::backend(),
            crate::formats::markdown::toc_entry_backend(),
        ] {
            if let Err(err) = registry.define_backend(backend) {
                unreachable!("builtin backends are consistent: {err}");
            }
        }
        registry
    }

    /// Register a new backend. Its parent must already be registered.
    pub fn define_backend(&mut self, backend: Backend) -> Result<()> {
        if self.backends.contains_key(backend.name()) {
            return Err(ExportError::DuplicateBackend(backend.name.clone()));
        }
        if let Some(parent) = backend.parent() {
            if !self.backends.contains_key(parent) {
                return Err(ExportError::UnknownBackend(parent.to_string()));
            }
        }
        self.backends.insert(backend.name.clone(), backend);
        Ok(())
    }

    /// Replace a registered backend, refusing changes that close a cycle
    pub fn redefine_backend(&mut self, backend: Backend) -> Result<Option<Backend>> {
        let name = backend.name.clone();
        if let Some(parent) = backend.parent() {
            if parent == name {
                return Err(ExportError::DerivationCycle(name));
            }
            self.chain(parent)?
                .iter()
                .any(|b| b.name == name)
                .then_some(())
                .map_or(Ok(()), |_| Err(ExportError::DerivationCycle(name.clone())))?;
        }
        Ok(self.backends.insert(name, backend))
    }

    pub fn get(&self, name: &str) -> Result<&Backend> {
        self.backends
            .get(name)
            .ok_or_else(|| ExportError::UnknownBackend(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }

    /// The backend followed by its ancestors, nearest first
    pub fn chain(&self, name: &str) -> Result<Vec<&Backend>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(name);
        while let Some(name) = current {
            if !seen.insert(name) {
                return Err(ExportError::DerivationCycle(name.to_string()));
            }
            let backend = self.get(name)?;
            chain.push(backend);
            current = backend.parent();
        }
        Ok(chain)
    }

    /// Whether `name` is `ancestor` or derives from it
    pub fn derives_from(&self, name: &str, ancestor: &str) -> bool {
        self.chain(name)
            .map(|chain| chain.iter().any(|b| b.name == ancestor))
            .unwrap_or(false)
    }

    /// First translator for `kind` along the derivation chain
    pub fn resolve_handler(&self, backend: &str, kind: NodeKind) -> Result<Translator> {
        for candidate in self.chain(backend)? {
            if let Some(translator) = candidate.own_translator(kind) {
                trace!(backend, owner = candidate.name(), %kind, "resolved translator");
                return Ok(translator);
            }
        }
        Err(ExportError::MissingHandler {
            backend: backend.to_string(),
            kind,
        })
    }

    /// Nearest option spec for `key`, falling back to the generic options
    pub fn resolve_option(&self, backend: &str, key: &str) -> Result<Option<OptionSpec>> {
        Ok(self
            .option_specs(backend)?
            .into_iter()
            .find(|spec| spec.key == key))
    }

    /// Every option known to `backend`: own specs first, then ancestors',
    /// then generic ones. Earlier entries shadow later ones with the same key.
    pub fn option_specs(&self, backend: &str) -> Result<Vec<OptionSpec>> {
        let mut seen = HashSet::new();
        let mut specs = Vec::new();
        let chain = self.chain(backend)?;
        let own = chain.iter().flat_map(|b| b.options().iter().cloned());
        for spec in own.chain(options::generic_options()) {
            if seen.insert(spec.key) {
                specs.push(spec);
            }
        }
        Ok(specs)
    }

    /// Filters of `stage`: the backend's own in registration order, then
    /// each ancestor's
    pub fn filters(&self, backend: &str, stage: FilterStage) -> Result<Vec<Filter>> {
        Ok(self
            .chain(backend)?
            .into_iter()
            .flat_map(|b| b.filters().iter().copied())
            .filter(|f| f.stage() == stage)
            .collect())
    }
}
