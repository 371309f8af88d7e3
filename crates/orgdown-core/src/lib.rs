// SPDX-License-Identifier: AGPL-3.0-or-later
//! Orgdown Core - Org document trees exported through derivable backends
//!
//! This crate provides:
//! - An arena document tree with typed node kinds and property values
//! - Backends that derive from one another, overriding translators per kind
//! - The export lifecycle: options, pruning, filters, transcoding
//! - The builtin `html`, `md` and `md-toc-entry` backends
//! - An Org reader built on orgize (feature `orgmode`)

pub mod ast;
pub mod backend;
pub mod context;
pub mod export;
pub mod filters;
pub mod formats;
pub mod options;
mod prune;
pub mod resolve;
pub mod traits;
pub mod transcoder;

pub use ast::{Document, Node, NodeId, NodeKind, Value};
pub use backend::{Backend, BackendRegistry, Filter, OptionSpec};
pub use context::ExportContext;
pub use export::Exporter;
pub use resolve::{Resolver, TreeResolver};
pub use traits::{ExportConfig, ExportError, ParseConfig, Parser, Renderer, Result};
pub use transcoder::Transcoder;

#[cfg(feature = "orgmode")]
pub use formats::OrgModeHandler;
