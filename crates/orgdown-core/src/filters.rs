// SPDX-License-Identifier: AGPL-3.0-or-later
//! Filter pipeline
//!
//! Filters of a stage run in order; each receives the previous one's result.

use crate::ast::Document;
use crate::backend::{BackendRegistry, Filter, FilterStage};
use crate::context::ExportContext;
use crate::traits::Result;
use tracing::debug;

/// Run the `parse-tree` filters of `backend` over the whole tree
pub fn apply_tree_filters(
    mut tree: Document,
    backend: &str,
    registry: &BackendRegistry,
    ctx: &ExportContext,
) -> Result<Document> {
    let owner = registry.get(backend)?;
    for (index, filter) in registry
        .filters(backend, FilterStage::ParseTree)?
        .into_iter()
        .enumerate()
    {
        if let Filter::ParseTree(f) = filter {
            debug!(backend, index, "applying parse-tree filter");
            tree = f(tree, owner, ctx)?;
        }
    }
    Ok(tree)
}

/// Run the `final-output` filters of `backend` over the output string
pub fn apply_output_filters(
    mut output: String,
    backend: &str,
    registry: &BackendRegistry,
    ctx: &ExportContext,
) -> Result<String> {
    let owner = registry.get(backend)?;
    for (index, filter) in registry
        .filters(backend, FilterStage::FinalOutput)?
        .into_iter()
        .enumerate()
    {
        if let Filter::FinalOutput(f) = filter {
            debug!(backend, index, "applying final-output filter");
            output = f(output, owner, ctx)?;
        }
    }
    Ok(output)
}
