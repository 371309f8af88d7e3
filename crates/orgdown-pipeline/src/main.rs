// SPDX-License-Identifier: AGPL-3.0-or-later
//! Orgdown CLI
//!
//! Provides commands for:
//! - `export`: Export one Org file
//! - `publish`: Run a TOML pipeline over a directory of Org files

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use orgdown_core::options::parse_option_value;
use orgdown_core::{ExportConfig, Exporter};
use orgdown_pipeline::{read_document, PipelineExecutor};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Orgdown - Org documents to Markdown.
#[derive(Parser)]
#[command(name = "orgdown", version, about)]
struct Cli {
    /// Log progress at info level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export one Org file.
    Export(ExportArgs),
    /// Publish a directory tree with a pipeline definition.
    Publish(PublishArgs),
}

#[derive(Args)]
struct ExportArgs {
    /// Org file to export
    file: PathBuf,

    /// Write here instead of standard output
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Backend to export with
    #[arg(short, long, default_value = "md")]
    backend: String,

    /// Export option as `key=value`, e.g. `with-toc=2`
    #[arg(long = "set", value_name = "KEY=VALUE")]
    options: Vec<String>,

    /// Print the parsed document tree as JSON instead of exporting
    #[arg(long)]
    tree: bool,
}

#[derive(Args)]
struct PublishArgs {
    /// Pipeline definition (TOML)
    pipeline: PathBuf,

    /// Pipeline to run, when it differs from the one defined in the file
    #[arg(long)]
    name: Option<String>,
}

fn export(args: ExportArgs) -> anyhow::Result<()> {
    let doc = read_document(&args.file)?;
    let output = if args.tree {
        doc.to_json()?
    } else {
        let mut config = ExportConfig::default().with_backend(args.backend);
        for option in &args.options {
            let Some((key, value)) = option.split_once('=') else {
                bail!("option `{option}` is not of the form key=value");
            };
            config = config.with_option(key.trim(), parse_option_value(value.trim()));
        }
        Exporter::new()
            .export(doc, &config)
            .with_context(|| format!("exporting {}", args.file.display()))?
    };

    match args.output {
        Some(path) => {
            fs::write(&path, output).with_context(|| format!("writing {}", path.display()))?
        }
        None => print!("{output}"),
    }
    Ok(())
}

fn publish(args: PublishArgs) -> anyhow::Result<()> {
    let mut executor = PipelineExecutor::new();
    let loaded = executor
        .load_pipeline(&args.pipeline)
        .with_context(|| format!("loading {}", args.pipeline.display()))?;
    let name = args.name.unwrap_or(loaded);
    for file in executor.execute(&name)? {
        println!("{} -> {}", file.source.display(), file.destination.display());
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let filter = if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Export(args) => export(args),
        Commands::Publish(args) => publish(args),
    };

    if let Err(err) = result {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
