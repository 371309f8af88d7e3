// SPDX-License-Identifier: AGPL-3.0-or-later
//! Orgdown Pipeline - batch export of Org file trees
//!
//! Pipelines define how a directory of Org files is published:
//! - Input: Source directory, file extension, recursion
//! - Steps: Ordered option adjustments applied to every export
//! - Output: Target directory and file extension

use orgdown_core::formats::markdown::LINK_ORG_FILES_AS_MD;
use orgdown_core::{
    options, Document, ExportConfig, ExportError, Exporter, OrgModeHandler, ParseConfig, Parser,
    Value,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Pipeline not found: {0}")]
    NotFound(String),

    #[error("Invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    #[error("Cannot read pipeline definition: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Export of {path} failed: {source}")]
    Export {
        path: PathBuf,
        #[source]
        source: ExportError,
    },

    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// A pipeline definition, as written in TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub name: String,
    pub input: PipelineInput,
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Export options applied before the steps
    #[serde(default)]
    pub options: HashMap<String, Value>,
    #[serde(default)]
    pub steps: Vec<PipelineStep>,
    pub output: PipelineOutput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineInput {
    pub directory: PathBuf,
    #[serde(default = "default_input_extension")]
    pub extension: String,
    #[serde(default = "default_recursive")]
    pub recursive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PipelineStep {
    /// Add a table of contents down to `depth`
    AddToc { depth: u8 },
    /// Point links to other Org files at their exported Markdown files
    ResolveLinks,
    /// Set one export option
    Set { key: String, value: Value },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub directory: PathBuf,
    #[serde(default = "default_output_extension")]
    pub extension: String,
}

fn default_backend() -> String {
    "md".to_string()
}

fn default_input_extension() -> String {
    "org".to_string()
}

fn default_output_extension() -> String {
    "md".to_string()
}

const fn default_recursive() -> bool {
    true
}

impl Pipeline {
    /// Parse a pipeline from TOML text
    pub fn from_toml(input: &str) -> Result<Self> {
        let pipeline: Self = toml::from_str(input)?;
        if pipeline.name.trim().is_empty() {
            return Err(PipelineError::InvalidConfig("pipeline name is empty".into()));
        }
        if pipeline.input.extension.is_empty() || pipeline.output.extension.is_empty() {
            return Err(PipelineError::InvalidConfig(format!(
                "{}: file extensions must not be empty",
                pipeline.name
            )));
        }
        Ok(pipeline)
    }

    /// Export configuration shared by every file of the pipeline
    pub fn export_config(&self) -> ExportConfig {
        let mut config = ExportConfig::default().with_backend(self.backend.clone());
        config.options = self.options.clone();
        let mut rewrite_links = false;
        for step in &self.steps {
            match step {
                PipelineStep::AddToc { depth } => {
                    config
                        .options
                        .insert(options::WITH_TOC.to_string(), Value::Integer(i64::from(*depth)));
                }
                PipelineStep::ResolveLinks => rewrite_links = true,
                PipelineStep::Set { key, value } => {
                    config.options.insert(key.clone(), value.clone());
                }
            }
        }
        config
            .options
            .entry(LINK_ORG_FILES_AS_MD.to_string())
            .or_insert(Value::Bool(rewrite_links));
        config
    }

    fn resolve_paths(&mut self, base: &Path) {
        if self.input.directory.is_relative() {
            self.input.directory = base.join(&self.input.directory);
        }
        if self.output.directory.is_relative() {
            self.output.directory = base.join(&self.output.directory);
        }
    }
}

/// One exported file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Parse one Org file
pub fn read_document(path: &Path) -> Result<Document> {
    let input = fs::read_to_string(path)?;
    OrgModeHandler::new()
        .parse(&input, &ParseConfig::default())
        .map_err(|source| PipelineError::Export {
            path: path.to_path_buf(),
            source,
        })
}

/// Pipeline executor
pub struct PipelineExecutor {
    pipelines: HashMap<String, Pipeline>,
    exporter: Exporter,
}

impl PipelineExecutor {
    pub fn new() -> Self {
        Self::with_exporter(Exporter::new())
    }

    /// Executor exporting through a customized exporter
    pub fn with_exporter(exporter: Exporter) -> Self {
        Self {
            pipelines: HashMap::new(),
            exporter,
        }
    }

    /// Load a pipeline from a TOML file and return its name.
    ///
    /// Relative directories are taken from the definition file's location.
    pub fn load_pipeline(&mut self, path: &Path) -> Result<String> {
        let mut pipeline = Pipeline::from_toml(&fs::read_to_string(path)?)?;
        if let Some(base) = path.parent() {
            pipeline.resolve_paths(base);
        }
        let name = pipeline.name.clone();
        debug!(name = %name, path = %path.display(), "loaded pipeline");
        self.register(pipeline);
        Ok(name)
    }

    /// Register a pipeline, replacing any pipeline of the same name
    pub fn register(&mut self, pipeline: Pipeline) {
        self.pipelines.insert(pipeline.name.clone(), pipeline);
    }

    pub fn get(&self, name: &str) -> Option<&Pipeline> {
        self.pipelines.get(name)
    }

    /// Files a pipeline would read, in a stable order
    pub fn sources(&self, pipeline: &Pipeline) -> Result<Vec<PathBuf>> {
        let walker = WalkDir::new(&pipeline.input.directory).sort_by_file_name();
        let walker = if pipeline.input.recursive {
            walker
        } else {
            walker.max_depth(1)
        };
        let mut sources = Vec::new();
        for entry in walker {
            let entry = entry?;
            let matches = entry
                .path()
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(&pipeline.input.extension));
            if entry.file_type().is_file() && matches {
                sources.push(entry.into_path());
            }
        }
        Ok(sources)
    }

    /// Export one source file with the pipeline's settings
    pub fn export_file(&self, pipeline: &Pipeline, source: &Path) -> Result<String> {
        let doc = read_document(source)?;
        self.exporter
            .export(doc, &pipeline.export_config())
            .map_err(|source_error| PipelineError::Export {
                path: source.to_path_buf(),
                source: source_error,
            })
    }

    /// Execute a pipeline, mirroring the input tree under the output
    /// directory
    pub fn execute(&self, pipeline_name: &str) -> Result<Vec<Published>> {
        let pipeline = self
            .pipelines
            .get(pipeline_name)
            .ok_or_else(|| PipelineError::NotFound(pipeline_name.to_string()))?;

        let mut published = Vec::new();
        for source in self.sources(pipeline)? {
            let relative = source
                .strip_prefix(&pipeline.input.directory)
                .map_err(|_| {
                    PipelineError::InvalidConfig(format!(
                        "{} is outside {}",
                        source.display(),
                        pipeline.input.directory.display()
                    ))
                })?;
            let destination = pipeline
                .output
                .directory
                .join(relative)
                .with_extension(&pipeline.output.extension);

            let output = self.export_file(pipeline, &source)?;
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&destination, output)?;
            debug!(source = %source.display(), destination = %destination.display(), "published");
            published.push(Published {
                source,
                destination,
            });
        }
        info!(pipeline = pipeline_name, files = published.len(), "pipeline finished");
        Ok(published)
    }
}

impl Default for PipelineExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const DEFINITION: &str = r#"
name = "site"
options = { "md-headline-style" = "setext" }

[input]
directory = "notes"

[output]
directory = "public"

[[steps]]
type = "add-toc"
depth = 1

[[steps]]
type = "resolve-links"

[[steps]]
type = "set"
key = "with-tags"
value = false
"#;

    fn write(dir: &Path, relative: &str, content: &str) {
        let path = dir.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_parse_definition() {
        let pipeline = Pipeline::from_toml(DEFINITION).unwrap();
        assert_eq!(pipeline.name, "site");
        assert_eq!(pipeline.backend, "md");
        assert_eq!(pipeline.input.extension, "org");
        assert!(pipeline.input.recursive);
        assert_eq!(pipeline.output.extension, "md");
        assert_eq!(pipeline.steps.len(), 3);
    }

    #[test]
    fn test_export_config_applies_steps_in_order() {
        let config = Pipeline::from_toml(DEFINITION).unwrap().export_config();
        assert_eq!(config.options.get("with-toc"), Some(&Value::Integer(1)));
        assert_eq!(config.options.get("with-tags"), Some(&Value::Bool(false)));
        assert_eq!(config.options.get(LINK_ORG_FILES_AS_MD), Some(&Value::Bool(true)));
        assert_eq!(
            config.options.get("md-headline-style"),
            Some(&Value::String("setext".into()))
        );
    }

    #[test]
    fn test_links_kept_without_resolve_step() {
        let pipeline = Pipeline::from_toml(
            "name = \"plain\"\n[input]\ndirectory = \"in\"\n[output]\ndirectory = \"out\"\n",
        )
        .unwrap();
        assert_eq!(
            pipeline.export_config().options.get(LINK_ORG_FILES_AS_MD),
            Some(&Value::Bool(false))
        );
    }

    #[test]
    fn test_invalid_definitions() {
        assert!(matches!(
            Pipeline::from_toml("name = \"x\""),
            Err(PipelineError::Toml(_))
        ));
        assert!(matches!(
            Pipeline::from_toml("name = \" \"\n[input]\ndirectory = \"a\"\n[output]\ndirectory = \"b\"\n"),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_execute_mirrors_tree() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "site.toml", DEFINITION);
        write(dir.path(), "notes/index.org", "* Home\nSee [[file:guide/intro.org][intro]].\n");
        write(dir.path(), "notes/guide/intro.org", "* Intro\nHello.\n");
        write(dir.path(), "notes/ignored.txt", "not org");

        let mut executor = PipelineExecutor::new();
        let name = executor.load_pipeline(&dir.path().join("site.toml")).unwrap();
        let published = executor.execute(&name).unwrap();

        let destinations: Vec<PathBuf> = published
            .iter()
            .map(|p| p.destination.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            destinations,
            vec![
                PathBuf::from("public/guide/intro.md"),
                PathBuf::from("public/index.md"),
            ]
        );

        let index = fs::read_to_string(dir.path().join("public/index.md")).unwrap();
        assert!(index.contains("[intro](guide/intro.md)"));
        assert!(index.contains("Table of Contents\n================="));
        assert!(index.contains("Home\n===="));
    }

    #[test]
    fn test_non_recursive_input() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "in/top.org", "Top.\n");
        write(dir.path(), "in/sub/deep.org", "Deep.\n");
        let mut pipeline = Pipeline::from_toml(
            "name = \"flat\"\n[input]\ndirectory = \"in\"\nrecursive = false\n[output]\ndirectory = \"out\"\n",
        )
        .unwrap();
        pipeline.resolve_paths(dir.path());

        let mut executor = PipelineExecutor::new();
        executor.register(pipeline);
        let published = executor.execute("flat").unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(
            fs::read_to_string(dir.path().join("out/top.md")).unwrap(),
            "Top.\n"
        );
    }

    #[test]
    fn test_unknown_pipeline() {
        let executor = PipelineExecutor::new();
        assert!(matches!(executor.execute("missing"), Err(PipelineError::NotFound(_))));
    }
}
