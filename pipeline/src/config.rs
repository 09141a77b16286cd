//! Pipeline configuration for registry builds.
//!
//! Defines the YAML-serializable configuration naming the command schema,
//! templates, document selection, identifier paths and failure policy.
//! Relative paths are resolved against the directory of the configuration
//! file.
//!
//! # Example YAML
//!
//! ```yaml
//! version: "1.0"
//! schema: schemas/command_schema.json
//! template: templates/command_template.json
//! registry:
//!   schema: schemas/registry_schema.json
//! documents:
//!   include:
//!     - "prompts/**/*.md"
//!   exclude:
//!     - "prompts/drafts/**"
//! identifiers:
//!   category: c1
//!   layer: c2
//!   directive: c3
//! policy:
//!   continue_on_error: true
//! execution:
//!   jobs: 4
//! output:
//!   format: yaml
//! ```

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use frontmatter_schema_core::ExtensionKeys;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::output::OutputFormat;

/// Registry-level (Stage 2) inputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Registry schema carrying derivation rules and part markers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<PathBuf>,
    /// Registry template. Falls back to the registry schema's template
    /// marker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<PathBuf>,
}

/// Which documents to process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentsConfig {
    /// Glob patterns of documents to include.
    pub include: Vec<String>,
    /// Glob patterns of documents to skip.
    pub exclude: Vec<String>,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            include: vec!["**/*.md".to_string()],
            exclude: Vec::new(),
        }
    }
}

/// Paths of the identifiers every command must carry, read from the mapped
/// record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentifierConfig {
    pub category: String,
    pub layer: String,
    pub directive: String,
}

impl Default for IdentifierConfig {
    fn default() -> Self {
        Self {
            category: "c1".to_string(),
            layer: "c2".to_string(),
            directive: "c3".to_string(),
        }
    }
}

impl IdentifierConfig {
    /// Identifier paths in category, layer, directive order.
    pub fn paths(&self) -> [&str; 3] {
        [&self.category, &self.layer, &self.directive]
    }
}

/// Failure policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Aggregate the successful documents even when others failed.
    pub continue_on_error: bool,
    /// Treat required schema keys without a match as a document failure.
    pub strict_required: bool,
    /// Fail rendering when an array expansion marker finds no array.
    pub require_array_data: bool,
}

/// Settings controlling how Stage 1 is executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Number of parallel document jobs (`None` or 0 = adaptive).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,
}

/// Where and how the registry is written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    /// Output file; stdout when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Top-level pipeline configuration.
///
/// # Examples
///
/// ```
/// use frontmatter_schema_pipeline::PipelineConfig;
///
/// let config: PipelineConfig = serde_yaml::from_str(
///     "version: \"1.0\"\nschema: schemas/command.json\n",
/// )
/// .unwrap();
/// assert_eq!(config.identifiers.category, "c1");
/// assert!(!config.policy.continue_on_error);
/// assert_eq!(config.extensions.derived_from, "x-derived-from");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Configuration format version (e.g., `"1.0"`).
    pub version: String,
    /// Command schema applied to every document.
    pub schema: PathBuf,
    /// Command template. Falls back to the schema's template marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<PathBuf>,
    /// Per-item template for array expansion in the command template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_template: Option<PathBuf>,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub identifiers: IdentifierConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Names of the schema extension markers.
    #[serde(default)]
    pub extensions: ExtensionKeys,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl PipelineConfig {
    /// Minimal configuration for `schema` with every other field defaulted.
    pub fn new(schema: impl Into<PathBuf>) -> Self {
        Self {
            version: "1.0".to_string(),
            schema: schema.into(),
            template: None,
            item_template: None,
            registry: RegistryConfig::default(),
            documents: DocumentsConfig::default(),
            identifiers: IdentifierConfig::default(),
            policy: PolicyConfig::default(),
            extensions: ExtensionKeys::default(),
            execution: ExecutionConfig::default(),
            output: OutputConfig::default(),
        }
    }

    /// Loads configuration from a YAML file and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::PipelineError::IoError) if the file cannot
    /// be read, [`YamlError`](crate::PipelineError::YamlError) if parsing
    /// fails, or [`InvalidConfig`](crate::PipelineError::InvalidConfig) if
    /// validation fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config: Self = serde_yaml::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::PipelineError::IoError) if the file cannot
    /// be written, or [`YamlError`](crate::PipelineError::YamlError) if
    /// serialization fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Checks the fields serde cannot: non-empty paths and patterns.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidConfig`](crate::PipelineError::InvalidConfig) naming
    /// the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(PipelineError::InvalidConfig("version is empty".to_string()));
        }
        if self.schema.as_os_str().is_empty() {
            return Err(PipelineError::InvalidConfig("schema path is empty".to_string()));
        }
        if self.documents.include.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "documents.include has no patterns".to_string(),
            ));
        }
        for (name, path) in ["category", "layer", "directive"]
            .into_iter()
            .zip(self.identifiers.paths())
        {
            if path.trim().is_empty() {
                return Err(PipelineError::InvalidConfig(format!(
                    "identifiers.{name} is empty"
                )));
            }
        }
        Ok(())
    }
}
