//! Error types for pipeline operations.
//!
//! [`PipelineError`] covers everything around the engine: file I/O,
//! (de)serialization, glob patterns and configuration. Engine failures for a
//! single document never surface here; they are reported as
//! [`DocumentOutcome::Failed`](crate::DocumentOutcome::Failed).

use frontmatter_schema_core::{RegistryValidationError, SchemaError};
use thiserror::Error;

/// Errors that can occur while loading inputs or writing outputs.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON parsing or serialization failure.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML serialization failure.
    #[error("TOML error: {0}")]
    TomlError(#[from] toml::ser::Error),

    /// Malformed glob pattern in the document selection.
    #[error("invalid glob pattern: {0}")]
    PatternError(#[from] glob::PatternError),

    /// Configuration validation failure (e.g., empty schema path).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Engine failure outside per-document processing (e.g., a template file
    /// that does not parse).
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A value that the requested output format cannot represent.
    #[error("cannot format output: {0}")]
    Unrepresentable(String),

    /// Worker pool construction failure.
    #[error("failed to build worker pool: {0}")]
    WorkerPool(String),
}

/// Fatal Stage-2 failures. A registry cannot be partially built.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Stage2Error {
    /// Registry schema, derivation or template failure.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// The assembled registry violates its invariants.
    #[error("registry validation failed: {}", join_violations(.0))]
    Validation(Vec<RegistryValidationError>),
}

fn join_violations(violations: &[RegistryValidationError]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Convenience alias for results with [`PipelineError`].
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_is_transparent() {
        let err = PipelineError::from(SchemaError::NotFound {
            reference: "schemas/id.json".to_string(),
        });
        assert_eq!(err.to_string(), "referenced fragment not found: schemas/id.json");
    }

    #[test]
    fn test_validation_error_lists_violations() {
        let err = Stage2Error::Validation(vec![
            RegistryValidationError::UnsortedConfigs,
            RegistryValidationError::DuplicateConfig("git".to_string()),
        ]);
        assert_eq!(
            err.to_string(),
            "registry validation failed: available configs are not sorted; duplicate available config: git"
        );
    }
}
