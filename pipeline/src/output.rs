//! Output formatting for registries and intermediate results.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PipelineError, Result};

/// Supported output formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
    Toml,
}

impl OutputFormat {
    /// Guesses the format from a file extension (`.json`, `.yml`/`.yaml`,
    /// `.toml`).
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        match path.as_ref().extension()?.to_str()? {
            "json" => Some(Self::Json),
            "yml" | "yaml" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Toml => "toml",
        })
    }
}

/// Serializes `value` in the requested format.
///
/// TOML has no null: nulls are dropped from tables and arrays first, and the
/// root must be an object.
///
/// # Errors
///
/// Returns the serializer's error, or [`PipelineError::Unrepresentable`] when
/// TOML output is requested for a non-object root.
///
/// # Examples
///
/// ```
/// use frontmatter_schema_pipeline::{OutputFormat, format_value};
/// use serde_json::json;
///
/// let value = json!({"availableConfigs": ["git"], "note": null});
/// let toml = format_value(&value, OutputFormat::Toml).unwrap();
/// assert!(toml.contains("availableConfigs"));
/// assert!(toml.contains("\"git\""));
/// assert!(!toml.contains("note"));
/// ```
pub fn format_value(value: &Value, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            let mut text = serde_json::to_string_pretty(value)?;
            text.push('\n');
            Ok(text)
        }
        OutputFormat::Yaml => Ok(serde_yaml::to_string(value)?),
        OutputFormat::Toml => {
            let stripped = strip_nulls(value);
            if !stripped.is_object() {
                return Err(PipelineError::Unrepresentable(
                    "TOML output requires an object at the root".to_string(),
                ));
            }
            Ok(toml::to_string_pretty(&stripped)?)
        }
    }
}

/// Formats `value` and writes it to `path`.
///
/// # Errors
///
/// Same as [`format_value`], plus [`PipelineError::IoError`] when the file
/// cannot be written.
pub fn write_value(value: &Value, format: OutputFormat, path: impl AsRef<Path>) -> Result<()> {
    let text = format_value(value, format)?;
    std::fs::write(path, text)?;
    Ok(())
}

fn strip_nulls(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, child)| !child.is_null())
                .map(|(key, child)| (key.clone(), strip_nulls(child)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .filter(|item| !item.is_null())
                .map(strip_nulls)
                .collect(),
        ),
        other => other.clone(),
    }
}
