//! Aggregated registry of Stage-1 commands.
//!
//! [`Registry`] keeps its commands sorted and its category list deduplicated,
//! and exposes the camelCase template data that Stage 2 renders.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::Command;

/// Aggregate counts and provenance for a [`Registry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryMetadata {
    pub total_commands: usize,
    pub total_categories: usize,
    /// RFC 3339 generation timestamp.
    pub generated_at: String,
    /// Source document paths, sorted.
    pub source_files: Vec<String>,
}

/// Stage-2 output aggregating every successful command.
///
/// `available_configs` is always the sorted, deduplicated set of command
/// categories and `commands` is ordered by category, layer and directive.
///
/// # Examples
///
/// ```
/// use frontmatter_schema_core::{Command, Registry};
/// use serde_json::json;
///
/// let command = |c1: &str, c2: &str, c3: &str| Command {
///     source_path: format!("prompts/{c1}/{c2}/{c3}.md"),
///     category: c1.into(),
///     layer: c2.into(),
///     directive: c3.into(),
///     record: json!({"c1": c1, "c2": c2, "c3": c3}),
/// };
///
/// let registry = Registry::from_commands(
///     vec![command("spec", "to", "issue"), command("git", "merge", "branch")],
///     "2024-01-15T10:30:00Z",
/// )
/// .unwrap();
/// assert_eq!(registry.available_configs, vec!["git", "spec"]);
/// assert_eq!(registry.commands[0].category, "git");
/// assert_eq!(registry.metadata.total_commands, 2);
///
/// assert!(Registry::from_commands(Vec::new(), "2024-01-15T10:30:00Z").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registry {
    pub available_configs: Vec<String>,
    pub commands: Vec<Command>,
    pub metadata: RegistryMetadata,
}

impl Registry {
    /// Builds a registry from Stage-1 commands.
    ///
    /// Returns `None` for an empty command list, which callers surface as a
    /// distinct "no commands" outcome.
    pub fn from_commands(mut commands: Vec<Command>, generated_at: impl Into<String>) -> Option<Self> {
        if commands.is_empty() {
            return None;
        }

        commands.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        let available_configs: Vec<String> = commands
            .iter()
            .map(|command| command.category.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let source_files: Vec<String> = commands
            .iter()
            .map(|command| command.source_path.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let metadata = RegistryMetadata {
            total_commands: commands.len(),
            total_categories: available_configs.len(),
            generated_at: generated_at.into(),
            source_files,
        };

        Some(Self {
            available_configs,
            commands,
            metadata,
        })
    }

    /// Returns the number of commands in this registry.
    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    /// The registry as a data record for template rendering: commands are
    /// exposed as their rendered records.
    pub fn template_data(&self) -> Value {
        let records: Vec<Value> = self
            .commands
            .iter()
            .map(|command| command.record.clone())
            .collect();

        json!({
            "availableConfigs": self.available_configs,
            "commands": records,
            "metadata": {
                "totalCommands": self.metadata.total_commands,
                "totalCategories": self.metadata.total_categories,
                "generatedAt": self.metadata.generated_at,
                "sourceFiles": self.metadata.source_files,
            },
        })
    }
}
