//! Registry validation.
//!
//! Checks the structural invariants of an aggregated [`Registry`]: the
//! category list is sorted, unique and consistent with the commands, the
//! commands are ordered, and the metadata counts agree with the content.
//!
//! # Examples
//!
//! ```
//! use frontmatter_schema_core::*;
//! use serde_json::json;
//!
//! let command = Command {
//!     source_path: "a.md".into(),
//!     category: "git".into(),
//!     layer: "merge".into(),
//!     directive: "branch".into(),
//!     record: json!({}),
//! };
//! let mut registry = Registry::from_commands(vec![command], "2024-01-01T00:00:00Z").unwrap();
//! assert!(validate_registry(&registry).is_empty());
//!
//! registry.available_configs.push("spec".into());
//! assert!(!validate_registry(&registry).is_empty());
//! ```

use std::collections::BTreeSet;

use thiserror::Error;

use crate::Registry;

/// Registry validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryValidationError {
    /// `availableConfigs` is not in ascending order.
    #[error("available configs are not sorted")]
    UnsortedConfigs,
    /// `availableConfigs` lists a category twice.
    #[error("duplicate available config: {0}")]
    DuplicateConfig(String),
    /// `availableConfigs` differs from the categories of the commands.
    #[error("available configs {listed:?} do not match command categories {actual:?}")]
    ConfigMismatch {
        listed: Vec<String>,
        actual: Vec<String>,
    },
    /// A command has an empty category, layer or directive.
    #[error("command from '{0}' has an empty identifier")]
    EmptyIdentifier(String),
    /// Commands are not ordered by category, layer, directive.
    #[error("commands are out of order at '{0}'")]
    UnsortedCommands(String),
    /// A metadata count disagrees with the registry content.
    #[error("metadata {field} is {recorded}, expected {expected}")]
    CountMismatch {
        field: &'static str,
        recorded: usize,
        expected: usize,
    },
}

/// Validates an aggregated registry, returning every violation found.
pub fn validate_registry(registry: &Registry) -> Vec<RegistryValidationError> {
    let mut errors = Vec::new();

    let mut seen: BTreeSet<&str> = BTreeSet::new();
    for config in &registry.available_configs {
        if !seen.insert(config.as_str()) {
            errors.push(RegistryValidationError::DuplicateConfig(config.clone()));
        }
    }
    if registry
        .available_configs
        .windows(2)
        .any(|pair| pair[0] > pair[1])
    {
        errors.push(RegistryValidationError::UnsortedConfigs);
    }

    let actual: BTreeSet<&str> = registry
        .commands
        .iter()
        .map(|command| command.category.as_str())
        .collect();
    if actual != seen {
        errors.push(RegistryValidationError::ConfigMismatch {
            listed: registry.available_configs.clone(),
            actual: actual.iter().map(|c| c.to_string()).collect(),
        });
    }

    for command in &registry.commands {
        if command.category.trim().is_empty()
            || command.layer.trim().is_empty()
            || command.directive.trim().is_empty()
        {
            errors.push(RegistryValidationError::EmptyIdentifier(
                command.source_path.clone(),
            ));
        }
    }

    if let Some(pair) = registry
        .commands
        .windows(2)
        .find(|pair| pair[0].sort_key() > pair[1].sort_key())
    {
        errors.push(RegistryValidationError::UnsortedCommands(
            pair[1].source_path.clone(),
        ));
    }

    if registry.metadata.total_commands != registry.commands.len() {
        errors.push(RegistryValidationError::CountMismatch {
            field: "totalCommands",
            recorded: registry.metadata.total_commands,
            expected: registry.commands.len(),
        });
    }
    if registry.metadata.total_categories != actual.len() {
        errors.push(RegistryValidationError::CountMismatch {
            field: "totalCategories",
            recorded: registry.metadata.total_categories,
            expected: actual.len(),
        });
    }

    errors
}
