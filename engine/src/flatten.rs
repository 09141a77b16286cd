//! Flattening of dereferenced schemas into path entries.
//!
//! Objects with properties are walked depth-first and contribute no entry of
//! their own. Leaves become one entry each. An array property becomes one
//! `path[]` entry, and the properties of its object `items` are flattened
//! again under that array path so individual elements can be matched.
//!
//! A property is required when its name is listed in the enclosing object's
//! `required` array (or it carries a local `required: true|false`), and every
//! enclosing property is itself required: an optional parent makes its
//! subtree advisory.
//!
//! Extension markers (configurable through [`ExtensionKeys`]) are collected
//! into [`FlatSchema`]'s side maps keyed by the flattened path.
//!
//! Paths are plain strings, so a property name containing `.`, `[` or `]`
//! reads back as a nested path. When it renders the same as a real nested
//! property, the first one in name order keeps the entry and the other is
//! dropped with a warning.

use std::collections::HashSet;

use frontmatter_schema_core::{
    DerivationRule, ExtensionKeys, FlatSchema, PropertyPath, Result, SchemaItems, SchemaNode,
    SchemaProperty,
};
use serde_json::Value;
use tracing::{debug, warn};

/// Flattens a resolved schema using the default extension key names.
///
/// # Errors
///
/// Returns [`SchemaError::InvalidFormat`](frontmatter_schema_core::SchemaError::InvalidFormat)
/// when the root is not an object.
///
/// # Examples
///
/// ```
/// use frontmatter_schema_engine::flatten::flatten;
/// use serde_json::json;
///
/// let flat = flatten(&json!({
///     "type": "object",
///     "required": ["title"],
///     "properties": {
///         "title": {"type": "string"},
///         "tags": {"type": "array", "items": {"type": "string"}}
///     }
/// }))
/// .unwrap();
///
/// let paths: Vec<_> = flat.properties.iter().map(|p| p.path.as_str()).collect();
/// assert_eq!(paths, vec!["tags[]", "title"]);
/// assert!(flat.find("title").unwrap().required);
/// ```
pub fn flatten(resolved: &Value) -> Result<FlatSchema> {
    Flattener::new(&ExtensionKeys::default()).flatten(resolved)
}

/// Schema flattener bound to a set of extension key names.
pub struct Flattener<'k> {
    keys: &'k ExtensionKeys,
}

impl<'k> Flattener<'k> {
    pub fn new(keys: &'k ExtensionKeys) -> Self {
        Self { keys }
    }

    /// Flattens a resolved schema tree.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidFormat`](frontmatter_schema_core::SchemaError::InvalidFormat)
    /// when the root is not an object. Nothing else fails: unknown or
    /// malformed extension values are ignored.
    pub fn flatten(&self, resolved: &Value) -> Result<FlatSchema> {
        let root = SchemaNode::from_value(resolved)?;

        let mut flat = FlatSchema {
            template: root
                .extension(&self.keys.template)
                .and_then(Value::as_str)
                .map(String::from),
            item_template: root
                .extension(&self.keys.template_items)
                .and_then(Value::as_str)
                .map(String::from),
            ..FlatSchema::default()
        };

        let mut seen = HashSet::new();
        self.walk(&root, &PropertyPath::root(), true, &mut flat, &mut seen);

        debug!(
            properties = flat.properties.len(),
            derivations = flat.derivations.len(),
            parts = flat.parts.len(),
            "Flattened schema"
        );
        Ok(flat)
    }

    fn walk(
        &self,
        node: &SchemaNode,
        prefix: &PropertyPath,
        parent_required: bool,
        flat: &mut FlatSchema,
        seen: &mut HashSet<String>,
    ) {
        for (name, child) in &node.properties {
            let locally_required = child
                .required_flag
                .unwrap_or_else(|| node.required.iter().any(|required| required == name));
            let required = parent_required && locally_required;
            let path = prefix.child(name);
            if name.contains(['.', '[', ']']) {
                warn!(name = %name, path = %path, "Property name contains path syntax");
            }

            if child.is_array() {
                let array_path = path.each();
                self.record(child, &array_path, required, flat, seen);
                match &child.items {
                    Some(SchemaItems::Single(item)) => {
                        self.walk(item, &array_path, required, flat, seen);
                    }
                    Some(SchemaItems::Tuple(items)) => {
                        for item in items {
                            self.walk(item, &array_path, required, flat, seen);
                        }
                    }
                    None => {}
                }
            } else if !child.properties.is_empty() {
                self.collect_markers(child, &path, flat);
                self.walk(child, &path, required, flat, seen);
            } else {
                self.record(child, &path, required, flat, seen);
            }
        }
    }

    fn record(
        &self,
        node: &SchemaNode,
        path: &PropertyPath,
        required: bool,
        flat: &mut FlatSchema,
        seen: &mut HashSet<String>,
    ) {
        let rendered = path.to_string();
        if !seen.insert(rendered.clone()) {
            debug!(path = %rendered, "Skipping already flattened path");
            return;
        }
        self.collect_markers(node, path, flat);
        flat.properties.push(SchemaProperty {
            path: rendered,
            kind: node.declared_type(),
            required,
            description: node.description.clone(),
        });
    }

    fn collect_markers(&self, node: &SchemaNode, path: &PropertyPath, flat: &mut FlatSchema) {
        let rendered = path.to_string();

        if let Some(source) = node
            .extension(&self.keys.derived_from)
            .and_then(Value::as_str)
        {
            flat.derivations.insert(
                rendered.clone(),
                DerivationRule {
                    path: rendered.clone(),
                    source_expression: source.to_string(),
                    unique: node.extension_flag(&self.keys.derived_unique),
                    flatten: node.extension_flag(&self.keys.derived_flatten),
                },
            );
        }

        if node.extension_flag(&self.keys.frontmatter_part) && !flat.parts.contains(&rendered) {
            flat.parts.push(rendered);
        }
    }
}

#[cfg(test)]
mod tests {
    use frontmatter_schema_core::SchemaError;
    use serde_json::json;

    use super::*;

    fn paths(flat: &FlatSchema) -> Vec<&str> {
        flat.properties.iter().map(|p| p.path.as_str()).collect()
    }

    #[test]
    fn test_non_object_root_is_invalid_format() {
        let err = flatten(&json!(["not", "a", "schema"])).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidFormat(_)));
    }

    #[test]
    fn test_nested_objects_flatten_to_leaves() {
        let flat = flatten(&json!({
            "properties": {
                "options": {
                    "type": "object",
                    "properties": {
                        "input": {"type": "array", "items": {"type": "string"}},
                        "adaptation": {"type": "boolean"}
                    }
                },
                "c1": {"type": "string"}
            }
        }))
        .unwrap();

        assert_eq!(
            paths(&flat),
            vec!["c1", "options.adaptation", "options.input[]"]
        );
        assert_eq!(flat.find("options.input[]").unwrap().kind, "array");
    }

    #[test]
    fn test_array_of_objects_records_array_and_item_fields() {
        let flat = flatten(&json!({
            "required": ["commands"],
            "properties": {
                "commands": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["c1"],
                        "properties": {
                            "c1": {"type": "string", "description": "Category"},
                            "title": {"type": "string"}
                        }
                    }
                }
            }
        }))
        .unwrap();

        assert_eq!(
            paths(&flat),
            vec!["commands[]", "commands[].c1", "commands[].title"]
        );
        let c1 = flat.find("commands[].c1").unwrap();
        assert!(c1.required);
        assert_eq!(c1.description.as_deref(), Some("Category"));
        assert!(!flat.find("commands[].title").unwrap().required);
    }

    #[test]
    fn test_optional_parent_makes_subtree_advisory() {
        let flat = flatten(&json!({
            "properties": {
                "meta": {
                    "required": ["author"],
                    "properties": {"author": {"type": "string"}}
                }
            }
        }))
        .unwrap();
        assert!(!flat.find("meta.author").unwrap().required);
    }

    #[test]
    fn test_local_required_flag_overrides_parent_list() {
        let flat = flatten(&json!({
            "required": ["a"],
            "properties": {
                "a": {"type": "string", "required": false},
                "b": {"type": "string", "required": true}
            }
        }))
        .unwrap();
        assert!(!flat.find("a").unwrap().required);
        assert!(flat.find("b").unwrap().required);
    }

    #[test]
    fn test_markers_are_collected() {
        let flat = flatten(&json!({
            "x-template": "registry_template.json",
            "x-template-items": "command_template.json",
            "properties": {
                "tools": {
                    "properties": {
                        "availableConfigs": {
                            "type": "array",
                            "items": {"type": "string"},
                            "x-derived-from": "commands[].c1",
                            "x-derived-unique": true
                        },
                        "commands": {
                            "type": "array",
                            "x-frontmatter-part": true,
                            "items": {"properties": {"c1": {"type": "string"}}}
                        }
                    }
                }
            }
        }))
        .unwrap();

        assert_eq!(flat.template.as_deref(), Some("registry_template.json"));
        assert_eq!(flat.item_template.as_deref(), Some("command_template.json"));
        assert_eq!(flat.parts, vec!["tools.commands[]"]);

        let rule = &flat.derivations["tools.availableConfigs[]"];
        assert_eq!(rule.source_expression, "commands[].c1");
        assert!(rule.unique);
        assert!(!rule.flatten);
    }

    #[test]
    fn test_custom_extension_keys() {
        let keys = ExtensionKeys {
            frontmatter_part: "x-part".to_string(),
            ..ExtensionKeys::default()
        };
        let schema = json!({
            "properties": {"items": {"type": "array", "x-part": true, "x-frontmatter-part": false}}
        });
        let flat = Flattener::new(&keys).flatten(&schema).unwrap();
        assert_eq!(flat.parts, vec!["items[]"]);
    }

    #[test]
    fn test_unknown_marker_values_are_ignored() {
        let flat = flatten(&json!({
            "properties": {"a": {"type": "string", "x-derived-from": 42, "x-frontmatter-part": "yes"}}
        }))
        .unwrap();
        assert!(flat.derivations.is_empty());
        assert!(flat.parts.is_empty());
    }

    #[test]
    fn test_tuple_items_do_not_duplicate_paths() {
        let flat = flatten(&json!({
            "properties": {
                "pairs": {
                    "type": "array",
                    "items": [
                        {"properties": {"k": {"type": "string"}}},
                        {"properties": {"k": {"type": "string"}, "v": {"type": "number"}}}
                    ]
                }
            }
        }))
        .unwrap();
        assert_eq!(paths(&flat), vec!["pairs[]", "pairs[].k", "pairs[].v"]);
    }

    #[test]
    fn test_dotted_name_collapses_into_nested_path() {
        let flat = flatten(&json!({
            "properties": {
                "a.b": {"type": "string"},
                "a": {"properties": {"b": {"type": "number"}}}
            }
        }))
        .unwrap();
        assert_eq!(paths(&flat), vec!["a.b"]);
        assert_eq!(flat.properties[0].kind, "number");
        assert_eq!(
            flat.properties[0].property_path(),
            PropertyPath::parse("a").child("b")
        );
    }
}
