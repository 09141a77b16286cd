//! Schema and mapping type definitions.
//!
//! The raw trees exchanged with the outside world (schemas before
//! resolution, metadata records, templates) are plain [`serde_json::Value`]s.
//! This module defines the typed views and results built from them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SchemaError};

/// Default marker naming the template attached to a schema.
pub const DEFAULT_TEMPLATE_KEY: &str = "x-template";
/// Default marker naming the per-item template used by array expansion.
pub const DEFAULT_TEMPLATE_ITEMS_KEY: &str = "x-template-items";
/// Default marker declaring a derived field's source expression.
pub const DEFAULT_DERIVED_FROM_KEY: &str = "x-derived-from";
/// Default flag requesting de-duplication of derived values.
pub const DEFAULT_DERIVED_UNIQUE_KEY: &str = "x-derived-unique";
/// Default flag requesting flattening of nested derived arrays.
pub const DEFAULT_DERIVED_FLATTEN_KEY: &str = "x-derived-flatten";
/// Default flag marking an array as the per-document front-matter part.
pub const DEFAULT_FRONTMATTER_PART_KEY: &str = "x-frontmatter-part";

/// Names of the schema extension markers read by the flattener.
///
/// # Examples
///
/// ```
/// use frontmatter_schema_core::ExtensionKeys;
///
/// let keys = ExtensionKeys::default();
/// assert_eq!(keys.derived_from, "x-derived-from");
///
/// let custom = ExtensionKeys {
///     frontmatter_part: "x-part".into(),
///     ..ExtensionKeys::default()
/// };
/// assert_eq!(custom.frontmatter_part, "x-part");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionKeys {
    pub template: String,
    pub template_items: String,
    pub derived_from: String,
    pub derived_unique: String,
    pub derived_flatten: String,
    pub frontmatter_part: String,
}

impl Default for ExtensionKeys {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE_KEY.to_string(),
            template_items: DEFAULT_TEMPLATE_ITEMS_KEY.to_string(),
            derived_from: DEFAULT_DERIVED_FROM_KEY.to_string(),
            derived_unique: DEFAULT_DERIVED_UNIQUE_KEY.to_string(),
            derived_flatten: DEFAULT_DERIVED_FLATTEN_KEY.to_string(),
            frontmatter_part: DEFAULT_FRONTMATTER_PART_KEY.to_string(),
        }
    }
}

/// `items` of an array node.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaItems {
    /// One schema for every element.
    Single(Box<SchemaNode>),
    /// Positional (tuple) schemas.
    Tuple(Vec<SchemaNode>),
}

/// Typed view of a fully dereferenced schema node.
///
/// Built with [`SchemaNode::from_value`]. Keys the node does not model
/// (extension markers, `enum`, `format`, ...) are kept in `extensions`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaNode {
    /// Declared `type`, possibly a union (`["string", "null"]`).
    pub types: Vec<String>,
    pub properties: BTreeMap<String, SchemaNode>,
    pub items: Option<SchemaItems>,
    /// Names listed in this node's `required` array.
    pub required: Vec<String>,
    /// Local `required: true|false` override on a property node.
    pub required_flag: Option<bool>,
    pub description: Option<String>,
    pub extensions: BTreeMap<String, Value>,
}

impl SchemaNode {
    /// Builds the typed view from a resolved schema tree.
    ///
    /// The root must be an object; nested malformed parts (a property that is
    /// not an object, a non-string `type`) are ignored rather than rejected.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidFormat`] when `value` is not an object.
    ///
    /// # Examples
    ///
    /// ```
    /// use frontmatter_schema_core::SchemaNode;
    /// use serde_json::json;
    ///
    /// let node = SchemaNode::from_value(&json!({
    ///     "type": "object",
    ///     "required": ["title"],
    ///     "properties": {"title": {"type": "string"}}
    /// }))
    /// .unwrap();
    /// assert_eq!(node.declared_type(), "object");
    /// assert!(node.required.contains(&"title".to_string()));
    ///
    /// assert!(SchemaNode::from_value(&json!("string")).is_err());
    /// ```
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Object(_) => Ok(Self::from_value_lenient(value)),
            other => Err(SchemaError::InvalidFormat(format!(
                "schema root must be an object, found {}",
                crate::path::value_type_name(other)
            ))),
        }
    }

    fn from_value_lenient(value: &Value) -> Self {
        let Some(map) = value.as_object() else {
            return Self::default();
        };

        let mut node = Self::default();
        for (key, child) in map {
            match key.as_str() {
                "type" => {
                    node.types = match child {
                        Value::String(kind) => vec![kind.clone()],
                        Value::Array(kinds) => kinds
                            .iter()
                            .filter_map(|kind| kind.as_str().map(String::from))
                            .collect(),
                        _ => Vec::new(),
                    };
                }
                "properties" => {
                    if let Some(properties) = child.as_object() {
                        node.properties = properties
                            .iter()
                            .map(|(name, prop)| (name.clone(), Self::from_value_lenient(prop)))
                            .collect();
                    }
                }
                "items" => {
                    node.items = match child {
                        Value::Object(_) => {
                            Some(SchemaItems::Single(Box::new(Self::from_value_lenient(child))))
                        }
                        Value::Array(items) => Some(SchemaItems::Tuple(
                            items.iter().map(Self::from_value_lenient).collect(),
                        )),
                        _ => None,
                    };
                }
                "required" => match child {
                    Value::Array(names) => {
                        node.required = names
                            .iter()
                            .filter_map(|name| name.as_str().map(String::from))
                            .collect();
                    }
                    Value::Bool(flag) => node.required_flag = Some(*flag),
                    _ => {}
                },
                "description" => node.description = child.as_str().map(String::from),
                _ => {
                    node.extensions.insert(key.clone(), child.clone());
                }
            }
        }
        node
    }

    /// Declared type, inferred when absent: `object` with properties, `array`
    /// with items, `any` otherwise. Unions are joined with `|`.
    pub fn declared_type(&self) -> String {
        if !self.types.is_empty() {
            return self.types.join("|");
        }
        if !self.properties.is_empty() {
            "object".to_string()
        } else if self.items.is_some() {
            "array".to_string()
        } else {
            "any".to_string()
        }
    }

    pub fn is_array(&self) -> bool {
        self.types.iter().any(|kind| kind == "array")
            || (self.types.is_empty() && self.items.is_some())
    }

    /// Extension value under `key`, if present.
    pub fn extension(&self, key: &str) -> Option<&Value> {
        self.extensions.get(key)
    }

    /// `true` when extension `key` is the boolean `true`.
    pub fn extension_flag(&self, key: &str) -> bool {
        matches!(self.extensions.get(key), Some(Value::Bool(true)))
    }
}

/// One flattened schema entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaProperty {
    /// Dot/bracket path; array entries end in `[]`.
    pub path: String,
    /// Declared (or inferred) type name.
    #[serde(rename = "type")]
    pub kind: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SchemaProperty {
    /// Re-parses [`path`](Self::path). A source property name containing
    /// `.` or `[` comes back as nested segments.
    pub fn property_path(&self) -> crate::PropertyPath {
        crate::PropertyPath::parse(&self.path)
    }
}

/// A field whose value is computed from other fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivationRule {
    /// Target path of the derived value.
    pub path: String,
    /// Source path expression, e.g. `commands[].c1`.
    pub source_expression: String,
    pub unique: bool,
    pub flatten: bool,
}

/// Flattener output: entries plus the side maps collected from extension
/// markers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatSchema {
    pub properties: Vec<SchemaProperty>,
    /// Derivation rules keyed by their target path.
    pub derivations: BTreeMap<String, DerivationRule>,
    /// Paths of arrays flagged as repeatable front-matter parts.
    pub parts: Vec<String>,
    /// Template reference from the root template marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Per-item template reference from the root template-items marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_template: Option<String>,
}

impl FlatSchema {
    /// Looks up an entry by its exact path.
    pub fn find(&self, path: &str) -> Option<&SchemaProperty> {
        self.properties.iter().find(|prop| prop.path == path)
    }

    /// Paths of all required entries.
    pub fn required_paths(&self) -> impl Iterator<Item = &str> {
        self.properties
            .iter()
            .filter(|prop| prop.required)
            .map(|prop| prop.path.as_str())
    }
}

/// One accepted input-to-schema assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    /// Input path (with concrete indices).
    pub path: String,
    pub value: Value,
    /// Weighted score in `0.0..=1.0`.
    pub confidence: f64,
    /// Schema path the value was assigned to.
    pub matched_property: String,
}

/// Full matcher output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOutcome {
    pub matches: Vec<MatchResult>,
    /// Input paths with no accepted schema target.
    pub unmatched_keys: Vec<String>,
    /// Required schema paths that received no accepted match. Advisory.
    pub missing_required_keys: Vec<String>,
    /// Schema-shaped record rebuilt from the accepted matches.
    pub mapped_record: Value,
}

/// Stage-1 output: one rendered record per source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub source_path: String,
    pub category: String,
    pub layer: String,
    pub directive: String,
    /// Rendered (or mapped, when no template is configured) record.
    pub record: Value,
}

impl Command {
    /// Ordering key used by the registry: category, layer, directive, then
    /// source path for stability.
    pub fn sort_key(&self) -> (&str, &str, &str, &str) {
        (
            self.category.as_str(),
            self.layer.as_str(),
            self.directive.as_str(),
            self.source_path.as_str(),
        )
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_from_value_reads_known_keys_and_keeps_extensions() {
        let node = SchemaNode::from_value(&json!({
            "type": ["string", "null"],
            "description": "A title",
            "x-derived-from": "commands[].c1",
            "enum": ["a", "b"]
        }))
        .unwrap();

        assert_eq!(node.declared_type(), "string|null");
        assert_eq!(node.description.as_deref(), Some("A title"));
        assert_eq!(node.extension("x-derived-from"), Some(&json!("commands[].c1")));
        assert!(node.extensions.contains_key("enum"));
    }

    #[test]
    fn test_from_value_ignores_malformed_children() {
        let node = SchemaNode::from_value(&json!({
            "properties": {"a": true, "b": {"type": 7}},
            "required": "a"
        }))
        .unwrap();

        assert_eq!(node.properties.len(), 2);
        assert_eq!(node.properties["a"], SchemaNode::default());
        assert!(node.properties["b"].types.is_empty());
        assert!(node.required.is_empty());
    }

    #[test]
    fn test_declared_type_inference() {
        let object = SchemaNode::from_value(&json!({"properties": {"a": {}}})).unwrap();
        assert_eq!(object.declared_type(), "object");

        let array = SchemaNode::from_value(&json!({"items": {"type": "string"}})).unwrap();
        assert_eq!(array.declared_type(), "array");
        assert!(array.is_array());

        let any = SchemaNode::from_value(&json!({})).unwrap();
        assert_eq!(any.declared_type(), "any");
    }

    #[test]
    fn test_required_flag_override() {
        let node = SchemaNode::from_value(&json!({"type": "string", "required": true})).unwrap();
        assert_eq!(node.required_flag, Some(true));
    }

    #[test]
    fn test_schema_property_serializes_type_key() {
        let prop = SchemaProperty {
            path: "tags[]".to_string(),
            kind: "array".to_string(),
            required: false,
            description: None,
        };
        let json = serde_json::to_value(&prop).unwrap();
        assert_eq!(json, json!({"path": "tags[]", "type": "array", "required": false}));
    }

    #[test]
    fn test_extension_keys_deserialize_partial() {
        let keys: ExtensionKeys = serde_json::from_value(json!({"template": "x-tpl"})).unwrap();
        assert_eq!(keys.template, "x-tpl");
        assert_eq!(keys.derived_unique, DEFAULT_DERIVED_UNIQUE_KEY);
    }
}
