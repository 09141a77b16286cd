//! Dot/bracket path notation and nested reads/writes over JSON trees.
//!
//! The same notation is used by the flattener (schema paths), the matcher
//! (input paths) and the renderer (placeholders and write targets):
//!
//! - `a.b`: key `b` inside object `a`
//! - `tags[]`: every element of array `tags`
//! - `tags[2]`: the third element of array `tags`
//!
//! # Examples
//!
//! ```
//! use frontmatter_schema_core::{PropertyPath, get_path, set_path};
//! use serde_json::json;
//!
//! let mut record = json!({});
//! set_path(&mut record, &PropertyPath::parse("tools.commands[1].name"), json!("build")).unwrap();
//! assert_eq!(record, json!({"tools": {"commands": [null, {"name": "build"}]}}));
//!
//! let name = get_path(&record, &PropertyPath::parse("tools.commands[1].name"));
//! assert_eq!(name, Some(&json!("build")));
//! ```

use std::fmt;

use serde_json::Value;

use crate::error::{Result, SchemaError};

/// One step of a [`PropertyPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSegment {
    /// Object key.
    Key(String),
    /// Every element of an array (`[]`).
    Each,
    /// One array element (`[n]`).
    Index(usize),
}

/// Longest array [`set_path`] will pad with `null`s to reach an index.
pub const MAX_ARRAY_LEN: usize = 10_000;

/// Parsed dot/bracket path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyPath {
    segments: Vec<PathSegment>,
}

impl PropertyPath {
    /// The empty path, addressing the root value.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parses dot/bracket notation.
    ///
    /// Parsing is lenient: a dotted part whose brackets are malformed is kept
    /// as a literal key.
    ///
    /// ```
    /// use frontmatter_schema_core::{PathSegment, PropertyPath};
    ///
    /// let path = PropertyPath::parse("commands[].options[0]");
    /// assert_eq!(
    ///     path.segments(),
    ///     &[
    ///         PathSegment::Key("commands".into()),
    ///         PathSegment::Each,
    ///         PathSegment::Key("options".into()),
    ///         PathSegment::Index(0),
    ///     ]
    /// );
    /// assert_eq!(path.to_string(), "commands[].options[0]");
    /// ```
    pub fn parse(raw: &str) -> Self {
        let mut segments = Vec::new();
        if raw.is_empty() {
            return Self { segments };
        }

        for part in raw.split('.') {
            match parse_part(part) {
                Some(parsed) => segments.extend(parsed),
                None => segments.push(PathSegment::Key(part.to_string())),
            }
        }

        Self { segments }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns a new path with `key` appended.
    pub fn child(&self, key: &str) -> Self {
        let mut next = self.clone();
        next.segments.push(PathSegment::Key(key.to_string()));
        next
    }

    /// Returns a new path with an `[]` segment appended.
    pub fn each(&self) -> Self {
        let mut next = self.clone();
        next.segments.push(PathSegment::Each);
        next
    }

    /// Returns a new path with an `[index]` segment appended.
    pub fn index(&self, index: usize) -> Self {
        let mut next = self.clone();
        next.segments.push(PathSegment::Index(index));
        next
    }

    /// `true` when the path addresses a whole array (`tags[]`).
    pub fn is_array_level(&self) -> bool {
        matches!(self.segments.last(), Some(PathSegment::Each))
    }

    /// Replaces concrete indices with `[]`, producing the form that is
    /// comparable against flattened schema paths.
    pub fn generalized(&self) -> Self {
        let segments = self
            .segments
            .iter()
            .map(|segment| match segment {
                PathSegment::Index(_) => PathSegment::Each,
                other => other.clone(),
            })
            .collect();
        Self { segments }
    }

    /// Drops trailing `[]` segments.
    pub fn without_trailing_each(&self) -> Self {
        let mut next = self.clone();
        while matches!(next.segments.last(), Some(PathSegment::Each)) {
            next.segments.pop();
        }
        next
    }

    /// `true` when `prefix` is a (non-strict) prefix of this path.
    pub fn starts_with(&self, prefix: &PropertyPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// Concrete indices in order of appearance.
    pub fn indices(&self) -> Vec<usize> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                PathSegment::Index(index) => Some(*index),
                _ => None,
            })
            .collect()
    }

    /// Substitutes `[]` segments with `indices` in order. Extra `[]` segments
    /// bind to index 0; a trailing `[]` is dropped so the whole array is
    /// addressed through its key.
    pub fn bind_indices(&self, indices: &[usize]) -> Self {
        let trimmed = self.without_trailing_each();
        let mut remaining = indices.iter();
        let segments = trimmed
            .segments
            .into_iter()
            .map(|segment| match segment {
                PathSegment::Each => PathSegment::Index(remaining.next().copied().unwrap_or(0)),
                other => other,
            })
            .collect();
        Self { segments }
    }

    /// Hierarchy components: each key together with the brackets that follow
    /// it (`commands[]`, `name`).
    pub fn components(&self) -> Vec<String> {
        let mut components: Vec<String> = Vec::new();
        for segment in &self.segments {
            match segment {
                PathSegment::Key(key) => components.push(key.clone()),
                PathSegment::Each => match components.last_mut() {
                    Some(last) => last.push_str("[]"),
                    None => components.push("[]".to_string()),
                },
                PathSegment::Index(index) => match components.last_mut() {
                    Some(last) => last.push_str(&format!("[{index}]")),
                    None => components.push(format!("[{index}]")),
                },
            }
        }
        components
    }

    /// Name of the last key segment.
    pub fn leaf_name(&self) -> Option<&str> {
        self.segments.iter().rev().find_map(|segment| match segment {
            PathSegment::Key(key) => Some(key.as_str()),
            _ => None,
        })
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.segments {
            match segment {
                PathSegment::Key(key) => {
                    if !first {
                        f.write_str(".")?;
                    }
                    f.write_str(key)?;
                }
                PathSegment::Each => f.write_str("[]")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
            first = false;
        }
        Ok(())
    }
}

impl From<&str> for PropertyPath {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

fn parse_part(part: &str) -> Option<Vec<PathSegment>> {
    let (name, mut rest) = match part.find('[') {
        Some(pos) => part.split_at(pos),
        None => (part, ""),
    };

    let mut segments = Vec::new();
    if !name.is_empty() {
        segments.push(PathSegment::Key(name.to_string()));
    }

    while !rest.is_empty() {
        let inner_end = rest.find(']')?;
        if !rest.starts_with('[') {
            return None;
        }
        let inner = &rest[1..inner_end];
        if inner.is_empty() {
            segments.push(PathSegment::Each);
        } else {
            segments.push(PathSegment::Index(inner.parse().ok()?));
        }
        rest = &rest[inner_end + 1..];
    }

    Some(segments)
}

/// JSON type name of a value, as used in diagnostics and type checks.
pub fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Reads the value at `path`. `[]` segments never resolve; use
/// [`collect_path`] to fan out over arrays.
pub fn get_path<'a>(root: &'a Value, path: &PropertyPath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(root, |current, segment| match segment {
            PathSegment::Key(key) => current.as_object()?.get(key),
            PathSegment::Index(index) => current.as_array()?.get(*index),
            PathSegment::Each => None,
        })
}

/// Collects every value reachable through `path`, fanning out over arrays at
/// `[]` segments.
///
/// ```
/// use frontmatter_schema_core::{PropertyPath, collect_path};
/// use serde_json::json;
///
/// let data = json!({"commands": [{"c1": "git"}, {"c1": "spec"}]});
/// let values = collect_path(&data, &PropertyPath::parse("commands[].c1"));
/// assert_eq!(values, vec![&json!("git"), &json!("spec")]);
/// ```
pub fn collect_path<'a>(root: &'a Value, path: &PropertyPath) -> Vec<&'a Value> {
    let mut current = vec![root];
    for segment in path.segments() {
        current = current
            .into_iter()
            .flat_map(|value| -> Vec<&'a Value> {
                match segment {
                    PathSegment::Key(key) => value
                        .as_object()
                        .and_then(|map| map.get(key))
                        .into_iter()
                        .collect(),
                    PathSegment::Index(index) => value
                        .as_array()
                        .and_then(|items| items.get(*index))
                        .into_iter()
                        .collect(),
                    PathSegment::Each => value
                        .as_array()
                        .map(|items| items.iter().collect())
                        .unwrap_or_default(),
                }
            })
            .collect();
    }
    current
}

/// Writes `value` at `path`, creating intermediate objects (for keys) and
/// arrays padded with `null` (for indices).
///
/// A trailing `[]` is ignored and any other `[]` writes to index 0. Fails
/// with [`SchemaError::TypeConflict`] when an intermediate segment holds a
/// value of the wrong container kind; the final slot is always overwritten.
/// An index that would grow an array past [`MAX_ARRAY_LEN`] fails with
/// [`SchemaError::IndexOutOfRange`].
///
/// ```
/// use frontmatter_schema_core::{PropertyPath, SchemaError, set_path};
/// use serde_json::json;
///
/// let mut data = json!({"tools": "cli"});
/// let err = set_path(&mut data, &PropertyPath::parse("tools.availableConfigs"), json!([]))
///     .unwrap_err();
/// assert!(matches!(err, SchemaError::TypeConflict { .. }));
/// ```
pub fn set_path(root: &mut Value, path: &PropertyPath, value: Value) -> Result<()> {
    let target = path.without_trailing_each();
    let mut walked = PropertyPath::root();
    set_inner(root, target.segments(), value, &mut walked)
}

fn set_inner(
    current: &mut Value,
    segments: &[PathSegment],
    value: Value,
    walked: &mut PropertyPath,
) -> Result<()> {
    let Some((head, rest)) = segments.split_first() else {
        *current = value;
        return Ok(());
    };

    if current.is_null() {
        *current = match head {
            PathSegment::Key(_) => Value::Object(serde_json::Map::new()),
            PathSegment::Each | PathSegment::Index(_) => Value::Array(Vec::new()),
        };
    }

    let slot = match (head, current) {
        (PathSegment::Key(key), Value::Object(map)) => {
            map.entry(key.clone()).or_insert(Value::Null)
        }
        (PathSegment::Index(_) | PathSegment::Each, Value::Array(items)) => {
            let index = match head {
                PathSegment::Index(index) => *index,
                _ => 0,
            };
            if items.len() <= index {
                let len = index
                    .checked_add(1)
                    .filter(|len| *len <= MAX_ARRAY_LEN)
                    .ok_or_else(|| SchemaError::IndexOutOfRange {
                        path: location(walked),
                        index,
                        limit: MAX_ARRAY_LEN - 1,
                    })?;
                items.resize(len, Value::Null);
            }
            &mut items[index]
        }
        (_, other) => {
            return Err(SchemaError::TypeConflict {
                path: location(walked),
                found: value_type_name(other).to_string(),
            });
        }
    };

    walked.segments.push(head.clone());
    set_inner(slot, rest, value, walked)
}

fn location(walked: &PropertyPath) -> String {
    if walked.is_root() {
        "<root>".to_string()
    } else {
        walked.to_string()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_and_display_roundtrip_for_mixed_paths() {
        for raw in ["title", "a.b.c", "tags[]", "commands[].name", "m[2][]", "[]"] {
            assert_eq!(PropertyPath::parse(raw).to_string(), raw);
        }
    }

    #[test]
    fn test_parse_keeps_malformed_brackets_as_literal_key() {
        let path = PropertyPath::parse("weird[key");
        assert_eq!(path.segments(), &[PathSegment::Key("weird[key".into())]);
    }

    #[test]
    fn test_components_group_brackets_with_keys() {
        let path = PropertyPath::parse("commands[].options.input[]");
        assert_eq!(path.components(), vec!["commands[]", "options", "input[]"]);
        assert_eq!(path.leaf_name(), Some("input"));
    }

    #[test]
    fn test_generalized_replaces_indices() {
        let path = PropertyPath::parse("commands[3].name");
        assert_eq!(path.generalized().to_string(), "commands[].name");
        assert_eq!(path.indices(), vec![3]);
    }

    #[test]
    fn test_bind_indices_drops_trailing_each() {
        let schema = PropertyPath::parse("commands[].tags[]");
        assert_eq!(schema.bind_indices(&[4]).to_string(), "commands[4].tags");
        assert_eq!(
            PropertyPath::parse("a[].b").bind_indices(&[]).to_string(),
            "a[0].b"
        );
    }

    #[test]
    fn test_set_path_creates_intermediates() {
        let mut root = Value::Null;
        set_path(&mut root, &PropertyPath::parse("a.b[1].c"), json!(true)).unwrap();
        assert_eq!(root, json!({"a": {"b": [null, {"c": true}]}}));
    }

    #[test]
    fn test_set_path_overwrites_leaf() {
        let mut root = json!({"a": {"b": 1}});
        set_path(&mut root, &PropertyPath::parse("a.b"), json!({"x": 1})).unwrap();
        assert_eq!(root, json!({"a": {"b": {"x": 1}}}));
    }

    #[test]
    fn test_set_path_rejects_scalar_intermediate() {
        let mut root = json!({"tools": {"availableConfigs": 3}});
        let err = set_path(
            &mut root,
            &PropertyPath::parse("tools.availableConfigs.first"),
            json!("x"),
        )
        .unwrap_err();
        assert_eq!(
            err,
            SchemaError::TypeConflict {
                path: "tools.availableConfigs".to_string(),
                found: "number".to_string(),
            }
        );
    }

    #[test]
    fn test_set_path_rejects_key_into_array() {
        let mut root = json!({"items": [1, 2]});
        let err = set_path(&mut root, &PropertyPath::parse("items.name"), json!("x")).unwrap_err();
        assert!(matches!(err, SchemaError::TypeConflict { found, .. } if found == "array"));
    }

    #[test]
    fn test_set_path_rejects_huge_index() {
        let mut root = json!({});
        let err = set_path(&mut root, &PropertyPath::parse("a[18446744073709551615]"), json!(1))
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::IndexOutOfRange {
                path: "a".to_string(),
                index: usize::MAX,
                limit: MAX_ARRAY_LEN - 1,
            }
        );

        let mut list = json!([]);
        let err = set_path(&mut list, &PropertyPath::parse("[20000]"), json!(1)).unwrap_err();
        assert!(matches!(err, SchemaError::IndexOutOfRange { ref path, .. } if path == "<root>"));
        assert_eq!(list, json!([]));
    }

    #[test]
    fn test_set_path_pads_up_to_limit() {
        let mut root = json!({"a": [1]});
        let last = format!("a[{}]", MAX_ARRAY_LEN - 1);
        set_path(&mut root, &PropertyPath::parse(&last), json!(2)).unwrap();
        assert_eq!(root["a"].as_array().unwrap().len(), MAX_ARRAY_LEN);

        let mut existing = json!({"a": [1, 2]});
        set_path(&mut existing, &PropertyPath::parse("a[1]"), json!(3)).unwrap();
        assert_eq!(existing, json!({"a": [1, 3]}));
    }

    #[test]
    fn test_get_path_reads_indices_but_not_each() {
        let root = json!({"a": [{"b": 1}, {"b": 2}]});
        assert_eq!(get_path(&root, &PropertyPath::parse("a[1].b")), Some(&json!(2)));
        assert_eq!(get_path(&root, &PropertyPath::parse("a[].b")), None);
        assert_eq!(get_path(&root, &PropertyPath::root()), Some(&root));
    }

    #[test]
    fn test_collect_path_fans_out() {
        let root = json!({"a": [{"b": [1, 2]}, {"b": [3]}, {"c": 0}]});
        let values = collect_path(&root, &PropertyPath::parse("a[].b[]"));
        assert_eq!(values, vec![&json!(1), &json!(2), &json!(3)]);
    }
}
