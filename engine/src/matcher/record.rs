//! Flattening of metadata records into `(path, value)` entries.

use frontmatter_schema_core::{PathSegment, PropertyPath};
use serde_json::Value;

/// One flattened metadata value.
#[derive(Debug, Clone, PartialEq)]
pub struct InputEntry {
    /// Concrete path; array elements carry their index (`commands[1].c1`).
    pub path: PropertyPath,
    pub value: Value,
}

/// Flattens a metadata record depth-first.
///
/// Scalars and empty objects become leaf entries. An array becomes one
/// `path[]` entry holding the whole array, followed by the entries of its
/// object elements under `path[i]`.
///
/// ```
/// use frontmatter_schema_engine::matcher::flatten_record;
/// use serde_json::json;
///
/// let entries = flatten_record(&json!({"c1": "git", "tags": ["a"], "refs": [{"id": 1}]}));
/// let paths: Vec<String> = entries.iter().map(|e| e.path.to_string()).collect();
/// assert_eq!(paths, vec!["c1", "refs[]", "refs[0].id", "tags[]"]);
/// ```
pub fn flatten_record(record: &Value) -> Vec<InputEntry> {
    let mut entries = Vec::new();
    walk(record, &PropertyPath::root(), &mut entries);
    entries
}

fn walk(value: &Value, path: &PropertyPath, entries: &mut Vec<InputEntry>) {
    match value {
        Value::Object(map) if map.is_empty() => {
            if !path.is_root() {
                entries.push(InputEntry {
                    path: path.clone(),
                    value: value.clone(),
                });
            }
        }
        Value::Object(map) => {
            for (key, child) in map {
                walk(child, &path.child(key), entries);
            }
        }
        Value::Array(items) => {
            entries.push(InputEntry {
                path: path.each(),
                value: value.clone(),
            });
            for (index, item) in items.iter().enumerate() {
                if item.is_object() {
                    walk(item, &path.index(index), entries);
                }
            }
        }
        scalar => {
            if !path.is_root() {
                entries.push(InputEntry {
                    path: path.clone(),
                    value: scalar.clone(),
                });
            }
        }
    }
}

/// `true` when `entry` lies inside the array addressed by `array_path`
/// (`commands[]` covers `commands[2].c1`, not `other[0].c1`).
pub fn within_array(array_path: &PropertyPath, entry: &PropertyPath) -> bool {
    let Some((PathSegment::Each, parent)) = array_path.segments().split_last() else {
        return false;
    };
    let segments = entry.segments();
    segments.len() > parent.len() + 1
        && segments[..parent.len()] == *parent
        && matches!(segments[parent.len()], PathSegment::Index(_) | PathSegment::Each)
}
