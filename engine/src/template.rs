//! Structural template rendering.
//!
//! A template is a plain JSON tree. String leaves may carry `{path}`
//! placeholders that are looked up in the data record with the usual
//! dot/bracket notation. An array whose only element is the string
//! `{@path}` is expanded into one element per item of the data array at
//! `path`.
//!
//! Placeholders that do not resolve are left in place so incomplete renders
//! stay visible; [`unresolved_placeholders`] lists them.

use std::sync::LazyLock;

use frontmatter_schema_core::{PropertyPath, Result, SchemaError, get_path, set_path};
use regex::{Captures, Regex};
use serde_json::Value;
use tracing::debug;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}@\s][^{}]*)\}").expect("static regex must compile"));

static WHOLE_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{([^{}@\s][^{}]*)\}$").expect("static regex must compile"));

static EXPANSION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{@([^{}]*)\}$").expect("static regex must compile"));

/// Rendering switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions<'t> {
    /// Fail with [`SchemaError::MissingArrayData`] when an expansion marker
    /// finds no array at its path. Off by default: the marker is dropped.
    pub require_array_data: bool,
    /// Template applied to each expanded element, with the element as its
    /// data record. Elements are copied verbatim when unset.
    pub item_template: Option<&'t Value>,
}

/// Renders `template` against `data`.
///
/// Whole-string placeholders (`"{tags}"`) are replaced by the raw value,
/// arrays and objects included. Placeholders inside longer strings are
/// replaced by the value's text form.
///
/// # Errors
///
/// Returns [`SchemaError::MissingArrayData`] only when
/// [`RenderOptions::require_array_data`] is set and an expansion marker finds
/// no array.
///
/// # Examples
///
/// ```
/// use frontmatter_schema_engine::template::{RenderOptions, render};
/// use serde_json::json;
///
/// let template = json!({"name": "{title}", "summary": "{title} ({c1})", "items": ["{@items}"]});
/// let data = json!({"title": "Build", "c1": "git", "items": [{"x": 1}, {"x": 2}]});
///
/// let rendered = render(&template, &data, &RenderOptions::default()).unwrap();
/// assert_eq!(
///     rendered,
///     json!({"name": "Build", "summary": "Build (git)", "items": [{"x": 1}, {"x": 2}]})
/// );
/// ```
pub fn render(template: &Value, data: &Value, options: &RenderOptions<'_>) -> Result<Value> {
    match template {
        Value::String(text) => Ok(render_string(text, data)),
        Value::Array(elements) => {
            if let Some(expression) = expansion_marker(elements) {
                return expand(expression, data, options);
            }
            elements
                .iter()
                .map(|element| render(element, data, options))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array)
        }
        Value::Object(map) => {
            let mut rendered = serde_json::Map::with_capacity(map.len());
            for (key, child) in map {
                rendered.insert(key.clone(), render(child, data, options)?);
            }
            Ok(Value::Object(rendered))
        }
        primitive => Ok(primitive.clone()),
    }
}

fn expansion_marker(elements: &[Value]) -> Option<&str> {
    let [Value::String(marker)] = elements else {
        return None;
    };
    EXPANSION_MARKER
        .captures(marker)
        .and_then(|caps| caps.get(1))
        .map(|expression| expression.as_str())
}

fn expand(expression: &str, data: &Value, options: &RenderOptions<'_>) -> Result<Value> {
    let path = PropertyPath::parse(expression.trim());
    let Some(Value::Array(items)) = get_path(data, &path) else {
        if options.require_array_data {
            return Err(SchemaError::MissingArrayData {
                path: path.to_string(),
            });
        }
        debug!(path = %path, "No array data for expansion marker, omitting");
        return Ok(Value::Array(Vec::new()));
    };

    let nested = RenderOptions {
        item_template: None,
        ..*options
    };
    let expanded = match options.item_template {
        Some(item_template) => items
            .iter()
            .map(|item| render(item_template, item, &nested))
            .collect::<Result<Vec<_>>>()?,
        None => items.clone(),
    };
    debug!(path = %path, items = expanded.len(), "Expanded array marker");
    Ok(Value::Array(expanded))
}

fn render_string(text: &str, data: &Value) -> Value {
    if let Some(caps) = WHOLE_PLACEHOLDER.captures(text) {
        return match lookup(&caps[1], data) {
            Some(value) => value.clone(),
            None => Value::String(text.to_string()),
        };
    }

    let rendered = PLACEHOLDER.replace_all(text, |caps: &Captures<'_>| {
        match lookup(&caps[1], data) {
            Some(Value::String(value)) => value.clone(),
            Some(value) => value.to_string(),
            None => caps[0].to_string(),
        }
    });
    Value::String(rendered.into_owned())
}

fn lookup<'d>(expression: &str, data: &'d Value) -> Option<&'d Value> {
    let found = get_path(data, &PropertyPath::parse(expression.trim()));
    if found.is_none() {
        debug!(placeholder = expression, "Unresolved placeholder left intact");
    }
    found
}

/// Writes `value` at the dot/bracket `target` inside `tree`, creating
/// intermediate objects on demand.
///
/// # Errors
///
/// Returns [`SchemaError::TypeConflict`] when an intermediate segment holds a
/// value that cannot be descended into. Nothing is overwritten in that case.
///
/// ```
/// use frontmatter_schema_engine::template::assign;
/// use serde_json::json;
///
/// let mut tree = json!({"tools": {}});
/// assign(&mut tree, "tools.availableConfigs", json!(["git"])).unwrap();
/// assert_eq!(tree, json!({"tools": {"availableConfigs": ["git"]}}));
///
/// let mut scalar = json!({"tools": "cli"});
/// assert!(assign(&mut scalar, "tools.availableConfigs", json!([])).is_err());
/// ```
pub fn assign(tree: &mut Value, target: &str, value: Value) -> Result<()> {
    set_path(tree, &PropertyPath::parse(target), value)
}

/// Placeholder expressions still present in a rendered tree, in document
/// order.
pub fn unresolved_placeholders(rendered: &Value) -> Vec<String> {
    let mut found = Vec::new();
    collect_placeholders(rendered, &mut found);
    found
}

fn collect_placeholders(value: &Value, found: &mut Vec<String>) {
    match value {
        Value::String(text) => {
            found.extend(PLACEHOLDER.captures_iter(text).map(|caps| caps[1].to_string()));
        }
        Value::Array(items) => items.iter().for_each(|item| collect_placeholders(item, found)),
        Value::Object(map) => map.values().for_each(|child| collect_placeholders(child, found)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn render_default(template: Value, data: Value) -> Value {
        render(&template, &data, &RenderOptions::default()).unwrap()
    }

    #[test]
    fn test_whole_placeholder_keeps_raw_value() {
        let rendered = render_default(
            json!({"tags": "{tags}", "count": "{n}", "opts": "{options}"}),
            json!({"tags": ["a", "b"], "n": 3, "options": {"x": true}}),
        );
        assert_eq!(
            rendered,
            json!({"tags": ["a", "b"], "count": 3, "opts": {"x": true}})
        );
    }

    #[test]
    fn test_embedded_placeholders_interpolate_text() {
        let rendered = render_default(
            json!("{c1}/{c2} has {n} options: {list}"),
            json!({"c1": "git", "c2": "create", "n": 2, "list": ["a"]}),
        );
        assert_eq!(rendered, json!("git/create has 2 options: [\"a\"]"));
    }

    #[test]
    fn test_nested_path_lookup() {
        let rendered = render_default(
            json!({"first": "{commands[0].title}", "deep": "{meta.author.name}"}),
            json!({"commands": [{"title": "t0"}], "meta": {"author": {"name": "kim"}}}),
        );
        assert_eq!(rendered, json!({"first": "t0", "deep": "kim"}));
    }

    #[test]
    fn test_unresolved_placeholders_left_intact() {
        let rendered = render_default(
            json!({"a": "{missing}", "b": "x {also.missing} y"}),
            json!({}),
        );
        assert_eq!(rendered, json!({"a": "{missing}", "b": "x {also.missing} y"}));
        assert_eq!(
            unresolved_placeholders(&rendered),
            vec!["missing", "also.missing"]
        );
    }

    #[test]
    fn test_primitives_and_plain_strings_pass_through() {
        let template = json!({"n": 1, "b": false, "z": null, "s": "plain {", "brace": "{}"});
        assert_eq!(render_default(template.clone(), json!({})), template);
    }

    #[test]
    fn test_expansion_copies_each_item() {
        let rendered = render_default(
            json!({"items": ["{@items}"]}),
            json!({"items": [{"x": 1}, {"x": 2}]}),
        );
        assert_eq!(rendered, json!({"items": [{"x": 1}, {"x": 2}]}));
    }

    #[test]
    fn test_expansion_with_item_template() {
        let item = json!({"label": "{c1}:{c2}", "raw": "{c3}"});
        let options = RenderOptions {
            item_template: Some(&item),
            ..RenderOptions::default()
        };
        let rendered = render(
            &json!({"commands": ["{@commands}"]}),
            &json!({"commands": [{"c1": "a", "c2": "b", "c3": 1}]}),
            &options,
        )
        .unwrap();
        assert_eq!(rendered, json!({"commands": [{"label": "a:b", "raw": 1}]}));
    }

    #[test]
    fn test_missing_array_data_is_omitted_by_default() {
        let rendered = render_default(json!({"items": ["{@items}"], "keep": 1}), json!({"items": "nope"}));
        assert_eq!(rendered, json!({"items": [], "keep": 1}));
    }

    #[test]
    fn test_missing_array_data_strict() {
        let options = RenderOptions {
            require_array_data: true,
            ..RenderOptions::default()
        };
        let err = render(&json!({"items": ["{@list.items}"]}), &json!({}), &options).unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingArrayData {
                path: "list.items".to_string()
            }
        );
    }

    #[test]
    fn test_marker_not_sole_element_is_plain_text() {
        let template = json!(["{@items}", "other"]);
        assert_eq!(render_default(template.clone(), json!({"items": [1]})), template);
    }

    #[test]
    fn test_assign_rejects_array_intermediate() {
        let mut tree = json!({"tools": []});
        let err = assign(&mut tree, "tools.availableConfigs", json!([])).unwrap_err();
        assert!(matches!(err, SchemaError::TypeConflict { path, .. } if path == "tools"));
        assert_eq!(tree, json!({"tools": []}));
    }

    #[test]
    fn test_assign_rejects_unbounded_index() {
        let mut tree = json!({});
        let err = assign(&mut tree, "a[18446744073709551615]", json!(1)).unwrap_err();
        assert!(matches!(err, SchemaError::IndexOutOfRange { index, .. } if index == usize::MAX));
    }
}
