//! Evaluation of derived fields.

use frontmatter_schema_core::{
    DerivationRule, FlatSchema, PropertyPath, Result, collect_path, set_path,
};
use serde_json::Value;
use tracing::debug;

/// Computes the value of one derived field from `data`.
///
/// Every value reachable through the rule's source expression is collected
/// (`[]` fans out over arrays). With `flatten`, nested arrays are spliced in
/// depth-first. With `unique`, repeats are dropped keeping the first
/// occurrence, and the result is sorted when every value is a string.
///
/// # Examples
///
/// ```
/// use frontmatter_schema_core::DerivationRule;
/// use frontmatter_schema_engine::derive::evaluate_derivation;
/// use serde_json::json;
///
/// let rule = DerivationRule {
///     path: "availableConfigs[]".into(),
///     source_expression: "commands[].c1".into(),
///     unique: true,
///     flatten: false,
/// };
/// let data = json!({"commands": [{"c1": "spec"}, {"c1": "git"}, {"c1": "spec"}]});
/// assert_eq!(evaluate_derivation(&rule, &data), json!(["git", "spec"]));
/// ```
pub fn evaluate_derivation(rule: &DerivationRule, data: &Value) -> Value {
    let source = PropertyPath::parse(&rule.source_expression);
    let collected = collect_path(data, &source);

    let mut values: Vec<Value> = Vec::with_capacity(collected.len());
    for value in collected {
        if rule.flatten {
            splice(value, &mut values);
        } else {
            values.push(value.clone());
        }
    }

    if rule.unique {
        let mut unique: Vec<Value> = Vec::with_capacity(values.len());
        for value in values {
            if !unique.contains(&value) {
                unique.push(value);
            }
        }
        if unique.iter().all(Value::is_string) {
            unique.sort_by(|a, b| a.as_str().cmp(&b.as_str()));
        }
        values = unique;
    }

    Value::Array(values)
}

fn splice(value: &Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| splice(item, out)),
        other => out.push(other.clone()),
    }
}

/// Evaluates every derivation rule of `flat` against `data` and writes the
/// results at their target paths, in target-path order.
///
/// # Errors
///
/// Returns [`SchemaError::TypeConflict`](frontmatter_schema_core::SchemaError::TypeConflict)
/// when a target path runs through a scalar.
pub fn apply_derivations(flat: &FlatSchema, data: &mut Value) -> Result<()> {
    for rule in flat.derivations.values() {
        let derived = evaluate_derivation(rule, data);
        debug!(
            target = %rule.path,
            source = %rule.source_expression,
            values = derived.as_array().map_or(0, Vec::len),
            "Applied derivation"
        );
        set_path(data, &PropertyPath::parse(&rule.path), derived)?;
    }
    Ok(())
}
