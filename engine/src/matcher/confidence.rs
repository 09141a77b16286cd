//! Confidence scoring for input-to-schema candidates.

use frontmatter_schema_core::PropertyPath;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::similarity::{hierarchy_overlap, name_similarity};

/// Weight (0.5) of the ancestor-overlap term.
pub const HIERARCHY_WEIGHT: f64 = 0.5;

/// Weight (0.3) of the leaf-name similarity term.
pub const NAME_WEIGHT: f64 = 0.3;

/// Weight (0.2) of the type-compatibility term.
pub const TYPE_WEIGHT: f64 = 0.2;

/// A candidate must score strictly above this (0.3) to be accepted.
pub const ACCEPTANCE_THRESHOLD: f64 = 0.3;

/// Scoring weights and acceptance threshold.
///
/// # Examples
///
/// ```
/// use frontmatter_schema_engine::matcher::MatchWeights;
///
/// let weights = MatchWeights::default();
/// assert_eq!(weights.hierarchy, 0.5);
/// assert_eq!(weights.threshold, 0.3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchWeights {
    pub hierarchy: f64,
    pub name: f64,
    pub type_match: f64,
    pub threshold: f64,
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self {
            hierarchy: HIERARCHY_WEIGHT,
            name: NAME_WEIGHT,
            type_match: TYPE_WEIGHT,
            threshold: ACCEPTANCE_THRESHOLD,
        }
    }
}

/// `true` when `value`'s runtime type satisfies `declared`. Unions (`a|b`)
/// match when any member does; `integer` and `number` both accept any
/// number; `any` accepts everything.
pub fn type_compatible(value: &Value, declared: &str) -> bool {
    declared.split('|').any(|kind| match kind.trim() {
        "any" | "" => true,
        "string" => value.is_string(),
        "number" | "integer" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => false,
    })
}

/// Scores an input entry against one schema property.
///
/// `input` is the generalized input path (indices replaced by `[]`). Type
/// compatibility is a gate: an incompatible value scores 0 whatever the
/// other terms say. Returns a clamped [0.0, 1.0] score.
pub fn score_candidate(
    input: &PropertyPath,
    value: &Value,
    schema_path: &PropertyPath,
    declared_type: &str,
    weights: &MatchWeights,
) -> f64 {
    if !type_compatible(value, declared_type) {
        return 0.0;
    }

    let input_components = input.components();
    let schema_components = schema_path.components();
    let hierarchy = hierarchy_overlap(ancestors(&input_components), ancestors(&schema_components));
    let name = name_similarity(
        input.leaf_name().unwrap_or_default(),
        schema_path.leaf_name().unwrap_or_default(),
    );

    let score = weights.hierarchy * hierarchy + weights.name * name + weights.type_match;
    score.clamp(0.0, 1.0)
}

fn ancestors(components: &[String]) -> &[String] {
    match components.split_last() {
        Some((_, ancestors)) => ancestors,
        None => &[],
    }
}
