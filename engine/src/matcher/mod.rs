//! Fuzzy mapping of free-form metadata onto a flattened schema.
//!
//! Every flattened input entry is scored against every schema entry:
//!
//! ```text
//! confidence = 0.5 * hierarchyOverlap + 0.3 * nameSimilarity + 0.2 * typeMatch
//! ```
//!
//! A type mismatch zeroes the score. The best candidate is accepted when its
//! score is strictly above the threshold (0.3). When two inputs land on the
//! same concrete target, or one target lies inside the other, the higher
//! confidence wins (ties keep the first) and the loser is reported as
//! unmatched. Entries inside an accepted array are carried by that array and
//! are not matched again; entries inside an array that lost a collision are
//! dropped with it. Element paths (`list[].x`) only bind inputs that carry a
//! concrete index for every `[]`.

mod confidence;
mod record;
mod similarity;

use frontmatter_schema_core::{
    FlatSchema, MatchOutcome, MatchResult, PathSegment, PropertyPath, SchemaProperty, set_path,
};
use serde_json::{Map, Value};
use tracing::{debug, warn};

pub use confidence::{
    ACCEPTANCE_THRESHOLD, HIERARCHY_WEIGHT, MatchWeights, NAME_WEIGHT, TYPE_WEIGHT,
    score_candidate, type_compatible,
};
pub use record::{InputEntry, flatten_record, within_array};
pub use similarity::{hierarchy_overlap, levenshtein, name_similarity};

/// Matches `record` against `flat` with the default weights.
///
/// # Examples
///
/// ```
/// use frontmatter_schema_engine::{flatten::flatten, matcher::match_record};
/// use serde_json::json;
///
/// let flat = flatten(&json!({
///     "required": ["title"],
///     "properties": {
///         "title": {"type": "string"},
///         "tags": {"type": "array", "items": {"type": "string"}}
///     }
/// }))
/// .unwrap();
///
/// let outcome = match_record(&json!({"titel": "Hello", "tags": ["a", "b"]}), &flat);
/// assert_eq!(outcome.mapped_record, json!({"title": "Hello", "tags": ["a", "b"]}));
/// assert!(outcome.unmatched_keys.is_empty());
/// assert!(outcome.missing_required_keys.is_empty());
/// ```
pub fn match_record(record: &Value, flat: &FlatSchema) -> MatchOutcome {
    Matcher::new(flat).match_record(record)
}

/// Schema-bound matcher.
pub struct Matcher<'s> {
    targets: Vec<(PropertyPath, &'s SchemaProperty)>,
    weights: MatchWeights,
}

struct Candidate {
    entry: InputEntry,
    schema_path: PropertyPath,
    matched_property: String,
    confidence: f64,
}

struct Accepted {
    /// Schema path with the input's indices bound.
    target: PropertyPath,
    candidate: Candidate,
}

impl<'s> Matcher<'s> {
    pub fn new(flat: &'s FlatSchema) -> Self {
        let targets = flat
            .properties
            .iter()
            .map(|prop| (prop.property_path(), prop))
            .collect();
        Self {
            targets,
            weights: MatchWeights::default(),
        }
    }

    pub fn with_weights(mut self, weights: MatchWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Maps one metadata record. Never fails: anything that cannot be placed
    /// is reported in `unmatched_keys`.
    pub fn match_record(&self, record: &Value) -> MatchOutcome {
        let mut unmatched = Vec::new();
        let mut accepted: Vec<Option<Accepted>> = Vec::new();
        let mut carried_arrays: Vec<PropertyPath> = Vec::new();

        for entry in flatten_record(record) {
            if carried_arrays
                .iter()
                .any(|array| within_array(array, &entry.path))
            {
                continue;
            }

            let Some(candidate) = self.best_candidate(entry, &mut unmatched) else {
                continue;
            };
            let target = candidate
                .schema_path
                .bind_indices(&candidate.entry.path.indices());

            let rivals: Vec<usize> = accepted
                .iter()
                .enumerate()
                .filter(|(_, slot)| {
                    slot.as_ref()
                        .is_some_and(|held| targets_overlap(&held.target, &target))
                })
                .map(|(index, _)| index)
                .collect();
            let strongest = rivals
                .iter()
                .filter_map(|&index| accepted[index].as_ref())
                .map(|held| held.candidate.confidence)
                .fold(None, |top: Option<f64>, confidence| {
                    Some(top.map_or(confidence, |top| top.max(confidence)))
                });

            if strongest.is_some_and(|top| top >= candidate.confidence) {
                debug!(
                    input = %candidate.entry.path,
                    target = %target,
                    "Lost target collision"
                );
                // A losing array keeps its elements out of the winner's slots.
                if candidate.entry.path.is_array_level() {
                    carried_arrays.push(candidate.entry.path.clone());
                }
                unmatched.push(candidate.entry.path.to_string());
                continue;
            }

            for index in rivals {
                if let Some(displaced) = accepted[index].take() {
                    debug!(
                        input = %displaced.candidate.entry.path,
                        target = %target,
                        "Displaced by a higher-confidence match"
                    );
                    unmatched.push(displaced.candidate.entry.path.to_string());
                }
            }
            if candidate.entry.path.is_array_level() {
                carried_arrays.push(candidate.entry.path.clone());
            }
            accepted.push(Some(Accepted { target, candidate }));
        }

        let mut mapped = Value::Object(Map::new());
        let mut matches = Vec::with_capacity(accepted.len());
        for Accepted { target, candidate } in accepted.into_iter().flatten() {
            if let Err(err) = set_path(&mut mapped, &target, candidate.entry.value.clone()) {
                warn!(input = %candidate.entry.path, error = %err, "Dropped conflicting match");
                unmatched.push(candidate.entry.path.to_string());
                continue;
            }
            matches.push(MatchResult {
                path: candidate.entry.path.to_string(),
                value: candidate.entry.value,
                confidence: candidate.confidence,
                matched_property: candidate.matched_property,
            });
        }

        let missing_required_keys = self.missing_required(&matches);

        debug!(
            matched = matches.len(),
            unmatched = unmatched.len(),
            missing_required = missing_required_keys.len(),
            "Matched record"
        );

        MatchOutcome {
            matches,
            unmatched_keys: unmatched,
            missing_required_keys,
            mapped_record: mapped,
        }
    }

    fn best_candidate(&self, entry: InputEntry, unmatched: &mut Vec<String>) -> Option<Candidate> {
        let generalized = entry.path.generalized();
        let mut best: Option<(f64, usize)> = None;
        let available_indices = entry.path.indices().len();
        for (index, (schema_path, prop)) in self.targets.iter().enumerate() {
            if element_depth(schema_path) > available_indices {
                continue;
            }
            let score = score_candidate(
                &generalized,
                &entry.value,
                schema_path,
                &prop.kind,
                &self.weights,
            );
            if best.is_none_or(|(top, _)| score > top) {
                best = Some((score, index));
            }
        }

        match best {
            Some((confidence, index)) if confidence > self.weights.threshold => {
                let (schema_path, prop) = &self.targets[index];
                debug!(
                    input = %entry.path,
                    target = %prop.path,
                    confidence,
                    "Accepted candidate"
                );
                Some(Candidate {
                    entry,
                    schema_path: schema_path.clone(),
                    matched_property: prop.path.clone(),
                    confidence,
                })
            }
            _ => {
                unmatched.push(entry.path.to_string());
                None
            }
        }
    }

    /// Required schema paths not covered by an accepted match on the path
    /// itself or on an enclosing array. Children of a missing required array
    /// are not reported separately.
    fn missing_required(&self, matches: &[MatchResult]) -> Vec<String> {
        let covered: Vec<PropertyPath> = matches
            .iter()
            .map(|m| PropertyPath::parse(&m.matched_property))
            .collect();

        let mut missing: Vec<PropertyPath> = Vec::new();
        for (schema_path, prop) in &self.targets {
            if !prop.required {
                continue;
            }
            let satisfied = covered.iter().any(|done| {
                done == schema_path || (done.is_array_level() && schema_path.starts_with(done))
            });
            let under_missing = missing
                .iter()
                .any(|gone| gone.is_array_level() && schema_path.starts_with(gone));
            if !satisfied && !under_missing {
                missing.push(schema_path.clone());
            }
        }
        missing.iter().map(ToString::to_string).collect()
    }
}

/// Two bound targets collide when they are equal or one lies inside the
/// other, since writing both would overwrite part of the first value.
fn targets_overlap(a: &PropertyPath, b: &PropertyPath) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

/// Number of `[]` segments that need a concrete index from the input
/// (a trailing `[]` addresses the whole array and needs none).
fn element_depth(schema_path: &PropertyPath) -> usize {
    schema_path
        .without_trailing_each()
        .segments()
        .iter()
        .filter(|segment| matches!(segment, PathSegment::Each))
        .count()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::flatten::flatten;

    fn command_schema() -> FlatSchema {
        flatten(&json!({
            "required": ["c1", "c2", "c3"],
            "properties": {
                "c1": {"type": "string"},
                "c2": {"type": "string"},
                "c3": {"type": "string"},
                "title": {"type": "string"},
                "options": {
                    "type": "object",
                    "properties": {
                        "input": {"type": "array", "items": {"type": "string"}},
                        "adaptation": {"type": "boolean"}
                    }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_exact_keys_map_onto_schema() {
        let outcome = match_record(
            &json!({"c1": "git", "c2": "create", "c3": "branch", "title": "Create a branch"}),
            &command_schema(),
        );
        assert_eq!(
            outcome.mapped_record,
            json!({"c1": "git", "c2": "create", "c3": "branch", "title": "Create a branch"})
        );
        assert!(outcome.unmatched_keys.is_empty());
        assert!(outcome.missing_required_keys.is_empty());
        let c2 = outcome.matches.iter().find(|m| m.path == "c2").unwrap();
        assert_eq!(c2.matched_property, "c2");
    }

    #[test]
    fn test_nested_values_keep_hierarchy() {
        let outcome = match_record(
            &json!({"c1": "a", "c2": "b", "c3": "c", "options": {"input": ["x"], "adaptation": true}}),
            &command_schema(),
        );
        assert_eq!(outcome.mapped_record["options"], json!({"input": ["x"], "adaptation": true}));
        let input = outcome
            .matches
            .iter()
            .find(|m| m.path == "options.input[]")
            .unwrap();
        assert!((input.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_type_mismatch_is_never_accepted() {
        let flat = flatten(&json!({"properties": {"count": {"type": "number"}}})).unwrap();
        let outcome = match_record(&json!({"count": "many"}), &flat);
        assert!(outcome.matches.is_empty());
        assert_eq!(outcome.unmatched_keys, vec!["count"]);
        assert_eq!(outcome.mapped_record, json!({}));
    }

    #[test]
    fn test_unrelated_keys_are_unmatched() {
        let outcome = match_record(
            &json!({"c1": "a", "c2": "b", "c3": "c", "zzzzzz": 7}),
            &command_schema(),
        );
        assert_eq!(outcome.unmatched_keys, vec!["zzzzzz"]);
    }

    #[test]
    fn test_missing_required_reported() {
        let outcome = match_record(&json!({"c1": "git", "title": "t"}), &command_schema());
        assert_eq!(outcome.missing_required_keys, vec!["c2", "c3"]);
    }

    #[test]
    fn test_collision_keeps_higher_confidence() {
        let flat = flatten(&json!({"properties": {"title": {"type": "string"}}})).unwrap();
        let outcome = match_record(&json!({"titel": "typo", "title": "exact"}), &flat);
        assert_eq!(outcome.mapped_record, json!({"title": "exact"}));
        assert_eq!(outcome.unmatched_keys, vec!["titel"]);
        assert_eq!(outcome.matches.len(), 1);
    }

    #[test]
    fn test_collision_tie_keeps_first() {
        let flat = flatten(&json!({"properties": {"name": {"type": "string"}}})).unwrap();
        let outcome = match_record(&json!({"Name": "first", "name": "second"}), &flat);
        assert_eq!(outcome.mapped_record, json!({"name": "first"}));
        assert_eq!(outcome.unmatched_keys, vec!["name"]);
    }

    #[test]
    fn test_array_elements_carried_by_accepted_array() {
        let flat = flatten(&json!({
            "properties": {
                "refs": {
                    "type": "array",
                    "items": {"properties": {"id": {"type": "number"}}}
                }
            }
        }))
        .unwrap();
        let outcome = match_record(&json!({"refs": [{"id": 1}, {"id": 2}]}), &flat);
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].matched_property, "refs[]");
        assert_eq!(outcome.mapped_record, json!({"refs": [{"id": 1}, {"id": 2}]}));
    }

    #[test]
    fn test_array_elements_matched_when_array_rejected() {
        let flat = flatten(&json!({
            "properties": {
                "refs": {
                    "type": "string"
                },
                "items": {
                    "type": "array",
                    "items": {"properties": {"id": {"type": "number"}}}
                }
            }
        }))
        .unwrap();
        let weights = MatchWeights {
            threshold: 0.6,
            ..MatchWeights::default()
        };
        let outcome = Matcher::new(&flat)
            .with_weights(weights)
            .match_record(&json!({"items": [{"id": 5}]}));
        assert!(outcome.unmatched_keys.contains(&"items[]".to_string()));
        let id = outcome.matches.iter().find(|m| m.path == "items[0].id").unwrap();
        assert_eq!(id.matched_property, "items[].id");
        assert_eq!(outcome.mapped_record, json!({"items": [{"id": 5}]}));
    }

    fn refs_schema() -> FlatSchema {
        flatten(&json!({
            "properties": {
                "items": {
                    "type": "array",
                    "items": {"properties": {"id": {"type": "number"}}}
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_losing_array_elements_stay_out_of_winner() {
        let outcome = match_record(
            &json!({"items": [{"id": 1}], "itemz": [{"id": 2}]}),
            &refs_schema(),
        );
        assert_eq!(outcome.mapped_record, json!({"items": [{"id": 1}]}));
        assert_eq!(outcome.unmatched_keys, vec!["itemz[]"]);
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].path, "items[]");
    }

    #[test]
    fn test_input_inside_accepted_array_target_collides() {
        let flat = flatten(&json!({
            "properties": {
                "items": {
                    "type": "array",
                    "items": {"properties": {"id": {"type": "number"}}}
                },
                "list": {
                    "type": "array",
                    "items": {"properties": {"id": {"type": "number"}}}
                }
            }
        }))
        .unwrap();
        // `lizt[]` is rejected, so its element is matched on its own and must
        // not overwrite the accepted `items` array.
        let weights = MatchWeights {
            threshold: 0.45,
            ..MatchWeights::default()
        };
        let outcome = Matcher::new(&flat)
            .with_weights(weights)
            .match_record(&json!({"items": [{"id": 1}], "lizt": [{"id": 9}]}));
        assert_eq!(outcome.mapped_record["items"], json!([{"id": 1}]));
        for result in &outcome.matches {
            assert_eq!(
                get_path_value(&outcome.mapped_record, &result.matched_property, &result.path),
                Some(&result.value)
            );
        }
    }

    #[test]
    fn test_scalar_never_binds_into_array_element() {
        let flat = flatten(&json!({
            "properties": {
                "arr": {
                    "type": "array",
                    "items": {"properties": {"val": {"type": "number"}}}
                }
            }
        }))
        .unwrap();
        let outcome = match_record(&json!({"arr": [{"val": 1}, {"val": 2}], "val": 9}), &flat);
        assert_eq!(outcome.mapped_record, json!({"arr": [{"val": 1}, {"val": 2}]}));
        assert_eq!(outcome.unmatched_keys, vec!["val"]);
    }

    fn get_path_value<'a>(mapped: &'a Value, property: &str, input: &str) -> Option<&'a Value> {
        let indices = PropertyPath::parse(input).indices();
        let target = PropertyPath::parse(property).bind_indices(&indices);
        frontmatter_schema_core::get_path(mapped, &target)
    }

    #[test]
    fn test_required_children_covered_by_array_match() {
        let flat = flatten(&json!({
            "required": ["commands"],
            "properties": {
                "commands": {
                    "type": "array",
                    "items": {"required": ["c1"], "properties": {"c1": {"type": "string"}}}
                }
            }
        }))
        .unwrap();
        let present = match_record(&json!({"commands": [{"c1": "x"}]}), &flat);
        assert!(present.missing_required_keys.is_empty());

        let absent = match_record(&json!({}), &flat);
        assert_eq!(absent.missing_required_keys, vec!["commands[]"]);
    }
}
