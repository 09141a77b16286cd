use std::collections::{HashMap, HashSet};

use frontmatter_schema_core::{FlatSchema, PropertyPath, Result, SchemaError, get_path};
use frontmatter_schema_engine::derive::apply_derivations;
use frontmatter_schema_engine::flatten::flatten;
use frontmatter_schema_engine::matcher::{match_record, type_compatible};
use frontmatter_schema_engine::resolve::{FragmentLoader, Resolver, contains_reference};
use frontmatter_schema_engine::template::{RenderOptions, render, unresolved_placeholders};
use serde_json::{Value, json};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct MapLoader {
    documents: HashMap<String, Value>,
}

impl MapLoader {
    fn new(documents: &[(&str, Value)]) -> Self {
        Self {
            documents: documents
                .iter()
                .map(|(location, value)| (location.to_string(), value.clone()))
                .collect(),
        }
    }
}

impl FragmentLoader for MapLoader {
    fn load(&self, location: &str) -> Result<Value> {
        self.documents
            .get(location)
            .cloned()
            .ok_or_else(|| SchemaError::NotFound {
                reference: location.to_string(),
            })
    }
}

fn command_schema_documents() -> MapLoader {
    MapLoader::new(&[
        (
            "schemas/command.json",
            json!({
                "type": "object",
                "required": ["c1", "c2", "c3"],
                "properties": {
                    "c1": {"$ref": "common/identifier.json", "description": "Category"},
                    "c2": {"$ref": "common/identifier.json", "description": "Layer"},
                    "c3": {"$ref": "common/identifier.json", "description": "Directive"},
                    "title": {"type": "string"},
                    "options": {"$ref": "common/options.json#/definitions/options"}
                }
            }),
        ),
        ("schemas/common/identifier.json", json!({"type": "string"})),
        (
            "schemas/common/options.json",
            json!({
                "definitions": {
                    "options": {
                        "type": "object",
                        "properties": {
                            "input": {"type": "array", "items": {"type": "string"}},
                            "adaptation": {"type": "boolean"}
                        }
                    }
                }
            }),
        ),
    ])
}

fn resolved_command_schema() -> FlatSchema {
    let loader = command_schema_documents();
    let mut resolver = Resolver::new(&loader);
    let schema = resolver.resolve_location("schemas/command.json").unwrap();
    assert!(!contains_reference(&schema));
    flatten(&schema).unwrap()
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

#[test]
fn test_external_references_resolve_and_flatten() {
    let flat = resolved_command_schema();
    let paths: Vec<&str> = flat.properties.iter().map(|p| p.path.as_str()).collect();
    assert_eq!(
        paths,
        vec!["c1", "c2", "c3", "options.adaptation", "options.input[]", "title"]
    );
    assert_eq!(flat.find("c2").unwrap().description.as_deref(), Some("Layer"));
    assert_eq!(flat.required_paths().collect::<Vec<_>>(), vec!["c1", "c2", "c3"]);
}

#[test]
fn test_transitive_cycle_is_reported() {
    let loader = MapLoader::new(&[
        ("a.json", json!({"properties": {"b": {"$ref": "b.json"}}})),
        ("b.json", json!({"properties": {"a": {"$ref": "a.json"}}})),
    ]);
    let err = Resolver::new(&loader).resolve_location("a.json").unwrap_err();
    match err {
        SchemaError::CircularReference { reference, chain } => {
            assert_eq!(reference, "a.json");
            assert_eq!(chain, vec!["a.json", "b.json"]);
        }
        other => panic!("expected CircularReference, got {other:?}"),
    }
}

#[test]
fn test_internal_pointer_is_not_supported() {
    let err = Resolver::in_memory()
        .resolve(&json!({"properties": {"x": {"$ref": "#/definitions/x"}}}), "root.json")
        .unwrap_err();
    assert_eq!(
        err,
        SchemaError::NotSupported {
            reference: "#/definitions/x".to_string()
        }
    );
}

#[test]
fn test_flattened_paths_are_unique() {
    let flat = flatten(&json!({
        "properties": {
            "commands": {
                "type": "array",
                "items": {
                    "properties": {
                        "c1": {"type": "string"},
                        "options": {"properties": {"input": {"type": "array"}}}
                    }
                }
            },
            "c1": {"type": "string"}
        }
    }))
    .unwrap();
    let unique: HashSet<&str> = flat.properties.iter().map(|p| p.path.as_str()).collect();
    assert_eq!(unique.len(), flat.properties.len());
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

#[test]
fn test_typo_and_array_scenario() {
    let flat = flatten(&json!({
        "properties": {
            "title": {"type": "string"},
            "tags": {"type": "array", "items": {"type": "string"}}
        }
    }))
    .unwrap();

    let outcome = match_record(&json!({"titel": "Hello", "tags": ["a", "b"]}), &flat);

    let titel = outcome.matches.iter().find(|m| m.path == "titel").unwrap();
    assert_eq!(titel.matched_property, "title");
    assert!(titel.confidence > 0.3);
    let tags = outcome.matches.iter().find(|m| m.path == "tags[]").unwrap();
    assert_eq!(tags.matched_property, "tags[]");
    assert_eq!(outcome.mapped_record, json!({"title": "Hello", "tags": ["a", "b"]}));
}

#[test]
fn test_type_gate_holds_for_every_accepted_match() {
    let flat = resolved_command_schema();
    let records = [
        json!({"c1": 1, "c2": true, "c3": null, "title": ["x"]}),
        json!({"c1": "git", "options": {"input": "not-an-array", "adaptation": "yes"}}),
        json!({"c1": "git", "c2": "x", "c3": "y", "options": {"input": ["a"], "adaptation": false}}),
        json!({"opts": {"inpt": ["a"]}, "titl": 3}),
    ];

    for record in &records {
        let outcome = match_record(record, &flat);
        for accepted in &outcome.matches {
            let kind = &flat.find(&accepted.matched_property).unwrap().kind;
            assert!(
                type_compatible(&accepted.value, kind),
                "{} -> {} ({kind})",
                accepted.path,
                accepted.matched_property
            );
            assert!(accepted.confidence > 0.3);
        }
    }
}

#[test]
fn test_missing_required_is_advisory() {
    let flat = resolved_command_schema();
    let outcome = match_record(&json!({"title": "Only a title"}), &flat);
    assert_eq!(outcome.missing_required_keys, vec!["c1", "c2", "c3"]);
    assert_eq!(outcome.mapped_record, json!({"title": "Only a title"}));
}

#[test]
fn test_every_match_is_visible_in_mapped_record() {
    let flat = flatten(&json!({
        "properties": {
            "steps": {
                "type": "array",
                "items": {"properties": {"name": {"type": "string"}}}
            },
            "name": {"type": "string"}
        }
    }))
    .unwrap();
    let records = [
        json!({"steps": [{"name": "a"}], "stepz": [{"name": "b"}]}),
        json!({"steps": [{"name": "a"}, {"name": "b"}], "name": "top"}),
        json!({"stepz": [{"name": "x"}], "steps": [{"name": "y"}], "nam": 3}),
    ];

    for record in &records {
        let outcome = match_record(record, &flat);
        for result in &outcome.matches {
            let indices = PropertyPath::parse(&result.path).indices();
            let target = PropertyPath::parse(&result.matched_property).bind_indices(&indices);
            assert_eq!(
                get_path(&outcome.mapped_record, &target),
                Some(&result.value),
                "{} was overwritten in {}",
                result.path,
                outcome.mapped_record
            );
        }
    }

    let outcome = match_record(&records[0], &flat);
    assert_eq!(outcome.mapped_record, json!({"steps": [{"name": "a"}]}));
    assert_eq!(outcome.unmatched_keys, vec!["stepz[]"]);
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

#[test]
fn test_placeholder_round_trip_reproduces_values() {
    let flat = resolved_command_schema();
    let outcome = match_record(
        &json!({"c1": "git", "c2": "create", "c3": "branch", "options": {"input": ["name"], "adaptation": true}}),
        &flat,
    );
    let template = json!({
        "c1": "{c1}",
        "c2": "{c2}",
        "c3": "{c3}",
        "options": {"input": "{options.input}", "adaptation": "{options.adaptation}"}
    });

    let rendered = render(&template, &outcome.mapped_record, &RenderOptions::default()).unwrap();
    assert!(unresolved_placeholders(&rendered).is_empty());
    for path in ["c1", "c2", "c3", "options.input", "options.adaptation"] {
        let path = frontmatter_schema_core::PropertyPath::parse(path);
        assert_eq!(get_path(&rendered, &path), get_path(&outcome.mapped_record, &path));
    }
}

#[test]
fn test_items_marker_expands_per_item() {
    let rendered = render(
        &json!({"items": ["{@items}"]}),
        &json!({"items": [{"x": 1}, {"x": 2}]}),
        &RenderOptions::default(),
    )
    .unwrap();
    assert_eq!(rendered["items"].as_array().unwrap().len(), 2);
    assert_eq!(rendered, json!({"items": [{"x": 1}, {"x": 2}]}));
}

#[test]
fn test_registry_template_with_derivations() {
    let registry_schema = flatten(&json!({
        "x-template": "registry_template.json",
        "properties": {
            "version": {"type": "string"},
            "tools": {
                "properties": {
                    "availableConfigs": {
                        "type": "array",
                        "items": {"type": "string"},
                        "x-derived-from": "commands[].c1",
                        "x-derived-unique": true
                    },
                    "commands": {"type": "array", "x-frontmatter-part": true}
                }
            }
        }
    }))
    .unwrap();

    let mut data = json!({
        "version": "1.0.0",
        "commands": [
            {"c1": "spec", "c2": "analyze", "c3": "quality"},
            {"c1": "git", "c2": "create", "c3": "branch"},
            {"c1": "git", "c2": "merge", "c3": "branch"}
        ]
    });
    apply_derivations(&registry_schema, &mut data).unwrap();

    let item_template = json!({"id": "{c1}/{c2}/{c3}"});
    let rendered = render(
        &json!({
            "version": "{version}",
            "tools": {
                "availableConfigs": "{tools.availableConfigs}",
                "commands": ["{@commands}"]
            }
        }),
        &data,
        &RenderOptions {
            item_template: Some(&item_template),
            ..RenderOptions::default()
        },
    )
    .unwrap();

    assert_eq!(
        rendered,
        json!({
            "version": "1.0.0",
            "tools": {
                "availableConfigs": ["git", "spec"],
                "commands": [
                    {"id": "spec/analyze/quality"},
                    {"id": "git/create/branch"},
                    {"id": "git/merge/branch"}
                ]
            }
        })
    );
}
