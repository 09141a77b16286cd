//! Schema resolution and metadata mapping.
//!
//! This crate turns loosely authored front-matter metadata into
//! schema-shaped records:
//!
//! 1. [`resolve`]: dereferences `$ref` pointers with cycle detection and a
//!    per-instance fragment cache.
//! 2. [`flatten`]: walks a resolved schema into `(path, type, required)`
//!    entries plus derivation rules and repeatable-part markers.
//! 3. [`matcher`]: fuzzy-matches flattened metadata against those entries
//!    by hierarchy overlap, name similarity and a hard type gate.
//! 4. [`template`]: renders `{path}` placeholders and `{@path}` array
//!    expansion markers against a data record.
//! 5. [`derive`]: evaluates derived fields such as the sorted set of
//!    categories across all commands.
//!
//! Everything except [`resolve::FragmentLoader`] implementations is pure
//! computation over [`serde_json::Value`] trees.
//!
//! # Example
//!
//! ```
//! use frontmatter_schema_engine::{
//!     flatten::flatten, matcher::match_record, resolve::Resolver,
//!     template::{RenderOptions, render},
//! };
//! use serde_json::json;
//!
//! let mut resolver = Resolver::in_memory()
//!     .with_fragment("tags.json", json!({"type": "array", "items": {"type": "string"}}));
//! let schema = resolver
//!     .resolve(
//!         &json!({"properties": {"title": {"type": "string"}, "tags": {"$ref": "tags.json"}}}),
//!         "command.json",
//!     )
//!     .unwrap();
//!
//! let flat = flatten(&schema).unwrap();
//! let outcome = match_record(&json!({"titel": "Hello", "tags": ["a", "b"]}), &flat);
//!
//! let rendered = render(
//!     &json!({"name": "{title}", "labels": "{tags}"}),
//!     &outcome.mapped_record,
//!     &RenderOptions::default(),
//! )
//! .unwrap();
//! assert_eq!(rendered, json!({"name": "Hello", "labels": ["a", "b"]}));
//! ```

pub mod derive;
pub mod flatten;
pub mod matcher;
pub mod resolve;
pub mod template;
