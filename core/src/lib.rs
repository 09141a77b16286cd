//! Core types for mapping front-matter metadata onto declared schemas.
//!
//! This crate defines the data model shared by the resolution, matching and
//! rendering engine and by the aggregation pipeline:
//!
//! - [`SchemaNode`]: typed view of a dereferenced schema tree.
//! - [`SchemaProperty`] / [`FlatSchema`]: flattened schema entries plus
//!   derivation rules and repeatable-part markers.
//! - [`MatchResult`] / [`MatchOutcome`]: fuzzy matcher output.
//! - [`Command`] / [`Registry`]: per-document and aggregated results.
//! - [`PropertyPath`]: the dot/bracket path notation with nested
//!   [`get_path`] / [`set_path`] helpers.
//! - [`ExtensionKeys`]: configurable names of the schema extension markers.
//!
//! Raw trees (schemas, metadata, templates) are [`serde_json::Value`]s.
//! Nothing in this crate performs I/O.
//!
//! # Example
//!
//! ```
//! use frontmatter_schema_core::*;
//! use serde_json::json;
//!
//! let schema = SchemaNode::from_value(&json!({
//!     "type": "object",
//!     "properties": {"c1": {"type": "string"}}
//! }))
//! .unwrap();
//! assert_eq!(schema.properties["c1"].declared_type(), "string");
//!
//! let mut record = json!({});
//! set_path(&mut record, &PropertyPath::parse("options.input[]"), json!(["file"])).unwrap();
//! assert_eq!(record, json!({"options": {"input": ["file"]}}));
//! ```

mod error;
mod path;
mod registry;
mod types;
mod validate;

pub use error::{Result, SchemaError};
pub use path::{
    MAX_ARRAY_LEN, PathSegment, PropertyPath, collect_path, get_path, set_path, value_type_name,
};
pub use registry::{Registry, RegistryMetadata};
pub use types::*;
pub use validate::{RegistryValidationError, validate_registry};
