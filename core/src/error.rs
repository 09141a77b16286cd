//! Error taxonomy shared by the resolver, flattener and renderer.
//!
//! Expected terminal outcomes of a pipeline run (a document without front
//! matter, an empty command list, ...) are not errors and live in the
//! pipeline's outcome enums instead.

use thiserror::Error;

/// Failures raised while resolving, flattening or rendering schema trees.
///
/// Each variant carries enough context (reference string, path) to act on
/// without an underlying trace.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Structurally wrong input, e.g. a non-object schema root.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// A reference target is already on the active resolution stack.
    #[error("circular reference to '{reference}' (chain: {})", chain.join(" -> "))]
    CircularReference {
        /// The reference that closed the cycle.
        reference: String,
        /// References on the stack when the cycle was detected, outermost first.
        chain: Vec<String>,
    },

    /// The referenced fragment does not exist.
    #[error("referenced fragment not found: {reference}")]
    NotFound { reference: String },

    /// The reference form is recognized but not supported (internal `#/...`
    /// pointers).
    #[error("unsupported reference: {reference}")]
    NotSupported { reference: String },

    /// The referenced fragment exists but could not be parsed.
    #[error("failed to parse '{reference}': {reason}")]
    ParseError { reference: String, reason: String },

    /// A nested write hit an intermediate value that is not a container.
    #[error("type conflict at '{path}': existing {found} value is not a container")]
    TypeConflict {
        /// Path prefix that holds the conflicting value.
        path: String,
        /// JSON type name of the value found there.
        found: String,
    },

    /// A write addressed an array index beyond the padding limit.
    #[error("array index {index} at '{path}' exceeds the limit of {limit}")]
    IndexOutOfRange {
        /// Path of the array being written.
        path: String,
        index: usize,
        limit: usize,
    },

    /// Strict array expansion found no array at the marker's data path.
    #[error("array expansion marker has no array data at '{path}'")]
    MissingArrayData { path: String },
}

/// Convenience alias for results with [`SchemaError`].
pub type Result<T> = std::result::Result<T, SchemaError>;
