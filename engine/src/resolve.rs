//! `$ref` dereferencing with cycle detection and a per-instance cache.
//!
//! A [`Resolver`] walks a raw schema tree and replaces every object carrying
//! a `$ref` key with the referenced fragment, merged with the object's
//! sibling keys (siblings win on collision). Fragments come from in-memory
//! trees registered with [`Resolver::with_fragment`] or from an injected
//! [`FragmentLoader`].
//!
//! Reference forms:
//!
//! - `common.json`, `../shared/ids.yaml`: external fragment, resolved
//!   relative to the directory of the current location.
//! - `common.json#/definitions/id`: external fragment, then JSON pointer.
//! - `#/definitions/id`: internal pointer; rejected with
//!   [`SchemaError::NotSupported`].
//!
//! The cache and the cycle-detection stack belong to one resolver instance.
//! Create a fresh resolver per pipeline run (or per document when documents
//! are processed in parallel).
//!
//! # Example
//!
//! ```
//! use frontmatter_schema_engine::resolve::Resolver;
//! use serde_json::json;
//!
//! let mut resolver = Resolver::in_memory()
//!     .with_fragment("schemas/id.json", json!({"type": "string"}));
//!
//! let resolved = resolver
//!     .resolve(
//!         &json!({"properties": {"id": {"$ref": "id.json", "description": "Identifier"}}}),
//!         "schemas/command.json",
//!     )
//!     .unwrap();
//! assert_eq!(
//!     resolved,
//!     json!({"properties": {"id": {"type": "string", "description": "Identifier"}}})
//! );
//! ```

use std::collections::HashMap;

use frontmatter_schema_core::{Result, SchemaError, value_type_name};
use serde_json::{Map, Value};
use tracing::debug;

/// Key marking a reference object.
pub const REF_KEY: &str = "$ref";

/// Source of external schema fragments.
///
/// `location` is already joined against the referencing document's location
/// and normalized. Implementations report a missing fragment as
/// [`SchemaError::NotFound`] and unparseable content as
/// [`SchemaError::ParseError`].
pub trait FragmentLoader: Send + Sync {
    fn load(&self, location: &str) -> Result<Value>;
}

/// Dereferences `$ref` pointers inside schema trees.
pub struct Resolver<'a> {
    loader: Option<&'a dyn FragmentLoader>,
    fragments: HashMap<String, Value>,
    cache: HashMap<String, Value>,
    stack: Vec<String>,
}

impl<'a> Resolver<'a> {
    /// Creates a resolver that loads external fragments through `loader`.
    pub fn new(loader: &'a dyn FragmentLoader) -> Self {
        Self {
            loader: Some(loader),
            fragments: HashMap::new(),
            cache: HashMap::new(),
            stack: Vec::new(),
        }
    }

    /// Creates a resolver that only sees fragments registered with
    /// [`with_fragment`](Self::with_fragment).
    pub fn in_memory() -> Self {
        Self {
            loader: None,
            fragments: HashMap::new(),
            cache: HashMap::new(),
            stack: Vec::new(),
        }
    }

    /// Registers an in-memory fragment under `location`. Registered
    /// fragments take precedence over the loader.
    pub fn with_fragment(mut self, location: impl Into<String>, fragment: Value) -> Self {
        self.fragments
            .insert(normalize_location(&location.into()), fragment);
        self
    }

    /// Number of resolved fragments held in the cache.
    pub fn cached_fragments(&self) -> usize {
        self.cache.len()
    }

    /// Loads the fragment at `location` and resolves it. The location itself
    /// is on the resolution stack, so a fragment referring back to its root
    /// document is reported as circular.
    ///
    /// # Errors
    ///
    /// Same as [`resolve`](Self::resolve), plus the loader's errors for the
    /// root fragment.
    pub fn resolve_location(&mut self, location: &str) -> Result<Value> {
        let key = normalize_location(location);
        self.stack.push(key.clone());
        let result = self
            .fetch(&key)
            .and_then(|raw| self.resolve(&raw, &key));
        self.stack.pop();
        result
    }

    /// Resolves every reference inside `node`. `location` is the location of
    /// the document `node` came from, used to resolve relative references.
    ///
    /// # Errors
    ///
    /// - [`SchemaError::CircularReference`] when a reference target is
    ///   already being resolved.
    /// - [`SchemaError::NotSupported`] for internal `#/...` pointers.
    /// - [`SchemaError::NotFound`] / [`SchemaError::ParseError`] from
    ///   fragment loading or pointer navigation.
    /// - [`SchemaError::InvalidFormat`] for a non-string `$ref`, or sibling
    ///   keys next to a reference that resolves to a non-object.
    pub fn resolve(&mut self, node: &Value, location: &str) -> Result<Value> {
        match node {
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve(item, location))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Value::Object(map) => match map.get(REF_KEY) {
                Some(reference) => self.resolve_reference_node(map, reference, location),
                None => {
                    let mut resolved = Map::with_capacity(map.len());
                    for (key, child) in map {
                        resolved.insert(key.clone(), self.resolve(child, location)?);
                    }
                    Ok(Value::Object(resolved))
                }
            },
            other => Ok(other.clone()),
        }
    }

    fn resolve_reference_node(
        &mut self,
        map: &Map<String, Value>,
        reference: &Value,
        location: &str,
    ) -> Result<Value> {
        let Some(reference) = reference.as_str() else {
            return Err(SchemaError::InvalidFormat(format!(
                "{REF_KEY} must be a string, found {}",
                value_type_name(reference)
            )));
        };

        let target = self.resolve_reference(reference, location)?;

        let mut siblings = Map::new();
        for (key, child) in map.iter().filter(|(key, _)| key.as_str() != REF_KEY) {
            siblings.insert(key.clone(), self.resolve(child, location)?);
        }

        merge_siblings(target, siblings, reference)
    }

    fn resolve_reference(&mut self, reference: &str, location: &str) -> Result<Value> {
        if reference.starts_with('#') {
            return Err(SchemaError::NotSupported {
                reference: reference.to_string(),
            });
        }

        let (document, pointer) = match reference.split_once('#') {
            Some((document, pointer)) => (document, Some(pointer)),
            None => (reference, None),
        };
        let document_key = join_location(location, document);
        let key = match pointer {
            Some(pointer) => format!("{document_key}#{pointer}"),
            None => document_key.clone(),
        };

        if self.stack.contains(&key) {
            return Err(SchemaError::CircularReference {
                reference: key,
                chain: self.stack.clone(),
            });
        }

        if let Some(cached) = self.cache.get(&key) {
            debug!(reference = %key, "Schema fragment cache hit");
            return Ok(cached.clone());
        }

        self.stack.push(key.clone());
        let result = self.load_and_resolve(&document_key, pointer, &key);
        self.stack.pop();
        let resolved = result?;

        self.cache.insert(key, resolved.clone());
        Ok(resolved)
    }

    fn load_and_resolve(
        &mut self,
        document_key: &str,
        pointer: Option<&str>,
        key: &str,
    ) -> Result<Value> {
        debug!(reference = %key, depth = self.stack.len(), "Resolving schema fragment");
        let raw = self.fetch(document_key)?;
        let target = match pointer {
            Some(pointer) if !pointer.is_empty() => {
                raw.pointer(pointer)
                    .cloned()
                    .ok_or_else(|| SchemaError::NotFound {
                        reference: key.to_string(),
                    })?
            }
            _ => raw,
        };
        self.resolve(&target, document_key)
    }

    fn fetch(&self, location: &str) -> Result<Value> {
        if let Some(fragment) = self.fragments.get(location) {
            return Ok(fragment.clone());
        }
        match self.loader {
            Some(loader) => loader.load(location),
            None => Err(SchemaError::NotFound {
                reference: location.to_string(),
            }),
        }
    }
}

fn merge_siblings(target: Value, siblings: Map<String, Value>, reference: &str) -> Result<Value> {
    if siblings.is_empty() {
        return Ok(target);
    }
    match target {
        Value::Object(mut merged) => {
            for (key, value) in siblings {
                merged.insert(key, value);
            }
            Ok(Value::Object(merged))
        }
        other => Err(SchemaError::InvalidFormat(format!(
            "reference '{reference}' resolved to {} but has sibling keys",
            value_type_name(&other)
        ))),
    }
}

/// `true` when any object in `value` still carries a `$ref` key.
pub fn contains_reference(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.contains_key(REF_KEY) || map.values().any(contains_reference),
        Value::Array(items) => items.iter().any(contains_reference),
        _ => false,
    }
}

/// Joins `reference` against the directory of `base` and normalizes the
/// result. Absolute paths and URLs are only normalized.
///
/// ```
/// use frontmatter_schema_engine::resolve::join_location;
///
/// assert_eq!(join_location("schemas/command.json", "common/id.json"), "schemas/common/id.json");
/// assert_eq!(join_location("schemas/command.json", "../shared/id.json"), "shared/id.json");
/// assert_eq!(join_location("", "id.json"), "id.json");
/// assert_eq!(join_location("schemas/a.json", "/abs/b.json"), "/abs/b.json");
/// ```
pub fn join_location(base: &str, reference: &str) -> String {
    if reference.starts_with('/') || reference.contains("://") {
        return normalize_location(reference);
    }
    let directory = match base.rfind('/') {
        Some(pos) => &base[..pos],
        None => "",
    };
    if directory.is_empty() {
        normalize_location(reference)
    } else {
        normalize_location(&format!("{directory}/{reference}"))
    }
}

fn normalize_location(location: &str) -> String {
    let (scheme, rest) = match location.find("://") {
        Some(pos) => location.split_at(pos + 3),
        None => ("", location),
    };
    let absolute = rest.starts_with('/');

    let mut parts: Vec<&str> = Vec::new();
    for part in rest.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(last) if *last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    if absolute {
        format!("{scheme}/{joined}")
    } else {
        format!("{scheme}{joined}")
    }
}
