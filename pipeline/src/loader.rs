//! Filesystem access: schema fragments, structured files and documents.
//!
//! [`FsFragmentLoader`] serves `$ref` targets from one or more root
//! directories tried in order, so a project can override shared fragments:
//!
//! ```no_run
//! use frontmatter_schema_pipeline::FsFragmentLoader;
//!
//! let loader = FsFragmentLoader::builder()
//!     .root("project/schemas")
//!     .root("/usr/share/frontmatter-schemas")
//!     .build()
//!     .unwrap();
//! ```

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use frontmatter_schema_core::SchemaError;
use frontmatter_schema_engine::resolve::FragmentLoader;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::frontmatter::{FrontMatter, split_front_matter};

/// Parses structured text by the extension of `location`: YAML for
/// `.yml`/`.yaml`, TOML for `.toml`, JSON otherwise.
///
/// # Errors
///
/// Returns [`SchemaError::ParseError`] naming `location`.
pub fn parse_structured(location: &str, text: &str) -> std::result::Result<Value, SchemaError> {
    let extension = Path::new(location)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    let parsed = match extension.as_deref() {
        Some("yml" | "yaml") => serde_yaml::from_str(text).map_err(|e| e.to_string()),
        Some("toml") => toml::from_str(text).map_err(|e| e.to_string()),
        _ => serde_json::from_str(text).map_err(|e| e.to_string()),
    };
    parsed.map_err(|reason| SchemaError::ParseError {
        reference: location.to_string(),
        reason,
    })
}

/// Reads and parses a structured (JSON/YAML/TOML) file.
///
/// # Errors
///
/// Returns [`PipelineError::IoError`] when the file cannot be read and
/// [`PipelineError::Schema`] wrapping a parse error otherwise.
pub fn read_structured(path: impl AsRef<Path>) -> Result<Value> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    Ok(parse_structured(&path.to_string_lossy(), &text)?)
}

/// [`FragmentLoader`] reading fragments from root directories.
#[derive(Debug, Clone)]
pub struct FsFragmentLoader {
    roots: Vec<PathBuf>,
}

impl FsFragmentLoader {
    /// Returns a new [`LoaderBuilder`].
    pub fn builder() -> LoaderBuilder {
        LoaderBuilder::new()
    }

    /// Loader with a single root directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            roots: vec![root.into()],
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

impl FragmentLoader for FsFragmentLoader {
    /// Locations are relative to a root and may not climb out of it.
    fn load(&self, location: &str) -> std::result::Result<Value, SchemaError> {
        if escapes_root(Path::new(location)) {
            debug!(location, "Rejecting fragment outside the loader roots");
            return Err(SchemaError::NotSupported {
                reference: location.to_string(),
            });
        }
        for root in &self.roots {
            let candidate = root.join(location);
            if !candidate.is_file() {
                continue;
            }
            debug!(location, path = %candidate.display(), "Loading schema fragment");
            let text = std::fs::read_to_string(&candidate).map_err(|e| SchemaError::ParseError {
                reference: location.to_string(),
                reason: e.to_string(),
            })?;
            return parse_structured(location, &text);
        }
        Err(SchemaError::NotFound {
            reference: location.to_string(),
        })
    }
}

fn escapes_root(location: &Path) -> bool {
    let mut depth = 0usize;
    for component in location.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => match depth.checked_sub(1) {
                Some(parent) => depth = parent,
                None => return true,
            },
            Component::RootDir | Component::Prefix(_) => return true,
        }
    }
    false
}

/// Builder for an [`FsFragmentLoader`] with a fallback chain of roots.
///
/// Roots are tried in the order they are added; the first one containing the
/// requested fragment wins.
pub struct LoaderBuilder {
    roots: Vec<PathBuf>,
}

impl LoaderBuilder {
    /// Creates a new builder with no roots.
    pub fn new() -> Self {
        Self { roots: Vec::new() }
    }

    /// Adds a root directory.
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.roots.push(path.into());
        self
    }

    /// Builds the loader.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] when no root was added.
    pub fn build(self) -> Result<FsFragmentLoader> {
        if self.roots.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "no fragment roots configured".to_string(),
            ));
        }
        Ok(FsFragmentLoader { roots: self.roots })
    }
}

impl Default for LoaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Expands `include` glob patterns relative to `base_dir`, drops matches of
/// `exclude`, and returns the files sorted and deduplicated.
///
/// # Errors
///
/// Returns [`PipelineError::PatternError`] for a malformed pattern.
pub fn discover_documents(
    base_dir: &Path,
    include: &[String],
    exclude: &[String],
) -> Result<Vec<PathBuf>> {
    let excluded = exclude
        .iter()
        .map(|pattern| glob::Pattern::new(&anchor(base_dir, pattern)))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut found = BTreeSet::new();
    for pattern in include {
        for entry in glob::glob(&anchor(base_dir, pattern))? {
            let Ok(path) = entry else {
                continue;
            };
            if path.is_file() && !excluded.iter().any(|skip| skip.matches_path(&path)) {
                found.insert(path);
            }
        }
    }

    debug!(count = found.len(), base = %base_dir.display(), "Discovered documents");
    Ok(found.into_iter().collect())
}

fn anchor(base_dir: &Path, pattern: &str) -> String {
    if Path::new(pattern).is_absolute() {
        pattern.to_string()
    } else {
        base_dir.join(pattern).to_string_lossy().into_owned()
    }
}

/// A document handed to Stage 1.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentInput {
    /// Display path, relative to the project directory when possible.
    pub path: String,
    pub raw_content: String,
    pub metadata: FrontMatter,
}

impl DocumentInput {
    /// Builds a document from in-memory content.
    pub fn from_content(path: impl Into<String>, raw_content: impl Into<String>) -> Self {
        let raw_content = raw_content.into();
        let metadata = split_front_matter(&raw_content);
        Self {
            path: path.into(),
            raw_content,
            metadata,
        }
    }

    /// Reads a document from disk. The display path is `path` relative to
    /// `base_dir`, with `/` separators.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::IoError`] when the file cannot be read.
    pub fn read(path: &Path, base_dir: &Path) -> Result<Self> {
        let raw_content = std::fs::read_to_string(path)?;
        Ok(Self::from_content(display_path(path, base_dir), raw_content))
    }

    /// Like [`read`](Self::read), but a file that cannot be read (missing,
    /// unreadable, not UTF-8) becomes a document with invalid front matter,
    /// so it fails on its own in Stage 1.
    pub fn load(path: &Path, base_dir: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw_content) => Self::from_content(display_path(path, base_dir), raw_content),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Cannot read document");
                Self {
                    path: display_path(path, base_dir),
                    raw_content: String::new(),
                    metadata: FrontMatter::Invalid {
                        reason: format!("cannot read document: {err}"),
                    },
                }
            }
        }
    }
}

fn display_path(path: &Path, base_dir: &Path) -> String {
    let relative = path.strip_prefix(base_dir).unwrap_or(path);
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
