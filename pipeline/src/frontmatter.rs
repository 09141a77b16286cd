//! Front-matter extraction from text documents.
//!
//! A document carries front matter when its first line is a `---` (YAML) or
//! `+++` (TOML) delimiter and a later line repeats the same delimiter. The
//! block between them must parse to a mapping.

use serde_json::Value;

use frontmatter_schema_core::value_type_name;

/// Parsed metadata block of one document.
#[derive(Debug, Clone, PartialEq)]
pub enum FrontMatter {
    /// A well-formed block, always an object.
    Present(Value),
    /// The document has no block.
    NotPresent,
    /// The block exists but does not parse to a mapping.
    Invalid { reason: String },
}

#[derive(Clone, Copy)]
enum Syntax {
    Yaml,
    Toml,
}

/// Splits the leading metadata block off `raw` and parses it.
///
/// # Examples
///
/// ```
/// use frontmatter_schema_pipeline::{FrontMatter, split_front_matter};
/// use serde_json::json;
///
/// let doc = "---\nc1: git\ntags: [a, b]\n---\n# Body\n";
/// assert_eq!(
///     split_front_matter(doc),
///     FrontMatter::Present(json!({"c1": "git", "tags": ["a", "b"]}))
/// );
///
/// assert_eq!(split_front_matter("# Just a heading\n"), FrontMatter::NotPresent);
/// ```
pub fn split_front_matter(raw: &str) -> FrontMatter {
    let text = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let mut lines = text.split_inclusive('\n');

    let Some(first) = lines.next() else {
        return FrontMatter::NotPresent;
    };
    let (delimiter, syntax) = match first.trim_end() {
        "---" => ("---", Syntax::Yaml),
        "+++" => ("+++", Syntax::Toml),
        _ => return FrontMatter::NotPresent,
    };

    let mut block = String::new();
    let mut closed = false;
    for line in lines {
        if line.trim_end() == delimiter {
            closed = true;
            break;
        }
        block.push_str(line);
    }
    if !closed {
        return FrontMatter::Invalid {
            reason: format!("front matter opened with '{delimiter}' is never closed"),
        };
    }

    let parsed = match syntax {
        Syntax::Yaml => serde_yaml::from_str::<Value>(&block).map_err(|e| e.to_string()),
        Syntax::Toml => toml::from_str::<Value>(&block).map_err(|e| e.to_string()),
    };

    match parsed {
        Ok(Value::Object(map)) => FrontMatter::Present(Value::Object(map)),
        Ok(Value::Null) => FrontMatter::Present(Value::Object(serde_json::Map::new())),
        Ok(other) => FrontMatter::Invalid {
            reason: format!("front matter must be a mapping, found {}", value_type_name(&other)),
        },
        Err(reason) => FrontMatter::Invalid { reason },
    }
}
