//! Two-stage aggregation of front-matter documents into a registry.
//!
//! This crate wraps the pure engine with everything that touches the outside
//! world: YAML configuration, filesystem fragment loading with fallback
//! roots, document discovery and front-matter splitting, the parallel
//! Stage-1 / Stage-2 orchestrator, and output formatting.
//!
//! # Quick start
//!
//! ```no_run
//! use std::path::Path;
//!
//! use frontmatter_schema_pipeline::{
//!     OutputFormat, PipelineConfig, PipelineOutcome, build_registry, format_value,
//! };
//!
//! let config = PipelineConfig::load("registry.yml").unwrap();
//! if let PipelineOutcome::Success { output, discarded, .. } =
//!     build_registry(&config, Path::new("."), None).unwrap()
//! {
//!     println!("{}", format_value(&output, OutputFormat::Yaml).unwrap());
//!     for failure in discarded {
//!         eprintln!("skipped {failure}");
//!     }
//! }
//! ```
//!
//! # Feature flags
//!
//! - **`clap`** (default): derives `clap::ValueEnum` for [`OutputFormat`].

mod config;
mod error;
mod frontmatter;
mod loader;
mod orchestrator;
mod output;
mod runner;

pub use config::{
    DocumentsConfig, ExecutionConfig, IdentifierConfig, OutputConfig, PipelineConfig,
    PolicyConfig, RegistryConfig,
};
pub use error::{PipelineError, Result, Stage2Error};
pub use frontmatter::{FrontMatter, split_front_matter};
pub use loader::{
    DocumentInput, FsFragmentLoader, LoaderBuilder, discover_documents, parse_structured,
    read_structured,
};
pub use orchestrator::{
    DEFAULT_ITEMS_KEY, DocumentOutcome, Pipeline, PipelineOutcome, PipelineSettings,
    PipelineState,
};
pub use output::{OutputFormat, format_value, write_value};
pub use runner::build_registry;
