//! Config-driven registry builds.

use std::path::{Component, Path, PathBuf};

use tracing::info;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::loader::{DocumentInput, FsFragmentLoader, discover_documents, read_structured};
use crate::orchestrator::{Pipeline, PipelineOutcome, PipelineSettings};

/// Runs the pipeline described by `config`.
///
/// Relative paths in `config` are resolved against `base_dir` (normally the
/// configuration file's directory). Schemas are loaded through an
/// [`FsFragmentLoader`] rooted there; explicitly configured templates are
/// read up front. `generated_at` pins the registry timestamp.
///
/// # Errors
///
/// Returns a [`PipelineError`](crate::PipelineError) when a pattern is
/// malformed or a configured template cannot be read. Per-document failures,
/// unreadable documents included, are part of the returned
/// [`PipelineOutcome`].
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
///
/// use frontmatter_schema_pipeline::{PipelineConfig, PipelineOutcome, build_registry};
///
/// let config = PipelineConfig::load("registry.yml").unwrap();
/// match build_registry(&config, Path::new("."), None).unwrap() {
///     PipelineOutcome::Success { registry, .. } => {
///         println!("{} commands", registry.command_count());
///     }
///     other => eprintln!("build stopped: {:?}", other.state()),
/// }
/// ```
pub fn build_registry(
    config: &PipelineConfig,
    base_dir: &Path,
    generated_at: Option<String>,
) -> Result<PipelineOutcome> {
    let paths = discover_documents(base_dir, &config.documents.include, &config.documents.exclude)?;
    let documents: Vec<DocumentInput> = paths
        .iter()
        .map(|path| DocumentInput::load(path, base_dir))
        .collect();
    info!(documents = documents.len(), "Loaded documents");

    let read_optional = |path: &Option<PathBuf>| -> Result<_> {
        path.as_ref()
            .map(|path| read_structured(base_dir.join(path)))
            .transpose()
    };

    let mut roots = vec![base_dir.to_path_buf()];
    let schema_location = anchor(base_dir, &config.schema, &mut roots);
    let registry_schema_location = config
        .registry
        .schema
        .as_deref()
        .map(|path| anchor(base_dir, path, &mut roots));

    let settings = PipelineSettings {
        schema_location,
        template: read_optional(&config.template)?,
        item_template: read_optional(&config.item_template)?,
        registry_schema_location,
        registry_template: read_optional(&config.registry.template)?,
        identifiers: config.identifiers.clone(),
        policy: config.policy,
        extensions: config.extensions.clone(),
        jobs: config.execution.jobs,
        generated_at,
    };

    let loader = roots
        .into_iter()
        .fold(FsFragmentLoader::builder(), |builder, root| builder.root(root))
        .build()?;
    let mut pipeline = Pipeline::new(&loader, settings);
    pipeline.run(&documents)
}

/// Fragments may not leave their loader roots, so a configured schema outside
/// `base_dir` gets its own directory as an extra root.
fn anchor(base_dir: &Path, path: &Path, roots: &mut Vec<PathBuf>) -> String {
    let outside = path
        .components()
        .any(|part| !matches!(part, Component::Normal(_) | Component::CurDir));
    let full = base_dir.join(path);
    if let (true, Some(parent), Some(name)) = (outside, full.parent(), full.file_name()) {
        if !roots.iter().any(|root| root == parent) {
            roots.push(parent.to_path_buf());
        }
        return name.to_string_lossy().into_owned();
    }
    location(path)
}

fn location(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
