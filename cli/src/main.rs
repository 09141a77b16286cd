use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use frontmatter_schema_engine::flatten::flatten;
use frontmatter_schema_engine::matcher::match_record;
use frontmatter_schema_engine::resolve::Resolver;
use frontmatter_schema_engine::template::{RenderOptions, render};
use frontmatter_schema_pipeline::{
    DocumentInput, DocumentOutcome, FrontMatter, FsFragmentLoader, OutputFormat, PipelineConfig,
    PipelineOutcome, build_registry, format_value, read_structured,
};
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "fm-registry", version)]
#[command(about = "Build command registries from front-matter documents and JSON schemas")]
struct Cli {
    /// Enable verbose logging on stderr. Repeat for more detail (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run both pipeline stages and write the registry.
    Build(BuildArgs),
    /// Resolve a schema and print its flattened properties.
    Flatten(FlattenArgs),
    /// Match one document's front matter against a schema.
    Match(MatchArgs),
    /// Render a template against a data file.
    Render(RenderArgs),
}

#[derive(Debug, Args)]
struct BuildArgs {
    /// Pipeline configuration file (YAML).
    #[arg(long)]
    config: PathBuf,
    /// Output file; overrides `output.path` from the configuration.
    #[arg(long)]
    output: Option<PathBuf>,
    /// Output format; overrides `output.format` from the configuration.
    #[arg(long)]
    format: Option<OutputFormat>,
    /// Aggregate the successful documents even when others fail.
    #[arg(long)]
    continue_on_error: bool,
    /// Number of parallel Stage-1 workers.
    #[arg(long)]
    jobs: Option<usize>,
}

#[derive(Debug, Args)]
struct FlattenArgs {
    /// Schema file; `$ref`s resolve relative to its directory.
    #[arg(long)]
    schema: PathBuf,
    /// Output format.
    #[arg(long, default_value = "json")]
    format: OutputFormat,
}

#[derive(Debug, Args)]
struct MatchArgs {
    /// Schema file; `$ref`s resolve relative to its directory.
    #[arg(long)]
    schema: PathBuf,
    /// Document with a front-matter block.
    #[arg(long)]
    document: PathBuf,
    /// Output format.
    #[arg(long, default_value = "json")]
    format: OutputFormat,
}

#[derive(Debug, Args)]
struct RenderArgs {
    /// Template file (JSON, YAML or TOML).
    #[arg(long)]
    template: PathBuf,
    /// Data file (JSON, YAML or TOML).
    #[arg(long)]
    data: PathBuf,
    /// Template applied to each element of an expanded array.
    #[arg(long)]
    item_template: Option<PathBuf>,
    /// Fail when an expansion marker has no array data.
    #[arg(long)]
    require_array_data: bool,
    /// Output format.
    #[arg(long, default_value = "json")]
    format: OutputFormat,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Command::Build(args) => run_build(args),
        Command::Flatten(args) => run_flatten(args),
        Command::Match(args) => run_match(args),
        Command::Render(args) => run_render(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins over `-v` when set.
fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run_build(args: BuildArgs) -> Result<(), String> {
    let mut config = PipelineConfig::load(&args.config)
        .map_err(|err| format!("Failed to load '{}': {err}", args.config.display()))?;
    if args.continue_on_error {
        config.policy.continue_on_error = true;
    }
    if args.jobs.is_some() {
        config.execution.jobs = args.jobs;
    }

    let base_dir = parent_dir(&args.config);
    debug!(base_dir = %base_dir.display(), "Building registry");
    let outcome = build_registry(&config, &base_dir, None).map_err(|e| e.to_string())?;

    match outcome {
        PipelineOutcome::Success {
            registry,
            output,
            discarded,
        } => {
            let target = args
                .output
                .or_else(|| config.output.path.as_ref().map(|path| base_dir.join(path)));
            let format = args
                .format
                .or_else(|| target.as_deref().and_then(OutputFormat::from_path))
                .unwrap_or(config.output.format);
            emit(&output, format, target.as_deref())?;

            report_failures(&discarded);
            eprintln!(
                "Built registry with {} command(s) across {} categories; {} document(s) skipped.",
                registry.command_count(),
                registry.available_configs.len(),
                discarded.len()
            );
            Ok(())
        }
        PipelineOutcome::NoCommands => {
            eprintln!("No documents matched the configured patterns; nothing to build.");
            Ok(())
        }
        PipelineOutcome::AllFailed { failures } => {
            report_failures(&failures);
            Err(format!("all {} document(s) failed", failures.len()))
        }
        PipelineOutcome::Stage1Failed {
            succeeded,
            failures,
        } => {
            report_failures(&failures);
            Err(format!(
                "{} document(s) failed ({succeeded} succeeded); rerun with --continue-on-error to build from the rest",
                failures.len()
            ))
        }
        PipelineOutcome::Stage2Failed { error } => {
            Err(format!("registry aggregation failed: {error}"))
        }
    }
}

fn run_flatten(args: FlattenArgs) -> Result<(), String> {
    let schema = resolve_schema(&args.schema)?;
    let flat = flatten(&schema).map_err(|e| e.to_string())?;
    let value = serde_json::to_value(&flat)
        .map_err(|err| format!("Failed to serialize flattened schema: {err}"))?;
    emit(&value, args.format, None)
}

fn run_match(args: MatchArgs) -> Result<(), String> {
    let schema = resolve_schema(&args.schema)?;
    let flat = flatten(&schema).map_err(|e| e.to_string())?;

    let document = DocumentInput::read(&args.document, &parent_dir(&args.document))
        .map_err(|err| format!("Failed to read '{}': {err}", args.document.display()))?;
    let metadata = match document.metadata {
        FrontMatter::Present(metadata) => metadata,
        FrontMatter::NotPresent => {
            return Err(format!("'{}' has no front matter", args.document.display()));
        }
        FrontMatter::Invalid { reason } => {
            return Err(format!(
                "'{}' has invalid front matter: {reason}",
                args.document.display()
            ));
        }
    };

    let outcome = match_record(&metadata, &flat);
    let value = serde_json::to_value(&outcome)
        .map_err(|err| format!("Failed to serialize match outcome: {err}"))?;
    emit(&value, args.format, None)
}

fn run_render(args: RenderArgs) -> Result<(), String> {
    let template = read_file(&args.template)?;
    let data = read_file(&args.data)?;
    let item_template = args.item_template.as_deref().map(read_file).transpose()?;

    let options = RenderOptions {
        require_array_data: args.require_array_data,
        item_template: item_template.as_ref(),
    };
    let rendered = render(&template, &data, &options).map_err(|e| e.to_string())?;
    emit(&rendered, args.format, None)
}

fn resolve_schema(path: &Path) -> Result<Value, String> {
    let location = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| format!("'{}' is not a schema file", path.display()))?;
    let loader = FsFragmentLoader::new(parent_dir(path));
    let mut resolver = Resolver::new(&loader);
    resolver.resolve_location(&location).map_err(|e| e.to_string())
}

fn read_file(path: &Path) -> Result<Value, String> {
    read_structured(path).map_err(|err| format!("Failed to read '{}': {err}", path.display()))
}

/// Writes `value` to `path`, or to stdout when no path is given.
fn emit(value: &Value, format: OutputFormat, path: Option<&Path>) -> Result<(), String> {
    let raw = format_value(value, format).map_err(|e| e.to_string())?;
    let Some(path) = path else {
        print!("{raw}");
        return Ok(());
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|err| {
                format!(
                    "Failed to create output directory '{}': {err}",
                    parent.display()
                )
            })?;
        }
    }
    fs::write(path, raw).map_err(|err| format!("Failed to write '{}': {err}", path.display()))
}

fn report_failures(failures: &[DocumentOutcome]) {
    for failure in failures {
        eprintln!("  {failure}");
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
