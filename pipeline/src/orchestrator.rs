//! Two-stage registry build.
//!
//! Stage 1 runs resolve → flatten → match → render once per document, each
//! document with its own [`Resolver`] so no resolution state is shared.
//! Stage 2 aggregates the successful commands into a [`Registry`], validates
//! it, applies the registry schema's derivations and renders the registry
//! template.
//!
//! ```text
//! Idle → Stage1Running → Stage1Complete → Stage2Running → Success
//!                      ↘ Stage1Failed                 ↘ Stage2Failed
//!                      ↘ AllFailed
//!                      ↘ NoCommands
//! ```

use std::fmt;

use chrono::Utc;
use frontmatter_schema_core::{
    Command, ExtensionKeys, FlatSchema, PropertyPath, Registry, SchemaError, get_path, set_path,
    validate_registry,
};
use frontmatter_schema_engine::derive::apply_derivations;
use frontmatter_schema_engine::flatten::Flattener;
use frontmatter_schema_engine::matcher::match_record;
use frontmatter_schema_engine::resolve::{FragmentLoader, Resolver, join_location};
use frontmatter_schema_engine::template::{RenderOptions, render, unresolved_placeholders};
use rayon::prelude::*;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{IdentifierConfig, PolicyConfig};
use crate::error::{PipelineError, Result, Stage2Error};
use crate::frontmatter::FrontMatter;
use crate::loader::DocumentInput;

/// Key under which commands are exposed to the registry template when the
/// registry schema declares no repeatable part.
pub const DEFAULT_ITEMS_KEY: &str = "items";

/// Result of Stage 1 for one document.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentOutcome {
    /// The document produced a command. `unmatched` and `missing_required`
    /// are advisory.
    Success {
        command: Command,
        unmatched: Vec<String>,
        missing_required: Vec<String>,
    },
    /// The document has no front matter.
    NoFrontMatter { path: String },
    /// Identifiers (or, under strict policy, required schema keys) are
    /// absent or not strings.
    MissingRequiredFields { path: String, fields: Vec<String> },
    /// Resolution, flattening, rendering or front-matter parsing failed.
    Failed { path: String, error: SchemaError },
}

impl DocumentOutcome {
    pub fn path(&self) -> &str {
        match self {
            Self::Success { command, .. } => &command.source_path,
            Self::NoFrontMatter { path }
            | Self::MissingRequiredFields { path, .. }
            | Self::Failed { path, .. } => path,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

impl fmt::Display for DocumentOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success { command, .. } => write!(
                f,
                "{}: ok ({}/{}/{})",
                command.source_path, command.category, command.layer, command.directive
            ),
            Self::NoFrontMatter { path } => write!(f, "{path}: no front matter"),
            Self::MissingRequiredFields { path, fields } => {
                write!(f, "{path}: missing required fields: {}", fields.join(", "))
            }
            Self::Failed { path, error } => write!(f, "{path}: {error}"),
        }
    }
}

/// Terminal result of a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// The registry was built. `discarded` lists the Stage-1 failures skipped
    /// under `continue_on_error`.
    Success {
        registry: Registry,
        output: Value,
        discarded: Vec<DocumentOutcome>,
    },
    /// There were no documents to aggregate.
    NoCommands,
    /// Every document failed Stage 1.
    AllFailed { failures: Vec<DocumentOutcome> },
    /// Some documents failed and `continue_on_error` is off.
    Stage1Failed {
        succeeded: usize,
        failures: Vec<DocumentOutcome>,
    },
    /// Aggregation failed.
    Stage2Failed { error: Stage2Error },
}

impl PipelineOutcome {
    /// The state this outcome leaves the pipeline in.
    pub fn state(&self) -> PipelineState {
        match self {
            Self::Success { .. } => PipelineState::Success,
            Self::NoCommands => PipelineState::NoCommands,
            Self::AllFailed { .. } => PipelineState::AllFailed,
            Self::Stage1Failed { .. } => PipelineState::Stage1Failed,
            Self::Stage2Failed { .. } => PipelineState::Stage2Failed,
        }
    }
}

/// Pipeline state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Stage1Running,
    Stage1Complete,
    Stage1Failed,
    AllFailed,
    NoCommands,
    Stage2Running,
    Success,
    Stage2Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Stage1Failed | Self::AllFailed | Self::NoCommands | Self::Success | Self::Stage2Failed
        )
    }
}

/// Everything Stage 1 and Stage 2 need besides the documents.
///
/// Schema locations are resolved through the loader. Templates given here
/// take precedence over the schemas' template markers, which are loaded
/// relative to their schema.
#[derive(Debug, Clone, Default)]
pub struct PipelineSettings {
    pub schema_location: String,
    pub template: Option<Value>,
    pub item_template: Option<Value>,
    pub registry_schema_location: Option<String>,
    pub registry_template: Option<Value>,
    pub identifiers: IdentifierConfig,
    pub policy: PolicyConfig,
    pub extensions: ExtensionKeys,
    /// Stage-1 worker count; `None` or 0 picks an adaptive default.
    pub jobs: Option<usize>,
    /// Fixed registry timestamp; the current UTC time when unset.
    pub generated_at: Option<String>,
}

/// Drives a run through both stages.
pub struct Pipeline<'l> {
    loader: &'l dyn FragmentLoader,
    settings: PipelineSettings,
    state: PipelineState,
}

impl<'l> Pipeline<'l> {
    pub fn new(loader: &'l dyn FragmentLoader, settings: PipelineSettings) -> Self {
        Self {
            loader,
            settings,
            state: PipelineState::Idle,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Runs both stages over `documents`.
    ///
    /// # Errors
    ///
    /// Only infrastructure failures (the worker pool cannot be built) are
    /// errors; every expected terminal state is a [`PipelineOutcome`].
    pub fn run(&mut self, documents: &[DocumentInput]) -> Result<PipelineOutcome> {
        self.transition(PipelineState::Stage1Running);
        let outcomes = self.run_stage1(documents)?;

        if outcomes.is_empty() {
            info!("No documents to aggregate");
            return Ok(self.finish(PipelineOutcome::NoCommands));
        }

        let (successes, failures): (Vec<_>, Vec<_>) =
            outcomes.into_iter().partition(DocumentOutcome::is_success);
        info!(
            succeeded = successes.len(),
            failed = failures.len(),
            "Stage 1 complete"
        );

        if successes.is_empty() {
            return Ok(self.finish(PipelineOutcome::AllFailed { failures }));
        }
        if !failures.is_empty() && !self.settings.policy.continue_on_error {
            return Ok(self.finish(PipelineOutcome::Stage1Failed {
                succeeded: successes.len(),
                failures,
            }));
        }
        self.transition(PipelineState::Stage1Complete);

        let commands = successes
            .into_iter()
            .filter_map(|outcome| match outcome {
                DocumentOutcome::Success { command, .. } => Some(command),
                _ => None,
            })
            .collect();

        self.transition(PipelineState::Stage2Running);
        let outcome = match self.aggregate(commands) {
            Ok(Some((registry, output))) => PipelineOutcome::Success {
                registry,
                output,
                discarded: failures,
            },
            Ok(None) => PipelineOutcome::NoCommands,
            Err(error) => PipelineOutcome::Stage2Failed { error },
        };
        Ok(self.finish(outcome))
    }

    /// Stage 1 over every document, in parallel, sorted by document path.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::WorkerPool`] when the thread pool cannot be
    /// built.
    pub fn run_stage1(&self, documents: &[DocumentInput]) -> Result<Vec<DocumentOutcome>> {
        let jobs = self
            .settings
            .jobs
            .filter(|jobs| *jobs > 0)
            .unwrap_or_else(|| default_parallel_jobs(documents.len()));
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build()
            .map_err(|e| PipelineError::WorkerPool(e.to_string()))?;

        let mut outcomes: Vec<DocumentOutcome> = pool.install(|| {
            documents
                .par_iter()
                .map(|document| self.process_document(document))
                .collect()
        });

        // Sort by document path for deterministic output.
        outcomes.sort_by(|a, b| a.path().cmp(b.path()));
        Ok(outcomes)
    }

    /// Stage 1 for a single document.
    pub fn process_document(&self, document: &DocumentInput) -> DocumentOutcome {
        let path = document.path.clone();
        let metadata = match &document.metadata {
            FrontMatter::Present(metadata) => metadata,
            FrontMatter::NotPresent => {
                debug!(document = %path, "No front matter");
                return DocumentOutcome::NoFrontMatter { path };
            }
            FrontMatter::Invalid { reason } => {
                return DocumentOutcome::Failed {
                    error: SchemaError::ParseError {
                        reference: path.clone(),
                        reason: reason.clone(),
                    },
                    path,
                };
            }
        };

        match self.map_document(&path, metadata) {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(document = %path, error = %error, "Document failed");
                DocumentOutcome::Failed { path, error }
            }
        }
    }

    fn map_document(
        &self,
        path: &str,
        metadata: &Value,
    ) -> std::result::Result<DocumentOutcome, SchemaError> {
        let schema_location = &self.settings.schema_location;
        let flat = self.resolve_and_flatten(schema_location)?;

        let matched = match_record(metadata, &flat);
        if !matched.unmatched_keys.is_empty() {
            debug!(document = %path, unmatched = ?matched.unmatched_keys, "Unmatched metadata keys");
        }
        if self.settings.policy.strict_required && !matched.missing_required_keys.is_empty() {
            return Ok(DocumentOutcome::MissingRequiredFields {
                path: path.to_string(),
                fields: matched.missing_required_keys,
            });
        }

        // Identifiers come from the mapped record, falling back to the raw
        // metadata when the schema does not declare them.
        let fields = self.settings.identifiers.paths();
        let identifiers = fields.map(|field| {
            let field_path = PropertyPath::parse(field);
            get_path(&matched.mapped_record, &field_path)
                .or_else(|| get_path(metadata, &field_path))
                .and_then(Value::as_str)
                .filter(|text| !text.is_empty())
                .map(String::from)
        });
        let missing: Vec<String> = fields
            .iter()
            .zip(&identifiers)
            .filter(|(_, value)| value.is_none())
            .map(|(field, _)| field.to_string())
            .collect();
        let (category, layer, directive) = match identifiers {
            [Some(category), Some(layer), Some(directive)] => (category, layer, directive),
            _ => {
                return Ok(DocumentOutcome::MissingRequiredFields {
                    path: path.to_string(),
                    fields: missing,
                });
            }
        };

        let template = self.template_for(
            self.settings.template.as_ref(),
            flat.template.as_deref(),
            schema_location,
        )?;
        let item_template = self.template_for(
            self.settings.item_template.as_ref(),
            flat.item_template.as_deref(),
            schema_location,
        )?;
        let record = match &template {
            Some(template) => {
                let options = RenderOptions {
                    require_array_data: self.settings.policy.require_array_data,
                    item_template: item_template.as_ref(),
                };
                let rendered = render(template, &matched.mapped_record, &options)?;
                let unresolved = unresolved_placeholders(&rendered);
                if !unresolved.is_empty() {
                    warn!(document = %path, placeholders = ?unresolved, "Unresolved placeholders");
                }
                rendered
            }
            None => matched.mapped_record,
        };

        debug!(document = %path, %category, %layer, %directive, "Mapped document");

        Ok(DocumentOutcome::Success {
            command: Command {
                source_path: path.to_string(),
                category,
                layer,
                directive,
                record,
            },
            unmatched: matched.unmatched_keys,
            missing_required: matched.missing_required_keys,
        })
    }

    /// Stage 2: returns `None` for an empty command list.
    fn aggregate(
        &self,
        commands: Vec<Command>,
    ) -> std::result::Result<Option<(Registry, Value)>, Stage2Error> {
        let generated_at = self
            .settings
            .generated_at
            .clone()
            .unwrap_or_else(|| Utc::now().to_rfc3339());
        let Some(registry) = Registry::from_commands(commands, generated_at) else {
            return Ok(None);
        };

        let violations = validate_registry(&registry);
        if !violations.is_empty() {
            return Err(Stage2Error::Validation(violations));
        }

        let mut data = registry.template_data();
        let records = data
            .get("commands")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));

        let registry_flat = match &self.settings.registry_schema_location {
            Some(location) => Some(self.resolve_and_flatten(location)?),
            None => None,
        };
        let flat = registry_flat.unwrap_or_default();

        if flat.parts.is_empty() {
            set_path(&mut data, &PropertyPath::parse(DEFAULT_ITEMS_KEY), records)?;
        } else {
            for part in &flat.parts {
                set_path(&mut data, &PropertyPath::parse(part), records.clone())?;
            }
        }
        apply_derivations(&flat, &mut data)?;

        let location = self.settings.registry_schema_location.as_deref().unwrap_or_default();
        let template = self.template_for(
            self.settings.registry_template.as_ref(),
            flat.template.as_deref(),
            location,
        )?;
        let item_template =
            self.template_for(None, flat.item_template.as_deref(), location)?;

        let output = match &template {
            Some(template) => {
                let options = RenderOptions {
                    require_array_data: self.settings.policy.require_array_data,
                    item_template: item_template.as_ref(),
                };
                render(template, &data, &options)?
            }
            None => data,
        };

        info!(
            commands = registry.command_count(),
            categories = registry.available_configs.len(),
            "Registry built"
        );
        Ok(Some((registry, output)))
    }

    fn resolve_and_flatten(&self, location: &str) -> std::result::Result<FlatSchema, SchemaError> {
        let mut resolver = Resolver::new(self.loader);
        let schema = resolver.resolve_location(location)?;
        Flattener::new(&self.settings.extensions).flatten(&schema)
    }

    /// An explicit template wins; otherwise a schema marker is loaded relative
    /// to its schema.
    fn template_for(
        &self,
        explicit: Option<&Value>,
        marker: Option<&str>,
        schema_location: &str,
    ) -> std::result::Result<Option<Value>, SchemaError> {
        if let Some(template) = explicit {
            return Ok(Some(template.clone()));
        }
        match marker {
            Some(name) => {
                let location = join_location(schema_location, name);
                debug!(template = %location, "Loading template from schema marker");
                self.loader.load(&location).map(Some)
            }
            None => Ok(None),
        }
    }

    fn transition(&mut self, next: PipelineState) {
        debug!(from = ?self.state, to = ?next, "Pipeline state");
        self.state = next;
    }

    fn finish(&mut self, outcome: PipelineOutcome) -> PipelineOutcome {
        self.transition(outcome.state());
        outcome
    }
}

fn default_parallel_jobs(document_count: usize) -> usize {
    let cpu_count = std::thread::available_parallelism()
        .map(|parallelism| parallelism.get())
        .unwrap_or(4);
    cpu_count.min(12).max(1).min(document_count.max(1))
}
