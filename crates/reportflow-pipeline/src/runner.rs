//! Job runner: drives each configuration of a job through context setup,
//! plan execution, template rendering and export.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{Instrument, error, info, info_span, warn};

use crate::context::VariableContext;
use crate::definition::{Configuration, Job, TemplateDefinition, TemplateSource};
use crate::engine::{ExecutionEngine, ExecutionStatus, PlanExecution};
use crate::error::{PipelineError, Result};
use crate::export;
use crate::template::{Locals, TemplateRenderer};

/// Per-run options.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Log each rendered document.
    pub show_output: bool,
    /// Exposed to templates as `vars.args`.
    pub args: Value,
}

/// Outcome of one rendered template.
#[derive(Debug, Clone)]
pub struct DocumentReport {
    pub template: String,
    pub file_name: String,
    /// Paths written by successful exports.
    pub written: Vec<PathBuf>,
    /// Exports that failed to write.
    pub failed_exports: Vec<String>,
}

/// Outcome of one configuration.
#[derive(Debug, Clone)]
pub struct ConfigurationReport {
    pub name: String,
    pub status: ExecutionStatus,
    pub documents: Vec<DocumentReport>,
}

impl ConfigurationReport {
    pub fn export_failures(&self) -> usize {
        self.documents.iter().map(|d| d.failed_exports.len()).sum()
    }
}

/// Outcome of one job run.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job: String,
    pub run_id: String,
    pub configurations: Vec<ConfigurationReport>,
}

/// Outcome of a run-now invocation over several jobs.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub completed: Vec<JobReport>,
    /// Jobs that failed, with the error message.
    pub failed: Vec<(String, String)>,
    /// Requested names with no matching job.
    pub unknown: Vec<String>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs jobs against a shared [`ExecutionEngine`].
#[derive(Debug, Clone)]
pub struct JobRunner {
    engine: ExecutionEngine,
    base_dir: PathBuf,
    global_custom_data: Map<String, Value>,
    options: RunOptions,
}

impl JobRunner {
    /// Create a runner. Template files and `load_file` paths resolve
    /// against `base_dir`.
    pub fn new(engine: ExecutionEngine, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            base_dir: base_dir.into(),
            global_custom_data: Map::new(),
            options: RunOptions::default(),
        }
    }

    /// Global custom-data layer, lowest precedence.
    pub fn with_global_custom_data(mut self, data: Map<String, Value>) -> Self {
        self.global_custom_data = data;
        self
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Run the named jobs once, in order.
    ///
    /// Unknown names are skipped with a warning; a failed job is logged and
    /// the remaining jobs still run.
    pub async fn run_jobs(&self, jobs: &IndexMap<String, Job>, names: &[String]) -> RunSummary {
        let mut summary = RunSummary::default();
        for name in names {
            let Some(job) = jobs.get(name) else {
                warn!(job = %name, "Job does not exist, skipping");
                summary.unknown.push(name.clone());
                continue;
            };
            match self.run_job(job).await {
                Ok(report) => summary.completed.push(report),
                Err(e) => summary.failed.push((name.clone(), e.to_string())),
            }
        }
        info!(
            completed = summary.completed.len(),
            failed = summary.failed.len(),
            skipped = summary.unknown.len(),
            "All jobs processed"
        );
        summary
    }

    /// Run every configuration of `job` in order, stopping at the first failure.
    pub async fn run_job(&self, job: &Job) -> Result<JobReport> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("job", job = %job.name, run_id = %run_id);

        async {
            info!(configurations = job.configurations.len(), "Executing job");
            let mut report = JobReport {
                job: job.name.clone(),
                run_id: run_id.clone(),
                configurations: Vec::with_capacity(job.configurations.len()),
            };
            for configuration in job.configurations.values() {
                match self.run_configuration(job, configuration).await {
                    Ok(cfg_report) => report.configurations.push(cfg_report),
                    Err(e) => {
                        error!(configuration = %configuration.name, error = %e, "Configuration failed, stopping job");
                        return Err(e);
                    }
                }
            }
            info!("Job completed");
            Ok(report)
        }
        .instrument(span)
        .await
    }

    /// Run one configuration on a fresh context.
    pub async fn run_configuration(
        &self,
        job: &Job,
        configuration: &Configuration,
    ) -> Result<ConfigurationReport> {
        info!(configuration = %configuration.name, "Processing execution plan");

        let mut ctx = VariableContext::initialize(self.options.args.clone())?;
        let layers = configuration.custom_data_layers(&self.global_custom_data, job);
        ctx.apply_layers(&layers)?;

        let mut renderer = TemplateRenderer::new(ctx.zone(), self.base_dir.clone());
        let mut execution = PlanExecution::new(&configuration.plan);
        self.engine
            .execute(&configuration.plan, &mut ctx, &mut renderer, &mut execution)
            .await?;

        let mut documents = Vec::with_capacity(configuration.templates.len());
        for template in configuration.templates.values() {
            let document = self
                .render_and_export(configuration, template, &mut ctx, &mut renderer)
                .await?;
            documents.push(document);
        }

        Ok(ConfigurationReport {
            name: configuration.name.clone(),
            status: execution.status(),
            documents,
        })
    }

    async fn render_and_export(
        &self,
        configuration: &Configuration,
        template: &TemplateDefinition,
        ctx: &mut VariableContext,
        renderer: &mut TemplateRenderer,
    ) -> Result<DocumentReport> {
        info!(template = %template.name, "Executing template");
        let body = self.template_body(template).await?;
        let mut locals = Locals::default();
        let output = renderer.render_str(&body, ctx, &mut locals)?;
        if self.options.show_output {
            info!(template = %template.name, "{}:\n{}", template.name, output);
        }
        let file_name = renderer.render_str(&template.file_name, ctx, &mut locals)?;

        let mut report = DocumentReport {
            template: template.name.clone(),
            file_name: file_name.clone(),
            written: Vec::new(),
            failed_exports: Vec::new(),
        };
        for target in configuration.exports.values() {
            let destination = renderer.render_str(&target.destination, ctx, &mut locals)?;
            match export::export(target.kind, destination.trim(), &file_name, &output).await {
                Ok(path) => {
                    info!(export = %target.name, path = %path.display(), "Document exported");
                    report.written.push(path);
                }
                Err(e) => {
                    error!(export = %target.name, error = %e, "Export failed");
                    report.failed_exports.push(target.name.clone());
                }
            }
        }
        Ok(report)
    }

    async fn template_body(&self, template: &TemplateDefinition) -> Result<String> {
        match &template.source {
            TemplateSource::Inline(body) => Ok(body.clone()),
            TemplateSource::File(file) => {
                let path = self.base_dir.join(file);
                tokio::fs::read_to_string(&path).await.map_err(|e| {
                    PipelineError::Template(format!(
                        "cannot read template file '{}': {}",
                        path.display(),
                        e
                    ))
                })
            }
        }
    }
}
