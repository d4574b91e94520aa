//! Declarative job definitions.
//!
//! Parses the `jobs` section of the settings document into [`Job`]s and
//! validates them. Unknown request kinds, strategies and export types are
//! rejected here, before anything runs.
//!
//! # Example TOML
//!
//! ```toml
//! [jobs.hourly_abandons]
//! cron = "0 5 * * * *"
//!
//! [jobs.hourly_abandons.configurations.support]
//! customData = { interval = "PT1H" }
//!
//! [jobs.hourly_abandons.configurations.support.executionPlan.queues]
//! type = "GetQueues"
//! strategy = "single"
//! getAllPages = true
//! parameters = { pageSize = 100 }
//!
//! [jobs.hourly_abandons.configurations.support.executionPlan.abandons]
//! type = "ConversationAggregate"
//! strategy = "repeat"
//! collection = "data.queues.entities"
//! destination = "abandons"
//! body = { interval = "{{ vars.previousInterval }}", filter = { queueId = "{{ record.id }}" } }
//!
//! [jobs.hourly_abandons.configurations.support.templates.csv]
//! templateFile = "templates/abandons.csv.tera"
//! fileName = "abandons-{{ vars.currentDay }}.csv"
//!
//! [jobs.hourly_abandons.configurations.support.exports.disk]
//! type = "file"
//! destination = "reports/{{ vars.queueGroup }}"
//! ```

use std::collections::HashSet;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::context::{CustomDataLayers, Precedence};
use crate::error::{PipelineError, Result};
use crate::path::PropertyPath;

// ---------------------------------------------------------------------------
// Closed enums
// ---------------------------------------------------------------------------

/// Remote request kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    ConversationDetail,
    UsersDetailsQuery,
    ConversationAggregate,
    UserAggregate,
    GetUsers,
    GetQueues,
    GetConversation,
}

impl RequestKind {
    pub const ALL: [RequestKind; 7] = [
        RequestKind::ConversationDetail,
        RequestKind::UsersDetailsQuery,
        RequestKind::ConversationAggregate,
        RequestKind::UserAggregate,
        RequestKind::GetUsers,
        RequestKind::GetQueues,
        RequestKind::GetConversation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::ConversationDetail => "ConversationDetail",
            RequestKind::UsersDetailsQuery => "UsersDetailsQuery",
            RequestKind::ConversationAggregate => "ConversationAggregate",
            RequestKind::UserAggregate => "UserAggregate",
            RequestKind::GetUsers => "GetUsers",
            RequestKind::GetQueues => "GetQueues",
            RequestKind::GetConversation => "GetConversation",
        }
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        RequestKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                PipelineError::InvalidConfiguration(format!("unknown request type '{}'", s))
            })
    }
}

/// Request execution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// One call, optionally paged.
    Single,
    /// One call per element of a collection.
    Repeat,
}

impl std::str::FromStr for Strategy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Strategy::Single),
            "repeat" => Ok(Strategy::Repeat),
            _ => Err(PipelineError::InvalidConfiguration(format!(
                "unknown request strategy '{}'",
                s
            ))),
        }
    }
}

/// Export sink types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    File,
}

impl std::str::FromStr for ExportKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(ExportKind::File),
            _ => Err(PipelineError::InvalidConfiguration(format!(
                "unknown export type '{}'",
                s
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// A scheduled unit of work: ordered configurations sharing a trigger.
#[derive(Debug, Clone)]
pub struct Job {
    pub name: String,
    /// Cron expression (5 or 6 fields).
    pub cron: Option<String>,
    pub custom_data: Map<String, Value>,
    pub configurations: IndexMap<String, Configuration>,
}

/// One execution plan with its templates and exports.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub name: String,
    pub custom_data: Map<String, Value>,
    pub plan: IndexMap<String, Task>,
    pub templates: IndexMap<String, TemplateDefinition>,
    pub exports: IndexMap<String, ExportDefinition>,
}

/// A named plan step.
#[derive(Debug, Clone)]
pub struct Task {
    pub name: String,
    pub custom_data: Map<String, Value>,
    pub action: TaskAction,
}

/// What a task does.
#[derive(Debug, Clone)]
pub enum TaskAction {
    Request(RequestTask),
    Transform(TransformTask),
}

/// A remote request.
#[derive(Debug, Clone)]
pub struct RequestTask {
    pub kind: RequestKind,
    pub strategy: Strategy,
    /// Query body; string leaves are templates.
    pub body: Value,
    /// Query-string parameters; string leaves are templates.
    pub parameters: Value,
    pub get_all_pages: bool,
    /// Where each Repeat response lands (template).
    pub destination: Option<String>,
    /// `data.`-rooted collection a Repeat iterates.
    pub collection: Option<PropertyPath>,
    /// Expressions run against the resolved request before dispatch.
    pub transforms: Vec<String>,
}

/// Expressions evaluated for their side effects.
#[derive(Debug, Clone)]
pub struct TransformTask {
    pub expressions: Vec<String>,
}

/// An output document.
#[derive(Debug, Clone)]
pub struct TemplateDefinition {
    pub name: String,
    pub source: TemplateSource,
    /// Output file name (template).
    pub file_name: String,
    pub custom_data: Map<String, Value>,
}

/// Where a template body comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    Inline(String),
    /// Relative paths resolve against the config document's directory.
    File(PathBuf),
}

/// An export target.
#[derive(Debug, Clone)]
pub struct ExportDefinition {
    pub name: String,
    pub kind: ExportKind,
    /// Destination directory (template).
    pub destination: String,
    pub custom_data: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Document shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobDocument {
    #[serde(default, alias = "schedule")]
    cron: Option<String>,
    #[serde(default, alias = "custom_data")]
    custom_data: Option<Map<String, Value>>,
    #[serde(default)]
    configurations: IndexMap<String, ConfigurationDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigurationDocument {
    #[serde(default, alias = "custom_data")]
    custom_data: Option<Map<String, Value>>,
    #[serde(default, alias = "execution_plan", alias = "plan")]
    execution_plan: IndexMap<String, TaskDocument>,
    #[serde(default)]
    templates: IndexMap<String, TemplateDocument>,
    #[serde(default)]
    exports: IndexMap<String, ExportDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskDocument {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    strategy: Option<String>,
    #[serde(default)]
    body: Option<Value>,
    #[serde(default)]
    parameters: Option<Value>,
    #[serde(default, alias = "get_all_pages")]
    get_all_pages: bool,
    #[serde(default)]
    destination: Option<String>,
    #[serde(default)]
    collection: Option<String>,
    #[serde(default)]
    transforms: Vec<String>,
    #[serde(default)]
    expressions: Vec<String>,
    #[serde(default, alias = "custom_data")]
    custom_data: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TemplateDocument {
    #[serde(default)]
    template: Option<String>,
    #[serde(default, alias = "template_file")]
    template_file: Option<PathBuf>,
    #[serde(alias = "file_name")]
    file_name: String,
    #[serde(default, alias = "custom_data")]
    custom_data: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportDocument {
    #[serde(rename = "type")]
    kind: String,
    destination: String,
    #[serde(default, alias = "custom_data")]
    custom_data: Option<Map<String, Value>>,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse and validate every job in a settings `jobs` map.
pub fn load_jobs(jobs: &Map<String, Value>) -> Result<IndexMap<String, Job>> {
    let mut out = IndexMap::with_capacity(jobs.len());
    for (name, value) in jobs {
        let job = Job::from_value(name, value)?;
        job.validate()?;
        out.insert(name.clone(), job);
    }
    debug!("Loaded {} job definitions", out.len());
    Ok(out)
}

impl Job {
    /// Parse one job from its document node.
    pub fn from_value(name: &str, value: &Value) -> Result<Self> {
        let doc = JobDocument::deserialize(value).map_err(|e| {
            PipelineError::InvalidConfiguration(format!("job '{}': {}", name, e))
        })?;

        let mut configurations = IndexMap::with_capacity(doc.configurations.len());
        for (cfg_name, cfg) in doc.configurations {
            let configuration = Configuration::from_document(&cfg_name, cfg)
                .map_err(|e| prefix_error(e, &format!("job '{}'", name)))?;
            configurations.insert(cfg_name, configuration);
        }

        Ok(Job {
            name: name.to_string(),
            cron: doc.cron.filter(|c| !c.trim().is_empty()),
            custom_data: doc.custom_data.unwrap_or_default(),
            configurations,
        })
    }

    /// Validate the job.
    ///
    /// Checks:
    /// - At least one configuration
    /// - Cron expression parses
    /// - Every configuration validates
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(PipelineError::InvalidConfiguration(
                "Job name cannot be empty".into(),
            ));
        }
        if self.configurations.is_empty() {
            return Err(PipelineError::InvalidConfiguration(format!(
                "Job '{}' must have at least one configuration",
                self.name
            )));
        }
        if let Some(cron) = &self.cron {
            crate::scheduler::parse_schedule(cron).map_err(|e| {
                PipelineError::InvalidConfiguration(format!("Job '{}': {}", self.name, e))
            })?;
        }
        for configuration in self.configurations.values() {
            configuration
                .validate()
                .map_err(|e| prefix_error(e, &format!("Job '{}'", self.name)))?;
        }
        Ok(())
    }
}

impl Configuration {
    fn from_document(name: &str, doc: ConfigurationDocument) -> Result<Self> {
        let context = format!("configuration '{}'", name);

        let mut plan = IndexMap::with_capacity(doc.execution_plan.len());
        for (task_name, task) in doc.execution_plan {
            let task = Task::from_document(&task_name, task)
                .map_err(|e| prefix_error(e, &context))?;
            plan.insert(task_name, task);
        }

        let mut templates = IndexMap::with_capacity(doc.templates.len());
        for (template_name, template) in doc.templates {
            let source = match (template.template, template.template_file) {
                (Some(inline), _) => TemplateSource::Inline(inline),
                (None, Some(file)) => TemplateSource::File(file),
                (None, None) => {
                    return Err(PipelineError::InvalidConfiguration(format!(
                        "{}: template '{}' needs 'template' or 'templateFile'",
                        context, template_name
                    )));
                }
            };
            templates.insert(
                template_name.clone(),
                TemplateDefinition {
                    name: template_name,
                    source,
                    file_name: template.file_name,
                    custom_data: template.custom_data.unwrap_or_default(),
                },
            );
        }

        let mut exports = IndexMap::with_capacity(doc.exports.len());
        for (export_name, export) in doc.exports {
            let kind = export
                .kind
                .parse::<ExportKind>()
                .map_err(|e| prefix_error(e, &format!("{}: export '{}'", context, export_name)))?;
            exports.insert(
                export_name.clone(),
                ExportDefinition {
                    name: export_name,
                    kind,
                    destination: export.destination,
                    custom_data: export.custom_data.unwrap_or_default(),
                },
            );
        }

        Ok(Configuration {
            name: name.to_string(),
            custom_data: doc.custom_data.unwrap_or_default(),
            plan,
            templates,
            exports,
        })
    }

    /// Validate tasks and templates.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for task in self.plan.values() {
            if task.name.trim().is_empty() {
                return Err(PipelineError::InvalidConfiguration(format!(
                    "Configuration '{}': task name cannot be empty",
                    self.name
                )));
            }
            if !seen.insert(task.name.as_str()) {
                return Err(PipelineError::InvalidConfiguration(format!(
                    "Configuration '{}': duplicate task name '{}'",
                    self.name, task.name
                )));
            }
            task.validate()
                .map_err(|e| prefix_error(e, &format!("Configuration '{}'", self.name)))?;
        }
        for template in self.templates.values() {
            if template.file_name.trim().is_empty() {
                return Err(PipelineError::InvalidConfiguration(format!(
                    "Configuration '{}': template '{}' has an empty fileName",
                    self.name, template.name
                )));
            }
        }
        for export in self.exports.values() {
            if export.destination.trim().is_empty() {
                return Err(PipelineError::InvalidConfiguration(format!(
                    "Configuration '{}': export '{}' has an empty destination",
                    self.name, export.name
                )));
            }
        }
        Ok(())
    }

    /// Every custom-data layer of this configuration, below and including
    /// its tasks, templates and exports.
    pub fn custom_data_layers(&self, global: &Map<String, Value>, job: &Job) -> CustomDataLayers {
        let mut layers = CustomDataLayers::new();
        layers.push(Precedence::Global, "settings", global);
        layers.push(Precedence::Job, format!("job {}", job.name), &job.custom_data);
        layers.push(
            Precedence::Configuration,
            format!("configuration {}", self.name),
            &self.custom_data,
        );
        for task in self.plan.values() {
            let precedence = match task.action {
                TaskAction::Request(_) => Precedence::Request,
                TaskAction::Transform(_) => Precedence::Transform,
            };
            layers.push(precedence, format!("task {}", task.name), &task.custom_data);
        }
        for template in self.templates.values() {
            layers.push(
                Precedence::Template,
                format!("template {}", template.name),
                &template.custom_data,
            );
        }
        for export in self.exports.values() {
            layers.push(
                Precedence::Export,
                format!("export {}", export.name),
                &export.custom_data,
            );
        }
        layers
    }
}

impl Task {
    fn from_document(name: &str, doc: TaskDocument) -> Result<Self> {
        let custom_data = doc.custom_data.unwrap_or_default();
        let action = if doc.kind.trim().eq_ignore_ascii_case("transform") {
            TaskAction::Transform(TransformTask {
                expressions: doc.expressions,
            })
        } else {
            let kind = doc
                .kind
                .parse::<RequestKind>()
                .map_err(|e| prefix_error(e, &format!("task '{}'", name)))?;
            let strategy = doc
                .strategy
                .as_deref()
                .unwrap_or("single")
                .parse::<Strategy>()
                .map_err(|e| prefix_error(e, &format!("task '{}'", name)))?;
            let collection = doc
                .collection
                .as_deref()
                .map(|c| collection_path(name, c))
                .transpose()?;
            TaskAction::Request(RequestTask {
                kind,
                strategy,
                body: doc.body.unwrap_or_else(|| Value::Object(Map::new())),
                parameters: doc.parameters.unwrap_or_else(|| Value::Object(Map::new())),
                get_all_pages: doc.get_all_pages,
                destination: doc.destination.filter(|d| !d.trim().is_empty()),
                collection,
                transforms: doc.transforms,
            })
        };
        Ok(Task {
            name: name.to_string(),
            custom_data,
            action,
        })
    }

    /// Validate strategy-specific requirements.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| {
            Err(PipelineError::InvalidConfiguration(format!(
                "task '{}': {}",
                self.name, msg
            )))
        };
        match &self.action {
            TaskAction::Transform(transform) => {
                if transform.expressions.is_empty() {
                    return invalid("transform has no expressions".into());
                }
            }
            TaskAction::Request(request) => match request.strategy {
                Strategy::Repeat => {
                    if request.collection.is_none() {
                        return invalid("repeat strategy requires a 'collection'".into());
                    }
                    if request.kind == RequestKind::GetConversation && request.destination.is_some() {
                        return invalid("GetConversation stores under the task name and takes no 'destination'".into());
                    }
                }
                Strategy::Single => {
                    if request.destination.is_some() {
                        return invalid("'destination' is only valid with the repeat strategy".into());
                    }
                    if request.kind == RequestKind::GetConversation
                        && request.parameters.get("conversationId").is_none()
                    {
                        return invalid("GetConversation needs parameters.conversationId".into());
                    }
                }
            },
        }
        Ok(())
    }

    pub fn is_transform(&self) -> bool {
        matches!(self.action, TaskAction::Transform(_))
    }
}

/// Parse a collection reference, dropping a leading `def.`.
fn collection_path(task: &str, raw: &str) -> Result<PropertyPath> {
    let parsed = PropertyPath::parse(raw)?;
    let path = parsed.strip_root("def").unwrap_or(parsed);
    if path.root() != Some("data") || path.tail().is_empty() {
        return Err(PipelineError::InvalidConfiguration(format!(
            "task '{}': collection '{}' must be a path under 'data'",
            task, raw
        )));
    }
    Ok(path)
}

fn prefix_error(err: PipelineError, context: &str) -> PipelineError {
    match err {
        PipelineError::InvalidConfiguration(msg) => {
            PipelineError::InvalidConfiguration(format!("{}: {}", context, msg))
        }
        other => other,
    }
}
