//! Execution plan engine.
//!
//! Walks a configuration's plan in declared order, one task at a time.
//! Transforms render their expressions for side effects; requests resolve
//! their templates, dispatch, and store the result under `data[task]`. The
//! first failure stops the plan and is returned unchanged.

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::context::VariableContext;
use crate::definition::{RequestKind, RequestTask, Strategy, Task, TaskAction, TransformTask};
use crate::dispatcher::{self, Dispatcher, ResolvedRequest};
use crate::error::{PipelineError, Result};
use crate::path::PropertyPath;
use crate::template::{Locals, TemplateRenderer};

/// State of one task within a plan run.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed(String),
}

/// Status of a plan run.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionStatus {
    /// Every task completed.
    Completed,
    /// A task failed; later tasks never ran.
    Failed(String),
    /// Tasks remain to run.
    Running,
}

/// Per-task state tracking for one plan run.
#[derive(Debug, Clone)]
pub struct PlanExecution {
    /// Run identifier for log correlation.
    pub execution_id: String,
    states: IndexMap<String, TaskState>,
}

impl PlanExecution {
    /// Track every task of `plan` as pending.
    pub fn new(plan: &IndexMap<String, Task>) -> Self {
        Self {
            execution_id: uuid::Uuid::new_v4().to_string(),
            states: plan
                .keys()
                .map(|name| (name.clone(), TaskState::Pending))
                .collect(),
        }
    }

    pub fn state(&self, task: &str) -> Option<&TaskState> {
        self.states.get(task)
    }

    pub fn states(&self) -> impl Iterator<Item = (&str, &TaskState)> {
        self.states.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// `Failed` at the first failure, `Completed` once all tasks completed.
    pub fn status(&self) -> ExecutionStatus {
        if let Some(msg) = self.states.values().find_map(|s| match s {
            TaskState::Failed(msg) => Some(msg.clone()),
            _ => None,
        }) {
            return ExecutionStatus::Failed(msg);
        }
        if self.states.values().all(|s| *s == TaskState::Completed) {
            ExecutionStatus::Completed
        } else {
            ExecutionStatus::Running
        }
    }

    fn mark(&mut self, task: &str, state: TaskState) {
        self.states.insert(task.to_string(), state);
    }
}

/// Runs plans against a [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    dispatcher: Dispatcher,
}

impl ExecutionEngine {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Execute `plan` in order, recording task states in `execution`.
    pub async fn execute(
        &self,
        plan: &IndexMap<String, Task>,
        ctx: &mut VariableContext,
        renderer: &mut TemplateRenderer,
        execution: &mut PlanExecution,
    ) -> Result<()> {
        info!(
            execution_id = %execution.execution_id,
            tasks = plan.len(),
            "Executing plan"
        );

        for (name, task) in plan {
            execution.mark(name, TaskState::Running);
            debug!(task = %name, "Task started");

            let outcome = match &task.action {
                TaskAction::Transform(transform) => {
                    self.run_transform(name, transform, ctx, renderer)
                }
                TaskAction::Request(request) => {
                    self.run_request(name, request, ctx, renderer).await
                }
            };

            if let Err(e) = outcome {
                warn!(task = %name, error = %e, "Task failed");
                execution.mark(name, TaskState::Failed(e.to_string()));
                return Err(e);
            }
            execution.mark(name, TaskState::Completed);
            debug!(task = %name, "Task completed");
        }

        info!(execution_id = %execution.execution_id, "Plan completed");
        Ok(())
    }

    fn run_transform(
        &self,
        name: &str,
        transform: &TransformTask,
        ctx: &mut VariableContext,
        renderer: &mut TemplateRenderer,
    ) -> Result<()> {
        let mut locals = Locals::default();
        for expression in &transform.expressions {
            debug!(task = name, expression = %expression, "Executing transform");
            renderer.run_expression(expression, ctx, &mut locals)?;
        }
        Ok(())
    }

    async fn run_request(
        &self,
        name: &str,
        request: &RequestTask,
        ctx: &mut VariableContext,
        renderer: &mut TemplateRenderer,
    ) -> Result<()> {
        match request.strategy {
            Strategy::Single => {
                let mut locals = Locals::default();
                let resolved = resolve_request(request, ctx, renderer, &mut locals)?;
                let result = self.dispatcher.dispatch(name, &resolved).await?;
                ctx.store_result(name, result);
                Ok(())
            }
            Strategy::Repeat => self.run_repeat(name, request, ctx, renderer).await,
        }
    }

    async fn run_repeat(
        &self,
        name: &str,
        request: &RequestTask,
        ctx: &mut VariableContext,
        renderer: &mut TemplateRenderer,
    ) -> Result<()> {
        let collection = request.collection.as_ref().ok_or_else(|| {
            PipelineError::InvalidConfiguration(format!(
                "task '{}': repeat strategy requires a 'collection'",
                name
            ))
        })?;
        let elements = resolve_collection(name, collection, ctx)?;
        debug!(task = name, collection = %collection, elements = elements.len(), "Repeating request");

        if request.kind == RequestKind::GetConversation {
            let ids = dispatcher::conversation_ids(name, Some(&Value::Array(elements)))?;
            let result = self.dispatcher.conversations(name, &ids).await?;
            ctx.store_result(name, result);
            return Ok(());
        }

        let mut responses = Vec::new();
        for (index, element) in elements.into_iter().enumerate() {
            let mut locals = Locals::record(element, index);
            let resolved = resolve_request(request, ctx, renderer, &mut locals)?;
            let response = self.dispatcher.dispatch(name, &resolved).await?;

            match &request.destination {
                Some(destination) => {
                    let rendered = renderer.render_str(destination, ctx, &mut locals)?;
                    write_destination(collection, index, rendered.trim(), response, ctx)?;
                }
                None => responses.push(response),
            }
        }

        if request.destination.is_none() {
            ctx.store_result(name, Value::Array(responses));
        }
        Ok(())
    }
}

/// Resolve body and parameters, then run request-level transforms.
fn resolve_request(
    request: &RequestTask,
    ctx: &mut VariableContext,
    renderer: &mut TemplateRenderer,
    locals: &mut Locals,
) -> Result<ResolvedRequest> {
    let body = renderer.render_value(&request.body, ctx, locals)?;
    let parameters = renderer.render_value(&request.parameters, ctx, locals)?;
    let mut resolved = ResolvedRequest {
        kind: request.kind,
        body,
        parameters,
        get_all_pages: request.get_all_pages,
    };

    if !request.transforms.is_empty() {
        locals.request = Some(resolved.to_value());
        let outcome = request
            .transforms
            .iter()
            .try_for_each(|expression| renderer.run_expression(expression, ctx, locals));
        let transformed = locals.request.take();
        outcome?;
        if let Some(value) = transformed {
            resolved.update_from(value);
        }
    }
    Ok(resolved)
}

/// The array a Repeat iterates, copied out of the context.
fn resolve_collection(
    task: &str,
    collection: &PropertyPath,
    ctx: &VariableContext,
) -> Result<Vec<Value>> {
    match ctx.get(collection) {
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(other) => Err(PipelineError::InvalidConfiguration(format!(
            "task '{}': collection '{}' is {}, not an array",
            task,
            collection,
            crate::path::type_name(other)
        ))),
        None => Err(PipelineError::InvalidConfiguration(format!(
            "task '{}': collection '{}' does not exist",
            task, collection
        ))),
    }
}

/// Store a Repeat response: `def.`-prefixed destinations are context paths,
/// anything else is relative to the collection element.
///
/// A relative destination on a scalar element (a bare id, say) is a path
/// error and fails the task; nothing is written for that element.
fn write_destination(
    collection: &PropertyPath,
    index: usize,
    destination: &str,
    response: Value,
    ctx: &mut VariableContext,
) -> Result<()> {
    let parsed = PropertyPath::parse(destination)?;
    let target = match parsed.strip_root("def") {
        Some(path) => path,
        None => PropertyPath::parse(&format!("{}[{}].{}", collection, index, parsed))?,
    };
    debug!(destination = %target, "Storing repeat response");
    ctx.set(&target, response)
}
