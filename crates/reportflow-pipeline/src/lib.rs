//! Report pipeline for reportflow.
//!
//! A [`Job`] holds ordered [`Configuration`]s. Each configuration runs on a
//! fresh [`VariableContext`]: its execution plan is walked by the
//! [`ExecutionEngine`], which resolves request templates, dispatches through
//! the [`Dispatcher`] and stores results under `data`. Templates are then
//! rendered against the final context and written by the export sinks.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────────┐   ┌─────────────────┐
//! │  JobRunner   │──▶│ ExecutionEngine │──▶│   Dispatcher    │──▶ PlatformApi
//! │ (per config) │   │ (plan, in order)│   │ (paging, retry) │
//! └──────┬───────┘   └────────┬────────┘   └─────────────────┘
//!        │                    │
//!        ▼                    ▼
//!   export sinks      TemplateRenderer ◀──▶ VariableContext
//! ```

pub mod context;
pub mod definition;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod export;
mod extensions;
pub mod interval;
pub mod path;
pub mod retry;
pub mod runner;
pub mod scheduler;
pub mod template;

pub use context::{CustomDataLayer, CustomDataLayers, Precedence, VariableContext, Zone};
pub use definition::{
    Configuration, ExportDefinition, ExportKind, Job, RequestKind, RequestTask, Strategy, Task,
    TaskAction, TemplateDefinition, TemplateSource, TransformTask, load_jobs,
};
pub use dispatcher::{Dispatcher, ResolvedRequest};
pub use engine::{ExecutionEngine, ExecutionStatus, PlanExecution, TaskState};
pub use error::{PipelineError, Result};
pub use extensions::Effect;
pub use interval::IsoDuration;
pub use path::{PropertyPath, Segment};
pub use retry::RetryPolicy;
pub use runner::{ConfigurationReport, DocumentReport, JobReport, JobRunner, RunOptions, RunSummary};
pub use scheduler::{Scheduler, next_fire, parse_schedule};
pub use template::{Locals, TemplateRenderer};
