//! Template rendering against a [`VariableContext`].
//!
//! Templates use Tera syntax and see these variables:
//!
//! - `vars`: custom data and derived dates
//! - `data`: task results keyed by task name
//! - `record` / `index`: the active collection element during a Repeat
//! - `request`: the resolved request inside request-level transforms
//!
//! A string that is exactly one `{{ path }}` expression keeps the JSON type
//! of the value it names; any other single expression that renders to a JSON
//! array or object is parsed back into that value. Everything else renders
//! to a string.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tera::Tera;
use tracing::{debug, trace};

use crate::context::{VariableContext, Zone};
use crate::error::{PipelineError, Result};
use crate::extensions::{self, Effect, EffectLog};
use crate::path::PropertyPath;

/// Render-local variables layered over the context.
#[derive(Debug, Clone, Default)]
pub struct Locals {
    /// Active collection element.
    pub record: Option<Value>,
    /// Position of the active element.
    pub index: Option<usize>,
    /// Resolved request, writable by `assign`/`push` on `request.` paths.
    pub request: Option<Value>,
}

impl Locals {
    pub fn record(record: Value, index: usize) -> Self {
        Self {
            record: Some(record),
            index: Some(index),
            request: None,
        }
    }

    fn lookup(&self, path: &PropertyPath) -> Option<Value> {
        let tail = path.tail();
        match path.root()? {
            "record" => tail.get(self.record.as_ref()?).cloned(),
            "request" => tail.get(self.request.as_ref()?).cloned(),
            "index" if tail.is_empty() => self.index.map(Value::from),
            _ => None,
        }
    }
}

/// Tera-backed renderer with the extension functions registered.
pub struct TemplateRenderer {
    tera: Tera,
    effects: EffectLog,
}

impl TemplateRenderer {
    /// Create a renderer. Relative paths given to `load_file` resolve
    /// against `base_dir`.
    pub fn new(zone: Zone, base_dir: impl Into<PathBuf>) -> Self {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        let effects = EffectLog::default();
        extensions::register(&mut tera, &effects, zone, base_dir.into());
        Self { tera, effects }
    }

    /// Render a template to a string, then apply recorded effects.
    pub fn render_str(
        &mut self,
        template: &str,
        ctx: &mut VariableContext,
        locals: &mut Locals,
    ) -> Result<String> {
        let tera_ctx = build_context(ctx, locals);
        let rendered = self.render_one(template, &tera_ctx);
        self.finish(rendered, ctx, locals)
    }

    /// Render every string leaf of a JSON tree, then apply recorded effects.
    ///
    /// - Strings: rendered (typed when a single expression)
    /// - Objects/Arrays: recursively resolved
    /// - Other types: returned unchanged
    pub fn render_value(
        &mut self,
        value: &Value,
        ctx: &mut VariableContext,
        locals: &mut Locals,
    ) -> Result<Value> {
        let tera_ctx = build_context(ctx, locals);
        let rendered = self.resolve_value(value, &tera_ctx, ctx, locals);
        self.finish(rendered, ctx, locals)
    }

    /// Render a transform expression for its effects.
    pub fn run_expression(
        &mut self,
        expression: &str,
        ctx: &mut VariableContext,
        locals: &mut Locals,
    ) -> Result<()> {
        trace!(expression, "executing transform expression");
        self.render_str(expression, ctx, locals).map(|_| ())
    }

    fn resolve_value(
        &mut self,
        value: &Value,
        tera_ctx: &tera::Context,
        ctx: &VariableContext,
        locals: &Locals,
    ) -> Result<Value> {
        match value {
            Value::String(s) => self.resolve_string(s, tera_ctx, ctx, locals),
            Value::Object(map) => {
                let mut resolved = serde_json::Map::new();
                for (k, v) in map {
                    resolved.insert(k.clone(), self.resolve_value(v, tera_ctx, ctx, locals)?);
                }
                Ok(Value::Object(resolved))
            }
            Value::Array(arr) => {
                let resolved: Result<Vec<Value>> = arr
                    .iter()
                    .map(|v| self.resolve_value(v, tera_ctx, ctx, locals))
                    .collect();
                Ok(Value::Array(resolved?))
            }
            other => Ok(other.clone()),
        }
    }

    fn resolve_string(
        &mut self,
        s: &str,
        tera_ctx: &tera::Context,
        ctx: &VariableContext,
        locals: &Locals,
    ) -> Result<Value> {
        if !is_template(s) {
            return Ok(Value::String(s.to_string()));
        }

        // If the entire string is exactly one path expression, preserve the JSON type
        if let Some(path) = single_path(s) {
            let found = match path.root() {
                Some("vars" | "data") => ctx.get(&path).cloned(),
                _ => locals.lookup(&path),
            };
            if let Some(value) = found {
                return Ok(value);
            }
        }

        let rendered = self.render_one(s, tera_ctx)?;
        if is_single_expression(s) {
            let trimmed = rendered.trim();
            if (trimmed.starts_with('[') || trimmed.starts_with('{'))
                && let Ok(value) = serde_json::from_str::<Value>(trimmed)
            {
                return Ok(value);
            }
        }
        Ok(Value::String(rendered))
    }

    fn render_one(&mut self, template: &str, tera_ctx: &tera::Context) -> Result<String> {
        if !is_template(template) {
            return Ok(template.to_string());
        }
        Ok(self.tera.render_str(template, tera_ctx)?)
    }

    /// Apply recorded effects after a render, discarding them on failure.
    fn finish<T>(
        &self,
        rendered: Result<T>,
        ctx: &mut VariableContext,
        locals: &mut Locals,
    ) -> Result<T> {
        let effects = std::mem::take(&mut *self.effects.lock());
        let value = rendered?;
        for effect in effects {
            apply_effect(effect, ctx, locals)?;
        }
        Ok(value)
    }
}

fn build_context(ctx: &VariableContext, locals: &Locals) -> tera::Context {
    let mut tera_ctx = tera::Context::new();
    tera_ctx.insert("vars", ctx.vars());
    tera_ctx.insert("data", ctx.data());
    if let Some(record) = &locals.record {
        tera_ctx.insert("record", record);
    }
    if let Some(index) = locals.index {
        tera_ctx.insert("index", &index);
    }
    if let Some(request) = &locals.request {
        tera_ctx.insert("request", request);
    }
    tera_ctx
}

fn apply_effect(effect: Effect, ctx: &mut VariableContext, locals: &mut Locals) -> Result<()> {
    match effect {
        Effect::Assign { path, value } => {
            let path = PropertyPath::parse(&path)?;
            debug!(path = %path, "assign");
            match path.root() {
                Some("request") => request_slot(&path, locals)
                    .and_then(|request| path.tail().set(request, value)),
                _ => ctx.set(&path, value),
            }
        }
        Effect::Push { path, value } => {
            let path = PropertyPath::parse(&path)?;
            match path.root() {
                Some("request") => request_slot(&path, locals)
                    .and_then(|request| path.tail().push(request, value)),
                _ => ctx.push(&path, value),
            }
        }
        Effect::WriteData { path, value } => write_data(Path::new(&path), &value),
    }
}

fn request_slot<'a>(path: &PropertyPath, locals: &'a mut Locals) -> Result<&'a mut Value> {
    if path.tail().is_empty() {
        return Err(PipelineError::Path(format!("cannot replace '{}'", path)));
    }
    locals.request.as_mut().ok_or_else(|| {
        PipelineError::Path(format!(
            "'{}' is only writable inside request transforms",
            path
        ))
    })
}

fn write_data(path: &Path, value: &Value) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(value)
        .map_err(|e| PipelineError::Template(format!("write_data: {}", e)))?;
    std::fs::write(path, contents)?;
    debug!(path = %path.display(), "wrote data file");
    Ok(())
}

fn is_template(s: &str) -> bool {
    s.contains("{{") || s.contains("{%")
}

/// `{{ expr }}` with nothing around it and no other tags.
fn is_single_expression(s: &str) -> bool {
    let trimmed = s.trim();
    trimmed.starts_with("{{")
        && trimmed.ends_with("}}")
        && trimmed.matches("{{").count() == 1
        && !trimmed.contains("{%")
}

/// The path inside a `{{ a.b[0].c }}` expression, if that is all there is.
fn single_path(s: &str) -> Option<PropertyPath> {
    if !is_single_expression(s) {
        return None;
    }
    let trimmed = s.trim();
    let inner = trimmed[2..trimmed.len() - 2].trim_matches('-').trim();
    if inner.is_empty()
        || !inner
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '[' | ']'))
    {
        return None;
    }
    PropertyPath::parse(inner).ok()
}

impl std::fmt::Debug for TemplateRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateRenderer")
            .field("pending_effects", &self.effects.lock().len())
            .finish()
    }
}
