//! Extension functions callable from templates.
//!
//! Pure helpers return a value. The effect functions `assign`, `push` and
//! `write_data` only record an [`Effect`]; the renderer applies recorded
//! effects to the context once the render finishes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::DateTime;
use chrono::format::{Item, StrftimeItems};
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use tera::Tera;

use crate::context::{DATE_FORMAT, Zone, parse_instant};
use crate::interval::IsoDuration;

type Args = HashMap<String, Value>;

/// A context mutation requested by a template.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Assign `value` at a `vars.`/`data.`/`request.` path.
    Assign { path: String, value: Value },
    /// Append `value` to the array at a path.
    Push { path: String, value: Value },
    /// Write `value` as pretty JSON to a file.
    WriteData { path: String, value: Value },
}

/// Shared journal of effects recorded during a render.
pub type EffectLog = Arc<Mutex<Vec<Effect>>>;

/// Register every extension function on `tera`.
pub(crate) fn register(tera: &mut Tera, effects: &EffectLog, zone: Zone, base_dir: PathBuf) {
    tera.register_function("format_date", move |args: &Args| format_date(args, zone));
    tera.register_function("add_duration", add_duration);
    tera.register_function("parse_interval", parse_interval);
    tera.register_function("get_metric", get_metric);
    tera.register_function("count", count);
    tera.register_function("flatten_aggregate", flatten_aggregate);
    tera.register_function("json_stringify", json_stringify);
    tera.register_function("count_segments", count_segments);
    tera.register_function("set_customer_participants", set_customer_participants);
    tera.register_function("add_segments_to_participant", add_segments_to_participant);
    tera.register_function("load_file", move |args: &Args| load_file(args, &base_dir));

    let log = Arc::clone(effects);
    tera.register_function("assign", move |args: &Args| {
        record(&log, "assign", args, |path, value| Effect::Assign { path, value })
    });
    let log = Arc::clone(effects);
    tera.register_function("push", move |args: &Args| {
        record(&log, "push", args, |path, value| Effect::Push { path, value })
    });
    let log = Arc::clone(effects);
    tera.register_function("write_data", move |args: &Args| {
        record(&log, "write_data", args, |path, value| Effect::WriteData { path, value })
    });
}

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

fn required<'a>(function: &str, args: &'a Args, key: &str) -> tera::Result<&'a Value> {
    args.get(key).ok_or_else(|| {
        tera::Error::msg(format!(
            "Function `{}` requires the `{}` argument",
            function, key
        ))
    })
}

fn required_str<'a>(function: &str, args: &'a Args, key: &str) -> tera::Result<&'a str> {
    required(function, args, key)?.as_str().ok_or_else(|| {
        tera::Error::msg(format!(
            "Function `{}`: `{}` must be a string",
            function, key
        ))
    })
}

fn optional_str<'a>(function: &str, args: &'a Args, key: &str) -> tera::Result<Option<&'a str>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(tera::Error::msg(format!(
            "Function `{}`: `{}` must be a string",
            function, key
        ))),
    }
}

fn record(
    log: &EffectLog,
    function: &str,
    args: &Args,
    build: impl FnOnce(String, Value) -> Effect,
) -> tera::Result<Value> {
    let path = required_str(function, args, "path")?.to_string();
    let value = required(function, args, "value")?.clone();
    log.lock().push(build(path, value));
    Ok(Value::Null)
}

// ---------------------------------------------------------------------------
// Date helpers
// ---------------------------------------------------------------------------

fn format_date(args: &Args, zone: Zone) -> tera::Result<Value> {
    let value = required("format_date", args, "value")?;
    let format = optional_str("format_date", args, "format")?.unwrap_or(DATE_FORMAT);
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(tera::Error::msg(format!(
            "Function `format_date`: invalid format '{}'",
            format
        )));
    }
    let instant = parse_instant(value).map_err(|e| tera::Error::msg(e.to_string()))?;
    Ok(Value::String(zone.format(instant, format)))
}

fn add_duration(args: &Args) -> tera::Result<Value> {
    let date = required_str("add_duration", args, "date")?;
    let duration = required_str("add_duration", args, "duration")?;
    let parsed = DateTime::parse_from_rfc3339(date)
        .map_err(|e| tera::Error::msg(format!("Function `add_duration`: invalid date '{}': {}", date, e)))?;
    let duration = IsoDuration::parse(duration).map_err(|e| tera::Error::msg(e.to_string()))?;
    let shifted = duration
        .add_to(parsed)
        .ok_or_else(|| tera::Error::msg("Function `add_duration`: date out of range"))?;
    Ok(Value::String(shifted.format(DATE_FORMAT).to_string()))
}

fn parse_interval(args: &Args) -> tera::Result<Value> {
    let interval = required_str("parse_interval", args, "interval")?;
    let (start, end) = interval.split_once('/').ok_or_else(|| {
        tera::Error::msg(format!(
            "Function `parse_interval`: '{}' is not a <start>/<end> interval",
            interval
        ))
    })?;
    let parse = |s: &str| {
        DateTime::parse_from_rfc3339(s.trim())
            .map(|d| Value::String(d.format(DATE_FORMAT).to_string()))
            .map_err(|e| tera::Error::msg(format!("Function `parse_interval`: '{}': {}", s, e)))
    };
    Ok(json!({ "start": parse(start)?, "end": parse(end)? }))
}

// ---------------------------------------------------------------------------
// Data helpers
// ---------------------------------------------------------------------------

fn get_metric(args: &Args) -> tera::Result<Value> {
    let metrics = required("get_metric", args, "metrics")?;
    let name = required_str("get_metric", args, "name")?;
    let found = metrics
        .as_array()
        .into_iter()
        .flatten()
        .find(|m| {
            m.get("metric")
                .and_then(Value::as_str)
                .is_some_and(|metric| metric.eq_ignore_ascii_case(name))
        })
        .cloned();
    Ok(found.unwrap_or(Value::Null))
}

fn count(args: &Args) -> tera::Result<Value> {
    let n = match required("count", args, "value")? {
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        Value::String(s) => s.chars().count(),
        Value::Null => 0,
        other => {
            return Err(tera::Error::msg(format!(
                "Function `count`: cannot count {}",
                other
            )));
        }
    };
    Ok(json!(n))
}

fn json_stringify(args: &Args) -> tera::Result<Value> {
    let value = required("json_stringify", args, "value")?;
    serde_json::to_string_pretty(value)
        .map(Value::String)
        .map_err(|e| tera::Error::msg(format!("Function `json_stringify`: {}", e)))
}

/// Milliseconds to whole seconds.
fn ms_to_seconds(value: &mut Value) {
    if let Some(ms) = value.as_f64()
        && ms != 0.0
    {
        *value = json!((ms / 1000.0).round() as i64);
    }
}

fn flatten_aggregate(args: &Args) -> tera::Result<Value> {
    let mut response = required("flatten_aggregate", args, "response")?.clone();
    let ensure: Vec<String> = optional_str("flatten_aggregate", args, "ensure")?
        .unwrap_or("")
        .split('|')
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    let results = match response.get_mut("results") {
        Some(Value::Array(results)) => results,
        _ => return Ok(response),
    };

    for result in results.iter_mut() {
        let mut flat = Map::new();
        if let Some(Value::Array(rows)) = result.get_mut("data") {
            for (i, row) in rows.iter_mut().enumerate() {
                let mut flat_metrics = Map::new();
                if let Some(Value::Array(metrics)) = row.get_mut("metrics") {
                    for metric in metrics.iter_mut() {
                        if let Some(stats) = metric.get_mut("stats") {
                            for key in ["max", "sum"] {
                                if let Some(stat) = stats.get_mut(key) {
                                    ms_to_seconds(stat);
                                }
                            }
                        }
                        if let Some(name) = metric.get("metric").and_then(Value::as_str) {
                            flat_metrics.insert(name.to_string(), metric.clone());
                        }
                    }
                }
                for name in &ensure {
                    flat_metrics.entry(name.clone()).or_insert_with(|| {
                        json!({ "metric": name, "stats": { "max": 0, "count": 0, "sum": 0 } })
                    });
                }
                if let Value::Object(row_map) = row {
                    row_map.insert("flatMetrics".into(), Value::Object(flat_metrics));
                }
                flat.insert(format!("c{}", i), row.clone());
            }
        }
        if let Value::Object(result_map) = result {
            result_map.insert("flatData".into(), Value::Object(flat));
        }
    }

    Ok(response)
}

/// Apply `f` to every participant of every conversation in a detail result.
fn for_each_conversation(data: &mut Value, mut f: impl FnMut(&mut Map<String, Value>)) {
    if let Some(Value::Array(conversations)) = data.get_mut("conversations") {
        for conversation in conversations.iter_mut() {
            if let Value::Object(map) = conversation {
                f(map);
            }
        }
    }
}

fn participants_mut(conversation: &mut Map<String, Value>) -> impl Iterator<Item = &mut Map<String, Value>> {
    conversation
        .get_mut("participants")
        .and_then(Value::as_array_mut)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object_mut)
}

fn len_of(value: Option<&Value>) -> usize {
    value.and_then(Value::as_array).map_or(0, Vec::len)
}

fn count_segments(args: &Args) -> tera::Result<Value> {
    let mut data = required("count_segments", args, "data")?.clone();
    for_each_conversation(&mut data, |conversation| {
        for participant in participants_mut(conversation) {
            let sessions = len_of(participant.get("sessions"));
            participant.insert("sessionCount".into(), json!(sessions));
            if let Some(Value::Array(sessions)) = participant.get_mut("sessions") {
                for session in sessions.iter_mut().filter_map(Value::as_object_mut) {
                    let segments = len_of(session.get("segments"));
                    session.insert("segmentCount".into(), json!(segments));
                }
            }
        }
    });
    Ok(data)
}

fn set_customer_participants(args: &Args) -> tera::Result<Value> {
    let mut data = required("set_customer_participants", args, "data")?.clone();
    for_each_conversation(&mut data, |conversation| {
        let mut customer = None;
        let mut queue = None;
        for participant in participants_mut(conversation) {
            match participant.get("purpose").and_then(Value::as_str) {
                Some("customer") => {
                    let mut found = participant.clone();
                    let ani = found
                        .get("sessions")
                        .and_then(Value::as_array)
                        .into_iter()
                        .flatten()
                        .filter_map(|s| s.get("ani"))
                        .filter(|ani| !ani.is_null())
                        .last()
                        .cloned();
                    if let Some(ani) = ani {
                        found.insert("ani".into(), ani);
                    }
                    customer = Some(Value::Object(found));
                }
                Some("acd") => queue = Some(Value::Object(participant.clone())),
                _ => {}
            }
        }
        if let Some(customer) = customer {
            conversation.insert("customerParticipant".into(), customer);
        }
        if let Some(queue) = queue {
            conversation.insert("queue".into(), queue);
        }
    });
    Ok(data)
}

fn add_segments_to_participant(args: &Args) -> tera::Result<Value> {
    let mut data = required("add_segments_to_participant", args, "data")?.clone();
    for_each_conversation(&mut data, |conversation| {
        for participant in participants_mut(conversation) {
            if participant
                .get("participantName")
                .and_then(Value::as_str)
                .is_none_or(str::is_empty)
            {
                participant.insert("participantName".into(), json!("No Name"));
            }
            let first_session = participant
                .get("sessions")
                .and_then(|s| s.get(0))
                .cloned()
                .unwrap_or(Value::Null);
            for key in ["ani", "dnis", "direction"] {
                let value = first_session
                    .get(key)
                    .filter(|v| v.as_str().is_some_and(|s| !s.is_empty()))
                    .cloned()
                    .unwrap_or_else(|| json!("unknown"));
                participant.insert(key.into(), value);
            }
        }
    });
    Ok(data)
}

fn load_file(args: &Args, base_dir: &std::path::Path) -> tera::Result<Value> {
    let path = PathBuf::from(required_str("load_file", args, "path")?);
    let path = if path.is_relative() {
        base_dir.join(path)
    } else {
        path
    };
    std::fs::read_to_string(&path)
        .map(Value::String)
        .map_err(|e| tera::Error::msg(format!("Function `load_file`: {}: {}", path.display(), e)))
}
