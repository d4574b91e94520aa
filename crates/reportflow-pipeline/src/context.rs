//! Variable context for one configuration run.
//!
//! Holds two bags that templates read from:
//!
//! - `vars`: custom data merged from every layer plus values derived from
//!   `vars.date`, `vars.interval` and `vars.timezoneOverride`
//! - `data`: task results keyed by task name
//!
//! Derived values are recomputed whenever custom data is merged. All dates
//! are formatted `YYYY-MM-DDTHH:mm:ss.SSS±HH:MM`.

use std::fmt::Display;

use chrono::{
    DateTime, Datelike, Days, Local, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta,
    TimeZone, Timelike, Utc,
};
use chrono_tz::Tz;
use serde_json::{Map, Value, json};

use crate::error::{PipelineError, Result};
use crate::interval::IsoDuration;
use crate::path::PropertyPath;

/// Interval used until custom data overrides it.
pub const DEFAULT_INTERVAL: &str = "PT30M";

/// Output format for every derived date.
///
/// The offset carries a colon (`+02:00`, `-04:00`), not the compact `+0200`
/// form; templates comparing date strings must use the same shape.
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%:z";

/// Upper bound on interval steps from start-of-day.
const MAX_INTERVAL_STEPS: usize = 1440;

/// Time zone derivations run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    /// Host local time.
    Local,
    /// IANA zone from `timezoneOverride`.
    Named(Tz),
}

impl Zone {
    /// Parse an IANA zone name.
    pub fn from_name(name: &str) -> Result<Self> {
        name.parse::<Tz>().map(Zone::Named).map_err(|_| {
            PipelineError::InvalidConfiguration(format!("unknown time zone '{}'", name))
        })
    }

    /// Format an instant in this zone.
    pub fn format(&self, instant: DateTime<Utc>, format: &str) -> String {
        match self {
            Zone::Local => instant.with_timezone(&Local).format(format).to_string(),
            Zone::Named(tz) => instant.with_timezone(tz).format(format).to_string(),
        }
    }

    /// Format an instant with [`DATE_FORMAT`].
    pub fn format_iso(&self, instant: DateTime<Utc>) -> String {
        self.format(instant, DATE_FORMAT)
    }

    /// Add a duration to an instant using this zone's calendar.
    pub fn add(&self, instant: DateTime<Utc>, duration: &IsoDuration) -> Option<DateTime<Utc>> {
        match self {
            Zone::Local => duration
                .add_to(instant.with_timezone(&Local))
                .map(|d| d.with_timezone(&Utc)),
            Zone::Named(tz) => duration
                .add_to(instant.with_timezone(tz))
                .map(|d| d.with_timezone(&Utc)),
        }
    }

    fn derive(&self, instant: DateTime<Utc>, interval: &IsoDuration) -> Result<Map<String, Value>> {
        match self {
            Zone::Local => derive_in(instant.with_timezone(&Local), interval),
            Zone::Named(tz) => derive_in(instant.with_timezone(tz), interval),
        }
    }
}

/// Parse an instant from an RFC 3339 string or epoch milliseconds.
pub fn parse_instant(value: &Value) -> Result<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| {
                PipelineError::InvalidConfiguration(format!("invalid date '{}': {}", s, e))
            }),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| {
                PipelineError::InvalidConfiguration(format!("invalid epoch milliseconds {}", n))
            }),
        other => Err(PipelineError::InvalidConfiguration(format!(
            "invalid date {}",
            other
        ))),
    }
}

/// Live variable and data bags for one configuration run.
#[derive(Debug, Clone)]
pub struct VariableContext {
    vars: Value,
    data: Value,
    zone: Zone,
    instant: DateTime<Utc>,
    interval: IsoDuration,
}

impl VariableContext {
    /// Fresh context at the current time with the default interval.
    pub fn initialize(args: Value) -> Result<Self> {
        Self::initialize_at(Utc::now(), args)
    }

    /// Fresh context anchored at `now`.
    pub fn initialize_at(now: DateTime<Utc>, args: Value) -> Result<Self> {
        let vars = json!({
            "args": args,
            "date": now.to_rfc3339(),
            "interval": DEFAULT_INTERVAL,
        });
        let mut ctx = Self {
            vars,
            data: Value::Object(Map::new()),
            zone: Zone::Local,
            instant: now,
            interval: IsoDuration::from_millis(30 * 60 * 1000),
        };
        ctx.derive()?;
        Ok(ctx)
    }

    /// Shallow-merge `source` into `vars`, last write wins, then re-derive.
    pub fn merge_custom_data(&mut self, source: &Map<String, Value>) -> Result<()> {
        if let Value::Object(vars) = &mut self.vars {
            for (key, value) in source {
                vars.insert(key.clone(), value.clone());
            }
        }
        self.derive()
    }

    /// Merge every layer in precedence order.
    pub fn apply_layers(&mut self, layers: &CustomDataLayers) -> Result<()> {
        self.merge_custom_data(&layers.flatten())
    }

    pub fn vars(&self) -> &Value {
        &self.vars
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn zone(&self) -> Zone {
        self.zone
    }

    /// The instant derivations are anchored at.
    pub fn instant(&self) -> DateTime<Utc> {
        self.instant
    }

    pub fn interval(&self) -> IsoDuration {
        self.interval
    }

    /// Store a task result under `data[task]`.
    pub fn store_result(&mut self, task: &str, value: Value) {
        if let Value::Object(data) = &mut self.data {
            data.insert(task.to_string(), value);
        }
    }

    /// Whether `data[task]` exists.
    pub fn has_result(&self, task: &str) -> bool {
        self.data.get(task).is_some()
    }

    /// Read a `vars.`/`data.` rooted path.
    pub fn get(&self, path: &PropertyPath) -> Option<&Value> {
        let root = match path.root()? {
            "vars" => &self.vars,
            "data" => &self.data,
            _ => return None,
        };
        path.tail().get(root)
    }

    /// Write at a `vars.`/`data.` rooted path.
    pub fn set(&mut self, path: &PropertyPath, value: Value) -> Result<()> {
        let tail = path.tail();
        if tail.is_empty() {
            return Err(PipelineError::Path(format!("cannot replace '{}'", path)));
        }
        tail.set(self.root_mut(path)?, value)
    }

    /// Append at a `vars.`/`data.` rooted path.
    pub fn push(&mut self, path: &PropertyPath, value: Value) -> Result<()> {
        let tail = path.tail();
        if tail.is_empty() {
            return Err(PipelineError::Path(format!("cannot push to '{}'", path)));
        }
        tail.push(self.root_mut(path)?, value)
    }

    /// Mutable access to a collection element or other node.
    pub fn get_mut_root(&mut self, name: &str) -> Option<&mut Value> {
        match name {
            "vars" => Some(&mut self.vars),
            "data" => Some(&mut self.data),
            _ => None,
        }
    }

    fn root_mut(&mut self, path: &PropertyPath) -> Result<&mut Value> {
        let name = path.root().unwrap_or_default().to_string();
        self.get_mut_root(&name).ok_or_else(|| {
            PipelineError::Path(format!(
                "'{}' must start with 'vars' or 'data'",
                path
            ))
        })
    }

    /// Recompute derived values from `date`, `interval` and `timezoneOverride`.
    fn derive(&mut self) -> Result<()> {
        let zone = match self.vars.get("timezoneOverride") {
            Some(Value::String(name)) if !name.trim().is_empty() => Zone::from_name(name.trim())?,
            _ => Zone::Local,
        };

        let instant = match self.vars.get("date") {
            Some(date) => parse_instant(date)?,
            None => self.instant,
        };

        let interval = match self.vars.get("interval") {
            Some(Value::String(s)) => IsoDuration::parse(s)?,
            Some(other) => {
                return Err(PipelineError::InvalidConfiguration(format!(
                    "interval must be an ISO-8601 duration string, got {}",
                    other
                )));
            }
            None => IsoDuration::parse(DEFAULT_INTERVAL)?,
        };
        if interval.is_zero() {
            return Err(PipelineError::InvalidConfiguration(
                "interval must be longer than zero".into(),
            ));
        }

        let derived = zone.derive(instant, &interval)?;
        if let Value::Object(vars) = &mut self.vars {
            vars.insert("date".into(), Value::String(zone.format_iso(instant)));
            vars.extend(derived);
        }

        self.zone = zone;
        self.instant = instant;
        self.interval = interval;
        Ok(())
    }
}

fn overflow() -> PipelineError {
    PipelineError::InvalidConfiguration("date arithmetic out of range".into())
}

/// Resolve a local wall-clock time, stepping over a DST gap.
fn localize<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Result<DateTime<Tz>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + TimeDelta::hours(1))).earliest())
        .ok_or_else(overflow)
}

fn midnight<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> Result<DateTime<Tz>> {
    localize(tz, date.and_time(NaiveTime::MIN))
}

fn derive_in<Tz: TimeZone>(now: DateTime<Tz>, interval: &IsoDuration) -> Result<Map<String, Value>>
where
    Tz::Offset: Display,
{
    let tz = now.timezone();
    let date = now.date_naive();
    let fmt = |d: &DateTime<Tz>| Value::String(d.format(DATE_FORMAT).to_string());

    let into_hour = TimeDelta::seconds(i64::from(now.minute() * 60 + now.second()))
        + TimeDelta::nanoseconds(i64::from(now.nanosecond()));
    let current_hour = now.clone() - into_hour;
    let previous_hour = current_hour.clone() - TimeDelta::hours(1);

    let current_day = midnight(&tz, date)?;
    let previous_day = midnight(&tz, date.pred_opt().ok_or_else(overflow)?)?;

    let week_start = date - Days::new(u64::from(date.weekday().num_days_from_monday()));
    let current_week = midnight(&tz, week_start)?;
    let previous_week = midnight(&tz, week_start - Days::new(7))?;

    let month_start = date.with_day(1).ok_or_else(overflow)?;
    let current_month = midnight(&tz, month_start)?;
    let previous_month = midnight(
        &tz,
        month_start.checked_sub_months(Months::new(1)).ok_or_else(overflow)?,
    )?;

    let quarter_month = (date.month0() / 3) * 3 + 1;
    let quarter_start = NaiveDate::from_ymd_opt(date.year(), quarter_month, 1).ok_or_else(overflow)?;
    let current_quarter = midnight(&tz, quarter_start)?;
    let previous_quarter = midnight(
        &tz,
        quarter_start.checked_sub_months(Months::new(3)).ok_or_else(overflow)?,
    )?;

    let year_start = NaiveDate::from_ymd_opt(date.year(), 1, 1).ok_or_else(overflow)?;
    let current_year = midnight(&tz, year_start)?;
    let previous_year = midnight(
        &tz,
        NaiveDate::from_ymd_opt(date.year() - 1, 1, 1).ok_or_else(overflow)?,
    )?;

    let mut current_start = current_day.clone();
    for _ in 0..MAX_INTERVAL_STEPS {
        match interval.add_to(current_start.clone()) {
            Some(next) if next <= now => current_start = next,
            _ => break,
        }
    }
    let previous_start = interval.sub_from(current_start.clone()).ok_or_else(overflow)?;
    let current_end = interval.add_to(current_start.clone()).ok_or_else(overflow)?;
    let previous_end = interval.add_to(previous_start.clone()).ok_or_else(overflow)?;

    let span = |start: &DateTime<Tz>, end: &DateTime<Tz>| {
        Value::String(format!(
            "{}/{}",
            start.format(DATE_FORMAT),
            end.format(DATE_FORMAT)
        ))
    };

    let mut out = Map::new();
    out.insert("currentHour".into(), fmt(&current_hour));
    out.insert("previousHour".into(), fmt(&previous_hour));
    out.insert("previousMidnight".into(), fmt(&current_day));
    out.insert("currentDay".into(), fmt(&current_day));
    out.insert("previousDay".into(), fmt(&previous_day));
    out.insert("currentWeek".into(), fmt(&current_week));
    out.insert("previousWeek".into(), fmt(&previous_week));
    out.insert("currentMonth".into(), fmt(&current_month));
    out.insert("previousMonth".into(), fmt(&previous_month));
    out.insert("currentQuarter".into(), fmt(&current_quarter));
    out.insert("previousQuarter".into(), fmt(&previous_quarter));
    out.insert("currentYear".into(), fmt(&current_year));
    out.insert("previousYear".into(), fmt(&previous_year));
    out.insert("currentIntervalStart".into(), fmt(&current_start));
    out.insert("previousIntervalStart".into(), fmt(&previous_start));
    out.insert("currentInterval".into(), span(&current_start, &current_end));
    out.insert("previousInterval".into(), span(&previous_start, &previous_end));
    Ok(out)
}

// ---------------------------------------------------------------------------
// Custom-data layering
// ---------------------------------------------------------------------------

/// Custom-data layer rank, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Precedence {
    Global,
    Job,
    Configuration,
    Request,
    Transform,
    Template,
    Export,
}

/// One source of custom data.
#[derive(Debug, Clone)]
pub struct CustomDataLayer {
    pub precedence: Precedence,
    /// Where the layer came from, for logging.
    pub source: String,
    pub data: Map<String, Value>,
}

/// Ordered collection of custom-data layers.
///
/// Layers may be pushed in any order; [`CustomDataLayers::flatten`] folds them
/// by rank so a higher-precedence layer always wins. Layers of equal rank
/// apply in insertion order.
#[derive(Debug, Clone, Default)]
pub struct CustomDataLayers {
    layers: Vec<CustomDataLayer>,
}

impl CustomDataLayers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a layer. Empty maps are skipped.
    pub fn push(&mut self, precedence: Precedence, source: impl Into<String>, data: &Map<String, Value>) {
        if data.is_empty() {
            return;
        }
        self.layers.push(CustomDataLayer {
            precedence,
            source: source.into(),
            data: data.clone(),
        });
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Fold all layers, last write wins by precedence rank.
    pub fn flatten(&self) -> Map<String, Value> {
        let mut ordered: Vec<&CustomDataLayer> = self.layers.iter().collect();
        ordered.sort_by_key(|layer| layer.precedence);
        let mut merged = Map::new();
        for layer in ordered {
            tracing::trace!(source = %layer.source, keys = layer.data.len(), "merging custom data");
            for (key, value) in &layer.data {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    }
}
