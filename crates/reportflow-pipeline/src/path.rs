//! Dot-separated property paths over JSON values.
//!
//! # Syntax
//!
//! - `data.queues.entities`: object fields
//! - `data.queues.entities[0].name`: array index
//! - `data.queues.entities.0.name`: numeric segment, same as `[0]`
//!
//! Writes create missing intermediate segments as empty objects.

use serde_json::{Map, Value};

use crate::error::{PipelineError, Result};

/// One step of a property path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Segment::Key(k) => write!(f, "{}", k),
            Segment::Index(i) => write!(f, "[{}]", i),
        }
    }
}

/// A parsed property path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyPath {
    raw: String,
    segments: Vec<Segment>,
}

impl PropertyPath {
    /// Parse a dot-separated path.
    ///
    /// `"task.items[0].name"` → `[Key(task), Key(items), Index(0), Key(name)]`
    pub fn parse(path: &str) -> Result<Self> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return Err(PipelineError::Path("empty property path".into()));
        }

        let mut segments = Vec::new();
        for part in trimmed.split('.') {
            let (name, mut rest) = match part.find('[') {
                Some(i) => (&part[..i], &part[i..]),
                None => (part, ""),
            };
            if name.is_empty() && rest.is_empty() {
                return Err(PipelineError::Path(format!(
                    "empty segment in path '{}'",
                    trimmed
                )));
            }
            if !name.is_empty() {
                segments.push(Segment::Key(name.to_string()));
            }
            while let Some(stripped) = rest.strip_prefix('[') {
                let end = stripped.find(']').ok_or_else(|| {
                    PipelineError::Path(format!("unclosed '[' in path '{}'", trimmed))
                })?;
                let index = stripped[..end].trim().parse::<usize>().map_err(|_| {
                    PipelineError::Path(format!(
                        "invalid index '{}' in path '{}'",
                        &stripped[..end],
                        trimmed
                    ))
                })?;
                segments.push(Segment::Index(index));
                rest = &stripped[end + 1..];
            }
            if !rest.is_empty() {
                return Err(PipelineError::Path(format!(
                    "unexpected '{}' in path '{}'",
                    rest, trimmed
                )));
            }
        }

        Ok(Self {
            raw: trimmed.to_string(),
            segments,
        })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// First segment name, if it is a key.
    pub fn root(&self) -> Option<&str> {
        match self.segments.first() {
            Some(Segment::Key(k)) => Some(k),
            _ => None,
        }
    }

    /// The path without its first segment.
    pub fn tail(&self) -> PropertyPath {
        let segments = self.segments.iter().skip(1).cloned().collect::<Vec<_>>();
        let raw = segments
            .iter()
            .map(Segment::to_string)
            .collect::<Vec<_>>()
            .join(".")
            .replace(".[", "[");
        PropertyPath { raw, segments }
    }

    /// Drop a leading segment equal to `prefix` (case-insensitive).
    pub fn strip_root(&self, prefix: &str) -> Option<PropertyPath> {
        match self.root() {
            Some(root) if root.eq_ignore_ascii_case(prefix) => Some(self.tail()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Read the value at this path.
    pub fn get<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(root, |current, segment| navigate(current, segment))
    }

    /// Write `value` at this path, creating intermediate objects.
    pub fn set(&self, root: &mut Value, value: Value) -> Result<()> {
        let slot = self.slot(root)?;
        *slot = value;
        Ok(())
    }

    /// Append `value` to the array at this path, creating it if missing.
    pub fn push(&self, root: &mut Value, value: Value) -> Result<()> {
        let slot = self.slot(root)?;
        if slot.is_null() {
            *slot = Value::Array(Vec::new());
        }
        match slot {
            Value::Array(items) => {
                items.push(value);
                Ok(())
            }
            other => Err(PipelineError::Path(format!(
                "cannot push to '{}': found {} instead of an array",
                self.raw,
                type_name(other)
            ))),
        }
    }

    /// Mutable slot at this path, creating missing object members on the way.
    fn slot<'a>(&self, root: &'a mut Value) -> Result<&'a mut Value> {
        let mut current = root;
        for segment in &self.segments {
            if current.is_null() {
                *current = Value::Object(Map::new());
            }
            current = match (segment, current) {
                (Segment::Key(key), Value::Object(map)) => {
                    map.entry(key.clone()).or_insert(Value::Null)
                }
                (Segment::Key(key), Value::Array(items)) => {
                    let index = key.parse::<usize>().map_err(|_| self.not_container(segment))?;
                    let len = items.len();
                    items.get_mut(index).ok_or_else(|| self.out_of_bounds(index, len))?
                }
                (Segment::Index(index), Value::Array(items)) => {
                    let len = items.len();
                    items
                        .get_mut(*index)
                        .ok_or_else(|| self.out_of_bounds(*index, len))?
                }
                _ => return Err(self.not_container(segment)),
            };
        }
        Ok(current)
    }

    fn not_container(&self, segment: &Segment) -> PipelineError {
        PipelineError::Path(format!(
            "cannot write '{}': segment '{}' does not address a container",
            self.raw, segment
        ))
    }

    fn out_of_bounds(&self, index: usize, len: usize) -> PipelineError {
        PipelineError::Path(format!(
            "cannot write '{}': index {} out of bounds (len {})",
            self.raw, index, len
        ))
    }
}

impl std::fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Navigate one segment of a path through a JSON value.
fn navigate<'a>(value: &'a Value, segment: &Segment) -> Option<&'a Value> {
    match (segment, value) {
        (Segment::Key(key), Value::Object(map)) => map.get(key),
        (Segment::Key(key), Value::Array(items)) => items.get(key.parse::<usize>().ok()?),
        (Segment::Index(i), Value::Array(items)) => items.get(*i),
        _ => None,
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_segments() {
        let path = PropertyPath::parse("data.items[0].name").unwrap();
        assert_eq!(
            path.segments(),
            &[
                Segment::Key("data".into()),
                Segment::Key("items".into()),
                Segment::Index(0),
                Segment::Key("name".into()),
            ]
        );
        assert_eq!(path.to_string(), "data.items[0].name");
    }

    #[test]
    fn test_parse_errors() {
        assert!(PropertyPath::parse("").is_err());
        assert!(PropertyPath::parse("a..b").is_err());
        assert!(PropertyPath::parse("a[x]").is_err());
        assert!(PropertyPath::parse("a[1").is_err());
    }

    #[test]
    fn test_get_nested_and_numeric_segments() {
        let value = json!({"a": {"list": [{"n": 1}, {"n": 2}]}});
        let bracket = PropertyPath::parse("a.list[1].n").unwrap();
        let dotted = PropertyPath::parse("a.list.1.n").unwrap();
        assert_eq!(bracket.get(&value), Some(&json!(2)));
        assert_eq!(dotted.get(&value), Some(&json!(2)));
        assert_eq!(PropertyPath::parse("a.missing").unwrap().get(&value), None);
    }

    #[test]
    fn test_set_creates_intermediate_maps() {
        let mut value = json!({});
        PropertyPath::parse("x.y.z")
            .unwrap()
            .set(&mut value, json!(5))
            .unwrap();
        assert_eq!(value, json!({"x": {"y": {"z": 5}}}));
    }

    #[test]
    fn test_set_into_array_element() {
        let mut value = json!({"rows": [{"id": "a"}, {"id": "b"}]});
        PropertyPath::parse("rows[1].detail.count")
            .unwrap()
            .set(&mut value, json!(3))
            .unwrap();
        assert_eq!(value["rows"][1]["detail"]["count"], 3);
        assert!(value["rows"][0].get("detail").is_none());
    }

    #[test]
    fn test_set_through_scalar_fails() {
        let mut value = json!({"x": 1});
        let err = PropertyPath::parse("x.y")
            .unwrap()
            .set(&mut value, json!(true))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Path(_)));
    }

    #[test]
    fn test_push_creates_array() {
        let mut value = json!({});
        let path = PropertyPath::parse("ids").unwrap();
        path.push(&mut value, json!("a")).unwrap();
        path.push(&mut value, json!("b")).unwrap();
        assert_eq!(value, json!({"ids": ["a", "b"]}));
    }

    #[test]
    fn test_push_onto_non_array_fails() {
        let mut value = json!({"ids": "a"});
        let err = PropertyPath::parse("ids")
            .unwrap()
            .push(&mut value, json!("b"))
            .unwrap_err();
        assert!(err.to_string().contains("instead of an array"));
    }

    #[test]
    fn test_strip_root() {
        let path = PropertyPath::parse("def.data.rows[2]").unwrap();
        let stripped = path.strip_root("DEF").unwrap();
        assert_eq!(stripped.root(), Some("data"));
        assert_eq!(stripped.to_string(), "data.rows[2]");
        assert!(path.strip_root("data").is_none());
    }
}
