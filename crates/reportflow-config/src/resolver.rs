//! `$ref` cross-reference resolution.
//!
//! Any object carrying a string `$ref` member is replaced by the node it
//! points at. References are either local (`#/definitions/x`) or name
//! another document relative to the referencing one
//! (`shared/plans.json#/detail`). Referenced nodes are resolved in turn,
//! in the context of the document they came from.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::discovery::read_document;
use crate::{ConfigError, Result};

const REF_KEY: &str = "$ref";

/// Resolve every `$ref` in `root`, which was loaded from `path`.
pub fn resolve_refs(root: Value, path: &Path) -> Result<Value> {
    let path = normalize(path);
    let mut resolver = Resolver::default();
    resolver.documents.insert(path.clone(), root.clone());
    resolver.resolve(root, &path)
}

#[derive(Default)]
struct Resolver {
    documents: HashMap<PathBuf, Value>,
    stack: Vec<String>,
}

impl Resolver {
    fn resolve(&mut self, node: Value, doc: &Path) -> Result<Value> {
        match node {
            Value::Object(map) => {
                if let Some(Value::String(reference)) = map.get(REF_KEY) {
                    return self.follow(reference, doc);
                }
                let mut out = Map::with_capacity(map.len());
                for (key, value) in map {
                    out.insert(key, self.resolve(value, doc)?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => items
                .into_iter()
                .map(|item| self.resolve(item, doc))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            other => Ok(other),
        }
    }

    fn follow(&mut self, reference: &str, doc: &Path) -> Result<Value> {
        let (file, pointer) = reference.split_once('#').unwrap_or((reference, ""));
        if !pointer.is_empty() && !pointer.starts_with('/') {
            return Err(ConfigError::DanglingRef {
                reference: reference.to_string(),
                reason: "pointer must start with '/'".to_string(),
            });
        }

        let target_doc = if file.is_empty() {
            doc.to_path_buf()
        } else {
            normalize(&doc.parent().unwrap_or(Path::new(".")).join(file))
        };

        let key = format!("{}#{}", target_doc.display(), pointer);
        if self.stack.contains(&key) {
            return Err(ConfigError::RefCycle(reference.to_string()));
        }

        let target = self
            .document(&target_doc)?
            .pointer(pointer)
            .cloned()
            .ok_or_else(|| ConfigError::DanglingRef {
                reference: reference.to_string(),
                reason: format!("no node at '{}' in {}", pointer, target_doc.display()),
            })?;

        self.stack.push(key);
        let resolved = self.resolve(target, &target_doc);
        self.stack.pop();
        resolved
    }

    fn document(&mut self, path: &Path) -> Result<&Value> {
        if !self.documents.contains_key(path) {
            let value = read_document(path)?;
            tracing::debug!(path = %path.display(), "loaded referenced document");
            self.documents.insert(path.to_path_buf(), value);
        }
        self.documents
            .get(path)
            .ok_or_else(|| ConfigError::DanglingRef {
                reference: path.display().to_string(),
                reason: "document not loaded".to_string(),
            })
    }
}

fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
