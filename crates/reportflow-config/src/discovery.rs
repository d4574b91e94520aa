//! Config document discovery and loading.
//!
//! Resolution order (first match wins):
//! 1. Explicit `--config` path
//! 2. `REPORTFLOW_CONFIG` environment variable
//! 3. `./reportflow.json`, `./reportflow.toml`, `./reportflow.yaml`, `./reportflow.yml`

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::{ConfigError, Result};

/// Environment variable naming the config document.
pub const CONFIG_ENV: &str = "REPORTFLOW_CONFIG";

/// Project-local file names checked during discovery.
const PROJECT_CONFIG_FILES: &[&str] = &[
    "reportflow.json",
    "reportflow.toml",
    "reportflow.yaml",
    "reportflow.yml",
];

/// Application name for platform directory resolution.
const APP_NAME: &str = "reportflow";

/// Document syntax, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Toml,
    Yaml,
}

impl DocumentFormat {
    /// Detect the format from a path's extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "json" => Ok(DocumentFormat::Json),
            "toml" => Ok(DocumentFormat::Toml),
            "yaml" | "yml" => Ok(DocumentFormat::Yaml),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    /// Parse document text into a JSON value tree.
    pub fn parse(self, contents: &str, path: &Path) -> Result<Value> {
        let path = path.display().to_string();
        match self {
            DocumentFormat::Json => {
                serde_json::from_str(contents).map_err(|e| ConfigError::ParseJson {
                    path,
                    message: e.to_string(),
                })
            }
            DocumentFormat::Toml => toml::from_str(contents).map_err(|e| ConfigError::ParseToml {
                path,
                message: e.to_string(),
            }),
            DocumentFormat::Yaml => {
                serde_yaml::from_str(contents).map_err(|e| ConfigError::ParseYaml {
                    path,
                    message: e.to_string(),
                })
            }
        }
    }
}

/// A loaded, fully `$ref`-resolved config document.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    /// Path the document was loaded from.
    pub path: PathBuf,
    /// Directory relative paths in the document resolve against.
    pub base_dir: PathBuf,
    /// Syntax the document was written in.
    pub format: DocumentFormat,
    /// Resolved document tree.
    pub root: Value,
}

/// Find the config document to load.
pub fn discover_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    discover_in(explicit, std::env::var(CONFIG_ENV).ok(), &cwd)
}

fn discover_in(explicit: Option<&Path>, env_value: Option<String>, dir: &Path) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(value) = env_value
        && !value.is_empty()
    {
        return Ok(PathBuf::from(value));
    }
    PROJECT_CONFIG_FILES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.is_file())
        .ok_or_else(|| ConfigError::NotFound {
            env: CONFIG_ENV.to_string(),
        })
}

/// Read and parse a single document without resolving references.
pub fn read_document(path: &Path) -> Result<Value> {
    let format = DocumentFormat::from_path(path)?;
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    format.parse(&contents, path)
}

/// Load a config document and resolve every `$ref` in it.
pub fn load_document(path: &Path) -> Result<LoadedDocument> {
    let format = DocumentFormat::from_path(path)?;
    let raw = read_document(path)?;
    let root = crate::resolver::resolve_refs(raw, path)?;
    let base_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    tracing::debug!(path = %path.display(), ?format, "loaded config document");
    Ok(LoadedDocument {
        path: path.to_path_buf(),
        base_dir,
        format,
        root,
    })
}

/// Default directory for rolling log files.
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
        .join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("a.JSON")).unwrap(),
            DocumentFormat::Json
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("a.yml")).unwrap(),
            DocumentFormat::Yaml
        );
        assert!(matches!(
            DocumentFormat::from_path(Path::new("a.ini")),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_discover_explicit_wins() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("reportflow.json"), "{}").unwrap();
        let path = discover_in(
            Some(Path::new("/elsewhere/cfg.toml")),
            Some("/env/cfg.json".into()),
            dir.path(),
        )
        .unwrap();
        assert_eq!(path, PathBuf::from("/elsewhere/cfg.toml"));
    }

    #[test]
    fn test_discover_env_before_project_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("reportflow.json"), "{}").unwrap();
        let path = discover_in(None, Some("/env/cfg.json".into()), dir.path()).unwrap();
        assert_eq!(path, PathBuf::from("/env/cfg.json"));
    }

    #[test]
    fn test_discover_project_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("reportflow.yaml"), "jobs: {}").unwrap();
        let path = discover_in(None, Some(String::new()), dir.path()).unwrap();
        assert_eq!(path, dir.path().join("reportflow.yaml"));
    }

    #[test]
    fn test_discover_nothing() {
        let dir = TempDir::new().unwrap();
        let err = discover_in(None, None, dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn test_load_toml_preserves_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cfg.toml");
        fs::write(
            &path,
            r#"
[jobs.second]
cron = "0 * * * *"

[jobs.first]
cron = "30 * * * *"
"#,
        )
        .unwrap();
        let doc = load_document(&path).unwrap();
        let names: Vec<_> = doc.root["jobs"].as_object().unwrap().keys().collect();
        assert_eq!(names, vec!["second", "first"]);
        assert_eq!(doc.format, DocumentFormat::Toml);
        assert_eq!(doc.base_dir, dir.path());
    }

    #[test]
    fn test_load_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cfg.yaml");
        fs::write(&path, "api:\n  environment: mypurecloud.de\n").unwrap();
        let doc = load_document(&path).unwrap();
        assert_eq!(doc.root["api"]["environment"], "mypurecloud.de");
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cfg.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            load_document(&path),
            Err(ConfigError::ParseJson { .. })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_document(Path::new("/nonexistent/reportflow.json")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_default_log_dir() {
        assert!(default_log_dir().ends_with("reportflow/logs"));
    }
}
