//! Configuration error types.

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration loading and resolution.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse TOML config '{path}': {message}")]
    ParseToml { path: String, message: String },

    /// Failed to parse YAML.
    #[error("failed to parse YAML config '{path}': {message}")]
    ParseYaml { path: String, message: String },

    /// Failed to parse JSON.
    #[error("failed to parse JSON config '{path}': {message}")]
    ParseJson { path: String, message: String },

    /// The file extension does not name a supported format.
    #[error("unsupported config format '{0}' (expected .json, .toml, .yaml or .yml)")]
    UnsupportedFormat(String),

    /// No config file was given and none was found in the default locations.
    #[error("no config file found (pass --config, set {env}, or create ./reportflow.json)")]
    NotFound { env: String },

    /// A `$ref` pointer does not resolve to a node.
    #[error("unresolved reference '{reference}': {reason}")]
    DanglingRef { reference: String, reason: String },

    /// A `$ref` chain refers back to itself.
    #[error("reference cycle detected at '{0}'")]
    RefCycle(String),

    /// Missing required field.
    #[error("missing required field '{field}' in {context}")]
    MissingField { field: String, context: String },

    /// A credential was not found through any resolution method.
    #[error("{name} not found. Set via --{flag}, env var ({env_var}), or config file")]
    MissingCredential {
        name: String,
        flag: String,
        env_var: String,
    },

    /// Settings section failed typed deserialization.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}
