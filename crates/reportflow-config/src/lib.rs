//! Settings document for the reportflow pipeline.
//!
//! Provides:
//! - Document discovery and loading (JSON, TOML or YAML by extension)
//! - `$ref` cross-reference resolution across and within documents
//! - Credential resolution (CLI flag → env var → document)
//! - Typed settings for the API connection, retry policy, logging and
//!   global custom data
//!
//! Job definitions are left in the resolved document and deserialized by
//! `reportflow-pipeline`.

pub mod discovery;
pub mod error;
pub mod resolver;
pub mod secrets;
pub mod types;

pub use discovery::{
    default_log_dir, discover_config_path, load_document, DocumentFormat, LoadedDocument,
    CONFIG_ENV,
};
pub use error::{ConfigError, Result};
pub use resolver::resolve_refs;
pub use secrets::{resolve_credentials, Credentials, SecretSource, CLIENT_ID_ENV, CLIENT_SECRET_ENV};
pub use types::*;
