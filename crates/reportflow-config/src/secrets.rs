//! Client credential resolution.
//!
//! Resolution order for both the client id and the client secret:
//! 1. CLI flag
//! 2. Environment variable
//! 3. Config document (plaintext, not recommended for the secret)

use crate::{ApiSettings, ConfigError, Result};

/// Environment variable holding the OAuth client id.
pub const CLIENT_ID_ENV: &str = "REPORTFLOW_CLIENT_ID";

/// Environment variable holding the OAuth client secret.
pub const CLIENT_SECRET_ENV: &str = "REPORTFLOW_CLIENT_SECRET";

/// Where a credential was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    /// Command-line flag.
    Flag,
    /// Environment variable.
    EnvVar(String),
    /// Config document (plaintext).
    ConfigFile,
}

impl std::fmt::Display for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretSource::Flag => write!(f, "command-line flag"),
            SecretSource::EnvVar(var) => write!(f, "env var {}", var),
            SecretSource::ConfigFile => write!(f, "config file (plaintext)"),
        }
    }
}

/// Resolved client credentials with provenance.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub id_source: SecretSource,
    pub secret_source: SecretSource,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("id_source", &self.id_source)
            .field("secret_source", &self.secret_source)
            .finish()
    }
}

/// Resolve client credentials using the full resolution chain.
pub fn resolve_credentials(
    flag_id: Option<&str>,
    flag_secret: Option<&str>,
    api: &ApiSettings,
) -> Result<Credentials> {
    resolve_with(flag_id, flag_secret, api, |var| std::env::var(var).ok())
}

fn resolve_with(
    flag_id: Option<&str>,
    flag_secret: Option<&str>,
    api: &ApiSettings,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Credentials> {
    let (client_id, id_source) = resolve_one(flag_id, CLIENT_ID_ENV, api.client_id.as_deref(), &env)
        .ok_or_else(|| ConfigError::MissingCredential {
            name: "client id".to_string(),
            flag: "client-id".to_string(),
            env_var: CLIENT_ID_ENV.to_string(),
        })?;
    let (client_secret, secret_source) =
        resolve_one(flag_secret, CLIENT_SECRET_ENV, api.client_secret.as_deref(), &env)
            .ok_or_else(|| ConfigError::MissingCredential {
                name: "client secret".to_string(),
                flag: "client-secret".to_string(),
                env_var: CLIENT_SECRET_ENV.to_string(),
            })?;

    if secret_source == SecretSource::ConfigFile {
        tracing::warn!(
            "client secret is stored in plaintext in the config file; prefer {}",
            CLIENT_SECRET_ENV
        );
    }

    Ok(Credentials {
        client_id,
        client_secret,
        id_source,
        secret_source,
    })
}

fn resolve_one(
    flag: Option<&str>,
    env_var: &str,
    config_value: Option<&str>,
    env: &impl Fn(&str) -> Option<String>,
) -> Option<(String, SecretSource)> {
    if let Some(value) = flag.filter(|v| !v.is_empty()) {
        return Some((value.to_string(), SecretSource::Flag));
    }
    if let Some(value) = env(env_var).filter(|v| !v.is_empty()) {
        return Some((value, SecretSource::EnvVar(env_var.to_string())));
    }
    config_value
        .filter(|v| !v.is_empty())
        .map(|v| (v.to_string(), SecretSource::ConfigFile))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn api(id: Option<&str>, secret: Option<&str>) -> ApiSettings {
        ApiSettings {
            client_id: id.map(String::from),
            client_secret: secret.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_flag_wins() {
        let env = |var: &str| Some(format!("env-{var}"));
        let creds = resolve_with(Some("flag-id"), None, &api(Some("cfg"), Some("cfg")), env).unwrap();
        assert_eq!(creds.client_id, "flag-id");
        assert_eq!(creds.id_source, SecretSource::Flag);
        assert_eq!(creds.client_secret, format!("env-{CLIENT_SECRET_ENV}"));
        assert_eq!(
            creds.secret_source,
            SecretSource::EnvVar(CLIENT_SECRET_ENV.to_string())
        );
    }

    #[test]
    fn test_resolve_from_config_value() {
        let creds = resolve_with(None, None, &api(Some("id"), Some("secret")), no_env).unwrap();
        assert_eq!(creds.client_secret, "secret");
        assert_eq!(creds.secret_source, SecretSource::ConfigFile);
    }

    #[test]
    fn test_empty_values_are_skipped() {
        let env = |_: &str| Some(String::new());
        let creds = resolve_with(Some(""), None, &api(Some("id"), Some("secret")), env).unwrap();
        assert_eq!(creds.id_source, SecretSource::ConfigFile);
    }

    #[test]
    fn test_missing_secret() {
        let err = resolve_with(None, None, &api(Some("id"), None), no_env).unwrap_err();
        match err {
            ConfigError::MissingCredential { env_var, .. } => {
                assert_eq!(env_var, CLIENT_SECRET_ENV)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_debug_redacts_secret() {
        let creds = resolve_with(Some("id"), Some("hunter2"), &api(None, None), no_env).unwrap();
        assert!(!format!("{creds:?}").contains("hunter2"));
    }

    #[test]
    fn test_secret_source_display() {
        assert_eq!(SecretSource::Flag.to_string(), "command-line flag");
        assert_eq!(
            SecretSource::EnvVar("X".into()).to_string(),
            "env var X"
        );
        assert_eq!(
            SecretSource::ConfigFile.to_string(),
            "config file (plaintext)"
        );
    }
}
