use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context as _, Result};
use serde::Deserialize;
use tracing::warn;

use crate::engine::types::Options;
use crate::storage::{ConnectOptions, DEFAULT_TIMEOUT};

pub const DEFAULT_OPTIONS_PATH: &str = "config/config.yml";
pub const DEFAULT_DATABASE_PATH: &str = "config/database.yml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Malformed override '{0}': expected key=value")]
    MalformedOverride(String),
}

fn read_yaml(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        let what = if e.kind() == ErrorKind::NotFound {
            "Config file not found"
        } else {
            "Failed to read config file"
        };
        anyhow::Error::new(e).context(format!("{}: {}", what, path.display()))
    })
}

/// Load the base task options: a YAML mapping with any keys. An empty file
/// gives empty options.
pub fn load_options(path: &Path) -> Result<Options> {
    let contents = read_yaml(path)?;
    if contents.trim().is_empty() {
        return Ok(Options::new());
    }

    let value: serde_json::Value = serde_yml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    match value {
        serde_json::Value::Object(map) => Ok(Options::from_map(map)),
        serde_json::Value::Null => Ok(Options::new()),
        _ => anyhow::bail!(
            "Failed to parse config file: {}: expected a mapping at the top level",
            path.display()
        ),
    }
}

/// Split one `key=value` token. The key is lower-cased; `True` and `False`
/// become booleans, anything else stays a string. Returns `None` for tokens
/// with an empty key or value, which are ignored.
pub fn parse_override(token: &str) -> Result<Option<(String, serde_json::Value)>, ConfigError> {
    let (key, value) = token
        .split_once('=')
        .ok_or_else(|| ConfigError::MalformedOverride(token.to_string()))?;

    if key.is_empty() || value.is_empty() {
        return Ok(None);
    }

    let value = match value {
        "True" => serde_json::Value::Bool(true),
        "False" => serde_json::Value::Bool(false),
        other => serde_json::Value::String(other.to_string()),
    };
    Ok(Some((key.to_lowercase(), value)))
}

impl Options {
    /// Apply command-line overrides in order; later tokens win.
    pub fn apply_overrides<S: AsRef<str>>(&mut self, tokens: &[S]) -> Result<(), ConfigError> {
        for token in tokens {
            let token = token.as_ref();
            match parse_override(token)? {
                Some((key, value)) => self.insert(key, value),
                None => warn!(token = %token, "Ignoring override with empty key or value"),
            }
        }
        Ok(())
    }
}

/// Connection parameters file:
///
/// ```yaml
/// defaults:
///   sessions:
///     default:
///       hosts: ["localhost:8529"]
///       database: maintenance
/// ```
#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    pub defaults: DatabaseDefaults,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseDefaults {
    pub sessions: DatabaseSessions,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseSessions {
    pub default: SessionConfig,
}

/// One session's connection settings.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct SessionConfig {
    pub hosts: Vec<String>,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
    pub timeout_s: Option<f64>,
}

impl DatabaseConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = read_yaml(path)?;
        let config: DatabaseConfig = serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn session(&self) -> &SessionConfig {
        &self.defaults.sessions.default
    }

    /// First host of the default session.
    pub fn host(&self) -> Result<&str> {
        self.session()
            .hosts
            .first()
            .map(String::as_str)
            .ok_or_else(|| anyhow::anyhow!("Database config lists no hosts for the default session"))
    }

    pub fn database(&self) -> Result<&str> {
        self.session()
            .database
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Database config names no database for the default session"))
    }

    /// Connection options; a usable `timeout_override` (seconds) beats the
    /// file's `timeout_s`, which beats the default.
    pub fn connect_options(&self, timeout_override: Option<f64>) -> ConnectOptions {
        let session = self.session();
        let timeout = timeout_from_secs(timeout_override, "--timeout")
            .or_else(|| timeout_from_secs(session.timeout_s, "timeout_s"))
            .unwrap_or(DEFAULT_TIMEOUT);

        ConnectOptions {
            timeout,
            username: session.username.clone(),
            password: session.password.clone(),
            token: session.token.clone(),
        }
    }
}

/// Positive seconds that fit a `Duration`; anything else is ignored with a warning.
fn timeout_from_secs(secs: Option<f64>, origin: &str) -> Option<Duration> {
    let secs = secs?;
    match Duration::try_from_secs_f64(secs) {
        Ok(timeout) if !timeout.is_zero() => Some(timeout),
        _ => {
            warn!(origin = origin, seconds = secs, "Ignoring unusable timeout");
            None
        }
    }
}
