use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("environment variable {0} is not set")]
    MissingEnv(String),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid target {name:?}: {reason}")]
    InvalidTarget { name: String, reason: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub notification: Notification,
    #[serde(default, rename = "target")]
    pub targets: Vec<Target>,
    pub database: Option<PathBuf>,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_api_port() -> u16 { 3000 }
fn default_interval() -> u64 { 60 }
fn default_timeout() -> u64 { 15 }

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Notification {
    pub slack: Option<Slack>,
    pub webhook: Option<Webhook>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Slack {
    pub token: String,
    pub channel: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Webhook {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Target {
    pub name: String,
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub follow: bool,
}

fn default_method() -> String { "GET".into() }

static ENV_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{\{\s*env\s+"([^"]+)"\s*\}\}"#).expect("placeholder pattern is valid")
});

/// Replace every `{{ env "NAME" }}` with the value of `NAME`.
pub fn expand_env(raw: &str) -> Result<String, ConfigError> {
    let mut missing = None;
    let expanded = ENV_PLACEHOLDER.replace_all(raw, |caps: &Captures| {
        let name = &caps[1];
        match std::env::var(name) {
            Ok(value) => value,
            Err(_) => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });
    match missing {
        Some(name) => Err(ConfigError::MissingEnv(name)),
        None => Ok(expanded.into_owned()),
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(&expand_env(raw)?)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::Zero("interval_secs"));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Zero("timeout_secs"));
        }

        let mut seen = HashSet::new();
        for target in &self.targets {
            let invalid = |reason: String| ConfigError::InvalidTarget {
                name: target.name.clone(),
                reason,
            };
            if target.name.trim().is_empty() {
                return Err(invalid("name is empty".into()));
            }
            if !seen.insert(target.name.as_str()) {
                return Err(invalid("duplicate name".into()));
            }
            reqwest::Url::parse(&target.url).map_err(|e| invalid(format!("url: {}", e)))?;
            reqwest::Method::from_bytes(target.method.as_bytes())
                .map_err(|_| invalid(format!("unsupported method {}", target.method)))?;
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
