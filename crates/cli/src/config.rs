//! Configuration management for the CLI
//!
//! Settings come from an optional config file, then `KCONSOLE_*` environment
//! variables, then command-line flags.

use anyhow::{Context, Result};
use console_lib::StaticCapabilities;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// CLI settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Management backend URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Access token sent with every request
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment (cluster) the console operates on
    #[serde(default = "default_environment_id")]
    pub environment_id: u32,

    /// Namespace used when a command does not name one
    #[serde(default)]
    pub default_namespace: Option<String>,

    /// Overrides the environment's metrics server flag
    #[serde(default)]
    pub server_metrics: Option<bool>,

    /// Permissions held by the caller; unset grants all
    #[serde(default)]
    pub authorizations: Option<Vec<String>>,

    /// Quiet interval before a changed draft is revalidated
    #[serde(default = "default_validation_debounce")]
    pub validation_debounce_ms: u64,

    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_api_url() -> String {
    "http://localhost:9000".to_string()
}

fn default_environment_id() -> u32 {
    1
}

fn default_validation_debounce() -> u64 {
    500
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            environment_id: default_environment_id(),
            default_namespace: None,
            server_metrics: None,
            authorizations: None,
            validation_debounce_ms: default_validation_debounce(),
            log_format: LogFormat::default(),
        }
    }
}

impl Settings {
    /// Load settings from the config file and environment.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        match path {
            Some(path) => {
                builder = builder.add_source(config::File::from(path).required(true));
            }
            None => {
                if let Some(base) = Self::default_path() {
                    builder = builder.add_source(
                        config::File::with_name(&base.to_string_lossy()).required(false),
                    );
                }
            }
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("KCONSOLE")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("authorizations"),
            )
            .build()
            .context("Failed to read configuration")?;

        settings
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// `~/.config/kconsole/config`, any supported extension
    fn default_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("kconsole").join("config"))
    }

    /// Capabilities of the configured caller, given the environment's metrics flag
    pub fn capabilities(&self, environment_metrics: bool) -> StaticCapabilities {
        let server_metrics = self.server_metrics.unwrap_or(environment_metrics);
        match &self.authorizations {
            Some(granted) => StaticCapabilities::with_permissions(server_metrics, granted.iter().cloned()),
            None => StaticCapabilities::admin(server_metrics),
        }
    }

    pub fn validation_debounce(&self) -> Duration {
        Duration::from_millis(self.validation_debounce_ms)
    }

    /// Explicit namespace, falling back to the configured default
    pub fn namespace(&self, explicit: Option<String>) -> Option<String> {
        explicit.or_else(|| self.default_namespace.clone())
    }
}
