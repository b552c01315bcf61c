//! Configuration management for Sindri
//!
//! This module defines the main `Config` struct and its sub-structs. It uses
//! the `figment` crate to layer defaults, an optional `sindri.toml` file and
//! `SINDRI_`-prefixed environment variables.

use crate::formatting::OutputFormat;
use crate::rules::BroadcastRule;
use crate::tracker::DEFAULT_TRACE_ID_ENV;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The main configuration struct.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// Filter for the library's own diagnostics (`RUST_LOG` syntax).
    pub log_level: String,
    /// The layout of lines written to the log sink.
    pub format: OutputFormat,
    /// Prefix every sink line with `[sindri=<LEVEL>]`.
    #[serde(default)]
    pub decorate_logs: bool,
    /// Environment variable holding the distributed trace id.
    pub trace_id_env: String,
    /// Rules that suppress broadcasting.
    pub blacklist: BlacklistConfig,
    /// Configuration for the transporter.
    pub transporter: TransporterConfig,
}

/// Configuration for broadcast suppression.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct BlacklistConfig {
    /// Inline `{ key, value }` rules.
    #[serde(default)]
    pub rules: Vec<BroadcastRule>,
    /// YAML files, each holding a list of rules.
    #[serde(default)]
    pub rule_files: Vec<PathBuf>,
}

/// Configuration for the transporter.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TransporterConfig {
    /// Severity to forward; an empty string forwards every severity.
    pub level: String,
    /// Webhook delivery target. No transporter is set up without one.
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
}

/// Configuration for the webhook delivery target.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default = "default_webhook_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_webhook_timeout_ms() -> u64 {
    10_000
}

impl Config {
    /// Loads the configuration.
    ///
    /// # Arguments
    /// * `config_path` - Optional path to a TOML file. A missing file is not
    ///   an error; values fall back to defaults and the environment.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }
        // e.g. SINDRI_DECORATE_LOGS=true, SINDRI_TRANSPORTER__LEVEL=fatal
        let config: Config = figment
            .merge(Env::prefixed("SINDRI_").split("__"))
            .extract()?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            format: OutputFormat::PlainText,
            decorate_logs: false,
            trace_id_env: DEFAULT_TRACE_ID_ENV.to_string(),
            blacklist: BlacklistConfig::default(),
            transporter: TransporterConfig {
                level: "error".to_string(),
                webhook: None,
            },
        }
    }
}
