//! Layered configuration: base file, optional overlay file, explicit overrides.
//!
//! Sources are merged left to right and the last one wins:
//! base file < `CAPTCHA_API_CONFIG` overlay < explicit overrides.

use anyhow::{Context, Result};
use config::{File, FileFormat, Source};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use captcha_common::constants::{
    DEFAULT_CAPTCHA_LENGTH, DEFAULT_CAPTCHA_RETENTION_SECS, DEFAULT_CAPTCHA_VALIDITY_SECS,
    DEFAULT_LISTEN_ADDR, env,
};

/// Typed view of the settings this service consumes.
///
/// Keys are case-insensitive: config files use `API_VERSION`, the loader
/// folds every key to lower case before merging.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// API version, used to build the `/api/{version}` prefix
    pub api_version: String,

    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Enable the background task runner
    #[serde(default)]
    pub use_celery: bool,

    /// Task broker URL (Redis)
    #[serde(default)]
    pub celery_broker_url: Option<String>,

    /// Task result backend URL (Redis)
    #[serde(default)]
    pub celery_result_backend: Option<String>,

    /// Characters per CAPTCHA answer
    #[serde(default = "default_captcha_length")]
    pub captcha_length: usize,

    /// How long a challenge can be answered
    #[serde(default = "default_validity")]
    pub captcha_validity_secs: u64,

    /// Age after which `delete_old_captchas` removes a record
    #[serde(default = "default_retention")]
    pub captcha_retention_secs: u64,
}

fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_captcha_length() -> usize { DEFAULT_CAPTCHA_LENGTH }
fn default_validity() -> u64 { DEFAULT_CAPTCHA_VALIDITY_SECS }
fn default_retention() -> u64 { DEFAULT_CAPTCHA_RETENTION_SECS }

impl Settings {
    /// URL prefix the REST resources are mounted under
    pub fn api_prefix(&self) -> String {
        format!("/api/{}", self.api_version)
    }
}

/// Merged application configuration.
///
/// Holds the typed [`Settings`] plus the raw key/value mapping, so tasks and
/// handlers can read keys this crate does not model.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub settings: Settings,
    raw: config::Config,
}

impl AppConfig {
    /// Look up any configuration key (case-insensitive)
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.raw.get(&key.to_lowercase()).ok()
    }
}

/// Builder for the ordered list of configuration sources
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    base: PathBuf,
    overlay: Option<PathBuf>,
    overrides: Vec<(String, config::Value)>,
}

impl ConfigLoader {
    /// Start from a base file, which must exist
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            overlay: None,
            overrides: Vec::new(),
        }
    }

    /// Use the file named by `CAPTCHA_API_CONFIG` as overlay, if set
    pub fn with_env_overlay(self) -> Self {
        match std::env::var_os(env::CAPTCHA_API_CONFIG) {
            Some(path) => self.overlay(PathBuf::from(path)),
            None => {
                tracing::debug!("{} not set, skipping overlay", env::CAPTCHA_API_CONFIG);
                self
            }
        }
    }

    /// Overlay a second file on top of the base (best-effort)
    pub fn overlay(mut self, path: impl Into<PathBuf>) -> Self {
        self.overlay = Some(path.into());
        self
    }

    /// Set an explicit value that beats every file source
    pub fn set_override(mut self, key: impl Into<String>, value: impl Into<config::Value>) -> Self {
        self.overrides.push((key.into(), value.into()));
        self
    }

    /// Merge all sources and deserialize the result
    pub fn load(&self) -> Result<AppConfig> {
        let mut merged = read_layer(&self.base).with_context(|| {
            format!("Failed to load base configuration {}", self.base.display())
        })?;

        if let Some(ref path) = self.overlay {
            match read_layer(path) {
                Ok(layer) => {
                    tracing::info!(path = %path.display(), "Overlay configuration loaded");
                    merged.extend(layer);
                }
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Failed to load overlay configuration");
                }
            }
        }

        merged.extend(
            self.overrides
                .iter()
                .map(|(key, value)| (key.to_lowercase(), value.clone())),
        );

        let mut builder = config::Config::builder();
        for (key, value) in merged {
            builder = builder
                .set_override(key.as_str(), value)
                .with_context(|| format!("Invalid configuration key {}", key))?;
        }
        let raw = builder.build().context("Failed to merge configuration")?;

        let settings: Settings = raw
            .clone()
            .try_deserialize()
            .context("Failed to parse configuration")?;

        Ok(AppConfig { settings, raw })
    }
}

/// Read one TOML file into a flat map with lower-cased keys
fn read_layer(path: &Path) -> Result<HashMap<String, config::Value>, config::ConfigError> {
    let layer = config::Config::builder()
        .add_source(File::from(path).format(FileFormat::Toml).required(true))
        .build()?;

    Ok(layer
        .collect()?
        .into_iter()
        .map(|(key, value)| (key.to_lowercase(), value))
        .collect())
}
