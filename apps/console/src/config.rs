use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "console.toml";
pub const DEFAULT_API_BASE: &str = "http://localhost:8080";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub api_base: String,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.into(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Settings {
    pub fn api_base_url(&self) -> Result<Url> {
        let raw = self.api_base.trim();
        // A trailing slash keeps the base path when endpoints are joined.
        let raw = if raw.ends_with('/') {
            raw.to_string()
        } else {
            format!("{raw}/")
        };
        let url = Url::parse(&raw).with_context(|| format!("invalid api base '{}'", self.api_base))?;
        anyhow::ensure!(
            matches!(url.scheme(), "http" | "https"),
            "api base '{}' must be an http(s) url",
            self.api_base
        );
        Ok(url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Defaults, then `console.toml` (or the explicit `--config` file, which must
/// exist), then `API_BASE`, then `APP__*` variables.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    load_settings_from(path, std::env::vars().collect())
}

pub fn load_settings_from(path: Option<&Path>, env: HashMap<String, String>) -> Result<Settings> {
    let (file, required) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };

    let legacy: HashMap<String, String> = env
        .get("API_BASE")
        .map(|v| ("API_BASE".to_string(), v.clone()))
        .into_iter()
        .collect();

    let settings = Config::builder()
        .set_default("api_base", DEFAULT_API_BASE)?
        .set_default("request_timeout_secs", DEFAULT_REQUEST_TIMEOUT_SECS as i64)?
        .add_source(
            File::from(file.as_path())
                .format(FileFormat::Toml)
                .required(required),
        )
        .add_source(Environment::default().source(Some(legacy)))
        .add_source(
            Environment::with_prefix("APP")
                .separator("__")
                .try_parsing(true)
                .source(Some(env)),
        )
        .build()
        .with_context(|| format!("failed to read settings from '{}'", file.display()))?;

    settings
        .try_deserialize()
        .context("invalid console settings")
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
