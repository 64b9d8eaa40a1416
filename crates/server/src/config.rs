use std::{path::Path, time::Duration};

use anyhow::Context;
use client_core::{ingest::DEFAULT_SAMPLE_IMAGE_BASE_URL, mock::DEFAULT_ANALYSIS_LATENCY};
use config::{Config, Environment, File, Map};
use serde::Deserialize;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const SETTINGS_FILE: &str = "server.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub bind_addr: String,
    pub analysis_latency_ms: u64,
    pub sample_image_base_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.into(),
            analysis_latency_ms: DEFAULT_ANALYSIS_LATENCY.as_millis() as u64,
            sample_image_base_url: DEFAULT_SAMPLE_IMAGE_BASE_URL.into(),
        }
    }
}

impl Settings {
    pub fn analysis_latency(&self) -> Duration {
        Duration::from_millis(self.analysis_latency_ms)
    }
}

/// Defaults, then `server.toml` when present, then `APP__*` variables.
pub fn load_settings() -> anyhow::Result<Settings> {
    build_settings(Path::new(SETTINGS_FILE), None)
}

fn build_settings(file: &Path, env: Option<Map<String, String>>) -> anyhow::Result<Settings> {
    let defaults = Settings::default();
    Config::builder()
        .set_default("bind_addr", defaults.bind_addr)?
        .set_default("analysis_latency_ms", defaults.analysis_latency_ms)?
        .set_default("sample_image_base_url", defaults.sample_image_base_url)?
        .add_source(File::from(file).required(false))
        .add_source(
            Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .source(env),
        )
        .build()
        .context("failed to assemble server settings")?
        .try_deserialize()
        .context("invalid server settings")
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
