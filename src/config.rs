// src/config.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const ENV_PATH: &str = "FEED_SYNC_CONFIG_PATH";

/// Tuning for one mirror instance.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL of the channel-message API.
    pub base_url: String,
    /// Seconds between incremental polls.
    pub interval_secs: u64,
    /// Item cap for the bounded latest-messages endpoint.
    pub latest_limit: usize,
    /// Hours covered by the initial full load.
    pub window_hours: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            interval_secs: 5,
            latest_limit: 10,
            window_hours: 1,
        }
    }
}

impl SyncConfig {
    /// Load from an explicit path. Supports TOML or JSON formats.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading feed sync config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        parse_config(&content, ext.as_str())
    }

    /// Load using env var + fallbacks, then apply per-field env overrides:
    /// 1) $FEED_SYNC_CONFIG_PATH
    /// 2) config/feed_sync.toml
    /// 3) config/feed_sync.json
    /// 4) built-in defaults
    pub fn load() -> Result<Self> {
        let mut cfg = Self::load_file_cascade()?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    fn load_file_cascade() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::from_file(&pb);
            }
            anyhow::bail!("FEED_SYNC_CONFIG_PATH points to non-existent path");
        }
        let toml_p = PathBuf::from("config/feed_sync.toml");
        if toml_p.exists() {
            return Self::from_file(&toml_p);
        }
        let json_p = PathBuf::from("config/feed_sync.json");
        if json_p.exists() {
            return Self::from_file(&json_p);
        }
        Ok(Self::default())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("FEED_BASE_URL") {
            if !v.trim().is_empty() {
                self.base_url = v.trim().to_string();
            }
        }
        if let Some(v) = env_parse("FEED_POLL_INTERVAL_SECS") {
            self.interval_secs = v;
        }
        if let Some(v) = env_parse("FEED_LATEST_LIMIT") {
            self.latest_limit = v;
        }
        if let Some(v) = env_parse("FEED_WINDOW_HOURS") {
            self.window_hours = v;
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn parse_config(s: &str, hint_ext: &str) -> Result<SyncConfig> {
    // Try TOML first if hinted or content looks like toml.
    let try_toml = hint_ext == "toml" || s.contains('=');
    if try_toml {
        if let Ok(v) = toml::from_str(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = serde_json::from_str(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = toml::from_str(s) {
            return Ok(v);
        }
    }
    anyhow::bail!("unsupported feed sync config format")
}
