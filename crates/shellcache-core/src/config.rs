//! Application configuration management.
//!
//! This module handles loading and saving the configuration: the origin the
//! worker fronts, where the interception host listens, and how the cache is
//! stored.
//!
//! Configuration is stored at `~/.config/shellcache/config.json`. A few
//! settings can be overridden from the environment (`SHELLCACHE_ORIGIN`,
//! `SHELLCACHE_LISTEN`, `SHELLCACHE_CACHE_DIR`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::network::client::REQUEST_TIMEOUT_SECS;
use crate::worker::{OrdinaryStrategy, DEFAULT_INSTALL_ATTEMPTS};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "shellcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Largest request body the host will buffer.
const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Disk,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub origin: String,
    pub listen: String,
    pub cache_backend: CacheBackend,
    pub cache_dir: Option<PathBuf>,
    pub ordinary_strategy: OrdinaryStrategy,
    pub request_timeout_secs: u64,
    pub install_attempts: u32,
    pub max_body_bytes: usize,
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            origin: "http://127.0.0.1:8000/".to_string(),
            listen: "127.0.0.1:8080".to_string(),
            cache_backend: CacheBackend::default(),
            cache_dir: None,
            ordinary_strategy: OrdinaryStrategy::default(),
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            install_attempts: DEFAULT_INSTALL_ATTEMPTS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            log_dir: None,
        }
    }
}

impl Config {
    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply `SHELLCACHE_*` overrides looked up through `var`.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(origin) = var("SHELLCACHE_ORIGIN") {
            self.origin = origin;
        }
        if let Some(listen) = var("SHELLCACHE_LISTEN") {
            self.listen = listen;
        }
        if let Some(dir) = var("SHELLCACHE_CACHE_DIR") {
            self.cache_dir = Some(PathBuf::from(dir));
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// The origin as a URL that seed paths can be resolved against.
    pub fn origin_url(&self) -> Result<Url> {
        let url = Url::parse(&self.origin)
            .with_context(|| format!("Invalid origin URL: {}", self.origin))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("Origin must be an http(s) URL: {}", self.origin);
        }
        if url.cannot_be_a_base() {
            bail!("Origin cannot be used as a base URL: {}", self.origin);
        }
        Ok(url)
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
