use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// Runtime configuration for the `civit` CLI.
///
/// Loaded in three layers: an optional TOML file, then environment
/// variables, then command-line flags. Every field has a default so the
/// tool works with no configuration at all.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bearer token for the CivitAI API. Some downloads require it.
    pub api_key: Option<String>,

    /// API root (default: `"https://civitai.com/api/v1"`).
    pub base_url: String,

    /// sqlx SQLite URL (default: `"sqlite://civit.db"`).
    pub database_url: String,

    /// Root directory for downloaded model files.
    pub download_dir: PathBuf,

    /// `tracing` filter string, e.g. `"info"` or `"debug,sqlx=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Optional log file; rotated daily.
    pub log_file: Option<PathBuf>,

    /// Client-side request rate. `0` disables limiting.
    pub requests_per_second: f64,
    pub burst: u32,

    /// Response cache TTL in seconds. `0` disables caching.
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,

    pub retry_count: u32,

    /// Parallel downloads.
    pub concurrency: usize,

    /// Explicit proxy; otherwise `HTTPS_PROXY` / `HTTP_PROXY` are honoured.
    pub proxy: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: civit_api::DEFAULT_BASE_URL.to_owned(),
            database_url: civit_store::DEFAULT_DATABASE_URL.to_owned(),
            download_dir: PathBuf::from("models"),
            log_level: "info".to_owned(),
            log_json: false,
            log_file: None,
            requests_per_second: 2.0,
            burst: 4,
            cache_ttl_secs: 300,
            cache_capacity: 512,
            retry_count: 3,
            concurrency: 2,
            proxy: None,
        }
    }
}

impl Config {
    /// Read `explicit` when given (it must exist), else the per-user config
    /// file when present, else defaults. Environment overrides are applied
    /// on top.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let mut cfg = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path().filter(|p| p.is_file()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        cfg.apply_env(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Override fields from environment variables looked up through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(key) = var("CIVITAI_API_KEY").or_else(|| var("CIVIT_API_KEY")) {
            self.api_key = non_empty(key);
        }
        self.database_url = env_or(&var, "CIVIT_DATABASE_URL", &self.database_url);
        if let Some(dir) = var("CIVIT_DOWNLOAD_DIR") {
            self.download_dir = PathBuf::from(dir);
        }
        self.log_level = env_or(&var, "CIVIT_LOG", &self.log_level);
        if let Some(v) = var("CIVIT_LOG_JSON") {
            self.log_json = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Some(file) = var("CIVIT_LOG_FILE") {
            self.log_file = non_empty(file).map(PathBuf::from);
        }
        self.requests_per_second = parse_env(&var, "CIVIT_RATE_LIMIT", self.requests_per_second);
        self.cache_ttl_secs = parse_env(&var, "CIVIT_CACHE_TTL_SECS", self.cache_ttl_secs);
    }
}

/// `<config_dir>/civit/config.toml`, e.g. `~/.config/civit/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|dir| dir.join("civit").join("config.toml"))
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(var: &impl Fn(&str) -> Option<String>, key: &str, current: &str) -> String {
    var(key).unwrap_or_else(|| current.to_owned())
}

fn parse_env<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, current: T) -> T {
    match var(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            eprintln!("WARN: {key}='{raw}' could not be parsed; keeping the configured value");
            current
        }),
        None => current,
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}
