#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_DB_PATH: &str = "youtube_trending.db";
pub const DEFAULT_WWW_ROOT: &str = "www";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_REGION_CODE: &str = "IN";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// The videos endpoint refuses page sizes above this.
pub const MAX_RESULTS_CAP: u32 = 50;

/// Stand-in credential used when `YOUTUBE_API_KEY` is missing. Requests made
/// with it are rejected by the platform, which is how the misconfiguration
/// surfaces.
pub const PLACEHOLDER_API_KEY: &str = "YOUTUBE_API_KEY";

/// Immutable process configuration, built once at startup and shared with
/// every component.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub db_path: PathBuf,
    pub www_root: PathBuf,
    pub host: String,
    pub port: u16,
    pub region_code: String,
    pub max_results: u32,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: PLACEHOLDER_API_KEY.to_string(),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            www_root: PathBuf::from(DEFAULT_WWW_ROOT),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            region_code: DEFAULT_REGION_CODE.to_string(),
            max_results: MAX_RESULTS_CAP,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl AppConfig {
    pub fn api_key_is_placeholder(&self) -> bool {
        self.api_key == PLACEHOLDER_API_KEY
    }
}

/// Values coming from the command line. They win over both the environment
/// and the `.env` file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub db_path: Option<PathBuf>,
    pub www_root: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub env_path: Option<PathBuf>,
}

pub fn load_app_config() -> Result<AppConfig> {
    resolve_app_config(ConfigOverrides::default())
}

pub fn resolve_app_config(overrides: ConfigOverrides) -> Result<AppConfig> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    Ok(build_app_config(&file_vars, env_var_string, overrides))
}

fn build_app_config(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: ConfigOverrides,
) -> AppConfig {
    let defaults = AppConfig::default();
    let lookup = |key: &str| lookup_value(key, file_vars, &env_lookup);

    let api_key = lookup("YOUTUBE_API_KEY").unwrap_or(defaults.api_key);
    let db_path = overrides
        .db_path
        .or_else(|| lookup("TRENDBOARD_DB_PATH").map(PathBuf::from))
        .unwrap_or(defaults.db_path);
    let www_root = overrides
        .www_root
        .or_else(|| lookup("TRENDBOARD_WWW_ROOT").map(PathBuf::from))
        .unwrap_or(defaults.www_root);
    let host = overrides
        .host
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| lookup("TRENDBOARD_HOST"))
        .unwrap_or(defaults.host);
    let port = overrides
        .port
        .or_else(|| lookup("TRENDBOARD_PORT").and_then(|value| value.parse::<u16>().ok()))
        .unwrap_or(defaults.port);
    let region_code = lookup("TRENDBOARD_REGION")
        .map(|value| value.to_ascii_uppercase())
        .unwrap_or(defaults.region_code);
    let max_results = lookup("TRENDBOARD_MAX_RESULTS")
        .and_then(|value| value.parse::<u32>().ok())
        .map(|value| value.clamp(1, MAX_RESULTS_CAP))
        .unwrap_or(defaults.max_results);
    let log_level = lookup("TRENDBOARD_LOG").unwrap_or(defaults.log_level);

    AppConfig {
        api_key,
        db_path,
        www_root,
        host,
        port,
        region_code,
        max_results,
        log_level,
    }
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| {
        file_vars
            .get(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
