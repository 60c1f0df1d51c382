use std::{env, fmt::Display, fs::read_to_string, path::PathBuf, str::FromStr, time::Duration};

use board::CorruptPolicy;
use mirror::{
    UpstreamConfig,
    models::{DEFAULT_API_URL, DEFAULT_EXCLUDED_AUTHOR, DEFAULT_EXCLUDED_PREFIX},
};
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_OAUTH_URL: &str = "https://github.com/login/oauth/access_token";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(String),

    #[error("Invalid {key} value: {reason}")]
    Invalid { key: String, reason: String },
}

/// At most `max_requests` per client within any `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub window: Duration,
    pub max_requests: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    pub general: Window,
    pub votes: Window,
    pub sync: Window,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            general: Window {
                window: Duration::from_secs(15 * 60),
                max_requests: 100,
            },
            votes: Window {
                window: Duration::from_secs(60),
                max_requests: 10,
            },
            sync: Window {
                window: Duration::from_secs(60 * 60),
                max_requests: 5,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: Option<String>,
}

pub struct Config {
    pub port: u16,
    pub data_dir: PathBuf,
    pub public_dir: PathBuf,
    pub log_dir: PathBuf,
    pub log_flush: Duration,
    pub corrupt_policy: CorruptPolicy,
    pub allowed_origin: String,
    pub upstream: UpstreamConfig,
    pub oauth: OAuthConfig,
    pub limits: RateLimits,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = RateLimits::default();

        Ok(Self {
            port: try_load("RUST_PORT", "3000")?,
            data_dir: try_load("DATA_DIR", "data")?,
            public_dir: try_load("PUBLIC_DIR", "public")?,
            log_dir: try_load("LOG_DIR", "logs")?,
            log_flush: try_load_secs("LOG_FLUSH_SECS", 5)?,
            corrupt_policy: try_load("CORRUPT_POLICY", "reseed")?,
            allowed_origin: try_load("ALLOWED_ORIGIN", "*")?,
            upstream: UpstreamConfig {
                api_url: try_load("GITHUB_API_URL", DEFAULT_API_URL)?,
                owner: require("REPO_OWNER")?,
                repo: require("REPO_NAME")?,
                excluded_author: try_load("EXCLUDED_AUTHOR", DEFAULT_EXCLUDED_AUTHOR)?,
                excluded_prefix: try_load("EXCLUDED_PREFIX", DEFAULT_EXCLUDED_PREFIX)?,
                max_pages: try_load("MAX_PAGES", "100")?,
                timeout: try_load_secs("UPSTREAM_TIMEOUT_SECS", 30)?,
            },
            oauth: OAuthConfig {
                token_url: try_load("GITHUB_OAUTH_URL", DEFAULT_OAUTH_URL)?,
                client_id: try_load("GITHUB_CLIENT_ID", "")?,
                client_secret: read_secret("GITHUB_CLIENT_SECRET"),
            },
            limits: RateLimits {
                general: try_load_window("GENERAL", defaults.general)?,
                votes: try_load_window("VOTE", defaults.votes)?,
                sync: try_load_window("SYNC", defaults.sync)?,
            },
        })
    }
}

fn require(key: &str) -> Result<String, ConfigError> {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| {
            warn!("Environment variable {key} not found");
            ConfigError::Missing(key.to_string())
        })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    env::var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| {
            warn!("Invalid {key} value: {e}");
            ConfigError::Invalid {
                key: key.to_string(),
                reason: e.to_string(),
            }
        })
}

fn try_load_secs(key: &str, default: u64) -> Result<Duration, ConfigError> {
    try_load(key, &default.to_string()).map(Duration::from_secs)
}

fn try_load_window(prefix: &str, default: Window) -> Result<Window, ConfigError> {
    Ok(Window {
        window: try_load_secs(&format!("{prefix}_WINDOW_SECS"), default.window.as_secs())?,
        max_requests: try_load(
            &format!("{prefix}_MAX_REQUESTS"),
            &default.max_requests.to_string(),
        )?,
    })
}

/// Environment first, then a docker secret at `/run/secrets/<name>`.
fn read_secret(secret_name: &str) -> Option<String> {
    if let Ok(value) = env::var(secret_name) {
        return Some(value.trim().to_string());
    }

    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            warn!("Failed to read {secret_name} from file: {e}");
        })
        .ok()
}
