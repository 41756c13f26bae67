use std::net::SocketAddr;
use thiserror::Error;

pub const API_BASE_ENV: &str = "AUGUSTUS_API_BASE";
pub const BIND_ENV: &str = "AUGUSTUS_BIND";
pub const SECURE_COOKIES_ENV: &str = "AUGUSTUS_SECURE_COOKIES";

const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000";
const DEFAULT_BIND: &str = "0.0.0.0:3000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{API_BASE_ENV} is not a valid http(s) URL: {0}")]
    InvalidUrl(String),

    #[error("{BIND_ENV} is not a socket address: {0}")]
    InvalidBind(String),

    #[error("{SECURE_COOKIES_ENV} must be true or false, got {0}")]
    InvalidFlag(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct GatewayConfig {
    /// Backend origin without a trailing slash.
    pub api_base: String,
    pub bind: SocketAddr,
    pub secure_cookies: bool,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_base = lookup(API_BASE_ENV).unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let bind = lookup(BIND_ENV).unwrap_or_else(|| DEFAULT_BIND.to_string());
        let secure_cookies = match lookup(SECURE_COOKIES_ENV) {
            Some(raw) => parse_flag(&raw)?,
            None => false,
        };

        Ok(Self {
            api_base: normalize_api_base(&api_base)?,
            bind: bind
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidBind(bind.clone()))?,
            secure_cookies,
        })
    }

    /// `{api_base}{path}`; `path` starts with a slash.
    pub fn backend_url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            bind: SocketAddr::from(([0, 0, 0, 0], 3000)),
            secure_cookies: false,
        }
    }
}

fn normalize_api_base(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = reqwest::Url::parse(trimmed).map_err(|_| ConfigError::InvalidUrl(raw.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(raw.to_string()));
    }
    Ok(trimmed.to_string())
}

fn parse_flag(raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidFlag(raw.to_string())),
    }
}
