//! Auth configuration parsed from environment variables.

use std::path::PathBuf;

use crate::error::AuthError;

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:3000";
pub const DEFAULT_IDENTITY_BASE_URL: &str = "http://127.0.0.1:3000/identity";
pub const DEFAULT_STORE_PATH: &str = ".storefront-auth.json";
pub const DEFAULT_LOGIN_PATH: &str = "/admin/login";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    /// Custom backend origin; `/api/auth/*` is appended.
    pub api_base_url: String,
    /// Identity provider REST origin.
    pub identity_base_url: String,
    /// API key passed as `?key=` to the identity provider.
    pub identity_api_key: String,
    /// Accept the hardcoded demo credentials when the backend is unavailable.
    pub demo_mode: bool,
    pub store_path: PathBuf,
    pub login_path: String,
    pub timeouts: HttpTimeouts,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_owned(),
            identity_base_url: DEFAULT_IDENTITY_BASE_URL.to_owned(),
            identity_api_key: String::new(),
            demo_mode: false,
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            login_path: DEFAULT_LOGIN_PATH.to_owned(),
            timeouts: HttpTimeouts::default(),
        }
    }
}

impl AuthConfig {
    /// Build typed auth config from environment variables.
    ///
    /// Optional:
    /// - `AUTH_API_BASE_URL`: default `http://127.0.0.1:3000`
    /// - `IDENTITY_BASE_URL`: default `http://127.0.0.1:3000/identity`
    /// - `IDENTITY_API_KEY`: default empty
    /// - `AUTH_DEMO_MODE`: `true`/`false`, default false
    /// - `AUTH_STORE_PATH`: default `.storefront-auth.json`
    /// - `AUTH_LOGIN_PATH`: default `/admin/login`
    /// - `AUTH_REQUEST_TIMEOUT_SECS`: default 30, must be positive
    /// - `AUTH_CONNECT_TIMEOUT_SECS`: default 10, must be positive
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if a base URL is not `http(s)://` or
    /// `AUTH_DEMO_MODE` is set to an unrecognized value.
    pub fn from_env() -> Result<Self, AuthError> {
        let api_base_url = normalize_base_url(
            &std::env::var("AUTH_API_BASE_URL").unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_owned()),
        )?;
        let identity_base_url = normalize_base_url(
            &std::env::var("IDENTITY_BASE_URL").unwrap_or_else(|_| DEFAULT_IDENTITY_BASE_URL.to_owned()),
        )?;
        let identity_api_key = std::env::var("IDENTITY_API_KEY").unwrap_or_default();

        let demo_mode = match std::env::var("AUTH_DEMO_MODE") {
            Ok(raw) if !raw.trim().is_empty() => env_bool("AUTH_DEMO_MODE")
                .ok_or_else(|| AuthError::Config(format!("AUTH_DEMO_MODE must be a boolean, got {raw:?}")))?,
            _ => false,
        };

        let store_path =
            std::env::var("AUTH_STORE_PATH").map_or_else(|_| PathBuf::from(DEFAULT_STORE_PATH), PathBuf::from);
        let login_path = std::env::var("AUTH_LOGIN_PATH").unwrap_or_else(|_| DEFAULT_LOGIN_PATH.to_owned());
        let timeouts = HttpTimeouts {
            request_secs: env_parse_u64("AUTH_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse_u64("AUTH_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };

        Ok(Self { api_base_url, identity_base_url, identity_api_key, demo_mode, store_path, login_path, timeouts })
    }
}

/// Parse a boolean flag: `1/true/yes/on` and `0/false/no/off`, case-insensitive.
pub fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

/// Positive integer from the environment; zero or garbage yields `default`.
fn env_parse_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

/// Trim whitespace and trailing slashes; require an `http(s)://` scheme and host.
///
/// # Errors
///
/// Returns [`AuthError::Config`] for empty or scheme-less URLs.
pub fn normalize_base_url(raw: &str) -> Result<String, AuthError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let Some((scheme, rest)) = trimmed.split_once("://") else {
        return Err(AuthError::Config(format!("base url must include http:// or https://: {raw:?}")));
    };
    if !matches!(scheme, "http" | "https") || rest.is_empty() || rest.starts_with('/') {
        return Err(AuthError::Config(format!("invalid base url: {raw:?}")));
    }
    Ok(trimmed.to_owned())
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
