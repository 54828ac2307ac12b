//! Configuration module for server settings and credential file locations
//!
//! All configuration is loaded from environment variables following the
//! pattern `GMAIL_MCP_<KEY>`. Every setting has a default, so an empty
//! environment yields a working configuration pointing at the platform
//! config/data directories and the public Gmail API endpoint.

use std::env;
use std::env::VarError;
use std::path::PathBuf;

use crate::errors::{AppError, AppResult};

/// Directory name under the platform config/data roots
const APP_DIR: &str = "gmail-mcp";
/// Default file name for the Google OAuth client key file
const KEY_FILE_NAME: &str = "gcp-oauth.keys.json";
/// Default file name for the stored access/refresh token
const TOKEN_FILE_NAME: &str = "credentials.json";
/// Default Gmail REST endpoint
const DEFAULT_API_BASE_URL: &str = "https://gmail.googleapis.com";

/// Server-wide configuration
///
/// Cloned into MCP tool handlers via `Arc` for thread-safe shared access.
/// The API base URL is overridable so tests can point the client at a local
/// mock server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path to the Google OAuth client key file (`installed` or `web` shape)
    pub key_file: PathBuf,
    /// Path to the persisted access/refresh token JSON file
    pub token_file: PathBuf,
    /// Gmail REST base URL without a trailing slash
    pub api_base_url: String,
    /// Loopback port for the OAuth authorization-code callback
    pub redirect_port: u16,
    /// HTTP connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// HTTP total request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Seconds to wait for the browser OAuth callback during `auth`
    pub auth_timeout_secs: u64,
}

impl ServerConfig {
    /// Load all configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if a variable is set to a malformed value, or
    /// `Internal` if no path is configured and the platform config/data
    /// directory cannot be resolved.
    ///
    /// # Example Environment
    ///
    /// ```text
    /// GMAIL_MCP_KEY_FILE=/home/user/.config/gmail-mcp/gcp-oauth.keys.json
    /// GMAIL_MCP_TOKEN_FILE=/home/user/.local/share/gmail-mcp/credentials.json
    /// GMAIL_MCP_API_BASE_URL=https://gmail.googleapis.com
    /// GMAIL_MCP_REQUEST_TIMEOUT_MS=30000
    /// ```
    pub fn load_from_env() -> AppResult<Self> {
        Ok(Self {
            key_file: parse_path_env("GMAIL_MCP_KEY_FILE", default_key_file)?,
            token_file: parse_path_env("GMAIL_MCP_TOKEN_FILE", default_token_file)?,
            api_base_url: trim_base_url(&parse_string_env(
                "GMAIL_MCP_API_BASE_URL",
                DEFAULT_API_BASE_URL,
            )?),
            redirect_port: parse_u16_env("GMAIL_MCP_REDIRECT_PORT", 8787)?,
            connect_timeout_ms: parse_u64_env("GMAIL_MCP_CONNECT_TIMEOUT_MS", 10_000)?,
            request_timeout_ms: parse_u64_env("GMAIL_MCP_REQUEST_TIMEOUT_MS", 30_000)?,
            auth_timeout_secs: parse_u64_env("GMAIL_MCP_AUTH_TIMEOUT_SECS", 180)?,
        })
    }

    /// Redirect URI registered with the OAuth client for the loopback flow
    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}/callback", self.redirect_port)
    }
}

/// Default key file location under the platform config directory
fn default_key_file() -> AppResult<PathBuf> {
    let root = dirs::config_dir().ok_or_else(|| {
        AppError::Internal("unable to resolve the platform config directory".to_owned())
    })?;
    Ok(root.join(APP_DIR).join(KEY_FILE_NAME))
}

/// Default token file location under the platform data directory
fn default_token_file() -> AppResult<PathBuf> {
    let root = dirs::data_dir().ok_or_else(|| {
        AppError::Internal("unable to resolve the platform data directory".to_owned())
    })?;
    Ok(root.join(APP_DIR).join(TOKEN_FILE_NAME))
}

/// Normalize a base URL by trimming whitespace and any trailing slash
fn trim_base_url(value: &str) -> String {
    value.trim().trim_end_matches('/').to_owned()
}

/// Read a path environment variable, falling back to a computed default
fn parse_path_env(key: &str, default: fn() -> AppResult<PathBuf>) -> AppResult<PathBuf> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(PathBuf::from(v)),
        Ok(_) | Err(VarError::NotPresent) => default(),
        Err(VarError::NotUnicode(_)) => Err(AppError::InvalidInput(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

/// Read a string environment variable with default fallback
fn parse_string_env(key: &str, default: &str) -> AppResult<String> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        Ok(_) | Err(VarError::NotPresent) => Ok(default.to_owned()),
        Err(VarError::NotUnicode(_)) => Err(AppError::InvalidInput(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

/// Parse a `u16` environment variable with default fallback
///
/// Returns `default` if unset.
///
/// # Errors
///
/// Returns `InvalidInput` if the variable is set but not a valid `u16`.
fn parse_u16_env(key: &str, default: u16) -> AppResult<u16> {
    match env::var(key) {
        Ok(v) => v.parse::<u16>().map_err(|_| {
            AppError::InvalidInput(format!("invalid u16 environment variable {key}: '{v}'"))
        }),
        Err(VarError::NotPresent) => Ok(default),
        Err(VarError::NotUnicode(_)) => Err(AppError::InvalidInput(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

/// Parse a `u64` environment variable with default fallback
///
/// Returns `default` if unset.
///
/// # Errors
///
/// Returns `InvalidInput` if the variable is set but not a valid `u64`.
fn parse_u64_env(key: &str, default: u64) -> AppResult<u64> {
    match env::var(key) {
        Ok(v) => v.parse::<u64>().map_err(|_| {
            AppError::InvalidInput(format!("invalid u64 environment variable {key}: '{v}'"))
        }),
        Err(VarError::NotPresent) => Ok(default),
        Err(VarError::NotUnicode(_)) => Err(AppError::InvalidInput(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_base_url_strips_trailing_slash_and_whitespace() {
        assert_eq!(
            trim_base_url(" https://gmail.googleapis.com/ "),
            "https://gmail.googleapis.com"
        );
        assert_eq!(trim_base_url("http://127.0.0.1:9000"), "http://127.0.0.1:9000");
    }

    #[test]
    fn redirect_uri_uses_loopback_host_and_configured_port() {
        let config = ServerConfig {
            key_file: PathBuf::from("/tmp/keys.json"),
            token_file: PathBuf::from("/tmp/token.json"),
            api_base_url: DEFAULT_API_BASE_URL.to_owned(),
            redirect_port: 9123,
            connect_timeout_ms: 10_000,
            request_timeout_ms: 30_000,
            auth_timeout_secs: 180,
        };
        assert_eq!(config.redirect_uri(), "http://127.0.0.1:9123/callback");
    }
}
