//! Application error model
//!
//! Defines a typed error hierarchy using `thiserror` for internal error
//! handling. Tool handlers render these as error-flagged text content rather
//! than MCP protocol faults, so the calling model always receives a readable
//! message it can react to.

use thiserror::Error;

/// Application error type
///
/// Covers all error cases the Gmail MCP server may encounter, from input
/// validation through OAuth token refresh to upstream API failures.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid user input (validation failed, malformed request)
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Resource not found (message, label, filter)
    #[error("not found: {0}")]
    NotFound(String),
    /// Authentication failure (missing token, refresh rejected, revoked grant)
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    /// Operation timeout (HTTP connect, Gmail API response)
    #[error("operation timed out: {0}")]
    Timeout(String),
    /// Gmail API rejected the request (4xx/5xx other than auth and not-found)
    #[error("gmail api error: {0}")]
    Upstream(String),
    /// Internal error (unexpected failure, external crate error)
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Convenience constructor for `InvalidInput`
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// Type alias for fallible return values
///
/// Use this for all internal functions that can fail. Provides a consistent
/// error type throughout the codebase.
pub type AppResult<T> = Result<T, AppError>;
