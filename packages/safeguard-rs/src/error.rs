//! Error types for the Safeguard client.

use thiserror::Error;

/// Result type for Safeguard client operations.
pub type Result<T> = std::result::Result<T, SafeguardError>;

/// Safeguard client errors.
#[derive(Debug, Error)]
pub enum SafeguardError {
    /// Network error (connection refused, TLS failure, timeout)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response from the appliance
    #[error("Safeguard API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// rSTS or token exchange rejected the credentials
    #[error("Safeguard login failed: {0}")]
    Login(String),

    /// Client certificate could not be loaded
    #[error("Invalid client certificate: {0}")]
    Certificate(String),

    /// Response body did not match the expected shape
    #[error("Unexpected Safeguard response: {0}")]
    Parse(String),
}
