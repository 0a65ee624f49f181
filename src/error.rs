//! Error types at the service's API seams.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("registration store failure: {0:#}")]
    Store(#[from] anyhow::Error),
}

/// Errors from a single push transport request, before they are classified
/// into a delivery outcome.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("FCM authentication failed: {0}")]
    Auth(String),

    /// The transport answered with a non-success status.
    #[error("push rejected with status {status} ({}): {message}", .code.as_deref().unwrap_or("no error code"))]
    Rejected {
        status: u16,
        code: Option<String>,
        message: String,
    },
}
