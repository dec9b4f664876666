//! Error types for the Movebank client.
//!
//! # Design
//! Three kinds cover a single request/response exchange: the transport failed
//! (`Network`), the service answered with a non-2xx status (`Remote`), or the
//! body did not match the format it claimed (`Format`). `Config` is only
//! produced while assembling a `ClientConfig`, never during an exchange.

use thiserror::Error;

/// Errors returned by `MovebankClient` and its helpers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The host could not be reached, the connection broke, or the request
    /// timed out. No partial result is returned.
    #[error("network error: {0}")]
    Network(String),

    /// The service returned a non-2xx status. The body is kept verbatim for
    /// diagnostics.
    #[error("HTTP {status}: {body}")]
    Remote { status: u16, body: String },

    /// The body could not be parsed as the CSV or JSON it claimed to be.
    #[error("format error: {0}")]
    Format(String),

    /// Client configuration is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

impl From<csv::Error> for ApiError {
    fn from(err: csv::Error) -> Self {
        ApiError::Format(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Format(err.to_string())
    }
}
