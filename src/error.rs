// Error handling module
// Defines the error types surfaced by the ingestion client

use thiserror::Error;

/// Errors that can occur while talking to the remote API
#[derive(Error, Debug)]
pub enum ApiError {
    /// Login failed (transport error, non-success status or unusable token)
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Non-success response that is not retried
    #[error("API error: {status} - {message}")]
    RequestFailed { status: u16, message: String },

    /// Retry budget spent on 429/5xx responses
    #[error("API error after {attempts} attempts: {status} - {message}")]
    RetriesExhausted {
        status: u16,
        message: String,
        attempts: u32,
    },

    /// Network-level failure (connect, timeout, body read)
    #[error("Transport error ({kind}): {message}")]
    Transport { kind: &'static str, message: String },

    /// Response body was not the JSON we expected
    #[error("Decode error: {0}")]
    Decode(String),

    /// Identifier could not be resolved by a dedicated lookup
    #[error("Lookup miss for identifier {0}")]
    LookupMiss(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// HTTP status attached to the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::RequestFailed { status, .. } | ApiError::RetriesExhausted { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Build a transport error from a reqwest failure, categorizing its kind
    pub fn from_transport(e: &reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            "timeout"
        } else if e.is_connect() {
            "connection_failed"
        } else if e.is_request() {
            "request_error"
        } else if e.is_body() {
            "body_error"
        } else if e.is_decode() {
            "decode_error"
        } else {
            "unknown"
        };

        ApiError::Transport {
            kind,
            message: e.to_string(),
        }
    }
}

/// Result type alias for API operations
pub type Result<T> = std::result::Result<T, ApiError>;
