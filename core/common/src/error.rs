//! Common error types for SpendSync.

use thiserror::Error;

/// Top-level error type for SpendSync operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The connectivity monitor reports offline; no attempt was made.
    #[error("No internet connection")]
    NoConnectivity,

    /// Malformed URL or request encoding failure.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Missing or rejected credentials (HTTP 401 semantics).
    #[error("Not authenticated")]
    Unauthorized,

    /// Non-success HTTP status from the server.
    #[error("Server error: {0}")]
    ServerError(u16),

    /// Request timed out after exhausting the retry budget.
    #[error("Request timed out")]
    Timeout,

    /// Host unreachable or DNS failure.
    #[error("Server is not available. Working offline.")]
    ServerUnavailable,

    /// Response body could not be decoded into the expected type.
    #[error("Failed to decode response: {0}")]
    DecodingFailure(String),

    /// Local store operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything that does not fit the taxonomy above.
    #[error("Unexpected error: {0}")]
    Unknown(String),
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(Error::NoConnectivity.to_string(), "No internet connection");
        assert_eq!(Error::ServerError(500).to_string(), "Server error: 500");
    }
}
