//! Connection error types.
//!
//! Every failure a connection can observe is mapped onto one of these
//! variants. All of them are local to the connection that produced them.

use std::io;
use thiserror::Error;

/// Errors that can end (or, for timeouts, probe) a single connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Reset, broken pipe, EOF or any other socket failure.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// The operation was aborted by this connection's own stop request.
    #[error("operation cancelled")]
    Cancelled,

    /// TLS negotiation failed before any application data was read.
    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] io::Error),

    /// Malformed HTTP or WebSocket input.
    #[error("protocol parse error: {0}")]
    ProtocolParse(String),

    /// The idle timer expired.
    #[error("connection idle for {0} seconds")]
    Timeout(u64),

    /// The transport was used in a way its kind does not allow.
    #[error("transport misconfigured: {0}")]
    Config(&'static str),
}

impl ConnectionError {
    /// Self-inflicted cancellations are expected during teardown and
    /// must never be reported as failures.
    pub fn is_benign(&self) -> bool {
        matches!(self, ConnectionError::Cancelled)
    }
}

/// Result type alias for connection operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;
