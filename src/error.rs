//! Error types for the rmate client.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::streaming::ProtocolError;

pub type Result<T> = std::result::Result<T, RmateError>;

/// Errors raised by the client library.
#[derive(Debug, Error)]
pub enum RmateError {
    /// Address resolution or connect failure.
    #[error("could not connect to {addr}: {source}")]
    Connection {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Local file open/stat/map/resize/write failure.
    #[error("{context} {}: {source}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Malformed line or variable from the peer.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The stream ended before a declared payload was complete.
    #[error("transfer truncated: expected {expected} bytes, received {received}")]
    TruncatedTransfer { expected: u64, received: u64 },

    /// Read or write failure on the transport itself.
    #[error("transport error: {0}")]
    Transport(#[source] io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl RmateError {
    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            context,
            path: path.into(),
            source,
        }
    }

    /// Whether the session can keep servicing commands after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Protocol(_))
    }
}
