//! Connection to the editor.
//!
//! The session only needs an ordered byte stream; this module turns a
//! [`Config`] into one. Anything else implementing `AsyncRead + AsyncWrite`
//! can be handed to [`crate::session::Session`] directly.

use crate::config::Config;
use crate::error::{Result, RmateError};
use tokio::net::TcpStream;

/// Resolve the configured host and connect to the first address that
/// accepts.
pub async fn connect(config: &Config) -> Result<TcpStream> {
    let addr = config.addr();
    let stream = TcpStream::connect((config.host.as_str(), config.port))
        .await
        .map_err(|source| RmateError::Connection {
            addr: addr.clone(),
            source,
        })?;
    // Commands are small; don't let Nagle hold them back.
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(%addr, error = %e, "could not disable Nagle");
    }
    tracing::debug!(%addr, "connected");
    Ok(stream)
}
