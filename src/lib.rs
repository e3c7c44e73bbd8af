//! rmate - edit local files in a remote-capable editor.
//!
//! The client connects to an editor listening for the rmate protocol, sends
//! the file with an `open` command and writes `save` payloads back to disk
//! until the editor closes the connection.

pub mod config;
pub mod error;
pub mod session;
pub mod streaming;
pub mod transport;

pub use config::Config;
pub use error::{Result, RmateError};
pub use session::{edit, EditOptions, Session, SessionStats};
