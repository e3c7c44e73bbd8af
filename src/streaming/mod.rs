//! Streaming protocol for the rmate client.
//!
//! ```text
//! outgoing (once):  file --> sender --> transport
//! incoming (loop):  transport --> framer --> parser --> receiver --> file
//! ```
//!
//! Text is line oriented (`\n` or `\r\n`). Binary file contents are embedded
//! after a `data: <N>` header and framed only by that length.

pub mod framer;
pub mod parser;
pub mod receiver;
pub mod sender;

pub use framer::{next_line, Line};
pub use parser::{
    CommandKind, CommandParser, Event, ParseState, Phase, ProtocolError, Step, MAX_LINE_LENGTH,
};
pub use receiver::{discard_payload, receive_save};
pub use sender::{send_open, OpenRequest, OPEN_TRAILER};
