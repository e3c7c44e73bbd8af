//! Session driver.
//!
//! Sends the `open` command once, then reads the transport chunk by chunk and
//! feeds each chunk through the command parser until the editor closes the
//! stream. Everything is sequential: one parser, one transport, one command
//! in flight.

use crate::config::Config;
use crate::error::{Result, RmateError};
use crate::streaming::receiver::buffered_share;
use crate::streaming::{
    discard_payload, receive_save, send_open, CommandKind, CommandParser, Event, OpenRequest,
    ParseState, ProtocolError, Step,
};
use bytes::BytesMut;
use std::fs::File;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::{debug, error, info, warn};

/// Bytes requested from the transport per read.
pub const READ_CHUNK_SIZE: usize = 1024;

/// Counters for what happened during a session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub saves: u64,
    pub failed_saves: u64,
    pub bytes_saved: u64,
    pub closes: u64,
    pub protocol_errors: u64,
}

pub struct Session<R, W> {
    reader: R,
    writer: W,
    parser: CommandParser,
    /// Incomplete greeting/command line carried into the next read.
    pending: BytesMut,
    stats: SessionStats,
}

impl<R, W> Session<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            parser: CommandParser::new(),
            pending: BytesMut::with_capacity(READ_CHUNK_SIZE),
            stats: SessionStats::default(),
        }
    }

    pub fn state(&self) -> &ParseState {
        self.parser.state()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Announce `file` to the editor.
    pub async fn open(&mut self, request: &OpenRequest, file: &File) -> Result<u64> {
        let sent = send_open(&mut self.writer, request, file).await?;
        info!(path = %request.real_path.display(), bytes = sent, "opened in editor");
        Ok(sent)
    }

    /// Service editor commands until the stream ends.
    pub async fn run(&mut self) -> Result<SessionStats> {
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];
        loop {
            let n = self
                .reader
                .read(&mut chunk)
                .await
                .map_err(RmateError::Transport)?;
            if n == 0 {
                if !self.pending.is_empty() {
                    debug!(
                        bytes = self.pending.len(),
                        "stream ended inside a line, discarding"
                    );
                    self.pending.clear();
                }
                break;
            }

            self.pending.extend_from_slice(&chunk[..n]);
            let buf = self.pending.split();
            self.feed(&buf).await?;
        }

        debug!(stats = ?self.stats, "session ended");
        Ok(self.stats)
    }

    /// Run one read's worth of bytes through the parser.
    ///
    /// A rejected line is skipped and parsing carries on after it. A line
    /// that cannot be framed drops whatever is left of `buf`.
    pub async fn feed(&mut self, buf: &[u8]) -> Result<()> {
        let mut offset = 0;
        while offset < buf.len() {
            let rest = &buf[offset..];
            match self.parser.step(rest) {
                Ok(Step::Incomplete) => {
                    self.pending.extend_from_slice(rest);
                    break;
                }
                Ok(Step::Consumed { len, event }) => {
                    offset += len;
                    offset += self.dispatch(event, &buf[offset..]).await?;
                }
                Ok(Step::Rejected { len, error }) => {
                    self.protocol_error(&error, len);
                    offset += len;
                }
                Err(e) => {
                    self.protocol_error(&e, rest.len());
                    break;
                }
            }
        }
        Ok(())
    }

    /// Act on a parser event. Returns how many bytes after the line were
    /// consumed as payload.
    async fn dispatch(&mut self, event: Event, rest: &[u8]) -> Result<usize> {
        match event {
            Event::Greeting => debug!("editor greeting received"),
            Event::Idle => {}
            Event::Command(kind) => {
                debug!(?kind, "command");
                if kind == CommandKind::Close {
                    self.stats.closes += 1;
                }
            }
            Event::Variable { name } => debug!(%name, "variable"),
            Event::EndOfCommand(CommandKind::Close) => {
                info!(token = self.parser.state().token().unwrap_or(""), "closed in editor");
            }
            Event::EndOfCommand(_) => {}
            Event::Skipped => {}
            Event::Payload { length } => return self.save(length, rest).await,
        }
        Ok(0)
    }

    async fn save(&mut self, length: u64, rest: &[u8]) -> Result<usize> {
        let used = buffered_share(rest, length);
        let Some(target) = self.parser.state().token().map(PathBuf::from) else {
            discard_payload(&mut self.reader, length - used as u64).await?;
            self.protocol_error(&ProtocolError::MissingToken, 0);
            return Ok(used);
        };

        match receive_save(&mut self.reader, &target, length, rest).await {
            Ok(_) => {
                self.stats.saves += 1;
                self.stats.bytes_saved += length;
                info!(path = %target.display(), bytes = length, "saved");
            }
            Err(e) if e.is_recoverable() => {
                self.stats.failed_saves += 1;
                error!(path = %target.display(), error = %e, "save failed");
            }
            Err(e) => return Err(e),
        }
        Ok(used)
    }

    fn protocol_error(&mut self, err: &ProtocolError, dropped: usize) {
        self.stats.protocol_errors += 1;
        warn!(error = %err, dropped, "protocol error, skipping to next command");
    }
}

/// Extra knobs for the `open` command.
#[derive(Debug, Clone, Default)]
pub struct EditOptions {
    /// Name shown in the editor instead of the path.
    pub display_name: Option<String>,
    /// Line to place the cursor on.
    pub line: Option<u32>,
}

/// Open `path` in the editor described by `config` and keep it in sync until
/// the editor disconnects.
pub async fn edit(config: &Config, path: &Path, options: EditOptions) -> Result<SessionStats> {
    let stream = crate::transport::connect(config).await?;
    let (reader, writer) = stream.into_split();
    let mut session = Session::new(reader, writer);

    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| RmateError::io("failed to open", path, e))?
        .into_std()
        .await;

    let mut request = OpenRequest::for_path(path)?.with_selection(options.line);
    if let Some(name) = options.display_name {
        request = request.with_display_name(name);
    }

    session.open(&request, &file).await?;
    drop(file);

    session.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn session(input: &'static [u8]) -> Session<&'static [u8], Vec<u8>> {
        Session::new(input, Vec::new())
    }

    #[tokio::test]
    async fn test_close_without_token_no_io() {
        let mut s = session(b"TextMate\nclose\n\n");
        let stats = s.run().await.unwrap();
        assert_eq!(stats.closes, 1);
        assert_eq!(stats.saves, 0);
        assert_eq!(s.state().command_kind(), CommandKind::Close);
        assert_eq!(s.state().token(), None);
    }

    #[tokio::test]
    async fn test_save_without_token_drains_payload() {
        let mut s = session(b"hi\nsave\ndata: 3\nabc\nclose\n");
        let stats = s.run().await.unwrap();
        assert_eq!(stats.protocol_errors, 1);
        assert_eq!(stats.saves, 0);
        assert_eq!(stats.closes, 1);
    }

    #[tokio::test]
    async fn test_malformed_line_resumes_parsing() {
        let mut s = session(b"editor\nsave\ntoken: a\nbad line\nclose\ntoken: b\n\n");
        let stats = s.run().await.unwrap();
        assert_eq!(stats.protocol_errors, 1);
        // `close` was in the same read as the bad line.
        assert_eq!(stats.closes, 1);
        assert_eq!(s.state().command_kind(), CommandKind::Close);
        assert_eq!(s.state().token(), Some("b"));
    }

    #[tokio::test]
    async fn test_invalid_length_resumes_parsing() {
        let mut s = session(b"editor\nsave\ntoken: a\ndata: -3\nclose\n\n");
        let stats = s.run().await.unwrap();
        assert_eq!(stats.protocol_errors, 1);
        assert_eq!(stats.saves, 0);
        assert_eq!(stats.closes, 1);
    }

    #[tokio::test]
    async fn test_unframed_variable_drops_rest_of_read() {
        let mut s = session(b"editor\nsave\ntoken: a");
        let stats = s.run().await.unwrap();
        assert_eq!(stats.protocol_errors, 1);
        assert_eq!(s.state().phase(), crate::streaming::Phase::AwaitingCommandName);
    }

    #[tokio::test]
    async fn test_save_to_missing_file_keeps_session_alive() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("gone.txt");
        let input = format!(
            "hi\nsave\ntoken: {}\ndata: 4\nabcd\nclose\n\n",
            missing.display()
        );
        let input: &'static [u8] = Box::leak(input.into_bytes().into_boxed_slice());

        let mut s = session(input);
        let stats = s.run().await.unwrap();
        assert_eq!(stats.failed_saves, 1);
        assert_eq!(stats.closes, 1);
        assert!(!missing.exists());
    }

    #[tokio::test]
    async fn test_open_writes_command() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.txt");
        std::fs::write(&path, "abc").unwrap();

        let mut s = session(b"");
        let request = OpenRequest::for_path(&path).unwrap();
        let sent = s.open(&request, &File::open(&path).unwrap()).await.unwrap();
        assert_eq!(sent, 3);
        assert!(s.writer.starts_with(b"open\n"));
        assert!(s.writer.ends_with(b"data: 3\nabc\n.\n"));
    }
}
