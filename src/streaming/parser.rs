//! Command/variable state machine for peer-issued commands.
//!
//! The peer sends a greeting line, then any number of commands. A command is
//! a line naming it (`save`, `close`, anything else is unknown) followed by
//! `name: value` variable lines. The block ends at a blank line, or for
//! `save` at a `data: <N>` variable that is immediately followed by N raw
//! bytes.
//!
//! The parser consumes one line per [`CommandParser::step`] and never reads
//! past it. Payload bytes are left to the caller: a [`Event::Payload`] tells
//! it how many bytes follow.

use super::framer::{next_line, Line};
use thiserror::Error;

/// Longest greeting or command line carried across reads.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingGreeting,
    AwaitingCommandName,
    AwaitingVariable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandKind {
    #[default]
    Unknown,
    Close,
    Save,
}

impl CommandKind {
    /// Exact, case-sensitive match against the known command literals.
    pub fn from_literal(name: &[u8]) -> Option<Self> {
        match name {
            b"close" => Some(Self::Close),
            b"save" => Some(Self::Save),
            _ => None,
        }
    }

    pub fn from_name(name: &[u8]) -> Self {
        Self::from_literal(name).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("variable line not complete within a single read")]
    IncompleteVariable,

    #[error("variable line has no ':' separator: {0:?}")]
    MalformedVariable(String),

    #[error("invalid data length {0:?}")]
    InvalidLength(String),

    #[error("line longer than {} bytes", MAX_LINE_LENGTH)]
    LineTooLong,

    #[error("data received for a command with no token")]
    MissingToken,
}

/// Per-session parse state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseState {
    phase: Phase,
    command_kind: CommandKind,
    token: Option<String>,
    declared_length: u64,
}

impl Default for ParseState {
    fn default() -> Self {
        Self::new()
    }
}

impl ParseState {
    pub fn new() -> Self {
        Self {
            phase: Phase::AwaitingGreeting,
            command_kind: CommandKind::Unknown,
            token: None,
            declared_length: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn command_kind(&self) -> CommandKind {
        self.command_kind
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn declared_length(&self) -> u64 {
        self.declared_length
    }

    /// Start a new command. Only command-scoped fields are cleared; the
    /// previous token is dropped here.
    fn begin_command(&mut self, kind: CommandKind) {
        self.command_kind = kind;
        self.token = None;
        self.declared_length = 0;
        self.phase = Phase::AwaitingVariable;
    }

    /// Store a new token, releasing the old one.
    fn replace_token(&mut self, token: String) -> Option<String> {
        self.token.replace(token)
    }

    fn reset_phase(&mut self) {
        self.phase = Phase::AwaitingCommandName;
    }
}

/// What a consumed line meant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Greeting,
    /// Blank line where a command name was expected.
    Idle,
    Command(CommandKind),
    Variable { name: String },
    /// Blank line closing the current command block.
    EndOfCommand(CommandKind),
    /// `data: <length>` seen; `length` raw bytes follow the line.
    Payload { length: u64 },
    /// Rest of an overlong line, thrown away.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// No complete line yet; nothing was consumed.
    Incomplete,
    Consumed { len: usize, event: Event },
    /// A complete line that could not be used. Parsing resumes after it
    /// with the phase reset to [`Phase::AwaitingCommandName`].
    Rejected { len: usize, error: ProtocolError },
}

#[derive(Debug, Default)]
pub struct CommandParser {
    state: ParseState,
    /// Inside an overlong line whose start was already dropped.
    skipping: bool,
}

impl CommandParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ParseState {
        &self.state
    }

    /// Consume at most one line from the front of `buf`.
    ///
    /// On `Err` no line could be framed and the caller must drop the rest
    /// of `buf`.
    pub fn step(&mut self, buf: &[u8]) -> Result<Step, ProtocolError> {
        if self.skipping {
            return Ok(self.skip(buf));
        }

        match self.state.phase {
            Phase::AwaitingGreeting => {
                let Some(line) = next_line(buf) else {
                    return self.incomplete(buf);
                };
                self.state.phase = Phase::AwaitingCommandName;
                Ok(consumed(&line, Event::Greeting))
            }
            Phase::AwaitingCommandName => {
                let Some(line) = next_line(buf) else {
                    return self.incomplete(buf);
                };
                if line.is_empty() {
                    return Ok(consumed(&line, Event::Idle));
                }
                let kind = CommandKind::from_name(line.text);
                self.state.begin_command(kind);
                Ok(consumed(&line, Event::Command(kind)))
            }
            Phase::AwaitingVariable => {
                let Some(line) = next_line(buf) else {
                    self.state.reset_phase();
                    return Err(ProtocolError::IncompleteVariable);
                };
                Ok(self.variable(line))
            }
        }
    }

    fn variable(&mut self, line: Line<'_>) -> Step {
        if line.is_empty() {
            let kind = self.state.command_kind;
            self.state.reset_phase();
            return consumed(&line, Event::EndOfCommand(kind));
        }

        let Some(colon) = line.text.iter().position(|&b| b == b':') else {
            // A bare command literal starts the next command even without a
            // blank line in between.
            if let Some(kind) = CommandKind::from_literal(line.text) {
                self.state.begin_command(kind);
                return consumed(&line, Event::Command(kind));
            }
            return self.reject(
                &line,
                ProtocolError::MalformedVariable(String::from_utf8_lossy(line.text).into_owned()),
            );
        };

        let name = String::from_utf8_lossy(&line.text[..colon]).into_owned();
        let raw_value = String::from_utf8_lossy(&line.text[colon + 1..]);
        let value = raw_value.trim_start_matches(' ');

        match name.as_str() {
            "token" => {
                self.state.replace_token(value.to_string());
            }
            "data" => {
                let Ok(length) = value.trim_end().parse::<u64>() else {
                    return self.reject(&line, ProtocolError::InvalidLength(value.to_string()));
                };
                self.state.declared_length = length;
                return consumed(&line, Event::Payload { length });
            }
            // Unknown variables are accepted and ignored.
            _ => {}
        }

        consumed(&line, Event::Variable { name })
    }

    fn reject(&mut self, line: &Line<'_>, error: ProtocolError) -> Step {
        self.state.reset_phase();
        Step::Rejected {
            len: line.consumed,
            error,
        }
    }

    /// An unterminated greeting or command line. Past the length cap the line
    /// takes effect as if it had been read (a greeting, or an unknown
    /// command) and its remaining bytes are skipped up to the next newline.
    fn incomplete(&mut self, buf: &[u8]) -> Result<Step, ProtocolError> {
        if buf.len() <= MAX_LINE_LENGTH {
            return Ok(Step::Incomplete);
        }
        match self.state.phase {
            Phase::AwaitingGreeting => self.state.phase = Phase::AwaitingCommandName,
            _ => self.state.begin_command(CommandKind::Unknown),
        }
        self.skipping = true;
        Err(ProtocolError::LineTooLong)
    }

    fn skip(&mut self, buf: &[u8]) -> Step {
        let len = match buf.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                self.skipping = false;
                pos + 1
            }
            None => buf.len(),
        };
        Step::Consumed {
            len,
            event: Event::Skipped,
        }
    }
}

fn consumed(line: &Line<'_>, event: Event) -> Step {
    Step::Consumed {
        len: line.consumed,
        event,
    }
}
