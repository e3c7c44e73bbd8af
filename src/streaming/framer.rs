//! Line framing for the text parts of the protocol.
//!
//! Lines end in `\n`, optionally preceded by `\r`. The framer never touches
//! the buffer: it hands back a span of the line and how many bytes the line
//! occupied, so binary payload that follows a header in the same read stays
//! intact.

/// One framed line borrowed from the read buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line<'a> {
    /// Line contents without the terminator.
    pub text: &'a [u8],
    /// Bytes consumed including the terminator.
    pub consumed: usize,
}

impl<'a> Line<'a> {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Locate the first complete line in `buf`.
///
/// Returns `None` when no `\n` is present yet; the caller decides whether to
/// wait for more bytes or treat it as an error.
pub fn next_line(buf: &[u8]) -> Option<Line<'_>> {
    let nl = buf.iter().position(|&b| b == b'\n')?;
    let mut text = &buf[..nl];
    if let Some(stripped) = text.strip_suffix(b"\r") {
        text = stripped;
    }
    Some(Line {
        text,
        consumed: nl + 1,
    })
}
