#![allow(dead_code)]

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// Transport stand-in that delivers each chunk as its own read.
///
/// A chunk larger than the caller's buffer is split and the remainder kept
/// for the next read, like a socket would.
pub struct ChunkedReader {
    chunks: VecDeque<Vec<u8>>,
    pub reads: usize,
    pub eof_reads: usize,
}

impl ChunkedReader {
    pub fn new<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        Self {
            chunks: chunks.into_iter().map(|c| c.as_ref().to_vec()).collect(),
            reads: 0,
            eof_reads: 0,
        }
    }

    /// Split `input` at the given offsets.
    pub fn split_at(input: &[u8], cuts: &[usize]) -> Self {
        let mut cuts: Vec<usize> = cuts
            .iter()
            .copied()
            .filter(|&c| c > 0 && c < input.len())
            .collect();
        cuts.sort_unstable();
        cuts.dedup();

        let mut chunks = Vec::new();
        let mut start = 0;
        for cut in cuts {
            chunks.push(input[start..cut].to_vec());
            start = cut;
        }
        chunks.push(input[start..].to_vec());
        Self::new(chunks)
    }

    pub fn remaining(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }
}

impl AsyncRead for ChunkedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        self.reads += 1;
        let Some(mut chunk) = self.chunks.pop_front() else {
            self.eof_reads += 1;
            return Poll::Ready(Ok(()));
        };
        if chunk.len() > buf.remaining() {
            let rest = chunk.split_off(buf.remaining());
            self.chunks.push_front(rest);
        }
        buf.put_slice(&chunk);
        Poll::Ready(Ok(()))
    }
}
