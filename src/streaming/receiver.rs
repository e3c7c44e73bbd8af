//! Receive path: write a `save` payload back to disk.
//!
//! Part of the payload usually arrives in the same read as the `data:` line;
//! the rest is read straight from the transport into the mapped file.

use crate::error::{Result, RmateError};
use memmap2::MmapMut;
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Scratch size used when a payload has to be thrown away.
const DISCARD_CHUNK_SIZE: usize = 8 * 1024;

/// Number of bytes of `buffered` that belong to a payload of `length` bytes.
pub fn buffered_share(buffered: &[u8], length: u64) -> usize {
    usize::try_from(length).map_or(buffered.len(), |len| buffered.len().min(len))
}

/// Replace the contents of `target` with a payload of exactly `length` bytes.
///
/// The first bytes come from `buffered` (capped at `length`), the remainder
/// is read from `reader` until complete. A `length` of zero never touches
/// the reader. If the target cannot be opened, resized or mapped the payload
/// is still drained from `reader` so the stream stays framed.
///
/// Returns how many bytes of `buffered` were used.
pub async fn receive_save<R>(
    reader: &mut R,
    target: &Path,
    length: u64,
    buffered: &[u8],
) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    let from_buffer = buffered_share(buffered, length);
    let remaining = length - from_buffer as u64;

    let mut map = match open_target(target, length).await {
        Ok(map) => map,
        Err(e) => {
            discard_payload(reader, remaining).await?;
            return Err(e);
        }
    };

    let Some(map) = map.as_mut() else {
        return Ok(from_buffer);
    };

    map[..from_buffer].copy_from_slice(&buffered[..from_buffer]);
    let mut filled = from_buffer;
    while filled < map.len() {
        let n = reader
            .read(&mut map[filled..])
            .await
            .map_err(RmateError::Transport)?;
        if n == 0 {
            return Err(RmateError::TruncatedTransfer {
                expected: length,
                received: filled as u64,
            });
        }
        filled += n;
    }

    map.flush()
        .map_err(|e| RmateError::io("failed to write", target, e))?;
    Ok(from_buffer)
}

/// Open `target` read-write, size it to `length` and map it.
async fn open_target(target: &Path, length: u64) -> Result<Option<MmapMut>> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(target)
        .await
        .map_err(|e| RmateError::io("failed to open", target, e))?;
    file.set_len(length)
        .await
        .map_err(|e| RmateError::io("failed to resize", target, e))?;

    if length == 0 {
        return Ok(None);
    }

    let file = file.into_std().await;
    // SAFETY: the mapping lives only for this save and the file was just
    // sized to cover it. Outside writers racing the editor are not guarded
    // against.
    let map = unsafe { MmapMut::map_mut(&file) }
        .map_err(|e| RmateError::io("failed to map", target, e))?;
    Ok(Some(map))
}

/// Read and drop `remaining` payload bytes from `reader`.
pub async fn discard_payload<R>(reader: &mut R, remaining: u64) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut scratch = [0u8; DISCARD_CHUNK_SIZE];
    let mut left = remaining;
    while left > 0 {
        let want = left.min(scratch.len() as u64) as usize;
        let n = reader
            .read(&mut scratch[..want])
            .await
            .map_err(RmateError::Transport)?;
        if n == 0 {
            return Err(RmateError::TruncatedTransfer {
                expected: remaining,
                received: remaining - left,
            });
        }
        left -= n as u64;
    }
    Ok(())
}
