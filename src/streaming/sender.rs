//! Send path: announce a local file to the editor with an `open` command.
//!
//! The file contents travel verbatim after a `data: <len>` header; the
//! declared length is the only framing for that region.

use crate::error::{Result, RmateError};
use bytes::{BufMut, Bytes, BytesMut};
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Everything the `open` command announces besides the contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub display_name: String,
    pub real_path: PathBuf,
    /// Echoed back by the editor on `save`/`close`; the client uses the
    /// filename so a save lands on the same file.
    pub token: String,
    /// 1-based line to place the cursor on.
    pub selection: Option<u32>,
}

impl OpenRequest {
    /// Build a request for `path`, resolving its absolute real path.
    pub fn for_path(path: &Path) -> Result<Self> {
        let real_path = path
            .canonicalize()
            .map_err(|e| RmateError::io("failed to resolve", path, e))?;
        let name = path.to_string_lossy().into_owned();

        Ok(Self {
            display_name: name.clone(),
            real_path,
            token: name,
            selection: None,
        })
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_selection(mut self, line: Option<u32>) -> Self {
        self.selection = line;
        self
    }

    /// Command line and headers up to and including `data: <length>`.
    pub fn encode_header(&self, length: u64) -> Bytes {
        let mut buf = BytesMut::with_capacity(256);
        buf.put_slice(b"open\n");
        put_var(&mut buf, "display-name", &self.display_name);
        put_var(&mut buf, "real-path", &self.real_path.to_string_lossy());
        put_var(&mut buf, "data-on-save", "yes");
        put_var(&mut buf, "re-activate", "yes");
        if let Some(line) = self.selection {
            put_var(&mut buf, "selection", &line.to_string());
        }
        put_var(&mut buf, "token", &self.token);
        put_var(&mut buf, "data", &length.to_string());
        buf.freeze()
    }
}

fn put_var(buf: &mut BytesMut, name: &str, value: &str) {
    buf.put_slice(name.as_bytes());
    buf.put_slice(b": ");
    buf.put_slice(value.as_bytes());
    buf.put_u8(b'\n');
}

/// Terminates the `open` command after the payload.
pub const OPEN_TRAILER: &[u8] = b"\n.\n";

/// Write the complete `open` command for `file` to `writer`.
///
/// Nothing is written if the file cannot be stat'ed or mapped. Returns the
/// number of payload bytes sent.
pub async fn send_open<W>(writer: &mut W, request: &OpenRequest, file: &File) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let length = file
        .metadata()
        .map_err(|e| RmateError::io("failed to stat", &request.real_path, e))?
        .len();

    // Zero-length files have nothing to map.
    let contents = if length == 0 {
        None
    } else {
        // SAFETY: the mapping is read-only and dropped before returning;
        // concurrent truncation by another process is outside our control,
        // as with any mmap-based reader.
        let map = unsafe { Mmap::map(file) }
            .map_err(|e| RmateError::io("failed to map", &request.real_path, e))?;
        Some(map)
    };

    let header = request.encode_header(length);
    writer
        .write_all(&header)
        .await
        .map_err(RmateError::Transport)?;
    if let Some(map) = &contents {
        writer.write_all(map).await.map_err(RmateError::Transport)?;
    }
    writer
        .write_all(OPEN_TRAILER)
        .await
        .map_err(RmateError::Transport)?;
    writer.flush().await.map_err(RmateError::Transport)?;

    tracing::debug!(token = %request.token, bytes = length, "sent open");
    Ok(length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn request(path: &Path) -> OpenRequest {
        OpenRequest {
            display_name: "notes.txt".to_string(),
            real_path: path.to_path_buf(),
            token: "notes.txt".to_string(),
            selection: None,
        }
    }

    #[test]
    fn test_header_layout() {
        let req = request(Path::new("/home/u/notes.txt"));
        let header = req.encode_header(12);
        assert_eq!(
            &header[..],
            b"open\n\
              display-name: notes.txt\n\
              real-path: /home/u/notes.txt\n\
              data-on-save: yes\n\
              re-activate: yes\n\
              token: notes.txt\n\
              data: 12\n"
                .as_slice()
        );
    }

    #[test]
    fn test_header_with_selection() {
        let req = request(Path::new("/tmp/n")).with_selection(Some(42));
        let header = String::from_utf8(req.encode_header(0).to_vec()).unwrap();
        assert!(header.contains("re-activate: yes\nselection: 42\ntoken: notes.txt\n"));
    }

    #[test]
    fn test_for_path_resolves_real_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.txt");
        std::fs::write(&path, "x").unwrap();

        let req = OpenRequest::for_path(&path).unwrap();
        assert!(req.real_path.is_absolute());
        assert_eq!(req.real_path, path.canonicalize().unwrap());
        assert_eq!(req.token, path.to_string_lossy());
        assert_eq!(req.display_name, req.token);
    }

    #[test]
    fn test_for_path_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = OpenRequest::for_path(&temp.path().join("nope")).unwrap_err();
        assert!(matches!(err, RmateError::Io { .. }));
    }

    #[tokio::test]
    async fn test_send_open_writes_contents_verbatim() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bin.dat");
        let payload = b"line\n\r\n\0binary\nno escaping";
        std::fs::File::create(&path)
            .unwrap()
            .write_all(payload)
            .unwrap();

        let file = File::open(&path).unwrap();
        let req = request(&path);
        let mut out = Vec::new();
        let sent = send_open(&mut out, &req, &file).await.unwrap();
        assert_eq!(sent, payload.len() as u64);

        let header = req.encode_header(payload.len() as u64);
        assert_eq!(&out[..header.len()], &header[..]);
        assert_eq!(
            &out[header.len()..header.len() + payload.len()],
            payload.as_slice()
        );
        assert_eq!(&out[header.len() + payload.len()..], OPEN_TRAILER);
    }

    #[tokio::test]
    async fn test_send_open_empty_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("empty");
        std::fs::write(&path, "").unwrap();

        let file = File::open(&path).unwrap();
        let req = request(&path);
        let mut out = Vec::new();
        assert_eq!(send_open(&mut out, &req, &file).await.unwrap(), 0);
        assert!(out.ends_with(b"data: 0\n\n.\n"));
    }
}
