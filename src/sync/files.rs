//! File-topic storage operations: chunked writes, listing, removal.

use log::{info, warn};

use super::packet::{Chunk, ListEntry};
use super::reassembler::Reassembler;
use crate::app::ports::{FileError, FileHandle, FilePort, OpenMode};
use crate::error::{ErrorCode, Result};

/// State after a chunk was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteProgress {
    /// This chunk completed the transfer.
    pub completed: bool,
    /// Bytes written so far in the current transfer.
    pub bytes: usize,
}

/// Chunked writer for `file_op` write and write_v2.
///
/// Chunk 0 truncates the destination and fixes it for the transfer; later
/// chunks append and must name the same path. Every chunk is opened,
/// written and closed on its own so an abandoned transfer leaves no open
/// handle behind. A storage failure or a changed path abandons the
/// transfer.
pub struct FileWriter {
    reassembler: Reassembler,
    destination: Option<String>,
    written: usize,
}

impl FileWriter {
    pub fn new(max_payload: usize) -> Self {
        Self {
            reassembler: Reassembler::new(max_payload),
            destination: None,
            written: 0,
        }
    }

    pub fn handle<F: FilePort>(&mut self, fs: &F, path: &str, chunk: &Chunk) -> Result<WriteProgress> {
        let accepted = self.reassembler.accept(chunk)?;
        if accepted.is_first {
            self.written = 0;
            self.destination = Some(path.to_owned());
        } else if self.destination.as_deref() != Some(path) {
            warn!(
                "file: sn={} idx={} path changed to {path}, transfer abandoned",
                chunk.sequence_id, chunk.index
            );
            self.abandon();
            return Err(ErrorCode::IndexError);
        }

        let mode = if accepted.is_first {
            OpenMode::Truncate
        } else {
            OpenMode::Append
        };

        if let Err(e) = write_chunk(fs, path, mode, &accepted.data) {
            warn!(
                "file: sn={} idx={} {path}: {e}",
                chunk.sequence_id, chunk.index
            );
            self.abandon();
            return Err(e.into());
        }

        self.written += accepted.data.len();
        if accepted.is_last {
            info!(
                "file: sn={} wrote {path} ({} bytes)",
                chunk.sequence_id, self.written
            );
        }
        if accepted.is_last {
            self.destination = None;
        }
        Ok(WriteProgress {
            completed: accepted.is_last,
            bytes: self.written,
        })
    }

    fn abandon(&mut self) {
        self.reassembler.reset();
        self.destination = None;
    }
}

fn write_chunk<F: FilePort>(fs: &F, path: &str, mode: OpenMode, data: &[u8]) -> core::result::Result<(), FileError> {
    let mut file = match fs.open(path, mode) {
        Ok(f) => f,
        Err(FileError::NotFound) => return Err(FileError::OpenFailed),
        Err(e) => return Err(e),
    };
    if let Err(e) = file.write(data) {
        let _ = file.close();
        return Err(e);
    }
    file.close()
}

/// Raw directory listing with every `md5` left null.
pub fn list_dir<F: FilePort>(fs: &F, dir: &str) -> Result<Vec<ListEntry>> {
    let entries = fs.read_dir(dir).map_err(|e| {
        warn!("file: list {dir}: {e}");
        ErrorCode::from(e)
    })?;
    Ok(entries
        .into_iter()
        .map(|e| ListEntry {
            name: e.name,
            md5: None,
        })
        .collect())
}

/// Remove a file from storage.
pub fn remove_file<F: FilePort>(fs: &F, path: &str) -> Result<()> {
    fs.remove(path).map_err(|e| {
        warn!("file: remove {path}: {e}");
        ErrorCode::from(e)
    })
}

// ── Tests ────────────────────────────────────────────────────
