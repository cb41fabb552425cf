//! Remote code execution stream (`exec` topic).
//!
//! Chunk 0 interrupts the interpreter and switches it to raw input before
//! any payload is delivered; the last chunk is followed by the
//! end-of-stream marker that makes the REPL run the buffered program.
//! LF bytes are delivered as CR: the console driver treats CR as the line
//! terminator in raw mode and the cloud service depends on it.

use log::{info, warn};

use super::packet::Chunk;
use super::reassembler::Reassembler;
use crate::app::ports::ExecPort;
use crate::error::{ErrorCode, Result};

/// Replace every LF with CR, in place.
pub fn translate_newlines(data: &mut [u8]) {
    for b in data.iter_mut().filter(|b| **b == b'\n') {
        *b = b'\r';
    }
}

pub struct ExecStream {
    reassembler: Reassembler,
    streamed: usize,
}

impl ExecStream {
    pub fn new(max_payload: usize) -> Self {
        Self {
            reassembler: Reassembler::new(max_payload),
            streamed: 0,
        }
    }

    /// Validate `chunk` and stream its payload into `exec`. Returns the
    /// total bytes streamed once the last chunk has been submitted.
    pub fn handle(&mut self, chunk: &Chunk, exec: &mut dyn ExecPort) -> Result<Option<usize>> {
        let mut accepted = self.reassembler.accept(chunk)?;

        if accepted.is_first {
            info!("exec: sn={} start ({} chunks)", chunk.sequence_id, chunk.total);
            self.streamed = 0;
            exec.begin().map_err(|e| self.abort(chunk, e))?;
        }

        translate_newlines(&mut accepted.data);
        exec.feed(&accepted.data).map_err(|e| self.abort(chunk, e))?;
        self.streamed += accepted.data.len();

        if !accepted.is_last {
            return Ok(None);
        }
        exec.finish().map_err(|e| self.abort(chunk, e))?;
        info!("exec: sn={} submitted ({} bytes)", chunk.sequence_id, self.streamed);
        Ok(Some(self.streamed))
    }

    fn abort(&mut self, chunk: &Chunk, cause: ErrorCode) -> ErrorCode {
        warn!("exec: sn={} idx={} consumer failed: {}", chunk.sequence_id, chunk.index, cause);
        self.reassembler.reset();
        ErrorCode::ExecuteError
    }
}

// ── Tests ────────────────────────────────────────────────────
