//! Sequenced chunk reassembly for exec and file-write transfers.
//!
//! Each chunk carries `pkg_sn` (transfer id), `pkg_tot`, `pkg_idx` and a
//! base64 payload with its declared decoded length. Chunks are validated
//! in a fixed order, each failure with its own code:
//!
//! ```text
//! size bound ─▶ base64 decode ─▶ length check ─▶ continuity
//!  TooLarge      NoMemory         LengthError     IndexError
//! ```
//!
//! A length mismatch rejects only the offending chunk: continuity state is
//! kept so the sender can retransmit it. A continuity break discards the
//! transfer; the next `pkg_idx == 0` starts over. There is no timeout, a
//! stalled transfer is simply superseded.

extern crate alloc;
use alloc::vec::Vec;

use log::{debug, warn};

use super::codec;
use super::packet::Chunk;
use crate::error::{ErrorCode, Result};

/// Position inside an active transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Progress {
    sequence_id: i64,
    total: u32,
    next_index: u32,
}

/// A chunk that passed every check, with its decoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub data: Vec<u8>,
    pub index: u32,
    pub is_first: bool,
    pub is_last: bool,
}

/// Continuity tracker for one transfer channel.
pub struct Reassembler {
    progress: Option<Progress>,
    max_payload: usize,
}

impl Reassembler {
    /// `max_payload` bounds the decoded bytes of a single chunk.
    pub fn new(max_payload: usize) -> Self {
        Self {
            progress: None,
            max_payload,
        }
    }

    /// Validate one chunk and advance continuity.
    pub fn accept(&mut self, chunk: &Chunk) -> Result<Accepted> {
        if chunk.total == 0 || chunk.index >= chunk.total {
            warn!(
                "reasm: sn={} idx={} outside total {}",
                chunk.sequence_id, chunk.index, chunk.total
            );
            self.progress = None;
            return Err(ErrorCode::IndexError);
        }

        if chunk.declared_len > self.max_payload
            || chunk.encoded.len() > codec::max_encoded_len(self.max_payload)
        {
            warn!(
                "reasm: sn={} idx={} exceeds {} byte bound",
                chunk.sequence_id, chunk.index, self.max_payload
            );
            return Err(ErrorCode::PayloadTooLarge);
        }

        let data = codec::decode(chunk.encoded.as_bytes()).map_err(|e| {
            warn!("reasm: sn={} idx={} {}", chunk.sequence_id, chunk.index, e);
            ErrorCode::NoMemoryAvailable
        })?;

        if data.len() != chunk.declared_len {
            warn!(
                "reasm: sn={} idx={} decoded {} bytes, declared {}",
                chunk.sequence_id,
                chunk.index,
                data.len(),
                chunk.declared_len
            );
            return Err(ErrorCode::LengthError);
        }

        if chunk.is_first() {
            self.progress = Some(Progress {
                sequence_id: chunk.sequence_id,
                total: chunk.total,
                next_index: 1,
            });
        } else {
            match self.progress {
                Some(p)
                    if p.sequence_id == chunk.sequence_id
                        && p.total == chunk.total
                        && p.next_index == chunk.index =>
                {
                    self.progress = Some(Progress {
                        next_index: p.next_index + 1,
                        ..p
                    });
                }
                other => {
                    warn!(
                        "reasm: sn={} idx={} breaks continuity (expected {:?})",
                        chunk.sequence_id,
                        chunk.index,
                        other.map(|p| (p.sequence_id, p.next_index))
                    );
                    self.progress = None;
                    return Err(ErrorCode::IndexError);
                }
            }
        }

        let is_last = chunk.is_last();
        if is_last {
            debug!("reasm: sn={} complete ({} chunks)", chunk.sequence_id, chunk.total);
            self.progress = None;
        }

        Ok(Accepted {
            data,
            index: chunk.index,
            is_first: chunk.is_first(),
            is_last,
        })
    }

    /// Abandon the active transfer, if any.
    pub fn reset(&mut self) {
        self.progress = None;
    }

    /// Whether a transfer is in progress.
    pub fn is_active(&self) -> bool {
        self.progress.is_some()
    }
}

// ── Tests ────────────────────────────────────────────────────
