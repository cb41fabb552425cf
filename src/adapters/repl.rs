//! REPL keystroke bridge.
//!
//! Implements [`ExecPort`] by pushing console bytes into the interpreter's
//! keystroke queue, exactly as if they had been typed on the serial
//! console in raw-REPL mode:
//!
//! | step     | bytes          | effect                          |
//! |----------|----------------|---------------------------------|
//! | `begin`  | `0x03 0x01`    | Ctrl-C interrupt, Ctrl-A raw    |
//! | `feed`   | payload        | program text (CR line endings)  |
//! | `finish` | `0x04`         | Ctrl-D, run the buffered input  |
//!
//! The queue is bounded; a full queue rejects the whole `feed` so the
//! interpreter never sees a truncated program.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, warn};

use crate::app::ports::ExecPort;
use crate::error::{ErrorCode, Result};

pub const CTRL_A: u8 = 0x01;
pub const CTRL_C: u8 = 0x03;
pub const CTRL_D: u8 = 0x04;

/// Default queue size: one maximum-size packet plus slack.
pub const DEFAULT_CAPACITY: usize = 16 * 1024;

/// Bounded queue shared with the interpreter task.
#[derive(Clone)]
pub struct KeystrokeQueue {
    inner: Arc<Mutex<VecDeque<u8>>>,
    capacity: usize,
}

impl KeystrokeQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
            capacity,
        }
    }

    fn push(&self, bytes: &[u8]) -> Result<()> {
        let mut q = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if q.len() + bytes.len() > self.capacity {
            warn!("repl: keystroke queue full ({} queued)", q.len());
            return Err(ErrorCode::NoMemoryAvailable);
        }
        q.extend(bytes);
        Ok(())
    }

    /// Take up to `buf.len()` queued bytes. Called by the interpreter side.
    pub fn pop_into(&self, buf: &mut [u8]) -> usize {
        let mut q = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let n = buf.len().min(q.len());
        for (slot, b) in buf.iter_mut().zip(q.drain(..n)) {
            *slot = b;
        }
        n
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// [`ExecPort`] over a [`KeystrokeQueue`].
pub struct ReplBridge {
    queue: KeystrokeQueue,
}

impl ReplBridge {
    pub fn new(queue: KeystrokeQueue) -> Self {
        Self { queue }
    }
}

impl ExecPort for ReplBridge {
    fn begin(&mut self) -> Result<()> {
        debug!("repl: interrupt + raw mode");
        self.queue.push(&[CTRL_C, CTRL_A])
    }

    fn feed(&mut self, data: &[u8]) -> Result<()> {
        self.queue.push(data)
    }

    fn finish(&mut self) -> Result<()> {
        debug!("repl: end of input");
        self.queue.push(&[CTRL_D])
    }
}
