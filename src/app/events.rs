//! Outbound sync events.
//!
//! The sync worker emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them; the firmware logs them to serial.

use crate::sync::session::SessionStatus;

/// Structured events emitted by the sync core.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The session status machine moved.
    StatusChanged { from: SessionStatus, to: SessionStatus },

    /// A chunked inbound transfer completed (exec stream or file write).
    TransferCompleted { sequence_id: i64, bytes: usize },

    /// The cloud pushed a new pairing code.
    PairingUpdated { pair_code: String },

    /// A validated OTA payload landed; the device is about to restart.
    RestartScheduled,

    /// A liveness report was published.
    LivenessReported { free_heap: u32 },
}
