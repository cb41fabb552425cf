//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured sync events to the
//! ESP-IDF logger (UART / USB-CDC in production).

use log::{info, warn};

use crate::app::events::SyncEvent;
use crate::app::ports::EventSink;
use crate::sync::session::SessionStatus;

/// Adapter that logs every [`SyncEvent`] to the serial console.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &SyncEvent) {
        match event {
            SyncEvent::StatusChanged { from, to } => match to {
                SessionStatus::TimeSyncError | SessionStatus::ConnectError => {
                    warn!("STATUS | {:?} -> {:?}", from, to);
                }
                _ => info!("STATUS | {:?} -> {:?}", from, to),
            },
            SyncEvent::TransferCompleted { sequence_id, bytes } => {
                info!("XFER | sn={} complete, {} bytes", sequence_id, bytes);
            }
            SyncEvent::PairingUpdated { pair_code } => {
                info!("PAIR | code={}", pair_code);
            }
            SyncEvent::RestartScheduled => {
                warn!("OTA | update received, restarting");
            }
            SyncEvent::LivenessReported { free_heap } => {
                info!("PING | free_heap={}", free_heap);
            }
        }
    }
}
