//! Inter-task channels for the sync core.
//!
//! `embassy-sync` bounded channels bridge the transport callback, the
//! session worker and the read worker. Producers only ever `try_send`;
//! a full queue drops the item with a warning instead of blocking the
//! transport.
//!
//! ```text
//! ┌──────────────┐ InboundEvent ┌──────────────┐  ReadJob  ┌──────────────┐
//! │  MQTT event  │─────────────▶│ Sync worker  │──────────▶│ Read worker  │
//! │  callback    │              │ (dispatcher) │           │ (streaming)  │
//! └──────────────┘              └──────────────┘           └──────────────┘
//! ```

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::warn;

use super::transfer::ReadJob;

/// Something the transport observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Message { topic: String, payload: Vec<u8> },
    Disconnected,
}

/// Depth of the inbound queue.
pub const INBOUND_DEPTH: usize = 8;

/// Depth of the read-job queue.
pub const READ_DEPTH: usize = 4;

pub type InboundChannel = Channel<CriticalSectionRawMutex, InboundEvent, INBOUND_DEPTH>;
pub type ReadJobChannel = Channel<CriticalSectionRawMutex, ReadJob, READ_DEPTH>;

/// Transport callback → sync worker.
pub static INBOUND: InboundChannel = Channel::new();

/// Dispatcher → read worker.
pub static READ_JOBS: ReadJobChannel = Channel::new();

/// Queue an inbound event without blocking. Returns `false` if dropped.
pub fn push_inbound(channel: &InboundChannel, event: InboundEvent) -> bool {
    match channel.try_send(event) {
        Ok(()) => true,
        Err(_) => {
            warn!("chan: inbound queue full, dropping event");
            false
        }
    }
}
