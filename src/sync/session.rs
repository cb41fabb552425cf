//! Session context: connection status, device identity, pairing state.
//!
//! One [`SessionContext`] is owned by the worker behind
//! [`SharedSession`]; handlers mutate it under the lock and outside
//! readers take a [`SessionSnapshot`].
//!
//! ```text
//!  Standby ──▶ Connecting ──▶ Connected ──▶ Disconnected ──▶ Standby
//!                  │
//!                  ├──▶ TimeSyncError ──▶ Standby
//!                  └──▶ ConnectError  ──▶ Standby
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{info, warn};

use crate::adapters::device_id::MacAddress;
use crate::app::events::SyncEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Standby,
    Connecting,
    Connected,
    Disconnected,
    TimeSyncError,
    ConnectError,
}

impl SessionStatus {
    pub fn can_transition_to(self, to: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, to),
            (Standby, Connecting)
                | (Connecting, Connected | TimeSyncError | ConnectError)
                | (Connected, Disconnected)
                | (Disconnected | TimeSyncError | ConnectError, Standby)
        )
    }
}

/// Identity announced by the cloud in the ping handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub mac: MacAddress,
    pub category: i64,
    pub account_id: String,
    pub name: String,
    pub avatar: String,
    pub token: String,
}

/// Latest pairing code and alias.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairingState {
    pub pair_code: String,
    pub alias_name: String,
}

impl PairingState {
    /// Overwrite with new values. Returns `false` when both are unchanged.
    pub fn update(&mut self, pair_code: &str, alias_name: &str) -> bool {
        if self.pair_code == pair_code && self.alias_name == alias_name {
            return false;
        }
        pair_code.clone_into(&mut self.pair_code);
        alias_name.clone_into(&mut self.alias_name);
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub identity: Option<DeviceIdentity>,
    pub pairing: PairingState,
}

pub struct SessionContext {
    status: SessionStatus,
    identity: Option<DeviceIdentity>,
    pairing: PairingState,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    pub fn new() -> Self {
        Self {
            status: SessionStatus::Standby,
            identity: None,
            pairing: PairingState::default(),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.identity.as_ref()
    }

    /// Move to `to` if the transition is legal. Illegal transitions leave
    /// the status unchanged.
    pub fn transition(&mut self, to: SessionStatus) -> Option<SyncEvent> {
        let from = self.status;
        if !from.can_transition_to(to) {
            warn!("session: rejected transition {:?} -> {:?}", from, to);
            return None;
        }
        self.status = to;
        info!("session: {:?} -> {:?}", from, to);
        Some(SyncEvent::StatusChanged { from, to })
    }

    /// Record the identity from the first handshake. Later handshakes are
    /// ignored; returns whether this one was adopted.
    pub fn adopt_identity(&mut self, identity: DeviceIdentity) -> bool {
        if self.identity.is_some() {
            return false;
        }
        info!("session: identity adopted (account {})", identity.account_id);
        self.identity = Some(identity);
        true
    }

    pub fn update_pairing(&mut self, pair_code: &str, alias_name: &str) -> bool {
        let changed = self.pairing.update(pair_code, alias_name);
        if changed {
            info!("session: pair code {pair_code} ({alias_name})");
        }
        changed
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            identity: self.identity.clone(),
            pairing: self.pairing.clone(),
        }
    }
}

/// Handle shared between the worker and status readers.
pub type SharedSession = Arc<Mutex<SessionContext>>;

pub fn shared() -> SharedSession {
    Arc::new(Mutex::new(SessionContext::new()))
}

/// Lock the session, recovering the data from a poisoned lock.
pub fn lock(session: &SharedSession) -> MutexGuard<'_, SessionContext> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}
