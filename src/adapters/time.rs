//! Wall-clock adapter.
//!
//! Implements [`ClockPort`] for the sync worker. The credential window and
//! the broker's TLS checks both need real time, so nothing connects before
//! [`ClockPort::sync_time`] succeeds.
//!
//! - **`target_os = "espidf"`**: starts the ESP-IDF SNTP client on the
//!   first attempt and polls its sync status.
//! - **`not(target_os = "espidf")`**: trusts the host clock.
//!
//! Either way, a clock earlier than 2020-01-01 counts as unsynchronised.

use log::{debug, info};

use crate::app::ports::ClockPort;

/// 2020-01-01T00:00:00Z. Anything earlier is a clock that was never set.
const EPOCH_2020: u64 = 1_577_836_800;

pub struct Esp32Clock {
    #[cfg(target_os = "espidf")]
    sntp: Option<esp_idf_svc::sntp::EspSntp<'static>>,
    synced: bool,
}

impl Default for Esp32Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Esp32Clock {
    pub fn new() -> Self {
        Self {
            #[cfg(target_os = "espidf")]
            sntp: None,
            synced: false,
        }
    }

    /// Seconds since the epoch as reported by the system clock.
    fn system_seconds() -> Option<u64> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .ok()?
            .as_secs();
        (now >= EPOCH_2020).then_some(now)
    }

    #[cfg(target_os = "espidf")]
    fn poll_sntp(&mut self) -> bool {
        use esp_idf_svc::sntp::{EspSntp, SyncStatus};

        if self.sntp.is_none() {
            match EspSntp::new_default() {
                Ok(sntp) => {
                    info!("clock: SNTP started");
                    self.sntp = Some(sntp);
                }
                Err(e) => {
                    log::warn!("clock: SNTP start failed: {e}");
                    return false;
                }
            }
        }
        self.sntp
            .as_ref()
            .is_some_and(|s| s.get_sync_status() == SyncStatus::Completed)
    }

    #[cfg(not(target_os = "espidf"))]
    fn poll_sntp(&mut self) -> bool {
        true
    }
}

impl ClockPort for Esp32Clock {
    fn sync_time(&mut self) -> bool {
        if !self.synced {
            self.synced = self.poll_sntp() && Self::system_seconds().is_some();
            if self.synced {
                info!("clock: wall clock synchronised");
            } else {
                debug!("clock: not yet synchronised");
            }
        }
        self.synced
    }

    fn unix_time(&self) -> Option<u64> {
        if !self.synced {
            return None;
        }
        Self::system_seconds()
    }
}
