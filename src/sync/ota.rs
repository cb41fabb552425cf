//! OTA trigger and boot-mode persistence, backed by `esp-ota` on device.
//!
//! Flow: file write to `…/<ota_filename>` completes → `boot_mode = Network`
//! persisted in NVS → ack published → restart. On the next boot the binary
//! takes (reads and clears) the flag and marks the running image valid.
//!
//! The trigger is a suffix match on the destination path, so any upload
//! whose name ends in the OTA filename restarts the device, whatever its
//! directory.

use core::fmt;
use log::{info, warn};

use crate::app::ports::{StorageError, StoragePort};

/// NVS namespace for sync settings.
pub const SETTINGS_NAMESPACE: &str = "sync";
const BOOT_MODE_KEY: &str = "boot_mode";
const SERVER_ADDR_KEY: &str = "server_addr";

/// Longest broker host accepted from NVS.
const MAX_SERVER_ADDR: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BootMode {
    Normal = 0,
    /// Re-provision from the network on next boot.
    Network = 1,
}

impl fmt::Display for BootMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Network => write!(f, "network"),
        }
    }
}

/// Whether a completed write to `path` must restart the device.
pub fn is_ota_trigger(path: &str, ota_filename: &str) -> bool {
    !ota_filename.is_empty() && path.ends_with(ota_filename)
}

/// Persist `boot_mode = Network`.
pub fn request_network_boot(settings: &mut dyn StoragePort) -> Result<(), StorageError> {
    settings
        .write(SETTINGS_NAMESPACE, BOOT_MODE_KEY, &[BootMode::Network as u8])
        .inspect(|_| info!("ota: network boot requested"))
        .inspect_err(|e| warn!("ota: boot flag write failed: {e}"))
}

/// Stored boot mode; anything unreadable counts as `Normal`.
pub fn boot_mode(settings: &dyn StoragePort) -> BootMode {
    let mut buf = [0u8; 1];
    match settings.read(SETTINGS_NAMESPACE, BOOT_MODE_KEY, &mut buf) {
        Ok(1) if buf[0] == BootMode::Network as u8 => BootMode::Network,
        _ => BootMode::Normal,
    }
}

/// Read the boot mode and reset it to `Normal` so it applies to one boot.
pub fn take_boot_mode(settings: &mut dyn StoragePort) -> BootMode {
    let mode = boot_mode(settings);
    if mode != BootMode::Normal {
        if let Err(e) = settings.write(SETTINGS_NAMESPACE, BOOT_MODE_KEY, &[BootMode::Normal as u8]) {
            warn!("ota: could not clear boot flag: {e}");
        }
    }
    info!("ota: boot mode {mode}");
    mode
}

/// Broker host override, if one is stored.
pub fn server_override(settings: &dyn StoragePort) -> Option<String> {
    let mut buf = [0u8; MAX_SERVER_ADDR];
    let len = settings.read(SETTINGS_NAMESPACE, SERVER_ADDR_KEY, &mut buf).ok()?;
    let host = core::str::from_utf8(&buf[..len]).ok()?.trim();
    (!host.is_empty()).then(|| host.to_owned())
}

/// Store or clear the broker host override.
pub fn set_server_override(
    settings: &mut dyn StoragePort,
    host: Option<&str>,
) -> Result<(), StorageError> {
    match host {
        Some(h) if h.len() <= MAX_SERVER_ADDR => {
            settings.write(SETTINGS_NAMESPACE, SERVER_ADDR_KEY, h.as_bytes())
        }
        Some(_) => Err(StorageError::Full),
        None => settings.delete(SETTINGS_NAMESPACE, SERVER_ADDR_KEY),
    }
}

// ── Boot validation ───────────────────────────────────────────

/// Mark the running firmware valid so the bootloader does not roll back.
#[cfg(target_os = "espidf")]
pub fn check_rollback() {
    match esp_ota::mark_app_valid() {
        Ok(()) => info!("ota: running image marked valid"),
        Err(e) => warn!("ota: mark_app_valid failed: {:?}", e),
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn check_rollback() {
    info!("ota: rollback check skipped (simulation)");
}

// ── Tests ─────────────────────────────────────────────────────
