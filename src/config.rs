//! Sync configuration parameters
//!
//! All tunable parameters for the cloud-sync worker.
//! Values can be overridden via NVS (non-volatile storage).

use serde::{Deserialize, Serialize};

/// Core sync configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    // --- Broker ---
    /// MQTT broker host (overridable via the `sync/server_addr` NVS key)
    pub broker_host: String,
    /// MQTT broker TLS port
    pub broker_port: u16,

    // --- Session ---
    /// Liveness report interval while connected (seconds)
    pub ping_interval_secs: u32,
    /// SNTP attempts before giving up and falling back to Standby
    pub time_sync_retries: u8,
    /// Wait between SNTP attempts (milliseconds)
    pub time_sync_wait_ms: u32,
    /// Fixed backoff before the next connect attempt (milliseconds)
    pub reconnect_backoff_ms: u32,

    // --- Transfers ---
    /// Raw bytes per outbound file-read packet (before base64)
    pub read_chunk_bytes: u32,
    /// Pause between consecutive outbound packets (milliseconds)
    pub publish_gap_ms: u32,
    /// Upper bound on a single inbound packet's decoded payload (bytes)
    pub max_packet_bytes: u32,

    // --- Storage ---
    /// Device path of the persisted file manifest
    pub manifest_path: String,
    /// Filename whose completed write triggers the network-boot restart
    pub ota_filename: String,

    // --- Identity ---
    /// Board name reported in liveness pings
    pub board_name: String,
    /// Numeric board type reported in liveness pings
    pub board_type: u8,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            // Broker
            broker_host: "mqtt.cloudsync.local".into(),
            broker_port: 8883,

            // Session
            ping_interval_secs: 10,
            time_sync_retries: 10,
            time_sync_wait_ms: 2000,
            reconnect_backoff_ms: 5000,

            // Transfers
            read_chunk_bytes: 2048,
            publish_gap_ms: 20,
            max_packet_bytes: 8192,

            // Storage
            manifest_path: "/flash/.sync_manifest.json".into(),
            ota_filename: "ota_update.bin".into(),

            // Identity
            board_name: "cloudsync-s3".into(),
            board_type: 1,
        }
    }
}

impl SyncConfig {
    /// Broker URL for the transport, honouring an optional host override.
    pub fn broker_url(&self, host_override: Option<&str>) -> String {
        let host = host_override.unwrap_or(&self.broker_host);
        format!("mqtts://{}:{}", host, self.broker_port)
    }
}

// ---------------------------------------------------------------------------
// Compiled-in credential secret
// ---------------------------------------------------------------------------

/// AES-256 key + CBC IV shared with the cloud for password derivation.
#[derive(Clone)]
pub struct CredentialSecret {
    pub key: [u8; 32],
    pub iv: [u8; 16],
}

impl CredentialSecret {
    /// The secret baked into this firmware build.
    pub const fn builtin() -> Self {
        Self {
            key: *b"cloudsync-device-key-0123456789!",
            iv: *b"cloudsync-iv-016",
        }
    }
}

impl core::fmt::Debug for CredentialSecret {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("CredentialSecret(..)")
    }
}
