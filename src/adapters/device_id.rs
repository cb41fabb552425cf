//! Device identity derived from the ESP32 factory MAC address.
//!
//! Everything the cloud sees is a function of the 6-byte eFuse MAC:
//! - MQTT client id `dev-xxxxxxxxxxxx` (16 chars, also the username)
//! - the `{mac}` topic segment (12 lowercase hex digits)
//! - the network hostname `cloudsync-xxyyzz`

use core::fmt::Write;

/// Fixed-size MQTT client id: "dev-" + 12 hex digits.
pub type ClientIdString = heapless::String<16>;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

/// The 12-digit lowercase hex form used in topic names.
pub fn topic_mac(mac: &MacAddress) -> heapless::String<12> {
    let mut s = heapless::String::<12>::new();
    for b in mac {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// MQTT client id. Exactly [`CLIENT_ID_LEN`](crate::sync::auth::CLIENT_ID_LEN) bytes.
pub fn client_id(mac: &MacAddress) -> ClientIdString {
    let mut id = ClientIdString::new();
    let _ = write!(id, "dev-{}", topic_mac(mac));
    id
}

/// Network hostname from the last 3 MAC bytes: `cloudsync-xxyyzz`.
pub fn hostname(mac: &MacAddress) -> heapless::String<24> {
    let mut name = heapless::String::<24>::new();
    let _ = write!(name, "cloudsync-{:02x}{:02x}{:02x}", mac[3], mac[4], mac[5]);
    name
}
