//! Board services: free heap, blocking delay, chip restart.
//!
//! On ESP-IDF the heap figure comes from `esp_get_free_heap_size()` and a
//! restart goes through `esp_ota::restart()` so the freshly flagged boot
//! mode is picked up. The simulation backend sleeps for real and counts
//! restart requests instead of resetting.

use log::warn;

use crate::app::ports::SystemPort;

pub struct EspSystem {
    #[cfg(not(target_os = "espidf"))]
    restarts: u32,
}

impl Default for EspSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl EspSystem {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            restarts: 0,
        }
    }

    /// Restart requests seen so far (simulation only).
    #[cfg(not(target_os = "espidf"))]
    pub fn restarts(&self) -> u32 {
        self.restarts
    }
}

impl SystemPort for EspSystem {
    #[cfg(target_os = "espidf")]
    fn free_heap(&self) -> u32 {
        unsafe { esp_idf_svc::sys::esp_get_free_heap_size() }
    }

    #[cfg(not(target_os = "espidf"))]
    fn free_heap(&self) -> u32 {
        256 * 1024
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(core::time::Duration::from_millis(u64::from(ms)));
    }

    #[cfg(target_os = "espidf")]
    fn restart(&mut self) {
        warn!("system: restarting");
        esp_ota::restart();
    }

    #[cfg(not(target_os = "espidf"))]
    fn restart(&mut self) {
        warn!("system: restart requested (simulation)");
        self.restarts += 1;
    }
}
