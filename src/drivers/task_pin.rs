//! Core-pinned thread spawning for the ESP32-S3.
//!
//! ESP-IDF implements `std::thread` with pthreads on top of FreeRTOS
//! tasks. `esp_pthread_set_cfg()` configures the *next* `pthread_create()`
//! from the calling thread, so the config→spawn pair must not be
//! interleaved with other thread creation on the same thread.
//!
//! The MQTT client and Wi-Fi live on core 0; the sync read worker runs on
//! core 1 so a long file stream does not starve the network stack.

/// CPU core identifiers for the dual-core Xtensa LX7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Core {
    /// Core 0 (PRO_CPU): Wi-Fi, lwIP, MQTT client.
    Pro = 0,
    /// Core 1 (APP_CPU): sync workers.
    App = 1,
}

/// Spawn a named thread with explicit core, priority and stack size.
///
/// `name` must be NUL-terminated (e.g. `"sync-read\0"`); ESP-IDF keeps the
/// raw pointer. Host builds ignore `core` and `priority`.
///
/// Thread creation failure at boot leaves the firmware without a worker,
/// so it panics.
pub fn spawn_on_core(
    core: Core,
    priority: u8,
    stack_kb: usize,
    name: &'static str,
    f: impl FnOnce() + Send + 'static,
) -> std::thread::JoinHandle<()> {
    let display_name = name.trim_end_matches('\0');

    #[cfg(target_os = "espidf")]
    unsafe {
        let mut cfg = esp_idf_sys::esp_create_default_pthread_config();
        cfg.pin_to_core = core as i32;
        cfg.prio = i32::from(priority);
        cfg.stack_size = (stack_kb * 1024) as i32;
        cfg.thread_name = name.as_ptr() as *const _;
        let ret = esp_idf_sys::esp_pthread_set_cfg(&cfg);
        if ret != esp_idf_sys::ESP_OK as i32 {
            log::warn!("task: pthread cfg for '{display_name}' rejected ({ret}), using defaults");
        }
    }

    log::info!(
        "task: spawning '{}' on {:?} (pri={}, stack={}KB)",
        display_name,
        core,
        priority,
        stack_kb
    );

    std::thread::Builder::new()
        .name(display_name.into())
        .stack_size(stack_kb * 1024)
        .spawn(f)
        .unwrap_or_else(|e| panic!("task: cannot spawn '{display_name}': {e}"))
}
