//! CloudSync firmware entry point.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                    Adapters (outer ring)                      │
//! │                                                               │
//! │  EspMqtt        NvsAdapter       MountTable     Esp32Clock    │
//! │  (MqttPort)     (Config+NVS)     (FilePort)     (ClockPort)   │
//! │  ReplBridge     LogEventSink     EspSystem                    │
//! │  (ExecPort)     (EventSink)      (SystemPort)                 │
//! │                                                               │
//! │  ──────────────── Port Trait Boundary ──────────────────      │
//! │                                                               │
//! │  ┌───────────────────────────────────────────────────────┐    │
//! │  │  SyncWorker ─▶ Dispatcher ─▶ exec / files / manifest  │    │
//! │  └───────────────────────────────────────────────────────┘    │
//! │                                                               │
//! │  ReadWorker (core 1) ◀── READ_JOBS     INBOUND ◀── mqtt-poll  │
//! └───────────────────────────────────────────────────────────────┘
//! ```

use core::time::Duration;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use log::{info, warn};

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};

use cloudsync::adapters::device_id;
use cloudsync::adapters::log_sink::LogEventSink;
use cloudsync::adapters::mqtt::EspMqtt;
use cloudsync::adapters::nvs::NvsAdapter;
use cloudsync::adapters::repl::{DEFAULT_CAPACITY, KeystrokeQueue, ReplBridge};
use cloudsync::adapters::storage::{DiskVolume, MountTable, RamVolume};
use cloudsync::adapters::system::EspSystem;
use cloudsync::adapters::time::Esp32Clock;
use cloudsync::app::ports::ConfigPort;
use cloudsync::config::SyncConfig;
use cloudsync::sync::channels::{INBOUND, READ_JOBS};
use cloudsync::sync::dispatcher::Dispatcher;
use cloudsync::sync::ota::{self, BootMode};
use cloudsync::sync::session;
use cloudsync::sync::topics::Route;
use cloudsync::sync::transfer::{ReadQueue, ReadWorker};
use cloudsync::sync::worker::{SyncWorker, WorkerPorts};

/// Station credentials baked in at build time.
const WIFI_SSID: &str = match option_env!("CLOUDSYNC_WIFI_SSID") {
    Some(s) => s,
    None => "",
};
const WIFI_PASS: &str = match option_env!("CLOUDSYNC_WIFI_PASS") {
    Some(s) => s,
    None => "",
};

const FLASH_MOUNT: &str = "/flash";
const RAM_MOUNT: &str = "/ram";

fn main() -> Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║   CloudSync Firmware v{}          ║", env!("CARGO_PKG_VERSION"));
    info!("║   ESP32-S3 · MQTT exec/file sync     ║");
    info!("╚══════════════════════════════════════╝");

    // ── Persistent settings ───────────────────────────────────
    let mut nvs = NvsAdapter::new().map_err(|e| anyhow!("nvs init: {e}"))?;
    let boot_mode = ota::take_boot_mode(&mut nvs);
    ota::check_rollback();
    if boot_mode == BootMode::Network {
        info!("system: booted after a network update request");
    }

    let config = match nvs.load() {
        Ok(c) => c,
        Err(e) => {
            warn!("nvs: config unavailable ({e}), using defaults");
            SyncConfig::default()
        }
    };

    // ── Identity ──────────────────────────────────────────────
    let mac = device_id::read_mac();
    info!(
        "system: {} ({})",
        device_id::hostname(&mac),
        device_id::client_id(&mac)
    );

    // ── Network ───────────────────────────────────────────────
    let _wifi = bring_up_wifi()?;

    // ── Volumes ───────────────────────────────────────────────
    mount_flash()?;
    let fs = Arc::new(
        MountTable::new()
            .mount(FLASH_MOUNT, DiskVolume::new(FLASH_MOUNT))
            .mount(RAM_MOUNT, RamVolume::new()),
    );

    // ── Transport + workers ───────────────────────────────────
    let mqtt = Arc::new(EspMqtt::new(&INBOUND));
    let session = session::shared();
    let dispatcher = Dispatcher::new(mac, &config, Arc::clone(&fs), session);

    let _reader = ReadWorker::new(
        fs,
        Arc::clone(&mqtt),
        dispatcher.topics().up(Route::File),
        config.read_chunk_bytes as usize,
        Duration::from_millis(u64::from(config.publish_gap_ms)),
    )
    .spawn(&READ_JOBS);

    // The interpreter task drains this queue as console input.
    let keystrokes = KeystrokeQueue::new(DEFAULT_CAPACITY);
    let mut repl = ReplBridge::new(keystrokes);
    let reads = ReadQueue::new(&READ_JOBS);
    let mut sink = LogEventSink::new();

    let ports = WorkerPorts {
        settings: &mut nvs,
        exec: &mut repl,
        reads: &reads,
        events: &mut sink,
    };
    let mut worker = SyncWorker::new(
        config,
        mac,
        mqtt,
        Esp32Clock::new(),
        EspSystem::new(),
        dispatcher,
        ports,
    );

    worker.run(&INBOUND)
}

/// Join the configured access point and wait for an IP address.
fn bring_up_wifi() -> Result<BlockingWifi<EspWifi<'static>>> {
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;

    let mut wifi = BlockingWifi::wrap(EspWifi::new(peripherals.modem, sysloop.clone(), None)?, sysloop)?;
    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: WIFI_SSID.try_into().map_err(|_| anyhow!("wifi: ssid too long"))?,
        password: WIFI_PASS.try_into().map_err(|_| anyhow!("wifi: password too long"))?,
        auth_method: if WIFI_PASS.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        },
        ..Default::default()
    }))?;

    wifi.start()?;
    wifi.connect()?;
    wifi.wait_netif_up()?;
    info!("wifi: connected to '{WIFI_SSID}'");
    Ok(wifi)
}

/// Mount the wear-levelled FAT partition `storage` at `/flash`.
fn mount_flash() -> Result<()> {
    use esp_idf_svc::sys::{
        WL_INVALID_HANDLE, esp, esp_vfs_fat_mount_config_t, esp_vfs_fat_spiflash_mount_rw_wl,
        wl_handle_t,
    };

    let conf = esp_vfs_fat_mount_config_t {
        format_if_mount_failed: true,
        max_files: 4,
        allocation_unit_size: 4096,
        ..Default::default()
    };
    let mut handle: wl_handle_t = WL_INVALID_HANDLE as wl_handle_t;
    // SAFETY: called once at boot; both strings are NUL-terminated literals.
    esp!(unsafe {
        esp_vfs_fat_spiflash_mount_rw_wl(c"/flash".as_ptr(), c"storage".as_ptr(), &conf, &mut handle)
    })?;
    info!("storage: FAT mounted at {FLASH_MOUNT}");
    Ok(())
}
