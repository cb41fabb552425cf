//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements both [`ConfigPort`] and [`StoragePort`] for the sync firmware.
//!
//! - Config is a `postcard` blob under `sync/config`, range-checked before
//!   every save.
//! - Sync settings (`sync/boot_mode`, `sync/server_addr`) are plain blobs
//!   read and written through [`StoragePort`].
//! - ESP-IDF NVS commits are atomic per `nvs_commit()`; the simulation
//!   backend is an in-memory map.

use crate::app::ports::{ConfigError, ConfigPort, StorageError, StoragePort};
use crate::config::SyncConfig;
use crate::sync::ota::SETTINGS_NAMESPACE;
use log::info;

#[cfg(target_os = "espidf")]
use log::warn;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_KEY: &str = "config";

/// NVS keys and namespaces are limited to 15 bytes plus NUL.
#[cfg(target_os = "espidf")]
const NVS_NAME_MAX: usize = 15;

#[cfg(target_os = "espidf")]
const MAX_BLOB_SIZE: usize = 4000;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsAdapter {
    /// Create a new NvsAdapter and initialise NVS flash.
    ///
    /// Returns `Err(ConfigError::IoError)` if flash initialisation fails
    /// unrecoverably. On first boot or after a version mismatch the NVS
    /// partition is erased and re-initialised automatically.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called once from the main task before any other NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("nvs: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK || unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(ConfigError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(ConfigError::IoError);
            }
            info!("nvs: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("nvs: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    /// NUL-terminated copy of an NVS name, truncated to the NVS limit.
    #[cfg(target_os = "espidf")]
    fn c_name(name: &str) -> [u8; NVS_NAME_MAX + 1] {
        let mut buf = [0u8; NVS_NAME_MAX + 1];
        let len = name.len().min(NVS_NAME_MAX);
        buf[..len].copy_from_slice(&name.as_bytes()[..len]);
        buf
    }

    /// Open an NVS namespace, execute a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let ns = Self::c_name(namespace);
        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    #[cfg(target_os = "espidf")]
    fn commit(handle: nvs_handle_t) -> Result<(), i32> {
        match unsafe { nvs_commit(handle) } {
            ESP_OK => Ok(()),
            e => Err(e),
        }
    }

    /// Read a whole blob whose size is not known in advance.
    #[cfg(target_os = "espidf")]
    fn read_blob(namespace: &str, key: &str) -> Result<Vec<u8>, i32> {
        Self::with_nvs_handle(namespace, false, |handle| {
            let key = Self::c_name(key);
            let mut size: usize = 0;
            let ret = unsafe {
                nvs_get_blob(handle, key.as_ptr() as *const _, core::ptr::null_mut(), &mut size)
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            if size == 0 || size > MAX_BLOB_SIZE {
                return Err(ESP_ERR_NVS_INVALID_LENGTH);
            }

            let mut buf = vec![0u8; size];
            let ret = unsafe {
                nvs_get_blob(handle, key.as_ptr() as *const _, buf.as_mut_ptr() as *mut _, &mut size)
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(buf)
        })
    }
}

fn validate_config(cfg: &SyncConfig) -> Result<(), ConfigError> {
    if cfg.broker_host.is_empty() || cfg.broker_host.len() > 128 {
        return Err(ConfigError::ValidationFailed("broker_host must be 1–128 bytes"));
    }
    if cfg.broker_port == 0 {
        return Err(ConfigError::ValidationFailed("broker_port must be non-zero"));
    }
    if !(1..=3600).contains(&cfg.ping_interval_secs) {
        return Err(ConfigError::ValidationFailed("ping_interval_secs must be 1–3600"));
    }
    if cfg.time_sync_retries == 0 {
        return Err(ConfigError::ValidationFailed("time_sync_retries must be at least 1"));
    }
    if !(100..=60_000).contains(&cfg.time_sync_wait_ms) {
        return Err(ConfigError::ValidationFailed("time_sync_wait_ms must be 100–60000"));
    }
    if !(100..=600_000).contains(&cfg.reconnect_backoff_ms) {
        return Err(ConfigError::ValidationFailed(
            "reconnect_backoff_ms must be 100–600000",
        ));
    }
    if !(64..=16_384).contains(&cfg.read_chunk_bytes) {
        return Err(ConfigError::ValidationFailed("read_chunk_bytes must be 64–16384"));
    }
    if cfg.publish_gap_ms > 1000 {
        return Err(ConfigError::ValidationFailed("publish_gap_ms must be 0–1000"));
    }
    if !(256..=65_536).contains(&cfg.max_packet_bytes) {
        return Err(ConfigError::ValidationFailed("max_packet_bytes must be 256–65536"));
    }
    if !cfg.manifest_path.starts_with('/') {
        return Err(ConfigError::ValidationFailed("manifest_path must be absolute"));
    }
    if cfg.ota_filename.is_empty() || cfg.ota_filename.contains('/') {
        return Err(ConfigError::ValidationFailed(
            "ota_filename must be a bare, non-empty file name",
        ));
    }
    Ok(())
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<SyncConfig, ConfigError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let key = Self::composite_key(SETTINGS_NAMESPACE, CONFIG_KEY);
            if let Some(bytes) = self.store.borrow().get(&key) {
                let cfg: SyncConfig =
                    postcard::from_bytes(bytes).map_err(|_| ConfigError::Corrupted)?;
                info!("nvs: loaded config from store");
                Ok(cfg)
            } else {
                info!("nvs: no stored config, using defaults");
                Ok(SyncConfig::default())
            }
        }

        #[cfg(target_os = "espidf")]
        {
            match Self::read_blob(SETTINGS_NAMESPACE, CONFIG_KEY) {
                Ok(bytes) => {
                    let cfg: SyncConfig =
                        postcard::from_bytes(&bytes).map_err(|_| ConfigError::Corrupted)?;
                    info!("nvs: loaded config ({} bytes)", bytes.len());
                    Ok(cfg)
                }
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => {
                    info!("nvs: no stored config, using defaults");
                    Ok(SyncConfig::default())
                }
                Err(e) => {
                    warn!("nvs: config read error {}, using defaults", e);
                    Ok(SyncConfig::default())
                }
            }
        }
    }

    fn save(&self, config: &SyncConfig) -> Result<(), ConfigError> {
        validate_config(config)?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;

        #[cfg(not(target_os = "espidf"))]
        {
            let key = Self::composite_key(SETTINGS_NAMESPACE, CONFIG_KEY);
            self.store.borrow_mut().insert(key, bytes);
            info!("nvs: config saved (simulation)");
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(SETTINGS_NAMESPACE, true, |handle| {
                let key = Self::c_name(CONFIG_KEY);
                let ret = unsafe {
                    nvs_set_blob(handle, key.as_ptr() as *const _, bytes.as_ptr() as *const _, bytes.len())
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Self::commit(handle)
            });
            match result {
                Ok(()) => {
                    info!("nvs: config saved ({} bytes)", bytes.len());
                    Ok(())
                }
                Err(e) => {
                    warn!("nvs: config write error {}", e);
                    Err(ConfigError::IoError)
                }
            }
        }
    }
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            match self.store.borrow().get(&composite) {
                Some(data) => {
                    let len = data.len().min(buf.len());
                    buf[..len].copy_from_slice(&data[..len]);
                    Ok(len)
                }
                None => Err(StorageError::NotFound),
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let key = Self::c_name(key);
                let mut size = buf.len();
                let ret = unsafe {
                    nvs_get_blob(handle, key.as_ptr() as *const _, buf.as_mut_ptr() as *mut _, &mut size)
                };
                match ret {
                    ESP_OK => Ok(size),
                    e => Err(e),
                }
            });
            match result {
                Ok(size) => Ok(size),
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(StorageError::NotFound),
                Err(_) => Err(StorageError::IoError),
            }
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow_mut().insert(composite, data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let key = Self::c_name(key);
                let ret = unsafe {
                    nvs_set_blob(handle, key.as_ptr() as *const _, data.as_ptr() as *const _, data.len())
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Self::commit(handle)
            });
            result.map_err(|e| match e {
                ESP_ERR_NVS_NOT_ENOUGH_SPACE => StorageError::Full,
                _ => StorageError::IoError,
            })
        }
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow_mut().remove(&composite);
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let key = Self::c_name(key);
                let ret = unsafe { nvs_erase_key(handle, key.as_ptr() as *const _) };
                if ret != ESP_OK && ret != ESP_ERR_NVS_NOT_FOUND {
                    return Err(ret);
                }
                Self::commit(handle)
            });
            result.map_err(|_| StorageError::IoError)
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow().contains_key(&composite)
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let key = Self::c_name(key);
                let ret = unsafe { nvs_find_key(handle, key.as_ptr() as *const _, core::ptr::null_mut()) };
                Ok(ret == ESP_OK)
            });
            result.unwrap_or(false)
        }
    }
}
