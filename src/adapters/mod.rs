//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements           | Connects to                   |
//! |-------------|----------------------|-------------------------------|
//! | `device_id` |                      | eFuse MAC → client id, topics |
//! | `log_sink`  | EventSink            | Serial log output             |
//! | `mqtt`      | MqttPort, Publisher  | ESP-IDF MQTT client / sim     |
//! | `nvs`       | ConfigPort           | NVS / in-memory store         |
//! |             | StoragePort          |                               |
//! | `repl`      | ExecPort             | Interpreter keystroke queue   |
//! | `storage`   | FilePort             | Disk / RAM volumes, mounts    |
//! | `system`    | SystemPort           | Heap, delay, chip restart     |
//! | `time`      | ClockPort            | SNTP / system clock           |

pub mod device_id;
pub mod log_sink;
pub mod mqtt;
pub mod nvs;
pub mod repl;
pub mod storage;
pub mod system;
pub mod time;
