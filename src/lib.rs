//! Cloud-sync firmware library.
//!
//! Exposes the protocol core and its adapters for integration testing.
//! All ESP-IDF-specific code is guarded by `#[cfg(target_os = "espidf")]`
//! within each module, with simulation backends on the host.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod error;
pub mod sync;

pub mod adapters;
pub mod drivers;
