//! Integration test driver for the `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises one slice of the sync
//! core against mock ports and the host simulation adapters. All tests
//! run on the host with no broker, network or flash required.

#![cfg(not(target_os = "espidf"))]

mod dispatcher_tests;
mod manifest_tests;
mod transfer_tests;

// Links the host embassy-time driver required by `async_io_mini::Timer`.
use embassy_time as _;
