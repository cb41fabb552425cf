//! Board helpers.

pub mod task_pin;
