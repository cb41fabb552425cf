//! Application boundary: port traits and outbound domain events.
//!
//! The sync core in [`crate::sync`] talks to the outside world only
//! through the **port traits** defined in [`ports`], keeping protocol
//! logic fully testable without a broker, a flash volume or a REPL.

pub mod events;
pub mod ports;
