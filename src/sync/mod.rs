//! Cloud-sync protocol core.
//!
//! Everything between "an MQTT message arrived" and "an ack was
//! published": framing, chunk reassembly, the file manifest, credential
//! derivation, the session state machine and outbound transfers. Nothing
//! here touches ESP-IDF directly; all I/O goes through the port traits in
//! [`crate::app::ports`].
//!
//! ```text
//!  inbound ──▶ worker ──▶ dispatcher ─┬─▶ exec      (reassembler → REPL)
//!                                     ├─▶ files     (reassembler → volume)
//!                                     ├─▶ manifest  (lock → load → mutate → persist)
//!                                     └─▶ transfer  (read job → read worker)
//! ```

pub mod auth;
pub mod channels;
pub mod codec;
pub mod dispatcher;
pub mod exec;
pub mod files;
pub mod manifest;
pub mod ota;
pub mod packet;
pub mod reassembler;
pub mod session;
pub mod topics;
pub mod transfer;
pub mod worker;
