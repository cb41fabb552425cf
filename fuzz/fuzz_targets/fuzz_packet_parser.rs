//! Fuzz target: inbound request parsing + chunk reassembly
//!
//! Feeds arbitrary bytes through the same path a `file`/`exec` message
//! takes: JSON request parse, framing validation, then the reassembler.
//! Must never panic, and anything accepted must match its declared length.
//!
//! cargo fuzz run fuzz_packet_parser

#![no_main]

use cloudsync::sync::packet::{self, ChunkFields, FileRequest};
use cloudsync::sync::reassembler::Reassembler;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = packet::sniff_ids(data);

    let mut reasm = Reassembler::new(8192);
    if let Ok(fields) = packet::parse::<ChunkFields>(data) {
        if let Ok(chunk) = fields.into_chunk() {
            if let Ok(accepted) = reasm.accept(&chunk) {
                assert_eq!(accepted.data.len(), chunk.declared_len);
                assert!(accepted.data.len() <= 8192);
            }
        }
    }

    if let Ok(mut req) = packet::parse::<FileRequest>(data) {
        let _ = req.path();
        let _ = req.take_chunk_fields().into_chunk();
    }
});
