//! Fuzz target: tolerant base64 decoder
//!
//! Arbitrary input must decode or fail cleanly, never exceed the length
//! bound, and re-encoding a successful decode must round-trip.
//!
//! cargo fuzz run fuzz_base64_decode

#![no_main]

use cloudsync::sync::codec;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(decoded) = codec::decode(data) {
        assert!(decoded.len() <= codec::decoded_len_bound(data.len()));
        let again = codec::decode(codec::encode(&decoded).as_bytes());
        assert_eq!(again.as_deref(), Ok(decoded.as_slice()));
    }
    let _ = codec::decode_url_safe(data);
});
