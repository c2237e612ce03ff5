//! Fuzz target for TLV decoding
//!
//! Decoded trees must re-encode to bytes that decode to the same tree.

#![no_main]

use hearth_core::tlv::{decode, encode};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(element) = decode(data) {
        let reencoded = encode(&element);
        let again = decode(&reencoded).expect("re-encoded element must decode");
        // NaN floats compare unequal, so compare the canonical bytes instead
        assert_eq!(encode(&again), reencoded);
    }
});
