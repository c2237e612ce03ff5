//! Fuzz target for packet and payload header parsing
//!
//! The parsers should never panic, only return Ok or Err.

#![no_main]

use hearth_core::StatusReport;
use hearth_core::codec::{decode_packet, decode_payload, encode_packet, encode_payload};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(packet) = decode_packet(data) else {
        return;
    };
    if let Ok(message) = decode_payload(&packet) {
        let bytes = encode_packet(&encode_payload(&message));
        let reparsed = decode_packet(&bytes).and_then(|p| decode_payload(&p));
        assert_eq!(reparsed.ok(), Some(message.clone()));
        let _ = StatusReport::decode(&message.payload);
    }
});
