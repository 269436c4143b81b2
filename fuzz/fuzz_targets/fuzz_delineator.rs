//! Fuzz target for MUX-PDU delineation.
//!
//! The delineator must survive arbitrary garbage: corrupt Golay headers,
//! flags embedded in payloads, truncated PDUs, and streams with no flags at
//! all. It must never panic and every emitted PDU must be flag-terminated.

#![no_main]

use h223_core::mux::{Delineator, CLOSING_FLAG, CLOSING_FLAG_COMPLEMENT};
use h223_core::H223Level;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    // First byte selects the level and chunking pattern.
    let level = if data[0] & 1 == 0 {
        H223Level::Level1
    } else {
        H223Level::Level2
    };
    let chunk = usize::from(data[0] >> 1).max(1);

    let mut delineator = Delineator::new(level);
    for piece in data[1..].chunks(chunk) {
        for pdu in delineator.push(piece) {
            assert!(pdu.bytes.len() >= 2);
            let tail = u16::from_be_bytes([
                pdu.bytes[pdu.bytes.len() - 2],
                pdu.bytes[pdu.bytes.len() - 1],
            ]);
            assert!(tail == CLOSING_FLAG || tail == CLOSING_FLAG_COMPLEMENT);
        }
        let _ = delineator.needed();
    }
});
