//! Fuzz target for the whole dissection pipeline.
//!
//! Arbitrary bytes through a level 2 session with a multi-VC table: header
//! correction, table walks, AL2 decoding and reassembly all run. Errors are
//! fine; panics are not.

#![no_main]

use h223_core::prelude::*;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut session = H223Session::with_defaults();
    let call = session
        .open_call(CallKey::Tunnel { circuit_id: 0 }, H223Level::Level2)
        .expect("level 2 is supported");

    session
        .on_multiplex_table_update(
            call,
            Direction::Forward,
            1,
            MuxTableEntry::Group {
                repeat_count: 0,
                children: vec![
                    MuxTableEntry::Leaf {
                        vc: 1,
                        repeat_count: 2,
                    },
                    MuxTableEntry::Leaf {
                        vc: 2,
                        repeat_count: 1,
                    },
                ],
            },
            0,
        )
        .expect("first update is in order");
    session
        .on_logical_channel_open(
            call,
            1,
            Direction::Forward,
            LogicalChannelParams {
                al_type: AlType::Al2WithSeq,
                segmentable: true,
                subdissector: None,
            },
            0,
        )
        .expect("first open is in order");

    let mut frame = 1u64;
    for chunk in data.chunks(17) {
        let out = session
            .dissect(call, Direction::Forward, frame, chunk)
            .expect("monotonic frames never error");
        for delivery in &out.deliveries {
            let _ = delivery.payload.len();
        }
        frame += 1;
    }
});
