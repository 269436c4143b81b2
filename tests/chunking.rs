//! Chunk-invariance properties: dissection output must not depend on how the
//! transport sliced the byte stream.

use h223_core::mux::{encode_level2_header, Delineator, CLOSING_FLAG, CLOSING_FLAG_COMPLEMENT};
use h223_core::prelude::*;
use h223_core::{AlReassembler, FragmentKey, SubCircuitId};
use proptest::prelude::*;
use smallvec::SmallVec;

/// Payload bytes that cannot alias the closing flag, so the generated PDU
/// boundaries are unambiguous.
fn flagless_payload() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(0u8..0x80, 0..40)
}

fn pdu_stream() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec((flagless_payload(), any::<bool>()), 1..8).prop_map(|pdus| {
        let mut stream = Vec::new();
        for (payload, eos) in pdus {
            stream.extend_from_slice(&encode_level2_header(0, payload.len() as u8));
            stream.extend_from_slice(&payload);
            let flag = if eos {
                CLOSING_FLAG_COMPLEMENT
            } else {
                CLOSING_FLAG
            };
            stream.extend_from_slice(&flag.to_be_bytes());
        }
        stream
    })
}

fn chunked(stream: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
    let mut chunks = Vec::new();
    let mut prev = 0;
    for &cut in cuts {
        chunks.push(stream[prev..cut].to_vec());
        prev = cut;
    }
    chunks.push(stream[prev..].to_vec());
    chunks
}

proptest! {
    // Delineation is a pure function of the stream, not of chunk boundaries.
    #[test]
    fn prop_delineation_chunk_invariant(stream in pdu_stream(), cut_fracs in prop::collection::vec(0.0f64..1.0, 0..6)) {
        let cuts: Vec<usize> = cut_fracs
            .iter()
            .map(|f| (f * stream.len() as f64) as usize)
            .collect();

        let mut whole = Delineator::new(H223Level::Level2);
        let reference = whole.push(&stream);

        let mut split = Delineator::new(H223Level::Level2);
        let mut collected = Vec::new();
        let mut sorted = cuts.clone();
        sorted.sort_unstable();
        for chunk in chunked(&stream, &sorted) {
            collected.extend(split.push(&chunk));
        }

        prop_assert_eq!(collected, reference);
        prop_assert_eq!(split.pending(), whole.pending());
    }

    // A whole stream through a session equals the same stream byte by byte.
    #[test]
    fn prop_session_chunk_invariant(stream in pdu_stream()) {
        let mut reference = H223Session::with_defaults();
        let call = reference
            .open_call(CallKey::Tunnel { circuit_id: 1 }, H223Level::Level2)
            .unwrap();
        let ref_out = reference.dissect(call, Direction::Forward, 1, &stream).unwrap();

        let mut bytewise = H223Session::with_defaults();
        let call = bytewise
            .open_call(CallKey::Tunnel { circuit_id: 1 }, H223Level::Level2)
            .unwrap();
        let mut payloads = Vec::new();
        let mut pdu_count = 0usize;
        for byte in &stream {
            let out = bytewise
                .dissect(call, Direction::Forward, 1, std::slice::from_ref(byte))
                .unwrap();
            pdu_count += out.pdus.len();
            payloads.extend(out.deliveries.into_iter().map(|d| d.payload));
        }

        prop_assert_eq!(pdu_count, ref_out.pdus.len());
        let ref_payloads: Vec<Vec<u8>> = ref_out.deliveries.into_iter().map(|d| d.payload).collect();
        prop_assert_eq!(payloads, ref_payloads);
    }

    // Re-feeding the same fragments (a second dissection pass) yields the
    // same SDU, not a doubled one.
    #[test]
    fn prop_reassembly_idempotent(parts in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..16), 1..5)) {
        let params = LogicalChannelParams {
            al_type: AlType::Al1Framed,
            segmentable: true,
            subdissector: None,
        };
        let sc = SubCircuitId(0);

        let run = |passes: usize| -> Vec<u8> {
            let mut r = AlReassembler::new(1 << 20);
            let mut sdu = None;
            for _ in 0..passes {
                let mut diags: SmallVec<[Diagnostic; 2]> = SmallVec::new();
                for (i, part) in parts.iter().enumerate() {
                    let key = FragmentKey { frame: i as u64 + 1, stream_offset: i * 64 };
                    let last = i == parts.len() - 1;
                    if let Some(out) = r.process_fragment(sc, Direction::Forward, key, part, last, &params, &mut diags) {
                        sdu = Some(out.payload);
                    }
                }
            }
            sdu.expect("terminal fragment flushes")
        };

        let expected: Vec<u8> = parts.concat();
        prop_assert_eq!(run(1), expected.clone());
        prop_assert_eq!(run(2), expected);
    }
}
