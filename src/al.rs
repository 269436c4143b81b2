//! Adaptation-layer reassembly and AL-PDU decoding.
//!
//! Fragments of one VC arrive interleaved across MUX-PDUs. Segmentable
//! channels accumulate fragments per (sub-circuit, direction), keyed by
//! `(frame, stream offset)` so rereading a capture re-inserts the same
//! fragment instead of duplicating it, and flush into one AL-SDU when the
//! end-of-MUX-SDU flag arrives. Non-segmentable channels and AL1-not-framed
//! channels deliver each fragment as an SDU immediately.
//!
//! A chain whose terminal fragment never arrives lives for the rest of the
//! session unless it crosses the configured byte bound, in which case it is
//! abandoned with a diagnostic rather than growing without limit.

use std::collections::{BTreeMap, HashMap};

use smallvec::SmallVec;
use tracing::trace;

use crate::circuit::SubCircuitId;
use crate::crc::crc8;
use crate::error::Diagnostic;
use crate::state::{AlType, Direction, LogicalChannelParams};

/// A decoded adaptation-layer SDU, ready for subdissection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlSdu {
    pub al_type: AlType,
    /// AL2 sequence number, where the channel carries one.
    pub seq: Option<u8>,
    /// AL2 CRC verdict; `None` for AL1 (no trailer).
    pub crc_ok: Option<bool>,
    pub payload: Vec<u8>,
}

/// Where a fragment sits in the capture, for idempotent chain keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FragmentKey {
    pub frame: u64,
    /// Offset of the fragment's first byte within the direction's stream.
    pub stream_offset: usize,
}

#[derive(Debug, Default)]
struct Chain {
    fragments: BTreeMap<FragmentKey, Vec<u8>>,
    total_bytes: usize,
}

/// Per-session adaptation-layer reassembler.
#[derive(Debug)]
pub struct AlReassembler {
    chains: HashMap<(SubCircuitId, Direction), Chain>,
    /// Bound on one chain's buffered bytes before it is abandoned.
    max_chain_bytes: usize,
}

impl AlReassembler {
    pub fn new(max_chain_bytes: usize) -> Self {
        Self {
            chains: HashMap::new(),
            max_chain_bytes,
        }
    }

    /// Feed one VC fragment. Returns a complete AL-SDU when this fragment
    /// finishes one (immediately for unsegmented channels, on the terminal
    /// fragment otherwise).
    pub fn process_fragment(
        &mut self,
        subcircuit: SubCircuitId,
        direction: Direction,
        key: FragmentKey,
        data: &[u8],
        last: bool,
        params: &LogicalChannelParams,
        diagnostics: &mut SmallVec<[Diagnostic; 2]>,
    ) -> Option<AlSdu> {
        // Unsegmented delivery: every fragment is a whole SDU.
        if !params.segmentable || params.al_type == AlType::Al1NotFramed {
            return Some(decode_al_sdu(params.al_type, data.to_vec(), key.frame, diagnostics));
        }

        let chain = self.chains.entry((subcircuit, direction)).or_default();

        // Idempotent accumulation: a reread of the same capture presents the
        // same key and must not double the data.
        if !chain.fragments.contains_key(&key) {
            chain.total_bytes += data.len();
            chain.fragments.insert(key, data.to_vec());
            trace!(
                subcircuit = subcircuit.0,
                direction = direction.as_str(),
                frame = key.frame,
                len = data.len(),
                buffered = chain.total_bytes,
                "fragment buffered"
            );
        }

        if chain.total_bytes > self.max_chain_bytes {
            let buffered = chain.total_bytes;
            self.chains.remove(&(subcircuit, direction));
            diagnostics.push(Diagnostic::ReassemblyAbandoned {
                subcircuit,
                buffered,
            });
            return None;
        }

        if !last {
            return None;
        }

        let chain = self
            .chains
            .remove(&(subcircuit, direction))
            .unwrap_or_default();
        let mut buf = Vec::with_capacity(chain.total_bytes);
        for fragment in chain.fragments.values() {
            buf.extend_from_slice(fragment);
        }
        Some(decode_al_sdu(params.al_type, buf, key.frame, diagnostics))
    }

    /// Bytes currently buffered for an unfinished SDU on this channel.
    pub fn pending_bytes(&self, subcircuit: SubCircuitId, direction: Direction) -> usize {
        self.chains
            .get(&(subcircuit, direction))
            .map(|c| c.total_bytes)
            .unwrap_or(0)
    }
}

/// Decode one complete AL-SDU according to the channel's AL type.
///
/// AL2 CRC mismatches are diagnosed but the payload is still produced; a
/// damaged unit is far more useful displayed than suppressed.
fn decode_al_sdu(
    al_type: AlType,
    mut buf: Vec<u8>,
    frame: u64,
    diagnostics: &mut SmallVec<[Diagnostic; 2]>,
) -> AlSdu {
    match al_type {
        // Framed vs not-framed differs only in mux-layer delineation, which
        // is already behind us; both are bare payload here.
        AlType::Al1Framed | AlType::Al1NotFramed => AlSdu {
            al_type,
            seq: None,
            crc_ok: None,
            payload: buf,
        },
        AlType::Al2WithoutSeq | AlType::Al2WithSeq => {
            let header_len = if al_type == AlType::Al2WithSeq { 1 } else { 0 };
            if buf.len() < header_len + 1 {
                diagnostics.push(Diagnostic::AlSduTooShort {
                    len: buf.len(),
                    frame,
                });
                return AlSdu {
                    al_type,
                    seq: None,
                    crc_ok: None,
                    payload: buf,
                };
            }
            let trailer = buf.pop().expect("length checked above");
            let computed = crc8(&buf);
            let crc_ok = trailer == computed;
            if !crc_ok {
                diagnostics.push(Diagnostic::CrcMismatch {
                    expected: computed,
                    actual: trailer,
                    frame,
                });
            }
            let seq = if header_len == 1 {
                Some(buf.remove(0))
            } else {
                None
            };
            AlSdu {
                al_type,
                seq,
                crc_ok: Some(crc_ok),
                payload: buf,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(al_type: AlType, segmentable: bool) -> LogicalChannelParams {
        LogicalChannelParams {
            al_type,
            segmentable,
            subdissector: None,
        }
    }

    fn key(frame: u64, stream_offset: usize) -> FragmentKey {
        FragmentKey {
            frame,
            stream_offset,
        }
    }

    /// AL2 unit: payload plus valid trailing CRC (and optional leading seq).
    fn al2_unit(seq: Option<u8>, payload: &[u8]) -> Vec<u8> {
        let mut unit = Vec::new();
        if let Some(s) = seq {
            unit.push(s);
        }
        unit.extend_from_slice(payload);
        unit.push(crc8(&unit));
        unit
    }

    // Test 1: non-segmentable channel delivers each fragment at once
    #[test]
    fn test_unsegmented_immediate() {
        let mut r = AlReassembler::new(1 << 20);
        let mut diags = SmallVec::new();
        let sdu = r
            .process_fragment(
                SubCircuitId(1),
                Direction::Forward,
                key(1, 0),
                b"whole",
                false,
                &params(AlType::Al1Framed, false),
                &mut diags,
            )
            .expect("non-segmentable => immediate");
        assert_eq!(sdu.payload, b"whole");
        assert_eq!(sdu.crc_ok, None);
        assert!(diags.is_empty());
    }

    // Test 2: segmentable channel accumulates until the terminal fragment
    #[test]
    fn test_segmented_accumulation() {
        let mut r = AlReassembler::new(1 << 20);
        let p = params(AlType::Al1Framed, true);
        let mut diags = SmallVec::new();
        let sc = SubCircuitId(2);

        assert!(r
            .process_fragment(sc, Direction::Forward, key(1, 0), b"ab", false, &p, &mut diags)
            .is_none());
        assert!(r
            .process_fragment(sc, Direction::Forward, key(2, 10), b"cd", false, &p, &mut diags)
            .is_none());
        assert_eq!(r.pending_bytes(sc, Direction::Forward), 4);

        let sdu = r
            .process_fragment(sc, Direction::Forward, key(3, 20), b"ef", true, &p, &mut diags)
            .expect("terminal fragment flushes");
        assert_eq!(sdu.payload, b"abcdef");
        assert_eq!(r.pending_bytes(sc, Direction::Forward), 0);
    }

    // Test 3: re-inserting the same fragment key does not duplicate data
    #[test]
    fn test_idempotent_reinsert() {
        let mut r = AlReassembler::new(1 << 20);
        let p = params(AlType::Al1Framed, true);
        let mut diags = SmallVec::new();
        let sc = SubCircuitId(3);

        r.process_fragment(sc, Direction::Forward, key(1, 0), b"xy", false, &p, &mut diags);
        // Second dissection pass over the same capture.
        r.process_fragment(sc, Direction::Forward, key(1, 0), b"xy", false, &p, &mut diags);
        assert_eq!(r.pending_bytes(sc, Direction::Forward), 2);

        let sdu = r
            .process_fragment(sc, Direction::Forward, key(2, 9), b"z", true, &p, &mut diags)
            .unwrap();
        assert_eq!(sdu.payload, b"xyz");
    }

    // Test 4: AL2 without sequence number: CRC checked and stripped
    #[test]
    fn test_al2_without_seq() {
        let mut r = AlReassembler::new(1 << 20);
        let mut diags = SmallVec::new();
        let unit = al2_unit(None, b"data");
        let sdu = r
            .process_fragment(
                SubCircuitId(4),
                Direction::Reverse,
                key(5, 0),
                &unit,
                false,
                &params(AlType::Al2WithoutSeq, false),
                &mut diags,
            )
            .unwrap();
        assert_eq!(sdu.payload, b"data");
        assert_eq!(sdu.seq, None);
        assert_eq!(sdu.crc_ok, Some(true));
        assert!(diags.is_empty());
    }

    // Test 5: AL2 with sequence number
    #[test]
    fn test_al2_with_seq() {
        let mut r = AlReassembler::new(1 << 20);
        let mut diags = SmallVec::new();
        let unit = al2_unit(Some(42), b"voice");
        let sdu = r
            .process_fragment(
                SubCircuitId(5),
                Direction::Forward,
                key(6, 0),
                &unit,
                false,
                &params(AlType::Al2WithSeq, false),
                &mut diags,
            )
            .unwrap();
        assert_eq!(sdu.seq, Some(42));
        assert_eq!(sdu.payload, b"voice");
        assert_eq!(sdu.crc_ok, Some(true));
    }

    // Test 6: CRC mismatch is diagnosed, payload still delivered
    #[test]
    fn test_al2_crc_mismatch_still_delivers() {
        let mut r = AlReassembler::new(1 << 20);
        let mut diags = SmallVec::new();
        let mut unit = al2_unit(Some(7), b"noisy");
        let n = unit.len();
        unit[n - 1] ^= 0xFF;
        let sdu = r
            .process_fragment(
                SubCircuitId(6),
                Direction::Forward,
                key(7, 0),
                &unit,
                false,
                &params(AlType::Al2WithSeq, false),
                &mut diags,
            )
            .unwrap();
        assert_eq!(sdu.seq, Some(7), "sequence number extracted regardless");
        assert_eq!(sdu.payload, b"noisy");
        assert_eq!(sdu.crc_ok, Some(false));
        assert!(diags
            .iter()
            .any(|d| matches!(d, Diagnostic::CrcMismatch { frame: 7, .. })));
    }

    // Test 7: too-short AL2 SDU
    #[test]
    fn test_al2_too_short() {
        let mut r = AlReassembler::new(1 << 20);
        let mut diags = SmallVec::new();
        let sdu = r
            .process_fragment(
                SubCircuitId(7),
                Direction::Forward,
                key(8, 0),
                &[9], // seq byte only, no CRC
                false,
                &params(AlType::Al2WithSeq, false),
                &mut diags,
            )
            .unwrap();
        assert_eq!(sdu.crc_ok, None);
        assert!(diags
            .iter()
            .any(|d| matches!(d, Diagnostic::AlSduTooShort { len: 1, .. })));
    }

    // Test 8: oversized chain is abandoned with a diagnostic
    #[test]
    fn test_chain_bound() {
        let mut r = AlReassembler::new(4);
        let p = params(AlType::Al1Framed, true);
        let mut diags = SmallVec::new();
        let sc = SubCircuitId(8);

        r.process_fragment(sc, Direction::Forward, key(1, 0), b"abc", false, &p, &mut diags);
        assert!(diags.is_empty());
        let out = r.process_fragment(sc, Direction::Forward, key(2, 8), b"def", false, &p, &mut diags);
        assert!(out.is_none());
        assert!(diags
            .iter()
            .any(|d| matches!(d, Diagnostic::ReassemblyAbandoned { buffered: 6, .. })));
        assert_eq!(r.pending_bytes(sc, Direction::Forward), 0, "chain dropped");
    }

    // Test 9: AL1-not-framed skips reassembly even on a segmentable channel
    #[test]
    fn test_al1_not_framed_immediate() {
        let mut r = AlReassembler::new(1 << 20);
        let mut diags = SmallVec::new();
        let sdu = r
            .process_fragment(
                SubCircuitId(9),
                Direction::Forward,
                key(1, 0),
                b"unit",
                false,
                &params(AlType::Al1NotFramed, true),
                &mut diags,
            )
            .unwrap();
        assert_eq!(sdu.payload, b"unit");
    }
}
