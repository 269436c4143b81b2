//! MUX-PDU decoding and recursive payload demultiplexing.
//!
//! Given one complete, flag-terminated PDU, recover the header fields and
//! walk the active multiplex-table entry - a recursive grammar of repeat
//! counts and sublists - to split the payload into per-VC fragments. Malformed
//! tables and payload/length mismatches are expected in captures of real
//! implementations: every failure here downgrades the affected byte range to
//! opaque data with a diagnostic and never aborts dissection.

use std::ops::Range;

use smallvec::SmallVec;

use crate::circuit::CallId;
use crate::error::Diagnostic;
use crate::state::{fixed_sequence_size, Direction, MuxTableEntry, StateStore, VersionKey};

use super::{parse_header, H223Level, HeaderParse, RawPdu};

/// One per-VC byte range cut from a PDU payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VcFragment {
    pub vc: u16,
    /// Range into the PDU's bytes.
    pub range: Range<usize>,
    /// True when this fragment ends the carried AL-SDU: it is the final byte
    /// range of the payload and the PDU closed with the complement flag.
    pub last: bool,
}

/// Why a byte range was emitted undissected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpaqueReason {
    /// Header had 4+ bit errors; no field of it can be trusted.
    UncorrectableHeader,
    /// No multiplex-table entry is active for the PDU's code.
    UndefinedMuxCode,
    /// The active table entry did not match the payload length.
    TableMismatch,
    /// Bytes past the advertised payload length.
    Extraneous,
}

/// A byte range emitted as opaque data, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueRegion {
    pub range: Range<usize>,
    pub reason: OpaqueReason,
}

/// Fully decoded MUX-PDU.
#[derive(Debug, Clone)]
pub struct MuxPduRecord {
    /// Offset of the PDU within its direction's stream.
    pub stream_offset: usize,
    /// 4-bit multiplex code, `None` when the header was uncorrectable.
    pub multiplex_code: Option<u8>,
    /// Advertised payload length (0 for stuffing and uncorrectable PDUs).
    pub payload_len: usize,
    /// False when the Golay stage gave up on the header.
    pub header_correctable: bool,
    /// Header bits repaired by the Golay stage.
    pub corrected_bits: u32,
    /// PDU closed with the complemented flag (end of MUX-SDU).
    pub end_of_mux_sdu: bool,
    /// Zero-length payload: a stuffing PDU.
    pub stuffing: bool,
    pub fragments: SmallVec<[VcFragment; 4]>,
    pub opaque: SmallVec<[OpaqueRegion; 1]>,
    pub diagnostics: SmallVec<[Diagnostic; 2]>,
}

/// Decode one delineated MUX-PDU against the state in force at its frame and
/// stream offset.
pub fn decode_mux_pdu(
    level: H223Level,
    pdu: &RawPdu,
    store: &StateStore,
    call: CallId,
    direction: Direction,
    frame: u64,
) -> MuxPduRecord {
    let payload_start = level.header_len();
    let payload_end = pdu.bytes.len() - 2;

    let mut record = MuxPduRecord {
        stream_offset: pdu.stream_offset,
        multiplex_code: None,
        payload_len: 0,
        header_correctable: true,
        corrected_bits: 0,
        end_of_mux_sdu: pdu.end_of_mux_sdu,
        stuffing: false,
        fragments: SmallVec::new(),
        opaque: SmallVec::new(),
        diagnostics: SmallVec::new(),
    };

    let header = match parse_header(level, &pdu.bytes) {
        HeaderParse::Valid(header) => header,
        HeaderParse::Uncorrectable => {
            record.header_correctable = false;
            record
                .diagnostics
                .push(Diagnostic::GolayUncorrectable {
                    frame,
                    pdu_offset: pdu.stream_offset,
                });
            if payload_start < payload_end {
                record.opaque.push(OpaqueRegion {
                    range: payload_start..payload_end,
                    reason: OpaqueReason::UncorrectableHeader,
                });
            }
            return record;
        }
        // The delineator never hands over a stray flag as a PDU; a caller
        // constructing PDUs by hand gets it treated as stuffing.
        HeaderParse::StrayFlag => {
            record.stuffing = true;
            return record;
        }
    };

    record.multiplex_code = Some(header.multiplex_code);
    record.payload_len = header.payload_len;
    record.corrected_bits = header.corrected_bits;

    // Bytes between the advertised payload and the closing flag. The flag is
    // authoritative for delineation, so a wrong length hint surfaces here.
    let walk_end = payload_start + header.payload_len.min(payload_end - payload_start);
    if walk_end < payload_end {
        record.diagnostics.push(Diagnostic::ExtraneousPayload {
            payload_offset: walk_end - payload_start,
            len: payload_end - walk_end,
        });
        record.opaque.push(OpaqueRegion {
            range: walk_end..payload_end,
            reason: OpaqueReason::Extraneous,
        });
    }

    if header.payload_len == 0 {
        record.stuffing = true;
        return record;
    }

    let key = VersionKey {
        frame,
        pdu_offset: pdu.stream_offset,
    };
    let entry = match store.get_mux_entry(call, direction, header.multiplex_code, key) {
        Some(entry) => entry,
        None => {
            record.diagnostics.push(Diagnostic::UndefinedMuxCode {
                code: header.multiplex_code,
                frame,
                pdu_offset: pdu.stream_offset,
            });
            record.opaque.push(OpaqueRegion {
                range: payload_start..walk_end,
                reason: OpaqueReason::UndefinedMuxCode,
            });
            return record;
        }
    };

    let mut walker = Walker {
        cursor: payload_start,
        payload_start,
        payload_end: walk_end,
        eos: pdu.end_of_mux_sdu,
        fragments: &mut record.fragments,
        diagnostics: &mut record.diagnostics,
    };
    let outcome = walker.walk_entry(entry);
    let cursor = walker.cursor;

    match outcome {
        Ok(()) if cursor < walk_end => {
            // The entry matched but consumed less than the advertised
            // payload.
            record.diagnostics.push(Diagnostic::ExtraneousPayload {
                payload_offset: cursor - payload_start,
                len: walk_end - cursor,
            });
            record.opaque.push(OpaqueRegion {
                range: cursor..walk_end,
                reason: OpaqueReason::Extraneous,
            });
        }
        Ok(()) => {}
        Err(WalkStop) if cursor < walk_end => {
            record.opaque.push(OpaqueRegion {
                range: cursor..walk_end,
                reason: OpaqueReason::TableMismatch,
            });
        }
        Err(WalkStop) => {}
    }

    record
}

/// Marker for "stop the walk, emit the remainder opaque".
struct WalkStop;

struct Walker<'a> {
    cursor: usize,
    payload_start: usize,
    payload_end: usize,
    eos: bool,
    fragments: &'a mut SmallVec<[VcFragment; 4]>,
    diagnostics: &'a mut SmallVec<[Diagnostic; 2]>,
}

impl Walker<'_> {
    fn remaining(&self) -> usize {
        self.payload_end - self.cursor
    }

    fn walk_entry(&mut self, entry: &MuxTableEntry) -> Result<(), WalkStop> {
        match entry {
            MuxTableEntry::Leaf { vc, repeat_count } => {
                let remaining = self.remaining();
                let len = if *repeat_count == 0 {
                    remaining
                } else {
                    *repeat_count as usize
                };
                if len > remaining {
                    self.diagnostics.push(Diagnostic::LeafOverrun {
                        vc: *vc,
                        needed: len,
                        remaining,
                        payload_offset: self.cursor - self.payload_start,
                    });
                    return Err(WalkStop);
                }
                let start = self.cursor;
                self.cursor += len;
                self.fragments.push(VcFragment {
                    vc: *vc,
                    range: start..self.cursor,
                    last: self.eos && self.cursor == self.payload_end,
                });
                Ok(())
            }
            MuxTableEntry::Group {
                repeat_count,
                children,
            } => {
                if *repeat_count > 0 {
                    // repeat_count comes from signaling and can be up to
                    // u32::MAX; a pass that consumed nothing would repeat
                    // identically for every remaining iteration.
                    for _ in 0..*repeat_count {
                        let before = self.cursor;
                        self.walk_children(children)?;
                        if self.cursor == before {
                            self.diagnostics.push(Diagnostic::GroupStalled {
                                payload_offset: self.cursor - self.payload_start,
                            });
                            return Err(WalkStop);
                        }
                    }
                    return Ok(());
                }
                match fixed_sequence_size(children) {
                    // Fixed-size repeat-until-exhausted group: the remaining
                    // payload must be an exact multiple of one pass.
                    Some(size) if size > 0 => {
                        let remaining = self.remaining();
                        if remaining % size != 0 {
                            self.diagnostics.push(Diagnostic::GroupSizeMismatch {
                                group_size: size,
                                remaining,
                                payload_offset: self.cursor - self.payload_start,
                            });
                            return Err(WalkStop);
                        }
                        for _ in 0..remaining / size {
                            self.walk_children(children)?;
                        }
                        Ok(())
                    }
                    Some(_) => {
                        // Zero-size pass can never exhaust the payload.
                        self.diagnostics.push(Diagnostic::GroupStalled {
                            payload_offset: self.cursor - self.payload_start,
                        });
                        Err(WalkStop)
                    }
                    // Variable-size pass: iterate whole passes until the
                    // payload is exhausted.
                    None => {
                        while self.cursor < self.payload_end {
                            let before = self.cursor;
                            self.walk_children(children)?;
                            if self.cursor == before {
                                self.diagnostics.push(Diagnostic::GroupStalled {
                                    payload_offset: self.cursor - self.payload_start,
                                });
                                return Err(WalkStop);
                            }
                        }
                        Ok(())
                    }
                }
            }
        }
    }

    fn walk_children(&mut self, children: &[MuxTableEntry]) -> Result<(), WalkStop> {
        for child in children {
            self.walk_entry(child)?;
        }
        Ok(())
    }
}
