//! MUX-PDU layer: stream delineation and recursive demultiplexing.
//!
//! This module owns the wire grammar shared by both halves of the MUX layer:
//!
//! - [`Delineator`] finds PDU boundaries in a byte stream with no framing,
//!   resumable across arbitrary chunk splits
//! - [`decode_mux_pdu`] decodes one complete PDU and walks the multiplex
//!   table to split its payload into per-VC fragments

mod delineate;
mod demux;

pub use delineate::{Delineator, NeedMore, RawPdu};
pub use demux::{decode_mux_pdu, MuxPduRecord, OpaqueReason, OpaqueRegion, VcFragment};

use crate::golay;

/// HDLC-style 16-bit flag terminating every MUX-PDU, as received on the wire.
pub const CLOSING_FLAG: u16 = 0xE14D;

/// Bitwise complement of the closing flag; for levels >= 2 it terminates the
/// PDU *and* marks the end of the carried MUX-SDU.
pub const CLOSING_FLAG_COMPLEMENT: u16 = !CLOSING_FLAG;

/// H.223 multiplexer level, selecting the header format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum H223Level {
    /// Bit-oriented framing; not byte-aligned, cannot be dissected here.
    Level0,
    /// One-byte header, no error protection.
    Level1,
    /// Three-byte Golay-protected header.
    Level2,
    /// Annex C framing; not implemented.
    Level3,
}

impl H223Level {
    /// Bytes that must be buffered before a header parse can be attempted.
    pub(crate) fn header_window(self) -> usize {
        match self {
            H223Level::Level1 => 2,
            H223Level::Level2 | H223Level::Level3 => 3,
            H223Level::Level0 => unreachable!("level 0 rejected at call setup"),
        }
    }

    /// Header bytes consumed ahead of the payload.
    pub(crate) fn header_len(self) -> usize {
        match self {
            H223Level::Level1 => 1,
            H223Level::Level2 | H223Level::Level3 => 3,
            H223Level::Level0 => unreachable!("level 0 rejected at call setup"),
        }
    }

    /// Header plus closing-flag overhead: minimum PDU length is this plus the
    /// advertised payload length.
    pub(crate) fn overhead(self) -> usize {
        self.header_len() + 2
    }

    /// Whether the complemented closing flag (end-of-MUX-SDU) is part of the
    /// grammar at this level.
    pub(crate) fn has_complement_flag(self) -> bool {
        matches!(self, H223Level::Level2 | H223Level::Level3)
    }
}

/// Decoded MUX-PDU header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuxHeader {
    /// 4-bit multiplex code selecting the table entry for the payload.
    pub multiplex_code: u8,
    /// Advertised multiplex payload length in bytes.
    pub payload_len: usize,
    /// Number of header bits the Golay stage corrected (always 0 at level 1).
    pub corrected_bits: u32,
}

/// Outcome of a header parse attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderParse {
    Valid(MuxHeader),
    /// Level 2 header with 4+ bit errors; fields are untrustworthy.
    Uncorrectable,
    /// Level 1 window holds a stray closing flag, not a header.
    StrayFlag,
}

/// Parse a MUX-PDU header from the first `header_window` bytes of a PDU.
///
/// Level 1 reads a 16-bit big-endian window; a window equal to the closing
/// flag is a stray flag between PDUs, not a header. Level 2 reads three bytes
/// as a little-endian 24-bit word, swaps it to wire bit order and runs the
/// Golay corrector.
pub fn parse_header(level: H223Level, bytes: &[u8]) -> HeaderParse {
    match level {
        H223Level::Level1 => {
            let window = u16::from_be_bytes([bytes[0], bytes[1]]);
            if window == CLOSING_FLAG {
                return HeaderParse::StrayFlag;
            }
            HeaderParse::Valid(MuxHeader {
                // Level 1 does not carry a multiplex code; the default
                // (seeded) entry 0 governs the payload.
                multiplex_code: 0,
                payload_len: usize::from((window >> 12) & 0xFF),
                corrected_bits: 0,
            })
        }
        H223Level::Level2 | H223Level::Level3 => {
            let raw =
                u32::from(bytes[0]) | (u32::from(bytes[1]) << 8) | (u32::from(bytes[2]) << 16);
            // Wire byte order is reversed relative to the Golay bit-position
            // convention.
            let codeword =
                ((raw & 0xFF_0000) >> 16) | (raw & 0x00_FF00) | ((raw & 0x0000_FF) << 16);
            match golay::syndrome_errors(codeword) {
                Some(mask) => {
                    let corrected = codeword ^ mask;
                    HeaderParse::Valid(MuxHeader {
                        multiplex_code: (corrected & 0xF) as u8,
                        payload_len: ((corrected >> 4) & 0xFF) as usize,
                        corrected_bits: mask.count_ones(),
                    })
                }
                None => HeaderParse::Uncorrectable,
            }
        }
        H223Level::Level0 => unreachable!("level 0 rejected at call setup"),
    }
}

/// Build the 3 wire bytes of a level-2 header for the given code and payload
/// length. Used by tests and traffic generators.
pub fn encode_level2_header(multiplex_code: u8, payload_len: u8) -> [u8; 3] {
    let data = u16::from(multiplex_code & 0xF) | (u16::from(payload_len) << 4);
    let codeword = golay::encode(data);
    // Inverse of the byte-order swap in `parse_header`.
    [
        ((codeword >> 16) & 0xFF) as u8,
        ((codeword >> 8) & 0xFF) as u8,
        (codeword & 0xFF) as u8,
    ]
}
