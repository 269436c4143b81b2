//! Error and diagnostic types for h223-core.
//!
//! Two distinct failure families exist and must not be conflated:
//!
//! - [`enum@Error`] - caller-contract violations (out-of-order frames,
//!   unsupported framing levels). These indicate an integration bug and are
//!   returned as `Err` from entry points.
//! - [`Diagnostic`] - malformed *packet* data (uncorrectable headers, CRC
//!   mismatches, table/payload length mismatches). These are attached to
//!   dissection output and processing continues; a capture analyzer must keep
//!   decoding the rest of a damaged capture.

use compact_str::{format_compact, CompactString};
use thiserror::Error;

use crate::circuit::SubCircuitId;

/// Main error type for h223-core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Error from the versioned call/channel state store
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// Error from session-level orchestration
    #[error("session error: {0}")]
    Session(#[from] SessionError),
}

/// Errors from the versioned state store.
#[derive(Error, Debug)]
pub enum StateError {
    /// A strictly earlier frame arrived after a later one for the same slot.
    /// The versioned lookups are defined only under non-decreasing frame order.
    #[error("out-of-order frame {frame} for {context} (latest version is frame {latest})")]
    OutOfOrderFrame {
        frame: u64,
        latest: u64,
        context: &'static str,
    },

    /// Multiplex code outside 0..16.
    #[error("multiplex code {code} out of range (must be 0..16)")]
    InvalidMuxCode { code: u8 },
}

/// Errors from session orchestration.
#[derive(Error, Debug)]
pub enum SessionError {
    /// H.223 level 0 is bit-oriented (not byte-aligned) and cannot be
    /// dissected from byte-granular capture data.
    #[error("H.223 level 0 framing is not supported (not byte-aligned)")]
    UnsupportedLevel,

    /// H.223 level 3 (Annex C) framing is not implemented.
    #[error("H.223 level 3 framing is not implemented")]
    UnimplementedLevel,

    /// Dissection requested for a call id never returned by `open_call`.
    #[error("unknown call id {0}")]
    UnknownCall(u32),

    /// A logical channel referenced a subdissector id never registered.
    #[error("unknown subdissector id {0}")]
    UnknownSubdissector(usize),

    /// A packet for this call/direction carries a frame number lower than one
    /// already dissected.
    #[error("frame {frame} arrived after frame {latest} for the same call/direction")]
    FrameRegression { frame: u64, latest: u64 },
}

/// A non-fatal problem found while decoding packet data.
///
/// Diagnostics retain enough context (byte offset within the stream, frame
/// number, failing sub-step) for a host application to annotate the decoded
/// tree, mirroring expert-info practice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// The 24-bit Golay-protected header had 4+ bit errors; the payload is
    /// emitted opaque since the header fields are untrustworthy.
    GolayUncorrectable { frame: u64, pdu_offset: usize },

    /// The PDU's multiplex code has no active table entry for this
    /// call/direction at this frame.
    UndefinedMuxCode {
        code: u8,
        frame: u64,
        pdu_offset: usize,
    },

    /// A leaf in the multiplex table asked for more bytes than remain in the
    /// PDU payload; the remainder is emitted opaque.
    LeafOverrun {
        vc: u16,
        needed: usize,
        remaining: usize,
        payload_offset: usize,
    },

    /// A repeat-until-exhausted group's fixed size does not divide the
    /// remaining payload length exactly.
    GroupSizeMismatch {
        group_size: usize,
        remaining: usize,
        payload_offset: usize,
    },

    /// A repeat-until-exhausted group made a pass without consuming bytes.
    GroupStalled { payload_offset: usize },

    /// Payload bytes left over after the multiplex-table walk consumed the
    /// advertised payload length.
    ExtraneousPayload { payload_offset: usize, len: usize },

    /// AL2 trailer CRC did not match the computed CRC-8.
    CrcMismatch { expected: u8, actual: u8, frame: u64 },

    /// AL-SDU shorter than the AL2 header/trailer it must carry.
    AlSduTooShort { len: usize, frame: u64 },

    /// No logical-channel parameters are active for this VC; payload is
    /// delivered raw.
    NoChannelParams { vc: u16, frame: u64 },

    /// A reassembly chain exceeded the configured bound and was dropped.
    ReassemblyAbandoned {
        subcircuit: SubCircuitId,
        buffered: usize,
    },
}

impl Diagnostic {
    /// Render a short human-readable note for tree annotation.
    pub fn message(&self) -> CompactString {
        match self {
            Diagnostic::GolayUncorrectable { frame, pdu_offset } => format_compact!(
                "uncorrectable Golay header (frame {frame}, offset {pdu_offset})"
            ),
            Diagnostic::UndefinedMuxCode { code, frame, .. } => {
                format_compact!("multiplex code {code} not active at frame {frame}")
            }
            Diagnostic::LeafOverrun {
                vc,
                needed,
                remaining,
                ..
            } => {
                format_compact!("VC {vc} field needs {needed} bytes but only {remaining} remain")
            }
            Diagnostic::GroupSizeMismatch {
                group_size,
                remaining,
                ..
            } => format_compact!(
                "group size {group_size} does not divide remaining {remaining} bytes"
            ),
            Diagnostic::GroupStalled { payload_offset } => {
                format_compact!("zero-size group pass at payload offset {payload_offset}")
            }
            Diagnostic::ExtraneousPayload { len, .. } => {
                format_compact!("{len} extraneous payload bytes after table walk")
            }
            Diagnostic::CrcMismatch {
                expected, actual, ..
            } => {
                format_compact!("AL2 CRC mismatch (expected {expected:#04x}, got {actual:#04x})")
            }
            Diagnostic::AlSduTooShort { len, .. } => {
                format_compact!("AL-SDU too short for AL2 framing ({len} bytes)")
            }
            Diagnostic::NoChannelParams { vc, frame } => {
                format_compact!("no logical channel open for VC {vc} at frame {frame}")
            }
            Diagnostic::ReassemblyAbandoned { buffered, .. } => {
                format_compact!("reassembly abandoned after {buffered} buffered bytes")
            }
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
