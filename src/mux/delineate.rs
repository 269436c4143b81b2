//! Resumable MUX-PDU delineation.
//!
//! The H.223 byte stream has no outer framing: a PDU's extent is discovered
//! incrementally from its (possibly error-corrected) header and confirmed by
//! the closing flag, which is the authoritative terminator - the length hint
//! is wrong whenever the header itself was corrupted. The delineator is a
//! per-direction state machine fed one chunk at a time; results are identical
//! whether the stream arrives whole or split at arbitrary byte boundaries.

use tracing::trace;

use super::{parse_header, H223Level, HeaderParse, CLOSING_FLAG, CLOSING_FLAG_COMPLEMENT};

/// One complete, flag-terminated MUX-PDU cut out of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPdu {
    /// Byte offset of the PDU's first header byte within the direction's
    /// stream. Used as the versioned-state lookup offset.
    pub stream_offset: usize,
    /// Header, payload and closing flag.
    pub bytes: Vec<u8>,
    /// True when the complemented closing flag terminated the PDU, marking
    /// the end of the carried MUX-SDU (levels >= 2 only).
    pub end_of_mux_sdu: bool,
}

/// How much more data the delineator needs before it can make progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeedMore {
    /// Known minimum bytes still required, or `None` when the bound is
    /// unknown (header not yet parsed, or scanning past the length hint for
    /// the closing flag).
    pub minimum_bytes: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    /// Accumulating header bytes.
    Header,
    /// Minimum length known (or pinned to the bare minimum when the header
    /// was uncorrectable); scanning for the closing flag.
    Scan { min_len: usize },
}

/// Per-direction MUX-PDU boundary finder.
#[derive(Debug)]
pub struct Delineator {
    level: H223Level,
    phase: Phase,
    /// Bytes of the PDU currently being accumulated.
    buf: Vec<u8>,
    /// Stream offset of `buf[0]`.
    stream_pos: usize,
}

impl Delineator {
    /// Create a delineator for a byte-aligned level. Callers must have
    /// rejected levels 0 and 3 already (the session constructor does).
    pub fn new(level: H223Level) -> Self {
        debug_assert!(matches!(level, H223Level::Level1 | H223Level::Level2));
        Self {
            level,
            phase: Phase::Header,
            buf: Vec::new(),
            stream_pos: 0,
        }
    }

    /// Feed a chunk of stream bytes, harvesting every PDU completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<RawPdu> {
        let mut pdus = Vec::new();
        for &byte in chunk {
            if let Some(pdu) = self.push_byte(byte) {
                pdus.push(pdu);
            }
        }
        pdus
    }

    /// What the delineator still needs before the in-progress PDU can
    /// complete. Callers buffering transport segments use this to size their
    /// next read; it is a hint, never an error.
    pub fn needed(&self) -> NeedMore {
        match self.phase {
            Phase::Header => NeedMore {
                minimum_bytes: None,
            },
            Phase::Scan { min_len } if self.buf.len() < min_len => NeedMore {
                minimum_bytes: Some(min_len - self.buf.len()),
            },
            // Past the length hint: only the closing flag can end the PDU.
            Phase::Scan { .. } => NeedMore {
                minimum_bytes: None,
            },
        }
    }

    /// Bytes buffered for the in-progress PDU.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    fn push_byte(&mut self, byte: u8) -> Option<RawPdu> {
        self.buf.push(byte);
        match self.phase {
            Phase::Header => {
                let window = self.level.header_window();
                if self.buf.len() < window {
                    return None;
                }
                match parse_header(self.level, &self.buf) {
                    HeaderParse::Valid(header) => {
                        let min_len = header.payload_len + self.level.overhead();
                        trace!(
                            offset = self.stream_pos,
                            mpl = header.payload_len,
                            min_len,
                            "header parsed"
                        );
                        self.phase = Phase::Scan { min_len };
                    }
                    HeaderParse::Uncorrectable => {
                        // Length unknown; the flag alone bounds the PDU.
                        trace!(offset = self.stream_pos, "uncorrectable header");
                        self.phase = Phase::Scan {
                            min_len: self.level.overhead(),
                        };
                    }
                    HeaderParse::StrayFlag => {
                        // A flag between PDUs; skip it and restart.
                        trace!(offset = self.stream_pos, "stray flag skipped");
                        self.stream_pos += self.buf.len();
                        self.buf.clear();
                    }
                }
                None
            }
            Phase::Scan { min_len } => {
                if self.buf.len() < min_len {
                    return None;
                }
                let n = self.buf.len();
                let tail = u16::from_be_bytes([self.buf[n - 2], self.buf[n - 1]]);
                let end_of_mux_sdu = if tail == CLOSING_FLAG {
                    false
                } else if self.level.has_complement_flag() && tail == CLOSING_FLAG_COMPLEMENT {
                    true
                } else {
                    return None;
                };
                let bytes = std::mem::take(&mut self.buf);
                let pdu = RawPdu {
                    stream_offset: self.stream_pos,
                    bytes,
                    end_of_mux_sdu,
                };
                self.stream_pos += pdu.bytes.len();
                self.phase = Phase::Header;
                Some(pdu)
            }
        }
    }
}
