//! Versioned per-call and per-channel state.
//!
//! The meaning of a multiplex code can change mid-call: an H.245 multiplex
//! entry message rebinds it from a given frame onward. Capture files are read
//! more than once and not always front to back, so old versions are retained
//! and every lookup is qualified by `(frame, pdu_offset)` - the version in
//! force when that PDU was sent.
//!
//! Version lists are append-only maps ordered by [`VersionKey`]; "replace the
//! tail" (a control message defining the same code twice in one PDU) is an
//! insert at an equal key, and a strictly earlier key arriving after a later
//! one is a caller-contract violation, not data corruption to absorb.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::circuit::{CallId, SubCircuitId};
use crate::dissect::SubdissectorId;
use crate::error::StateError;

/// Direction of traffic within a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// From the endpoint that originated the call.
    Forward,
    /// Toward the originating endpoint.
    Reverse,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Reverse => "reverse",
        }
    }

    /// Index for two-element per-direction arrays.
    pub(crate) fn index(self) -> usize {
        match self {
            Direction::Forward => 0,
            Direction::Reverse => 1,
        }
    }
}

/// One element of a multiplex table: how a MUX-PDU payload is split among
/// virtual circuits.
///
/// Ownership is tree-structured; entries are looked up, never mutated in
/// place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuxTableEntry {
    /// The next `repeat_count` bytes belong to `vc`; `repeat_count == 0`
    /// means all bytes remaining in the PDU.
    Leaf { vc: u16, repeat_count: u32 },
    /// Repeat the child sequence `repeat_count` times; `repeat_count == 0`
    /// means as many times as fit exactly in the remaining payload.
    Group {
        repeat_count: u32,
        children: Vec<MuxTableEntry>,
    },
}

impl MuxTableEntry {
    /// Statically computable byte size, or `None` if it depends on the PDU
    /// (contains a repeat-until-exhausted leaf or group).
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            MuxTableEntry::Leaf { repeat_count: 0, .. } => None,
            MuxTableEntry::Leaf { repeat_count, .. } => Some(*repeat_count as usize),
            MuxTableEntry::Group { repeat_count: 0, .. } => None,
            MuxTableEntry::Group {
                repeat_count,
                children,
            } => {
                let per_pass = fixed_sequence_size(children)?;
                Some(per_pass * *repeat_count as usize)
            }
        }
    }
}

/// Fixed byte size of one pass over a child sequence, if all children have
/// one.
pub(crate) fn fixed_sequence_size(children: &[MuxTableEntry]) -> Option<usize> {
    children.iter().map(MuxTableEntry::fixed_size).sum()
}

/// Adaptation-layer type of a logical channel. AL3 is not implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlType {
    /// AL1, SDU boundaries delineated by the mux layer.
    Al1Framed,
    /// AL1, each fragment is a whole SDU.
    Al1NotFramed,
    /// AL2 with a leading sequence-number byte and trailing CRC-8.
    Al2WithSeq,
    /// AL2 with only the trailing CRC-8.
    Al2WithoutSeq,
}

impl AlType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlType::Al1Framed => "al1_framed",
            AlType::Al1NotFramed => "al1_not_framed",
            AlType::Al2WithSeq => "al2_with_seq",
            AlType::Al2WithoutSeq => "al2_without_seq",
        }
    }
}

/// Parameters in force for one logical channel, as announced by signaling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalChannelParams {
    pub al_type: AlType,
    /// Whether AL-SDUs may span multiple MUX-PDU fragments and must be
    /// reassembled before decoding.
    pub segmentable: bool,
    /// Registered decoder for this channel's payload, if any.
    pub subdissector: Option<SubdissectorId>,
}

/// Point in the capture at which a state version became active.
///
/// `pdu_offset` is the byte offset of the defining PDU within its direction's
/// stream, disambiguating multiple PDUs in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct VersionKey {
    pub frame: u64,
    pub pdu_offset: usize,
}

/// Number of multiplex codes in the 4-bit code space.
pub const MUX_CODE_COUNT: usize = 16;

type VersionList<T> = BTreeMap<VersionKey, T>;

/// Versioned-by-frame state for every call and logical channel in a session.
#[derive(Debug, Default)]
pub struct StateStore {
    mux_tables: HashMap<(CallId, Direction), [VersionList<MuxTableEntry>; MUX_CODE_COUNT]>,
    lc_params: HashMap<(SubCircuitId, Direction), VersionList<LogicalChannelParams>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new multiplex-table entry version for `(call, direction,
    /// code)` effective from `key` onward.
    ///
    /// An insert at the same key replaces the tail; an insert strictly before
    /// the current tail is rejected with [`StateError::OutOfOrderFrame`].
    pub fn set_mux_entry(
        &mut self,
        call: CallId,
        direction: Direction,
        code: u8,
        entry: MuxTableEntry,
        key: VersionKey,
    ) -> Result<(), StateError> {
        if usize::from(code) >= MUX_CODE_COUNT {
            return Err(StateError::InvalidMuxCode { code });
        }
        let table = self
            .mux_tables
            .entry((call, direction))
            .or_insert_with(|| std::array::from_fn(|_| BTreeMap::new()));
        let versions = &mut table[usize::from(code)];
        if let Some((&latest, _)) = versions.last_key_value() {
            if key < latest {
                return Err(StateError::OutOfOrderFrame {
                    frame: key.frame,
                    latest: latest.frame,
                    context: "mux table entry",
                });
            }
        }
        debug!(
            call = call.0,
            direction = direction.as_str(),
            code,
            frame = key.frame,
            "multiplex table update"
        );
        versions.insert(key, entry);
        Ok(())
    }

    /// Latest entry for `(call, direction, code)` whose version key is <=
    /// `key`, or `None` if the code was never defined by then.
    pub fn get_mux_entry(
        &self,
        call: CallId,
        direction: Direction,
        code: u8,
        key: VersionKey,
    ) -> Option<&MuxTableEntry> {
        let table = self.mux_tables.get(&(call, direction))?;
        let versions = table.get(usize::from(code))?;
        versions.range(..=key).next_back().map(|(_, e)| e)
    }

    /// Append a new logical-channel parameter version for `(subcircuit,
    /// direction)`. Same versioning discipline as [`Self::set_mux_entry`].
    pub fn set_lc_params(
        &mut self,
        subcircuit: SubCircuitId,
        direction: Direction,
        params: LogicalChannelParams,
        key: VersionKey,
    ) -> Result<(), StateError> {
        let versions = self.lc_params.entry((subcircuit, direction)).or_default();
        if let Some((&latest, _)) = versions.last_key_value() {
            if key < latest {
                return Err(StateError::OutOfOrderFrame {
                    frame: key.frame,
                    latest: latest.frame,
                    context: "logical channel params",
                });
            }
        }
        debug!(
            subcircuit = subcircuit.0,
            direction = direction.as_str(),
            al_type = params.al_type.as_str(),
            frame = key.frame,
            "logical channel open"
        );
        versions.insert(key, params);
        Ok(())
    }

    /// Latest parameters for `(subcircuit, direction)` in force at `key`.
    pub fn get_lc_params(
        &self,
        subcircuit: SubCircuitId,
        direction: Direction,
        key: VersionKey,
    ) -> Option<&LogicalChannelParams> {
        let versions = self.lc_params.get(&(subcircuit, direction))?;
        versions.range(..=key).next_back().map(|(_, p)| p)
    }
}
