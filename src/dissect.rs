//! Session orchestration and subdissector handoff.
//!
//! [`H223Session`] is the explicit handle through which all state is reached:
//! it owns the circuit registry, the versioned state store, the per-direction
//! delineators and the AL reassembler for one capture. Nothing here is a
//! process-wide singleton, so independent captures can be dissected on
//! independent sessions across threads without locking; within one session
//! the caller serializes.

use std::collections::HashMap;

use smallvec::SmallVec;
use tracing::debug;

use crate::al::{AlReassembler, FragmentKey};
use crate::circuit::{CallId, CallKey, CircuitRegistry, SubCircuitId};
use crate::error::{Diagnostic, Error, Result, SessionError};
use crate::mux::{decode_mux_pdu, Delineator, H223Level, MuxPduRecord, NeedMore, VcFragment};
use crate::state::{
    AlType, Direction, LogicalChannelParams, MuxTableEntry, StateStore, VersionKey,
};

/// Handle to a registered subdissector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubdissectorId(pub usize);

/// Identity and position of a delivered AL-SDU.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryContext {
    pub call: CallId,
    pub subcircuit: SubCircuitId,
    pub vc: u16,
    pub direction: Direction,
    pub frame: u64,
}

/// Decoder for one logical channel's payload format. The core is agnostic to
/// what the decoder does with the bytes.
pub trait Subdissector: Send + Sync {
    /// Protocol identifier (e.g. "h245", "amr").
    fn name(&self) -> &'static str;

    /// Consume one reassembled AL-SDU payload.
    fn dissect(&self, payload: &[u8], context: &DeliveryContext);
}

/// Registry of payload decoders, id-addressed so channel parameters can
/// reference them across state versions.
#[derive(Default)]
pub struct SubdissectorRegistry {
    dissectors: Vec<Box<dyn Subdissector>>,
}

impl SubdissectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a decoder, returning its stable handle.
    pub fn register(&mut self, dissector: Box<dyn Subdissector>) -> SubdissectorId {
        self.dissectors.push(dissector);
        SubdissectorId(self.dissectors.len() - 1)
    }

    pub fn get(&self, id: SubdissectorId) -> Option<&dyn Subdissector> {
        self.dissectors.get(id.0).map(|d| d.as_ref())
    }
}

/// One reassembled AL-SDU handed (or not) to a subdissector.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub subcircuit: SubCircuitId,
    pub vc: u16,
    pub direction: Direction,
    pub frame: u64,
    /// `None` when no logical channel was open for the VC and the bytes are
    /// delivered raw.
    pub al_type: Option<AlType>,
    pub seq: Option<u8>,
    pub crc_ok: Option<bool>,
    pub payload: Vec<u8>,
    /// Name of the subdissector that consumed the payload, if one was
    /// registered for the channel.
    pub handled_by: Option<&'static str>,
}

/// Everything produced by dissecting one chunk of stream bytes.
#[derive(Debug, Default)]
pub struct DissectOutput {
    /// Decoded MUX-PDUs completed by this chunk, in stream order.
    pub pdus: Vec<MuxPduRecord>,
    /// AL-SDUs completed by this chunk.
    pub deliveries: Vec<Delivery>,
    /// Diagnostics raised outside any single PDU (reassembly bounds).
    pub diagnostics: SmallVec<[Diagnostic; 2]>,
    /// Outstanding data requirement for the in-progress PDU, if any.
    pub need_more: Option<NeedMore>,
}

/// Per-call accounting in both directions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallStats {
    pub pdus: u64,
    pub stuffing_pdus: u64,
    pub fragments: u64,
    pub deliveries: u64,
    pub crc_failures: u64,
}

/// Session tuning knobs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bound on one reassembly chain before it is abandoned with a
    /// diagnostic. The source of this format never bounded chains; a stuck
    /// sender could grow one for the life of a long capture.
    pub max_chain_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_chain_bytes: 16 * 1024 * 1024, // 16 MB per channel
        }
    }
}

struct DirectionState {
    delineator: Delineator,
    last_frame: Option<u64>,
}

struct CallRecord {
    level: H223Level,
    directions: [DirectionState; 2],
    stats: CallStats,
}

/// One capture's worth of H.223 dissection state.
pub struct H223Session {
    config: SessionConfig,
    circuits: CircuitRegistry,
    store: StateStore,
    reassembler: AlReassembler,
    subdissectors: SubdissectorRegistry,
    calls: HashMap<CallId, CallRecord>,
    /// Decoder seeded onto VC 0 (the control channel) of every new call.
    control_subdissector: Option<SubdissectorId>,
}

impl H223Session {
    pub fn new(config: SessionConfig) -> Self {
        let max_chain_bytes = config.max_chain_bytes;
        Self {
            config,
            circuits: CircuitRegistry::new(),
            store: StateStore::new(),
            reassembler: AlReassembler::new(max_chain_bytes),
            subdissectors: SubdissectorRegistry::new(),
            calls: HashMap::new(),
            control_subdissector: None,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(SessionConfig::default())
    }

    /// Register a payload decoder for later reference from channel-open
    /// signaling.
    pub fn register_subdissector(&mut self, dissector: Box<dyn Subdissector>) -> SubdissectorId {
        self.subdissectors.register(dissector)
    }

    /// Select the decoder seeded onto VC 0 of calls opened after this point
    /// (typically the H.245 control-channel decoder).
    pub fn set_control_subdissector(&mut self, id: SubdissectorId) {
        self.control_subdissector = Some(id);
    }

    /// Open (or find) the call for a transport association.
    ///
    /// Seeds multiplex code 0 as "whole payload is VC 0" and VC 0 as a
    /// segmentable AL1 control channel in both directions, so the control
    /// channel decodes before any signaling is seen. Levels 0 and 3 are
    /// rejected here, once, rather than deep in the delineator.
    pub fn open_call(&mut self, key: CallKey, level: H223Level) -> Result<CallId> {
        match level {
            H223Level::Level0 => return Err(SessionError::UnsupportedLevel.into()),
            H223Level::Level3 => return Err(SessionError::UnimplementedLevel.into()),
            H223Level::Level1 | H223Level::Level2 => {}
        }
        let (call, _) = self.circuits.lookup_or_create_call(key);
        if self.calls.contains_key(&call) {
            return Ok(call);
        }

        let vc0 = self.circuits.lookup_or_create_subcircuit(call, 0);
        let seed_key = VersionKey {
            frame: 0,
            pdu_offset: 0,
        };
        for direction in [Direction::Forward, Direction::Reverse] {
            self.store
                .set_mux_entry(
                    call,
                    direction,
                    0,
                    MuxTableEntry::Leaf {
                        vc: 0,
                        repeat_count: 0,
                    },
                    seed_key,
                )
                .map_err(Error::from)?;
            self.store
                .set_lc_params(
                    vc0,
                    direction,
                    LogicalChannelParams {
                        al_type: AlType::Al1Framed,
                        segmentable: true,
                        subdissector: self.control_subdissector,
                    },
                    seed_key,
                )
                .map_err(Error::from)?;
        }

        self.calls.insert(
            call,
            CallRecord {
                level,
                directions: [
                    DirectionState {
                        delineator: Delineator::new(level),
                        last_frame: None,
                    },
                    DirectionState {
                        delineator: Delineator::new(level),
                        last_frame: None,
                    },
                ],
                stats: CallStats::default(),
            },
        );
        debug!(call = call.0, ?level, "call opened");
        Ok(call)
    }

    /// Signaling entry point: rebind a multiplex code from `frame` onward.
    pub fn on_multiplex_table_update(
        &mut self,
        call: CallId,
        direction: Direction,
        code: u8,
        entry: MuxTableEntry,
        frame: u64,
    ) -> Result<()> {
        if !self.calls.contains_key(&call) {
            return Err(SessionError::UnknownCall(call.0).into());
        }
        self.store
            .set_mux_entry(
                call,
                direction,
                code,
                entry,
                VersionKey {
                    frame,
                    pdu_offset: 0,
                },
            )
            .map_err(Error::from)
    }

    /// Signaling entry point: a logical channel opened with these parameters
    /// from `frame` onward.
    pub fn on_logical_channel_open(
        &mut self,
        call: CallId,
        vc: u16,
        direction: Direction,
        params: LogicalChannelParams,
        frame: u64,
    ) -> Result<()> {
        if !self.calls.contains_key(&call) {
            return Err(SessionError::UnknownCall(call.0).into());
        }
        if let Some(id) = params.subdissector {
            if self.subdissectors.get(id).is_none() {
                return Err(SessionError::UnknownSubdissector(id.0).into());
            }
        }
        let subcircuit = self.circuits.lookup_or_create_subcircuit(call, vc);
        self.store
            .set_lc_params(
                subcircuit,
                direction,
                params,
                VersionKey {
                    frame,
                    pdu_offset: 0,
                },
            )
            .map_err(Error::from)
    }

    /// Dissect one chunk of captured stream bytes for a call direction.
    ///
    /// Frames must arrive in non-decreasing order per (call, direction);
    /// regression is a caller bug surfaced as an error, never absorbed into
    /// the versioned state.
    pub fn dissect(
        &mut self,
        call: CallId,
        direction: Direction,
        frame: u64,
        bytes: &[u8],
    ) -> Result<DissectOutput> {
        let record = self
            .calls
            .get_mut(&call)
            .ok_or(SessionError::UnknownCall(call.0))?;
        let dir_state = &mut record.directions[direction.index()];

        if let Some(last) = dir_state.last_frame {
            if frame < last {
                return Err(SessionError::FrameRegression { frame, latest: last }.into());
            }
        }
        dir_state.last_frame = Some(frame);

        let raw_pdus = dir_state.delineator.push(bytes);
        let need_more = match dir_state.delineator.pending() {
            0 => None,
            _ => Some(dir_state.delineator.needed()),
        };
        let level = record.level;

        let mut output = DissectOutput {
            need_more,
            ..Default::default()
        };

        let mut stats = CallStats::default();
        for raw in &raw_pdus {
            let pdu = decode_mux_pdu(level, raw, &self.store, call, direction, frame);

            stats.pdus += 1;
            if pdu.stuffing {
                stats.stuffing_pdus += 1;
            }
            stats.fragments += pdu.fragments.len() as u64;

            for fragment in &pdu.fragments {
                let delivery = self.deliver_fragment(
                    call,
                    direction,
                    frame,
                    raw.stream_offset,
                    &raw.bytes[fragment.range.clone()],
                    fragment,
                    &mut output.diagnostics,
                );
                if let Some(delivery) = delivery {
                    stats.deliveries += 1;
                    if delivery.crc_ok == Some(false) {
                        stats.crc_failures += 1;
                    }
                    output.deliveries.push(delivery);
                }
            }

            output.pdus.push(pdu);
        }

        if let Some(record) = self.calls.get_mut(&call) {
            record.stats.pdus += stats.pdus;
            record.stats.stuffing_pdus += stats.stuffing_pdus;
            record.stats.fragments += stats.fragments;
            record.stats.deliveries += stats.deliveries;
            record.stats.crc_failures += stats.crc_failures;
        }

        Ok(output)
    }

    fn deliver_fragment(
        &mut self,
        call: CallId,
        direction: Direction,
        frame: u64,
        pdu_offset: usize,
        data: &[u8],
        fragment: &VcFragment,
        diagnostics: &mut SmallVec<[Diagnostic; 2]>,
    ) -> Option<Delivery> {
        let subcircuit = self
            .circuits
            .lookup_or_create_subcircuit(call, fragment.vc);
        let lookup_key = VersionKey {
            frame,
            pdu_offset,
        };

        let params = match self.store.get_lc_params(subcircuit, direction, lookup_key) {
            Some(params) => params.clone(),
            None => {
                // No channel open: the bytes are still surfaced, raw.
                diagnostics.push(Diagnostic::NoChannelParams {
                    vc: fragment.vc,
                    frame,
                });
                return Some(Delivery {
                    subcircuit,
                    vc: fragment.vc,
                    direction,
                    frame,
                    al_type: None,
                    seq: None,
                    crc_ok: None,
                    payload: data.to_vec(),
                    handled_by: None,
                });
            }
        };

        let fragment_key = FragmentKey {
            frame,
            stream_offset: pdu_offset + fragment.range.start,
        };
        let sdu = self.reassembler.process_fragment(
            subcircuit,
            direction,
            fragment_key,
            data,
            fragment.last,
            &params,
            diagnostics,
        )?;

        let context = DeliveryContext {
            call,
            subcircuit,
            vc: fragment.vc,
            direction,
            frame,
        };
        let handled_by = params
            .subdissector
            .and_then(|id| self.subdissectors.get(id))
            .map(|d| {
                d.dissect(&sdu.payload, &context);
                d.name()
            });

        Some(Delivery {
            subcircuit,
            vc: fragment.vc,
            direction,
            frame,
            al_type: Some(sdu.al_type),
            seq: sdu.seq,
            crc_ok: sdu.crc_ok,
            payload: sdu.payload,
            handled_by,
        })
    }

    /// Accounting for one call across both directions.
    pub fn call_stats(&self, call: CallId) -> Option<CallStats> {
        self.calls.get(&call).map(|c| c.stats)
    }

    /// The session's circuit registry, for identity queries.
    pub fn circuits(&self) -> &CircuitRegistry {
        &self.circuits
    }

    /// The versioned state store, for direct inspection.
    pub fn state(&self) -> &StateStore {
        &self.store
    }

    /// Configured reassembly bound.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}
