//! Call and sub-circuit identity allocation.
//!
//! A call is one end-to-end H.223 session, keyed by its transport
//! association. Every virtual circuit inside a call gets a synthetic
//! "sub-circuit" id, stable for the life of the capture, so per-VC reassembly
//! buffers and logical-channel history can be keyed independently of which
//! call they came from.
//!
//! The registry is owned by one dissection session and passed by handle; it
//! is never a process-wide global. Ids are allocated monotonically and never
//! recycled mid-capture. There is no removal API: lifetime is the capture.

use std::collections::HashMap;
use std::net::SocketAddr;

use crate::state::Direction;

/// Identity of one H.223 call within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(pub u32);

/// Synthetic global identity of one (call, virtual circuit) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubCircuitId(pub u32);

/// Transport protocol carrying the H.223 byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportProtocol {
    Tcp,
    /// RTP-like datagram transport.
    Rtp,
}

/// Transport-level association identifying a call, as seen on one packet.
///
/// The connection-oriented form is normalized internally: both orientations
/// of one connection resolve to the same call, and the first-seen source
/// endpoint becomes the canonical forward direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKey {
    /// Externally supplied circuit id (multiplexed tunnel transports). The
    /// tunnel layer supplies direction separately.
    Tunnel { circuit_id: u32 },
    /// Connection-oriented transport endpoints, in packet order.
    Connection {
        src: SocketAddr,
        dst: SocketAddr,
        proto: TransportProtocol,
    },
}

/// Orientation-free map key: connection endpoints in a fixed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CanonicalKey {
    Tunnel {
        circuit_id: u32,
    },
    Connection {
        lo: SocketAddr,
        hi: SocketAddr,
        proto: TransportProtocol,
    },
}

impl CallKey {
    fn canonical(self) -> CanonicalKey {
        match self {
            CallKey::Tunnel { circuit_id } => CanonicalKey::Tunnel { circuit_id },
            CallKey::Connection { src, dst, proto } => {
                let (lo, hi) = if src <= dst { (src, dst) } else { (dst, src) };
                CanonicalKey::Connection { lo, hi, proto }
            }
        }
    }

    fn source(self) -> Option<SocketAddr> {
        match self {
            CallKey::Tunnel { .. } => None,
            CallKey::Connection { src, .. } => Some(src),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CallEntry {
    id: CallId,
    /// Source endpoint of the first packet seen; defines `Forward`.
    first_src: Option<SocketAddr>,
}

/// Session-scoped registry of calls and sub-circuits.
#[derive(Debug, Default)]
pub struct CircuitRegistry {
    calls: HashMap<CanonicalKey, CallEntry>,
    subcircuits: HashMap<(CallId, u16), SubCircuitId>,
    next_call: u32,
    next_subcircuit: u32,
}

impl CircuitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the call for a transport association, creating it on first
    /// sight, and resolve the packet's direction within it.
    ///
    /// Idempotent: the same connection always yields the same id whichever
    /// way round its endpoints appear. The first-seen source endpoint is
    /// `Forward`; the swapped tuple maps to the same call as `Reverse`.
    /// Tunnel keys carry no orientation and resolve `Forward`.
    pub fn lookup_or_create_call(&mut self, key: CallKey) -> (CallId, Direction) {
        let canonical = key.canonical();
        let src = key.source();
        if let Some(entry) = self.calls.get(&canonical) {
            let direction = match (entry.first_src, src) {
                (Some(first), Some(now)) if first != now => Direction::Reverse,
                _ => Direction::Forward,
            };
            return (entry.id, direction);
        }
        let id = CallId(self.next_call);
        self.next_call += 1;
        self.calls.insert(canonical, CallEntry { id, first_src: src });
        tracing::debug!(call = id.0, ?key, "new call");
        (id, Direction::Forward)
    }

    /// Look up the sub-circuit for a (call, VC) pair, creating it on first
    /// sight. Same pair always yields the same id; ids are never reused.
    pub fn lookup_or_create_subcircuit(&mut self, call: CallId, vc: u16) -> SubCircuitId {
        if let Some(&id) = self.subcircuits.get(&(call, vc)) {
            return id;
        }
        let id = SubCircuitId(self.next_subcircuit);
        self.next_subcircuit += 1;
        self.subcircuits.insert((call, vc), id);
        tracing::trace!(call = call.0, vc, subcircuit = id.0, "new sub-circuit");
        id
    }

    /// Number of calls seen so far.
    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    /// Number of sub-circuits allocated so far.
    pub fn subcircuit_count(&self) -> usize {
        self.subcircuits.len()
    }
}
