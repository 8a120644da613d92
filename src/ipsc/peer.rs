//! Per-connection state: a record of one other party in this system's
//! IPSC network ([`PeerState`]), and a peer role's view of its single
//! configured master ([`MasterState`]).
//!
//! `PeerState` does double duty: a master's view of each registered
//! peer, and (since a peer role also tracks the other members of its
//! own peer list) a peer's view of each sibling it knows about. Both
//! carry the same `status` shape spec.md §3 gives `PEERS` entries —
//! `conn`/`outstanding`/`missed`/`received` drive the UNKNOWN →
//! REGISTERING → CONNECTED state machine for siblings, and sit at a
//! permanent `Registered` for a master's directly-admitted peers.
//!
//! `MasterState` stays a separate type rather than folding into
//! `PeerState`: it additionally tracks the bootstrap fields
//! (`num_peers`, `peer_list_received`) that only apply to the single
//! master a peer role registers with, and its `radio_id` is learned
//! asynchronously (`None` until the first reply) where a `PeerState`
//! always knows its radio ID up front.

use std::net::Ipv4Addr;

use super::codec::{decode_flags, decode_mode, DecodedFlags, DecodedMode};
use super::types::ConnState;
use crate::types::{now, RadioId};

/// A record of one other party: a master's registered peer, or a
/// sibling peer learned from a peer-list reply.
#[derive(Debug, Clone)]
pub struct PeerState {
    pub radio_id: RadioId,
    pub ip: Ipv4Addr,
    pub port: u16,
    pub mode: u8,
    pub flags: u32,
    pub registered_at: u64,
    pub last_contact: u64,
    pub conn: ConnState,
    pub outstanding: u32,
    pub missed: u32,
    pub received: u32,
}

impl PeerState {
    /// A peer admitted by direct registration (it sent us
    /// `MASTER_REG_REQ`/`PEER_REG_REQ` and we replied): starts
    /// `Registered` with a clean status.
    pub fn new(radio_id: RadioId, ip: Ipv4Addr, port: u16, mode: u8, flags: u32) -> PeerState {
        let ts = now();
        PeerState {
            radio_id,
            ip,
            port,
            mode,
            flags,
            registered_at: ts,
            last_contact: ts,
            conn: ConnState::Registered,
            outstanding: 0,
            missed: 0,
            received: 0,
        }
    }

    /// A sibling learned passively from a `PEER_LIST_REPLY`: known to
    /// exist, not yet registered with directly (spec.md §3: "created
    /// on receipt of a peer-list entry ... status zeroed"). Its mode
    /// and flags are unknown until the first `PEER_ALIVE_REQ` exchange
    /// reports them.
    pub fn from_peer_list(radio_id: RadioId, ip: Ipv4Addr, port: u16, mode: u8) -> PeerState {
        PeerState {
            radio_id,
            ip,
            port,
            mode,
            flags: 0,
            registered_at: 0,
            last_contact: 0,
            conn: ConnState::Unregistered,
            outstanding: 0,
            missed: 0,
            received: 0,
        }
    }

    pub fn decoded_mode(&self) -> DecodedMode {
        decode_mode(self.mode)
    }

    pub fn decoded_flags(&self) -> DecodedFlags {
        decode_flags(self.flags)
    }

    /// Record a datagram received from this peer: clears its
    /// staleness clock and outstanding keep-alive count. Called on
    /// *any* inbound frame, not only explicit keep-alive replies
    /// (spec.md §3's reset-on-activity invariant).
    pub fn note_activity(&mut self) {
        self.outstanding = 0;
        self.missed = 0;
        self.last_contact = now();
    }

    /// Has this peer gone silent for longer than `stale_after_secs`?
    pub fn is_stale(&self, stale_after_secs: u64) -> bool {
        now().saturating_sub(self.last_contact) > stale_after_secs
    }

    /// About to send this peer a keep-alive request: if the previous
    /// one was never acknowledged, that's a miss. Returns the new
    /// miss count.
    pub fn begin_keepalive(&mut self) -> u32 {
        if self.outstanding > 0 {
            self.missed += 1;
        }
        self.outstanding += 1;
        self.missed
    }

    pub fn has_exceeded_misses(&self, max_missed: u32) -> bool {
        self.missed >= max_missed
    }

    /// `PEER_REG_REPLY` received: this sibling is now connected.
    pub fn mark_registered(&mut self) {
        self.conn = ConnState::Registered;
        self.note_activity();
    }
}

/// A peer's record of the single master it registers with.
#[derive(Debug, Clone)]
pub struct MasterState {
    pub conn: ConnState,
    pub ip: Ipv4Addr,
    pub port: u16,
    /// Learned from the first `MASTER_REG_REPLY`; `None` until then.
    pub radio_id: Option<RadioId>,
    pub mode: u8,
    pub flags: u32,
    pub outstanding: u32,
    pub missed: u32,
    pub last_contact: u64,
    /// Learned from `MASTER_REG_REPLY`'s numPeers field; drives
    /// whether step 3 of the peer-role tick needs a `PEER_LIST_REQ`
    /// (spec.md §4.5).
    pub num_peers: Option<u16>,
    pub peer_list_received: bool,
}

impl MasterState {
    pub fn new(ip: Ipv4Addr, port: u16) -> MasterState {
        MasterState {
            conn: ConnState::Unregistered,
            ip,
            port,
            radio_id: None,
            mode: 0,
            flags: 0,
            outstanding: 0,
            missed: 0,
            last_contact: 0,
            num_peers: None,
            peer_list_received: false,
        }
    }

    pub fn decoded_mode(&self) -> DecodedMode {
        decode_mode(self.mode)
    }

    pub fn decoded_flags(&self) -> DecodedFlags {
        decode_flags(self.flags)
    }

    /// Called on every datagram received from the master: clears the
    /// miss counter and outstanding-request flag regardless of which
    /// opcode arrived (spec.md §3's reset-on-activity invariant).
    pub fn note_activity(&mut self) {
        self.outstanding = 0;
        self.missed = 0;
        self.last_contact = now();
    }

    pub fn mark_registered(&mut self, radio_id: RadioId, mode: u8, flags: u32, num_peers: Option<u16>) {
        self.conn = ConnState::Registered;
        self.radio_id = Some(radio_id);
        self.mode = mode;
        self.flags = flags;
        self.num_peers = num_peers;
        self.peer_list_received = false;
        self.note_activity();
    }

    /// About to send a keep-alive request: if the previous one was
    /// never acknowledged, that's a miss. Returns the new miss count.
    pub fn begin_keepalive(&mut self) -> u32 {
        if self.outstanding > 0 {
            self.missed += 1;
        }
        self.outstanding += 1;
        self.missed
    }

    pub fn has_exceeded_misses(&self, max_missed: u32) -> bool {
        self.missed >= max_missed
    }

    pub fn reset_to_unregistered(&mut self) {
        self.conn = ConnState::Unregistered;
        self.outstanding = 0;
        self.missed = 0;
        self.num_peers = None;
        self.peer_list_received = false;
    }
}
