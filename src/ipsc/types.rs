//! Wire-format constants and small shared enums.
//!
//! # Design goals
//!
//! - Every mask used by [`crate::ipsc::codec`] lives in exactly one
//!   place so the MODE/FLAGS encoding and decoding paths can never
//!   drift apart.
//! - Opcode bytes are a closed, 11-entry set (spec'd as `Opcode`); an
//!   unrecognized byte is a data error, not a panic.

/// Our own radio mode: this link node always presents itself as a
/// digital repeater link, never analog or unmodulated.
pub const NOISE_MODE: u8 = MODE_DIGITAL;

// --- MODE byte masks -------------------------------------------------

pub const PEER_OP_MSK: u8 = 0x40;
pub const PEER_MODE_MSK: u8 = 0x03;
pub const MODE_NO_RADIO: u8 = 0x00;
pub const MODE_ANALOG: u8 = 0x01;
pub const MODE_DIGITAL: u8 = 0x02;
pub const MODE_UNKNOWN: u8 = 0x03;
pub const IPSC_TS1_MSK: u8 = 0x04;
pub const IPSC_TS2_MSK: u8 = 0x08;

// --- FLAGS word masks (4 bytes, big-endian on the wire) --------------

pub const CSBK_MSK: u32 = 0x0000_1000;
pub const RPT_MON_MSK: u32 = 0x0000_8000;
pub const CON_APP_MSK: u32 = 0x0000_0200;
pub const XNL_STAT_MSK: u32 = 0x0000_0080;
pub const XNL_MSTR_MSK: u32 = 0x0000_0040;
pub const XNL_SLAVE_MSK: u32 = 0x0000_0020;
pub const PKT_AUTH_MSK: u32 = 0x0000_0010;
pub const DATA_CALL_MSK: u32 = 0x0000_0008;
pub const VOICE_CALL_MSK: u32 = 0x0000_0004;
pub const MSTR_PEER_MSK: u32 = 0x0000_0001;

/// FLAGS value this node advertises when auth is disabled.
pub const FLAGS_NO_AUTH: u32 = DATA_CALL_MSK | VOICE_CALL_MSK;
/// FLAGS value this node advertises when auth is enabled.
pub const FLAGS_AUTH: u32 = FLAGS_NO_AUTH | PKT_AUTH_MSK;

// --- USER_PACKETS call-info byte masks -------------------------------

pub const TS_CALL_MSK: u8 = 0x40;
pub const END_MSK: u8 = 0x80;

// --- Authentication ----------------------------------------------------

/// Length, in bytes, of the truncated HMAC-SHA1 trailer appended to
/// every authenticated datagram.
pub const AUTH_HASH_LEN: usize = 10;

// --- Timing / capacity constants --------------------------------------

/// Master role considers a peer stale if no datagram has been heard
/// from it for this long, independent of the peer's own miss counter.
pub const MASTER_PEER_STALE_SECS: u64 = 120;

/// A system operates as either a peer (registers with a remote
/// master) or a master (accepts registrations from many peers).
/// spec.md keeps these as a single dispatcher branched on role rather
/// than two fully distinct types; see DESIGN.md for the rationale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Peer,
    Master,
}

/// Connection lifecycle of a peer as seen by a master or sibling, or
/// of the configured master as seen by a peer.
///
/// ```text
///  This system's view of its master:     This system's view of a sibling peer:
///
///  [Unregistered] --MASTER_REG_REQ-->     [Unregistered] --PEER_REG_REQ-->
///       |                                      |
///       v                                      v
///  [AwaitingRegReply]                     [AwaitingRegReply]
///       |  MASTER_REG_REPLY ok                 |  PEER_REG_REPLY ok
///       v                                      v
///  [Registered] <--keep-alive OK-->       [Registered] <--keep-alive OK-->
///       |  max_missed misses reached           |  max_missed misses reached
///       v                                      v
///  [Unregistered] (re-registers)          (removed from PEERS — evicted)
/// ```
///
/// A peer directly admitted by registration (a master's own `PEERS`
/// entry, or a sibling's entry created via `MASTER_REG_REQ`/
/// `PEER_REG_REQ`) starts `Registered` immediately; an entry learned
/// passively from a `PEER_LIST_REPLY` starts `Unregistered` and must
/// complete its own `PEER_REG_REQ`/`PEER_REG_REPLY` handshake before
/// this system will send it keep-alives — see
/// [`crate::ipsc::peer::PeerState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Unregistered,
    AwaitingRegReply,
    Registered,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_constants_match_spec_literals() {
        assert_eq!(FLAGS_NO_AUTH, 0x0000_000C);
        assert_eq!(FLAGS_AUTH, 0x0000_001C);
    }
}
