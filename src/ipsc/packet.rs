//! Packet schema: opcode bytes, classification, and the small set of
//! structured payloads the dispatcher needs to build or parse
//! (peer-list entries, user-traffic call headers). Everything else
//! (XCMP/XNL tunneling, call-monitor frames, repeater wake-up) is
//! treated as an opaque payload and handed to the host application
//! unparsed, per spec.md §4.3.

use std::net::Ipv4Addr;

use super::codec;
use super::types::{END_MSK, TS_CALL_MSK};
use crate::types::RadioId;

/// The closed set of registration/keep-alive control opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    MasterRegReq,
    MasterRegReply,
    MasterAliveReq,
    MasterAliveReply,
    PeerListReq,
    PeerListReply,
    PeerRegReq,
    PeerRegReply,
    PeerAliveReq,
    PeerAliveReply,
    DeRegReq,
    DeRegReply,
}

impl Opcode {
    pub const MASTER_REG_REQ: u8 = 0x00;
    pub const MASTER_REG_REPLY: u8 = 0x01;
    pub const MASTER_ALIVE_REQ: u8 = 0x05;
    pub const MASTER_ALIVE_REPLY: u8 = 0x06;
    pub const PEER_LIST_REQ: u8 = 0x02;
    pub const PEER_LIST_REPLY: u8 = 0x03;
    pub const PEER_REG_REQ: u8 = 0x0B;
    pub const PEER_REG_REPLY: u8 = 0x0C;
    pub const PEER_ALIVE_REQ: u8 = 0x07;
    pub const PEER_ALIVE_REPLY: u8 = 0x08;
    pub const DE_REG_REQ: u8 = 0x09;
    pub const DE_REG_REPLY: u8 = 0x0A;

    pub fn from_byte(byte: u8) -> Option<Opcode> {
        Some(match byte {
            Self::MASTER_REG_REQ => Opcode::MasterRegReq,
            Self::MASTER_REG_REPLY => Opcode::MasterRegReply,
            Self::MASTER_ALIVE_REQ => Opcode::MasterAliveReq,
            Self::MASTER_ALIVE_REPLY => Opcode::MasterAliveReply,
            Self::PEER_LIST_REQ => Opcode::PeerListReq,
            Self::PEER_LIST_REPLY => Opcode::PeerListReply,
            Self::PEER_REG_REQ => Opcode::PeerRegReq,
            Self::PEER_REG_REPLY => Opcode::PeerRegReply,
            Self::PEER_ALIVE_REQ => Opcode::PeerAliveReq,
            Self::PEER_ALIVE_REPLY => Opcode::PeerAliveReply,
            Self::DE_REG_REQ => Opcode::DeRegReq,
            Self::DE_REG_REPLY => Opcode::DeRegReply,
            _ => return None,
        })
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Opcode::MasterRegReq => Self::MASTER_REG_REQ,
            Opcode::MasterRegReply => Self::MASTER_REG_REPLY,
            Opcode::MasterAliveReq => Self::MASTER_ALIVE_REQ,
            Opcode::MasterAliveReply => Self::MASTER_ALIVE_REPLY,
            Opcode::PeerListReq => Self::PEER_LIST_REQ,
            Opcode::PeerListReply => Self::PEER_LIST_REPLY,
            Opcode::PeerRegReq => Self::PEER_REG_REQ,
            Opcode::PeerRegReply => Self::PEER_REG_REPLY,
            Opcode::PeerAliveReq => Self::PEER_ALIVE_REQ,
            Opcode::PeerAliveReply => Self::PEER_ALIVE_REPLY,
            Opcode::DeRegReq => Self::DE_REG_REQ,
            Opcode::DeRegReply => Self::DE_REG_REPLY,
        }
    }
}

/// User-traffic and opaque classes, identified by the same
/// leading-byte discriminator as the control opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserClass {
    GroupVoice,
    PrivateVoice,
    GroupData,
    PrivateData,
    RptWakeUp,
    XcmpXnl,
    CallMonStatus,
    CallMonRpt,
    CallMonNack,
}

impl UserClass {
    pub const GROUP_VOICE: u8 = 0x80;
    pub const PRIVATE_VOICE: u8 = 0x81;
    pub const GROUP_DATA: u8 = 0x83;
    pub const PRIVATE_DATA: u8 = 0x84;
    pub const RPT_WAKE_UP: u8 = 0x85;
    pub const XCMP_XNL: u8 = 0x90;
    pub const CALL_MON_STATUS: u8 = 0x91;
    pub const CALL_MON_RPT: u8 = 0x92;
    pub const CALL_MON_NACK: u8 = 0x93;

    pub fn from_byte(byte: u8) -> Option<UserClass> {
        Some(match byte {
            Self::GROUP_VOICE => UserClass::GroupVoice,
            Self::PRIVATE_VOICE => UserClass::PrivateVoice,
            Self::GROUP_DATA => UserClass::GroupData,
            Self::PRIVATE_DATA => UserClass::PrivateData,
            Self::RPT_WAKE_UP => UserClass::RptWakeUp,
            Self::XCMP_XNL => UserClass::XcmpXnl,
            Self::CALL_MON_STATUS => UserClass::CallMonStatus,
            Self::CALL_MON_RPT => UserClass::CallMonRpt,
            Self::CALL_MON_NACK => UserClass::CallMonNack,
            _ => return None,
        })
    }

    fn is_voice_or_data(self) -> bool {
        matches!(
            self,
            UserClass::GroupVoice
                | UserClass::PrivateVoice
                | UserClass::GroupData
                | UserClass::PrivateData
        )
    }
}

/// What a datagram's leading byte resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Control(Opcode),
    User(UserClass),
    Unknown(u8),
}

pub fn classify(byte: u8) -> PacketKind {
    if let Some(op) = Opcode::from_byte(byte) {
        PacketKind::Control(op)
    } else if let Some(class) = UserClass::from_byte(byte) {
        PacketKind::User(class)
    } else {
        PacketKind::Unknown(byte)
    }
}

/// Which source check a given packet kind requires before the
/// dispatcher will act on it (spec.md §4.6's `ANY_PEER_REQUIRED` /
/// `PEER_REQUIRED` / `MASTER_REQUIRED` classes).
///
/// `AnyKnown` implements the documented OR-semantics: the frame is
/// accepted if the source radio ID is *either* a registered peer *or*
/// the system's configured master — not only when both checks pass.
/// `None` covers the handful of opcodes spec.md handles outside those
/// three classes entirely (the registration requests that create a
/// `PEERS` entry in the first place, and `MASTER_REG_REPLY`, whose own
/// source can't be checked against an identity it is itself reporting
/// for the first time).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRequirement {
    /// No prior registration needed.
    None,
    /// Source must be the system's configured master (peer role).
    MasterOnly,
    /// Source must already be in the `PEERS` map.
    PeerOnly,
    /// Source must be a known peer OR the valid master.
    AnyKnown,
}

pub fn source_requirement(kind: PacketKind) -> SourceRequirement {
    match kind {
        PacketKind::Control(op) => match op {
            Opcode::MasterRegReq
            | Opcode::PeerListReq
            | Opcode::MasterRegReply
            | Opcode::MasterAliveReq => SourceRequirement::None,
            // PEER_REQUIRED: source must already be a known peer.
            Opcode::PeerRegReq | Opcode::PeerRegReply | Opcode::PeerAliveReq | Opcode::PeerAliveReply => {
                SourceRequirement::PeerOnly
            }
            // MASTER_REQUIRED: source must be the configured master.
            Opcode::MasterAliveReply | Opcode::PeerListReply => SourceRequirement::MasterOnly,
            // ANY_PEER_REQUIRED.
            Opcode::DeRegReq | Opcode::DeRegReply => SourceRequirement::AnyKnown,
        },
        // USER_PACKETS ⊂ ANY_PEER_REQUIRED.
        PacketKind::User(_) => SourceRequirement::AnyKnown,
        // Dialect drift: observed regardless of source so the host can
        // see it, never gated.
        PacketKind::Unknown(_) => SourceRequirement::None,
    }
}

/// An 11-byte peer-list entry: 4-byte radio ID, 4-byte IP, 2-byte
/// port, 1-byte mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerListEntry {
    pub radio_id: RadioId,
    pub ip: Ipv4Addr,
    pub port: u16,
    pub mode: u8,
}

pub const PEER_LIST_ENTRY_LEN: usize = 11;

impl PeerListEntry {
    pub fn encode(&self) -> [u8; PEER_LIST_ENTRY_LEN] {
        let mut buf = [0u8; PEER_LIST_ENTRY_LEN];
        buf[0..4].copy_from_slice(&codec::radio_id_bytes(self.radio_id));
        buf[4..8].copy_from_slice(&codec::ip_to_hex4(self.ip));
        buf[8..10].copy_from_slice(&self.port.to_be_bytes());
        buf[10] = self.mode;
        buf
    }

    pub fn decode(bytes: &[u8]) -> Option<PeerListEntry> {
        if bytes.len() != PEER_LIST_ENTRY_LEN {
            return None;
        }
        Some(PeerListEntry {
            radio_id: codec::int_id(&bytes[0..4])?,
            ip: codec::hex4_to_ip(&bytes[4..8])?,
            port: u16::from_be_bytes([bytes[8], bytes[9]]),
            mode: bytes[10],
        })
    }
}

/// Encode a full `PEER_LIST_REPLY` body: opcode, then every entry
/// back to back.
pub fn encode_peer_list(entries: &[PeerListEntry]) -> Vec<u8> {
    let mut body = Vec::with_capacity(1 + entries.len() * PEER_LIST_ENTRY_LEN);
    body.push(Opcode::PeerListReply.to_byte());
    for entry in entries {
        body.extend_from_slice(&entry.encode());
    }
    body
}

/// Parse a `PEER_LIST_REPLY` body (opcode byte already stripped) into
/// its entries. Malformed trailing bytes that don't form a complete
/// entry are silently dropped, matching the original's tolerant
/// truncate-and-chunk parsing.
pub fn decode_peer_list(body: &[u8]) -> Vec<PeerListEntry> {
    body.chunks_exact(PEER_LIST_ENTRY_LEN)
        .filter_map(PeerListEntry::decode)
        .collect()
}

/// Parsed header of a `USER_PACKETS`-class frame (voice/data calls).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallHeader {
    pub src_subscriber: u32,
    pub dst_subscriber: u32,
    pub call_type: u8,
    pub timeslot: u8,
    pub call_end: bool,
}

/// Minimum frame length required to read a call header (offsets per
/// spec.md §4.3: src@6..9, dst@9..12, call_type@12, call_info@17).
pub const CALL_HEADER_MIN_LEN: usize = 18;

pub fn parse_call_header(frame: &[u8]) -> Option<CallHeader> {
    if frame.len() < CALL_HEADER_MIN_LEN {
        return None;
    }
    let src = u32::from_be_bytes([0, frame[6], frame[7], frame[8]]);
    let dst = u32::from_be_bytes([0, frame[9], frame[10], frame[11]]);
    let call_type = frame[12];
    let call_info = frame[17];
    Some(CallHeader {
        src_subscriber: src,
        dst_subscriber: dst,
        call_type,
        timeslot: if call_info & TS_CALL_MSK != 0 { 2 } else { 1 },
        call_end: call_info & END_MSK != 0,
    })
}

impl UserClass {
    /// Whether this class carries a [`CallHeader`] worth parsing (as
    /// opposed to being handed to the host opaque).
    pub fn has_call_header(self) -> bool {
        self.is_voice_or_data()
    }
}

/// Build a registration/keep-alive request body: opcode, radio ID,
/// mode byte, FLAGS word. Used for `MASTER_REG_REQ`, `PEER_REG_REQ`,
/// `MASTER_ALIVE_REQ`, and `PEER_ALIVE_REQ` — they share this layout.
pub fn encode_reg_or_alive(opcode: Opcode, radio_id: RadioId, mode: u8, flags: u32) -> Vec<u8> {
    let mut body = Vec::with_capacity(10);
    body.push(opcode.to_byte());
    body.extend_from_slice(&codec::radio_id_bytes(radio_id));
    body.push(mode);
    body.extend_from_slice(&codec::flags_to_bytes(flags));
    body
}

/// Parsed form of a registration/keep-alive request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegOrAlive {
    pub radio_id: RadioId,
    pub mode: u8,
    pub flags: u32,
}

pub fn decode_reg_or_alive(body: &[u8]) -> Option<RegOrAlive> {
    if body.len() < 10 {
        return None;
    }
    Some(RegOrAlive {
        radio_id: codec::int_id(&body[1..5])?,
        mode: body[5],
        flags: codec::flags_from_bytes(&body[6..10])?,
    })
}

/// Build a `MASTER_REG_REPLY` / `PEER_REG_REPLY` body: opcode, radio
/// ID, mode, flags, and (for `MASTER_REG_REPLY` only) a trailing
/// 2-byte peer count.
pub fn encode_reg_reply(
    opcode: Opcode,
    radio_id: RadioId,
    mode: u8,
    flags: u32,
    num_peers: Option<u16>,
) -> Vec<u8> {
    let mut body = encode_reg_or_alive(opcode, radio_id, mode, flags);
    if let Some(n) = num_peers {
        body.extend_from_slice(&n.to_be_bytes());
    }
    body
}

/// Build a bare single-opcode-byte frame (`PEER_LIST_REQ`,
/// `DE_REG_REQ`, and similar requests that carry no body).
pub fn encode_bare(opcode: Opcode) -> Vec<u8> {
    vec![opcode.to_byte()]
}

/// Parsed form of a `MASTER_REG_REPLY` / `PEER_REG_REPLY` body. Only
/// `MASTER_REG_REPLY` carries the trailing `numPeers` field; it is
/// `None` when the body is too short to hold it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegReply {
    pub radio_id: RadioId,
    pub mode: u8,
    pub flags: u32,
    pub num_peers: Option<u16>,
}

pub fn decode_reg_reply(body: &[u8]) -> Option<RegReply> {
    let base = decode_reg_or_alive(body)?;
    let num_peers = (body.len() >= 12).then(|| u16::from_be_bytes([body[10], body[11]]));
    Some(RegReply {
        radio_id: base.radio_id,
        mode: base.mode,
        flags: base.flags,
        num_peers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_list_entry_round_trips() {
        let entry = PeerListEntry {
            radio_id: RadioId::from_u32(1002),
            ip: "10.0.0.5".parse().unwrap(),
            port: 50000,
            mode: 0x66,
        };
        let encoded = entry.encode();
        assert_eq!(encoded.len(), PEER_LIST_ENTRY_LEN);
        assert_eq!(PeerListEntry::decode(&encoded), Some(entry));
    }

    #[test]
    fn peer_list_round_trips_multiple_entries() {
        let entries = vec![
            PeerListEntry {
                radio_id: RadioId::from_u32(1001),
                ip: "10.0.0.1".parse().unwrap(),
                port: 50000,
                mode: 0x65,
            },
            PeerListEntry {
                radio_id: RadioId::from_u32(1002),
                ip: "10.0.0.2".parse().unwrap(),
                port: 50001,
                mode: 0x66,
            },
        ];
        let body = encode_peer_list(&entries);
        assert_eq!(body[0], Opcode::PeerListReply.to_byte());
        let decoded = decode_peer_list(&body[1..]);
        assert_eq!(decoded, entries);
    }

    #[test]
    fn decode_peer_list_drops_trailing_partial_entry() {
        let mut body = PeerListEntry {
            radio_id: RadioId::from_u32(1001),
            ip: "10.0.0.1".parse().unwrap(),
            port: 50000,
            mode: 0x65,
        }
        .encode()
        .to_vec();
        body.extend_from_slice(&[1, 2, 3]); // short trailing garbage
        assert_eq!(decode_peer_list(&body).len(), 1);
    }

    #[test]
    fn classify_recognizes_control_and_user_bytes() {
        assert_eq!(
            classify(Opcode::MASTER_REG_REQ),
            PacketKind::Control(Opcode::MasterRegReq)
        );
        assert_eq!(
            classify(UserClass::GROUP_VOICE),
            PacketKind::User(UserClass::GroupVoice)
        );
        assert_eq!(classify(0xFF), PacketKind::Unknown(0xFF));
    }

    #[test]
    fn source_requirement_any_known_is_or_not_and() {
        let req = source_requirement(PacketKind::User(UserClass::GroupVoice));
        assert_eq!(req, SourceRequirement::AnyKnown);
    }

    #[test]
    fn de_reg_req_is_any_peer_required_not_peer_only() {
        let req = source_requirement(PacketKind::Control(Opcode::DeRegReq));
        assert_eq!(req, SourceRequirement::AnyKnown);
    }

    #[test]
    fn peer_reg_req_requires_a_known_peer_source() {
        let req = source_requirement(PacketKind::Control(Opcode::PeerRegReq));
        assert_eq!(req, SourceRequirement::PeerOnly);
    }

    #[test]
    fn reg_or_alive_round_trips() {
        let body = encode_reg_or_alive(Opcode::PeerRegReq, RadioId::from_u32(1002), 0x66, 0x0C);
        assert_eq!(body[0], Opcode::PEER_REG_REQ);
        let parsed = decode_reg_or_alive(&body).unwrap();
        assert_eq!(parsed.radio_id, RadioId::from_u32(1002));
        assert_eq!(parsed.mode, 0x66);
        assert_eq!(parsed.flags, 0x0C);
    }

    #[test]
    fn reg_reply_round_trips_with_and_without_num_peers() {
        let body = encode_reg_reply(Opcode::MasterRegReply, RadioId::from_u32(9000), 0x65, 0x1C, Some(3));
        let parsed = decode_reg_reply(&body).unwrap();
        assert_eq!(parsed.radio_id, RadioId::from_u32(9000));
        assert_eq!(parsed.num_peers, Some(3));

        let body = encode_reg_reply(Opcode::PeerRegReply, RadioId::from_u32(1002), 0x66, 0x0C, None);
        let parsed = decode_reg_reply(&body).unwrap();
        assert_eq!(parsed.num_peers, None);
    }

    #[test]
    fn parse_group_voice_call_header() {
        // src=3001 (0x000BB9), dst=31337 (0x007A69), call_type group,
        // ts2 (TS_CALL_MSK set), not end-of-call.
        let mut frame = vec![0u8; CALL_HEADER_MIN_LEN];
        frame[0] = UserClass::GROUP_VOICE;
        frame[6..9].copy_from_slice(&3001u32.to_be_bytes()[1..]);
        frame[9..12].copy_from_slice(&31337u32.to_be_bytes()[1..]);
        frame[12] = 0x00;
        frame[17] = TS_CALL_MSK;
        let header = parse_call_header(&frame).unwrap();
        assert_eq!(header.src_subscriber, 3001);
        assert_eq!(header.dst_subscriber, 31337);
        assert_eq!(header.timeslot, 2);
        assert!(!header.call_end);
    }
}
