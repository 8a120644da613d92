//! Byte-level packing and unpacking: radio IDs, IP addresses, and the
//! MODE/FLAGS bitfields carried in every IPSC registration and
//! keep-alive frame.

use std::net::Ipv4Addr;

use super::types::{
    IPSC_TS1_MSK, IPSC_TS2_MSK, MODE_ANALOG, MODE_DIGITAL, MODE_NO_RADIO, MODE_UNKNOWN,
    PEER_MODE_MSK, PEER_OP_MSK,
};
use super::types::{
    CON_APP_MSK, CSBK_MSK, DATA_CALL_MSK, FLAGS_AUTH, FLAGS_NO_AUTH, MSTR_PEER_MSK, PKT_AUTH_MSK,
    RPT_MON_MSK, VOICE_CALL_MSK, XNL_MSTR_MSK, XNL_SLAVE_MSK, XNL_STAT_MSK,
};
use crate::types::RadioId;

/// Decoded radio mode carried in bits 0-1 of a MODE byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerMode {
    NoRadio,
    Analog,
    Digital,
    Unknown,
}

impl PeerMode {
    fn from_bits(bits: u8) -> PeerMode {
        match bits {
            MODE_NO_RADIO => PeerMode::NoRadio,
            MODE_ANALOG => PeerMode::Analog,
            MODE_DIGITAL => PeerMode::Digital,
            _ => PeerMode::Unknown,
        }
    }
}

/// Decoded form of a MODE byte (spec.md §4.1 `decodeMode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedMode {
    pub peer_operational: bool,
    pub peer_mode: PeerMode,
    pub ts1: bool,
    pub ts2: bool,
}

/// Decoded form of the 4-byte FLAGS word (spec.md §4.1 `decodeFlags`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedFlags {
    pub csbk: bool,
    pub rcm: bool,
    pub con_app: bool,
    pub xnl_conn: bool,
    pub xnl_master: bool,
    pub xnl_slave: bool,
    pub auth: bool,
    pub data: bool,
    pub voice: bool,
    pub master: bool,
}

/// Pack a radio ID into its 4-byte big-endian wire form.
pub fn radio_id_bytes(id: RadioId) -> [u8; 4] {
    *id.as_bytes()
}

/// Unpack a 4-byte big-endian radio ID.
pub fn int_id(bytes: &[u8]) -> Option<RadioId> {
    RadioId::from_bytes(bytes)
}

/// Pack an IPv4 address into 4 big-endian bytes, as used for
/// `MASTER_IP` fields on the wire.
pub fn ip_to_hex4(ip: Ipv4Addr) -> [u8; 4] {
    ip.octets()
}

/// Unpack 4 big-endian bytes into an IPv4 address.
pub fn hex4_to_ip(bytes: &[u8]) -> Option<Ipv4Addr> {
    if bytes.len() != 4 {
        return None;
    }
    Some(Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]))
}

/// Build the MODE byte this node advertises about itself.
pub fn encode_mode(ts1_link: bool, ts2_link: bool, peer_mode: u8) -> u8 {
    let mut byte = PEER_OP_MSK | (peer_mode & PEER_MODE_MSK);
    if ts1_link {
        byte |= IPSC_TS1_MSK;
    }
    if ts2_link {
        byte |= IPSC_TS2_MSK;
    }
    byte
}

/// Decode a MODE byte received from a peer or master.
pub fn decode_mode(byte: u8) -> DecodedMode {
    DecodedMode {
        peer_operational: byte & PEER_OP_MSK != 0,
        peer_mode: PeerMode::from_bits(byte & PEER_MODE_MSK),
        ts1: byte & IPSC_TS1_MSK != 0,
        ts2: byte & IPSC_TS2_MSK != 0,
    }
}

/// Build the FLAGS word this node advertises about itself.
pub fn encode_flags(auth_enabled: bool) -> u32 {
    if auth_enabled {
        FLAGS_AUTH
    } else {
        FLAGS_NO_AUTH
    }
}

/// Decode a 4-byte big-endian FLAGS word.
pub fn decode_flags(flags: u32) -> DecodedFlags {
    DecodedFlags {
        csbk: flags & CSBK_MSK != 0,
        rcm: flags & RPT_MON_MSK != 0,
        con_app: flags & CON_APP_MSK != 0,
        xnl_conn: flags & XNL_STAT_MSK != 0,
        xnl_master: flags & XNL_MSTR_MSK != 0,
        xnl_slave: flags & XNL_SLAVE_MSK != 0,
        auth: flags & PKT_AUTH_MSK != 0,
        data: flags & DATA_CALL_MSK != 0,
        voice: flags & VOICE_CALL_MSK != 0,
        master: flags & MSTR_PEER_MSK != 0,
    }
}

/// Pack a big-endian `u32` FLAGS word from its 4 wire bytes.
pub fn flags_from_bytes(bytes: &[u8]) -> Option<u32> {
    if bytes.len() != 4 {
        return None;
    }
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Unpack a FLAGS `u32` back into its 4 big-endian wire bytes.
pub fn flags_to_bytes(flags: u32) -> [u8; 4] {
    flags.to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_byte_round_trips_ts1_digital() {
        let byte = encode_mode(true, false, MODE_DIGITAL);
        let decoded = decode_mode(byte);
        assert!(decoded.peer_operational);
        assert_eq!(decoded.peer_mode, PeerMode::Digital);
        assert!(decoded.ts1);
        assert!(!decoded.ts2);
    }

    #[test]
    fn mode_byte_round_trips_ts2_analog() {
        let byte = encode_mode(false, true, MODE_ANALOG);
        let decoded = decode_mode(byte);
        assert_eq!(decoded.peer_mode, PeerMode::Analog);
        assert!(!decoded.ts1);
        assert!(decoded.ts2);
    }

    #[test]
    fn unknown_mode_bits_decode_as_unknown() {
        let decoded = decode_mode(PEER_OP_MSK | MODE_UNKNOWN);
        assert_eq!(decoded.peer_mode, PeerMode::Unknown);
    }

    #[test]
    fn flags_round_trip_auth_and_no_auth() {
        let no_auth = decode_flags(encode_flags(false));
        assert!(!no_auth.auth);
        assert!(no_auth.data);
        assert!(no_auth.voice);

        let auth = decode_flags(encode_flags(true));
        assert!(auth.auth);
        assert!(auth.data);
        assert!(auth.voice);
    }

    #[test]
    fn ip_round_trips_through_hex4() {
        let ip: Ipv4Addr = "10.1.2.3".parse().unwrap();
        let bytes = ip_to_hex4(ip);
        assert_eq!(hex4_to_ip(&bytes), Some(ip));
    }

    #[test]
    fn radio_id_round_trips_through_bytes() {
        let id = RadioId::from_u32(1001);
        let bytes = radio_id_bytes(id);
        assert_eq!(int_id(&bytes), Some(id));
    }
}
