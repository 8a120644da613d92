//! Inbound datagram handling.
//!
//! `handle_datagram` is the single entry point a system's run loop
//! calls for every UDP receive. It follows spec.md §4.6's ordering:
//!
//! 1. Verify (and strip) the authentication trailer.
//! 2. Drop empty frames.
//! 3. Classify the leading byte.
//! 4. Resolve the sender's radio ID: most frames embed it at bytes
//!    1..5, the handful of bare frames (`PEER_LIST_REQ`, `DE_REG_REQ`,
//!    `DE_REG_REPLY`) are matched against the UDP source address
//!    instead (see [`resolve_sender`]).
//! 5. Reset that sender's keep-alive/staleness clock on *any* frame,
//!    before opcode-specific handling — spec.md §3's reset-on-activity
//!    invariant applies independent of what the frame turns out to be.
//! 6. Gate on [`super::packet::SourceRequirement`]: every packet kind
//!    demands `None`/`PeerOnly`/`MasterOnly`/`AnyKnown` of its sender
//!    (see [`source_is_valid`]) before any opcode-specific handling or
//!    host callback runs.
//! 7. Branch on packet kind: control opcodes get specific per-opcode
//!    handling; user/opaque classes reach the host
//!    [`super::callbacks::IpscHandler`] directly, their source already
//!    validated by step 6.
//! 8. Unrecognized opcodes are reported via `unknown_message` rather
//!    than dropped silently, so the host can observe dialect drift.
//! 9. Any error along the way is logged and the datagram is dropped;
//!    the run loop is never interrupted by a single bad frame.

use std::net::{Ipv4Addr, SocketAddr};

use tracing::{debug, warn};

use super::auth::Authenticator;
use super::packet::{
    self, decode_peer_list, decode_reg_or_alive, decode_reg_reply, encode_peer_list,
    encode_reg_or_alive, encode_reg_reply, parse_call_header, Opcode, PacketKind, PeerListEntry,
    SourceRequirement, UserClass,
};
use super::peer::PeerState;
use super::state::System;
use super::types::ConnState;
use crate::error::IpscError;
use crate::types::RadioId;

pub async fn handle_datagram(system: &mut System, raw: &[u8], from: SocketAddr) {
    let body = match system.authenticator.verify(raw) {
        Some(body) => body,
        None => {
            warn!(system = %system.name, %from, "{}", IpscError::AuthFailure);
            return;
        }
    };

    if body.is_empty() {
        return;
    }

    let kind = packet::classify(body[0]);

    let embedded = if body.len() >= 5 {
        RadioId::from_bytes(&body[1..5])
    } else {
        None
    };
    let sender = resolve_sender(system, embedded, from);

    if let Some(id) = sender {
        note_activity(system, id);
    }

    if !source_is_valid(system, packet::source_requirement(kind), sender) {
        debug!(system = %system.name, %from, "{}", IpscError::UnknownSource);
        return;
    }

    match kind {
        PacketKind::Control(op) => handle_control(system, op, &body, from).await,
        PacketKind::User(class) => handle_user(system, class, sender, &body).await,
        PacketKind::Unknown(byte) => {
            let id = sender.unwrap_or(RadioId::ZERO);
            debug!(system = %system.name, opcode = format!("0x{byte:02x}"), "{}", IpscError::UnknownOpcode(byte));
            system.handler.unknown_message(&system.name, id, byte, &body);
        }
    }
}

/// Identify the frame's origin: most opcodes embed the sender's radio
/// ID at bytes 1..5, but the bare frames (`PEER_LIST_REQ`, `DE_REG_REQ`,
/// `DE_REG_REPLY`) carry no body at all, so their sender is recovered
/// from the UDP source address instead.
fn resolve_sender(system: &System, embedded: Option<RadioId>, from: SocketAddr) -> Option<RadioId> {
    if embedded.is_some() {
        return embedded;
    }
    let ip = ipv4_of(from);
    let port = from.port();
    if let Some((id, _)) = system.peers.iter().find(|(_, p)| p.ip == ip && p.port == port) {
        return Some(*id);
    }
    system
        .master
        .as_ref()
        .filter(|m| m.ip == ip && m.port == port)
        .and_then(|m| m.radio_id)
}

/// The generic gate behind [`super::packet::SourceRequirement`]: does
/// `sender` satisfy what this packet kind demands before the dispatcher
/// is willing to act on it?
fn source_is_valid(system: &System, requirement: SourceRequirement, sender: Option<RadioId>) -> bool {
    match requirement {
        SourceRequirement::None => true,
        SourceRequirement::PeerOnly => sender.is_some_and(|id| system.peers.contains_key(&id)),
        SourceRequirement::MasterOnly => {
            sender.is_some() && system.master.as_ref().and_then(|m| m.radio_id) == sender
        }
        SourceRequirement::AnyKnown => {
            sender.is_some_and(|id| system.peers.contains_key(&id))
                || (sender.is_some() && system.master.as_ref().and_then(|m| m.radio_id) == sender)
        }
    }
}

/// Reset keep-alive/staleness bookkeeping for whichever role this
/// system plays, independent of which opcode eventually gets parsed.
/// A system tracks liveness for its registered peers (master role, or
/// peer role watching its own siblings) *and* for its configured
/// master (peer role) at the same time, so both checks run.
fn note_activity(system: &mut System, sender: RadioId) {
    if let Some(peer) = system.peers.get_mut(&sender) {
        peer.note_activity();
    }
    if let Some(master) = system.master.as_mut() {
        if master.radio_id == Some(sender) {
            master.note_activity();
        }
    }
}

async fn handle_control(system: &mut System, op: Opcode, body: &[u8], from: SocketAddr) {
    match op {
        Opcode::MasterRegReq => master_reg_req(system, body, from).await,
        Opcode::MasterRegReply => master_reg_reply(system, body).await,
        Opcode::PeerListReq => peer_list_req(system, from).await,
        Opcode::PeerListReply => peer_list_reply(system, body),
        Opcode::PeerRegReq => peer_reg_req(system, body, from).await,
        Opcode::PeerRegReply => peer_reg_reply(system, body),
        Opcode::MasterAliveReq => master_alive_req(system, body, from).await,
        Opcode::MasterAliveReply => { /* handled by note_activity above */ }
        Opcode::PeerAliveReq => peer_alive_req(system, body, from).await,
        Opcode::PeerAliveReply => peer_alive_reply(system, body),
        Opcode::DeRegReq => de_reg_req(system, from),
        Opcode::DeRegReply => {}
    }
}

async fn master_reg_req(system: &mut System, body: &[u8], from: SocketAddr) {
    if !system.is_master() {
        return;
    }
    let Some(parsed) = decode_reg_or_alive(body) else {
        return;
    };
    let ip = ipv4_of(from);
    upsert_peer(system, parsed.radio_id, ip, from.port(), parsed.mode, parsed.flags);
    if let Some(peer) = system.peers.get(&parsed.radio_id) {
        debug!(system = %system.name, peer = %parsed.radio_id, mode = ?peer.decoded_mode(), flags = ?peer.decoded_flags(), "peer registered");
    }

    let own_id = system.config.radio_id;
    let reply = encode_reg_reply(
        Opcode::MasterRegReply,
        own_id,
        system.config.mode_byte(),
        system.config.flags_word(),
        Some(system.peers.len() as u16),
    );
    send(system, &reply, from).await;
}

async fn master_reg_reply(system: &mut System, body: &[u8]) {
    if system.is_master() {
        return;
    }
    let Some(parsed) = decode_reg_reply(body) else {
        return;
    };
    let Some(master) = system.master.as_mut() else {
        return;
    };
    if master.conn != ConnState::AwaitingRegReply && master.conn != ConnState::Registered {
        return;
    }
    master.mark_registered(parsed.radio_id, parsed.mode, parsed.flags, parsed.num_peers);
    debug!(system = %system.name, mode = ?master.decoded_mode(), flags = ?master.decoded_flags(), num_peers = ?master.num_peers, "registered with master");
}

async fn peer_list_req(system: &mut System, from: SocketAddr) {
    if !system.is_master() {
        return;
    }
    let entries: Vec<PeerListEntry> = system
        .peers
        .values()
        .map(|p| PeerListEntry {
            radio_id: p.radio_id,
            ip: p.ip,
            port: p.port,
            mode: p.mode,
        })
        .collect();
    let body = encode_peer_list(&entries);
    send(system, &body, from).await;
}

fn peer_list_reply(system: &mut System, body: &[u8]) {
    if system.is_master() || body.len() <= 1 {
        return;
    }
    // Reconciliation: every entry in the reply becomes/refreshes a
    // local peer record; the resulting map is a pure function of the
    // latest reply, so running it twice with the same input is a
    // no-op (idempotent). Our own entry is excluded — we track
    // ourselves implicitly, not as a member of our own peer map.
    let own_id = system.config.radio_id;
    let entries = decode_peer_list(&body[1..]);
    let mut seen = std::collections::HashSet::with_capacity(entries.len());
    for entry in entries.iter().filter(|e| e.radio_id != own_id) {
        seen.insert(entry.radio_id);
        system
            .peers
            .entry(entry.radio_id)
            .and_modify(|p| {
                p.ip = entry.ip;
                p.port = entry.port;
                p.mode = entry.mode;
            })
            .or_insert_with(|| PeerState::from_peer_list(entry.radio_id, entry.ip, entry.port, entry.mode));
    }
    system.peers.retain(|id, _| seen.contains(id));
    if let Some(master) = system.master.as_mut() {
        master.peer_list_received = true;
    }
}

/// `PEER_REG_REQ` is `PEER_REQUIRED` (spec.md §4.6): the source must
/// already be a known peer (admitted directly as a master's registrant,
/// or learned passively from a `PEER_LIST_REPLY`), so unlike
/// `MASTER_REG_REQ` this never creates a new entry — it only completes
/// that entry's own registration handshake.
async fn peer_reg_req(system: &mut System, body: &[u8], from: SocketAddr) {
    let Some(parsed) = decode_reg_or_alive(body) else {
        return;
    };
    if let Some(peer) = system.peers.get_mut(&parsed.radio_id) {
        peer.mode = parsed.mode;
        peer.flags = parsed.flags;
        peer.mark_registered();
    }
    let reply = encode_reg_reply(
        Opcode::PeerRegReply,
        system.config.radio_id,
        system.config.mode_byte(),
        system.config.flags_word(),
        None,
    );
    send(system, &reply, from).await;
}

/// `PEER_REG_REPLY`: our own `PEER_REG_REQ` to this sibling was
/// accepted — its side of the UNKNOWN → REGISTERING → CONNECTED
/// machine (spec.md §4.6) moves to connected.
fn peer_reg_reply(system: &mut System, body: &[u8]) {
    let Some(parsed) = decode_reg_or_alive(body) else {
        return;
    };
    if let Some(peer) = system.peers.get_mut(&parsed.radio_id) {
        peer.mode = parsed.mode;
        peer.flags = parsed.flags;
        peer.mark_registered();
    }
}

async fn master_alive_req(system: &mut System, body: &[u8], from: SocketAddr) {
    if !system.is_master() {
        return;
    }
    let Some(parsed) = decode_reg_or_alive(body) else {
        return;
    };
    if !system.peers.contains_key(&parsed.radio_id) {
        return;
    }
    let reply = encode_reg_or_alive(
        Opcode::MasterAliveReply,
        system.config.radio_id,
        system.config.mode_byte(),
        system.config.flags_word(),
    );
    send(system, &reply, from).await;
}

async fn peer_alive_req(system: &mut System, body: &[u8], from: SocketAddr) {
    if let Some(parsed) = decode_reg_or_alive(body) {
        if let Some(peer) = system.peers.get_mut(&parsed.radio_id) {
            peer.mode = parsed.mode;
            peer.flags = parsed.flags;
            peer.note_activity();
        }
    }
    let reply = encode_reg_or_alive(
        Opcode::PeerAliveReply,
        system.config.radio_id,
        system.config.mode_byte(),
        system.config.flags_word(),
    );
    send(system, &reply, from).await;
}

/// `PEER_ALIVE_REPLY`: count it (spec.md §3's `keepAlivesReceived`) in
/// addition to the generic activity reset already applied above.
fn peer_alive_reply(system: &mut System, body: &[u8]) {
    let Some(parsed) = decode_reg_or_alive(body) else {
        return;
    };
    if let Some(peer) = system.peers.get_mut(&parsed.radio_id) {
        peer.received += 1;
    }
}

/// `DE_REG_REQ`/`DE_REG_REPLY` are bare frames (spec.md §4.6): the
/// sender has no embedded radio ID, so it was already resolved from its
/// UDP source address by [`resolve_sender`]. Works identically for a
/// master removing a departing peer or a peer removing a departing
/// sibling (spec.md S6: "a receiving peer processes DE_REG_REQ by
/// removing the sender from its peer map").
fn de_reg_req(system: &mut System, from: SocketAddr) {
    let ip = ipv4_of(from);
    let port = from.port();
    let doomed: Vec<RadioId> = system
        .peers
        .iter()
        .filter(|(_, p)| p.ip == ip && p.port == port)
        .map(|(id, _)| *id)
        .collect();
    for id in doomed {
        system.peers.remove(&id);
    }
}

/// By the time this runs, `handle_datagram`'s `source_is_valid` gate
/// has already confirmed `sender` is a known peer or the configured
/// master (`USER_PACKETS` is `ANY_PEER_REQUIRED`), so `sender` is
/// always `Some` here.
async fn handle_user(system: &System, class: UserClass, sender: Option<RadioId>, body: &[u8]) {
    let id = sender.unwrap_or(RadioId::ZERO);

    if class.has_call_header() {
        let Some(header) = parse_call_header(body) else {
            return;
        };
        match class {
            UserClass::GroupVoice => system.handler.group_voice(&system.name, id, header),
            UserClass::PrivateVoice => system.handler.private_voice(&system.name, id, header),
            UserClass::GroupData => system.handler.group_data(&system.name, id, header),
            UserClass::PrivateData => system.handler.private_data(&system.name, id, header),
            _ => unreachable!("has_call_header() only true for the four call classes"),
        }
        return;
    }

    match class {
        UserClass::XcmpXnl => system.handler.xcmp_xnl(&system.name, id, body),
        UserClass::CallMonStatus => system.handler.call_mon_status(&system.name, id, body),
        UserClass::CallMonRpt => system.handler.call_mon_rpt(&system.name, id, body),
        UserClass::CallMonNack => system.handler.call_mon_nack(&system.name, id, body),
        UserClass::RptWakeUp => system.handler.repeater_wake_up(&system.name, id, body),
        _ => unreachable!("remaining classes all have a call header"),
    }
}

fn upsert_peer(system: &mut System, id: RadioId, ip: Ipv4Addr, port: u16, mode: u8, flags: u32) {
    system
        .peers
        .entry(id)
        .and_modify(|p| {
            p.ip = ip;
            p.port = port;
            p.mode = mode;
            p.flags = flags;
            p.note_activity();
        })
        .or_insert_with(|| PeerState::new(id, ip, port, mode, flags));
}

async fn send(system: &System, body: &[u8], to: SocketAddr) {
    let signed = system.authenticator.hash(body);
    if let Err(e) = system.socket.send_to(&signed, to).await {
        warn!(system = %system.name, error = %e, "send failed");
    }
}

/// This crate only binds IPv4 sockets; a v6-mapped peer address would
/// indicate a misconfigured dual-stack listener, which we treat as a
/// configuration error rather than something to silently coerce.
fn ipv4_of(addr: SocketAddr) -> Ipv4Addr {
    match addr.ip() {
        std::net::IpAddr::V4(v4) => v4,
        std::net::IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SystemConfig;
    use crate::ipsc::auth::Authenticator;
    use crate::ipsc::callbacks::IpscHandler;
    use crate::ipsc::packet::CallHeader;
    use crate::ipsc::types::Role;
    use std::sync::{Arc, Mutex};

    fn config(name: &str, role: Role, radio_id: u32, auth_key: &[u8]) -> SystemConfig {
        SystemConfig {
            name: name.into(),
            enabled: true,
            role,
            ts1_link: true,
            ts2_link: false,
            auth_enabled: !auth_key.is_empty(),
            radio_id: RadioId::from_u32(radio_id),
            port: 0,
            master_ip: "127.0.0.1".parse().unwrap(),
            master_port: 0,
            alive_timer_secs: 5,
            auth_key: auth_key.to_vec(),
            max_missed: 3,
        }
    }

    #[derive(Default)]
    struct CapturingHandler {
        group_voice_calls: Mutex<Vec<(RadioId, CallHeader)>>,
    }

    impl IpscHandler for CapturingHandler {
        fn group_voice(&self, _system: &str, src: RadioId, header: CallHeader) {
            self.group_voice_calls.lock().unwrap().push((src, header));
        }
    }

    async fn bound(config: SystemConfig) -> System {
        System::bind(config, Arc::new(super::super::callbacks::LoggingHandler))
            .await
            .unwrap()
    }

    /// S5: a fresh peer registers with a master via MASTER_REG_REQ
    /// and is admitted to the PEERS map.
    #[tokio::test]
    async fn master_admits_fresh_peer_registration() {
        let mut master = bound(config("MASTER", Role::Master, 9000, &[])).await;
        let from: SocketAddr = "10.0.0.5:50000".parse().unwrap();
        let req = encode_reg_or_alive(Opcode::MasterRegReq, RadioId::from_u32(1001), 0x65, 0x0C);

        master_reg_req(&mut master, &req, from).await;

        assert!(master.peers.contains_key(&RadioId::from_u32(1001)));
    }

    /// S3: a frame with a bad HMAC trailer never reaches any
    /// opcode-specific handling and leaves state untouched.
    #[tokio::test]
    async fn auth_failure_drops_frame_before_any_state_change() {
        let mut master = bound(config("MASTER", Role::Master, 9000, b"correct-key")).await;
        let from: SocketAddr = "10.0.0.5:50000".parse().unwrap();
        let req = encode_reg_or_alive(Opcode::MasterRegReq, RadioId::from_u32(1001), 0x65, 0x0C);
        let wrong_auth = crate::ipsc::auth::HmacAuthenticator::new(b"wrong-key".to_vec());
        let framed = wrong_auth.hash(&req);

        handle_datagram(&mut master, &framed, from).await;

        assert!(master.peers.is_empty());
    }

    /// S4: a GROUP_VOICE frame from a known peer reaches the host
    /// handler with the decoded call header (src=3001, dst=31337,
    /// ts=2, end=false).
    #[tokio::test]
    async fn group_voice_dispatches_to_handler() {
        let handler = Arc::new(CapturingHandler::default());
        let mut system = System::bind(config("BRIDGE", Role::Master, 9000, &[]), handler.clone())
            .await
            .unwrap();
        let peer_id = RadioId::from_u32(3001);
        system.peers.insert(
            peer_id,
            PeerState::new(peer_id, "10.0.0.9".parse().unwrap(), 50000, 0x65, 0x0C),
        );

        let mut frame = vec![0u8; super::super::packet::CALL_HEADER_MIN_LEN];
        frame[0] = UserClass::GROUP_VOICE;
        frame[1..5].copy_from_slice(peer_id.as_bytes());
        frame[6..9].copy_from_slice(&3001u32.to_be_bytes()[1..]);
        frame[9..12].copy_from_slice(&31337u32.to_be_bytes()[1..]);
        frame[17] = super::super::types::TS_CALL_MSK;

        handle_datagram(&mut system, &frame, "10.0.0.9:50000".parse().unwrap()).await;

        let calls = handler.group_voice_calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (src, header) = &calls[0];
        assert_eq!(*src, peer_id);
        assert_eq!(header.src_subscriber, 3001);
        assert_eq!(header.dst_subscriber, 31337);
        assert_eq!(header.timeslot, 2);
        assert!(!header.call_end);
    }

    /// User traffic from an unregistered source is dropped, not
    /// forwarded to the host handler.
    #[tokio::test]
    async fn user_traffic_from_unknown_source_is_dropped() {
        let handler = Arc::new(CapturingHandler::default());
        let mut system = System::bind(config("BRIDGE", Role::Master, 9000, &[]), handler.clone())
            .await
            .unwrap();

        let mut frame = vec![0u8; super::super::packet::CALL_HEADER_MIN_LEN];
        frame[0] = UserClass::GROUP_VOICE;
        frame[1..5].copy_from_slice(RadioId::from_u32(4242).as_bytes());

        handle_datagram(&mut system, &frame, "10.0.0.9:50000".parse().unwrap()).await;

        assert!(handler.group_voice_calls.lock().unwrap().is_empty());
    }

    /// Peer-list reconciliation is idempotent: applying the same
    /// PEER_LIST_REPLY twice yields the same peer set.
    #[tokio::test]
    async fn peer_list_reconciliation_is_idempotent() {
        let mut peer_system = bound(config("BRIDGE", Role::Peer, 1001, &[])).await;
        let entries = vec![
            PeerListEntry {
                radio_id: RadioId::from_u32(1002),
                ip: "10.0.0.2".parse().unwrap(),
                port: 50000,
                mode: 0x65,
            },
            PeerListEntry {
                radio_id: RadioId::from_u32(1003),
                ip: "10.0.0.3".parse().unwrap(),
                port: 50001,
                mode: 0x66,
            },
        ];
        let body = encode_peer_list(&entries);

        peer_list_reply(&mut peer_system, &body);
        let first: std::collections::BTreeSet<RadioId> = peer_system.peers.keys().copied().collect();
        peer_list_reply(&mut peer_system, &body);
        let second: std::collections::BTreeSet<RadioId> = peer_system.peers.keys().copied().collect();

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }
}
