//! Periodic maintenance: the logic that runs on each system's
//! `alive_timer` tick, independent of anything arriving on the
//! socket.

use tracing::{info, warn};

use super::packet::{encode_bare, encode_reg_or_alive, Opcode};
use super::state::System;
use super::types::ConnState;
use crate::error::IpscError;
use crate::types::RadioId;

/// Peer-role tick. Runs in this exact order every `alive_timer` tick
/// (spec.md §4.5):
///
/// 1. If a keep-alive sent last tick was never acknowledged, count a
///    miss (handled by [`super::peer::MasterState::begin_keepalive`]).
/// 2. If the miss count has now reached `max_missed`, drop back to
///    `Unregistered` and send `MASTER_REG_REQ` instead of a keep-alive.
///    Otherwise, if `Unregistered`/`AwaitingRegReply`, send
///    `MASTER_REG_REQ`; if `Registered`, send `MASTER_ALIVE_REQ`.
/// 3. Once the master is `Registered` but its peer list hasn't arrived
///    yet: request it with `PEER_LIST_REQ` if the master advertised
///    any other peers, otherwise synthesize "list received" (we are
///    the only member).
/// 4. Once the peer list has arrived, drive every known sibling's own
///    UNKNOWN → REGISTERING → CONNECTED machine: send `PEER_REG_REQ`
///    while unregistered, `PEER_ALIVE_REQ` (with the same
///    miss-counting/eviction logic as step 2) once connected.
pub async fn peer_tick(system: &mut System) {
    let own_id = system.config.radio_id;
    let mode = system.config.mode_byte();
    let flags = system.config.flags_word();
    let max_missed = system.config.max_missed;
    let master_addr = system.master_addr();

    let (frame, master_conn) = match system.master.as_mut() {
        Some(master) => {
            if master.conn == ConnState::Registered {
                master.begin_keepalive();
                if master.has_exceeded_misses(max_missed) {
                    warn!(system = %system.name, "{}", IpscError::Timeout(master.missed));
                    master.reset_to_unregistered();
                }
            }
            let frame = match master.conn {
                ConnState::Unregistered => {
                    master.conn = ConnState::AwaitingRegReply;
                    encode_reg_or_alive(Opcode::MasterRegReq, own_id, mode, flags)
                }
                ConnState::AwaitingRegReply => {
                    encode_reg_or_alive(Opcode::MasterRegReq, own_id, mode, flags)
                }
                ConnState::Registered => {
                    encode_reg_or_alive(Opcode::MasterAliveReq, own_id, mode, flags)
                }
            };
            (frame, master.conn)
        }
        None => return,
    };
    send_frame(system, &frame, master_addr).await;

    if master_conn != ConnState::Registered {
        return;
    }

    let need_list = system.master.as_ref().map(|m| !m.peer_list_received).unwrap_or(false);
    if need_list {
        let has_other_peers = system.master.as_ref().and_then(|m| m.num_peers).unwrap_or(0) > 0;
        if has_other_peers {
            send_frame(system, &encode_bare(Opcode::PeerListReq), master_addr).await;
        } else if let Some(master) = system.master.as_mut() {
            master.peer_list_received = true;
        }
    }

    let list_ready = system.master.as_ref().map(|m| m.peer_list_received).unwrap_or(false);
    if !list_ready {
        return;
    }

    let ids: Vec<RadioId> = system.peers.keys().copied().collect();
    let mut evicted = Vec::new();
    for id in ids {
        let Some(addr) = system.peer_addr(&id) else {
            continue;
        };
        let frame = {
            let Some(peer) = system.peers.get_mut(&id) else {
                continue;
            };
            match peer.conn {
                ConnState::Unregistered => {
                    peer.conn = ConnState::AwaitingRegReply;
                    Some(encode_reg_or_alive(Opcode::PeerRegReq, own_id, mode, flags))
                }
                ConnState::AwaitingRegReply => {
                    Some(encode_reg_or_alive(Opcode::PeerRegReq, own_id, mode, flags))
                }
                ConnState::Registered => {
                    peer.begin_keepalive();
                    if peer.has_exceeded_misses(max_missed) {
                        evicted.push(id);
                        None
                    } else {
                        Some(encode_reg_or_alive(Opcode::PeerAliveReq, own_id, mode, flags))
                    }
                }
            }
        };
        if let Some(frame) = frame {
            send_frame(system, &frame, addr).await;
        }
    }

    for id in evicted {
        info!(system = %system.name, peer = %id, "{}", IpscError::Timeout(max_missed));
        system.peers.remove(&id);
    }
}

async fn send_frame(system: &System, frame: &[u8], to: (std::net::Ipv4Addr, u16)) {
    let signed = system.authenticator.hash(frame);
    if let Err(e) = system.socket.send_to(&signed, to).await {
        warn!(system = %system.name, error = %e, "failed to send frame");
    }
}

/// Master-role tick: evict any peer that has gone silent for longer
/// than [`super::types::MASTER_PEER_STALE_SECS`]. A master never
/// pings its peers; it only watches their own keep-alive traffic.
pub async fn master_tick(system: &mut System) {
    let stale_secs = super::types::MASTER_PEER_STALE_SECS;
    let evicted = system.evict_peers(|p| p.is_stale(stale_secs));
    for id in evicted {
        info!(system = %system.name, peer = %id, "evicted stale peer");
    }
}

/// Send `DE_REG_REQ` to every relevant destination for graceful
/// shutdown (spec.md §4.7 / §5, refined by SPEC_FULL.md §11): a peer
/// sends one frame to its master, a master fans the frame out to
/// every currently registered peer.
pub async fn send_de_reg(system: &System) {
    let frame = encode_bare(Opcode::DeRegReq);
    let signed = system.authenticator.hash(&frame);

    if system.is_master() {
        for peer in system.peers.values() {
            let _ = system.socket.send_to(&signed, (peer.ip, peer.port)).await;
        }
    } else if system.master.is_some() {
        let _ = system.socket.send_to(&signed, system.master_addr()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SystemConfig;
    use crate::ipsc::callbacks::LoggingHandler;
    use crate::ipsc::types::Role;
    use crate::types::RadioId;
    use std::sync::Arc;

    fn test_config(role: Role) -> SystemConfig {
        SystemConfig {
            name: "TEST".into(),
            enabled: true,
            role,
            ts1_link: true,
            ts2_link: false,
            auth_enabled: false,
            radio_id: RadioId::from_u32(1001),
            port: 0,
            master_ip: "127.0.0.1".parse().unwrap(),
            master_port: 0,
            alive_timer_secs: 5,
            auth_key: Vec::new(),
            max_missed: 3,
        }
    }

    async fn bound_system(role: Role) -> System {
        System::bind(test_config(role), Arc::new(LoggingHandler))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn peer_tick_registers_then_keepalives() {
        let mut system = bound_system(Role::Peer).await;
        assert_eq!(system.master.as_ref().unwrap().conn, ConnState::Unregistered);

        peer_tick(&mut system).await;
        assert_eq!(
            system.master.as_ref().unwrap().conn,
            ConnState::AwaitingRegReply
        );

        system
            .master
            .as_mut()
            .unwrap()
            .mark_registered(RadioId::from_u32(9000), 0x65, 0x0C, None);
        peer_tick(&mut system).await;
        assert_eq!(system.master.as_ref().unwrap().conn, ConnState::Registered);
    }

    #[tokio::test]
    async fn peer_tick_reregisters_after_max_missed() {
        let mut system = bound_system(Role::Peer).await;
        system
            .master
            .as_mut()
            .unwrap()
            .mark_registered(RadioId::from_u32(9000), 0x65, 0x0C, None);

        // Three ticks with no replies in between should exceed max_missed=3.
        for _ in 0..4 {
            peer_tick(&mut system).await;
        }
        assert_eq!(system.master.as_ref().unwrap().conn, ConnState::Unregistered);
    }

    /// S1: once the master reports other peers, a tick fetches the
    /// peer list before doing any per-sibling work.
    #[tokio::test]
    async fn peer_tick_requests_peer_list_when_master_reports_others() {
        let mut system = bound_system(Role::Peer).await;
        system
            .master
            .as_mut()
            .unwrap()
            .mark_registered(RadioId::from_u32(9000), 0x65, 0x0C, Some(1));

        peer_tick(&mut system).await;
        assert!(!system.master.as_ref().unwrap().peer_list_received);
    }

    /// S1 (single-member network): with no other peers advertised, the
    /// peer list is synthesized as received without a network round trip.
    #[tokio::test]
    async fn peer_tick_synthesizes_peer_list_when_alone() {
        let mut system = bound_system(Role::Peer).await;
        system
            .master
            .as_mut()
            .unwrap()
            .mark_registered(RadioId::from_u32(9000), 0x65, 0x0C, Some(0));

        peer_tick(&mut system).await;
        assert!(system.master.as_ref().unwrap().peer_list_received);
    }

    /// S1 tick 3 / S2: once the peer list has arrived, an unregistered
    /// sibling gets a PEER_REG_REQ, and a connected sibling that misses
    /// too many keep-alives is evicted.
    #[tokio::test]
    async fn peer_tick_registers_siblings_then_evicts_on_miss() {
        let mut system = bound_system(Role::Peer).await;
        system
            .master
            .as_mut()
            .unwrap()
            .mark_registered(RadioId::from_u32(9000), 0x65, 0x0C, Some(0));
        let sibling = RadioId::from_u32(1002);
        system.peers.insert(
            sibling,
            super::super::peer::PeerState::from_peer_list(sibling, "10.0.0.2".parse().unwrap(), 50000, 0x66),
        );

        peer_tick(&mut system).await; // synthesizes list, sends PEER_REG_REQ
        assert_eq!(system.peers.get(&sibling).unwrap().conn, ConnState::AwaitingRegReply);

        system.peers.get_mut(&sibling).unwrap().mark_registered();
        for _ in 0..system.config.max_missed {
            peer_tick(&mut system).await;
        }
        assert!(!system.peers.contains_key(&sibling));
    }

    #[tokio::test]
    async fn master_tick_evicts_stale_peers() {
        let mut system = bound_system(Role::Master).await;
        let mut peer = super::super::peer::PeerState::new(
            RadioId::from_u32(2001),
            "10.0.0.9".parse().unwrap(),
            50000,
            0x65,
            0x0C,
        );
        peer.last_contact = 0; // far in the past
        system.peers.insert(peer.radio_id, peer);

        master_tick(&mut system).await;
        assert!(system.peers.is_empty());
    }
}
