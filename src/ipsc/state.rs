//! System state: one [`System`] per configured IPSC network.
//!
//! A `System` owns its UDP socket and its peer/master bookkeeping
//! outright — it is never shared behind an `Arc<Mutex<_>>`. Each
//! system runs on its own cooperative task (see
//! [`crate::ipsc::lifecycle`]), so there is no cross-system mutable
//! state to protect and no lock to contend on the per-datagram path.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use tokio::net::UdpSocket;

use super::auth::Authenticator;
use super::callbacks::IpscHandler;
use super::peer::{MasterState, PeerState};
use super::types::Role;
use crate::config::SystemConfig;
use crate::error::Result;
use crate::types::RadioId;

/// Runtime state for one configured IPSC network.
pub struct System {
    pub name: String,
    pub config: SystemConfig,
    pub socket: UdpSocket,
    pub authenticator: Box<dyn Authenticator>,
    pub handler: Arc<dyn IpscHandler>,

    /// For master role: every registered peer. For peer role: every
    /// other member of this system's own peer list, tracked through
    /// its own UNKNOWN/REGISTERING/CONNECTED state machine.
    pub peers: HashMap<RadioId, PeerState>,
    /// Populated only when `config.role == Role::Peer`.
    pub master: Option<MasterState>,
}

impl System {
    pub async fn bind(config: SystemConfig, handler: Arc<dyn IpscHandler>) -> Result<System> {
        let socket = UdpSocket::bind(("0.0.0.0", config.port)).await?;
        let authenticator = super::auth::for_system(config.auth_enabled, &config.auth_key);
        let master = match config.role {
            Role::Peer => Some(MasterState::new(config.master_ip, config.master_port)),
            Role::Master => None,
        };
        Ok(System {
            name: config.name.clone(),
            config,
            socket,
            authenticator,
            handler,
            peers: HashMap::new(),
            master,
        })
    }

    pub fn is_master(&self) -> bool {
        matches!(self.config.role, Role::Master)
    }

    /// Remove every peer for which `predicate` returns true, using
    /// the collect-then-remove pattern: we never delete from a map
    /// while iterating it.
    pub fn evict_peers<F>(&mut self, predicate: F) -> Vec<RadioId>
    where
        F: Fn(&PeerState) -> bool,
    {
        let doomed: Vec<RadioId> = self
            .peers
            .iter()
            .filter(|(_, p)| predicate(p))
            .map(|(id, _)| *id)
            .collect();
        for id in &doomed {
            self.peers.remove(id);
        }
        doomed
    }

    pub fn peer_addr(&self, id: &RadioId) -> Option<(Ipv4Addr, u16)> {
        self.peers.get(id).map(|p| (p.ip, p.port))
    }

    pub fn master_addr(&self) -> (Ipv4Addr, u16) {
        (self.config.master_ip, self.config.master_port)
    }
}
