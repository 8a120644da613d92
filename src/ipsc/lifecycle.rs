//! Startup and shutdown across every configured system.
//!
//! Each enabled [`System`] runs on its own cooperative task, driven by
//! a single `tokio::select!` between its alive-timer tick and its
//! socket's next datagram — the same no-shared-state-across-systems
//! model spec.md §5 requires, expressed here as plain ownership: the
//! task that runs a system is the only thing that ever touches it.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::callbacks::IpscHandler;
use super::dispatcher::handle_datagram;
use super::maintenance::{master_tick, peer_tick, send_de_reg};
use super::state::System;
use super::types::Role;
use crate::config::SystemConfig;
use crate::error::Result;

/// Owns every running system's task handle and the shutdown signal
/// that tells them all to wind down.
pub struct LinkNode {
    handles: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl LinkNode {
    /// Bind a UDP socket for every `enabled` system and spawn its run
    /// loop. Disabled systems are skipped, not errored on (spec.md
    /// §4.7 / SPEC_FULL.md §11).
    pub async fn start(configs: Vec<SystemConfig>, handler: Arc<dyn IpscHandler>) -> Result<LinkNode> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::new();

        for config in configs {
            if !config.enabled {
                info!(system = %config.name, "system disabled, skipping");
                continue;
            }
            let name = config.name.clone();
            let system = System::bind(config, handler.clone()).await?;
            let rx = shutdown_rx.clone();
            info!(system = %name, "system bound and running");
            handles.push(tokio::spawn(run(system, rx)));
        }

        Ok(LinkNode {
            handles,
            shutdown_tx,
        })
    }

    /// Signal every system to send its shutdown frames and exit, then
    /// wait for them all to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "system task panicked during shutdown");
            }
        }
    }
}

async fn run(mut system: System, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(
        system.config.alive_timer_secs.max(1),
    ));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut buf = [0u8; 2048];

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if matches!(system.config.role, Role::Master) {
                    master_tick(&mut system).await;
                } else {
                    peer_tick(&mut system).await;
                }
            }
            result = system.socket.recv_from(&mut buf) => {
                match result {
                    Ok((n, from)) => handle_datagram(&mut system, &buf[..n], from).await,
                    Err(e) => warn!(system = %system.name, error = %e, "recv error"),
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!(system = %system.name, "shutting down, sending DE_REG_REQ");
                    send_de_reg(&system).await;
                    break;
                }
            }
        }
    }
}
