//! Configuration loading.
//!
//! Rich configuration management (hot reload, alias CSV loading, the
//! TCP reporting sidecar's own config block) is out of scope for this
//! crate; this module exists only to turn a TOML document on disk into
//! [`SystemConfig`] values the rest of the crate consumes.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::Path;

use serde::Deserialize;

use crate::error::{IpscError, Result};
use crate::ipsc::types::{Role, NOISE_MODE};
use crate::types::RadioId;

/// Immutable, load-time configuration for a single IPSC network.
///
/// Everything here is fixed for the lifetime of the system; runtime
/// state (peer map, master state, keep-alive counters) lives in
/// [`crate::ipsc::state::System`] instead.
#[derive(Debug, Clone)]
pub struct SystemConfig {
    pub name: String,
    pub enabled: bool,
    pub role: Role,
    pub ts1_link: bool,
    pub ts2_link: bool,
    pub auth_enabled: bool,
    pub radio_id: RadioId,
    pub port: u16,
    pub master_ip: Ipv4Addr,
    pub master_port: u16,
    pub alive_timer_secs: u64,
    pub auth_key: Vec<u8>,
    pub max_missed: u32,
}

impl SystemConfig {
    /// The single MODE byte this system advertises about itself,
    /// derived from `ts1_link`/`ts2_link` per the constants table.
    pub fn mode_byte(&self) -> u8 {
        crate::ipsc::codec::encode_mode(self.ts1_link, self.ts2_link, NOISE_MODE)
    }

    /// The 4-byte FLAGS word this system advertises about itself.
    pub fn flags_word(&self) -> u32 {
        crate::ipsc::codec::encode_flags(self.auth_enabled)
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    global: RawGlobal,
    #[serde(default)]
    systems: BTreeMap<String, RawSystem>,
}

#[derive(Debug, Default, Deserialize)]
struct RawGlobal {
    #[serde(default)]
    log_level: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSystem {
    enabled: bool,
    mode: String,
    ts1_link: bool,
    ts2_link: bool,
    auth_enabled: bool,
    radio_id: u32,
    port: u16,
    master_ip: String,
    master_port: u16,
    alive_timer: u64,
    #[serde(default)]
    auth_key: String,
    max_missed: u32,
}

/// Parsed top-level configuration document.
pub struct Config {
    pub log_level: Option<String>,
    pub systems: Vec<SystemConfig>,
}

pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
    let text = std::fs::read_to_string(path.as_ref())
        .map_err(|e| IpscError::FatalInit(format!("reading config: {e}")))?;
    parse(&text)
}

fn parse(text: &str) -> Result<Config> {
    let raw: RawConfig =
        toml::from_str(text).map_err(|e| IpscError::FatalInit(format!("parsing config: {e}")))?;

    let mut systems = Vec::with_capacity(raw.systems.len());
    for (name, sys) in raw.systems {
        let role = match sys.mode.as_str() {
            "peer" => Role::Peer,
            "master" => Role::Master,
            other => {
                return Err(IpscError::FatalInit(format!(
                    "system '{name}': unknown mode '{other}', expected 'peer' or 'master'"
                )))
            }
        };
        let master_ip: Ipv4Addr = sys
            .master_ip
            .parse()
            .map_err(|e| IpscError::FatalInit(format!("system '{name}': bad master_ip: {e}")))?;

        systems.push(SystemConfig {
            name,
            enabled: sys.enabled,
            role,
            ts1_link: sys.ts1_link,
            ts2_link: sys.ts2_link,
            auth_enabled: sys.auth_enabled,
            radio_id: RadioId::from_u32(sys.radio_id),
            port: sys.port,
            master_ip,
            master_port: sys.master_port,
            alive_timer_secs: sys.alive_timer,
            auth_key: sys.auth_key.into_bytes(),
            max_missed: sys.max_missed,
        });
    }

    Ok(Config {
        log_level: raw.global.log_level,
        systems,
    })
}
