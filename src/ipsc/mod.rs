//! IPSC connection state machine, keep-alive engine, and authenticated
//! datagram dispatcher.

pub mod auth;
pub mod callbacks;
pub mod codec;
pub mod dispatcher;
pub mod lifecycle;
pub mod maintenance;
pub mod packet;
pub mod peer;
pub mod state;
pub mod types;

pub use auth::{Authenticator, HmacAuthenticator, NoopAuthenticator};
pub use callbacks::{IpscHandler, LoggingHandler};
pub use lifecycle::LinkNode;
pub use packet::{CallHeader, Opcode, PacketKind, PeerListEntry, UserClass};
pub use peer::{MasterState, PeerState};
pub use state::System;
pub use types::Role;
