//! Crate-wide error types.
//!
//! The dispatch-path variants ([`IpscError::AuthFailure`],
//! [`IpscError::UnknownSource`], [`IpscError::UnknownOpcode`]) are
//! never propagated past [`crate::ipsc::dispatcher::handle_datagram`]:
//! the dispatcher logs them and drops the frame. [`IpscError::FatalInit`]
//! and a [`IpscError::SocketError`] raised while binding are the only
//! variants that abort a system's startup.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IpscError {
    #[error("HMAC authentication failed")]
    AuthFailure,

    #[error("datagram from unregistered source radio ID")]
    UnknownSource,

    #[error("unrecognized opcode 0x{0:02x}")]
    UnknownOpcode(u8),

    #[error("keep-alive timeout, {0} consecutive misses")]
    Timeout(u32),

    #[error("socket error: {0}")]
    SocketError(#[from] std::io::Error),

    #[error("fatal initialization error: {0}")]
    FatalInit(String),
}

pub type Result<T> = std::result::Result<T, IpscError>;
