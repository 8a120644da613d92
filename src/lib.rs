pub mod config;
pub mod error;
pub mod ipsc;
pub mod types;

pub use config::{Config, SystemConfig};
pub use error::{IpscError, Result};
pub use ipsc::{IpscHandler, LinkNode, LoggingHandler, Role};
pub use types::RadioId;
