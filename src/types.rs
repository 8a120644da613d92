//! Crate-wide primitive types shared by every `ipsc` submodule.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock seconds since the Unix epoch.
///
/// Used for keep-alive bookkeeping and peer-list staleness checks.
/// Never call `SystemTime::now()` directly outside this function so a
/// single clock source backs every age comparison in the crate.
pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// A DMR radio ID, carried on the wire as 4 big-endian bytes.
///
/// `RadioId` is intentionally opaque: the core never interprets the
/// numeric value beyond equality and map-keying. It implements
/// `Copy` so peer-list reconciliation can freely collect and compare
/// IDs without borrowing the maps it walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RadioId(pub [u8; 4]);

impl RadioId {
    pub const ZERO: RadioId = RadioId([0, 0, 0, 0]);

    pub fn from_bytes(bytes: &[u8]) -> Option<RadioId> {
        if bytes.len() != 4 {
            return None;
        }
        let mut id = [0u8; 4];
        id.copy_from_slice(bytes);
        Some(RadioId(id))
    }

    pub fn from_u32(value: u32) -> RadioId {
        RadioId(value.to_be_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    pub fn as_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }
}

impl fmt::Display for RadioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radio_id_round_trips_through_u32() {
        let id = RadioId::from_u32(31337);
        assert_eq!(id.as_u32(), 31337);
        assert_eq!(id.as_bytes(), &[0x00, 0x00, 0x7a, 0x69]);
    }

    #[test]
    fn radio_id_from_bytes_rejects_wrong_length() {
        assert!(RadioId::from_bytes(&[1, 2, 3]).is_none());
        assert!(RadioId::from_bytes(&[1, 2, 3, 4, 5]).is_none());
        assert!(RadioId::from_bytes(&[1, 2, 3, 4]).is_some());
    }
}
