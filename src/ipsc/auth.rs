//! Datagram authentication.
//!
//! Every outbound frame on an auth-enabled system gets a 10-byte
//! truncated HMAC-SHA1 appended; every inbound frame gets that
//! trailer verified and stripped before the dispatcher sees the body.
//! A system with `auth_enabled = false` uses [`NoopAuthenticator`],
//! whose `verify` is the identity function, so the dispatcher never
//! has to branch on whether auth is on.

use hmac::{Hmac, Mac};
use sha1::Sha1;

use super::types::AUTH_HASH_LEN;

type HmacSha1 = Hmac<Sha1>;

/// Appends, verifies, and strips the HMAC-SHA1 trailer on IPSC
/// datagrams. Implemented by [`HmacAuthenticator`] (auth enabled) and
/// [`NoopAuthenticator`] (auth disabled).
pub trait Authenticator: Send + Sync {
    /// Append the authentication trailer to `body`, returning the
    /// full frame ready to send.
    fn hash(&self, body: &[u8]) -> Vec<u8>;

    /// Verify the trailer on `frame` and, on success, return the body
    /// with the trailer stripped. Returns `None` on mismatch or if
    /// the frame is too short to carry a trailer.
    fn verify(&self, frame: &[u8]) -> Option<Vec<u8>>;
}

/// HMAC-SHA1 authenticator, truncated to the low 10 bytes.
pub struct HmacAuthenticator {
    key: Vec<u8>,
}

impl HmacAuthenticator {
    pub fn new(key: Vec<u8>) -> Self {
        HmacAuthenticator { key }
    }

    fn digest(&self, body: &[u8]) -> [u8; AUTH_HASH_LEN] {
        let mut mac =
            HmacSha1::new_from_slice(&self.key).expect("HMAC accepts a key of any length");
        mac.update(body);
        let full = mac.finalize().into_bytes();
        let mut truncated = [0u8; AUTH_HASH_LEN];
        truncated.copy_from_slice(&full[..AUTH_HASH_LEN]);
        truncated
    }
}

impl Authenticator for HmacAuthenticator {
    fn hash(&self, body: &[u8]) -> Vec<u8> {
        let digest = self.digest(body);
        let mut frame = Vec::with_capacity(body.len() + AUTH_HASH_LEN);
        frame.extend_from_slice(body);
        frame.extend_from_slice(&digest);
        frame
    }

    fn verify(&self, frame: &[u8]) -> Option<Vec<u8>> {
        if frame.len() < AUTH_HASH_LEN {
            return None;
        }
        let split = frame.len() - AUTH_HASH_LEN;
        let (body, trailer) = frame.split_at(split);
        let expected = self.digest(body);
        if constant_time_eq(&expected, trailer) {
            Some(body.to_vec())
        } else {
            None
        }
    }
}

/// No-op authenticator for systems with `auth_enabled = false`.
/// `verify` is the identity function: the whole frame is the body.
pub struct NoopAuthenticator;

impl Authenticator for NoopAuthenticator {
    fn hash(&self, body: &[u8]) -> Vec<u8> {
        body.to_vec()
    }

    fn verify(&self, frame: &[u8]) -> Option<Vec<u8>> {
        Some(frame.to_vec())
    }
}

/// Build the authenticator for a system from its config flag.
pub fn for_system(auth_enabled: bool, key: &[u8]) -> Box<dyn Authenticator> {
    if auth_enabled {
        Box::new(HmacAuthenticator::new(key.to_vec()))
    } else {
        Box::new(NoopAuthenticator)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_round_trips() {
        let auth = HmacAuthenticator::new(b"s3cr3t".to_vec());
        let framed = auth.hash(b"hello world");
        assert_eq!(framed.len(), b"hello world".len() + AUTH_HASH_LEN);
        let recovered = auth.verify(&framed).expect("valid trailer");
        assert_eq!(recovered, b"hello world");
    }

    #[test]
    fn hmac_rejects_tampered_body() {
        let auth = HmacAuthenticator::new(b"s3cr3t".to_vec());
        let mut framed = auth.hash(b"hello world");
        framed[0] ^= 0xFF;
        assert!(auth.verify(&framed).is_none());
    }

    #[test]
    fn hmac_rejects_wrong_key() {
        let sender = HmacAuthenticator::new(b"key-a".to_vec());
        let receiver = HmacAuthenticator::new(b"key-b".to_vec());
        let framed = sender.hash(b"payload");
        assert!(receiver.verify(&framed).is_none());
    }

    #[test]
    fn noop_authenticator_is_identity() {
        let auth = NoopAuthenticator;
        let framed = auth.hash(b"payload");
        assert_eq!(framed, b"payload");
        assert_eq!(auth.verify(&framed).unwrap(), b"payload");
    }

    #[test]
    fn noop_verify_accepts_anything() {
        let auth = NoopAuthenticator;
        assert_eq!(auth.verify(b"garbage").unwrap(), b"garbage");
    }
}
