//! Content-addressing for protocol messages.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bft::error::*;

/// A fixed-width cryptographic digest.
///
/// Only `REQUEST` payloads are hashed (spec §4.1); every other message
/// kind is compared structurally. `Digest` is also reused for
/// checkpoint snapshot digests (spec §3, "Snapshot"), which share the
/// same canonical-encode-then-hash recipe.
#[derive(Serialize, Deserialize, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Digest([u8; Digest::LENGTH]);

impl Digest {
    /// Width, in bytes, of a digest (blake3's native output length).
    pub const LENGTH: usize = 32;

    /// Wraps a raw byte slice into a `Digest`, failing if its length
    /// does not match [`Digest::LENGTH`].
    pub fn from_bytes(raw_bytes: &[u8]) -> Result<Self> {
        if raw_bytes.len() != Self::LENGTH {
            return Err(format!(
                "digest must be {} bytes, got {}",
                Self::LENGTH,
                raw_bytes.len()
            ))
            .simple_msg(ErrorKind::Crypto, "malformed digest");
        }
        let mut inner = [0; Self::LENGTH];
        inner.copy_from_slice(raw_bytes);
        Ok(Self(inner))
    }

    /// Hashes an already-canonicalized byte encoding.
    ///
    /// Callers are responsible for producing a canonical encoding
    /// (see `communication::message::RequestMessage::digest` and
    /// `checkpoint::Snapshot::digest`); this function does not impose
    /// any encoding scheme of its own.
    pub fn from_canonical(bytes: &[u8]) -> Self {
        let hash = blake3::hash(bytes);
        Self(*hash.as_bytes())
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..4] {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, "..")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_bytes_same_digest() {
        let a = Digest::from_canonical(b"hello||0.00||100");
        let b = Digest::from_canonical(b"hello||0.00||100");
        assert_eq!(a, b);
    }

    #[test]
    fn different_bytes_different_digest() {
        let a = Digest::from_canonical(b"hello||0.00||100");
        let b = Digest::from_canonical(b"hello||0.00||101");
        assert_ne!(a, b);
    }

    #[test]
    fn round_trips_through_bytes() {
        let d = Digest::from_canonical(b"message1||0.00||100");
        let raw = d.as_ref().to_vec();
        let d2 = Digest::from_bytes(&raw).unwrap();
        assert_eq!(d, d2);
    }
}
