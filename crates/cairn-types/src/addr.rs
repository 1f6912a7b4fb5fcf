use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Width of an [`Addr`] in bytes.
pub const ADDR_LEN: usize = 32;

/// Number of leading bytes that form the lookup prefix.
const PREFIX_LEN: usize = 8;

/// Content-addressed identifier for a chunk.
///
/// An `Addr` is the BLAKE3 hash of a chunk's payload. Identical payloads
/// always produce the same `Addr`, making chunks deduplicatable and
/// verifiable. The leading eight bytes double as a `u64` prefix used to sort
/// and shard batched reads.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Addr([u8; ADDR_LEN]);

impl Addr {
    /// The empty address (all zeros). Marks "no chunk" and the initial root.
    pub const EMPTY: Addr = Addr([0u8; ADDR_LEN]);

    /// Compute the address of a payload.
    pub fn of(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Wrap a pre-computed hash.
    pub const fn from_hash(hash: [u8; ADDR_LEN]) -> Self {
        Self(hash)
    }

    /// Returns `true` if this is the empty address.
    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; ADDR_LEN]
    }

    /// The leading bytes as a big-endian `u64`, used as the sort/shard key
    /// for batched reads.
    pub fn prefix(&self) -> u64 {
        let mut buf = [0u8; PREFIX_LEN];
        buf.copy_from_slice(&self.0[..PREFIX_LEN]);
        u64::from_be_bytes(buf)
    }

    /// The raw hash bytes.
    pub fn as_bytes(&self) -> &[u8; ADDR_LEN] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != ADDR_LEN {
            return Err(TypeError::InvalidLength {
                expected: ADDR_LEN,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; ADDR_LEN];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Addr({})", self.short_hex())
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; ADDR_LEN]> for Addr {
    fn from(bytes: [u8; ADDR_LEN]) -> Self {
        Self(bytes)
    }
}

impl From<Addr> for [u8; ADDR_LEN] {
    fn from(addr: Addr) -> Self {
        addr.0
    }
}
