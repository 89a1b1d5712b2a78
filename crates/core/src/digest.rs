//! Digest addresses: content-derived identifiers for stored blobs.

use crate::hash::ContentHash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A content address: hash of a blob's bytes plus its exact size.
///
/// The sole primary key of stored blobs. Two objects with equal hash and
/// size are the same object; the size strengthens the address and catches
/// truncation. Ordering and equality are byte-for-byte over (hash, size).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DigestAddress {
    hash: ContentHash,
    size_bytes: u64,
}

impl DigestAddress {
    /// Build an address from a content hash and size.
    pub fn new(hash: ContentHash, size_bytes: u64) -> Self {
        Self { hash, size_bytes }
    }

    /// The content hash.
    pub fn hash(&self) -> &ContentHash {
        &self.hash
    }

    /// The exact blob size in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Deterministic, filesystem-safe key: `<hex-hash>-<size>`.
    ///
    /// Used both as the blob record primary key and as the committed file
    /// name, so the same content always maps to the same path.
    pub fn storage_key(&self) -> String {
        format!("{}-{}", self.hash.to_hex(), self.size_bytes)
    }

    /// Parse a storage key produced by [`storage_key`](Self::storage_key).
    pub fn parse_storage_key(key: &str) -> crate::Result<Self> {
        let (hex, size) = key
            .split_once('-')
            .ok_or_else(|| crate::Error::InvalidDigest(format!("malformed key: {key}")))?;
        let hash = ContentHash::from_hex(hex)?;
        let size_bytes = size
            .parse::<u64>()
            .map_err(|e| crate::Error::InvalidDigest(format!("invalid size in key: {e}")))?;
        Ok(Self { hash, size_bytes })
    }
}

impl fmt::Debug for DigestAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DigestAddress({}/{})",
            &self.hash.to_hex()[..16],
            self.size_bytes
        )
    }
}

impl fmt::Display for DigestAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.storage_key())
    }
}
