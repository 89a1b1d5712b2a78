//! Cryptographic hash types and the resumable incremental hasher.

use serde::{Deserialize, Serialize};
use sha2::digest::common::hazmat::{SerializableState, SerializedState};
use sha2::{Digest, Sha256};
use std::fmt;

/// A SHA-256 content hash represented as 32 bytes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Create a new ContentHash from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Compute SHA-256 hash of data in one pass.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        if s.len() != 64 {
            return Err(crate::Error::InvalidHash(format!(
                "expected 64 hex chars, got {}",
                s.len()
            )));
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hex_str =
                std::str::from_utf8(chunk).map_err(|e| crate::Error::InvalidHash(e.to_string()))?;
            bytes[i] = u8::from_str_radix(hex_str, 16)
                .map_err(|e| crate::Error::InvalidHash(e.to_string()))?;
        }
        Ok(Self(bytes))
    }

    /// Encode as lowercase hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Opaque serialized snapshot of an in-progress hash computation.
///
/// Persisted alongside the upload session so hashing can resume after a
/// process restart without rehashing the byte history. The contents are an
/// implementation detail of the underlying hash primitive and must not be
/// inspected or modified.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HasherState(Vec<u8>);

impl HasherState {
    /// Wrap raw snapshot bytes (as read back from persistent storage).
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Get the raw snapshot bytes for persistence.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for HasherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HasherState({} bytes)", self.0.len())
    }
}

/// Incremental SHA-256 hasher with snapshot/restore support.
///
/// An upload's bytes arrive across many independent calls, possibly across
/// restarts of the serving process, so the running digest state must survive
/// outside process memory. `snapshot` serializes the internal compression
/// state losslessly; `restore` reconstructs a hasher that produces output
/// identical to one that hashed the same byte history in a single pass.
pub struct BlobHasher(Sha256);

impl BlobHasher {
    /// Create a fresh hasher with no bytes processed.
    pub fn new() -> Self {
        Self(Sha256::new())
    }

    /// Fold more bytes into the running digest.
    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    /// Serialize the current internal state.
    pub fn snapshot(&self) -> HasherState {
        HasherState(self.0.serialize().to_vec())
    }

    /// Reconstruct a hasher from a previously taken snapshot.
    pub fn restore(state: &HasherState) -> crate::Result<Self> {
        let serialized = SerializedState::<Sha256>::try_from(state.as_bytes()).map_err(|_| {
            crate::Error::InvalidHasherState(format!(
                "snapshot has invalid length {}",
                state.as_bytes().len()
            ))
        })?;
        let inner = Sha256::deserialize(&serialized)
            .map_err(|e| crate::Error::InvalidHasherState(e.to_string()))?;
        Ok(Self(inner))
    }

    /// Finalize and return the hash. Consumes the hasher, so a given
    /// instance can only be finalized once; restore a snapshot to retry.
    pub fn finalize(self) -> ContentHash {
        ContentHash(self.0.finalize().into())
    }
}

impl Default for BlobHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_hex_roundtrip() {
        let hash = ContentHash::compute(b"hello world");
        let hex = hash.to_hex();
        assert_eq!(hex.len(), 64);
        let parsed = ContentHash::from_hex(&hex).unwrap();
        assert_eq!(hash, parsed);
        assert!(ContentHash::from_hex("zz").is_err());
    }

    #[test]
    fn test_incremental_matches_one_pass() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let mut hasher = BlobHasher::new();
        hasher.update(&data[..10]);
        hasher.update(&data[10..]);
        assert_eq!(hasher.finalize(), ContentHash::compute(data));
    }

    #[test]
    fn test_snapshot_restore_matches_one_pass() {
        // Split points straddle the 64-byte SHA-256 block boundary to
        // exercise buffered-partial-block state in the snapshot.
        let data: Vec<u8> = (0u8..=255).cycle().take(1000).collect();
        for split in [0usize, 1, 63, 64, 65, 500, 999, 1000] {
            let mut hasher = BlobHasher::new();
            hasher.update(&data[..split]);
            let state = hasher.snapshot();

            let mut restored = BlobHasher::restore(&state).unwrap();
            restored.update(&data[split..]);
            assert_eq!(
                restored.finalize(),
                ContentHash::compute(&data),
                "split at {split}"
            );
        }
    }

    #[test]
    fn test_snapshot_restore_many_cycles() {
        let data: Vec<u8> = (0u8..200).collect();
        let mut state = BlobHasher::new().snapshot();
        for chunk in data.chunks(7) {
            let mut hasher = BlobHasher::restore(&state).unwrap();
            hasher.update(chunk);
            state = hasher.snapshot();
        }
        let hasher = BlobHasher::restore(&state).unwrap();
        assert_eq!(hasher.finalize(), ContentHash::compute(&data));
    }

    #[test]
    fn test_restore_rejects_garbage() {
        assert!(BlobHasher::restore(&HasherState::from_bytes(vec![1, 2, 3])).is_err());
    }
}
