//! Finalized blob records.

use crate::digest::DigestAddress;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::OffsetDateTime;

/// A finalized, immutable, content-addressed blob.
///
/// Created exactly once per distinct digest; a second completion with the
/// same digest returns the existing record without touching storage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Blob {
    /// Content address, the sole primary key.
    pub digest: DigestAddress,
    /// When the blob was first committed.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Path of the committed content-addressed file.
    pub location: PathBuf,
}

impl Blob {
    /// Create a record for a freshly committed blob.
    pub fn new(digest: DigestAddress, location: PathBuf) -> Self {
        Self {
            digest,
            created_at: OffsetDateTime::now_utc(),
            location,
        }
    }
}
