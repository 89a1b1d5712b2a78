//! Upload session types and lifecycle.

use crate::hash::HasherState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use time::OffsetDateTime;
use uuid::Uuid;

/// Server-minted token identifying one logical upload attempt.
///
/// Minted the first time a given upload id is seen and stored on the
/// session. A caller presenting a different token for the same upload id
/// is a second, independent attempt racing on that id; the session is
/// failed rather than letting two writers interleave.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(Uuid);

impl SessionToken {
    /// Mint a new random token.
    pub fn mint() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID (as read back from persistent storage).
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidSessionToken(e.to_string()))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken({})", self.0)
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Upload session state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// Session is open and accepting appends.
    Active,
    /// Completion is in progress; the hasher is being finalized.
    Finalizing,
    /// Session was finalized into a blob.
    Completed,
    /// Corruption or a conflicting attempt was detected; not resumable.
    Failed,
}

impl UploadStatus {
    /// Check if the session reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Stable string form used by the metadata store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse the stable string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "finalizing" => Some(Self::Finalizing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resumable upload session.
///
/// Invariant: after a successful append returns, `next_offset` equals the
/// number of bytes durably committed to the staging file. A crash between
/// the file write and the record update leaves the file ahead of the
/// record, which is safe; the file ever being behind the record means
/// bytes were lost and the session is failed rather than repaired.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadSession {
    /// Client-supplied upload identifier, stable for one upload attempt.
    pub upload_id: String,
    /// Token of the attempt that owns this session.
    pub session_token: SessionToken,
    /// When the session was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the session was last updated.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// Staging file holding bytes received so far.
    pub staging_path: PathBuf,
    /// Byte offset the next append must start at.
    pub next_offset: u64,
    /// Serialized hasher snapshot; absent only before any bytes arrive.
    pub hasher_state: Option<HasherState>,
    /// Current session state.
    pub status: UploadStatus,
}

impl UploadSession {
    /// Create a fresh Active session with no bytes received.
    pub fn new(upload_id: String, session_token: SessionToken, staging_path: PathBuf) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            upload_id,
            session_token,
            created_at: now,
            updated_at: now,
            staging_path,
            next_offset: 0,
            hasher_state: None,
            status: UploadStatus::Active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_token_roundtrip() {
        let token = SessionToken::mint();
        let parsed = SessionToken::parse(&token.to_string()).unwrap();
        assert_eq!(token, parsed);
        assert!(SessionToken::parse("not-a-uuid").is_err());
    }

    #[test]
    fn test_status_terminal_flags() {
        assert!(!UploadStatus::Active.is_terminal());
        assert!(!UploadStatus::Finalizing.is_terminal());
        assert!(UploadStatus::Completed.is_terminal());
        assert!(UploadStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in [
            UploadStatus::Active,
            UploadStatus::Finalizing,
            UploadStatus::Completed,
            UploadStatus::Failed,
        ] {
            assert_eq!(UploadStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(UploadStatus::parse("unknown"), None);
    }

    #[test]
    fn test_new_session_starts_empty_and_active() {
        let session = UploadSession::new(
            "u1".to_string(),
            SessionToken::mint(),
            PathBuf::from("/tmp/u1"),
        );
        assert_eq!(session.next_offset, 0);
        assert!(session.hasher_state.is_none());
        assert_eq!(session.status, UploadStatus::Active);
    }
}
