//! Error types for the sync engine.

use thiserror::Error;

use crate::note::NoteId;

/// All errors surfaced by the engine and its remote service.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The note is not in the local store, so no request was issued.
    #[error("note not found: {0}")]
    NoteNotFound(NoteId),

    /// The server answered a request with a non-success status.
    #[error("remote request failed with status {status}: {message}")]
    Remote { status: u16, message: String },

    /// The request never got a usable answer.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server rejected the session's credentials. Terminal.
    #[error("session expired")]
    SessionExpired,

    /// The push subscription could not be opened or broke.
    #[error("push channel error: {0}")]
    Stream(String),

    /// A response or notification did not match the expected shape.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// The engine has been closed.
    #[error("sync engine closed")]
    Closed,
}

/// Convenience alias pinned to [`SyncError`].
pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Whether the failure leaves the session usable (rollback + notice).
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::SessionExpired | Self::Closed)
    }

    pub fn is_session_failure(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }

    /// Short message suitable for showing to the end user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NoteNotFound(_) => "Note no longer exists".to_string(),
            Self::Remote { .. } | Self::Transport(_) => {
                "Failed to save the note. Reverting changes.".to_string()
            }
            Self::SessionExpired => "Session expired. Please log in again.".to_string(),
            Self::Stream(_) => "Live updates disconnected".to_string(),
            Self::Malformed(_) => "Received unexpected data from the server".to_string(),
            Self::Closed => "Notes are no longer syncing".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_failure_is_terminal() {
        let e = SyncError::SessionExpired;
        assert!(e.is_session_failure());
        assert!(!e.is_recoverable());
        assert!(e.user_message().contains("log in"));
    }

    #[test]
    fn test_closed_is_not_recoverable() {
        assert!(!SyncError::Closed.is_recoverable());
        assert!(!SyncError::Closed.is_session_failure());
    }

    #[test]
    fn test_remote_failure_is_recoverable() {
        let e = SyncError::Remote {
            status: 500,
            message: "boom".into(),
        };
        assert!(e.is_recoverable());
        assert!(e.to_string().contains("500"));
        assert!(e.user_message().contains("Reverting"));
    }
}
