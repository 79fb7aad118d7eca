//! Notifications from the engine to the display layer.

use crate::note::{Note, NoteId};
use crate::pipeline::MutationKind;

/// Events emitted by a [`crate::SyncEngine`].
///
/// Delivered best-effort over a bounded channel: when the consumer falls
/// behind, events are dropped rather than stalling the store task. A
/// [`StoreSnapshot`] always reflects the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The collection was (re)loaded from the server.
    Loaded { notes: usize },
    /// The note collection changed.
    NotesChanged,
    PresenceChanged(Vec<String>),
    /// A confirmed create was moved from its provisional id.
    NoteRekeyed { provisional: NoteId, permanent: NoteId },
    /// A mutation failed and its optimistic change was reverted.
    MutationRolledBack {
        kind: MutationKind,
        id: NoteId,
        message: String,
    },
    /// The server rejected the session. The engine accepts no more work.
    SessionExpired,
    SubscriptionOpened,
    SubscriptionClosed { reason: Option<String> },
}

/// Point-in-time copy of the engine's state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSnapshot {
    pub notes: Vec<Note>,
    pub categories: Vec<String>,
    pub presence: Vec<String>,
    /// Mutations still awaiting a server answer.
    pub pending: usize,
}

impl StoreSnapshot {
    pub fn get(&self, id: NoteId) -> Option<&Note> {
        self.notes.iter().find(|n| n.id == id)
    }
}
