//! Merges pushed change notifications into the note store.
//!
//! ```text
//! note-created   ─► insert if absent        (echo / duplicate → no-op)
//! note-updated   ─► insert or replace       (missed create → insert)
//! note-deleted   ─► remove if present       (unknown id → no-op)
//! online-users   ─► replace presence set wholesale
//! ```
//!
//! Every handler is idempotent: delivering a notification twice leaves the
//! store exactly as delivering it once.

use crate::note::{Note, NoteId};
use crate::protocol::Notification;
use crate::store::NoteStore;

/// Identifiers of the users currently online, in server order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceSet {
    users: Vec<String>,
}

impl PresenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole set. Returns whether anything changed.
    pub fn replace(&mut self, users: Vec<String>) -> bool {
        if self.users == users {
            return false;
        }
        self.users = users;
        true
    }

    pub fn users(&self) -> &[String] {
        &self.users
    }
}

/// What applying one notification did to local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted(NoteId),
    Replaced(NoteId),
    Removed(NoteId),
    PresenceReplaced,
    /// Already reflected in local state.
    Unchanged,
}

impl Applied {
    /// Whether the note collection changed.
    pub fn touches_notes(&self) -> bool {
        matches!(
            self,
            Applied::Inserted(_) | Applied::Replaced(_) | Applied::Removed(_)
        )
    }
}

/// Running totals, reported when the engine shuts down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub applied: u64,
    pub unchanged: u64,
}

#[derive(Debug, Default)]
pub struct Reconciler {
    stats: ReconcileStats,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> ReconcileStats {
        self.stats
    }

    pub fn apply(
        &mut self,
        store: &mut NoteStore,
        presence: &mut PresenceSet,
        notification: Notification,
    ) -> Applied {
        let applied = match notification {
            Notification::NoteCreated(note) => created(store, note),
            Notification::NoteUpdated(note) => updated(store, note),
            Notification::NoteDeleted(id) => match store.remove(id) {
                Some(_) => Applied::Removed(id),
                None => Applied::Unchanged,
            },
            Notification::PresenceSnapshot(users) => {
                if presence.replace(users) {
                    Applied::PresenceReplaced
                } else {
                    Applied::Unchanged
                }
            }
        };

        match applied {
            Applied::Unchanged => self.stats.unchanged += 1,
            _ => self.stats.applied += 1,
        }
        applied
    }
}

fn created(store: &mut NoteStore, note: Note) -> Applied {
    if store.contains(note.id) {
        log::trace!("note-created for known note {}, ignoring", note.id);
        return Applied::Unchanged;
    }
    let id = note.id;
    store.put(note);
    Applied::Inserted(id)
}

fn updated(store: &mut NoteStore, note: Note) -> Applied {
    let id = note.id;
    if store.get(id) == Some(&note) {
        return Applied::Unchanged;
    }
    match store.put(note) {
        Some(_) => Applied::Replaced(id),
        None => Applied::Inserted(id),
    }
}
