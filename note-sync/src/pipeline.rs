//! Optimistic mutations and their rollback bookkeeping.
//!
//! Lifecycle of one mutation:
//! ```text
//! begin_*()  ──► optimistic write to NoteStore, PendingMutation recorded
//!     │
//!     │  (remote call in flight; pushes keep arriving)
//!     ▼
//! commit()   ──► create: re-key provisional → permanent id
//! rollback() ──► restore the entry this mutation owns, unless a later
//!                write (or a reconciled delete) has superseded it
//! ```
//!
//! The ledger never touches entries other than the one a mutation owns, so
//! a rollback cannot undo notifications applied while the request was in
//! flight.

use std::collections::{HashMap, HashSet};

use crate::error::{Result, SyncError};
use crate::ids::IdGenerator;
use crate::note::{Note, NoteDraft, NoteId};
use crate::protocol::Notification;
use crate::store::NoteStore;

/// Collisions tolerated from an id generator before falling back to
/// `max(known ids) + 1` (or one more draw when that would overflow).
const MAX_ID_DRAWS: usize = 16;

pub type MutationId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MutationKind::Create => "create",
            MutationKind::Update => "update",
            MutationKind::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// A mutation the caller asked for.
#[derive(Debug, Clone)]
pub enum MutationRequest {
    Create { creator: String, draft: NoteDraft },
    Update { id: NoteId, draft: NoteDraft },
    Delete { id: NoteId },
    /// Update of the category alone, applied to whatever the store holds
    /// for the note when the mutation begins.
    SetCategory { id: NoteId, category: String },
}

/// Handed back by `begin`: what to send to the server.
#[derive(Debug, Clone)]
pub struct Ticket {
    pub mutation: MutationId,
    pub kind: MutationKind,
    /// Create/update: the optimistic note to send. Delete: the removed note.
    pub note: Note,
}

/// In-flight mutation and the state needed to undo it.
#[derive(Debug, Clone)]
struct PendingMutation {
    kind: MutationKind,
    /// Target id. Provisional for creates.
    id: NoteId,
    /// Value written optimistically. `None` for deletes.
    optimistic: Option<Note>,
    /// Update: value before the write. Delete: the removed note.
    prior: Option<Note>,
    /// Position the entry held (delete) or was given (create).
    position: usize,
    /// A reconciled delete or a reload made this mutation's rollback moot.
    superseded: bool,
}

/// Result of resolving a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Confirmed. Carries the id the note ended up keyed on.
    Committed { id: NoteId, rekeyed_from: Option<NoteId> },
    /// Failed; `restored` tells whether the store entry was put back.
    RolledBack { restored: bool },
}

#[derive(Debug, Default)]
pub struct MutationLedger {
    pending: HashMap<MutationId, PendingMutation>,
    next_mutation: MutationId,
    /// Provisional → permanent ids of confirmed creates.
    aliases: HashMap<NoteId, NoteId>,
    /// Remote deletes seen while a create was in flight. A create confirmed
    /// onto one of these ids was deleted before its response arrived.
    deleted_during_create: HashSet<NoteId>,
}

impl MutationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, mutation: MutationId) -> bool {
        self.pending.contains_key(&mutation)
    }

    /// Follow provisional → permanent re-keys.
    pub fn resolve_id(&self, id: NoteId) -> NoteId {
        let mut current = id;
        // Aliases always point at ids issued later, so this terminates; the
        // bound only guards against a corrupted map.
        for _ in 0..=self.aliases.len() {
            match self.aliases.get(&current) {
                Some(next) => current = *next,
                None => break,
            }
        }
        current
    }

    /// Apply a mutation optimistically.
    pub fn begin(
        &mut self,
        store: &mut NoteStore,
        ids: &mut dyn IdGenerator,
        request: MutationRequest,
    ) -> Result<Ticket> {
        match request {
            MutationRequest::Create { creator, draft } => {
                Ok(self.begin_create(store, ids, &creator, draft))
            }
            MutationRequest::Update { id, draft } => self.begin_update(store, id, draft),
            MutationRequest::Delete { id } => self.begin_delete(store, id),
            MutationRequest::SetCategory { id, category } => {
                self.begin_set_category(store, id, category)
            }
        }
    }

    pub fn begin_set_category(
        &mut self,
        store: &mut NoteStore,
        id: NoteId,
        category: String,
    ) -> Result<Ticket> {
        let id = self.resolve_id(id);
        let current = store.get(id).ok_or(SyncError::NoteNotFound(id))?;
        let draft = NoteDraft::from_note(current).with_category(category);
        self.begin_update(store, id, draft)
    }

    pub fn begin_create(
        &mut self,
        store: &mut NoteStore,
        ids: &mut dyn IdGenerator,
        creator: &str,
        draft: NoteDraft,
    ) -> Ticket {
        let id = self.provisional_id(store, ids);
        let note = Note::from_draft(id, creator, draft);
        store.put_front(note.clone());

        self.record(
            PendingMutation {
                kind: MutationKind::Create,
                id,
                optimistic: Some(note.clone()),
                prior: None,
                position: 0,
                superseded: false,
            },
            note,
        )
    }

    pub fn begin_update(
        &mut self,
        store: &mut NoteStore,
        id: NoteId,
        draft: NoteDraft,
    ) -> Result<Ticket> {
        let id = self.resolve_id(id);
        let prior = store.get(id).cloned().ok_or(SyncError::NoteNotFound(id))?;
        let position = store.position(id).unwrap_or_default();
        let note = prior.with_draft(draft);
        store.put(note.clone());

        Ok(self.record(
            PendingMutation {
                kind: MutationKind::Update,
                id,
                optimistic: Some(note.clone()),
                prior: Some(prior),
                position,
                superseded: false,
            },
            note,
        ))
    }

    pub fn begin_delete(&mut self, store: &mut NoteStore, id: NoteId) -> Result<Ticket> {
        let id = self.resolve_id(id);
        let (position, removed) = store.remove_full(id).ok_or(SyncError::NoteNotFound(id))?;

        Ok(self.record(
            PendingMutation {
                kind: MutationKind::Delete,
                id,
                optimistic: None,
                prior: Some(removed.clone()),
                position,
                superseded: false,
            },
            removed,
        ))
    }

    fn record(&mut self, pending: PendingMutation, note: Note) -> Ticket {
        let mutation = self.next_mutation;
        self.next_mutation += 1;
        let kind = pending.kind;
        self.pending.insert(mutation, pending);
        Ticket { mutation, kind, note }
    }

    fn provisional_id(&self, store: &NoteStore, ids: &mut dyn IdGenerator) -> NoteId {
        for _ in 0..MAX_ID_DRAWS {
            let candidate = ids.next();
            if !self.is_known_id(store, candidate) {
                return candidate;
            }
            log::debug!("Provisional id {candidate} collides, drawing again");
        }

        let highest = store
            .iter()
            .map(|n| n.id)
            .chain(self.aliases.keys().copied())
            .chain(self.aliases.values().copied())
            .chain(self.pending.values().map(|p| p.id))
            .max()
            .map_or(0, NoteId::get);
        match highest.checked_add(1) {
            Some(next) => {
                log::warn!("Id generator kept colliding; falling back to {next}");
                NoteId(next)
            }
            None => {
                log::warn!("Id generator kept colliding and ids are exhausted; drawing once more");
                ids.next()
            }
        }
    }

    fn is_known_id(&self, store: &NoteStore, id: NoteId) -> bool {
        store.contains(id)
            || self.aliases.contains_key(&id)
            || self.pending.values().any(|p| p.id == id)
    }

    /// The server accepted the mutation. `confirmed_id` is the id returned
    /// by a create; ignored for other kinds.
    pub fn commit(
        &mut self,
        store: &mut NoteStore,
        mutation: MutationId,
        confirmed_id: Option<NoteId>,
    ) -> Option<Resolution> {
        let pending = self.pending.remove(&mutation)?;
        if pending.kind != MutationKind::Create {
            return Some(Resolution::Committed {
                id: pending.id,
                rekeyed_from: None,
            });
        }

        let provisional = pending.id;
        let permanent = confirmed_id.unwrap_or(provisional);
        if permanent == provisional {
            self.forget_deletes_when_idle();
            return Some(Resolution::Committed {
                id: permanent,
                rekeyed_from: None,
            });
        }

        self.aliases.insert(provisional, permanent);
        self.retarget(provisional, permanent);

        let deleted_remotely = self.deleted_during_create.contains(&permanent);
        self.forget_deletes_when_idle();

        if deleted_remotely {
            log::debug!("Note {permanent} was deleted before its create was confirmed");
            store.remove(provisional);
            for later in self.pending.values_mut().filter(|p| p.id == permanent) {
                later.superseded = true;
            }
        } else if !pending.superseded {
            match store.remove_full(provisional) {
                Some((index, current)) => {
                    if store.contains(permanent) {
                        // The push echo of this create got here first; keep
                        // its value and move it into the provisional slot.
                        store.move_to(permanent, index);
                    } else {
                        store.insert_at(index, current.rekeyed(permanent));
                    }
                }
                None => log::debug!(
                    "Provisional note {provisional} left the store before confirmation"
                ),
            }
        }

        Some(Resolution::Committed {
            id: permanent,
            rekeyed_from: Some(provisional),
        })
    }

    /// The server rejected the mutation: undo its optimistic write.
    pub fn rollback(&mut self, store: &mut NoteStore, mutation: MutationId) -> Option<Resolution> {
        let pending = self.pending.remove(&mutation)?;

        let restored = match pending.kind {
            MutationKind::Create => {
                self.forget_deletes_when_idle();
                store.remove(pending.id).is_some()
            }
            MutationKind::Update => {
                let still_ours = !pending.superseded
                    && pending.optimistic.as_ref() == store.get(pending.id);
                if let Some(prior) = pending.prior.as_ref() {
                    self.inherit_prior(pending.id, pending.optimistic.as_ref(), prior);
                }
                match (still_ours, pending.prior) {
                    (true, Some(prior)) => {
                        store.put(prior);
                        true
                    }
                    _ => false,
                }
            }
            MutationKind::Delete => match pending.prior {
                Some(removed) if !pending.superseded && !store.contains(pending.id) => {
                    store.insert_at(pending.position, removed);
                    true
                }
                _ => false,
            },
        };

        if !restored {
            log::debug!(
                "Rollback of {} on note {} left the store as is (superseded)",
                pending.kind,
                pending.id
            );
        }

        Some(Resolution::RolledBack { restored })
    }

    /// A later update on the same note that captured this failed update's
    /// optimistic value as its prior now falls back to this update's prior.
    fn inherit_prior(&mut self, id: NoteId, failed: Option<&Note>, prior: &Note) {
        for pending in self.pending.values_mut() {
            if pending.id == id
                && pending.kind == MutationKind::Update
                && pending.prior.as_ref() == failed
            {
                pending.prior = Some(prior.clone());
            }
        }
    }

    fn retarget(&mut self, from: NoteId, to: NoteId) {
        for pending in self.pending.values_mut() {
            if pending.id == from {
                pending.id = to;
                if let Some(note) = pending.optimistic.as_mut() {
                    note.id = to;
                }
                if let Some(note) = pending.prior.as_mut() {
                    note.id = to;
                }
            }
        }
    }

    /// Record a reconciled notification. A remote delete is terminal, so it
    /// supersedes every in-flight mutation on that note.
    pub fn observe(&mut self, notification: &Notification) {
        if let Notification::NoteDeleted(deleted) = notification {
            let deleted = self.resolve_id(*deleted);
            if self.has_pending_create() {
                self.deleted_during_create.insert(deleted);
            }
            for pending in self.pending.values_mut() {
                if pending.id == deleted {
                    pending.superseded = true;
                }
            }
        }
    }

    fn forget_deletes_when_idle(&mut self) {
        if !self.has_pending_create() {
            self.deleted_during_create.clear();
        }
    }

    fn has_pending_create(&self) -> bool {
        self.pending
            .values()
            .any(|p| p.kind == MutationKind::Create)
    }

    /// The store was reloaded from a full server snapshot. Updates and
    /// deletes defer to the snapshot; creates are still unconfirmed, so their
    /// provisional notes are shown again.
    pub fn after_reload(&mut self, store: &mut NoteStore) {
        let mut pending: Vec<(&MutationId, &mut PendingMutation)> = self
            .pending
            .iter_mut()
            .filter(|(_, p)| !p.superseded)
            .collect();
        pending.sort_by_key(|(mutation, _)| **mutation);

        for (_, pending) in pending {
            match pending.kind {
                MutationKind::Create => {
                    if let Some(note) = pending.optimistic.as_ref() {
                        if !store.contains(note.id) {
                            store.put_front(note.clone());
                        }
                    }
                }
                MutationKind::Update | MutationKind::Delete => pending.superseded = true,
            }
        }
    }

    /// Drop every in-flight mutation without touching the store.
    pub fn abandon_all(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        self.deleted_during_create.clear();
        count
    }
}
