//! In-memory note collection owned by the sync engine.
//!
//! Keyed by [`NoteId`] with insertion order preserved, which is the default
//! display order. All operations are synchronous and infallible; the store
//! itself takes no locks because only the engine's store task touches it.

use indexmap::IndexMap;

use crate::note::{Note, NoteId};

#[derive(Debug, Clone, Default)]
pub struct NoteStore {
    notes: IndexMap<NoteId, Note>,
}

/// Order-sensitive: two stores are equal only if they list the same notes in
/// the same order.
impl PartialEq for NoteStore {
    fn eq(&self, other: &Self) -> bool {
        self.notes.len() == other.notes.len() && self.notes.iter().eq(other.notes.iter())
    }
}

impl Eq for NoteStore {}

impl NoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from an initial listing. See [`NoteStore::replace_all`].
    pub fn from_notes(notes: impl IntoIterator<Item = Note>) -> Self {
        let mut store = Self::new();
        store.replace_all(notes);
        store
    }

    pub fn get(&self, id: NoteId) -> Option<&Note> {
        self.notes.get(&id)
    }

    pub fn contains(&self, id: NoteId) -> bool {
        self.notes.contains_key(&id)
    }

    /// Owned, order-stable snapshot.
    pub fn list(&self) -> Vec<Note> {
        self.notes.values().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Note> {
        self.notes.values()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Insert or replace by id. A replaced entry keeps its position; a new
    /// entry goes last. Returns the previous value.
    pub fn put(&mut self, note: Note) -> Option<Note> {
        self.notes.insert(note.id, note)
    }

    /// Insert (or move) `note` to the first position.
    pub fn put_front(&mut self, note: Note) {
        self.notes.shift_insert(0, note.id, note);
    }

    /// Insert `note` at `index`, clamped to the valid range.
    pub fn insert_at(&mut self, index: usize, note: Note) {
        let id = note.id;
        if self.notes.contains_key(&id) {
            self.notes.insert(id, note);
            self.move_to(id, index);
        } else {
            let index = index.min(self.notes.len());
            self.notes.shift_insert(index, id, note);
        }
    }

    pub fn position(&self, id: NoteId) -> Option<usize> {
        self.notes.get_index_of(&id)
    }

    /// Move an existing entry to `index` (clamped). Unknown ids are ignored.
    pub fn move_to(&mut self, id: NoteId, index: usize) {
        if let Some(from) = self.notes.get_index_of(&id) {
            let to = index.min(self.notes.len() - 1);
            self.notes.move_index(from, to);
        }
    }

    pub fn remove(&mut self, id: NoteId) -> Option<Note> {
        self.notes.shift_remove(&id)
    }

    /// Remove an entry and report the position it held.
    pub fn remove_full(&mut self, id: NoteId) -> Option<(usize, Note)> {
        self.notes
            .shift_remove_full(&id)
            .map(|(index, _, note)| (index, note))
    }

    /// Replace the whole collection. Duplicate ids in `notes` collapse onto
    /// the first occurrence's position with the last occurrence's value.
    pub fn replace_all(&mut self, notes: impl IntoIterator<Item = Note>) {
        self.notes.clear();
        for note in notes {
            self.notes.insert(note.id, note);
        }
    }

    /// Category index: distinct non-blank categories in first-seen order.
    pub fn categories(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for label in self.notes.values().filter_map(Note::category_label) {
            if !seen.iter().any(|c| c == label) {
                seen.push(label.to_string());
            }
        }
        seen
    }
}
