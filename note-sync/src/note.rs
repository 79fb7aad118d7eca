//! Note entity, identifiers and user-entered drafts.
//!
//! Wire shape (JSON, shared by REST bodies and push payloads):
//! ```text
//! {
//!   "id": 1718000000000123,          // number or decimal string
//!   "title": "Groceries",
//!   "content": "milk, eggs",
//!   "category": "Home" | null,       // optional
//!   "collaborators": ["a@x.io"],     // optional, defaults to []
//!   "creator": "me@x.io"
//! }
//! ```

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// Title given to drafts saved with a blank title.
pub const UNTITLED: &str = "Untitled";

/// Stable note identifier.
///
/// Provisional ids are generated locally as numbers, so the client keeps
/// every id numeric. The decoder also accepts ids sent as digit strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NoteId(pub u64);

impl NoteId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for NoteId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl<'de> Deserialize<'de> for NoteId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(u64),
            Text(String),
        }

        match RawId::deserialize(deserializer)? {
            RawId::Number(n) => Ok(NoteId(n)),
            RawId::Text(s) => s
                .trim()
                .parse::<u64>()
                .map(NoteId)
                .map_err(|_| D::Error::custom(format!("invalid note id {s:?}"))),
        }
    }
}

/// A note as held by the store and exchanged with the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub collaborators: Vec<String>,
    /// Owning user. Never changes after creation.
    pub creator: String,
}

impl Note {
    /// Build a brand-new note from a draft.
    pub fn from_draft(id: NoteId, creator: impl Into<String>, draft: NoteDraft) -> Self {
        let draft = draft.normalized();
        Self {
            id,
            title: draft.title,
            content: draft.content,
            category: draft.category,
            collaborators: draft.collaborators,
            creator: creator.into(),
        }
    }

    /// Full replacement of the editable fields. `id` and `creator` are kept.
    pub fn with_draft(&self, draft: NoteDraft) -> Self {
        Self::from_draft(self.id, self.creator.clone(), draft)
    }

    /// Same fields keyed on a different id.
    pub fn rekeyed(&self, id: NoteId) -> Self {
        Self { id, ..self.clone() }
    }

    /// Category label, or `None` for the uncategorized bucket.
    ///
    /// Blank labels count as uncategorized.
    pub fn category_label(&self) -> Option<&str> {
        self.category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    /// Collaborators with blank entries skipped.
    pub fn named_collaborators(&self) -> impl Iterator<Item = &str> {
        self.collaborators
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
    }

    /// Whether at least one real collaborator is attached.
    pub fn is_shared(&self) -> bool {
        self.named_collaborators().next().is_some()
    }

    pub fn is_owned_by(&self, user: &str) -> bool {
        self.creator == user
    }
}

/// The user-editable part of a note.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
    pub category: Option<String>,
    pub collaborators: Vec<String>,
}

impl NoteDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_collaborators<I, S>(mut self, collaborators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.collaborators = collaborators.into_iter().map(Into::into).collect();
        self
    }

    /// Split a comma-separated collaborator field as typed in the editor.
    pub fn parse_collaborators(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Draft carrying the current values of `note`.
    pub fn from_note(note: &Note) -> Self {
        Self {
            title: note.title.clone(),
            content: note.content.clone(),
            category: note.category.clone(),
            collaborators: note.collaborators.clone(),
        }
    }

    /// Apply the editor's save rules: blank title becomes [`UNTITLED`], blank
    /// category becomes `None`, blank collaborator entries are dropped.
    pub fn normalized(self) -> Self {
        let title = if self.title.trim().is_empty() {
            UNTITLED.to_string()
        } else {
            self.title
        };
        let category = self
            .category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        let collaborators = self
            .collaborators
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        Self {
            title,
            content: self.content,
            category,
            collaborators,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(id: u64) -> Note {
        Note::from_draft(
            NoteId(id),
            "owner@example.com",
            NoteDraft::new("Title", "Body").with_category("Work"),
        )
    }

    #[test]
    fn test_note_id_accepts_number_and_string() {
        let a: NoteId = serde_json::from_str("42").unwrap();
        let b: NoteId = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(a, NoteId(42));
        assert_eq!(a, b);
        assert!(serde_json::from_str::<NoteId>("\"abc\"").is_err());
        assert!(serde_json::from_str::<NoteId>("-1").is_err());
    }

    #[test]
    fn test_note_decodes_with_optional_fields_missing() {
        let raw = r#"{"id": 7, "title": "t", "content": "c", "creator": "u1"}"#;
        let note: Note = serde_json::from_str(raw).unwrap();
        assert_eq!(note.id, NoteId(7));
        assert!(note.category.is_none());
        assert!(note.collaborators.is_empty());
    }

    #[test]
    fn test_note_rejects_missing_creator() {
        let raw = r#"{"id": 7, "title": "t", "content": "c"}"#;
        assert!(serde_json::from_str::<Note>(raw).is_err());
    }

    #[test]
    fn test_with_draft_keeps_id_and_creator() {
        let original = note(1);
        let edited = original.with_draft(NoteDraft::new("New", "Text"));
        assert_eq!(edited.id, original.id);
        assert_eq!(edited.creator, original.creator);
        assert_eq!(edited.title, "New");
        assert!(edited.category.is_none());
    }

    #[test]
    fn test_rekeyed_preserves_fields() {
        let original = note(1);
        let moved = original.rekeyed(NoteId(99));
        assert_eq!(moved.id, NoteId(99));
        assert_eq!(moved.title, original.title);
        assert_eq!(moved.category, original.category);
        assert_eq!(moved.creator, original.creator);
    }

    #[test]
    fn test_draft_normalization() {
        let draft = NoteDraft {
            title: "   ".into(),
            content: "x".into(),
            category: Some("  ".into()),
            collaborators: vec!["".into(), " b@x.io ".into()],
        }
        .normalized();
        assert_eq!(draft.title, UNTITLED);
        assert!(draft.category.is_none());
        assert_eq!(draft.collaborators, vec!["b@x.io".to_string()]);
    }

    #[test]
    fn test_parse_collaborators() {
        assert_eq!(
            NoteDraft::parse_collaborators("a@x.io, b@x.io ,,"),
            vec!["a@x.io".to_string(), "b@x.io".to_string()]
        );
        assert!(NoteDraft::parse_collaborators("").is_empty());
    }

    #[test]
    fn test_blank_collaborator_is_not_shared() {
        let mut n = note(1);
        n.collaborators = vec!["".into()];
        assert!(!n.is_shared());
        n.collaborators.push("c@x.io".into());
        assert!(n.is_shared());
    }

    #[test]
    fn test_category_label_ignores_blank() {
        let mut n = note(1);
        assert_eq!(n.category_label(), Some("Work"));
        n.category = Some(" ".into());
        assert_eq!(n.category_label(), None);
        n.category = None;
        assert_eq!(n.category_label(), None);
    }
}
