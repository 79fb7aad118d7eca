//! Merge support for the external note classifier.
//!
//! The classifier itself lives outside the engine. It receives
//! [`ClassificationInput`]s and answers with a JSON list of
//! [`CategoryAssignment`]s, often wrapped in a Markdown code fence.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::note::{Note, NoteId};

/// What the classifier is shown for one note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationInput {
    pub id: NoteId,
    pub title: String,
    pub content: String,
}

impl From<&Note> for ClassificationInput {
    fn from(note: &Note) -> Self {
        Self {
            id: note.id,
            title: note.title.clone(),
            content: note.content.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryAssignment {
    pub id: NoteId,
    pub category: String,
}

impl CategoryAssignment {
    pub fn new(id: NoteId, category: impl Into<String>) -> Self {
        Self {
            id,
            category: category.into(),
        }
    }

    /// Decode the classifier's raw answer.
    pub fn parse_response(raw: &str) -> Result<Vec<Self>> {
        serde_json::from_str(strip_code_fence(raw))
            .map_err(|e| SyncError::Malformed(format!("classifier response: {e}")))
    }
}

/// Outcome of [`crate::SyncEngine::apply_categories`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategorizeSummary {
    /// Updates confirmed by the server.
    pub applied: usize,
    /// Unknown ids, blank labels, or categories already in place.
    pub skipped: usize,
    /// Updates that failed and were rolled back.
    pub failed: usize,
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`, `JSON`, ...) up to the first newline.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    body.trim_end().trim_end_matches("```").trim()
}
