//! Filtered projections of the note collection for the display layer.
//!
//! A projection is a pure function of a store snapshot and a [`ViewQuery`];
//! it never writes to the store.

use std::fmt;

use crate::note::Note;

/// Label of the synthetic bucket holding notes without a category.
pub const UNCATEGORIZED: &str = "Uncategorized";
pub const ALL_CATEGORIES: &str = "All Categories";

/// Ownership / collaboration filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FilterMode {
    #[default]
    All,
    /// Notes the viewer created.
    Mine,
    /// Notes with at least one non-blank collaborator.
    Shared,
}

impl FilterMode {
    pub fn matches(&self, note: &Note, viewer: &str) -> bool {
        match self {
            FilterMode::All => true,
            FilterMode::Mine => note.is_owned_by(viewer),
            FilterMode::Shared => note.is_shared(),
        }
    }
}

/// Category selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CategoryFilter {
    #[default]
    All,
    Uncategorized,
    /// Exact match on the (trimmed) category label.
    Named(String),
}

impl CategoryFilter {
    /// Selection for a dropdown label; the two synthetic labels map to
    /// their variants.
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "" | ALL_CATEGORIES => CategoryFilter::All,
            UNCATEGORIZED => CategoryFilter::Uncategorized,
            named => CategoryFilter::Named(named.to_string()),
        }
    }

    pub fn matches(&self, note: &Note) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Uncategorized => note.category_label().is_none(),
            CategoryFilter::Named(name) => note.category_label() == Some(name.trim()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            CategoryFilter::All => ALL_CATEGORIES,
            CategoryFilter::Uncategorized => UNCATEGORIZED,
            CategoryFilter::Named(name) => name,
        }
    }
}

impl fmt::Display for CategoryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Store order (insertion order).
    #[default]
    Store,
    /// Case-insensitive by title; ties keep store order.
    Title,
}

/// Everything a projection depends on besides the notes themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewQuery {
    pub viewer: String,
    pub filter: FilterMode,
    pub category: CategoryFilter,
    pub sort: SortOrder,
}

impl ViewQuery {
    /// Unfiltered view for `viewer`.
    pub fn for_viewer(viewer: impl Into<String>) -> Self {
        Self {
            viewer: viewer.into(),
            filter: FilterMode::default(),
            category: CategoryFilter::default(),
            sort: SortOrder::default(),
        }
    }

    pub fn with_filter(mut self, filter: FilterMode) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_category(mut self, category: CategoryFilter) -> Self {
        self.category = category;
        self
    }

    pub fn sorted_by(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    pub fn matches(&self, note: &Note) -> bool {
        self.filter.matches(note, &self.viewer) && self.category.matches(note)
    }
}

/// Notes selected by `query`, in the requested order.
pub fn project<'a>(notes: impl IntoIterator<Item = &'a Note>, query: &ViewQuery) -> Vec<Note> {
    let mut selected: Vec<Note> = notes
        .into_iter()
        .filter(|note| query.matches(note))
        .cloned()
        .collect();

    if query.sort == SortOrder::Title {
        selected.sort_by_cached_key(|note| note.title.to_lowercase());
    }
    selected
}

/// Dropdown entries: "All Categories", each present category in first-seen
/// order, then "Uncategorized" when any note lacks a category.
pub fn category_options<'a>(notes: impl IntoIterator<Item = &'a Note>) -> Vec<CategoryFilter> {
    let mut named: Vec<String> = Vec::new();
    let mut any_uncategorized = false;

    for note in notes {
        match note.category_label() {
            Some(label) => {
                if !named.iter().any(|n| n == label) {
                    named.push(label.to_string());
                }
            }
            None => any_uncategorized = true,
        }
    }

    let mut options = Vec::with_capacity(named.len() + 2);
    options.push(CategoryFilter::All);
    options.extend(named.into_iter().map(CategoryFilter::Named));
    if any_uncategorized {
        options.push(CategoryFilter::Uncategorized);
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::{NoteDraft, NoteId};

    fn note(id: u64, creator: &str, title: &str, category: Option<&str>, collaborators: &[&str]) -> Note {
        let mut draft = NoteDraft::new(title, "").with_collaborators(collaborators.iter().copied());
        draft.category = category.map(str::to_string);
        let mut note = Note::from_draft(NoteId(id), creator, draft);
        // Keep raw collaborator entries; drafts drop blanks on save.
        note.collaborators = collaborators.iter().map(|c| c.to_string()).collect();
        note
    }

    fn ids(notes: &[Note]) -> Vec<u64> {
        notes.iter().map(|n| n.id.get()).collect()
    }

    #[test]
    fn test_mine_and_shared() {
        let a = note(1, "u1", "A", None, &[]);
        let b = note(2, "u2", "B", None, &["u1"]);
        let notes = [a, b];

        let mine = project(&notes, &ViewQuery::for_viewer("u1").with_filter(FilterMode::Mine));
        assert_eq!(ids(&mine), vec![1]);

        let shared = project(&notes, &ViewQuery::for_viewer("u1").with_filter(FilterMode::Shared));
        assert_eq!(ids(&shared), vec![2]);

        let all = project(&notes, &ViewQuery::for_viewer("u1"));
        assert_eq!(ids(&all), vec![1, 2]);
    }

    #[test]
    fn test_blank_collaborator_is_not_shared() {
        let notes = [
            note(1, "u1", "A", None, &[""]),
            note(2, "u1", "B", None, &["  ", "u3"]),
        ];
        let shared = project(&notes, &ViewQuery::for_viewer("u1").with_filter(FilterMode::Shared));
        assert_eq!(ids(&shared), vec![2]);
    }

    #[test]
    fn test_uncategorized_bucket() {
        let notes = [
            note(1, "u1", "A", None, &[]),
            note(2, "u1", "B", Some("Work"), &[]),
            note(3, "u1", "C", Some(""), &[]),
        ];

        let uncategorized = project(
            &notes,
            &ViewQuery::for_viewer("u1").with_category(CategoryFilter::Uncategorized),
        );
        assert_eq!(ids(&uncategorized), vec![1, 3]);

        let work = project(
            &notes,
            &ViewQuery::for_viewer("u1").with_category(CategoryFilter::Named("Work".into())),
        );
        assert_eq!(ids(&work), vec![2]);

        let personal = project(
            &notes,
            &ViewQuery::for_viewer("u1").with_category(CategoryFilter::Named("Personal".into())),
        );
        assert!(personal.is_empty());
    }

    #[test]
    fn test_filters_combine() {
        let notes = [
            note(1, "u1", "A", Some("Work"), &[]),
            note(2, "u2", "B", Some("Work"), &["u1"]),
            note(3, "u1", "C", Some("Home"), &[]),
        ];
        let query = ViewQuery::for_viewer("u1")
            .with_filter(FilterMode::Mine)
            .with_category(CategoryFilter::from_label("Work"));
        assert_eq!(ids(&project(&notes, &query)), vec![1]);
    }

    #[test]
    fn test_title_sort_is_stable() {
        let notes = [
            note(1, "u1", "beta", None, &[]),
            note(2, "u1", "Alpha", None, &[]),
            note(3, "u1", "alpha", None, &[]),
        ];
        let sorted = project(&notes, &ViewQuery::for_viewer("u1").sorted_by(SortOrder::Title));
        assert_eq!(ids(&sorted), vec![2, 3, 1]);
    }

    #[test]
    fn test_category_options() {
        let notes = [
            note(1, "u1", "A", Some("Work"), &[]),
            note(2, "u1", "B", None, &[]),
            note(3, "u1", "C", Some("Home"), &[]),
            note(4, "u1", "D", Some("Work"), &[]),
        ];
        let labels: Vec<String> = category_options(&notes)
            .iter()
            .map(|o| o.label().to_string())
            .collect();
        assert_eq!(labels, ["All Categories", "Work", "Home", "Uncategorized"]);
    }

    #[test]
    fn test_from_label() {
        assert_eq!(CategoryFilter::from_label("All Categories"), CategoryFilter::All);
        assert_eq!(CategoryFilter::from_label("Uncategorized"), CategoryFilter::Uncategorized);
        assert_eq!(
            CategoryFilter::from_label(" Work "),
            CategoryFilter::Named("Work".into())
        );
    }
}
