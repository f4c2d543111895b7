// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

pub const DEFAULT_PREREQUISITE_MESSAGE: &str = "Complete the required fields first.";
pub const TRANSPORT_FAILURE_MESSAGE: &str = "Could not fetch results.";
pub const REJECTED_FALLBACK_MESSAGE: &str = "No results available.";
pub const NO_MATCHES_MESSAGE: &str = "No matching results.";
pub const LOADING_MESSAGE: &str = "Searching…";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub label: String,
}

impl Item {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultPage {
    pub items: Vec<Item>,
    pub page: u32,
    pub total_pages: u32,
    pub total_count: u64,
}

impl ResultPage {
    /// Builds a page, dropping repeated ids (first occurrence wins) and
    /// clamping a zero page index to 1.
    pub fn new(items: Vec<Item>, page: u32, total_pages: u32, total_count: u64) -> Self {
        let mut seen = HashSet::with_capacity(items.len());
        let before = items.len();
        let items: Vec<Item> = items
            .into_iter()
            .filter(|item| seen.insert(item.id.clone()))
            .collect();
        if items.len() != before {
            tracing::warn!(
                dropped = before - items.len(),
                page,
                "duplicate ids removed from result page"
            );
        }

        Self {
            items,
            page: page.max(1),
            total_pages,
            total_count,
        }
    }

    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            page: 1,
            total_pages: 0,
            total_count: 0,
        }
    }

    pub fn has_more(&self) -> bool {
        self.page < self.total_pages
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchFailure {
    #[error("{}", TRANSPORT_FAILURE_MESSAGE)]
    Transport { detail: String },
    #[error("{}", .message.as_deref().unwrap_or(REJECTED_FALLBACK_MESSAGE))]
    Rejected {
        status: Option<u16>,
        message: Option<String>,
    },
}

impl SearchFailure {
    pub fn transport(detail: impl Into<String>) -> Self {
        Self::Transport {
            detail: detail.into(),
        }
    }

    pub fn rejected(status: Option<u16>, message: Option<String>) -> Self {
        let message = message
            .map(|message| message.trim().to_owned())
            .filter(|message| !message.is_empty());
        Self::Rejected { status, message }
    }

    /// The text shown inline in place of results.
    pub fn display_message(&self) -> String {
        self.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Choice {
    Item(Item),
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Selected(String),
    ExplicitEmpty,
    Missing,
}

impl FieldValue {
    /// Resolves to the submitted string, using `empty_marker` for an
    /// explicit "none" choice.
    pub fn as_form_value<'a>(&'a self, empty_marker: &'a str) -> Option<&'a str> {
        match self {
            Self::Selected(id) => Some(id),
            Self::ExplicitEmpty => Some(empty_marker),
            Self::Missing => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ResultsStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    NoMatches,
    Prerequisite(String),
    Failed(String),
}

impl ResultsStatus {
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Idle | Self::Ready => None,
            Self::Loading => Some(LOADING_MESSAGE),
            Self::NoMatches => Some(NO_MATCHES_MESSAGE),
            Self::Prerequisite(message) | Self::Failed(message) => Some(message),
        }
    }
}

/// What an inline result list should show right now.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResultsView {
    pub visible: bool,
    pub items: Vec<Item>,
    pub status: ResultsStatus,
    pub has_more: bool,
}

impl ResultsView {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }

    pub fn show_message(&mut self, status: ResultsStatus) {
        self.items.clear();
        self.has_more = false;
        self.status = status;
        self.visible = true;
    }

    pub fn start_loading(&mut self, append: bool) {
        if !append {
            self.items.clear();
        }
        self.has_more = false;
        self.status = ResultsStatus::Loading;
        self.visible = true;
    }

    pub fn merge_page(&mut self, page: &ResultPage, append: bool) {
        if append {
            self.items.extend(page.items.iter().cloned());
        } else {
            self.items = page.items.clone();
        }
        self.has_more = page.has_more();
        self.status = if self.items.is_empty() {
            ResultsStatus::NoMatches
        } else {
            ResultsStatus::Ready
        };
        self.visible = true;
    }
}

#[cfg(test)]
mod tests {
    use super::{
        FieldValue, Item, NO_MATCHES_MESSAGE, ResultPage, ResultsStatus, ResultsView,
        SearchFailure,
    };

    #[test]
    fn result_page_drops_duplicate_ids() {
        let page = ResultPage::new(
            vec![
                Item::new("1", "Central"),
                Item::new("2", "North"),
                Item::new("1", "Central again"),
            ],
            1,
            1,
            3,
        );
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].label, "Central");
    }

    #[test]
    fn has_more_requires_page_below_total() {
        assert!(ResultPage::new(Vec::new(), 1, 3, 45).has_more());
        assert!(!ResultPage::new(Vec::new(), 3, 3, 45).has_more());
        assert!(!ResultPage::empty().has_more());
    }

    #[test]
    fn rejected_failure_falls_back_to_generic_message() {
        let failure = SearchFailure::rejected(Some(400), Some("   ".to_owned()));
        assert_eq!(failure.display_message(), "No results available.");

        let failure = SearchFailure::rejected(Some(429), Some("quota exceeded".to_owned()));
        assert_eq!(failure.display_message(), "quota exceeded");
    }

    #[test]
    fn transport_failure_hides_detail() {
        let failure = SearchFailure::transport("connection refused");
        assert_eq!(failure.display_message(), "Could not fetch results.");
    }

    #[test]
    fn merge_page_marks_empty_pages_as_no_matches() {
        let mut view = ResultsView::default();
        view.merge_page(&ResultPage::empty(), false);
        assert_eq!(view.status, ResultsStatus::NoMatches);
        assert_eq!(view.status.message(), Some(NO_MATCHES_MESSAGE));
        assert!(view.visible);
    }

    #[test]
    fn append_keeps_existing_items_while_loading() {
        let mut view = ResultsView::default();
        view.merge_page(&ResultPage::new(vec![Item::new("1", "A")], 1, 2, 2), false);
        view.start_loading(true);
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.status, ResultsStatus::Loading);

        view.merge_page(&ResultPage::new(vec![Item::new("2", "B")], 2, 2, 2), true);
        assert_eq!(view.items.len(), 2);
        assert!(!view.has_more);
    }

    #[test]
    fn form_value_resolution() {
        assert_eq!(
            FieldValue::Selected("7".to_owned()).as_form_value("none"),
            Some("7")
        );
        assert_eq!(FieldValue::ExplicitEmpty.as_form_value("none"), Some("none"));
        assert_eq!(FieldValue::Missing.as_form_value("none"), None);
    }
}
