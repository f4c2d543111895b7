// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::{
    CatalogRequest, Debouncer, FieldConfig, FieldId, FieldValue, Item, RequestId, RequestTarget,
    ResultsStatus, ResultsView, SearchFailure, SearchRequest, SearchResponse, SearchTicket,
    ResultPage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    Disabled,
    Cleared,
    BelowMinimum,
    Scheduled,
}

/// State of one search input. Cross-field behavior (gates, cascades) lives
/// in [`crate::LookupForm`]; this type only mutates itself.
#[derive(Debug, Clone)]
pub struct LookupField {
    config: FieldConfig,
    display_text: String,
    selection: Option<Item>,
    chose_empty: bool,
    enabled: bool,
    pending_request_id: RequestId,
    results: ResultsView,
    current_query: String,
    page: u32,
    debounce: Debouncer<String>,
}

impl LookupField {
    pub fn new(config: FieldConfig, debounce: Duration) -> Self {
        let enabled = config.required_gates.is_empty();
        let selection = config.initial.clone();
        let chose_empty = selection.is_none() && config.initial_empty;
        let display_text = match &selection {
            Some(item) => item.label.clone(),
            None if chose_empty => config.empty_label().to_owned(),
            None => String::new(),
        };
        Self {
            config,
            display_text,
            selection,
            chose_empty,
            enabled,
            pending_request_id: RequestId::default(),
            results: ResultsView::default(),
            current_query: String::new(),
            page: 1,
            debounce: Debouncer::new(debounce),
        }
    }

    pub fn id(&self) -> &FieldId {
        &self.config.id
    }

    pub fn config(&self) -> &FieldConfig {
        &self.config
    }

    pub fn display_text(&self) -> &str {
        &self.display_text
    }

    pub fn selection(&self) -> Option<&Item> {
        self.selection.as_ref()
    }

    pub fn chose_empty(&self) -> bool {
        self.chose_empty
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn pending_request_id(&self) -> RequestId {
        self.pending_request_id
    }

    pub fn results(&self) -> &ResultsView {
        &self.results
    }

    pub fn current_query(&self) -> &str {
        &self.current_query
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    pub fn value(&self) -> FieldValue {
        match (&self.selection, self.chose_empty) {
            (Some(item), _) => FieldValue::Selected(item.id.clone()),
            (None, true) => FieldValue::ExplicitEmpty,
            (None, false) => FieldValue::Missing,
        }
    }

    pub(crate) fn record_input(&mut self, text: &str, now: Instant) -> InputOutcome {
        if !self.enabled {
            return InputOutcome::Disabled;
        }
        // Editing the text detaches the committed value; downstream fields
        // follow through the enabled recomputation, not a cascade.
        if self.committed_label().is_some_and(|label| label != text) {
            self.selection = None;
            self.chose_empty = false;
        }
        self.display_text = text.to_owned();

        let query = text.trim();
        if query.is_empty() {
            return InputOutcome::Cleared;
        }
        if query.chars().count() < self.config.min_chars {
            self.debounce.cancel();
            self.invalidate();
            self.results.clear();
            return InputOutcome::BelowMinimum;
        }

        self.debounce.schedule(query.to_owned(), now);
        InputOutcome::Scheduled
    }

    fn committed_label(&self) -> Option<&str> {
        match (&self.selection, self.chose_empty) {
            (Some(item), _) => Some(&item.label),
            (None, true) => Some(self.config.empty_label()),
            (None, false) => None,
        }
    }

    pub(crate) fn take_due_query(&mut self, now: Instant) -> Option<String> {
        self.debounce.take_due(now)
    }

    pub(crate) fn begin_search(
        &mut self,
        query: &str,
        page: u32,
        append: bool,
        params: BTreeMap<String, String>,
    ) -> SearchRequest {
        self.debounce.cancel();
        self.pending_request_id = self.pending_request_id.next();
        self.current_query = query.to_owned();
        self.results.start_loading(append);

        SearchRequest {
            ticket: SearchTicket {
                field: self.config.id.clone(),
                target: RequestTarget::Inline,
                request_id: self.pending_request_id,
                append,
            },
            catalog: CatalogRequest {
                endpoint: self.config.endpoint.clone(),
                query: query.to_owned(),
                page: page.max(1),
                per_page: self.config.effective_page_size(),
                params,
            },
        }
    }

    pub(crate) fn show_prerequisite(&mut self) {
        self.debounce.cancel();
        self.invalidate();
        let message = self.config.prerequisite_message().to_owned();
        self.results.show_message(ResultsStatus::Prerequisite(message));
    }

    /// Applies a response if it answers the latest request; returns whether
    /// it was applied.
    pub(crate) fn apply(&mut self, response: &SearchResponse) -> bool {
        if response.ticket.request_id != self.pending_request_id {
            tracing::debug!(
                field = %self.config.id,
                stale = %response.ticket.request_id,
                current = %self.pending_request_id,
                "discarding stale response"
            );
            return false;
        }

        match &response.result {
            Ok(page) => self.apply_page(page, response.ticket.append),
            Err(failure) => self.apply_failure(failure),
        }
        true
    }

    fn apply_page(&mut self, page: &ResultPage, append: bool) {
        self.page = page.page;
        self.results.merge_page(page, append);
    }

    fn apply_failure(&mut self, failure: &SearchFailure) {
        tracing::warn!(field = %self.config.id, error = ?failure, "catalog query failed");
        self.results
            .show_message(ResultsStatus::Failed(failure.display_message()));
    }

    pub(crate) fn next_page(&self) -> Option<u32> {
        (self.results.has_more && self.results.status == ResultsStatus::Ready)
            .then(|| self.page.saturating_add(1))
    }

    pub(crate) fn choose_item(&mut self, item: Item) {
        self.display_text = item.label.clone();
        self.selection = Some(item);
        self.chose_empty = false;
        self.close_results();
    }

    pub(crate) fn choose_empty(&mut self) {
        self.display_text = self.config.empty_label().to_owned();
        self.selection = None;
        self.chose_empty = true;
        self.close_results();
    }

    pub(crate) fn clear(&mut self) {
        self.display_text.clear();
        self.selection = None;
        self.chose_empty = false;
        self.current_query.clear();
        self.page = 1;
        self.close_results();
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub(crate) fn focus(&mut self) {
        if !self.results.items.is_empty() || self.results.status.message().is_some() {
            self.results.visible = true;
        }
    }

    pub(crate) fn dismiss(&mut self) {
        self.results.hide();
    }

    fn close_results(&mut self) {
        self.debounce.cancel();
        self.invalidate();
        self.results.clear();
    }

    fn invalidate(&mut self) {
        self.pending_request_id = self.pending_request_id.next();
    }
}
