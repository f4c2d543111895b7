// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::{
    CatalogRequest, Debouncer, FieldConfig, FieldId, Item, RequestId, RequestTarget,
    ResultsStatus, SearchRequest, SearchResponse, SearchTicket, SessionId,
};

/// Paging state of the browse-all view for the field it is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModalSession {
    session_id: SessionId,
    field: FieldId,
    query: String,
    current_page: u32,
    total_pages: u32,
    total_count: u64,
    items: Vec<Item>,
    status: ResultsStatus,
    empty_option: Option<String>,
    pending_request_id: RequestId,
}

impl ModalSession {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn field(&self) -> &FieldId {
        &self.field
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn status(&self) -> &ResultsStatus {
        &self.status
    }

    /// Label of the explicit "no value" row, when the bound field allows one.
    pub fn empty_option(&self) -> Option<&str> {
        self.empty_option.as_deref()
    }

    pub fn has_previous(&self) -> bool {
        self.current_page > 1
    }

    pub fn has_next(&self) -> bool {
        self.current_page < self.total_pages
    }

    fn clamp_page(&self, page: u32) -> u32 {
        page.clamp(1, self.total_pages.max(1))
    }
}

/// The single shared browse-all surface. Binding it to a field revokes any
/// previous binding; late responses for the old session are dropped.
#[derive(Debug, Clone)]
pub struct ModalBrowser {
    session: Option<ModalSession>,
    last_session: SessionId,
    debounce: Debouncer<String>,
}

impl ModalBrowser {
    pub fn new(debounce: Duration) -> Self {
        Self {
            session: None,
            last_session: SessionId::default(),
            debounce: Debouncer::new(debounce),
        }
    }

    pub fn session(&self) -> Option<&ModalSession> {
        self.session.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    pub fn bound_field(&self) -> Option<&FieldId> {
        self.session.as_ref().map(ModalSession::field)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    pub(crate) fn open(&mut self, config: &FieldConfig) -> SessionId {
        if let Some(previous) = &self.session {
            tracing::debug!(
                previous = %previous.field,
                next = %config.id,
                "rebinding browse-all session"
            );
        }
        self.debounce.cancel();
        self.last_session = self.last_session.next();
        self.session = Some(ModalSession {
            session_id: self.last_session,
            field: config.id.clone(),
            query: String::new(),
            current_page: 1,
            total_pages: 0,
            total_count: 0,
            items: Vec::new(),
            status: ResultsStatus::Idle,
            empty_option: config
                .allow_empty_option
                .then(|| config.empty_label().to_owned()),
            pending_request_id: RequestId::default(),
        });
        self.last_session
    }

    pub(crate) fn close(&mut self) -> Option<FieldId> {
        self.debounce.cancel();
        self.session.take().map(|session| session.field)
    }

    pub(crate) fn schedule_query(&mut self, text: &str, now: Instant) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        session.query = text.trim().to_owned();
        self.debounce.schedule(session.query.clone(), now);
        true
    }

    pub(crate) fn take_due_query(&mut self, now: Instant) -> Option<String> {
        self.debounce.take_due(now)
    }

    /// Resolves a requested page number against the current bounds.
    pub(crate) fn target_page(&self, page: u32) -> Option<u32> {
        self.session.as_ref().map(|session| session.clamp_page(page))
    }

    pub(crate) fn begin_request(
        &mut self,
        config: &FieldConfig,
        page: u32,
        params: BTreeMap<String, String>,
    ) -> Option<SearchRequest> {
        let session = self.session.as_mut()?;
        if session.field != config.id {
            return None;
        }
        self.debounce.cancel();
        session.pending_request_id = session.pending_request_id.next();
        session.status = ResultsStatus::Loading;

        Some(SearchRequest {
            ticket: SearchTicket {
                field: session.field.clone(),
                target: RequestTarget::Modal(session.session_id),
                request_id: session.pending_request_id,
                append: false,
            },
            catalog: CatalogRequest {
                endpoint: config.endpoint.clone(),
                query: session.query.clone(),
                page: page.max(1),
                per_page: config.effective_page_size(),
                params,
            },
        })
    }

    pub(crate) fn apply(&mut self, response: &SearchResponse) -> bool {
        let RequestTarget::Modal(session_id) = response.ticket.target else {
            return false;
        };
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if session.session_id != session_id || session.pending_request_id != response.ticket.request_id
        {
            tracing::debug!(
                field = %response.ticket.field,
                request_id = %response.ticket.request_id,
                "discarding stale browse-all response"
            );
            return false;
        }

        match &response.result {
            Ok(page) => {
                session.items = page.items.clone();
                session.current_page = page.page;
                session.total_pages = page.total_pages;
                session.total_count = page.total_count;
                session.status = if page.items.is_empty() {
                    ResultsStatus::NoMatches
                } else {
                    ResultsStatus::Ready
                };
            }
            Err(failure) => {
                tracing::warn!(field = %session.field, error = ?failure, "browse-all query failed");
                session.items.clear();
                session.status = ResultsStatus::Failed(failure.display_message());
            }
        }
        true
    }
}
