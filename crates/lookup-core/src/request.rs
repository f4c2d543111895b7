// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{FieldId, RequestId, ResultPage, SearchFailure, SessionId};

/// One paginated text query against a catalog endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRequest {
    pub endpoint: String,
    pub query: String,
    pub page: u32,
    pub per_page: u32,
    pub params: BTreeMap<String, String>,
}

/// Which surface a response belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTarget {
    Inline,
    Modal(SessionId),
}

/// Identity stamped on a request and echoed back on its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTicket {
    pub field: FieldId,
    pub target: RequestTarget,
    pub request_id: RequestId,
    pub append: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub ticket: SearchTicket,
    pub catalog: CatalogRequest,
}

impl SearchRequest {
    pub fn respond(&self, result: Result<ResultPage, SearchFailure>) -> SearchResponse {
        SearchResponse {
            ticket: self.ticket.clone(),
            result,
        }
    }

    pub fn execute<B: CatalogBackend + ?Sized>(&self, backend: &B) -> SearchResponse {
        tracing::debug!(
            field = %self.ticket.field,
            request_id = %self.ticket.request_id,
            endpoint = %self.catalog.endpoint,
            page = self.catalog.page,
            "executing catalog request"
        );
        self.respond(backend.fetch_page(&self.catalog))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResponse {
    pub ticket: SearchTicket,
    pub result: Result<ResultPage, SearchFailure>,
}

/// Something that can answer catalog queries. The HTTP client and the
/// in-memory fakes both implement it.
pub trait CatalogBackend {
    fn fetch_page(&self, request: &CatalogRequest) -> Result<ResultPage, SearchFailure>;
}

impl<B: CatalogBackend + ?Sized> CatalogBackend for &B {
    fn fetch_page(&self, request: &CatalogRequest) -> Result<ResultPage, SearchFailure> {
        (**self).fetch_page(request)
    }
}

impl<B: CatalogBackend + ?Sized> CatalogBackend for Arc<B> {
    fn fetch_page(&self, request: &CatalogRequest) -> Result<ResultPage, SearchFailure> {
        (**self).fetch_page(request)
    }
}
