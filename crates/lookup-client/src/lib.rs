// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};
use lookup_core::{CatalogBackend, CatalogRequest, Item, ResultPage, SearchFailure};
use reqwest::StatusCode;
use reqwest::blocking::Client as HttpClient;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Blocking HTTP client for catalog search endpoints.
#[derive(Debug, Clone)]
pub struct SearchClient {
    base_url: Url,
    timeout: Duration,
    http: HttpClient,
}

impl SearchClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let trimmed = base_url.trim();
        if trimmed.is_empty() {
            bail!("catalog.base_url must not be empty");
        }

        // Endpoints are joined relative to the base, which needs a trailing slash.
        let mut base_url =
            Url::parse(trimmed).with_context(|| format!("parse catalog.base_url {trimmed:?}"))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            bail!(
                "catalog.base_url must use http or https, got {:?}",
                base_url.scheme()
            );
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url,
            timeout,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Full query URL for `request`: `{base}/{endpoint}?q=..&page=..&per_page=..&<params>`.
    pub fn query_url(&self, request: &CatalogRequest) -> Result<Url> {
        let endpoint = request.endpoint.trim().trim_start_matches('/');
        let mut url = self
            .base_url
            .join(endpoint)
            .with_context(|| format!("join endpoint {endpoint:?}"))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("q", &request.query)
                .append_pair("page", &request.page.to_string())
                .append_pair("per_page", &request.per_page.to_string());
            for (name, value) in &request.params {
                pairs.append_pair(name, value);
            }
        }
        Ok(url)
    }

    pub fn search(&self, request: &CatalogRequest) -> Result<ResultPage, SearchFailure> {
        let url = self
            .query_url(request)
            .map_err(|error| SearchFailure::transport(format!("{error:#}")))?;
        tracing::debug!(%url, "catalog search");

        let response = self.http.get(url.clone()).send().map_err(|error| {
            tracing::warn!(%url, %error, "catalog unreachable");
            SearchFailure::transport(error.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let failure = rejected_response(status, &body);
            tracing::warn!(%url, status = status.as_u16(), "catalog rejected search");
            return Err(failure);
        }

        let body = response.text().map_err(|error| {
            tracing::warn!(%url, %error, "read catalog response");
            SearchFailure::transport(error.to_string())
        })?;
        parse_page(&body, request).inspect_err(|failure| {
            tracing::warn!(%url, error = ?failure, "undecodable catalog response");
        })
    }
}

impl CatalogBackend for SearchClient {
    fn fetch_page(&self, request: &CatalogRequest) -> Result<ResultPage, SearchFailure> {
        self.search(request)
    }
}

/// Decodes a success body in any of the accepted shapes.
pub fn parse_page(body: &str, request: &CatalogRequest) -> Result<ResultPage, SearchFailure> {
    let wire: WireBody = serde_json::from_str(body)
        .map_err(|error| SearchFailure::transport(format!("decode search response: {error}")))?;
    Ok(wire.into_page().normalize(request))
}

fn rejected_response(status: StatusCode, body: &str) -> SearchFailure {
    if let Ok(parsed) = serde_json::from_str::<ErrorEnvelope>(body) {
        let message = parsed.message.or(parsed.error.map(ErrorField::into_message));
        return SearchFailure::rejected(Some(status.as_u16()), message);
    }

    let trimmed = body.trim();
    let plain = trimmed.len() < 100 && !trimmed.contains(['{', '<']);
    SearchFailure::rejected(Some(status.as_u16()), plain.then(|| trimmed.to_owned()))
}

/// Catalog endpoints answer either with a page envelope or a bare list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireBody {
    List(Vec<WireItem>),
    Page(WirePage),
}

impl WireBody {
    fn into_page(self) -> WirePage {
        match self {
            Self::Page(page) => page,
            Self::List(items) => WirePage {
                items,
                ..WirePage::default()
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct WirePage {
    #[serde(default, alias = "results")]
    items: Vec<WireItem>,
    #[serde(default)]
    page: Option<u32>,
    #[serde(default, alias = "pages")]
    total_pages: Option<u32>,
    #[serde(default, alias = "total")]
    total_count: Option<u64>,
    #[serde(default)]
    next: Option<bool>,
    #[serde(default)]
    pagination: Option<WirePagination>,
}

#[derive(Debug, Default, Deserialize)]
struct WirePagination {
    #[serde(default)]
    more: bool,
}

impl WirePage {
    fn normalize(self, request: &CatalogRequest) -> ResultPage {
        let page = self.page.unwrap_or(request.page).max(1);
        let per_page = u64::from(request.per_page.max(1));
        let next = self
            .next
            .or_else(|| self.pagination.as_ref().map(|pagination| pagination.more));
        let has_next = next.unwrap_or(false);
        let items: Vec<Item> = self.items.into_iter().filter_map(WireItem::into_item).collect();

        let total_count = self.total_count.unwrap_or_else(|| {
            let seen = u64::from(page - 1) * per_page + items.len() as u64;
            if has_next { seen + per_page } else { seen }
        });
        let total_pages = match (self.total_pages, next) {
            (Some(pages), _) => pages,
            (None, Some(true)) => page.saturating_add(1),
            (None, Some(false)) => page,
            (None, None) if self.total_count.is_some() => {
                u32::try_from(total_count.div_ceil(per_page)).unwrap_or(u32::MAX)
            }
            (None, None) if items.is_empty() && page == 1 => 0,
            (None, None) => page,
        };

        ResultPage::new(items, page, total_pages, total_count)
    }
}

#[derive(Debug, Deserialize)]
struct WireItem {
    #[serde(default)]
    id: Option<WireId>,
    #[serde(default)]
    value: Option<WireId>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    nombre: Option<String>,
}

impl WireItem {
    /// Entries without any identifier cannot be selected and are skipped.
    fn into_item(self) -> Option<Item> {
        let id = match self.id.or(self.value)? {
            WireId::Text(text) => text,
            WireId::Number(number) => number.to_string(),
        };
        let label = self
            .text
            .or(self.label)
            .or(self.nombre)
            .unwrap_or_else(|| id.clone());
        Some(Item::new(id, label))
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireId {
    Text(String),
    Number(serde_json::Number),
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<ErrorField>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorField {
    Text(String),
    Body { message: String },
}

impl ErrorField {
    fn into_message(self) -> String {
        match self {
            Self::Text(message) | Self::Body { message } => message,
        }
    }
}
