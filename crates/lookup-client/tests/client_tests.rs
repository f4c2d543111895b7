// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow};
use lookup_client::SearchClient;
use lookup_core::{CatalogBackend, CatalogRequest, Item, SearchFailure};
use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;
use tiny_http::{Header, Response, Server};

fn json_response(status: u16, body: &str) -> Response<std::io::Cursor<Vec<u8>>> {
    Response::from_string(body)
        .with_status_code(status)
        .with_header(
            Header::from_bytes("Content-Type", "application/json")
                .expect("valid content type header"),
        )
}

fn office_request() -> CatalogRequest {
    CatalogRequest {
        endpoint: "offices/search".to_owned(),
        query: "north".to_owned(),
        page: 1,
        per_page: 20,
        params: BTreeMap::from([("service_id".to_owned(), "12".to_owned())]),
    }
}

/// Serves one canned response and returns the URL the client asked for.
fn serve_once(status: u16, body: &'static str) -> Result<(String, thread::JoinHandle<String>)> {
    let server =
        Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
    let addr = format!("http://{}/api", server.server_addr());

    let handle = thread::spawn(move || {
        let request = server.recv().expect("request expected");
        let url = request.url().to_owned();
        request
            .respond(json_response(status, body))
            .expect("response should succeed");
        url
    });
    Ok((addr, handle))
}

#[test]
fn unreachable_catalog_is_transport_failure() {
    let client = SearchClient::new("http://127.0.0.1:1/api", Duration::from_millis(50))
        .expect("client should initialize");

    let failure = client
        .fetch_page(&office_request())
        .expect_err("search should fail for unreachable endpoint");
    assert!(matches!(failure, SearchFailure::Transport { .. }));
    assert_eq!(failure.display_message(), "Could not fetch results.");
}

#[test]
fn search_sends_query_paging_and_gate_parameters() -> Result<()> {
    let (addr, handle) = serve_once(
        200,
        r#"{"items":[{"id":"o1","label":"North Wing 101"}],"page":1,"total_pages":1,"total_count":1}"#,
    )?;

    let client = SearchClient::new(&addr, Duration::from_secs(1))?;
    let page = client.fetch_page(&office_request())?;
    assert_eq!(page.items, vec![Item::new("o1", "North Wing 101")]);
    assert!(!page.has_more());

    let url = handle.join().expect("server thread should join");
    assert_eq!(url, "/api/offices/search?q=north&page=1&per_page=20&service_id=12");
    Ok(())
}

#[test]
fn legacy_results_shape_is_normalized() -> Result<()> {
    let (addr, handle) = serve_once(
        200,
        r#"{"results":[{"id":4,"text":"Central · Pharmacy"},{"id":4,"text":"Central · Pharmacy"}],"next":true}"#,
    )?;

    let client = SearchClient::new(&addr, Duration::from_secs(1))?;
    let page = client.fetch_page(&office_request())?;
    assert_eq!(page.items, vec![Item::new("4", "Central · Pharmacy")]);
    assert!(page.has_more());

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn bare_list_body_is_accepted() -> Result<()> {
    let (addr, handle) = serve_once(200, r#"[{"id":3,"nombre":"Bodega Norte"},{"id":5,"nombre":"Bodega Sur"}]"#)?;

    let client = SearchClient::new(&addr, Duration::from_secs(1))?;
    let page = client.fetch_page(&office_request())?;
    assert_eq!(
        page.items,
        vec![Item::new("3", "Bodega Norte"), Item::new("5", "Bodega Sur")]
    );
    assert!(!page.has_more());

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn rejected_search_carries_server_message() -> Result<()> {
    let (addr, handle) = serve_once(429, r#"{"message":"quota exceeded"}"#)?;

    let client = SearchClient::new(&addr, Duration::from_secs(1))?;
    let failure = client
        .fetch_page(&office_request())
        .expect_err("429 should be rejected");
    assert_eq!(
        failure,
        SearchFailure::Rejected {
            status: Some(429),
            message: Some("quota exceeded".to_owned()),
        }
    );

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn rejected_search_without_message_uses_fallback() -> Result<()> {
    let (addr, handle) = serve_once(400, r#"{"results":[],"next":false}"#)?;

    let client = SearchClient::new(&addr, Duration::from_secs(1))?;
    let failure = client
        .fetch_page(&office_request())
        .expect_err("400 should be rejected");
    assert_eq!(failure.display_message(), "No results available.");

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn malformed_success_body_is_transport_failure() -> Result<()> {
    let (addr, handle) = serve_once(200, r#"{"items": "nope"}"#)?;

    let client = SearchClient::new(&addr, Duration::from_secs(1))?;
    let failure = client
        .fetch_page(&office_request())
        .expect_err("body should not decode");
    assert!(matches!(failure, SearchFailure::Transport { .. }));

    handle.join().expect("server thread should join");
    Ok(())
}
