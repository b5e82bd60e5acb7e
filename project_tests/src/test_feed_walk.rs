//! # Feed Client & Walker Integration Test
//!
//! Drives the real `FeedClient` and `walk` over HTTP against a locally
//! spawned mock feed, verifying pagination following, horizon stop,
//! overlap dedup, and poll-interval extraction end to end. Unlike the unit
//! tests, everything here goes through an actual TCP socket.

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use lib_watch::flagging::FlagConfig;
use lib_watch::ingestors::walk;
use lib_watch::retrieve::FeedClient;

/// The mock feed needs its own public base URL to emit absolute next links.
struct FeedState {
    base: String,
}

#[derive(Debug, Deserialize)]
struct PageParams {
    page: Option<u32>,
}

fn event(id: &str) -> serde_json::Value {
    json!({
        "id": id,
        "type": "PublicEvent",
        "payload": {},
        "actor": {"login": "mallory"},
        "repo": {"name": "acme/payments"}
    })
}

/// Two newest-first pages sharing event "10", the way a real feed overlaps
/// when events arrive mid-walk.
async fn events_handler(
    State(state): State<Arc<FeedState>>,
    Query(params): Query<PageParams>,
) -> impl IntoResponse {
    let page = params.page.unwrap_or(1);
    let (body, next) = match page {
        1 => (
            json!([event("12"), event("11"), event("10")]),
            Some(2u32),
        ),
        _ => (json!([event("10"), event("9"), event("8")]), None),
    };

    let mut headers = HeaderMap::new();
    headers.insert("x-poll-interval", HeaderValue::from_static("30"));
    if let Some(n) = next {
        let link = format!("<{}?page={}>; rel=\"next\"", state.base, n);
        headers.insert(header::LINK, HeaderValue::from_str(&link).unwrap());
    }
    (headers, Json(body))
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("--- Starting Feed Walk Tests ---");

    // Bind first so the base URL is known, then serve the mock feed.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let base = format!("http://{}/events", listener.local_addr()?);
    let app = Router::new()
        .route("/events", get(events_handler))
        .with_state(Arc::new(FeedState { base: base.clone() }));
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock feed died");
    });

    let client = FeedClient::new(None);
    let rules = FlagConfig {
        sampling_modulus: None,
        ..FlagConfig::default()
    };

    // --- TEST 1: Full walk across both pages, deduplicating the overlap ---
    println!("\n[Test 1] Full walk with pagination and overlap...");
    let outcome = walk(&client, &base, None, &rules).await?;
    let ids: Vec<&str> = outcome
        .flagged
        .iter()
        .map(|f| f.event.id.as_str())
        .collect();
    assert_eq!(ids, vec!["12", "11", "10", "9", "8"]);
    assert_eq!(outcome.new_horizon.as_deref(), Some("12"));
    assert_eq!(outcome.poll_interval.as_secs(), 30);
    println!("✅ Walked 2 pages, 5 unique events, horizon 12, interval 30s");

    // --- TEST 2: Walk stops at a known horizon ---
    println!("\n[Test 2] Walk stops at the previous horizon...");
    let outcome = walk(&client, &base, Some("11"), &rules).await?;
    let ids: Vec<&str> = outcome
        .flagged
        .iter()
        .map(|f| f.event.id.as_str())
        .collect();
    assert_eq!(ids, vec!["12"]);
    assert_eq!(outcome.new_horizon.as_deref(), Some("12"));
    println!("✅ Only the event newer than the horizon was collected");

    // --- TEST 3: Horizon on the second page ---
    println!("\n[Test 3] Horizon found mid-pagination...");
    let outcome = walk(&client, &base, Some("9"), &rules).await?;
    let ids: Vec<&str> = outcome
        .flagged
        .iter()
        .map(|f| f.event.id.as_str())
        .collect();
    assert_eq!(ids, vec!["12", "11", "10"]);
    println!("✅ Walk crossed the page boundary and stopped at 9");

    println!("\n--- All Feed Walk Tests Passed ---");
    Ok(())
}
