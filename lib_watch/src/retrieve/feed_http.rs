//! # Feed HTTP Client
//!
//! A resilient client for the upstream events feed. Every HTTP attempt is
//! classified into an explicit variant — a page, a not-modified signal, or a
//! retryable condition — and the retry loop branches on the variant instead
//! of catching errors. Transient conditions (rate limit, service unavailable,
//! network failures) are retried with doubling backoff and never surface to
//! the caller; only genuinely unexpected statuses do.
//!
//! ## Protocol details handled here:
//! - Bearer-token authentication.
//! - Conditional requests: the last `ETag` per URL is remembered and replayed
//!   as `If-None-Match`, so an unchanged feed answers 304.
//! - `Link: <...>; rel="next"` pagination headers.
//! - The `X-Poll-Interval` header, defaulting to 60 seconds when absent.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use reqwest::header::{HeaderMap, AUTHORIZATION, IF_NONE_MATCH, USER_AGENT};
use reqwest::StatusCode;
use thiserror::Error;

use crate::flagging::RawEvent;

/// Poll interval used when the feed does not advertise one.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
/// Initial backoff delay for transient upstream failures.
pub const BACKOFF_BASE: Duration = Duration::from_secs(1);
/// Request timeout for a single HTTP attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors the fetcher can actually surface. Transient upstream conditions
/// are absorbed by the retry loop and never appear here.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed returned unexpected status {0}")]
    UnexpectedStatus(u16),
    #[error("feed response body was not an event array: {0}")]
    MalformedBody(String),
}

/// The result of one completed fetch, as seen by callers.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// A page of events, newest first, with pagination and pacing metadata.
    Page {
        events: Vec<RawEvent>,
        next_url: Option<String>,
        poll_interval: Duration,
    },
    /// The feed reports no change since the last conditional check.
    NotModified,
}

/// One page fetch. The production implementation is [`FeedClient`]; tests
/// drive the walker with synthetic feeds instead.
#[allow(async_fn_in_trait)]
pub trait EventFeed {
    async fn fetch(&self, url: &str) -> Result<FetchOutcome, FeedError>;
}

/// A doubling backoff schedule, local to one fetch call.
///
/// Deliberately uncapped: the feed poller has nothing better to do than wait,
/// and the schedule resets on every fresh `fetch`.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
}

impl Backoff {
    pub fn new(base: Duration) -> Self {
        Self { next: base }
    }

    /// Returns the delay to sleep now and doubles the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.saturating_mul(2);
        delay
    }
}

/// Classification of one HTTP attempt. Internal to the retry loop.
enum Attempt {
    Page {
        events: Vec<RawEvent>,
        next_url: Option<String>,
        poll_interval: Duration,
    },
    NotModified,
    Retryable(String),
}

/// HTTP client for the events feed.
pub struct FeedClient {
    http: reqwest::Client,
    token: Option<String>,
    backoff_base: Duration,
    /// Last seen ETag per URL, replayed as `If-None-Match`.
    etags: Mutex<HashMap<String, String>>,
}

impl FeedClient {
    /// Creates a client with the default backoff base.
    pub fn new(token: Option<String>) -> Self {
        Self::with_backoff(token, BACKOFF_BASE)
    }

    /// Creates a client with a custom backoff base. Useful for operators who
    /// want gentler retry pacing, and for tests.
    pub fn with_backoff(token: Option<String>, backoff_base: Duration) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            token,
            backoff_base,
            etags: Mutex::new(HashMap::new()),
        }
    }

    /// Issues one GET and classifies the response. Network-level failures and
    /// rate-limit/unavailable statuses become `Attempt::Retryable`.
    async fn attempt(&self, url: &str) -> Result<Attempt, FeedError> {
        let mut request = self
            .http
            .get(url)
            .header(USER_AGENT, "repowatch/0.1");
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(etag) = self.etags.lock().expect("etag lock poisoned").get(url) {
            request = request.header(IF_NONE_MATCH, etag.clone());
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => return Ok(Attempt::Retryable(format!("transport error: {}", e))),
        };

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            return Ok(Attempt::NotModified);
        }
        if matches!(
            status,
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE
        ) {
            return Ok(Attempt::Retryable(format!("upstream status {}", status)));
        }
        if !status.is_success() {
            return Err(FeedError::UnexpectedStatus(status.as_u16()));
        }

        let headers = response.headers().clone();
        let poll_interval = parse_poll_interval(&headers);
        let next_url = parse_next_link(&headers);
        if let Some(etag) = headers.get("etag").and_then(|v| v.to_str().ok()) {
            self.etags
                .lock()
                .expect("etag lock poisoned")
                .insert(url.to_string(), etag.to_string());
        }

        let body: serde_json::Value = match response.json().await {
            Ok(v) => v,
            Err(e) => return Ok(Attempt::Retryable(format!("body read failed: {}", e))),
        };
        let events = parse_events(body)?;

        Ok(Attempt::Page {
            events,
            next_url,
            poll_interval,
        })
    }
}

impl EventFeed for FeedClient {
    /// Fetches one page, retrying the same URL through transient failures.
    /// Blocks (asynchronously) until the upstream yields a page or a 304.
    async fn fetch(&self, url: &str) -> Result<FetchOutcome, FeedError> {
        let mut backoff = Backoff::new(self.backoff_base);
        loop {
            match self.attempt(url).await? {
                Attempt::Page {
                    events,
                    next_url,
                    poll_interval,
                } => {
                    return Ok(FetchOutcome::Page {
                        events,
                        next_url,
                        poll_interval,
                    })
                }
                Attempt::NotModified => return Ok(FetchOutcome::NotModified),
                Attempt::Retryable(reason) => {
                    let delay = backoff.next_delay();
                    log::warn!(
                        "feed fetch of {} hit a transient condition ({}); retrying in {:?}",
                        url,
                        reason,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Extracts the `rel="next"` target from a `Link` header, if any.
fn parse_next_link(headers: &HeaderMap) -> Option<String> {
    let link = headers.get("link")?.to_str().ok()?;
    for part in link.split(',') {
        let mut sections = part.split(';');
        let target = sections.next()?.trim();
        let is_next = sections.any(|s| s.trim() == r#"rel="next""#);
        if is_next && target.starts_with('<') && target.ends_with('>') {
            let candidate = &target[1..target.len() - 1];
            // The feed hands out absolute URLs; ignore anything else.
            if url::Url::parse(candidate).is_ok() {
                return Some(candidate.to_string());
            }
        }
    }
    None
}

/// Reads `X-Poll-Interval` in seconds, falling back to the default.
fn parse_poll_interval(headers: &HeaderMap) -> Duration {
    headers
        .get("x-poll-interval")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_POLL_INTERVAL)
}

/// Turns a response body into events. The body must be a JSON array;
/// individual elements that fail to deserialize are logged and skipped so one
/// malformed event cannot poison a whole page.
fn parse_events(body: serde_json::Value) -> Result<Vec<RawEvent>, FeedError> {
    let serde_json::Value::Array(items) = body else {
        return Err(FeedError::MalformedBody(
            "expected a top-level JSON array".to_string(),
        ));
    };

    let mut events = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<RawEvent>(item) {
            Ok(event) => events.push(event),
            Err(e) => log::warn!("skipping malformed feed event: {}", e),
        }
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use serde_json::json;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_backoff_strictly_doubles() {
        let mut backoff = Backoff::new(Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));
        assert_eq!(backoff.next_delay(), Duration::from_secs(8));
    }

    #[test]
    fn test_parse_next_link() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "link",
            HeaderValue::from_static(
                r#"<https://api.github.com/events?page=2>; rel="next", <https://api.github.com/events?page=10>; rel="last""#,
            ),
        );
        assert_eq!(
            parse_next_link(&headers).as_deref(),
            Some("https://api.github.com/events?page=2")
        );
    }

    #[test]
    fn test_parse_next_link_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "link",
            HeaderValue::from_static(r#"<https://api.github.com/events?page=1>; rel="prev""#),
        );
        assert_eq!(parse_next_link(&headers), None);
        assert_eq!(parse_next_link(&HeaderMap::new()), None);
    }

    #[test]
    fn test_parse_poll_interval_defaults() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_poll_interval(&headers), DEFAULT_POLL_INTERVAL);
        headers.insert("x-poll-interval", HeaderValue::from_static("30"));
        assert_eq!(parse_poll_interval(&headers), Duration::from_secs(30));
    }

    #[test]
    fn test_parse_events_skips_malformed_elements() {
        let body = json!([
            {"id": "1", "type": "PushEvent", "payload": {}},
            {"no_id_here": true},
            {"id": "2", "type": "WatchEvent", "payload": {}}
        ]);
        let events = parse_events(body).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id, "1");
        assert_eq!(events[1].id, "2");
    }

    #[test]
    fn test_parse_events_rejects_non_array_body() {
        assert!(parse_events(json!({"message": "bad credentials"})).is_err());
    }

    /// Serves canned HTTP responses on a random local port, one connection
    /// per response, and counts the requests it answered.
    fn spawn_mock_feed(responses: Vec<String>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind random port");
        let url = format!("http://{}/events", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);

        thread::spawn(move || {
            for response in responses {
                let Ok((mut stream, _)) = listener.accept() else {
                    return;
                };
                let mut buf = [0u8; 2048];
                let _ = stream.read(&mut buf);
                hits_clone.fetch_add(1, Ordering::SeqCst);
                let _ = stream.write_all(response.as_bytes());
            }
        });

        (url, hits)
    }

    fn unavailable_response() -> String {
        "HTTP/1.1 503 Service Unavailable\r\nConnection: close\r\nContent-Length: 0\r\n\r\n"
            .to_string()
    }

    fn page_response(body: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Type: application/json\r\nX-Poll-Interval: 42\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        )
    }

    #[tokio::test]
    async fn test_fetch_retries_through_transient_failures() {
        // Three 503s then a page: the fetch call must absorb all three and
        // come back with the page, having issued exactly four requests.
        let body = r#"[{"id":"7","type":"PushEvent","payload":{}}]"#;
        let (url, hits) = spawn_mock_feed(vec![
            unavailable_response(),
            unavailable_response(),
            unavailable_response(),
            page_response(body),
        ]);

        let client = FeedClient::with_backoff(None, Duration::from_millis(5));
        let outcome = client.fetch(&url).await.unwrap();

        match outcome {
            FetchOutcome::Page {
                events,
                next_url,
                poll_interval,
            } => {
                assert_eq!(events.len(), 1);
                assert_eq!(events[0].id, "7");
                assert_eq!(next_url, None);
                assert_eq!(poll_interval, Duration::from_secs(42));
            }
            other => panic!("expected a page, got {:?}", other),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_fetch_surfaces_unexpected_status() {
        let (url, _) = spawn_mock_feed(vec![
            "HTTP/1.1 401 Unauthorized\r\nConnection: close\r\nContent-Length: 0\r\n\r\n"
                .to_string(),
        ]);
        let client = FeedClient::with_backoff(None, Duration::from_millis(5));
        match client.fetch(&url).await {
            Err(FeedError::UnexpectedStatus(401)) => {}
            other => panic!("expected UnexpectedStatus(401), got {:?}", other),
        }
    }
}
