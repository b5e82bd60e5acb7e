//! # Repowatch Watcher
//!
//! The production binary for the repowatch project: one process running both
//! halves of the pipeline. It boots configuration, constructs the durable
//! collaborators (Postgres warnings store, Redis horizon cursor), spawns the
//! feed poll loop, and serves the public gateway:
//!
//! - `/health` — liveness probe.
//! - `/summary?since=<unix>` — historical warnings from the durable store.
//! - `/stream?from=<position>` — live SSE feed of warnings, one event per
//!   queue entry, with `{"is_ping": true}` keep-alives on idle ticks.
//!
//! The write path and the read path share exactly one thing, the in-memory
//! bounded event log; everything else is injected where it is used.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use serde_json::json;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};

use lib_watch::configs::AppConfig;
use lib_watch::connections::{PgWarningsStore, RedisCursor, WarningsStore};
use lib_watch::enrich::{Analyzer, AnalyzerConfig};
use lib_watch::ingestors::{FeedPoller, PollerConfig};
use lib_watch::queue::{Delivery, EventLog, QueueEntry, Subscription};
use lib_watch::retrieve::FeedClient;

/// Command-line arguments for the watcher.
#[derive(Parser, Debug)]
#[command(author, version, about = "GitHub events risk watcher and stream gateway", long_about = None)]
struct Args {
    /// Gateway port, overriding SERVER_PORT from the environment.
    #[arg(short, long)]
    port: Option<u16>,
    /// Event log retention bound, overriding QUEUE_CAPACITY.
    #[arg(long)]
    queue_capacity: Option<usize>,
}

/// Shared state for the gateway routes.
struct AppState {
    /// The bounded event log, tail end of the write path.
    log: Arc<EventLog>,
    /// Warnings store, for historical queries and processed-markers.
    store: PgWarningsStore,
    /// Best-effort warning enrichment.
    analyzer: Analyzer,
    /// Keep-alive granularity for streaming subscribers.
    keepalive_tick: Duration,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = AppConfig::from_env()?;
    if let Some(port) = args.port {
        config.server_port = port;
    }
    if let Some(capacity) = args.queue_capacity {
        config.queue_capacity = capacity;
    }

    log::info!("repowatch watcher booting; feed {}", config.feed_url);

    // Durable collaborators, constructed once and passed in explicitly.
    let store = PgWarningsStore::connect(&config.database_url, 5).await?;
    store.ensure_schema().await?;
    let cursor = RedisCursor::connect(&config.redis_url).await?;
    cursor.ping().await?;
    log::info!("warnings store and cursor store reachable");

    // The single shared resource between the write and read paths.
    let event_log = Arc::new(EventLog::new(config.queue_capacity));

    // Write path: the poll loop, running for the lifetime of the process.
    let poller = FeedPoller::new(
        FeedClient::new(config.github_token.clone()),
        store.clone(),
        cursor,
        Arc::clone(&event_log),
        PollerConfig {
            feed_url: config.feed_url.clone(),
            flag: config.flag_config(),
            ..PollerConfig::default()
        },
    );
    tokio::spawn(async move { poller.run().await });

    // Read path: gateway routes over the shared state.
    let analyzer = Analyzer::new(AnalyzerConfig {
        api_url: config.analysis_api_url.clone(),
        api_key: config.analysis_api_key.clone(),
        model: config.analysis_model.clone(),
    });
    let state = Arc::new(AppState {
        log: Arc::clone(&event_log),
        store,
        analyzer,
        keepalive_tick: config.keepalive_tick,
    });

    let cors = match &config.frontend_origins {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.parse::<HeaderValue>()?)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/summary", get(summary_handler))
        .route("/stream", get(stream_handler))
        .layer(cors)
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    log::info!("gateway listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("gateway stopped");
    Ok(())
}

/// Liveness probe.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, Deserialize)]
struct SummaryParams {
    /// Unix timestamp; only warnings created after it are returned.
    since: Option<i64>,
}

/// Historical warnings, newest first.
async fn summary_handler(
    Query(params): Query<SummaryParams>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let since = params.since.and_then(|s| chrono::DateTime::from_timestamp(s, 0));
    match state.store.query_warnings(since).await {
        Ok(data) => {
            let count = data.len();
            Json(json!({ "data": data, "count": count })).into_response()
        }
        Err(e) => {
            log::error!("summary query failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to fetch summaries: {}", e),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamParams {
    /// Log position to resume from; defaults to the log start.
    from: Option<u64>,
}

/// Opens one SSE subscription tailing the event log. The subscription's
/// lifetime is the connection's: when the client goes away, axum drops the
/// stream and the per-client task with it.
async fn stream_handler(
    Query(params): Query<StreamParams>,
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = Subscription::new(Arc::clone(&state.log), params.from, state.keepalive_tick);
    Sse::new(warning_stream(state, subscription))
}

/// Per-connection stream state: the log subscription plus entries delivered
/// in a batch but not yet emitted one by one.
struct StreamCtx {
    state: Arc<AppState>,
    subscription: Subscription,
    pending: VecDeque<Arc<QueueEntry>>,
}

/// Turns a subscription into a stream of SSE events: one event per queue
/// entry, a ping on every idle tick.
fn warning_stream(
    state: Arc<AppState>,
    subscription: Subscription,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let ctx = StreamCtx {
        state,
        subscription,
        pending: VecDeque::new(),
    };
    stream::unfold(ctx, |mut ctx| async move {
        loop {
            if let Some(entry) = ctx.pending.pop_front() {
                let event = deliver_entry(&ctx.state, &entry).await;
                return Some((Ok(event), ctx));
            }
            match ctx.subscription.next_delivery().await {
                Delivery::Entries(entries) => ctx.pending.extend(entries),
                Delivery::Ping => {
                    let ping = Event::default().data(json!({"is_ping": true}).to_string());
                    return Some((Ok(ping), ctx));
                }
            }
        }
    })
}

/// Enriches one queue entry and serializes it for the wire. The processed
/// marker is best-effort: a store hiccup is logged, never surfaced to the
/// subscriber.
async fn deliver_entry(state: &AppState, entry: &QueueEntry) -> Event {
    let analysis = state
        .analyzer
        .analyze(&entry.category, &entry.payload, entry.warning_id)
        .await;
    if let Err(e) = state.store.mark_processed(entry.warning_id, &analysis).await {
        log::warn!("failed to mark warning {} processed: {}", entry.warning_id, e);
    }

    let body = json!({
        "warning_id": entry.warning_id,
        "warning_type": entry.category,
        "payload": entry.payload,
        "analysis": analysis,
        "position": entry.position,
        "is_ping": false,
    });
    Event::default().data(body.to_string())
}

/// Listens for CTRL+C and SIGTERM to initiate a graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::warn!("shutdown signal received; closing gateway gracefully");
}
