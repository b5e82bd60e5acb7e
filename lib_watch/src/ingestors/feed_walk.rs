//! # Pagination Walker
//!
//! One full traversal of the feed during a poll cycle. The feed is newest
//! first, so the walk starts at the most recent page and moves backward in
//! time, stopping as soon as it re-observes the event it stopped at last
//! time (the horizon). Termination is structural: every iteration either
//! finds the horizon, follows a next link, or runs out of pages, so a walk
//! over `n` pages never issues more than `n` fetches.

use std::collections::HashSet;
use std::time::Duration;

use crate::flagging::{flag, FlagConfig, FlaggedEvent};
use crate::retrieve::{EventFeed, FeedError, FetchOutcome, DEFAULT_POLL_INTERVAL};

/// The result of one walk.
#[derive(Debug)]
pub struct WalkOutcome {
    /// Flagged events in first-seen order, deduplicated by event ID.
    pub flagged: Vec<FlaggedEvent>,
    /// ID of the newest event observed, i.e. the next horizon. `None` when
    /// the feed had nothing new, in which case the horizon must not move.
    pub new_horizon: Option<String>,
    /// Pacing hint from the feed for the next poll.
    pub poll_interval: Duration,
}

impl WalkOutcome {
    fn empty(poll_interval: Duration) -> Self {
        Self {
            flagged: Vec::new(),
            new_horizon: None,
            poll_interval,
        }
    }
}

/// Walks the feed from `start_url` until the horizon is found or pagination
/// is exhausted, classifying every unseen event along the way.
pub async fn walk<F: EventFeed>(
    feed: &F,
    start_url: &str,
    horizon: Option<&str>,
    rules: &FlagConfig,
) -> Result<WalkOutcome, FeedError> {
    let (mut events, mut next_url, poll_interval) = match feed.fetch(start_url).await? {
        FetchOutcome::NotModified => {
            log::debug!("feed unchanged since last poll");
            return Ok(WalkOutcome::empty(DEFAULT_POLL_INTERVAL));
        }
        FetchOutcome::Page {
            events,
            next_url,
            poll_interval,
        } => (events, next_url, poll_interval),
    };

    if events.is_empty() {
        return Ok(WalkOutcome::empty(poll_interval));
    }

    // The first event of the first page is the newest the feed has: that is
    // where the next cycle will stop.
    let new_horizon = events[0].id.clone();
    let mut flagged: Vec<FlaggedEvent> = Vec::new();
    let mut horizon_found = false;
    let mut pages_walked = 1u32;

    loop {
        for event in events {
            if horizon == Some(event.id.as_str()) {
                horizon_found = true;
                break;
            }
            if let Some(kind) = flag(&event, rules) {
                flagged.push(FlaggedEvent { event, kind });
            }
        }

        if horizon_found {
            break;
        }
        let Some(url) = next_url else {
            // Reached the oldest page the feed retains.
            break;
        };

        match feed.fetch(&url).await? {
            FetchOutcome::NotModified => break,
            FetchOutcome::Page {
                events: page,
                next_url: next,
                ..
            } => {
                if page.is_empty() {
                    break;
                }
                events = page;
                next_url = next;
                pages_walked += 1;
            }
        }
    }

    // Pages can overlap when new events arrive mid-walk; keep the first
    // sighting of each ID only.
    let mut seen = HashSet::new();
    flagged.retain(|f| seen.insert(f.event.id.clone()));

    log::debug!(
        "walk covered {} page(s), flagged {} event(s), horizon {}",
        pages_walked,
        flagged.len(),
        if horizon_found { "found" } else { "not found" }
    );

    Ok(WalkOutcome {
        flagged,
        new_horizon: Some(new_horizon),
        poll_interval,
    })
}
