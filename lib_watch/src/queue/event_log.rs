//! # Bounded Event Log
//!
//! An append-only, capacity-bounded sequence of queue entries, each
//! addressable by a monotonically increasing position. One writer (the poll
//! cycle) appends; any number of readers tail independently. Entries are
//! shared as `Arc`s so fan-out never copies payloads, and eviction is
//! size-bounded: once the log exceeds capacity the oldest entries are
//! dropped, and readers that fell behind simply resume from the oldest
//! retained entry.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

use crate::flagging::RawEvent;

/// Default retention bound for the log.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// One flagged event's representation in the log. Written once, immutable.
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueueEntry {
    /// Monotonic position in the log, assigned at append time.
    pub position: u64,
    /// The warning row ID assigned by the durable store.
    pub warning_id: i64,
    /// The warning category label.
    pub category: String,
    /// The original upstream event.
    pub payload: RawEvent,
}

struct Inner {
    entries: VecDeque<Arc<QueueEntry>>,
    next_position: u64,
}

/// The shared log. A `Mutex` guards the ring; appends are atomic with
/// respect to any reader's view, and a `Notify` wakes tailing readers.
pub struct EventLog {
    capacity: usize,
    inner: Mutex<Inner>,
    notify: Notify,
}

impl EventLog {
    /// Creates an empty log retaining at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "event log capacity must be positive");
        Self {
            capacity,
            inner: Mutex::new(Inner {
                entries: VecDeque::with_capacity(capacity.min(1024)),
                next_position: 0,
            }),
            notify: Notify::new(),
        }
    }

    /// Appends one entry, assigns it the next position, evicts past the
    /// capacity bound, and wakes waiting readers. O(1) amortized.
    pub fn append(&self, warning_id: i64, category: String, payload: RawEvent) -> u64 {
        let position;
        {
            let mut inner = self.inner.lock().expect("event log lock poisoned");
            position = inner.next_position;
            inner.next_position += 1;
            inner.entries.push_back(Arc::new(QueueEntry {
                position,
                warning_id,
                category,
                payload,
            }));
            while inner.entries.len() > self.capacity {
                inner.entries.pop_front();
            }
        }
        self.notify.notify_waiters();
        position
    }

    /// Returns every retained entry at or after `position`, in order, plus
    /// the position to resume from. Requests older than the oldest retained
    /// entry are served best-effort from the oldest entry rather than
    /// failing: eviction loss is expected under load.
    pub fn read_from(&self, position: u64) -> (Vec<Arc<QueueEntry>>, u64) {
        let inner = self.inner.lock().expect("event log lock poisoned");
        let entries: Vec<Arc<QueueEntry>> = inner
            .entries
            .iter()
            .filter(|e| e.position >= position)
            .cloned()
            .collect();
        let resume = entries.last().map(|e| e.position + 1).unwrap_or(position);
        (entries, resume)
    }

    /// Like [`read_from`](Self::read_from), but if nothing is available yet,
    /// waits up to `timeout` for an append before re-checking once. An empty
    /// result after the bounded wait is the caller's cue to emit a
    /// keep-alive.
    pub async fn wait_from(&self, position: u64, timeout: Duration) -> (Vec<Arc<QueueEntry>>, u64) {
        // Register interest before checking, so an append between the check
        // and the await cannot be missed.
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let (entries, resume) = self.read_from(position);
        if !entries.is_empty() {
            return (entries, resume);
        }
        let _ = tokio::time::timeout(timeout, notified).await;
        self.read_from(position)
    }

    /// Number of entries currently retained.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("event log lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position of the oldest retained entry, if the log is non-empty.
    pub fn oldest_position(&self) -> Option<u64> {
        let inner = self.inner.lock().expect("event log lock poisoned");
        inner.entries.front().map(|e| e.position)
    }

    /// The position the next append will receive.
    pub fn next_position(&self) -> u64 {
        self.inner.lock().expect("event log lock poisoned").next_position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(id: u64) -> RawEvent {
        serde_json::from_value(json!({
            "id": id.to_string(),
            "type": "PushEvent",
            "payload": {}
        }))
        .unwrap()
    }

    fn filled_log(capacity: usize, appends: u64) -> EventLog {
        let log = EventLog::new(capacity);
        for i in 0..appends {
            log.append(i as i64, "Dummy warning".to_string(), payload(i));
        }
        log
    }

    #[test]
    fn test_positions_are_monotonic() {
        let log = EventLog::new(8);
        for i in 0..5u64 {
            assert_eq!(log.append(i as i64, "x".to_string(), payload(i)), i);
        }
        assert_eq!(log.next_position(), 5);
    }

    #[test]
    fn test_capacity_bound_evicts_oldest_first() {
        // capacity + k appends leave exactly capacity entries, oldest gone.
        let log = filled_log(10, 13);
        assert_eq!(log.len(), 10);
        assert_eq!(log.oldest_position(), Some(3));

        let (entries, resume) = log.read_from(0);
        assert_eq!(entries.len(), 10);
        assert_eq!(entries[0].position, 3);
        assert_eq!(resume, 13);
        // Order preserved.
        for pair in entries.windows(2) {
            assert!(pair[0].position < pair[1].position);
        }
    }

    #[test]
    fn test_read_from_midpoint_and_future() {
        let log = filled_log(10, 6);
        let (entries, resume) = log.read_from(4);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].position, 4);
        assert_eq!(resume, 6);

        // Reading past the end yields nothing and leaves the cursor alone.
        let (entries, resume) = log.read_from(100);
        assert!(entries.is_empty());
        assert_eq!(resume, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_from_times_out_empty() {
        let log = EventLog::new(4);
        let (entries, resume) = log.wait_from(0, Duration::from_millis(500)).await;
        assert!(entries.is_empty());
        assert_eq!(resume, 0);
    }

    #[tokio::test]
    async fn test_wait_from_wakes_on_append() {
        let log = Arc::new(EventLog::new(4));
        let tail = Arc::clone(&log);
        let waiter = tokio::spawn(async move {
            tail.wait_from(0, Duration::from_secs(30)).await
        });

        // Give the waiter a chance to park before appending.
        tokio::time::sleep(Duration::from_millis(20)).await;
        log.append(1, "Dummy warning".to_string(), payload(1));

        let (entries, resume) = waiter.await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(resume, 1);
    }
}
