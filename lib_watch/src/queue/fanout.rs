//! # Subscription Fan-out
//!
//! One `Subscription` per connected streaming client, each tailing the
//! shared [`EventLog`](super::EventLog) from its own position. Subscriptions
//! never block each other: the log is read-shared, and each subscription's
//! only state is its cursor. A delivery attempt that finds nothing within one
//! keep-alive tick yields a ping instead, which keeps idle connections warm
//! and bounds how long a disconnect can go unnoticed by the serving layer.

use std::sync::Arc;
use std::time::Duration;

use super::event_log::{EventLog, QueueEntry};

/// Keep-alive granularity: how long one delivery attempt waits for new
/// entries before yielding a ping.
pub const DEFAULT_KEEPALIVE_TICK: Duration = Duration::from_millis(500);

/// What one polling tick produced for a subscriber.
#[derive(Debug)]
pub enum Delivery {
    /// New entries past the subscriber's cursor, in log order.
    Entries(Vec<Arc<QueueEntry>>),
    /// Nothing new within the tick; emit a keep-alive.
    Ping,
}

/// An independent reader of the event log.
pub struct Subscription {
    log: Arc<EventLog>,
    position: u64,
    tick: Duration,
}

impl Subscription {
    /// Creates a subscription starting at `from` (log start when `None`).
    pub fn new(log: Arc<EventLog>, from: Option<u64>, tick: Duration) -> Self {
        Self {
            log,
            position: from.unwrap_or(0),
            tick,
        }
    }

    /// The position the next delivery will read from.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Waits up to one tick for entries past the cursor. On a non-empty
    /// delivery the cursor advances past the last entry returned, so no
    /// entry is ever delivered twice to the same subscription.
    pub async fn next_delivery(&mut self) -> Delivery {
        let (entries, resume) = self.log.wait_from(self.position, self.tick).await;
        if entries.is_empty() {
            Delivery::Ping
        } else {
            self.position = resume;
            Delivery::Entries(entries)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flagging::RawEvent;
    use serde_json::json;

    fn payload(id: u64) -> RawEvent {
        serde_json::from_value(json!({
            "id": id.to_string(),
            "type": "PublicEvent",
            "payload": {}
        }))
        .unwrap()
    }

    fn positions(delivery: &Delivery) -> Vec<u64> {
        match delivery {
            Delivery::Entries(entries) => entries.iter().map(|e| e.position).collect(),
            Delivery::Ping => Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_two_subscribers_are_isolated() {
        let log = Arc::new(EventLog::new(16));
        for i in 0..6u64 {
            log.append(i as i64, "Dummy warning".to_string(), payload(i));
        }

        let mut from_start = Subscription::new(Arc::clone(&log), None, Duration::from_millis(50));
        let mut from_four = Subscription::new(Arc::clone(&log), Some(4), Duration::from_millis(50));

        assert_eq!(
            positions(&from_start.next_delivery().await),
            vec![0, 1, 2, 3, 4, 5]
        );
        assert_eq!(positions(&from_four.next_delivery().await), vec![4, 5]);

        // A new append reaches both, each exactly once.
        log.append(6, "Dummy warning".to_string(), payload(6));
        assert_eq!(positions(&from_start.next_delivery().await), vec![6]);
        assert_eq!(positions(&from_four.next_delivery().await), vec![6]);
    }

    #[tokio::test]
    async fn test_no_entry_delivered_twice() {
        let log = Arc::new(EventLog::new(16));
        log.append(0, "Dummy warning".to_string(), payload(0));

        let mut sub = Subscription::new(Arc::clone(&log), None, Duration::from_millis(20));
        assert_eq!(positions(&sub.next_delivery().await), vec![0]);

        // Cursor advanced: the same entry must not come back, only a ping.
        match sub.next_delivery().await {
            Delivery::Ping => {}
            Delivery::Entries(e) => panic!("unexpected redelivery of {:?}", e),
        }
        assert_eq!(sub.position(), 1);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_resumes_from_oldest() {
        let log = Arc::new(EventLog::new(4));
        for i in 0..10u64 {
            log.append(i as i64, "Dummy warning".to_string(), payload(i));
        }

        // Positions 0..=5 were evicted; the subscription asked for 0 but
        // gets the oldest retained entries instead of an error.
        let mut sub = Subscription::new(Arc::clone(&log), Some(0), Duration::from_millis(20));
        assert_eq!(positions(&sub.next_delivery().await), vec![6, 7, 8, 9]);
        assert_eq!(sub.position(), 10);
    }
}
