//! # Event Bus System
//!
//! Typed, broadcast notifications for the share drive core, built on
//! `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: [`AuthEvent`] and [`CacheEvent`] wrapped in [`CoreEvent`]
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Receiver wrapper with optional filtering
//!
//! ```text
//! ┌──────────────────┐  emit   ┌───────────┐  subscribe  ┌────────────┐
//! │ CredentialManager├────────>│           ├────────────>│ Subscriber │
//! └──────────────────┘         │ EventBus  │             └────────────┘
//! ┌──────────────────┐  emit   │           │  subscribe  ┌────────────┐
//! │ MaterializeCache ├────────>│           ├────────────>│ Subscriber │
//! └──────────────────┘         └───────────┘             └────────────┘
//! ```
//!
//! Publishers ignore the send result (`let _ = bus.emit(..)`): having no
//! subscriber is normal and never fails an operation.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
//!
//! let bus = EventBus::new(100);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Cache(CacheEvent::Materialized {
//!     source_file_id: "src-1".to_string(),
//!     copy_file_id: "copy-1".to_string(),
//! }))
//! .ok();
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   The subscriber can keep receiving.
//! - **`RecvError::Closed`**: All senders dropped; stop listening.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast::{self, error::RecvError, error::SendError, Receiver};

/// Default per-subscriber buffer.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Top-level event type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "domain", content = "event")]
pub enum CoreEvent {
    Auth(AuthEvent),
    Cache(CacheEvent),
}

impl CoreEvent {
    /// Short human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            CoreEvent::Auth(e) => e.description(),
            CoreEvent::Cache(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Auth(AuthEvent::RefreshFailed { .. }) => EventSeverity::Error,
            CoreEvent::Cache(CacheEvent::EvictionDeleteFailed { .. })
            | CoreEvent::Cache(CacheEvent::EvictionDropped { .. }) => EventSeverity::Warning,
            CoreEvent::Cache(CacheEvent::CacheHit { .. }) => EventSeverity::Debug,
            _ => EventSeverity::Info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Credential lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AuthEvent {
    /// The share access token was exchanged from the refresh token.
    AccessTokenRefreshed { generation: u64 },
    /// A new share token was acquired for the share link.
    ShareTokenRefreshed { share_id: String, generation: u64 },
    /// A refresh attempt failed; `credential` names which one.
    RefreshFailed { credential: String, message: String },
    /// The backing drive's own session was refreshed by the periodic cycle.
    BackingRefreshed,
}

impl AuthEvent {
    pub fn description(&self) -> &'static str {
        match self {
            AuthEvent::AccessTokenRefreshed { .. } => "Access token refreshed",
            AuthEvent::ShareTokenRefreshed { .. } => "Share token refreshed",
            AuthEvent::RefreshFailed { .. } => "Credential refresh failed",
            AuthEvent::BackingRefreshed => "Backing drive session refreshed",
        }
    }
}

/// Materialization cache events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CacheEvent {
    /// A shared file was copied into the backing drive.
    Materialized {
        source_file_id: String,
        copy_file_id: String,
    },
    /// A resolve was served from an existing copy.
    CacheHit { source_file_id: String },
    /// The oldest entry left the retention window.
    Evicted {
        source_file_id: String,
        copy_file_id: String,
    },
    /// The backing drive refused to delete an evicted copy.
    EvictionDeleteFailed { copy_file_id: String, message: String },
    /// The deletion queue was full; the copy is left orphaned.
    EvictionDropped { copy_file_id: String },
}

impl CacheEvent {
    pub fn description(&self) -> &'static str {
        match self {
            CacheEvent::Materialized { .. } => "Shared file materialized",
            CacheEvent::CacheHit { .. } => "Materialized copy reused",
            CacheEvent::Evicted { .. } => "Materialized copy evicted",
            CacheEvent::EvictionDeleteFailed { .. } => "Evicted copy deletion failed",
            CacheEvent::EvictionDropped { .. } => "Evicted copy deletion dropped",
        }
    }
}

/// Broadcast channel shared by all publishers.
///
/// Cloning is cheap and every clone publishes to the same subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus.
    ///
    /// `capacity` is the number of events buffered per subscriber before it
    /// starts receiving `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers reached, or an error when there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a receiver for all future events. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional filter.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let bus = EventBus::default();
/// let cache_only = EventStream::new(bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Cache(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |f| f(event))
    }

    /// Receives the next event that passes the filter.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Non-blocking receive. `None` when nothing matching is buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str) -> CoreEvent {
        CoreEvent::Cache(CacheEvent::CacheHit {
            source_file_id: id.to_string(),
        })
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_err() {
        let bus = EventBus::new(10);
        assert!(bus.emit(hit("a")).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        assert_eq!(bus.emit(hit("a")).unwrap(), 2);

        assert_eq!(rx1.recv().await.unwrap(), hit("a"));
        assert_eq!(rx2.recv().await.unwrap(), hit("a"));
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Auth(_)));

        bus.emit(hit("a")).unwrap();
        bus.emit(CoreEvent::Auth(AuthEvent::AccessTokenRefreshed { generation: 3 }))
            .unwrap();

        let event = stream.recv().await.unwrap();
        assert_eq!(
            event,
            CoreEvent::Auth(AuthEvent::AccessTokenRefreshed { generation: 3 })
        );
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();

        for i in 0..5 {
            bus.emit(hit(&i.to_string())).unwrap();
        }

        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(3))));
        assert_eq!(rx.recv().await.unwrap(), hit("3"));
    }

    #[test]
    fn test_event_severity() {
        let failed = CoreEvent::Auth(AuthEvent::RefreshFailed {
            credential: "share_token".to_string(),
            message: "boom".to_string(),
        });
        assert_eq!(failed.severity(), EventSeverity::Error);

        let dropped = CoreEvent::Cache(CacheEvent::EvictionDropped {
            copy_file_id: "c".to_string(),
        });
        assert_eq!(dropped.severity(), EventSeverity::Warning);
        assert_eq!(hit("a").severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Cache(CacheEvent::Evicted {
            source_file_id: "s".to_string(),
            copy_file_id: "c".to_string(),
        });
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["domain"], "Cache");
        assert_eq!(json["event"]["type"], "Evicted");

        let back: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.description(), "Materialized copy evicted");
    }
}
