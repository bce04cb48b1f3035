//! # Event Bus System
//!
//! Provides an event-driven telemetry channel for the catalog sync engine using
//! `tokio::sync::broadcast`. Runs publish what they are doing; hosts, loggers
//! and tests subscribe without the engine knowing who listens.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enum hierarchies for sync runs and batch persistence
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! Per-source *status* (last value wins) lives on a `watch` channel owned by the
//! sync coordinator. The event bus carries the history of a run instead: every
//! phase boundary, throttled progress, each flushed or abandoned batch.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     emit      ┌───────────┐
//! │ Orchestrator ├──────────────>│           │     subscribe    ┌────────────┐
//! └──────────────┘               │ EventBus  ├─────────────────>│ Subscriber │
//! ┌──────────────┐     emit      │ (broadcast│                  └────────────┘
//! │ Batch Router ├──────────────>│  channel) │
//! └──────────────┘               └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
//!
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Sync(SyncEvent::Skipped {
//!         run_id: "run-1".to_string(),
//!         source_id: "xtream-main".to_string(),
//!     }))
//!     .ok();
//!
//! assert!(subscriber.try_recv().is_ok());
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.
//!
//! Publishing never blocks a run. Emitting with no subscribers returns an
//! error that callers ignore.

use core_async::sync::broadcast;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use core_async::sync::broadcast::error::{RecvError, SendError};
pub use core_async::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Run lifecycle events
    Sync(SyncEvent),
    /// Batch persistence events
    Persistence(PersistenceEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Persistence(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Persistence(PersistenceEvent::BatchAbandoned { .. }) => {
                EventSeverity::Warning
            }
            CoreEvent::Sync(SyncEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Sync(SyncEvent::Skipped { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }

    /// Source the event belongs to.
    pub fn source_id(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.source_id(),
            CoreEvent::Persistence(e) => e.source_id(),
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events describing the lifecycle of one synchronization run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// A run decided to scan.
    Started {
        run_id: String,
        source_id: String,
        /// `"full"` or `"incremental"`.
        strategy: String,
    },
    /// The fingerprint was unchanged; nothing was scanned.
    Skipped { run_id: String, source_id: String },
    /// The run entered a new catalog phase.
    PhaseStarted {
        run_id: String,
        source_id: String,
        phase: String,
    },
    /// Throttled progress update.
    Progress {
        run_id: String,
        source_id: String,
        phase: Option<String>,
        items_discovered: u64,
        items_persisted: u64,
    },
    /// The run reached `Completed`.
    Completed {
        run_id: String,
        source_id: String,
        items_discovered: u64,
        items_persisted: u64,
        items_failed: u64,
        fingerprint_committed: bool,
        duration_ms: u64,
    },
    /// The run reached `Failed`.
    Failed {
        run_id: String,
        source_id: String,
        /// Failure category (`scan`, `stalled`, `cancelled`, `timed_out`, `fault`).
        kind: String,
        message: String,
        items_persisted: u64,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Sync started",
            SyncEvent::Skipped { .. } => "Sync skipped, catalog unchanged",
            SyncEvent::PhaseStarted { .. } => "Sync phase started",
            SyncEvent::Progress { .. } => "Sync in progress",
            SyncEvent::Completed { .. } => "Sync completed successfully",
            SyncEvent::Failed { .. } => "Sync failed",
        }
    }

    fn source_id(&self) -> &str {
        match self {
            SyncEvent::Started { source_id, .. }
            | SyncEvent::Skipped { source_id, .. }
            | SyncEvent::PhaseStarted { source_id, .. }
            | SyncEvent::Progress { source_id, .. }
            | SyncEvent::Completed { source_id, .. }
            | SyncEvent::Failed { source_id, .. } => source_id,
        }
    }
}

// ============================================================================
// Persistence Events
// ============================================================================

/// Events emitted by the batch flush worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PersistenceEvent {
    /// A batch was accepted by the persistence port.
    BatchFlushed {
        source_id: String,
        batch_seq: u64,
        items: usize,
        /// Attempts used, first attempt included.
        attempts: u32,
    },
    /// A batch exhausted its retries; its items count as failed.
    BatchAbandoned {
        source_id: String,
        batch_seq: u64,
        items: usize,
        attempts: u32,
        message: String,
    },
}

impl PersistenceEvent {
    fn description(&self) -> &str {
        match self {
            PersistenceEvent::BatchFlushed { .. } => "Batch persisted",
            PersistenceEvent::BatchAbandoned { .. } => "Batch abandoned after retries",
        }
    }

    fn source_id(&self) -> &str {
        match self {
            PersistenceEvent::BatchFlushed { source_id, .. }
            | PersistenceEvent::BatchAbandoned { source_id, .. } => source_id,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to engine events.
///
/// Cloning is cheap; every clone publishes into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// When a subscriber falls behind by more than `capacity` events it
    /// receives `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    ///
    /// ```rust
    /// use core_runtime::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.subscriber_count(), 0);
    ///
    /// let _subscriber = event_bus.subscribe();
    /// assert_eq!(event_bus.subscriber_count(), 1);
    /// ```
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

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let persistence_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Persistence(_)));
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

    /// Keeps only events for one source.
    pub fn for_source(self, source_id: impl Into<String>) -> Self {
        let source_id = source_id.into();
        self.filter(move |event| event.source_id() == source_id)
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };

                    if filter(&event) {
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

// ============================================================================
// Tests
// ============================================================================
