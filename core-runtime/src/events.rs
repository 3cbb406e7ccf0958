//! # Event Bus System
//!
//! Typed notifications from the offline audio core to whoever is listening:
//! the host UI, a CLI, or tests. Built on `tokio::sync::broadcast`.
//!
//! ```text
//! ┌──────────────────┐  emit   ┌───────────┐  subscribe  ┌────────────┐
//! │ AudioInterceptor ├────────>│           ├────────────>│ Host UI    │
//! └──────────────────┘         │ EventBus  │             └────────────┘
//! ┌──────────────────┐  emit   │ (broadcast│  subscribe  ┌────────────┐
//! │ Library Manager  ├────────>│  channel) ├────────────>│ Logger/CLI │
//! └──────────────────┘         │           │             └────────────┘
//! ┌──────────────────┐  emit   │           │
//! │ Playback Resolver├────────>│           │
//! └──────────────────┘         └───────────┘
//! ```
//!
//! Failures the user must hear about (a download that did not complete, a
//! delete that did not happen) travel as events rather than as modal alerts,
//! so the host decides how to surface them.
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber fell `n` events behind. Non-fatal.
//! - **`RecvError::Closed`**: every sender is gone; treat as shutdown.
//!
//! Emitting with no subscribers is not an error worth reporting; producers
//! call `emit(..).ok()`.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 64;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Interception layer lifecycle
    Interceptor(InterceptorEvent),
    /// Offline library changes and failures
    Library(LibraryEvent),
    /// Playback source resolution
    Playback(PlaybackEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Interceptor(e) => e.description(),
            CoreEvent::Library(e) => e.description(),
            CoreEvent::Playback(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Library(LibraryEvent::DownloadFailed { .. })
            | CoreEvent::Library(LibraryEvent::DeleteFailed { .. })
            | CoreEvent::Library(LibraryEvent::ClearFailed { .. }) => EventSeverity::Error,
            CoreEvent::Playback(PlaybackEvent::CorruptEntryBypassed { .. }) => {
                EventSeverity::Warning
            }
            CoreEvent::Library(LibraryEvent::DownloadCancelled { .. }) => EventSeverity::Warning,
            CoreEvent::Playback(PlaybackEvent::SourceResolved { .. }) => EventSeverity::Debug,
            _ => EventSeverity::Info,
        }
    }

    /// Whether the host should put this in front of the user.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, CoreEvent::Library(_)) && self.severity() >= EventSeverity::Info
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
// Interceptor Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum InterceptorEvent {
    /// The install phase completed; the interceptor is waiting to activate.
    Installed { generation: String },
    /// Activation finished; stale generations were removed.
    Activated {
        generation: String,
        removed_generations: Vec<String>,
    },
    /// Already-open clients are now routed through the interceptor.
    ClientsClaimed { generation: String },
    /// A newer interceptor took over; this one no longer serves requests.
    Superseded { generation: String },
}

impl InterceptorEvent {
    fn description(&self) -> &str {
        match self {
            InterceptorEvent::Installed { .. } => "Interceptor installed",
            InterceptorEvent::Activated { .. } => "Interceptor activated",
            InterceptorEvent::ClientsClaimed { .. } => "Interceptor claimed clients",
            InterceptorEvent::Superseded { .. } => "Interceptor superseded",
        }
    }
}

// ============================================================================
// Library Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LibraryEvent {
    /// Download was accepted and the fetch has begun.
    DownloadStarted { track_id: String, title: String },
    /// Bytes are cached and the track is recorded as offline.
    DownloadCompleted {
        track_id: String,
        title: String,
        bytes: u64,
    },
    /// Download did not complete. `retryable` is true for network and
    /// timeout failures.
    DownloadFailed {
        track_id: String,
        message: String,
        retryable: bool,
    },
    /// Download was abandoned on request.
    DownloadCancelled { track_id: String },
    /// Track removed from the offline library.
    TrackDeleted { track_id: String },
    /// Track could not be removed; it is still listed.
    DeleteFailed { track_id: String, message: String },
    /// Every offline entry and record was removed.
    LibraryCleared {
        records_removed: usize,
        entries_removed: usize,
    },
    /// Clearing failed part-way.
    ClearFailed { message: String },
}

impl LibraryEvent {
    fn description(&self) -> &str {
        match self {
            LibraryEvent::DownloadStarted { .. } => "Download started",
            LibraryEvent::DownloadCompleted { .. } => "Download completed",
            LibraryEvent::DownloadFailed { .. } => "Download failed",
            LibraryEvent::DownloadCancelled { .. } => "Download cancelled",
            LibraryEvent::TrackDeleted { .. } => "Track deleted",
            LibraryEvent::DeleteFailed { .. } => "Delete failed",
            LibraryEvent::LibraryCleared { .. } => "Offline library cleared",
            LibraryEvent::ClearFailed { .. } => "Clear failed",
        }
    }
}

// ============================================================================
// Playback Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    /// A playable source was chosen for a track.
    SourceResolved { url: String, from_cache: bool },
    /// A cached entry was unusable and the network URL was used instead.
    CorruptEntryBypassed { url: String },
}

impl PlaybackEvent {
    fn description(&self) -> &str {
        match self {
            PlaybackEvent::SourceResolved { .. } => "Playback source resolved",
            PlaybackEvent::CorruptEntryBypassed { .. } => "Corrupt cache entry bypassed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Cloning the bus clones the sender; every clone publishes into the same
/// channel. Each `subscribe()` call creates an independent receiver that sees
/// events emitted after it was created.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// A subscriber that falls more than `capacity` events behind receives
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

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

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional filter.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let bus = EventBus::default();
/// let library_only = EventStream::new(bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Library(_)));
/// # drop(library_only);
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

    /// Only events matching `predicate` will be returned.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
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

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching event is currently available.
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

// ============================================================================
// Tests
// ============================================================================
