//! Event types and distribution for MusicLib
//!
//! Every state change the front-ends care about - database reloads and
//! maintenance script progress - is published as a [`MusiclibEvent`] on an
//! [`EventBus`]. The bus uses `tokio::broadcast` internally, providing:
//! - Non-blocking publish (slow subscribers don't block producers)
//! - Multiple concurrent subscribers
//! - Automatic cleanup when subscribers drop

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// MusicLib event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MusiclibEvent {
    /// The database file was (re)parsed and the record set replaced
    DatabaseLoaded {
        path: String,
        tracks: usize,
        timestamp: DateTime<Utc>,
    },

    /// The database file could not be opened; the previous record set
    /// is still in effect
    DatabaseLoadFailed {
        path: String,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A maintenance script was launched
    ScriptStarted {
        operation: String,
        script: String,
        timestamp: DateTime<Utc>,
    },

    /// One line of informational output from a running script, surfaced
    /// as it arrives
    ScriptOutput {
        operation: String,
        line: String,
        timestamp: DateTime<Utc>,
    },

    /// A maintenance script exited
    ScriptFinished {
        operation: String,
        outcome: ScriptOutcome,
        timestamp: DateTime<Utc>,
    },
}

/// Classified result of a maintenance script run
///
/// `Deferred` is distinct from both success and failure: the script
/// accepted the request but queued the work (busy database), and callers
/// should report "queued, will be retried" rather than an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result")]
pub enum ScriptOutcome {
    Success,
    Deferred,
    Failed {
        /// Exit code, or None when the process was killed by a signal
        exit_code: Option<i32>,
        message: String,
    },
}

/// Central event distribution bus
///
/// # Examples
///
/// ```
/// use musiclib_common::events::{EventBus, MusiclibEvent};
///
/// let bus = EventBus::new(100);
/// let mut rx = bus.subscribe();
///
/// bus.emit(MusiclibEvent::DatabaseLoaded {
///     path: "/tmp/musiclib.dsv".into(),
///     tracks: 0,
///     timestamp: chrono::Utc::now(),
/// });
///
/// // In async context:
/// // while let Ok(event) = rx.recv().await { ... }
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MusiclibEvent>,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events for slow
    /// subscribers before dropping the oldest
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events. Events emitted before subscription
    /// are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<MusiclibEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Emitting with no subscribers is not an error; the event is simply
    /// dropped.
    pub fn emit(&self, event: MusiclibEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("event emitted with no subscribers");
        }
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
