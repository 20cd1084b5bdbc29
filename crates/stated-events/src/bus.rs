//! EventBus - fire-and-forget fan-out of variable events.
//!
//! - `RwLock<Vec<Subscriber>>` holds one `mpsc` sender per subscriber
//! - a bounded `VecDeque` keeps recent events for late readers

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::RwLock;

use stated_models::VariableEvent;
use tracing::trace;

use crate::filter::EventFilter;

/// Default number of events kept in history.
pub const DEFAULT_HISTORY_LIMIT: usize = 256;

/// One-way outbound channel for variable events.
///
/// Publishing never blocks and never fails observably to the caller.
pub trait EventSink: Send + Sync {
    /// Publishes an event.
    fn publish(&self, event: VariableEvent);
}

struct Subscriber {
    filter: Option<EventFilter>,
    tx: Sender<VariableEvent>,
}

/// Event bus with pub/sub and a bounded history.
///
/// # Example
///
/// ```
/// use stated_events::{EventBus, EventFilter, EventSink};
/// use stated_models::{VariableEvent, VariableId};
///
/// let bus = EventBus::new();
/// let rx = bus.subscribe_filtered(EventFilter::new().with_id_prefix("kitchen"));
///
/// bus.publish(VariableEvent::Removed { variable_id: VariableId::from("kitchen_fan") });
/// bus.publish(VariableEvent::Removed { variable_id: VariableId::from("garage_door") });
///
/// assert_eq!(rx.try_recv().unwrap().variable_id().as_str(), "kitchen_fan");
/// assert!(rx.try_recv().is_err());
/// ```
pub struct EventBus {
    history: RwLock<VecDeque<VariableEvent>>,
    history_limit: usize,
    subscribers: RwLock<Vec<Subscriber>>,
}

impl EventBus {
    /// Creates a bus keeping the default number of events in history.
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    /// Creates a bus keeping at most `limit` events in history.
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            history: RwLock::new(VecDeque::with_capacity(limit.min(DEFAULT_HISTORY_LIMIT))),
            history_limit: limit,
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Subscribes to every event.
    ///
    /// The receiver is disconnected when the bus is dropped.
    pub fn subscribe(&self) -> Receiver<VariableEvent> {
        self.add_subscriber(None)
    }

    /// Subscribes to events matching `filter`.
    pub fn subscribe_filtered(&self, filter: EventFilter) -> Receiver<VariableEvent> {
        self.add_subscriber(Some(filter))
    }

    fn add_subscriber(&self, filter: Option<EventFilter>) -> Receiver<VariableEvent> {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut subs) = self.subscribers.write() {
            subs.push(Subscriber { filter, tx });
        }
        rx
    }

    /// Returns the number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Returns recent events, oldest first, optionally filtered.
    pub fn recent(&self, filter: Option<&EventFilter>) -> Vec<VariableEvent> {
        let history = match self.history.read() {
            Ok(history) => history,
            Err(_) => return Vec::new(),
        };

        history
            .iter()
            .filter(|e| filter.map(|f| f.matches(e)).unwrap_or(true))
            .cloned()
            .collect()
    }

    /// Returns the number of events in history.
    pub fn len(&self) -> usize {
        self.history.read().map(|h| h.len()).unwrap_or(0)
    }

    /// Returns true if the history is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clears the history (subscribers are kept).
    pub fn clear_history(&self) {
        if let Ok(mut history) = self.history.write() {
            history.clear();
        }
    }

    fn record(&self, event: &VariableEvent) {
        if self.history_limit == 0 {
            return;
        }
        if let Ok(mut history) = self.history.write() {
            while history.len() >= self.history_limit {
                history.pop_front();
            }
            history.push_back(event.clone());
        }
    }

    /// Sends to matching subscribers and drops disconnected ones.
    fn broadcast(&self, event: &VariableEvent) {
        if let Ok(mut subs) = self.subscribers.write() {
            subs.retain(|sub| match &sub.filter {
                Some(filter) if !filter.matches(event) => true,
                _ => sub.tx.send(event.clone()).is_ok(),
            });
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for EventBus {
    fn publish(&self, event: VariableEvent) {
        trace!(
            variable_id = %event.variable_id(),
            kind = ?event.kind(),
            "publishing event"
        );
        self.record(&event);
        self.broadcast(&event);
    }
}
