//! One-shot timers for TTL expiry.
//!
//! A [`Scheduler`] arms a timer for an absolute time and returns a
//! [`TimerHandle`] that cancels it. When a timer fires, its [`TimerKey`] is
//! delivered back to whoever drives the store; the key carries the arming
//! generation so a late or cancelled timer can be recognised and ignored.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use stated_models::VariableId;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::trace;

/// Identifies one arming of a variable's TTL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimerKey {
    /// The variable the timer belongs to.
    pub variable_id: VariableId,
    /// Arming generation, unique per variable.
    pub generation: u64,
}

impl fmt::Display for TimerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.variable_id, self.generation)
    }
}

/// Cancellation handle for an armed timer.
pub trait TimerHandle: Send {
    /// Cancels the timer. Cancelling a timer that already fired is a no-op.
    fn cancel(self: Box<Self>);
}

/// Registers "deliver this key at absolute time T".
pub trait Scheduler: Send + Sync {
    /// Arms a one-shot timer.
    fn schedule_at(&self, at: DateTime<Utc>, key: TimerKey) -> Box<dyn TimerHandle>;
}

/// Scheduler backed by tokio tasks.
///
/// Each timer is a task that sleeps until the deadline and then sends its
/// key on the channel. Cancelling aborts the task.
pub struct TokioScheduler {
    handle: Handle,
    fired_tx: UnboundedSender<TimerKey>,
}

impl TokioScheduler {
    /// Creates a scheduler spawning onto `handle` and delivering to `fired_tx`.
    pub fn new(handle: Handle, fired_tx: UnboundedSender<TimerKey>) -> Self {
        Self { handle, fired_tx }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_at(&self, at: DateTime<Utc>, key: TimerKey) -> Box<dyn TimerHandle> {
        // Deadlines in the past fire immediately
        let delay = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let fired_tx = self.fired_tx.clone();

        trace!(timer = %key, delay_ms = delay.as_millis() as u64, "arming timer");

        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            // A closed channel means the runtime is gone
            let _ = fired_tx.send(key);
        });

        Box::new(TokioTimer { task })
    }
}

struct TokioTimer {
    task: JoinHandle<()>,
}

impl TimerHandle for TokioTimer {
    fn cancel(self: Box<Self>) {
        self.task.abort();
    }
}

#[derive(Debug, Default)]
struct ManualTimers {
    next_slot: u64,
    pending: BTreeMap<u64, (DateTime<Utc>, TimerKey)>,
}

/// Deterministic scheduler that only fires when asked to.
///
/// Timers are kept in a list; `take_due` and `take_all` remove and return
/// the keys that should fire, in deadline order. Clones share their timers.
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
    timers: Arc<Mutex<ManualTimers>>,
}

impl ManualScheduler {
    /// Creates a scheduler with no timers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the armed timers in deadline order.
    pub fn pending(&self) -> Vec<(DateTime<Utc>, TimerKey)> {
        let Ok(timers) = self.timers.lock() else {
            return Vec::new();
        };
        let mut pending: Vec<_> = timers.pending.values().cloned().collect();
        pending.sort_by(|a, b| a.0.cmp(&b.0));
        pending
    }

    /// Returns the number of armed timers.
    pub fn pending_count(&self) -> usize {
        self.timers.lock().map(|t| t.pending.len()).unwrap_or(0)
    }

    /// Removes and returns the keys of timers due at or before `now`.
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<TimerKey> {
        self.take_where(|at| *at <= now)
    }

    /// Removes and returns every armed timer's key.
    pub fn take_all(&self) -> Vec<TimerKey> {
        self.take_where(|_| true)
    }

    fn take_where(&self, due: impl Fn(&DateTime<Utc>) -> bool) -> Vec<TimerKey> {
        let Ok(mut timers) = self.timers.lock() else {
            return Vec::new();
        };
        let slots: Vec<u64> = timers
            .pending
            .iter()
            .filter(|(_, (at, _))| due(at))
            .map(|(slot, _)| *slot)
            .collect();

        let mut fired: Vec<(DateTime<Utc>, TimerKey)> = slots
            .into_iter()
            .filter_map(|slot| timers.pending.remove(&slot))
            .collect();
        fired.sort_by(|a, b| a.0.cmp(&b.0));
        fired.into_iter().map(|(_, key)| key).collect()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_at(&self, at: DateTime<Utc>, key: TimerKey) -> Box<dyn TimerHandle> {
        let slot = match self.timers.lock() {
            Ok(mut timers) => {
                let slot = timers.next_slot;
                timers.next_slot += 1;
                timers.pending.insert(slot, (at, key));
                slot
            }
            Err(_) => u64::MAX,
        };
        Box::new(ManualTimer {
            timers: Arc::clone(&self.timers),
            slot,
        })
    }
}

struct ManualTimer {
    timers: Arc<Mutex<ManualTimers>>,
    slot: u64,
}

impl TimerHandle for ManualTimer {
    fn cancel(self: Box<Self>) {
        if let Ok(mut timers) = self.timers.lock() {
            timers.pending.remove(&self.slot);
        }
    }
}
