//! Main runtime manager.

use std::sync::mpsc::Receiver;
use std::sync::Arc;

use stated_events::{EventBus, EventFilter};
use stated_models::{VariableEvent, VariableId, VariableState};
use stated_persistence::{JsonFileStorage, Storage};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::command::{Command, CommandOutcome};
use crate::config::RuntimeConfig;
use crate::error::{Result, RuntimeError};
use crate::scheduler::{TimerKey, TokioScheduler};
use crate::store::VariableStore;
use crate::variable::{Expired, Services};

/// Main runtime manager: owns the store and delivers fired timers to it.
///
/// Commands and timer deliveries each hold the store lock for their whole
/// duration, so operations on a variable never interleave.
pub struct Runtime {
    /// The variable store.
    store: Arc<Mutex<VariableStore>>,
    /// Event bus shared with every variable.
    events: Arc<EventBus>,
    /// Fired timers, until the timer loop takes them.
    fired_rx: Option<mpsc::UnboundedReceiver<TimerKey>>,
    /// Handle to the timer loop task.
    timer_handle: Option<JoinHandle<()>>,
    /// Shutdown signal sender.
    shutdown_tx: watch::Sender<bool>,
    /// Shutdown signal receiver (for cloning to the timer loop).
    shutdown_rx: watch::Receiver<bool>,
    /// Whether the runtime has been started.
    started: bool,
}

impl Runtime {
    /// Create a runtime backed by the collection file in `config.state_dir`
    /// and load the persisted variables.
    pub async fn new(config: RuntimeConfig) -> Result<Self> {
        let storage = JsonFileStorage::new(config.storage_path());
        Self::with_storage(config, Box::new(storage)).await
    }

    /// Create a runtime backed by `storage` and load the persisted variables.
    pub async fn with_storage(config: RuntimeConfig, storage: Box<dyn Storage>) -> Result<Self> {
        let events = Arc::new(EventBus::with_history_limit(config.event_history));
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let scheduler = TokioScheduler::new(Handle::current(), fired_tx);
        let services = Services::new(Arc::new(scheduler), events.clone());

        let mut store = VariableStore::new(storage, services);
        store.load()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            store: Arc::new(Mutex::new(store)),
            events,
            fired_rx: Some(fired_rx),
            timer_handle: None,
            shutdown_tx,
            shutdown_rx,
            started: false,
        })
    }

    /// Start the runtime (begins delivering fired timers).
    ///
    /// Commands are accepted before start; timers armed meanwhile fire once
    /// the runtime is started.
    pub async fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(RuntimeError::AlreadyStarted);
        }
        let fired_rx = self.fired_rx.take().ok_or(RuntimeError::AlreadyStarted)?;

        info!("starting runtime");

        let store = Arc::clone(&self.store);
        let shutdown_rx = self.shutdown_rx.clone();
        let handle = tokio::spawn(run_timer_loop(store, fired_rx, shutdown_rx));

        self.timer_handle = Some(handle);
        self.started = true;

        debug!("runtime started");

        Ok(())
    }

    /// Stop the runtime gracefully, cancelling every armed TTL.
    pub async fn shutdown(&mut self) -> Result<()> {
        if !self.started {
            return Err(RuntimeError::NotStarted);
        }

        info!("shutting down runtime");

        self.shutdown_tx.send(true).map_err(|e| {
            RuntimeError::Shutdown(format!("failed to send shutdown signal: {}", e))
        })?;

        if let Some(handle) = self.timer_handle.take() {
            debug!("waiting for timer loop to stop");
            handle.await.map_err(|e| {
                RuntimeError::Shutdown(format!("timer loop panicked: {}", e))
            })?;
        }

        self.store.lock().await.cancel_all_ttls();
        self.started = false;

        info!("runtime stopped");

        Ok(())
    }

    /// Apply a command to the store.
    pub async fn execute(&self, command: Command) -> Result<CommandOutcome> {
        let mut store = self.store.lock().await;
        command.apply(&mut store)
    }

    /// Get a snapshot of one variable.
    pub async fn get(&self, id: &VariableId) -> Option<VariableState> {
        self.store.lock().await.state(id)
    }

    /// List snapshots of every variable, ordered by id.
    pub async fn list(&self) -> Vec<VariableState> {
        self.store.lock().await.list()
    }

    /// Get the event bus.
    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    /// Subscribe to every variable event.
    pub fn subscribe(&self) -> Receiver<VariableEvent> {
        self.events.subscribe()
    }

    /// Subscribe to variable events matching `filter`.
    pub fn subscribe_filtered(&self, filter: EventFilter) -> Receiver<VariableEvent> {
        self.events.subscribe_filtered(filter)
    }

    /// Get the shared store.
    pub fn store(&self) -> Arc<Mutex<VariableStore>> {
        Arc::clone(&self.store)
    }

    /// Check if the runtime has been started.
    pub fn is_started(&self) -> bool {
        self.started
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        // Send shutdown signal if still running
        if self.started {
            let _ = self.shutdown_tx.send(true);
        }
    }
}

async fn run_timer_loop(
    store: Arc<Mutex<VariableStore>>,
    mut fired_rx: mpsc::UnboundedReceiver<TimerKey>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    debug!("timer loop started");

    loop {
        tokio::select! {
            Some(key) = fired_rx.recv() => {
                let mut store = store.lock().await;
                match store.on_ttl_fired(&key) {
                    Ok(Expired::Ignored) => debug!(timer = %key, "timer ignored"),
                    Ok(expired) => debug!(timer = %key, ?expired, "timer handled"),
                    Err(e) => error!(timer = %key, error = %e, "failed to handle expired ttl"),
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            else => break,
        }
    }

    debug!("timer loop stopped");
}
