//! Polling coordinator for one device session.
//!
//! The coordinator owns the per-device update lock. Timer ticks, requested
//! refreshes and user commands all pass through it, so a device never sees
//! two of them at once. The lifecycle of the owning entry is read from a
//! [`watch`] channel the host keeps; the coordinator only branches on it.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::session::{DeviceSession, DeviceState};
use crate::settings::Settings;

/// Lifecycle of the host entry owning a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryState {
    NotLoaded,
    Loaded,
    SetupInProgress,
    SetupRetry,
    SetupError,
    MigrationError,
    FailedUnload,
    UnloadInProgress,
}

impl EntryState {
    /// Whether a device owned by an entry in this state may be polled
    pub fn allows_polling(self) -> bool {
        matches!(
            self,
            EntryState::Loaded | EntryState::SetupInProgress | EntryState::SetupRetry
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntryState::NotLoaded => "not_loaded",
            EntryState::Loaded => "loaded",
            EntryState::SetupInProgress => "setup_in_progress",
            EntryState::SetupRetry => "setup_retry",
            EntryState::SetupError => "setup_error",
            EntryState::MigrationError => "migration_error",
            EntryState::FailedUnload => "failed_unload",
            EntryState::UnloadInProgress => "unload_in_progress",
        }
    }
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a single refresh needs to know about the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryContext {
    pub state: EntryState,
    /// Subscribers still attached to the coordinator
    pub listeners: usize,
}

impl EntryContext {
    pub fn new(state: EntryState, listeners: usize) -> Self {
        Self { state, listeners }
    }

    /// A loaded entry with no listeners
    pub fn loaded() -> Self {
        Self::new(EntryState::Loaded, 0)
    }
}

/// Failures reported to the host
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpdateError {
    /// The entry is in a state that forbids polling
    #[error("Entry is {0}, polling is not allowed")]
    InvalidEntryState(EntryState),

    /// The transport failed; the entry needs to be reloaded
    #[error("Config entry error: {0}")]
    ConfigEntry(String),

    /// The device answered without a usable state; retry later
    #[error("Update failed: {0}")]
    UpdateFailed(String),

    /// The coordinator was shut down; the device is not touched again
    #[error("Coordinator is shut down")]
    Shutdown,
}

/// Outcome of the most recent update attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateStatus {
    pub success: bool,
    pub at: Option<DateTime<Local>>,
}

/// Trailing edge call coalescing
///
/// Every [`call`](Debouncer::call) restarts the cooldown; only the last call
/// of a burst runs, once the cooldown has elapsed without further calls.
/// Superseded calls are dropped before they start, never interrupted.
pub struct Debouncer {
    cooldown: Duration,
    generation: Arc<AtomicU64>,
    cancel: CancellationToken,
}

impl Debouncer {
    pub fn new(cooldown: Duration, cancel: CancellationToken) -> Self {
        Self {
            cooldown,
            generation: Arc::new(AtomicU64::new(0)),
            cancel,
        }
    }

    pub fn call<F>(&self, job: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = Arc::clone(&self.generation);
        let cancel = self.cancel.clone();
        let cooldown = self.cooldown;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = time::sleep(cooldown) => {}
            }
            if generation.load(Ordering::SeqCst) != ticket {
                return;
            }
            job.await;
        })
    }
}

/// Keeps a listener registered until dropped
#[must_use = "the listener is removed when the guard is dropped"]
pub struct ListenerGuard {
    listeners: Arc<AtomicUsize>,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.listeners.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Drives periodic updates of one device session
pub struct UpdateCoordinator<S> {
    session: S,
    entry: watch::Receiver<EntryState>,
    lock: tokio::sync::Mutex<()>,
    update_interval: Duration,
    debouncer: Debouncer,
    force_next_update: AtomicBool,
    status: Mutex<UpdateStatus>,
    listeners: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl<S: DeviceSession + 'static> UpdateCoordinator<S> {
    /// Create a coordinator for `session`, following the entry lifecycle on `entry`
    pub fn new(session: S, entry: watch::Receiver<EntryState>, settings: &Settings) -> Self {
        let shutdown = CancellationToken::new();
        Self {
            session,
            entry,
            lock: tokio::sync::Mutex::new(()),
            update_interval: settings.update_interval(),
            debouncer: Debouncer::new(settings.request_refresh_delay(), shutdown.child_token()),
            force_next_update: AtomicBool::new(false),
            status: Mutex::new(UpdateStatus::default()),
            listeners: Arc::new(AtomicUsize::new(0)),
            shutdown,
        }
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    /// Last decoded device state
    pub fn state(&self) -> DeviceState {
        self.session.state()
    }

    pub fn update_interval(&self) -> Duration {
        self.update_interval
    }

    pub fn last_update(&self) -> UpdateStatus {
        *self.status.lock()
    }

    pub fn last_update_success(&self) -> bool {
        self.status.lock().success
    }

    /// Mark the next update as forced; cleared by any update attempt
    pub fn force_next_update(&self) {
        self.force_next_update.store(true, Ordering::SeqCst);
    }

    pub fn add_listener(&self) -> ListenerGuard {
        self.listeners.fetch_add(1, Ordering::SeqCst);
        ListenerGuard {
            listeners: Arc::clone(&self.listeners),
        }
    }

    pub fn listeners(&self) -> usize {
        self.listeners.load(Ordering::SeqCst)
    }

    /// Current host context as seen by the coordinator
    pub fn context(&self) -> EntryContext {
        EntryContext::new(*self.entry.borrow(), self.listeners())
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Refresh the device once
    ///
    /// The entry state is checked before the update lock is taken, so a torn
    /// down entry never waits behind an in-flight update.
    #[instrument(skip(self), fields(device = %self.session.name()))]
    pub async fn refresh(&self, ctx: EntryContext) -> Result<(), UpdateError> {
        if self.is_shutdown() {
            return Err(UpdateError::Shutdown);
        }
        if ctx.state == EntryState::NotLoaded && ctx.listeners > 0 {
            warn!(
                listeners = ctx.listeners,
                "Entry is not loaded but still has listeners"
            );
        }

        if !ctx.state.allows_polling() {
            if self.session.available() {
                debug!(state = %ctx.state, "Stopping device of inactive entry");
                self.session.stop().await;
            }
            return Err(UpdateError::InvalidEntryState(ctx.state));
        }

        let _guard = self.lock.lock().await;
        // shutdown() may have stopped the session while we waited
        if self.is_shutdown() {
            return Err(UpdateError::Shutdown);
        }
        let retry = match ctx.state {
            EntryState::Loaded => None,
            _ => Some(0),
        };
        let forced = self.force_next_update.swap(false, Ordering::SeqCst);
        debug!(?retry, forced, "Updating");

        let result = match self.session.update(retry, forced).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(UpdateError::UpdateFailed(format!(
                "{} did not report a valid state",
                self.session.name()
            ))),
            Err(e) => Err(UpdateError::ConfigEntry(format!("{}: {e}", self.session.name()))),
        };
        self.record(result.is_ok());
        result
    }

    fn record(&self, success: bool) {
        let mut status = self.status.lock();
        if status.success != success {
            info!(device = %self.session.name(), success, "Update status changed");
        }
        *status = UpdateStatus {
            success,
            at: Some(Local::now()),
        };
    }

    /// Run `command` against the session while holding the update lock
    pub async fn command<T, F>(&self, command: F) -> crate::Result<T>
    where
        F: for<'a> FnOnce(&'a S) -> BoxFuture<'a, crate::Result<T>>,
    {
        let _guard = self.lock.lock().await;
        command(&self.session).await
    }

    /// Request a refresh, coalesced with other requests in the cooldown
    pub fn request_refresh(self: &Arc<Self>) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        self.debouncer.call(async move {
            if let Err(e) = coordinator.refresh(coordinator.context()).await {
                warn!(error = %e, "Requested refresh failed");
            }
        })
    }

    /// Start timer driven polling until [`shutdown`](Self::shutdown)
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move { coordinator.run().await })
    }

    async fn run(&self) {
        let mut ticker = time::interval(self.update_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            device = %self.session.name(),
            interval = ?self.update_interval,
            "Polling started"
        );
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh(self.context()).await {
                        warn!(device = %self.session.name(), error = %e, "Scheduled refresh failed");
                    }
                }
            }
        }
        debug!(device = %self.session.name(), "Polling stopped");
    }

    /// Stop polling, drop pending refreshes and disconnect the device
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let _guard = self.lock.lock().await;
        self.session.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polling_states() {
        let allowed: Vec<_> = [
            EntryState::NotLoaded,
            EntryState::Loaded,
            EntryState::SetupInProgress,
            EntryState::SetupRetry,
            EntryState::SetupError,
            EntryState::MigrationError,
            EntryState::FailedUnload,
            EntryState::UnloadInProgress,
        ]
        .into_iter()
        .filter(|state| state.allows_polling())
        .collect();
        assert_eq!(
            allowed,
            [EntryState::Loaded, EntryState::SetupInProgress, EntryState::SetupRetry]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn debouncer_runs_last_call_only() {
        let debouncer = Debouncer::new(Duration::from_secs(2), CancellationToken::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..3 {
            let runs = Arc::clone(&runs);
            handles.push(debouncer.call(async move {
                runs.fetch_add(1, Ordering::SeqCst);
            }));
            time::sleep(Duration::from_millis(500)).await;
        }
        for handle in handles {
            handle.await.expect("debounced task");
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_debouncer_drops_pending_call() {
        let cancel = CancellationToken::new();
        let debouncer = Debouncer::new(Duration::from_secs(2), cancel.clone());
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let handle = debouncer.call(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        cancel.cancel();
        handle.await.expect("debounced task");
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn listener_guards_count() {
        let listeners = Arc::new(AtomicUsize::new(2));
        let guard = ListenerGuard {
            listeners: Arc::clone(&listeners),
        };
        drop(guard);
        assert_eq!(listeners.load(Ordering::SeqCst), 1);
    }
}
