use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use banlanx_led_controller::*;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time;
use tracing_subscriber::fmt::MakeWriter;

/// Log sink shared with a test subscriber
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn capture_warnings() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    (logs, tracing::subscriber::set_default(subscriber))
}

/// What the next `update` call reports
#[derive(Clone, Copy)]
enum Outcome {
    Valid,
    Invalid,
    LinkLost,
}

#[derive(Default)]
struct FakeSession {
    available: AtomicBool,
    delay: Duration,
    outcomes: Mutex<VecDeque<Outcome>>,
    retries: Mutex<Vec<Option<u8>>>,
    forces: Mutex<Vec<bool>>,
    updates: AtomicUsize,
    stops: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeSession {
    fn new(delay: Duration) -> Self {
        Self {
            available: AtomicBool::new(true),
            delay,
            ..Self::default()
        }
    }

    fn with_outcomes(self, outcomes: &[Outcome]) -> Self {
        self.outcomes.lock().extend(outcomes.iter().copied());
        self
    }

    fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Stand-in for a device command, tracked like an update
    async fn poke(&self) -> Result<()> {
        self.enter();
        time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }
}

#[async_trait]
impl DeviceSession for FakeSession {
    fn name(&self) -> &str {
        "fake"
    }

    fn available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn update(&self, retry: Option<u8>, force: bool) -> Result<bool> {
        self.enter();
        self.retries.lock().push(retry);
        self.forces.lock().push(force);
        time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.updates.fetch_add(1, Ordering::SeqCst);

        let outcome = self.outcomes.lock().pop_front().unwrap_or(Outcome::Valid);
        match outcome {
            Outcome::Valid => Ok(true),
            Outcome::Invalid => Ok(false),
            Outcome::LinkLost => {
                self.available.store(false, Ordering::SeqCst);
                Err(Error::BleError("link lost".into()))
            }
        }
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.available.store(false, Ordering::SeqCst);
    }
}

fn coordinator(
    session: FakeSession,
    state: EntryState,
) -> (Arc<UpdateCoordinator<FakeSession>>, watch::Sender<EntryState>) {
    let (entry, lifecycle) = watch::channel(state);
    let coordinator = UpdateCoordinator::new(session, lifecycle, &Settings::default());
    (Arc::new(coordinator), entry)
}

#[tokio::test(start_paused = true)]
async fn overlapping_refreshes_run_one_at_a_time() {
    let (coordinator, _entry) = coordinator(FakeSession::new(Duration::from_secs(1)), EntryState::Loaded);

    let (first, second, command) = tokio::join!(
        coordinator.refresh(EntryContext::loaded()),
        coordinator.refresh(EntryContext::loaded()),
        coordinator.command::<(), _>(|s| Box::pin(s.poke())),
    );
    first.expect("first refresh");
    second.expect("second refresh");
    command.expect("command");

    let session = coordinator.session();
    assert_eq!(session.updates(), 2);
    assert_eq!(session.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn inactive_entry_stops_device_without_updating() {
    let (coordinator, _entry) = coordinator(FakeSession::new(Duration::ZERO), EntryState::SetupError);

    let result = coordinator.refresh(coordinator.context()).await;
    assert_eq!(result, Err(UpdateError::InvalidEntryState(EntryState::SetupError)));
    assert_eq!(coordinator.session().stops(), 1);
    assert_eq!(coordinator.session().updates(), 0);

    // Already stopped, nothing more to disconnect
    let result = coordinator.refresh(coordinator.context()).await;
    assert!(matches!(result, Err(UpdateError::InvalidEntryState(_))));
    assert_eq!(coordinator.session().stops(), 1);
}

#[tokio::test(start_paused = true)]
async fn inactive_entry_does_not_wait_for_update_in_flight() {
    let (coordinator, _entry) =
        coordinator(FakeSession::new(Duration::from_secs(60)), EntryState::Loaded);

    let background = Arc::clone(&coordinator);
    let in_flight = tokio::spawn(async move { background.refresh(EntryContext::loaded()).await });
    tokio::task::yield_now().await;

    let teardown = EntryContext::new(EntryState::UnloadInProgress, 0);
    let result = time::timeout(Duration::from_secs(1), coordinator.refresh(teardown))
        .await
        .expect("returned before the in-flight update finished");
    assert_eq!(result, Err(UpdateError::InvalidEntryState(EntryState::UnloadInProgress)));

    in_flight.await.expect("task").expect("in-flight refresh");
    assert_eq!(coordinator.session().updates(), 1);
}

#[tokio::test(start_paused = true)]
async fn not_loaded_with_listeners_warns_and_fails() {
    let (logs, _subscriber) = capture_warnings();
    let (coordinator, _entry) = coordinator(FakeSession::new(Duration::ZERO), EntryState::NotLoaded);

    // No listeners, nothing stale to report
    let result = coordinator.refresh(coordinator.context()).await;
    assert_eq!(result, Err(UpdateError::InvalidEntryState(EntryState::NotLoaded)));
    assert!(!logs.contents().contains("still has listeners"));

    let _listener = coordinator.add_listener();
    assert_eq!(coordinator.context(), EntryContext::new(EntryState::NotLoaded, 1));

    let result = coordinator.refresh(coordinator.context()).await;
    assert_eq!(result, Err(UpdateError::InvalidEntryState(EntryState::NotLoaded)));
    assert_eq!(coordinator.session().updates(), 0);

    let output = logs.contents();
    assert!(output.contains("WARN"), "{output}");
    assert!(output.contains("still has listeners"), "{output}");
    assert!(output.contains("listeners=1"), "{output}");
}

#[tokio::test(start_paused = true)]
async fn forced_update_is_passed_once() {
    let session = FakeSession::new(Duration::ZERO).with_outcomes(&[
        Outcome::Valid,
        Outcome::Valid,
        Outcome::LinkLost,
        Outcome::Valid,
    ]);
    let (coordinator, _entry) = coordinator(session, EntryState::Loaded);

    coordinator.force_next_update();
    coordinator.refresh(EntryContext::loaded()).await.expect("forced");
    coordinator.refresh(EntryContext::loaded()).await.expect("regular");

    // Cleared by a failed attempt too
    coordinator.force_next_update();
    assert!(coordinator.refresh(EntryContext::loaded()).await.is_err());
    coordinator.refresh(EntryContext::loaded()).await.expect("recovered");

    assert_eq!(*coordinator.session().forces.lock(), [true, false, true, false]);
}

#[tokio::test(start_paused = true)]
async fn forced_flag_survives_a_refused_refresh() {
    let (coordinator, entry) = coordinator(FakeSession::new(Duration::ZERO), EntryState::SetupError);

    coordinator.force_next_update();
    assert!(coordinator.refresh(coordinator.context()).await.is_err());

    entry.send_replace(EntryState::Loaded);
    coordinator.refresh(coordinator.context()).await.expect("refresh");
    assert_eq!(*coordinator.session().forces.lock(), [true]);
}

#[tokio::test(start_paused = true)]
async fn no_refresh_after_shutdown() {
    let (coordinator, _entry) = coordinator(FakeSession::new(Duration::ZERO), EntryState::Loaded);
    coordinator.shutdown().await;

    let result = coordinator.refresh(coordinator.context()).await;
    assert_eq!(result, Err(UpdateError::Shutdown));
    assert_eq!(coordinator.session().updates(), 0);
}

#[tokio::test(start_paused = true)]
async fn refresh_waiting_on_the_lock_sees_shutdown() {
    let (coordinator, _entry) =
        coordinator(FakeSession::new(Duration::from_secs(5)), EntryState::Loaded);

    let first = Arc::clone(&coordinator);
    let in_flight = tokio::spawn(async move { first.refresh(EntryContext::loaded()).await });
    tokio::task::yield_now().await;

    let second = Arc::clone(&coordinator);
    let queued = tokio::spawn(async move { second.refresh(EntryContext::loaded()).await });
    tokio::task::yield_now().await;

    coordinator.shutdown().await;
    in_flight.await.expect("task").expect("in-flight refresh");
    assert_eq!(queued.await.expect("task"), Err(UpdateError::Shutdown));
    assert_eq!(coordinator.session().updates(), 1);
    assert_eq!(coordinator.session().stops(), 1);
}

#[tokio::test(start_paused = true)]
async fn retry_budget_follows_entry_state() {
    let (coordinator, _entry) = coordinator(FakeSession::new(Duration::ZERO), EntryState::Loaded);

    for state in [EntryState::Loaded, EntryState::SetupRetry, EntryState::SetupInProgress] {
        coordinator
            .refresh(EntryContext::new(state, 0))
            .await
            .expect("refresh");
    }
    assert_eq!(*coordinator.session().retries.lock(), [None, Some(0), Some(0)]);
}

#[tokio::test(start_paused = true)]
async fn failures_escalate_by_kind() {
    let session = FakeSession::new(Duration::ZERO).with_outcomes(&[
        Outcome::Invalid,
        Outcome::LinkLost,
        Outcome::Valid,
    ]);
    let (coordinator, _entry) = coordinator(session, EntryState::Loaded);
    assert_eq!(coordinator.last_update().at, None);

    let clean = coordinator.refresh(EntryContext::loaded()).await;
    assert!(matches!(clean, Err(UpdateError::UpdateFailed(_))));
    assert!(!coordinator.last_update_success());

    let transport = coordinator.refresh(EntryContext::loaded()).await;
    match transport {
        Err(UpdateError::ConfigEntry(message)) => assert!(message.contains("link lost")),
        other => panic!("expected a config entry error, got {other:?}"),
    }

    coordinator
        .refresh(EntryContext::loaded())
        .await
        .expect("recovered");
    assert!(coordinator.last_update_success());
    assert!(coordinator.last_update().at.is_some());
}

#[tokio::test(start_paused = true)]
async fn requested_refreshes_coalesce() {
    let (coordinator, _entry) = coordinator(FakeSession::new(Duration::ZERO), EntryState::Loaded);

    let mut requests = Vec::new();
    for _ in 0..5 {
        requests.push(coordinator.request_refresh());
        time::sleep(Duration::from_millis(300)).await;
    }

    // Cooldown restarts with every request
    time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(coordinator.session().updates(), 0);

    for request in requests {
        request.await.expect("request task");
    }
    assert_eq!(coordinator.session().updates(), 1);
}

#[tokio::test(start_paused = true)]
async fn polling_stops_on_shutdown() {
    let (coordinator, _entry) = coordinator(FakeSession::new(Duration::ZERO), EntryState::Loaded);
    let poller = coordinator.spawn();

    // Ticks at 0s, 10s and 20s
    time::sleep(Duration::from_secs(25)).await;
    assert_eq!(coordinator.session().updates(), 3);

    let pending = coordinator.request_refresh();
    coordinator.shutdown().await;
    poller.await.expect("poller");
    pending.await.expect("request task");
    assert!(coordinator.is_shutdown());
    assert_eq!(coordinator.session().stops(), 1);

    time::sleep(Duration::from_secs(60)).await;
    assert_eq!(coordinator.session().updates(), 3);
}

#[tokio::test(start_paused = true)]
async fn polling_follows_entry_lifecycle() {
    let (coordinator, entry) = coordinator(FakeSession::new(Duration::ZERO), EntryState::SetupInProgress);
    let poller = coordinator.spawn();

    time::sleep(Duration::from_secs(15)).await;
    entry.send_replace(EntryState::FailedUnload);
    time::sleep(Duration::from_secs(20)).await;

    let session = coordinator.session();
    assert_eq!(*session.retries.lock(), [Some(0), Some(0)]);
    assert_eq!(session.stops(), 1);

    coordinator.shutdown().await;
    poller.await.expect("poller");
}
