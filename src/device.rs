use btleplug::api::{
    Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use parking_lot::Mutex as StateLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::model::{ProtocolModel, Transport, TransportParams};
use crate::protocol::{self, Codec};
use crate::registry::Registry;
use crate::session::{DeviceSession, DeviceState, LightControl};
use crate::settings::Settings;
use crate::{Error, Result};

/// Maximum time to wait for a matching advertisement
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Write attempts per frame
const WRITE_ATTEMPTS: u8 = 3;

/// Gets the default Bluetooth adapter
#[instrument(skip(manager))]
async fn get_central(manager: &Manager) -> Result<Adapter> {
    debug!("Getting default Bluetooth adapter");
    let adapter = manager.adapters().await?.into_iter().next();
    match adapter {
        Some(adapter) => {
            debug!("Using Bluetooth adapter");
            Ok(adapter)
        }
        None => {
            error!("No Bluetooth adapters found");
            Err(Error::NoBluetoothAdapters)
        }
    }
}

/// Command queue to manage Bluetooth writes with rate limiting
struct CommandQueue {
    /// Semaphore to limit command concurrency
    semaphore: Semaphore,
    /// Minimum delay between commands
    min_delay: Duration,
    /// Last command timestamp
    last_command: Mutex<Instant>,
}

impl CommandQueue {
    fn new(min_delay: Duration) -> Self {
        Self {
            semaphore: Semaphore::new(1), // Only allow one command at a time
            min_delay,
            last_command: Mutex::new(Instant::now() - Duration::from_secs(1)),
        }
    }

    async fn execute<T, F>(&self, future: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| Error::BleError(e.to_string()))?;

        let mut last_cmd = self.last_command.lock().await;
        let elapsed = last_cmd.elapsed();
        if elapsed < self.min_delay {
            let wait_time = self.min_delay - elapsed;
            trace!("Rate limiting: waiting {:?} before next command", wait_time);
            time::sleep(wait_time).await;
        }

        let result = future.await;
        *last_cmd = Instant::now();
        result
    }
}

/// A peripheral selected during scanning
struct Candidate {
    peripheral: Peripheral,
    name: String,
    model: ProtocolModel,
}

/// Resolve a peripheral's advertisement against the registry
async fn match_peripheral(registry: &Registry, peripheral: &Peripheral) -> Option<Candidate> {
    let props = peripheral.properties().await.ok().flatten()?;
    let model = props
        .manufacturer_data
        .iter()
        .find_map(|(id, data)| registry.match_advertisement(*id, data))
        .or_else(|| {
            props
                .local_name
                .as_deref()
                .and_then(|name| registry.match_model_name(name))
                .filter(|model| model.transport() == Transport::Ble)
        })?;
    let name = props.local_name.unwrap_or_else(|| model.name.to_string());
    Some(Candidate {
        peripheral: peripheral.clone(),
        name,
        model,
    })
}

fn address_matches(peripheral: &Peripheral, addr: &str) -> bool {
    peripheral.address().to_string().eq_ignore_ascii_case(addr)
        || peripheral.id().to_string().eq_ignore_ascii_case(addr)
}

/// Scan until a supported (and, when given, addressed) controller shows up
#[instrument(skip(central, registry))]
async fn scan(central: &Adapter, registry: &Registry, addr: Option<&str>) -> Result<Candidate> {
    info!("Scanning for compatible BLE devices...");
    central.start_scan(ScanFilter::default()).await?;

    let start_time = Instant::now();
    while start_time.elapsed() < DISCOVERY_TIMEOUT {
        let peripherals = central.peripherals().await?;
        debug!("Found {} BLE peripherals so far", peripherals.len());

        for p in peripherals {
            if addr.is_some_and(|addr| !address_matches(&p, addr)) {
                continue;
            }
            match match_peripheral(registry, &p).await {
                Some(candidate) => {
                    info!(
                        "Found compatible device: {} ({})",
                        candidate.name, candidate.model
                    );
                    central.stop_scan().await?;
                    return Ok(candidate);
                }
                None if addr.is_some() => {
                    debug!("Device at {} is not a supported controller yet", p.address());
                }
                None => {}
            }
        }

        let remaining = DISCOVERY_TIMEOUT.saturating_sub(start_time.elapsed());
        info!(
            "Still scanning for compatible devices... ({} seconds remaining)",
            remaining.as_secs()
        );
        time::sleep(Duration::from_millis(500)).await;
    }

    central.stop_scan().await?;
    error!(
        "No compatible LED device found within {} seconds",
        DISCOVERY_TIMEOUT.as_secs()
    );
    Err(Error::NoCompatibleDevice)
}

/// Session with a Bluetooth controller
///
/// Status reports arrive as notifications on the write characteristic and
/// are folded into the state by a background task.
pub struct BleSession {
    name: String,
    model: ProtocolModel,
    codec: Codec,
    peripheral: Peripheral,
    write_characteristic: Characteristic,
    command_queue: CommandQueue,
    retries: u8,
    response_timeout: Duration,
    available: AtomicBool,
    state: Arc<StateLock<DeviceState>>,
    report_tx: Arc<watch::Sender<u64>>,
    reports: watch::Receiver<u64>,
    listener: StateLock<Option<JoinHandle<()>>>,
}

impl BleSession {
    /// Scan for the first supported controller and connect to it
    #[instrument(skip(registry, settings))]
    pub async fn discover(registry: &Registry, settings: &Settings) -> Result<BleSession> {
        Self::open(registry, None, settings).await
    }

    /// Scan for the controller with a specific MAC address or ID and connect to it
    #[instrument(skip(registry, settings))]
    pub async fn with_address(
        registry: &Registry,
        addr: &str,
        settings: &Settings,
    ) -> Result<BleSession> {
        Self::open(registry, Some(addr), settings).await
    }

    async fn open(registry: &Registry, addr: Option<&str>, settings: &Settings) -> Result<Self> {
        info!("Initializing BLE LED controller");
        let manager = Manager::new().await?;
        let central = get_central(&manager).await?;
        let Candidate {
            peripheral,
            name,
            model,
        } = scan(&central, registry, addr).await?;

        let TransportParams::Ble { write_uuid, .. } = model.params else {
            return Err(Error::UnsupportedModel(format!("{} is not a BLE model", model.name)));
        };

        info!("Connecting to device...");
        if !peripheral.is_connected().await? {
            peripheral.connect().await?;
        }
        debug!("Discovering services...");
        peripheral.discover_services().await?;

        let write_characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == write_uuid)
            .ok_or(Error::CharacteristicNotFound(write_uuid.to_string()))?;
        debug!("Found write characteristic: {}", write_characteristic.uuid);

        let codec = Codec::new(Transport::Ble);
        let state = Arc::new(StateLock::new(DeviceState::default()));
        let (report_tx, reports) = watch::channel(0u64);
        let report_tx = Arc::new(report_tx);

        let listener = if write_characteristic
            .properties
            .contains(CharPropFlags::NOTIFY)
        {
            peripheral.subscribe(&write_characteristic).await?;
            Some(
                spawn_listener(
                    &peripheral,
                    codec,
                    model.clone(),
                    state.clone(),
                    report_tx.clone(),
                )
                .await?,
            )
        } else {
            warn!("Write characteristic does not notify, status will be unavailable");
            None
        };

        info!("Successfully connected to {} ({})", name, model.name);
        Ok(BleSession {
            name,
            codec,
            peripheral,
            write_characteristic,
            command_queue: CommandQueue::new(settings.command_delay()),
            retries: settings.retry_count,
            response_timeout: settings.connect_timeout(),
            available: AtomicBool::new(true),
            state,
            report_tx,
            reports,
            listener: StateLock::new(listener),
            model,
        })
    }

    /// Helper function to ensure frames are written reliably with rate limiting
    #[instrument(skip(self, frame), fields(frame_length = frame.len()))]
    async fn write_frame(&self, frame: &[u8]) -> Result<()> {
        let peripheral = &self.peripheral;
        let write_characteristic = &self.write_characteristic;

        self.command_queue
            .execute(async move {
                // Prefer WriteWithResponse when supported
                let write_type = if write_characteristic
                    .properties
                    .contains(CharPropFlags::WRITE)
                {
                    WriteType::WithResponse
                } else {
                    WriteType::WithoutResponse
                };

                let mut attempt = 0;
                loop {
                    attempt += 1;
                    trace!("Sending BLE frame (attempt {}/{})", attempt, WRITE_ATTEMPTS);
                    match peripheral.write(write_characteristic, frame, write_type).await {
                        Ok(()) => return Ok(()),
                        Err(e) if attempt < WRITE_ATTEMPTS => {
                            warn!("Write failed (attempt {}/{}): {}", attempt, WRITE_ATTEMPTS, e);
                            time::sleep(Duration::from_millis(300)).await;
                        }
                        Err(e) => {
                            error!("Write failed permanently: {}", e);
                            return Err(Error::BleError(e.to_string()));
                        }
                    }
                }
            })
            .await
    }

    /// Re-establish a dropped link and its notification subscription
    async fn reconnect(&self) -> Result<()> {
        if self.peripheral.is_connected().await? {
            return Ok(());
        }
        info!("Reconnecting to {}", self.name);
        self.peripheral.connect().await?;
        self.peripheral.discover_services().await?;
        if !self
            .write_characteristic
            .properties
            .contains(CharPropFlags::NOTIFY)
        {
            return Ok(());
        }
        self.peripheral.subscribe(&self.write_characteristic).await?;
        let listener = spawn_listener(
            &self.peripheral,
            self.codec,
            self.model.clone(),
            self.state.clone(),
            self.report_tx.clone(),
        )
        .await?;
        if let Some(previous) = self.listener.lock().replace(listener) {
            previous.abort();
        }
        Ok(())
    }

    fn set_available(&self, available: bool, reason: &str) {
        if self.available.swap(available, Ordering::SeqCst) != available {
            debug!(device = %self.name, available, reason, "Availability changed");
        }
    }
}

/// Decode notifications into the shared state, bumping `reports` per applied status
async fn spawn_listener(
    peripheral: &Peripheral,
    codec: Codec,
    model: ProtocolModel,
    state: Arc<StateLock<DeviceState>>,
    reports: Arc<watch::Sender<u64>>,
) -> Result<JoinHandle<()>> {
    let mut notifications = peripheral.notifications().await?;
    Ok(tokio::spawn(async move {
        while let Some(notification) = notifications.next().await {
            let report = codec
                .decode_notification(&notification.value)
                .and_then(protocol::decode_status);
            match report {
                Ok(report) => {
                    let applied = state.lock().apply(&model, &report);
                    match applied {
                        Ok(()) => reports.send_modify(|count| *count += 1),
                        Err(e) => warn!("Status not applied: {}", e),
                    }
                }
                Err(e) => debug!("Ignoring notification: {}", e),
            }
        }
        debug!("Notification stream ended");
    }))
}

#[async_trait::async_trait]
impl DeviceSession for BleSession {
    fn name(&self) -> &str {
        &self.name
    }

    fn available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    #[instrument(skip(self))]
    async fn update(&self, retry: Option<u8>, force: bool) -> Result<bool> {
        if force {
            if let Err(e) = self.reconnect().await {
                self.set_available(false, "reconnect failed");
                return Err(e);
            }
        }
        let attempts = retry.unwrap_or(self.retries).saturating_add(1);
        let query = self.codec.status_query();
        for attempt in 1..=attempts {
            let mut reports = self.reports.clone();
            reports.borrow_and_update();

            if let Err(e) = self.write_frame(&query).await {
                self.set_available(false, "status query failed");
                return Err(e);
            }
            match time::timeout(self.response_timeout, reports.changed()).await {
                Ok(Ok(())) => {
                    self.set_available(true, "status received");
                    return Ok(self.state.lock().is_valid());
                }
                Ok(Err(_)) => {
                    return Err(Error::BleError("status channel closed".into()));
                }
                Err(_) => warn!("No status notification (attempt {}/{})", attempt, attempts),
            }
        }
        Ok(false)
    }

    async fn stop(&self) {
        if !self.available() {
            return;
        }
        debug!("Stopping {}", self.name);
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
        if let Err(e) = self.peripheral.disconnect().await {
            warn!("Disconnect failed: {}", e);
        }
        self.set_available(false, "stopped");
    }

    fn state(&self) -> DeviceState {
        self.state.lock().clone()
    }
}

#[async_trait::async_trait]
impl LightControl for BleSession {
    fn model(&self) -> &ProtocolModel {
        &self.model
    }

    fn codec(&self) -> Codec {
        self.codec
    }

    async fn send(&self, frames: Vec<Vec<u8>>) -> Result<()> {
        for frame in &frames {
            self.write_frame(frame).await?;
        }
        Ok(())
    }
}
