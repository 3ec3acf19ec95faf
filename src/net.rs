//! Network (TCP) device session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{self, timeout};
use tracing::{debug, error, instrument, trace, warn};

use crate::model::{ProtocolModel, Transport};
use crate::protocol::{self, Codec, Command};
use crate::session::{DeviceSession, DeviceState, LightControl};
use crate::settings::Settings;
use crate::{Error, Result};

/// Session with a network controller
///
/// Transactions are serialized by the socket lock. A failed transaction is
/// retried on a fresh connection; when every attempt fails the session is
/// marked unavailable.
pub struct NetSession {
    host: String,
    name: String,
    model: ProtocolModel,
    codec: Codec,
    retries: u8,
    connect_timeout: Duration,
    command_delay: Duration,
    socket: tokio::sync::Mutex<Option<TcpStream>>,
    available: AtomicBool,
    state: Mutex<DeviceState>,
}

impl NetSession {
    /// Create a session for a network model; nothing is connected yet
    ///
    /// # Panics
    ///
    /// If `model` is not a network model.
    pub fn new(
        host: impl Into<String>,
        name: impl Into<String>,
        model: ProtocolModel,
        settings: &Settings,
    ) -> Self {
        assert_eq!(
            model.transport(),
            Transport::Net,
            "{} is not a network model",
            model.name
        );
        Self {
            host: host.into(),
            name: name.into(),
            codec: Codec::new(Transport::Net),
            model,
            retries: settings.retry_count,
            connect_timeout: settings.connect_timeout(),
            command_delay: settings.command_delay(),
            socket: tokio::sync::Mutex::new(None),
            available: AtomicBool::new(false),
            state: Mutex::new(DeviceState::default()),
        }
    }

    fn set_available(&self, available: bool, reason: &str) {
        if self.available.swap(available, Ordering::SeqCst) != available {
            debug!(device = %self.name, available, reason, "Availability changed");
        }
    }

    async fn connect(&self) -> Result<TcpStream> {
        let port = self.model.port().unwrap_or(crate::models::net::PORT);
        debug!(host = %self.host, port, "Connecting");
        let stream = timeout(self.connect_timeout, TcpStream::connect((self.host.as_str(), port)))
            .await
            .map_err(|_| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("connecting to {}:{port}", self.host),
                ))
            })??;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    /// Read one response and fold it into the state
    async fn read_status(&self, stream: &mut TcpStream) -> Result<()> {
        let mut header = vec![0u8; self.codec.header_len()];
        timeout(self.connect_timeout, stream.read_exact(&mut header))
            .await
            .map_err(|_| Error::Protocol("no response header".into()))??;
        let (command, size) = self.codec.decode_header(&header)?;
        if command != Command::StatusQuery as u8 {
            return Err(Error::Protocol(format!("unexpected response {command:#04x}")));
        }
        let mut payload = vec![0u8; size];
        timeout(self.connect_timeout, stream.read_exact(&mut payload))
            .await
            .map_err(|_| Error::Protocol("response payload truncated".into()))??;
        trace!(size, "Status payload received");

        let report = protocol::decode_status(&payload)?;
        self.state.lock().apply(&self.model, &report)
    }

    async fn exchange(&self, socket: &mut Option<TcpStream>, frames: &[Vec<u8>]) -> Result<()> {
        let stream = match socket.take() {
            Some(stream) => stream,
            None => self.connect().await?,
        };
        let stream = socket.insert(stream);
        for frame in frames {
            stream.write_all(frame).await?;
            if matches!(self.codec.decode_header(frame), Ok((command, _)) if command == Command::StatusQuery as u8)
            {
                self.read_status(stream).await?;
            }
            time::sleep(self.command_delay).await;
        }
        Ok(())
    }

    /// Send frames as one transaction with `retry` additional attempts
    #[instrument(skip(self, frames), fields(device = %self.name, frames = frames.len()))]
    pub async fn transaction(&self, frames: Vec<Vec<u8>>, retry: Option<u8>) -> Result<()> {
        if frames.is_empty() {
            return Ok(());
        }
        let attempts = retry.unwrap_or(self.retries).saturating_add(1);
        let mut socket = self.socket.lock().await;
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.exchange(&mut socket, &frames).await {
                Ok(()) => {
                    self.set_available(true, "transaction complete");
                    if self.model.close_after_send() {
                        *socket = None;
                    }
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "Transaction failed");
                    *socket = None;
                    last_error = Some(e);
                }
            }
        }
        error!(attempts, "Transaction failed permanently");
        self.set_available(false, "transaction failed");
        Err(last_error.unwrap_or(Error::Timeout(attempts)))
    }
}

#[async_trait]
impl DeviceSession for NetSession {
    fn name(&self) -> &str {
        &self.name
    }

    fn available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    #[instrument(skip(self))]
    async fn update(&self, retry: Option<u8>, force: bool) -> Result<bool> {
        if force && self.socket.lock().await.take().is_some() {
            debug!(device = %self.name, "Dropping kept connection for a forced update");
        }
        self.transaction(vec![self.codec.status_query()], retry)
            .await?;
        let valid = self.state.lock().is_valid();
        if !valid {
            warn!("Status response carried no device state");
        }
        Ok(valid)
    }

    async fn stop(&self) {
        if !self.available() {
            return;
        }
        debug!(device = %self.name, "Stopping");
        let mut socket = self.socket.lock().await;
        *socket = None;
        self.set_available(false, "stopped");
    }

    fn state(&self) -> DeviceState {
        self.state.lock().clone()
    }
}

#[async_trait]
impl LightControl for NetSession {
    fn model(&self) -> &ProtocolModel {
        &self.model
    }

    fn codec(&self) -> Codec {
        self.codec
    }

    async fn send(&self, frames: Vec<Vec<u8>>) -> Result<()> {
        self.transaction(frames, None).await
    }
}
