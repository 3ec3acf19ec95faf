//! UDP discovery of network controllers.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::{self, Instant};
use tracing::{debug, info, instrument, trace, warn};

use crate::model::{ProtocolModel, Transport};
use crate::registry::Registry;
use crate::{Error, Result};

pub const DISCOVERY_PORT: u16 = 6454;
/// Broadcast probe, `SpNet` request
pub const DISCOVERY_REQUEST: [u8; 14] = [
    0x53, 0x70, 0x4E, 0x65, 0x74, 0x00, 0x00, 0x20, 0x00, 0x00, 0x00, 0x00, 0x02, 0xE0,
];
/// Prefix of every controller answer
pub const DISCOVERY_RESPONSE: [u8; 14] = [
    0x53, 0x70, 0x4E, 0x65, 0x74, 0x00, 0x00, 0x21, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01,
];

const MAX_RESPONSE_SIZE: usize = 40;
/// Rebroadcasts per scan window when nothing answers
const BROADCAST_FREQUENCY: u32 = 8;

/// A controller that answered a discovery probe
#[derive(Debug, Clone)]
pub struct Discovery {
    pub ip: IpAddr,
    pub mac: String,
    pub name: Option<String>,
    pub code: u8,
    /// Resolved model, `None` for unsupported hardware
    pub model: Option<ProtocolModel>,
}

impl Discovery {
    /// Decode a discovery answer received from `ip`
    pub fn parse(ip: IpAddr, data: &[u8]) -> Result<Self> {
        let body = data
            .strip_prefix(&DISCOVERY_RESPONSE[..])
            .ok_or_else(|| Error::Protocol("not a discovery response".into()))?;
        if body.len() < 12 {
            return Err(Error::Protocol(format!(
                "discovery response too short ({} bytes)",
                data.len()
            )));
        }

        let mac = body[5..11]
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(":");

        // Length includes the trailing NUL
        let name = match body[11] as usize {
            0 => None,
            len => {
                let raw = body
                    .get(12..11 + len)
                    .ok_or_else(|| Error::Protocol("discovery name truncated".into()))?;
                let name = std::str::from_utf8(raw)
                    .map_err(|e| Error::Protocol(format!("discovery name: {e}")))?;
                Some(name.to_string())
            }
        };

        Ok(Self {
            ip,
            mac,
            name,
            code: body[3],
            model: None,
        })
    }

    /// Look the reported model code up in `registry`
    pub fn resolve(&mut self, registry: &Registry) -> Option<&ProtocolModel> {
        self.model = registry
            .match_model_code(self.code)
            .filter(|model| model.transport() == Transport::Net);
        self.model.as_ref()
    }

    pub fn is_supported(&self) -> bool {
        self.model.is_some()
    }
}

impl fmt::Display for Discovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {:?} code={:#04x}",
            self.ip,
            self.mac,
            self.name.as_deref().unwrap_or("-"),
            self.code
        )?;
        match &self.model {
            Some(model) => write!(f, " {model}"),
            None => f.write_str(" unsupported"),
        }
    }
}

/// Broadcast scanner for network controllers
pub struct NetScanner {
    registry: Registry,
    port: u16,
}

impl NetScanner {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            port: DISCOVERY_PORT,
        }
    }

    /// Use a different destination port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    async fn socket(&self) -> Result<UdpSocket> {
        // Older firmware answers to the discovery port only
        let socket = match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, self.port)).await {
            Ok(socket) => socket,
            Err(e) => {
                debug!(port = self.port, error = %e, "Discovery port unavailable");
                UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?
            }
        };
        socket.set_broadcast(true)?;
        Ok(socket)
    }

    /// Probe the network for controllers
    ///
    /// With an `address` the probe is sent to that host only and the scan
    /// returns as soon as it answers.
    #[instrument(skip(self))]
    pub async fn scan(&self, window: Duration, address: Option<IpAddr>) -> Result<Vec<Discovery>> {
        let socket = self.socket().await?;
        let destination = SocketAddr::new(address.unwrap_or(IpAddr::V4(Ipv4Addr::BROADCAST)), self.port);
        let resend = window / BROADCAST_FREQUENCY;
        let deadline = Instant::now() + window;

        let mut found: Vec<Discovery> = Vec::new();
        let mut buf = [0u8; MAX_RESPONSE_SIZE];

        trace!(%destination, "Sending discovery probe");
        socket.send_to(&DISCOVERY_REQUEST, destination).await?;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let (len, from) = match time::timeout(remaining.min(resend), socket.recv_from(&mut buf)).await {
                Ok(received) => received?,
                Err(_) => {
                    if Instant::now() < deadline {
                        trace!(%destination, "No answer, probing again");
                        socket.send_to(&DISCOVERY_REQUEST, destination).await?;
                    }
                    continue;
                }
            };

            let data = &buf[..len];
            if data == DISCOVERY_REQUEST {
                continue;
            }
            trace!(%from, len, "Discovery answer");
            if found.iter().any(|d| d.ip == from.ip()) {
                continue;
            }

            let mut discovery = match Discovery::parse(from.ip(), data) {
                Ok(discovery) => discovery,
                Err(e) => {
                    debug!(%from, error = %e, "Ignoring datagram");
                    continue;
                }
            };
            match discovery.resolve(&self.registry) {
                Some(model) => info!(ip = %from.ip(), model = model.name, "Found controller"),
                None => warn!(
                    ip = %from.ip(),
                    code = format_args!("{:#04x}", discovery.code),
                    "Found unsupported controller"
                ),
            }
            found.push(discovery);

            if address.is_some_and(|ip| ip == from.ip()) {
                break;
            }
        }

        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(code: u8, name: &str) -> Vec<u8> {
        let mut data = DISCOVERY_RESPONSE.to_vec();
        data.extend([0x00, 0x00, 0x00, code, 0x00]);
        data.extend([0xA4, 0xC1, 0x38, 0x0B, 0x7E, 0x01]);
        data.push(name.len() as u8 + 1);
        data.extend(name.as_bytes());
        data.push(0);
        data
    }

    #[test]
    fn parses_response() {
        let ip: IpAddr = "192.168.1.40".parse().expect("ip");
        let mut discovery = Discovery::parse(ip, &response(0x4E, "Kitchen")).expect("valid");
        assert_eq!(discovery.mac, "A4:C1:38:0B:7E:01");
        assert_eq!(discovery.name.as_deref(), Some("Kitchen"));
        assert_eq!(discovery.code, 0x4E);

        let registry = Registry::builtin();
        assert_eq!(discovery.resolve(&registry).map(|m| m.name), Some("SP530E"));
    }

    #[test]
    fn unnamed_and_unknown_devices() {
        let ip: IpAddr = "10.0.0.2".parse().expect("ip");
        let mut data = response(0x01, "");
        data.truncate(data.len() - 1);
        *data.last_mut().expect("length byte") = 0;
        let mut discovery = Discovery::parse(ip, &data).expect("valid");
        assert_eq!(discovery.name, None);
        assert!(discovery.resolve(&Registry::builtin()).is_none());
        assert!(!discovery.is_supported());
    }

    #[test]
    fn rejects_foreign_datagrams() {
        let ip: IpAddr = "10.0.0.2".parse().expect("ip");
        assert!(Discovery::parse(ip, &DISCOVERY_REQUEST).is_err());
        assert!(Discovery::parse(ip, &DISCOVERY_RESPONSE).is_err());
        let mut long_name = response(0x4E, "Desk");
        long_name[DISCOVERY_RESPONSE.len() + 11] = 30;
        assert!(Discovery::parse(ip, &long_name).is_err());
    }

    #[tokio::test]
    async fn scan_collects_answers_once_per_host() {
        let controller = UdpSocket::bind("127.0.0.1:0").await.expect("bind");
        let port = controller.local_addr().expect("addr").port();
        let answer = response(0x56, "Porch");
        let device = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (len, from) = controller.recv_from(&mut buf).await.expect("probe");
            assert_eq!(&buf[..len], DISCOVERY_REQUEST);
            controller.send_to(&answer, from).await.expect("answer");
            controller.send_to(&answer, from).await.expect("answer");
        });

        let scanner = NetScanner::new(Registry::builtin()).with_port(port);
        let ip: IpAddr = "127.0.0.1".parse().expect("ip");
        let found = scanner
            .scan(Duration::from_secs(2), Some(ip))
            .await
            .expect("scan");
        device.await.expect("device");

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].model.as_ref().map(|m| m.name), Some("SP538E"));
    }
}
