/*!
 # SPTech frame codec

 Frames start with a transport specific magic followed by the command
 byte, an encoder key and the payload size:

 | transport | layout                                                        |
 |-----------|---------------------------------------------------------------|
 | network   | `SPTECH\0` cmd key `00 00` size(u16 BE) payload               |
 | BLE       | `S` cmd key `01 00` size(u8) payload                          |

 Status responses carry a chunked payload: the first byte selects the width
 of the chunk size fields (0 = one byte, 1 = two bytes), followed by
 `type size data` chunks.
*/

use std::fmt;

use tracing::{debug, trace, warn};

use crate::effects::EffectMode;
use crate::model::Transport;
use crate::{Error, Result};

const NET_MAGIC: &[u8] = b"SPTECH\0";
const BLE_MAGIC: &[u8] = b"S";

/// Header bytes following the magic: cmd, key, two flag bytes, size
const NET_HEADER_FIELDS: usize = 6;
const BLE_HEADER_FIELDS: usize = 5;

pub const MAX_EFFECT_SPEED: u8 = 10;
pub const MAX_EFFECT_LENGTH: u8 = 150;
pub const MAX_SENSITIVITY: u8 = 16;
pub const MAX_ONOFF_PIXELS: u16 = 600;

/// Command bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    StatusQuery = 0x02,
    OnOffOptions = 0x08,
    Coexistence = 0x0A,
    OnPower = 0x0B,
    Power = 0x50,
    Brightness = 0x51,
    StaticColor = 0x52,
    LightMode = 0x53,
    EffectSpeed = 0x54,
    EffectLength = 0x55,
    EffectDirection = 0x56,
    EffectColor = 0x57,
    EffectLoop = 0x58,
    AudioInput = 0x59,
    AudioGain = 0x5A,
    EffectPlay = 0x5D,
    EffectCct = 0x60,
    StaticCct = 0x61,
    LightType = 0x6A,
    ChipOrder = 0x6B,
}

/// Byte-coded option with a display name
macro_rules! named_options {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $code:literal => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[repr(u8)]
        pub enum $name {
            $($variant = $code),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn from_code(code: u8) -> Option<Self> {
                match code {
                    $($code => Some($name::$variant),)+
                    _ => None,
                }
            }

            pub fn code(self) -> u8 {
                self as u8
            }

            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            /// Case insensitive lookup by display name
            pub fn from_name(name: &str) -> Option<Self> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|option| option.name().eq_ignore_ascii_case(name.trim()))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

named_options!(
    /// Animation played when the light is switched on or off
    OnOffEffect {
        FlowForward = 0x01 => "Flow Forward",
        FlowBackward = 0x02 => "Flow Backward",
        Gradient = 0x03 => "Gradient",
        Stars = 0x04 => "Stars",
    }
);

named_options!(
    /// Speed of the on/off animation
    OnOffSpeed {
        Slow = 0x01 => "Slow",
        Medium = 0x02 => "Medium",
        Fast = 0x03 => "Fast",
    }
);

named_options!(
    /// State restored when mains power returns
    OnPower {
        LightOff = 0x00 => "Light Off",
        LightOn = 0x01 => "Light On",
        LastState = 0x02 => "Last state",
    }
);

named_options!(
    /// Sound source for sound reactive modes
    AudioInput {
        IntMic = 0x00 => "Internal Microphone",
        Player = 0x01 => "Player",
        ExtMic = 0x02 => "External Microphone",
    }
);

/// Which brightness level a command addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Color,
    White,
}

impl Level {
    /// Level driven by `mode`
    pub fn for_mode(mode: EffectMode) -> Level {
        if mode.is_color() {
            Level::Color
        } else {
            Level::White
        }
    }
}

fn check_range(value: u32, min: u32, max: u32) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(Error::ValueOutOfRange(value, min, max))
    }
}

/// Frame encoder and decoder for one transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Codec {
    transport: Transport,
    key: u8,
}

impl Codec {
    pub fn new(transport: Transport) -> Self {
        Self { transport, key: 0 }
    }

    fn magic(&self) -> &'static [u8] {
        match self.transport {
            Transport::Net => NET_MAGIC,
            Transport::Ble => BLE_MAGIC,
        }
    }

    /// Length of a response header
    pub fn header_len(&self) -> usize {
        match self.transport {
            Transport::Net => NET_MAGIC.len() + NET_HEADER_FIELDS,
            Transport::Ble => BLE_MAGIC.len() + BLE_HEADER_FIELDS,
        }
    }

    /// Encode one command frame
    pub fn encode(&self, command: Command, payload: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(self.header_len() + payload.len());
        frame.extend_from_slice(self.magic());
        frame.push(command as u8);
        frame.push(self.key);
        match self.transport {
            Transport::Net => {
                frame.extend_from_slice(&[0x00, 0x00]);
                let size = u16::try_from(payload.len()).unwrap_or(u16::MAX);
                frame.extend_from_slice(&size.to_be_bytes());
            }
            Transport::Ble => {
                frame.extend_from_slice(&[0x01, 0x00]);
                frame.push((payload.len() & 0xFF) as u8);
            }
        }
        frame.extend_from_slice(payload);
        trace!(frame = ?frame, "Encoded frame");
        frame
    }

    /// Validate a response header, returning the command byte and payload size
    pub fn decode_header(&self, header: &[u8]) -> Result<(u8, usize)> {
        let magic = self.magic();
        if header.len() < self.header_len() || !header.starts_with(magic) {
            return Err(Error::Protocol(format!("invalid response header {header:02x?}")));
        }
        let fields = &header[magic.len()..];
        if fields[1] != 0 {
            return Err(Error::Protocol("encoded responses are not supported".into()));
        }
        let size = match self.transport {
            Transport::Net => usize::from(u16::from_be_bytes([fields[4], fields[5]])),
            Transport::Ble => usize::from(fields[4]),
        };
        Ok((fields[0], size))
    }

    /// Validate a complete BLE notification and return its status payload
    pub fn decode_notification<'a>(&self, packet: &'a [u8]) -> Result<&'a [u8]> {
        let (command, size) = self.decode_header(packet)?;
        if command != Command::StatusQuery as u8 {
            return Err(Error::Protocol(format!("unexpected notification {command:#04x}")));
        }
        let expected = self.header_len() + size;
        if packet.len() != expected {
            return Err(Error::Protocol(format!(
                "notification size mismatch: {} vs {expected}",
                packet.len()
            )));
        }
        Ok(&packet[self.header_len()..])
    }

    pub fn status_query(&self) -> Vec<u8> {
        match self.transport {
            Transport::Net => self.encode(Command::StatusQuery, &[]),
            Transport::Ble => self.encode(Command::StatusQuery, &[0x01]),
        }
    }

    pub fn power(&self, on: bool) -> Vec<u8> {
        self.encode(Command::Power, &[u8::from(on)])
    }

    pub fn brightness(&self, level: Level, value: u8) -> Vec<u8> {
        let which = match level {
            Level::Color => 0x00,
            Level::White => 0x01,
        };
        self.encode(Command::Brightness, &[which, value])
    }

    pub fn static_color(&self, rgb: [u8; 3], level: u8) -> Vec<u8> {
        self.encode(Command::StaticColor, &[rgb[0], rgb[1], rgb[2], level])
    }

    pub fn effect_color(&self, rgb: [u8; 3]) -> Vec<u8> {
        self.encode(Command::EffectColor, &rgb)
    }

    pub fn static_cct(&self, cold: u8, warm: u8) -> Vec<u8> {
        self.encode(Command::StaticCct, &[cold, warm])
    }

    pub fn effect_cct(&self, cold: u8, warm: u8) -> Vec<u8> {
        self.encode(Command::EffectCct, &[cold, warm])
    }

    pub fn light_mode(&self, mode: EffectMode, effect: u8) -> Vec<u8> {
        self.encode(Command::LightMode, &[mode.code(), effect])
    }

    pub fn effect_speed(&self, speed: u8) -> Result<Vec<u8>> {
        check_range(speed.into(), 1, MAX_EFFECT_SPEED.into())?;
        Ok(self.encode(Command::EffectSpeed, &[speed]))
    }

    pub fn effect_length(&self, length: u8) -> Result<Vec<u8>> {
        check_range(length.into(), 1, MAX_EFFECT_LENGTH.into())?;
        Ok(self.encode(Command::EffectLength, &[length]))
    }

    pub fn effect_direction(&self, forward: bool) -> Vec<u8> {
        self.encode(Command::EffectDirection, &[u8::from(forward)])
    }

    pub fn effect_loop(&self, enabled: bool) -> Vec<u8> {
        self.encode(Command::EffectLoop, &[u8::from(enabled)])
    }

    pub fn effect_play(&self, playing: bool) -> Vec<u8> {
        self.encode(Command::EffectPlay, &[u8::from(playing)])
    }

    pub fn audio_input(&self, input: AudioInput) -> Vec<u8> {
        self.encode(Command::AudioInput, &[input.code()])
    }

    pub fn sensitivity(&self, gain: u8) -> Result<Vec<u8>> {
        check_range(gain.into(), 1, MAX_SENSITIVITY.into())?;
        Ok(self.encode(Command::AudioGain, &[gain]))
    }

    pub fn coexistence(&self, enabled: bool) -> Vec<u8> {
        self.encode(Command::Coexistence, &[u8::from(enabled)])
    }

    pub fn on_power(&self, state: OnPower) -> Vec<u8> {
        self.encode(Command::OnPower, &[state.code()])
    }

    pub fn onoff_options(&self, effect: OnOffEffect, speed: OnOffSpeed, pixels: u16) -> Result<Vec<u8>> {
        check_range(pixels.into(), 1, MAX_ONOFF_PIXELS.into())?;
        let [hi, lo] = pixels.to_be_bytes();
        Ok(self.encode(
            Command::OnOffOptions,
            &[0x01, effect.code(), speed.code(), hi, lo],
        ))
    }

    pub fn light_type(&self, light_type: u8) -> Vec<u8> {
        self.encode(Command::LightType, &[0x01, light_type & 0x7F])
    }

    pub fn chip_order(&self, index: u8) -> Vec<u8> {
        self.encode(Command::ChipOrder, &[index])
    }
}

/// Device configuration reported in status chunk 1
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSettings {
    pub firmware: String,
    pub light_type: u8,
    pub onoff_effect: u8,
    pub onoff_speed: u8,
    pub onoff_pixels: u16,
    pub coexistence: bool,
    pub on_power: u8,
}

/// Live output state reported in status chunk 2 (and 3)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveStatus {
    pub power: bool,
    pub effect_loop: bool,
    pub chip_order: u8,
    pub mode: u8,
    pub effect: u8,
    pub play: bool,
    pub level_color: u8,
    pub level_white: u8,
    pub static_color: [u8; 3],
    pub static_white: [u8; 2],
    pub speed: u8,
    pub length: u8,
    pub direction: bool,
    pub gain: u8,
    pub audio_input: u8,
    pub effect_color: [u8; 3],
    pub effect_white: [u8; 2],
}

/// Decoded status response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    pub settings: Option<DeviceSettings>,
    pub live: Option<LiveStatus>,
    /// Light type carried by the extended status chunk
    pub light_type: Option<u8>,
}

const SETTINGS_CHUNK_LEN: usize = 17;
const LIVE_CHUNK_LEN: usize = 24;

fn decode_settings(data: &[u8]) -> Option<DeviceSettings> {
    if data.len() < SETTINGS_CHUNK_LEN {
        return None;
    }
    Some(DeviceSettings {
        firmware: String::from_utf8_lossy(&data[2..10])
            .trim_end_matches('\0')
            .trim()
            .to_string(),
        light_type: data[10],
        onoff_effect: data[11],
        onoff_speed: data[12],
        onoff_pixels: u16::from_be_bytes([data[13], data[14]]),
        coexistence: data[15] != 0,
        on_power: data[16],
    })
}

fn decode_live(data: &[u8]) -> Option<LiveStatus> {
    if data.len() < LIVE_CHUNK_LEN {
        return None;
    }
    Some(LiveStatus {
        power: data[1] != 0,
        effect_loop: data[2] != 0,
        chip_order: data[3],
        mode: data[4],
        effect: data[5],
        play: data[6] != 0,
        level_color: data[7],
        level_white: data[8],
        static_color: [data[9], data[10], data[11]],
        static_white: [data[12], data[13]],
        speed: data[14],
        length: data[15],
        direction: data[16] != 0,
        gain: data[17],
        audio_input: data[18],
        effect_color: [data[19], data[20], data[21]],
        effect_white: [data[22], data[23]],
    })
}

/// Decode a chunked status payload
///
/// Unknown or undersized chunks are skipped, a chunk running past the end
/// of the payload is an error.
pub fn decode_status(payload: &[u8]) -> Result<StatusReport> {
    let Some((&width, mut rest)) = payload.split_first() else {
        return Err(Error::Protocol("empty status payload".into()));
    };
    let width = usize::from(width) + 1;
    if width > 2 {
        return Err(Error::Protocol(format!("unsupported size field width {width}")));
    }

    let mut report = StatusReport::default();
    while let Some((&chunk, tail)) = rest.split_first() {
        if tail.len() < width {
            return Err(Error::Protocol(format!("chunk #{chunk} header truncated")));
        }
        let size = tail[..width]
            .iter()
            .fold(0usize, |acc, byte| (acc << 8) | usize::from(*byte));
        let body = &tail[width..];
        if body.len() < size {
            return Err(Error::Protocol(format!(
                "chunk #{chunk} underrun, expected {size}, have {}",
                body.len()
            )));
        }
        let (data, next) = body.split_at(size);
        match chunk {
            1 => match decode_settings(data) {
                Some(settings) => report.settings = Some(settings),
                None => warn!(chunk, size, "Settings chunk too short"),
            },
            2 => match decode_live(data) {
                Some(live) => report.live = Some(live),
                None => warn!(chunk, size, "Status chunk too short"),
            },
            3 if data.len() >= 2 => match decode_live(&data[2..]) {
                Some(live) => {
                    report.light_type = Some(data[1]);
                    report.live = Some(live);
                }
                None => warn!(chunk, size, "Extended status chunk too short"),
            },
            _ => debug!(chunk, size, "Skipping chunk"),
        }
        rest = next;
    }
    Ok(report)
}
