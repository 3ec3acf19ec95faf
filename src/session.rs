//! Device session contract and the decoded device state.
//!
//! [`DeviceSession`] is the seam the update coordinator drives. Sessions
//! that can also issue commands implement [`LightControl`], which builds
//! every command from the resolved [`ProtocolModel`] and the last reported
//! state.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use tracing::{debug, info, instrument, warn};

use crate::effects::{EffectKind, EffectMode};
use crate::light_type::LightConfig;
use crate::model::ProtocolModel;
use crate::protocol::{
    AudioInput, Codec, Level, OnOffEffect, OnOffSpeed, OnPower, StatusReport,
};
use crate::{Error, Result};

/// A live, transport bound device
#[async_trait]
pub trait DeviceSession: Send + Sync {
    /// Display name of the device
    fn name(&self) -> &str;

    /// Current connectivity
    fn available(&self) -> bool;

    /// Query the device and refresh the cached state
    ///
    /// `retry` is the number of additional attempts after the first one,
    /// `None` uses the session default. A forced update does not reuse the
    /// current link; the session reconnects first. Returns `Ok(false)` when
    /// the device answered but the state could not be verified, and `Err` on
    /// transport failures.
    async fn update(&self, retry: Option<u8>, force: bool) -> Result<bool>;

    /// Disconnect; calling it on a stopped session does nothing
    async fn stop(&self);

    /// Snapshot of the last decoded state
    fn state(&self) -> DeviceState {
        DeviceState::default()
    }
}

/// Decoded device state
#[derive(Debug, Clone, Default)]
pub struct DeviceState {
    /// Active light type configuration
    pub config: Option<&'static LightConfig>,
    pub light_type: Option<u8>,
    pub firmware: Option<String>,
    pub power: Option<bool>,
    pub mode: Option<EffectMode>,
    pub effect: Option<u8>,
    pub effect_name: Option<&'static str>,
    pub effect_kind: Option<EffectKind>,
    pub brightness: Option<u8>,
    pub rgb: Option<[u8; 3]>,
    pub cct: Option<[u8; 2]>,
    pub white: Option<u8>,
    pub speed: Option<u8>,
    pub length: Option<u8>,
    pub direction: Option<bool>,
    pub effect_loop: Option<bool>,
    pub play: Option<bool>,
    pub audio_input: Option<AudioInput>,
    pub sensitivity: Option<u8>,
    pub chip_order: Option<String>,
    pub coexistence: Option<bool>,
    pub onoff_effect: Option<OnOffEffect>,
    pub onoff_speed: Option<OnOffSpeed>,
    pub onoff_pixels: Option<u16>,
    pub on_power: Option<OnPower>,
    /// Time of the last applied status report
    pub updated: Option<DateTime<Local>>,
}

impl DeviceState {
    /// Whether a live status has been applied
    pub fn is_valid(&self) -> bool {
        self.power.is_some()
    }

    /// Fold a status report into the state
    pub fn apply(&mut self, model: &ProtocolModel, report: &StatusReport) -> Result<()> {
        if let Some(settings) = &report.settings {
            let config = model.light_type(settings.light_type).ok_or_else(|| {
                Error::Unsupported(format!(
                    "{} does not support light type {:#04x}",
                    model.name, settings.light_type
                ))
            })?;
            self.config = Some(config);
            self.light_type = Some(settings.light_type);
            self.firmware = Some(settings.firmware.clone());
            self.onoff_effect = OnOffEffect::from_code(settings.onoff_effect);
            self.onoff_speed = OnOffSpeed::from_code(settings.onoff_speed);
            self.onoff_pixels = Some(settings.onoff_pixels);
            self.on_power = OnPower::from_code(settings.on_power);
            self.coexistence = config.coexistence.then_some(settings.coexistence);
        } else if let Some(light_type) = report.light_type {
            self.config = model.light_type(light_type).or(self.config);
            self.light_type = Some(light_type);
        }

        let Some(live) = &report.live else {
            return Ok(());
        };
        self.power = Some(live.power);
        self.updated = Some(Local::now());

        let Some(config) = self.config else {
            debug!("No light type known yet, skipping live state");
            return Ok(());
        };

        self.chip_order = config
            .order
            .filter(|order| order.channels() > 1)
            .and_then(|order| order.name(live.chip_order));

        let mode = EffectMode::from_code(live.mode);
        self.mode = mode;
        self.effect = Some(live.effect);
        self.effect_name = None;
        self.effect_kind = None;

        let Some(mode) = mode else {
            debug!(mode = live.mode, "Unknown light mode");
            return Ok(());
        };
        let Some(effect) = config.effects(mode).and_then(|table| table.get(live.effect)) else {
            debug!(effect = live.effect, "Unknown effect");
            return Ok(());
        };

        self.effect_name = Some(effect.name);
        self.effect_kind = Some(config.effect_kind(mode, live.effect));
        self.effect_loop = mode.is_loopable().then_some(live.effect_loop);
        self.play = effect.pausable.then_some(live.play);
        self.speed = effect.speedable.then_some(live.speed);
        self.length = effect.sizeable.then_some(live.length);
        self.direction = effect.directional.then_some(live.direction);
        self.audio_input = if live.power && mode.is_sound() {
            AudioInput::from_code(live.audio_input)
        } else {
            None
        };
        self.sensitivity = self.audio_input.map(|_| live.gain);

        self.rgb = None;
        self.cct = None;
        self.white = None;
        if mode.is_sound() || mode.is_dynamic() {
            if mode.is_white() && effect.colorable && config.cct {
                self.cct = Some(live.effect_white);
            } else if mode.is_color() && effect.colorable && config.hue {
                self.rgb = Some(live.effect_color);
            }
            self.brightness = Some(if mode.is_sound() {
                u8::MAX
            } else if mode.is_white() {
                live.level_white
            } else {
                live.level_color
            });
        } else if mode.is_static() {
            if config.hue {
                self.rgb = Some(live.static_color);
            }
            if config.cct {
                self.cct = Some(live.static_white);
            } else if config.white && config.hue {
                self.white = Some(live.level_white);
            }
            self.brightness = Some(if mode.is_white() {
                live.level_white
            } else {
                live.level_color
            });
        } else {
            self.brightness = Some(live.level_color);
        }
        Ok(())
    }

    fn require_config(&self) -> Result<&'static LightConfig> {
        self.config.ok_or(Error::StateUnknown)
    }
}

/// Commands shared by every session kind
///
/// Implementors provide the resolved model and a way to send frames as
/// one transaction. Frames requesting a status report are answered and
/// applied to the state by the implementor.
#[async_trait]
pub trait LightControl: DeviceSession {
    fn model(&self) -> &ProtocolModel;

    fn codec(&self) -> Codec {
        Codec::new(self.model().transport())
    }

    /// Send frames in order as one transaction
    async fn send(&self, frames: Vec<Vec<u8>>) -> Result<()>;

    #[instrument(skip(self))]
    async fn set_power(&self, on: bool) -> Result<()> {
        self.send(vec![self.codec().power(on)]).await?;
        info!("Power {}", if on { "on" } else { "off" });
        Ok(())
    }

    /// Brightness of the channel driven by the current mode
    #[instrument(skip(self))]
    async fn set_brightness(&self, level: u8) -> Result<()> {
        let mode = self.state().mode.unwrap_or(EffectMode::StaticColor);
        if mode.is_sound() {
            warn!("Brightness cannot be changed in sound modes");
            return Err(Error::Unsupported("brightness in sound modes".into()));
        }
        self.send(vec![self.codec().brightness(Level::for_mode(mode), level)])
            .await
    }

    /// Static color in static modes, effect color otherwise
    #[instrument(skip(self))]
    async fn set_color(&self, rgb: [u8; 3]) -> Result<()> {
        let state = self.state();
        let frame = match state.mode {
            Some(mode) if !mode.is_static() => self.codec().effect_color(rgb),
            _ => self.codec().static_color(rgb, state.brightness.unwrap_or(u8::MAX)),
        };
        self.send(vec![frame]).await
    }

    /// Cold/warm white levels, static or effect depending on the mode
    #[instrument(skip(self))]
    async fn set_cct(&self, cold: u8, warm: u8) -> Result<()> {
        let frame = match self.state().mode {
            Some(mode) if !mode.is_static() => self.codec().effect_cct(cold, warm),
            _ => self.codec().static_cct(cold, warm),
        };
        self.send(vec![frame]).await
    }

    /// Switch mode and effect
    ///
    /// Without an explicit effect the current effect code is kept when the
    /// mode's table has it, otherwise the mode's first effect is selected.
    #[instrument(skip(self))]
    async fn set_light_mode(&self, mode: EffectMode, effect: Option<u8>) -> Result<()> {
        let state = self.state();
        let config = state.require_config()?;
        let table = config.effects(mode).ok_or_else(|| {
            Error::Unsupported(format!("mode {mode} on light type {}", config.name))
        })?;
        let effect = match effect {
            Some(code) if table.contains(code) => code,
            Some(code) => {
                return Err(Error::Unsupported(format!("effect {code:#04x} in mode {mode}")))
            }
            None => state
                .effect
                .filter(|code| table.contains(*code))
                .unwrap_or(table.first().code),
        };
        let codec = self.codec();
        self.send(vec![codec.light_mode(mode, effect), codec.status_query()])
            .await?;
        info!(%mode, effect, "Light mode changed");
        Ok(())
    }

    /// Select an effect of the current mode by name
    #[instrument(skip(self))]
    async fn set_effect(&self, name: &str) -> Result<()> {
        let state = self.state();
        let config = state.require_config()?;
        let mode = state.mode.unwrap_or_else(|| config.default_mode());
        let effect = config
            .effects(mode)
            .and_then(|table| table.find(name))
            .ok_or_else(|| Error::Unsupported(format!("effect '{name}' in mode {mode}")))?;
        self.set_light_mode(mode, Some(effect.code)).await
    }

    async fn set_effect_speed(&self, speed: u8) -> Result<()> {
        let frame = self.codec().effect_speed(speed)?;
        self.send(vec![frame]).await
    }

    async fn set_effect_length(&self, length: u8) -> Result<()> {
        let frame = self.codec().effect_length(length)?;
        self.send(vec![frame]).await
    }

    async fn set_effect_direction(&self, forward: bool) -> Result<()> {
        self.send(vec![self.codec().effect_direction(forward)]).await
    }

    async fn set_effect_loop(&self, enabled: bool) -> Result<()> {
        self.send(vec![self.codec().effect_loop(enabled)]).await
    }

    async fn set_effect_play(&self, playing: bool) -> Result<()> {
        self.send(vec![self.codec().effect_play(playing)]).await
    }

    async fn set_audio_input(&self, input: AudioInput) -> Result<()> {
        self.send(vec![self.codec().audio_input(input)]).await
    }

    async fn set_sensitivity(&self, gain: u8) -> Result<()> {
        let frame = self.codec().sensitivity(gain)?;
        self.send(vec![frame]).await
    }

    async fn set_coexistence(&self, enabled: bool) -> Result<()> {
        self.send(vec![self.codec().coexistence(enabled)]).await
    }

    async fn set_on_power(&self, state: OnPower) -> Result<()> {
        self.send(vec![self.codec().on_power(state)]).await
    }

    async fn set_onoff_options(
        &self,
        effect: OnOffEffect,
        speed: OnOffSpeed,
        pixels: u16,
    ) -> Result<()> {
        let frame = self.codec().onoff_options(effect, speed, pixels)?;
        self.send(vec![frame]).await
    }

    /// Rewire the output to another light type
    ///
    /// The light is switched off first when on, the chip order is carried
    /// over by name when the new type knows it, and the current mode is kept
    /// when the new type supports it.
    #[instrument(skip(self))]
    async fn set_light_type(&self, light_type: u8) -> Result<()> {
        let model = self.model();
        let config = model
            .configs
            .iter()
            .find(|(code, _)| *code == light_type)
            .map(|(_, config)| config)
            .ok_or_else(|| {
                Error::Unsupported(format!("light type {light_type:#04x} on {}", model.name))
            })?;
        let state = self.state();
        let order = config
            .order
            .zip(state.chip_order.as_deref())
            .and_then(|(order, name)| order.index(name))
            .unwrap_or(0);
        let mode = state
            .mode
            .filter(|mode| config.supports(*mode))
            .unwrap_or_else(|| config.default_mode());
        let effect = config
            .effects(mode)
            .map(|table| table.first().code)
            .unwrap_or_default();

        let codec = self.codec();
        let mut frames = Vec::with_capacity(5);
        if state.power == Some(true) {
            frames.push(codec.power(false));
        }
        frames.push(codec.light_type(light_type));
        frames.push(codec.chip_order(order));
        frames.push(codec.light_mode(mode, effect));
        frames.push(codec.status_query());
        self.send(frames).await?;
        info!(light_type = config.name, "Light type changed");
        Ok(())
    }

    /// Select a chip order of the current light type by name
    async fn set_chip_order(&self, name: &str) -> Result<()> {
        let config = self.state().require_config()?;
        let index = config
            .order
            .and_then(|order| order.index(name))
            .ok_or_else(|| Error::Unsupported(format!("chip order '{name}'")))?;
        self.send(vec![self.codec().chip_order(index)]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::net::SP5XXE;
    use crate::protocol::{DeviceSettings, LiveStatus};

    fn report(light_type: u8, mode: u8, effect: u8) -> StatusReport {
        StatusReport {
            settings: Some(DeviceSettings {
                firmware: "V1.0.00".into(),
                light_type,
                onoff_effect: 0x02,
                onoff_speed: 0x03,
                onoff_pixels: 120,
                coexistence: true,
                on_power: 0x02,
            }),
            live: Some(LiveStatus {
                power: true,
                mode,
                effect,
                chip_order: 2,
                level_color: 0x80,
                level_white: 0x40,
                static_color: [1, 2, 3],
                effect_color: [4, 5, 6],
                speed: 7,
                length: 30,
                gain: 9,
                audio_input: 0x02,
                ..LiveStatus::default()
            }),
            light_type: None,
        }
    }

    #[test]
    fn static_rgb_state() {
        let model = SP5XXE.match_model_code(0x4E).expect("SP530E");
        let mut state = DeviceState::default();
        state.apply(&model, &report(0x86, 0x01, 0x01)).expect("apply");
        assert!(state.is_valid());
        assert_eq!(state.config.map(|c| c.name), Some("SPI - RGB"));
        assert_eq!(state.mode, Some(EffectMode::StaticColor));
        assert_eq!(state.rgb, Some([1, 2, 3]));
        assert_eq!(state.brightness, Some(0x80));
        assert_eq!(state.chip_order.as_deref(), Some("GRB"));
        assert_eq!(state.coexistence, None);
        assert_eq!(state.on_power, Some(OnPower::LastState));
        assert_eq!(state.onoff_effect, Some(OnOffEffect::FlowBackward));
        assert!(state.updated.is_some());
    }

    #[test]
    fn sound_mode_state() {
        let model = SP5XXE.match_model_code(0x4E).expect("SP530E");
        let mut state = DeviceState::default();
        state.apply(&model, &report(0x88, 0x05, 0x02)).expect("apply");
        assert_eq!(state.effect_name, Some("Sound - Music Mode 2"));
        assert_eq!(state.effect_kind, Some(EffectKind::Sound));
        assert_eq!(state.rgb, Some([4, 5, 6]));
        assert_eq!(state.brightness, Some(u8::MAX));
        assert_eq!(state.audio_input, Some(AudioInput::ExtMic));
        assert_eq!(state.sensitivity, Some(9));
        assert_eq!(state.effect_loop, Some(false));
        assert_eq!(state.speed, None);
        assert_eq!(state.coexistence, Some(true));
    }

    #[test]
    fn unknown_light_type_on_single_config_model() {
        let model = SP5XXE.match_model_code(0x56).expect("SP538E");
        let mut state = DeviceState::default();
        let err = state.apply(&model, &report(0x86, 0x01, 0x01));
        assert!(matches!(err, Err(Error::Unsupported(_))));
        assert!(!state.is_valid());
    }
}
