/*!
 # Light type configurations

 A light type describes one physical wiring of a controller: which output
 stages exist (PWM, SPI), which channels are present (color, white, CCT),
 the chip ordering family and the effect table for every supported mode.

 Configurations are built with [`LightConfigBuilder`] in `const` context.
 Declaring a mode the channel flags cannot drive (e.g. a white mode on an
 RGB-only output) is a bug in the product tables and panics in `build`.
*/

use crate::chips::ChipOrder;
use crate::effects::{self, EffectKind, EffectMode, EffectTable};

const MODE_COUNT: usize = EffectMode::ALL.len();

/// One wiring configuration of a controller
#[derive(Debug, Clone, Copy)]
pub struct LightConfig {
    /// Display name
    pub name: &'static str,
    /// Has PWM outputs
    pub pwm: bool,
    /// Has an SPI (pixel) output
    pub spi: bool,
    /// Has color channels
    pub hue: bool,
    /// Has a white channel
    pub white: bool,
    /// Has cold/warm white channels
    pub cct: bool,
    /// Color and white can be lit at the same time
    pub coexistence: bool,
    /// Chip ordering family
    pub order: Option<ChipOrder>,
    effects: [Option<EffectTable>; MODE_COUNT],
}

impl LightConfig {
    /// Effect table of a mode, if the mode is supported
    pub fn effects(&self, mode: EffectMode) -> Option<EffectTable> {
        self.effects[mode.index()]
    }

    /// Supported modes in wire order
    pub fn modes(&self) -> impl Iterator<Item = EffectMode> + '_ {
        EffectMode::ALL
            .into_iter()
            .filter(|mode| self.effects[mode.index()].is_some())
    }

    pub fn supports(&self, mode: EffectMode) -> bool {
        self.effects(mode).is_some()
    }

    /// First supported mode, used as a fallback when the current mode
    /// does not exist in a newly selected light type
    pub fn default_mode(&self) -> EffectMode {
        // build() rejects configurations without modes
        self.modes().next().unwrap_or(EffectMode::StaticColor)
    }

    /// Category of an effect as presented to the user
    pub fn effect_kind(&self, mode: EffectMode, code: u8) -> EffectKind {
        if mode.is_custom() && self.spi && code == 0x01 {
            return EffectKind::Static;
        }
        if mode.is_static() {
            EffectKind::Static
        } else if mode.is_sound() {
            EffectKind::Sound
        } else {
            EffectKind::Dynamic
        }
    }
}

/// Whether a configuration with the given flags can drive `mode`
const fn mode_allowed(mode: EffectMode, hue: bool, white: bool, cct: bool) -> bool {
    if mode.is_white() {
        white || cct
    } else {
        hue
    }
}

/// `const` builder for [`LightConfig`]
#[derive(Debug, Clone, Copy)]
pub struct LightConfigBuilder {
    config: LightConfig,
}

impl LightConfigBuilder {
    pub const fn new(name: &'static str) -> Self {
        Self {
            config: LightConfig {
                name,
                pwm: false,
                spi: false,
                hue: false,
                white: false,
                cct: false,
                coexistence: false,
                order: None,
                effects: [None; MODE_COUNT],
            },
        }
    }

    /// Start from an existing configuration (flags and tables copied)
    pub const fn extend(base: LightConfig, name: &'static str) -> Self {
        let mut config = base;
        config.name = name;
        Self { config }
    }

    pub const fn pwm(mut self) -> Self {
        self.config.pwm = true;
        self
    }

    pub const fn spi(mut self) -> Self {
        self.config.spi = true;
        self
    }

    pub const fn hue(mut self) -> Self {
        self.config.hue = true;
        self
    }

    pub const fn white(mut self) -> Self {
        self.config.white = true;
        self
    }

    pub const fn cct(mut self) -> Self {
        self.config.cct = true;
        self
    }

    pub const fn coexistence(mut self) -> Self {
        self.config.coexistence = true;
        self
    }

    pub const fn order(mut self, order: ChipOrder) -> Self {
        self.config.order = Some(order);
        self
    }

    /// Attach (or replace) the effect table of a mode
    pub const fn effects(mut self, mode: EffectMode, table: EffectTable) -> Self {
        self.config.effects[mode.index()] = Some(table);
        self
    }

    /// Validate and finish the configuration
    ///
    /// # Panics
    ///
    /// If no mode is declared, or a declared mode is not drivable by the
    /// configured channels.
    pub const fn build(self) -> LightConfig {
        let config = self.config;
        let mut declared = false;
        let mut i = 0;
        while i < MODE_COUNT {
            if config.effects[i].is_some() {
                declared = true;
                if !mode_allowed(EffectMode::ALL[i], config.hue, config.white, config.cct) {
                    panic!("light type declares a mode its channels cannot drive");
                }
            }
            i += 1;
        }
        assert!(declared, "light type declares no modes");
        config
    }
}

/// 1 CH PWM - Single Color
pub const CFG_81: LightConfig = LightConfigBuilder::new("1 CH PWM - Single Color")
    .pwm()
    .white()
    .effects(EffectMode::StaticWhite, effects::STATIC_WHITE)
    .effects(EffectMode::DynamicWhite, effects::PWM_DYNAMIC_WHITE)
    .effects(EffectMode::SoundWhite, effects::PWM_SOUND_WHITE)
    .build();

/// 2 CH PWM - CCT
pub const CFG_83: LightConfig = LightConfigBuilder::extend(CFG_81, "2 CH PWM - CCT")
    .cct()
    .order(ChipOrder::Cw)
    .build();

/// 3 CH PWM - RGB
pub const CFG_85: LightConfig = LightConfigBuilder::new("3 CH PWM - RGB")
    .pwm()
    .hue()
    .order(ChipOrder::Rgb)
    .effects(EffectMode::StaticColor, effects::STATIC_COLOR)
    .effects(EffectMode::DynamicColor, effects::PWM_DYNAMIC_COLOR)
    .effects(EffectMode::SoundColor, effects::PWM_SOUND_COLOR)
    .effects(EffectMode::CustomSolid, effects::PWM_CUSTOM_COLOR)
    .build();

/// 4 CH PWM - RGBW
pub const CFG_87: LightConfig = LightConfigBuilder::new("4 CH PWM - RGBW")
    .pwm()
    .hue()
    .white()
    .coexistence()
    .order(ChipOrder::Rgbw)
    .effects(EffectMode::StaticColor, effects::STATIC_COLOR)
    .effects(EffectMode::StaticWhite, effects::STATIC_WHITE)
    .effects(EffectMode::DynamicColor, effects::PWM_DYNAMIC_COLOR)
    .effects(EffectMode::DynamicWhite, effects::PWM_DYNAMIC_WHITE)
    .effects(EffectMode::SoundColor, effects::PWM_SOUND_COLOR)
    .effects(EffectMode::SoundWhite, effects::PWM_SOUND_WHITE)
    .effects(EffectMode::CustomSolid, effects::PWM_CUSTOM_COLOR)
    .build();

/// 5 CH PWM - RGBCCT
pub const CFG_8A: LightConfig = LightConfigBuilder::extend(CFG_87, "5 CH PWM - RGBCCT")
    .cct()
    .order(ChipOrder::Rgbcw)
    .build();

/// SPI - Single Color
pub const CFG_82: LightConfig = LightConfigBuilder::new("SPI - Single Color")
    .spi()
    .white()
    .order(ChipOrder::OneTwoThree)
    .effects(EffectMode::StaticWhite, effects::STATIC_WHITE)
    .effects(EffectMode::DynamicWhite, effects::SPI_DYNAMIC_WHITE)
    .effects(EffectMode::SoundWhite, effects::SPI_SOUND_WHITE)
    .build();

/// SPI - CCT1
pub const CFG_84: LightConfig = LightConfigBuilder::extend(CFG_82, "SPI - CCT1")
    .cct()
    .order(ChipOrder::Cwx)
    .build();

/// SPI - CCT2
pub const CFG_8D: LightConfig = LightConfigBuilder::extend(CFG_84, "SPI - CCT2").build();

/// SPI - RGB
pub const CFG_86: LightConfig = LightConfigBuilder::new("SPI - RGB")
    .spi()
    .hue()
    .order(ChipOrder::Rgb)
    .effects(EffectMode::StaticColor, effects::STATIC_COLOR)
    .effects(EffectMode::DynamicColor, effects::SPI_DYNAMIC_COLOR)
    .effects(EffectMode::SoundColor, effects::SPI_SOUND_COLOR)
    .effects(EffectMode::CustomSolid, effects::SPI_CUSTOM_SOLID)
    .build();

/// SPI - RGBW
pub const CFG_88: LightConfig = LightConfigBuilder::new("SPI - RGBW")
    .spi()
    .hue()
    .white()
    .coexistence()
    .order(ChipOrder::Rgbw)
    .effects(EffectMode::StaticColor, effects::STATIC_COLOR)
    .effects(EffectMode::StaticWhite, effects::STATIC_WHITE)
    .effects(EffectMode::DynamicColor, effects::SPI_DYNAMIC_COLOR)
    .effects(EffectMode::DynamicWhite, effects::SPI_DYNAMIC_WHITE)
    .effects(EffectMode::SoundColor, effects::SPI_SOUND_COLOR)
    .effects(EffectMode::SoundWhite, effects::SPI_SOUND_WHITE)
    .effects(EffectMode::CustomSolid, effects::SPI_CUSTOM_SOLID)
    .build();

/// SPI - RGBCCT (1)
pub const CFG_8B: LightConfig = LightConfigBuilder::extend(CFG_88, "SPI - RGBCCT (1)")
    .cct()
    .order(ChipOrder::Rgbcw)
    .build();

/// SPI - RGBCCT (2)
pub const CFG_8E: LightConfig = LightConfigBuilder::extend(CFG_8B, "SPI - RGBCCT (2)").build();

/// SPI - RGB + 1 CH PWM
pub const CFG_89: LightConfig = LightConfigBuilder::new("SPI - RGB + 1 CH PWM")
    .pwm()
    .spi()
    .hue()
    .white()
    .coexistence()
    .order(ChipOrder::Rgb)
    .effects(EffectMode::StaticColor, effects::STATIC_COLOR)
    .effects(EffectMode::StaticWhite, effects::STATIC_WHITE)
    .effects(EffectMode::DynamicColor, effects::SPI_DYNAMIC_COLOR)
    .effects(EffectMode::DynamicWhite, effects::PWM_DYNAMIC_WHITE)
    .effects(EffectMode::SoundColor, effects::SPI_SOUND_COLOR)
    .effects(EffectMode::SoundWhite, effects::PWM_SOUND_WHITE)
    .effects(EffectMode::CustomSolid, effects::SPI_CUSTOM_SOLID)
    .build();

/// SPI - RGB + 2 CH PWM
pub const CFG_8C: LightConfig = LightConfigBuilder::extend(CFG_89, "SPI - RGB + 2 CH PWM")
    .cct()
    .order(ChipOrder::Rgbcw)
    .build();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_configs_inherit_tables() {
        assert!(CFG_83.cct && CFG_83.white && CFG_83.pwm);
        assert_eq!(CFG_83.order, Some(ChipOrder::Cw));
        assert!(CFG_83.supports(EffectMode::DynamicWhite));
        assert!(!CFG_83.supports(EffectMode::StaticColor));
        assert_eq!(CFG_8E.name, "SPI - RGBCCT (2)");
        assert_eq!(CFG_8E.order, Some(ChipOrder::Rgbcw));
    }

    #[test]
    fn modes_listed_in_wire_order() {
        let modes: Vec<_> = CFG_85.modes().collect();
        assert_eq!(
            modes,
            vec![
                EffectMode::StaticColor,
                EffectMode::DynamicColor,
                EffectMode::SoundColor,
                EffectMode::CustomSolid
            ]
        );
        assert_eq!(CFG_81.default_mode(), EffectMode::StaticWhite);
    }

    #[test]
    fn effect_kind_of_custom_static_on_spi() {
        assert_eq!(CFG_86.effect_kind(EffectMode::CustomSolid, 0x01), EffectKind::Static);
        assert_eq!(CFG_85.effect_kind(EffectMode::CustomSolid, 0x01), EffectKind::Dynamic);
        assert_eq!(CFG_86.effect_kind(EffectMode::SoundColor, 0x03), EffectKind::Sound);
        assert_eq!(CFG_86.effect_kind(EffectMode::StaticColor, 0x01), EffectKind::Static);
    }

    #[test]
    #[should_panic(expected = "cannot drive")]
    fn white_mode_on_color_only_output_panics() {
        let _ = LightConfigBuilder::new("broken")
            .spi()
            .hue()
            .effects(EffectMode::StaticWhite, effects::STATIC_WHITE)
            .build();
    }

    #[test]
    #[should_panic(expected = "no modes")]
    fn config_without_modes_panics() {
        let _ = LightConfigBuilder::new("empty").pwm().white().build();
    }
}
