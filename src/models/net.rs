//! SP5xxE network controllers (SP530E, SP538E/SP548E, SP539E/SP549E).

use crate::effects::{self, extend_effects, Effect, EffectMode, EffectTable};
use crate::light_type::{self as cfg, LightConfig, LightConfigBuilder};
use crate::model::{ModelFamily, Signature, TransportParams};

/// TCP port the controllers listen on
pub const PORT: u16 = 8587;

const SOUND_COLOR_FX: &[Effect] = &[
    Effect::sound(0x01, "Sound - Music Mode 1"),
    Effect::sound(0x02, "Sound - Music Mode 2").colorable(),
    Effect::sound(0x03, "Sound - Music Mode 3"),
    Effect::sound(0x04, "Sound - Music Mode 4").colorable(),
    Effect::sound(0x05, "Sound - Music Mode 5").sizeable(),
];

const CUSTOM_SOLID_FX: &[Effect] = &extend_effects::<19>(
    effects::SPI_CUSTOM_SOLID.effects(),
    Effect::dynamic(0x13, "Firework"),
);

/// Sound reactive color effects of the network firmware
pub const SOUND_COLOR: EffectTable = EffectTable::new(SOUND_COLOR_FX);
/// Custom solid effects of the network firmware
pub const CUSTOM_SOLID: EffectTable = EffectTable::new(CUSTOM_SOLID_FX);

/// SPI - RGB with the network sound and custom catalogs
pub const CFG_86: LightConfig = LightConfigBuilder::extend(cfg::CFG_86, "SPI - RGB")
    .effects(EffectMode::SoundColor, SOUND_COLOR)
    .effects(EffectMode::CustomSolid, CUSTOM_SOLID)
    .effects(EffectMode::CustomGradient, effects::SPI_CUSTOM_GRADIENT)
    .build();

/// SPI - RGBW with the network sound and custom catalogs
pub const CFG_88: LightConfig = LightConfigBuilder::extend(cfg::CFG_88, "SPI - RGBW")
    .effects(EffectMode::SoundColor, SOUND_COLOR)
    .effects(EffectMode::CustomSolid, CUSTOM_SOLID)
    .effects(EffectMode::CustomGradient, effects::SPI_CUSTOM_GRADIENT)
    .build();

static SIGNATURES: [Signature; 3] = [
    Signature {
        info: "RGB(CW) SPI/PWM (Music) Controller",
        models: &[(0x4E, "SP530E")],
        configs: &[
            (0x81, cfg::CFG_81),
            (0x83, cfg::CFG_83),
            (0x85, cfg::CFG_85),
            (0x87, cfg::CFG_87),
            (0x8A, cfg::CFG_8A),
            (0x82, cfg::CFG_82),
            (0x84, cfg::CFG_84),
            (0x8D, cfg::CFG_8D),
            (0x86, CFG_86),
            (0x88, CFG_88),
            (0x8B, cfg::CFG_8B),
            (0x8E, cfg::CFG_8E),
            (0x89, cfg::CFG_89),
            (0x8C, cfg::CFG_8C),
        ],
    },
    Signature {
        info: "SPI RGB (Music) Controller",
        models: &[(0x56, "SP538E"), (0x63, "SP548E")],
        configs: &[(0x06, CFG_86)],
    },
    Signature {
        info: "SPI RGBW (Music) Controller",
        models: &[(0x57, "SP539E"), (0x64, "SP549E")],
        configs: &[(0x08, CFG_88)],
    },
];

/// SP5xxE family
pub static SP5XXE: ModelFamily = ModelFamily {
    name: "SP5xxE",
    params: TransportParams::Net {
        port: PORT,
        close_after_send: false,
    },
    signatures: &SIGNATURES,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_spi_rgb_adds_gradient_and_firework() {
        assert!(CFG_86.supports(EffectMode::CustomGradient));
        assert!(!cfg::CFG_86.supports(EffectMode::CustomGradient));
        let custom = CFG_86.effects(EffectMode::CustomSolid).expect("custom solid");
        assert_eq!(custom.len(), 19);
        assert_eq!(custom.get(0x13).map(|fx| fx.name), Some("Firework"));
        let sound = CFG_88.effects(EffectMode::SoundColor).expect("sound");
        assert_eq!(sound.len(), 5);
        assert!(sound.get(0x05).is_some_and(|fx| fx.sizeable));
    }

    #[test]
    fn sp530e_has_every_light_type() {
        let model = SP5XXE.match_model_code(0x4E).expect("SP530E");
        assert_eq!(model.name, "SP530E");
        assert_eq!(model.configs.len(), 14);
        assert_eq!(model.port(), Some(PORT));
        assert!(!model.close_after_send());
        assert_eq!(
            model.light_type(0x86).and_then(|c| c.effects(EffectMode::SoundColor)).map(|t| t.len()),
            Some(5)
        );
    }

    #[test]
    fn sku_pairs_share_signature() {
        let a = SP5XXE.match_model_name("SP538E").expect("SP538E");
        let b = SP5XXE.match_model_code(0x63).expect("SP548E");
        assert_eq!(a.info, b.info);
        assert_eq!(b.name, "SP548E");
        assert_eq!(b.light_type(0x06).map(|c| c.name), Some("SPI - RGB"));
    }
}
