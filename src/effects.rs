/*!
 # Effect modes and effect tables

 This module defines the light modes understood by SPTech controllers and
 the static effect tables that belong to each mode. Tables are plain
 `const` data validated at construction, so a duplicate code in a product
 table stops the build instead of reaching a device.
*/

use std::fmt;

/// Light mode reported and accepted by the controller (wire byte in parentheses)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum EffectMode {
    /// Static color (0x01)
    StaticColor = 0x01,
    /// Static white (0x02)
    StaticWhite = 0x02,
    /// Dynamic color (0x03)
    DynamicColor = 0x03,
    /// Dynamic white (0x04)
    DynamicWhite = 0x04,
    /// Sound reactive color (0x05)
    SoundColor = 0x05,
    /// Sound reactive white (0x06)
    SoundWhite = 0x06,
    /// Custom solid colors (0x07)
    CustomSolid = 0x07,
    /// Custom gradient (0x08)
    CustomGradient = 0x08,
}

impl EffectMode {
    /// Every mode, in wire order
    pub const ALL: [EffectMode; 8] = [
        EffectMode::StaticColor,
        EffectMode::StaticWhite,
        EffectMode::DynamicColor,
        EffectMode::DynamicWhite,
        EffectMode::SoundColor,
        EffectMode::SoundWhite,
        EffectMode::CustomSolid,
        EffectMode::CustomGradient,
    ];

    /// Decode a mode byte as sent by the device
    pub const fn from_code(code: u8) -> Option<EffectMode> {
        match code {
            0x01 => Some(EffectMode::StaticColor),
            0x02 => Some(EffectMode::StaticWhite),
            0x03 => Some(EffectMode::DynamicColor),
            0x04 => Some(EffectMode::DynamicWhite),
            0x05 => Some(EffectMode::SoundColor),
            0x06 => Some(EffectMode::SoundWhite),
            0x07 => Some(EffectMode::CustomSolid),
            0x08 => Some(EffectMode::CustomGradient),
            _ => None,
        }
    }

    /// Wire byte of this mode
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub(crate) const fn index(self) -> usize {
        self as usize - 1
    }

    /// Display name of the mode
    pub const fn name(self) -> &'static str {
        match self {
            EffectMode::StaticColor => "Static Color",
            EffectMode::StaticWhite => "Static White",
            EffectMode::DynamicColor => "Dynamic Color",
            EffectMode::DynamicWhite => "Dynamic White",
            EffectMode::SoundColor => "Sound - Color",
            EffectMode::SoundWhite => "Sound - White",
            EffectMode::CustomSolid => "Custom Solid",
            EffectMode::CustomGradient => "Custom Gradient",
        }
    }

    /// Look up a mode by its display name (case insensitive)
    pub fn from_name(name: &str) -> Option<EffectMode> {
        EffectMode::ALL
            .into_iter()
            .find(|mode| mode.name().eq_ignore_ascii_case(name.trim()))
    }

    pub const fn is_static(self) -> bool {
        matches!(self, EffectMode::StaticColor | EffectMode::StaticWhite)
    }

    pub const fn is_dynamic(self) -> bool {
        matches!(self, EffectMode::DynamicColor | EffectMode::DynamicWhite)
    }

    pub const fn is_sound(self) -> bool {
        matches!(self, EffectMode::SoundColor | EffectMode::SoundWhite)
    }

    pub const fn is_custom(self) -> bool {
        matches!(self, EffectMode::CustomSolid | EffectMode::CustomGradient)
    }

    /// Modes driving the color (hue) channels
    pub const fn is_color(self) -> bool {
        matches!(
            self,
            EffectMode::StaticColor
                | EffectMode::DynamicColor
                | EffectMode::SoundColor
                | EffectMode::CustomSolid
                | EffectMode::CustomGradient
        )
    }

    /// Modes driving the white (or CCT) channels
    pub const fn is_white(self) -> bool {
        matches!(
            self,
            EffectMode::StaticWhite | EffectMode::DynamicWhite | EffectMode::SoundWhite
        )
    }

    /// Modes that support looping through their effect list
    pub const fn is_loopable(self) -> bool {
        self.is_dynamic() || self.is_sound()
    }
}

impl fmt::Display for EffectMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Broad effect category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectKind {
    Static,
    Dynamic,
    Sound,
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectKind::Static => write!(f, "static"),
            EffectKind::Dynamic => write!(f, "dynamic"),
            EffectKind::Sound => write!(f, "sound"),
        }
    }
}

/// A single effect descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Effect {
    /// Effect code within its mode
    pub code: u8,
    /// Display name
    pub name: &'static str,
    /// Category of the effect
    pub kind: EffectKind,
    /// Effect color can be changed
    pub colorable: bool,
    /// Effect length can be changed
    pub sizeable: bool,
    /// Effect direction can be changed
    pub directional: bool,
    /// Effect can be paused
    pub pausable: bool,
    /// Effect speed can be changed
    pub speedable: bool,
}

impl Effect {
    /// A static effect, colorable by default
    pub const fn fixed(code: u8, name: &'static str) -> Effect {
        Effect {
            code,
            name,
            kind: EffectKind::Static,
            colorable: true,
            sizeable: false,
            directional: false,
            pausable: false,
            speedable: false,
        }
    }

    /// A dynamic effect, speedable by default
    pub const fn dynamic(code: u8, name: &'static str) -> Effect {
        Effect {
            code,
            name,
            kind: EffectKind::Dynamic,
            colorable: false,
            sizeable: false,
            directional: false,
            pausable: false,
            speedable: true,
        }
    }

    /// A sound reactive effect
    pub const fn sound(code: u8, name: &'static str) -> Effect {
        Effect {
            code,
            name,
            kind: EffectKind::Sound,
            colorable: false,
            sizeable: false,
            directional: false,
            pausable: false,
            speedable: false,
        }
    }

    pub const fn colorable(mut self) -> Effect {
        self.colorable = true;
        self
    }

    pub const fn uncolored(mut self) -> Effect {
        self.colorable = false;
        self
    }

    pub const fn sizeable(mut self) -> Effect {
        self.sizeable = true;
        self
    }

    pub const fn directional(mut self) -> Effect {
        self.directional = true;
        self
    }

    pub const fn pausable(mut self) -> Effect {
        self.pausable = true;
        self
    }

    pub const fn is_dynamic(&self) -> bool {
        matches!(self.kind, EffectKind::Dynamic)
    }
}

/// An immutable code -> effect table for one mode
///
/// # Panics
///
/// [`EffectTable::new`] panics when two entries share a code. For tables
/// declared as `const` this happens at compile time.
#[derive(Debug, Clone, Copy)]
pub struct EffectTable(&'static [Effect]);

impl EffectTable {
    pub const fn new(effects: &'static [Effect]) -> EffectTable {
        assert!(!effects.is_empty(), "effect table is empty");
        let mut i = 0;
        while i < effects.len() {
            let mut j = i + 1;
            while j < effects.len() {
                if effects[i].code == effects[j].code {
                    panic!("effect table contains a duplicate code");
                }
                j += 1;
            }
            i += 1;
        }
        EffectTable(effects)
    }

    /// Effect with the given code
    pub fn get(&self, code: u8) -> Option<&'static Effect> {
        self.0.iter().find(|fx| fx.code == code)
    }

    /// Effect with the given name (case insensitive)
    pub fn find(&self, name: &str) -> Option<&'static Effect> {
        self.0.iter().find(|fx| fx.name.eq_ignore_ascii_case(name))
    }

    /// First declared effect, used when switching modes
    pub fn first(&self) -> &'static Effect {
        &self.0[0]
    }

    pub fn contains(&self, code: u8) -> bool {
        self.get(code).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static Effect> {
        self.0.iter()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.0.iter().map(|fx| fx.name).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Underlying effect slice
    pub const fn effects(&self) -> &'static [Effect] {
        self.0
    }
}

/// `base` followed by `extra`, for product tables that extend a shared one
///
/// # Panics
///
/// If `N` is not `base.len() + 1`.
pub const fn extend_effects<const N: usize>(base: &[Effect], extra: Effect) -> [Effect; N] {
    assert!(base.len() + 1 == N, "extended effect table has the wrong size");
    let mut out = [extra; N];
    let mut i = 0;
    while i < base.len() {
        out[i] = base[i];
        i += 1;
    }
    out
}

const STATIC_COLOR_FX: &[Effect] = &[Effect::fixed(0x01, "Solid")];
const STATIC_WHITE_FX: &[Effect] = &[Effect::fixed(0x01, "Solid")];

const PWM_DYNAMIC_WHITE_FX: &[Effect] = &[
    Effect::dynamic(0x01, "White Color Breath").colorable(),
    Effect::dynamic(0x02, "White Color Strobe").colorable(),
    Effect::dynamic(0x03, "White Color Heart Beat").colorable(),
];

const PWM_SOUND_WHITE_FX: &[Effect] =
    &[Effect::sound(0x01, "Sound - White Color Music Breath").colorable()];

const PWM_DYNAMIC_COLOR_FX: &[Effect] = &[
    Effect::dynamic(0x01, "Jump Seven Color"),
    Effect::dynamic(0x02, "Breath Seven Color"),
    Effect::dynamic(0x03, "Strobe Seven Color"),
    Effect::dynamic(0x04, "Heartbeat Seven Color"),
    Effect::dynamic(0x05, "Gradient Seven Color"),
    Effect::dynamic(0x06, "Breath Red"),
    Effect::dynamic(0x07, "Breath Green"),
    Effect::dynamic(0x08, "Breath Blue"),
    Effect::dynamic(0x09, "Breath Yellow"),
    Effect::dynamic(0x0A, "Breath Cyan"),
    Effect::dynamic(0x0B, "Breath Purple"),
    Effect::dynamic(0x0C, "Breath White"),
];

const PWM_SOUND_COLOR_FX: &[Effect] = &[
    Effect::sound(0x00, "Sound - Music Breath"),
    Effect::sound(0x01, "Sound - Music Jump"),
    Effect::sound(0x02, "Sound - Music Mono Breath").colorable(),
];

const PWM_CUSTOM_COLOR_FX: &[Effect] = &[
    Effect::dynamic(0x01, "Jump"),
    Effect::dynamic(0x02, "Breath"),
    Effect::dynamic(0x03, "Strobe"),
];

const SPI_DYNAMIC_WHITE_FX: &[Effect] = &[
    Effect::dynamic(0x01, "White Color Breath").colorable().pausable(),
    Effect::dynamic(0x02, "White Color Stars").colorable().pausable(),
    Effect::dynamic(0x03, "White Color Meteor").colorable().sizeable().pausable(),
    Effect::dynamic(0x04, "White Color Comet Spin").colorable().sizeable().pausable(),
    Effect::dynamic(0x05, "White Color Dot Spin").colorable().sizeable().directional().pausable(),
    Effect::dynamic(0x06, "White Color Segment Spin").colorable().sizeable().directional().pausable(),
    Effect::dynamic(0x07, "White Color Chasing Dots").colorable().sizeable().directional().pausable(),
    Effect::dynamic(0x08, "White Color Comet").colorable().sizeable().directional().pausable(),
    Effect::dynamic(0x09, "White Color Wave").colorable().sizeable().directional().pausable(),
    Effect::dynamic(0x0A, "White Color Stacking").colorable().sizeable().pausable(),
];

const SPI_DYNAMIC_COLOR_FX: &[Effect] = &[
    Effect::dynamic(0x01, "Rainbow").sizeable().directional().pausable(),
    Effect::dynamic(0x02, "Rainbow Meteor").sizeable().directional(),
    Effect::dynamic(0x03, "Rainbow Comet").sizeable().directional(),
    Effect::dynamic(0x04, "Rainbow Segment").sizeable().directional(),
    Effect::dynamic(0x05, "Rainbow Wave").sizeable().directional(),
    Effect::dynamic(0x06, "Rainbow Jump"),
    Effect::dynamic(0x07, "Rainbow Stars"),
    Effect::dynamic(0x08, "Rainbow Spin").sizeable(),
    Effect::dynamic(0x09, "Fire Red Yellow").sizeable().directional(),
    Effect::dynamic(0x0A, "Fire Red Purple").sizeable().directional(),
    Effect::dynamic(0x0B, "Fire Green Yellow").sizeable().directional(),
    Effect::dynamic(0x0C, "Fire Green Cyan").sizeable().directional(),
    Effect::dynamic(0x0D, "Fire Blue Purple").sizeable().directional(),
    Effect::dynamic(0x0E, "Fire Blue Cyan").sizeable().directional(),
    Effect::dynamic(0x0F, "Comet Red").sizeable().directional().pausable(),
    Effect::dynamic(0x10, "Comet Green").sizeable().directional().pausable(),
    Effect::dynamic(0x11, "Comet Blue").sizeable().directional().pausable(),
    Effect::dynamic(0x12, "Comet Yellow").sizeable().directional().pausable(),
    Effect::dynamic(0x13, "Comet Cyan").sizeable().directional().pausable(),
    Effect::dynamic(0x14, "Comet Purple").sizeable().directional().pausable(),
    Effect::dynamic(0x15, "Comet White").sizeable().directional().pausable(),
    Effect::dynamic(0x16, "Meteor Red").sizeable().directional(),
    Effect::dynamic(0x17, "Meteor Green").sizeable().directional(),
    Effect::dynamic(0x18, "Meteor Blue").sizeable().directional(),
    Effect::dynamic(0x19, "Meteor Yellow").sizeable().directional(),
    Effect::dynamic(0x1A, "Meteor Cyan").sizeable().directional(),
    Effect::dynamic(0x1B, "Meteor Purple").sizeable().directional(),
    Effect::dynamic(0x1C, "Meteor White").sizeable().directional(),
    Effect::dynamic(0x4E, "Stars Red"),
    Effect::dynamic(0x4F, "Stars Green"),
    Effect::dynamic(0x50, "Stars Blue"),
    Effect::dynamic(0x51, "Stars Yellow"),
    Effect::dynamic(0x52, "Stars Cyan"),
    Effect::dynamic(0x53, "Stars Purple"),
    Effect::dynamic(0x54, "Stars White"),
    Effect::dynamic(0x62, "Breath Red"),
    Effect::dynamic(0x63, "Breath Green"),
    Effect::dynamic(0x64, "Breath Blue"),
    Effect::dynamic(0x65, "Breath Yellow"),
    Effect::dynamic(0x66, "Breath Cyan"),
    Effect::dynamic(0x67, "Breath Purple"),
    Effect::dynamic(0x68, "Breath White"),
    Effect::dynamic(0x92, "Gradient"),
];

const SPI_SOUND_WHITE_FX: &[Effect] = &[
    Effect::sound(0x01, "Sound - White Color Music Blink").colorable(),
    Effect::sound(0x02, "Sound - White Color Music Force").colorable().sizeable(),
    Effect::sound(0x03, "Sound - White Color Music Hits").colorable(),
    Effect::sound(0x04, "Sound - White Color Music Eject Forward").colorable().directional(),
    Effect::sound(0x05, "Sound - White Color Music Eject Backward").colorable().directional(),
];

const SPI_SOUND_COLOR_FX: &[Effect] = &[
    Effect::sound(0x01, "Sound - Rhythm Spectrum Full"),
    Effect::sound(0x02, "Sound - Rhythm Spectrum Single").colorable(),
    Effect::sound(0x03, "Sound - Rhythm Stars Full"),
    Effect::sound(0x04, "Sound - Rhythm Stars Single").colorable(),
    Effect::sound(0x05, "Sound - Energy Gradient").sizeable(),
    Effect::sound(0x06, "Sound - Energy Single").colorable().sizeable(),
    Effect::sound(0x07, "Sound - Pulse Gradient"),
    Effect::sound(0x08, "Sound - Pulse Single").colorable(),
    Effect::sound(0x09, "Sound - Ejection Forward Full").sizeable(),
    Effect::sound(0x0A, "Sound - Ejection Forward Single").colorable().sizeable(),
    Effect::sound(0x0B, "Sound - Ejection Backward Full").sizeable(),
    Effect::sound(0x0C, "Sound - Ejection Backward Single").colorable().sizeable(),
    Effect::sound(0x0D, "Sound - VU Meter Full").sizeable(),
    Effect::sound(0x0E, "Sound - VU Meter Single").colorable().sizeable(),
    Effect::sound(0x0F, "Sound - Love and Peace"),
    Effect::sound(0x10, "Sound - Christmas"),
    Effect::sound(0x11, "Sound - Heartbeat"),
    Effect::sound(0x12, "Sound - Party"),
];

const SPI_CUSTOM_SOLID_FX: &[Effect] = &[
    Effect::fixed(0x01, "Static").uncolored(),
    Effect::dynamic(0x02, "Chase Forward"),
    Effect::dynamic(0x03, "Chase Backward"),
    Effect::dynamic(0x04, "Chase Middle to Out"),
    Effect::dynamic(0x05, "Chase Out to Middle"),
    Effect::dynamic(0x06, "Twinkle"),
    Effect::dynamic(0x07, "Fade"),
    Effect::dynamic(0x08, "Comet Forward"),
    Effect::dynamic(0x09, "Comet Backward"),
    Effect::dynamic(0x0A, "Comet Middle to Out"),
    Effect::dynamic(0x0B, "Comet Out to Middle"),
    Effect::dynamic(0x0C, "Wave Forward"),
    Effect::dynamic(0x0D, "Wave Backward"),
    Effect::dynamic(0x0E, "Wave Middle to Out"),
    Effect::dynamic(0x0F, "Wave Out to Middle"),
    Effect::dynamic(0x10, "Strobe"),
    Effect::dynamic(0x11, "Solid Fade"),
    Effect::dynamic(0x12, "Full Strobe"),
];

const SPI_CUSTOM_GRADIENT_FX: &[Effect] = &[
    Effect::fixed(0x01, "Static").uncolored(),
    Effect::dynamic(0x02, "Chase Forward"),
    Effect::dynamic(0x03, "Chase Backward"),
    Effect::dynamic(0x04, "Spin"),
    Effect::dynamic(0x05, "Sine Chase Forward"),
    Effect::dynamic(0x06, "Sine Chase Backward"),
    Effect::dynamic(0x07, "Fire Forward"),
    Effect::dynamic(0x08, "Fire Backward"),
    Effect::dynamic(0x09, "Juggle"),
    Effect::dynamic(0x0A, "Meteor Forward"),
    Effect::dynamic(0x0B, "Meteor Backward"),
];

/// Single solid static color
pub const STATIC_COLOR: EffectTable = EffectTable::new(STATIC_COLOR_FX);
/// Single solid static white
pub const STATIC_WHITE: EffectTable = EffectTable::new(STATIC_WHITE_FX);
/// PWM dynamic white effects
pub const PWM_DYNAMIC_WHITE: EffectTable = EffectTable::new(PWM_DYNAMIC_WHITE_FX);
/// PWM sound reactive white effects
pub const PWM_SOUND_WHITE: EffectTable = EffectTable::new(PWM_SOUND_WHITE_FX);
/// PWM dynamic color effects
pub const PWM_DYNAMIC_COLOR: EffectTable = EffectTable::new(PWM_DYNAMIC_COLOR_FX);
/// PWM sound reactive color effects
pub const PWM_SOUND_COLOR: EffectTable = EffectTable::new(PWM_SOUND_COLOR_FX);
/// PWM custom color effects
pub const PWM_CUSTOM_COLOR: EffectTable = EffectTable::new(PWM_CUSTOM_COLOR_FX);
/// SPI dynamic white effects
pub const SPI_DYNAMIC_WHITE: EffectTable = EffectTable::new(SPI_DYNAMIC_WHITE_FX);
/// SPI dynamic color effects
pub const SPI_DYNAMIC_COLOR: EffectTable = EffectTable::new(SPI_DYNAMIC_COLOR_FX);
/// SPI sound reactive white effects
pub const SPI_SOUND_WHITE: EffectTable = EffectTable::new(SPI_SOUND_WHITE_FX);
/// SPI sound reactive color effects
pub const SPI_SOUND_COLOR: EffectTable = EffectTable::new(SPI_SOUND_COLOR_FX);
/// SPI custom solid effects
pub const SPI_CUSTOM_SOLID: EffectTable = EffectTable::new(SPI_CUSTOM_SOLID_FX);
/// SPI custom gradient effects
pub const SPI_CUSTOM_GRADIENT: EffectTable = EffectTable::new(SPI_CUSTOM_GRADIENT_FX);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_codes_round_trip_through_wire_byte() {
        for mode in EffectMode::ALL {
            assert_eq!(EffectMode::from_code(mode.code()), Some(mode));
        }
        assert_eq!(EffectMode::from_code(0x00), None);
        assert_eq!(EffectMode::from_code(0x09), None);
    }

    #[test]
    fn mode_categories() {
        assert!(EffectMode::StaticWhite.is_static());
        assert!(EffectMode::StaticWhite.is_white());
        assert!(!EffectMode::StaticWhite.is_color());
        assert!(EffectMode::CustomGradient.is_color());
        assert!(EffectMode::CustomGradient.is_custom());
        assert!(EffectMode::SoundColor.is_loopable());
        assert!(!EffectMode::CustomSolid.is_loopable());
        assert_eq!(EffectMode::from_name("sound - white"), Some(EffectMode::SoundWhite));
    }

    #[test]
    fn effect_defaults_follow_kind() {
        let fx = Effect::fixed(1, "Solid");
        assert!(fx.colorable && !fx.speedable);
        let fx = Effect::dynamic(1, "Rainbow");
        assert!(fx.speedable && !fx.colorable && fx.is_dynamic());
        let fx = Effect::sound(1, "Party");
        assert!(!fx.speedable && !fx.colorable);
    }

    #[test]
    fn table_lookup_by_code_and_name() {
        assert_eq!(SPI_DYNAMIC_COLOR.get(0x92).map(|fx| fx.name), Some("Gradient"));
        assert_eq!(SPI_DYNAMIC_COLOR.find("rainbow").map(|fx| fx.code), Some(0x01));
        assert!(SPI_DYNAMIC_COLOR.get(0x90).is_none());
        assert_eq!(PWM_SOUND_COLOR.first().code, 0x00);
        assert!(SPI_DYNAMIC_COLOR.get(0x01).is_some_and(|fx| fx.directional));
    }

    #[test]
    fn extended_table_keeps_base_order() {
        const EXTENDED: &[Effect] =
            &extend_effects::<4>(PWM_CUSTOM_COLOR.effects(), Effect::dynamic(0x04, "Fade"));
        let table = EffectTable::new(EXTENDED);
        assert_eq!(table.names(), vec!["Jump", "Breath", "Strobe", "Fade"]);
    }

    #[test]
    #[should_panic(expected = "duplicate code")]
    fn duplicate_codes_are_rejected() {
        static DUPLICATED: [Effect; 2] = [Effect::fixed(0x01, "Solid"), Effect::dynamic(0x01, "Fade")];
        let _ = EffectTable::new(&DUPLICATED);
    }
}
