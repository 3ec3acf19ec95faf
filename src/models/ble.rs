//! SP6xxE Bluetooth controllers (SP630E and the SP63xE / SP64xE pairs).

use uuid::Uuid;

use crate::light_type::{
    CFG_81, CFG_82, CFG_83, CFG_84, CFG_85, CFG_86, CFG_87, CFG_88, CFG_89, CFG_8A, CFG_8B,
    CFG_8C, CFG_8D, CFG_8E,
};
use crate::model::{ModelFamily, Signature, TransportParams};

/// Company identifier in the advertised manufacturer data
pub const MANUFACTURER_ID: u16 = 20563;

pub const SERVICE_UUIDS: [Uuid; 2] = [
    Uuid::from_u128(0x0000e0ff_0000_1000_8000_00805f9b34fb),
    Uuid::from_u128(0x0000ffe0_0000_1000_8000_00805f9b34fb),
];

pub const WRITE_UUID: Uuid = Uuid::from_u128(0x0000ffe1_0000_1000_8000_00805f9b34fb);

static SIGNATURES: [Signature; 13] = [
    Signature {
        info: "RGB(CW) SPI/PWM (Music) Controller",
        models: &[(0x1F, "SP630E")],
        configs: &[
            (0x81, CFG_81),
            (0x83, CFG_83),
            (0x85, CFG_85),
            (0x87, CFG_87),
            (0x8A, CFG_8A),
            (0x82, CFG_82),
            (0x84, CFG_84),
            (0x8D, CFG_8D),
            (0x86, CFG_86),
            (0x88, CFG_88),
            (0x8B, CFG_8B),
            (0x8E, CFG_8E),
            (0x89, CFG_89),
            (0x8C, CFG_8C),
        ],
    },
    Signature {
        info: "PWM Single Color (Music) Controller",
        models: &[(0x20, "SP631E"), (0x2C, "SP641E")],
        configs: &[(0x01, CFG_81)],
    },
    Signature {
        info: "PWM CCT (Music) Controller",
        models: &[(0x21, "SP632E"), (0x2D, "SP642E"), (0x4A, "SP642E")],
        configs: &[(0x03, CFG_83)],
    },
    Signature {
        info: "PWM RGB (Music) Controller",
        models: &[(0x22, "SP633E"), (0x2E, "SP643E")],
        configs: &[(0x05, CFG_85)],
    },
    Signature {
        info: "PWM RGBW (Music) Controller",
        models: &[(0x23, "SP634E"), (0x2F, "SP644E")],
        configs: &[(0x07, CFG_87)],
    },
    Signature {
        info: "PWM RGBCCT (Music) Controller",
        models: &[(0x24, "SP635E"), (0x30, "SP645E")],
        configs: &[(0x0A, CFG_8A)],
    },
    Signature {
        info: "SPI Single Color (Music) Controller",
        models: &[(0x25, "SP636E"), (0x31, "SP646E")],
        configs: &[(0x02, CFG_82)],
    },
    Signature {
        info: "SPI CCT (Music) Controller",
        models: &[(0x26, "SP637E"), (0x32, "SP647E")],
        configs: &[(0x04, CFG_84), (0x0D, CFG_8D)],
    },
    Signature {
        info: "SPI RGB (Music) Controller",
        models: &[
            (0x27, "SP638E"),
            (0x33, "SP648E"),
            (0x45, "SP648E"),
            (0x4C, "SP648E"),
        ],
        configs: &[(0x06, CFG_86)],
    },
    Signature {
        info: "SPI RGBW (Music) Controller",
        models: &[(0x28, "SP639E"), (0x34, "SP649E")],
        configs: &[(0x08, CFG_88)],
    },
    Signature {
        info: "SPI RGBCCT (Music) Controller",
        models: &[(0x29, "SP63AE"), (0x35, "SP64AE")],
        configs: &[(0x0B, CFG_8B), (0x0E, CFG_8E)],
    },
    Signature {
        info: "SPI RGB+1CH PWM (Music) Controller",
        models: &[(0x2A, "SP63BE"), (0x36, "SP64BE")],
        configs: &[(0x09, CFG_89)],
    },
    Signature {
        info: "SPI RGB+2CH PWM (Music) Controller",
        models: &[(0x2B, "SP63CE"), (0x37, "SP64CE")],
        configs: &[(0x0C, CFG_8C)],
    },
];

/// SP6xxE family
pub static SP6XXE: ModelFamily = ModelFamily {
    name: "SP6xxE",
    params: TransportParams::Ble {
        manufacturer_id: MANUFACTURER_ID,
        service_uuids: &SERVICE_UUIDS,
        write_uuid: WRITE_UUID,
    },
    signatures: &SIGNATURES,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Transport;

    #[test]
    fn repeated_name_resolves_to_first_code() {
        let model = SP6XXE.match_model_name("SP648E").expect("SP648E");
        assert_eq!(model.code, 0x33);
        let model = SP6XXE.match_model_code(0x4C).expect("SP648E");
        assert_eq!(model.name, "SP648E");
        assert_eq!(model.manufacturer_data(), Some([0x4C, 0x10]));
    }

    #[test]
    fn ble_params() {
        let model = SP6XXE.match_model_code(0x1F).expect("SP630E");
        assert_eq!(model.transport(), Transport::Ble);
        assert_eq!(model.port(), None);
        assert_eq!(model.configs.len(), 14);
        assert_eq!(
            WRITE_UUID.to_string(),
            "0000ffe1-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn single_config_models_have_no_light_type_choice() {
        let model = SP6XXE.match_model_name("SP633E").expect("SP633E");
        assert!(!model.has_light_types());
        assert_eq!(model.light_type(0x05).map(|c| c.name), Some("3 CH PWM - RGB"));
        assert!(model.light_type(0x85).is_none());
    }
}
