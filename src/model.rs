/*!
 # Model signatures and protocol models

 A [`ModelFamily`] groups the [`Signature`]s of one product line sharing a
 transport. Resolving a code or name against a family yields a
 [`ProtocolModel`]: the immutable description of one concrete device kind
 that a session is built around.
*/

use std::fmt;

use uuid::Uuid;

use crate::light_type::LightConfig;

/// Manufacturer string reported for every SPTech controller
pub const MANUFACTURER: &str = "SPLED (BanlanX)";

/// Transport a device is reached over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Net,
    Ble,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Net => write!(f, "net"),
            Transport::Ble => write!(f, "ble"),
        }
    }
}

/// Fixed transport parameters of a family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportParams {
    Net {
        /// TCP port of the controller
        port: u16,
        /// Close the socket after every transaction
        close_after_send: bool,
    },
    Ble {
        /// Company identifier in the advertisement
        manufacturer_id: u16,
        /// Advertised service UUIDs
        service_uuids: &'static [Uuid],
        /// Characteristic commands are written to
        write_uuid: Uuid,
    },
}

impl TransportParams {
    pub const fn transport(&self) -> Transport {
        match self {
            TransportParams::Net { .. } => Transport::Net,
            TransportParams::Ble { .. } => Transport::Ble,
        }
    }
}

/// One product line: the SKU codes it is sold under and its wiring options
#[derive(Debug)]
pub struct Signature {
    /// Short product description
    pub info: &'static str,
    /// Model byte-code to display name
    pub models: &'static [(u8, &'static str)],
    /// Device reported light type to configuration
    pub configs: &'static [(u8, LightConfig)],
}

impl Signature {
    pub fn contains(&self, code: u8) -> bool {
        self.name_of(code).is_some()
    }

    /// Display name registered for `code`
    pub fn name_of(&self, code: u8) -> Option<&'static str> {
        self.models
            .iter()
            .find(|(model, _)| *model == code)
            .map(|(_, name)| *name)
    }

    /// First code registered under `name` (exact match)
    pub fn code_of(&self, name: &str) -> Option<u8> {
        self.models
            .iter()
            .find(|(_, model)| *model == name)
            .map(|(code, _)| *code)
    }
}

/// A product family sharing transport parameters
#[derive(Debug)]
pub struct ModelFamily {
    /// Family name, e.g. "SP5xxE"
    pub name: &'static str,
    pub params: TransportParams,
    /// Signatures in match priority order
    pub signatures: &'static [Signature],
}

impl ModelFamily {
    pub fn transport(&self) -> Transport {
        self.params.transport()
    }

    /// Build the protocol model for `code` of `signature`
    ///
    /// # Panics
    ///
    /// If `code` is not one of the signature's model codes. Callers resolve
    /// codes through the match functions first, so this only fires on an
    /// inconsistent registry.
    pub fn make_model(&self, signature: &'static Signature, code: u8) -> ProtocolModel {
        let Some(name) = signature.name_of(code) else {
            panic!(
                "model code {code:#04x} is not part of the {} signature",
                signature.info
            );
        };
        ProtocolModel {
            code,
            name,
            info: signature.info,
            manufacturer: MANUFACTURER,
            channels: 1,
            configs: signature.configs,
            params: self.params,
        }
    }

    /// First model whose display name equals `name`
    pub fn match_model_name(&self, name: &str) -> Option<ProtocolModel> {
        self.signatures.iter().find_map(|signature| {
            signature
                .code_of(name)
                .map(|code| self.make_model(signature, code))
        })
    }

    /// Model registered under `code`
    pub fn match_model_code(&self, code: u8) -> Option<ProtocolModel> {
        self.signatures
            .iter()
            .find(|signature| signature.contains(code))
            .map(|signature| self.make_model(signature, code))
    }

    /// All model codes of the family, in declaration order
    pub fn codes(&self) -> impl Iterator<Item = u8> + '_ {
        self.signatures
            .iter()
            .flat_map(|signature| signature.models.iter().map(|(code, _)| *code))
    }
}

/// Fully resolved description of one device kind
#[derive(Debug, Clone)]
pub struct ProtocolModel {
    /// Model byte-code
    pub code: u8,
    /// Display name, e.g. "SP530E"
    pub name: &'static str,
    /// Short product description
    pub info: &'static str,
    pub manufacturer: &'static str,
    /// Independently controlled outputs
    pub channels: u8,
    /// Light type code to configuration
    pub configs: &'static [(u8, LightConfig)],
    pub params: TransportParams,
}

impl ProtocolModel {
    pub fn transport(&self) -> Transport {
        self.params.transport()
    }

    /// TCP port for network models
    pub fn port(&self) -> Option<u16> {
        match self.params {
            TransportParams::Net { port, .. } => Some(port),
            TransportParams::Ble { .. } => None,
        }
    }

    /// Whether network sessions drop the socket after each transaction
    pub fn close_after_send(&self) -> bool {
        matches!(
            self.params,
            TransportParams::Net {
                close_after_send: true,
                ..
            }
        )
    }

    /// Manufacturer data a BLE model advertises
    pub fn manufacturer_data(&self) -> Option<[u8; 2]> {
        match self.params {
            TransportParams::Ble { .. } => Some([self.code, 0x10]),
            TransportParams::Net { .. } => None,
        }
    }

    /// Configuration for a device reported light type
    ///
    /// Falls back to the first configuration when the model supports
    /// several and the reported type is unknown.
    pub fn light_type(&self, light_type: u8) -> Option<&'static LightConfig> {
        let configs = self.configs;
        if let Some((_, config)) = configs.iter().find(|(code, _)| *code == light_type) {
            return Some(config);
        }
        if configs.len() > 1 {
            return configs.first().map(|(_, config)| config);
        }
        None
    }

    /// Whether the user can switch between light types
    pub fn has_light_types(&self) -> bool {
        self.configs.len() > 1
    }

    /// Light type code by configuration name (case insensitive)
    pub fn light_type_code(&self, name: &str) -> Option<u8> {
        self.configs
            .iter()
            .find(|(_, config)| config.name.eq_ignore_ascii_case(name.trim()))
            .map(|(code, _)| *code)
    }

    pub fn light_type_names(&self) -> Vec<&'static str> {
        self.configs.iter().map(|(_, config)| config.name).collect()
    }
}

impl fmt::Display for ProtocolModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:#04x}, {}) - {}",
            self.name,
            self.code,
            self.transport(),
            self.info
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::light_type::{CFG_81, CFG_83, CFG_86};

    static SIGNATURES: [Signature; 2] = [
        Signature {
            info: "single",
            models: &[(0x10, "AA100"), (0x11, "AA110")],
            configs: &[(0x01, CFG_81)],
        },
        Signature {
            info: "dual",
            models: &[(0x20, "BB200"), (0x21, "AA110")],
            configs: &[(0x83, CFG_83), (0x86, CFG_86)],
        },
    ];

    static FAMILY: ModelFamily = ModelFamily {
        name: "test",
        params: TransportParams::Net {
            port: 1234,
            close_after_send: true,
        },
        signatures: &SIGNATURES,
    };

    #[test]
    fn first_signature_wins_on_duplicate_name() {
        let model = FAMILY.match_model_name("AA110").expect("model");
        assert_eq!(model.code, 0x11);
        assert_eq!(model.info, "single");
    }

    #[test]
    fn code_match_fills_model() {
        let model = FAMILY.match_model_code(0x21).expect("model");
        assert_eq!(model.name, "AA110");
        assert_eq!(model.manufacturer, MANUFACTURER);
        assert_eq!(model.port(), Some(1234));
        assert!(model.close_after_send());
        assert_eq!(model.manufacturer_data(), None);
        assert!(FAMILY.match_model_code(0x30).is_none());
        assert!(FAMILY.match_model_name("aa110").is_none());
    }

    #[test]
    #[should_panic(expected = "not part of")]
    fn make_model_rejects_foreign_code() {
        let _ = FAMILY.make_model(&SIGNATURES[0], 0x20);
    }

    #[test]
    fn light_type_fallback_rules() {
        let single = FAMILY.match_model_code(0x10).expect("model");
        assert_eq!(single.light_type(0x01).map(|c| c.name), Some(CFG_81.name));
        assert!(single.light_type(0x02).is_none());

        let dual = FAMILY.match_model_code(0x20).expect("model");
        assert_eq!(dual.light_type(0x86).map(|c| c.name), Some(CFG_86.name));
        assert_eq!(dual.light_type(0x99).map(|c| c.name), Some(CFG_83.name));
        assert_eq!(dual.light_type_code("spi - rgb"), Some(0x86));
        assert_eq!(dual.light_type_names(), vec![CFG_83.name, CFG_86.name]);
    }
}
