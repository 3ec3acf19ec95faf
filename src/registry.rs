//! Model signature registry and device matching.

use std::collections::HashMap;

use tracing::{debug, instrument};

use crate::model::{ModelFamily, ProtocolModel, Transport, TransportParams};
use crate::models;

/// Ordered set of product families
///
/// Every match is a pure scan over the families in registration order and
/// either resolves a [`ProtocolModel`] or returns `None`.
#[derive(Debug, Clone)]
pub struct Registry {
    families: Vec<&'static ModelFamily>,
}

impl Registry {
    /// Build a registry from families in priority order
    ///
    /// # Panics
    ///
    /// If two signatures claim the same model code.
    pub fn new(families: Vec<&'static ModelFamily>) -> Self {
        let mut owners: HashMap<u8, &str> = HashMap::new();
        for family in &families {
            for code in family.codes() {
                if let Some(owner) = owners.insert(code, family.name) {
                    panic!(
                        "model code {code:#04x} registered twice ({owner} and {})",
                        family.name
                    );
                }
            }
        }
        Self { families }
    }

    /// Registry of every supported product family
    pub fn builtin() -> Self {
        Self::new(models::FAMILIES.to_vec())
    }

    pub fn families(&self) -> impl Iterator<Item = &'static ModelFamily> + '_ {
        self.families.iter().copied()
    }

    /// Resolve an exact model display name
    #[instrument(skip(self))]
    pub fn match_model_name(&self, name: &str) -> Option<ProtocolModel> {
        let model = self
            .families
            .iter()
            .find_map(|family| family.match_model_name(name));
        debug!(found = model.is_some(), "Matched model name");
        model
    }

    /// Resolve a model byte-code read from a device
    #[instrument(skip(self))]
    pub fn match_model_code(&self, code: u8) -> Option<ProtocolModel> {
        let model = self
            .families
            .iter()
            .find_map(|family| family.match_model_code(code));
        debug!(found = model.is_some(), "Matched model code");
        model
    }

    /// Resolve discovery data, trying the name first and the code second
    pub fn match_discovery(&self, name: Option<&str>, code: Option<u8>) -> Option<ProtocolModel> {
        name.and_then(|name| self.match_model_name(name))
            .or_else(|| code.and_then(|code| self.match_model_code(code)))
    }

    /// Resolve a BLE advertisement's manufacturer data
    ///
    /// The first data byte carries the model code.
    pub fn match_advertisement(&self, manufacturer_id: u16, data: &[u8]) -> Option<ProtocolModel> {
        let code = *data.first()?;
        self.families
            .iter()
            .filter(|family| {
                matches!(
                    family.params,
                    TransportParams::Ble { manufacturer_id: id, .. } if id == manufacturer_id
                )
            })
            .find_map(|family| family.match_model_code(code))
    }

    /// Every registered model, in registration order
    pub fn models(&self) -> Vec<ProtocolModel> {
        self.families
            .iter()
            .flat_map(|family| {
                family.signatures.iter().flat_map(move |signature| {
                    signature
                        .models
                        .iter()
                        .map(move |(code, _)| family.make_model(signature, *code))
                })
            })
            .collect()
    }

    /// Registered models reachable over `transport`
    pub fn models_for(&self, transport: Transport) -> Vec<ProtocolModel> {
        self.models()
            .into_iter()
            .filter(|model| model.transport() == transport)
            .collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ble, net};

    #[test]
    fn builtin_codes_are_unique() {
        let registry = Registry::builtin();
        assert_eq!(registry.families().count(), 2);
        assert_eq!(registry.models().len(), 5 + 28);
    }

    #[test]
    fn discovery_prefers_name_then_code() {
        let registry = Registry::builtin();
        let model = registry
            .match_discovery(Some("SP539E"), Some(0x4E))
            .expect("model");
        assert_eq!(model.code, 0x57);
        let model = registry
            .match_discovery(Some("Living Room"), Some(0x4E))
            .expect("model");
        assert_eq!(model.name, "SP530E");
        assert!(registry.match_discovery(None, None).is_none());
    }

    #[test]
    fn advertisement_matches_on_manufacturer_id() {
        let registry = Registry::builtin();
        let model = registry
            .match_advertisement(ble::MANUFACTURER_ID, &[0x22, 0x10])
            .expect("SP633E");
        assert_eq!(model.name, "SP633E");
        assert!(registry.match_advertisement(0x004C, &[0x22, 0x10]).is_none());
        assert!(registry.match_advertisement(ble::MANUFACTURER_ID, &[]).is_none());
        // network codes are never advertised over BLE
        assert!(registry
            .match_advertisement(ble::MANUFACTURER_ID, &[0x4E])
            .is_none());
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn duplicate_family_panics() {
        let _ = Registry::new(vec![&net::SP5XXE, &net::SP5XXE]);
    }

    #[test]
    fn transport_filter() {
        let registry = Registry::builtin();
        assert_eq!(registry.models_for(Transport::Net).len(), 5);
        assert!(registry
            .models_for(Transport::Ble)
            .iter()
            .all(|model| model.manufacturer_data().is_some()));
    }
}
