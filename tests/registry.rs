use banlanx_led_controller::light_type::CFG_85;
use banlanx_led_controller::*;

static S1: [Signature; 1] = [Signature {
    info: "RGB controller",
    models: &[(0x4E, "SP530E")],
    configs: &[(0x85, CFG_85)],
}];

static S2: [Signature; 1] = [Signature {
    info: "SPI controller",
    models: &[(0x56, "SP538E")],
    configs: &[(0x06, CFG_85)],
}];

static FIRST: ModelFamily = ModelFamily {
    name: "first",
    params: TransportParams::Net {
        port: 8587,
        close_after_send: false,
    },
    signatures: &S1,
};

static SECOND: ModelFamily = ModelFamily {
    name: "second",
    params: TransportParams::Net {
        port: 8587,
        close_after_send: false,
    },
    signatures: &S2,
};

#[test]
fn code_match_is_independent_of_order() {
    for registry in [
        Registry::new(vec![&FIRST, &SECOND]),
        Registry::new(vec![&SECOND, &FIRST]),
    ] {
        for _ in 0..3 {
            assert_eq!(registry.match_model_code(0x56).map(|m| m.name), Some("SP538E"));
            assert_eq!(registry.match_model_code(0x4E).map(|m| m.name), Some("SP530E"));
        }
    }
}

#[test]
fn every_code_resolves_to_one_model_or_none() {
    let registry = Registry::builtin();
    let mut resolved = 0;
    for code in 0..=u8::MAX {
        if let Some(model) = registry.match_model_code(code) {
            assert_eq!(model.code, code);
            resolved += 1;
        }
    }
    assert_eq!(resolved, registry.models().len());
}

#[test]
fn unknown_names_and_codes_are_not_found() {
    let registry = Registry::builtin();
    assert!(registry.match_model_name("SP999E").is_none());
    assert!(registry.match_model_name("sp530e").is_none());
    assert!(registry.match_model_name("").is_none());
    assert!(registry.match_model_code(0x00).is_none());
    assert!(registry.match_model_code(0xFF).is_none());
}

#[test]
fn builtin_names_resolve_to_their_code() {
    let registry = Registry::builtin();
    let models = registry.models();
    for model in &models {
        let by_name = registry.match_model_name(model.name).expect("registered name");
        // Names sold under several codes resolve to the first registered one
        let first = models
            .iter()
            .find(|other| other.name == model.name)
            .expect("model itself");
        assert_eq!(by_name.code, first.code, "{}", model.name);
        assert_eq!(by_name.transport(), model.transport());
    }
    assert!(models.iter().filter(|m| m.name == "SP648E").count() > 1);
}

#[test]
fn builtin_models_have_drivable_light_types() {
    for model in Registry::builtin().models() {
        assert!(!model.configs.is_empty(), "{}", model.name);
        for (code, config) in model.configs {
            assert!(config.modes().next().is_some(), "{} {code:#04x}", model.name);
            let mode = config.default_mode();
            let table = config.effects(mode).expect("default mode has effects");
            assert!(table.get(table.first().code).is_some());
        }
    }
}

#[test]
fn network_models_expose_their_port() {
    let model = Registry::builtin().match_model_name("SP548E").expect("SP548E");
    assert_eq!(model.transport(), Transport::Net);
    assert_eq!(model.port(), Some(8587));
    assert!(!model.has_light_types());
    assert!(model.light_type(0x06).is_some());
    // a single wiring option has nothing to fall back to
    assert!(model.light_type(0x85).is_none());
}
