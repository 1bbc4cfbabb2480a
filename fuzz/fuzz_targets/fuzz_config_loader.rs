#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Arbitrary TOML must either fail to parse or load without panicking,
    // and a repaired config must survive a serialize/parse cycle.
    let Ok(mut cfg) = toml::from_str::<hapbridge_config::Config>(data) else {
        return;
    };
    let _ = cfg.validate();
    cfg.check_integrity();
    assert_eq!(cfg.patterns.len(), 2);
    assert!(cfg.tracker_to_osc.is_empty());
    if let Ok(text) = cfg.to_toml_string() {
        let _ = hapbridge_config::load_toml(&text);
    }
});
