use std::sync::Arc;

use hapbridge_config::Config;
use hapbridge_core::{BridgeContext, ConfigStore};
use hapbridge_hardware::SimulatedTracker;

fn context(sim: &SimulatedTracker) -> BridgeContext {
    BridgeContext::new(
        Arc::new(ConfigStore::new(Config::default())),
        Arc::new(sim.clone()),
        Arc::new(sim.clone()),
    )
}

#[test]
fn start_attaches_reported_devices_and_stop_detaches() {
    let sim = SimulatedTracker::new()
        .with_device(1, "VIVE Tracker 3.0 MV", "LHR-1", 0.9)
        .with_device(2, "VIVE Tracker 3.0 MV", "LHR-2", 0.9);
    let mut ctx = context(&sim);
    assert!(!ctx.is_running());

    let report = ctx.start().unwrap();
    assert_eq!(report.added.len(), 2);
    assert!(ctx.is_running());
    let sup = ctx.supervisor().unwrap();
    assert_eq!(sup.serials(), vec!["LHR-1".to_string(), "LHR-2".to_string()]);

    ctx.stop().unwrap();
    assert!(!ctx.is_running());
    assert!(ctx.supervisor().is_none());
}

#[test]
fn second_start_only_refreshes() {
    let sim = SimulatedTracker::new().with_device(1, "VIVE Tracker 3.0 MV", "LHR-1", 0.9);
    let mut ctx = context(&sim);
    ctx.start().unwrap();
    sim.add_device(2, "VIVE Tracker 3.0 MV", "LHR-2", 0.9);
    let report = ctx.start().unwrap();
    assert_eq!(report.added, vec!["LHR-2".to_string()]);
}

#[test]
fn stop_persists_settings_created_at_runtime() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hapbridge.toml");
    let sim = SimulatedTracker::new().with_device(1, "VIVE Tracker 3.0 MV", "LHR-7", 0.9);
    let mut ctx = context(&sim).with_settings_path(&path);
    ctx.start().unwrap();
    // Routing reads the device settings, creating defaults for new serials.
    ctx.supervisor().unwrap().on_value("/nowhere", 0.1);
    ctx.stop().unwrap();

    let saved = hapbridge_config::load_toml(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert!(saved.trackers.contains_key("LHR-7"));
    assert_eq!(saved.version, hapbridge_config::CONFIG_VERSION);
}
