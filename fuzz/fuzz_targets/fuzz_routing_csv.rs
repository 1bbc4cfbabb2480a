#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // The loader reads from a path, so stage the bytes in a temp file.
    let path = std::env::temp_dir().join(format!("hapbridge-fuzz-{}.csv", std::process::id()));
    if std::fs::write(&path, data).is_err() {
        return;
    }
    if let Ok(rows) = hapbridge_config::load_routing_csv(&path) {
        let mut cfg = hapbridge_config::Config::default();
        cfg.apply_routing(&rows);
        for row in &rows {
            assert!(!row.serial.is_empty());
            assert!(cfg.trackers.contains_key(&row.serial));
        }
    }
    let _ = std::fs::remove_file(&path);
});
