//! Settings edits as seen by running loops.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use hapbridge_config::{Config, PatternCfg};
use hapbridge_core::{ChannelConfig, ConfigProvider, ConfigStore, PatternKind};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Level, Metadata, Subscriber};

/// Counts WARN events emitted on the current thread.
#[derive(Clone, Default)]
struct WarnCounter(Arc<AtomicUsize>);

impl WarnCounter {
    fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl Subscriber for WarnCounter {
    fn enabled(&self, _: &Metadata<'_>) -> bool {
        true
    }
    fn new_span(&self, _: &Attributes<'_>) -> Id {
        Id::from_u64(1)
    }
    fn record(&self, _: &Id, _: &Record<'_>) {}
    fn record_follows_from(&self, _: &Id, _: &Id) {}
    fn event(&self, event: &Event<'_>) {
        if *event.metadata().level() == Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
    fn enter(&self, _: &Id) {}
    fn exit(&self, _: &Id) {}
}

#[test]
fn malformed_pattern_is_reported_once_not_every_tick() {
    let store = ConfigStore::new(Config::default());
    let warns = WarnCounter::default();

    tracing::subscriber::with_default(warns.clone(), || {
        store.update(|c| c.patterns[1] = PatternCfg::new("Wobble", 0, 10, 1));
        // A second of ticks for a handful of devices.
        for _ in 0..100 {
            let [_, vel] = store.channel_configs();
            assert_eq!(vel, ChannelConfig::default_velocity());
        }
    });

    assert_eq!(warns.count(), 1);
}

#[test]
fn edits_that_leave_patterns_alone_keep_the_converted_pair() {
    let store = ConfigStore::new(Config::default());
    store.update(|c| c.patterns[0] = PatternCfg::new("Sine", 10, 90, 3));
    store.update(|c| c.tracker_config("LHR-1").multiplier_override = 2.0);

    let [prox, _] = store.channel_configs();
    assert_eq!(prox, ChannelConfig::new(PatternKind::Sine, 10, 90, 3));
}

#[test]
fn repaired_pair_is_ready_before_first_tick() {
    let store = ConfigStore::new(Config {
        patterns: vec![PatternCfg::new("Throb", 0, 100, 8)],
        ..Config::default()
    });
    let [prox, vel] = store.channel_configs();
    // A wrong channel count is repaired to the default pair.
    assert_eq!(prox, ChannelConfig::default_proximity());
    assert_eq!(vel, ChannelConfig::default_velocity());
}
