//! Configuration store shared by the supervisor and every device loop.

use crate::config::{FeedbackCfg, HardwareProfiles};
use crate::conversions::channels_from_cfg;
use crate::device::DeviceConfig;
use crate::error::{FeedbackError, Result};
use crate::pattern::ChannelConfig;
use eyre::WrapErr;
use hapbridge_config::Config;
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Read side of the settings as seen by the feedback loops.
pub trait ConfigProvider: Send + Sync {
    /// Settings for `serial`, created with defaults on first lookup.
    fn device_config(&self, serial: &str) -> DeviceConfig;

    /// Proximity then velocity.
    fn channel_configs(&self) -> [ChannelConfig; 2];
}

/// Owns the persisted `Config`. Reads are concurrent; writes are rare.
///
/// The channel pair is converted when settings change, not per tick, so a
/// malformed pattern is reported once per edit. Lock order: `inner`, then
/// `channels`.
#[derive(Debug)]
pub struct ConfigStore {
    inner: RwLock<Config>,
    channels: RwLock<[ChannelConfig; 2]>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl ConfigStore {
    /// Wrap a loaded config, repairing it first.
    pub fn new(mut cfg: Config) -> Self {
        if cfg.check_integrity() {
            tracing::info!("settings repaired on load");
        }
        let channels = channels_from_cfg(&cfg.patterns);
        Self {
            inner: RwLock::new(cfg),
            channels: RwLock::new(channels),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Config> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Config> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> Config {
        self.read().clone()
    }

    /// Mutate settings in place, e.g. from a settings surface.
    pub fn update<R>(&self, f: impl FnOnce(&mut Config) -> R) -> R {
        let mut cfg = self.write();
        let before = cfg.patterns.clone();
        let out = f(&mut cfg);
        if cfg.patterns != before {
            let channels = channels_from_cfg(&cfg.patterns);
            *self.channels.write().unwrap_or_else(PoisonError::into_inner) = channels;
        }
        out
    }

    pub fn feedback_cfg(&self) -> FeedbackCfg {
        (&self.read().feedback).into()
    }

    pub fn hardware_profiles(&self) -> HardwareProfiles {
        (&self.read().hardware).into()
    }

    pub fn model_filter(&self) -> Vec<String> {
        self.read().feedback.model_filter.clone()
    }

    /// Persist atomically to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = self.read().to_toml_string()?;
        crate::atomic::write_atomic(path, text.as_bytes())
            .map_err(|e| FeedbackError::Io(e.to_string()))
            .wrap_err_with(|| format!("save settings to {}", path.display()))
    }
}

impl ConfigProvider for ConfigStore {
    fn device_config(&self, serial: &str) -> DeviceConfig {
        if let Some(t) = self.read().trackers.get(serial) {
            return t.into();
        }
        let mut cfg = self.write();
        tracing::debug!(serial, "creating default device settings");
        (&*cfg.tracker_config(serial)).into()
    }

    fn channel_configs(&self) -> [ChannelConfig; 2] {
        *self.channels.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::PatternKind;

    #[test]
    fn device_config_is_created_lazily_and_persisted() {
        let store = ConfigStore::default();
        assert!(store.snapshot().trackers.is_empty());
        let d = store.device_config("LHR-9");
        assert_eq!(d, DeviceConfig::default());
        assert!(store.snapshot().trackers.contains_key("LHR-9"));
    }

    #[test]
    fn updates_are_visible_to_readers() {
        let store = ConfigStore::default();
        store.update(|c| c.tracker_config("LHR-1").multiplier_override = 3.0);
        assert!((store.device_config("LHR-1").multiplier_override - 3.0).abs() < f32::EPSILON);
        store.update(|c| c.patterns[0].pattern = "Throb".into());
        assert_eq!(store.channel_configs()[0].pattern, PatternKind::Throb);
    }

    #[test]
    fn new_repairs_channel_list() {
        let store = ConfigStore::new(Config {
            patterns: Vec::new(),
            ..Config::default()
        });
        assert_eq!(store.snapshot().patterns.len(), 2);
    }

    #[test]
    fn save_writes_loadable_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hapbridge.toml");
        let store = ConfigStore::default();
        store.update(|c| c.tracker_config("LHR-2").routing_key = "/x".into());
        store.save(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let back = hapbridge_config::load_toml(&text).unwrap();
        assert_eq!(back.trackers["LHR-2"].routing_key, "/x");
    }
}
