//! Device identity and per-device user settings.

use hapbridge_traits::{DeviceDescriptor, DeviceHandle};

/// A tracked device. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub handle: DeviceHandle,
    pub model: String,
    pub serial: String,
    /// Fixed scale derived from the model; see `multiplier_for_model`.
    pub pulse_multiplier: f32,
}

impl Device {
    pub fn new(handle: DeviceHandle, model: &str, serial: &str) -> Self {
        Self {
            handle,
            model: model.to_string(),
            serial: serial.to_string(),
            pulse_multiplier: Self::multiplier_for_model(model),
        }
    }

    /// Controllers take pulse lengths on a 100x coarser scale than trackers.
    pub fn multiplier_for_model(model: &str) -> f32 {
        if model.starts_with("VIVE Controller") {
            100.0
        } else {
            1.0
        }
    }
}

impl From<&DeviceDescriptor> for Device {
    fn from(d: &DeviceDescriptor) -> Self {
        Self::new(d.handle, &d.model, &d.serial)
    }
}

/// User settings for one device serial.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    /// Disabled devices receive no routed values.
    pub enabled: bool,
    pub routing_key: String,
    pub multiplier_override: f32,
    /// Carried through from the settings file; not applied.
    pub pattern_override: String,
    pub battery_threshold_percent: u8,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        (&hapbridge_config::TrackerCfg::default()).into()
    }
}

impl DeviceConfig {
    /// Battery fraction below which output is gated.
    pub fn battery_threshold(&self) -> f32 {
        f32::from(self.battery_threshold_percent) / 100.0
    }
}
