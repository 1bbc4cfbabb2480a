//! Runtime configuration types for the feedback loops.
//!
//! These are separate from the TOML-deserialized settings in
//! `hapbridge_config`; see `conversions` for the mapping.

use std::time::Duration;

/// Timing and gating knobs shared by every device loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackCfg {
    /// Nominal tick period.
    pub tick: Duration,
    /// Starting value of the low-battery blink counter.
    pub low_battery_blinks: u32,
    /// Zero the output when no target arrived within this many ticks (0 disables).
    pub stale_after_ticks: u32,
    /// Timeout handed to every battery and pulse call.
    pub hardware_timeout: Duration,
}

impl Default for FeedbackCfg {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(50),
            low_battery_blinks: 8,
            stale_after_ticks: 0,
            hardware_timeout: Duration::from_millis(10),
        }
    }
}

impl FeedbackCfg {
    /// Tick period in fractional milliseconds.
    pub fn tick_ms(&self) -> f32 {
        crate::util::duration_ms_f32(self.tick)
    }

    /// Age after which a target counts as stale, when the gate is enabled.
    pub fn stale_after(&self) -> Option<Duration> {
        (self.stale_after_ticks > 0).then(|| self.tick.saturating_mul(self.stale_after_ticks))
    }
}

/// Pulse unit conversion and duration limit for one device family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompensationCfg {
    /// Native pulse units per millisecond (1.0 = milliseconds).
    pub unit_scale: f32,
    /// Longest single pulse in native units; `None` means uncapped.
    pub cap_units: Option<u32>,
}

impl Default for CompensationCfg {
    fn default() -> Self {
        Self {
            unit_scale: 1.0,
            cap_units: None,
        }
    }
}

impl CompensationCfg {
    /// Cap expressed in milliseconds.
    #[allow(clippy::cast_precision_loss)]
    pub fn cap_ms(&self) -> Option<f32> {
        self.cap_units.map(|u| u as f32 / self.unit_scale)
    }
}

/// Ordered model-prefix table; the first matching prefix wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HardwareProfiles {
    pub profiles: Vec<(String, CompensationCfg)>,
}

impl HardwareProfiles {
    pub fn for_model(&self, model: &str) -> CompensationCfg {
        self.profiles
            .iter()
            .find(|(prefix, _)| model.starts_with(prefix.as_str()))
            .map(|(_, c)| *c)
            .unwrap_or_default()
    }
}
