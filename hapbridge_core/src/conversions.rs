//! Conversions from `hapbridge_config` settings to runtime types.
//!
//! Validation rejects unknown pattern names when a file is loaded. Settings
//! that reach the runtime without passing validation fall back to channel
//! defaults instead of failing the loop.

use crate::config::{CompensationCfg, FeedbackCfg, HardwareProfiles};
use crate::device::DeviceConfig;
use crate::pattern::{Channel, ChannelConfig, PatternKind, UnknownPattern};
use std::time::Duration;

// ── FeedbackCfg ──────────────────────────────────────────────────────────────

impl From<&hapbridge_config::Feedback> for FeedbackCfg {
    fn from(c: &hapbridge_config::Feedback) -> Self {
        Self {
            tick: Duration::from_millis(c.tick_ms.max(1)),
            low_battery_blinks: c.low_battery_blinks.max(1),
            stale_after_ticks: c.stale_after_ticks,
            hardware_timeout: Duration::from_millis(c.hardware_timeout_ms),
        }
    }
}

// ── Hardware profiles ────────────────────────────────────────────────────────

impl From<&hapbridge_config::HardwareProfile> for CompensationCfg {
    fn from(p: &hapbridge_config::HardwareProfile) -> Self {
        Self {
            unit_scale: p.unit_scale,
            cap_units: (p.pulse_cap_units > 0).then_some(p.pulse_cap_units),
        }
    }
}

impl From<&hapbridge_config::Hardware> for HardwareProfiles {
    fn from(h: &hapbridge_config::Hardware) -> Self {
        Self {
            profiles: h
                .profiles
                .iter()
                .map(|p| (p.model_prefix.clone(), p.into()))
                .collect(),
        }
    }
}

// ── Device settings ──────────────────────────────────────────────────────────

impl From<&hapbridge_config::TrackerCfg> for DeviceConfig {
    fn from(t: &hapbridge_config::TrackerCfg) -> Self {
        Self {
            enabled: t.enabled,
            routing_key: t.routing_key.clone(),
            multiplier_override: if t.multiplier_override.is_finite() {
                t.multiplier_override.max(0.0)
            } else {
                1.0
            },
            pattern_override: t.pattern_override.clone(),
            battery_threshold_percent: t.battery_threshold.min(100),
        }
    }
}

// ── Channels ─────────────────────────────────────────────────────────────────

impl TryFrom<&hapbridge_config::PatternCfg> for ChannelConfig {
    type Error = UnknownPattern;

    fn try_from(p: &hapbridge_config::PatternCfg) -> Result<Self, Self::Error> {
        let pattern: PatternKind = p.pattern.parse()?;
        let strength_max = p.strength_max.min(100);
        Ok(Self {
            pattern,
            strength_min: p.strength_min.min(strength_max),
            strength_max,
            speed: p.speed.clamp(1, 32),
        })
    }
}

/// The proximity/velocity pair, with defaults for anything missing or malformed.
pub fn channels_from_cfg(patterns: &[hapbridge_config::PatternCfg]) -> [ChannelConfig; 2] {
    if patterns.len() != 2 {
        tracing::warn!(
            count = patterns.len(),
            "expected exactly two pattern channels; using defaults"
        );
        return [
            ChannelConfig::default_proximity(),
            ChannelConfig::default_velocity(),
        ];
    }
    let one = |idx: usize, channel: Channel| match ChannelConfig::try_from(&patterns[idx]) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, channel = ?channel, "invalid channel pattern; using default");
            ChannelConfig::default_for(channel)
        }
    };
    [one(0, Channel::Proximity), one(1, Channel::Velocity)]
}
