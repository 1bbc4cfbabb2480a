//! Pattern engine: turns a raw intensity and its per-tick change into a
//! normalized output strength.
//!
//! Two channels are evaluated every tick. Proximity shapes the raw value,
//! velocity shapes the magnitude of its change. Each channel's pattern value
//! is then mapped into the channel's `[strength_min, strength_max]` band and
//! the two results are combined by maximum.
//!
//! The band floor only applies to a non-zero pattern value, so a silent input
//! stays silent even when `strength_min > 0`.

use std::f32::consts::PI;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternKind {
    None,
    Constant,
    Linear,
    Sine,
    Throb,
}

impl PatternKind {
    pub const ALL: [Self; 5] = [
        Self::None,
        Self::Constant,
        Self::Linear,
        Self::Sine,
        Self::Throb,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Constant => "Constant",
            Self::Linear => "Linear",
            Self::Sine => "Sine",
            Self::Throb => "Throb",
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown pattern '{0}'")]
pub struct UnknownPattern(pub String);

impl FromStr for PatternKind {
    type Err = UnknownPattern;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownPattern(s.to_string()))
    }
}

/// Which shaping pipeline a `ChannelConfig` feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Proximity,
    Velocity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    pub pattern: PatternKind,
    /// Band floor in percent, reached only by a non-zero pattern value.
    pub strength_min: u8,
    /// Band ceiling in percent.
    pub strength_max: u8,
    /// Throb rate; one 0→1→0 ramp lasts `2 / speed` seconds.
    pub speed: u8,
}

impl ChannelConfig {
    pub const fn new(pattern: PatternKind, strength_min: u8, strength_max: u8, speed: u8) -> Self {
        Self {
            pattern,
            strength_min,
            strength_max,
            speed,
        }
    }

    pub const fn default_proximity() -> Self {
        Self::new(PatternKind::Linear, 0, 80, 4)
    }

    pub const fn default_velocity() -> Self {
        Self::new(PatternKind::None, 40, 80, 16)
    }

    pub const fn default_for(channel: Channel) -> Self {
        match channel {
            Channel::Proximity => Self::default_proximity(),
            Channel::Velocity => Self::default_velocity(),
        }
    }
}

/// `-(cos(π·x) - 1) / 2` over `x` clamped to `[0, 1]`.
#[inline]
pub fn ease_in_out_sine(x: f32) -> f32 {
    let x = x.clamp(0.0, 1.0);
    -((PI * x).cos() - 1.0) / 2.0
}

/// Triangle wave in `[0, 1]` with period `2 / speed` seconds.
#[allow(clippy::cast_possible_truncation)]
#[inline]
pub fn triangle_wave(speed: f32, t_secs: f64) -> f32 {
    let r = (t_secs * f64::from(speed)).rem_euclid(2.0);
    let v = if r <= 1.0 { r } else { 2.0 - r };
    v as f32
}

/// Map a pattern value into the `[min, max]` percent band.
/// Exactly zero stays zero.
#[inline]
pub fn map_to_band(value: f32, strength_min: u8, strength_max: u8) -> f32 {
    if value == 0.0 {
        return 0.0;
    }
    let lo = f32::from(strength_min) / 100.0;
    let hi = f32::from(strength_max) / 100.0;
    value.mul_add(hi - lo, lo)
}

/// Pattern value before band mapping.
pub fn shape(channel: Channel, cfg: &ChannelConfig, raw_value: f32, raw_delta: f32, t_secs: f64) -> f32 {
    let input = match channel {
        Channel::Proximity => raw_value,
        Channel::Velocity => raw_delta.abs(),
    };
    match cfg.pattern {
        PatternKind::None => 0.0,
        PatternKind::Constant => {
            let active = match channel {
                Channel::Proximity => raw_value > 0.0,
                Channel::Velocity => raw_delta != 0.0,
            };
            if active { 1.0 } else { 0.0 }
        }
        PatternKind::Linear => input,
        PatternKind::Sine => ease_in_out_sine(input),
        PatternKind::Throb => triangle_wave(f32::from(cfg.speed), t_secs) * input,
    }
}

/// One channel's output strength, never negative.
pub fn compute(channel: Channel, cfg: &ChannelConfig, raw_value: f32, raw_delta: f32, t_secs: f64) -> f32 {
    let p = shape(channel, cfg, raw_value, raw_delta, t_secs);
    let mapped = map_to_band(p, cfg.strength_min, cfg.strength_max);
    if mapped.is_finite() { mapped.max(0.0) } else { 0.0 }
}

/// Both channels combined by maximum. `channels[0]` is proximity.
pub fn combine(channels: &[ChannelConfig; 2], raw_value: f32, raw_delta: f32, t_secs: f64) -> f32 {
    let proximity = compute(Channel::Proximity, &channels[0], raw_value, raw_delta, t_secs);
    let velocity = compute(Channel::Velocity, &channels[1], raw_value, raw_delta, t_secs);
    proximity.max(velocity)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-6;

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("Throb".parse::<PatternKind>(), Ok(PatternKind::Throb));
        assert_eq!(" sine ".parse::<PatternKind>(), Ok(PatternKind::Sine));
        assert_eq!(
            "Wobble".parse::<PatternKind>(),
            Err(UnknownPattern("Wobble".into()))
        );
    }

    #[test]
    fn every_config_name_parses() {
        for name in hapbridge_config::PATTERN_NAMES {
            let kind: PatternKind = name.parse().unwrap();
            assert_eq!(kind.name(), name);
        }
    }

    #[test]
    fn velocity_sign_only_matters_for_constant() {
        let linear = ChannelConfig::new(PatternKind::Linear, 0, 100, 1);
        assert!((shape(Channel::Velocity, &linear, 0.0, -0.3, 0.0) - 0.3).abs() < EPS);

        let constant = ChannelConfig::new(PatternKind::Constant, 0, 100, 1);
        assert_eq!(shape(Channel::Velocity, &constant, 0.0, -0.01, 0.0), 1.0);
        assert_eq!(shape(Channel::Velocity, &constant, 0.7, 0.0, 0.0), 0.0);
    }

    #[test]
    fn proximity_constant_requires_positive_input() {
        let constant = ChannelConfig::new(PatternKind::Constant, 0, 100, 1);
        assert_eq!(shape(Channel::Proximity, &constant, -0.5, 0.0, 0.0), 0.0);
        assert_eq!(shape(Channel::Proximity, &constant, 0.01, 0.0, 0.0), 1.0);
    }

    #[test]
    fn sine_clamps_input() {
        assert!((ease_in_out_sine(0.5) - 0.5).abs() < EPS);
        assert_eq!(ease_in_out_sine(-2.0), 0.0);
        assert!((ease_in_out_sine(3.0) - 1.0).abs() < EPS);
    }

    #[test]
    fn negative_proximity_never_yields_negative_strength() {
        let linear = ChannelConfig::new(PatternKind::Linear, 20, 80, 1);
        assert_eq!(compute(Channel::Proximity, &linear, -5.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn combine_takes_the_larger_channel() {
        let channels = [
            ChannelConfig::new(PatternKind::Linear, 0, 100, 1),
            ChannelConfig::new(PatternKind::Constant, 40, 90, 1),
        ];
        // Proximity 0.2 vs velocity constant -> 0.9 band ceiling
        assert!((combine(&channels, 0.2, 0.05, 0.0) - 0.9).abs() < EPS);
        // No change: velocity silent, proximity wins
        assert!((combine(&channels, 0.2, 0.0, 0.0) - 0.2).abs() < EPS);
    }
}
