//! Pulse compensation strategies.
//!
//! Some actuators silently truncate a pulse beyond a fixed length. A
//! `PulseCompensation` decides how much of a requested pulse to emit now and
//! how much to carry into the next tick, and converts milliseconds into the
//! device's native units. New device quirks are new implementations.

use crate::config::CompensationCfg;

/// How a requested pulse is split across ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulsePlan {
    /// Milliseconds to emit this tick.
    pub emit_ms: f32,
    /// Milliseconds left over for the following tick.
    pub carry_ms: f32,
}

pub trait PulseCompensation: Send + std::fmt::Debug {
    fn plan(&mut self, serial: &str, requested_ms: f32) -> PulsePlan;

    /// Native units per millisecond.
    fn unit_scale(&self) -> f32;

    /// Convert to native units, truncating only here.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn to_native_units(&self, ms: f32) -> u32 {
        let units = ms * self.unit_scale();
        if !units.is_finite() || units <= 0.0 {
            0
        } else if units >= u32::MAX as f32 {
            u32::MAX
        } else {
            units as u32
        }
    }
}

/// Emit everything requested.
#[derive(Debug, Clone, Copy)]
pub struct Uncapped {
    unit_scale: f32,
}

impl Uncapped {
    pub const fn new(unit_scale: f32) -> Self {
        Self { unit_scale }
    }
}

impl PulseCompensation for Uncapped {
    fn plan(&mut self, _serial: &str, requested_ms: f32) -> PulsePlan {
        PulsePlan {
            emit_ms: requested_ms.max(0.0),
            carry_ms: 0.0,
        }
    }

    fn unit_scale(&self) -> f32 {
        self.unit_scale
    }
}

/// Emit at most `cap_ms` per tick and carry the excess.
#[derive(Debug, Clone)]
pub struct DurationCap {
    cap_ms: f32,
    unit_scale: f32,
    warned: bool,
}

impl DurationCap {
    pub const fn new(cap_ms: f32, unit_scale: f32) -> Self {
        Self {
            cap_ms,
            unit_scale,
            warned: false,
        }
    }

    pub const fn cap_ms(&self) -> f32 {
        self.cap_ms
    }
}

impl PulseCompensation for DurationCap {
    fn plan(&mut self, serial: &str, requested_ms: f32) -> PulsePlan {
        let requested_ms = requested_ms.max(0.0);
        if requested_ms <= self.cap_ms {
            return PulsePlan {
                emit_ms: requested_ms,
                carry_ms: 0.0,
            };
        }
        if !self.warned {
            self.warned = true;
            tracing::warn!(
                serial,
                requested_ms,
                cap_ms = self.cap_ms,
                "pulse exceeds hardware limit; spreading the excess over following ticks"
            );
        }
        PulsePlan {
            emit_ms: self.cap_ms,
            carry_ms: requested_ms - self.cap_ms,
        }
    }

    fn unit_scale(&self) -> f32 {
        self.unit_scale
    }
}

/// Strategy for a device family.
pub fn for_profile(cfg: &CompensationCfg) -> Box<dyn PulseCompensation> {
    match cfg.cap_ms() {
        Some(cap_ms) if cap_ms > 0.0 => Box::new(DurationCap::new(cap_ms, cfg.unit_scale)),
        _ => Box::new(Uncapped::new(cfg.unit_scale)),
    }
}
