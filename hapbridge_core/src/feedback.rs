//! Per-device feedback loop.
//!
//! `FeedbackLoop::step` runs one tick:
//!
//! 1. consume the latest target and accumulated delta from the slot
//! 2. battery gate: below threshold, emit a fading blink then fall silent
//! 3. optional staleness gate
//! 4. pattern engine, then device and user multipliers
//! 5. pulse length = strength × tick period
//! 6. merge with any forced pulse and with carry-over from the previous tick
//! 7. compensation strategy splits the pulse against the hardware cap
//! 8. convert to native units, truncating last
//! 9. emit through the actuator
//!
//! Hardware failures never escape a tick. They are logged and the tick
//! proceeds as if the strength were zero; the next tick is the retry.

use crate::compensation::{self, PulseCompensation};
use crate::config::{CompensationCfg, FeedbackCfg};
use crate::device::{Device, DeviceConfig};
use crate::error::FeedbackError;
use crate::hw_error::map_hw_error;
use crate::pattern;
use crate::slot::{TargetSample, TargetSlot};
use crate::store::ConfigProvider;
use crate::util::duration_ms_f32;
use hapbridge_traits::{Actuator, Clock, Tracker};
use std::sync::Arc;
use std::time::Instant;

/// Which gate, if any, decided this tick's strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Pattern and multipliers applied.
    Open,
    /// Battery below threshold; carries the blink counter after decrement.
    LowBattery { counter: u32 },
    /// No target within the staleness window.
    Stale,
    /// Battery could not be read, or the reading was not a fraction.
    BatteryUnavailable,
}

/// Outcome of one tick, for stats and tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub gate: Gate,
    /// Output strength before forced/carry merge (1.0 = full tick).
    pub strength: f32,
    /// Milliseconds requested after the merge, before compensation.
    pub requested_ms: f32,
    /// Native units handed to the actuator (0 when nothing was emitted).
    pub emitted_units: u32,
    /// Milliseconds carried into the next tick.
    pub carry_ms: f32,
}

#[derive(Debug)]
struct LoopState {
    blink_counter: u32,
    carry_ms: f32,
    battery_failing: bool,
    emit_failing: bool,
}

/// Shared collaborators handed to every loop.
#[derive(Clone)]
pub struct LoopDeps {
    pub tracker: Arc<dyn Tracker>,
    pub actuator: Arc<dyn Actuator>,
    pub config: Arc<dyn ConfigProvider>,
    pub clock: Arc<dyn Clock + Send + Sync>,
}

pub struct FeedbackLoop {
    device: Device,
    slot: Arc<TargetSlot>,
    deps: LoopDeps,
    cfg: FeedbackCfg,
    compensation: Box<dyn PulseCompensation>,
    /// Phase origin for throb waves; shared across devices by the supervisor.
    epoch: Instant,
    state: LoopState,
}

impl std::fmt::Debug for FeedbackLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedbackLoop")
            .field("serial", &self.device.serial)
            .field("handle", &self.device.handle)
            .field("compensation", &self.compensation)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl FeedbackLoop {
    pub fn new(
        device: Device,
        slot: Arc<TargetSlot>,
        deps: LoopDeps,
        cfg: FeedbackCfg,
        compensation: &CompensationCfg,
        epoch: Instant,
    ) -> Self {
        Self::with_compensation(
            device,
            slot,
            deps,
            cfg,
            compensation::for_profile(compensation),
            epoch,
        )
    }

    /// Use a custom compensation strategy.
    pub fn with_compensation(
        device: Device,
        slot: Arc<TargetSlot>,
        deps: LoopDeps,
        cfg: FeedbackCfg,
        compensation: Box<dyn PulseCompensation>,
        epoch: Instant,
    ) -> Self {
        let blinks = cfg.low_battery_blinks;
        Self {
            device,
            slot,
            deps,
            cfg,
            compensation,
            epoch,
            state: LoopState {
                blink_counter: blinks,
                carry_ms: 0.0,
                battery_failing: false,
                emit_failing: false,
            },
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn cfg(&self) -> &FeedbackCfg {
        &self.cfg
    }

    pub fn now(&self) -> Instant {
        self.deps.clock.now()
    }

    /// Run one tick.
    pub fn step(&mut self) -> TickReport {
        let now = self.deps.clock.now();
        let sample = self.slot.take_sample();
        let dev_cfg = self.deps.config.device_config(&self.device.serial);
        let period_ms = self.cfg.tick_ms();

        let (strength, gate) = self.output_strength(now, &sample, &dev_cfg);
        let computed_ms = strength * period_ms;

        // A forced pulse contributes at most one tick's worth per tick.
        let forced_ms = sample.forced_until.map_or(0.0, |until| {
            duration_ms_f32(until.saturating_duration_since(now)).min(period_ms)
        });
        let requested_ms = computed_ms.max(forced_ms).max(self.state.carry_ms);

        let plan = self.compensation.plan(&self.device.serial, requested_ms);
        self.state.carry_ms = plan.carry_ms;
        let units = self.compensation.to_native_units(plan.emit_ms);
        let emitted_units = if units > 0 { self.emit(units) } else { 0 };

        TickReport {
            gate,
            strength,
            requested_ms,
            emitted_units,
            carry_ms: self.state.carry_ms,
        }
    }

    fn output_strength(
        &mut self,
        now: Instant,
        sample: &TargetSample,
        dev_cfg: &DeviceConfig,
    ) -> (f32, Gate) {
        let reading = self
            .deps
            .tracker
            .battery_fraction(self.device.handle, self.cfg.hardware_timeout)
            .map_err(|e| map_hw_error(&*e))
            .and_then(|b| {
                if (0.0..=1.0).contains(&b) {
                    Ok(b)
                } else {
                    Err(FeedbackError::HardwareFault(format!(
                        "battery reading {b} outside [0, 1]"
                    )))
                }
            });
        let battery = match reading {
            Ok(b) => {
                if self.state.battery_failing {
                    self.state.battery_failing = false;
                    tracing::info!(serial = %self.device.serial, "battery readings recovered");
                }
                b
            }
            Err(err) => {
                if self.state.battery_failing {
                    tracing::debug!(serial = %self.device.serial, error = %err, "battery read failed");
                } else {
                    self.state.battery_failing = true;
                    tracing::warn!(serial = %self.device.serial, error = %err, "battery read failed; output muted until it recovers");
                }
                return (0.0, Gate::BatteryUnavailable);
            }
        };

        if battery < dev_cfg.battery_threshold() {
            let strength = self.blink();
            let counter = self.state.blink_counter;
            return (strength, Gate::LowBattery { counter });
        }
        if self.state.blink_counter != self.cfg.low_battery_blinks {
            tracing::info!(serial = %self.device.serial, battery, "battery above threshold again");
            self.state.blink_counter = self.cfg.low_battery_blinks;
        }

        if let Some(window) = self.cfg.stale_after() {
            let fresh = sample
                .last_set_at
                .is_some_and(|t| now.saturating_duration_since(t) <= window);
            if !fresh {
                return (0.0, Gate::Stale);
            }
        }

        let channels = self.deps.config.channel_configs();
        let t = self.deps.clock.secs_since(self.epoch);
        let shaped = pattern::combine(&channels, sample.target, sample.delta, t);
        let strength = shaped * self.device.pulse_multiplier * dev_cfg.multiplier_override;
        if strength.is_finite() {
            (strength.max(0.0), Gate::Open)
        } else {
            (0.0, Gate::Open)
        }
    }

    /// Fading low-battery signal: `counter / blinks` after each decrement,
    /// then zero once the counter is exhausted.
    #[allow(clippy::cast_precision_loss)]
    fn blink(&mut self) -> f32 {
        if self.state.blink_counter == self.cfg.low_battery_blinks {
            tracing::warn!(serial = %self.device.serial, "battery below threshold; haptics muted");
        }
        if self.state.blink_counter == 0 {
            return 0.0;
        }
        self.state.blink_counter -= 1;
        self.state.blink_counter as f32 / self.cfg.low_battery_blinks as f32
    }

    fn emit(&mut self, units: u32) -> u32 {
        match self
            .deps
            .actuator
            .emit_pulse(self.device.handle, units, self.cfg.hardware_timeout)
        {
            Ok(()) => {
                if self.state.emit_failing {
                    self.state.emit_failing = false;
                    tracing::info!(serial = %self.device.serial, "haptic pulses recovered");
                }
                units
            }
            Err(e) => {
                let err = map_hw_error(&*e);
                if self.state.emit_failing {
                    tracing::debug!(serial = %self.device.serial, error = %err, "haptic pulse failed");
                } else {
                    self.state.emit_failing = true;
                    tracing::warn!(serial = %self.device.serial, handle = self.device.handle, error = %err, "haptic pulse failed");
                }
                0
            }
        }
    }
}
