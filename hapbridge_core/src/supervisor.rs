//! Owns one feedback worker per device serial and routes inbound values.
//!
//! Routing holds the device map lock only long enough to hand values to the
//! matching slots. Removing a device takes its worker out of the map first
//! and joins the thread afterwards, so routing never waits on a join.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use eyre::WrapErr;
use hapbridge_traits::{Actuator, Clock, DeviceHandle, MonotonicClock, Tracker};

use crate::config::{FeedbackCfg, HardwareProfiles};
use crate::device::Device;
use crate::error::{BuildError, FeedbackError, Result};
use crate::feedback::{FeedbackLoop, LoopDeps};
use crate::hw_error::map_hw_error;
use crate::slot::TargetSlot;
use crate::store::{ConfigProvider, ConfigStore};
use crate::worker::{FeedbackWorker, LoopStatsSnapshot};

struct DeviceEntry {
    device: Device,
    slot: Arc<TargetSlot>,
    worker: FeedbackWorker,
}

/// Devices attached and detached by one `refresh_devices` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

pub struct FeedbackSupervisor {
    deps: LoopDeps,
    store: Arc<ConfigStore>,
    feedback: FeedbackCfg,
    profiles: HardwareProfiles,
    model_filter: Vec<String>,
    epoch: Instant,
    devices: Mutex<HashMap<String, DeviceEntry>>,
}

impl std::fmt::Debug for FeedbackSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedbackSupervisor")
            .field("devices", &self.serials())
            .field("feedback", &self.feedback)
            .finish_non_exhaustive()
    }
}

impl FeedbackSupervisor {
    /// Start building a supervisor.
    pub fn builder() -> SupervisorBuilder<Missing, Missing> {
        SupervisorBuilder::default()
    }

    fn devices(&self) -> MutexGuard<'_, HashMap<String, DeviceEntry>> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    pub fn feedback_cfg(&self) -> &FeedbackCfg {
        &self.feedback
    }

    /// Attach a device and start its loop. Returns false if the serial is
    /// already attached.
    pub fn add_device(&self, handle: DeviceHandle, model: &str, serial: &str) -> Result<bool> {
        let mut devices = self.devices();
        if devices.contains_key(serial) {
            tracing::debug!(serial, handle, "device already attached");
            return Ok(false);
        }
        let device = Device::new(handle, model, serial);
        let slot = Arc::new(TargetSlot::new());
        let compensation = self.profiles.for_model(model);
        let fl = FeedbackLoop::new(
            device.clone(),
            slot.clone(),
            self.deps.clone(),
            self.feedback.clone(),
            &compensation,
            self.epoch,
        );
        let worker = FeedbackWorker::spawn(fl)
            .map_err(|e| FeedbackError::State(e.to_string()))
            .wrap_err_with(|| format!("spawn feedback loop for {serial}"))?;
        tracing::info!(
            serial,
            handle,
            model,
            multiplier = device.pulse_multiplier,
            cap_units = ?compensation.cap_units,
            "device attached"
        );
        devices.insert(
            serial.to_string(),
            DeviceEntry {
                device,
                slot,
                worker,
            },
        );
        Ok(true)
    }

    /// Stop and forget a device. Returns false if it was not attached.
    ///
    /// The worker is joined before this returns, so no pulse for the device
    /// is emitted afterwards.
    pub fn remove_device(&self, serial: &str) -> bool {
        let entry = self.devices().remove(serial);
        match entry {
            Some(entry) => {
                drop(entry);
                tracing::info!(serial, "device detached");
                true
            }
            None => false,
        }
    }

    /// Set the target intensity for one device.
    pub fn set_target(&self, serial: &str, value: f32) -> Result<()> {
        if !value.is_finite() {
            tracing::debug!(serial, value, "dropping non-finite target");
            return Ok(());
        }
        let devices = self.devices();
        let entry = devices
            .get(serial)
            .ok_or_else(|| FeedbackError::UnknownDevice(serial.to_string()))?;
        entry.slot.set_target(value, self.deps.clock.now());
        Ok(())
    }

    /// Request a pulse of `duration_ms` on one device, e.g. to identify it.
    pub fn force_pulse(&self, serial: &str, duration_ms: u32) -> Result<()> {
        let devices = self.devices();
        let entry = devices
            .get(serial)
            .ok_or_else(|| FeedbackError::UnknownDevice(serial.to_string()))?;
        let until = self.deps.clock.now() + Duration::from_millis(u64::from(duration_ms));
        entry.slot.force_until(until);
        tracing::info!(serial, duration_ms, "forced pulse requested");
        Ok(())
    }

    /// Route a value to every enabled device whose routing key matches.
    /// Returns how many devices received it.
    pub fn on_value(&self, routing_key: &str, value: f32) -> usize {
        if !value.is_finite() {
            tracing::debug!(routing_key, value, "dropping non-finite value");
            return 0;
        }
        let now = self.deps.clock.now();
        let devices = self.devices();
        let mut routed = 0;
        for (serial, entry) in devices.iter() {
            let cfg = self.deps.config.device_config(serial);
            if cfg.enabled && cfg.routing_key == routing_key {
                entry.slot.set_target(value, now);
                routed += 1;
            }
        }
        if routed == 0 {
            tracing::trace!(routing_key, "no device for routing key");
        }
        routed
    }

    /// Route a textual value; anything that does not parse as a number is dropped.
    pub fn on_raw_value(&self, routing_key: &str, raw: &str) -> usize {
        match raw.trim().parse::<f32>() {
            Ok(v) => self.on_value(routing_key, v),
            Err(e) => {
                tracing::debug!(routing_key, raw, error = %e, "dropping unparsable value");
                0
            }
        }
    }

    /// Reconcile attached devices with what the tracker reports.
    pub fn refresh_devices(&self) -> Result<RefreshReport> {
        let listed = self
            .deps
            .tracker
            .list_devices(self.feedback.hardware_timeout)
            .map_err(|e| map_hw_error(&*e))
            .wrap_err("list devices")?;
        let wanted: Vec<_> = listed
            .into_iter()
            .filter(|d| {
                self.model_filter.is_empty()
                    || self
                        .model_filter
                        .iter()
                        .any(|p| d.model.starts_with(p.as_str()))
            })
            .collect();

        let mut report = RefreshReport::default();
        let gone: Vec<String> = self
            .devices()
            .keys()
            .filter(|s| !wanted.iter().any(|d| &d.serial == *s))
            .cloned()
            .collect();
        for serial in gone {
            if self.remove_device(&serial) {
                report.removed.push(serial);
            }
        }
        for d in &wanted {
            if self.add_device(d.handle, &d.model, &d.serial)? {
                report.added.push(d.serial.clone());
            }
        }
        Ok(report)
    }

    pub fn serials(&self) -> Vec<String> {
        let mut v: Vec<_> = self.devices().keys().cloned().collect();
        v.sort();
        v
    }

    pub fn device(&self, serial: &str) -> Option<Device> {
        self.devices().get(serial).map(|e| e.device.clone())
    }

    pub fn stats(&self, serial: &str) -> Option<LoopStatsSnapshot> {
        self.devices().get(serial).map(|e| e.worker.stats())
    }

    pub fn all_stats(&self) -> Vec<(String, LoopStatsSnapshot)> {
        let mut v: Vec<_> = self
            .devices()
            .iter()
            .map(|(s, e)| (s.clone(), e.worker.stats()))
            .collect();
        v.sort_by(|a, b| a.0.cmp(&b.0));
        v
    }

    /// Stop every loop. Workers are joined outside the map lock.
    pub fn shutdown(&self) {
        let drained: Vec<DeviceEntry> = self.devices().drain().map(|(_, e)| e).collect();
        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "stopping feedback loops");
        }
        drop(drained);
    }
}

impl Drop for FeedbackSupervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ── Type-state builder ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for `FeedbackSupervisor`. Tracker and actuator are required;
/// everything else has defaults.
pub struct SupervisorBuilder<T, A> {
    tracker: Option<Arc<dyn Tracker>>,
    actuator: Option<Arc<dyn Actuator>>,
    store: Option<Arc<ConfigStore>>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    feedback: Option<FeedbackCfg>,
    _t: PhantomData<T>,
    _a: PhantomData<A>,
}

impl Default for SupervisorBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            tracker: None,
            actuator: None,
            store: None,
            clock: None,
            feedback: None,
            _t: PhantomData,
            _a: PhantomData,
        }
    }
}

impl<T, A> SupervisorBuilder<T, A> {
    fn retype<T2, A2>(self) -> SupervisorBuilder<T2, A2> {
        SupervisorBuilder {
            tracker: self.tracker,
            actuator: self.actuator,
            store: self.store,
            clock: self.clock,
            feedback: self.feedback,
            _t: PhantomData,
            _a: PhantomData,
        }
    }

    pub fn with_tracker(mut self, tracker: impl Tracker + 'static) -> SupervisorBuilder<Set, A> {
        self.tracker = Some(Arc::new(tracker));
        self.retype()
    }

    pub fn with_actuator(
        mut self,
        actuator: impl Actuator + 'static,
    ) -> SupervisorBuilder<T, Set> {
        self.actuator = Some(Arc::new(actuator));
        self.retype()
    }

    /// Use a shared settings store. Defaults to an in-memory default config.
    pub fn with_config(mut self, store: Arc<ConfigStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Override the loop timing read from the store.
    pub fn with_feedback(mut self, feedback: FeedbackCfg) -> Self {
        self.feedback = Some(feedback);
        self
    }

    /// Build with runtime checks; always available.
    pub fn try_build(self) -> Result<FeedbackSupervisor> {
        let tracker = self.tracker.ok_or(BuildError::MissingTracker)?;
        let actuator = self.actuator.ok_or(BuildError::MissingActuator)?;
        let store = self.store.unwrap_or_default();
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        let feedback = self.feedback.unwrap_or_else(|| store.feedback_cfg());
        if feedback.tick.is_zero() {
            return Err(BuildError::InvalidConfig("tick period must be > 0").into());
        }
        if feedback.low_battery_blinks == 0 {
            return Err(BuildError::InvalidConfig("low_battery_blinks must be >= 1").into());
        }
        let config: Arc<dyn ConfigProvider> = store.clone();
        let epoch = clock.now();
        Ok(FeedbackSupervisor {
            deps: LoopDeps {
                tracker,
                actuator,
                config,
                clock,
            },
            profiles: store.hardware_profiles(),
            model_filter: store.model_filter(),
            store,
            feedback,
            epoch,
            devices: Mutex::new(HashMap::new()),
        })
    }
}

impl SupervisorBuilder<Set, Set> {
    pub fn build(self) -> Result<FeedbackSupervisor> {
        self.try_build()
    }
}
