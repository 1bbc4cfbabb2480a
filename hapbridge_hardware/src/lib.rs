//! Tracking backends for the haptic bridge.
//!
//! `SimulatedTracker` stands in for a VR tracking runtime: it lists a fixed
//! set of devices, reports settable battery levels, and records the most
//! recent pulses it is asked to emit. Failure injection and call latency let tests and the
//! CLI exercise the degraded paths of the feedback loop.
pub mod error;
pub mod util;

use crate::error::HwError;
use hapbridge_traits::{Actuator, DeviceDescriptor, DeviceHandle, Tracker};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// One pulse as seen by the simulated actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseRecord {
    pub handle: DeviceHandle,
    pub length: u32,
}

/// Pulses kept by default; older records are dropped first.
pub const DEFAULT_PULSE_LOG_CAPACITY: usize = 4096;

#[derive(Debug)]
struct SimState {
    devices: Vec<(DeviceDescriptor, f32)>,
    pulses: VecDeque<PulseRecord>,
    pulse_log_capacity: usize,
    fail_battery: bool,
    fail_pulse: bool,
    latency: Duration,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            pulses: VecDeque::new(),
            pulse_log_capacity: DEFAULT_PULSE_LOG_CAPACITY,
            fail_battery: false,
            fail_pulse: false,
            latency: Duration::ZERO,
        }
    }
}

/// Simulated tracking runtime. Clones share state, so one copy can be handed
/// to the supervisor while another drives the scenario.
#[derive(Debug, Clone, Default)]
pub struct SimulatedTracker {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_device(self, handle: DeviceHandle, model: &str, serial: &str, battery: f32) -> Self {
        self.add_device(handle, model, serial, battery);
        self
    }

    /// Keep at most `capacity` pulse records (at least one).
    pub fn with_pulse_log_capacity(self, capacity: usize) -> Self {
        {
            let mut st = self.state();
            st.pulse_log_capacity = capacity.max(1);
            let excess = st.pulses.len().saturating_sub(st.pulse_log_capacity);
            st.pulses.drain(..excess);
        }
        self
    }

    /// Connect a device. A device with the same serial is replaced.
    pub fn add_device(&self, handle: DeviceHandle, model: &str, serial: &str, battery: f32) {
        let mut st = self.state();
        st.devices.retain(|(d, _)| d.serial != serial);
        st.devices.push((
            DeviceDescriptor {
                handle,
                model: model.to_string(),
                serial: serial.to_string(),
            },
            battery.clamp(0.0, 1.0),
        ));
    }

    /// Disconnect a device by serial. Returns whether it was present.
    pub fn remove_device(&self, serial: &str) -> bool {
        let mut st = self.state();
        let before = st.devices.len();
        st.devices.retain(|(d, _)| d.serial != serial);
        st.devices.len() != before
    }

    pub fn set_battery(&self, handle: DeviceHandle, fraction: f32) {
        let mut st = self.state();
        if let Some((_, b)) = st.devices.iter_mut().find(|(d, _)| d.handle == handle) {
            *b = fraction.clamp(0.0, 1.0);
        }
    }

    /// Make every battery query fail until cleared.
    pub fn set_battery_failure(&self, fail: bool) {
        self.state().fail_battery = fail;
    }

    /// Make every pulse call fail until cleared.
    pub fn set_pulse_failure(&self, fail: bool) {
        self.state().fail_pulse = fail;
    }

    /// Delay applied to every call; exceeding the caller's timeout fails it.
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = latency;
    }

    /// Snapshot of the retained pulses, oldest first.
    pub fn pulses(&self) -> Vec<PulseRecord> {
        self.state().pulses.iter().copied().collect()
    }

    pub fn pulses_for(&self, handle: DeviceHandle) -> Vec<u32> {
        self.state()
            .pulses
            .iter()
            .filter(|p| p.handle == handle)
            .map(|p| p.length)
            .collect()
    }

    pub fn clear_pulses(&self) {
        self.state().pulses.clear();
    }

    fn latency(&self) -> Duration {
        self.state().latency
    }
}

impl Tracker for SimulatedTracker {
    fn list_devices(
        &self,
        timeout: Duration,
    ) -> Result<Vec<DeviceDescriptor>, Box<dyn std::error::Error + Send + Sync>> {
        util::simulate_call_latency(self.latency(), timeout)?;
        Ok(self.state().devices.iter().map(|(d, _)| d.clone()).collect())
    }

    fn battery_fraction(
        &self,
        handle: DeviceHandle,
        timeout: Duration,
    ) -> Result<f32, Box<dyn std::error::Error + Send + Sync>> {
        util::simulate_call_latency(self.latency(), timeout)?;
        let st = self.state();
        if st.fail_battery {
            return Err(Box::new(HwError::Unavailable("battery query failed".into())));
        }
        st.devices
            .iter()
            .find(|(d, _)| d.handle == handle)
            .map(|(_, b)| *b)
            .ok_or_else(|| HwError::UnknownDevice(handle).into())
    }
}

impl Actuator for SimulatedTracker {
    fn emit_pulse(
        &self,
        handle: DeviceHandle,
        length: u32,
        timeout: Duration,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if length == 0 {
            return Ok(());
        }
        util::simulate_call_latency(self.latency(), timeout)?;
        let mut st = self.state();
        if st.fail_pulse {
            return Err(Box::new(HwError::Unavailable("haptic pulse rejected".into())));
        }
        if !st.devices.iter().any(|(d, _)| d.handle == handle) {
            return Err(Box::new(HwError::UnknownDevice(handle)));
        }
        tracing::trace!(handle, length, "simulated haptic pulse");
        if st.pulses.len() >= st.pulse_log_capacity {
            st.pulses.pop_front();
        }
        st.pulses.push_back(PulseRecord { handle, length });
        Ok(())
    }
}
