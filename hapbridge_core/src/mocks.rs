//! Minimal collaborators for wiring and tests.

use hapbridge_traits::{Actuator, DeviceDescriptor, DeviceHandle, Tracker};
use std::time::Duration;

/// A tracker with no devices whose batteries always read full.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTracker;

impl Tracker for NullTracker {
    fn list_devices(
        &self,
        _timeout: Duration,
    ) -> Result<Vec<DeviceDescriptor>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Vec::new())
    }

    fn battery_fraction(
        &self,
        _handle: DeviceHandle,
        _timeout: Duration,
    ) -> Result<f32, Box<dyn std::error::Error + Send + Sync>> {
        Ok(1.0)
    }
}

/// An actuator that accepts and discards every pulse.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullActuator;

impl Actuator for NullActuator {
    fn emit_pulse(
        &self,
        _handle: DeviceHandle,
        _length: u32,
        _timeout: Duration,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}
