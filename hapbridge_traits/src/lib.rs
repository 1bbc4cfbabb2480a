//! Collaborator contracts for the haptic bridge.
//!
//! The feedback core never talks to a tracking runtime directly. It goes
//! through `Tracker` (identity and battery) and `Actuator` (pulses), both of
//! which take a timeout so that a slow backend degrades into a failed call
//! instead of a stalled tick.
pub mod clock;

pub use clock::{Clock, MonotonicClock};

use std::time::Duration;

/// Opaque per-session handle the tracking runtime uses to address a device.
pub type DeviceHandle = u32;

/// Identity of one tracked device as reported by the tracking runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub handle: DeviceHandle,
    pub model: String,
    pub serial: String,
}

pub trait Tracker: Send + Sync {
    /// Enumerate the devices currently connected.
    fn list_devices(
        &self,
        timeout: Duration,
    ) -> Result<Vec<DeviceDescriptor>, Box<dyn std::error::Error + Send + Sync>>;

    /// Battery charge in `[0, 1]`.
    fn battery_fraction(
        &self,
        handle: DeviceHandle,
        timeout: Duration,
    ) -> Result<f32, Box<dyn std::error::Error + Send + Sync>>;
}

pub trait Actuator: Send + Sync {
    /// Trigger one haptic pulse of `length` device-native units.
    /// Implementations must ignore a zero length.
    fn emit_pulse(
        &self,
        handle: DeviceHandle,
        length: u32,
        timeout: Duration,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl<T: Tracker + ?Sized> Tracker for std::sync::Arc<T> {
    fn list_devices(
        &self,
        timeout: Duration,
    ) -> Result<Vec<DeviceDescriptor>, Box<dyn std::error::Error + Send + Sync>> {
        (**self).list_devices(timeout)
    }

    fn battery_fraction(
        &self,
        handle: DeviceHandle,
        timeout: Duration,
    ) -> Result<f32, Box<dyn std::error::Error + Send + Sync>> {
        (**self).battery_fraction(handle, timeout)
    }
}

impl<T: Actuator + ?Sized> Actuator for std::sync::Arc<T> {
    fn emit_pulse(
        &self,
        handle: DeviceHandle,
        length: u32,
        timeout: Duration,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).emit_pulse(handle, length, timeout)
    }
}
