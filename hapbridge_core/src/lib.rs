#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Haptic feedback core (hardware-agnostic).
//!
//! Turns a stream of `(routing key, intensity)` values into timed haptic
//! pulses, one independent fixed-cadence loop per tracked device. All
//! hardware access goes through `hapbridge_traits::Tracker` and
//! `hapbridge_traits::Actuator`.
//!
//! ## Architecture
//!
//! - **Pattern engine**: proximity and velocity shaping channels (`pattern`)
//! - **Compensation**: per-model pulse caps and unit conversion (`compensation`)
//! - **Feedback loop**: one tick of gating, shaping and emission (`feedback`)
//! - **Worker**: the thread that ticks a loop at its period (`worker`)
//! - **Supervisor**: device lifecycle and value routing (`supervisor`)
//! - **Context**: explicit ownership of the running pieces (`context`)

pub mod atomic;
pub mod compensation;
pub mod config;
pub mod context;
pub mod conversions;
pub mod device;
pub mod error;
pub mod feedback;
pub mod hw_error;
pub mod mocks;
pub mod pattern;
pub mod slot;
pub mod store;
pub mod supervisor;
pub mod util;
pub mod worker;

pub use config::{CompensationCfg, FeedbackCfg, HardwareProfiles};
pub use context::BridgeContext;
pub use device::{Device, DeviceConfig};
pub use error::{BuildError, FeedbackError, Result};
pub use feedback::{FeedbackLoop, Gate, LoopDeps, TickReport};
pub use pattern::{Channel, ChannelConfig, PatternKind};
pub use store::{ConfigProvider, ConfigStore};
pub use supervisor::{FeedbackSupervisor, RefreshReport};
pub use worker::{FeedbackWorker, LoopStatsSnapshot};
