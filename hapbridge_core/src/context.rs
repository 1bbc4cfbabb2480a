//! Application context: the one place that owns the running pieces.
//!
//! Collaborators are injected at construction; `start` builds the supervisor
//! and attaches the devices the tracker reports, `stop` tears it down and
//! persists any settings created along the way.

use std::path::PathBuf;
use std::sync::Arc;

use hapbridge_traits::{Actuator, Clock, MonotonicClock, Tracker};

use crate::error::Result;
use crate::store::ConfigStore;
use crate::supervisor::{FeedbackSupervisor, RefreshReport};

pub struct BridgeContext {
    store: Arc<ConfigStore>,
    tracker: Arc<dyn Tracker>,
    actuator: Arc<dyn Actuator>,
    clock: Arc<dyn Clock + Send + Sync>,
    settings_path: Option<PathBuf>,
    supervisor: Option<FeedbackSupervisor>,
}

impl BridgeContext {
    pub fn new(
        store: Arc<ConfigStore>,
        tracker: Arc<dyn Tracker>,
        actuator: Arc<dyn Actuator>,
    ) -> Self {
        Self {
            store,
            tracker,
            actuator,
            clock: Arc::new(MonotonicClock::new()),
            settings_path: None,
            supervisor: None,
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Save settings here on `stop`.
    pub fn with_settings_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_path = Some(path.into());
        self
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    pub fn is_running(&self) -> bool {
        self.supervisor.is_some()
    }

    pub fn supervisor(&self) -> Option<&FeedbackSupervisor> {
        self.supervisor.as_ref()
    }

    /// Build the supervisor and attach current devices. Calling `start` on
    /// a running context only refreshes devices.
    pub fn start(&mut self) -> Result<RefreshReport> {
        if let Some(sup) = &self.supervisor {
            return sup.refresh_devices();
        }
        let sup = FeedbackSupervisor::builder()
            .with_tracker(self.tracker.clone())
            .with_actuator(self.actuator.clone())
            .with_config(self.store.clone())
            .with_clock(self.clock.clone())
            .build()?;
        let report = sup.refresh_devices()?;
        tracing::info!(devices = sup.serials().len(), "bridge started");
        self.supervisor = Some(sup);
        Ok(report)
    }

    /// Stop all loops and persist settings if a path was given.
    pub fn stop(&mut self) -> Result<()> {
        if let Some(sup) = self.supervisor.take() {
            sup.shutdown();
            tracing::info!("bridge stopped");
        }
        if let Some(path) = &self.settings_path {
            self.store.save(path)?;
        }
        Ok(())
    }
}

impl Drop for BridgeContext {
    fn drop(&mut self) {
        if let Some(sup) = self.supervisor.take() {
            sup.shutdown();
        }
    }
}
