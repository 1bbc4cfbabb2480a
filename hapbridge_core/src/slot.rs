//! Producer/consumer slot between routed values and one device's tick.
//!
//! The supervisor writes targets at whatever rate values arrive; the loop
//! consumes a sample once per tick. One mutex per device, never shared
//! across devices.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

#[derive(Debug, Default)]
struct SlotState {
    target: f32,
    delta_acc: f32,
    last_set_at: Option<Instant>,
    forced_until: Option<Instant>,
}

/// What one tick sees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetSample {
    pub target: f32,
    /// Signed change in target since the previous tick consumed it.
    pub delta: f32,
    pub last_set_at: Option<Instant>,
    pub forced_until: Option<Instant>,
}

#[derive(Debug, Default)]
pub struct TargetSlot {
    inner: Mutex<SlotState>,
}

impl TargetSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SlotState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a new target. The first update establishes the baseline and
    /// contributes no delta.
    pub fn set_target(&self, value: f32, now: Instant) {
        let mut st = self.state();
        if st.last_set_at.is_some() {
            st.delta_acc += value - st.target;
        }
        st.target = value;
        st.last_set_at = Some(now);
    }

    /// Request a pulse lasting until `until`. An earlier request that ends
    /// later is kept.
    pub fn force_until(&self, until: Instant) {
        let mut st = self.state();
        st.forced_until = Some(st.forced_until.map_or(until, |cur| cur.max(until)));
    }

    /// Snapshot for one tick. The accumulated delta is consumed.
    pub fn take_sample(&self) -> TargetSample {
        let mut st = self.state();
        TargetSample {
            target: st.target,
            delta: std::mem::take(&mut st.delta_acc),
            last_set_at: st.last_set_at,
            forced_until: st.forced_until,
        }
    }
}
