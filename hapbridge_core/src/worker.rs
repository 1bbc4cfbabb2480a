//! Background thread driving one `FeedbackLoop` at a fixed cadence.
//!
//! Each tick records its start, runs `step`, then waits for
//! `max(period - elapsed, 0)` on a stop channel. Ticks self-correct for
//! processing jitter but never run faster than the period.
//!
//! Safety: each `FeedbackWorker` owns exactly one thread, which is signalled
//! and joined when the worker is dropped. Once drop returns, the loop will
//! not emit again.
use crate::feedback::FeedbackLoop;
use crate::util::{rate_hz, remaining_in_period};
use crossbeam_channel as xch;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Lock-free counters updated by the worker thread.
#[derive(Debug, Default)]
pub struct LoopStats {
    ticks: AtomicU64,
    overruns: AtomicU64,
    pulses: AtomicU64,
    max_tick_us: AtomicU64,
    total_tick_us: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStatsSnapshot {
    pub ticks: u64,
    /// Ticks whose processing took longer than the period.
    pub overruns: u64,
    pub pulses: u64,
    pub max_tick_us: u64,
    pub avg_tick_us: u64,
}

impl LoopStats {
    pub fn record(&self, elapsed: Duration, period: Duration, emitted: bool) {
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.total_tick_us.fetch_add(us, Ordering::Relaxed);
        self.max_tick_us.fetch_max(us, Ordering::Relaxed);
        if elapsed > period {
            self.overruns.fetch_add(1, Ordering::Relaxed);
        }
        if emitted {
            self.pulses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> LoopStatsSnapshot {
        let ticks = self.ticks.load(Ordering::Relaxed);
        let total = self.total_tick_us.load(Ordering::Relaxed);
        LoopStatsSnapshot {
            ticks,
            overruns: self.overruns.load(Ordering::Relaxed),
            pulses: self.pulses.load(Ordering::Relaxed),
            max_tick_us: self.max_tick_us.load(Ordering::Relaxed),
            avg_tick_us: total.checked_div(ticks).unwrap_or(0),
        }
    }
}

pub struct FeedbackWorker {
    serial: String,
    stop_tx: Option<xch::Sender<()>>,
    stats: Arc<LoopStats>,
    /// Join handle for graceful thread cleanup
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl FeedbackWorker {
    pub fn spawn(mut fl: FeedbackLoop) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = xch::bounded::<()>(1);
        let stats = Arc::new(LoopStats::default());
        let stats_clone = stats.clone();
        let serial = fl.device().serial.clone();
        let period = fl.cfg().tick;

        let join_handle = std::thread::Builder::new()
            .name(format!("haptic-{serial}"))
            .spawn(move || {
                tracing::debug!(
                    serial = %fl.device().serial,
                    rate_hz = rate_hz(u64::try_from(period.as_millis()).unwrap_or(u64::MAX)),
                    "feedback loop started"
                );
                loop {
                    let started = fl.now();
                    let report = fl.step();
                    let elapsed = fl.now().saturating_duration_since(started);
                    stats_clone.record(elapsed, period, report.emitted_units > 0);

                    match stop_rx.recv_timeout(remaining_in_period(period, elapsed)) {
                        Err(xch::RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(xch::RecvTimeoutError::Disconnected) => break,
                    }
                }
                tracing::trace!(serial = %fl.device().serial, "feedback loop exiting cleanly");
            })?;

        Ok(Self {
            serial,
            stop_tx: Some(stop_tx),
            stats,
            join_handle: Some(join_handle),
        })
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn stats(&self) -> LoopStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.join_handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for FeedbackWorker {
    fn drop(&mut self) {
        // Wake the thread out of its wait; a full channel means a stop is already queued.
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.try_send(());
        }
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => {
                    tracing::trace!(serial = %self.serial, "feedback thread joined successfully");
                }
                Err(e) => {
                    // Thread panicked; log but don't propagate (we're in Drop)
                    tracing::warn!(serial = %self.serial, ?e, "feedback thread panicked during shutdown");
                }
            }
        }
    }
}
