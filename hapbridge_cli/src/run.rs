//! Command execution: backend assembly, the stdin feed, and reporting.

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel as xch;
use eyre::WrapErr;
use hapbridge_config::Config;
use hapbridge_core::error::{FeedbackError, Result};
use hapbridge_core::hw_error::map_hw_error;
use hapbridge_core::{BridgeContext, ConfigStore, LoopStatsSnapshot};
use hapbridge_hardware::SimulatedTracker;
use hapbridge_traits::Tracker;

/// Granularity of the main loop's shutdown and deadline checks.
const POLL: Duration = Duration::from_millis(20);

/// Simulated backend populated from `[simulator]`.
pub fn simulated_backend(cfg: &Config) -> SimulatedTracker {
    let sim = SimulatedTracker::new();
    for d in &cfg.simulator.devices {
        sim.add_device(d.handle, &d.model, &d.serial, d.battery);
    }
    sim
}

fn context(cfg: Config, sim: &SimulatedTracker) -> BridgeContext {
    BridgeContext::new(
        Arc::new(ConfigStore::new(cfg)),
        Arc::new(sim.clone()),
        Arc::new(sim.clone()),
    )
}

/// Split one `<routing_key> <value>` line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (key, value) = line.split_once(char::is_whitespace)?;
    Some((key, value.trim()))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RunSummary {
    pub lines: u64,
    pub routed: u64,
    pub dropped: u64,
}

pub fn run(
    cfg: Config,
    save_to: Option<&Path>,
    stats: bool,
    duration_ms: Option<u64>,
    json: bool,
    shutdown: &Arc<AtomicBool>,
) -> Result<()> {
    let sim = simulated_backend(&cfg);
    let mut ctx = context(cfg, &sim);
    if let Some(path) = save_to {
        ctx = ctx.with_settings_path(path);
    }
    let report = ctx.start()?;
    tracing::info!(attached = ?report.added, "devices attached");

    // Stdin blocks, so it lives on its own thread; the main loop stays responsive to Ctrl-C.
    let (tx, rx) = xch::unbounded::<String>();
    std::thread::Builder::new()
        .name("stdin-feed".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(l) => {
                        if tx.send(l).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "stdin read failed");
                        break;
                    }
                }
            }
        })
        .map_err(|e| FeedbackError::Io(e.to_string()))
        .wrap_err("spawn stdin reader")?;

    let started = Instant::now();
    let deadline = duration_ms.map(|ms| started + Duration::from_millis(ms));
    let mut summary = RunSummary::default();
    let mut input_open = true;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            tracing::info!("shutdown requested");
            break;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        if !input_open {
            if deadline.is_none() {
                break;
            }
            std::thread::sleep(POLL);
            continue;
        }
        match rx.recv_timeout(POLL) {
            Ok(line) => {
                let Some((key, value)) = parse_line(&line) else {
                    continue;
                };
                summary.lines += 1;
                let n = ctx
                    .supervisor()
                    .map_or(0, |sup| sup.on_raw_value(key, value));
                if n == 0 {
                    summary.dropped += 1;
                } else {
                    summary.routed += n as u64;
                }
            }
            Err(xch::RecvTimeoutError::Timeout) => {}
            Err(xch::RecvTimeoutError::Disconnected) => input_open = false,
        }
    }

    let device_stats = ctx.supervisor().map(|s| s.all_stats()).unwrap_or_default();
    ctx.stop()?;
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    if json {
        let mut obj = serde_json::json!({
            "lines": summary.lines,
            "routed": summary.routed,
            "dropped": summary.dropped,
            "duration_ms": elapsed_ms,
            "devices": device_stats.iter().map(|(s, _)| s.clone()).collect::<Vec<_>>(),
        });
        if stats {
            obj["stats"] = device_stats
                .iter()
                .map(|(s, st)| (s.clone(), stats_json(st)))
                .collect::<serde_json::Map<_, _>>()
                .into();
        }
        println!("{obj}");
    } else {
        println!(
            "run complete: {} lines, {} routed, {} dropped, {} devices, {elapsed_ms} ms",
            summary.lines,
            summary.routed,
            summary.dropped,
            device_stats.len()
        );
        if stats {
            print_stats(&device_stats);
        }
    }
    Ok(())
}

pub fn pulse(cfg: Config, serial: &str, ms: u32, json: bool) -> Result<()> {
    let tick = Duration::from_millis(cfg.feedback.tick_ms);
    let sim = simulated_backend(&cfg);
    let mut ctx = context(cfg, &sim);
    ctx.start()?;
    let handle = ctx
        .supervisor()
        .and_then(|s| s.device(serial))
        .map(|d| d.handle)
        .ok_or_else(|| FeedbackError::UnknownDevice(serial.to_string()))?;
    if let Some(sup) = ctx.supervisor() {
        sup.force_pulse(serial, ms)?;
    }
    // Let the loop spread the pulse over its ticks, plus one tick of slack.
    std::thread::sleep(Duration::from_millis(u64::from(ms)) + tick);
    ctx.stop()?;

    let pulses = sim.pulses_for(handle);
    let units: u64 = pulses.iter().map(|p| u64::from(*p)).sum();
    if json {
        println!(
            "{}",
            serde_json::json!({
                "serial": serial,
                "requested_ms": ms,
                "pulses": pulses.len(),
                "native_units": units,
            })
        );
    } else {
        println!(
            "pulsed {serial}: {} pulses, {units} native units",
            pulses.len()
        );
    }
    Ok(())
}

pub fn list(cfg: &Config, json: bool) -> Result<()> {
    let sim = simulated_backend(cfg);
    let timeout = Duration::from_millis(cfg.feedback.hardware_timeout_ms);
    let devices = sim
        .list_devices(timeout)
        .map_err(|e| map_hw_error(&*e))
        .wrap_err("list devices")?;
    let filter = &cfg.feedback.model_filter;
    let rows: Vec<_> = devices
        .iter()
        .map(|d| {
            let attached = filter.is_empty() || filter.iter().any(|p| d.model.starts_with(p.as_str()));
            let routing_key = cfg.trackers.get(&d.serial).map(|t| t.routing_key.clone());
            (d, attached, routing_key)
        })
        .collect();

    if json {
        let arr: Vec<_> = rows
            .iter()
            .map(|(d, attached, key)| {
                serde_json::json!({
                    "handle": d.handle,
                    "model": d.model,
                    "serial": d.serial,
                    "attached": attached,
                    "routing_key": key,
                })
            })
            .collect();
        println!("{}", serde_json::Value::Array(arr));
    } else {
        if rows.is_empty() {
            println!("no devices");
        }
        for (d, attached, key) in &rows {
            println!(
                "{:>3}  {:<24} {:<16} {}{}",
                d.handle,
                d.model,
                d.serial,
                key.as_deref().unwrap_or("-"),
                if *attached { "" } else { "  (filtered)" }
            );
        }
    }
    Ok(())
}

pub fn self_check(cfg: &Config, json: bool) -> Result<()> {
    let sim = simulated_backend(cfg);
    let timeout = Duration::from_millis(cfg.feedback.hardware_timeout_ms);
    let devices = sim
        .list_devices(timeout)
        .map_err(|e| map_hw_error(&*e))
        .wrap_err("probe tracker")?;
    if json {
        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "devices": devices.len(),
                "tick_ms": cfg.feedback.tick_ms,
                "server": format!("{}:{}", cfg.server.ip, cfg.server.port),
            })
        );
    } else {
        println!(
            "OK: config valid, {} devices, tick {} ms, listener {}:{}",
            devices.len(),
            cfg.feedback.tick_ms,
            cfg.server.ip,
            cfg.server.port
        );
    }
    Ok(())
}

fn stats_json(s: &LoopStatsSnapshot) -> serde_json::Value {
    serde_json::json!({
        "ticks": s.ticks,
        "overruns": s.overruns,
        "pulses": s.pulses,
        "max_tick_us": s.max_tick_us,
        "avg_tick_us": s.avg_tick_us,
    })
}

/// Print per-device loop stats to stderr.
fn print_stats(stats: &[(String, LoopStatsSnapshot)]) {
    eprintln!("\n--- Feedback Loop Stats ---");
    for (serial, s) in stats {
        eprintln!(
            "{serial}: ticks {} / pulses {} / overruns {} / tick avg {} us max {} us",
            s.ticks, s.pulses, s.overruns, s.avg_tick_us, s.max_tick_us
        );
    }
    eprintln!("---------------------------\n");
}
