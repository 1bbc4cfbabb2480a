#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Persisted settings for the haptic bridge.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - `check_integrity` repairs the channel list and migrates the legacy
//!   `tracker_to_osc` table into per-serial tracker settings.
//! - The routing CSV loader enforces headers and merges rows into `trackers`.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current schema version written by `to_toml_string`.
pub const CONFIG_VERSION: u32 = 1;

/// Pattern names accepted in `[[patterns]]`, in their canonical order.
pub const PATTERN_NAMES: [&str; 5] = ["None", "Constant", "Linear", "Sine", "Throb"];

/// Index of the proximity channel in `Config::patterns`.
pub const PROXIMITY: usize = 0;
/// Index of the velocity channel in `Config::patterns`.
pub const VELOCITY: usize = 1;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServerKind {
    #[default]
    Osc,
    Websocket,
}

/// Where the protocol listener binds. The feedback core only reports it.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Server {
    pub kind: ServerKind,
    pub ip: String,
    pub port: u16,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            kind: ServerKind::Osc,
            ip: "127.0.0.1".to_string(),
            port: 9001,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Feedback {
    /// Nominal loop period in milliseconds.
    pub tick_ms: u64,
    /// Starting value of the low-battery blink counter.
    pub low_battery_blinks: u32,
    /// Force zero output when no target arrived within this many ticks (0 disables).
    pub stale_after_ticks: u32,
    /// Timeout handed to battery and pulse calls.
    pub hardware_timeout_ms: u64,
    /// When non-empty, only attach devices whose model starts with one of these.
    pub model_filter: Vec<String>,
}

impl Default for Feedback {
    fn default() -> Self {
        Self {
            tick_ms: 50,
            low_battery_blinks: 8,
            stale_after_ticks: 0,
            hardware_timeout_ms: 10,
            model_filter: Vec::new(),
        }
    }
}

/// One shaping channel as written in the file. The pattern stays a string
/// here; `validate` rejects names outside `PATTERN_NAMES`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct PatternCfg {
    pub pattern: String,
    pub strength_min: u8,
    pub strength_max: u8,
    pub speed: u8,
}

impl PatternCfg {
    pub fn new(pattern: &str, strength_min: u8, strength_max: u8, speed: u8) -> Self {
        Self {
            pattern: pattern.to_string(),
            strength_min,
            strength_max,
            speed,
        }
    }

    pub fn default_proximity() -> Self {
        Self::new("Linear", 0, 80, 4)
    }

    pub fn default_velocity() -> Self {
        Self::new("None", 40, 80, 16)
    }

    /// Default for the channel at `index` (0 = proximity, otherwise velocity).
    pub fn default_for(index: usize) -> Self {
        if index == PROXIMITY {
            Self::default_proximity()
        } else {
            Self::default_velocity()
        }
    }
}

/// User settings for one device, keyed by serial in `Config::trackers`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct TrackerCfg {
    pub enabled: bool,
    pub routing_key: String,
    pub multiplier_override: f32,
    /// Reserved; carried through but not applied.
    pub pattern_override: String,
    pub battery_threshold: u8,
}

impl Default for TrackerCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            routing_key: "/avatar/parameters/...".to_string(),
            multiplier_override: 1.0,
            pattern_override: "None".to_string(),
            battery_threshold: 20,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

/// Compensation policy for one family of devices, matched by model prefix.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct HardwareProfile {
    pub model_prefix: String,
    /// Native pulse units per millisecond (1.0 = milliseconds).
    #[serde(default = "one")]
    pub unit_scale: f32,
    /// Longest single pulse the actuator sustains, in native units (0 = uncapped).
    #[serde(default)]
    pub pulse_cap_units: u32,
}

const fn one() -> f32 {
    1.0
}

impl HardwareProfile {
    /// Tracker family whose actuator truncates pulses above 4000 µs.
    pub fn vive_tracker() -> Self {
        Self {
            model_prefix: "VIVE Tracker".to_string(),
            unit_scale: 1000.0,
            pulse_cap_units: 4000,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Hardware {
    pub profiles: Vec<HardwareProfile>,
}

impl Default for Hardware {
    fn default() -> Self {
        Self {
            profiles: vec![HardwareProfile::vive_tracker()],
        }
    }
}

impl Hardware {
    /// First profile whose prefix matches `model`.
    pub fn profile_for(&self, model: &str) -> Option<&HardwareProfile> {
        self.profiles
            .iter()
            .find(|p| model.starts_with(p.model_prefix.as_str()))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SimDevice {
    pub handle: u32,
    pub model: String,
    pub serial: String,
    #[serde(default = "one")]
    pub battery: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Simulator {
    pub devices: Vec<SimDevice>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Config {
    pub version: u32,
    pub server: Server,
    pub feedback: Feedback,
    pub patterns: Vec<PatternCfg>,
    pub trackers: BTreeMap<String, TrackerCfg>,
    /// Legacy serial -> routing key table; folded into `trackers` by `check_integrity`.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tracker_to_osc: BTreeMap<String, String>,
    pub logging: Logging,
    pub hardware: Hardware,
    pub simulator: Simulator,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            server: Server::default(),
            feedback: Feedback::default(),
            patterns: vec![PatternCfg::default_proximity(), PatternCfg::default_velocity()],
            trackers: BTreeMap::new(),
            tracker_to_osc: BTreeMap::new(),
            logging: Logging::default(),
            hardware: Hardware::default(),
            simulator: Simulator::default(),
        }
    }
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Routing CSV schema.
///
/// Expected headers:
/// serial,routing_key
///
/// Example:
/// serial,routing_key
/// LHR-1234ABCD,/avatar/parameters/HapticChest
#[derive(Debug, Deserialize, Clone)]
pub struct RoutingRow {
    pub serial: String,
    pub routing_key: String,
}

pub fn load_routing_csv(path: &std::path::Path) -> eyre::Result<Vec<RoutingRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open routing CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["serial", "routing_key"];
    let actual: Vec<String> = headers.iter().map(ToString::to_string).collect();
    if actual != expected {
        eyre::bail!(
            "routing CSV must have headers 'serial,routing_key', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<RoutingRow>().enumerate() {
        match rec {
            Ok(row) if row.serial.is_empty() => {
                eyre::bail!("invalid CSV row {}: empty serial", idx + 2);
            }
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }
    Ok(rows)
}

impl Config {
    /// Settings for `serial`, created with defaults on first reference.
    pub fn tracker_config(&mut self, serial: &str) -> &mut TrackerCfg {
        self.trackers.entry(serial.to_string()).or_default()
    }

    /// Repair what older or hand-edited files get wrong.
    ///
    /// Returns true when anything changed, so callers know to persist.
    pub fn check_integrity(&mut self) -> bool {
        let mut changed = false;
        if self.patterns.len() != 2 {
            self.patterns = vec![PatternCfg::default_proximity(), PatternCfg::default_velocity()];
            changed = true;
        }
        // Entries already in `trackers` are newer than the legacy table.
        for (serial, key) in std::mem::take(&mut self.tracker_to_osc) {
            self.trackers.entry(serial).or_insert_with(|| TrackerCfg {
                routing_key: key,
                ..TrackerCfg::default()
            });
            changed = true;
        }
        if self.version != CONFIG_VERSION {
            self.version = CONFIG_VERSION;
            changed = true;
        }
        changed
    }

    /// Merge imported routing rows, creating tracker entries as needed.
    pub fn apply_routing(&mut self, rows: &[RoutingRow]) {
        for row in rows {
            self.tracker_config(&row.serial).routing_key = row.routing_key.clone();
        }
    }

    pub fn to_toml_string(&self) -> eyre::Result<String> {
        toml::to_string_pretty(self).map_err(|e| eyre::eyre!("serialize config: {}", e))
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Feedback
        if self.feedback.tick_ms == 0 {
            eyre::bail!("feedback.tick_ms must be >= 1");
        }
        if self.feedback.tick_ms > 1000 {
            eyre::bail!("feedback.tick_ms is unreasonably large (>1s)");
        }
        if self.feedback.low_battery_blinks == 0 {
            eyre::bail!("feedback.low_battery_blinks must be >= 1");
        }
        if self.feedback.hardware_timeout_ms == 0 {
            eyre::bail!("feedback.hardware_timeout_ms must be >= 1");
        }
        if self.feedback.hardware_timeout_ms >= self.feedback.tick_ms {
            eyre::bail!("feedback.hardware_timeout_ms must be < feedback.tick_ms");
        }

        // Patterns: the count is repaired by check_integrity, not rejected here.
        for (idx, p) in self.patterns.iter().enumerate() {
            if !PATTERN_NAMES.contains(&p.pattern.as_str()) {
                eyre::bail!(
                    "patterns[{idx}].pattern '{}' is not one of {}",
                    p.pattern,
                    PATTERN_NAMES.join(", ")
                );
            }
            if p.strength_max > 100 {
                eyre::bail!("patterns[{idx}].strength_max must be in [0, 100]");
            }
            if p.strength_min > p.strength_max {
                eyre::bail!("patterns[{idx}].strength_min must be <= strength_max");
            }
            if !(1..=32).contains(&p.speed) {
                eyre::bail!("patterns[{idx}].speed must be in [1, 32]");
            }
        }

        // Trackers
        for (serial, t) in &self.trackers {
            if !t.multiplier_override.is_finite() || t.multiplier_override < 0.0 {
                eyre::bail!("trackers.{serial}.multiplier_override must be >= 0.0");
            }
            if t.battery_threshold > 100 {
                eyre::bail!("trackers.{serial}.battery_threshold must be in [0, 100]");
            }
        }

        // Hardware
        for p in &self.hardware.profiles {
            if !(p.unit_scale.is_finite() && p.unit_scale > 0.0) {
                eyre::bail!(
                    "hardware.profiles '{}' unit_scale must be > 0.0",
                    p.model_prefix
                );
            }
        }

        // Simulator
        for d in &self.simulator.devices {
            if !(0.0..=1.0).contains(&d.battery) {
                eyre::bail!("simulator.devices '{}' battery must be in [0.0, 1.0]", d.serial);
            }
        }

        Ok(())
    }
}
