//! Human-readable error descriptions and structured JSON error formatting.

use hapbridge_core::error::{BuildError, FeedbackError};

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingTracker => {
                "What happened: No tracking backend was provided to the supervisor.\nLikely causes: The tracker failed to initialize or was not wired into the builder.\nHow to fix: Ensure the backend is created successfully and passed via with_tracker(...).".to_string()
            }
            BuildError::MissingActuator => {
                "What happened: No actuator was provided to the supervisor.\nLikely causes: The haptic backend failed to initialize or was not wired into the builder.\nHow to fix: Ensure the backend is passed via with_actuator(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the [feedback] table.\nHow to fix: Edit the config file, then rerun `hapbridge self-check`."
            ),
        };
    }

    if let Some(fe) = err.downcast_ref::<FeedbackError>() {
        return match fe {
            FeedbackError::Config(msg) if msg.contains("routing CSV must have headers") => format!(
                "What happened: Invalid headers in routing CSV ({msg}).\nLikely causes: The file was exported with different column names.\nHow to fix: Make the first line exactly 'serial,routing_key'."
            ),
            FeedbackError::Config(msg) => format!(
                "What happened: The configuration could not be used ({msg}).\nLikely causes: A typo in the TOML, an unknown pattern name, or an out-of-range value.\nHow to fix: Fix the field named above and rerun `hapbridge self-check`."
            ),
            FeedbackError::Timeout => {
                "What happened: The tracking runtime did not answer in time.\nLikely causes: The runtime is busy or not running, or feedback.hardware_timeout_ms is too low.\nHow to fix: Make sure the runtime is up, or raise feedback.hardware_timeout_ms in the config.".to_string()
            }
            FeedbackError::UnknownDevice(serial) => format!(
                "What happened: No attached device has serial '{serial}'.\nLikely causes: The device is off, filtered out by feedback.model_filter, or the serial is mistyped.\nHow to fix: Run `hapbridge list` to see attached serials."
            ),
            FeedbackError::Hardware(_) | FeedbackError::HardwareFault(_) => format!(
                "What happened: {fe}.\nLikely causes: The tracking runtime rejected the call or lost the device.\nHow to fix: Check that the device is connected and paired, then retry."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from file handling
    let msg = err.to_string();
    let lower = format!("{err:#}").to_ascii_lowercase();

    if lower.contains("no such file") || lower.contains("cannot find the file") {
        return format!(
            "What happened: A file could not be opened.\nLikely causes: Wrong path passed to --config or --routing-csv.\nHow to fix: Check the path and rerun. Original: {err:#}"
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 2 for configuration problems, 3 for hardware, 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(BuildError::InvalidConfig(_)) = err.downcast_ref::<BuildError>() {
        return 2;
    }
    match err.downcast_ref::<FeedbackError>() {
        Some(FeedbackError::Config(_)) => 2,
        Some(
            FeedbackError::Hardware(_) | FeedbackError::HardwareFault(_) | FeedbackError::Timeout,
        ) => 3,
        _ => 1,
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if err.downcast_ref::<BuildError>().is_some() {
        return "Build";
    }
    match err.downcast_ref::<FeedbackError>() {
        Some(FeedbackError::Config(_)) => "Config",
        Some(FeedbackError::Timeout) => "Timeout",
        Some(FeedbackError::UnknownDevice(_)) => "UnknownDevice",
        Some(FeedbackError::Hardware(_) | FeedbackError::HardwareFault(_)) => "Hardware",
        Some(FeedbackError::Io(_)) => "Io",
        _ => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
