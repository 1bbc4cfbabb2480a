#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod cli;
mod error_fmt;
mod run;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::WrapErr;
use hapbridge_config::{Config, Logging};
use hapbridge_core::error::{FeedbackError, Result};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    let _ = color_eyre::install();

    let loaded = load_config(&cli.config, cli.routing_csv.as_deref());
    let logging = loaded
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_default();
    init_tracing(cli.json, &cli.log_level, &logging);

    if let Err(e) = loaded.and_then(|cfg| dispatch(&cli, cfg)) {
        tracing::error!(error = %e, "command failed");
        if JSON_MODE.get().copied().unwrap_or(false) {
            println!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn dispatch(cli: &Cli, cfg: Config) -> Result<()> {
    match &cli.cmd {
        Commands::Run {
            stats,
            duration_ms,
            save,
        } => {
            let shutdown = Arc::new(AtomicBool::new(false));
            {
                let flag = shutdown.clone();
                ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
                    .wrap_err("install Ctrl-C handler")?;
            }
            let save_to = save.then_some(cli.config.as_path());
            run::run(cfg, save_to, *stats, *duration_ms, cli.json, &shutdown)
        }
        Commands::Pulse { serial, ms } => run::pulse(cfg, serial, *ms, cli.json),
        Commands::List => run::list(&cfg, cli.json),
        Commands::SelfCheck => run::self_check(&cfg, cli.json),
    }
}

/// Read, merge and validate the settings. Every failure here is a config error.
fn load_config(path: &Path, routing_csv: Option<&Path>) -> Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| FeedbackError::Config(format!("read {}: {e}", path.display())))?;
    let mut cfg: Config = toml::from_str(&text)
        .map_err(|e| FeedbackError::Config(format!("parse {}: {e}", path.display())))?;
    // Legacy tables are folded in first so imported rows win over them.
    cfg.check_integrity();
    if let Some(csv) = routing_csv {
        let rows = hapbridge_config::load_routing_csv(csv)
            .map_err(|e| FeedbackError::Config(format!("{e:#}")))?;
        cfg.apply_routing(&rows);
    }
    cfg.validate()
        .map_err(|e| FeedbackError::Config(format!("{e:#}")))?;
    Ok(cfg)
}

fn init_tracing(json: bool, level: &str, logging: &Logging) {
    // RUST_LOG wins over --log-level.
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    if json {
        layers.push(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_filter(console_filter)
                .boxed(),
        );
    } else {
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(console_filter)
                .boxed(),
        );
    }
    if let Some(file) = logging.file.as_deref() {
        if let Some(layer) = file_layer(file, logging, level) {
            layers.push(layer);
        }
    }
    let _ = Registry::default().with(layers).try_init();
}

fn file_layer(
    file: &str,
    logging: &Logging,
    level: &str,
) -> Option<Box<dyn Layer<Registry> + Send + Sync>> {
    let path = Path::new(file);
    let dir = path
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path.file_name()?.to_string_lossy().into_owned();
    let rotation = match logging.rotation.as_deref() {
        Some("daily") => Rotation::DAILY,
        Some("hourly") => Rotation::HOURLY,
        _ => Rotation::NEVER,
    };
    let appender = match RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(name)
        .build(dir)
    {
        Ok(a) => a,
        Err(e) => {
            eprintln!("warning: cannot open log file {file}: {e}");
            return None;
        }
    };
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = FILE_GUARD.set(guard);
    let filter = EnvFilter::new(logging.level.as_deref().unwrap_or(level));
    Some(
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .with_filter(filter)
            .boxed(),
    )
}
