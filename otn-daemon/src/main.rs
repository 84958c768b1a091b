//! OTN Peripheral Monitor Daemon (otn-pmond)
//!
//! Runs the two independent schedules of the peripheral monitor:
//!
//! - **Reconciliation**: every `poll_interval_ms`, one `synchronize()` per
//!   peripheral declared by the device spec, sequentially
//! - **Fan control**: every `fan_control_interval_ms`, one controller iteration
//!
//! Both loops run their blocking work on the tokio blocking pool. Boot timers
//! are plain threads owned by the core library.
//!
//! # Shutdown
//! SIGINT/SIGTERM set the shutdown flag. Loops finish their current pass, the
//! store snapshot is flushed and the process exits.

mod fan_control;
mod poller;

use anyhow::Context as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

use otn_core::constants::paths;
use otn_core::{
    load_snapshot, Context, DaemonConfig, DeviceSpec, FanSpeedController, MemoryStore,
    PeriphRegistry, ProcHostStats, SimTelemetry, StorePmSink, Telemetry, TelemetryBackend,
};

use crate::poller::Poller;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable holding the log filter
const LOG_ENV: &str = "OTN_PMON_LOG";

const JOURNALD_SOCKET: &str = "/run/systemd/journal/socket";

// ============================================================================
// CLI
// ============================================================================

struct Args {
    config_path: PathBuf,
}

enum Command {
    Run(Args),
    Exit,
}

fn print_help() {
    eprintln!("otn-pmond {} - OTN peripheral monitor daemon", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    otn-pmond [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -c, --config PATH   Configuration file (default {}/{})", paths::CONFIG_DIR, paths::CONFIG_FILE);
    eprintln!("    -f, --foreground    Run in foreground (always on)");
    eprintln!("    -v, --version       Print version");
    eprintln!("    -h, --help          Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    {}        Log filter (trace, debug, info, warn, error)", LOG_ENV);
}

fn parse_args() -> Result<Command, String> {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = Path::new(paths::CONFIG_DIR).join(paths::CONFIG_FILE);

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                return Ok(Command::Exit);
            }
            "-v" | "--version" => {
                println!("otn-pmond {}", VERSION);
                return Ok(Command::Exit);
            }
            "-f" | "--foreground" => {}
            "-c" | "--config" => {
                i += 1;
                let Some(path) = args.get(i) else {
                    return Err("--config requires a path argument".into());
                };
                config_path = PathBuf::from(path);
            }
            arg => return Err(format!("Unknown argument: {}", arg)),
        }
        i += 1;
    }

    Ok(Command::Run(Args { config_path }))
}

// ============================================================================
// Logging
// ============================================================================

/// Install the global subscriber. Returns whether journald is in use.
fn init_logging() -> bool {
    let filter = std::env::var(LOG_ENV).unwrap_or_else(|_| "info".to_string());

    if Path::new(JOURNALD_SOCKET).exists() {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                use tracing_subscriber::prelude::*;
                tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(tracing_subscriber::EnvFilter::new(&filter))
                    .init();
                return true;
            }
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stdout", e);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(&filter)
        .init();
    false
}

// ============================================================================
// Bootstrap
// ============================================================================

fn build_telemetry(backend: TelemetryBackend, spec: &DeviceSpec) -> Arc<dyn Telemetry> {
    match backend {
        TelemetryBackend::Simulated => Arc::new(SimTelemetry::from_device_spec(spec)),
    }
}

/// Load configuration, device spec and persisted store, and wire the context
fn bootstrap(args: &Args) -> anyhow::Result<(Arc<Poller>, Arc<FanSpeedController>, DaemonConfig)> {
    let config = DaemonConfig::load(&args.config_path)
        .with_context(|| format!("loading {}", args.config_path.display()))?;
    config.validate().context("validating configuration")?;
    let levels = config.level_table()?;

    let spec = DeviceSpec::load(&config.platform_dir)
        .with_context(|| format!("loading device spec from {}", config.platform_dir.display()))?;

    let store = match &config.store_snapshot {
        Some(path) => Arc::new(
            load_snapshot(path).with_context(|| format!("loading store snapshot {}", path.display()))?,
        ),
        None => Arc::new(MemoryStore::new()),
    };

    let telemetry = build_telemetry(config.telemetry, &spec);
    let ctx = Context::new(
        store.clone(),
        telemetry,
        Arc::new(StorePmSink::new(store.clone())),
        Arc::new(ProcHostStats::new()),
        spec,
        config.clone(),
    );

    let registry = Arc::new(PeriphRegistry::new(ctx));
    let poller = Arc::new(Poller::new(registry.clone(), store, config.store_snapshot.clone()));
    let controller = Arc::new(FanSpeedController::new(registry, levels));
    Ok((poller, controller, config))
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("PANIC at {}: {}", location, message);
    }));

    let args = match parse_args() {
        Ok(Command::Run(args)) => args,
        Ok(Command::Exit) => return Ok(()),
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    let use_journald = init_logging();
    info!("STARTUP: otn-pmond {} starting", VERSION);
    info!("STARTUP: Logging to {}", if use_journald { "systemd journal" } else { "stdout" });
    info!("STARTUP: Config file: {}", args.config_path.display());

    let (poller, controller, config) = match bootstrap(&args) {
        Ok(parts) => parts,
        Err(e) => {
            error!("Startup failed: {:#}", e);
            std::process::exit(1);
        }
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    let signal_flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("SIGNAL: Received SIGINT/SIGTERM - initiating shutdown");
        signal_flag.store(true, Ordering::SeqCst);
    }) {
        warn!("Failed to set signal handler: {}. Shutdown via signals may not work cleanly.", e);
    }

    info!(
        poll_ms = config.poll_interval_ms,
        fan_ms = config.fan_control_interval_ms,
        "STARTUP: Starting reconciliation and fan control loops"
    );

    let poll_handle = tokio::spawn(poller::run_poll_loop(
        poller.clone(),
        config.poll_interval(),
        shutdown.clone(),
    ));
    let fan_handle = tokio::spawn(fan_control::run_control_loop(
        controller,
        config.fan_control_interval(),
        shutdown.clone(),
    ));

    if let Err(e) = poll_handle.await {
        error!("Reconciliation loop aborted: {}", e);
    }
    if let Err(e) = fan_handle.await {
        error!("Fan control loop aborted: {}", e);
    }

    if let Err(e) = poller.flush_snapshot() {
        error!("Failed to flush store snapshot: {}", e);
    }

    info!("SHUTDOWN: Daemon terminated gracefully");
    Ok(())
}
