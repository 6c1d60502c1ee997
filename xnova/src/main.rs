/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

use xnova::config::XnovaConfig;
use xnova::controller::Controller;
use xnova::gpio::{CdevLines, OutputLines, RecordingLines};
use xnova::server::CommandServer;

/// Writes remembered by the dry-run backend; only the log matters there.
const DRY_RUN_HISTORY: usize = 256;

// ── CLI argument definition ───────────────────────────────────────────────────

/// XNova keep-alive and activation pulse controller.
///
/// Example:
///   xnovad -c /etc/xnova.yaml --chip /dev/gpiochip2
///   echo open | socat - UNIX-CONNECT:/run/xnova/xnova.sock
#[derive(Debug, Parser)]
#[command(
    name = "xnovad",
    about = "Mottura XNova keep-alive and activation pulse controller",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// GPIO character device holding the three control lines.
    #[arg(long = "chip")]
    chip: Option<PathBuf>,

    /// Line offset of the OPEN input.
    #[arg(long = "open-line")]
    open_line: Option<u32>,

    /// Line offset of the CLOSE input (also carries the keep-alive pulses).
    #[arg(long = "close-line")]
    close_line: Option<u32>,

    /// Line offset of the AUTOCLOSE input.
    #[arg(long = "autoclose-line")]
    autoclose_line: Option<u32>,

    /// Keep-alive pulse width in milliseconds.
    #[arg(long = "pulse-on-ms")]
    pulse_on_ms: Option<u64>,

    /// Low time between keep-alive pulses in milliseconds.
    #[arg(long = "idle-interval-ms")]
    idle_interval_ms: Option<u64>,

    /// Unix socket for commands.
    #[arg(short = 's', long = "socket")]
    socket: Option<PathBuf>,

    /// Do not touch GPIO; log line changes instead.
    #[arg(short = 'n', long = "dry-run", default_value_t = false)]
    dry_run: bool,
}

impl Cli {
    /// Command-line values win over the configuration file.
    fn apply_overrides(&self, config: &mut XnovaConfig) {
        if let Some(chip) = &self.chip {
            config.gpio.chip = chip.clone();
        }
        if let Some(v) = self.open_line {
            config.gpio.open_line = v;
        }
        if let Some(v) = self.close_line {
            config.gpio.close_line = v;
        }
        if let Some(v) = self.autoclose_line {
            config.gpio.autoclose_line = v;
        }
        if let Some(ms) = self.pulse_on_ms {
            config.timing.pulse_on = Duration::from_millis(ms);
        }
        if let Some(ms) = self.idle_interval_ms {
            config.timing.idle_interval = Duration::from_millis(ms);
        }
        if let Some(socket) = &self.socket {
            config.socket = socket.clone();
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Initialise structured logging.
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("xnovad starting up...");

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // ── Load configuration ────────────────────────────────────────────────────
    let mut config = match &cli.config {
        Some(path) => XnovaConfig::load_from_file(path)?,
        None => {
            warn!("No configuration file provided, using defaults");
            XnovaConfig::default()
        }
    };
    cli.apply_overrides(&mut config);
    config.validate().context("Invalid configuration")?;

    info!(
        chip         = %config.gpio.chip.display(),
        open_line    = config.gpio.open_line,
        close_line   = config.gpio.close_line,
        autoclose_line = config.gpio.autoclose_line,
        socket       = %config.socket.display(),
        dry_run      = cli.dry_run,
        "Configuration"
    );

    let mut terminate = signal(SignalKind::terminate()).context("Cannot install SIGTERM handler")?;

    // ── Acquire lines ─────────────────────────────────────────────────────────
    let lines: Arc<dyn OutputLines> = if cli.dry_run {
        warn!("Dry run: GPIO lines are simulated");
        Arc::new(RecordingLines::bounded(DRY_RUN_HISTORY))
    } else {
        Arc::new(CdevLines::acquire(&config.gpio).context("Failed to initialize GPIO")?)
    };

    // ── Run ───────────────────────────────────────────────────────────────────
    let controller = Controller::start(lines, config.timing);

    let server = match CommandServer::bind(&config.socket, controller.dispatcher()) {
        Ok(server) => server,
        Err(e) => {
            controller.shutdown().await;
            return Err(e);
        }
    };

    server
        .serve(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("SIGINT received"),
                _ = terminate.recv() => info!("SIGTERM received"),
            }
        })
        .await;

    controller.shutdown().await;
    info!("xnovad stopped");
    Ok(())
}
