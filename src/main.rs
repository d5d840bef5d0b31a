use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use soc_bid_controller::{bids, config, controller, domain, hardware, telemetry};
use config::Config;
use controller::{run_with_mode, PolicyTuning, SocMonitor};
use domain::Battery;
use hardware::SimulatedBattery;
use telemetry::init_tracing;

const MODE_PROMPT: &str = "Enter control mode ('edge' or 'smooth'): ";
const INVALID_MODE_MESSAGE: &str = "Invalid mode selected. Please choose 'edge' or 'smooth'.";

#[derive(Debug, Parser)]
#[command(name = "soc-bid-controller", version)]
#[command(about = "Reconcile a battery's state of charge against an hourly SoC bid schedule")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bid schedule CSV (year, month, day, hour, SoC_bid[%])
    #[arg(short, long)]
    bids: Option<PathBuf>,

    /// Control mode: edge or smooth. Asked for interactively when omitted.
    #[arg(short, long)]
    mode: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut cfg = Config::load(cli.config.as_deref())?;
    if let Some(path) = cli.bids {
        cfg.controller.bid_file = path;
    }
    if let Some(mode) = cli.mode {
        cfg.controller.mode = Some(mode);
    }

    init_tracing(&cfg.logging);

    let schedule = bids::load_bid_file(&cfg.controller.bid_file)
        .with_context(|| format!("loading bids from {}", cfg.controller.bid_file.display()))?;

    let battery: Arc<dyn Battery> = Arc::new(SimulatedBattery::from_config(&cfg.battery));
    info!(
        capacity_kwh = cfg.battery.capacity_kwh,
        initial_soc_percent = cfg.battery.initial_soc_percent,
        max_charge_w = cfg.battery.max_charge_w,
        max_discharge_w = cfg.battery.max_discharge_w,
        "battery ready"
    );

    let cancel = CancellationToken::new();
    let monitor = SocMonitor::new(battery.clone(), cfg.battery.monitor_interval())
        .spawn(cancel.clone());

    let signal_token = cancel.clone();
    tokio::spawn(async move {
        telemetry::shutdown_signal().await;
        signal_token.cancel();
    });

    let raw_mode = match cfg.controller.mode.clone() {
        Some(mode) => mode,
        None => prompt_mode().await?,
    };

    match run_with_mode(
        &raw_mode,
        battery.clone(),
        PolicyTuning::from(&cfg.controller),
        cfg.controller.slot_pause(),
        &schedule,
        &cancel,
    )
    .await
    {
        Ok(summary) => info!(summary = ?summary, "run complete"),
        Err(e) => {
            error!(error = %e, "control loop not started");
            println!("{INVALID_MODE_MESSAGE}");
        }
    }

    cancel.cancel();
    let report = monitor.await.context("SoC monitor task failed")?;
    info!(polls = report.polls, poll_errors = report.poll_errors, "shutdown complete");
    Ok(())
}

async fn prompt_mode() -> Result<String> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(MODE_PROMPT.as_bytes()).await?;
    stdout.flush().await?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("reading control mode from stdin")?;
    Ok(line)
}
