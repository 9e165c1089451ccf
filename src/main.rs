use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use gps_tracker::platform::simulated::SimulatedPlatform;
use gps_tracker::{
    AccuracyTier, LocationSession, PermissionState, ResolutionHandle, SettingsOutcome,
    TrackerScreen, TrackingConfig,
};
use std::sync::Arc;
use tokio::time::{sleep, Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "gps_tracker")]
#[command(about = "Location session demo over a simulated GPS feed", long_about = None)]
struct Args {
    /// Duration in seconds (0 = until Ctrl-C)
    #[arg(value_name = "SECONDS", default_value = "30")]
    duration: u64,

    /// JSON tracking config; flags below override its fields
    #[arg(long)]
    config: Option<String>,

    /// Desired interval between fixes
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Fastest interval the tracker accepts
    #[arg(long)]
    fastest_interval_ms: Option<u64>,

    /// Maximum batching delay (0 = no batching)
    #[arg(long)]
    max_wait_ms: Option<u64>,

    /// Accuracy tier (high, balanced, low-power, passive)
    #[arg(long)]
    accuracy: Option<String>,

    /// Simulated permission grant (none, coarse, fine)
    #[arg(long, default_value = "fine")]
    permission: String,

    /// Simulated settings check result (ready, resolvable, unresolvable)
    #[arg(long, default_value = "ready")]
    settings: String,

    /// Fixes per simulated batch
    #[arg(long, default_value = "1")]
    batch_size: usize,

    /// Write a JSON summary of the run here
    #[arg(long)]
    output: Option<String>,
}

fn build_config(args: &Args) -> Result<TrackingConfig> {
    let mut config = match &args.config {
        Some(path) => TrackingConfig::from_json_file(path)?,
        None => TrackingConfig::default(),
    };
    if let Some(ms) = args.interval_ms {
        config.min_interval_ms = ms;
    }
    if let Some(ms) = args.fastest_interval_ms {
        config.fastest_interval_ms = ms;
    }
    if let Some(ms) = args.max_wait_ms {
        config.max_batch_delay_ms = ms;
    }
    if let Some(tier) = &args.accuracy {
        config.accuracy_tier = tier.parse::<AccuracyTier>()?;
    }
    config.validate()?;
    Ok(config)
}

fn settings_outcome(name: &str) -> Result<SettingsOutcome> {
    match name {
        "ready" => Ok(SettingsOutcome::Ready),
        "resolvable" => Ok(SettingsOutcome::ResolutionRequired(ResolutionHandle::new(100))),
        "unresolvable" => Ok(SettingsOutcome::Unresolvable(
            "location services disabled".to_string(),
        )),
        other => anyhow::bail!("unknown settings outcome '{}'", other),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = build_config(&args)?;
    let permission: PermissionState = args.permission.parse()?;

    println!("[{}] GPS Tracker Starting", ts_now());
    println!("  Duration: {} seconds (0=continuous)", args.duration);
    println!(
        "  Interval: {} ms (fastest {} ms, max wait {} ms)",
        config.min_interval_ms, config.fastest_interval_ms, config.max_batch_delay_ms
    );
    println!("  Accuracy: {}", config.accuracy_tier);
    println!("  Permission: {:?}", permission);

    let platform = Arc::new(SimulatedPlatform::new(permission).with_batch_size(args.batch_size));
    platform.set_settings_outcome(settings_outcome(&args.settings)?);

    let session = Arc::new(LocationSession::with_platform(config, platform.clone())?);
    let screen = TrackerScreen::new(session.clone())?;

    if let Err(e) = screen.on_create().await {
        log::warn!("Startup fetch failed: {}", e);
    }

    // Stand in for the user accepting the system settings dialog
    if let Some(handle) = screen.pending_resolution()? {
        println!("[{}] Settings resolution {} accepted", ts_now(), handle.id());
        platform.set_settings_outcome(SettingsOutcome::Ready);
        screen.on_resolution_result(true).await?;
    }

    match screen.on_toggle().await {
        Ok(state) => println!("[{}] {:?} -> button: {}", ts_now(), state, screen.button_label()),
        Err(e) => println!("[{}] Could not start tracking: {}", ts_now(), e),
    }

    let start = Instant::now();
    let mut printed = screen.log_lines()?.len();
    for line in screen.log_lines()?.iter().rev() {
        println!("  {}", line);
    }

    loop {
        if args.duration > 0 && start.elapsed() >= Duration::from_secs(args.duration) {
            println!("[{}] Duration reached, stopping...", ts_now());
            break;
        }

        tokio::select! {
            _ = sleep(Duration::from_millis(250)) => {}
            _ = tokio::signal::ctrl_c() => {
                println!("[{}] Interrupted, stopping...", ts_now());
                break;
            }
        }

        // Log is newest first; print what arrived since the last pass, oldest first
        let lines = screen.log_lines()?;
        if lines.len() > printed {
            for line in lines[..lines.len() - printed].iter().rev() {
                println!("  {}", line);
            }
            printed = lines.len();
        }
    }

    if session.is_tracking()? {
        if let Err(e) = screen.on_toggle().await {
            log::warn!("Stop reported: {}", e);
        }
    }
    println!("[{}] {:?} -> button: {}", ts_now(), session.state()?, screen.button_label());

    let summary = screen.summary()?;
    if let Some(path) = &args.output {
        std::fs::write(path, summary.to_json()?)
            .with_context(|| format!("failed to write summary to {}", path))?;
        println!("[{}] Summary written to {}", ts_now(), path);
    }

    println!("\n=== Final Stats ===");
    println!("Samples delivered: {}", summary.delivered_samples);
    println!("Log lines: {}", summary.log_lines.len());

    Ok(())
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}
