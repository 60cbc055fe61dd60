//! `daq-scan`: continuous multi-board acquisition from the command line.
//!
//! # Usage
//!
//! Record ten seconds at 1 kHz from the configured boards and sensor:
//! ```bash
//! daq-scan run --rate 1000 --duration 10 --subject P07
//! ```
//!
//! Show the ring sizes a session would use:
//! ```bash
//! daq-scan geometry --rate 1000 --duration 2 --channels 2
//! ```

mod logging;
mod streams;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use daq_acquisition::{MultiStreamCoordinator, PipelineTiming};
use daq_core::config::{AcquisitionConfig, DEFAULT_CONFIG_PATH};
use daq_core::session::{ChannelRange, OutputMode, ScanGeometry, SessionState};
use tracing::{info, warn};

use crate::logging::LogFormat;

#[derive(Parser)]
#[command(name = "daq-scan", version)]
#[command(about = "Continuous ring-buffer acquisition from DAQ boards and a serial sensor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record one session
    Run(RunArgs),

    /// Print the ring geometry for a rate, duration and channel count
    Geometry {
        /// Scan rate in Hz
        #[arg(long)]
        rate: u32,
        /// Duration in seconds
        #[arg(long)]
        duration: u32,
        /// Channels scanned
        #[arg(long)]
        channels: u32,
        /// Board transfer packet size in points per channel
        #[arg(long, default_value_t = 1)]
        packet_size: usize,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Configuration file (TOML)
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Scan rate in Hz, overrides [session] rate_hz
    #[arg(long)]
    rate: Option<u32>,
    /// Duration in seconds, overrides [session] duration_s
    #[arg(long)]
    duration: Option<u32>,
    /// Subject label used in file names
    #[arg(long)]
    subject: Option<String>,
    /// Output arrangement
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,
    /// Directory for session files
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Use the simulated serial sensor even when the real port is available
    #[arg(long)]
    simulate: bool,
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    /// One table on the hardware time axis
    Merged,
    /// One table per stream, detached groups split out
    Separate,
}

impl From<ModeArg> for OutputMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Merged => OutputMode::Merged,
            ModeArg::Separate => OutputMode::Separate,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run_session(args),
        Commands::Geometry {
            rate,
            duration,
            channels,
            packet_size,
        } => print_geometry(rate, duration, channels, packet_size),
    }
}

fn load_config(args: &RunArgs) -> Result<AcquisitionConfig> {
    let mut config = AcquisitionConfig::load_from(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    if let Some(rate) = args.rate {
        config.session.rate_hz = rate;
    }
    if let Some(duration) = args.duration {
        config.session.duration_s = duration;
    }
    if let Some(subject) = &args.subject {
        config.session.subject = subject.clone();
    }
    if let Some(mode) = args.mode {
        config.session.output_mode = mode.into();
    }
    if let Some(dir) = &args.output_dir {
        config.application.output_dir = dir.clone();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn run_session(args: RunArgs) -> Result<()> {
    let config = load_config(&args)?;
    logging::init(&config.application.log_level, args.log_format)?;
    info!(version = %daq_core::build_info(), config = %args.config.display(), "daq-scan starting");

    let session = SessionState::new();
    {
        let session = Arc::clone(&session);
        ctrlc::set_handler(move || session.cancel()).context("Failed to install Ctrl-C handler")?;
    }

    let mut builder = MultiStreamCoordinator::builder()
        .params(config.session_params()?)
        .output_dir(&config.application.output_dir)
        .timing(PipelineTiming::from(&config))
        .session(Arc::clone(&session));
    for spec in streams::hardware_specs(&config)? {
        builder = builder.hardware(spec);
    }
    if let Some(spec) = streams::sensor_spec(&config, args.simulate) {
        builder = builder.sensor(spec);
    }
    let coordinator = builder.build()?;
    info!(stem = %coordinator.naming().stem(), streams = coordinator.stream_count(), "Session ready");

    let done = Arc::new(AtomicBool::new(false));
    let monitor = spawn_progress_monitor(Arc::clone(&session), Arc::clone(&done))?;
    let result = coordinator.run();
    done.store(true, Ordering::Release);
    if monitor.join().is_err() {
        warn!("Progress monitor panicked");
    }

    let report = result.context("Acquisition session failed")?;
    for file in &report.files {
        println!("{}", file.display());
    }
    info!(
        files = report.files.len(),
        elapsed_s = report.elapsed.as_secs_f64(),
        "Session saved"
    );
    Ok(())
}

/// Log every stream's status and row count once per second until `done`.
fn spawn_progress_monitor(
    session: Arc<SessionState>,
    done: Arc<AtomicBool>,
) -> Result<thread::JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("daq-progress".to_string())
        .spawn(move || {
            let mut ticks = 0u32;
            while !done.load(Ordering::Acquire) {
                thread::sleep(Duration::from_millis(100));
                ticks += 1;
                if ticks % 10 != 0 {
                    continue;
                }
                for (stream, status, rows) in session.snapshot() {
                    info!(%stream, ?status, rows, "Progress");
                }
            }
        })?;
    Ok(handle)
}

fn print_geometry(rate: u32, duration: u32, channels: u32, packet_size: usize) -> Result<()> {
    anyhow::ensure!(channels > 0, "At least one channel is required");
    let range = ChannelRange::new(0, channels.saturating_sub(1))?;
    let geometry = ScanGeometry::compute(rate, duration, range, packet_size)?;
    println!("channels:           {}", geometry.n_channels);
    println!("points per channel: {}", geometry.points_per_channel);
    println!("capacity:           {}", geometry.capacity);
    println!("chunk size:         {}", geometry.chunk_size);
    println!("points to write:    {}", geometry.points_to_write);
    println!("rows:               {}", geometry.rows());
    Ok(())
}
