//! CLI entry point for field-logger
//!
//! # Usage
//!
//! Save a bounded calibration:
//! ```bash
//! field-logger calibrate --log-interval 5 --folder-id site-a \
//!     --start-date 01-06-2024 --start-time 10:00:00 \
//!     --stop-date 01-06-2024 --stop-time 18:00:00 --division-factor 10
//! ```
//!
//! Run a session from the saved calibration:
//! ```bash
//! field-logger start
//! field-logger start --dry-run --simulate   # no sensor, no remote writes
//! ```
//!
//! Interactive mode:
//! ```bash
//! field-logger console
//! ```

// Global allocator (Microsoft Rust Guidelines: M-MIMALLOC-APPS)
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use field_logger::calibration::CalibrationSettings;
use field_logger::clock::SystemClock;
use field_logger::config::{AppConfig, DEFAULT_CONFIG_PATH};
use field_logger::console::{self, CommandHandler};
use field_logger::error::LoggerError;
use field_logger::logging;
use field_logger::remote::{MemoryStore, RemoteStore};
use field_logger::scheduler::{SessionOutcome, SessionReport};
use field_logger::session;
use field_logger::transport::{RegisterReader, SimulatedReader};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "field-logger")]
#[command(about = "Modbus field data logger with CSV storage and remote sync", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and save calibration settings
    Calibrate(CalibrateArgs),

    /// Run one logging session from the saved calibration
    Start(StartArgs),

    /// Interactive calibrate/start/quit loop
    Console(StartArgs),

    /// Print the effective configuration as TOML
    ShowConfig,
}

#[derive(Args)]
struct CalibrateArgs {
    /// Seconds between readings
    #[arg(long)]
    log_interval: u64,

    /// Remote folder receiving the log files
    #[arg(long)]
    folder_id: String,

    /// Window start date (DD-MM-YYYY)
    #[arg(long, requires_all = ["start_time", "stop_date", "stop_time"])]
    start_date: Option<String>,

    /// Window start time (HH:MM:SS)
    #[arg(long, requires = "start_date")]
    start_time: Option<String>,

    /// Window stop date (DD-MM-YYYY)
    #[arg(long, requires = "start_date")]
    stop_date: Option<String>,

    /// Window stop time (HH:MM:SS)
    #[arg(long, requires = "start_date")]
    stop_time: Option<String>,

    /// Divide raw values by this factor, zeroing readings above 4000
    #[arg(long)]
    division_factor: Option<f64>,
}

impl CalibrateArgs {
    fn settings(&self) -> CalibrationSettings {
        let mut settings = CalibrationSettings::continuous(self.log_interval, &self.folder_id);
        if let (Some(sd), Some(st), Some(ed), Some(et)) = (
            &self.start_date,
            &self.start_time,
            &self.stop_date,
            &self.stop_time,
        ) {
            settings = settings.with_window(sd, st, ed, et);
        }
        if let Some(factor) = self.division_factor {
            settings = settings.with_division_factor(factor.to_string());
        }
        settings
    }
}

#[derive(Args, Clone, Copy)]
struct StartArgs {
    /// Publish to an in-memory store instead of the configured remote
    #[arg(long)]
    dry_run: bool,

    /// Read from a simulated sensor instead of the serial port
    #[arg(long)]
    simulate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    config.validate().context("invalid configuration")?;
    logging::init(config.tracing()?).map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Calibrate(args) => {
            let plan = session::calibrate(&config, &args.settings())
                .context("calibration rejected")?;
            println!(
                "Calibration saved to {} ({} session, every {}s)",
                config.calibration.path.display(),
                if plan.is_bounded() { "bounded" } else { "continuous" },
                plan.log_interval.as_secs()
            );
            Ok(())
        }
        Commands::Start(args) => {
            let report = run_session(&config, args, shutdown_on_ctrl_c()).await?;
            println!("{}", summarize(&report));
            Ok(())
        }
        Commands::Console(args) => {
            let shutdown = shutdown_on_ctrl_c();
            let mut handler = ConsoleHandler {
                config,
                args,
                shutdown: shutdown.clone(),
            };
            let mut input = BufReader::new(tokio::io::stdin());
            let mut output = tokio::io::stdout();
            console::run(&mut input, &mut output, &mut handler, shutdown.clone()).await?;
            if *shutdown.borrow() {
                // The stdin read sits on a blocking thread the runtime would wait for.
                std::process::exit(130);
            }
            Ok(())
        }
        Commands::ShowConfig => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

/// Flip the returned receiver to `true` on the first Ctrl-C.
///
/// One listener serves the whole process, so a console keeps its handler
/// across sessions.
fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });
    shutdown_rx
}

async fn run_session(
    config: &AppConfig,
    args: StartArgs,
    shutdown: watch::Receiver<bool>,
) -> Result<SessionReport, LoggerError> {
    let reader: Arc<dyn RegisterReader> = if args.simulate {
        Arc::new(SimulatedReader::new())
    } else {
        session::serial_reader(config)
    };
    let remote: Arc<dyn RemoteStore> = if args.dry_run {
        Arc::new(MemoryStore::new())
    } else {
        session::directory_remote(config)
    };
    session::start_logging(config, reader, remote, Arc::new(SystemClock), shutdown).await
}

fn summarize(report: &SessionReport) -> String {
    let ending = match report.outcome {
        SessionOutcome::Finished => "Data logging completed",
        SessionOutcome::Interrupted => "Data logging interrupted",
    };
    format!(
        "{ending}: {} rows written, {} reads skipped, {} sync failures",
        report.rows_written, report.reads_failed, report.sync_failures
    )
}

struct ConsoleHandler {
    config: AppConfig,
    args: StartArgs,
    shutdown: watch::Receiver<bool>,
}

#[async_trait]
impl CommandHandler for ConsoleHandler {
    async fn calibrate(&mut self, settings: CalibrationSettings) -> Result<(), LoggerError> {
        session::calibrate(&self.config, &settings).map(|_| ())
    }

    async fn start(&mut self) -> Result<String, LoggerError> {
        let report = run_session(&self.config, self.args, self.shutdown.clone()).await?;
        Ok(summarize(&report))
    }
}
