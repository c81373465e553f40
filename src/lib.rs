pub mod config;
pub mod engine;
pub mod errors;
pub mod harness;
pub mod logbook;
pub mod models;
pub mod policy;
pub mod runner;
pub mod scheduler;
pub mod session;

use crate::config::{apply_overrides, load_settings, SettingsOverrides};
use crate::runner::BatchRunner;
use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

#[derive(Parser, Debug)]
#[command(
    name = "polar-batch",
    version,
    about = "Compute airfoil polars by driving the rfoil engine"
)]
struct Cli {
    /// YAML or JSON settings file.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    engine: Option<PathBuf>,
    #[arg(long)]
    root: Option<PathBuf>,
    /// Directory holding `<Subject>.dat` definition files.
    #[arg(long)]
    profile_source: Option<PathBuf>,
    /// Subjects, separated by `,`, `;` or spaces.
    #[arg(long)]
    profiles: Option<String>,
    /// Reynolds numbers, separated by `,`, `;` or spaces.
    #[arg(long)]
    reynolds: Option<String>,
    #[arg(long)]
    mach: Option<f64>,
    #[arg(long)]
    angle_max: Option<f64>,
    #[arg(long)]
    angle_step: Option<f64>,
    #[arg(long)]
    tries_max: Option<u32>,
    #[arg(long)]
    max_running: Option<usize>,
    #[arg(long)]
    input_class: Option<String>,
    /// Give up on a launch whose input window has not appeared in time.
    #[arg(long)]
    window_timeout_ms: Option<u64>,
    /// Defaults to `<root>/logs`.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

impl Cli {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            engine_path: self.engine.clone(),
            root_dir: self.root.clone(),
            profile_source_dir: self.profile_source.clone(),
            profiles: self.profiles.clone(),
            reynolds: self.reynolds.clone(),
            mach: self.mach,
            angle_max: self.angle_max,
            angle_step: self.angle_step,
            tries_max: self.tries_max,
            max_running: self.max_running,
            input_class: self.input_class.clone(),
            window_timeout_ms: self.window_timeout_ms,
        }
    }
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let loaded = load_settings(cli.config.as_deref())?;
    let settings = policy::validate_settings(&apply_overrides(loaded, cli.overrides()))?;

    let log_dir = cli
        .log_dir
        .clone()
        .unwrap_or_else(|| settings.root_dir.join("logs"));
    init_tracing(&log_dir).context("failed to initialise logging")?;
    tracing::info!(
        engine = %settings.engine_path.display(),
        root = %settings.root_dir.display(),
        profiles = ?settings.profiles,
        reynolds = ?settings.reynolds,
        max_running = settings.max_running,
        "batch starting"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(async move {
        let host = engine::native_host()?;
        let runner = BatchRunner::new(settings, host);

        let scheduler = runner.scheduler();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling batch");
                scheduler.cancel();
            }
        });

        runner.run().await?;
        tracing::info!("batch finished");
        Ok::<(), anyhow::Error>(())
    })
}

fn init_tracing(log_dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "polar-batch.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .try_init()?;
    Ok(())
}
