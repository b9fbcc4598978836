//! probefixd — the probe timeout reconciliation daemon.
//!
//! Watches every Deployment and StatefulSet in the cluster and rewrites
//! liveness/readiness probes with `timeoutSeconds: 1` to
//! `timeoutSeconds: 5`.
//!
//! # Usage
//!
//! ```text
//! probefixd --config /etc/probefix/probefix.toml --timer-interval 30s
//! ```

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use probefix_core::{ControllerConfig, LogFormat};

#[derive(Parser)]
#[command(name = "probefixd", about = "Probe timeout reconciliation controller")]
struct Cli {
    /// Path to a probefix.toml config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Interval between periodic re-checks, e.g. "30s".
    #[arg(long)]
    timer_interval: Option<String>,

    /// Maximum number of concurrent reconciliation passes.
    #[arg(long)]
    workers: Option<usize>,

    /// Log output format.
    #[arg(long, value_enum)]
    log_format: Option<LogFormatArg>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

impl Cli {
    /// Load the config file (or defaults) and apply flag overrides.
    fn resolve_config(&self) -> anyhow::Result<ControllerConfig> {
        let mut config = match &self.config {
            Some(path) => ControllerConfig::read_file(path)?,
            None => ControllerConfig::default(),
        };

        if let Some(interval) = &self.timer_interval {
            config.timer_interval = interval.clone();
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format.into();
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(config: &ControllerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;

    init_tracing(&config);

    info!("probefixd starting");

    let client = kube::Client::try_default().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
        }
        let _ = shutdown_tx.send(true);
    });

    probefix_watch::run_controller(client, &config, shutdown_rx).await?;

    info!("probefixd stopped");
    Ok(())
}
