//! notifr - notification relay
//!
//! Accepts messages over HTTP and relays them to the delivery channels
//! configured for a named target.

use anyhow::Result;
use clap::Parser;
use notifr::{app::App, cli::Cli, config::Config, internal_metrics::LoggingRecorder};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(config: &Config) {
    let default_level = if config.dev_mode {
        "debug"
    } else {
        config.log_level.as_str()
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.dev_mode {
        builder.pretty().init();
    } else {
        builder.compact().init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli).unwrap_or_else(|err| {
        eprintln!("Invalid configuration: {err:#}");
        std::process::exit(1);
    });

    init_logging(&config);

    info!("-------------------- Configuration --------------------");
    info!("Dev Mode: {}", config.dev_mode);
    info!("Log Metrics: {}", config.log_metrics);
    info!("Listen: {}", config.listen);
    info!("Targets: {}", config.targets);
    info!("SMTP Relay: {}:{}", config.smtp.host, config.smtp.port);
    info!(
        "SMTP From: {}",
        config.smtp.from.as_deref().unwrap_or("(default)")
    );
    info!("SMTP Retries: {}", config.smtp.retries);
    info!("-------------------------------------------------------");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut metrics_task = None;
    if config.log_metrics {
        info!(
            "Logging recorder enabled. Metrics will be printed every {} seconds.",
            config.log_metrics_seconds
        );
        let (recorder, handle) = LoggingRecorder::new(
            Duration::from_secs(config.log_metrics_seconds.max(1)),
            shutdown_rx.clone(),
        );
        if metrics::set_global_recorder(recorder).is_err() {
            warn!("A metrics recorder is already installed; counters will not be logged");
        }
        metrics_task = Some(handle);
    }

    let app = match App::builder(config).build(shutdown_rx).await {
        Ok(app) => app,
        Err(err) => {
            error!("Failed to start: {:#}", err);
            std::process::exit(1);
        }
    };

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutdown signal received. Shutting down gracefully...");
        let _ = shutdown_tx.send(true);
    });

    let result = app.run().await;
    if let Some(handle) = metrics_task {
        let _ = handle.await;
    }
    result
}
