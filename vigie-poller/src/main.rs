//! Vigie poller daemon entry point.
//!
//! Startup order matters: logging, then configuration, then the radio
//! gateway (fatal if unreachable), then the sink client. SIGINT/SIGTERM
//! cancel the poll loop at its next await point and trigger the orderly
//! shutdown sequence: close the gateway transport, release the broker
//! connection, exit 0.

use anyhow::{Context, Result};
use tracing::info;
use vigie_poller::config::PollerConfig;
use vigie_poller::reader::CoordinatorClient;
use vigie_poller::scheduler::PollScheduler;
use vigie_poller::sink::MqttSink;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    info!("Vigie poller starting...");

    let config = PollerConfig::load()
        .await
        .context("Failed to load configuration")?;
    info!(
        "Configuration loaded - {} devices, {} metrics, historic interval {} cycles",
        config.devices.len(),
        config.endpoints.len(),
        config.poll.value_historic_interval
    );

    let reader = CoordinatorClient::connect(&config.transport)
        .await
        .context("Failed to establish radio gateway controller")?;

    let sink = match MqttSink::connect(&config.sink) {
        Ok(sink) => sink,
        Err(e) => {
            // Partially-initialized resources are released before exiting.
            reader.close().await;
            return Err(e.context("Failed to set up sink client"));
        }
    };

    let mut scheduler = PollScheduler::new(&config, reader, sink);

    tokio::select! {
        _ = scheduler.run() => {}
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping poll loop");
        }
    }

    let (reader, sink) = scheduler.into_parts();
    reader.close().await;
    sink.close().await;

    info!("Shutdown complete");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}
