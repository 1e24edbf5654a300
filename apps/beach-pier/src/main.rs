use anyhow::{Context, Result};
use beach_pier::{
    config::{Cli, Config},
    handlers::{router, AppState},
    relay::RelayState,
    telemetry::Telemetry,
};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!("beach-pier failed: {err:#}");
        eprintln!("beach-pier failed: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let telemetry = Telemetry::init()?;

    let cli = Cli::parse();
    let config = Config::load(&cli);
    info!(
        listen_addr = %config.listen_addr(),
        heartbeat_interval_ms = config.heartbeat_interval.as_millis() as u64,
        "starting beach-pier"
    );

    let relay = RelayState::new();
    let heartbeat = relay.spawn_heartbeat(config.heartbeat_interval);
    let app = router(AppState::new(relay).with_metrics(telemetry.metrics_handle()));

    let listener = tokio::net::TcpListener::bind(config.listen_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr()))?;

    info!("beach-pier listening on {}", config.listen_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server shutdown with error")?;

    heartbeat.shutdown().await;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
}
