use asset_drain_monitor::{api, config, monitor, state};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // RUST_LOG overrides; info by default
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stdout)
        .with_target(false)
        .init();

    info!("Asset drain monitor starting...");

    let cfg = config::load()?;
    info!("  RPC URL: {}", cfg.rpc_http_url);
    info!("  Port: {}", cfg.port);
    info!("  Confirmations: {}", cfg.confirmations);
    info!("  Lookback: {:?}", cfg.lookback);

    let state = state::AppState::shared(cfg.findings_history);

    // Spawn API task
    let api_handle = tokio::spawn({
        let cfg = cfg.clone();
        let state = state.clone();
        async move { api::serve(cfg, state).await }
    });

    // Spawn monitor task
    let monitor_handle = tokio::spawn({
        let cfg = cfg.clone();
        let state = state.clone();
        async move { monitor::run(cfg, state).await }
    });

    // Graceful shutdown
    tokio::select! {
        res = api_handle => match res {
            Ok(Ok(_)) => info!("API exited cleanly"),
            Ok(Err(e)) => error!("API error: {:?}", e),
            Err(e) => error!("API task panicked: {:?}", e),
        },
        res = monitor_handle => match res {
            Ok(Ok(_)) => info!("Monitor exited cleanly"),
            Ok(Err(e)) => error!("Monitor error: {:?}", e),
            Err(e) => error!("Monitor task panicked: {:?}", e),
        },
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received, stopping...");
        }
    }

    info!("Asset drain monitor stopped.");
    Ok(())
}
