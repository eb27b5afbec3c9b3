use anyhow::Context;

use warden::config::Config;
use warden::server::connection::CLOSE_GRACE;
use warden::server::{ConnectionManager, Services, listener};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("Failed to load config from {path}"))?,
        None => Config::load().context("Invalid environment configuration")?,
    };

    let manager = ConnectionManager::new(Services::default(), cfg.timeout());

    tokio::select! {
        res = listener::run(&cfg, manager.clone()) => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    // Two grace periods: one for the close frame, one for the half-close.
    manager.shutdown(CLOSE_GRACE * 2).await;

    Ok(())
}
