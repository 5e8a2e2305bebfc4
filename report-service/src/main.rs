use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use report_service::{
    config::AppConfig,
    metrics_server, observability,
    report::ReportGenerator,
    server::{self, AppState},
    sources::HttpReadingSource,
    watchlist::{JsonFileStore, Watchlist},
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let source = Arc::new(HttpReadingSource::from_config(&cfg)?);
    let generator = ReportGenerator::new(source.clone(), source, cfg.report_settings()?);

    let watchlist = match &cfg.watchlist {
        Some(w) => {
            let store = Arc::new(JsonFileStore::new(&w.path));
            Some(Arc::new(Mutex::new(Watchlist::load(store).await?)))
        }
        None => None,
    };

    let addr: SocketAddr = cfg
        .server
        .bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid server.bind_addr: {e}"))?;

    let shutdown = CancellationToken::new();
    let state = AppState {
        generator,
        default_volume_policy: cfg.report.volume_policy,
        watchlist,
        shutdown: shutdown.clone(),
    };

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
            return;
        }
        tracing::info!("shutdown requested, cancelling in-flight reports");
        shutdown.cancel();
    });

    server::serve(addr, state).await?;

    Ok(())
}
