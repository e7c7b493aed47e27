//! terrad — shuffle controller daemon.
//!
//! Usage: terrad [listen_addr]

use std::sync::Arc;

use anyhow::Result;

use terra_core::config::TerraConfig;
use terra_services::{BatchStore, ControllerService, RpcServer, ShuffleService};

mod components;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = TerraConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let mut config = TerraConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        TerraConfig::default()
    });
    if let Some(listen_addr) = std::env::args().nth(1) {
        config.controller.listen_addr = listen_addr;
    }
    tracing::info!(listen_addr = %config.controller.listen_addr, "terrad starting");

    // Shared state
    let store = BatchStore::with_retention(config.controller.retained_batches);
    let stub = components::dispatch_stub(&config.dispatch);
    let service: Arc<dyn ShuffleService> = Arc::new(ControllerService::new(store.clone(), stub));

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // RPC server
    let server = RpcServer::bind(
        &config.controller.listen_addr,
        service,
        shutdown_tx.subscribe(),
    )
    .await?;
    let bound = server.local_addr()?;
    let server_task = tokio::spawn(server.run());

    // Status HTTP endpoint
    let api_port = config.controller.api_port;
    if api_port > 0 {
        let state = terra_api::ApiState::new(store.clone(), bound.to_string());
        tokio::spawn(async move {
            if let Err(e) = terra_api::serve(state, api_port).await {
                tracing::error!(error = %e, "status server failed");
            }
        });
    }

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        r = server_task        => tracing::error!("rpc server exited: {:?}", r),
    }

    let counts = store.counts();
    tracing::info!(
        total = counts.total,
        dispatched = counts.dispatched,
        failed = counts.failed,
        pending = counts.awaiting_decision,
        "terrad stopped"
    );
    Ok(())
}
