//! StrokeWatch - stroke risk prediction and community board service

use anyhow::Result;
use std::sync::Arc;
use strokewatch::{api, build_state, config::ServiceConfig};
use strokewatch_lib::artifacts::ArtifactSweeper;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting strokewatch");

    let config = ServiceConfig::load()?;
    info!(
        instance = %config.instance_name,
        upload_dir = %config.upload_dir.display(),
        posts_path = %config.posts_path.display(),
        "Service configured"
    );

    let state = build_state(&config).await?;
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let sweeper = ArtifactSweeper::new(Arc::clone(&state.artifacts), config.sweep_interval());
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown_tx.subscribe()));

    let api_handle = tokio::spawn(api::serve(
        config.listen_addr(),
        Arc::clone(&state),
        shutdown_tx.subscribe(),
    ));

    state.health_registry.set_ready(true).await;

    tokio::signal::ctrl_c().await?;
    state.logger.log_shutdown("SIGINT received");
    state.health_registry.set_ready(false).await;
    let _ = shutdown_tx.send(());

    match api_handle.await {
        Ok(Err(e)) => warn!(error = %e, "API server exited with error"),
        Err(e) => warn!(error = %e, "API server task panicked"),
        Ok(Ok(())) => {}
    }
    let _ = sweeper_handle.await;

    // Scheduled deletions die with the runtime; clear what is still tracked
    let removed = state.artifacts.sweep_all();
    info!(removed, "Shut down");

    Ok(())
}
