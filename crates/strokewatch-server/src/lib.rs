//! StrokeWatch HTTP service
//!
//! Wires the application core into an axum router. The binary in `main.rs`
//! only installs logging, loads configuration and runs what is built here.

pub mod api;
pub mod config;

use anyhow::Result;
use api::{AppState, UploadPolicy};
use config::ServiceConfig;
use std::sync::Arc;
use strokewatch_lib::{
    artifacts::{ArtifactManager, ArtifactStore},
    community::CommunityStore,
    error::error_chain,
    gateway::InferenceGateway,
    health::{components, HealthRegistry},
    observability::{ServiceMetrics, StructuredLogger},
};
use tracing::warn;

pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Load the models, open the stores and report component health
///
/// Model loading failures do not abort startup: the affected backend answers
/// with 503 and the `gateway` component reports it.
pub async fn build_state(config: &ServiceConfig) -> Result<Arc<AppState>> {
    let logger = StructuredLogger::new(&config.instance_name);
    let metrics = ServiceMetrics::new();
    let health_registry = HealthRegistry::new();

    let gateway_config = config.gateway_config();
    let gateway = tokio::task::spawn_blocking(move || InferenceGateway::load(&gateway_config)).await?;
    health_registry
        .report_gateway(gateway.tabular_ready(), gateway.image_ready())
        .await;

    let artifact_store = ArtifactStore::new(&config.upload_dir);
    let prepared = {
        let store = artifact_store.clone();
        tokio::task::spawn_blocking(move || store.ensure_dir().and_then(|_| store.purge())).await?
    };
    match prepared {
        Ok(_) => health_registry.register(components::ARTIFACTS).await,
        Err(e) => {
            warn!(error = %format!("{:#}", e), "Upload directory unusable");
            health_registry
                .set_unhealthy(components::ARTIFACTS, format!("{:#}", e))
                .await;
        }
    }

    let community = Arc::new(CommunityStore::new(&config.posts_path, logger.clone()));
    match community.counts().await {
        Ok(counts) => {
            metrics.set_post_counts(&counts);
            health_registry.register(components::COMMUNITY_STORE).await;
        }
        Err(e) => {
            let reason = error_chain(&e);
            warn!(error = %reason, "Posts document unreadable");
            health_registry
                .set_unhealthy(components::COMMUNITY_STORE, reason)
                .await;
        }
    }

    logger.log_startup(SERVICE_VERSION, gateway.tabular_ready(), gateway.image_ready());

    Ok(Arc::new(AppState {
        health_registry,
        metrics,
        artifacts: Arc::new(ArtifactManager::new(logger.clone())),
        logger,
        gateway: Arc::new(gateway),
        artifact_store,
        community,
        upload_policy: UploadPolicy {
            delete_delay: config.upload_delete_delay(),
            ttl_secs: config.artifact_ttl_secs,
            max_bytes: config.max_upload_bytes,
        },
    }))
}
