//! Application core for the StrokeWatch service
//!
//! This crate provides:
//! - An inference gateway over the tabular and image risk models
//! - Lifetime management for uploaded artifacts
//! - The community board store
//! - Health checks and observability

pub mod artifacts;
pub mod community;
pub mod error;
pub mod gateway;
pub mod health;
pub mod models;
pub mod observability;

pub use artifacts::{ArtifactManager, ArtifactStats, ArtifactStore, ArtifactSweeper, DeleteOutcome, PendingDelete};
pub use community::CommunityStore;
pub use error::{ArtifactError, GatewayError, StoreError};
pub use gateway::{GatewayConfig, InferenceGateway};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ServiceMetrics, StructuredLogger};
