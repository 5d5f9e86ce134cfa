//! Error taxonomy for the application core

use std::error::Error as StdError;
use thiserror::Error;

/// Errors returned by the inference gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Prediction inputs were malformed or out of range
    #[error("validation error: {0}")]
    Validation(String),

    /// Model artifacts were missing or corrupt at startup
    #[error("{backend} backend unavailable: {reason}")]
    BackendUnavailable { backend: &'static str, reason: String },

    /// A predictor failed while running
    #[error("inference failed")]
    Inference(#[source] anyhow::Error),
}

impl GatewayError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Errors returned by the community store
#[derive(Debug, Error)]
pub enum StoreError {
    /// No post matches the category and id
    #[error("post {id} not found in {category}")]
    NotFound { category: String, id: u64 },

    /// Post fields were rejected before touching the document
    #[error("validation error: {0}")]
    Validation(String),

    /// The document could not be read or written
    #[error("posts document error")]
    Persistence(#[source] anyhow::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Errors returned when storing an uploaded artifact
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// The client filename has no usable name or extension
    #[error("invalid filename: {0:?}")]
    InvalidFilename(String),

    /// The extension is not one of the accepted image types
    #[error("unsupported file type {extension:?}, expected one of png, jpg, jpeg, gif")]
    UnsupportedType { extension: String },

    #[error("failed to store artifact")]
    Storage(#[from] std::io::Error),
}

/// Render an error and its sources as `outer: cause: root`
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}
