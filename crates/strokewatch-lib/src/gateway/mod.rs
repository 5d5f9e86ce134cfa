//! Inference gateway
//!
//! Routes a `PredictionRequest` to the tabular or image backend and
//! normalizes the answer into a `PredictionResult`. Both backends are
//! loaded once at startup and are read-only afterwards, so the gateway is
//! shared across requests without locking.

mod features;
mod inference;
mod scaler;
mod vision;

pub use features::{body_mass_index, FeatureExtractor, TabularFeatures, MAX_AGE_YEARS, NUM_FEATURES};
pub use inference::{load_risk_classifier, LogisticRiskClassifier, OnnxRiskClassifier, RiskClassifier};
pub use scaler::FeatureScaler;
pub use vision::{
    ImageClassification, ImageClassifier, ImageModelConfig, OnnxImageClassifier, DEFAULT_INPUT_SIZE,
};

use crate::error::GatewayError;
use crate::models::{PredictionRequest, PredictionResult, TabularInput};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Inference latency above which a warning is logged
pub const SLOW_INFERENCE: Duration = Duration::from_millis(250);

pub const TABULAR_BACKEND: &str = "tabular";
pub const IMAGE_BACKEND: &str = "image";

/// A backend that either loaded or failed to load at startup
pub enum Backend<T> {
    Ready(T),
    Unavailable(String),
}

impl<T> Backend<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Backend::Ready(_))
    }

    fn get(&self, name: &'static str) -> Result<&T, GatewayError> {
        match self {
            Backend::Ready(backend) => Ok(backend),
            Backend::Unavailable(reason) => Err(GatewayError::BackendUnavailable {
                backend: name,
                reason: reason.clone(),
            }),
        }
    }
}

/// Scaler and classifier pair for questionnaire predictions
pub struct TabularPredictor {
    scaler: FeatureScaler,
    classifier: Box<dyn RiskClassifier>,
}

impl TabularPredictor {
    pub fn new(scaler: FeatureScaler, classifier: Box<dyn RiskClassifier>) -> Self {
        Self { scaler, classifier }
    }

    pub fn load(classifier_path: &Path, scaler_path: &Path) -> anyhow::Result<Self> {
        let scaler = FeatureScaler::load(scaler_path)?;
        let classifier = load_risk_classifier(classifier_path)?;
        Ok(Self::new(scaler, classifier))
    }

    /// Positive-class probability for the given features
    pub fn predict_proba(&self, features: &TabularFeatures) -> anyhow::Result<f32> {
        let scaled = self.scaler.transform(&features.to_array());
        self.classifier.predict_proba(&scaled)
    }

    pub fn kind(&self) -> &'static str {
        self.classifier.kind()
    }
}

/// Paths and settings used to load the gateway's backends
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub tabular_model_path: PathBuf,
    pub scaler_path: PathBuf,
    pub image_model_path: PathBuf,
    pub image_model: ImageModelConfig,
    /// Image label that counts towards stroke risk
    pub positive_label: String,
}

/// Counters describing gateway traffic
#[derive(Debug, Clone, Default)]
pub struct GatewayStats {
    pub tabular_predictions: u64,
    pub image_predictions: u64,
    pub failed_predictions: u64,
    pub slow_predictions: u64,
}

/// Single entry point for both predictive backends
pub struct InferenceGateway {
    tabular: Backend<TabularPredictor>,
    image: Backend<Arc<dyn ImageClassifier>>,
    positive_label: String,
    tabular_count: AtomicU64,
    image_count: AtomicU64,
    failure_count: AtomicU64,
    slow_count: AtomicU64,
}

impl InferenceGateway {
    pub fn new(
        tabular: Backend<TabularPredictor>,
        image: Backend<Arc<dyn ImageClassifier>>,
        positive_label: impl Into<String>,
    ) -> Self {
        Self {
            tabular,
            image,
            positive_label: positive_label.into(),
            tabular_count: AtomicU64::new(0),
            image_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            slow_count: AtomicU64::new(0),
        }
    }

    /// Load both backends; a backend that fails to load is kept as unavailable
    pub fn load(config: &GatewayConfig) -> Self {
        let tabular = match TabularPredictor::load(&config.tabular_model_path, &config.scaler_path) {
            Ok(predictor) => {
                info!(
                    classifier = %config.tabular_model_path.display(),
                    scaler = %config.scaler_path.display(),
                    kind = predictor.kind(),
                    "Tabular risk model loaded"
                );
                Backend::Ready(predictor)
            }
            Err(e) => {
                error!(error = %format!("{:#}", e), "Tabular risk model unavailable");
                Backend::Unavailable(format!("{:#}", e))
            }
        };

        let image = match OnnxImageClassifier::load(&config.image_model_path, config.image_model.clone()) {
            Ok(classifier) => {
                info!(
                    model = %config.image_model_path.display(),
                    labels = ?config.image_model.labels,
                    "Image classifier loaded"
                );
                Backend::Ready(Arc::new(classifier) as Arc<dyn ImageClassifier>)
            }
            Err(e) => {
                error!(error = %format!("{:#}", e), "Image classifier unavailable");
                Backend::Unavailable(format!("{:#}", e))
            }
        };

        Self::new(tabular, image, config.positive_label.clone())
    }

    pub fn tabular_ready(&self) -> bool {
        self.tabular.is_ready()
    }

    pub fn image_ready(&self) -> bool {
        self.image.is_ready()
    }

    /// Route a request to its backend and normalize the result
    pub fn predict(&self, request: &PredictionRequest) -> Result<PredictionResult, GatewayError> {
        let start = Instant::now();

        let result = match request {
            PredictionRequest::Tabular(input) => self.predict_tabular(input),
            PredictionRequest::Image { artifact_path } => self.predict_image(artifact_path),
        };

        let elapsed = start.elapsed();
        match &result {
            Ok(_) => {
                if elapsed > SLOW_INFERENCE {
                    self.slow_count.fetch_add(1, Ordering::Relaxed);
                    warn!(elapsed_ms = elapsed.as_millis(), "Prediction exceeded {}ms", SLOW_INFERENCE.as_millis());
                } else {
                    debug!(elapsed_us = elapsed.as_micros(), "Prediction completed");
                }
            }
            Err(GatewayError::Validation(_)) => {}
            Err(_) => {
                self.failure_count.fetch_add(1, Ordering::Relaxed);
            }
        }

        result
    }

    fn predict_tabular(&self, input: &TabularInput) -> Result<PredictionResult, GatewayError> {
        let features = FeatureExtractor::extract(input)?;
        let predictor = self.tabular.get(TABULAR_BACKEND)?;

        let probability = predictor.predict_proba(&features).map_err(GatewayError::Inference)?;
        self.tabular_count.fetch_add(1, Ordering::Relaxed);

        Ok(PredictionResult {
            risk_percentage: to_percentage(probability),
            label: None,
            confidence: None,
            bmi: Some(features.bmi),
        })
    }

    fn predict_image(&self, artifact_path: &Path) -> Result<PredictionResult, GatewayError> {
        let classifier = self.image.get(IMAGE_BACKEND)?;

        let ImageClassification { label, confidence } =
            classifier.classify(artifact_path).map_err(GatewayError::Inference)?;
        self.image_count.fetch_add(1, Ordering::Relaxed);

        let confidence = confidence.clamp(0.0, 1.0);
        let positive_probability = if label == self.positive_label {
            confidence
        } else {
            1.0 - confidence
        };

        Ok(PredictionResult {
            risk_percentage: to_percentage(positive_probability),
            label: Some(label),
            confidence: Some(confidence),
            bmi: None,
        })
    }

    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            tabular_predictions: self.tabular_count.load(Ordering::Relaxed),
            image_predictions: self.image_count.load(Ordering::Relaxed),
            failed_predictions: self.failure_count.load(Ordering::Relaxed),
            slow_predictions: self.slow_count.load(Ordering::Relaxed),
        }
    }
}

fn to_percentage(probability: f32) -> f32 {
    (probability * 100.0).clamp(0.0, 100.0)
}
