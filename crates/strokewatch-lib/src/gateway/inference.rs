//! Tabular risk classifiers
//!
//! Two artifact formats are supported: an ONNX export of the trained
//! network, run with tract, and a JSON export of logistic-regression
//! coefficients. Both return the positive-class probability for an
//! already-scaled feature vector.

use super::features::NUM_FEATURES;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tract_onnx::prelude::*;

pub(crate) type TractModel =
    SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Trait for tabular classifier implementations
pub trait RiskClassifier: Send + Sync {
    /// Positive-class probability in `[0, 1]` for a scaled feature vector
    fn predict_proba(&self, scaled: &[f32; NUM_FEATURES]) -> Result<f32>;

    /// Short name of the backing artifact format
    fn kind(&self) -> &'static str;
}

/// Load a classifier, picking the format from the file extension
pub fn load_risk_classifier(path: &Path) -> Result<Box<dyn RiskClassifier>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read classifier artifact {:?}", path))?;

    match path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()) {
        Some(ext) if ext == "onnx" => Ok(Box::new(OnnxRiskClassifier::new(&bytes)?)),
        Some(ext) if ext == "json" => Ok(Box::new(LogisticRiskClassifier::from_json(&bytes)?)),
        _ => anyhow::bail!("Unsupported classifier artifact {:?}, expected .onnx or .json", path),
    }
}

fn check_probability(p: f32) -> Result<f32> {
    if !p.is_finite() || !(0.0..=1.0).contains(&p) {
        anyhow::bail!("Model produced {} which is not a probability", p);
    }
    Ok(p)
}

/// ONNX classifier run with tract
pub struct OnnxRiskClassifier {
    model: TractModel,
}

impl OnnxRiskClassifier {
    pub fn new(model_bytes: &[u8]) -> Result<Self> {
        let model = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))
            .context("Failed to parse ONNX model")?
            .with_input_fact(0, f32::fact([1, NUM_FEATURES]).into())
            .context("Failed to set input shape")?
            .into_optimized()
            .context("Failed to optimize model")?
            .into_runnable()
            .context("Failed to create runnable model")?;
        Ok(Self { model })
    }
}

impl RiskClassifier for OnnxRiskClassifier {
    fn predict_proba(&self, scaled: &[f32; NUM_FEATURES]) -> Result<f32> {
        let input: Tensor = tract_ndarray::Array2::from_shape_vec((1, NUM_FEATURES), scaled.to_vec())
            .context("Failed to shape input tensor")?
            .into();

        let result = self.model.run(tvec!(input.into()))?;
        let output = result.first().context("No output from model")?;
        let values: Vec<f32> = output.to_array_view::<f32>()?.iter().copied().collect();

        // A single sigmoid unit, or one probability per class with the
        // positive class second.
        let p = match values.as_slice() {
            [p] => *p,
            [_, p, ..] => *p,
            [] => anyhow::bail!("Model output is empty"),
        };
        check_probability(p)
    }

    fn kind(&self) -> &'static str {
        "onnx"
    }
}

#[derive(Debug, Deserialize)]
struct LogisticArtifact {
    weights: Vec<f32>,
    bias: f32,
}

/// Logistic regression over exported coefficients
#[derive(Debug, Clone)]
pub struct LogisticRiskClassifier {
    weights: [f32; NUM_FEATURES],
    bias: f32,
}

impl LogisticRiskClassifier {
    pub fn new(weights: [f32; NUM_FEATURES], bias: f32) -> Self {
        Self { weights, bias }
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let artifact: LogisticArtifact =
            serde_json::from_slice(bytes).context("Failed to parse classifier coefficients")?;
        let weights: [f32; NUM_FEATURES] = artifact.weights.try_into().map_err(|v: Vec<f32>| {
            anyhow::anyhow!("Classifier has {} weights, expected {}", v.len(), NUM_FEATURES)
        })?;
        if weights.iter().any(|w| !w.is_finite()) || !artifact.bias.is_finite() {
            anyhow::bail!("Classifier coefficients must be finite");
        }
        Ok(Self::new(weights, artifact.bias))
    }
}

impl RiskClassifier for LogisticRiskClassifier {
    fn predict_proba(&self, scaled: &[f32; NUM_FEATURES]) -> Result<f32> {
        let z: f32 = self
            .weights
            .iter()
            .zip(scaled.iter())
            .map(|(w, x)| w * x)
            .sum::<f32>()
            + self.bias;
        check_probability(1.0 / (1.0 + (-z).exp()))
    }

    fn kind(&self) -> &'static str {
        "logistic"
    }
}
