//! Standard scaler fit at training time
//!
//! The artifact is a JSON object `{"mean": [..], "scale": [..]}` exported
//! from the training pipeline's scaler; `transform` applies
//! `(x - mean) / scale` per feature.

use super::features::NUM_FEATURES;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct ScalerArtifact {
    mean: Vec<f32>,
    scale: Vec<f32>,
}

/// Immutable mean/variance normalization
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureScaler {
    mean: [f32; NUM_FEATURES],
    scale: [f32; NUM_FEATURES],
}

impl FeatureScaler {
    pub fn new(mean: [f32; NUM_FEATURES], scale: [f32; NUM_FEATURES]) -> Result<Self> {
        for (idx, s) in scale.iter().enumerate() {
            if !s.is_finite() || *s == 0.0 {
                anyhow::bail!("scale[{}] must be finite and non-zero, got {}", idx, s);
            }
        }
        if let Some(idx) = mean.iter().position(|m| !m.is_finite()) {
            anyhow::bail!("mean[{}] is not finite", idx);
        }
        Ok(Self { mean, scale })
    }

    /// Scaler that leaves features unchanged
    pub fn identity() -> Self {
        Self {
            mean: [0.0; NUM_FEATURES],
            scale: [1.0; NUM_FEATURES],
        }
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let artifact: ScalerArtifact =
            serde_json::from_slice(bytes).context("Failed to parse scaler artifact")?;

        let mean: [f32; NUM_FEATURES] = artifact.mean.try_into().map_err(|v: Vec<f32>| {
            anyhow::anyhow!("Scaler mean has {} values, expected {}", v.len(), NUM_FEATURES)
        })?;
        let scale: [f32; NUM_FEATURES] = artifact.scale.try_into().map_err(|v: Vec<f32>| {
            anyhow::anyhow!("Scaler scale has {} values, expected {}", v.len(), NUM_FEATURES)
        })?;

        Self::new(mean, scale)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read scaler artifact {:?}", path))?;
        Self::from_json(&bytes)
    }

    pub fn transform(&self, features: &[f32; NUM_FEATURES]) -> [f32; NUM_FEATURES] {
        let mut out = [0.0; NUM_FEATURES];
        for i in 0..NUM_FEATURES {
            out[i] = (features[i] - self.mean[i]) / self.scale[i];
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_standardizes() {
        let scaler = FeatureScaler::new([40.0, 0.1, 0.05, 28.0], [20.0, 0.3, 0.2, 7.0]).unwrap();
        let out = scaler.transform(&[60.0, 1.0, 0.0, 35.0]);
        assert!((out[0] - 1.0).abs() < 1e-6);
        assert!((out[1] - 3.0).abs() < 1e-6);
        assert!((out[2] + 0.25).abs() < 1e-6);
        assert!((out[3] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_from_json() {
        let json = br#"{"mean":[43.2,0.09,0.05,28.9],"scale":[22.6,0.29,0.22,7.8]}"#;
        let scaler = FeatureScaler::from_json(json).unwrap();
        let out = scaler.transform(&[43.2, 0.09, 0.05, 28.9]);
        assert!(out.iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn test_wrong_length_rejected() {
        let json = br#"{"mean":[1.0,2.0,3.0],"scale":[1.0,1.0,1.0]}"#;
        let err = FeatureScaler::from_json(json).unwrap_err();
        assert!(err.to_string().contains("expected 4"));
    }

    #[test]
    fn test_zero_scale_rejected() {
        assert!(FeatureScaler::new([0.0; 4], [1.0, 0.0, 1.0, 1.0]).is_err());
    }

    #[test]
    fn test_identity() {
        let features = [65.0, 1.0, 0.0, 27.7];
        assert_eq!(FeatureScaler::identity().transform(&features), features);
    }
}
