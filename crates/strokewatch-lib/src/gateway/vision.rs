//! Image risk classifier
//!
//! The gateway only depends on the `ImageClassifier` capability. The ONNX
//! implementation decodes the artifact, resizes it to the model's square
//! input, scales pixels to `[0, 1]` in NHWC order and maps the model output
//! onto the configured label list.

use super::inference::TractModel;
use anyhow::{Context, Result};
use image::imageops::FilterType;
use std::path::Path;
use tract_onnx::prelude::*;

/// Default square input edge for the image model
pub const DEFAULT_INPUT_SIZE: u32 = 224;

/// Label and confidence returned by an image classifier
#[derive(Debug, Clone, PartialEq)]
pub struct ImageClassification {
    pub label: String,
    pub confidence: f32,
}

/// Capability consumed by the gateway for image requests
pub trait ImageClassifier: Send + Sync {
    fn classify(&self, artifact_path: &Path) -> Result<ImageClassification>;
}

/// Preprocessing and label settings for `OnnxImageClassifier`
#[derive(Debug, Clone)]
pub struct ImageModelConfig {
    /// Square edge the image is resized to
    pub input_size: u32,
    /// Class labels in model output order; with a single sigmoid output the
    /// second label is the positive class
    pub labels: Vec<String>,
}

impl Default for ImageModelConfig {
    fn default() -> Self {
        Self {
            input_size: DEFAULT_INPUT_SIZE,
            labels: vec!["normal".to_string(), "stroke".to_string()],
        }
    }
}

/// ONNX image classifier run with tract
pub struct OnnxImageClassifier {
    model: TractModel,
    config: ImageModelConfig,
}

impl OnnxImageClassifier {
    pub fn new(model_bytes: &[u8], config: ImageModelConfig) -> Result<Self> {
        if config.labels.len() < 2 {
            anyhow::bail!("Image classifier needs at least two labels, got {}", config.labels.len());
        }
        if config.input_size == 0 {
            anyhow::bail!("Image input size must be positive");
        }

        let edge = config.input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))
            .context("Failed to parse ONNX image model")?
            .with_input_fact(0, f32::fact([1, edge, edge, 3]).into())
            .context("Failed to set input shape")?
            .into_optimized()
            .context("Failed to optimize image model")?
            .into_runnable()
            .context("Failed to create runnable image model")?;

        Ok(Self { model, config })
    }

    pub fn load(path: &Path, config: ImageModelConfig) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read image model {:?}", path))?;
        Self::new(&bytes, config)
    }

    fn image_to_tensor(&self, path: &Path) -> Result<Tensor> {
        let img = image::ImageReader::open(path)
            .with_context(|| format!("Failed to open image {:?}", path))?
            .with_guessed_format()
            .context("Failed to detect image format")?
            .decode()
            .context("Failed to decode image")?;

        let edge = self.config.input_size;
        let rgb = img.resize_exact(edge, edge, FilterType::Triangle).to_rgb8();
        let data: Vec<f32> = rgb.into_raw().into_iter().map(|b| b as f32 / 255.0).collect();

        let n = edge as usize;
        let tensor = tract_ndarray::Array4::from_shape_vec((1, n, n, 3), data)
            .context("Failed to shape image tensor")?
            .into();
        Ok(tensor)
    }
}

/// Map raw model scores onto the label list
fn scores_to_classification(values: &[f32], labels: &[String]) -> Result<ImageClassification> {
    match values.len() {
        0 => anyhow::bail!("Image model output is empty"),
        1 => {
            let p = values[0];
            if !p.is_finite() {
                anyhow::bail!("Image model produced a non-finite score");
            }
            let p = p.clamp(0.0, 1.0);
            if p >= 0.5 {
                Ok(ImageClassification { label: labels[1].clone(), confidence: p })
            } else {
                Ok(ImageClassification { label: labels[0].clone(), confidence: 1.0 - p })
            }
        }
        n if n == labels.len() => {
            let (idx, score) = values
                .iter()
                .copied()
                .enumerate()
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                .context("Image model output is empty")?;
            if !score.is_finite() {
                anyhow::bail!("Image model produced a non-finite score");
            }
            Ok(ImageClassification {
                label: labels[idx].clone(),
                confidence: score.clamp(0.0, 1.0),
            })
        }
        n => anyhow::bail!("Image model has {} outputs but {} labels are configured", n, labels.len()),
    }
}

impl ImageClassifier for OnnxImageClassifier {
    fn classify(&self, artifact_path: &Path) -> Result<ImageClassification> {
        let input = self.image_to_tensor(artifact_path)?;
        let result = self.model.run(tvec!(input.into()))?;
        let output = result.first().context("No output from image model")?;
        let values: Vec<f32> = output.to_array_view::<f32>()?.iter().copied().collect();
        scores_to_classification(&values, &self.config.labels)
    }
}
