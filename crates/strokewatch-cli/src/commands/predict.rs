//! Prediction commands

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

use crate::client::{ApiClient, PredictionResult, TabularInput};
use crate::output::{color_risk, format_confidence, print_json, print_warning, OutputFormat};

/// Multipart field the service reads the photo from
const UPLOAD_FIELD: &str = "userPhoto";

const ACCEPTED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

pub async fn predict_tabular(client: &ApiClient, input: &TabularInput, format: OutputFormat) -> Result<()> {
    let result: PredictionResult = client.post("api/v1/predict/tabular", input).await?;
    print_prediction(&result, format);
    Ok(())
}

pub async fn predict_image(client: &ApiClient, file: &Path, format: OutputFormat) -> Result<()> {
    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("{:?} has no usable file name", file))?;

    let accepted = file
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| ACCEPTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    if !accepted {
        anyhow::bail!(
            "{} is not an accepted image type ({})",
            filename,
            ACCEPTED_EXTENSIONS.join(", ")
        );
    }

    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {:?}", file))?;

    let result: PredictionResult = client
        .post_file("api/v1/predict/image", UPLOAD_FIELD, filename, bytes)
        .await?;
    print_prediction(&result, format);
    Ok(())
}

fn print_prediction(result: &PredictionResult, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(result),
        OutputFormat::Table => {
            println!("{}", "Stroke Risk".bold());
            println!("{}", "=".repeat(40));
            println!("Risk:        {}", color_risk(result.risk_percentage));

            if let Some(label) = &result.label {
                println!("Label:       {}", label.cyan());
            }
            if let Some(confidence) = result.confidence {
                println!("Confidence:  {}", format_confidence(confidence));
            }
            if let Some(bmi) = result.bmi {
                println!("BMI:         {:.1}", bmi);
            }

            println!();
            print_warning("This estimate is not a diagnosis. Consult a doctor about any concern.");
        }
    }
}
