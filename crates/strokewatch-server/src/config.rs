//! Service configuration
//!
//! Every field can be set through a `STROKEWATCH_`-prefixed environment
//! variable, e.g. `STROKEWATCH_API_PORT=9000` or
//! `STROKEWATCH_IMAGE_LABELS=normal,stroke`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use strokewatch_lib::gateway::{GatewayConfig, ImageModelConfig};

const ENV_PREFIX: &str = "STROKEWATCH";

/// Service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Name attached to structured log events
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Directory uploaded images are written to; emptied on startup
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Community board document
    #[serde(default = "default_posts_path")]
    pub posts_path: PathBuf,

    /// `.onnx` network or `.json` logistic coefficients
    #[serde(default = "default_tabular_model_path")]
    pub tabular_model_path: PathBuf,

    #[serde(default = "default_scaler_path")]
    pub scaler_path: PathBuf,

    #[serde(default = "default_image_model_path")]
    pub image_model_path: PathBuf,

    /// Image model class labels in output order
    #[serde(default = "default_image_labels")]
    pub image_labels: Vec<String>,

    #[serde(default = "default_image_positive_label")]
    pub image_positive_label: String,

    #[serde(default = "default_image_input_size")]
    pub image_input_size: u32,

    /// Delay before an uploaded image is deleted after classification
    #[serde(default = "default_upload_delete_delay")]
    pub upload_delete_delay_secs: u64,

    /// Age after which the sweeper removes an upload regardless
    #[serde(default = "default_artifact_ttl")]
    pub artifact_ttl_secs: u64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "strokewatch".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_posts_path() -> PathBuf {
    PathBuf::from("posts.json")
}

fn default_tabular_model_path() -> PathBuf {
    PathBuf::from("models/stroke_classifier.onnx")
}

fn default_scaler_path() -> PathBuf {
    PathBuf::from("models/scaler.json")
}

fn default_image_model_path() -> PathBuf {
    PathBuf::from("models/image_classifier.onnx")
}

fn default_image_labels() -> Vec<String> {
    vec!["normal".to_string(), "stroke".to_string()]
}

fn default_image_positive_label() -> String {
    "stroke".to_string()
}

fn default_image_input_size() -> u32 {
    strokewatch_lib::gateway::DEFAULT_INPUT_SIZE
}

fn default_upload_delete_delay() -> u64 {
    30
}

fn default_artifact_ttl() -> u64 {
    300
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            api_port: default_api_port(),
            bind_address: default_bind_address(),
            upload_dir: default_upload_dir(),
            posts_path: default_posts_path(),
            tabular_model_path: default_tabular_model_path(),
            scaler_path: default_scaler_path(),
            image_model_path: default_image_model_path(),
            image_labels: default_image_labels(),
            image_positive_label: default_image_positive_label(),
            image_input_size: default_image_input_size(),
            upload_delete_delay_secs: default_upload_delete_delay(),
            artifact_ttl_secs: default_artifact_ttl(),
            sweep_interval_secs: default_sweep_interval(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from the process environment
    pub fn load() -> Result<Self> {
        Self::from_environment(config::Environment::with_prefix(ENV_PREFIX))
    }

    fn from_environment(environment: config::Environment) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(
                environment
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("image_labels"),
            )
            .build()
            .context("Failed to read configuration")?;

        let config: ServiceConfig = config
            .try_deserialize()
            .context("Invalid STROKEWATCH_* configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.image_labels.len() < 2 {
            anyhow::bail!("image_labels needs at least two labels");
        }
        if !self.image_labels.contains(&self.image_positive_label) {
            anyhow::bail!(
                "image_positive_label {:?} is not one of {:?}",
                self.image_positive_label,
                self.image_labels
            );
        }
        if self.artifact_ttl_secs < self.upload_delete_delay_secs {
            anyhow::bail!("artifact_ttl_secs must not be shorter than upload_delete_delay_secs");
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.api_port)
    }

    pub fn upload_delete_delay(&self) -> Duration {
        Duration::from_secs(self.upload_delete_delay_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            tabular_model_path: self.tabular_model_path.clone(),
            scaler_path: self.scaler_path.clone(),
            image_model_path: self.image_model_path.clone(),
            image_model: ImageModelConfig {
                input_size: self.image_input_size,
                labels: self.image_labels.clone(),
            },
            positive_label: self.image_positive_label.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_vars(vars: &[(&str, &str)]) -> Result<ServiceConfig> {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServiceConfig::from_environment(
            config::Environment::with_prefix(ENV_PREFIX).source(Some(source)),
        )
    }

    #[test]
    fn test_defaults() {
        let config = from_vars(&[]).unwrap();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.upload_delete_delay_secs, 30);
        assert_eq!(config.image_labels, vec!["normal", "stroke"]);
        assert_eq!(config.listen_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_env_overrides() {
        let config = from_vars(&[
            ("STROKEWATCH_API_PORT", "9100"),
            ("STROKEWATCH_UPLOAD_DIR", "/var/lib/strokewatch/uploads"),
            ("STROKEWATCH_IMAGE_LABELS", "healthy,ischemic,hemorrhagic"),
            ("STROKEWATCH_IMAGE_POSITIVE_LABEL", "ischemic"),
        ])
        .unwrap();

        assert_eq!(config.api_port, 9100);
        assert_eq!(config.upload_dir, PathBuf::from("/var/lib/strokewatch/uploads"));
        assert_eq!(config.image_labels.len(), 3);
        assert_eq!(config.gateway_config().positive_label, "ischemic");
    }

    #[test]
    fn test_positive_label_must_be_known() {
        let err = from_vars(&[("STROKEWATCH_IMAGE_POSITIVE_LABEL", "tumor")]).unwrap_err();
        assert!(err.to_string().contains("tumor"));
    }

    #[test]
    fn test_ttl_not_shorter_than_delete_delay() {
        assert!(from_vars(&[
            ("STROKEWATCH_UPLOAD_DELETE_DELAY_SECS", "120"),
            ("STROKEWATCH_ARTIFACT_TTL_SECS", "60"),
        ])
        .is_err());
    }

    #[test]
    fn test_invalid_port_rejected() {
        assert!(from_vars(&[("STROKEWATCH_API_PORT", "not-a-port")]).is_err());
    }
}
