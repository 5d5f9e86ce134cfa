//! Core data models shared by the gateway, artifact manager and community store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// An uploaded file whose lifetime is bounded by the artifact manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedArtifact {
    pub path: PathBuf,
    pub original_filename: String,
    pub created_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl UploadedArtifact {
    pub fn new(path: impl Into<PathBuf>, original_filename: impl Into<String>, ttl_seconds: u64) -> Self {
        Self {
            path: path.into(),
            original_filename: original_filename.into(),
            created_at: Utc::now(),
            ttl_seconds,
        }
    }

    /// Whether the artifact has outlived its TTL at `now`
    ///
    /// A TTL too large to represent as a deadline never expires.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let deadline = i64::try_from(self.ttl_seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|ttl| self.created_at.checked_add_signed(ttl));
        match deadline {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }
}

/// Questionnaire answers for the tabular risk model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabularInput {
    pub age: f32,
    pub hypertension: u8,
    pub heart_disease: u8,
    pub weight_kg: f32,
    pub height_cm: f32,
}

/// A prediction request routed by the inference gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PredictionRequest {
    Image {
        #[serde(rename = "artifactPath")]
        artifact_path: PathBuf,
    },
    Tabular(TabularInput),
}

/// Normalized output of either backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    pub risk_percentage: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bmi: Option<f32>,
}

/// Board categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    FreeTalk,
    RehabilitationReviews,
    Others,
}

impl Category {
    pub const ALL: [Category; 3] = [
        Category::FreeTalk,
        Category::RehabilitationReviews,
        Category::Others,
    ];

    /// Identifier used in URLs and in the persisted document
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::FreeTalk => "free_talk",
            Category::RehabilitationReviews => "rehabilitation_reviews",
            Category::Others => "others",
        }
    }

    /// Display name for board pages
    pub fn label(&self) -> &'static str {
        match self {
            Category::FreeTalk => "Free talk",
            Category::RehabilitationReviews => "Rehabilitation reviews",
            Category::Others => "Others",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a category string is not one of the known boards
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// A community board post, as persisted in the posts document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: u64,
    pub title: String,
    pub content: String,
    pub likes: u64,
    pub category: Category,
}
