//! Upload directory boundary
//!
//! Validates client filenames and writes upload bytes under a collision-free
//! name. Nothing outside the upload directory is ever written.

use crate::error::ArtifactError;
use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

/// Accepted upload extensions, compared case-insensitively
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

/// Whether the filename carries an accepted image extension
pub fn allowed_file(filename: &str) -> bool {
    extension_of(filename)
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

fn extension_of(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

/// Reduce a client filename to a safe basename
///
/// Directory components are dropped, characters outside `[A-Za-z0-9._-]`
/// become `_` and leading dots are removed.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    cleaned.trim_start_matches('.').to_string()
}

/// Writes uploads into a single directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    upload_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn ensure_dir(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.upload_dir)
            .with_context(|| format!("Failed to create upload directory {:?}", self.upload_dir))
    }

    /// Validate the client filename without touching the disk
    pub fn validate(&self, original_filename: &str) -> Result<String, ArtifactError> {
        let sanitized = sanitize_filename(original_filename);
        let stem_empty = sanitized
            .rsplit_once('.')
            .map(|(stem, _)| stem.trim_matches('_').is_empty())
            .unwrap_or(true);
        if sanitized.is_empty() || stem_empty {
            return Err(ArtifactError::InvalidFilename(original_filename.to_string()));
        }
        if !allowed_file(&sanitized) {
            return Err(ArtifactError::UnsupportedType {
                extension: extension_of(&sanitized).unwrap_or_default(),
            });
        }
        Ok(sanitized)
    }

    /// Store upload bytes and return the path they were written to
    pub fn save(&self, original_filename: &str, bytes: &[u8]) -> Result<PathBuf, ArtifactError> {
        let sanitized = self.validate(original_filename)?;
        let path = self
            .upload_dir
            .join(format!("{}_{}", Uuid::new_v4().simple(), sanitized));

        std::fs::create_dir_all(&self.upload_dir)?;
        std::fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Remove files left in the upload directory by a previous run
    pub fn purge(&self) -> anyhow::Result<usize> {
        let entries = match std::fs::read_dir(&self.upload_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read upload directory {:?}", self.upload_dir))
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to purge stale upload"),
            }
        }

        if removed > 0 {
            info!(dir = %self.upload_dir.display(), removed, "Purged stale uploads");
        }
        Ok(removed)
    }
}
