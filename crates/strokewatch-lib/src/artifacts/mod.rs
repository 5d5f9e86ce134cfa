//! Ephemeral resource management for uploaded artifacts
//!
//! Uploaded images only live long enough to be classified. The manager
//! tracks every stored artifact, deletes it after a delay on a background
//! task, and exposes an idempotent immediate delete. A sweeper loop removes
//! anything whose TTL has passed in case a scheduled deletion was lost.

mod storage;
mod sweeper;

pub use storage::{allowed_file, sanitize_filename, ArtifactStore, ALLOWED_EXTENSIONS};
pub use sweeper::{ArtifactSweeper, DEFAULT_SWEEP_INTERVAL};

use crate::models::UploadedArtifact;
use crate::observability::StructuredLogger;
use chrono::Utc;
use dashmap::DashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Result of an immediate deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Nothing was on disk; another deletion got there first
    AlreadyAbsent,
    /// Removal failed and was logged; the artifact stays tracked for the sweeper
    Failed,
}

impl DeleteOutcome {
    /// The file is gone from disk
    pub fn is_removed(self) -> bool {
        !matches!(self, DeleteOutcome::Failed)
    }
}

/// Counters describing artifact lifecycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactStats {
    /// Artifacts registered and not yet deleted
    pub tracked: usize,
    pub deleted: u64,
    pub already_absent: u64,
    pub failed: u64,
}

/// Owns uploaded artifacts from registration until deletion
pub struct ArtifactManager {
    artifacts: DashMap<PathBuf, UploadedArtifact>,
    logger: StructuredLogger,
    deleted: AtomicU64,
    already_absent: AtomicU64,
    failed: AtomicU64,
}

impl ArtifactManager {
    pub fn new(logger: StructuredLogger) -> Self {
        Self {
            artifacts: DashMap::new(),
            logger,
            deleted: AtomicU64::new(0),
            already_absent: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Take ownership of an artifact; re-registering a path replaces its entry
    pub fn register(&self, artifact: UploadedArtifact) {
        debug!(
            path = %artifact.path.display(),
            ttl_seconds = artifact.ttl_seconds,
            "Registered artifact"
        );
        self.artifacts.insert(artifact.path.clone(), artifact);
    }

    pub fn get(&self, path: &Path) -> Option<UploadedArtifact> {
        self.artifacts.get(path).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Delete the artifact now
    ///
    /// A missing file is `AlreadyAbsent`. Any other failure is logged and
    /// reported as `Failed`; the artifact stays tracked so the sweeper
    /// retries it.
    pub fn delete_now(&self, path: &Path) -> DeleteOutcome {
        self.delete_with_trigger(path, "request")
    }

    fn delete_with_trigger(&self, path: &Path, trigger: &str) -> DeleteOutcome {
        match std::fs::remove_file(path) {
            Ok(()) => {
                self.artifacts.remove(path);
                self.deleted.fetch_add(1, Ordering::Relaxed);
                self.logger.log_artifact_deleted(path, trigger, false);
                DeleteOutcome::Deleted
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.artifacts.remove(path);
                self.already_absent.fetch_add(1, Ordering::Relaxed);
                self.logger.log_artifact_deleted(path, trigger, true);
                DeleteOutcome::AlreadyAbsent
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                self.logger
                    .log_artifact_delete_failed(path, trigger, &e.to_string());
                DeleteOutcome::Failed
            }
        }
    }

    /// Arm a one-shot deletion after `delay`
    ///
    /// Returns immediately. Failures are logged and swallowed; there is no
    /// way to cancel the deletion once armed. Must be called from within a
    /// tokio runtime.
    pub fn schedule_delete(self: &Arc<Self>, path: PathBuf, delay: Duration) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let result = tokio::task::spawn_blocking(move || {
                // Outcome is already logged
                manager.delete_with_trigger(&path, "scheduled");
            })
            .await;
            if let Err(e) = result {
                debug!(error = %e, "Scheduled artifact deletion task aborted");
            }
        });
    }

    /// Guard that arms a scheduled deletion of `path` when dropped
    ///
    /// Hold it across work that uses the artifact so the deletion is armed
    /// even if that work is abandoned part way.
    pub fn delete_on_drop(self: &Arc<Self>, path: PathBuf, delay: Duration) -> PendingDelete {
        PendingDelete {
            manager: Arc::clone(self),
            path: Some(path),
            delay,
        }
    }

    /// Delete every artifact whose TTL has passed, returning how many were removed
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<PathBuf> = self
            .artifacts
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| entry.key().clone())
            .collect();

        expired
            .iter()
            .filter(|path| self.delete_with_trigger(path, "sweeper").is_removed())
            .count()
    }

    /// Delete every tracked artifact regardless of TTL
    pub fn sweep_all(&self) -> usize {
        let paths: Vec<PathBuf> = self.artifacts.iter().map(|entry| entry.key().clone()).collect();
        paths
            .iter()
            .filter(|path| self.delete_with_trigger(path, "shutdown").is_removed())
            .count()
    }

    pub fn stats(&self) -> ArtifactStats {
        ArtifactStats {
            tracked: self.artifacts.len(),
            deleted: self.deleted.load(Ordering::Relaxed),
            already_absent: self.already_absent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

impl Default for ArtifactManager {
    fn default() -> Self {
        Self::new(StructuredLogger::default())
    }
}

/// See [`ArtifactManager::delete_on_drop`]
pub struct PendingDelete {
    manager: Arc<ArtifactManager>,
    path: Option<PathBuf>,
    delay: Duration,
}

impl Drop for PendingDelete {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        if tokio::runtime::Handle::try_current().is_ok() {
            self.manager.schedule_delete(path, self.delay);
        } else {
            // No runtime left to run the timer on
            self.manager.delete_now(&path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_artifact(dir: &TempDir, name: &str, ttl_seconds: u64) -> UploadedArtifact {
        let path = dir.path().join(name);
        std::fs::write(&path, b"\x89PNG").unwrap();
        UploadedArtifact::new(path, name, ttl_seconds)
    }

    async fn wait_until_gone(path: &Path) {
        for _ in 0..200 {
            if !path.exists() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{:?} was not deleted", path);
    }

    #[test]
    fn test_delete_now_then_already_absent() {
        let dir = TempDir::new().unwrap();
        let manager = ArtifactManager::default();
        let artifact = write_artifact(&dir, "scan.png", 30);
        let path = artifact.path.clone();
        manager.register(artifact);

        assert_eq!(manager.delete_now(&path), DeleteOutcome::Deleted);
        assert!(!path.exists());
        assert_eq!(manager.delete_now(&path), DeleteOutcome::AlreadyAbsent);

        let stats = manager.stats();
        assert_eq!(stats.tracked, 0);
        assert_eq!(stats.deleted, 1);
        assert_eq!(stats.already_absent, 1);
    }

    #[test]
    fn test_delete_unregistered_missing_path() {
        let manager = ArtifactManager::default();
        let outcome = manager.delete_now(Path::new("/nonexistent/upload.png"));
        assert_eq!(outcome, DeleteOutcome::AlreadyAbsent);
    }

    #[test]
    fn test_failed_delete_is_reported_not_raised() {
        let dir = TempDir::new().unwrap();
        let manager = ArtifactManager::default();
        // remove_file refuses directories
        let path = dir.path().join("upload.png");
        std::fs::create_dir(&path).unwrap();
        manager.register(UploadedArtifact::new(path.clone(), "upload.png", 0));

        assert_eq!(manager.delete_now(&path), DeleteOutcome::Failed);
        assert!(path.exists());
        assert!(manager.get(&path).is_some());
        assert_eq!(manager.stats().failed, 1);

        // Still tracked, so the sweeper keeps retrying without counting it removed
        assert_eq!(manager.sweep_expired(), 0);
        assert_eq!(manager.stats().failed, 2);
    }

    #[tokio::test]
    async fn test_scheduled_delete_then_delete_now() {
        let dir = TempDir::new().unwrap();
        let manager = Arc::new(ArtifactManager::default());
        let artifact = write_artifact(&dir, "scan.png", 30);
        let path = artifact.path.clone();
        manager.register(artifact);

        manager.schedule_delete(path.clone(), Duration::ZERO);
        wait_until_gone(&path).await;

        assert_eq!(manager.delete_now(&path), DeleteOutcome::AlreadyAbsent);
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_pending_delete_arms_on_drop() {
        let dir = TempDir::new().unwrap();
        let manager = Arc::new(ArtifactManager::default());
        let artifact = write_artifact(&dir, "scan.png", 30);
        let path = artifact.path.clone();
        manager.register(artifact);

        let guard = manager.delete_on_drop(path.clone(), Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(path.exists());

        drop(guard);
        wait_until_gone(&path).await;
    }

    /// Work abandoned mid-await still leaves the deletion armed
    #[tokio::test]
    async fn test_pending_delete_survives_cancelled_work() {
        let dir = TempDir::new().unwrap();
        let manager = Arc::new(ArtifactManager::default());
        let artifact = write_artifact(&dir, "abandoned.jpg", 3600);
        let path = artifact.path.clone();
        manager.register(artifact);

        let work = {
            let manager = Arc::clone(&manager);
            let path = path.clone();
            async move {
                let _pending = manager.delete_on_drop(path, Duration::ZERO);
                std::future::pending::<()>().await;
            }
        };
        assert!(tokio::time::timeout(Duration::from_millis(10), work).await.is_err());

        wait_until_gone(&path).await;
    }

    #[test]
    fn test_pending_delete_without_runtime_deletes_immediately() {
        let dir = TempDir::new().unwrap();
        let manager = Arc::new(ArtifactManager::default());
        let artifact = write_artifact(&dir, "late.gif", 30);
        let path = artifact.path.clone();
        manager.register(artifact);

        drop(manager.delete_on_drop(path.clone(), Duration::from_secs(3600)));
        assert!(!path.exists());
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_schedule_delete_does_not_block() {
        let dir = TempDir::new().unwrap();
        let manager = Arc::new(ArtifactManager::default());
        let artifact = write_artifact(&dir, "later.jpg", 30);
        let path = artifact.path.clone();
        manager.register(artifact);

        manager.schedule_delete(path.clone(), Duration::from_secs(3600));
        assert!(path.exists());
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn test_racing_deletions_are_idempotent() {
        let dir = TempDir::new().unwrap();
        let manager = Arc::new(ArtifactManager::default());
        let artifact = write_artifact(&dir, "race.gif", 30);
        let path = artifact.path.clone();
        manager.register(artifact);

        for _ in 0..4 {
            manager.schedule_delete(path.clone(), Duration::ZERO);
        }
        assert!(manager.delete_now(&path).is_removed());
        wait_until_gone(&path).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let stats = manager.stats();
        assert_eq!(stats.deleted, 1);
        assert_eq!(stats.failed, 0);
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let dir = TempDir::new().unwrap();
        let manager = ArtifactManager::default();
        let expired = write_artifact(&dir, "old.png", 0);
        let fresh = write_artifact(&dir, "new.png", 3600);
        let (expired_path, fresh_path) = (expired.path.clone(), fresh.path.clone());
        manager.register(expired);
        manager.register(fresh);

        assert_eq!(manager.sweep_expired(), 1);
        assert!(!expired_path.exists());
        assert!(fresh_path.exists());
        assert!(manager.get(&fresh_path).is_some());

        assert_eq!(manager.sweep_all(), 1);
        assert!(!fresh_path.exists());
        assert!(manager.is_empty());
    }
}
