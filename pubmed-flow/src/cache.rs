use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::error::{FlowError, Result};
use crate::intent::Pmid;

pub const ARTIFACT_EXTENSION: &str = "pdf";

/// Location of a materialized artifact, on disk and as served to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub pmid: Pmid,
    pub path: PathBuf,
    pub download_path: String,
}

/// Existence-based cache of downloaded PDFs, keyed by PMID.
///
/// Presence is permanent: there is no freshness check and no eviction.
/// Materialization is single-flight per PMID through [`ArtifactCache::lock`].
#[derive(Debug)]
pub struct ArtifactCache {
    dir: PathBuf,
    public_prefix: String,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ArtifactCache {
    /// `public_prefix` is the URL path the directory is served under, e.g. `/download`.
    pub fn new(dir: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            public_prefix: public_prefix.into().trim_end_matches('/').to_string(),
            locks: DashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn artifact(&self, pmid: &Pmid) -> Artifact {
        let file_name = format!("{}.{}", pmid, ARTIFACT_EXTENSION);
        Artifact {
            pmid: pmid.clone(),
            path: self.dir.join(&file_name),
            download_path: format!("{}/{}", self.public_prefix, file_name),
        }
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| FlowError::storage(&self.dir, e))
    }

    /// Returns the artifact if its file already exists.
    pub async fn lookup(&self, pmid: &Pmid) -> Result<Option<Artifact>> {
        let artifact = self.artifact(pmid);
        let exists = tokio::fs::try_exists(&artifact.path)
            .await
            .map_err(|e| FlowError::storage(&artifact.path, e))?;
        Ok(exists.then_some(artifact))
    }

    /// Waits until no other request is materializing `pmid`.
    pub async fn lock(&self, pmid: &Pmid) -> ArtifactLock<'_> {
        let mutex = self
            .locks
            .entry(pmid.as_str().to_string())
            .or_default()
            .clone();
        let guard = mutex.lock_owned().await;
        debug!("Acquired materialization lock for PMID {}", pmid);
        ArtifactLock {
            locks: &self.locks,
            key: pmid.as_str().to_string(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.len()
    }
}

/// Held while one request materializes an artifact.
pub struct ArtifactLock<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ArtifactLock<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // The map holds one reference; anything above that is a waiting request.
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
