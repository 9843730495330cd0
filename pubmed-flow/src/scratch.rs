use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{FlowError, Result};

/// Root directory under which per-request scratch files are written.
#[derive(Debug, Clone)]
pub struct ScratchArea {
    root: PathBuf,
}

impl ScratchArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `bytes` to `<root>/<uuid>/<sanitized file name>`. The per-request
    /// directory keeps the original name (and extension) visible to the script
    /// while identically named uploads cannot collide.
    pub async fn write(&self, file_name: &str, bytes: &[u8]) -> Result<ScratchFile> {
        let dir = self.root.join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| FlowError::storage(&dir, e))?;

        // From here on the guard owns the directory and removes it on drop.
        let scratch = ScratchFile {
            path: dir.join(sanitize_file_name(file_name)),
            dir,
            released: false,
        };
        tokio::fs::write(&scratch.path, bytes)
            .await
            .map_err(|e| FlowError::storage(&scratch.path, e))?;

        debug!("Wrote {} bytes to scratch file {}", bytes.len(), scratch.path.display());
        Ok(scratch)
    }
}

/// A scratch file that is deleted when released or, failing that, when dropped.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    dir: PathBuf,
    released: bool,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the file and its request directory.
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FlowError::storage(&self.dir, e)),
        }
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove scratch directory {}: {}", self.dir.display(), e);
            }
        }
    }
}

/// Keeps the last path component and replaces anything outside `[A-Za-z0-9._-]`.
pub fn sanitize_file_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}
