use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs;
use tracing::info;

use crate::error::ControllerError;

/// Where downloaded artifacts are saved.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `bytes` under `file_name`. An existing file gets a numeric suffix instead of being overwritten.
    pub async fn save(&self, file_name: &str, bytes: &Bytes) -> Result<PathBuf, ControllerError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| ControllerError::local(format!("Failed to prepare download folder: {e}")))?;

        let path = self.free_path(file_name).await;
        fs::write(&path, bytes)
            .await
            .map_err(|e| ControllerError::local(format!("Failed to save {file_name}: {e}")))?;

        info!("💾 Saved {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    async fn free_path(&self, file_name: &str) -> PathBuf {
        let candidate = self.root.join(file_name);
        if !fs::try_exists(&candidate).await.unwrap_or(false) {
            return candidate;
        }
        let (stem, ext) = match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
            _ => (file_name, None),
        };
        let mut n = 1;
        loop {
            let name = match ext {
                Some(ext) => format!("{stem} ({n}).{ext}"),
                None => format!("{stem} ({n})"),
            };
            let path = self.root.join(name);
            if !fs::try_exists(&path).await.unwrap_or(false) {
                return path;
            }
            n += 1;
        }
    }
}
