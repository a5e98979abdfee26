//! ConfigStore Repository
//!
//! Persistence layer: camera list held in memory, mirrored to a JSON file

use super::types::*;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;

/// Camera repository backed by a JSON file (or memory only)
pub struct ConfigRepository {
    path: Option<PathBuf>,
    cameras: RwLock<Vec<CameraRecord>>,
}

impl ConfigRepository {
    /// Open the config file, creating an empty one when absent
    ///
    /// A file that fails to parse is treated as an empty camera list.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let cameras = match fs::read(&path).await {
            Ok(raw) => match serde_json::from_slice::<CameraConfigFile>(&raw) {
                Ok(file) => file.cameras,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Camera config file is corrupt, starting with an empty camera list"
                    );
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "Camera config file not found, creating");
                Self::write_file(&path, &[]).await?;
                Vec::new()
            }
            Err(e) => return Err(Error::Config(format!("{}: {}", path.display(), e))),
        };

        Ok(Self {
            path: Some(path),
            cameras: RwLock::new(cameras),
        })
    }

    /// Memory-only repository (nothing persisted)
    pub fn in_memory(cameras: Vec<CameraRecord>) -> Self {
        Self {
            path: None,
            cameras: RwLock::new(cameras),
        }
    }

    pub async fn get_all(&self) -> Vec<CameraRecord> {
        self.cameras.read().await.clone()
    }

    pub async fn get(&self, camera_id: &str) -> Option<CameraRecord> {
        self.cameras
            .read()
            .await
            .iter()
            .find(|c| c.id == camera_id)
            .cloned()
    }

    /// Append a camera and persist
    pub async fn insert(&self, camera: CameraRecord) -> Result<()> {
        let mut cameras = self.cameras.write().await;
        let mut next = cameras.clone();
        next.push(camera);
        self.commit(&mut cameras, next).await
    }

    /// Replace a camera in place and persist; false if the id is unknown
    pub async fn replace(&self, camera: CameraRecord) -> Result<bool> {
        let mut cameras = self.cameras.write().await;
        let mut next = cameras.clone();
        let Some(slot) = next.iter_mut().find(|c| c.id == camera.id) else {
            return Ok(false);
        };
        *slot = camera;
        self.commit(&mut cameras, next).await?;
        Ok(true)
    }

    /// Remove a camera and persist; false if the id is unknown
    pub async fn delete(&self, camera_id: &str) -> Result<bool> {
        let mut cameras = self.cameras.write().await;
        let mut next = cameras.clone();
        next.retain(|c| c.id != camera_id);
        if next.len() == cameras.len() {
            return Ok(false);
        }
        self.commit(&mut cameras, next).await?;
        Ok(true)
    }

    /// Persist `next`; memory is only swapped once the file write succeeded
    async fn commit(&self, current: &mut Vec<CameraRecord>, next: Vec<CameraRecord>) -> Result<()> {
        self.persist(&next).await?;
        *current = next;
        Ok(())
    }

    async fn persist(&self, cameras: &[CameraRecord]) -> Result<()> {
        match &self.path {
            Some(path) => Self::write_file(path, cameras).await,
            None => Ok(()),
        }
    }

    /// Write via temp file + rename
    async fn write_file(path: &Path, cameras: &[CameraRecord]) -> Result<()> {
        let file = CameraConfigFile {
            cameras: cameras.to_vec(),
        };
        let json = serde_json::to_vec_pretty(&file)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
        let written = match fs::write(&tmp, json).await {
            Ok(()) => fs::rename(&tmp, path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp).await;
            tracing::error!(path = %path.display(), error = %e, "Failed to write camera config file");
            return Err(e.into());
        }
        Ok(())
    }
}
