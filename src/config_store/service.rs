//! ConfigStore Service
//!
//! Business logic layer for ConfigStore

use super::repository::ConfigRepository;
use super::types::*;
use crate::error::{Error, Result};

/// ConfigStore service for business logic
pub struct ConfigService {
    repo: ConfigRepository,
}

impl ConfigService {
    /// Create new service
    pub fn new(repo: ConfigRepository) -> Self {
        Self { repo }
    }

    /// List all cameras
    pub async fn list_cameras(&self) -> Vec<CameraRecord> {
        self.repo.get_all().await
    }

    /// Get camera by ID
    pub async fn get_camera(&self, camera_id: &str) -> Option<CameraRecord> {
        self.repo.get(camera_id).await
    }

    /// Add camera
    pub async fn add_camera(&self, camera: CameraRecord) -> Result<CameraRecord> {
        validate_camera_id(&camera.id)?;

        if camera.ip.trim().is_empty() {
            return Err(Error::Validation("ip must not be empty".to_string()));
        }

        if self.repo.get(&camera.id).await.is_some() {
            return Err(Error::Conflict(format!("Camera {} already exists", camera.id)));
        }

        self.repo.insert(camera.clone()).await?;
        Ok(camera)
    }

    /// Apply a partial update, returning (previous, updated)
    pub async fn update_camera(
        &self,
        camera_id: &str,
        update: CameraUpdate,
    ) -> Result<(CameraRecord, CameraRecord)> {
        let previous = self
            .repo
            .get(camera_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("Camera {} not found", camera_id)))?;

        let mut updated = previous.clone();
        update.apply(&mut updated);

        if !self.repo.replace(updated.clone()).await? {
            return Err(Error::NotFound(format!("Camera {} not found", camera_id)));
        }

        Ok((previous, updated))
    }

    /// Remove camera
    pub async fn remove_camera(&self, camera_id: &str) -> Result<()> {
        if !self.repo.delete(camera_id).await? {
            return Err(Error::NotFound(format!("Camera {} not found", camera_id)));
        }
        Ok(())
    }

    /// Put a previously read record back (undo of a failed update)
    pub async fn restore_camera(&self, camera: CameraRecord) -> Result<()> {
        if !self.repo.replace(camera.clone()).await? {
            self.repo.insert(camera).await?;
        }
        Ok(())
    }
}

fn validate_camera_id(camera_id: &str) -> Result<()> {
    if camera_id.is_empty() || camera_id.len() > 64 {
        return Err(Error::Validation(
            "id must be 1-64 characters".to_string(),
        ));
    }
    if camera_id.contains(['<', '>', '/']) || camera_id.chars().any(char::is_whitespace) {
        return Err(Error::Validation(format!("invalid camera id: {}", camera_id)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera(id: &str) -> CameraRecord {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "name": "Stage left",
            "ip": "192.168.1.20"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_rejected() {
        let service = ConfigService::new(ConfigRepository::in_memory(vec![]));
        service.add_camera(camera("cam1")).await.unwrap();
        let err = service.add_camera(camera("cam1")).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_invalid_id_rejected() {
        let service = ConfigService::new(ConfigRepository::in_memory(vec![]));
        for id in ["", "a<b", "cam 1", "a/b"] {
            let err = service.add_camera(camera(id)).await.unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "id {:?}", id);
        }
    }

    #[tokio::test]
    async fn test_update_returns_both_versions() {
        let service = ConfigService::new(ConfigRepository::in_memory(vec![camera("cam1")]));
        let (before, after) = service
            .update_camera(
                "cam1",
                CameraUpdate {
                    name: Some("Pulpit".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(before.name, "Stage left");
        assert_eq!(after.name, "Pulpit");
        assert_eq!(service.get_camera("cam1").await.unwrap().name, "Pulpit");
    }

    #[tokio::test]
    async fn test_missing_camera() {
        let service = ConfigService::new(ConfigRepository::in_memory(vec![]));
        assert!(matches!(
            service.update_camera("cam9", CameraUpdate::default()).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            service.remove_camera("cam9").await,
            Err(Error::NotFound(_))
        ));
    }
}
