//! ConfigStore - camera inventory
//!
//! ## Responsibilities
//!
//! - Camera records (connection parameters, control protocol, preview source)
//! - Persistence to the camera config file
//! - Validation of new records
//!
//! Session registries read records from here and never mutate them.

mod repository;
mod service;
mod types;

pub use repository::ConfigRepository;
pub use service::ConfigService;
pub use types::*;

use std::path::Path;

/// ConfigStore instance
pub struct ConfigStore {
    service: ConfigService,
}

impl ConfigStore {
    /// Open the store backed by a JSON file
    pub async fn open(path: impl AsRef<Path>) -> crate::Result<Self> {
        let repo = ConfigRepository::open(path).await?;
        let store = Self {
            service: ConfigService::new(repo),
        };

        tracing::info!(
            cameras = store.service.list_cameras().await.len(),
            "ConfigStore loaded"
        );

        Ok(store)
    }

    /// Memory-only store
    pub fn in_memory(cameras: Vec<CameraRecord>) -> Self {
        Self {
            service: ConfigService::new(ConfigRepository::in_memory(cameras)),
        }
    }

    /// Get service reference
    pub fn service(&self) -> &ConfigService {
        &self.service
    }
}
