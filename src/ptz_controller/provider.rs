//! Control provider contract
//!
//! A provider is the command channel to one camera. Every call returns a
//! definite `Result`; the registry also treats panics and timeouts as failures.

use super::onvif::OnvifControl;
use super::types::{ControlCapabilities, MoveVector, Preset};
use crate::config_store::{CameraRecord, ControlProtocol};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait ControlProvider: Send + Sync {
    /// Open the session (discover profile, authenticate)
    async fn connect(&self) -> Result<()>;

    /// Continuous move; axes in [-1, 1], speed in [0, 1]
    async fn continuous_move(&self, vector: MoveVector) -> Result<()>;

    /// Stop all movement
    async fn stop(&self) -> Result<()>;

    /// Preset list as currently stored on the device
    async fn fetch_presets(&self) -> Result<Vec<Preset>>;

    async fn goto_preset(&self, token: &str) -> Result<()>;

    /// Save the current position under `name`
    async fn set_preset(&self, name: &str) -> Result<()>;

    fn capabilities(&self) -> ControlCapabilities;
}

/// Builds control providers from camera records
pub trait ControlProviderFactory: Send + Sync {
    /// Construct (without connecting); rejects unsupported protocols
    fn build(&self, camera: &CameraRecord) -> Result<Arc<dyn ControlProvider>>;
}

/// Factory for real devices
#[derive(Debug, Default, Clone)]
pub struct DeviceControlFactory;

impl ControlProviderFactory for DeviceControlFactory {
    fn build(&self, camera: &CameraRecord) -> Result<Arc<dyn ControlProvider>> {
        match camera.control_protocol {
            ControlProtocol::Onvif => Ok(Arc::new(OnvifControl::new(
                &camera.ip,
                camera.onvif_port,
                &camera.username,
                &camera.password,
            ))),
            ControlProtocol::Visca => Err(Error::Unsupported(format!(
                "control protocol {} is not supported",
                camera.control_protocol.as_str()
            ))),
        }
    }
}
