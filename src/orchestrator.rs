//! Orchestrator - camera lifecycle across store and session registries
//!
//! ## Responsibilities
//!
//! - Startup bootstrap: control sessions for every configured camera,
//!   preview sessions when eager loading is on
//! - Camera add/update/delete kept consistent with both registries
//! - Merged camera views (config + live state, password removed)
//! - Shutdown of all sessions

use crate::config_store::{CameraRecord, CameraUpdate, ConfigStore, ControlProtocol, PreviewConfig};
use crate::error::{Error, Result};
use crate::event_log_service::EventLogService;
use crate::health::{self, CameraHealth, FleetHealth};
use crate::preview_manager::{PreviewProviderFactory, PreviewRegistry, PreviewStatus};
use crate::ptz_controller::{
    CommandOutcome, ControlProviderFactory, ControlRegistry, ControlStatus, Preset, PtzCommand,
    PtzRequest, PtzResponse,
};
use crate::stream_gateway::StreamGateway;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle tuning
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    /// Start previews at bootstrap instead of on first stream request
    pub preview_eager: bool,
    pub connect_timeout: Duration,
    pub start_timeout: Duration,
    pub stop_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            preview_eager: false,
            connect_timeout: crate::ptz_controller::DEFAULT_CONNECT_TIMEOUT,
            start_timeout: crate::preview_manager::DEFAULT_START_TIMEOUT,
            stop_timeout: crate::preview_manager::DEFAULT_STOP_TIMEOUT,
        }
    }
}

/// Camera as returned by the API
#[derive(Debug, Clone, Serialize)]
pub struct CameraView {
    pub id: String,
    pub name: String,
    pub ip: String,
    pub onvif_port: u16,
    pub username: String,
    pub control_protocol: ControlProtocol,
    pub preview: PreviewConfig,
    /// Empty when no preview session exists
    pub stream_url: String,
    pub control_status: ControlStatus,
    pub preview_status: PreviewStatus,
}

pub struct Orchestrator {
    config: Arc<ConfigStore>,
    controls: Arc<ControlRegistry>,
    previews: Arc<PreviewRegistry>,
    stream: Arc<StreamGateway>,
    event_log: Arc<EventLogService>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        config: Arc<ConfigStore>,
        control_factory: Arc<dyn ControlProviderFactory>,
        preview_factory: Arc<dyn PreviewProviderFactory>,
        event_log: Arc<EventLogService>,
        settings: OrchestratorSettings,
    ) -> Self {
        let controls = Arc::new(ControlRegistry::new(
            control_factory,
            event_log.clone(),
            settings.connect_timeout,
        ));
        let previews = Arc::new(PreviewRegistry::new(
            preview_factory,
            event_log.clone(),
            settings.start_timeout,
            settings.stop_timeout,
        ));
        let stream = Arc::new(StreamGateway::new(config.clone(), previews.clone()));

        Self {
            config,
            controls,
            previews,
            stream,
            event_log,
            settings,
        }
    }

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    pub fn controls(&self) -> &Arc<ControlRegistry> {
        &self.controls
    }

    pub fn previews(&self) -> &Arc<PreviewRegistry> {
        &self.previews
    }

    pub fn stream(&self) -> &Arc<StreamGateway> {
        &self.stream
    }

    pub fn event_log(&self) -> &Arc<EventLogService> {
        &self.event_log
    }

    /// Register sessions for every configured camera
    pub async fn bootstrap(&self) {
        let cameras = self.config.service().list_cameras().await;

        for camera in &cameras {
            if let Err(e) = self.controls.add(camera).await {
                self.event_log
                    .warn(
                        format!("Control session not created: {}", e),
                        Some(&camera.id),
                        "control.rejected",
                    )
                    .await;
            }

            if self.settings.preview_eager {
                self.start_preview(camera).await;
            }
        }

        self.event_log
            .info(
                format!(
                    "Bootstrapped {} cameras (preview {})",
                    cameras.len(),
                    if self.settings.preview_eager { "eager" } else { "lazy" }
                ),
                None,
                "system.startup",
            )
            .await;
    }

    pub async fn list_cameras(&self) -> Vec<CameraView> {
        let cameras = self.config.service().list_cameras().await;
        let mut views = Vec::with_capacity(cameras.len());
        for camera in cameras {
            views.push(self.view(camera).await);
        }
        views
    }

    pub async fn camera(&self, camera_id: &str) -> Result<CameraView> {
        let camera = self.require_camera(camera_id).await?;
        Ok(self.view(camera).await)
    }

    /// Persist, then bring up control and preview sessions
    pub async fn add_camera(&self, camera: CameraRecord) -> Result<CameraView> {
        let camera = self.config.service().add_camera(camera).await?;

        if let Err(e) = self.controls.add(&camera).await {
            // keep the store consistent with the registries
            if let Err(undo) = self.config.service().remove_camera(&camera.id).await {
                tracing::error!(camera_id = %camera.id, error = %undo, "Rollback of camera add failed");
            }
            return Err(e);
        }
        self.start_preview(&camera).await;

        self.event_log
            .info(format!("Camera added: {}", camera.name), Some(&camera.id), "camera.added")
            .await;
        Ok(self.view(camera).await)
    }

    /// Partial update; sessions are rebuilt only for the parts that changed
    pub async fn update_camera(&self, camera_id: &str, update: CameraUpdate) -> Result<CameraView> {
        let (previous, updated) = self.config.service().update_camera(camera_id, update).await?;

        if previous.control_changed(&updated) {
            if let Err(e) = self.controls.add(&updated).await {
                if let Err(undo) = self.config.service().restore_camera(previous).await {
                    tracing::error!(camera_id = %camera_id, error = %undo, "Rollback of camera update failed");
                }
                return Err(e);
            }
            tracing::info!(camera_id = %camera_id, "Control session re-added after update");
        }

        if previous.preview_changed(&updated) {
            let has_session = self.previews.get(camera_id).await.is_some();
            if has_session || self.settings.preview_eager {
                if let Err(e) = self.previews.restart(camera_id, &updated).await {
                    tracing::warn!(camera_id = %camera_id, error = %e, "Preview restart failed");
                }
            }
        }

        self.event_log
            .info("Camera updated", Some(camera_id), "camera.updated")
            .await;
        Ok(self.view(updated).await)
    }

    /// Drop the record, then tear down preview and control
    ///
    /// Stream requests must not find the record once teardown starts.
    pub async fn delete_camera(&self, camera_id: &str) -> Result<()> {
        self.config.service().remove_camera(camera_id).await?;

        self.previews.remove(camera_id).await;
        self.controls.remove(camera_id).await;

        self.event_log
            .info("Camera removed", Some(camera_id), "camera.removed")
            .await;
        Ok(())
    }

    pub async fn ptz(&self, camera_id: &str, request: PtzRequest) -> Result<PtzResponse> {
        let outcome = self
            .controls
            .issue_command(camera_id, PtzCommand::from(request))
            .await?;
        Ok(PtzResponse::from_outcome(outcome))
    }

    pub async fn presets(&self, camera_id: &str, force_refresh: bool) -> Result<Vec<Preset>> {
        self.controls.presets(camera_id, force_refresh).await
    }

    pub async fn goto_preset(&self, camera_id: &str, token: &str) -> Result<CommandOutcome> {
        self.controls
            .issue_command(camera_id, PtzCommand::GotoPreset(token.to_string()))
            .await
    }

    pub async fn set_preset(&self, camera_id: &str, name: &str) -> Result<CommandOutcome> {
        self.controls
            .issue_command(camera_id, PtzCommand::SetPreset(name.to_string()))
            .await
    }

    pub async fn reconnect(&self, camera_id: &str) -> Result<()> {
        self.controls.reconnect(camera_id).await?;
        self.event_log
            .info("Manual reconnect requested", Some(camera_id), "control.reconnect")
            .await;
        Ok(())
    }

    pub async fn camera_health(&self, camera_id: &str) -> Result<CameraHealth> {
        self.require_camera(camera_id).await?;
        Ok(CameraHealth {
            camera_id: camera_id.to_string(),
            control: self.controls.state(camera_id).await.unwrap_or_default(),
            preview: self.previews.state(camera_id).await.unwrap_or_default(),
        })
    }

    pub async fn fleet_health(&self) -> FleetHealth {
        let cameras = self.config.service().list_cameras().await.len();
        let control = self.controls.states().await;
        let preview = self.previews.states().await;

        health::aggregate(
            cameras,
            control.values().map(|s| s.status),
            preview.values().map(|s| s.status),
        )
    }

    /// Stop every session (process shutdown)
    pub async fn shutdown(&self) {
        self.controls.shutdown().await;
        self.previews.stop_all().await;
        self.event_log
            .info("All sessions stopped", None, "system.shutdown")
            .await;
    }

    async fn start_preview(&self, camera: &CameraRecord) {
        match self.previews.create(camera).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                self.event_log
                    .warn("No preview source configured", Some(&camera.id), "preview.skipped")
                    .await;
            }
            Err(e) => {
                self.event_log
                    .error(format!("Preview not created: {}", e), Some(&camera.id), "preview.rejected")
                    .await;
            }
        }
    }

    async fn require_camera(&self, camera_id: &str) -> Result<CameraRecord> {
        self.config
            .service()
            .get_camera(camera_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("Camera {} not found", camera_id)))
    }

    async fn view(&self, camera: CameraRecord) -> CameraView {
        let stream_url = self
            .previews
            .get(&camera.id)
            .await
            .map(|p| p.stream_url())
            .unwrap_or_default();
        let control_status = self
            .controls
            .state(&camera.id)
            .await
            .map(|s| s.status)
            .unwrap_or_default();
        let preview_status = self.previews.check_health(&camera.id).await;

        CameraView {
            id: camera.id,
            name: camera.name,
            ip: camera.ip,
            onvif_port: camera.onvif_port,
            username: camera.username,
            control_protocol: camera.control_protocol,
            preview: camera.preview,
            stream_url,
            control_status,
            preview_status,
        }
    }
}
