//! Control session
//!
//! Wraps one provider with the per-session debounce and preset cache state.

use super::debounce::{MoveDebouncer, PresetCache};
use super::provider::ControlProvider;
use super::types::*;
use crate::error::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Time budget for a single device command
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ControlSession {
    camera_id: String,
    provider: Arc<dyn ControlProvider>,
    capabilities: ControlCapabilities,
    debouncer: Mutex<MoveDebouncer>,
    presets: Mutex<PresetCache>,
}

impl std::fmt::Debug for ControlSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlSession")
            .field("camera_id", &self.camera_id)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

impl ControlSession {
    /// Capabilities are read once here and never refreshed
    pub fn new(camera_id: impl Into<String>, provider: Arc<dyn ControlProvider>) -> Self {
        let capabilities = provider.capabilities();
        Self {
            camera_id: camera_id.into(),
            provider,
            capabilities,
            debouncer: Mutex::new(MoveDebouncer::default()),
            presets: Mutex::new(PresetCache::default()),
        }
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn capabilities(&self) -> ControlCapabilities {
        self.capabilities
    }

    pub async fn connect(&self) -> Result<()> {
        self.provider.connect().await
    }

    /// Continuous move, coalesced within the debounce window
    pub async fn continuous_move(&self, vector: MoveVector) -> Result<CommandOutcome> {
        if !self.capabilities.continuous_move {
            return Err(Error::Unsupported(format!(
                "camera {} does not support continuous move",
                self.camera_id
            )));
        }

        if !self.debouncer.lock().await.admit(Instant::now()) {
            tracing::trace!(camera_id = %self.camera_id, "PTZ move coalesced");
            return Ok(CommandOutcome::Coalesced);
        }

        let vector = vector.clamped();
        tracing::debug!(
            camera_id = %self.camera_id,
            pan = %vector.pan,
            tilt = %vector.tilt,
            zoom = %vector.zoom,
            speed = %vector.speed,
            "Executing PTZ move"
        );

        self.command("move", self.provider.continuous_move(vector)).await?;
        Ok(CommandOutcome::Sent)
    }

    /// Stop; never debounced
    pub async fn stop(&self) -> Result<CommandOutcome> {
        self.debouncer.lock().await.reset();
        tracing::debug!(camera_id = %self.camera_id, "Executing PTZ stop");
        self.command("stop", self.provider.stop()).await?;
        Ok(CommandOutcome::Sent)
    }

    /// Preset list, served from cache while fresh
    pub async fn presets(&self) -> Result<Vec<Preset>> {
        if !self.capabilities.presets {
            return Ok(Vec::new());
        }

        if let Some(cached) = self.presets.lock().await.get(Instant::now()) {
            return Ok(cached);
        }

        self.fetch_presets().await
    }

    /// Drop the cache and fetch from the device
    pub async fn refresh_presets(&self) -> Result<Vec<Preset>> {
        if !self.capabilities.presets {
            return Ok(Vec::new());
        }

        self.presets.lock().await.clear();
        self.fetch_presets().await
    }

    pub async fn goto_preset(&self, token: &str) -> Result<CommandOutcome> {
        self.require_presets()?;
        self.command("goto_preset", self.provider.goto_preset(token)).await?;
        Ok(CommandOutcome::Sent)
    }

    // TODO: invalidate the preset cache here once the UI stops relying on its
    // own delayed refetch after saving a preset.
    pub async fn set_preset(&self, name: &str) -> Result<CommandOutcome> {
        self.require_presets()?;
        if name.trim().is_empty() {
            return Err(Error::Validation("preset name must not be empty".to_string()));
        }
        self.command("set_preset", self.provider.set_preset(name)).await?;
        Ok(CommandOutcome::Sent)
    }

    /// Forward any command
    pub async fn execute(&self, command: PtzCommand) -> Result<CommandOutcome> {
        match command {
            PtzCommand::Move(vector) => self.continuous_move(vector).await,
            PtzCommand::Stop => self.stop().await,
            PtzCommand::GotoPreset(token) => self.goto_preset(&token).await,
            PtzCommand::SetPreset(name) => self.set_preset(&name).await,
        }
    }

    async fn fetch_presets(&self) -> Result<Vec<Preset>> {
        let presets = crate::supervisor::guarded(
            "fetch_presets",
            COMMAND_TIMEOUT,
            self.provider.fetch_presets(),
        )
        .await
        .map_err(|e| Error::Command(format!("preset fetch failed: {}", e)))?;

        self.presets.lock().await.store(presets.clone(), Instant::now());
        tracing::debug!(camera_id = %self.camera_id, count = presets.len(), "Preset cache refreshed");
        Ok(presets)
    }

    fn require_presets(&self) -> Result<()> {
        if self.capabilities.presets {
            Ok(())
        } else {
            Err(Error::Unsupported(format!(
                "camera {} does not support presets",
                self.camera_id
            )))
        }
    }

    async fn command<F>(&self, what: &str, fut: F) -> Result<()>
    where
        F: std::future::Future<Output = Result<()>>,
    {
        crate::supervisor::guarded(what, COMMAND_TIMEOUT, fut)
            .await
            .map_err(|e| {
                tracing::warn!(camera_id = %self.camera_id, command = %what, error = %e, "PTZ command failed");
                match e {
                    Error::Command(_) => e,
                    other => Error::Command(format!("{} failed: {}", what, other)),
                }
            })
    }
}
