//! Application state
//!
//! Holds the configuration and the orchestrator shared across handlers

use crate::orchestrator::{Orchestrator, OrchestratorSettings};
use crate::preview_manager::{NdiDiscovery, DEFAULT_SCAN_TIMEOUT};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Camera config file (JSON)
    pub camera_config_path: PathBuf,
    /// Built frontend served at `/`
    pub frontend_dir: Option<PathBuf>,
    /// Start previews at boot instead of on first stream request
    pub preview_eager: bool,
    pub ffmpeg_path: String,
    pub preview_fps: u32,
    pub session_start_timeout: Duration,
    pub session_stop_timeout: Duration,
    pub control_connect_timeout: Duration,
    /// Budget for one ffmpeg NDI source scan
    pub ndi_scan_timeout: Duration,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_millis(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_or(key, default_ms))
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("PORT", 8000),
            camera_config_path: std::env::var("CAMERA_CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("config.json")),
            frontend_dir: std::env::var("FRONTEND_DIR")
                .ok()
                .filter(|d| !d.trim().is_empty())
                .map(PathBuf::from),
            preview_eager: std::env::var("PREVIEW_EAGER")
                .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
                .unwrap_or(false),
            ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            preview_fps: env_or("PREVIEW_FPS", 15),
            session_start_timeout: env_millis("SESSION_START_TIMEOUT_MS", 10_000),
            session_stop_timeout: env_millis("SESSION_STOP_TIMEOUT_MS", 2_000),
            control_connect_timeout: env_millis("CONTROL_CONNECT_TIMEOUT_MS", 10_000),
            ndi_scan_timeout: env_millis(
                "NDI_SCAN_TIMEOUT_MS",
                DEFAULT_SCAN_TIMEOUT.as_millis() as u64,
            ),
        }
    }
}

impl AppConfig {
    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            preview_eager: self.preview_eager,
            connect_timeout: self.control_connect_timeout,
            start_timeout: self.session_start_timeout,
            stop_timeout: self.session_stop_timeout,
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub orchestrator: Arc<Orchestrator>,
    pub ndi_discovery: Arc<NdiDiscovery>,
}

impl AppState {
    pub fn new(config: AppConfig, orchestrator: Arc<Orchestrator>) -> Self {
        let ndi_discovery = Arc::new(NdiDiscovery::new(
            config.ffmpeg_path.clone(),
            config.ndi_scan_timeout,
        ));
        Self {
            config,
            orchestrator,
            ndi_discovery,
        }
    }
}
