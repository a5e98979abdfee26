//! PTZ Camserver Library
//!
//! Session orchestration for a fleet of PTZ cameras
//!
//! ## Architecture
//!
//! 1. ConfigStore - camera records (JSON file)
//! 2. PtzController - control session registry + ONVIF provider
//! 3. PreviewManager - preview session registry + ffmpeg provider
//! 4. StreamGateway - MJPEG frame multiplexer
//! 5. Orchestrator - camera lifecycle across the registries
//! 6. EventLogService - lifecycle events (ring buffer)
//! 7. WebAPI - REST API endpoints
//!
//! ## Design Principles
//!
//! - ConfigStore is the single source of truth for camera records
//! - At most one live control and preview session per camera id
//! - Provider failures are recorded, never fatal

pub mod config_store;
pub mod error;
pub mod event_log_service;
pub mod health;
pub mod models;
pub mod orchestrator;
pub mod preview_manager;
pub mod ptz_controller;
pub mod state;
pub mod stream_gateway;
pub mod supervisor;
pub mod web_api;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use state::AppState;
