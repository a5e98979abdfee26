//! PTZ Controller type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Consecutive connect failures needed before a session is reported as error
pub const CONNECT_FAILURE_THRESHOLD: u32 = 2;

/// Control session health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ControlStatus {
    #[default]
    Offline,
    Ok,
    Error,
}

impl ControlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Ok => "ok",
            Self::Error => "error",
        }
    }
}

/// Per-camera control session state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlSessionState {
    pub status: ControlStatus,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl ControlSessionState {
    /// Successful connect: healthy, counter reset
    pub fn record_connect_success(&mut self, at: DateTime<Utc>) {
        self.status = ControlStatus::Ok;
        self.consecutive_failures = 0;
        self.last_error = None;
        self.last_seen = Some(at);
    }

    /// Failed connect; a single blip keeps the previous status
    pub fn record_connect_failure(&mut self, error: impl Into<String>) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(error.into());
        if self.consecutive_failures >= CONNECT_FAILURE_THRESHOLD {
            self.status = ControlStatus::Error;
        }
    }
}

/// Device preset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    /// Device preset token
    pub id: String,
    pub name: String,
}

/// Optional operations a control provider supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlCapabilities {
    pub continuous_move: bool,
    pub absolute_move: bool,
    pub relative_move: bool,
    pub presets: bool,
}

impl Default for ControlCapabilities {
    fn default() -> Self {
        Self {
            continuous_move: true,
            absolute_move: false,
            relative_move: false,
            presets: true,
        }
    }
}

/// Continuous move velocity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoveVector {
    /// -1.0 (left) to 1.0 (right)
    pub pan: f32,
    /// -1.0 (down) to 1.0 (up)
    pub tilt: f32,
    /// -1.0 (out) to 1.0 (in)
    pub zoom: f32,
    /// 0.0 to 1.0
    pub speed: f32,
}

impl MoveVector {
    /// Clamp every axis into its valid range
    pub fn clamped(self) -> Self {
        let axis = |v: f32| if v.is_finite() { v.clamp(-1.0, 1.0) } else { 0.0 };
        Self {
            pan: axis(self.pan),
            tilt: axis(self.tilt),
            zoom: axis(self.zoom),
            speed: if self.speed.is_finite() {
                self.speed.clamp(0.0, 1.0)
            } else {
                0.0
            },
        }
    }
}

/// Command forwarded to a control session
#[derive(Debug, Clone, PartialEq)]
pub enum PtzCommand {
    Move(MoveVector),
    Stop,
    GotoPreset(String),
    SetPreset(String),
}

/// What happened to an accepted command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandOutcome {
    /// Sent to the device
    Sent,
    /// Accepted but folded into a recent move
    Coalesced,
}

/// PTZ action from the API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PtzAction {
    Move,
    Zoom,
    Stop,
}

/// PTZ request body
#[derive(Debug, Clone, Deserialize)]
pub struct PtzRequest {
    pub action: PtzAction,
    #[serde(default)]
    pub pan: f32,
    #[serde(default)]
    pub tilt: f32,
    #[serde(default)]
    pub zoom: f32,
    #[serde(default = "default_speed")]
    pub speed: f32,
}

fn default_speed() -> f32 {
    0.5
}

impl From<PtzRequest> for PtzCommand {
    fn from(req: PtzRequest) -> Self {
        match req.action {
            PtzAction::Move => PtzCommand::Move(MoveVector {
                pan: req.pan,
                tilt: req.tilt,
                zoom: req.zoom,
                speed: req.speed,
            }),
            PtzAction::Zoom => PtzCommand::Move(MoveVector {
                pan: 0.0,
                tilt: 0.0,
                zoom: req.zoom,
                speed: req.speed,
            }),
            PtzAction::Stop => PtzCommand::Stop,
        }
    }
}

/// PTZ operation result
#[derive(Debug, Clone, Serialize)]
pub struct PtzResponse {
    pub status: &'static str,
    pub outcome: CommandOutcome,
}

impl PtzResponse {
    pub fn from_outcome(outcome: CommandOutcome) -> Self {
        Self {
            status: "ok",
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_failure_keeps_status() {
        let mut state = ControlSessionState::default();
        state.record_connect_success(Utc::now());
        state.record_connect_failure("timeout");
        assert_eq!(state.status, ControlStatus::Ok);
        assert_eq!(state.consecutive_failures, 1);
        assert_eq!(state.last_error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_two_failures_flip_to_error() {
        let mut state = ControlSessionState::default();
        state.record_connect_failure("refused");
        assert_eq!(state.status, ControlStatus::Offline);
        state.record_connect_failure("refused");
        assert_eq!(state.status, ControlStatus::Error);
    }

    #[test]
    fn test_success_resets_counter() {
        let mut state = ControlSessionState::default();
        state.record_connect_failure("refused");
        state.record_connect_failure("refused");
        state.record_connect_failure("refused");
        state.record_connect_success(Utc::now());
        assert_eq!(state.status, ControlStatus::Ok);
        assert_eq!(state.consecutive_failures, 0);
        assert!(state.last_error.is_none());
        assert!(state.last_seen.is_some());
    }

    #[test]
    fn test_zoom_action_only_zooms() {
        let req: PtzRequest =
            serde_json::from_str(r#"{"action":"zoom","pan":0.7,"zoom":-0.4}"#).unwrap();
        match PtzCommand::from(req) {
            PtzCommand::Move(v) => {
                assert_eq!(v.pan, 0.0);
                assert_eq!(v.zoom, -0.4);
                assert_eq!(v.speed, 0.5);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_clamped() {
        let v = MoveVector {
            pan: 3.0,
            tilt: -2.0,
            zoom: f32::NAN,
            speed: 1.5,
        }
        .clamped();
        assert_eq!((v.pan, v.tilt, v.zoom, v.speed), (1.0, -1.0, 0.0, 1.0));
    }
}
