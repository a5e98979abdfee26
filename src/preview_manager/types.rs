//! Preview Manager type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Preview session lifecycle
///
/// `offline -> starting -> ok <-> error`; `restarting` re-enters `starting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PreviewStatus {
    #[default]
    Offline,
    Starting,
    Ok,
    Restarting,
    Error,
}

impl PreviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Starting => "starting",
            Self::Ok => "ok",
            Self::Restarting => "restarting",
            Self::Error => "error",
        }
    }

    /// Start in flight; activity must not override it
    pub fn is_transitional(&self) -> bool {
        matches!(self, Self::Starting | Self::Restarting)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreviewSessionState {
    pub status: PreviewStatus,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// What a preview provider can serve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewCapabilities {
    pub mjpeg_stream: bool,
    pub snapshot: bool,
}

impl Default for PreviewCapabilities {
    fn default() -> Self {
        Self {
            mjpeg_stream: true,
            snapshot: true,
        }
    }
}

/// Capture-loop event reported by a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    FrameDecoded,
    Failed(String),
}
