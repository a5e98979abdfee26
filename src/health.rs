//! Fleet health aggregation

use crate::preview_manager::{PreviewSessionState, PreviewStatus};
use crate::ptz_controller::{ControlSessionState, ControlStatus};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FleetStatus {
    Ok,
    Degraded,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub ok: usize,
    pub error: usize,
}

/// Fleet-wide health summary
#[derive(Debug, Clone, Serialize)]
pub struct FleetHealth {
    pub status: FleetStatus,
    pub cameras: usize,
    pub control: StatusCounts,
    pub preview: StatusCounts,
}

/// Per-camera health
#[derive(Debug, Clone, Serialize)]
pub struct CameraHealth {
    pub camera_id: String,
    pub control: ControlSessionState,
    pub preview: PreviewSessionState,
}

/// Fold per-device statuses into counts; degraded iff anything is in error
pub fn aggregate<C, P>(cameras: usize, control: C, preview: P) -> FleetHealth
where
    C: IntoIterator<Item = ControlStatus>,
    P: IntoIterator<Item = PreviewStatus>,
{
    let mut control_counts = StatusCounts::default();
    for status in control {
        match status {
            ControlStatus::Ok => control_counts.ok += 1,
            ControlStatus::Error => control_counts.error += 1,
            ControlStatus::Offline => {}
        }
    }

    let mut preview_counts = StatusCounts::default();
    for status in preview {
        match status {
            PreviewStatus::Ok => preview_counts.ok += 1,
            PreviewStatus::Error => preview_counts.error += 1,
            _ => {}
        }
    }

    let status = if control_counts.error > 0 || preview_counts.error > 0 {
        FleetStatus::Degraded
    } else {
        FleetStatus::Ok
    };

    FleetHealth {
        status,
        cameras,
        control: control_counts,
        preview: preview_counts,
    }
}
