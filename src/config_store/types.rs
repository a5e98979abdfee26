//! ConfigStore data types
//!
//! Camera records as stored in the camera config file

use serde::{Deserialize, Serialize};

/// PTZ control protocol tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ControlProtocol {
    #[default]
    Onvif,
    Visca,
}

impl ControlProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Onvif => "onvif",
            Self::Visca => "visca",
        }
    }
}

/// Preview source type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PreviewKind {
    #[default]
    Rtsp,
    Ndi,
}

/// Preview sub-record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PreviewConfig {
    #[serde(rename = "type", default)]
    pub kind: PreviewKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtsp_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ndi_source: Option<String>,
}

impl PreviewConfig {
    /// Source locator for the configured preview type
    pub fn source(&self) -> Option<&str> {
        let locator = match self.kind {
            PreviewKind::Rtsp => self.rtsp_url.as_deref(),
            PreviewKind::Ndi => self.ndi_source.as_deref(),
        };
        locator.filter(|s| !s.trim().is_empty())
    }
}

/// Camera entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraRecord {
    pub id: String,
    pub name: String,
    pub ip: String,
    #[serde(default = "default_onvif_port")]
    pub onvif_port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub control_protocol: ControlProtocol,
    #[serde(default)]
    pub preview: PreviewConfig,
}

fn default_onvif_port() -> u16 {
    80
}

impl CameraRecord {
    /// True when a change to `other` requires a new control session
    pub fn control_changed(&self, other: &CameraRecord) -> bool {
        self.ip != other.ip
            || self.onvif_port != other.onvif_port
            || self.username != other.username
            || self.password != other.password
            || self.control_protocol != other.control_protocol
    }

    /// True when a change to `other` requires a preview restart
    pub fn preview_changed(&self, other: &CameraRecord) -> bool {
        self.preview != other.preview
    }
}

/// Partial camera update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CameraUpdate {
    pub name: Option<String>,
    pub ip: Option<String>,
    pub onvif_port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub control_protocol: Option<ControlProtocol>,
    pub preview: Option<PreviewConfig>,
}

impl CameraUpdate {
    /// Apply set fields onto a record
    pub fn apply(self, camera: &mut CameraRecord) {
        if let Some(name) = self.name {
            camera.name = name;
        }
        if let Some(ip) = self.ip {
            camera.ip = ip;
        }
        if let Some(port) = self.onvif_port {
            camera.onvif_port = port;
        }
        if let Some(username) = self.username {
            camera.username = username;
        }
        if let Some(password) = self.password {
            camera.password = password;
        }
        if let Some(protocol) = self.control_protocol {
            camera.control_protocol = protocol;
        }
        if let Some(preview) = self.preview {
            camera.preview = preview;
        }
    }
}

/// On-disk layout of the camera config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CameraConfigFile {
    #[serde(default)]
    pub cameras: Vec<CameraRecord>,
}
