//! NDI source discovery
//!
//! Asks ffmpeg's `libndi_newtek` input to list the sources it can see:
//!
//! ```text
//! ffmpeg -hide_banner -f libndi_newtek -find_sources 1 -i dummy
//! [libndi_newtek @ 0x55d0c8] Found 2 NDI sources:
//! [libndi_newtek @ 0x55d0c8] 	'STUDIO (PTZ1)'	'192.168.1.40:5961'
//! ```
//!
//! A scan that cannot run yields an empty list.

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(5);

const NDI_LOG_PREFIX: &str = "[libndi_newtek @";

#[derive(Debug, Clone)]
pub struct NdiDiscovery {
    ffmpeg_path: String,
    timeout: Duration,
}

impl NdiDiscovery {
    pub fn new(ffmpeg_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            timeout,
        }
    }

    /// Names of the NDI sources currently on the network
    pub async fn scan(&self) -> Vec<String> {
        let run = Command::new(&self.ffmpeg_path)
            .args([
                "-hide_banner",
                "-f",
                "libndi_newtek",
                "-find_sources",
                "1",
                "-i",
                "dummy",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::warn!(ffmpeg = %self.ffmpeg_path, error = %e, "NDI discovery unavailable");
                return Vec::new();
            }
            Err(_) => {
                tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "NDI discovery timed out");
                return Vec::new();
            }
        };

        // ffmpeg exits non-zero here even on success, the listing is on stderr
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.contains(NDI_LOG_PREFIX) {
            tracing::warn!(
                error = %stderr.lines().last().unwrap_or_default(),
                "ffmpeg has no NDI input support"
            );
            return Vec::new();
        }

        let sources = parse_sources(&stderr);
        tracing::debug!(count = sources.len(), "NDI sources discovered");
        sources
    }
}

/// Extract source names from ffmpeg's `-find_sources` log
pub fn parse_sources(log: &str) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for line in log.lines() {
        let Some(rest) = line.trim_start().strip_prefix(NDI_LOG_PREFIX) else {
            continue;
        };
        let Some((_, message)) = rest.split_once(']') else {
            continue;
        };
        let Some((_, quoted)) = message.split_once('\'') else {
            continue;
        };
        let Some((name, _)) = quoted.split_once('\'') else {
            continue;
        };
        if !name.is_empty() && !sources.iter().any(|s| s == name) {
            sources.push(name.to_string());
        }
    }
    sources
}
