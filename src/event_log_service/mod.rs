//! EventLogService - System Event Recording (Ring Buffer)
//!
//! ## Responsibilities
//!
//! - Keep the most recent lifecycle events (control/preview/camera/system)
//! - Provide queries, newest first, optionally per camera
//!
//! Every recorded event is also emitted through `tracing`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::RwLock;

/// Default capacity
pub const DEFAULT_CAPACITY: usize = 200;

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// System event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemEvent {
    pub event_id: u64,
    pub ts: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub camera_id: Option<String>,
    /// e.g. `control.connect`, `preview.error`, `camera.added`
    pub event_type: String,
}

/// Ring buffer for events
struct EventRingBuffer {
    events: VecDeque<SystemEvent>,
    capacity: usize,
    next_id: u64,
}

impl EventRingBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            next_id: 1,
        }
    }

    fn push(&mut self, mut event: SystemEvent) -> u64 {
        event.event_id = self.next_id;
        self.next_id += 1;

        if self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
        self.next_id - 1
    }

    fn get_latest(&self, count: usize) -> Vec<SystemEvent> {
        self.events.iter().rev().take(count).cloned().collect()
    }

    fn get_by_camera(&self, camera_id: &str, count: usize) -> Vec<SystemEvent> {
        self.events
            .iter()
            .rev()
            .filter(|e| e.camera_id.as_deref() == Some(camera_id))
            .take(count)
            .cloned()
            .collect()
    }
}

/// EventLogService instance
pub struct EventLogService {
    buffer: RwLock<EventRingBuffer>,
}

impl EventLogService {
    /// Create new EventLogService
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: RwLock::new(EventRingBuffer::new(capacity.max(1))),
        }
    }

    /// Record an event
    pub async fn log(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        camera_id: Option<&str>,
        event_type: &str,
    ) -> u64 {
        let message = message.into();
        let camera = camera_id.unwrap_or("system");

        match level {
            LogLevel::Info => {
                tracing::info!(camera_id = %camera, event_type = %event_type, "{}", message)
            }
            LogLevel::Warn => {
                tracing::warn!(camera_id = %camera, event_type = %event_type, "{}", message)
            }
            LogLevel::Error => {
                tracing::error!(camera_id = %camera, event_type = %event_type, "{}", message)
            }
        }

        let event = SystemEvent {
            event_id: 0,
            ts: Utc::now(),
            level,
            message,
            camera_id: camera_id.map(str::to_string),
            event_type: event_type.to_string(),
        };

        self.buffer.write().await.push(event)
    }

    pub async fn info(&self, message: impl Into<String>, camera_id: Option<&str>, event_type: &str) {
        self.log(LogLevel::Info, message, camera_id, event_type).await;
    }

    pub async fn warn(&self, message: impl Into<String>, camera_id: Option<&str>, event_type: &str) {
        self.log(LogLevel::Warn, message, camera_id, event_type).await;
    }

    pub async fn error(&self, message: impl Into<String>, camera_id: Option<&str>, event_type: &str) {
        self.log(LogLevel::Error, message, camera_id, event_type).await;
    }

    /// Get latest events
    pub async fn get_latest(&self, count: usize) -> Vec<SystemEvent> {
        self.buffer.read().await.get_latest(count)
    }

    /// Get events by camera
    pub async fn get_by_camera(&self, camera_id: &str, count: usize) -> Vec<SystemEvent> {
        self.buffer.read().await.get_by_camera(camera_id, count)
    }

    /// Get event count
    pub async fn count(&self) -> usize {
        self.buffer.read().await.events.len()
    }
}

impl Default for EventLogService {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_newest_first_and_capacity() {
        let log = EventLogService::new(3);
        for i in 0..5 {
            log.info(format!("event {}", i), None, "system.test").await;
        }

        assert_eq!(log.count().await, 3);
        let latest = log.get_latest(10).await;
        assert_eq!(latest[0].message, "event 4");
        assert_eq!(latest[2].message, "event 2");
        assert_eq!(latest[0].event_id, 5);
    }

    #[tokio::test]
    async fn test_filter_by_camera() {
        let log = EventLogService::default();
        log.info("connected", Some("cam1"), "control.connect").await;
        log.warn("no frames", Some("cam2"), "preview.error").await;
        log.error("connect failed", Some("cam1"), "control.error").await;

        let cam1 = log.get_by_camera("cam1", 10).await;
        assert_eq!(cam1.len(), 2);
        assert_eq!(cam1[0].level, LogLevel::Error);
        assert!(log.get_by_camera("cam3", 10).await.is_empty());
    }
}
