//! Control session registry
//!
//! One control session per camera id. Connects run on a supervised
//! background task; the outcome is folded into the per-camera state only if
//! the attempt is still the current one for that id.

use super::provider::ControlProviderFactory;
use super::session::ControlSession;
use super::types::*;
use crate::config_store::CameraRecord;
use crate::error::{Error, Result};
use crate::event_log_service::EventLogService;
use crate::supervisor::{guarded, SessionTask};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Default connect budget
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

struct ControlEntry {
    session: Arc<ControlSession>,
    state: ControlSessionState,
    /// Current connect attempt; older attempts never publish
    attempt: u64,
    connect: Option<SessionTask>,
}

type EntryMap = Arc<Mutex<HashMap<String, ControlEntry>>>;

pub struct ControlRegistry {
    factory: Arc<dyn ControlProviderFactory>,
    event_log: Arc<EventLogService>,
    connect_timeout: Duration,
    entries: EntryMap,
}

impl ControlRegistry {
    pub fn new(
        factory: Arc<dyn ControlProviderFactory>,
        event_log: Arc<EventLogService>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            factory,
            event_log,
            connect_timeout,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register (or replace) the session for `camera` and connect in the background
    ///
    /// Replacing keeps the health state of the previous session.
    pub async fn add(&self, camera: &CameraRecord) -> Result<Arc<ControlSession>> {
        let provider = self.factory.build(camera).map_err(|e| match e {
            Error::Unsupported(msg) => Error::Validation(msg),
            other => other,
        })?;
        let session = Arc::new(ControlSession::new(camera.id.clone(), provider));

        let mut entries = self.entries.lock().await;
        let (state, attempt) = match entries.remove(&camera.id) {
            Some(previous) => {
                if let Some(task) = previous.connect {
                    task.cancel();
                }
                tracing::debug!(camera_id = %camera.id, "Replacing control session");
                (previous.state, previous.attempt + 1)
            }
            None => (ControlSessionState::default(), 1),
        };

        let connect = self.spawn_connect(camera.id.clone(), session.clone(), attempt);
        entries.insert(
            camera.id.clone(),
            ControlEntry {
                session: session.clone(),
                state,
                attempt,
                connect: Some(connect),
            },
        );
        drop(entries);

        tracing::info!(
            camera_id = %camera.id,
            protocol = %camera.control_protocol.as_str(),
            "Control session registered"
        );
        Ok(session)
    }

    pub async fn get(&self, camera_id: &str) -> Option<Arc<ControlSession>> {
        self.entries
            .lock()
            .await
            .get(camera_id)
            .map(|e| e.session.clone())
    }

    /// Drop session and state; unknown ids are ignored
    pub async fn remove(&self, camera_id: &str) {
        let removed = self.entries.lock().await.remove(camera_id);
        if let Some(entry) = removed {
            if let Some(task) = entry.connect {
                task.cancel();
            }
            tracing::info!(camera_id = %camera_id, "Control session removed");
        }
    }

    /// Forward a command; failures go back to the caller
    pub async fn issue_command(&self, camera_id: &str, command: PtzCommand) -> Result<CommandOutcome> {
        let session = self.require(camera_id).await?;
        session.execute(command).await
    }

    /// Preset list, optionally bypassing the cache
    pub async fn presets(&self, camera_id: &str, force_refresh: bool) -> Result<Vec<Preset>> {
        let session = self.require(camera_id).await?;
        if force_refresh {
            session.refresh_presets().await
        } else {
            session.presets().await
        }
    }

    /// Start a fresh connect attempt for an existing session
    pub async fn reconnect(&self, camera_id: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .get_mut(camera_id)
            .ok_or_else(|| Error::NotFound(format!("camera {} has no control session", camera_id)))?;

        if let Some(task) = entry.connect.take() {
            task.cancel();
        }
        entry.attempt += 1;
        entry.connect = Some(self.spawn_connect(
            camera_id.to_string(),
            entry.session.clone(),
            entry.attempt,
        ));

        tracing::debug!(camera_id = %camera_id, attempt = entry.attempt, "Control reconnect requested");
        Ok(())
    }

    pub async fn state(&self, camera_id: &str) -> Option<ControlSessionState> {
        self.entries
            .lock()
            .await
            .get(camera_id)
            .map(|e| e.state.clone())
    }

    pub async fn states(&self) -> HashMap<String, ControlSessionState> {
        self.entries
            .lock()
            .await
            .iter()
            .map(|(id, e)| (id.clone(), e.state.clone()))
            .collect()
    }

    /// Cancel in-flight connects (process shutdown)
    pub async fn shutdown(&self) {
        let mut entries = self.entries.lock().await;
        for entry in entries.values_mut() {
            if let Some(task) = entry.connect.take() {
                task.cancel();
            }
        }
    }

    async fn require(&self, camera_id: &str) -> Result<Arc<ControlSession>> {
        self.get(camera_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("camera {} has no control session", camera_id)))
    }

    fn spawn_connect(&self, camera_id: String, session: Arc<ControlSession>, attempt: u64) -> SessionTask {
        let entries = self.entries.clone();
        let event_log = self.event_log.clone();
        let limit = self.connect_timeout;

        SessionTask::spawn(move |cancel| async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = guarded("connect", limit, session.connect()) => result,
            };

            let mut map = entries.lock().await;
            let Some(entry) = map.get_mut(&camera_id) else {
                return;
            };
            if entry.attempt != attempt || cancel.is_cancelled() {
                return;
            }

            match result {
                Ok(()) => {
                    entry.state.record_connect_success(Utc::now());
                    drop(map);
                    event_log
                        .info("Control session connected", Some(&camera_id), "control.connect")
                        .await;
                }
                Err(e) => {
                    let error = Error::Connect {
                        camera_id: camera_id.clone(),
                        message: e.to_string(),
                    };
                    entry.state.record_connect_failure(error.to_string());
                    let failures = entry.state.consecutive_failures;
                    let status = entry.state.status;
                    drop(map);
                    event_log
                        .warn(
                            format!(
                                "Control connect failed ({} consecutive, status {}): {}",
                                failures,
                                status.as_str(),
                                e
                            ),
                            Some(&camera_id),
                            "control.connect_failed",
                        )
                        .await;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_store::ControlProtocol;
    use crate::testing::{camera, wait_for, MockControlFactory};

    fn registry(factory: Arc<MockControlFactory>) -> ControlRegistry {
        ControlRegistry::new(factory, Arc::new(EventLogService::new(50)), DEFAULT_CONNECT_TIMEOUT)
    }

    async fn failures(registry: &ControlRegistry, id: &str) -> u32 {
        registry.state(id).await.map(|s| s.consecutive_failures).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_connect_success_marks_ok() {
        let factory = Arc::new(MockControlFactory::default());
        let registry = registry(factory.clone());

        registry.add(&camera("cam1")).await.unwrap();
        wait_for!(registry.state("cam1").await.map(|s| s.status) == Some(ControlStatus::Ok));

        let state = registry.state("cam1").await.unwrap();
        assert_eq!(state.consecutive_failures, 0);
        assert!(state.last_seen.is_some());
        assert_eq!(factory.last("cam1").unwrap().connects(), 1);
    }

    #[tokio::test]
    async fn test_second_failure_flips_to_error() {
        let factory = Arc::new(MockControlFactory::default());
        factory.fail_connects(true);
        let registry = registry(factory.clone());

        registry.add(&camera("cam1")).await.unwrap();
        wait_for!(failures(&registry, "cam1").await == 1);
        assert_eq!(registry.state("cam1").await.unwrap().status, ControlStatus::Offline);

        registry.reconnect("cam1").await.unwrap();
        wait_for!(failures(&registry, "cam1").await == 2);
        let state = registry.state("cam1").await.unwrap();
        assert_eq!(state.status, ControlStatus::Error);
        assert!(state.last_error.is_some());
    }

    #[tokio::test]
    async fn test_single_failure_after_ok_keeps_ok() {
        let factory = Arc::new(MockControlFactory::default());
        let registry = registry(factory.clone());

        registry.add(&camera("cam1")).await.unwrap();
        wait_for!(registry.state("cam1").await.map(|s| s.status) == Some(ControlStatus::Ok));

        factory.last("cam1").unwrap().fail_connect(true);
        registry.reconnect("cam1").await.unwrap();
        wait_for!(failures(&registry, "cam1").await == 1);
        assert_eq!(registry.state("cam1").await.unwrap().status, ControlStatus::Ok);

        factory.last("cam1").unwrap().fail_connect(false);
        registry.reconnect("cam1").await.unwrap();
        wait_for!(failures(&registry, "cam1").await == 0);
        assert_eq!(registry.state("cam1").await.unwrap().status, ControlStatus::Ok);
    }

    #[tokio::test]
    async fn test_panicking_connect_counts_as_failure() {
        let factory = Arc::new(MockControlFactory::default());
        factory.panic_connects(true);
        let registry = registry(factory.clone());

        registry.add(&camera("cam1")).await.unwrap();
        wait_for!(failures(&registry, "cam1").await == 1);
        assert!(registry
            .state("cam1")
            .await
            .unwrap()
            .last_error
            .unwrap()
            .contains("panicked"));
    }

    #[tokio::test]
    async fn test_readd_replaces_session_and_keeps_state() {
        let factory = Arc::new(MockControlFactory::default());
        factory.fail_connects(true);
        let registry = registry(factory.clone());

        let first = registry.add(&camera("cam1")).await.unwrap();
        wait_for!(failures(&registry, "cam1").await == 1);

        let second = registry.add(&camera("cam1")).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&registry.get("cam1").await.unwrap(), &second));

        wait_for!(failures(&registry, "cam1").await == 2);
        assert_eq!(registry.state("cam1").await.unwrap().status, ControlStatus::Error);
        assert_eq!(factory.builds(), 2);
    }

    #[tokio::test]
    async fn test_unsupported_protocol_rejected() {
        let registry = registry(Arc::new(MockControlFactory::default()));
        let mut record = camera("cam1");
        record.control_protocol = ControlProtocol::Visca;

        let err = registry.add(&record).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(registry.get("cam1").await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_camera() {
        let registry = registry(Arc::new(MockControlFactory::default()));

        assert!(registry.get("ghost").await.is_none());
        assert!(matches!(
            registry.issue_command("ghost", PtzCommand::Stop).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(registry.reconnect("ghost").await, Err(Error::NotFound(_))));
        assert!(matches!(registry.presets("ghost", false).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent_and_isolated() {
        let registry = registry(Arc::new(MockControlFactory::default()));
        registry.add(&camera("cam1")).await.unwrap();
        registry.add(&camera("cam2")).await.unwrap();

        registry.remove("cam1").await;
        registry.remove("cam1").await;
        registry.remove("ghost").await;

        assert!(registry.get("cam1").await.is_none());
        assert!(registry.state("cam1").await.is_none());
        assert!(registry.get("cam2").await.is_some());
    }

    #[tokio::test]
    async fn test_commands_forwarded_without_retry() {
        let factory = Arc::new(MockControlFactory::default());
        let registry = registry(factory.clone());
        registry.add(&camera("cam1")).await.unwrap();

        let mock = factory.last("cam1").unwrap();
        mock.fail_commands(true);
        assert!(matches!(
            registry.issue_command("cam1", PtzCommand::Stop).await,
            Err(Error::Command(_))
        ));
        assert_eq!(mock.stops(), 1);

        mock.fail_commands(false);
        registry
            .issue_command("cam1", PtzCommand::GotoPreset("2".into()))
            .await
            .unwrap();
        assert_eq!(mock.gotos(), 1);
    }
}
