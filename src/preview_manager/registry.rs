//! Preview session registry
//!
//! One preview provider per camera id. Lifecycle work (start, stop) runs on
//! a per-camera lane: a background task draining an ordered queue, so a stop
//! of the old provider always completes before the start of its replacement,
//! while different cameras proceed in parallel. Lane ops are enqueued while
//! the registry lock is held; the lane itself runs provider I/O unlocked.
//! A lane exits once its camera has no entry and its queue is drained.

use super::provider::{PreviewProvider, PreviewProviderFactory};
use super::types::*;
use crate::config_store::CameraRecord;
use crate::error::Result;
use crate::event_log_service::EventLogService;
use crate::supervisor::guarded;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};

/// Default start budget
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(10);

/// Default stop budget
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(2);

struct PreviewEntry {
    /// `None` while a restart is tearing the old provider down
    provider: Option<Arc<dyn PreviewProvider>>,
    state: PreviewSessionState,
    generation: u64,
}

impl PreviewEntry {
    /// Running, or its start is still in flight
    fn live_provider(&self) -> Option<Arc<dyn PreviewProvider>> {
        let provider = self.provider.as_ref()?;
        if self.state.status == PreviewStatus::Starting || provider.is_running() {
            Some(provider.clone())
        } else {
            None
        }
    }
}

enum LaneOp {
    Start {
        provider: Arc<dyn PreviewProvider>,
        generation: u64,
    },
    Stop {
        provider: Arc<dyn PreviewProvider>,
        done: Option<oneshot::Sender<()>>,
    },
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, PreviewEntry>,
    lanes: HashMap<String, mpsc::UnboundedSender<LaneOp>>,
    next_generation: u64,
}

#[derive(Clone, Copy)]
struct Timeouts {
    start: Duration,
    stop: Duration,
}

/// Handed to a provider at construction; routes capture-loop events to the
/// entry that owns it. Reports from a retired provider are dropped.
#[derive(Clone)]
pub struct StatusReporter {
    camera_id: String,
    generation: u64,
    inner: Weak<Mutex<Inner>>,
    event_log: Arc<EventLogService>,
}

impl StatusReporter {
    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub async fn report(&self, event: ProviderEvent) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let mut guard = inner.lock().await;
        let Some(entry) = guard.entries.get_mut(&self.camera_id) else {
            return;
        };
        if entry.generation != self.generation {
            tracing::trace!(camera_id = %self.camera_id, "Ignoring report from retired preview provider");
            return;
        }

        match event {
            ProviderEvent::FrameDecoded => {
                entry.state.status = PreviewStatus::Ok;
                entry.state.last_seen = Some(Utc::now());
            }
            ProviderEvent::Failed(message) => {
                let was = entry.state.status;
                entry.state.status = PreviewStatus::Error;
                entry.state.last_error = Some(message.clone());
                drop(guard);
                if was != PreviewStatus::Error {
                    self.event_log
                        .error(
                            format!("Preview capture failed: {}", message),
                            Some(&self.camera_id),
                            "preview.error",
                        )
                        .await;
                }
            }
        }
    }
}

impl std::fmt::Debug for StatusReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusReporter")
            .field("camera_id", &self.camera_id)
            .field("generation", &self.generation)
            .finish()
    }
}

pub struct PreviewRegistry {
    factory: Arc<dyn PreviewProviderFactory>,
    event_log: Arc<EventLogService>,
    timeouts: Timeouts,
    inner: Arc<Mutex<Inner>>,
}

impl PreviewRegistry {
    pub fn new(
        factory: Arc<dyn PreviewProviderFactory>,
        event_log: Arc<EventLogService>,
        start_timeout: Duration,
        stop_timeout: Duration,
    ) -> Self {
        Self {
            factory,
            event_log,
            timeouts: Timeouts {
                start: start_timeout,
                stop: stop_timeout,
            },
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Return the live provider for `camera`, or install and start a new one
    ///
    /// `Ok(None)` when the record has no preview source.
    pub async fn create(&self, camera: &CameraRecord) -> Result<Option<Arc<dyn PreviewProvider>>> {
        let mut inner = self.inner.lock().await;

        if let Some(live) = inner.entries.get(&camera.id).and_then(PreviewEntry::live_provider) {
            return Ok(Some(live));
        }

        inner.next_generation += 1;
        let generation = inner.next_generation;
        let reporter = StatusReporter {
            camera_id: camera.id.clone(),
            generation,
            inner: Arc::downgrade(&self.inner),
            event_log: self.event_log.clone(),
        };
        let built = self.factory.build(camera, reporter)?;

        let previous = inner.entries.remove(&camera.id);
        let last_seen = previous.as_ref().and_then(|p| p.state.last_seen);
        if let Some(old) = previous.and_then(|p| p.provider) {
            self.enqueue(&mut inner, &camera.id, LaneOp::Stop { provider: old, done: None });
        }

        let Some(provider) = built else {
            drop(inner);
            tracing::warn!(camera_id = %camera.id, "No preview source configured, skipping preview session");
            return Ok(None);
        };

        inner.entries.insert(
            camera.id.clone(),
            PreviewEntry {
                provider: Some(provider.clone()),
                state: PreviewSessionState {
                    status: PreviewStatus::Starting,
                    last_seen,
                    last_error: None,
                },
                generation,
            },
        );
        self.enqueue(
            &mut inner,
            &camera.id,
            LaneOp::Start {
                provider: provider.clone(),
                generation,
            },
        );
        drop(inner);

        tracing::info!(camera_id = %camera.id, generation = generation, "Preview session starting");
        Ok(Some(provider))
    }

    /// Tear the current session down, then create from `camera`
    pub async fn restart(&self, camera_id: &str, camera: &CameraRecord) -> Result<Option<Arc<dyn PreviewProvider>>> {
        let waiting = {
            let mut inner = self.inner.lock().await;
            let generation = inner.next_generation + 1;
            let old = inner.entries.get_mut(camera_id).and_then(|entry| {
                // retire the old reporter along with its provider
                entry.generation = generation;
                entry.state.status = PreviewStatus::Restarting;
                entry.provider.take()
            });
            inner.next_generation = generation;
            old.map(|provider| {
                let (done, wait) = oneshot::channel();
                self.enqueue(&mut inner, camera_id, LaneOp::Stop { provider, done: Some(done) });
                wait
            })
        };

        if let Some(wait) = waiting {
            let _ = wait.await;
        }
        self.event_log
            .info("Preview session restarting", Some(camera_id), "preview.restart")
            .await;

        self.create(camera).await
    }

    /// Stop and forget; unknown ids are ignored
    pub async fn remove(&self, camera_id: &str) {
        let waiting = {
            let mut inner = self.inner.lock().await;
            let Some(entry) = inner.entries.remove(camera_id) else {
                return;
            };
            entry.provider.map(|provider| {
                let (done, wait) = oneshot::channel();
                self.enqueue(&mut inner, camera_id, LaneOp::Stop { provider, done: Some(done) });
                wait
            })
        };

        if let Some(wait) = waiting {
            let _ = wait.await;
        }
        tracing::info!(camera_id = %camera_id, "Preview session removed");
    }

    pub async fn check_health(&self, camera_id: &str) -> PreviewStatus {
        self.inner
            .lock()
            .await
            .entries
            .get(camera_id)
            .map(|e| e.state.status)
            .unwrap_or(PreviewStatus::Offline)
    }

    /// Frame delivered to a client
    pub async fn record_activity(&self, camera_id: &str) {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.entries.get_mut(camera_id) {
            entry.state.last_seen = Some(Utc::now());
            if !entry.state.status.is_transitional() {
                entry.state.status = PreviewStatus::Ok;
            }
        }
    }

    pub async fn get(&self, camera_id: &str) -> Option<Arc<dyn PreviewProvider>> {
        self.inner
            .lock()
            .await
            .entries
            .get(camera_id)
            .and_then(|e| e.provider.clone())
    }

    pub async fn state(&self, camera_id: &str) -> Option<PreviewSessionState> {
        self.inner
            .lock()
            .await
            .entries
            .get(camera_id)
            .map(|e| e.state.clone())
    }

    pub async fn states(&self) -> HashMap<String, PreviewSessionState> {
        self.inner
            .lock()
            .await
            .entries
            .iter()
            .map(|(id, e)| (id.clone(), e.state.clone()))
            .collect()
    }

    /// Stop every session (process shutdown), bounded wait
    pub async fn stop_all(&self) {
        let waits: Vec<_> = {
            let mut inner = self.inner.lock().await;
            let entries: Vec<_> = inner.entries.drain().collect();
            entries
                .into_iter()
                .filter_map(|(id, entry)| {
                    let provider = entry.provider?;
                    let (done, wait) = oneshot::channel();
                    self.enqueue(&mut inner, &id, LaneOp::Stop { provider, done: Some(done) });
                    Some(wait)
                })
                .collect()
        };

        let count = waits.len();
        let grace = self.timeouts.stop + Duration::from_millis(500);
        if tokio::time::timeout(grace, futures::future::join_all(waits))
            .await
            .is_err()
        {
            tracing::warn!(sessions = count, "Preview shutdown did not finish in time");
        } else {
            tracing::info!(sessions = count, "All preview sessions stopped");
        }
    }

    #[cfg(test)]
    async fn lane_count(&self) -> usize {
        self.inner.lock().await.lanes.len()
    }

    /// Queue an op on the camera's lane, spawning the lane on first use
    fn enqueue(&self, inner: &mut Inner, camera_id: &str, op: LaneOp) {
        let op = match inner.lanes.get(camera_id) {
            Some(lane) => match lane.send(op) {
                Ok(()) => return,
                Err(mpsc::error::SendError(op)) => op,
            },
            None => op,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_lane(
            camera_id.to_string(),
            rx,
            Arc::downgrade(&self.inner),
            self.timeouts,
            self.event_log.clone(),
        ));
        // rx is alive until the lane task exits, which needs tx dropped first
        let _ = tx.send(op);
        inner.lanes.insert(camera_id.to_string(), tx);
    }
}

async fn run_lane(
    camera_id: String,
    mut ops: mpsc::UnboundedReceiver<LaneOp>,
    inner: Weak<Mutex<Inner>>,
    timeouts: Timeouts,
    event_log: Arc<EventLogService>,
) {
    while let Some(op) = ops.recv().await {
        match op {
            LaneOp::Start { provider, generation } => {
                let result = guarded("preview start", timeouts.start, provider.start()).await;
                publish_start(&camera_id, generation, result, &inner, &event_log).await;
            }
            LaneOp::Stop { provider, done } => {
                if let Err(e) = guarded("preview stop", timeouts.stop, provider.stop()).await {
                    tracing::warn!(camera_id = %camera_id, error = %e, "Preview stop failed");
                }
                if let Some(done) = done {
                    let _ = done.send(());
                }
            }
        }

        let Some(inner) = inner.upgrade() else {
            break;
        };
        // Enqueue holds the same lock, so an empty queue here stays empty
        let mut guard = inner.lock().await;
        if ops.is_empty() && !guard.entries.contains_key(&camera_id) {
            guard.lanes.remove(&camera_id);
            break;
        }
    }

    tracing::trace!(camera_id = %camera_id, "Preview lane closed");
}

async fn publish_start(
    camera_id: &str,
    generation: u64,
    result: Result<()>,
    inner: &Weak<Mutex<Inner>>,
    event_log: &EventLogService,
) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let mut guard = inner.lock().await;
    let Some(entry) = guard
        .entries
        .get_mut(camera_id)
        .filter(|e| e.generation == generation)
    else {
        // Retired while starting; its stop is already queued behind us
        return;
    };

    match result {
        Ok(()) => {
            if entry.state.status == PreviewStatus::Starting {
                entry.state.status = PreviewStatus::Ok;
            }
            drop(guard);
            event_log
                .info("Preview session started", Some(camera_id), "preview.start")
                .await;
        }
        Err(e) => {
            entry.state.status = PreviewStatus::Error;
            entry.state.last_error = Some(e.to_string());
            drop(guard);
            event_log
                .error(
                    format!("Preview start failed: {}", e),
                    Some(camera_id),
                    "preview.start_failed",
                )
                .await;
        }
    }
}
