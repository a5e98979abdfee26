//! Test doubles for the provider traits

use crate::config_store::{CameraRecord, ControlProtocol, PreviewConfig, PreviewKind};
use crate::error::{Error, Result};
use crate::preview_manager::{
    PreviewCapabilities, PreviewProvider, PreviewProviderFactory, ProviderEvent, StatusReporter,
};
use crate::ptz_controller::{
    ControlCapabilities, ControlProvider, ControlProviderFactory, MoveVector, Preset,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

/// Poll an async condition until it holds (about 2 s), then assert
macro_rules! wait_for {
    ($cond:expr) => {{
        let mut reached = false;
        for _ in 0..200 {
            if $cond {
                reached = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(reached, "condition not reached: {}", stringify!($cond));
    }};
}
pub(crate) use wait_for;

pub fn camera(id: &str) -> CameraRecord {
    CameraRecord {
        id: id.to_string(),
        name: format!("Camera {}", id),
        ip: "192.0.2.10".to_string(),
        onvif_port: 80,
        username: "admin".to_string(),
        password: "secret".to_string(),
        control_protocol: ControlProtocol::Onvif,
        preview: PreviewConfig {
            kind: PreviewKind::Rtsp,
            rtsp_url: Some(format!("rtsp://192.0.2.10/{}", id)),
            ndi_source: None,
        },
    }
}

/// Write an executable `sh` script standing in for an external binary
#[cfg(unix)]
pub fn script(body: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let dir = std::env::temp_dir().join(format!("ptz-camserver-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("ffmpeg");
    std::fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn count(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

#[derive(Default)]
pub struct MockControl {
    capabilities: ControlCapabilities,
    connects: AtomicUsize,
    moves: AtomicUsize,
    stops: AtomicUsize,
    preset_fetches: AtomicUsize,
    gotos: AtomicUsize,
    sets: AtomicUsize,
    fail_connect: AtomicBool,
    panic_connect: AtomicBool,
    fail_commands: AtomicBool,
}

impl MockControl {
    pub fn with_capabilities(capabilities: ControlCapabilities) -> Self {
        Self {
            capabilities,
            ..Default::default()
        }
    }

    pub fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn panic_connect(&self, panic: bool) {
        self.panic_connect.store(panic, Ordering::SeqCst);
    }

    pub fn fail_commands(&self, fail: bool) {
        self.fail_commands.store(fail, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        count(&self.connects)
    }

    pub fn moves(&self) -> usize {
        count(&self.moves)
    }

    pub fn stops(&self) -> usize {
        count(&self.stops)
    }

    pub fn preset_fetches(&self) -> usize {
        count(&self.preset_fetches)
    }

    pub fn gotos(&self) -> usize {
        count(&self.gotos)
    }

    pub fn sets(&self) -> usize {
        count(&self.sets)
    }

    fn command(&self, counter: &AtomicUsize) -> Result<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        if self.fail_commands.load(Ordering::SeqCst) {
            Err(Error::Network("device rejected command".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ControlProvider for MockControl {
    async fn connect(&self) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.panic_connect.load(Ordering::SeqCst) {
            panic!("mock connect panic");
        }
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(Error::Network("connection refused".to_string()));
        }
        Ok(())
    }

    async fn continuous_move(&self, _vector: MoveVector) -> Result<()> {
        self.command(&self.moves)
    }

    async fn stop(&self) -> Result<()> {
        self.command(&self.stops)
    }

    async fn fetch_presets(&self) -> Result<Vec<Preset>> {
        self.command(&self.preset_fetches)?;
        Ok(vec![
            Preset {
                id: "1".into(),
                name: "Altar".into(),
            },
            Preset {
                id: "2".into(),
                name: "Choir".into(),
            },
        ])
    }

    async fn goto_preset(&self, _token: &str) -> Result<()> {
        self.command(&self.gotos)
    }

    async fn set_preset(&self, _name: &str) -> Result<()> {
        self.command(&self.sets)
    }

    fn capabilities(&self) -> ControlCapabilities {
        self.capabilities
    }
}

/// Builds a fresh `MockControl` per record, remembering the latest per id
#[derive(Default)]
pub struct MockControlFactory {
    fail_connects: AtomicBool,
    panic_connects: AtomicBool,
    builds: AtomicUsize,
    built: Mutex<HashMap<String, Arc<MockControl>>>,
}

impl MockControlFactory {
    /// Applies to controls built after the call
    pub fn fail_connects(&self, fail: bool) {
        self.fail_connects.store(fail, Ordering::SeqCst);
    }

    pub fn panic_connects(&self, panic: bool) {
        self.panic_connects.store(panic, Ordering::SeqCst);
    }

    pub fn builds(&self) -> usize {
        count(&self.builds)
    }

    pub fn last(&self, camera_id: &str) -> Option<Arc<MockControl>> {
        self.built.lock().ok()?.get(camera_id).cloned()
    }
}

impl ControlProviderFactory for MockControlFactory {
    fn build(&self, camera: &CameraRecord) -> Result<Arc<dyn ControlProvider>> {
        if camera.control_protocol != ControlProtocol::Onvif {
            return Err(Error::Unsupported(format!(
                "control protocol {} is not supported",
                camera.control_protocol.as_str()
            )));
        }

        let control = Arc::new(MockControl::default());
        control.fail_connect(self.fail_connects.load(Ordering::SeqCst));
        control.panic_connect(self.panic_connects.load(Ordering::SeqCst));
        self.builds.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut built) = self.built.lock() {
            built.insert(camera.id.clone(), control.clone());
        }
        Ok(control)
    }
}

/// Concurrency counters shared by all previews of one factory
#[derive(Default)]
struct RunningGauge {
    running: AtomicUsize,
    max: AtomicUsize,
}

impl RunningGauge {
    fn up(&self) {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn down(&self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct MockPreview {
    camera_id: String,
    reporter: StatusReporter,
    gauge: Arc<RunningGauge>,
    start_delay: Duration,
    fail_start: bool,
    fail_stop: bool,
    running: AtomicBool,
    starts: AtomicUsize,
    stops: AtomicUsize,
    latest: Mutex<Option<Bytes>>,
    frames: broadcast::Sender<Bytes>,
    stopped: CancellationToken,
}

impl MockPreview {
    pub fn starts(&self) -> usize {
        count(&self.starts)
    }

    pub fn stops(&self) -> usize {
        count(&self.stops)
    }

    /// Deliver a frame as the capture loop would
    pub async fn push_frame(&self, frame: Bytes) {
        if let Ok(mut latest) = self.latest.lock() {
            *latest = Some(frame.clone());
        }
        let _ = self.frames.send(frame);
        self.reporter.report(ProviderEvent::FrameDecoded).await;
    }

    pub async fn report(&self, event: ProviderEvent) {
        self.reporter.report(event).await;
    }

    /// Number of open frame streams
    pub fn subscribers(&self) -> usize {
        self.frames.receiver_count()
    }
}

#[async_trait]
impl PreviewProvider for MockPreview {
    async fn start(&self) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }
        if self.fail_start {
            return Err(Error::Connect {
                camera_id: self.camera_id.clone(),
                message: "stream unreachable".to_string(),
            });
        }

        if !self.running.swap(true, Ordering::SeqCst) {
            self.gauge.up();
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if self.running.swap(false, Ordering::SeqCst) {
            self.gauge.down();
        }
        self.stopped.cancel();
        if self.fail_stop {
            return Err(Error::Teardown("mock stop failure".to_string()));
        }
        Ok(())
    }

    fn latest_frame(&self) -> Option<Bytes> {
        self.latest.lock().ok().and_then(|f| f.clone())
    }

    fn stream_url(&self) -> String {
        format!("/api/video/{}/mjpeg", self.camera_id)
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn frames(&self) -> BoxStream<'static, Bytes> {
        if self.stopped.is_cancelled() {
            return stream::empty().boxed();
        }
        BroadcastStream::new(self.frames.subscribe())
            .filter_map(|frame| futures::future::ready(frame.ok()))
            .take_until(self.stopped.clone().cancelled_owned())
            .boxed()
    }

    fn capabilities(&self) -> PreviewCapabilities {
        PreviewCapabilities::default()
    }
}

#[derive(Default)]
pub struct MockPreviewFactory {
    start_delay: Mutex<Duration>,
    fail_starts: AtomicBool,
    fail_stops: AtomicBool,
    builds: AtomicUsize,
    gauge: Arc<RunningGauge>,
    built: Mutex<HashMap<String, Arc<MockPreview>>>,
}

impl MockPreviewFactory {
    pub fn set_start_delay(&self, delay: Duration) {
        if let Ok(mut d) = self.start_delay.lock() {
            *d = delay;
        }
    }

    pub fn fail_starts(&self, fail: bool) {
        self.fail_starts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_stops(&self, fail: bool) {
        self.fail_stops.store(fail, Ordering::SeqCst);
    }

    pub fn builds(&self) -> usize {
        count(&self.builds)
    }

    /// Highest number of previews running at once
    pub fn max_running(&self) -> usize {
        count(&self.gauge.max)
    }

    pub fn last(&self, camera_id: &str) -> Option<Arc<MockPreview>> {
        self.built.lock().ok()?.get(camera_id).cloned()
    }
}

impl PreviewProviderFactory for MockPreviewFactory {
    fn build(
        &self,
        camera: &CameraRecord,
        reporter: StatusReporter,
    ) -> Result<Option<Arc<dyn PreviewProvider>>> {
        if camera.preview.source().is_none() {
            return Ok(None);
        }

        let preview = Arc::new(MockPreview {
            camera_id: camera.id.clone(),
            reporter,
            gauge: self.gauge.clone(),
            start_delay: self.start_delay.lock().map(|d| *d).unwrap_or_default(),
            fail_start: self.fail_starts.load(Ordering::SeqCst),
            fail_stop: self.fail_stops.load(Ordering::SeqCst),
            running: AtomicBool::new(false),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            latest: Mutex::new(None),
            frames: broadcast::channel(16).0,
            stopped: CancellationToken::new(),
        });
        self.builds.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut built) = self.built.lock() {
            built.insert(camera.id.clone(), preview.clone());
        }
        Ok(Some(preview))
    }
}
