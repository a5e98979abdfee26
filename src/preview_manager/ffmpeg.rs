//! ffmpeg preview provider
//!
//! Runs one ffmpeg subprocess per camera that transcodes the source (RTSP
//! or NDI) to MJPEG on stdout. A capture loop splits stdout into JPEG
//! frames, keeps the newest one and fans frames out to stream subscribers.
//!
//! ```text
//! rtsp: ffmpeg -rtsp_transport tcp -i URL    -an -f mjpeg -r FPS -
//! ndi:  ffmpeg -f libndi_newtek -i SOURCE    -an -f mjpeg -r FPS -
//! ```

use super::provider::{PreviewProvider, PreviewProviderFactory};
use super::registry::StatusReporter;
use super::types::{PreviewCapabilities, ProviderEvent};
use crate::config_store::{CameraRecord, PreviewKind};
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

/// Wait after `q` before the process is killed
const GRACEFUL_STOP: Duration = Duration::from_secs(2);

/// Frames buffered per subscriber before it starts skipping
const FRAME_CHANNEL_CAPACITY: usize = 16;

/// Give up on a frame that never terminates
const MAX_BUFFERED: usize = 8 * 1024 * 1024;

const READ_CHUNK: usize = 64 * 1024;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Splits a concatenated MJPEG byte stream into JPEG frames
#[derive(Debug, Default)]
pub struct JpegSplitter {
    buf: BytesMut,
    /// Offset past SOI already searched for EOI
    scanned: usize,
}

impl JpegSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, return every frame completed by them
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();

        loop {
            if self.scanned == 0 {
                match find(&self.buf, &SOI) {
                    Some(start) => {
                        let _ = self.buf.split_to(start);
                        self.scanned = SOI.len();
                    }
                    None => {
                        // keep a trailing 0xFF, it may begin the next SOI
                        let keep = usize::from(self.buf.last() == Some(&0xFF));
                        let drop_len = self.buf.len() - keep;
                        let _ = self.buf.split_to(drop_len);
                        break;
                    }
                }
            }

            let search_from = self.scanned.saturating_sub(1).max(SOI.len());
            match find(&self.buf[search_from..], &EOI) {
                Some(rel) => {
                    let end = search_from + rel + EOI.len();
                    frames.push(self.buf.split_to(end).freeze());
                    self.scanned = 0;
                }
                None => {
                    self.scanned = self.buf.len();
                    break;
                }
            }
        }

        if self.buf.len() > MAX_BUFFERED {
            tracing::warn!(buffered = self.buf.len(), "Dropping unterminated JPEG frame");
            self.buf.clear();
            self.scanned = 0;
        }

        frames
    }
}

fn find(haystack: &[u8], needle: &[u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|w| w == needle)
}

/// Where ffmpeg reads from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewInput {
    Rtsp(String),
    Ndi(String),
}

impl PreviewInput {
    /// Input for a camera record; `None` when its locator is missing
    pub fn from_record(camera: &CameraRecord) -> Option<Self> {
        let source = camera.preview.source()?.to_string();
        Some(match camera.preview.kind {
            PreviewKind::Rtsp => Self::Rtsp(source),
            PreviewKind::Ndi => Self::Ndi(source),
        })
    }
}

/// State shared with the capture loop
struct CaptureShared {
    latest: std::sync::RwLock<Option<Bytes>>,
    running: AtomicBool,
    frames: broadcast::Sender<Bytes>,
    /// Cancelled once the pipeline is gone; ends every frame stream
    stopped: CancellationToken,
}

impl CaptureShared {
    fn new() -> Self {
        let (frames, _) = broadcast::channel(FRAME_CHANNEL_CAPACITY);
        Self {
            latest: std::sync::RwLock::new(None),
            running: AtomicBool::new(false),
            frames,
            stopped: CancellationToken::new(),
        }
    }

    fn close(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.stopped.cancel();
    }
}

struct Capture {
    child: Child,
    stdin: Option<ChildStdin>,
    reader: JoinHandle<()>,
    stop_requested: Arc<AtomicBool>,
}

/// Single-use: once stopped (or crashed) it is replaced, never restarted
pub struct FfmpegPreview {
    camera_id: String,
    input: PreviewInput,
    ffmpeg_path: String,
    fps: u32,
    reporter: StatusReporter,
    shared: Arc<CaptureShared>,
    process: Mutex<Option<Capture>>,
}

impl FfmpegPreview {
    pub fn new(input: PreviewInput, ffmpeg_path: &str, fps: u32, reporter: StatusReporter) -> Self {
        Self {
            camera_id: reporter.camera_id().to_string(),
            input,
            ffmpeg_path: ffmpeg_path.to_string(),
            fps: fps.max(1),
            reporter,
            shared: Arc::new(CaptureShared::new()),
            process: Mutex::new(None),
        }
    }

    fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into()];
        match &self.input {
            PreviewInput::Rtsp(url) => {
                args.extend(["-rtsp_transport".into(), "tcp".into(), "-i".into(), url.clone()]);
            }
            PreviewInput::Ndi(source) => {
                args.extend(["-f".into(), "libndi_newtek".into(), "-i".into(), source.clone()]);
            }
        }
        args.extend([
            "-an".into(),
            "-f".into(),
            "mjpeg".into(),
            "-q:v".into(),
            "5".into(),
            "-r".into(),
            self.fps.to_string(),
            "-".into(),
        ]);
        args
    }
}

#[async_trait]
impl PreviewProvider for FfmpegPreview {
    async fn start(&self) -> Result<()> {
        let mut process = self.process.lock().await;
        if process.is_some() && self.is_running() {
            return Ok(());
        }
        if self.shared.stopped.is_cancelled() {
            return Err(Error::Internal("preview pipeline already stopped".to_string()));
        }

        let mut child = Command::new(&self.ffmpeg_path)
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Internal(format!("ffmpeg spawn failed: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("ffmpeg stdout unavailable".to_string()))?;
        let stderr = child.stderr.take();
        let stdin = child.stdin.take();

        self.shared.running.store(true, Ordering::SeqCst);

        let stop_requested = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(capture_loop(
            self.camera_id.clone(),
            stdout,
            stderr,
            self.shared.clone(),
            self.reporter.clone(),
            stop_requested.clone(),
        ));

        tracing::info!(
            camera_id = %self.camera_id,
            pid = child.id().unwrap_or_default(),
            fps = self.fps,
            "ffmpeg preview started"
        );

        *process = Some(Capture {
            child,
            stdin,
            reader,
            stop_requested,
        });
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let Some(mut capture) = self.process.lock().await.take() else {
            return Ok(());
        };
        capture.stop_requested.store(true, Ordering::SeqCst);

        if let Some(mut stdin) = capture.stdin.take() {
            if stdin.write_all(b"q\n").await.is_ok() {
                let _ = stdin.flush().await;
            }
        }

        let result = match tokio::time::timeout(GRACEFUL_STOP, capture.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(camera_id = %self.camera_id, status = %status, "ffmpeg exited");
                Ok(())
            }
            Ok(Err(e)) => Err(Error::Teardown(format!("ffmpeg wait failed: {}", e))),
            Err(_) => {
                tracing::warn!(camera_id = %self.camera_id, "ffmpeg ignored quit, killing");
                capture
                    .child
                    .kill()
                    .await
                    .map_err(|e| Error::Teardown(format!("ffmpeg kill failed: {}", e)))
            }
        };

        if tokio::time::timeout(Duration::from_millis(500), &mut capture.reader)
            .await
            .is_err()
        {
            capture.reader.abort();
        }
        self.shared.close();

        tracing::info!(camera_id = %self.camera_id, "ffmpeg preview stopped");
        result
    }

    fn latest_frame(&self) -> Option<Bytes> {
        self.shared.latest.read().ok().and_then(|frame| frame.clone())
    }

    fn stream_url(&self) -> String {
        format!("/api/video/{}/mjpeg", self.camera_id)
    }

    fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    fn frames(&self) -> BoxStream<'static, Bytes> {
        if self.shared.stopped.is_cancelled() {
            return stream::empty().boxed();
        }

        // lagging subscribers skip frames
        BroadcastStream::new(self.shared.frames.subscribe())
            .filter_map(|frame| futures::future::ready(frame.ok()))
            .take_until(self.shared.stopped.clone().cancelled_owned())
            .boxed()
    }

    fn capabilities(&self) -> PreviewCapabilities {
        PreviewCapabilities::default()
    }
}

/// Read stdout until EOF, publishing frames
async fn capture_loop(
    camera_id: String,
    mut stdout: ChildStdout,
    stderr: Option<ChildStderr>,
    shared: Arc<CaptureShared>,
    reporter: StatusReporter,
    stop_requested: Arc<AtomicBool>,
) {
    let diagnostics = stderr.map(|stderr| tokio::spawn(drain_stderr(camera_id.clone(), stderr)));
    let mut splitter = JpegSplitter::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut failure = None;

    loop {
        match stdout.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                for frame in splitter.push(&chunk[..n]) {
                    if let Ok(mut latest) = shared.latest.write() {
                        *latest = Some(frame.clone());
                    }
                    let _ = shared.frames.send(frame);
                    reporter.report(ProviderEvent::FrameDecoded).await;
                }
            }
            Err(e) => {
                failure = Some(format!("ffmpeg read failed: {}", e));
                break;
            }
        }
    }

    shared.close();

    if stop_requested.load(Ordering::SeqCst) {
        return;
    }

    let last_line = match diagnostics {
        Some(handle) => tokio::time::timeout(Duration::from_millis(500), handle)
            .await
            .ok()
            .and_then(|joined| joined.ok())
            .flatten(),
        None => None,
    };
    let message = failure.unwrap_or_else(|| match last_line {
        Some(line) => format!("ffmpeg exited: {}", line),
        None => "ffmpeg exited unexpectedly".to_string(),
    });

    tracing::warn!(camera_id = %camera_id, error = %message, "Preview capture ended");
    reporter.report(ProviderEvent::Failed(message)).await;
}

/// Log ffmpeg's stderr, return its last line
async fn drain_stderr(camera_id: String, stderr: ChildStderr) -> Option<String> {
    let mut lines = BufReader::new(stderr).lines();
    let mut last = None;
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(camera_id = %camera_id, "ffmpeg: {}", line);
        last = Some(line);
    }
    last
}

/// Factory for ffmpeg-backed previews
#[derive(Debug, Clone)]
pub struct FfmpegPreviewFactory {
    ffmpeg_path: String,
    fps: u32,
}

impl FfmpegPreviewFactory {
    pub fn new(ffmpeg_path: impl Into<String>, fps: u32) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            fps,
        }
    }
}

impl PreviewProviderFactory for FfmpegPreviewFactory {
    fn build(
        &self,
        camera: &CameraRecord,
        reporter: StatusReporter,
    ) -> Result<Option<Arc<dyn PreviewProvider>>> {
        let Some(input) = PreviewInput::from_record(camera) else {
            return Ok(None);
        };
        Ok(Some(Arc::new(FfmpegPreview::new(
            input,
            &self.ffmpeg_path,
            self.fps,
            reporter,
        ))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_store::PreviewConfig;
    use crate::event_log_service::EventLogService;
    use crate::preview_manager::{PreviewRegistry, PreviewStatus, DEFAULT_START_TIMEOUT};
    use crate::testing::{camera, wait_for};

    fn jpeg(body: &[u8]) -> Vec<u8> {
        let mut frame = SOI.to_vec();
        frame.extend_from_slice(body);
        frame.extend_from_slice(&EOI);
        frame
    }

    #[test]
    fn test_splits_concatenated_frames() {
        let mut stream = jpeg(b"first");
        stream.extend(jpeg(b"second"));

        let frames = JpegSplitter::new().push(&stream);
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0][..], &jpeg(b"first")[..]);
        assert_eq!(&frames[1][..], &jpeg(b"second")[..]);
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let frame = jpeg(b"0123456789");
        let mut splitter = JpegSplitter::new();

        // cut between 0xFF and 0xD9 of the EOI
        let cut = frame.len() - 1;
        assert!(splitter.push(&frame[..cut]).is_empty());
        let frames = splitter.push(&frame[cut..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &frame[..]);
    }

    #[test]
    fn test_soi_split_across_chunks() {
        let mut splitter = JpegSplitter::new();
        assert!(splitter.push(&[0x00, 0x01, 0xFF]).is_empty());
        let frames = splitter.push(&[0xD8, b'x', 0xFF, 0xD9]);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &[0xFF, 0xD8, b'x', 0xFF, 0xD9]);
    }

    #[test]
    fn test_garbage_before_soi_discarded() {
        let mut stream = b"noise".to_vec();
        stream.extend(jpeg(b"a"));
        let frames = JpegSplitter::new().push(&stream);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0][0], 0xFF);
        assert_eq!(frames[0][1], 0xD8);
    }

    #[test]
    fn test_input_from_record() {
        let record = camera("cam1");
        assert!(matches!(
            PreviewInput::from_record(&record),
            Some(PreviewInput::Rtsp(_))
        ));

        let mut ndi = camera("cam2");
        ndi.preview = PreviewConfig {
            kind: PreviewKind::Ndi,
            rtsp_url: Some("rtsp://ignored".into()),
            ndi_source: None,
        };
        assert!(PreviewInput::from_record(&ndi).is_none());

        ndi.preview.ndi_source = Some("STUDIO (PTZ1)".into());
        assert_eq!(
            PreviewInput::from_record(&ndi),
            Some(PreviewInput::Ndi("STUDIO (PTZ1)".into()))
        );
    }

    #[cfg(unix)]
    fn scripted_registry(body: &str, event_log: Arc<EventLogService>) -> PreviewRegistry {
        let script = crate::testing::script(body);
        PreviewRegistry::new(
            Arc::new(FfmpegPreviewFactory::new(script.to_string_lossy(), 15)),
            event_log,
            DEFAULT_START_TIMEOUT,
            Duration::from_secs(5),
        )
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_crashed_ffmpeg_reports_failure() {
        let event_log = Arc::new(EventLogService::new(50));
        let registry = scripted_registry(
            "printf '\\377\\330a\\377\\331\\377\\330b\\377\\331'\n\
             echo 'rtsp: connection refused' >&2\n\
             exit 1\n",
            event_log.clone(),
        );

        let provider = registry.create(&camera("cam1")).await.unwrap().unwrap();
        wait_for!(registry.check_health("cam1").await == PreviewStatus::Error);

        let state = registry.state("cam1").await.unwrap();
        assert!(state.last_seen.is_some());
        assert!(state
            .last_error
            .as_deref()
            .is_some_and(|e| e.contains("connection refused")));
        assert_eq!(provider.latest_frame().as_deref(), Some(&jpeg(b"b")[..]));
        assert!(!provider.is_running());
        assert!(event_log
            .get_by_camera("cam1", 10)
            .await
            .iter()
            .any(|e| e.event_type == "preview.error"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unresponsive_ffmpeg_killed_on_stop() {
        let registry = scripted_registry(
            "printf '\\377\\330a\\377\\331'\nexec sleep 30\n",
            Arc::new(EventLogService::new(50)),
        );

        let provider = registry.create(&camera("cam1")).await.unwrap().unwrap();
        wait_for!(provider.latest_frame().is_some());

        let started = tokio::time::Instant::now();
        provider.stop().await.unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= GRACEFUL_STOP, "stopped after {:?}", elapsed);
        assert!(elapsed < GRACEFUL_STOP + Duration::from_secs(2), "stopped after {:?}", elapsed);
        assert!(!provider.is_running());

        // the requested stop is not a capture failure
        tokio::time::sleep(Duration::from_millis(200)).await;
        let state = registry.state("cam1").await.unwrap();
        assert_eq!(state.status, PreviewStatus::Ok);
        assert!(state.last_error.is_none());
        assert_eq!(provider.frames().count().await, 0);
    }
}
