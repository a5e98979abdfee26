//! StreamGateway - MJPEG frame multiplexer
//!
//! ## Responsibilities
//!
//! - Resolve a camera's preview provider, lazily creating the session from
//!   its config record
//! - Wrap the provider's frame sequence as `multipart/x-mixed-replace`
//! - Record activity for every chunk handed to a client
//!
//! The registry lock is only taken per frame (activity stamp), never for
//! the lifetime of a stream.

use crate::config_store::ConfigStore;
use crate::error::{Error, Result};
use crate::preview_manager::{PreviewProvider, PreviewRegistry};
use bytes::{BufMut, Bytes, BytesMut};
use futures::stream::{BoxStream, Stream, StreamExt};
use std::sync::Arc;

/// Multipart boundary token
pub const BOUNDARY: &str = "frame";

pub const MJPEG_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// One multipart part carrying a JPEG frame
pub fn encode_part(frame: &[u8]) -> Bytes {
    let header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY,
        frame.len()
    );
    let mut part = BytesMut::with_capacity(header.len() + frame.len() + 2);
    part.put_slice(header.as_bytes());
    part.put_slice(frame);
    part.put_slice(b"\r\n");
    part.freeze()
}

/// Reject ids that cannot be camera ids (unexpanded URL templates etc.)
pub fn validate_stream_id(camera_id: &str) -> Result<()> {
    if camera_id.is_empty() || camera_id.contains('<') || camera_id.contains('>') {
        tracing::warn!(camera_id = %camera_id, "Rejected malformed stream id");
        return Err(Error::Validation(format!("invalid camera id: {}", camera_id)));
    }
    Ok(())
}

/// StreamGateway instance
pub struct StreamGateway {
    config: Arc<ConfigStore>,
    previews: Arc<PreviewRegistry>,
}

impl StreamGateway {
    pub fn new(config: Arc<ConfigStore>, previews: Arc<PreviewRegistry>) -> Self {
        Self { config, previews }
    }

    /// Provider for `camera_id`, created on first use
    pub async fn resolve(&self, camera_id: &str) -> Result<Arc<dyn PreviewProvider>> {
        validate_stream_id(camera_id)?;

        let camera = self
            .config
            .service()
            .get_camera(camera_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("camera {} not found", camera_id)))?;

        let provider = self
            .previews
            .create(&camera)
            .await?
            .ok_or_else(|| Error::NotFound(format!("camera {} has no preview source", camera_id)))?;

        // deleted between the lookup and the create
        if self.config.service().get_camera(camera_id).await.is_none() {
            self.previews.remove(camera_id).await;
            return Err(Error::NotFound(format!("camera {} not found", camera_id)));
        }

        if !provider.capabilities().mjpeg_stream {
            return Err(Error::NotFound(format!(
                "camera {} preview does not stream",
                camera_id
            )));
        }
        Ok(provider)
    }

    /// MJPEG body stream for `camera_id`
    pub async fn mjpeg(&self, camera_id: &str) -> Result<BoxStream<'static, std::io::Result<Bytes>>> {
        let provider = self.resolve(camera_id).await?;
        tracing::debug!(camera_id = %camera_id, "MJPEG client attached");
        Ok(multiplex(self.previews.clone(), camera_id.to_string(), provider.frames()).boxed())
    }

    /// Latest decoded frame, if any
    pub async fn latest_frame(&self, camera_id: &str) -> Result<Bytes> {
        let provider = self.resolve(camera_id).await?;
        if !provider.capabilities().snapshot {
            return Err(Error::NotFound(format!(
                "camera {} preview has no snapshots",
                camera_id
            )));
        }
        provider
            .latest_frame()
            .ok_or_else(|| Error::NotFound(format!("camera {} has no frame yet", camera_id)))
    }
}

/// Frame sequence -> multipart chunks, stamping activity per chunk
pub fn multiplex(
    previews: Arc<PreviewRegistry>,
    camera_id: String,
    frames: BoxStream<'static, Bytes>,
) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static {
    frames.then(move |frame| {
        let previews = previews.clone();
        let camera_id = camera_id.clone();
        async move {
            previews.record_activity(&camera_id).await;
            Ok(encode_part(&frame))
        }
    })
}
