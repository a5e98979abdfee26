//! Preview provider contract

use super::registry::StatusReporter;
use super::types::PreviewCapabilities;
use crate::config_store::CameraRecord;
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::sync::Arc;

#[async_trait]
pub trait PreviewProvider: Send + Sync {
    /// Begin acquisition; returns once the pipeline is up
    async fn start(&self) -> Result<()>;

    /// Graceful stop with a bounded wait, then forced
    async fn stop(&self) -> Result<()>;

    /// Most recent encoded JPEG frame
    fn latest_frame(&self) -> Option<Bytes>;

    fn stream_url(&self) -> String;

    fn is_running(&self) -> bool;

    /// Fresh stream of encoded JPEG frames; ends when the provider stops
    fn frames(&self) -> BoxStream<'static, Bytes>;

    fn capabilities(&self) -> PreviewCapabilities;
}

/// Builds preview providers from camera records
pub trait PreviewProviderFactory: Send + Sync {
    /// Construct (without starting). `Ok(None)` when the record has no
    /// usable preview source.
    fn build(
        &self,
        camera: &CameraRecord,
        reporter: StatusReporter,
    ) -> Result<Option<Arc<dyn PreviewProvider>>>;
}
