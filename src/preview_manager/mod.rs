//! Preview Manager Module
//!
//! ## Responsibilities
//!
//! - Preview provider contract and the ffmpeg implementation
//! - Preview session registry (lazy/eager start, restart, status machine)
//! - NDI source discovery through ffmpeg
//!
//! ## Status flow
//!
//! ```text
//! offline -> starting -> ok <-> error
//!               ^
//!          restarting
//! ```

mod discovery;
mod ffmpeg;
mod provider;
mod registry;
pub mod types;

pub use discovery::{parse_sources, NdiDiscovery, DEFAULT_SCAN_TIMEOUT};
pub use ffmpeg::{FfmpegPreview, FfmpegPreviewFactory, JpegSplitter, PreviewInput};
pub use provider::{PreviewProvider, PreviewProviderFactory};
pub use registry::{PreviewRegistry, StatusReporter, DEFAULT_START_TIMEOUT, DEFAULT_STOP_TIMEOUT};
pub use types::*;
