//! PTZ Controller Module
//!
//! ## Responsibilities
//!
//! - Control provider contract and the ONVIF implementation
//! - Per-camera control sessions (move debounce, preset cache)
//! - Control session registry with background connect and health state

mod debounce;
mod onvif;
mod provider;
mod registry;
mod session;
mod soap;
pub mod types;

pub use debounce::{MOVE_DEBOUNCE_WINDOW, PRESET_CACHE_TTL};
pub use onvif::OnvifControl;
pub use provider::{ControlProvider, ControlProviderFactory, DeviceControlFactory};
pub use registry::{ControlRegistry, DEFAULT_CONNECT_TIMEOUT};
pub use session::ControlSession;
pub use types::*;
