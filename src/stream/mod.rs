mod opener;
mod source;
pub mod synthetic;

#[cfg(all(target_os = "linux", feature = "camera"))]
mod gst;


pub use opener::StreamSource;
pub use source::{CaptureGuard, CaptureHandle, VideoSource};
pub use synthetic::SyntheticSource;

#[cfg(all(target_os = "linux", feature = "camera"))]
pub use gst::GstVideoSource;

use crate::config::WorkerConfig;
use crate::error::Result;
use std::sync::Arc;

/// Capture backend compiled into this build
#[cfg(all(target_os = "linux", feature = "camera"))]
pub fn default_source(config: &WorkerConfig) -> Result<Arc<dyn VideoSource>> {
    Ok(Arc::new(GstVideoSource::new(config.read_timeout())))
}

#[cfg(not(all(target_os = "linux", feature = "camera")))]
pub fn default_source(_config: &WorkerConfig) -> Result<Arc<dyn VideoSource>> {
    Err(crate::error::MotionwatchError::component(
        "stream",
        "no capture backend available; build on Linux with the `camera` feature",
    ))
}
