use crate::error::StreamError;
use crate::frame::FrameData;
use tracing::info;

/// Something that can open a video stream by address
pub trait VideoSource: Send + Sync {
    /// Open one capture handle. Failures leave nothing behind.
    fn open(&self, address: &str) -> Result<Box<dyn CaptureHandle>, StreamError>;

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}

/// An open stream, owned by exactly one detector worker
pub trait CaptureHandle: Send {
    /// Block until the next raw frame is available
    fn read_frame(&mut self) -> Result<FrameData, StreamError>;

    /// Close the stream. Consumes the handle so it cannot run twice.
    fn release(self: Box<Self>);
}

/// Owns a capture handle and releases it exactly once, on whichever
/// path the worker leaves by.
pub struct CaptureGuard {
    handle: Option<Box<dyn CaptureHandle>>,
    address: String,
}

impl CaptureGuard {
    pub fn new(handle: Box<dyn CaptureHandle>, address: impl Into<String>) -> Self {
        Self {
            handle: Some(handle),
            address: address.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn read_frame(&mut self) -> Result<FrameData, StreamError> {
        match self.handle.as_mut() {
            Some(handle) => handle.read_frame(),
            None => Err(StreamError::EndOfStream),
        }
    }

    /// Release now instead of at drop
    pub fn release(mut self) {
        self.release_handle();
    }

    fn release_handle(&mut self) {
        if let Some(handle) = self.handle.take() {
            info!("Releasing capture handle for {}", self.address);
            handle.release();
        }
    }
}

impl CaptureHandle for CaptureGuard {
    fn read_frame(&mut self) -> Result<FrameData, StreamError> {
        CaptureGuard::read_frame(self)
    }

    fn release(self: Box<Self>) {
        CaptureGuard::release(*self)
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        self.release_handle();
    }
}
