use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

/// Pixel layout of a raw frame handed over by a capture backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// Motion JPEG - compressed JPEG frames
    Mjpeg,
    /// YUV 4:2:2 packed as Y0 U Y1 V
    Yuyv,
    /// Packed 8-bit RGB
    Rgb24,
    /// Packed 8-bit BGR
    Bgr24,
    /// Single channel 8-bit intensity
    Gray8,
}

impl FrameFormat {
    /// Bytes per pixel, zero for compressed formats
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            FrameFormat::Mjpeg => 0,
            FrameFormat::Yuyv => 2,
            FrameFormat::Rgb24 | FrameFormat::Bgr24 => 3,
            FrameFormat::Gray8 => 1,
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, FrameFormat::Mjpeg)
    }
}

/// One raw frame as read from the stream
#[derive(Debug, Clone)]
pub struct FrameData {
    /// Sequence number assigned by the capture handle
    pub id: u64,
    /// When the frame was read
    pub timestamp: SystemTime,
    /// Raw pixel data
    pub data: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
}

impl FrameData {
    pub fn new(
        id: u64,
        timestamp: SystemTime,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: FrameFormat,
    ) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
            width,
            height,
            format,
        }
    }

    /// Expected byte length for uncompressed formats
    pub fn expected_size(&self) -> Option<usize> {
        if self.format.is_compressed() {
            None
        } else {
            Some(self.width as usize * self.height as usize * self.format.bytes_per_pixel())
        }
    }

    /// Check the payload length against the declared dimensions
    pub fn validate_size(&self) -> bool {
        match self.expected_size() {
            Some(expected) => self.data.len() == expected,
            None => !self.data.is_empty(),
        }
    }
}
