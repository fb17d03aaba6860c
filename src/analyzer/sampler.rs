use crate::config::SamplingConfig;
use crate::error::{AnalyzerError, Result};
use crate::frame::{FrameData, FrameFormat};
use crate::stream::CaptureHandle;

use image::imageops::{self, FilterType};
use image::GrayImage;
use imageproc::filter::gaussian_blur_f32;
use tracing::{debug, trace};

/// Gaussian sigma equivalent to a 31x31 smoothing kernel
pub const BLUR_SIGMA: f32 = 5.0;

/// Outcome of one sampler step
#[derive(Debug)]
pub enum Sample {
    /// A preprocessed frame ready for background modeling
    Frame(GrayImage),
    /// Frame was read but dropped by the skip ratio
    Skip,
}

/// Reads frames, drops all but every Nth, and normalizes the survivors
pub struct FrameSampler {
    frame_skip: u64,
    width: u32,
    height: u32,
    blur: bool,
    frame_count: u64,
}

impl FrameSampler {
    pub fn new(config: &SamplingConfig) -> Self {
        Self {
            frame_skip: u64::from(config.frame_skip.max(1)),
            width: config.width,
            height: config.height,
            blur: config.blur,
            frame_count: 0,
        }
    }

    /// Frames successfully read so far, skipped ones included
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Read one frame from `handle`.
    ///
    /// A failed read is returned as a stream error and does not advance the
    /// frame counter; the caller decides whether to back off or give up.
    pub fn next_frame<H>(&mut self, handle: &mut H) -> Result<Sample>
    where
        H: CaptureHandle + ?Sized,
    {
        let frame = handle.read_frame()?;
        self.frame_count += 1;

        if self.frame_count % self.frame_skip != 0 {
            trace!("Skipping frame #{}", self.frame_count);
            return Ok(Sample::Skip);
        }

        let gray = self.preprocess(&frame)?;
        Ok(Sample::Frame(gray))
    }

    /// Resize, convert to intensity and optionally blur one raw frame
    pub fn preprocess(&self, frame: &FrameData) -> Result<GrayImage> {
        if !frame.validate_size() {
            return Err(AnalyzerError::FrameProcessing {
                details: format!(
                    "Frame {} has {} bytes, expected {:?} for {}x{} {:?}",
                    frame.id,
                    frame.data.len(),
                    frame.expected_size(),
                    frame.width,
                    frame.height,
                    frame.format
                ),
            }
            .into());
        }

        let gray = frame_to_gray(frame)?;

        let resized = if gray.dimensions() == (self.width, self.height) {
            gray
        } else {
            imageops::resize(&gray, self.width, self.height, FilterType::Triangle)
        };
        debug!(
            "Frame #{} resized to {}x{} and converted to grayscale",
            self.frame_count, self.width, self.height
        );

        if self.blur {
            trace!("Applying Gaussian blur to frame #{}", self.frame_count);
            Ok(gaussian_blur_f32(&resized, BLUR_SIGMA))
        } else {
            Ok(resized)
        }
    }
}

/// Convert any supported raw layout to 8-bit intensity
pub fn frame_to_gray(frame: &FrameData) -> Result<GrayImage> {
    let (width, height) = (frame.width, frame.height);

    let gray = match frame.format {
        FrameFormat::Mjpeg => {
            let dynamic_image = image::load_from_memory(&frame.data).map_err(|e| {
                AnalyzerError::FrameProcessing {
                    details: format!("MJPEG decode failed: {}", e),
                }
            })?;
            return Ok(dynamic_image.to_luma8());
        }
        FrameFormat::Gray8 => GrayImage::from_raw(width, height, frame.data.to_vec()),
        FrameFormat::Rgb24 => packed_to_gray(frame, [0, 1, 2]),
        FrameFormat::Bgr24 => packed_to_gray(frame, [2, 1, 0]),
        // Y0 U Y1 V: every even byte is a luma sample
        FrameFormat::Yuyv => {
            let luma = frame.data.iter().step_by(2).copied().collect();
            GrayImage::from_raw(width, height, luma)
        }
    };

    gray.ok_or_else(|| {
        AnalyzerError::FrameProcessing {
            details: format!(
                "Failed to build {}x{} grayscale image from {:?} data",
                width, height, frame.format
            ),
        }
        .into()
    })
}

/// ITU-R BT.601 luma from packed 3-byte pixels; `order` gives the R, G, B offsets
fn packed_to_gray(frame: &FrameData, order: [usize; 3]) -> Option<GrayImage> {
    let luma = frame
        .data
        .chunks_exact(3)
        .map(|px| {
            let r = u32::from(px[order[0]]);
            let g = u32::from(px[order[1]]);
            let b = u32::from(px[order[2]]);
            ((299 * r + 587 * g + 114 * b + 500) / 1000) as u8
        })
        .collect();
    GrayImage::from_raw(frame.width, frame.height, luma)
}
