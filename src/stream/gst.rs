use super::source::{CaptureHandle, VideoSource};
use crate::error::StreamError;
use crate::frame::{FrameData, FrameFormat};

use gstreamer::prelude::*;
use gstreamer::{ClockTime, MessageView, Pipeline};
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, trace, warn};

/// How long `open` waits for the pipeline to reach PLAYING
const STATE_CHANGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Frames queued in the appsink before the decoder is held back. Nothing is
/// dropped, so every decoded frame reaches the sampler.
const APPSINK_MAX_BUFFERS: u32 = 10;

/// GStreamer-backed source accepting any URI `uridecodebin` understands
/// (rtsp://, http://, file://, ...)
pub struct GstVideoSource {
    read_timeout: Duration,
}

impl GstVideoSource {
    pub fn new(read_timeout: Duration) -> Self {
        Self { read_timeout }
    }

    fn build_pipeline_string(address: &str) -> String {
        format!(
            "uridecodebin uri=\"{}\" ! \
             videoconvert ! \
             video/x-raw,format=RGB ! \
             appsink name=sink sync=false max-buffers={} drop=false",
            address, APPSINK_MAX_BUFFERS
        )
    }
}

impl VideoSource for GstVideoSource {
    fn open(&self, address: &str) -> Result<Box<dyn CaptureHandle>, StreamError> {
        let open_error = |details: String| StreamError::Open {
            address: address.to_string(),
            details,
        };

        gstreamer::init().map_err(|e| open_error(format!("Failed to initialize GStreamer: {}", e)))?;

        let pipeline_desc = Self::build_pipeline_string(address);
        debug!("Creating GStreamer capture pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| open_error(format!("Failed to create pipeline: {}", e)))?
            .downcast::<Pipeline>()
            .map_err(|_| open_error("Failed to downcast to Pipeline".to_string()))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| open_error("Failed to get appsink element".to_string()))?
            .downcast::<AppSink>()
            .map_err(|_| open_error("Failed to downcast to AppSink".to_string()))?;

        if let Err(e) = pipeline.set_state(gstreamer::State::Playing) {
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(open_error(format!("Failed to start pipeline: {}", e)));
        }

        let (result, _current, _pending) = pipeline.state(ClockTime::from_mseconds(
            STATE_CHANGE_TIMEOUT.as_millis() as u64,
        ));
        if let Err(e) = result {
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(open_error(format!("Pipeline did not start: {}", e)));
        }

        info!("GStreamer capture pipeline playing for {}", address);

        Ok(Box::new(GstCaptureHandle {
            pipeline,
            appsink,
            read_timeout: self.read_timeout,
            next_id: 0,
        }))
    }

    fn name(&self) -> &'static str {
        "gstreamer"
    }
}

struct GstCaptureHandle {
    pipeline: Pipeline,
    appsink: AppSink,
    read_timeout: Duration,
    next_id: u64,
}

impl GstCaptureHandle {
    /// Surface errors posted on the bus since the last read
    fn check_bus(&self) -> Result<(), StreamError> {
        let Some(bus) = self.pipeline.bus() else {
            return Ok(());
        };

        while let Some(message) = bus.pop() {
            match message.view() {
                MessageView::Error(err) => {
                    return Err(StreamError::PipelineFailed {
                        details: format!("{} ({:?})", err.error(), err.debug()),
                    });
                }
                MessageView::Eos(_) => return Err(StreamError::EndOfStream),
                MessageView::Warning(w) => warn!("GStreamer warning: {}", w.error()),
                _ => {}
            }
        }

        Ok(())
    }

    fn sample_to_frame(&mut self, sample: gstreamer::Sample) -> Result<FrameData, StreamError> {
        let buffer = sample.buffer().ok_or_else(|| StreamError::ReadFailure {
            details: "No buffer in sample".to_string(),
        })?;

        let caps = sample.caps().ok_or_else(|| StreamError::ReadFailure {
            details: "No caps in sample".to_string(),
        })?;

        let video_info = VideoInfo::from_caps(caps).map_err(|e| StreamError::ReadFailure {
            details: format!("Failed to get video info: {}", e),
        })?;

        let map = buffer.map_readable().map_err(|e| StreamError::ReadFailure {
            details: format!("Failed to map buffer: {}", e),
        })?;

        let width = video_info.width();
        let height = video_info.height();
        let stride = video_info.stride()[0] as usize;
        let row_bytes = width as usize * 3;
        let src = map.as_slice();

        // Rows may be padded; copy them out tightly packed
        let mut data = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            let end = start + row_bytes;
            if end > src.len() {
                return Err(StreamError::ReadFailure {
                    details: format!("Truncated frame buffer ({} bytes)", src.len()),
                });
            }
            data.extend_from_slice(&src[start..end]);
        }

        self.next_id += 1;
        trace!("Captured RGB frame {} ({}x{})", self.next_id, width, height);

        Ok(FrameData::new(
            self.next_id,
            SystemTime::now(),
            data,
            width,
            height,
            FrameFormat::Rgb24,
        ))
    }
}

impl CaptureHandle for GstCaptureHandle {
    fn read_frame(&mut self) -> Result<FrameData, StreamError> {
        self.check_bus()?;

        let timeout = ClockTime::from_mseconds(self.read_timeout.as_millis() as u64);
        match self.appsink.try_pull_sample(timeout) {
            Some(sample) => self.sample_to_frame(sample),
            None if self.appsink.is_eos() => Err(StreamError::EndOfStream),
            None => Err(StreamError::ReadTimeout {
                timeout: self.read_timeout,
            }),
        }
    }

    fn release(self: Box<Self>) {
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            warn!("Failed to stop GStreamer capture pipeline cleanly: {}", e);
        }
        debug!("GStreamer capture pipeline released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_applies_back_pressure_instead_of_dropping() {
        let desc = GstVideoSource::build_pipeline_string("rtsp://localhost:8554/porch");

        assert!(desc.contains("uri=\"rtsp://localhost:8554/porch\""));
        assert!(desc.contains("max-buffers=10"));
        assert!(desc.contains("drop=false"));
        assert!(!desc.contains("drop=true"));
    }
}
