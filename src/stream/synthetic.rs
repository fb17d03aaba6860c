use super::source::{CaptureHandle, VideoSource};
use crate::error::StreamError;
use crate::frame::{FrameData, FrameFormat};

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, trace};

/// One scripted read result
#[derive(Debug, Clone)]
enum Scripted {
    Frame(FrameData),
    ReadFailure,
    /// Kill the handle; the next `refuse_reopens` opens fail
    PipelineFailure { refuse_reopens: u32 },
}

/// What reads return once the script has run out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exhaustion {
    /// Report end of stream, which ends the worker
    EndOfStream,
    /// Keep reporting transient read failures
    ReadFailure,
}

#[derive(Debug)]
struct State {
    script: VecDeque<Scripted>,
    open_failures: u32,
    open_attempts: u32,
    releases: u32,
    reads: u64,
    exhaustion: Exhaustion,
}

/// Scripted in-memory video source for tests and demos.
///
/// Clones share the same script and counters, so a test can keep one clone
/// to inspect while the detector owns another.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    state: Arc<Mutex<State>>,
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticSource {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                script: VecDeque::new(),
                open_failures: 0,
                open_attempts: 0,
                releases: 0,
                reads: 0,
                exhaustion: Exhaustion::EndOfStream,
            })),
        }
    }

    /// Make the first `count` open attempts fail
    pub fn fail_opens(self, count: u32) -> Self {
        self.state.lock().open_failures = count;
        self
    }

    pub fn on_exhausted(self, exhaustion: Exhaustion) -> Self {
        self.state.lock().exhaustion = exhaustion;
        self
    }

    pub fn with_frames<I: IntoIterator<Item = FrameData>>(self, frames: I) -> Self {
        self.state
            .lock()
            .script
            .extend(frames.into_iter().map(Scripted::Frame));
        self
    }

    pub fn push_frame(&self, frame: FrameData) {
        self.state.lock().script.push_back(Scripted::Frame(frame));
    }

    pub fn push_read_failure(&self) {
        self.state.lock().script.push_back(Scripted::ReadFailure);
    }

    /// Script a dead pipeline, after which `refuse_reopens` open attempts
    /// are refused
    pub fn push_pipeline_failure(&self, refuse_reopens: u32) {
        self.state
            .lock()
            .script
            .push_back(Scripted::PipelineFailure { refuse_reopens });
    }

    pub fn open_attempts(&self) -> u32 {
        self.state.lock().open_attempts
    }

    pub fn release_count(&self) -> u32 {
        self.state.lock().releases
    }

    /// Reads served so far, failures included
    pub fn reads(&self) -> u64 {
        self.state.lock().reads
    }

    pub fn remaining(&self) -> usize {
        self.state.lock().script.len()
    }
}

impl VideoSource for SyntheticSource {
    fn open(&self, address: &str) -> Result<Box<dyn CaptureHandle>, StreamError> {
        let mut state = self.state.lock();
        state.open_attempts += 1;

        if state.open_failures > 0 {
            state.open_failures -= 1;
            debug!("Synthetic open of {} refused", address);
            return Err(StreamError::Open {
                address: address.to_string(),
                details: "synthetic open failure".to_string(),
            });
        }

        debug!("Synthetic source opened for {}", address);
        Ok(Box::new(SyntheticHandle {
            state: Arc::clone(&self.state),
            next_id: 0,
        }))
    }

    fn name(&self) -> &'static str {
        "synthetic"
    }
}

struct SyntheticHandle {
    state: Arc<Mutex<State>>,
    next_id: u64,
}

impl CaptureHandle for SyntheticHandle {
    fn read_frame(&mut self) -> Result<FrameData, StreamError> {
        let mut state = self.state.lock();
        state.reads += 1;

        match state.script.pop_front() {
            Some(Scripted::Frame(mut frame)) => {
                self.next_id += 1;
                frame.id = self.next_id;
                trace!("Synthetic frame {} served", frame.id);
                Ok(frame)
            }
            Some(Scripted::ReadFailure) => Err(StreamError::ReadFailure {
                details: "synthetic read failure".to_string(),
            }),
            Some(Scripted::PipelineFailure { refuse_reopens }) => {
                state.open_failures += refuse_reopens;
                Err(StreamError::PipelineFailed {
                    details: "synthetic pipeline failure".to_string(),
                })
            }
            None => match state.exhaustion {
                Exhaustion::EndOfStream => Err(StreamError::EndOfStream),
                Exhaustion::ReadFailure => Err(StreamError::ReadFailure {
                    details: "synthetic script exhausted".to_string(),
                }),
            },
        }
    }

    fn release(self: Box<Self>) {
        self.state.lock().releases += 1;
    }
}

/// Axis-aligned rectangle in frame coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blob {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub level: u8,
}

/// Uniform grayscale frame
pub fn static_frame(width: u32, height: u32, level: u8) -> FrameData {
    frame_with_blobs(width, height, level, &[])
}

/// Uniform grayscale frame with filled rectangles painted on top
pub fn frame_with_blobs(width: u32, height: u32, level: u8, blobs: &[Blob]) -> FrameData {
    let mut data = vec![level; width as usize * height as usize];

    for blob in blobs {
        let x_end = (blob.x + blob.width).min(width);
        let y_end = (blob.y + blob.height).min(height);
        for y in blob.y.min(height)..y_end {
            let row = y as usize * width as usize;
            for x in blob.x.min(width)..x_end {
                data[row + x as usize] = blob.level;
            }
        }
    }

    FrameData::new(0, SystemTime::now(), data, width, height, FrameFormat::Gray8)
}
