use crate::analyzer::{ForegroundModel, FrameSampler, MotionClassifier, Sample};
use crate::config::DetectorConfig;
use crate::debounce::{DebounceStateMachine, MotionState};
use crate::error::Result;
use crate::stream::CaptureHandle;

use image::GrayImage;
use std::time::Instant;
use tracing::trace;

/// What one pipeline step did with the frame it read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Frame read but dropped by the sampler
    Skipped,
    /// Frame analyzed; `transition` is set when the debounced state changed
    Analyzed {
        has_motion: bool,
        transition: Option<MotionState>,
    },
}

impl StepOutcome {
    pub fn transition(&self) -> Option<MotionState> {
        match self {
            StepOutcome::Analyzed { transition, .. } => *transition,
            StepOutcome::Skipped => None,
        }
    }
}

/// Sample → model → classify → debounce, one frame at a time.
///
/// Holds all per-detector analysis state. Nothing in here is shared; the
/// worker owns exactly one pipeline.
pub struct FramePipeline {
    sampler: FrameSampler,
    model: ForegroundModel,
    classifier: MotionClassifier,
    debounce: DebounceStateMachine,
    analyzed: u64,
}

impl FramePipeline {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            sampler: FrameSampler::new(&config.sampling),
            model: ForegroundModel::new(&config.analyzer),
            classifier: MotionClassifier::new(config.analyzer.min_area),
            debounce: DebounceStateMachine::new(config.debounce.policy()),
            analyzed: 0,
        }
    }

    /// Read and process one frame from `handle`
    pub fn step<H>(&mut self, handle: &mut H, now: Instant) -> Result<StepOutcome>
    where
        H: CaptureHandle + ?Sized,
    {
        match self.sampler.next_frame(handle)? {
            Sample::Skip => Ok(StepOutcome::Skipped),
            Sample::Frame(gray) => Ok(self.analyze(&gray, now)),
        }
    }

    /// Run an already preprocessed frame through model, classifier and debounce
    pub fn analyze(&mut self, frame: &GrayImage, now: Instant) -> StepOutcome {
        self.analyzed += 1;
        let mask = self.model.apply(frame);
        let has_motion = self.classifier.classify(&mask);
        let transition = self.debounce.observe(has_motion, now);

        trace!(
            "Frame #{} has_motion={} state={:?}",
            self.sampler.frame_count(),
            has_motion,
            self.debounce.state()
        );

        StepOutcome::Analyzed {
            has_motion,
            transition,
        }
    }

    pub fn state(&self) -> MotionState {
        self.debounce.state()
    }

    pub fn frames_read(&self) -> u64 {
        self.sampler.frame_count()
    }

    pub fn frames_analyzed(&self) -> u64 {
        self.analyzed
    }
}
