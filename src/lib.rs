pub mod analyzer;
pub mod config;
pub mod debounce;
pub mod detector;
pub mod error;
pub mod events;
pub mod frame;
pub mod retry;
pub mod signal;
pub mod stream;

pub use analyzer::{ForegroundModel, FrameSampler, MotionClassifier, Sample};
pub use config::DetectorConfig;
pub use debounce::{DebouncePolicy, DebounceStateMachine, MotionState};
pub use detector::{
    DetectorWorker, DetectorWorkerBuilder, FramePipeline, MotionObserver, NoopObserver,
    StepOutcome,
};
pub use error::{AnalyzerError, MotionwatchError, Result, StreamError};
pub use events::{BroadcastObserver, MotionEvent};
pub use frame::{FrameData, FrameFormat};
pub use retry::{Backoff, RetryPolicy};
pub use signal::StopSignal;
pub use stream::{CaptureGuard, CaptureHandle, StreamSource, SyntheticSource, VideoSource};
