mod observer;
mod pipeline;
mod worker;
#[cfg(test)]
mod tests;

pub use observer::{MotionObserver, NoopObserver};
pub use pipeline::{FramePipeline, StepOutcome};
pub use worker::{DetectorWorker, DetectorWorkerBuilder};
