use super::observer::{MotionObserver, NoopObserver};
use super::pipeline::{FramePipeline, StepOutcome};
use crate::config::DetectorConfig;
use crate::debounce::MotionState;
use crate::error::{MotionwatchError, Result, StreamError};
use crate::signal::StopSignal;
use crate::stream::{self, CaptureGuard, StreamSource, VideoSource};

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn};

/// Builder for [`DetectorWorker`]
#[derive(Default)]
pub struct DetectorWorkerBuilder {
    config: Option<DetectorConfig>,
    source: Option<Arc<dyn VideoSource>>,
    observer: Option<Arc<dyn MotionObserver>>,
}

impl DetectorWorkerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: DetectorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Capture backend; defaults to the one compiled into this build
    pub fn source(mut self, source: Arc<dyn VideoSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn observer<O>(mut self, observer: O) -> Self
    where
        O: MotionObserver + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn shared_observer(mut self, observer: Arc<dyn MotionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Validate the configuration and start the detector thread
    pub fn spawn(self) -> Result<DetectorWorker> {
        let config = self.config.ok_or_else(|| {
            MotionwatchError::component("detector_worker", "Configuration is required")
        })?;
        config.validate()?;

        let source = match self.source {
            Some(source) => source,
            None => stream::default_source(&config.worker)?,
        };
        let observer = self
            .observer
            .unwrap_or_else(|| Arc::new(NoopObserver) as Arc<dyn MotionObserver>);

        DetectorWorker::spawn(config, source, observer)
    }
}

/// One running motion detector.
///
/// Owns a dedicated OS thread that reads, analyzes and debounces frames
/// until stopped. The only state shared with other threads is the
/// committed motion flag and the stop signal.
pub struct DetectorWorker {
    camera_id: String,
    motion: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    stop: StopSignal,
    thread: Arc<Mutex<Option<JoinHandle<()>>>>,
    thread_id: ThreadId,
}

impl DetectorWorker {
    pub fn builder() -> DetectorWorkerBuilder {
        DetectorWorkerBuilder::new()
    }

    fn spawn(
        config: DetectorConfig,
        source: Arc<dyn VideoSource>,
        observer: Arc<dyn MotionObserver>,
    ) -> Result<Self> {
        let camera_id = config.camera.id.clone();
        let motion = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let stop = StopSignal::new();

        let context = WorkerContext {
            config,
            source,
            observer,
            motion: Arc::clone(&motion),
            stop: stop.clone(),
        };
        let finished_flag = Arc::clone(&finished);

        let handle = thread::Builder::new()
            .name(format!("motionwatch-{}", camera_id))
            .spawn(move || {
                let _finished = FinishedOnDrop(finished_flag);
                context.run();
            })?;

        info!("Spawned detector thread for camera '{}'", camera_id);

        Ok(Self {
            camera_id,
            motion,
            finished,
            stop,
            thread_id: handle.thread().id(),
            thread: Arc::new(Mutex::new(Some(handle))),
        })
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    /// Last committed motion state
    pub fn is_motion_detected(&self) -> bool {
        self.motion.load(Ordering::SeqCst)
    }

    /// Ask the worker to stop. Returns immediately; safe to call repeatedly.
    pub fn request_stop(&self) {
        if self.stop.trigger() {
            info!("Stop requested for camera '{}'", self.camera_id);
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.is_triggered()
    }

    /// Whether the worker thread has exited
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Block until the worker thread has exited.
    ///
    /// Returns immediately once the thread was already joined. Fails instead
    /// of deadlocking when called from the worker's own thread.
    pub fn join(&self) -> Result<()> {
        self.ensure_not_worker_thread()?;
        join_thread(&self.thread, &self.camera_id)
    }

    /// Awaitable form of [`DetectorWorker::join`]; the blocking wait runs on
    /// tokio's blocking pool so the caller's runtime keeps going.
    pub async fn join_async(&self) -> Result<()> {
        self.ensure_not_worker_thread()?;

        let thread = Arc::clone(&self.thread);
        let camera_id = self.camera_id.clone();
        tokio::task::spawn_blocking(move || join_thread(&thread, &camera_id))
            .await
            .map_err(|e| MotionwatchError::worker(format!("Join task failed: {}", e)))?
    }

    fn ensure_not_worker_thread(&self) -> Result<()> {
        if thread::current().id() == self.thread_id {
            return Err(MotionwatchError::worker(format!(
                "Detector '{}' cannot join itself from its own thread",
                self.camera_id
            )));
        }
        Ok(())
    }
}

impl Drop for DetectorWorker {
    fn drop(&mut self) {
        self.request_stop();
    }
}

impl std::fmt::Debug for DetectorWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorWorker")
            .field("camera_id", &self.camera_id)
            .field("motion", &self.is_motion_detected())
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Holds the lock for the whole wait so concurrent joiners all block until
/// the thread is really gone.
fn join_thread(thread: &Mutex<Option<JoinHandle<()>>>, camera_id: &str) -> Result<()> {
    let mut slot = thread.lock();
    match slot.take() {
        Some(handle) => {
            debug!("Waiting for detector thread '{}' to exit", camera_id);
            handle.join().map_err(|_| {
                MotionwatchError::worker(format!("Detector thread '{}' panicked", camera_id))
            })
        }
        None => Ok(()),
    }
}

struct FinishedOnDrop(Arc<AtomicBool>);

impl Drop for FinishedOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Everything the worker thread owns
struct WorkerContext {
    config: DetectorConfig,
    source: Arc<dyn VideoSource>,
    observer: Arc<dyn MotionObserver>,
    motion: Arc<AtomicBool>,
    stop: StopSignal,
}

impl WorkerContext {
    fn run(self) {
        let span = info_span!("detector", camera = %self.config.camera.id);
        let _enter = span.enter();
        info!("Detector worker started");

        let address = self.config.camera.stream_address();
        let opener = StreamSource::new(Arc::clone(&self.source), self.config.retry.open_policy());

        let Some(mut capture) = self.open_stream(&opener, &address) else {
            return;
        };

        let mut pipeline = FramePipeline::new(&self.config);
        let read_policy = self.config.retry.read_policy();
        let idle_pause = self.config.worker.idle_pause();
        let mut consecutive_failures: u32 = 0;

        while !self.stop.is_triggered() {
            match pipeline.step(&mut capture, Instant::now()) {
                Ok(StepOutcome::Skipped) => {
                    consecutive_failures = 0;
                    continue;
                }
                Ok(outcome) => {
                    consecutive_failures = 0;
                    if let Some(state) = outcome.transition() {
                        self.publish(state);
                    }
                }
                Err(MotionwatchError::Stream(e)) if e.needs_reopen() => {
                    warn!("Capture of {} died: {}; reopening", address, e);
                    capture.release();
                    match self.open_stream(&opener, &address) {
                        Some(reopened) => {
                            capture = reopened;
                            consecutive_failures = 0;
                            continue;
                        }
                        None => {
                            self.log_exit(&pipeline);
                            return;
                        }
                    }
                }
                Err(e) if e.is_recoverable() => {
                    let delay = read_policy.delay_for(consecutive_failures);
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    warn!(
                        "Frame read failed ({} in a row): {}; retrying in {:?}",
                        consecutive_failures, e, delay
                    );
                    self.stop.sleep(delay);
                    continue;
                }
                Err(e) => {
                    error!("Stopping detector after fatal error: {}", e);
                    break;
                }
            }

            self.stop.sleep(idle_pause);
        }

        self.log_exit(&pipeline);
        capture.release();
    }

    /// Open or reopen the stream; `None` means the worker has to exit
    fn open_stream(&self, opener: &StreamSource, address: &str) -> Option<CaptureGuard> {
        match opener.open(address, &self.stop) {
            Ok(capture) => Some(capture),
            Err(StreamError::OpenCancelled { .. }) => {
                info!("Detector worker stopped before the stream opened");
                None
            }
            Err(e) => {
                error!("Detector worker exiting: {}", e);
                None
            }
        }
    }

    fn log_exit(&self, pipeline: &FramePipeline) {
        info!(
            "Detector worker exiting after {} frames ({} analyzed), motion={}",
            pipeline.frames_read(),
            pipeline.frames_analyzed(),
            self.motion.load(Ordering::SeqCst)
        );
    }

    /// Store the new state, then notify; skipped if it matches what readers
    /// already see.
    fn publish(&self, state: MotionState) {
        let detected = state.is_on();
        if self.motion.swap(detected, Ordering::SeqCst) == detected {
            return;
        }

        if detected {
            info!("Motion detected");
        } else {
            info!("Motion cleared");
        }
        self.observer.on_motion_changed(detected);
    }
}
