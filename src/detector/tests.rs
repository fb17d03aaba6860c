use super::*;
use crate::config::{DebounceKind, DetectorConfig};
use crate::debounce::MotionState;
use crate::error::MotionwatchError;
use crate::frame::FrameData;
use crate::stream::synthetic::{frame_with_blobs, static_frame, Blob, Exhaustion};
use crate::stream::{SyntheticSource, VideoSource};

use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

const WIDTH: u32 = 160;
const HEIGHT: u32 = 120;
const BACKGROUND_LEVEL: u8 = 50;

fn create_test_config() -> DetectorConfig {
    let mut config = DetectorConfig::for_camera("porch");
    config.camera.source = Some("synthetic://porch".to_string());
    config.sampling.frame_skip = 1;
    config.sampling.width = WIDTH;
    config.sampling.height = HEIGHT;
    config.retry.attempts = 3;
    config.retry.delay_ms = 5;
    config.retry.read_failure_delay_ms = 5;
    config.worker.idle_pause_ms = 0;
    config
}

fn background_frames(count: usize) -> Vec<FrameData> {
    (0..count)
        .map(|_| static_frame(WIDTH, HEIGHT, BACKGROUND_LEVEL))
        .collect()
}

fn blob_frames(count: usize) -> Vec<FrameData> {
    let blob = Blob {
        x: 30,
        y: 30,
        width: 100,
        height: 60,
        level: 200,
    };
    (0..count)
        .map(|_| frame_with_blobs(WIDTH, HEIGHT, BACKGROUND_LEVEL, &[blob]))
        .collect()
}

/// Observer that records every notification it receives
#[derive(Clone, Default)]
struct Recorder {
    calls: Arc<Mutex<Vec<bool>>>,
}

impl Recorder {
    fn calls(&self) -> Vec<bool> {
        self.calls.lock().clone()
    }
}

impl MotionObserver for Recorder {
    fn on_motion_changed(&self, detected: bool) {
        self.calls.lock().push(detected);
    }
}

fn spawn_worker(
    config: DetectorConfig,
    source: &SyntheticSource,
    recorder: &Recorder,
) -> DetectorWorker {
    DetectorWorker::builder()
        .config(config)
        .source(Arc::new(source.clone()))
        .observer(recorder.clone())
        .spawn()
        .unwrap()
}

fn wait_until<F: Fn() -> bool>(condition: F) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn test_pipeline_static_scene_never_transitions() {
    let config = create_test_config();
    let source = SyntheticSource::new().with_frames(background_frames(10));
    let mut handle = source.open("synthetic://porch").unwrap();
    let mut pipeline = FramePipeline::new(&config);

    for _ in 0..10 {
        let outcome = pipeline.step(&mut *handle, Instant::now()).unwrap();
        assert_eq!(
            outcome,
            StepOutcome::Analyzed {
                has_motion: false,
                transition: None,
            }
        );
    }
    assert_eq!(pipeline.state(), MotionState::Off);
    assert_eq!(pipeline.frames_analyzed(), 10);
}

#[test]
fn test_pipeline_confirms_motion_on_third_blob_frame() {
    let config = create_test_config();
    let source = SyntheticSource::new()
        .with_frames(background_frames(60))
        .with_frames(blob_frames(5));
    let mut handle = source.open("synthetic://porch").unwrap();
    let mut pipeline = FramePipeline::new(&config);

    for _ in 0..60 {
        let outcome = pipeline.step(&mut *handle, Instant::now()).unwrap();
        assert_eq!(outcome.transition(), None);
    }

    let transitions: Vec<Option<MotionState>> = (0..5)
        .map(|_| {
            pipeline
                .step(&mut *handle, Instant::now())
                .unwrap()
                .transition()
        })
        .collect();

    assert_eq!(
        transitions,
        vec![None, None, Some(MotionState::On), None, None]
    );
    assert_eq!(pipeline.state(), MotionState::On);
}

#[test]
fn test_pipeline_skips_frames_per_ratio() {
    let mut config = create_test_config();
    config.sampling.frame_skip = 2;
    let source = SyntheticSource::new().with_frames(background_frames(4));
    let mut handle = source.open("synthetic://porch").unwrap();
    let mut pipeline = FramePipeline::new(&config);

    let outcomes: Vec<StepOutcome> = (0..4)
        .map(|_| pipeline.step(&mut *handle, Instant::now()).unwrap())
        .collect();

    assert_eq!(outcomes[0], StepOutcome::Skipped);
    assert!(matches!(outcomes[1], StepOutcome::Analyzed { .. }));
    assert_eq!(outcomes[2], StepOutcome::Skipped);
    assert_eq!(pipeline.frames_read(), 4);
    assert_eq!(pipeline.frames_analyzed(), 2);
}

#[test]
fn test_worker_static_scene_publishes_nothing() {
    let source = SyntheticSource::new().with_frames(background_frames(10));
    let recorder = Recorder::default();
    let worker = spawn_worker(create_test_config(), &source, &recorder);

    worker.join().unwrap();

    assert!(recorder.calls().is_empty());
    assert!(!worker.is_motion_detected());
    assert!(worker.is_finished());
    assert_eq!(source.release_count(), 1);
}

#[test]
fn test_worker_publishes_single_transition_for_sustained_motion() {
    let source = SyntheticSource::new()
        .with_frames(background_frames(60))
        .with_frames(blob_frames(5));
    let recorder = Recorder::default();
    let worker = spawn_worker(create_test_config(), &source, &recorder);

    worker.join().unwrap();

    assert_eq!(recorder.calls(), vec![true]);
    // state stays frozen at the last committed value
    assert!(worker.is_motion_detected());
    assert_eq!(source.release_count(), 1);
}

#[test]
fn test_worker_cooldown_drops_flips_inside_window() {
    let mut config = create_test_config();
    config.debounce.policy = DebounceKind::Cooldown;
    config.debounce.cooldown_ms = 60_000;

    let source = SyntheticSource::new()
        .with_frames(background_frames(60))
        .with_frames(blob_frames(3))
        .with_frames(background_frames(3))
        .with_frames(blob_frames(3));
    let recorder = Recorder::default();
    let worker = spawn_worker(config, &source, &recorder);

    worker.join().unwrap();

    assert_eq!(recorder.calls(), vec![true]);
    // reads keep going during the cooldown
    assert_eq!(source.remaining(), 0);
}

#[test]
fn test_worker_recovers_from_read_failures() {
    let source = SyntheticSource::new().with_frames(background_frames(60));
    source.push_read_failure();
    source.push_read_failure();
    for frame in blob_frames(4) {
        source.push_frame(frame);
    }
    let recorder = Recorder::default();
    let worker = spawn_worker(create_test_config(), &source, &recorder);

    worker.join().unwrap();

    assert_eq!(recorder.calls(), vec![true]);
    assert_eq!(source.remaining(), 0);
}

#[test]
fn test_worker_reopens_after_pipeline_failure() {
    let source = SyntheticSource::new().with_frames(background_frames(60));
    source.push_pipeline_failure(0);
    for frame in blob_frames(4) {
        source.push_frame(frame);
    }
    let recorder = Recorder::default();
    let worker = spawn_worker(create_test_config(), &source, &recorder);

    worker.join().unwrap();

    // the learned background survives the reopen
    assert_eq!(recorder.calls(), vec![true]);
    assert_eq!(source.open_attempts(), 2);
    assert_eq!(source.release_count(), 2);
    assert_eq!(source.remaining(), 0);
}

#[test]
fn test_worker_exits_when_reopen_is_exhausted() {
    let source = SyntheticSource::new().with_frames(background_frames(10));
    source.push_pipeline_failure(10);
    for frame in background_frames(5) {
        source.push_frame(frame);
    }
    let recorder = Recorder::default();
    let worker = spawn_worker(create_test_config(), &source, &recorder);

    worker.join().unwrap();

    assert!(worker.is_finished());
    // one initial open plus the three refused reopen attempts
    assert_eq!(source.open_attempts(), 4);
    assert_eq!(source.release_count(), 1);
    assert_eq!(source.remaining(), 5);
    assert!(recorder.calls().is_empty());
}

#[test]
fn test_worker_exits_quietly_when_stream_unavailable() {
    let source = SyntheticSource::new().fail_opens(10);
    let recorder = Recorder::default();
    let worker = spawn_worker(create_test_config(), &source, &recorder);

    worker.join().unwrap();

    assert!(worker.is_finished());
    assert_eq!(source.open_attempts(), 3);
    assert_eq!(source.release_count(), 0);
    assert!(recorder.calls().is_empty());
    assert!(!worker.is_motion_detected());
}

#[test]
fn test_stop_interrupts_open_backoff() {
    let mut config = create_test_config();
    config.retry.attempts = 100;
    config.retry.delay_ms = 10_000;
    let source = SyntheticSource::new().fail_opens(100);
    let worker = spawn_worker(config, &source, &Recorder::default());

    wait_until(|| source.open_attempts() >= 1);
    let start = Instant::now();
    worker.request_stop();
    worker.join().unwrap();

    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(source.open_attempts(), 1);
    assert_eq!(source.release_count(), 0);
}

#[test]
fn test_request_stop_is_idempotent_and_join_repeats() {
    let source = SyntheticSource::new().on_exhausted(Exhaustion::ReadFailure);
    let worker = spawn_worker(create_test_config(), &source, &Recorder::default());

    wait_until(|| source.reads() >= 2);
    assert!(!worker.is_finished());

    worker.request_stop();
    worker.request_stop();
    assert!(worker.is_stop_requested());

    worker.join().unwrap();
    worker.join().unwrap();

    assert!(worker.is_finished());
    assert_eq!(source.release_count(), 1);
}

#[test]
fn test_drop_requests_stop() {
    let source = SyntheticSource::new().on_exhausted(Exhaustion::ReadFailure);
    let worker = spawn_worker(create_test_config(), &source, &Recorder::default());
    wait_until(|| source.reads() >= 1);

    drop(worker);

    wait_until(|| source.release_count() == 1);
}

#[test]
fn test_join_from_worker_thread_is_rejected() {
    let cell: Arc<OnceLock<Arc<DetectorWorker>>> = Arc::new(OnceLock::new());
    let outcome: Arc<Mutex<Option<bool>>> = Arc::new(Mutex::new(None));

    let observer = {
        let cell = Arc::clone(&cell);
        let outcome = Arc::clone(&outcome);
        move |_detected: bool| {
            wait_until(|| cell.get().is_some());
            if let Some(worker) = cell.get() {
                let rejected = matches!(worker.join(), Err(MotionwatchError::Worker { .. }));
                *outcome.lock() = Some(rejected);
            }
        }
    };

    let source = SyntheticSource::new()
        .with_frames(background_frames(60))
        .with_frames(blob_frames(3));
    let worker = Arc::new(
        DetectorWorker::builder()
            .config(create_test_config())
            .source(Arc::new(source.clone()))
            .observer(observer)
            .spawn()
            .unwrap(),
    );
    assert!(cell.set(Arc::clone(&worker)).is_ok());

    worker.join().unwrap();
    assert_eq!(*outcome.lock(), Some(true));
}

#[test]
fn test_spawn_rejects_invalid_config() {
    let mut config = create_test_config();
    config.sampling.frame_skip = 0;

    let result = DetectorWorker::builder()
        .config(config)
        .source(Arc::new(SyntheticSource::new()))
        .spawn();

    assert!(matches!(
        result,
        Err(MotionwatchError::InvalidConfig { ref field, .. }) if field == "sampling.frame_skip"
    ));
}

#[test]
fn test_spawn_requires_config() {
    let result = DetectorWorkerBuilder::new()
        .source(Arc::new(SyntheticSource::new()))
        .spawn();
    assert!(matches!(result, Err(MotionwatchError::Component { .. })));
}

#[test]
fn test_closure_observer() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let source = SyntheticSource::new()
        .with_frames(background_frames(60))
        .with_frames(blob_frames(3));

    let worker = DetectorWorker::builder()
        .config(create_test_config())
        .source(Arc::new(source))
        .observer(move |detected: bool| sink.lock().push(detected))
        .spawn()
        .unwrap();

    worker.join().unwrap();
    assert_eq!(*seen.lock(), vec![true]);
    assert_eq!(worker.camera_id(), "porch");
}

#[tokio::test]
async fn test_join_async_waits_for_exit() {
    let source = SyntheticSource::new().on_exhausted(Exhaustion::ReadFailure);
    let worker = spawn_worker(create_test_config(), &source, &Recorder::default());

    worker.request_stop();
    tokio::time::timeout(Duration::from_secs(5), worker.join_async())
        .await
        .unwrap()
        .unwrap();

    assert!(worker.is_finished());
    worker.join_async().await.unwrap();
}

#[tokio::test]
async fn test_join_async_completes_when_worker_exits_on_its_own() {
    let source = SyntheticSource::new().fail_opens(10);
    let worker = spawn_worker(create_test_config(), &source, &Recorder::default());

    tokio::time::timeout(Duration::from_secs(5), worker.join_async())
        .await
        .unwrap()
        .unwrap();

    assert!(!worker.is_stop_requested());
    assert!(worker.is_finished());
    assert_eq!(source.open_attempts(), 3);
}
