use crate::debounce::DebouncePolicy;
use crate::error::{MotionwatchError, Result};
use crate::retry::{Backoff, RetryPolicy};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Placeholder substituted with the camera id when building a stream address
pub const CAMERA_ID_PLACEHOLDER: &str = "{camera_id}";

/// Immutable construction input for one detector instance
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DetectorConfig {
    pub camera: CameraConfig,
    pub sampling: SamplingConfig,
    pub analyzer: AnalyzerConfig,
    pub debounce: DebounceConfig,
    pub retry: RetryConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CameraConfig {
    /// Camera identifier, used for naming and address templating
    #[serde(default = "default_camera_id")]
    pub id: String,

    /// Explicit stream address; overrides the template when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Address template, `{camera_id}` is replaced by `id`
    #[serde(default = "default_url_template")]
    pub url_template: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SamplingConfig {
    /// Only every Nth frame read from the stream is analyzed
    #[serde(default = "default_frame_skip")]
    pub frame_skip: u32,

    /// Analysis width in pixels
    #[serde(default = "default_width")]
    pub width: u32,

    /// Analysis height in pixels
    #[serde(default = "default_height")]
    pub height: u32,

    /// Smooth frames before background modeling
    #[serde(default = "default_blur")]
    pub blur: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AnalyzerConfig {
    /// Minimum contour area (pixels²) counted as motion
    #[serde(default = "default_min_area")]
    pub min_area: u32,

    /// Number of frames the background model remembers
    #[serde(default = "default_history")]
    pub history: u32,

    /// Squared Mahalanobis distance beyond which a pixel is foreground
    #[serde(default = "default_var_threshold")]
    pub var_threshold: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DebounceKind {
    Hysteresis,
    Cooldown,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DebounceConfig {
    /// Which debounce strategy to run
    #[serde(default = "default_debounce_policy")]
    pub policy: DebounceKind,

    /// Consecutive motion frames required before switching on
    #[serde(default = "default_confirm_frames")]
    pub motion_confirm_frames: u32,

    /// Consecutive quiet frames required before switching off
    #[serde(default = "default_confirm_frames")]
    pub no_motion_confirm_frames: u32,

    /// Quiet period after each change when using the cooldown policy
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RetryConfig {
    /// Attempts to open the stream before giving up
    #[serde(default = "default_retry_attempts")]
    pub attempts: u32,

    /// Delay between open attempts
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,

    #[serde(default = "default_backoff")]
    pub backoff: BackoffKind,

    /// Upper bound for exponential backoff
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Pause after a failed frame read
    #[serde(default = "default_read_failure_delay_ms")]
    pub read_failure_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Pause after each analyzed frame
    #[serde(default = "default_idle_pause_ms")]
    pub idle_pause_ms: u64,

    /// How long a single frame read may block
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

impl DetectorConfig {
    /// Default configuration for the given camera
    pub fn for_camera<S: Into<String>>(camera_id: S) -> Self {
        let mut config = Self::default();
        config.camera.id = camera_id.into();
        config
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("camera.id", default_camera_id())?
            .set_default("camera.url_template", default_url_template())?
            .set_default("sampling.frame_skip", default_frame_skip() as i64)?
            .set_default("sampling.width", default_width() as i64)?
            .set_default("sampling.height", default_height() as i64)?
            .set_default("sampling.blur", default_blur())?
            .set_default("analyzer.min_area", default_min_area() as i64)?
            .set_default("analyzer.history", default_history() as i64)?
            .set_default("analyzer.var_threshold", default_var_threshold())?
            .set_default("debounce.policy", "hysteresis")?
            .set_default(
                "debounce.motion_confirm_frames",
                default_confirm_frames() as i64,
            )?
            .set_default(
                "debounce.no_motion_confirm_frames",
                default_confirm_frames() as i64,
            )?
            .set_default("debounce.cooldown_ms", default_cooldown_ms() as i64)?
            .set_default("retry.attempts", default_retry_attempts() as i64)?
            .set_default("retry.delay_ms", default_retry_delay_ms() as i64)?
            .set_default("retry.backoff", "fixed")?
            .set_default("retry.max_delay_ms", default_max_delay_ms() as i64)?
            .set_default(
                "retry.read_failure_delay_ms",
                default_read_failure_delay_ms() as i64,
            )?
            .set_default("worker.idle_pause_ms", default_idle_pause_ms() as i64)?
            .set_default("worker.read_timeout_ms", default_read_timeout_ms() as i64)?
            .add_source(File::with_name(&path_str).required(false))
            // MOTIONWATCH_SAMPLING__FRAME_SKIP=2 etc.
            .add_source(
                Environment::with_prefix("MOTIONWATCH")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: DetectorConfig = settings.try_deserialize()?;

        info!("Configuration loaded for camera '{}'", config.camera.id);
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Reject configurations the detector cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.camera.id.trim().is_empty() {
            return Err(MotionwatchError::invalid_config(
                "camera.id",
                "must not be empty",
            ));
        }

        if self.camera.source.is_none() && !self.camera.url_template.contains(CAMERA_ID_PLACEHOLDER)
        {
            return Err(MotionwatchError::invalid_config(
                "camera.url_template",
                format!("must contain {} when no source is set", CAMERA_ID_PLACEHOLDER),
            ));
        }

        if self.sampling.frame_skip == 0 {
            return Err(MotionwatchError::invalid_config(
                "sampling.frame_skip",
                "must be at least 1",
            ));
        }

        if self.sampling.width == 0 || self.sampling.height == 0 {
            return Err(MotionwatchError::invalid_config(
                "sampling.width/height",
                "frame dimensions must be greater than 0",
            ));
        }

        if self.analyzer.min_area == 0 {
            return Err(MotionwatchError::invalid_config(
                "analyzer.min_area",
                "must be greater than 0",
            ));
        }

        if self.analyzer.history == 0 {
            return Err(MotionwatchError::invalid_config(
                "analyzer.history",
                "must be greater than 0",
            ));
        }

        if !(self.analyzer.var_threshold > 0.0) {
            return Err(MotionwatchError::invalid_config(
                "analyzer.var_threshold",
                "must be greater than 0",
            ));
        }

        if self.debounce.motion_confirm_frames == 0 {
            return Err(MotionwatchError::invalid_config(
                "debounce.motion_confirm_frames",
                "must be at least 1",
            ));
        }

        if self.debounce.no_motion_confirm_frames == 0 {
            return Err(MotionwatchError::invalid_config(
                "debounce.no_motion_confirm_frames",
                "must be at least 1",
            ));
        }

        if self.retry.attempts == 0 {
            return Err(MotionwatchError::invalid_config(
                "retry.attempts",
                "must be at least 1",
            ));
        }

        Ok(())
    }

    /// Serialize to TOML, e.g. for `--print-config`
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl CameraConfig {
    /// Address the capture backend should open
    pub fn stream_address(&self) -> String {
        match &self.source {
            Some(source) => source.clone(),
            None => self.url_template.replace(CAMERA_ID_PLACEHOLDER, &self.id),
        }
    }
}

impl DebounceConfig {
    pub fn policy(&self) -> DebouncePolicy {
        match self.policy {
            DebounceKind::Hysteresis => DebouncePolicy::Hysteresis {
                motion_confirm_frames: self.motion_confirm_frames,
                no_motion_confirm_frames: self.no_motion_confirm_frames,
            },
            DebounceKind::Cooldown => DebouncePolicy::Cooldown {
                cooldown: Duration::from_millis(self.cooldown_ms),
            },
        }
    }
}

impl RetryConfig {
    /// Policy used when opening the stream
    pub fn open_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.attempts,
            Duration::from_millis(self.delay_ms),
            self.backoff(),
        )
    }

    /// Back-off between consecutive failed reads; reads are never abandoned
    /// on count alone
    pub fn read_policy(&self) -> RetryPolicy {
        RetryPolicy::new(u32::MAX, self.read_failure_delay(), self.backoff())
    }

    fn backoff(&self) -> Backoff {
        match self.backoff {
            BackoffKind::Fixed => Backoff::Fixed,
            BackoffKind::Exponential => Backoff::Exponential {
                max_delay: Duration::from_millis(self.max_delay_ms),
            },
        }
    }

    pub fn read_failure_delay(&self) -> Duration {
        Duration::from_millis(self.read_failure_delay_ms)
    }
}

impl WorkerConfig {
    pub fn idle_pause(&self) -> Duration {
        Duration::from_millis(self.idle_pause_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                id: default_camera_id(),
                source: None,
                url_template: default_url_template(),
            },
            sampling: SamplingConfig {
                frame_skip: default_frame_skip(),
                width: default_width(),
                height: default_height(),
                blur: default_blur(),
            },
            analyzer: AnalyzerConfig {
                min_area: default_min_area(),
                history: default_history(),
                var_threshold: default_var_threshold(),
            },
            debounce: DebounceConfig {
                policy: default_debounce_policy(),
                motion_confirm_frames: default_confirm_frames(),
                no_motion_confirm_frames: default_confirm_frames(),
                cooldown_ms: default_cooldown_ms(),
            },
            retry: RetryConfig {
                attempts: default_retry_attempts(),
                delay_ms: default_retry_delay_ms(),
                backoff: default_backoff(),
                max_delay_ms: default_max_delay_ms(),
                read_failure_delay_ms: default_read_failure_delay_ms(),
            },
            worker: WorkerConfig {
                idle_pause_ms: default_idle_pause_ms(),
                read_timeout_ms: default_read_timeout_ms(),
            },
        }
    }
}

// Default value functions
fn default_camera_id() -> String {
    "camera".to_string()
}
fn default_url_template() -> String {
    "rtsp://localhost:8554/{camera_id}".to_string()
}

fn default_frame_skip() -> u32 {
    3
}
fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    360
}
fn default_blur() -> bool {
    false
}

fn default_min_area() -> u32 {
    5000
}
fn default_history() -> u32 {
    500
}
fn default_var_threshold() -> f64 {
    50.0
}

fn default_debounce_policy() -> DebounceKind {
    DebounceKind::Hysteresis
}
fn default_confirm_frames() -> u32 {
    3
}
fn default_cooldown_ms() -> u64 {
    3000
}

fn default_retry_attempts() -> u32 {
    5
}
fn default_retry_delay_ms() -> u64 {
    2000
}
fn default_backoff() -> BackoffKind {
    BackoffKind::Fixed
}
fn default_max_delay_ms() -> u64 {
    60_000
}
fn default_read_failure_delay_ms() -> u64 {
    1000
}

fn default_idle_pause_ms() -> u64 {
    10
}
fn default_read_timeout_ms() -> u64 {
    5000
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = DetectorConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.analyzer.min_area, 5000);
        assert_eq!(config.sampling.frame_skip, 3);
        assert_eq!((config.sampling.width, config.sampling.height), (640, 360));
        assert!(!config.sampling.blur);
        assert_eq!(config.debounce.motion_confirm_frames, 3);
        assert_eq!(config.debounce.no_motion_confirm_frames, 3);
        assert_eq!(config.debounce.cooldown_ms, 3000);
    }

    #[test]
    fn test_stream_address_from_template() {
        let config = DetectorConfig::for_camera("driveway");
        assert_eq!(
            config.camera.stream_address(),
            "rtsp://localhost:8554/driveway"
        );

        let mut config = config;
        config.camera.source = Some("file:///tmp/clip.mp4".to_string());
        assert_eq!(config.camera.stream_address(), "file:///tmp/clip.mp4");
    }

    #[test]
    fn test_config_validation() {
        let mut config = DetectorConfig::default();
        config.sampling.frame_skip = 0;
        assert!(matches!(
            config.validate(),
            Err(MotionwatchError::InvalidConfig { .. })
        ));

        config.sampling.frame_skip = 1;
        config.sampling.width = 0;
        assert!(config.validate().is_err());

        config.sampling.width = 320;
        config.debounce.motion_confirm_frames = 0;
        assert!(config.validate().is_err());

        config.debounce.motion_confirm_frames = 1;
        config.debounce.no_motion_confirm_frames = 0;
        assert!(config.validate().is_err());

        config.debounce.no_motion_confirm_frames = 1;
        config.camera.id = "  ".to_string();
        assert!(config.validate().is_err());

        config.camera.id = "porch".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_debounce_policy_selection() {
        let mut config = DetectorConfig::default();
        assert_eq!(
            config.debounce.policy(),
            DebouncePolicy::Hysteresis {
                motion_confirm_frames: 3,
                no_motion_confirm_frames: 3,
            }
        );

        config.debounce.policy = DebounceKind::Cooldown;
        assert_eq!(
            config.debounce.policy(),
            DebouncePolicy::Cooldown {
                cooldown: Duration::from_secs(3),
            }
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
[camera]
id = "garage"

[sampling]
frame_skip = 1
blur = true

[debounce]
policy = "cooldown"
cooldown_ms = 1500
"#
        )
        .unwrap();

        let config = DetectorConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.camera.id, "garage");
        assert_eq!(config.sampling.frame_skip, 1);
        assert!(config.sampling.blur);
        assert_eq!(config.sampling.width, 640);
        assert_eq!(config.debounce.policy, DebounceKind::Cooldown);
        assert_eq!(config.debounce.cooldown_ms, 1500);
        assert_eq!(config.analyzer.min_area, 5000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = DetectorConfig::load_from_file(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, DetectorConfig::default());
    }

    #[test]
    fn test_retry_policies() {
        let mut retry = DetectorConfig::default().retry;
        let open = retry.open_policy();
        assert_eq!(open.max_attempts(), 5);
        assert_eq!(open.delay_for(3), Duration::from_secs(2));
        assert_eq!(retry.read_policy().delay_for(0), Duration::from_secs(1));

        retry.backoff = BackoffKind::Exponential;
        retry.max_delay_ms = 3000;
        let reads = retry.read_policy();
        assert_eq!(reads.delay_for(1), Duration::from_secs(2));
        assert_eq!(reads.delay_for(5), Duration::from_secs(3));
    }

    #[test]
    fn test_toml_round_trip_of_defaults() {
        let text = DetectorConfig::default().to_toml().unwrap();
        assert!(text.contains("[sampling]"));
        assert!(text.contains("policy = \"hysteresis\""));
    }
}
