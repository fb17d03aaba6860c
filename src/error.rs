use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MotionwatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration for '{field}': {message}")]
    InvalidConfig { field: String, message: String },

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Analyzer error: {0}")]
    Analyzer(#[from] AnalyzerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Worker error: {message}")]
    Worker { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

/// Errors raised while acquiring or reading the video stream
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    #[error("Stream {address} unavailable after {attempts} attempts")]
    Unavailable { address: String, attempts: u32 },

    #[error("Failed to open stream {address}: {details}")]
    Open { address: String, details: String },

    #[error("Frame read failed: {details}")]
    ReadFailure { details: String },

    #[error("No frame received within {timeout:?}")]
    ReadTimeout { timeout: Duration },

    #[error("Opening {address} cancelled by stop request")]
    OpenCancelled { address: String },

    #[error("Capture pipeline failed: {details}")]
    PipelineFailed { details: String },

    #[error("End of stream")]
    EndOfStream,
}

/// Errors raised while turning a frame into a motion decision
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyzerError {
    #[error("Frame processing failed: {details}")]
    FrameProcessing { details: String },
}

impl MotionwatchError {
    pub fn invalid_config<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn worker<S: Into<String>>(message: S) -> Self {
        Self::Worker {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Whether the detector loop may keep going after this error.
    ///
    /// Read hiccups and undecodable frames are transient; an exhausted
    /// stream, bad configuration or a lost worker are not.
    pub fn is_recoverable(&self) -> bool {
        match self {
            MotionwatchError::Stream(e) => e.is_transient(),
            MotionwatchError::Analyzer(AnalyzerError::FrameProcessing { .. }) => true,
            _ => false,
        }
    }
}

impl StreamError {
    /// The handle is dead but the stream may come back after a reopen
    pub fn needs_reopen(&self) -> bool {
        matches!(self, StreamError::PipelineFailed { .. })
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StreamError::ReadFailure { .. } | StreamError::ReadTimeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, MotionwatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_failures_are_recoverable() {
        let err: MotionwatchError = StreamError::ReadFailure {
            details: "socket closed".to_string(),
        }
        .into();
        assert!(err.is_recoverable());

        let err: MotionwatchError = StreamError::ReadTimeout {
            timeout: Duration::from_millis(500),
        }
        .into();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_fatal_errors_are_not_recoverable() {
        let unavailable: MotionwatchError = StreamError::Unavailable {
            address: "rtsp://localhost:8554/porch".to_string(),
            attempts: 5,
        }
        .into();
        assert!(!unavailable.is_recoverable());
        assert!(unavailable.to_string().contains("after 5 attempts"));

        let eos: MotionwatchError = StreamError::EndOfStream.into();
        assert!(!eos.is_recoverable());

        let failed = StreamError::PipelineFailed {
            details: "internal data stream error".to_string(),
        };
        assert!(failed.needs_reopen());
        assert!(!failed.is_transient());
        assert!(!MotionwatchError::from(failed).is_recoverable());
        assert!(!StreamError::EndOfStream.needs_reopen());

        let invalid = MotionwatchError::invalid_config("sampling.frame_skip", "must be >= 1");
        assert!(!invalid.is_recoverable());
        assert!(invalid.to_string().contains("sampling.frame_skip"));
    }
}
