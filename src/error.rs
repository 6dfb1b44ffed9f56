use thiserror::Error;

/// Main application error type
#[derive(Error, Debug)]
pub enum StereoTestError {
    #[error("Audio device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Tone synthesis error: {0}")]
    Tone(#[from] ToneError),

    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("Terminal IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Device acquisition errors
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Device unavailable: {0}")]
    Unavailable(String),

    #[error("Configuration rejected: {0}")]
    ConfigurationRejected(String),
}

/// Tone synthesis errors
#[derive(Error, Debug)]
pub enum ToneError {
    #[error("Invalid tone parameters: {0}")]
    InvalidParameters(String),

    #[error("Failed to allocate {frames} frames for {mode} buffer: {source}")]
    AllocationFailure {
        mode: crate::audio::RoutingMode,
        frames: usize,
        #[source]
        source: std::collections::TryReserveError,
    },
}

/// Errors reported by a PCM device on write, prepare or drain
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PcmError {
    #[error("buffer underrun")]
    Underrun,

    #[error("device suspended")]
    Suspended,

    #[error("{0}")]
    Device(String),
}

impl PcmError {
    /// Underruns and suspends are handled by the engine's reset-and-retry loop
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PcmError::Underrun | PcmError::Suspended)
    }
}

/// Result of a resume attempt on a suspended device
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResumeError {
    #[error("device not ready to resume yet")]
    TryAgain,

    #[error("resume failed: {0}")]
    Failed(String),
}

/// Playback errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("Playback failed: {0}")]
    PlaybackFailed(String),
}

/// Result type alias for stereo-test operations
pub type Result<T> = std::result::Result<T, StereoTestError>;
