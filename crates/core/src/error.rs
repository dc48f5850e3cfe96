// Error handling for the audio sink

use std::fmt;

/// Audio sink error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    /// The platform audio subsystem could not be brought up (engine, output mix
    /// or player creation). Fatal for the sink.
    InitializationError(String),

    /// A platform object rejected a request after it was created
    DeviceError(String),

    /// Operation is not valid in the current sink state
    InvalidState(String),

    /// Sink configuration failed validation
    InvalidConfig(String),

    /// The device queue rejected a buffer
    EnqueueError(String),

    /// PCM format the device cannot play
    UnsupportedFormat(String),

    /// Generic error
    Other(String),
}

impl AudioError {
    /// Whether the error leaves the sink unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AudioError::InitializationError(_) | AudioError::UnsupportedFormat(_)
        )
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AudioError::InitializationError(msg) => write!(f, "Initialization error: {}", msg),
            AudioError::DeviceError(msg) => write!(f, "Device error: {}", msg),
            AudioError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            AudioError::InvalidConfig(msg) => write!(f, "Invalid config: {}", msg),
            AudioError::EnqueueError(msg) => write!(f, "Enqueue error: {}", msg),
            AudioError::UnsupportedFormat(msg) => write!(f, "Unsupported format: {}", msg),
            AudioError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for AudioError {}

/// Result type alias for audio sink operations
pub type Result<T> = std::result::Result<T, AudioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_category_and_message() {
        let err = AudioError::EnqueueError("queue full".to_string());
        assert_eq!(err.to_string(), "Enqueue error: queue full");
    }

    #[test]
    fn setup_failures_are_fatal() {
        assert!(AudioError::InitializationError("no engine".into()).is_fatal());
        assert!(!AudioError::EnqueueError("busy".into()).is_fatal());
        assert!(!AudioError::InvalidState("not ready".into()).is_fatal());
    }
}
