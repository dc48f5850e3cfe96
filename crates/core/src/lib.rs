// Core types shared by the buffered audio sink and its platform devices

pub mod callback;
pub mod config;
pub mod error;
pub mod state;

// Re-export commonly used types
pub use callback::{EventDispatcher, RecordingListener, SinkEvent, SinkListener};
pub use config::{
    EnqueueFailurePolicy, SinkConfig, StreamClass, DEFAULT_BUFFER_SIZE_BYTES,
    DEFAULT_QUEUE_CAPACITY,
};
pub use error::{AudioError, Result};
pub use state::{SinkState, SinkStateContainer};
