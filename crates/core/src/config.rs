// Sink configuration

use crate::error::{AudioError, Result};

/// Size of one buffer handed to the device, in bytes
pub const DEFAULT_BUFFER_SIZE_BYTES: usize = 4096;

/// Number of buffers the device queue can hold
pub const DEFAULT_QUEUE_CAPACITY: usize = 2;

/// Playback intent used by the platform for routing and volume policy.
///
/// Raw values match the Android stream types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StreamClass {
    Voice,
    System,
    Ring,
    #[default]
    Media,
    Alarm,
    Notification,
}

impl StreamClass {
    pub fn from_raw(raw: i32) -> Result<Self> {
        match raw {
            0 => Ok(StreamClass::Voice),
            1 => Ok(StreamClass::System),
            2 => Ok(StreamClass::Ring),
            3 => Ok(StreamClass::Media),
            4 => Ok(StreamClass::Alarm),
            5 => Ok(StreamClass::Notification),
            other => Err(AudioError::InvalidConfig(format!(
                "Unknown stream class {}",
                other
            ))),
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            StreamClass::Voice => 0,
            StreamClass::System => 1,
            StreamClass::Ring => 2,
            StreamClass::Media => 3,
            StreamClass::Alarm => 4,
            StreamClass::Notification => 5,
        }
    }
}

/// What the refill step does when the device queue rejects a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnqueueFailurePolicy {
    /// Keep the buffer pending, count it as dropped and report the error
    #[default]
    Drop,
    /// Enqueue the same buffer once more before dropping it
    RetryOnce,
}

/// Buffered audio sink configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkConfig {
    /// Interleaved channel count. 2 routes to left+right, anything else to centre.
    pub channel_count: u16,
    pub sample_rate_hz: u32,
    pub stream_class: StreamClass,
    /// Bytes pulled from the producer on every completion
    pub buffer_size_bytes: usize,
    pub queue_capacity: usize,
    pub enqueue_failure_policy: EnqueueFailurePolicy,
}

impl SinkConfig {
    pub fn new(channel_count: u16, sample_rate_hz: u32, stream_class: StreamClass) -> Self {
        Self {
            channel_count,
            sample_rate_hz,
            stream_class,
            ..Self::default()
        }
    }

    pub fn with_buffer_size(mut self, buffer_size_bytes: usize) -> Self {
        self.buffer_size_bytes = buffer_size_bytes;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_enqueue_failure_policy(mut self, policy: EnqueueFailurePolicy) -> Self {
        self.enqueue_failure_policy = policy;
        self
    }

    /// Bytes per interleaved frame of 16-bit samples
    pub fn frame_size_bytes(&self) -> usize {
        self.channel_count as usize * 2
    }

    /// Playback time covered by one buffer, in microseconds
    pub fn buffer_duration_us(&self) -> u64 {
        let frame_size = self.frame_size_bytes() as u64;
        if frame_size == 0 || self.sample_rate_hz == 0 {
            return 0;
        }
        let frames = self.buffer_size_bytes as u64 / frame_size;
        frames * 1_000_000 / self.sample_rate_hz as u64
    }

    pub fn validate(&self) -> Result<()> {
        if self.channel_count == 0 {
            return Err(AudioError::InvalidConfig(
                "Channel count must be at least one".to_string(),
            ));
        }
        if self.sample_rate_hz == 0 {
            return Err(AudioError::InvalidConfig(
                "Sample rate must be positive".to_string(),
            ));
        }
        if self.buffer_size_bytes == 0 || self.buffer_size_bytes % 2 != 0 {
            return Err(AudioError::InvalidConfig(format!(
                "Buffer size must hold whole 16-bit samples, got {} bytes",
                self.buffer_size_bytes
            )));
        }
        if self.queue_capacity == 0 {
            return Err(AudioError::InvalidConfig(
                "Queue capacity must be at least one".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            channel_count: 2,
            sample_rate_hz: 44100,
            stream_class: StreamClass::Media,
            buffer_size_bytes: DEFAULT_BUFFER_SIZE_BYTES,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            enqueue_failure_policy: EnqueueFailurePolicy::Drop,
        }
    }
}
