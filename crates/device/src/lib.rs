// Platform audio device abstraction for the buffered audio sink

pub mod format;
pub mod memory;
pub mod platform;
pub mod queue;

pub use fmp_audio_core::StreamClass;
pub use format::{ByteOrder, ChannelMask, Millibel, PcmFormat, MILLIBEL_MIN};
pub use memory::{DeviceCall, MemoryControl, MemoryPlatform};
pub use platform::{
    AudioEngine, AudioPlatform, BufferQueuePlayer, CompletionHandler, OutputMix, PlayState,
    PlayerControl, PlayerDescriptor,
};
pub use queue::PcmQueue;
