// Buffered audio sink
// Feeds PCM from a producer into a platform buffer queue, one buffer per
// device completion.

pub mod pending;
pub mod sink;
pub mod stats;

// Re-exports
pub use fmp_audio_core::{
    AudioError, EnqueueFailurePolicy, Result, SinkConfig, SinkEvent, SinkListener, SinkState,
    StreamClass,
};
pub use fmp_audio_device::{AudioPlatform, Millibel, PlayState};
pub use pending::PendingBuffer;
pub use sink::{volume_level, BufferedAudioSink, FrameProducer, HandleStatus};
pub use stats::BufferStats;

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Installs the platform logger. Safe to call more than once.
pub fn init_logging() {
    INIT_LOGGER.call_once(|| {
        #[cfg(target_os = "android")]
        {
            android_logger::init_once(
                android_logger::Config::default()
                    .with_max_level(log::LevelFilter::Debug)
                    .with_tag("FmpAudioSink"),
            );
        }

        #[cfg(not(target_os = "android"))]
        {
            let _ = env_logger::builder()
                .is_test(false)
                .filter_level(log::LevelFilter::Info)
                .parse_default_env()
                .try_init();
        }

        log::info!("Logging initialized");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_twice() {
        init_logging();
        init_logging();
    }
}
