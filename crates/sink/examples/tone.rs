// Plays a 440 Hz sine through the clocked device for two seconds.
//
//     RUST_LOG=debug cargo run -p fmp-audio-sink --example tone

use fmp_audio_device_clocked::{ClockedConfig, ClockedPlatform};
use fmp_audio_sink::{init_logging, BufferedAudioSink, Result, SinkConfig, StreamClass};
use std::f32::consts::TAU;
use std::thread;
use std::time::Duration;

const FREQUENCY_HZ: f32 = 440.0;
const SAMPLE_RATE_HZ: u32 = 44_100;
const CHANNELS: u16 = 2;

fn main() -> Result<()> {
    init_logging();

    let platform = ClockedPlatform::new(ClockedConfig::default());
    let config = SinkConfig::new(CHANNELS, SAMPLE_RATE_HZ, StreamClass::Media);

    let mut phase = 0.0f32;
    let step = TAU * FREQUENCY_HZ / SAMPLE_RATE_HZ as f32;
    let frame_bytes = CHANNELS as usize * 2;

    let sink = BufferedAudioSink::new(&platform, config, move |buffer: &mut [u8]| {
        for frame in buffer.chunks_exact_mut(frame_bytes) {
            let sample = ((phase.sin() * 0.25) * i16::MAX as f32) as i16;
            for channel in frame.chunks_exact_mut(2) {
                channel.copy_from_slice(&sample.to_le_bytes());
            }
            phase = (phase + step) % TAU;
        }
    })?;

    sink.create_buffer_queue_audio_player()?;
    sink.set_volume(0.8)?;
    sink.play()?;
    sink.queue_audio_samples()?;

    thread::sleep(Duration::from_secs(1));
    sink.pause()?;
    thread::sleep(Duration::from_millis(200));
    sink.play()?;
    thread::sleep(Duration::from_secs(1));

    sink.stop()?;
    let stats = sink.buffer_stats();
    sink.shutdown();

    let clock = platform.stats();
    log::info!(
        "Played {} bytes in {} buffers ({} underruns)",
        clock.played_bytes,
        clock.completed_buffers,
        clock.underruns
    );
    log::info!(
        "Buffers: allocated={}, freed={}, enqueued={}, dropped={}",
        stats.allocated,
        stats.freed,
        stats.enqueued,
        stats.dropped
    );
    Ok(())
}
