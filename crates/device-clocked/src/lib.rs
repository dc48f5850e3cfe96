// Headless output device
// Queued buffers are consumed by a worker thread at the real playback rate
// and discarded, so the pull loop runs with true hardware timing on machines
// without (or without access to) an audio device.

use fmp_audio_core::{AudioError, Result, StreamClass};
use fmp_audio_device::{
    AudioEngine, AudioPlatform, BufferQueuePlayer, CompletionHandler, Millibel, OutputMix,
    PcmFormat, PcmQueue, PlayState, PlayerControl, PlayerDescriptor, MILLIBEL_MIN,
};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicI16, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Clocked device configuration
#[derive(Debug, Clone, Copy)]
pub struct ClockedConfig {
    /// Range reported to the sink as (min, max)
    pub volume_range: (Millibel, Millibel),
    /// How long the worker waits for a buffer before re-checking an empty queue
    pub idle_poll: Duration,
}

impl Default for ClockedConfig {
    fn default() -> Self {
        Self {
            volume_range: (MILLIBEL_MIN, 0),
            idle_poll: Duration::from_millis(2),
        }
    }
}

/// Counters shared by every player of a platform
#[derive(Default)]
struct ClockCounters {
    played_bytes: AtomicU64,
    completed_buffers: AtomicU64,
    underruns: AtomicU64,
}

/// Snapshot of what the device has played
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClockStats {
    pub played_bytes: u64,
    pub completed_buffers: u64,
    /// Times the queue ran dry while playing
    pub underruns: u64,
}

#[derive(Clone)]
pub struct ClockedPlatform {
    config: ClockedConfig,
    counters: Arc<ClockCounters>,
}

impl ClockedPlatform {
    pub fn new(config: ClockedConfig) -> Self {
        Self {
            config,
            counters: Arc::new(ClockCounters::default()),
        }
    }

    pub fn stats(&self) -> ClockStats {
        ClockStats {
            played_bytes: self.counters.played_bytes.load(Ordering::Relaxed),
            completed_buffers: self.counters.completed_buffers.load(Ordering::Relaxed),
            underruns: self.counters.underruns.load(Ordering::Relaxed),
        }
    }
}

impl Default for ClockedPlatform {
    fn default() -> Self {
        Self::new(ClockedConfig::default())
    }
}

impl AudioPlatform for ClockedPlatform {
    type Engine = ClockedEngine;

    fn create_engine(&self) -> Result<ClockedEngine> {
        log::info!("Clocked audio engine created");
        Ok(ClockedEngine {
            config: self.config,
            counters: self.counters.clone(),
        })
    }
}

pub struct ClockedEngine {
    config: ClockedConfig,
    counters: Arc<ClockCounters>,
}

impl AudioEngine for ClockedEngine {
    type OutputMix = ClockedOutputMix;
    type Player = ClockedPlayer;

    fn create_output_mix(&mut self) -> Result<ClockedOutputMix> {
        Ok(ClockedOutputMix)
    }

    fn create_buffer_queue_player(
        &mut self,
        _output_mix: &ClockedOutputMix,
        descriptor: &PlayerDescriptor,
    ) -> Result<ClockedPlayer> {
        let format = descriptor.format;
        if format.bits_per_sample != 16 {
            return Err(AudioError::UnsupportedFormat(format!(
                "{} bits per sample",
                format.bits_per_sample
            )));
        }
        if format.sample_rate_hz == 0 || format.channel_count == 0 {
            return Err(AudioError::UnsupportedFormat(format!("{:?}", format)));
        }

        Ok(ClockedPlayer {
            shared: Arc::new(Shared {
                queue: Mutex::new(PcmQueue::new(descriptor.queue_capacity)),
                control: Mutex::new(Control {
                    play_state: PlayState::Stopped,
                    flushes: 0,
                    running: true,
                }),
                wake: Condvar::new(),
                handler: Mutex::new(None),
                volume_level: AtomicI16::new(0),
                counters: self.counters.clone(),
            }),
            format,
            config: self.config,
            stream_class: StreamClass::default(),
            worker: None,
        })
    }

    fn destroy(self) {
        log::info!("Clocked audio engine destroyed");
    }
}

pub struct ClockedOutputMix;

impl OutputMix for ClockedOutputMix {
    fn destroy(self) {}
}

struct Control {
    play_state: PlayState,
    /// Bumped on every stop; buffers popped under an older value are stale
    flushes: u64,
    running: bool,
}

// Lock order: control, queue
struct Shared {
    queue: Mutex<PcmQueue>,
    control: Mutex<Control>,
    wake: Condvar,
    handler: Mutex<Option<CompletionHandler>>,
    volume_level: AtomicI16,
    counters: Arc<ClockCounters>,
}

impl Shared {
    /// Blocks until playing or shut down. Returns false on shutdown.
    fn wait_until_playing(&self) -> bool {
        let mut control = self.control.lock();
        while control.running && control.play_state != PlayState::Playing {
            self.wake.wait(&mut control);
        }
        control.running
    }

    /// Oldest queued buffer, tagged with the flush generation it was taken in
    fn pop_front(&self) -> Option<(Box<[u8]>, u64)> {
        let control = self.control.lock();
        let buffer = self.queue.lock().pop_front()?;
        Some((buffer, control.flushes))
    }

    fn flushed_since(&self, generation: u64) -> bool {
        let control = self.control.lock();
        !control.running || control.flushes != generation
    }

    fn set_play_state(&self, state: PlayState) {
        {
            let mut control = self.control.lock();
            control.play_state = state;
            if state == PlayState::Stopped {
                control.flushes += 1;
                self.queue.lock().clear();
            }
        }
        self.wake.notify_all();
    }

    fn idle(&self, timeout: Duration) {
        let mut control = self.control.lock();
        if control.running {
            self.wake.wait_for(&mut control, timeout);
        }
    }

    fn run(&self, format: PcmFormat, config: ClockedConfig) {
        let mut starved = false;

        while self.wait_until_playing() {
            let Some((buffer, generation)) = self.pop_front() else {
                if !starved {
                    starved = true;
                    self.counters.underruns.fetch_add(1, Ordering::Relaxed);
                    log::debug!("Clocked device underrun");
                }
                self.idle(config.idle_poll);
                continue;
            };
            starved = false;

            // Buffers are played whole; a pause takes effect after the current one
            thread::sleep(Duration::from_micros(format.duration_us(buffer.len())));

            // Stop flushes without completions, even if playback resumed meanwhile
            if self.flushed_since(generation) {
                continue;
            }

            self.counters
                .played_bytes
                .fetch_add(buffer.len() as u64, Ordering::Relaxed);
            self.counters
                .completed_buffers
                .fetch_add(1, Ordering::Relaxed);

            let handler = self.handler.lock().clone();
            if let Some(handler) = handler {
                handler();
            }
        }
    }
}

pub struct ClockedPlayer {
    shared: Arc<Shared>,
    format: PcmFormat,
    config: ClockedConfig,
    stream_class: StreamClass,
    worker: Option<JoinHandle<()>>,
}

impl ClockedPlayer {
    pub fn stream_class(&self) -> StreamClass {
        self.stream_class
    }

    pub fn volume_level(&self) -> Millibel {
        self.shared.volume_level.load(Ordering::Relaxed)
    }

    fn ensure_realized(&self) -> Result<()> {
        if self.worker.is_some() {
            Ok(())
        } else {
            Err(AudioError::InvalidState(
                "Clocked player is not realized".to_string(),
            ))
        }
    }
}

impl BufferQueuePlayer for ClockedPlayer {
    type Control = ClockedControl;

    fn configure_stream_class(&mut self, stream_class: StreamClass) -> Result<()> {
        if self.worker.is_some() {
            return Err(AudioError::InvalidState(
                "Stream class must be configured before realize".to_string(),
            ));
        }
        self.stream_class = stream_class;
        Ok(())
    }

    fn realize(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        let shared = self.shared.clone();
        let format = self.format;
        let config = self.config;
        let worker = thread::Builder::new()
            .name("fmp-clocked-device".to_string())
            .spawn(move || shared.run(format, config))
            .map_err(|e| {
                AudioError::InitializationError(format!("Failed to spawn device thread: {}", e))
            })?;

        log::info!(
            "Clocked player realized: {}Hz, {} channels, {:?}",
            format.sample_rate_hz,
            format.channel_count,
            self.stream_class
        );
        self.worker = Some(worker);
        Ok(())
    }

    fn register_callback(&mut self, handler: CompletionHandler) -> Result<()> {
        self.ensure_realized()?;
        *self.shared.handler.lock() = Some(handler);
        Ok(())
    }

    fn enqueue(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_realized()?;
        self.shared.queue.lock().push(data)?;
        self.shared.wake.notify_all();
        Ok(())
    }

    fn control(&self) -> Result<ClockedControl> {
        self.ensure_realized()?;
        Ok(ClockedControl {
            shared: self.shared.clone(),
            volume_range: self.config.volume_range,
        })
    }

    fn destroy(self) {
        // Drop stops and joins the worker
    }
}

pub struct ClockedControl {
    shared: Arc<Shared>,
    volume_range: (Millibel, Millibel),
}

impl PlayerControl for ClockedControl {
    fn set_play_state(&self, state: PlayState) -> Result<()> {
        self.shared.set_play_state(state);
        Ok(())
    }

    fn volume_range(&self) -> Result<(Millibel, Millibel)> {
        Ok(self.volume_range)
    }

    fn set_volume_level(&self, level: Millibel) -> Result<()> {
        self.shared.volume_level.store(level, Ordering::Relaxed);
        Ok(())
    }
}

impl Drop for ClockedPlayer {
    fn drop(&mut self) {
        self.shared.control.lock().running = false;
        self.shared.wake.notify_all();
        *self.shared.handler.lock() = None;

        if let Some(worker) = self.worker.take() {
            // Joining from the worker itself would never return
            if worker.thread().id() == thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                log::error!("Clocked device thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    // 48 stereo frames at 48kHz: 1ms per buffer
    const BUFFER: usize = 192;

    fn realized_player(platform: &ClockedPlatform) -> ClockedPlayer {
        let mut engine = platform.create_engine().unwrap();
        let mix = engine.create_output_mix().unwrap();
        let descriptor = PlayerDescriptor {
            format: PcmFormat::s16le(2, 48000),
            queue_capacity: 2,
        };
        let mut player = engine.create_buffer_queue_player(&mix, &descriptor).unwrap();
        player.realize().unwrap();
        player
    }

    fn wait_for(condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn plays_queued_buffers_and_signals_completion() {
        let platform = ClockedPlatform::default();
        let mut player = realized_player(&platform);
        let completions = Arc::new(AtomicU64::new(0));
        let counter = completions.clone();
        player
            .register_callback(Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        player.enqueue(&[0u8; BUFFER]).unwrap();
        player.enqueue(&[0u8; BUFFER]).unwrap();
        player
            .control()
            .unwrap()
            .set_play_state(PlayState::Playing)
            .unwrap();

        assert!(wait_for(|| completions.load(Ordering::SeqCst) == 2));
        let stats = platform.stats();
        assert_eq!(stats.completed_buffers, 2);
        assert_eq!(stats.played_bytes, 2 * BUFFER as u64);
        assert!(wait_for(|| platform.stats().underruns >= 1));
    }

    #[test]
    fn paused_player_holds_its_queue() {
        let platform = ClockedPlatform::default();
        let mut player = realized_player(&platform);
        player.enqueue(&[0u8; BUFFER]).unwrap();
        player
            .control()
            .unwrap()
            .set_play_state(PlayState::Paused)
            .unwrap();

        thread::sleep(Duration::from_millis(20));
        assert_eq!(platform.stats().completed_buffers, 0);
        assert_eq!(player.shared.queue.lock().len(), 1);
    }

    #[test]
    fn buffer_flushed_mid_play_never_completes() {
        let platform = ClockedPlatform::default();
        let mut player = realized_player(&platform);
        let completions = Arc::new(AtomicU64::new(0));
        let counter = completions.clone();
        player
            .register_callback(Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        let control = player.control().unwrap();

        // About 21ms of 48kHz stereo each
        player.enqueue(&[1u8; 4096]).unwrap();
        control.set_play_state(PlayState::Playing).unwrap();
        thread::sleep(Duration::from_millis(5));
        control.set_play_state(PlayState::Stopped).unwrap();
        control.set_play_state(PlayState::Playing).unwrap();
        player.enqueue(&[2u8; 4096]).unwrap();

        assert!(wait_for(|| completions.load(Ordering::SeqCst) == 1));
        thread::sleep(Duration::from_millis(40));
        assert_eq!(completions.load(Ordering::SeqCst), 1);
        assert_eq!(platform.stats().played_bytes, 4096);
    }

    #[test]
    fn queue_capacity_is_enforced() {
        let platform = ClockedPlatform::default();
        let mut player = realized_player(&platform);
        player.enqueue(&[0u8; BUFFER]).unwrap();
        player.enqueue(&[0u8; BUFFER]).unwrap();
        assert!(matches!(
            player.enqueue(&[0u8; BUFFER]),
            Err(AudioError::EnqueueError(_))
        ));
    }

    #[test]
    fn unrealized_player_rejects_use() {
        let platform = ClockedPlatform::default();
        let mut engine = platform.create_engine().unwrap();
        let mix = engine.create_output_mix().unwrap();
        let descriptor = PlayerDescriptor {
            format: PcmFormat::s16le(1, 8000),
            queue_capacity: 1,
        };
        let mut player = engine.create_buffer_queue_player(&mix, &descriptor).unwrap();

        assert!(player.enqueue(&[0u8; 2]).is_err());
        assert!(player.control().is_err());
        player.configure_stream_class(StreamClass::Voice).unwrap();
        player.realize().unwrap();
        assert_eq!(player.stream_class(), StreamClass::Voice);
        assert!(player.configure_stream_class(StreamClass::Media).is_err());
    }

    #[test]
    fn destroy_stops_worker() {
        let platform = ClockedPlatform::default();
        let mut player = realized_player(&platform);
        player
            .control()
            .unwrap()
            .set_play_state(PlayState::Playing)
            .unwrap();
        player.destroy();

        let played = platform.stats().completed_buffers;
        thread::sleep(Duration::from_millis(10));
        assert_eq!(platform.stats().completed_buffers, played);
    }

    #[test]
    fn rejects_non_16_bit_formats() {
        let platform = ClockedPlatform::default();
        let mut engine = platform.create_engine().unwrap();
        let mix = engine.create_output_mix().unwrap();
        let mut format = PcmFormat::s16le(2, 48000);
        format.bits_per_sample = 24;
        let descriptor = PlayerDescriptor {
            format,
            queue_capacity: 2,
        };
        assert!(matches!(
            engine.create_buffer_queue_player(&mix, &descriptor),
            Err(AudioError::UnsupportedFormat(_))
        ));
    }
}
