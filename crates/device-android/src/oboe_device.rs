// Oboe-backed buffer queue
// Oboe pulls frames from a data callback; the queue of submitted buffers is
// drained there and a completion is signalled for every buffer used up.

use crate::millibel_to_gain;
use fmp_audio_core::{AudioError, Result, StreamClass};
use fmp_audio_device::{
    AudioEngine, AudioPlatform, BufferQueuePlayer, CompletionHandler, Millibel, OutputMix,
    PcmFormat, PcmQueue, PlayState, PlayerControl, PlayerDescriptor, MILLIBEL_MIN,
};
use oboe::{
    AudioOutputCallback, AudioOutputStreamSafe, AudioStream, AudioStreamAsync, AudioStreamBuilder,
    DataCallbackResult, Mono, Output, PerformanceMode, SharingMode, Stereo, Usage,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

fn usage_for(stream_class: StreamClass) -> Usage {
    match stream_class {
        StreamClass::Voice => Usage::VoiceCommunication,
        StreamClass::System => Usage::AssistanceSonification,
        StreamClass::Ring => Usage::NotificationRingtone,
        StreamClass::Media => Usage::Media,
        StreamClass::Alarm => Usage::Alarm,
        StreamClass::Notification => Usage::Notification,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OboePlatform;

impl OboePlatform {
    pub fn new() -> Self {
        OboePlatform
    }
}

impl AudioPlatform for OboePlatform {
    type Engine = OboeEngine;

    fn create_engine(&self) -> Result<OboeEngine> {
        log::info!("Oboe audio engine created");
        Ok(OboeEngine)
    }
}

/// Oboe has no engine object; streams are opened per player.
pub struct OboeEngine;

impl AudioEngine for OboeEngine {
    type OutputMix = OboeOutputMix;
    type Player = OboePlayer;

    fn create_output_mix(&mut self) -> Result<OboeOutputMix> {
        Ok(OboeOutputMix)
    }

    fn create_buffer_queue_player(
        &mut self,
        _output_mix: &OboeOutputMix,
        descriptor: &PlayerDescriptor,
    ) -> Result<OboePlayer> {
        let format = descriptor.format;
        if format.bits_per_sample != 16 {
            return Err(AudioError::UnsupportedFormat(format!(
                "{} bits per sample",
                format.bits_per_sample
            )));
        }
        // Oboe fixes the channel layout in the frame type
        if format.channel_count != 1 && format.channel_count != 2 {
            return Err(AudioError::UnsupportedFormat(format!(
                "Oboe output supports mono and stereo, got {} channels",
                format.channel_count
            )));
        }

        Ok(OboePlayer {
            shared: Arc::new(Shared {
                queue: Mutex::new(PcmQueue::new(descriptor.queue_capacity)),
                handler: Mutex::new(None),
                is_playing: AtomicBool::new(false),
                gain_bits: AtomicU32::new(1.0f32.to_bits()),
            }),
            format,
            stream_class: StreamClass::default(),
            stream: Arc::new(Mutex::new(None)),
        })
    }

    fn destroy(self) {
        log::info!("Oboe audio engine destroyed");
    }
}

pub struct OboeOutputMix;

impl OutputMix for OboeOutputMix {
    fn destroy(self) {}
}

struct Shared {
    queue: Mutex<PcmQueue>,
    handler: Mutex<Option<CompletionHandler>>,
    is_playing: AtomicBool,
    gain_bits: AtomicU32,
}

/// Drains the buffer queue into interleaved samples
struct QueueDrain {
    shared: Arc<Shared>,
    bytes: Vec<u8>,
}

impl QueueDrain {
    fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            bytes: Vec::new(),
        }
    }

    fn fill(&mut self, samples: &mut [i16]) {
        if !self.shared.is_playing.load(Ordering::Relaxed) {
            samples.fill(0);
            return;
        }

        let wanted = samples.len() * 2;
        self.bytes.resize(wanted, 0);
        let mut filled = 0;

        loop {
            let (copied, completed) = self.shared.queue.lock().read(&mut self.bytes[filled..]);
            filled += copied;

            if completed > 0 {
                // The handler enqueues the next buffer, so the queue lock is released here
                let handler = self.shared.handler.lock().clone();
                if let Some(handler) = handler {
                    for _ in 0..completed {
                        handler();
                    }
                }
            }

            if filled == wanted || completed == 0 {
                break;
            }
        }

        if filled < wanted {
            log::trace!("Oboe underrun: {} of {} bytes", filled, wanted);
            self.bytes[filled..].fill(0);
        }

        let gain = f32::from_bits(self.shared.gain_bits.load(Ordering::Relaxed));
        for (sample, bytes) in samples.iter_mut().zip(self.bytes.chunks_exact(2)) {
            let value = i16::from_le_bytes([bytes[0], bytes[1]]);
            *sample = if gain == 1.0 {
                value
            } else {
                (value as f32 * gain) as i16
            };
        }
    }
}

struct MonoCallback {
    drain: QueueDrain,
}

impl AudioOutputCallback for MonoCallback {
    type FrameType = (i16, Mono);

    fn on_audio_ready(
        &mut self,
        _stream: &mut dyn AudioOutputStreamSafe,
        output: &mut [i16],
    ) -> DataCallbackResult {
        self.drain.fill(output);
        DataCallbackResult::Continue
    }
}

struct StereoCallback {
    drain: QueueDrain,
    interleaved: Vec<i16>,
}

impl AudioOutputCallback for StereoCallback {
    type FrameType = (i16, Stereo);

    fn on_audio_ready(
        &mut self,
        _stream: &mut dyn AudioOutputStreamSafe,
        output: &mut [(i16, i16)],
    ) -> DataCallbackResult {
        self.interleaved.resize(output.len() * 2, 0);
        self.drain.fill(&mut self.interleaved);

        for (frame, samples) in output.iter_mut().zip(self.interleaved.chunks_exact(2)) {
            *frame = (samples[0], samples[1]);
        }
        DataCallbackResult::Continue
    }
}

enum OboeStream {
    Mono(AudioStreamAsync<Output, MonoCallback>),
    Stereo(AudioStreamAsync<Output, StereoCallback>),
}

// SAFETY: the stream handle is only touched while holding the player's
// stream mutex.
unsafe impl Send for OboeStream {}

impl OboeStream {
    fn open(format: PcmFormat, usage: Usage, shared: Arc<Shared>) -> Result<Self> {
        let builder = AudioStreamBuilder::default()
            .set_performance_mode(PerformanceMode::LowLatency)
            .set_sharing_mode(SharingMode::Shared)
            .set_format::<i16>()
            .set_sample_rate(format.sample_rate_hz as i32)
            .set_usage(usage);

        let open_err = |e: oboe::Error| {
            AudioError::InitializationError(format!("Failed to open Oboe stream: {:?}", e))
        };

        if format.channel_count == 2 {
            let stream = builder
                .set_channel_count::<Stereo>()
                .set_callback(StereoCallback {
                    drain: QueueDrain::new(shared),
                    interleaved: Vec::new(),
                })
                .open_stream()
                .map_err(open_err)?;
            Ok(OboeStream::Stereo(stream))
        } else {
            let stream = builder
                .set_channel_count::<Mono>()
                .set_callback(MonoCallback {
                    drain: QueueDrain::new(shared),
                })
                .open_stream()
                .map_err(open_err)?;
            Ok(OboeStream::Mono(stream))
        }
    }

    fn apply(&mut self, state: PlayState) -> Result<()> {
        let result = match (self, state) {
            (OboeStream::Mono(stream), PlayState::Playing) => stream.start(),
            (OboeStream::Mono(stream), PlayState::Paused) => stream.pause(),
            (OboeStream::Mono(stream), PlayState::Stopped) => stream.stop(),
            (OboeStream::Stereo(stream), PlayState::Playing) => stream.start(),
            (OboeStream::Stereo(stream), PlayState::Paused) => stream.pause(),
            (OboeStream::Stereo(stream), PlayState::Stopped) => stream.stop(),
        };
        result.map_err(|e| {
            AudioError::DeviceError(format!("Failed to set play state {:?}: {:?}", state, e))
        })
    }
}

pub struct OboePlayer {
    shared: Arc<Shared>,
    format: PcmFormat,
    stream_class: StreamClass,
    // Pause and stop wait for the data callback, which never takes this lock
    stream: Arc<Mutex<Option<OboeStream>>>,
}

impl OboePlayer {
    fn ensure_realized(&self) -> Result<()> {
        if self.stream.lock().is_some() {
            Ok(())
        } else {
            Err(AudioError::InvalidState(
                "Oboe player is not realized".to_string(),
            ))
        }
    }
}

impl BufferQueuePlayer for OboePlayer {
    type Control = OboeControl;

    fn configure_stream_class(&mut self, stream_class: StreamClass) -> Result<()> {
        if self.stream.lock().is_some() {
            return Err(AudioError::InvalidState(
                "Stream class must be configured before realize".to_string(),
            ));
        }
        self.stream_class = stream_class;
        Ok(())
    }

    fn realize(&mut self) -> Result<()> {
        let mut slot = self.stream.lock();
        if slot.is_some() {
            return Ok(());
        }
        let stream = OboeStream::open(
            self.format,
            usage_for(self.stream_class),
            self.shared.clone(),
        )?;
        log::info!(
            "Oboe stream opened: {}Hz, {} channels, {:?}",
            self.format.sample_rate_hz,
            self.format.channel_count,
            self.stream_class
        );
        *slot = Some(stream);
        Ok(())
    }

    fn register_callback(&mut self, handler: CompletionHandler) -> Result<()> {
        self.ensure_realized()?;
        *self.shared.handler.lock() = Some(handler);
        Ok(())
    }

    fn enqueue(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_realized()?;
        self.shared.queue.lock().push(data)
    }

    fn control(&self) -> Result<OboeControl> {
        self.ensure_realized()?;
        Ok(OboeControl {
            shared: self.shared.clone(),
            stream: self.stream.clone(),
        })
    }

    fn destroy(self) {
        self.shared.is_playing.store(false, Ordering::Relaxed);
        let stream = self.stream.lock().take();
        if let Some(mut stream) = stream {
            if let Err(err) = stream.apply(PlayState::Stopped) {
                log::warn!("{}", err);
            }
        }
        *self.shared.handler.lock() = None;
        self.shared.queue.lock().clear();
        log::info!("Oboe player destroyed");
    }
}

pub struct OboeControl {
    shared: Arc<Shared>,
    stream: Arc<Mutex<Option<OboeStream>>>,
}

impl PlayerControl for OboeControl {
    fn set_play_state(&self, state: PlayState) -> Result<()> {
        {
            let mut stream = self.stream.lock();
            let Some(stream) = stream.as_mut() else {
                return Err(AudioError::InvalidState(
                    "Oboe player has been destroyed".to_string(),
                ));
            };
            stream.apply(state)?;
        }
        self.shared
            .is_playing
            .store(state == PlayState::Playing, Ordering::Relaxed);
        if state == PlayState::Stopped {
            self.shared.queue.lock().clear();
        }
        Ok(())
    }

    fn volume_range(&self) -> Result<(Millibel, Millibel)> {
        Ok((MILLIBEL_MIN, 0))
    }

    fn set_volume_level(&self, level: Millibel) -> Result<()> {
        log::debug!("Oboe software gain set for {} mB", level);
        self.shared
            .gain_bits
            .store(millibel_to_gain(level).to_bits(), Ordering::Relaxed);
        Ok(())
    }
}
