// Buffered audio sink: a pull loop driven by device buffer completions
//
// Every time the device finishes a buffer, the sink frees the previous one,
// allocates a fresh buffer, lets the producer fill it and enqueues it. Only a
// completion produces audio, so at most one buffer is ever outstanding.

use crate::pending::PendingBuffer;
use crate::stats::{BufferStats, EnqueueCounters};
use fmp_audio_core::{
    AudioError, EnqueueFailurePolicy, EventDispatcher, Result, SinkConfig, SinkEvent,
    SinkListener, SinkState, SinkStateContainer,
};
use fmp_audio_device::{
    AudioEngine, AudioPlatform, BufferQueuePlayer, CompletionHandler, Millibel, OutputMix,
    PcmFormat, PlayState, PlayerControl, PlayerDescriptor,
};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Fills the whole slice with interleaved signed 16-bit little-endian PCM.
///
/// Runs on the device's audio thread while the sink holds its locks: it must
/// return promptly and must not call back into the sink.
pub type FrameProducer = Box<dyn FnMut(&mut [u8]) + Send + 'static>;

type EngineOf<P> = <P as AudioPlatform>::Engine;
type OutputMixOf<P> = <EngineOf<P> as AudioEngine>::OutputMix;
type PlayerOf<P> = <EngineOf<P> as AudioEngine>::Player;
type ControlOf<P> = <PlayerOf<P> as BufferQueuePlayer>::Control;

/// Maps a linear fraction onto the device range: `min + (max - min) * fraction`.
/// The fraction is not clamped; the conversion to millibel saturates.
pub fn volume_level(min: Millibel, max: Millibel, fraction: f32) -> Millibel {
    let span = max as f32 - min as f32;
    (min as f32 + span * fraction) as Millibel
}

fn sink_state_for(target: PlayState) -> SinkState {
    match target {
        PlayState::Playing => SinkState::Playing,
        PlayState::Paused => SinkState::Paused,
        PlayState::Stopped => SinkState::Stopped,
    }
}

/// Setup errors are fatal; keep programming errors recognisable.
fn setup_failure(step: &str, err: AudioError) -> AudioError {
    match err {
        AudioError::InitializationError(_) | AudioError::InvalidState(_) => err,
        other => AudioError::InitializationError(format!("{}: {}", step, other)),
    }
}

fn enqueue_failure(err: AudioError) -> AudioError {
    match err {
        AudioError::EnqueueError(_) => err,
        other => AudioError::EnqueueError(other.to_string()),
    }
}

/// Which platform objects are currently held
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleStatus {
    pub engine: bool,
    pub output_mix: bool,
    pub player: bool,
}

impl HandleStatus {
    pub fn is_empty(&self) -> bool {
        !self.engine && !self.output_mix && !self.player
    }
}

struct PlatformHandles<P: AudioPlatform> {
    engine: Option<EngineOf<P>>,
    output_mix: Option<OutputMixOf<P>>,
    player: Option<PlayerOf<P>>,
}

enum Refill {
    NoPlayer,
    Enqueued,
    Dropped { error: AudioError, dropped_total: u64 },
}

struct SinkInner<P: AudioPlatform> {
    config: SinkConfig,
    // Lock order: control, handles, pending, producer.
    // Completions take handles but never control, so a device may block in
    // pause or stop until the in-flight completion returns.
    control: Mutex<Option<ControlOf<P>>>,
    handles: Mutex<PlatformHandles<P>>,
    pending: Mutex<PendingBuffer>,
    producer: Mutex<FrameProducer>,
    state: SinkStateContainer,
    volume_millibel: Mutex<Option<Millibel>>,
    counters: EnqueueCounters,
    events: EventDispatcher,
}

impl<P: AudioPlatform> SinkInner<P> {
    fn refill(&self) -> Refill {
        let mut handles = self.handles.lock();
        let Some(player) = handles.player.as_mut() else {
            return Refill::NoPlayer;
        };

        let mut pending = self.pending.lock();
        let buffer = pending.replace(self.config.buffer_size_bytes);
        {
            let mut producer = self.producer.lock();
            let fill: &mut (dyn FnMut(&mut [u8]) + Send) = &mut **producer;
            fill(&mut *buffer);
        }
        let buffer: &[u8] = buffer;

        let mut error = match player.enqueue(buffer) {
            Ok(()) => {
                self.counters.record_enqueued();
                return Refill::Enqueued;
            }
            Err(err) => enqueue_failure(err),
        };
        self.counters.record_failure();

        if self.config.enqueue_failure_policy == EnqueueFailurePolicy::RetryOnce {
            self.counters.record_retry();
            match player.enqueue(buffer) {
                Ok(()) => {
                    log::debug!("Enqueue succeeded on retry after: {}", error);
                    self.counters.record_enqueued();
                    return Refill::Enqueued;
                }
                Err(err) => {
                    self.counters.record_failure();
                    error = enqueue_failure(err);
                }
            }
        }

        let dropped_total = self.counters.record_dropped();
        log::warn!(
            "Dropped {} byte buffer ({} dropped so far): {}",
            buffer.len(),
            dropped_total,
            error
        );
        Refill::Dropped {
            error,
            dropped_total,
        }
    }

    /// Completion signalled by the device
    fn on_buffer_complete(&self) {
        match self.refill() {
            Refill::Enqueued => {}
            Refill::NoPlayer => log::debug!("Buffer completion after player release ignored"),
            Refill::Dropped {
                error,
                dropped_total,
            } => {
                // Nobody above the device thread can receive the error
                log::error!("Refill on device thread failed: {}", error);
                self.events
                    .dispatch_event(SinkEvent::BufferDropped { dropped_total });
                self.events.dispatch_event(SinkEvent::Error {
                    message: error.to_string(),
                });
            }
        }
    }

    fn completion_handler(self: &Arc<Self>) -> CompletionHandler {
        let weak: Weak<Self> = Arc::downgrade(self);
        Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.on_buffer_complete();
            }
        })
    }
}

/// Low-latency push-audio sink over a platform buffer queue.
///
/// Typical lifecycle:
///
/// ```ignore
/// let sink = BufferedAudioSink::new(&platform, SinkConfig::default(), producer)?;
/// sink.create_buffer_queue_audio_player()?;
/// sink.set_playing_state(PlayState::Playing)?;
/// sink.queue_audio_samples()?;
/// // ... device completions keep the queue fed ...
/// sink.shutdown();
/// ```
pub struct BufferedAudioSink<P: AudioPlatform> {
    inner: Arc<SinkInner<P>>,
}

impl<P: AudioPlatform> BufferedAudioSink<P> {
    /// Creates and realizes the engine and the default output mix.
    ///
    /// Fails with `InitializationError` if the platform audio subsystem is
    /// unusable. The sink starts `Uninitialized` until a player is attached.
    pub fn new<F>(platform: &P, config: SinkConfig, producer: F) -> Result<Self>
    where
        F: FnMut(&mut [u8]) + Send + 'static,
    {
        config.validate()?;
        log::info!(
            "Creating audio sink: {} channels, {}Hz, {:?}, {} byte buffers",
            config.channel_count,
            config.sample_rate_hz,
            config.stream_class,
            config.buffer_size_bytes
        );

        let (engine, output_mix) = Self::create_engine(platform)?;

        Ok(Self {
            inner: Arc::new(SinkInner {
                config,
                control: Mutex::new(None),
                handles: Mutex::new(PlatformHandles {
                    engine: Some(engine),
                    output_mix: Some(output_mix),
                    player: None,
                }),
                pending: Mutex::new(PendingBuffer::new()),
                producer: Mutex::new(Box::new(producer)),
                state: SinkStateContainer::new(),
                volume_millibel: Mutex::new(None),
                counters: EnqueueCounters::default(),
                events: EventDispatcher::new(),
            }),
        })
    }

    fn create_engine(platform: &P) -> Result<(EngineOf<P>, OutputMixOf<P>)> {
        let mut engine = platform
            .create_engine()
            .map_err(|e| setup_failure("Failed to create audio engine", e))?;

        match engine.create_output_mix() {
            Ok(output_mix) => {
                log::info!("Audio engine and output mix realized");
                Ok((engine, output_mix))
            }
            Err(err) => {
                engine.destroy();
                Err(setup_failure("Failed to create output mix", err))
            }
        }
    }

    /// Builds the buffer-queue player routed to the output mix, using the
    /// channel count, sample rate and stream class from the configuration.
    pub fn create_buffer_queue_audio_player(&self) -> Result<()> {
        let config = self.inner.config;
        let old_state = {
            let mut control = self.inner.control.lock();
            let mut handles = self.inner.handles.lock();
            match self.inner.state.get_state() {
                SinkState::Uninitialized => {}
                SinkState::ShutDown => {
                    return Err(AudioError::InvalidState(
                        "Audio sink has been shut down".to_string(),
                    ))
                }
                _ => {
                    return Err(AudioError::InvalidState(
                        "Audio player already created".to_string(),
                    ))
                }
            }

            let PlatformHandles {
                engine,
                output_mix,
                player,
            } = &mut *handles;
            let (Some(engine), Some(output_mix)) = (engine.as_mut(), output_mix.as_ref()) else {
                return Err(AudioError::InvalidState(
                    "Audio engine is not available".to_string(),
                ));
            };

            let descriptor = PlayerDescriptor {
                format: PcmFormat::s16le(config.channel_count, config.sample_rate_hz),
                queue_capacity: config.queue_capacity,
            };
            log::info!(
                "Creating buffer queue player: {:?}, channel mask {:#x}",
                config.stream_class,
                descriptor.format.channel_mask.bits()
            );

            let mut new_player = engine
                .create_buffer_queue_player(output_mix, &descriptor)
                .map_err(|e| setup_failure("Failed to create audio player", e))?;

            let new_control = match self.attach_player(&mut new_player) {
                Ok(new_control) => new_control,
                Err(err) => {
                    new_player.destroy();
                    return Err(err);
                }
            };

            *player = Some(new_player);
            *control = Some(new_control);
            self.inner.state.transition(SinkState::Ready)?
        };

        self.inner.events.dispatch_event(SinkEvent::StateChanged {
            old_state,
            new_state: SinkState::Ready,
        });
        Ok(())
    }

    fn attach_player(&self, player: &mut PlayerOf<P>) -> Result<ControlOf<P>> {
        // Routing is rejected by the platform once the player is realized
        player
            .configure_stream_class(self.inner.config.stream_class)
            .map_err(|e| setup_failure("Failed to configure stream class", e))?;
        player
            .realize()
            .map_err(|e| setup_failure("Failed to realize audio player", e))?;
        player
            .register_callback(self.inner.completion_handler())
            .map_err(|e| setup_failure("Failed to register buffer callback", e))?;
        player
            .control()
            .map_err(|e| setup_failure("Failed to get play control", e))
    }

    /// Primes the pull loop by synthesizing one completion: fills and
    /// enqueues exactly one buffer.
    pub fn queue_audio_samples(&self) -> Result<()> {
        match self.inner.refill() {
            Refill::Enqueued => Ok(()),
            Refill::NoPlayer => Err(AudioError::InvalidState(
                "No audio player to queue samples on".to_string(),
            )),
            Refill::Dropped {
                error,
                dropped_total,
            } => {
                self.inner
                    .events
                    .dispatch_event(SinkEvent::BufferDropped { dropped_total });
                Err(error)
            }
        }
    }

    /// Submits raw PCM straight to the device queue, outside the pull loop.
    pub fn enqueue(&self, data: &[u8]) -> Result<()> {
        let mut handles = self.inner.handles.lock();
        let Some(player) = handles.player.as_mut() else {
            return Err(AudioError::InvalidState(
                "No audio player to enqueue on".to_string(),
            ));
        };

        match player.enqueue(data) {
            Ok(()) => {
                self.inner.counters.record_enqueued();
                Ok(())
            }
            Err(err) => {
                self.inner.counters.record_failure();
                Err(enqueue_failure(err))
            }
        }
    }

    /// Applies a play state to the player. Without a player this does nothing.
    pub fn set_playing_state(&self, target: PlayState) -> Result<()> {
        let new_state = sink_state_for(target);
        let old_state = {
            let slot = self.inner.control.lock();
            let Some(control) = slot.as_ref() else {
                log::debug!("Ignoring {:?} request: no audio player", target);
                return Ok(());
            };
            control.set_play_state(target)?;
            self.inner.state.transition(new_state)?
        };

        if old_state != new_state {
            self.inner.events.dispatch_event(SinkEvent::StateChanged {
                old_state,
                new_state,
            });
        }
        Ok(())
    }

    pub fn play(&self) -> Result<()> {
        self.set_playing_state(PlayState::Playing)
    }

    pub fn pause(&self) -> Result<()> {
        self.set_playing_state(PlayState::Paused)
    }

    pub fn stop(&self) -> Result<()> {
        self.set_playing_state(PlayState::Stopped)
    }

    /// Sets output attenuation from a linear fraction in [0, 1]. Values
    /// outside that range are not clamped. Without a player this does nothing.
    pub fn set_volume(&self, fraction: f32) -> Result<()> {
        let level_millibel = {
            let slot = self.inner.control.lock();
            let Some(control) = slot.as_ref() else {
                log::debug!("Ignoring volume change: no audio player");
                return Ok(());
            };
            let (min, max) = control.volume_range()?;
            let level = volume_level(min, max, fraction);
            control.set_volume_level(level)?;
            *self.inner.volume_millibel.lock() = Some(level);
            level
        };

        log::debug!("Volume {} -> {} mB", fraction, level_millibel);
        self.inner.events.dispatch_event(SinkEvent::VolumeChanged {
            fraction,
            level_millibel,
        });
        Ok(())
    }

    /// Last level applied to the device
    pub fn volume_millibel(&self) -> Option<Millibel> {
        *self.inner.volume_millibel.lock()
    }

    /// Releases the player, the output mix and the engine in that order, then
    /// frees the pending buffer. Safe to call any number of times.
    ///
    /// Must not be called from the producer.
    pub fn shutdown(&self) {
        // Held until teardown finishes so no control call overlaps it
        let mut control = self.inner.control.lock();
        let released_control = control.take();
        let (player, output_mix, engine, old_state) = {
            let mut handles = self.inner.handles.lock();
            let old_state = self
                .inner
                .state
                .transition(SinkState::ShutDown)
                .unwrap_or(SinkState::ShutDown);
            (
                handles.player.take(),
                handles.output_mix.take(),
                handles.engine.take(),
                old_state,
            )
        };

        // Destroyed outside the handles lock: a device may wait for its audio
        // thread, which can be blocked on that lock inside a completion.
        drop(released_control);
        if let Some(player) = player {
            log::info!("Destroying audio player");
            player.destroy();
        }
        if let Some(output_mix) = output_mix {
            log::info!("Destroying output mix");
            output_mix.destroy();
        }
        if let Some(engine) = engine {
            log::info!("Destroying audio engine");
            engine.destroy();
        }
        if self.inner.pending.lock().release() {
            log::debug!("Freed pending buffer");
        }
        drop(control);

        if old_state != SinkState::ShutDown {
            self.inner.events.dispatch_event(SinkEvent::StateChanged {
                old_state,
                new_state: SinkState::ShutDown,
            });
        }
    }

    pub fn state(&self) -> SinkState {
        self.inner.state.get_state()
    }

    pub fn config(&self) -> &SinkConfig {
        &self.inner.config
    }

    pub fn handle_status(&self) -> HandleStatus {
        let handles = self.inner.handles.lock();
        HandleStatus {
            engine: handles.engine.is_some(),
            output_mix: handles.output_mix.is_some(),
            player: handles.player.is_some(),
        }
    }

    pub fn buffer_stats(&self) -> BufferStats {
        let pending = self.inner.pending.lock();
        self.inner
            .counters
            .snapshot(pending.allocated(), pending.freed(), pending.is_live())
    }

    /// Copy of the buffer currently owned by the sink
    pub fn pending_buffer(&self) -> Option<Vec<u8>> {
        self.inner.pending.lock().get().map(<[u8]>::to_vec)
    }

    pub fn add_listener(&self, listener: Arc<dyn SinkListener>) {
        self.inner.events.add_listener(listener);
    }
}

impl<P: AudioPlatform> Drop for BufferedAudioSink<P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
