// In-memory platform that records every call
// Buffers only complete when the owner calls `complete_next`, which makes the
// pull loop fully deterministic for tests and offline rendering.

use crate::format::{Millibel, MILLIBEL_MIN};
use crate::platform::{
    AudioEngine, AudioPlatform, BufferQueuePlayer, CompletionHandler, OutputMix, PlayState,
    PlayerControl, PlayerDescriptor,
};
use crate::queue::PcmQueue;
use fmp_audio_core::{AudioError, Result, StreamClass};
use parking_lot::Mutex;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

/// How long a pause waits for the in-flight completion before giving up
const CALLBACK_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// One call made into the platform
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    CreateEngine,
    CreateOutputMix,
    CreatePlayer(PlayerDescriptor),
    ConfigureStreamClass(StreamClass),
    Realize,
    RegisterCallback,
    Enqueue(usize),
    EnqueueRejected(usize),
    SetPlayState(PlayState),
    SetVolumeLevel(Millibel),
    DestroyPlayer,
    DestroyOutputMix,
    DestroyEngine,
}

#[derive(Default)]
struct FaultPlan {
    engine: bool,
    output_mix: bool,
    player: bool,
    realize: bool,
    enqueues: usize,
}

struct MemoryState {
    calls: Vec<DeviceCall>,
    queue: PcmQueue,
    played: Vec<u8>,
    handler: Option<CompletionHandler>,
    player_alive: bool,
    realized: bool,
    play_state: PlayState,
    volume_range: (Millibel, Millibel),
    volume_level: Option<Millibel>,
    joins_callback_on_pause: bool,
    faults: FaultPlan,
}

/// Recording platform. Clones share the same device.
#[derive(Clone)]
pub struct MemoryPlatform {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self::with_volume_range(MILLIBEL_MIN, 0)
    }

    pub fn with_volume_range(min: Millibel, max: Millibel) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                calls: Vec::new(),
                queue: PcmQueue::new(0),
                played: Vec::new(),
                handler: None,
                player_alive: false,
                realized: false,
                play_state: PlayState::Stopped,
                volume_range: (min, max),
                volume_level: None,
                joins_callback_on_pause: false,
                faults: FaultPlan::default(),
            })),
        }
    }

    pub fn fail_engine_creation(&self) {
        self.state.lock().faults.engine = true;
    }

    pub fn fail_output_mix_creation(&self) {
        self.state.lock().faults.output_mix = true;
    }

    pub fn fail_player_creation(&self) {
        self.state.lock().faults.player = true;
    }

    pub fn fail_realize(&self) {
        self.state.lock().faults.realize = true;
    }

    /// The next `count` enqueue attempts are rejected
    pub fn fail_next_enqueues(&self, count: usize) {
        self.state.lock().faults.enqueues = count;
    }

    /// Pausing or stopping while playing first delivers the oldest queued
    /// buffer on a separate callback thread and waits for that completion to
    /// return, as AAudio does with its data callback.
    pub fn join_callback_on_pause(&self) {
        self.state.lock().joins_callback_on_pause = true;
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state.lock().calls.clone()
    }

    pub fn enqueue_count(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| matches!(call, DeviceCall::Enqueue(_)))
            .count()
    }

    pub fn queued(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn play_state(&self) -> PlayState {
        self.state.lock().play_state
    }

    pub fn volume_level(&self) -> Option<Millibel> {
        self.state.lock().volume_level
    }

    /// Bytes of every buffer that finished playing, in order
    pub fn played_bytes(&self) -> Vec<u8> {
        self.state.lock().played.clone()
    }

    pub fn has_callback(&self) -> bool {
        self.state.lock().handler.is_some()
    }

    /// Plays out the oldest queued buffer and signals its completion.
    /// Returns false when nothing was playing.
    pub fn complete_next(&self) -> bool {
        let handler = {
            let mut state = self.state.lock();
            if !state.player_alive || state.play_state != PlayState::Playing {
                return false;
            }
            let Some(buffer) = state.queue.pop_front() else {
                return false;
            };
            state.played.extend_from_slice(&buffer);
            state.handler.clone()
        };

        // The handler re-enters `enqueue`, so the lock must be released first
        if let Some(handler) = handler {
            handler();
        }
        true
    }
}

impl Default for MemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioPlatform for MemoryPlatform {
    type Engine = MemoryEngine;

    fn create_engine(&self) -> Result<MemoryEngine> {
        let mut state = self.state.lock();
        if state.faults.engine {
            return Err(AudioError::InitializationError(
                "Audio engine unavailable".to_string(),
            ));
        }
        state.calls.push(DeviceCall::CreateEngine);
        Ok(MemoryEngine {
            state: self.state.clone(),
        })
    }
}

pub struct MemoryEngine {
    state: Arc<Mutex<MemoryState>>,
}

impl AudioEngine for MemoryEngine {
    type OutputMix = MemoryOutputMix;
    type Player = MemoryPlayer;

    fn create_output_mix(&mut self) -> Result<MemoryOutputMix> {
        let mut state = self.state.lock();
        if state.faults.output_mix {
            return Err(AudioError::InitializationError(
                "Output mix unavailable".to_string(),
            ));
        }
        state.calls.push(DeviceCall::CreateOutputMix);
        Ok(MemoryOutputMix {
            state: self.state.clone(),
        })
    }

    fn create_buffer_queue_player(
        &mut self,
        _output_mix: &MemoryOutputMix,
        descriptor: &PlayerDescriptor,
    ) -> Result<MemoryPlayer> {
        let mut state = self.state.lock();
        if state.faults.player {
            return Err(AudioError::InitializationError(
                "Audio player unavailable".to_string(),
            ));
        }
        state.calls.push(DeviceCall::CreatePlayer(*descriptor));
        state.queue = PcmQueue::new(descriptor.queue_capacity);
        state.player_alive = true;
        state.realized = false;
        state.play_state = PlayState::Stopped;
        Ok(MemoryPlayer {
            state: self.state.clone(),
        })
    }

    fn destroy(self) {
        self.state.lock().calls.push(DeviceCall::DestroyEngine);
    }
}

pub struct MemoryOutputMix {
    state: Arc<Mutex<MemoryState>>,
}

impl OutputMix for MemoryOutputMix {
    fn destroy(self) {
        self.state.lock().calls.push(DeviceCall::DestroyOutputMix);
    }
}

pub struct MemoryPlayer {
    state: Arc<Mutex<MemoryState>>,
}

impl BufferQueuePlayer for MemoryPlayer {
    type Control = MemoryControl;

    fn configure_stream_class(&mut self, stream_class: StreamClass) -> Result<()> {
        let mut state = self.state.lock();
        if state.realized {
            return Err(AudioError::InvalidState(
                "Stream class must be configured before realize".to_string(),
            ));
        }
        state.calls.push(DeviceCall::ConfigureStreamClass(stream_class));
        Ok(())
    }

    fn realize(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if state.faults.realize {
            return Err(AudioError::InitializationError(
                "Failed to realize audio player".to_string(),
            ));
        }
        state.realized = true;
        state.calls.push(DeviceCall::Realize);
        Ok(())
    }

    fn register_callback(&mut self, handler: CompletionHandler) -> Result<()> {
        let mut state = self.state.lock();
        state.handler = Some(handler);
        state.calls.push(DeviceCall::RegisterCallback);
        Ok(())
    }

    fn enqueue(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        if state.faults.enqueues > 0 {
            state.faults.enqueues -= 1;
            state.calls.push(DeviceCall::EnqueueRejected(data.len()));
            return Err(AudioError::EnqueueError(
                "Buffer rejected by device".to_string(),
            ));
        }
        match state.queue.push(data) {
            Ok(()) => {
                state.calls.push(DeviceCall::Enqueue(data.len()));
                Ok(())
            }
            Err(err) => {
                state.calls.push(DeviceCall::EnqueueRejected(data.len()));
                Err(err)
            }
        }
    }

    fn control(&self) -> Result<MemoryControl> {
        if !self.state.lock().realized {
            return Err(AudioError::InvalidState(
                "Audio player is not realized".to_string(),
            ));
        }
        Ok(MemoryControl {
            state: self.state.clone(),
        })
    }

    fn destroy(self) {
        let mut state = self.state.lock();
        state.handler = None;
        state.player_alive = false;
        state.queue.clear();
        state.calls.push(DeviceCall::DestroyPlayer);
    }
}

pub struct MemoryControl {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryControl {
    fn join_in_flight_callback(&self) -> Result<()> {
        let handler = {
            let mut state = self.state.lock();
            if !state.joins_callback_on_pause
                || !state.player_alive
                || state.play_state != PlayState::Playing
            {
                return Ok(());
            }
            let Some(buffer) = state.queue.pop_front() else {
                return Ok(());
            };
            state.played.extend_from_slice(&buffer);
            match state.handler.clone() {
                Some(handler) => handler,
                None => return Ok(()),
            }
        };

        let (done_tx, done_rx) = mpsc::channel();
        thread::Builder::new()
            .name("memory-callback".to_string())
            .spawn(move || {
                handler();
                let _ = done_tx.send(());
            })
            .map_err(|e| AudioError::DeviceError(format!("Failed to spawn callback: {}", e)))?;

        done_rx.recv_timeout(CALLBACK_JOIN_TIMEOUT).map_err(|_| {
            AudioError::DeviceError("In-flight completion did not return".to_string())
        })
    }
}

impl PlayerControl for MemoryControl {
    fn set_play_state(&self, play_state: PlayState) -> Result<()> {
        if play_state != PlayState::Playing {
            self.join_in_flight_callback()?;
        }

        let mut state = self.state.lock();
        if play_state == PlayState::Stopped {
            state.queue.clear();
        }
        state.play_state = play_state;
        state.calls.push(DeviceCall::SetPlayState(play_state));
        Ok(())
    }

    fn volume_range(&self) -> Result<(Millibel, Millibel)> {
        Ok(self.state.lock().volume_range)
    }

    fn set_volume_level(&self, level: Millibel) -> Result<()> {
        let mut state = self.state.lock();
        state.volume_level = Some(level);
        state.calls.push(DeviceCall::SetVolumeLevel(level));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::PcmFormat;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn descriptor() -> PlayerDescriptor {
        PlayerDescriptor {
            format: PcmFormat::s16le(2, 44100),
            queue_capacity: 2,
        }
    }

    #[test]
    fn stream_class_after_realize_is_rejected() {
        let platform = MemoryPlatform::new();
        let mut engine = platform.create_engine().unwrap();
        let mix = engine.create_output_mix().unwrap();
        let mut player = engine.create_buffer_queue_player(&mix, &descriptor()).unwrap();

        player.configure_stream_class(StreamClass::Alarm).unwrap();
        player.realize().unwrap();
        let err = player.configure_stream_class(StreamClass::Media).unwrap_err();
        assert!(matches!(err, AudioError::InvalidState(_)));
    }

    #[test]
    fn completes_only_while_playing() {
        let platform = MemoryPlatform::new();
        let mut engine = platform.create_engine().unwrap();
        let mix = engine.create_output_mix().unwrap();
        let mut player = engine.create_buffer_queue_player(&mix, &descriptor()).unwrap();
        player.realize().unwrap();

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        player
            .register_callback(Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        player.enqueue(&[1, 2, 3, 4]).unwrap();

        assert!(!platform.complete_next());
        player
            .control()
            .unwrap()
            .set_play_state(PlayState::Playing)
            .unwrap();
        assert!(platform.complete_next());
        assert!(!platform.complete_next());

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(platform.played_bytes(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn injected_enqueue_faults() {
        let platform = MemoryPlatform::new();
        let mut engine = platform.create_engine().unwrap();
        let mix = engine.create_output_mix().unwrap();
        let mut player = engine.create_buffer_queue_player(&mix, &descriptor()).unwrap();

        platform.fail_next_enqueues(1);
        assert!(player.enqueue(&[0; 4]).is_err());
        assert!(player.enqueue(&[0; 4]).is_ok());
        assert_eq!(platform.enqueue_count(), 1);
        assert_eq!(platform.queued(), 1);
    }

    #[test]
    fn stopping_flushes_queue() {
        let platform = MemoryPlatform::new();
        let mut engine = platform.create_engine().unwrap();
        let mix = engine.create_output_mix().unwrap();
        let mut player = engine.create_buffer_queue_player(&mix, &descriptor()).unwrap();
        player.realize().unwrap();
        player.enqueue(&[0; 4]).unwrap();
        player
            .control()
            .unwrap()
            .set_play_state(PlayState::Stopped)
            .unwrap();
        assert_eq!(platform.queued(), 0);
    }

    #[test]
    fn control_needs_realize() {
        let platform = MemoryPlatform::new();
        let mut engine = platform.create_engine().unwrap();
        let mix = engine.create_output_mix().unwrap();
        let player = engine.create_buffer_queue_player(&mix, &descriptor()).unwrap();
        assert!(matches!(player.control(), Err(AudioError::InvalidState(_))));
    }

    #[test]
    fn pause_waits_for_in_flight_completion() {
        let platform = MemoryPlatform::new();
        platform.join_callback_on_pause();
        let mut engine = platform.create_engine().unwrap();
        let mix = engine.create_output_mix().unwrap();
        let mut player = engine.create_buffer_queue_player(&mix, &descriptor()).unwrap();
        player.realize().unwrap();

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        player
            .register_callback(Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        player.enqueue(&[7; 4]).unwrap();

        let control = player.control().unwrap();
        control.set_play_state(PlayState::Playing).unwrap();
        control.set_play_state(PlayState::Paused).unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(platform.played_bytes(), vec![7; 4]);
        assert_eq!(platform.play_state(), PlayState::Paused);
    }
}
