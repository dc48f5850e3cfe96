// Platform object model: engine -> output mix -> buffer-queue player

use crate::format::{Millibel, PcmFormat};
use fmp_audio_core::{Result, StreamClass};
use std::sync::Arc;

/// Invoked by the device each time a queued buffer has finished playing.
/// Runs on the device's audio thread.
pub type CompletionHandler = Arc<dyn Fn() + Send + Sync + 'static>;

/// Requested player state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Stopped,
    Paused,
    Playing,
}

impl PlayState {
    /// Tri-state integer used by the host control surface:
    /// 0 plays, 1 pauses, anything else stops.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => PlayState::Playing,
            1 => PlayState::Paused,
            _ => PlayState::Stopped,
        }
    }
}

/// Everything fixed at player creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerDescriptor {
    pub format: PcmFormat,
    /// Buffers the device queue holds at once
    pub queue_capacity: usize,
}

/// Entry point into a platform audio subsystem
pub trait AudioPlatform: Send + Sync + 'static {
    type Engine: AudioEngine;

    /// Creates and realizes the engine object
    fn create_engine(&self) -> Result<Self::Engine>;
}

pub trait AudioEngine: Send + 'static {
    type OutputMix: OutputMix;
    type Player: BufferQueuePlayer;

    /// Creates and realizes the default output mix
    fn create_output_mix(&mut self) -> Result<Self::OutputMix>;

    /// Creates an unrealized player routed to `output_mix`
    fn create_buffer_queue_player(
        &mut self,
        output_mix: &Self::OutputMix,
        descriptor: &PlayerDescriptor,
    ) -> Result<Self::Player>;

    fn destroy(self)
    where
        Self: Sized;
}

pub trait OutputMix: Send + 'static {
    fn destroy(self)
    where
        Self: Sized;
}

/// Play and volume interface of a realized player.
///
/// Pausing or stopping may block until an in-flight completion has returned,
/// so callers must not hold anything the completion handler needs.
pub trait PlayerControl: Send + 'static {
    fn set_play_state(&self, state: PlayState) -> Result<()>;

    /// Supported attenuation range as (min, max)
    fn volume_range(&self) -> Result<(Millibel, Millibel)>;

    fn set_volume_level(&self, level: Millibel) -> Result<()>;
}

/// A player fed through a fixed-capacity queue of PCM buffers
pub trait BufferQueuePlayer: Send + 'static {
    type Control: PlayerControl;

    /// Routing configuration. Only valid before `realize`.
    fn configure_stream_class(&mut self, stream_class: StreamClass) -> Result<()>;

    /// Brings the player to an operable state
    fn realize(&mut self) -> Result<()>;

    fn register_callback(&mut self, handler: CompletionHandler) -> Result<()>;

    /// Submits one buffer. The device copies `data`; an error means the
    /// queue rejected it.
    fn enqueue(&mut self, data: &[u8]) -> Result<()>;

    /// Play and volume interface. Only valid after `realize`.
    fn control(&self) -> Result<Self::Control>;

    /// Releases the player. No completion fires after this returns.
    fn destroy(self)
    where
        Self: Sized;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_play_state() {
        assert_eq!(PlayState::from_raw(0), PlayState::Playing);
        assert_eq!(PlayState::from_raw(1), PlayState::Paused);
        assert_eq!(PlayState::from_raw(2), PlayState::Stopped);
        assert_eq!(PlayState::from_raw(-7), PlayState::Stopped);
    }
}
