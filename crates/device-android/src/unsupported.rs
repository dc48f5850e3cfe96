// Oboe is only available on Android; elsewhere the platform refuses to start

use fmp_audio_core::{AudioError, Result, StreamClass};
use fmp_audio_device::{
    AudioEngine, AudioPlatform, BufferQueuePlayer, CompletionHandler, Millibel, OutputMix,
    PlayState, PlayerControl, PlayerDescriptor,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct OboePlatform;

impl OboePlatform {
    pub fn new() -> Self {
        OboePlatform
    }
}

impl AudioPlatform for OboePlatform {
    type Engine = Unavailable;

    fn create_engine(&self) -> Result<Unavailable> {
        Err(AudioError::InitializationError(
            "Oboe output is only available on Android".to_string(),
        ))
    }
}

/// Stands in for every platform object; it can never be constructed.
pub enum Unavailable {}

impl AudioEngine for Unavailable {
    type OutputMix = Unavailable;
    type Player = Unavailable;

    fn create_output_mix(&mut self) -> Result<Unavailable> {
        match *self {}
    }

    fn create_buffer_queue_player(
        &mut self,
        _output_mix: &Unavailable,
        _descriptor: &PlayerDescriptor,
    ) -> Result<Unavailable> {
        match *self {}
    }

    fn destroy(self) {
        match self {}
    }
}

impl OutputMix for Unavailable {
    fn destroy(self) {
        match self {}
    }
}

impl BufferQueuePlayer for Unavailable {
    type Control = Unavailable;

    fn configure_stream_class(&mut self, _stream_class: StreamClass) -> Result<()> {
        match *self {}
    }

    fn realize(&mut self) -> Result<()> {
        match *self {}
    }

    fn register_callback(&mut self, _handler: CompletionHandler) -> Result<()> {
        match *self {}
    }

    fn enqueue(&mut self, _data: &[u8]) -> Result<()> {
        match *self {}
    }

    fn control(&self) -> Result<Unavailable> {
        match *self {}
    }

    fn destroy(self) {
        match self {}
    }
}

impl PlayerControl for Unavailable {
    fn set_play_state(&self, _state: PlayState) -> Result<()> {
        match *self {}
    }

    fn volume_range(&self) -> Result<(Millibel, Millibel)> {
        match *self {}
    }

    fn set_volume_level(&self, _level: Millibel) -> Result<()> {
        match *self {}
    }
}
