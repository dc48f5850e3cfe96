// Sink lifecycle state management

use crate::error::{AudioError, Result};
use parking_lot::RwLock;
use std::sync::Arc;

/// Sink lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    /// Engine and output mix exist, no player attached yet
    Uninitialized,
    /// Player attached, nothing requested yet
    Ready,
    /// Device is consuming buffers
    Playing,
    /// Device holds its queue but does not consume it
    Paused,
    /// Device stopped and flushed its queue
    Stopped,
    /// All platform objects released. Terminal.
    ShutDown,
}

impl SinkState {
    /// Whether a player is attached in this state.
    pub fn has_player(self) -> bool {
        matches!(
            self,
            SinkState::Ready | SinkState::Playing | SinkState::Paused | SinkState::Stopped
        )
    }
}

/// Thread-safe sink state container
#[derive(Clone)]
pub struct SinkStateContainer {
    state: Arc<RwLock<SinkState>>,
}

impl SinkStateContainer {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(SinkState::Uninitialized)),
        }
    }

    pub fn get_state(&self) -> SinkState {
        *self.state.read()
    }

    /// Moves to `to` if the transition is allowed from the current state and
    /// returns the previous state.
    pub fn transition(&self, to: SinkState) -> Result<SinkState> {
        let mut state = self.state.write();
        let from = *state;
        Self::validate_state_transition(from, to)?;
        *state = to;
        if from != to {
            log::debug!("Sink state changed: {:?} -> {:?}", from, to);
        }
        Ok(from)
    }

    pub fn validate_state_transition(from: SinkState, to: SinkState) -> Result<()> {
        use SinkState::*;

        match (from, to) {
            // Teardown is reachable from everywhere and repeatable
            (_, ShutDown) => Ok(()),

            (Uninitialized, Ready) => Ok(()),

            // The device accepts any play state once the player exists,
            // including re-applying the current one
            (Ready | Playing | Paused | Stopped, Playing | Paused | Stopped) => Ok(()),

            _ => Err(AudioError::InvalidState(format!(
                "Invalid state transition from {:?} to {:?}",
                from, to
            ))),
        }
    }
}

impl Default for SinkStateContainer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uninitialized() {
        let container = SinkStateContainer::new();
        assert_eq!(container.get_state(), SinkState::Uninitialized);
        assert!(!container.get_state().has_player());
    }

    #[test]
    fn full_lifecycle() {
        let container = SinkStateContainer::new();
        assert_eq!(container.transition(SinkState::Ready), Ok(SinkState::Uninitialized));
        assert_eq!(container.transition(SinkState::Playing), Ok(SinkState::Ready));
        assert_eq!(container.transition(SinkState::Paused), Ok(SinkState::Playing));
        assert_eq!(container.transition(SinkState::Playing), Ok(SinkState::Paused));
        assert_eq!(container.transition(SinkState::Stopped), Ok(SinkState::Playing));
        assert_eq!(container.transition(SinkState::Playing), Ok(SinkState::Stopped));
        assert_eq!(container.transition(SinkState::ShutDown), Ok(SinkState::Playing));
    }

    #[test]
    fn shut_down_is_terminal_but_repeatable() {
        let container = SinkStateContainer::new();
        container.transition(SinkState::ShutDown).unwrap();
        assert!(container.transition(SinkState::ShutDown).is_ok());
        assert!(container.transition(SinkState::Ready).is_err());
        assert!(container.transition(SinkState::Playing).is_err());
        assert_eq!(container.get_state(), SinkState::ShutDown);
    }

    #[test]
    fn play_states_need_a_player() {
        let container = SinkStateContainer::new();
        let err = container.transition(SinkState::Playing).unwrap_err();
        assert!(matches!(err, AudioError::InvalidState(_)));
        assert_eq!(container.get_state(), SinkState::Uninitialized);
    }

    #[test]
    fn player_cannot_be_attached_twice() {
        let container = SinkStateContainer::new();
        container.transition(SinkState::Ready).unwrap();
        assert!(container.transition(SinkState::Ready).is_err());
    }
}
