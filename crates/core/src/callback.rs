// Sink event notification
// Events are raised from the audio thread as well as the control thread

use crate::state::SinkState;
use parking_lot::Mutex;
use std::sync::Arc;

/// Sink event types
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    /// Sink state changed
    StateChanged {
        old_state: SinkState,
        new_state: SinkState,
    },

    /// Output attenuation applied to the device
    VolumeChanged { fraction: f32, level_millibel: i16 },

    /// The device rejected a buffer and it was not resubmitted
    BufferDropped { dropped_total: u64 },

    /// Refill failed on the device thread
    Error { message: String },
}

/// Sink listener trait
/// Implementations should be lightweight and non-blocking
pub trait SinkListener: Send + Sync {
    /// Called when an event occurs
    /// This runs on the audio thread for refill events and must return quickly
    fn on_event(&self, event: SinkEvent);
}

/// Fans events out to every registered listener
pub struct EventDispatcher {
    listeners: Arc<Mutex<Vec<Arc<dyn SinkListener>>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn SinkListener>) {
        self.listeners.lock().push(listener);
    }

    pub fn clear_listeners(&self) {
        self.listeners.lock().clear();
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn dispatch_event(&self, event: SinkEvent) {
        // Snapshot so a listener may register another one without deadlocking
        let listeners = self.listeners.lock().clone();
        for listener in listeners.iter() {
            listener.on_event(event.clone());
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Listener that records every event, for tests and diagnostics
pub struct RecordingListener {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn get_events(&self) -> Vec<SinkEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for RecordingListener {
    fn default() -> Self {
        Self::new()
    }
}

impl SinkListener for RecordingListener {
    fn on_event(&self, event: SinkEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_to_all_listeners() {
        let dispatcher = EventDispatcher::new();
        let first = Arc::new(RecordingListener::new());
        let second = Arc::new(RecordingListener::new());
        dispatcher.add_listener(first.clone());
        dispatcher.add_listener(second.clone());

        dispatcher.dispatch_event(SinkEvent::StateChanged {
            old_state: SinkState::Ready,
            new_state: SinkState::Playing,
        });
        dispatcher.dispatch_event(SinkEvent::BufferDropped { dropped_total: 1 });

        assert_eq!(first.get_events().len(), 2);
        assert_eq!(second.get_events(), first.get_events());
    }

    #[test]
    fn cleared_listeners_receive_nothing() {
        let dispatcher = EventDispatcher::new();
        let listener = Arc::new(RecordingListener::new());
        dispatcher.add_listener(listener.clone());
        dispatcher.clear_listeners();
        assert_eq!(dispatcher.listener_count(), 0);

        dispatcher.dispatch_event(SinkEvent::Error {
            message: "ignored".to_string(),
        });
        assert!(listener.get_events().is_empty());
    }
}
