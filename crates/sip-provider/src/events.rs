//! Events published to the application

use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::types::{CallId, CallSnapshot, SipSnapshot};

/// Events emitted by the provider after each state change
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// Connection status or error changed
    SipStatusChanged(SipSnapshot),

    /// Call status, direction or counterpart changed
    CallStatusChanged(CallSnapshot),

    /// A remote party offered a call and it was adopted
    IncomingCall {
        /// Call identifier
        call_id: CallId,
        /// Caller address
        counterpart: String,
    },

    /// A session was rejected with 486 because another one is held
    BusyRejected {
        /// Address of the rejected party
        counterpart: String,
    },
}

/// Event stream type
pub type EventStream = BroadcastStream<ProviderEvent>;

/// Fan-out of provider events to any number of subscribers
#[derive(Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<ProviderEvent>,
}

impl EventEmitter {
    /// Create a new event emitter with the specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event
    pub fn emit(&self, event: ProviderEvent) {
        // Ignore send errors (no receivers)
        let _ = self.sender.send(event);
    }

    /// Subscribe as a stream
    pub fn subscribe(&self) -> EventStream {
        BroadcastStream::new(self.sender.subscribe())
    }

    /// Subscribe with a plain receiver
    pub fn receiver(&self) -> broadcast::Receiver<ProviderEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active receivers
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SipStatus;

    #[test]
    fn test_emit_without_subscribers_is_harmless() {
        let emitter = EventEmitter::default();
        emitter.emit(ProviderEvent::BusyRejected {
            counterpart: "sip:carol@example.com".to_string(),
        });
        assert_eq!(emitter.receiver_count(), 0);
    }

    #[test]
    fn test_subscribers_receive_events() {
        let emitter = EventEmitter::new(8);
        let mut rx = emitter.receiver();

        let snapshot = SipSnapshot {
            status: SipStatus::Connected,
            error_type: None,
            error_message: None,
        };
        emitter.emit(ProviderEvent::SipStatusChanged(snapshot.clone()));

        assert_eq!(rx.try_recv().unwrap(), ProviderEvent::SipStatusChanged(snapshot));
    }
}
