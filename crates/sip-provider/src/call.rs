//! Single call slot state
//!
//! Direction, counterpart and session handle live together in a [`CallSlot`],
//! so a call can never report a direction without holding a session.

use std::sync::Arc;

use crate::engine::{RtcSession, SessionId};
use crate::types::{CallDirection, CallId, CallSnapshot, CallStatus};

/// Session adopted by the provider
#[derive(Debug, Clone)]
pub struct CallSlot {
    pub id: CallId,
    pub session: Arc<dyn RtcSession>,
    pub direction: CallDirection,
    pub counterpart: String,
}

impl CallSlot {
    pub fn new(session: Arc<dyn RtcSession>, direction: CallDirection, counterpart: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            session,
            direction,
            counterpart: counterpart.into(),
        }
    }

    /// Whether `session_id` names this slot's session
    pub fn owns(&self, session_id: &SessionId) -> bool {
        self.session.id() == *session_id
    }
}

/// Call state machine
#[derive(Debug, Clone, Default)]
pub enum CallState {
    #[default]
    Idle,
    /// `slot` is `None` while a locally requested call waits for the engine
    /// to report its session
    Starting { slot: Option<CallSlot> },
    Active { slot: CallSlot },
    Stopping { slot: Option<CallSlot> },
}

impl CallState {
    pub fn status(&self) -> CallStatus {
        match self {
            CallState::Idle => CallStatus::Idle,
            CallState::Starting { .. } => CallStatus::Starting,
            CallState::Active { .. } => CallStatus::Active,
            CallState::Stopping { .. } => CallStatus::Stopping,
        }
    }

    pub fn slot(&self) -> Option<&CallSlot> {
        match self {
            CallState::Idle => None,
            CallState::Starting { slot } | CallState::Stopping { slot } => slot.as_ref(),
            CallState::Active { slot } => Some(slot),
        }
    }

    pub fn into_slot(self) -> Option<CallSlot> {
        match self {
            CallState::Idle => None,
            CallState::Starting { slot } | CallState::Stopping { slot } => slot,
            CallState::Active { slot } => Some(slot),
        }
    }

    pub fn has_session(&self) -> bool {
        self.slot().is_some()
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, CallState::Idle)
    }

    /// Incoming session waiting for a local answer
    pub fn is_answerable(&self) -> bool {
        matches!(
            self,
            CallState::Starting { slot: Some(slot) } if slot.direction == CallDirection::Incoming
        )
    }

    pub fn snapshot(&self) -> CallSnapshot {
        let slot = self.slot();
        CallSnapshot {
            id: slot.map(|s| s.id),
            status: self.status(),
            direction: slot.map(|s| s.direction),
            counterpart: slot.map(|s| s.counterpart.clone()),
        }
    }
}
