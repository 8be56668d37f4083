//! Contract with the SIP/WebRTC engine
//!
//! The provider never speaks SIP itself. It drives an engine through the
//! [`SipEngine`], [`UserAgent`] and [`RtcSession`] traits and learns about
//! progress only through events pushed into the [`EventSink`] handed to
//! [`SipEngine::create`]. Every engine call is fire-and-forget.
//!
//! Each sink is stamped with the [`Generation`] of the user agent it was
//! created for. When the provider replaces its user agent the generation moves
//! on, and anything the old instance still emits is dropped on arrival.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

use crate::config::IceServer;
use crate::types::{CallId, Originator};

/// Errors reported synchronously by the engine
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// User agent configuration rejected at construction time
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Transport could not be used
    #[error("Transport error: {0}")]
    Transport(String),

    /// A request (e.g. INVITE) could not be issued
    #[error("Request rejected: {0}")]
    Request(String),
}

impl EngineError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn request(message: impl Into<String>) -> Self {
        Self::Request(message.into())
    }
}

/// Identity of one user agent instance owned by the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Generation(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

/// Engine-assigned session identifier
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parameters the engine needs to build a user agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UaConfiguration {
    /// Address of record, e.g. `sip:alice@pbx.example.com`
    pub uri: String,
    /// WebSocket transport endpoints
    pub sockets: Vec<Url>,
    pub password: Option<String>,
    /// Register as soon as the transport connects
    pub register: bool,
    pub register_extra_headers: Vec<String>,
    /// Turn on the engine's own protocol trace
    pub debug: bool,
}

/// Media requested for a call or an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl MediaConstraints {
    pub fn audio_only() -> Self {
        Self {
            audio: true,
            video: false,
        }
    }
}

/// Options for an outgoing call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOptions {
    pub media_constraints: MediaConstraints,
    pub ice_servers: Vec<IceServer>,
    pub extra_headers: Vec<String>,
    pub session_timers_expires: Option<u32>,
}

/// Options for answering an incoming call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOptions {
    pub media_constraints: MediaConstraints,
    pub ice_servers: Vec<IceServer>,
}

/// Options for terminating a session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerminateOptions {
    /// SIP status code for the final response, engine default when `None`
    pub status_code: Option<u16>,
    pub reason_phrase: Option<String>,
}

impl TerminateOptions {
    /// `486 Busy Here`
    pub fn busy() -> Self {
        Self {
            status_code: Some(486),
            reason_phrase: Some("Busy Here".to_string()),
        }
    }
}

/// Headers of the request that created a session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalingRequest {
    /// `From` header value
    pub from: String,
    /// `To` header value
    pub to: String,
}

impl SignalingRequest {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Factory for user agents
pub trait SipEngine: Send + Sync {
    /// Build a user agent. Events for it and all of its sessions go to `sink`.
    fn create(&self, config: UaConfiguration, sink: EventSink) -> Result<Arc<dyn UserAgent>, EngineError>;
}

/// One signaling user agent
pub trait UserAgent: Send + Sync {
    fn start(&self);
    fn stop(&self);
    fn register(&self);
    fn unregister(&self);
    fn is_connected(&self) -> bool;
    /// Contact URI currently advertised, if any
    fn contact(&self) -> Option<String>;
    /// Place a call. The session itself is reported through [`UaEvent::NewSession`].
    fn call(&self, target: &str, options: CallOptions) -> Result<(), EngineError>;
    fn terminate_sessions(&self);
}

/// One call session owned by the engine
pub trait RtcSession: Send + Sync + fmt::Debug {
    fn id(&self) -> SessionId;
    fn answer(&self, options: AnswerOptions);
    fn terminate(&self, options: TerminateOptions);
}

/// Output for the remote party's audio
pub trait AudioSink: Send + Sync {
    /// Route the session's remote stream to the output
    fn attach(&self, call_id: &CallId, session: &Arc<dyn RtcSession>) -> Result<(), String>;
    /// Start (or restart) playback
    fn play(&self) -> Result<(), String>;
}

/// New session reported by a user agent
#[derive(Debug, Clone)]
pub struct NewSessionEvent {
    pub originator: Originator,
    pub session: Arc<dyn RtcSession>,
    pub request: SignalingRequest,
}

/// User agent lifecycle events
#[derive(Debug, Clone)]
pub enum UaEvent {
    Connecting,
    Connected,
    Disconnected,
    Registered,
    Unregistered,
    RegistrationFailed { cause: String },
    NewSession(NewSessionEvent),
}

impl UaEvent {
    pub fn name(&self) -> &'static str {
        match self {
            UaEvent::Connecting => "connecting",
            UaEvent::Connected => "connected",
            UaEvent::Disconnected => "disconnected",
            UaEvent::Registered => "registered",
            UaEvent::Unregistered => "unregistered",
            UaEvent::RegistrationFailed { .. } => "registrationFailed",
            UaEvent::NewSession(_) => "newRTCSession",
        }
    }
}

/// Session lifecycle events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Failed { cause: Option<String> },
    Ended { cause: Option<String> },
    Accepted,
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Failed { .. } => "failed",
            SessionEvent::Ended { .. } => "ended",
            SessionEvent::Accepted => "accepted",
        }
    }
}

/// Event payload travelling from the engine to the provider
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Agent(UaEvent),
    Session { session_id: SessionId, event: SessionEvent },
}

/// Engine event stamped with the generation of the emitting user agent
#[derive(Debug, Clone)]
pub struct EngineEnvelope {
    pub generation: Generation,
    pub event: EngineEvent,
}

pub type EventSender = mpsc::UnboundedSender<EngineEnvelope>;
pub type EventReceiver = mpsc::UnboundedReceiver<EngineEnvelope>;

/// Channel carrying engine events to the provider
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Handle through which one user agent reports its events
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: Generation,
    sender: EventSender,
}

impl EventSink {
    pub fn new(generation: Generation, sender: EventSender) -> Self {
        Self { generation, sender }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn emit(&self, event: UaEvent) {
        self.send(EngineEvent::Agent(event));
    }

    pub fn emit_session(&self, session_id: &SessionId, event: SessionEvent) {
        self.send(EngineEvent::Session {
            session_id: session_id.clone(),
            event,
        });
    }

    fn send(&self, event: EngineEvent) {
        // Receiver gone means the provider was torn down
        if self
            .sender
            .send(EngineEnvelope {
                generation: self.generation,
                event,
            })
            .is_err()
        {
            tracing::trace!("Dropping engine event for {}: provider is gone", self.generation);
        }
    }
}
