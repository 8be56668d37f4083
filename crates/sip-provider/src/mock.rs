//! In-memory engine for tests and demos
//!
//! [`MockEngine`] builds [`MockUserAgent`]s that record every request they
//! receive and let the caller inject user agent and session events, as a real
//! engine would after network activity.
//!
//! ```rust
//! use std::sync::Arc;
//! use sip_provider::engine::{event_channel, UaEvent};
//! use sip_provider::mock::MockEngine;
//! use sip_provider::{ProviderConfig, SessionController, SipStatus};
//!
//! let engine = Arc::new(MockEngine::new());
//! let (tx, mut rx) = event_channel();
//! let mut controller = SessionController::new(engine.clone(), tx);
//! controller.initialize(
//!     ProviderConfig::new().with_host("pbx.example.com").with_port(7443).with_user("alice"),
//! );
//!
//! engine.latest().unwrap().emit(UaEvent::Registered);
//! while let Ok(envelope) = rx.try_recv() {
//!     controller.handle(envelope);
//! }
//! assert_eq!(controller.sip_status(), SipStatus::Registered);
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::engine::{
    AnswerOptions, AudioSink, CallOptions, EngineError, EventSink, NewSessionEvent, RtcSession,
    SessionEvent, SessionId, SignalingRequest, SipEngine, TerminateOptions, UaConfiguration, UaEvent,
    UserAgent,
};
use crate::types::{CallId, Originator};

/// Request recorded by a [`MockUserAgent`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UaRequest {
    Start,
    Stop,
    Register,
    Unregister,
    Call { target: String, options: CallOptions },
    TerminateSessions,
}

/// Engine that builds [`MockUserAgent`]s
#[derive(Default)]
pub struct MockEngine {
    agents: Mutex<Vec<Arc<MockUserAgent>>>,
    create_failure: Mutex<Option<String>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `create` fail with a configuration error
    pub fn fail_next_create(&self, message: impl Into<String>) {
        *self.create_failure.lock() = Some(message.into());
    }

    /// Number of user agents built so far
    pub fn created(&self) -> usize {
        self.agents.lock().len()
    }

    /// Most recently built user agent
    pub fn latest(&self) -> Option<Arc<MockUserAgent>> {
        self.agents.lock().last().cloned()
    }
}

impl SipEngine for MockEngine {
    fn create(&self, config: UaConfiguration, sink: EventSink) -> Result<Arc<dyn UserAgent>, EngineError> {
        if let Some(message) = self.create_failure.lock().take() {
            return Err(EngineError::configuration(message));
        }

        let ua = Arc::new(MockUserAgent {
            config,
            sink,
            requests: Mutex::new(Vec::new()),
            connected: AtomicBool::new(false),
            call_failure: Mutex::new(None),
            sessions: AtomicUsize::new(0),
        });
        self.agents.lock().push(ua.clone());
        Ok(ua)
    }
}

/// Recording user agent
pub struct MockUserAgent {
    config: UaConfiguration,
    sink: EventSink,
    requests: Mutex<Vec<UaRequest>>,
    connected: AtomicBool,
    call_failure: Mutex<Option<String>>,
    sessions: AtomicUsize,
}

impl MockUserAgent {
    /// Configuration the user agent was built with
    pub fn config(&self) -> UaConfiguration {
        self.config.clone()
    }

    pub fn requests(&self) -> Vec<UaRequest> {
        self.requests.lock().clone()
    }

    /// Outgoing calls requested so far, as `(target, options)`
    pub fn calls(&self) -> Vec<(String, CallOptions)> {
        self.requests
            .lock()
            .iter()
            .filter_map(|request| match request {
                UaRequest::Call { target, options } => Some((target.clone(), options.clone())),
                _ => None,
            })
            .collect()
    }

    /// Value returned by `is_connected`
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Make the next `call` fail synchronously
    pub fn fail_next_call(&self, message: impl Into<String>) {
        *self.call_failure.lock() = Some(message.into());
    }

    pub fn emit(&self, event: UaEvent) {
        self.sink.emit(event);
    }

    pub fn emit_session(&self, session_id: &SessionId, event: SessionEvent) {
        self.sink.emit_session(session_id, event);
    }

    /// Create a session and report it as a new session event
    pub fn offer_session(&self, originator: Originator, from: &str, to: &str) -> Arc<MockSession> {
        let index = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        let session = Arc::new(MockSession {
            id: SessionId::new(format!("{}-session-{}", self.sink.generation(), index)),
            sink: self.sink.clone(),
            answers: Mutex::new(Vec::new()),
            terminations: Mutex::new(Vec::new()),
        });

        self.sink.emit(UaEvent::NewSession(NewSessionEvent {
            originator,
            session: session.clone(),
            request: SignalingRequest::new(from, to),
        }));
        session
    }

    fn record(&self, request: UaRequest) {
        self.requests.lock().push(request);
    }
}

impl UserAgent for MockUserAgent {
    fn start(&self) {
        self.record(UaRequest::Start);
    }

    fn stop(&self) {
        self.record(UaRequest::Stop);
    }

    fn register(&self) {
        self.record(UaRequest::Register);
    }

    fn unregister(&self) {
        self.record(UaRequest::Unregister);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn contact(&self) -> Option<String> {
        Some(format!("<{};transport=ws>", self.config.uri))
    }

    fn call(&self, target: &str, options: CallOptions) -> Result<(), EngineError> {
        if let Some(message) = self.call_failure.lock().take() {
            return Err(EngineError::request(message));
        }
        self.record(UaRequest::Call {
            target: target.to_string(),
            options,
        });
        Ok(())
    }

    fn terminate_sessions(&self) {
        self.record(UaRequest::TerminateSessions);
    }
}

/// Recording session
#[derive(Debug)]
pub struct MockSession {
    id: SessionId,
    sink: EventSink,
    answers: Mutex<Vec<AnswerOptions>>,
    terminations: Mutex<Vec<TerminateOptions>>,
}

impl MockSession {
    pub fn session_id(&self) -> SessionId {
        self.id.clone()
    }

    /// Report a session event, as the engine would
    pub fn emit(&self, event: SessionEvent) {
        self.sink.emit_session(&self.id, event);
    }

    pub fn answers(&self) -> Vec<AnswerOptions> {
        self.answers.lock().clone()
    }

    pub fn terminations(&self) -> Vec<TerminateOptions> {
        self.terminations.lock().clone()
    }
}

impl RtcSession for MockSession {
    fn id(&self) -> SessionId {
        self.id.clone()
    }

    fn answer(&self, options: AnswerOptions) {
        self.answers.lock().push(options);
    }

    fn terminate(&self, options: TerminateOptions) {
        self.terminations.lock().push(options);
    }
}

/// Audio sink that counts what it is asked to do
#[derive(Default)]
pub struct MockAudioSink {
    attached: Mutex<Vec<(CallId, SessionId)>>,
    plays: AtomicUsize,
}

impl MockAudioSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls whose remote audio was attached, in order
    pub fn attached(&self) -> Vec<(CallId, SessionId)> {
        self.attached.lock().clone()
    }

    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }
}

impl AudioSink for MockAudioSink {
    fn attach(&self, call_id: &CallId, session: &Arc<dyn RtcSession>) -> Result<(), String> {
        self.attached.lock().push((*call_id, session.id()));
        Ok(())
    }

    fn play(&self) -> Result<(), String> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
