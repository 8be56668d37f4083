//! Session controller: connection lifecycle, call state machine and command guards
//!
//! [`SessionController`] owns at most one user agent and at most one call
//! session. Engine events arrive through [`SessionController::handle`] and are
//! folded into state; commands are checked against the current state before
//! they reach the engine.
//!
//! ```text
//!            start_call / remote offer
//!   Idle ─────────────────────────────▶ Starting ──accepted──▶ Active
//!    ▲                                     │                     │
//!    │              failed / ended         │                 stop_call
//!    ├─────────────────────────────────────┘                     ▼
//!    └─────────────────── failed / ended ──────────────────── Stopping
//! ```
//!
//! Every user agent is created with an [`EventSink`] stamped with the current
//! [`Generation`]. Reinitializing moves to the next generation, so events that
//! a replaced user agent emits afterwards are discarded on arrival.
//!
//! The controller is a plain `&mut self` state machine. [`crate::SipProvider`]
//! wraps it for use from async code and other threads.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::call::{CallSlot, CallState};
use crate::config::{ConnectionParams, ProviderConfig};
use crate::engine::{
    AnswerOptions, AudioSink, CallOptions, EngineEnvelope, EngineError, EngineEvent, EventSender,
    EventSink, Generation, MediaConstraints, NewSessionEvent, SessionEvent, SessionId, SipEngine,
    TerminateOptions, UaConfiguration, UaEvent, UserAgent,
};
use crate::error::{ProviderError, ProviderResult};
use crate::events::{EventEmitter, EventStream, ProviderEvent};
use crate::types::{
    parse_counterpart, sip_id_from_contact, CallDirection, CallStatus, ErrorLogEntry,
    ProviderSnapshot, SipError, SipErrorType, SipSnapshot, SipStatus,
};

/// Number of entries kept in the connection error log
pub const ERROR_LOG_CAPACITY: usize = 100;

/// Delay before playback is started a second time after a call is accepted
pub const PLAYBACK_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Connection and call state machine over one engine
pub struct SessionController {
    engine: Arc<dyn SipEngine>,
    audio: Option<Arc<dyn AudioSink>>,
    sender: EventSender,
    emitter: EventEmitter,

    config: ProviderConfig,
    params: Option<ConnectionParams>,
    generation: Generation,
    ua: Option<Arc<dyn UserAgent>>,

    sip_status: SipStatus,
    sip_error: Option<SipError>,
    call: CallState,
    /// Pending playback restart for the active call
    playback_retry: Option<JoinHandle<()>>,
    error_log: VecDeque<ErrorLogEntry>,
}

impl SessionController {
    /// Create a disconnected controller.
    ///
    /// User agents built by `engine` report their events into `sender`; the
    /// owner of the matching receiver feeds them back through [`Self::handle`].
    pub fn new(engine: Arc<dyn SipEngine>, sender: EventSender) -> Self {
        Self {
            engine,
            audio: None,
            sender,
            emitter: EventEmitter::default(),
            config: ProviderConfig::default(),
            params: None,
            generation: Generation::default(),
            ua: None,
            sip_status: SipStatus::Disconnected,
            sip_error: None,
            call: CallState::Idle,
            playback_retry: None,
            error_log: VecDeque::new(),
        }
    }

    /// Route remote audio of accepted calls to `sink`
    pub fn with_audio_sink(mut self, sink: Arc<dyn AudioSink>) -> Self {
        self.audio = Some(sink);
        self
    }

    /// Publish state changes through `emitter`
    pub fn with_emitter(mut self, emitter: EventEmitter) -> Self {
        self.emitter = emitter;
        self
    }

    // ===== CONNECTION LIFECYCLE =====

    /// Replace the user agent with one built from `config`.
    ///
    /// The previous user agent, if any, is stopped first. Incomplete connection
    /// parameters leave the controller disconnected without an error; a
    /// configuration the engine rejects moves it to the configuration error
    /// state. Returns the generation of the new user agent.
    pub fn initialize(&mut self, config: ProviderConfig) -> Generation {
        self.teardown("reinitializing");

        self.config = config;
        self.params = self.config.connection_params();

        let Some(params) = self.params.clone() else {
            info!("Connection parameters incomplete, staying disconnected");
            return self.generation;
        };

        let endpoint = match params.transport_endpoint() {
            Ok(endpoint) => endpoint,
            Err(ProviderError::Configuration { message }) => {
                self.fail(SipErrorType::Configuration, message);
                return self.generation;
            }
            Err(e) => {
                self.fail(SipErrorType::Configuration, e.to_string());
                return self.generation;
            }
        };

        let ua_config = UaConfiguration {
            uri: params.signaling_uri(),
            sockets: vec![endpoint],
            password: params.password.clone(),
            register: params.auto_register,
            register_extra_headers: self.config.extra_headers.register.clone(),
            debug: self.config.debug,
        };
        let sink = EventSink::new(self.generation, self.sender.clone());

        match self.engine.create(ua_config, sink) {
            Ok(ua) => {
                info!(
                    "Starting user agent {} for {} (auto-register: {}, debug: {})",
                    self.generation,
                    params.signaling_uri(),
                    params.auto_register,
                    self.config.debug
                );
                ua.start();
                self.ua = Some(ua);
            }
            Err(e) => {
                let message = match e {
                    EngineError::Configuration(message) => message,
                    other => other.to_string(),
                };
                self.fail(SipErrorType::Configuration, message);
            }
        }

        self.generation
    }

    /// Apply a new configuration.
    ///
    /// The user agent is rebuilt only when the connection parameters changed;
    /// call parameters are simply stored and used by the next call or answer.
    /// Returns whether the user agent was replaced.
    pub fn reconfigure(&mut self, config: ProviderConfig) -> bool {
        if config.connection_params() == self.params {
            debug!("Connection parameters unchanged, keeping user agent {}", self.generation);
            self.config = config;
            return false;
        }

        self.initialize(config);
        true
    }

    /// Stop the user agent and return to the disconnected, idle state
    pub fn shutdown(&mut self) {
        self.teardown("shutting down");
        self.params = None;
    }

    fn teardown(&mut self, reason: &str) {
        self.abandon_call(reason);

        if let Some(ua) = self.ua.take() {
            info!("Stopping user agent {} ({})", self.generation, reason);
            ua.stop();
        }

        self.generation = self.generation.next();
        self.set_connection(SipStatus::Disconnected, None);
    }

    // ===== COMMANDS =====

    /// Register with the registrar. Only allowed with auto-registration off.
    pub fn register_sip(&mut self) -> ProviderResult<()> {
        if self.config.auto_register {
            return Err(ProviderError::invalid_state(
                "registration is managed automatically (auto_register is enabled)",
            ));
        }
        if self.sip_status != SipStatus::Connected {
            return Err(ProviderError::invalid_state(format!(
                "cannot register while {}",
                self.sip_status
            )));
        }

        let ua = self.require_ua()?;
        debug!("Registering user agent {}", self.generation);
        ua.register();
        Ok(())
    }

    /// Remove the registration. Only allowed with auto-registration off.
    pub fn unregister_sip(&mut self) -> ProviderResult<()> {
        if self.config.auto_register {
            return Err(ProviderError::invalid_state(
                "registration is managed automatically (auto_register is enabled)",
            ));
        }
        if self.sip_status != SipStatus::Registered {
            return Err(ProviderError::invalid_state(format!(
                "cannot unregister while {}",
                self.sip_status
            )));
        }

        let ua = self.require_ua()?;
        debug!("Unregistering user agent {}", self.generation);
        ua.unregister();
        Ok(())
    }

    /// Place an outgoing call with the configured INVITE headers
    pub fn start_call(&mut self, destination: &str) -> ProviderResult<()> {
        self.start_call_with_headers(destination, Vec::new())
    }

    /// Place an outgoing call, appending `extra_headers` to the configured ones.
    ///
    /// The call moves to starting right away; direction and counterpart appear
    /// once the engine reports the new session.
    pub fn start_call_with_headers(&mut self, destination: &str, extra_headers: Vec<String>) -> ProviderResult<()> {
        if !self.sip_status.can_place_calls() {
            return Err(ProviderError::invalid_state(format!(
                "cannot start a call while {}",
                self.sip_status
            )));
        }
        if !self.call.is_idle() {
            return Err(ProviderError::invalid_state(format!(
                "cannot start a call while {}",
                self.call.status()
            )));
        }

        let destination = destination.trim();
        if destination.is_empty() {
            return Err(ProviderError::invalid_argument("call destination is empty"));
        }

        let ua = self.require_ua()?;

        let mut headers = self.config.extra_headers.invite.clone();
        headers.extend(extra_headers);
        let options = CallOptions {
            media_constraints: MediaConstraints::audio_only(),
            ice_servers: self.config.ice_servers.clone(),
            extra_headers: headers,
            session_timers_expires: Some(self.config.session_timers_expires),
        };

        self.update_call(|_| CallState::Starting { slot: None });

        if let Err(e) = ua.call(destination, options) {
            warn!("Engine refused call to {}: {}", destination, e);
            self.update_call(|_| CallState::Idle);
            return Err(e.into());
        }

        info!("Calling {}", destination);
        Ok(())
    }

    /// Answer the pending incoming call.
    ///
    /// The call becomes active when the engine reports the session accepted.
    pub fn answer_call(&mut self) -> ProviderResult<()> {
        let slot = match self.call.slot() {
            Some(slot) if self.call.is_answerable() => slot,
            _ => {
                return Err(ProviderError::invalid_state(format!(
                    "no incoming call to answer ({})",
                    self.call.status()
                )));
            }
        };

        info!("Answering call {} from {}", slot.id, slot.counterpart);
        slot.session.answer(AnswerOptions {
            media_constraints: MediaConstraints::audio_only(),
            ice_servers: self.config.ice_servers.clone(),
        });
        Ok(())
    }

    /// Hang up: move to stopping and ask the engine to end all sessions
    pub fn stop_call(&mut self) -> ProviderResult<()> {
        let ua = self.require_ua()?;
        if self.call.is_idle() {
            return Err(ProviderError::invalid_state("no call to stop"));
        }

        info!("Stopping call ({})", self.call.status());
        self.update_call(|call| CallState::Stopping {
            slot: call.into_slot(),
        });
        ua.terminate_sessions();
        Ok(())
    }

    fn require_ua(&self) -> ProviderResult<Arc<dyn UserAgent>> {
        self.ua
            .clone()
            .ok_or_else(|| ProviderError::invalid_state("no user agent is running"))
    }

    // ===== EVENT RECONCILIATION =====

    /// Apply one engine event. Events from a replaced user agent are dropped.
    pub fn handle(&mut self, envelope: EngineEnvelope) {
        if envelope.generation != self.generation {
            debug!(
                "Discarding {} from stale user agent {} (current {})",
                event_name(&envelope.event),
                envelope.generation,
                self.generation
            );
            return;
        }

        match envelope.event {
            EngineEvent::Agent(event) => self.handle_ua_event(event),
            EngineEvent::Session { session_id, event } => self.handle_session_event(session_id, event),
        }
    }

    fn handle_ua_event(&mut self, event: UaEvent) {
        debug!("User agent {} event: {}", self.generation, event.name());

        match event {
            UaEvent::Connecting => self.set_connection(SipStatus::Connecting, None),
            UaEvent::Connected => self.set_connection(SipStatus::Connected, None),
            UaEvent::Disconnected => {
                self.abandon_call("transport disconnected");
                self.fail(SipErrorType::Connection, "disconnected");
            }
            UaEvent::Registered => {
                self.set_connection(SipStatus::Registered, None);
                if !self.call.has_session() {
                    self.update_call(|_| CallState::Idle);
                }
            }
            UaEvent::Unregistered => {
                let connected = self.ua.as_ref().is_some_and(|ua| ua.is_connected());
                self.abandon_call("unregistered");
                let status = if connected {
                    SipStatus::Connected
                } else {
                    SipStatus::Disconnected
                };
                self.set_connection(status, None);
            }
            UaEvent::RegistrationFailed { cause } => {
                self.abandon_call("registration failed");
                self.fail(SipErrorType::Registration, cause);
            }
            UaEvent::NewSession(event) => self.handle_new_session(event),
        }
    }

    fn handle_new_session(&mut self, event: NewSessionEvent) {
        let direction = event.originator.direction();
        let address = match direction {
            CallDirection::Outgoing => &event.request.to,
            CallDirection::Incoming => &event.request.from,
        };
        let counterpart = parse_counterpart(address).to_string();

        if self.call.has_session() {
            warn!(
                "Rejecting {:?} session {} from {}: 486 Busy Here, a call is already in progress",
                direction,
                event.session.id(),
                counterpart
            );
            event.session.terminate(TerminateOptions::busy());
            self.emitter.emit(ProviderEvent::BusyRejected { counterpart });
            return;
        }

        let slot = CallSlot::new(event.session, direction, counterpart.clone());
        let call_id = slot.id;

        if matches!(self.call, CallState::Stopping { .. }) {
            // Hung up before the engine reported the outgoing session
            info!("Session {} reported after local hangup, terminating", slot.session.id());
            let session = slot.session.clone();
            self.update_call(|_| CallState::Stopping { slot: Some(slot) });
            session.terminate(TerminateOptions::default());
            return;
        }

        self.update_call(|_| CallState::Starting { slot: Some(slot) });

        match direction {
            CallDirection::Outgoing => info!("Outgoing call {} to {}", call_id, counterpart),
            CallDirection::Incoming => {
                info!("Incoming call {} from {}", call_id, counterpart);
                self.emitter.emit(ProviderEvent::IncomingCall {
                    call_id,
                    counterpart,
                });

                if self.config.auto_answer {
                    if let Err(e) = self.answer_call() {
                        warn!("Auto-answer failed for call {}: {}", call_id, e);
                    }
                }
            }
        }
    }

    fn handle_session_event(&mut self, session_id: SessionId, event: SessionEvent) {
        let held = self.call.slot().is_some_and(|slot| slot.owns(&session_id));
        if !held {
            debug!("Ignoring {} for session {}: not the held session", event.name(), session_id);
            return;
        }

        let name = event.name();
        match event {
            SessionEvent::Failed { cause } | SessionEvent::Ended { cause } => {
                info!("Session {} {}: {}", session_id, name, cause.as_deref().unwrap_or("no cause"));
                self.update_call(|_| CallState::Idle);
            }
            SessionEvent::Accepted => self.on_session_accepted(),
        }
    }

    fn on_session_accepted(&mut self) {
        let slot = match &self.call {
            CallState::Starting { slot: Some(slot) } => slot.clone(),
            other => {
                debug!("Ignoring accepted session while {}", other.status());
                return;
            }
        };

        self.start_playback(&slot);
        info!("Call {} with {} is active", slot.id, slot.counterpart);
        self.update_call(|_| CallState::Active { slot });
    }

    fn start_playback(&mut self, slot: &CallSlot) {
        let Some(sink) = self.audio.clone() else {
            return;
        };

        if let Err(e) = sink.attach(&slot.id, &slot.session) {
            warn!("Failed to attach remote audio for call {}: {}", slot.id, e);
            return;
        }
        if let Err(e) = sink.play() {
            warn!("Playback failed for call {}: {}", slot.id, e);
        }

        // Playback may stall silently on some outputs; start it once more later
        let call_id = slot.id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                self.playback_retry = Some(handle.spawn(async move {
                    tokio::time::sleep(PLAYBACK_RETRY_DELAY).await;
                    if let Err(e) = sink.play() {
                        warn!("Playback retry failed for call {}: {}", call_id, e);
                    }
                }));
            }
            Err(_) => debug!("No async runtime, skipping playback retry for call {}", call_id),
        }
    }

    // ===== STATE UPDATES =====

    fn set_connection(&mut self, status: SipStatus, error: Option<SipError>) {
        let error = if status == SipStatus::Error { error } else { None };
        if self.sip_status == status && self.sip_error == error {
            return;
        }

        if self.sip_status != status {
            info!("SIP status {} -> {}", self.sip_status, status);
        }
        self.sip_status = status;
        self.sip_error = error;
        self.emitter.emit(ProviderEvent::SipStatusChanged(self.sip_snapshot()));
    }

    fn fail(&mut self, kind: SipErrorType, message: impl Into<String>) {
        let message = message.into();
        warn!("{:?} error: {}", kind, message);

        if self.error_log.len() == ERROR_LOG_CAPACITY {
            self.error_log.pop_front();
        }
        self.error_log.push_back(ErrorLogEntry {
            kind,
            message: message.clone(),
            time: Utc::now(),
        });

        self.set_connection(SipStatus::Error, Some(SipError { kind, message }));
    }

    fn update_call(&mut self, transition: impl FnOnce(CallState) -> CallState) {
        let before = self.call.snapshot();
        let current = std::mem::take(&mut self.call);
        self.call = transition(current);

        if !matches!(self.call, CallState::Active { .. }) {
            if let Some(retry) = self.playback_retry.take() {
                retry.abort();
            }
        }

        let after = self.call.snapshot();
        if before != after {
            debug!("Call status {} -> {}", before.status, after.status);
            self.emitter.emit(ProviderEvent::CallStatusChanged(after));
        }
    }

    /// Terminate the held session, if any, and go idle
    fn abandon_call(&mut self, reason: &str) {
        if let Some(slot) = self.call.slot() {
            info!("Terminating call {} ({})", slot.id, reason);
            slot.session.terminate(TerminateOptions::default());
        }
        self.update_call(|_| CallState::Idle);
    }

    // ===== QUERIES =====

    pub fn snapshot(&self) -> ProviderSnapshot {
        ProviderSnapshot {
            sip: self.sip_snapshot(),
            call: self.call.snapshot(),
            sip_id: self.sip_id(),
            session_exists: self.call.has_session(),
            session_active: matches!(self.call, CallState::Active { .. }),
        }
    }

    pub fn sip_snapshot(&self) -> SipSnapshot {
        SipSnapshot {
            status: self.sip_status,
            error_type: self.sip_error.as_ref().map(|e| e.kind),
            error_message: self.sip_error.as_ref().map(|e| e.message.clone()),
        }
    }

    pub fn sip_status(&self) -> SipStatus {
        self.sip_status
    }

    pub fn sip_error(&self) -> Option<&SipError> {
        self.sip_error.as_ref()
    }

    pub fn call_status(&self) -> CallStatus {
        self.call.status()
    }

    pub fn call_state(&self) -> &CallState {
        &self.call
    }

    /// `user@host` from the running user agent's contact, empty if unknown
    pub fn sip_id(&self) -> String {
        self.ua
            .as_ref()
            .and_then(|ua| ua.contact())
            .and_then(|contact| sip_id_from_contact(&contact).map(str::to_string))
            .unwrap_or_default()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn has_user_agent(&self) -> bool {
        self.ua.is_some()
    }

    /// Connection errors seen so far, oldest first
    pub fn error_log(&self) -> Vec<ErrorLogEntry> {
        self.error_log.iter().cloned().collect()
    }

    pub fn subscribe(&self) -> EventStream {
        self.emitter.subscribe()
    }

    pub fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(retry) = self.playback_retry.take() {
            retry.abort();
        }
        if let Some(ua) = self.ua.take() {
            ua.stop();
        }
    }
}

fn event_name(event: &EngineEvent) -> &'static str {
    match event {
        EngineEvent::Agent(event) => event.name(),
        EngineEvent::Session { event, .. } => event.name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{event_channel, EventReceiver};
    use crate::mock::{MockEngine, UaRequest};
    use crate::types::Originator;
    use tracing_test::traced_test;

    fn config() -> ProviderConfig {
        ProviderConfig::new()
            .with_host("pbx.example.com")
            .with_port(7443)
            .with_user("alice")
            .with_password("secret")
    }

    fn setup(config: ProviderConfig) -> (SessionController, EventReceiver, Arc<MockEngine>) {
        let engine = Arc::new(MockEngine::new());
        let (tx, rx) = event_channel();
        let mut controller = SessionController::new(engine.clone(), tx);
        controller.initialize(config);
        (controller, rx, engine)
    }

    fn pump(controller: &mut SessionController, rx: &mut EventReceiver) {
        while let Ok(envelope) = rx.try_recv() {
            controller.handle(envelope);
        }
    }

    #[test]
    fn test_initialize_starts_user_agent() {
        let (controller, _rx, engine) = setup(config());
        let ua = engine.latest().unwrap();

        assert_eq!(ua.config().uri, "sip:alice@pbx.example.com");
        assert_eq!(ua.config().sockets[0].as_str(), "wss://pbx.example.com:7443/");
        assert!(ua.config().register);
        assert_eq!(ua.requests(), vec![UaRequest::Start]);
        assert_eq!(controller.sip_status(), SipStatus::Disconnected);
        assert!(controller.sip_error().is_none());
    }

    #[test]
    fn test_incomplete_parameters_are_quiescent() {
        let (controller, _rx, engine) = setup(ProviderConfig::new().with_host("pbx.example.com"));

        assert_eq!(engine.created(), 0);
        assert_eq!(controller.sip_status(), SipStatus::Disconnected);
        assert!(controller.sip_error().is_none());
        assert!(!controller.has_user_agent());
    }

    #[test]
    fn test_engine_rejection_is_a_configuration_error() {
        let engine = Arc::new(MockEngine::new());
        engine.fail_next_create("invalid URI");
        let (tx, _rx) = event_channel();
        let mut controller = SessionController::new(engine.clone(), tx);
        controller.initialize(config());

        let snapshot = controller.sip_snapshot();
        assert_eq!(snapshot.status, SipStatus::Error);
        assert_eq!(snapshot.error_type, Some(SipErrorType::Configuration));
        assert_eq!(snapshot.error_message.as_deref(), Some("invalid URI"));
        assert_eq!(controller.error_log().len(), 1);
    }

    #[test]
    fn test_connection_errors_are_cleared_on_reconnect() {
        let (mut controller, mut rx, engine) = setup(config());
        let ua = engine.latest().unwrap();

        ua.emit(UaEvent::Disconnected);
        pump(&mut controller, &mut rx);
        assert_eq!(controller.sip_error().map(|e| e.kind), Some(SipErrorType::Connection));
        assert_eq!(controller.sip_error().map(|e| e.message.as_str()), Some("disconnected"));

        ua.emit(UaEvent::Connecting);
        pump(&mut controller, &mut rx);
        assert_eq!(controller.sip_status(), SipStatus::Connecting);
        assert!(controller.sip_error().is_none());
    }

    #[test]
    fn test_unregistered_falls_back_on_transport_state() {
        let (mut controller, mut rx, engine) = setup(config().with_auto_register(false));
        let ua = engine.latest().unwrap();

        ua.set_connected(true);
        ua.emit(UaEvent::Connected);
        ua.emit(UaEvent::Registered);
        ua.emit(UaEvent::Unregistered);
        pump(&mut controller, &mut rx);
        assert_eq!(controller.sip_status(), SipStatus::Connected);

        ua.set_connected(false);
        ua.emit(UaEvent::Registered);
        ua.emit(UaEvent::Unregistered);
        pump(&mut controller, &mut rx);
        assert_eq!(controller.sip_status(), SipStatus::Disconnected);
    }

    #[test]
    fn test_session_events_for_other_sessions_are_ignored() {
        let (mut controller, mut rx, engine) = setup(config());
        let ua = engine.latest().unwrap();
        ua.emit(UaEvent::Connected);
        let session = ua.offer_session(Originator::Remote, "sip:bob@example.com;tag=1", "sip:alice@pbx.example.com");
        pump(&mut controller, &mut rx);

        ua.emit_session(&crate::engine::SessionId::new("other"), SessionEvent::Ended { cause: None });
        pump(&mut controller, &mut rx);
        assert_eq!(controller.call_status(), CallStatus::Starting);

        session.emit(SessionEvent::Ended { cause: Some("Canceled".to_string()) });
        pump(&mut controller, &mut rx);
        assert_eq!(controller.call_status(), CallStatus::Idle);
    }

    #[test]
    fn test_registered_keeps_held_session() {
        let (mut controller, mut rx, engine) = setup(config());
        let ua = engine.latest().unwrap();
        ua.emit(UaEvent::Registered);
        let session = ua.offer_session(Originator::Remote, "sip:bob@example.com", "sip:alice@pbx.example.com");
        session.emit(SessionEvent::Accepted);
        ua.emit(UaEvent::Registered);
        pump(&mut controller, &mut rx);

        assert_eq!(controller.call_status(), CallStatus::Active);
        assert!(controller.snapshot().session_active);
    }

    #[test]
    fn test_registration_failure_abandons_call() {
        let (mut controller, mut rx, engine) = setup(config());
        let ua = engine.latest().unwrap();
        ua.emit(UaEvent::Registered);
        let session = ua.offer_session(Originator::Remote, "sip:bob@example.com", "sip:alice@pbx.example.com");
        ua.emit(UaEvent::RegistrationFailed {
            cause: "Request Timeout".to_string(),
        });
        pump(&mut controller, &mut rx);

        assert_eq!(controller.sip_status(), SipStatus::Error);
        assert_eq!(controller.sip_error().map(|e| e.message.as_str()), Some("Request Timeout"));
        assert_eq!(controller.call_status(), CallStatus::Idle);
        assert_eq!(session.terminations(), vec![TerminateOptions::default()]);
    }

    #[test]
    fn test_error_log_is_bounded() {
        let (mut controller, mut rx, engine) = setup(config());
        let ua = engine.latest().unwrap();
        for i in 0..(ERROR_LOG_CAPACITY + 5) {
            ua.emit(UaEvent::RegistrationFailed { cause: format!("cause {}", i) });
        }
        pump(&mut controller, &mut rx);

        let log = controller.error_log();
        assert_eq!(log.len(), ERROR_LOG_CAPACITY);
        assert_eq!(log[0].message, "cause 5");
        assert!(log.iter().all(|entry| entry.kind == SipErrorType::Registration));
    }

    #[test]
    fn test_sip_id_from_user_agent_contact() {
        let (controller, _rx, _engine) = setup(config());
        assert_eq!(controller.snapshot().sip_id, "alice@pbx.example.com");

        let (quiet, _rx, _engine) = setup(ProviderConfig::new());
        assert_eq!(quiet.snapshot().sip_id, "");
    }

    #[test]
    fn test_engine_refusing_call_rolls_back() {
        let (mut controller, mut rx, engine) = setup(config());
        let ua = engine.latest().unwrap();
        ua.emit(UaEvent::Registered);
        pump(&mut controller, &mut rx);

        ua.fail_next_call("Invalid target");
        let err = controller.start_call("not a uri").unwrap_err();
        assert!(matches!(err, ProviderError::Engine(EngineError::Request(_))));
        assert_eq!(controller.call_status(), CallStatus::Idle);
    }

    #[test]
    fn test_stop_call_guards() {
        let (mut quiet, _rx, _engine) = setup(ProviderConfig::new());
        assert!(matches!(quiet.stop_call(), Err(ProviderError::InvalidState { .. })));

        let (mut controller, _rx, engine) = setup(config());
        assert!(matches!(controller.stop_call(), Err(ProviderError::InvalidState { .. })));
        assert!(!engine.latest().unwrap().requests().contains(&UaRequest::TerminateSessions));
    }

    #[test]
    fn test_hangup_before_session_is_reported() {
        let (mut controller, mut rx, engine) = setup(config());
        let ua = engine.latest().unwrap();
        ua.emit(UaEvent::Registered);
        pump(&mut controller, &mut rx);

        controller.start_call("sip:bob@example.com").unwrap();
        controller.stop_call().unwrap();
        assert_eq!(controller.call_status(), CallStatus::Stopping);

        let session = ua.offer_session(Originator::Local, "sip:alice@pbx.example.com", "sip:bob@example.com");
        pump(&mut controller, &mut rx);
        assert_eq!(controller.call_status(), CallStatus::Stopping);
        assert_eq!(session.terminations(), vec![TerminateOptions::default()]);

        session.emit(SessionEvent::Failed { cause: Some("Canceled".to_string()) });
        pump(&mut controller, &mut rx);
        assert_eq!(controller.call_status(), CallStatus::Idle);
        assert!(controller.snapshot().call.direction.is_none());
    }

    #[test]
    fn test_shutdown_stops_user_agent() {
        let (mut controller, mut rx, engine) = setup(config());
        let ua = engine.latest().unwrap();
        ua.emit(UaEvent::Registered);
        pump(&mut controller, &mut rx);

        controller.shutdown();
        assert!(ua.requests().contains(&UaRequest::Stop));
        assert_eq!(controller.sip_status(), SipStatus::Disconnected);
        assert!(!controller.has_user_agent());

        ua.emit(UaEvent::Registered);
        pump(&mut controller, &mut rx);
        assert_eq!(controller.sip_status(), SipStatus::Disconnected);
    }

    #[test]
    #[traced_test]
    fn test_stale_events_are_logged_and_dropped() {
        let (mut controller, mut rx, engine) = setup(config());
        let old = engine.latest().unwrap();

        controller.initialize(config().with_user("bob"));
        old.emit(UaEvent::Registered);
        pump(&mut controller, &mut rx);

        assert_eq!(controller.sip_status(), SipStatus::Disconnected);
        assert!(logs_contain("Discarding registered from stale user agent"));
    }
}
