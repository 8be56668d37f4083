//! Shared helpers for the scenario tests

#![allow(dead_code)]

use std::sync::Arc;

use sip_provider::engine::{event_channel, EventReceiver};
use sip_provider::mock::{MockAudioSink, MockEngine, MockUserAgent};
use sip_provider::{ProviderConfig, SessionController};

pub struct Harness {
    pub controller: SessionController,
    pub rx: EventReceiver,
    pub engine: Arc<MockEngine>,
    pub audio: Arc<MockAudioSink>,
}

impl Harness {
    pub fn new(config: ProviderConfig) -> Self {
        let engine = Arc::new(MockEngine::new());
        let audio = Arc::new(MockAudioSink::new());
        let (tx, rx) = event_channel();
        let mut controller = SessionController::new(engine.clone(), tx).with_audio_sink(audio.clone());
        controller.initialize(config);

        Self {
            controller,
            rx,
            engine,
            audio,
        }
    }

    pub fn ua(&self) -> Arc<MockUserAgent> {
        self.engine.latest().expect("no user agent was created")
    }

    /// Deliver every queued engine event to the controller
    pub fn pump(&mut self) {
        while let Ok(envelope) = self.rx.try_recv() {
            self.controller.handle(envelope);
        }
    }
}

pub fn config() -> ProviderConfig {
    ProviderConfig::new()
        .with_host("pbx.example.com")
        .with_port(7443)
        .with_user("alice")
        .with_password("secret")
}

/// Harness whose user agent already reported connecting, connected and registered
pub fn registered(config: ProviderConfig) -> Harness {
    let mut harness = Harness::new(config);
    let ua = harness.ua();
    ua.set_connected(true);
    ua.emit(sip_provider::UaEvent::Connecting);
    ua.emit(sip_provider::UaEvent::Connected);
    ua.emit(sip_provider::UaEvent::Registered);
    harness.pump();
    harness
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("sip_provider=debug")
        .with_test_writer()
        .try_init();
}
