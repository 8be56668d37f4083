//! Thread-safe provider running the controller on a tokio task
//!
//! [`SipProvider`] owns a [`SessionController`] behind a mutex and a task that
//! feeds it engine events as they arrive. Commands and snapshots take the same
//! lock, so engine callbacks may come from any thread.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sip_provider::mock::MockEngine;
//! use sip_provider::{ProviderConfig, SipProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = SipProvider::builder()
//!         .engine(Arc::new(MockEngine::new()))
//!         .config(
//!             ProviderConfig::new()
//!                 .with_host("pbx.example.com")
//!                 .with_port(7443)
//!                 .with_user("alice"),
//!         )
//!         .build()?;
//!
//!     println!("{:?}", provider.snapshot().sip.status);
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::controller::SessionController;
use crate::engine::{event_channel, AudioSink, EventReceiver, Generation, SipEngine};
use crate::error::{ProviderError, ProviderResult};
use crate::events::{EventEmitter, EventStream};
use crate::types::{ErrorLogEntry, ProviderSnapshot};

/// Builder for [`SipProvider`]
pub struct SipProviderBuilder {
    config: ProviderConfig,
    engine: Option<Arc<dyn SipEngine>>,
    audio: Option<Arc<dyn AudioSink>>,
    event_capacity: usize,
}

impl SipProviderBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: ProviderConfig::default(),
            engine: None,
            audio: None,
            event_capacity: 256,
        }
    }

    /// Set the provider configuration
    pub fn config(mut self, config: ProviderConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the engine (required)
    pub fn engine(mut self, engine: Arc<dyn SipEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Route remote audio of accepted calls to `sink`
    pub fn audio_sink(mut self, sink: Arc<dyn AudioSink>) -> Self {
        self.audio = Some(sink);
        self
    }

    /// Capacity of the application event channel
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Build the provider and connect. Fails outside a tokio runtime.
    pub fn build(self) -> ProviderResult<SipProvider> {
        let engine = self
            .engine
            .ok_or_else(|| ProviderError::config("an engine is required"))?;
        if self.event_capacity == 0 {
            return Err(ProviderError::config("event capacity must be greater than zero"));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| ProviderError::config("build() requires a tokio runtime"))?;

        let (sender, receiver) = event_channel();
        let emitter = EventEmitter::new(self.event_capacity);

        let mut controller = SessionController::new(engine, sender).with_emitter(emitter.clone());
        if let Some(audio) = self.audio {
            controller = controller.with_audio_sink(audio);
        }
        controller.initialize(self.config);

        let controller = Arc::new(Mutex::new(controller));
        let pump = runtime.spawn(pump_events(controller.clone(), receiver));

        Ok(SipProvider {
            controller,
            emitter,
            pump,
        })
    }
}

impl Default for SipProviderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

async fn pump_events(controller: Arc<Mutex<SessionController>>, mut receiver: EventReceiver) {
    while let Some(envelope) = receiver.recv().await {
        controller.lock().handle(envelope);
    }
    debug!("Engine event channel closed");
}

/// SIP provider handle shared with the application
pub struct SipProvider {
    controller: Arc<Mutex<SessionController>>,
    emitter: EventEmitter,
    pump: JoinHandle<()>,
}

impl SipProvider {
    pub fn builder() -> SipProviderBuilder {
        SipProviderBuilder::new()
    }

    /// Current connection and call state
    pub fn snapshot(&self) -> ProviderSnapshot {
        self.controller.lock().snapshot()
    }

    /// Stream of state change events
    pub fn events(&self) -> EventStream {
        self.emitter.subscribe()
    }

    pub fn error_log(&self) -> Vec<ErrorLogEntry> {
        self.controller.lock().error_log()
    }

    pub fn config(&self) -> ProviderConfig {
        self.controller.lock().config().clone()
    }

    /// Apply a new configuration; see [`SessionController::reconfigure`]
    pub fn reconfigure(&self, config: ProviderConfig) -> bool {
        self.controller.lock().reconfigure(config)
    }

    /// Rebuild the user agent unconditionally
    pub fn reinitialize(&self, config: ProviderConfig) -> Generation {
        self.controller.lock().initialize(config)
    }

    pub fn register_sip(&self) -> ProviderResult<()> {
        self.controller.lock().register_sip()
    }

    pub fn unregister_sip(&self) -> ProviderResult<()> {
        self.controller.lock().unregister_sip()
    }

    pub fn start_call(&self, destination: &str) -> ProviderResult<()> {
        self.controller.lock().start_call(destination)
    }

    pub fn start_call_with_headers(&self, destination: &str, extra_headers: Vec<String>) -> ProviderResult<()> {
        self.controller.lock().start_call_with_headers(destination, extra_headers)
    }

    pub fn answer_call(&self) -> ProviderResult<()> {
        self.controller.lock().answer_call()
    }

    pub fn stop_call(&self) -> ProviderResult<()> {
        self.controller.lock().stop_call()
    }

    /// Stop the user agent; the provider stays usable through `reinitialize`
    pub fn shutdown(&self) {
        self.controller.lock().shutdown();
    }
}

impl Drop for SipProvider {
    fn drop(&mut self) {
        self.pump.abort();
        self.controller.lock().shutdown();
    }
}
