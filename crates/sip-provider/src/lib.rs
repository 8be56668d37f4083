//! # SIP Provider
//!
//! Connection, registration and single-call state machine for a SIP user
//! agent. The SIP/WebRTC work itself (transport, SIP messages, SDP, ICE,
//! media) belongs to an engine plugged in through the [`engine`] traits; this
//! crate tracks what the engine reports and decides which commands are legal.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sip_provider::{ProviderConfig, SipProvider};
//! # use sip_provider::mock::MockEngine;
//! # fn engine() -> Arc<MockEngine> { Arc::new(MockEngine::new()) }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ProviderConfig::from_file("provider.json")?;
//!     let provider = SipProvider::builder().engine(engine()).config(config).build()?;
//!
//!     // ... once the snapshot reports sipStatus/REGISTERED
//!     provider.start_call("sip:bob@example.com")?;
//!     Ok(())
//! }
//! ```
//!
//! ## State
//!
//! - **Connection**: `Disconnected`, `Connecting`, `Connected`, `Registered`
//!   or `Error` with a [`SipErrorType`] and message.
//! - **Call**: `Idle`, `Starting`, `Active` or `Stopping`, plus direction and
//!   counterpart while a session is held. Only one session is held at a time;
//!   any other is rejected with `486 Busy Here`.
//!
//! Engine failures end up in the connection state. Commands issued in the
//! wrong state fail with [`ProviderError::InvalidState`].

pub mod call;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod events;
pub mod mock;
pub mod provider;
pub mod types;

pub use call::{CallSlot, CallState};
pub use config::{ExtraHeaders, IceServer, ProviderConfig};
pub use controller::SessionController;
pub use engine::{
    AudioSink, EngineError, EngineEvent, Generation, RtcSession, SessionEvent, SipEngine, UaEvent,
    UserAgent,
};
pub use error::{ProviderError, ProviderResult};
pub use events::{EventStream, ProviderEvent};
pub use provider::{SipProvider, SipProviderBuilder};
pub use types::{
    CallDirection, CallId, CallSnapshot, CallStatus, ErrorLogEntry, Originator, ProviderSnapshot,
    SipErrorType, SipSnapshot, SipStatus,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
