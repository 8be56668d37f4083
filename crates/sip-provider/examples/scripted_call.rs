//! Scripted Call Example
//!
//! Drives a provider through a registration, an outgoing call, a rejected
//! second caller and a hangup. The SIP side is played by the in-memory mock
//! engine, so nothing touches the network.
//!
//! Run with: RUST_LOG=sip_provider=debug cargo run -p sip-provider --example scripted_call
//!
//! Pass a JSON configuration file as the first argument to use it instead of
//! the built-in one.

use std::sync::Arc;
use std::time::Duration;

use sip_provider::engine::SessionEvent;
use sip_provider::mock::{MockAudioSink, MockEngine};
use sip_provider::{Originator, ProviderConfig, ProviderEvent, SipProvider, UaEvent};
use tokio::time::sleep;
use tokio_stream::StreamExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => ProviderConfig::from_file(path)?,
        None => ProviderConfig::new()
            .with_host("pbx.example.com")
            .with_port(7443)
            .with_user("alice")
            .with_password("secret"),
    };

    let engine = Arc::new(MockEngine::new());
    let audio = Arc::new(MockAudioSink::new());
    let provider = SipProvider::builder()
        .engine(engine.clone())
        .audio_sink(audio.clone())
        .config(config)
        .build()?;

    let mut events = provider.events();
    tokio::spawn(async move {
        while let Some(Ok(event)) = events.next().await {
            match event {
                ProviderEvent::SipStatusChanged(sip) => println!("📡 SIP: {}", sip.status),
                ProviderEvent::CallStatusChanged(call) => println!(
                    "📞 Call: {} {}",
                    call.status,
                    call.counterpart.as_deref().unwrap_or("")
                ),
                ProviderEvent::IncomingCall { counterpart, .. } => println!("🔔 Incoming call from {}", counterpart),
                ProviderEvent::BusyRejected { counterpart } => println!("🚫 Busy, rejected {}", counterpart),
            }
        }
    });

    let Some(ua) = engine.latest() else {
        println!("Configuration incomplete, nothing to do");
        return Ok(());
    };

    ua.set_connected(true);
    ua.emit(UaEvent::Connecting);
    ua.emit(UaEvent::Connected);
    ua.emit(UaEvent::Registered);
    sleep(Duration::from_millis(100)).await;
    println!("Registered as {}", provider.snapshot().sip_id);

    provider.start_call("sip:bob@example.com")?;
    let session = ua.offer_session(Originator::Local, "sip:alice@pbx.example.com", "sip:bob@example.com;tag=8a2f");
    session.emit(SessionEvent::Accepted);
    sleep(Duration::from_millis(100)).await;

    let _ = ua.offer_session(Originator::Remote, "sip:carol@example.com;tag=77", "sip:alice@pbx.example.com");
    sleep(Duration::from_millis(100)).await;

    provider.stop_call()?;
    session.emit(SessionEvent::Ended {
        cause: Some("Terminated".to_string()),
    });
    sleep(Duration::from_millis(100)).await;

    println!("\n📊 Final state:\n{}", serde_json::to_string_pretty(&provider.snapshot())?);
    println!("🔊 Playback started {} time(s)", audio.plays());

    provider.shutdown();
    Ok(())
}
