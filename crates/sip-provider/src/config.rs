//! Provider configuration
//!
//! [`ProviderConfig`] carries everything the provider needs: the connection
//! parameters used to build the user agent and the call parameters read on
//! every call or answer.
//!
//! Only the connection parameters ([`ConnectionParams`]) force a new user
//! agent when they change. ICE servers, session timers, extra headers and the
//! auto-answer flag are picked up by the next call without reconnecting.
//!
//! # Examples
//!
//! ```rust
//! use sip_provider::config::ProviderConfig;
//!
//! let config = ProviderConfig::new()
//!     .with_host("pbx.example.com")
//!     .with_port(7443)
//!     .with_user("alice")
//!     .with_password("secret")
//!     .with_auto_answer(true);
//!
//! assert!(config.auto_register);
//! assert_eq!(config.session_timers_expires, 120);
//! assert!(config.connection_params().is_some());
//! ```
//!
//! ```rust
//! use sip_provider::config::ProviderConfig;
//!
//! let config = ProviderConfig::from_json_str(r#"{
//!     "host": "pbx.example.com",
//!     "port": 7443,
//!     "user": "alice",
//!     "extraHeaders": { "invite": ["X-Token: foo"] }
//! }"#).unwrap();
//!
//! assert_eq!(config.extra_headers.invite, vec!["X-Token: foo".to_string()]);
//! assert!(config.extra_headers.register.is_empty());
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ProviderError, ProviderResult};

/// Default `Session-Expires` value in seconds
pub const DEFAULT_SESSION_TIMERS_EXPIRES: u32 = 120;

/// ICE server entry forwarded to the engine's peer connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    /// STUN/TURN URLs (e.g. "stun:stun.l.google.com:19302")
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    /// ICE server with a single URL and no credentials
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, credential: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.credential = Some(credential.into());
        self
    }
}

/// Extra signaling headers, per request type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtraHeaders {
    /// Added to every REGISTER
    pub register: Vec<String>,
    /// Added to every outgoing INVITE
    pub invite: Vec<String>,
}

/// Provider configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProviderConfig {
    /// SIP server host, also used as the WebSocket endpoint host
    pub host: Option<String>,
    /// WebSocket endpoint port
    pub port: Option<u16>,
    /// SIP user part
    pub user: Option<String>,
    /// Digest password
    pub password: Option<String>,
    /// Register as soon as the transport connects
    pub auto_register: bool,
    /// Answer incoming calls without waiting for the application
    pub auto_answer: bool,
    /// `Session-Expires` for outgoing calls, in seconds
    pub session_timers_expires: u32,
    pub extra_headers: ExtraHeaders,
    pub ice_servers: Vec<IceServer>,
    /// Forwarded to the engine to turn on its protocol trace
    pub debug: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            user: None,
            password: None,
            auto_register: true,
            auto_answer: false,
            session_timers_expires: DEFAULT_SESSION_TIMERS_EXPIRES,
            extra_headers: ExtraHeaders::default(),
            ice_servers: Vec::new(),
            debug: false,
        }
    }
}

impl ProviderConfig {
    /// Configuration with defaults and no connection parameters
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON configuration document (camelCase keys)
    pub fn from_json_str(json: &str) -> ProviderResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> ProviderResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_auto_register(mut self, enabled: bool) -> Self {
        self.auto_register = enabled;
        self
    }

    pub fn with_auto_answer(mut self, enabled: bool) -> Self {
        self.auto_answer = enabled;
        self
    }

    pub fn with_session_timers_expires(mut self, seconds: u32) -> Self {
        self.session_timers_expires = seconds;
        self
    }

    pub fn with_extra_headers(mut self, headers: ExtraHeaders) -> Self {
        self.extra_headers = headers;
        self
    }

    pub fn with_ice_server(mut self, server: IceServer) -> Self {
        self.ice_servers.push(server);
        self
    }

    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Connection parameters, or `None` when host, port or user is missing.
    ///
    /// Empty strings count as missing.
    pub fn connection_params(&self) -> Option<ConnectionParams> {
        let host = self.host.as_deref().filter(|h| !h.trim().is_empty())?;
        let port = self.port?;
        let user = self.user.as_deref().filter(|u| !u.trim().is_empty())?;

        Some(ConnectionParams {
            host: host.trim().to_string(),
            port,
            user: user.trim().to_string(),
            password: self.password.clone(),
            auto_register: self.auto_register,
        })
    }
}

/// Subset of [`ProviderConfig`] that identifies a user agent instance
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub auto_register: bool,
}

impl ConnectionParams {
    /// Address of record, `sip:{user}@{host}`
    pub fn signaling_uri(&self) -> String {
        format!("sip:{}@{}", self.user, self.host)
    }

    /// WebSocket transport endpoint, `wss://{host}:{port}`
    pub fn transport_endpoint(&self) -> ProviderResult<Url> {
        let raw = format!("wss://{}:{}", self.host, self.port);
        Url::parse(&raw).map_err(|e| ProviderError::config(format!("invalid transport endpoint {}: {}", raw, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> ProviderConfig {
        ProviderConfig::new()
            .with_host("pbx.example.com")
            .with_port(7443)
            .with_user("alice")
            .with_password("secret")
    }

    #[test]
    fn test_defaults() {
        let config = ProviderConfig::default();
        assert!(config.auto_register);
        assert!(!config.auto_answer);
        assert!(!config.debug);
        assert_eq!(config.session_timers_expires, 120);
        assert!(config.ice_servers.is_empty());
        assert!(config.extra_headers.register.is_empty());
        assert!(config.extra_headers.invite.is_empty());
        assert!(config.connection_params().is_none());
    }

    #[test]
    fn test_missing_fields_yield_no_connection_params() {
        assert!(complete().with_host("").connection_params().is_none());
        assert!(complete().with_user("  ").connection_params().is_none());

        let mut no_port = complete();
        no_port.port = None;
        assert!(no_port.connection_params().is_none());

        let mut no_password = complete();
        no_password.password = None;
        assert!(no_password.connection_params().is_some());
    }

    #[test]
    fn test_connection_uris() {
        let params = complete().connection_params().unwrap();
        assert_eq!(params.signaling_uri(), "sip:alice@pbx.example.com");

        let endpoint = params.transport_endpoint().unwrap();
        assert_eq!(endpoint.scheme(), "wss");
        assert_eq!(endpoint.host_str(), Some("pbx.example.com"));
        assert_eq!(endpoint.port(), Some(7443));
    }

    #[test]
    fn test_invalid_host_is_a_configuration_error() {
        let params = complete().with_host("bad host").connection_params().unwrap();
        let err = params.transport_endpoint().unwrap_err();
        assert!(matches!(err, ProviderError::Configuration { .. }));
    }

    #[test]
    fn test_call_parameters_do_not_change_connection_params() {
        let base = complete();
        let tweaked = base
            .clone()
            .with_auto_answer(true)
            .with_session_timers_expires(300)
            .with_ice_server(IceServer::new("stun:stun.example.com"));
        assert_eq!(base.connection_params(), tweaked.connection_params());

        let manual = base.clone().with_auto_register(false);
        assert_ne!(base.connection_params(), manual.connection_params());
    }

    #[test]
    fn test_json_round_trip_uses_camel_case() {
        let config = complete()
            .with_auto_register(false)
            .with_ice_server(IceServer::new("turn:turn.example.com").with_credentials("u", "p"));
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["autoRegister"], false);
        assert_eq!(json["sessionTimersExpires"], 120);
        assert_eq!(json["iceServers"][0]["username"], "u");

        let parsed = ProviderConfig::from_json_str(&json.to_string()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("provider.json");
        std::fs::write(&path, r#"{"host":"h","port":5061,"user":"u","autoAnswer":true}"#).unwrap();

        let config = ProviderConfig::from_file(&path).unwrap();
        assert!(config.auto_answer);
        assert_eq!(config.port, Some(5061));

        let missing = ProviderConfig::from_file(dir.path().join("missing.json"));
        assert!(matches!(missing, Err(ProviderError::Io(_))));

        let malformed = ProviderConfig::from_json_str("{\"port\": \"x\"}");
        assert!(matches!(malformed, Err(ProviderError::ConfigParse(_))));
    }
}
