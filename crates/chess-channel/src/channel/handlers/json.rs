//! JSON envelope protocol with configurable field names.
//!
//! Inbound frames look like `{"t": "redirect", "d": {...}, "v": 12}`, outbound
//! commands like `{"t": "cancel", "d": "hookId"}`. The heartbeat ping is
//! `{"t": "p", "v": <version>}`; the server answers with a bare `0` or with a
//! peer-count envelope `{"t": "n", "d": <count>}`.

use serde_json::{Map, Value};

use crate::{
    channel::{
        protocol::{ChannelProtocol, WsMessage},
        types::{Command, Envelope},
    },
    error::ChannelResult,
};

/// Configuration for the JSON envelope protocol.
#[derive(Clone, Debug)]
pub struct JsonEnvelopeConfig {
    /// Field name for the event type.
    pub type_field: String,
    /// Field name for the payload.
    pub payload_field: String,
    /// Field name for the version.
    pub version_field: String,
    /// Event type of the heartbeat ping.
    pub ping_type: String,
    /// Event type that answers a ping and carries the peer count.
    pub pong_type: String,
    /// Bare text frame that answers a ping.
    pub bare_pong: Option<String>,
    /// Event type of a server-requested resync.
    pub resync_type: Option<String>,
}

impl Default for JsonEnvelopeConfig {
    fn default() -> Self {
        Self {
            type_field: "t".to_string(),
            payload_field: "d".to_string(),
            version_field: "v".to_string(),
            ping_type: "p".to_string(),
            pong_type: "n".to_string(),
            bare_pong: Some("0".to_string()),
            resync_type: Some("resync".to_string()),
        }
    }
}

impl JsonEnvelopeConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the type field name.
    pub fn type_field(mut self, field: impl Into<String>) -> Self {
        self.type_field = field.into();
        self
    }

    /// Set the payload field name.
    pub fn payload_field(mut self, field: impl Into<String>) -> Self {
        self.payload_field = field.into();
        self
    }

    /// Set the version field name.
    pub fn version_field(mut self, field: impl Into<String>) -> Self {
        self.version_field = field.into();
        self
    }

    /// Set the ping event type.
    pub fn ping_type(mut self, ping: impl Into<String>) -> Self {
        self.ping_type = ping.into();
        self
    }

    /// Set the pong event type.
    pub fn pong_type(mut self, pong: impl Into<String>) -> Self {
        self.pong_type = pong.into();
        self
    }

    /// Set the bare pong text (None disables it).
    pub fn bare_pong(mut self, pong: Option<String>) -> Self {
        self.bare_pong = pong;
        self
    }

    /// Set the server resync request type (None disables it).
    pub fn resync_type(mut self, resync: Option<String>) -> Self {
        self.resync_type = resync;
        self
    }
}

/// JSON envelope protocol.
///
/// # Example
///
/// ```rust
/// use chess_channel::channel::{ChannelProtocol, handlers::JsonEnvelopeProtocol};
///
/// let protocol = JsonEnvelopeProtocol::new().with_config(|c| c.ping_type("ping"));
/// let envelope = protocol.decode(r#"{"t":"n","d":12}"#).unwrap();
/// assert_eq!(protocol.peer_count(&envelope), Some(12));
/// ```
#[derive(Clone, Debug, Default)]
pub struct JsonEnvelopeProtocol {
    config: JsonEnvelopeConfig,
}

impl JsonEnvelopeProtocol {
    /// Create a protocol with default field names.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a protocol with a custom configuration.
    pub fn with_config(mut self, f: impl FnOnce(JsonEnvelopeConfig) -> JsonEnvelopeConfig) -> Self {
        self.config = f(self.config);
        self
    }

    fn object(&self, event_type: &str) -> Map<String, Value> {
        let mut object = Map::new();
        object.insert(
            self.config.type_field.clone(),
            Value::String(event_type.to_string()),
        );
        object
    }
}

impl ChannelProtocol for JsonEnvelopeProtocol {
    fn decode(&self, message: &str) -> Option<Envelope> {
        let json: Value = serde_json::from_str(message).ok()?;
        let event_type = json.get(&self.config.type_field)?.as_str()?.to_string();
        let payload = json
            .get(&self.config.payload_field)
            .cloned()
            .unwrap_or(Value::Null);
        let version = json.get(&self.config.version_field).and_then(Value::as_u64);

        Some(Envelope {
            event_type,
            payload,
            version,
        })
    }

    fn encode_command(&self, command: &Command) -> ChannelResult<WsMessage> {
        let mut object = self.object(&command.name);
        if !command.payload.is_null() {
            object.insert(self.config.payload_field.clone(), command.payload.clone());
        }
        Ok(WsMessage::text(serde_json::to_string(&Value::Object(
            object,
        ))?))
    }

    fn build_ping(&self, version: u64) -> WsMessage {
        let mut object = self.object(&self.config.ping_type);
        object.insert(self.config.version_field.clone(), Value::from(version));
        WsMessage::text(Value::Object(object).to_string())
    }

    fn is_pong(&self, message: &str) -> bool {
        if let Some(bare) = &self.config.bare_pong
            && message.trim() == bare
        {
            return true;
        }
        self.decode(message)
            .is_some_and(|envelope| envelope.event_type == self.config.pong_type)
    }

    fn is_resync_request(&self, envelope: &Envelope) -> bool {
        self.config
            .resync_type
            .as_deref()
            .is_some_and(|t| envelope.event_type == t)
    }

    fn peer_count(&self, envelope: &Envelope) -> Option<u64> {
        if envelope.event_type != self.config.pong_type {
            return None;
        }
        envelope.payload.as_u64()
    }
}
