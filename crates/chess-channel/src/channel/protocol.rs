//! Protocol trait for the channel wire format.
//!
//! The [`ChannelProtocol`] trait abstracts framing details like envelope
//! decoding, command encoding, and heartbeat messages, so the driver only
//! deals with [`Envelope`]s and [`Command`]s.

use url::Url;

use super::types::{Command, Envelope};
use crate::error::ChannelResult;

/// Message representation for WebSocket communication.
#[derive(Clone, Debug, PartialEq)]
pub enum WsMessage {
    /// Text message.
    Text(String),
    /// Binary message.
    Binary(Vec<u8>),
}

impl WsMessage {
    /// Create a text message.
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Create a binary message.
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self::Binary(data.into())
    }
}

/// Wire format of a channel.
///
/// Implementations must be cheap to call; every method runs inside the
/// channel driver between two reads.
pub trait ChannelProtocol: Send + Sync + 'static {
    /// Decode a text frame into an envelope.
    ///
    /// Returns `None` for frames that are not envelopes (they are ignored).
    fn decode(&self, message: &str) -> Option<Envelope>;

    /// Encode an outbound command.
    fn encode_command(&self, command: &Command) -> ChannelResult<WsMessage>;

    /// Build the heartbeat ping. `version` is the channel's current version,
    /// which also re-announces the client's position to the server.
    fn build_ping(&self, version: u64) -> WsMessage;

    /// Check if a text frame answers a ping.
    fn is_pong(&self, message: &str) -> bool;

    /// Check if the server asks the client to resync.
    fn is_resync_request(&self, envelope: &Envelope) -> bool {
        let _ = envelope;
        false
    }

    /// Extract the connected-peers count carried by an envelope.
    fn peer_count(&self, envelope: &Envelope) -> Option<u64> {
        let _ = envelope;
        None
    }

    /// Decode binary message to string.
    fn decode_binary(&self, data: &[u8]) -> ChannelResult<String> {
        String::from_utf8(data.to_vec()).map_err(Into::into)
    }

    /// Build the URL of one connect attempt.
    ///
    /// The default appends `sri` (socket random id) and `version` query
    /// parameters to the endpoint.
    fn connect_url(&self, endpoint: &str, sri: &str, version: u64) -> ChannelResult<String> {
        let mut url = Url::parse(endpoint)?;
        url.query_pairs_mut()
            .append_pair("sri", sri)
            .append_pair("version", &version.to_string());
        Ok(url.into())
    }
}
