//! Core type definitions for versioned channels.

use std::{fmt, time::Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event type of the synthetic envelope dispatched after a successful resync.
pub const FULL_STATE_EVENT: &str = "fullState";

/// Name of a logical subscription, e.g. `lobby` or `game:abcd1234`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChannelName(String);

impl ChannelName {
    /// Create a new channel name.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// The lobby channel.
    pub fn lobby() -> Self {
        Self::new("lobby")
    }

    /// The channel of one game.
    pub fn game(id: impl fmt::Display) -> Self {
        Self(format!("game:{id}"))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ChannelName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ChannelName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One server-to-client message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event type tag used for dispatch.
    #[serde(rename = "t")]
    pub event_type: String,
    /// Opaque payload.
    #[serde(rename = "d", default)]
    pub payload: Value,
    /// Server version, when the event is sequenced.
    #[serde(rename = "v", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

impl Envelope {
    /// Create an unversioned envelope.
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            version: None,
        }
    }

    /// Create a versioned envelope.
    pub fn versioned(event_type: impl Into<String>, payload: Value, version: u64) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            version: Some(version),
        }
    }

    pub(crate) fn full_state(snapshot: ChannelSnapshot) -> Self {
        Self::versioned(FULL_STATE_EVENT, snapshot.state, snapshot.version)
    }
}

/// Client-to-server command. The payload is opaque to the channel.
#[derive(Clone, Debug, PartialEq)]
pub struct Command {
    pub name: String,
    pub payload: Value,
}

impl Command {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// Cancel a seek or challenge.
    pub fn cancel(id: impl Into<String>) -> Self {
        Self::new("cancel", Value::String(id.into()))
    }

    /// Accept a challenge.
    pub fn accept(id: impl Into<String>) -> Self {
        Self::new("accept", Value::String(id.into()))
    }

    /// Decline a challenge.
    pub fn decline(id: impl Into<String>) -> Self {
        Self::new("decline", Value::String(id.into()))
    }
}

/// A command waiting in the outbound queue.
#[derive(Clone, Debug)]
pub struct PendingCommand {
    pub command: Command,
    pub enqueued_at: Instant,
}

/// Authoritative channel state returned by a
/// [`StateFetcher`](super::resync::StateFetcher).
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelSnapshot {
    pub version: u64,
    pub state: Value,
}

impl ChannelSnapshot {
    pub fn new(version: u64, state: Value) -> Self {
        Self { version, state }
    }
}

/// Observable channel states.
///
/// `Connecting → Open → (Reconnecting ↔ Open) → Closed`, with
/// `Open → Resyncing → Open` while a resync is in flight.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelState {
    /// First connection attempt in progress.
    Connecting,
    /// Connected and dispatching.
    Open,
    /// Connection lost; waiting for or performing a reconnect.
    Reconnecting {
        /// Current attempt number.
        attempt: u32,
    },
    /// Connected, waiting for a full-state fetch. Nothing is dispatched.
    Resyncing,
    /// Terminal.
    Closed,
}

impl ChannelState {
    /// Check if the channel is dispatching events.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Check if the channel is closed (terminal state).
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Whether the UI should show a reconnecting indicator.
    pub fn is_recovering(&self) -> bool {
        matches!(self, Self::Reconnecting { .. } | Self::Resyncing)
    }
}
