//! Error handling for channel clients.

use std::{string::FromUtf8Error, time::Duration};

use thiserror::Error;

/// The main result type used throughout the channel client.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Error type for all channel operations.
///
/// Transient variants (`Transport`, `ConnectionClosed`, `Timeout`) are retried
/// inside the channel driver and never reach the UI on their own. Only
/// `FatalDisconnect` and `ResyncFailed` are reported through
/// [`ChannelHooks::on_fatal`](crate::hooks::ChannelHooks::on_fatal).
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Connect/send/read failures on the physical connection.
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// The connection was closed by the peer or the driver task is gone.
    #[error("Connection closed{}", reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    ConnectionClosed { reason: Option<String> },

    /// Timeout errors
    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// The external state fetch failed.
    #[error("Fetch error: {message}")]
    Fetch { message: String },

    /// Resync could not restore consistency within the attempt bound.
    #[error("Resync failed after {attempts} attempts: {message}")]
    ResyncFailed { attempts: u32, message: String },

    /// Reconnect attempts exhausted.
    #[error("Disconnected after {attempts} reconnect attempts: {message}")]
    FatalDisconnect { attempts: u32, message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed endpoint URL.
    #[error("Invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),
}

impl From<FromUtf8Error> for ChannelError {
    fn from(e: FromUtf8Error) -> Self {
        Self::Serialization(serde_json::Error::io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            e.to_string(),
        )))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ChannelError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        match e {
            WsError::ConnectionClosed | WsError::AlreadyClosed => {
                Self::ConnectionClosed { reason: None }
            }
            other => Self::Transport {
                message: other.to_string(),
            },
        }
    }
}

impl ChannelError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a connection-closed error.
    pub fn connection_closed(reason: Option<String>) -> Self {
        Self::ConnectionClosed { reason }
    }

    /// Create a timeout error.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }

    /// Create a fetch error.
    pub fn fetch(message: impl Into<String>) -> Self {
        Self::Fetch {
            message: message.into(),
        }
    }

    /// Returns true for the conditions that end a channel.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::FatalDisconnect { .. } | Self::ResyncFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = ChannelError::config("Invalid URL");
        assert!(matches!(err, ChannelError::Config { .. }));

        let err = ChannelError::timeout(Duration::from_secs(5));
        assert!(matches!(err, ChannelError::Timeout { .. }));

        let err = ChannelError::fetch("503");
        assert!(matches!(err, ChannelError::Fetch { .. }));
    }

    #[test]
    fn test_connection_closed_display() {
        assert_eq!(
            ChannelError::connection_closed(None).to_string(),
            "Connection closed"
        );
        assert_eq!(
            ChannelError::connection_closed(Some("Pong timeout".to_string())).to_string(),
            "Connection closed: Pong timeout"
        );
    }

    #[test]
    fn test_only_terminal_errors_are_fatal() {
        assert!(
            ChannelError::FatalDisconnect {
                attempts: 3,
                message: "refused".to_string()
            }
            .is_fatal()
        );
        assert!(
            ChannelError::ResyncFailed {
                attempts: 3,
                message: "503".to_string()
            }
            .is_fatal()
        );
        assert!(!ChannelError::transport("reset").is_fatal());
        assert!(!ChannelError::timeout(Duration::from_secs(1)).is_fatal());
    }
}
