//! # chess-channel
//!
//! Real-time socket channels for a chess client: the lobby, seeks and games
//! are each a channel of versioned events pushed by the server.
//!
//! The crate keeps a channel consistent across flaky mobile connections. It
//! applies events in version order, resyncs from the authoritative state when
//! it detects a gap, reconnects with a fixed delay, keeps the server informed
//! through versioned heartbeats and queues outgoing commands until the
//! connection is back.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use chess_channel::{
//!     ChannelResult,
//!     channel::{Channel, ChannelConfig, ChannelName, ChannelSnapshot, HandlerRegistry, StateFetcher},
//!     hooks::LoggingHooks,
//! };
//!
//! struct LobbyApi;
//!
//! #[async_trait]
//! impl StateFetcher for LobbyApi {
//!     async fn fetch_channel_state(&self, _channel: &ChannelName) -> ChannelResult<ChannelSnapshot> {
//!         Ok(ChannelSnapshot::new(0, serde_json::Value::Null))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> ChannelResult<()> {
//!     let config = ChannelConfig::new("lobby", "wss://socket.example.org/lobby/socket/v1", 0);
//!     let handlers = HandlerRegistry::builder()
//!         .on("n", |envelope| println!("{} players online", envelope.payload))
//!         .build();
//!
//!     let lobby = Channel::open(config, handlers, Arc::new(LobbyApi), Arc::new(LoggingHooks))?;
//!     lobby.closed().await;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod error;
pub mod hooks;
mod reconnect;

pub use channel::{Channel, ChannelConfig, ChannelHandle, ChannelName, Envelope, HandlerRegistry};
pub use error::{ChannelError, ChannelResult};
pub use hooks::{ChannelHooks, LoggingHooks, NoHooks};
