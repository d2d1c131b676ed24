//! Versioned real-time channels.
//!
//! A channel is one logical subscription (the lobby, a game) carried over a
//! WebSocket. Every channel is driven by a single background task that owns
//! the connection and everything that must stay ordered with it:
//!
//! - **Version baseline**: versioned envelopes are applied strictly in order;
//!   duplicates are dropped and gaps trigger a resync
//! - **Resync**: the authoritative state is fetched through a
//!   [`StateFetcher`] and delivered once as a [`FULL_STATE_EVENT`] envelope
//! - **Heartbeat**: pings carry the current version; missing pongs force a
//!   reconnect
//! - **Reconnect**: fixed delay between attempts, bounded attempt count
//! - **Outbound queue**: commands sent while disconnected are flushed in order
//!   on the next connection
//!
//! ```text
//! ┌───────────────┐  commands  ┌───────────────┐  frames  ┌──────────┐
//! │ ChannelHandle │───────────▶│ ChannelDriver │◀────────▶│  Server  │
//! │    (Clone)    │◀───────────│  (background) │          └──────────┘
//! └───────────────┘   state    └───────┬───────┘
//!                                      │ envelopes / fullState
//!                                      ▼
//!                              ┌─────────────────┐
//!                              │ HandlerRegistry │
//!                              └─────────────────┘
//! ```
//!
//! Handlers run on the driver task, one envelope at a time, so no two handler
//! invocations of a channel ever overlap.

mod config;
mod connection;
mod dispatcher;
pub mod handlers;
mod protocol;
mod queue;
mod resync;
mod transport;
mod types;
mod version;

pub use config::ChannelConfig;
pub use connection::{Channel, ChannelBuilder, ChannelHandle};
pub use dispatcher::{EventHandler, HandlerRegistry, HandlerRegistryBuilder};
pub use protocol::{ChannelProtocol, WsMessage};
pub use queue::OutboundQueue;
pub use resync::{ResyncReason, StateFetcher};
pub use transport::{Connection, Connector, Frame, FrameStream, WsConnector, WsWriter};
pub use types::{
    ChannelName, ChannelSnapshot, ChannelState, Command, Envelope, FULL_STATE_EVENT, PendingCommand,
};
pub use version::{VersionCheck, VersionTracker};
