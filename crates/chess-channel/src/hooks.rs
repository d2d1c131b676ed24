//! Lifecycle hooks for channels.
//!
//! Hooks observe the channel without taking part in dispatch ordering. They
//! run on the channel driver, so they should return quickly; anything slow
//! belongs on a task of its own.
//!
//! # Example
//!
//! ```rust
//! use chess_channel::{ChannelError, channel::ChannelName, hooks::ChannelHooks};
//!
//! struct ReloadBanner;
//!
//! impl ChannelHooks for ReloadBanner {
//!     fn on_fatal(&self, channel: &ChannelName, error: &ChannelError) {
//!         eprintln!("{channel} lost for good: {error}");
//!     }
//! }
//! ```

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::{
    channel::{ChannelName, ResyncReason},
    error::ChannelError,
};

/// Observer of a channel's lifecycle. Every method defaults to a no-op.
pub trait ChannelHooks: Send + Sync + 'static {
    /// A physical connection was established. `epoch` is 1 for the first
    /// connection and grows with every reconnect.
    fn on_connect(&self, channel: &ChannelName, epoch: u64) {
        let _ = (channel, epoch);
    }

    /// The physical connection was lost.
    fn on_disconnect(&self, channel: &ChannelName, reason: &str) {
        let _ = (channel, reason);
    }

    /// A resync started. Dispatch is suspended until it completes.
    fn on_resync_start(&self, channel: &ChannelName, reason: ResyncReason) {
        let _ = (channel, reason);
    }

    /// A resync completed; the channel now sits at `version`.
    fn on_resync_complete(&self, channel: &ChannelName, version: u64) {
        let _ = (channel, version);
    }

    /// The channel hit a terminal condition and is closed.
    fn on_fatal(&self, channel: &ChannelName, error: &ChannelError) {
        let _ = (channel, error);
    }
}

/// Hooks that do nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHooks;

impl ChannelHooks for NoHooks {}

/// Hooks that log every lifecycle step through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingHooks;

impl ChannelHooks for LoggingHooks {
    fn on_connect(&self, channel: &ChannelName, epoch: u64) {
        info!(%channel, epoch, "Channel connected");
    }

    fn on_disconnect(&self, channel: &ChannelName, reason: &str) {
        warn!(%channel, reason, "Channel disconnected");
    }

    fn on_resync_start(&self, channel: &ChannelName, reason: ResyncReason) {
        debug!(%channel, %reason, "Resync started");
    }

    fn on_resync_complete(&self, channel: &ChannelName, version: u64) {
        debug!(%channel, version, "Resync complete");
    }

    fn on_fatal(&self, channel: &ChannelName, error: &ChannelError) {
        error!(%channel, error = %error, "Channel failed");
    }
}

/// Several hooks called in order.
#[derive(Clone, Default)]
pub struct HookChain {
    hooks: Vec<Arc<dyn ChannelHooks>>,
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, hooks: Arc<dyn ChannelHooks>) -> Self {
        self.hooks.push(hooks);
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl ChannelHooks for HookChain {
    fn on_connect(&self, channel: &ChannelName, epoch: u64) {
        for hook in &self.hooks {
            hook.on_connect(channel, epoch);
        }
    }

    fn on_disconnect(&self, channel: &ChannelName, reason: &str) {
        for hook in &self.hooks {
            hook.on_disconnect(channel, reason);
        }
    }

    fn on_resync_start(&self, channel: &ChannelName, reason: ResyncReason) {
        for hook in &self.hooks {
            hook.on_resync_start(channel, reason);
        }
    }

    fn on_resync_complete(&self, channel: &ChannelName, version: u64) {
        for hook in &self.hooks {
            hook.on_resync_complete(channel, version);
        }
    }

    fn on_fatal(&self, channel: &ChannelName, error: &ChannelError) {
        for hook in &self.hooks {
            hook.on_fatal(channel, error);
        }
    }
}
