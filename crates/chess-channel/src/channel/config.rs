//! Channel configuration.

use std::time::Duration;

use super::types::ChannelName;
use crate::reconnect::RetryConfig;

/// Configuration for one channel.
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    // Identity
    /// Logical channel name.
    pub name: ChannelName,
    /// Socket endpoint, e.g. `wss://socket.example.org/lobby/socket/v1`.
    pub endpoint: String,
    /// Version the caller already holds when the channel opens.
    pub initial_version: u64,

    // Heartbeat settings
    /// Interval between pings.
    pub heartbeat_interval: Duration,
    /// Time a ping may stay unanswered before it counts as missed.
    pub pong_timeout: Duration,
    /// Consecutive missed heartbeats that force a reconnect.
    pub max_missed_heartbeats: u32,

    // Reconnection settings
    /// Fixed delay between reconnection attempts.
    pub reconnect_delay: Duration,
    /// Random jitter factor (0.0-1.0) applied to the reconnection delay.
    pub reconnect_jitter: f64,
    /// Consecutive failed reconnection attempts before giving up.
    pub max_reconnect_attempts: u32,

    // Resync settings
    /// Fetch attempts before resync is reported as failed.
    pub max_resync_attempts: u32,
    /// Fixed delay between fetch attempts.
    pub resync_delay: Duration,
    /// Timeout of a single fetch attempt.
    pub resync_timeout: Duration,
    /// Resync on every reconnect, not only on version gaps.
    pub resync_on_reconnect: bool,

    // Connection
    /// Timeout for a single connect attempt.
    pub connect_timeout: Duration,
    /// Capacity of the handle-to-driver command channel.
    pub command_channel_capacity: usize,
    /// Maximum inbound message size in bytes, 0 for no limit.
    pub max_message_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            name: ChannelName::lobby(),
            endpoint: String::new(),
            initial_version: 0,
            heartbeat_interval: Duration::from_secs(2),
            pong_timeout: Duration::from_secs(7),
            max_missed_heartbeats: 2,
            reconnect_delay: Duration::from_secs(1),
            reconnect_jitter: 0.0,
            max_reconnect_attempts: 8,
            max_resync_attempts: 3,
            resync_delay: Duration::from_secs(1),
            resync_timeout: Duration::from_secs(10),
            resync_on_reconnect: true,
            connect_timeout: Duration::from_secs(10),
            command_channel_capacity: 64,
            max_message_size: 1024 * 1024, // 1 MiB
        }
    }
}

impl ChannelConfig {
    /// Create a new configuration for a channel.
    pub fn new(name: impl Into<ChannelName>, endpoint: impl Into<String>, initial_version: u64) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            initial_version,
            ..Default::default()
        }
    }

    /// Set the heartbeat interval.
    #[must_use]
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the pong timeout.
    #[must_use]
    pub fn pong_timeout(mut self, timeout: Duration) -> Self {
        self.pong_timeout = timeout;
        self
    }

    /// Set how many missed heartbeats force a reconnect.
    #[must_use]
    pub fn max_missed_heartbeats(mut self, max: u32) -> Self {
        self.max_missed_heartbeats = max;
        self
    }

    /// Set the reconnection delay.
    #[must_use]
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the reconnection jitter.
    #[must_use]
    pub fn reconnect_jitter(mut self, jitter: f64) -> Self {
        self.reconnect_jitter = jitter;
        self
    }

    /// Set the maximum reconnection attempts.
    #[must_use]
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Set the maximum resync attempts.
    #[must_use]
    pub fn max_resync_attempts(mut self, attempts: u32) -> Self {
        self.max_resync_attempts = attempts;
        self
    }

    /// Set the delay between resync attempts.
    #[must_use]
    pub fn resync_delay(mut self, delay: Duration) -> Self {
        self.resync_delay = delay;
        self
    }

    /// Set the timeout of a single fetch attempt.
    #[must_use]
    pub fn resync_timeout(mut self, timeout: Duration) -> Self {
        self.resync_timeout = timeout;
        self
    }

    /// Set whether every reconnect triggers a resync.
    #[must_use]
    pub fn resync_on_reconnect(mut self, enabled: bool) -> Self {
        self.resync_on_reconnect = enabled;
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the maximum inbound message size.
    #[must_use]
    pub fn max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }

    pub(crate) fn reconnect_retry(&self) -> RetryConfig {
        RetryConfig {
            delay: self.reconnect_delay,
            jitter: self.reconnect_jitter,
            max_attempts: self.max_reconnect_attempts,
        }
    }

    pub(crate) fn resync_retry(&self) -> RetryConfig {
        RetryConfig {
            delay: self.resync_delay,
            jitter: 0.0,
            max_attempts: self.max_resync_attempts,
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.as_str().is_empty() {
            return Err("Channel name cannot be empty".to_string());
        }
        if self.endpoint.is_empty() {
            return Err("Endpoint cannot be empty".to_string());
        }
        if self.heartbeat_interval.is_zero() {
            return Err("Heartbeat interval must be > 0".to_string());
        }
        if self.pong_timeout.is_zero() {
            return Err("Pong timeout must be > 0".to_string());
        }
        if self.max_missed_heartbeats == 0 {
            return Err("Max missed heartbeats must be > 0".to_string());
        }
        self.reconnect_retry()
            .validate()
            .map_err(|e| format!("Reconnect: {e}"))?;
        self.resync_retry()
            .validate()
            .map_err(|e| format!("Resync: {e}"))?;
        if self.resync_timeout.is_zero() {
            return Err("Resync timeout must be > 0".to_string());
        }
        if self.connect_timeout.is_zero() {
            return Err("Connect timeout must be > 0".to_string());
        }
        if self.command_channel_capacity == 0 {
            return Err("Command channel capacity must be > 0".to_string());
        }
        Ok(())
    }
}
