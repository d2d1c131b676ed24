//! Full-state resync after a version gap or a reconnect.

use std::{fmt, future::Future, pin::Pin, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use super::types::{ChannelName, ChannelSnapshot};
use crate::{
    error::{ChannelError, ChannelResult},
    reconnect::{RetryConfig, retry_delay},
};

/// Fetches the authoritative state of a channel, usually over HTTP.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use chess_channel::{
///     ChannelResult,
///     channel::{ChannelName, ChannelSnapshot, StateFetcher},
/// };
///
/// struct LobbyApi;
///
/// #[async_trait]
/// impl StateFetcher for LobbyApi {
///     async fn fetch_channel_state(&self, _channel: &ChannelName) -> ChannelResult<ChannelSnapshot> {
///         // GET /lobby and read `lobby.version`
///         Ok(ChannelSnapshot::new(9, serde_json::json!({"hooks": []})))
///     }
/// }
/// ```
#[async_trait]
pub trait StateFetcher: Send + Sync + 'static {
    async fn fetch_channel_state(&self, channel: &ChannelName) -> ChannelResult<ChannelSnapshot>;
}

/// Why a resync was started.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResyncReason {
    /// An envelope skipped versions.
    Gap { current: u64, received: u64 },
    /// The connection was re-established.
    Reconnect,
    /// The server asked for it.
    ServerRequest,
}

impl fmt::Display for ResyncReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gap { current, received } => {
                write!(f, "version gap ({current} -> {received})")
            }
            Self::Reconnect => write!(f, "reconnect"),
            Self::ServerRequest => write!(f, "server request"),
        }
    }
}

type ResyncFuture = Pin<Box<dyn Future<Output = ChannelResult<ChannelSnapshot>> + Send>>;

/// Runs at most one resync at a time for a channel.
pub(crate) struct ResyncCoordinator {
    fetcher: Arc<dyn StateFetcher>,
    channel: ChannelName,
    retry: RetryConfig,
    attempt_timeout: Duration,
    in_flight: Option<ResyncFuture>,
}

impl ResyncCoordinator {
    pub(crate) fn new(
        fetcher: Arc<dyn StateFetcher>,
        channel: ChannelName,
        retry: RetryConfig,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            channel,
            retry,
            attempt_timeout,
            in_flight: None,
        }
    }

    /// Start a resync unless one is already running.
    ///
    /// Returns `false` when the trigger was coalesced into the running one.
    pub(crate) fn trigger(&mut self, reason: ResyncReason) -> bool {
        if self.in_flight.is_some() {
            debug!(channel = %self.channel, %reason, "Resync already in flight");
            return false;
        }
        info!(channel = %self.channel, %reason, "Starting resync");
        self.in_flight = Some(Box::pin(fetch_with_retry(
            Arc::clone(&self.fetcher),
            self.channel.clone(),
            self.retry,
            self.attempt_timeout,
        )));
        true
    }

    pub(crate) fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Wait for the running resync. Pending forever when none is running.
    ///
    /// Cancel safe: dropping this future keeps the resync running.
    pub(crate) async fn wait(&mut self) -> ChannelResult<ChannelSnapshot> {
        match self.in_flight.as_mut() {
            Some(fut) => {
                let result = fut.await;
                self.in_flight = None;
                result
            }
            None => std::future::pending().await,
        }
    }

    /// Drop the running resync, if any.
    pub(crate) fn cancel(&mut self) -> bool {
        self.in_flight.take().is_some()
    }
}

async fn fetch_with_retry(
    fetcher: Arc<dyn StateFetcher>,
    channel: ChannelName,
    retry: RetryConfig,
    attempt_timeout: Duration,
) -> ChannelResult<ChannelSnapshot> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        let error = match timeout(attempt_timeout, fetcher.fetch_channel_state(&channel)).await {
            Ok(Ok(snapshot)) => return Ok(snapshot),
            Ok(Err(err)) => err,
            Err(_) => ChannelError::timeout(attempt_timeout),
        };

        warn!(%channel, attempt = attempts, error = %error, "State fetch failed");
        if retry.exhausted(attempts) {
            return Err(ChannelError::ResyncFailed {
                attempts,
                message: error.to_string(),
            });
        }
        sleep(retry_delay(retry)).await;
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Mutex,
            atomic::{AtomicU32, Ordering},
        },
    };

    use serde_json::json;

    use super::*;

    struct ScriptedFetcher {
        calls: AtomicU32,
        results: Mutex<VecDeque<ChannelResult<ChannelSnapshot>>>,
        delay: Duration,
    }

    impl ScriptedFetcher {
        fn new(results: Vec<ChannelResult<ChannelSnapshot>>) -> Self {
            Self {
                calls: AtomicU32::new(0),
                results: Mutex::new(results.into()),
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl StateFetcher for ScriptedFetcher {
        async fn fetch_channel_state(&self, _channel: &ChannelName) -> ChannelResult<ChannelSnapshot> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ChannelError::fetch("script exhausted")))
        }
    }

    fn coordinator(fetcher: Arc<ScriptedFetcher>, max_attempts: u32) -> ResyncCoordinator {
        ResyncCoordinator::new(
            fetcher,
            ChannelName::lobby(),
            RetryConfig {
                delay: Duration::from_millis(5),
                jitter: 0.0,
                max_attempts,
            },
            Duration::from_millis(100),
        )
    }

    #[tokio::test]
    async fn resync_returns_snapshot() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![Ok(ChannelSnapshot::new(
            9,
            json!({"hooks": []}),
        ))]));
        let mut resync = coordinator(Arc::clone(&fetcher), 3);

        assert!(resync.trigger(ResyncReason::Gap {
            current: 6,
            received: 9
        }));
        let snapshot = resync.wait().await.expect("snapshot");

        assert_eq!(snapshot.version, 9);
        assert!(!resync.is_in_flight());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn resync_retries_then_succeeds() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            Err(ChannelError::fetch("502")),
            Err(ChannelError::fetch("502")),
            Ok(ChannelSnapshot::new(4, json!(null))),
        ]));
        let mut resync = coordinator(Arc::clone(&fetcher), 3);

        resync.trigger(ResyncReason::Reconnect);
        assert_eq!(resync.wait().await.expect("snapshot").version, 4);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn resync_gives_up_after_bound() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![]));
        let mut resync = coordinator(Arc::clone(&fetcher), 2);

        resync.trigger(ResyncReason::ServerRequest);
        let err = resync.wait().await.expect_err("should fail");

        assert!(matches!(err, ChannelError::ResyncFailed { attempts: 2, .. }));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn slow_fetch_times_out_per_attempt() {
        let mut fetcher = ScriptedFetcher::new(vec![Ok(ChannelSnapshot::new(1, json!(null)))]);
        fetcher.delay = Duration::from_secs(5);
        let fetcher = Arc::new(fetcher);
        let mut resync = coordinator(Arc::clone(&fetcher), 1);

        resync.trigger(ResyncReason::Reconnect);
        let err = resync.wait().await.expect_err("should time out");
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn concurrent_triggers_are_coalesced() {
        let mut fetcher = ScriptedFetcher::new(vec![Ok(ChannelSnapshot::new(12, json!(null)))]);
        fetcher.delay = Duration::from_millis(20);
        let fetcher = Arc::new(fetcher);
        let mut resync = coordinator(Arc::clone(&fetcher), 3);

        assert!(resync.trigger(ResyncReason::Gap {
            current: 1,
            received: 5
        }));
        assert!(!resync.trigger(ResyncReason::Gap {
            current: 1,
            received: 7
        }));
        assert!(!resync.trigger(ResyncReason::ServerRequest));

        assert_eq!(resync.wait().await.expect("snapshot").version, 12);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_drops_in_flight_fetch() {
        let mut fetcher = ScriptedFetcher::new(vec![Ok(ChannelSnapshot::new(3, json!(null)))]);
        fetcher.delay = Duration::from_millis(50);
        let fetcher = Arc::new(fetcher);
        let mut resync = coordinator(Arc::clone(&fetcher), 3);

        resync.trigger(ResyncReason::Reconnect);
        assert!(
            tokio::time::timeout(Duration::from_millis(5), resync.wait())
                .await
                .is_err()
        );
        assert!(resync.is_in_flight());
        assert!(resync.cancel());
        assert!(!resync.is_in_flight());
        assert!(!resync.cancel());
    }

    #[test]
    fn reason_display() {
        assert_eq!(
            ResyncReason::Gap {
                current: 6,
                received: 9
            }
            .to_string(),
            "version gap (6 -> 9)"
        );
        assert_eq!(ResyncReason::Reconnect.to_string(), "reconnect");
    }
}
