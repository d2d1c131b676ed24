//! Channel driver: one task per channel owning the connection, the version
//! baseline, the handler registry, the outbound queue and the resync state.

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

use futures_util::StreamExt;
use rand::{Rng, distr::Alphanumeric};
use serde_json::Value;
use tokio::{
    sync::{mpsc, watch},
    time::{MissedTickBehavior, sleep, timeout},
};
use tracing::{debug, info, trace, warn};

use super::{
    config::ChannelConfig,
    dispatcher::HandlerRegistry,
    handlers::JsonEnvelopeProtocol,
    protocol::ChannelProtocol,
    queue::OutboundQueue,
    resync::{ResyncCoordinator, ResyncReason, StateFetcher},
    transport::{Connection, Connector, Frame, Heartbeat, HeartbeatTick, WsConnector, WsWriter},
    types::{ChannelName, ChannelSnapshot, ChannelState, Command, Envelope},
    version::{VersionCheck, VersionTracker},
};
use crate::{
    error::{ChannelError, ChannelResult},
    hooks::{ChannelHooks, NoHooks},
    reconnect::retry_delay,
};

const SRI_LEN: usize = 12;

#[derive(Debug, Clone)]
enum ControlCommand {
    Close,
    Reconnect { reason: String },
}

/// Entry point for channels.
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use chess_channel::channel::{
///     Channel, ChannelConfig, ChannelName, ChannelSnapshot, HandlerRegistry, StateFetcher,
/// };
/// # use async_trait::async_trait;
/// # struct LobbyApi;
/// # #[async_trait]
/// # impl StateFetcher for LobbyApi {
/// #     async fn fetch_channel_state(&self, _: &ChannelName) -> chess_channel::ChannelResult<ChannelSnapshot> {
/// #         unimplemented!()
/// #     }
/// # }
///
/// # async fn run() -> chess_channel::ChannelResult<()> {
/// let config = ChannelConfig::new("lobby", "wss://socket.example.org/lobby/socket/v1", 5);
/// let handlers = HandlerRegistry::builder()
///     .on("redirect", |envelope| println!("game starts: {}", envelope.payload))
///     .build();
///
/// let lobby = Channel::builder(config, Arc::new(LobbyApi))
///     .handlers(handlers)
///     .open()?;
/// lobby.send_event("cancel", serde_json::json!("hookId")).await?;
/// lobby.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct Channel;

impl Channel {
    /// Start configuring a channel.
    pub fn builder(config: ChannelConfig, fetcher: Arc<dyn StateFetcher>) -> ChannelBuilder {
        ChannelBuilder {
            config,
            fetcher,
            registry: HandlerRegistry::empty(),
            hooks: Arc::new(NoHooks),
            connector: Arc::new(WsConnector),
            protocol: Arc::new(JsonEnvelopeProtocol::new()),
        }
    }

    /// Open a channel with the default WebSocket connector and JSON protocol.
    pub fn open(
        config: ChannelConfig,
        registry: HandlerRegistry,
        fetcher: Arc<dyn StateFetcher>,
        hooks: Arc<dyn ChannelHooks>,
    ) -> ChannelResult<ChannelHandle> {
        Self::builder(config, fetcher)
            .handlers(registry)
            .hooks(hooks)
            .open()
    }
}

/// Builder returned by [`Channel::builder`].
pub struct ChannelBuilder {
    config: ChannelConfig,
    fetcher: Arc<dyn StateFetcher>,
    registry: HandlerRegistry,
    hooks: Arc<dyn ChannelHooks>,
    connector: Arc<dyn Connector>,
    protocol: Arc<dyn ChannelProtocol>,
}

impl ChannelBuilder {
    /// Set the handler registry. It cannot change once the channel is open.
    #[must_use]
    pub fn handlers(mut self, registry: HandlerRegistry) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn hooks(mut self, hooks: Arc<dyn ChannelHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    #[must_use]
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    #[must_use]
    pub fn protocol(mut self, protocol: impl ChannelProtocol) -> Self {
        self.protocol = Arc::new(protocol);
        self
    }

    /// Validate the configuration and spawn the channel driver.
    ///
    /// Must be called from within a tokio runtime. The connection is
    /// established in the background; commands sent before it is open are
    /// queued.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration or the endpoint URL is invalid.
    pub fn open(self) -> ChannelResult<ChannelHandle> {
        let Self {
            config,
            fetcher,
            registry,
            hooks,
            connector,
            protocol,
        } = self;

        config.validate().map_err(ChannelError::config)?;
        let sri: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(SRI_LEN)
            .map(char::from)
            .collect();
        protocol.connect_url(&config.endpoint, &sri, config.initial_version)?;

        let config = Arc::new(config);
        let (ctrl_tx, ctrl_rx) = mpsc::channel(config.command_channel_capacity);
        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_channel_capacity);
        let (state_tx, state_rx) = watch::channel(ChannelState::Connecting);
        let (peers_tx, peers_rx) = watch::channel(None);
        let version = Arc::new(AtomicU64::new(config.initial_version));

        let resync = ResyncCoordinator::new(
            fetcher,
            config.name.clone(),
            config.resync_retry(),
            config.resync_timeout,
        );

        let driver = ChannelDriver {
            config: Arc::clone(&config),
            sri,
            connector,
            protocol,
            hooks,
            registry,
            tracker: VersionTracker::new(config.initial_version),
            queue: OutboundQueue::new(),
            resync,
            ctrl_rx,
            cmd_rx,
            state_tx,
            peers_tx,
            version: Arc::clone(&version),
            epoch: 0,
            heard_from_server: false,
        };
        tokio::spawn(driver.run());

        Ok(ChannelHandle {
            name: config.name.clone(),
            ctrl_tx,
            cmd_tx,
            state_rx,
            peers_rx,
            version,
        })
    }
}

/// Clone-able handle to a running channel.
///
/// Dropping every handle closes the channel.
#[derive(Clone, Debug)]
pub struct ChannelHandle {
    name: ChannelName,
    ctrl_tx: mpsc::Sender<ControlCommand>,
    cmd_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ChannelState>,
    peers_rx: watch::Receiver<Option<u64>>,
    version: Arc<AtomicU64>,
}

impl ChannelHandle {
    /// Queue a command for the server.
    ///
    /// Commands are sent in call order once the connection is open. On a
    /// closed channel the command is dropped and `Ok(())` is returned.
    pub async fn send(&self, command: Command) -> ChannelResult<()> {
        if let Err(mpsc::error::SendError(command)) = self.cmd_tx.send(command).await {
            debug!(channel = %self.name, command = %command.name, "Channel closed, dropping command");
        }
        Ok(())
    }

    /// Queue a command from its name and payload.
    pub async fn send_event(&self, name: impl Into<String>, payload: Value) -> ChannelResult<()> {
        self.send(Command::new(name, payload)).await
    }

    /// Close the channel. Pending timers and any in-flight resync are
    /// cancelled; queued commands are discarded.
    pub async fn close(&self) -> ChannelResult<()> {
        if self.ctrl_tx.send(ControlCommand::Close).await.is_err() {
            debug!(channel = %self.name, "Channel already closed");
        }
        Ok(())
    }

    /// Drop the current connection and reconnect right away, e.g. when the
    /// app returns from the background.
    pub async fn reconnect(&self, reason: &str) -> ChannelResult<()> {
        self.ctrl_tx
            .send(ControlCommand::Reconnect {
                reason: reason.to_string(),
            })
            .await
            .map_err(|_| ChannelError::connection_closed(Some("Channel is closed".to_string())))
    }

    /// Wait until the channel reaches [`ChannelState::Closed`].
    pub async fn closed(&self) {
        let mut rx = self.state_rx.clone();
        let _ = rx.wait_for(ChannelState::is_closed).await;
    }

    pub fn name(&self) -> &ChannelName {
        &self.name
    }

    pub fn state(&self) -> ChannelState {
        self.state_rx.borrow().clone()
    }

    /// Receiver of state changes, for a reconnecting indicator.
    pub fn state_changes(&self) -> watch::Receiver<ChannelState> {
        self.state_rx.clone()
    }

    /// Last version applied to the channel.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Connected peers as last reported by the server, `None` until the
    /// first report.
    pub fn connected_peers(&self) -> Option<u64> {
        *self.peers_rx.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.state_rx.borrow().is_closed()
    }
}

enum Served<T> {
    Done(T),
    Reconnect,
    Close,
}

enum SessionEnd {
    Closed,
    Lost(ChannelError),
    Restart(String),
    Fatal(ChannelError),
}

struct ChannelDriver {
    config: Arc<ChannelConfig>,
    sri: String,
    connector: Arc<dyn Connector>,
    protocol: Arc<dyn ChannelProtocol>,
    hooks: Arc<dyn ChannelHooks>,
    registry: HandlerRegistry,
    tracker: VersionTracker,
    queue: OutboundQueue,
    resync: ResyncCoordinator,
    ctrl_rx: mpsc::Receiver<ControlCommand>,
    cmd_rx: mpsc::Receiver<Command>,
    state_tx: watch::Sender<ChannelState>,
    peers_tx: watch::Sender<Option<u64>>,
    version: Arc<AtomicU64>,
    epoch: u64,
    heard_from_server: bool,
}

impl ChannelDriver {
    async fn run(mut self) {
        let channel = self.config.name.clone();
        info!(%channel, endpoint = %self.config.endpoint, version = self.tracker.current(), "Starting channel");

        let retry = self.config.reconnect_retry();
        let mut failures: u32 = 0;

        loop {
            let connection = match self.connect().await {
                Served::Done(Ok(connection)) => connection,
                Served::Done(Err(err)) => {
                    failures += 1;
                    warn!(%channel, attempt = failures, error = %err, "Connect failed");
                    if retry.exhausted(failures) {
                        self.fail(ChannelError::FatalDisconnect {
                            attempts: failures,
                            message: err.to_string(),
                        });
                        break;
                    }
                    self.set_state(ChannelState::Reconnecting {
                        attempt: failures + 1,
                    });
                    if matches!(self.wait_before_reconnect().await, Served::Close) {
                        break;
                    }
                    continue;
                }
                Served::Reconnect => continue,
                Served::Close => break,
            };

            self.epoch += 1;
            info!(%channel, epoch = self.epoch, "Channel connected");
            self.hooks.on_connect(&channel, self.epoch);

            // A session only resets the failure count once the server has
            // spoken or it outlived one heartbeat interval.
            let opened = Instant::now();
            match self.run_session(connection).await {
                SessionEnd::Closed => break,
                SessionEnd::Fatal(err) => {
                    self.fail(err);
                    break;
                }
                SessionEnd::Restart(reason) => {
                    self.end_session(&reason);
                    failures = 0;
                    self.set_state(ChannelState::Reconnecting { attempt: 1 });
                }
                SessionEnd::Lost(err) => {
                    let reason = err.to_string();
                    let healthy = self.heard_from_server
                        || opened.elapsed() >= self.config.heartbeat_interval;
                    warn!(%channel, %reason, healthy, "Connection lost");
                    self.end_session(&reason);
                    if healthy {
                        failures = 0;
                    } else {
                        failures += 1;
                        if retry.exhausted(failures) {
                            self.fail(ChannelError::FatalDisconnect {
                                attempts: failures,
                                message: reason,
                            });
                            break;
                        }
                    }
                    self.set_state(ChannelState::Reconnecting {
                        attempt: failures + 1,
                    });
                    if matches!(self.wait_before_reconnect().await, Served::Close) {
                        break;
                    }
                }
            }
        }

        let dropped = self.queue.close();
        if dropped > 0 {
            debug!(%channel, dropped, "Discarded queued commands");
        }
        self.resync.cancel();
        self.set_state(ChannelState::Closed);
        info!(%channel, "Channel stopped");
    }

    fn end_session(&mut self, reason: &str) {
        if self.resync.cancel() {
            debug!(channel = %self.config.name, "Abandoned in-flight resync");
        }
        self.hooks.on_disconnect(&self.config.name, reason);
    }

    /// Drive `fut` while buffering commands and watching for close.
    async fn serve_until<F: Future>(&mut self, fut: F) -> Served<F::Output> {
        tokio::pin!(fut);
        loop {
            tokio::select! {
                biased;
                ctrl = self.ctrl_rx.recv() => match ctrl {
                    Some(ControlCommand::Close) | None => return Served::Close,
                    Some(ControlCommand::Reconnect { reason }) => {
                        debug!(channel = %self.config.name, %reason, "Reconnect requested");
                        return Served::Reconnect;
                    }
                },
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(command) => {
                        self.queue.enqueue(command);
                    }
                    None => return Served::Close,
                },
                output = &mut fut => return Served::Done(output),
            }
        }
    }

    async fn connect(&mut self) -> Served<ChannelResult<Connection>> {
        let url = match self.protocol.connect_url(
            &self.config.endpoint,
            &self.sri,
            self.tracker.current(),
        ) {
            Ok(url) => url,
            Err(err) => return Served::Done(Err(err)),
        };
        debug!(channel = %self.config.name, %url, "Connecting");

        let connector = Arc::clone(&self.connector);
        let connect_timeout = self.config.connect_timeout;
        self.serve_until(async move {
            match timeout(connect_timeout, connector.connect(&url)).await {
                Ok(result) => result,
                Err(_) => Err(ChannelError::timeout(connect_timeout)),
            }
        })
        .await
    }

    async fn wait_before_reconnect(&mut self) -> Served<()> {
        let delay = retry_delay(self.config.reconnect_retry());
        debug!(
            channel = %self.config.name,
            delay_ms = delay.as_millis(),
            "Waiting before reconnect"
        );
        self.serve_until(sleep(delay)).await
    }

    async fn run_session(&mut self, connection: Connection) -> SessionEnd {
        let Connection {
            mut reader,
            mut writer,
        } = connection;

        self.heard_from_server = false;
        self.set_state(ChannelState::Open);
        if let Err(err) = self.queue.flush(&*self.protocol, writer.as_mut()).await {
            return SessionEnd::Lost(err);
        }
        if self.epoch > 1 && self.config.resync_on_reconnect {
            self.start_resync(ResyncReason::Reconnect);
        }

        let mut heartbeat = Heartbeat::new(
            self.config.pong_timeout,
            self.config.max_missed_heartbeats,
            Instant::now(),
        );
        let mut ticker = tokio::time::interval(self.config.heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                ctrl = self.ctrl_rx.recv() => match ctrl {
                    Some(ControlCommand::Close) | None => {
                        let _ = timeout(self.config.connect_timeout, writer.close()).await;
                        return SessionEnd::Closed;
                    }
                    Some(ControlCommand::Reconnect { reason }) => {
                        let _ = timeout(self.config.connect_timeout, writer.close()).await;
                        return SessionEnd::Restart(reason);
                    }
                },
                result = self.resync.wait(), if self.resync.is_in_flight() => match result {
                    Ok(snapshot) => {
                        let version = self.complete_resync(snapshot);
                        let announce = self.protocol.build_ping(version);
                        if let Err(err) = writer.send_frame(announce.into()).await {
                            return SessionEnd::Lost(err);
                        }
                    }
                    Err(err) => return SessionEnd::Fatal(err),
                },
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(command) => {
                        self.queue.enqueue(command);
                        if let Err(err) = self.queue.flush(&*self.protocol, writer.as_mut()).await {
                            return SessionEnd::Lost(err);
                        }
                    }
                    None => {
                        let _ = timeout(self.config.connect_timeout, writer.close()).await;
                        return SessionEnd::Closed;
                    }
                },
                _ = ticker.tick() => match heartbeat.on_tick(Instant::now()) {
                    HeartbeatTick::Ping => {
                        trace!(version = self.tracker.current(), missed = heartbeat.missed(), "Ping");
                        let ping = self.protocol.build_ping(self.tracker.current());
                        if let Err(err) = writer.send_frame(ping.into()).await {
                            return SessionEnd::Lost(err);
                        }
                    }
                    HeartbeatTick::Expired { missed } => {
                        let idle_ms = heartbeat.last_activity().elapsed().as_millis();
                        warn!(channel = %self.config.name, missed, idle_ms, "Heartbeat expired");
                        return SessionEnd::Lost(ChannelError::connection_closed(Some(format!(
                            "{missed} heartbeats missed"
                        ))));
                    }
                },
                frame = reader.next() => match frame {
                    Some(Ok(frame)) => {
                        if let Err(err) = self.handle_frame(frame, &mut heartbeat, writer.as_mut()).await {
                            return SessionEnd::Lost(err);
                        }
                    }
                    Some(Err(err)) => return SessionEnd::Lost(err),
                    None => return SessionEnd::Lost(ChannelError::connection_closed(None)),
                },
            }
        }
    }

    async fn handle_frame(
        &mut self,
        frame: Frame,
        heartbeat: &mut Heartbeat,
        writer: &mut dyn WsWriter,
    ) -> ChannelResult<()> {
        let now = Instant::now();
        let max = self.config.max_message_size;
        if max > 0 && frame.len() > max {
            warn!(size = frame.len(), max, "Dropping oversized message");
            return Ok(());
        }
        heartbeat.on_activity(now);
        self.heard_from_server = true;

        let text = match frame {
            Frame::Text(text) => text,
            Frame::Binary(data) => match self.protocol.decode_binary(&data) {
                Ok(text) => text,
                Err(err) => {
                    debug!(error = %err, "Undecodable binary frame");
                    return Ok(());
                }
            },
            Frame::Pong(_) => {
                heartbeat.on_pong(now);
                return Ok(());
            }
            Frame::Ping(data) => return writer.send_frame(Frame::Pong(data)).await,
            Frame::Close => {
                return Err(ChannelError::connection_closed(Some(
                    "Server closed connection".to_string(),
                )));
            }
        };

        if self.protocol.is_pong(&text) {
            heartbeat.on_pong(now);
        }
        if let Some(envelope) = self.protocol.decode(&text) {
            self.receive(envelope);
        }
        Ok(())
    }

    fn receive(&mut self, envelope: Envelope) {
        if let Some(count) = self.protocol.peer_count(&envelope) {
            self.peers_tx.send_replace(Some(count));
        }
        if self.protocol.is_resync_request(&envelope) {
            self.start_resync(ResyncReason::ServerRequest);
            return;
        }
        // The snapshot covers versioned events; unversioned ones are not
        // part of it and still go out.
        if self.resync.is_in_flight() && envelope.version.is_some() {
            trace!(event_type = %envelope.event_type, "Dropping versioned envelope during resync");
            return;
        }

        let check = self.tracker.observe(envelope.version);
        match check {
            VersionCheck::Unversioned => {}
            VersionCheck::Advanced(version) => {
                self.version.store(version, Ordering::Release);
            }
            VersionCheck::Duplicate { current, received } => {
                trace!(current, received, "Discarding duplicate envelope");
            }
            VersionCheck::Gap { current, received } => {
                self.start_resync(ResyncReason::Gap { current, received });
            }
        }
        if check.should_dispatch() {
            self.registry.dispatch(&envelope);
        }
    }

    fn start_resync(&mut self, reason: ResyncReason) {
        if self.resync.trigger(reason) {
            self.set_state(ChannelState::Resyncing);
            self.hooks.on_resync_start(&self.config.name, reason);
        }
    }

    fn complete_resync(&mut self, snapshot: ChannelSnapshot) -> u64 {
        let version = snapshot.version;
        self.tracker.reset(version);
        self.version.store(version, Ordering::Release);
        self.set_state(ChannelState::Open);
        info!(channel = %self.config.name, version, "Resync complete");

        self.registry.dispatch(&Envelope::full_state(snapshot));
        self.hooks.on_resync_complete(&self.config.name, version);
        version
    }

    fn fail(&mut self, error: ChannelError) {
        warn!(channel = %self.config.name, error = %error, "Channel failed");
        self.queue.close();
        self.hooks.on_fatal(&self.config.name, &error);
        self.set_state(ChannelState::Closed);
    }

    fn set_state(&self, state: ChannelState) {
        let previous = self.state_tx.send_replace(state.clone());
        if previous != state {
            debug!(channel = %self.config.name, ?previous, ?state, "State change");
        }
    }
}
