//! Physical connection plumbing: frames, the writer/connector seams, and the
//! heartbeat bookkeeping of one connection.

use std::{
    pin::Pin,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt, future};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;

use super::protocol::WsMessage;
use crate::error::{ChannelError, ChannelResult};

/// One WebSocket frame as seen by the channel driver.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

impl Frame {
    pub(crate) fn len(&self) -> usize {
        match self {
            Self::Text(t) => t.len(),
            Self::Binary(b) => b.len(),
            _ => 0,
        }
    }
}

impl From<WsMessage> for Frame {
    fn from(message: WsMessage) -> Self {
        match message {
            WsMessage::Text(text) => Self::Text(text),
            WsMessage::Binary(data) => Self::Binary(data),
        }
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(data) => Message::Binary(data),
            Frame::Ping(data) => Message::Ping(data),
            Frame::Pong(data) => Message::Pong(data),
            Frame::Close => Message::Close(None),
        }
    }
}

fn frame_from_message(message: Message) -> Option<Frame> {
    match message {
        Message::Text(text) => Some(Frame::Text(text)),
        Message::Binary(data) => Some(Frame::Binary(data)),
        Message::Ping(data) => Some(Frame::Ping(data)),
        Message::Pong(data) => Some(Frame::Pong(data)),
        Message::Close(_) => Some(Frame::Close),
        Message::Frame(_) => None,
    }
}

/// Inbound half of a connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = ChannelResult<Frame>> + Send>>;

/// Outbound half of a connection.
#[async_trait]
pub trait WsWriter: Send {
    async fn send_frame(&mut self, frame: Frame) -> ChannelResult<()>;

    /// Close the connection politely. Errors are not interesting here.
    async fn close(&mut self) {
        let _ = self.send_frame(Frame::Close).await;
    }
}

/// An established connection, split into its two halves.
pub struct Connection {
    pub reader: FrameStream,
    pub writer: Box<dyn WsWriter>,
}

/// Opens physical connections.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> ChannelResult<Connection>;
}

/// [`Connector`] backed by tokio-tungstenite.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsConnector;

struct TungsteniteWriter<S> {
    inner: S,
}

#[async_trait]
impl<S> WsWriter for TungsteniteWriter<S>
where
    S: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin + Send,
{
    async fn send_frame(&mut self, frame: Frame) -> ChannelResult<()> {
        self.inner.send(frame.into()).await.map_err(Into::into)
    }

    async fn close(&mut self) {
        let _ = self.inner.send(Message::Close(None)).await;
        let _ = self.inner.close().await;
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> ChannelResult<Connection> {
        debug!(%url, "Opening WebSocket");
        let (ws, _response) = connect_async(url).await?;
        let (write, read) = ws.split();

        let reader = read
            .filter_map(|result| {
                future::ready(match result {
                    Ok(message) => frame_from_message(message).map(Ok),
                    Err(err) => Some(Err(ChannelError::from(err))),
                })
            })
            .boxed();

        Ok(Connection {
            reader,
            writer: Box::new(TungsteniteWriter { inner: write }),
        })
    }
}

pub(crate) async fn send_ws_message(
    writer: &mut dyn WsWriter,
    message: WsMessage,
) -> ChannelResult<()> {
    writer.send_frame(message.into()).await
}

/// Outcome of a heartbeat tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum HeartbeatTick {
    /// Send the next ping.
    Ping,
    /// Too many pings went unanswered; the connection is considered dead.
    Expired { missed: u32 },
}

/// Ping/pong bookkeeping for one connection.
#[derive(Debug)]
pub(crate) struct Heartbeat {
    pong_timeout: Duration,
    max_missed: u32,
    awaiting_since: Option<Instant>,
    missed: u32,
    last_activity: Instant,
}

impl Heartbeat {
    pub(crate) fn new(pong_timeout: Duration, max_missed: u32, now: Instant) -> Self {
        Self {
            pong_timeout,
            max_missed,
            awaiting_since: None,
            missed: 0,
            last_activity: now,
        }
    }

    /// An overdue unanswered ping counts as one miss; the ping sent on this
    /// tick then starts a new wait.
    pub(crate) fn on_tick(&mut self, now: Instant) -> HeartbeatTick {
        match self.awaiting_since {
            Some(sent) if now.saturating_duration_since(sent) > self.pong_timeout => {
                self.missed += 1;
                if self.missed >= self.max_missed {
                    return HeartbeatTick::Expired {
                        missed: self.missed,
                    };
                }
                self.awaiting_since = Some(now);
            }
            Some(_) => {}
            None => self.awaiting_since = Some(now),
        }
        HeartbeatTick::Ping
    }

    pub(crate) fn on_pong(&mut self, now: Instant) {
        self.awaiting_since = None;
        self.missed = 0;
        self.last_activity = now;
    }

    pub(crate) fn on_activity(&mut self, now: Instant) {
        self.last_activity = now;
    }

    pub(crate) fn last_activity(&self) -> Instant {
        self.last_activity
    }

    pub(crate) fn missed(&self) -> u32 {
        self.missed
    }
}
