//! Outbound command queue.

use std::{collections::VecDeque, time::Instant};

use tracing::{debug, warn};

use super::{
    protocol::ChannelProtocol,
    transport::{WsWriter, send_ws_message},
    types::{Command, PendingCommand},
};
use crate::error::ChannelResult;

/// FIFO of commands waiting for an open connection.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    commands: VecDeque<PendingCommand>,
    closed: bool,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command. Returns `false` if the queue is closed and the
    /// command was dropped.
    pub fn enqueue(&mut self, command: Command) -> bool {
        if self.closed {
            debug!(command = %command.name, "Dropping command on closed channel");
            return false;
        }
        self.commands.push_back(PendingCommand {
            command,
            enqueued_at: Instant::now(),
        });
        true
    }

    /// Send every queued command in order.
    ///
    /// A command leaves the queue only once it was written. On error the
    /// failed command and everything behind it stay queued for the next
    /// connection. Commands that cannot be encoded are dropped.
    pub async fn flush<P>(&mut self, protocol: &P, writer: &mut dyn WsWriter) -> ChannelResult<usize>
    where
        P: ChannelProtocol + ?Sized,
    {
        let mut sent = 0;
        while let Some(pending) = self.commands.front() {
            let message = match protocol.encode_command(&pending.command) {
                Ok(message) => message,
                Err(err) => {
                    warn!(command = %pending.command.name, error = %err, "Dropping unencodable command");
                    self.commands.pop_front();
                    continue;
                }
            };
            send_ws_message(writer, message).await?;
            if let Some(pending) = self.commands.pop_front() {
                debug!(
                    command = %pending.command.name,
                    queued_ms = pending.enqueued_at.elapsed().as_millis(),
                    "Command sent"
                );
            }
            sent += 1;
        }
        Ok(sent)
    }

    /// Discard everything and refuse further commands.
    pub fn close(&mut self) -> usize {
        self.closed = true;
        let dropped = self.commands.len();
        self.commands.clear();
        dropped
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::{
        channel::{handlers::JsonEnvelopeProtocol, transport::Frame},
        error::ChannelError,
    };

    #[derive(Default)]
    struct RecordingWriter {
        sent: Vec<String>,
        fail_after: Option<usize>,
    }

    #[async_trait]
    impl WsWriter for RecordingWriter {
        async fn send_frame(&mut self, frame: Frame) -> ChannelResult<()> {
            if self.fail_after.is_some_and(|limit| self.sent.len() >= limit) {
                return Err(ChannelError::transport("broken pipe"));
            }
            if let Frame::Text(text) = frame {
                self.sent.push(text);
            }
            Ok(())
        }
    }

    fn names(writer: &RecordingWriter) -> Vec<String> {
        writer
            .sent
            .iter()
            .map(|text| {
                let value: serde_json::Value = serde_json::from_str(text).expect("json");
                value["d"].as_str().unwrap_or_default().to_string()
            })
            .collect()
    }

    #[tokio::test]
    async fn flush_sends_in_fifo_order_and_clears() {
        let mut queue = OutboundQueue::new();
        queue.enqueue(Command::cancel("a"));
        queue.enqueue(Command::accept("b"));
        queue.enqueue(Command::decline("c"));

        let mut writer = RecordingWriter::default();
        let sent = queue
            .flush(&JsonEnvelopeProtocol::new(), &mut writer)
            .await
            .expect("flush");

        assert_eq!(sent, 3);
        assert!(queue.is_empty());
        assert_eq!(names(&writer), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn failed_flush_keeps_unsent_tail() {
        let mut queue = OutboundQueue::new();
        for id in ["a", "b", "c"] {
            queue.enqueue(Command::cancel(id));
        }

        let mut broken = RecordingWriter {
            fail_after: Some(1),
            ..Default::default()
        };
        let protocol = JsonEnvelopeProtocol::new();
        assert!(queue.flush(&protocol, &mut broken).await.is_err());
        assert_eq!(names(&broken), vec!["a"]);
        assert_eq!(queue.len(), 2);

        let mut healthy = RecordingWriter::default();
        queue.flush(&protocol, &mut healthy).await.expect("flush");
        assert_eq!(names(&healthy), vec!["b", "c"]);

        let mut again = RecordingWriter::default();
        assert_eq!(queue.flush(&protocol, &mut again).await.expect("flush"), 0);
        assert!(again.sent.is_empty());
    }

    #[test]
    fn closed_queue_drops_commands() {
        let mut queue = OutboundQueue::new();
        queue.enqueue(Command::new("startWatching", json!(["g1"])));
        assert_eq!(queue.close(), 1);
        assert!(queue.is_closed());
        assert!(!queue.enqueue(Command::cancel("late")));
        assert!(queue.is_empty());
    }
}
