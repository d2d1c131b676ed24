//! Lobby seek example
//!
//! Opens the lobby channel against a local stand-in server that pushes a few
//! versioned lobby events, skips a version to force a resync, and logs the
//! commands it receives.
//!
//! Run with: `RUST_LOG=chess_channel=debug cargo run -p chess-channel --example lobby_seek`

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chess_channel::{
    ChannelResult,
    channel::{
        Channel, ChannelConfig, ChannelName, ChannelSnapshot, Command, FULL_STATE_EVENT,
        HandlerRegistry, StateFetcher,
    },
    hooks::LoggingHooks,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Stands in for the HTTP lobby endpoint.
struct LobbyApi;

#[async_trait]
impl StateFetcher for LobbyApi {
    async fn fetch_channel_state(&self, channel: &ChannelName) -> ChannelResult<ChannelSnapshot> {
        tracing::info!(%channel, "Fetching lobby state");
        Ok(ChannelSnapshot::new(
            4,
            json!({"hooks": [{"id": "h1", "clock": "5+3"}, {"id": "h4", "clock": "3+2"}]}),
        ))
    }
}

async fn lobby_server(listener: TcpListener) {
    let Ok((stream, _)) = listener.accept().await else {
        return;
    };
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };

    let pushes = [
        json!({"t": "n", "d": 1520}),
        json!({"t": "had", "d": {"id": "h1", "clock": "5+3"}, "v": 1}),
        json!({"t": "had", "d": {"id": "h2", "clock": "1+0"}, "v": 2}),
        json!({"t": "had", "d": {"id": "h2", "clock": "1+0"}, "v": 2}),
        json!({"t": "hrm", "d": "h2", "v": 4}),
    ];
    for push in pushes {
        if ws.send(Message::Text(push.to_string())).await.is_err() {
            return;
        }
    }

    while let Some(Ok(message)) = ws.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) else {
            continue;
        };
        match value["t"].as_str() {
            Some("p") => {
                let _ = ws.send(Message::Text(json!({"t": "n", "d": 1521}).to_string())).await;
            }
            Some("cancel") => {
                tracing::info!(hook = %value["d"], "Server: seek cancelled");
                let redirect = json!({"t": "redirect", "d": {"id": "gameXyz", "url": "/gameXyz"}});
                let _ = ws.send(Message::Text(redirect.to_string())).await;
            }
            _ => tracing::info!(%text, "Server: received"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chess_channel=debug,lobby_seek=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let endpoint = format!("ws://{}/lobby/socket/v1", listener.local_addr()?);
    tokio::spawn(lobby_server(listener));

    let handlers = HandlerRegistry::builder()
        .on("n", |envelope| tracing::info!(players = %envelope.payload, "Players online"))
        .on("had", |envelope| tracing::info!(hook = %envelope.payload, "Hook added"))
        .on("hrm", |envelope| tracing::info!(hook = %envelope.payload, "Hook removed"))
        .on("redirect", |envelope| tracing::info!(game = %envelope.payload["id"], "Game starts"))
        .on(FULL_STATE_EVENT, |envelope| {
            tracing::info!(version = ?envelope.version, state = %envelope.payload, "Lobby reloaded")
        })
        .build();

    let config = ChannelConfig::new(ChannelName::lobby(), endpoint, 0)
        .heartbeat_interval(Duration::from_millis(500));
    let lobby = Channel::open(config, handlers, Arc::new(LobbyApi), Arc::new(LoggingHooks))?;

    lobby.send(Command::cancel("h1")).await?;
    tokio::time::sleep(Duration::from_secs(2)).await;

    tracing::info!(
        version = lobby.version(),
        peers = ?lobby.connected_peers(),
        state = ?lobby.state(),
        "Closing lobby"
    );
    lobby.close().await?;
    lobby.closed().await;
    Ok(())
}
