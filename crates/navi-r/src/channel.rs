//! Client side of the shared event channel.
//!
//! One reader task owns the WebSocket connection, decodes text frames into
//! [`ChannelMessage`]s and fans them out over a broadcast channel. Traffic for
//! other features is dropped here; correlation is left to the orchestrator.

use futures::StreamExt;
use navi_common::protocol::ChannelMessage;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, trace, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Invalid event channel URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Unsupported event channel scheme: {0}")]
    UnsupportedScheme(String),
}

pub struct EventChannel {
    url: Url,
    events_tx: broadcast::Sender<ChannelMessage>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl EventChannel {
    /// Spawn the reader task. Connection failures are retried every
    /// `reconnect_delay` until the channel is closed or dropped.
    pub fn connect(
        url: &str,
        capacity: usize,
        reconnect_delay: Duration,
    ) -> Result<Self, ChannelError> {
        let url = Url::parse(url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ChannelError::UnsupportedScheme(url.scheme().to_string()));
        }

        let (events_tx, _) = broadcast::channel(capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(
            url.clone(),
            events_tx.clone(),
            shutdown_rx,
            reconnect_delay,
        ));

        Ok(Self {
            url,
            events_tx,
            shutdown_tx,
            task,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChannelMessage> {
        self.events_tx.subscribe()
    }

    /// Stop the reader task and wait for it to finish.
    pub async fn close(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            warn!("Event channel reader ended abnormally: {}", e);
        }
    }
}

/// Decode one text frame. Unrelated or malformed traffic yields `None`.
pub fn parse_frame(text: &str) -> Option<ChannelMessage> {
    match serde_json::from_str::<ChannelMessage>(text) {
        Ok(ChannelMessage::Unknown) => {
            trace!("Skipping unrelated channel message");
            None
        }
        Ok(msg) => Some(msg),
        Err(e) => {
            warn!("Failed to parse channel message: {} | Text: {}", e, text);
            None
        }
    }
}

async fn run(
    url: Url,
    events_tx: broadcast::Sender<ChannelMessage>,
    mut shutdown_rx: watch::Receiver<bool>,
    reconnect_delay: Duration,
) {
    loop {
        let connected = tokio::select! {
            _ = shutdown_rx.changed() => break,
            result = connect_async(url.as_str()) => result,
        };

        match connected {
            Ok((ws, _)) => {
                info!("Connected to event channel {}", url);
                if read_frames(ws, &events_tx, &mut shutdown_rx).await {
                    break;
                }
            }
            Err(e) => warn!("Failed to connect to event channel {}: {}", url, e),
        }

        tokio::select! {
            _ = shutdown_rx.changed() => break,
            _ = tokio::time::sleep(reconnect_delay) => {
                debug!("Reconnecting to event channel {}", url);
            }
        }
    }
    info!("Event channel reader stopped");
}

/// Returns true when shutdown was requested, false when the connection ended.
async fn read_frames(
    mut ws: WsStream,
    events_tx: &broadcast::Sender<ChannelMessage>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> bool {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if let Err(e) = ws.close(None).await {
                    debug!("Error closing event channel: {}", e);
                }
                return true;
            }
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Some(msg) = parse_frame(&text) {
                        // No subscribers is not an error.
                        let _ = events_tx.send(msg);
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("Event channel closed by server");
                    return false;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("Event channel error: {}", e);
                    return false;
                }
            }
        }
    }
}
