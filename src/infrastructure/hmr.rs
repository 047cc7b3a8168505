use crate::core::interfaces::HmrBroadcaster;
use crate::core::protocol::HmrPayload;
use crate::utils::{EmberError, Logger, Result};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use uuid::Uuid;

/// A parsed `custom` message received from a browser
#[derive(Debug, Clone, PartialEq)]
pub struct ClientMessage {
    pub client_id: String,
    pub payload: HmrPayload,
}

#[derive(Debug)]
struct HmrClient {
    sender: mpsc::UnboundedSender<Message>,
    connected_at: SystemTime,
}

/// Server side of the HMR WebSocket channel.
///
/// Broadcasts are fire-and-forget: a connection that is gone when a payload
/// goes out is dropped from the registry and never receives a replay.
#[derive(Clone)]
pub struct HmrChannel {
    clients: Arc<DashMap<String, HmrClient>>,
    client_messages: broadcast::Sender<ClientMessage>,
}

impl HmrChannel {
    pub fn new() -> Self {
        let (client_messages, _) = broadcast::channel(256);

        Self {
            clients: Arc::new(DashMap::new()),
            client_messages,
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Fan `payload` out to every open connection; returns how many it reached.
    pub fn send(&self, payload: &HmrPayload) -> Result<usize> {
        let text = serde_json::to_string(payload)?;

        let mut reached = 0;
        let mut closed = Vec::new();
        for entry in self.clients.iter() {
            if entry.sender.send(Message::Text(text.clone())).is_ok() {
                reached += 1;
            } else {
                closed.push(entry.key().clone());
            }
        }

        for client_id in closed {
            if let Some((_, client)) = self.clients.remove(&client_id) {
                Logger::debug(&format!(
                    "Dropped closed HMR client {} (connected {:.1?} ago)",
                    client_id,
                    client.connected_at.elapsed().unwrap_or_default()
                ));
            }
        }

        Ok(reached)
    }

    /// `custom` messages sent upstream by clients
    pub fn subscribe_client_messages(&self) -> broadcast::Receiver<ClientMessage> {
        self.client_messages.subscribe()
    }

    pub async fn bind(host: &str, port: u16) -> Result<TcpListener> {
        let addr = format!("{}:{}", host, port);
        TcpListener::bind(&addr)
            .await
            .map_err(|e| EmberError::channel(format!("HMR server bind to {} failed: {}", addr, e)))
    }

    /// Accept connections until the listener fails.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!("🔥 HMR channel listening on ws://{}", addr);
        }

        loop {
            let (stream, addr) = listener.accept().await?;
            let channel = self.clone();

            tokio::spawn(async move {
                if let Err(e) = channel.handle_client(stream, addr).await {
                    Logger::warn(&format!("HMR client error {}: {}", addr, e));
                }
            });
        }
    }

    pub async fn start_server(&self, host: &str, port: u16) -> Result<()> {
        let listener = Self::bind(host, port).await?;
        self.serve(listener).await
    }

    async fn handle_client(&self, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        let ws_stream = accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let client_id = Uuid::new_v4().to_string();

        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        // queued before registration so `connected` precedes any broadcast
        let connected = serde_json::to_string(&HmrPayload::Connected)?;
        let _ = tx.send(Message::Text(connected));

        self.clients.insert(
            client_id.clone(),
            HmrClient {
                sender: tx,
                connected_at: SystemTime::now(),
            },
        );
        tracing::info!("🔌 HMR client connected: {} ({})", client_id, addr);

        let writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if ws_sender.send(message).await.is_err() {
                    break;
                }
            }
        });

        while let Some(frame) = ws_receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => self.handle_client_text(&client_id, &text),
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }

        self.clients.remove(&client_id);
        writer.abort();
        tracing::info!("🔌 HMR client disconnected: {}", client_id);

        Ok(())
    }

    fn handle_client_text(&self, client_id: &str, text: &str) {
        let payload = match serde_json::from_str::<HmrPayload>(text) {
            Ok(payload) => payload,
            Err(e) => {
                Logger::warn(&format!("Ignoring malformed message from {}: {}", client_id, e));
                return;
            }
        };

        match &payload {
            HmrPayload::Custom { event, data } => {
                tracing::info!("📨 {} from {}: {}", event, client_id, data);
                // no subscribers is fine
                let _ = self.client_messages.send(ClientMessage {
                    client_id: client_id.to_string(),
                    payload,
                });
            }
            other => Logger::debug(&format!("Ignoring {} message from {}", other.kind(), client_id)),
        }
    }
}

impl Default for HmrChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl HmrBroadcaster for HmrChannel {
    fn broadcast(&self, payload: &HmrPayload) -> Result<usize> {
        self.send(payload)
    }
}
