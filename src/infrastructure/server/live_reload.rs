use crate::core::interfaces::ReloadSignal;
use crate::utils::Logger;
use axum::extract::ws::{Message, WebSocket};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LiveReloadMessage {
    Connected,
    Reload { reason: String },
}

#[derive(Debug, Clone)]
pub struct LiveReloadClient {
    pub id: String,
    pub connected_at: SystemTime,
}

/// Connected browsers and the broadcast channel that reaches them.
#[derive(Clone)]
pub struct LiveReloadHub {
    clients: Arc<DashMap<String, LiveReloadClient>>,
    sender: broadcast::Sender<LiveReloadMessage>,
}

impl LiveReloadHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self {
            clients: Arc::new(DashMap::new()),
            sender,
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveReloadMessage> {
        self.sender.subscribe()
    }

    /// Serves one browser until either side closes.
    pub async fn handle_socket(self, socket: WebSocket) {
        let (mut sender, mut receiver) = socket.split();
        let mut updates = self.sender.subscribe();

        let id = Uuid::new_v4().to_string();
        self.clients.insert(
            id.clone(),
            LiveReloadClient {
                id: id.clone(),
                connected_at: SystemTime::now(),
            },
        );
        Logger::debug(&format!("🔌 Live reload client {} connected", id));

        if send(&mut sender, &LiveReloadMessage::Connected).await {
            loop {
                tokio::select! {
                    incoming = receiver.next() => match incoming {
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    },
                    update = updates.recv() => match update {
                        Ok(message) => {
                            if !send(&mut sender, &message).await {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        }

        self.clients.remove(&id);
        Logger::debug(&format!("🔌 Live reload client {} disconnected", id));
    }
}

async fn send<S>(sender: &mut S, message: &LiveReloadMessage) -> bool
where
    S: futures::Sink<Message> + Unpin,
{
    let Ok(json) = serde_json::to_string(message) else {
        return false;
    };
    sender.send(Message::Text(json)).await.is_ok()
}

impl Default for LiveReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ReloadSignal for LiveReloadHub {
    fn reload(&self, reason: &str) {
        Logger::info(&format!(
            "🔄 Reloading {} browser(s) after '{}'",
            self.clients.len(),
            reason
        ));
        // No receivers just means no browser is open.
        let _ = self.sender.send(LiveReloadMessage::Reload {
            reason: reason.to_string(),
        });
    }
}
