use crate::error::TransportError;
use crate::transport::{RelayChannel, RelayConnector};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// [`RelayConnector`] over a websocket.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl RelayConnector for WsConnector {
    async fn connect(&self) -> Result<RelayChannel, TransportError> {
        let (socket, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Socket(format!("Failed to connect: {}", e)))?;
        info!("Relay websocket connected: {}", self.url);

        let (mut sender, mut receiver) = socket.split();
        let (out_tx, mut out_rx) = mpsc::channel::<String>(64);
        let (in_tx, in_rx) = mpsc::channel::<String>(256);

        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if let Err(e) = sender.send(Message::Text(text.into())).await {
                    warn!("Relay websocket send failed: {}", e);
                    break;
                }
            }
            let _ = sender.close().await;
            debug!("Relay websocket writer finished");
        });

        tokio::spawn(async move {
            while let Some(msg) = receiver.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if in_tx.send(text.to_string()).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Relay websocket error: {}", e);
                        break;
                    }
                }
            }
            debug!("Relay websocket reader finished");
        });

        Ok(RelayChannel {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }
}
