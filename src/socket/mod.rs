//! WebSocket connection to the signaling relay.

use crate::calls::SignalingTransport;
use crate::types::call::UserId;
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, trace, warn};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// An event produced by the relay connection.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Connected,
    /// One JSON text frame from the relay.
    TextReceived(String),
    Disconnected,
}

type RawWs = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<RawWs, Message>;
type WsStream = SplitStream<RawWs>;

/// The relay identifies clients by a `userId` query parameter.
pub fn relay_url(relay: &str, user: &UserId) -> String {
    let separator = if relay.contains('?') { '&' } else { '?' };
    format!(
        "{relay}{separator}userId={}",
        urlencoding::encode(user.as_str())
    )
}

pub struct WsTransport {
    ws_sink: Mutex<Option<WsSink>>,
}

impl WsTransport {
    /// Dial the relay and start the read pump.
    pub async fn connect(
        relay: &str,
        user: &UserId,
    ) -> Result<(Arc<Self>, mpsc::Receiver<TransportEvent>), anyhow::Error> {
        let url = relay_url(relay, user);
        info!("Dialing {url}");
        let (client, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| anyhow::anyhow!("WebSocket connect failed: {}", e))?;
        let (sink, stream) = client.split();

        let (event_tx, event_rx) = mpsc::channel(100);
        let transport = Arc::new(Self {
            ws_sink: Mutex::new(Some(sink)),
        });
        tokio::spawn(read_pump(stream, event_tx.clone()));
        let _ = event_tx.send(TransportEvent::Connected).await;

        Ok((transport, event_rx))
    }
}

#[async_trait]
impl SignalingTransport for WsTransport {
    async fn send_text(&self, text: String) -> Result<(), anyhow::Error> {
        let mut sink_guard = self.ws_sink.lock().await;
        let sink = sink_guard
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Socket is closed"))?;
        debug!("--> Sending frame: {} bytes", text.len());
        sink.send(Message::text(text))
            .await
            .map_err(|e| anyhow::anyhow!("WebSocket send error: {}", e))
    }

    async fn disconnect(&self) {
        if let Some(mut sink) = self.ws_sink.lock().await.take() {
            if let Err(e) = sink.close().await {
                debug!("Error closing websocket: {e}");
            }
        }
    }
}

async fn read_pump(mut stream: WsStream, event_tx: mpsc::Sender<TransportEvent>) {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                trace!("<-- Received frame: {} bytes", text.len());
                if event_tx
                    .send(TransportEvent::TextReceived(text.to_string()))
                    .await
                    .is_err()
                {
                    warn!("Event receiver dropped, closing read pump");
                    break;
                }
            }
            Some(Ok(Message::Close(_))) => {
                trace!("Received close frame");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                error!("Error reading from websocket: {e}");
                break;
            }
            None => break,
        }
    }
    let _ = event_tx.send(TransportEvent::Disconnected).await;
}
