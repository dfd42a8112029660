//! Relay connection seam and per-type envelope dispatch.

use super::signaling::{Envelope, EnvelopeType, Frame};
use crate::types::call::UserId;
use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, warn};
use std::sync::Arc;

/// A text-frame connection to the relay.
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    async fn send_text(&self, text: String) -> Result<(), anyhow::Error>;

    async fn disconnect(&self);
}

/// Handler for one inbound envelope type. Receives the relay-stamped sender.
pub type EnvelopeHandler = Arc<dyn Fn(Option<UserId>, Envelope) + Send + Sync>;

/// Bidirectional envelope channel to the relay.
///
/// Sending is fire-and-forget. Inbound frames are routed to at most one
/// handler per [`EnvelopeType`]; registering a new handler replaces the old.
#[derive(Clone)]
pub struct SignalingChannel {
    transport: Arc<dyn SignalingTransport>,
    handlers: Arc<DashMap<EnvelopeType, EnvelopeHandler>>,
}

impl SignalingChannel {
    pub fn new(transport: Arc<dyn SignalingTransport>) -> Self {
        Self {
            transport,
            handlers: Arc::new(DashMap::new()),
        }
    }

    /// Send an envelope. Failures are logged, never returned.
    pub async fn send(&self, envelope: Envelope) {
        let kind = envelope.kind();
        let to = envelope
            .recipient()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "<relay>".to_string());
        let text = match serde_json::to_string(&Frame::outbound(envelope)) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode {kind} envelope: {e}");
                return;
            }
        };
        if let Err(e) = self.transport.send_text(text).await {
            warn!("Failed to send {kind} envelope to {to}: {e:?}");
        } else {
            debug!("Sent {kind} envelope to {to}");
        }
    }

    pub fn on<F>(&self, kind: EnvelopeType, handler: F)
    where
        F: Fn(Option<UserId>, Envelope) + Send + Sync + 'static,
    {
        if self.handlers.insert(kind, Arc::new(handler)).is_some() {
            debug!("Replaced handler for {kind}");
        }
    }

    pub fn off(&self, kind: EnvelopeType) {
        self.handlers.remove(&kind);
    }

    pub fn has_handler(&self, kind: EnvelopeType) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Route one inbound text frame. Returns `true` if a handler ran.
    pub fn dispatch(&self, text: &str) -> bool {
        let frame: Frame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping malformed relay frame: {e}");
                return false;
            }
        };
        let kind = frame.envelope.kind();
        // Clone out so the handler may call `on`/`off` itself.
        let handler = self.handlers.get(&kind).map(|h| h.value().clone());
        match handler {
            Some(handler) => {
                handler(frame.from, frame.envelope);
                true
            }
            None => {
                debug!("No handler registered for {kind}");
                false
            }
        }
    }

    pub async fn disconnect(&self) {
        self.transport.disconnect().await;
    }
}
