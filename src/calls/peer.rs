//! Peer connection seam.
//!
//! A [`PeerConnector`] builds one [`PeerAdapter`] per negotiation attempt.
//! The adapter reports everything it produces as a [`PeerEvent`] through the
//! [`PeerEventSink`] it was constructed with; the sink stamps each event with
//! the session generation so events from a destroyed adapter are discarded.

use super::error::CallError;
use super::manager::Internal;
use super::media::{MediaStream, RemoteMedia};
use super::transport::{IceCandidate, SessionDescription, Signal};
use crate::config::IceServer;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    /// Creates the offer.
    Initiator,
    /// Answers a remote offer.
    Responder,
}

/// Something the adapter produced or observed.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// The offer (initiator) or answer (responder). Fires once.
    LocalDescription(SessionDescription),
    /// A locally gathered candidate. Fires 0..N times.
    LocalCandidate(IceCandidate),
    /// Inbound media became available.
    RemoteStream(Arc<RemoteMedia>),
    /// The transport reached the connected state.
    Connected,
    Closed,
    Error(String),
}

/// Where an adapter delivers its events.
#[derive(Debug, Clone)]
pub struct PeerEventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<Internal>,
}

impl PeerEventSink {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<Internal>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns `false` once the session has shut down.
    pub fn emit(&self, event: PeerEvent) -> bool {
        self.tx
            .send(Internal::Peer {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// One live peer connection.
#[async_trait]
pub trait PeerAdapter: Send + Sync {
    /// Apply a remote description or candidate. A candidate that arrives
    /// before any remote description is buffered by the adapter.
    async fn apply_remote_signal(&self, signal: Signal) -> Result<(), CallError>;

    /// Release every resource. Safe to call more than once.
    async fn destroy(&self);
}

/// Builds adapters. The initiator emits its offer on its own once built.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn connect(
        &self,
        role: PeerRole,
        media: &MediaStream,
        ice_servers: &[IceServer],
        sink: PeerEventSink,
    ) -> Result<Arc<dyn PeerAdapter>, CallError>;
}

/// Progress of the local half of the negotiation. Candidates may only be
/// forwarded once the local description has gone out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NegotiationPhase {
    #[default]
    AwaitingLocalDescription,
    LocalDescriptionSent,
    Connected,
    Closed,
}

impl NegotiationPhase {
    pub fn can_send_candidates(&self) -> bool {
        matches!(self, Self::LocalDescriptionSent | Self::Connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_gated_on_description() {
        assert!(!NegotiationPhase::AwaitingLocalDescription.can_send_candidates());
        assert!(NegotiationPhase::LocalDescriptionSent.can_send_candidates());
        assert!(NegotiationPhase::Connected.can_send_candidates());
        assert!(!NegotiationPhase::Closed.can_send_candidates());
    }

    #[test]
    fn test_sink_stamps_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = PeerEventSink::new(7, tx);
        assert!(sink.emit(PeerEvent::Connected));

        match rx.try_recv() {
            Ok(Internal::Peer { generation, event }) => {
                assert_eq!(generation, 7);
                assert!(matches!(event, PeerEvent::Connected));
            }
            other => panic!("unexpected internal event: {other:?}"),
        }

        drop(rx);
        assert!(!sink.emit(PeerEvent::Closed));
    }
}
