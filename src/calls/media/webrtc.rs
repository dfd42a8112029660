//! Peer adapter backed by `webrtc`.
//!
//! One [`WebRtcPeer`] wraps one `RTCPeerConnection` configured with STUN
//! servers only. Candidates are trickled: the local description is reported
//! as soon as it is set, and every gathered candidate follows as its own
//! event. Remote candidates that arrive before the remote description are
//! held back and applied once it is set.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::sync::Mutex;
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::track::track_local::TrackLocal;

use super::{MediaStream, RemoteMedia};
use crate::calls::error::CallError;
use crate::calls::peer::{PeerAdapter, PeerConnector, PeerEvent, PeerEventSink, PeerRole};
use crate::calls::transport::{IceCandidate, SdpKind, SessionDescription, Signal};
use crate::config::IceServer;

fn negotiation(e: webrtc::Error) -> CallError {
    CallError::Negotiation(e.to_string())
}

/// Builds [`WebRtcPeer`]s.
#[derive(Debug, Default, Clone)]
pub struct WebRtcConnector;

impl WebRtcConnector {
    pub fn new() -> Self {
        Self
    }

    fn create_api() -> Result<webrtc::api::API, webrtc::Error> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        Ok(APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build())
    }
}

#[async_trait]
impl PeerConnector for WebRtcConnector {
    async fn connect(
        &self,
        role: PeerRole,
        media: &MediaStream,
        ice_servers: &[IceServer],
        sink: PeerEventSink,
    ) -> Result<Arc<dyn PeerAdapter>, CallError> {
        let api = Self::create_api().map_err(negotiation)?;
        let config = RTCConfiguration {
            ice_servers: ice_servers.iter().map(to_rtc_ice_server).collect(),
            ..Default::default()
        };
        let pc = Arc::new(api.new_peer_connection(config).await.map_err(negotiation)?);
        let generation = sink.generation();

        let peer = Arc::new(WebRtcPeer::new(role, pc, sink));
        peer.start(media).await?;

        info!(
            "Peer connection created ({role:?}, generation {generation}, {} tracks)",
            media.tracks().len()
        );
        Ok(peer)
    }
}

/// One `RTCPeerConnection` attempt.
pub struct WebRtcPeer {
    role: PeerRole,
    pc: Arc<RTCPeerConnection>,
    sink: PeerEventSink,
    pending_candidates: Mutex<Vec<RTCIceCandidateInit>>,
    has_remote_description: AtomicBool,
    closed: AtomicBool,
}

impl WebRtcPeer {
    fn new(role: PeerRole, pc: Arc<RTCPeerConnection>, sink: PeerEventSink) -> Self {
        Self {
            role,
            pc,
            sink,
            pending_candidates: Mutex::new(Vec::new()),
            has_remote_description: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Publish the local tracks and, as initiator, emit the offer. On failure
    /// the connection is closed before the error is returned.
    async fn start(&self, media: &MediaStream) -> Result<(), CallError> {
        self.install_callbacks();
        if let Err(e) = self.publish(media).await {
            warn!("Peer connection setup failed: {e}");
            self.destroy().await;
            return Err(e);
        }
        Ok(())
    }

    async fn publish(&self, media: &MediaStream) -> Result<(), CallError> {
        for track in media.tracks() {
            let rtc_track: Arc<dyn TrackLocal + Send + Sync> = track.rtc_track();
            let sender = self.pc.add_track(rtc_track).await.map_err(negotiation)?;
            // RTCP has to be drained for the interceptors to run.
            tokio::spawn(async move {
                let mut buf = vec![0u8; 1500];
                while sender.read(&mut buf).await.is_ok() {}
            });
        }

        if self.role == PeerRole::Initiator {
            let offer = self.pc.create_offer(None).await.map_err(negotiation)?;
            self.pc
                .set_local_description(offer.clone())
                .await
                .map_err(negotiation)?;
            let offer = from_rtc_description(&offer)
                .ok_or_else(|| CallError::Negotiation("offer has no sdp type".to_string()))?;
            self.sink.emit(PeerEvent::LocalDescription(offer));
        }
        Ok(())
    }

    fn install_callbacks(&self) {
        let sink = self.sink.clone();
        self.pc.on_ice_candidate(Box::new(move |candidate| {
            let sink = sink.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    debug!("ICE gathering complete");
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => {
                        sink.emit(PeerEvent::LocalCandidate(from_rtc_candidate(init)));
                    }
                    Err(e) => warn!("Failed to serialize local candidate: {e}"),
                }
            })
        }));

        let sink = self.sink.clone();
        let remote: Arc<Mutex<Option<Arc<RemoteMedia>>>> = Arc::new(Mutex::new(None));
        self.pc
            .on_track(Box::new(move |track, _receiver, _transceiver| {
                let sink = sink.clone();
                let remote = remote.clone();
                Box::pin(async move {
                    let mut remote = remote.lock().await;
                    match remote.as_ref() {
                        Some(media) => media.add_track(track).await,
                        None => {
                            let media = Arc::new(RemoteMedia::new(track.stream_id().to_string()));
                            media.add_track(track).await;
                            *remote = Some(media.clone());
                            sink.emit(PeerEvent::RemoteStream(media));
                        }
                    }
                })
            }));

        let sink = self.sink.clone();
        self.pc
            .on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
                let sink = sink.clone();
                Box::pin(async move {
                    debug!("Peer connection state: {state}");
                    match state {
                        RTCPeerConnectionState::Connected => {
                            sink.emit(PeerEvent::Connected);
                        }
                        RTCPeerConnectionState::Failed => {
                            sink.emit(PeerEvent::Error("connection failed".to_string()));
                        }
                        RTCPeerConnectionState::Closed => {
                            sink.emit(PeerEvent::Closed);
                        }
                        _ => {}
                    }
                })
            }));
    }

    async fn apply_description(&self, description: SessionDescription) -> Result<(), CallError> {
        let rtc = to_rtc_description(&description).map_err(negotiation)?;
        self.pc
            .set_remote_description(rtc)
            .await
            .map_err(negotiation)?;
        self.has_remote_description.store(true, Ordering::SeqCst);

        if self.role == PeerRole::Responder && description.kind == SdpKind::Offer {
            let answer = self.pc.create_answer(None).await.map_err(negotiation)?;
            self.pc
                .set_local_description(answer.clone())
                .await
                .map_err(negotiation)?;
            if let Some(answer) = from_rtc_description(&answer) {
                self.sink.emit(PeerEvent::LocalDescription(answer));
            }
        }

        let pending = std::mem::take(&mut *self.pending_candidates.lock().await);
        for candidate in pending {
            if let Err(e) = self.pc.add_ice_candidate(candidate).await {
                debug!("Buffered remote candidate rejected: {e}");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PeerAdapter for WebRtcPeer {
    async fn apply_remote_signal(&self, signal: Signal) -> Result<(), CallError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CallError::ProtocolRace(
                "signal for a destroyed connection".to_string(),
            ));
        }
        match signal {
            Signal::Description(description) => self.apply_description(description).await,
            Signal::Candidate(candidate) => {
                let init = to_rtc_candidate(candidate);
                if !self.has_remote_description.load(Ordering::SeqCst) {
                    debug!("Buffering remote candidate received before the remote description");
                    self.pending_candidates.lock().await.push(init);
                    return Ok(());
                }
                self.pc
                    .add_ice_candidate(init)
                    .await
                    .map_err(|e| CallError::ProtocolRace(e.to_string()))
            }
        }
    }

    async fn destroy(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.pc.close().await {
            warn!("Error closing peer connection: {e}");
        }
        debug!("Peer connection destroyed");
    }
}

fn to_rtc_ice_server(server: &IceServer) -> RTCIceServer {
    RTCIceServer {
        urls: server.urls.clone(),
        ..Default::default()
    }
}

fn to_rtc_description(description: &SessionDescription) -> Result<RTCSessionDescription, webrtc::Error> {
    match description.kind {
        SdpKind::Offer => RTCSessionDescription::offer(description.sdp.clone()),
        SdpKind::Answer => RTCSessionDescription::answer(description.sdp.clone()),
    }
}

fn from_rtc_description(description: &RTCSessionDescription) -> Option<SessionDescription> {
    match description.sdp_type {
        RTCSdpType::Offer => Some(SessionDescription::offer(description.sdp.clone())),
        RTCSdpType::Answer => Some(SessionDescription::answer(description.sdp.clone())),
        _ => None,
    }
}

fn to_rtc_candidate(candidate: IceCandidate) -> RTCIceCandidateInit {
    RTCIceCandidateInit {
        candidate: candidate.candidate,
        sdp_mid: candidate.sdp_mid,
        sdp_mline_index: candidate.sdp_m_line_index,
        username_fragment: candidate.username_fragment,
    }
}

fn from_rtc_candidate(init: RTCIceCandidateInit) -> IceCandidate {
    IceCandidate {
        candidate: init.candidate,
        sdp_mid: init.sdp_mid,
        sdp_m_line_index: init.sdp_mline_index,
        username_fragment: init.username_fragment,
    }
}
