//! Peer-to-peer audio/video calls negotiated over a relay.
//!
//! # Architecture
//!
//! - [`SignalingChannel`]: envelope send plus per-type dispatch over a [`SignalingTransport`]
//! - [`MediaDevices`]: local capture acquisition
//! - [`PeerAdapter`] & [`PeerConnector`]: one peer connection attempt, reporting [`PeerEvent`]s
//! - [`CallSession`]: the call state machine data
//! - [`CallManager`] & [`CallHandle`]: the actor owning the session and its command surface
//! - [`CallEventRouter`]: feeds relay envelopes into the manager
//!
//! # Protocol Overview
//!
//! The caller acquires media, builds an initiator adapter and sends its offer
//! as `call-invite`. The callee stays `incoming` until the user accepts, then
//! acquires media, applies the offer and replies with `call-accept`. Both
//! sides trickle `ice-candidate` envelopes, each only after their own
//! description went out. `call-reject` and `call-end` tear the session down.

mod channel;
mod error;
mod handler;
mod manager;
pub mod media;
mod peer;
mod signaling;
mod state;
mod transport;


pub use channel::{EnvelopeHandler, SignalingChannel, SignalingTransport};
pub use error::{CallError, DeviceError};
pub use handler::CallEventRouter;
pub use manager::{CallContext, CallHandle, CallManager, RemoteEvent};
pub use media::webrtc::WebRtcConnector;
pub use media::{
    DeviceSet, LocalTrack, MediaDevices, MediaStream, RemoteMedia, TrackDevices, TrackKind,
};
pub use peer::{NegotiationPhase, PeerAdapter, PeerConnector, PeerEvent, PeerEventSink, PeerRole};
pub use signaling::{
    CallAccept, CallEnd, CallInvite, CallReject, CandidateMessage, Envelope, EnvelopeType, Frame,
    OnlineUsers,
};
pub use state::{CallSession, CallSnapshot, CallTransition, InvalidTransition, Released};
pub use transport::{IceCandidate, SdpKind, SessionDescription, Signal};
