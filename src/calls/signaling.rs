//! Call signaling envelopes relayed between two clients.
//!
//! Every envelope is addressed to exactly one user. The relay stamps the
//! sender's identity into the enclosing [`Frame`] on delivery.

use super::transport::{IceCandidate, SessionDescription};
use crate::types::call::{CallType, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Envelope types understood by the call subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeType {
    /// Caller → callee: offer plus caller identity.
    CallInvite,
    /// Callee → caller: the answer.
    CallAccept,
    /// Callee → caller: declined (or busy).
    CallReject,
    /// Either side hung up.
    CallEnd,
    /// Trickled ICE candidate, either direction.
    IceCandidate,
    /// Relay → client: current presence list.
    OnlineUsers,
}

impl EnvelopeType {
    /// All envelope types in order.
    pub const ALL: [EnvelopeType; 6] = [
        Self::CallInvite,
        Self::CallAccept,
        Self::CallReject,
        Self::CallEnd,
        Self::IceCandidate,
        Self::OnlineUsers,
    ];

    /// The `type` tag used on the wire.
    pub const fn tag_name(&self) -> &'static str {
        match self {
            Self::CallInvite => "call-invite",
            Self::CallAccept => "call-accept",
            Self::CallReject => "call-reject",
            Self::CallEnd => "call-end",
            Self::IceCandidate => "ice-candidate",
            Self::OnlineUsers => "online-users",
        }
    }
}

impl fmt::Display for EnvelopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallInvite {
    pub to: UserId,
    pub from_identity: UserId,
    pub display_name: String,
    #[serde(default)]
    pub avatar_ref: Option<String>,
    pub offer_signal: SessionDescription,
    #[serde(default)]
    pub call_type: CallType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallAccept {
    pub to: UserId,
    pub answer_signal: SessionDescription,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallReject {
    pub to: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEnd {
    pub to: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateMessage {
    pub to: UserId,
    pub candidate: IceCandidate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineUsers {
    pub users: Vec<UserId>,
}

/// A typed signaling envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum Envelope {
    CallInvite(CallInvite),
    CallAccept(CallAccept),
    CallReject(CallReject),
    CallEnd(CallEnd),
    IceCandidate(CandidateMessage),
    OnlineUsers(OnlineUsers),
}

impl Envelope {
    pub fn kind(&self) -> EnvelopeType {
        match self {
            Self::CallInvite(_) => EnvelopeType::CallInvite,
            Self::CallAccept(_) => EnvelopeType::CallAccept,
            Self::CallReject(_) => EnvelopeType::CallReject,
            Self::CallEnd(_) => EnvelopeType::CallEnd,
            Self::IceCandidate(_) => EnvelopeType::IceCandidate,
            Self::OnlineUsers(_) => EnvelopeType::OnlineUsers,
        }
    }

    /// Addressee, for envelopes that have one.
    pub fn recipient(&self) -> Option<&UserId> {
        match self {
            Self::CallInvite(e) => Some(&e.to),
            Self::CallAccept(e) => Some(&e.to),
            Self::CallReject(e) => Some(&e.to),
            Self::CallEnd(e) => Some(&e.to),
            Self::IceCandidate(e) => Some(&e.to),
            Self::OnlineUsers(_) => None,
        }
    }

    pub fn reject(to: UserId) -> Self {
        Self::CallReject(CallReject { to })
    }

    pub fn end(to: UserId) -> Self {
        Self::CallEnd(CallEnd { to })
    }

    pub fn candidate(to: UserId, candidate: IceCandidate) -> Self {
        Self::IceCandidate(CandidateMessage { to, candidate })
    }
}

/// One JSON text frame on the relay connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Sender, stamped by the relay. Absent on frames we send.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<UserId>,
    pub envelope: Envelope,
}

impl Frame {
    pub fn outbound(envelope: Envelope) -> Self {
        Self {
            from: None,
            envelope,
        }
    }

    pub fn inbound(from: UserId, envelope: Envelope) -> Self {
        Self {
            from: Some(from),
            envelope,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_names_match_serde_tags() {
        let samples = [
            Envelope::reject(UserId::new("bob")),
            Envelope::end(UserId::new("bob")),
            Envelope::candidate(UserId::new("bob"), IceCandidate::new("candidate:1")),
            Envelope::OnlineUsers(OnlineUsers { users: vec![] }),
        ];
        for envelope in samples {
            let json = serde_json::to_value(&envelope).unwrap();
            assert_eq!(json["type"], envelope.kind().tag_name());
        }
    }

    #[test]
    fn test_invite_wire_format() {
        let envelope = Envelope::CallInvite(CallInvite {
            to: UserId::new("bob"),
            from_identity: UserId::new("alice"),
            display_name: "Alice".to_string(),
            avatar_ref: Some("/avatars/alice.png".to_string()),
            offer_signal: SessionDescription::offer("v=0"),
            call_type: CallType::Video,
        });
        let json = serde_json::to_value(Frame::outbound(envelope.clone())).unwrap();

        assert!(json.get("from").is_none());
        assert_eq!(json["envelope"]["type"], "call-invite");
        let payload = &json["envelope"]["payload"];
        assert_eq!(payload["to"], "bob");
        assert_eq!(payload["fromIdentity"], "alice");
        assert_eq!(payload["displayName"], "Alice");
        assert_eq!(payload["avatarRef"], "/avatars/alice.png");
        assert_eq!(payload["offerSignal"]["type"], "offer");
        assert_eq!(payload["callType"], "video");
        assert_eq!(envelope.kind(), EnvelopeType::CallInvite);
        assert_eq!(envelope.recipient(), Some(&UserId::new("bob")));
    }

    #[test]
    fn test_inbound_frame_with_sender() {
        let raw = r#"{"from":"bob","envelope":{"type":"call-reject","payload":{"to":"alice"}}}"#;
        let frame: Frame = serde_json::from_str(raw).unwrap();
        assert_eq!(frame.from, Some(UserId::new("bob")));
        assert_eq!(frame.envelope, Envelope::reject(UserId::new("alice")));
    }

    #[test]
    fn test_invite_defaults_to_audio() {
        let raw = r#"{"type":"call-invite","payload":{"to":"bob","fromIdentity":"alice","displayName":"Alice","offerSignal":{"type":"offer","sdp":"v=0"}}}"#;
        let Envelope::CallInvite(invite) = serde_json::from_str::<Envelope>(raw).unwrap() else {
            panic!("expected an invite");
        };
        assert_eq!(invite.call_type, CallType::Audio);
        assert_eq!(invite.avatar_ref, None);
    }
}
