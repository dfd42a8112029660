//! Relay-level call event router.

use super::channel::SignalingChannel;
use super::manager::{CallHandle, RemoteEvent};
use super::signaling::{Envelope, EnvelopeType};
use crate::presence::PresenceList;
use crate::types::call::UserId;
use log::{debug, warn};
use std::sync::Arc;

/// Routes call envelopes from the relay into the call manager for the
/// lifetime of an authenticated session. Also keeps the presence list fed.
pub struct CallEventRouter {
    channel: SignalingChannel,
    handle: CallHandle,
    presence: Arc<PresenceList>,
}

impl CallEventRouter {
    pub fn new(channel: SignalingChannel, handle: CallHandle, presence: Arc<PresenceList>) -> Self {
        Self {
            channel,
            handle,
            presence,
        }
    }

    /// Register handlers for every call envelope type and the presence feed.
    pub fn attach(&self) {
        for kind in [
            EnvelopeType::CallInvite,
            EnvelopeType::CallAccept,
            EnvelopeType::CallReject,
            EnvelopeType::CallEnd,
            EnvelopeType::IceCandidate,
        ] {
            let handle = self.handle.clone();
            self.channel.on(kind, move |from, envelope| {
                forward(&handle, from, envelope);
            });
        }

        let presence = self.presence.clone();
        self.channel
            .on(EnvelopeType::OnlineUsers, move |_, envelope| {
                if let Envelope::OnlineUsers(list) = envelope {
                    presence.replace(list.users);
                }
            });
        debug!("Call event router attached");
    }

    pub fn detach(&self) {
        for kind in EnvelopeType::ALL {
            self.channel.off(kind);
        }
        debug!("Call event router detached");
    }
}

fn forward(handle: &CallHandle, from: Option<UserId>, envelope: Envelope) {
    let kind = envelope.kind();
    let event = match envelope {
        Envelope::CallInvite(invite) => RemoteEvent::Invite(invite),
        Envelope::CallAccept(accept) => RemoteEvent::Accept(accept),
        Envelope::CallReject(_) => RemoteEvent::Reject,
        Envelope::CallEnd(_) => RemoteEvent::End,
        Envelope::IceCandidate(message) => RemoteEvent::Candidate(message.candidate),
        Envelope::OnlineUsers(_) => return,
    };
    debug!(
        "Routing {kind} from {}",
        from.as_ref().map(UserId::as_str).unwrap_or("<unknown>")
    );
    if let Err(e) = handle.post_remote(from, event) {
        warn!("Dropped {kind}: {e}");
    }
}
