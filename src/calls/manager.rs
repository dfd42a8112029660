//! Call manager: the actor that exclusively owns the [`CallSession`].
//!
//! Commands from the UI arrive on a bounded queue. Envelopes posted by the
//! relay router arrive on their own unbounded queue so none is ever lost.
//! Everything the session itself started (media acquisition, peer
//! adapter events, the duration timer, the negotiation deadline) comes back
//! on an internal queue that is always drained first. Internal events carry
//! the generation or attempt id they were started under and are dropped once
//! the session has moved on.

use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

use super::channel::SignalingChannel;
use super::error::CallError;
use super::media::{DeviceError, MediaDevices, MediaStream};
use super::peer::{NegotiationPhase, PeerConnector, PeerEvent, PeerEventSink, PeerRole};
use super::signaling::{CallAccept, CallInvite, Envelope};
use super::state::{CallSession, CallSnapshot, CallTransition, InvalidTransition};
use super::transport::{IceCandidate, SdpKind, SessionDescription, Signal};
use crate::config::CallConfig;
use crate::presence::Presence;
use crate::types::call::{CallStatus, CallType, Contact, UserId};
use crate::types::events::{Notice, NoticeSink};

/// Collaborators injected into the call manager.
pub struct CallContext {
    /// The authenticated local user.
    pub local: Contact,
    pub channel: SignalingChannel,
    pub devices: Arc<dyn MediaDevices>,
    pub connector: Arc<dyn PeerConnector>,
    pub presence: Arc<dyn Presence>,
    pub notices: Arc<dyn NoticeSink>,
    pub config: CallConfig,
}

/// A call envelope received from the relay.
#[derive(Debug, Clone)]
pub enum RemoteEvent {
    Invite(CallInvite),
    Accept(CallAccept),
    Candidate(IceCandidate),
    Reject,
    End,
}

impl RemoteEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Invite(_) => "call-invite",
            Self::Accept(_) => "call-accept",
            Self::Candidate(_) => "ice-candidate",
            Self::Reject => "call-reject",
            Self::End => "call-end",
        }
    }
}

type Reply<T> = oneshot::Sender<Result<T, CallError>>;

enum Command {
    StartOutgoing {
        target: Contact,
        video: bool,
        reply: Reply<()>,
    },
    Accept {
        reply: Reply<()>,
    },
    Reject {
        reply: Reply<()>,
    },
    End {
        reply: Reply<()>,
    },
    Remote {
        from: Option<UserId>,
        event: RemoteEvent,
        reply: Reply<()>,
    },
    SetMuted {
        muted: bool,
        reply: Reply<()>,
    },
    SetCameraEnabled {
        enabled: bool,
        reply: Reply<()>,
    },
    Snapshot {
        reply: oneshot::Sender<CallSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// A relay envelope posted without waiting for the outcome.
struct RemoteFrame {
    from: Option<UserId>,
    event: RemoteEvent,
}

/// Events the session produced for itself.
#[derive(Debug)]
pub(crate) enum Internal {
    Peer {
        generation: u64,
        event: PeerEvent,
    },
    MediaAcquired {
        attempt: u64,
        result: Result<MediaStream, DeviceError>,
    },
    Tick {
        generation: u64,
    },
    NegotiationTimeout {
        generation: u64,
    },
}

pub struct CallManager {
    ctx: CallContext,
    session: CallSession,
    command_rx: mpsc::Receiver<Command>,
    remote_rx: mpsc::UnboundedReceiver<RemoteFrame>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    snapshot_tx: watch::Sender<CallSnapshot>,
    next_attempt: u64,
}

impl CallManager {
    /// Start the actor on the current runtime.
    pub fn spawn(ctx: CallContext) -> CallHandle {
        let (command_tx, command_rx) = mpsc::channel(ctx.config.command_capacity.max(1));
        let (remote_tx, remote_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(CallSnapshot::default());

        let manager = Self {
            ctx,
            session: CallSession::new(),
            command_rx,
            remote_rx,
            internal_tx,
            internal_rx,
            snapshot_tx,
            next_attempt: 0,
        };
        tokio::spawn(manager.run());

        CallHandle {
            command_tx,
            remote_tx,
            snapshot_rx,
        }
    }

    async fn run(mut self) {
        info!("Call manager started for {}", self.ctx.local.id);
        loop {
            tokio::select! {
                biased;
                Some(event) = self.internal_rx.recv() => self.handle_internal(event).await,
                Some(frame) = self.remote_rx.recv() => {
                    let name = frame.event.name();
                    if let Err(e) = self.handle_remote(frame.from, frame.event).await {
                        debug!("{name} not applied: {e}");
                    }
                }
                command = self.command_rx.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command).await {
                            break;
                        }
                    }
                    None => {
                        self.teardown().await;
                        break;
                    }
                },
            }
        }
        info!("Call manager stopped");
    }

    /// Returns `false` when the actor should stop.
    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::StartOutgoing {
                target,
                video,
                reply,
            } => {
                let _ = reply.send(self.start_outgoing(target, video));
            }
            Command::Accept { reply } => {
                let _ = reply.send(self.accept());
            }
            Command::Reject { reply } => {
                let _ = reply.send(self.reject().await);
            }
            Command::End { reply } => {
                let _ = reply.send(self.end().await);
            }
            Command::Remote { from, event, reply } => {
                let _ = reply.send(self.handle_remote(from, event).await);
            }
            Command::SetMuted { muted, reply } => {
                let _ = reply.send(self.set_muted(muted));
            }
            Command::SetCameraEnabled { enabled, reply } => {
                let _ = reply.send(self.set_camera_enabled(enabled));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.session.snapshot());
            }
            Command::Shutdown { reply } => {
                self.teardown().await;
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    async fn handle_internal(&mut self, event: Internal) {
        match event {
            Internal::MediaAcquired { attempt, result } => {
                self.on_media_acquired(attempt, result).await;
            }
            Internal::Peer { generation, event } => {
                if generation != self.session.generation {
                    debug!("Dropping peer event from stale generation {generation}: {event:?}");
                    return;
                }
                self.on_peer_event(event).await;
            }
            Internal::Tick { generation } => {
                if generation == self.session.generation
                    && self.session.status == CallStatus::Connected
                {
                    self.session.elapsed_seconds += 1;
                    self.publish();
                }
            }
            Internal::NegotiationTimeout { generation } => {
                if generation == self.session.generation && self.session.clear_deadline() {
                    warn!(
                        "Negotiation with {} timed out after {:?}",
                        self.counterparty_label(),
                        self.ctx.config.negotiation_timeout
                    );
                    self.abort(Notice::error("Call could not be connected")).await;
                }
            }
        }
    }

    // --- UI commands ---

    fn start_outgoing(&mut self, target: Contact, video: bool) -> Result<(), CallError> {
        self.session.require(&[CallStatus::Idle], "start outgoing call")?;
        if !self.ctx.presence.is_online(&target.id) {
            self.ctx
                .notices
                .notify(Notice::error("User is offline. Cannot call."));
            return Err(CallError::TargetUnreachable(target.id));
        }

        let call_type = CallType::from_video(video);
        info!("Starting {call_type} call to {}", target.id);
        self.session.apply_transition(CallTransition::OutgoingStarted {
            counterparty: target,
            call_type,
        })?;
        self.begin_acquisition(video);
        self.publish();
        Ok(())
    }

    fn accept(&mut self) -> Result<(), CallError> {
        self.session.require(&[CallStatus::Incoming], "accept")?;
        if self.session.acquisition.is_some() || self.session.connection.is_some() {
            return Err(InvalidTransition {
                current_state: "Incoming (already accepting)".to_string(),
                attempted: "accept".to_string(),
            }
            .into());
        }
        info!("Accepting call from {}", self.counterparty_label());
        self.begin_acquisition(self.session.call_type.is_video());
        Ok(())
    }

    async fn reject(&mut self) -> Result<(), CallError> {
        self.session.require(&[CallStatus::Incoming], "reject")?;
        if let Some(peer) = self.counterparty_id() {
            info!("Rejecting call from {peer}");
            self.ctx.channel.send(Envelope::reject(peer)).await;
        }
        self.teardown().await;
        Ok(())
    }

    async fn end(&mut self) -> Result<(), CallError> {
        self.session
            .require(&[CallStatus::Outgoing, CallStatus::Connected], "end")?;
        if let Some(peer) = self.counterparty_id() {
            info!("Ending call with {peer}");
            self.ctx.channel.send(Envelope::end(peer)).await;
        }
        self.teardown().await;
        Ok(())
    }

    fn set_muted(&mut self, muted: bool) -> Result<(), CallError> {
        self.session
            .require(&[CallStatus::Outgoing, CallStatus::Connected], "mute")?;
        self.session.muted = muted;
        self.session.sync_track_flags();
        self.publish();
        Ok(())
    }

    fn set_camera_enabled(&mut self, enabled: bool) -> Result<(), CallError> {
        self.session
            .require(&[CallStatus::Outgoing, CallStatus::Connected], "toggle camera")?;
        if !self.session.call_type.is_video() {
            return Err(InvalidTransition {
                current_state: format!("{:?} audio call", self.session.status),
                attempted: "toggle camera".to_string(),
            }
            .into());
        }
        self.session.camera_off = !enabled;
        self.session.sync_track_flags();
        self.publish();
        Ok(())
    }

    // --- relay events ---

    async fn handle_remote(
        &mut self,
        from: Option<UserId>,
        event: RemoteEvent,
    ) -> Result<(), CallError> {
        let event = match event {
            RemoteEvent::Invite(invite) => return self.on_remote_invite(from, invite).await,
            other => other,
        };

        if self.session.status.is_idle() {
            debug!("Ignoring {} while idle", event.name());
            return Ok(());
        }
        if let Some(sender) = &from {
            if !self.session.counterparty_is(sender) {
                debug!(
                    "Ignoring {} from {sender}: current counterparty is {}",
                    event.name(),
                    self.counterparty_label()
                );
                return Ok(());
            }
        }

        match event {
            RemoteEvent::Accept(accept) => self.on_remote_accept(accept.answer_signal).await,
            RemoteEvent::Candidate(candidate) => {
                self.on_remote_candidate(candidate).await;
                Ok(())
            }
            RemoteEvent::Reject => {
                info!("{} declined the call", self.counterparty_label());
                self.ctx.notices.notify(Notice::info("Call declined"));
                self.teardown().await;
                Ok(())
            }
            RemoteEvent::End => {
                info!("{} ended the call", self.counterparty_label());
                self.ctx.notices.notify(Notice::success("Call ended"));
                self.teardown().await;
                Ok(())
            }
            RemoteEvent::Invite(_) => Ok(()),
        }
    }

    async fn on_remote_invite(
        &mut self,
        from: Option<UserId>,
        invite: CallInvite,
    ) -> Result<(), CallError> {
        // The relay stamp wins over the self-declared identity.
        let caller = from.unwrap_or_else(|| invite.from_identity.clone());

        if !self.session.status.is_idle() {
            info!(
                "Busy ({}), rejecting invite from {caller}",
                self.session.status
            );
            self.ctx.channel.send(Envelope::reject(caller)).await;
            return Err(CallError::Busy);
        }
        if invite.offer_signal.kind != SdpKind::Offer {
            return Err(CallError::Signaling(format!(
                "invite from {caller} does not carry an offer"
            )));
        }

        let counterparty = Contact {
            id: caller,
            display_name: invite.display_name,
            avatar: invite.avatar_ref,
        };
        info!(
            "Incoming {} call from {}",
            invite.call_type, counterparty.id
        );
        self.session.apply_transition(CallTransition::InviteReceived {
            counterparty,
            call_type: invite.call_type,
            offer: invite.offer_signal,
        })?;
        self.publish();
        Ok(())
    }

    async fn on_remote_accept(&mut self, answer: SessionDescription) -> Result<(), CallError> {
        if self.session.status != CallStatus::Outgoing {
            debug!("Ignoring call-accept in state {}", self.session.status);
            return Ok(());
        }
        let Some(connection) = self.session.connection.clone() else {
            debug!("Ignoring call-accept before the invite went out");
            return Ok(());
        };

        if let Err(e) = connection
            .apply_remote_signal(Signal::Description(answer))
            .await
        {
            error!("Failed to apply answer: {e}");
            self.abort(Notice::error(format!("Call connection error: {e}")))
                .await;
            return Err(e);
        }

        self.session.apply_transition(CallTransition::RemoteAccepted)?;
        self.start_timer();
        info!("Call with {} connected", self.counterparty_label());
        self.publish();
        Ok(())
    }

    async fn on_remote_candidate(&mut self, candidate: IceCandidate) {
        match self.session.connection.clone() {
            Some(connection) => {
                if let Err(e) = connection
                    .apply_remote_signal(Signal::Candidate(candidate))
                    .await
                {
                    debug!("Remote candidate not applied: {e}");
                }
            }
            None => {
                debug!(
                    "Queueing remote {} candidate until the connection exists",
                    candidate.candidate_type().unwrap_or("unknown")
                );
                self.session.pending_remote_candidates.push(candidate);
            }
        }
    }

    // --- session-internal events ---

    fn begin_acquisition(&mut self, video: bool) {
        self.next_attempt += 1;
        let attempt = self.next_attempt;
        self.session.acquisition = Some(attempt);

        let devices = self.ctx.devices.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = devices.acquire(video).await;
            if let Err(mpsc::error::SendError(Internal::MediaAcquired {
                result: Ok(stream),
                ..
            })) = tx.send(Internal::MediaAcquired { attempt, result })
            {
                stream.stop_all();
            }
        });
    }

    async fn on_media_acquired(&mut self, attempt: u64, result: Result<MediaStream, DeviceError>) {
        if self.session.acquisition != Some(attempt) {
            if let Ok(stream) = result {
                let stopped = stream.stop_all();
                debug!("Released {stopped} tracks from stale acquisition {attempt}");
            }
            return;
        }
        self.session.acquisition = None;

        let stream = match result {
            Ok(stream) => Arc::new(stream),
            Err(e) => {
                warn!("Media acquisition failed: {e}");
                self.abort(Notice::error(format!("Media access error: {e}")))
                    .await;
                return;
            }
        };

        let role = match self.session.status {
            CallStatus::Outgoing => PeerRole::Initiator,
            CallStatus::Incoming => PeerRole::Responder,
            status => {
                warn!("Media acquired in unexpected state {status}");
                stream.stop_all();
                return;
            }
        };

        self.session.generation += 1;
        let sink = PeerEventSink::new(self.session.generation, self.internal_tx.clone());
        let connection = match self
            .ctx
            .connector
            .connect(role, &stream, &self.ctx.config.ice_servers, sink)
            .await
        {
            Ok(connection) => connection,
            Err(e) => {
                error!("Failed to create peer connection: {e}");
                stream.stop_all();
                self.abort(Notice::error(format!("Call connection error: {e}")))
                    .await;
                return;
            }
        };
        debug!("Peer connection created as {role:?}");

        self.session.local_media = Some(stream);
        self.session.connection = Some(connection.clone());
        self.session.phase = NegotiationPhase::AwaitingLocalDescription;
        self.session.sync_track_flags();
        self.arm_deadline();

        if role == PeerRole::Responder {
            if let Some(offer) = self.session.pending_remote_signal.clone() {
                if let Err(e) = connection
                    .apply_remote_signal(Signal::Description(offer))
                    .await
                {
                    error!("Failed to apply offer: {e}");
                    self.abort(Notice::error(format!("Call connection error: {e}")))
                        .await;
                    return;
                }
            }
        }
        for candidate in std::mem::take(&mut self.session.pending_remote_candidates) {
            if let Err(e) = connection
                .apply_remote_signal(Signal::Candidate(candidate))
                .await
            {
                debug!("Queued remote candidate not applied: {e}");
            }
        }
        self.publish();
    }

    async fn on_peer_event(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::LocalDescription(description) => {
                self.on_local_description(description).await;
            }
            PeerEvent::LocalCandidate(candidate) => match self.session.phase {
                phase if phase.can_send_candidates() => self.send_candidate(candidate).await,
                NegotiationPhase::AwaitingLocalDescription => {
                    debug!(
                        "Holding local {} candidate until the description is sent",
                        candidate.candidate_type().unwrap_or("unknown")
                    );
                    self.session.pending_local_candidates.push(candidate);
                }
                _ => debug!("Dropping local candidate after close"),
            },
            PeerEvent::RemoteStream(media) => {
                self.session.clear_deadline();
                if self.session.remote_media.is_some() {
                    debug!("Ignoring additional remote stream {}", media.stream_id());
                    return;
                }
                info!("Remote stream {} attached", media.stream_id());
                self.session.remote_media = Some(media);
                self.publish();
            }
            PeerEvent::Connected => {
                info!("Peer connected with {}", self.counterparty_label());
                self.session.clear_deadline();
                if self.session.phase == NegotiationPhase::LocalDescriptionSent {
                    self.session.phase = NegotiationPhase::Connected;
                }
            }
            PeerEvent::Closed => {
                info!("Peer connection closed");
                self.session.phase = NegotiationPhase::Closed;
                self.ctx.notices.notify(Notice::success("Call ended"));
                self.teardown().await;
            }
            PeerEvent::Error(message) => {
                error!("Peer error: {message}");
                self.abort(Notice::error(format!("Call connection error: {message}")))
                    .await;
            }
        }
    }

    async fn on_local_description(&mut self, description: SessionDescription) {
        if self.session.phase != NegotiationPhase::AwaitingLocalDescription {
            debug!("Ignoring repeated local description");
            return;
        }
        let Some(peer) = self.counterparty_id() else {
            return;
        };

        match self.session.status {
            CallStatus::Outgoing => {
                let invite = CallInvite {
                    to: peer.clone(),
                    from_identity: self.ctx.local.id.clone(),
                    display_name: self.ctx.local.display_name.clone(),
                    avatar_ref: self.ctx.local.avatar.clone(),
                    offer_signal: description,
                    call_type: self.session.call_type,
                };
                self.ctx.channel.send(Envelope::CallInvite(invite)).await;
                self.session.phase = NegotiationPhase::LocalDescriptionSent;
                info!("Invite sent to {peer}");
            }
            CallStatus::Incoming => {
                self.ctx
                    .channel
                    .send(Envelope::CallAccept(CallAccept {
                        to: peer.clone(),
                        answer_signal: description,
                    }))
                    .await;
                self.session.phase = NegotiationPhase::LocalDescriptionSent;
                if let Err(e) = self.session.apply_transition(CallTransition::AnswerSent) {
                    warn!("{e}");
                }
                self.start_timer();
                info!("Answer sent to {peer}, call connected");
            }
            status => {
                debug!("Local description ignored in state {status}");
                return;
            }
        }

        let queued = std::mem::take(&mut self.session.pending_local_candidates);
        if !queued.is_empty() {
            debug!("Flushing {} queued local candidates", queued.len());
        }
        for candidate in queued {
            self.send_candidate(candidate).await;
        }
        self.publish();
    }

    async fn send_candidate(&self, candidate: IceCandidate) {
        if let Some(peer) = self.counterparty_id() {
            self.ctx
                .channel
                .send(Envelope::candidate(peer, candidate))
                .await;
        }
    }

    fn start_timer(&mut self) {
        let generation = self.session.generation;
        let period = self.ctx.config.tick_interval;
        let tx = self.internal_tx.clone();
        self.session.set_timer(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                if tx.send(Internal::Tick { generation }).is_err() {
                    break;
                }
            }
        }));
    }

    fn arm_deadline(&mut self) {
        let generation = self.session.generation;
        let timeout = self.ctx.config.negotiation_timeout;
        let tx = self.internal_tx.clone();
        self.session.set_deadline(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send(Internal::NegotiationTimeout { generation });
        }));
    }

    /// Tear down after a failure, telling the counterparty if it knows about the call.
    async fn abort(&mut self, notice: Notice) {
        if let Some(envelope) = self.farewell() {
            self.ctx.channel.send(envelope).await;
        }
        self.ctx.notices.notify(notice);
        self.teardown().await;
    }

    fn farewell(&self) -> Option<Envelope> {
        let peer = self.counterparty_id()?;
        match self.session.status {
            CallStatus::Incoming => Some(Envelope::reject(peer)),
            CallStatus::Connected => Some(Envelope::end(peer)),
            CallStatus::Outgoing
                if self.session.phase != NegotiationPhase::AwaitingLocalDescription =>
            {
                Some(Envelope::end(peer))
            }
            _ => None,
        }
    }

    /// The single teardown path.
    async fn teardown(&mut self) {
        let released = self.session.reset();
        if released.stopped_tracks > 0 {
            debug!("Stopped {} local tracks", released.stopped_tracks);
        }
        if let Some(connection) = released.connection {
            connection.destroy().await;
        }
        self.publish();
    }

    fn publish(&self) {
        let snapshot = self.session.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    fn counterparty_id(&self) -> Option<UserId> {
        self.session.counterparty.as_ref().map(|c| c.id.clone())
    }

    fn counterparty_label(&self) -> String {
        self.session
            .counterparty
            .as_ref()
            .map(|c| c.id.to_string())
            .unwrap_or_else(|| "<none>".to_string())
    }
}

/// Cloneable command surface and reactive view of the call session.
#[derive(Clone)]
pub struct CallHandle {
    command_tx: mpsc::Sender<Command>,
    remote_tx: mpsc::UnboundedSender<RemoteFrame>,
    snapshot_rx: watch::Receiver<CallSnapshot>,
}

impl CallHandle {
    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T, CallError> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(make(tx))
            .await
            .map_err(|_| CallError::Closed)?;
        rx.await.map_err(|_| CallError::Closed)?
    }

    /// Dial `target`. Returns once the session is `outgoing`; media
    /// acquisition and the invite follow asynchronously.
    pub async fn start_outgoing_call(&self, target: Contact, video: bool) -> Result<(), CallError> {
        self.request(|reply| Command::StartOutgoing {
            target,
            video,
            reply,
        })
        .await
    }

    pub async fn accept_incoming_call(&self) -> Result<(), CallError> {
        self.request(|reply| Command::Accept { reply }).await
    }

    pub async fn reject_incoming_call(&self) -> Result<(), CallError> {
        self.request(|reply| Command::Reject { reply }).await
    }

    pub async fn end_call(&self) -> Result<(), CallError> {
        self.request(|reply| Command::End { reply }).await
    }

    pub async fn set_muted(&self, muted: bool) -> Result<(), CallError> {
        self.request(|reply| Command::SetMuted { muted, reply })
            .await
    }

    pub async fn set_camera_enabled(&self, enabled: bool) -> Result<(), CallError> {
        self.request(|reply| Command::SetCameraEnabled { enabled, reply })
            .await
    }

    pub async fn handle_incoming_invite(
        &self,
        from: Option<UserId>,
        invite: CallInvite,
    ) -> Result<(), CallError> {
        self.remote(from, RemoteEvent::Invite(invite)).await
    }

    pub async fn receive_remote_accept(
        &self,
        from: Option<UserId>,
        accept: CallAccept,
    ) -> Result<(), CallError> {
        self.remote(from, RemoteEvent::Accept(accept)).await
    }

    pub async fn receive_remote_candidate(
        &self,
        from: Option<UserId>,
        candidate: IceCandidate,
    ) -> Result<(), CallError> {
        self.remote(from, RemoteEvent::Candidate(candidate)).await
    }

    pub async fn receive_remote_reject(&self, from: Option<UserId>) -> Result<(), CallError> {
        self.remote(from, RemoteEvent::Reject).await
    }

    pub async fn receive_remote_end(&self, from: Option<UserId>) -> Result<(), CallError> {
        self.remote(from, RemoteEvent::End).await
    }

    async fn remote(&self, from: Option<UserId>, event: RemoteEvent) -> Result<(), CallError> {
        self.request(|reply| Command::Remote {
            from,
            event,
            reply,
        })
        .await
    }

    /// Queue a relay event without waiting. Keeps relay order and never
    /// drops a frame while the manager is running.
    pub fn post_remote(&self, from: Option<UserId>, event: RemoteEvent) -> Result<(), CallError> {
        self.remote_tx
            .send(RemoteFrame { from, event })
            .map_err(|_| CallError::Closed)
    }

    /// Snapshot taken after every event queued so far has been handled.
    pub async fn snapshot(&self) -> Result<CallSnapshot, CallError> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(Command::Snapshot { reply: tx })
            .await
            .map_err(|_| CallError::Closed)?;
        rx.await.map_err(|_| CallError::Closed)
    }

    pub fn subscribe(&self) -> watch::Receiver<CallSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Last published snapshot.
    pub fn current(&self) -> CallSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn status(&self) -> CallStatus {
        self.snapshot_rx.borrow().status
    }

    pub fn call_type(&self) -> CallType {
        self.snapshot_rx.borrow().call_type
    }

    pub fn counterparty(&self) -> Option<Contact> {
        self.snapshot_rx.borrow().counterparty.clone()
    }

    pub fn local_media(&self) -> Option<Arc<MediaStream>> {
        self.snapshot_rx.borrow().local_media.clone()
    }

    pub fn remote_media(&self) -> Option<Arc<super::media::RemoteMedia>> {
        self.snapshot_rx.borrow().remote_media.clone()
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.snapshot_rx.borrow().elapsed_seconds
    }

    /// Tear down any call and stop the actor.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .command_tx
            .send(Command::Shutdown { reply: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }
}
