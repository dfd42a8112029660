//! Call session state machine.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::media::{MediaStream, RemoteMedia, TrackKind};
use super::peer::{NegotiationPhase, PeerAdapter};
use super::transport::{IceCandidate, SessionDescription};
use crate::types::call::{CallStatus, CallType, Contact};

/// State transitions for calls. Teardown is not a transition: every
/// status returns to idle through [`CallSession::reset`].
#[derive(Debug, Clone)]
pub enum CallTransition {
    OutgoingStarted {
        counterparty: Contact,
        call_type: CallType,
    },
    InviteReceived {
        counterparty: Contact,
        call_type: CallType,
        offer: SessionDescription,
    },
    /// Caller applied the callee's answer.
    RemoteAccepted,
    /// Callee sent its answer.
    AnswerSent,
}

/// The single call session owned by the call manager.
#[derive(Default)]
pub struct CallSession {
    pub status: CallStatus,
    pub call_type: CallType,
    pub counterparty: Option<Contact>,
    /// Offer held while the local user decides. Only set while `incoming`.
    pub pending_remote_signal: Option<SessionDescription>,
    pub local_media: Option<Arc<MediaStream>>,
    pub remote_media: Option<Arc<RemoteMedia>>,
    pub connection: Option<Arc<dyn PeerAdapter>>,
    pub elapsed_seconds: u64,
    pub connected_at: Option<DateTime<Utc>>,
    pub phase: NegotiationPhase,
    /// Local candidates produced before the description went out.
    pub pending_local_candidates: Vec<IceCandidate>,
    /// Remote candidates received while no adapter existed.
    pub pending_remote_candidates: Vec<IceCandidate>,
    /// Bumped on every teardown and adapter construction.
    pub generation: u64,
    /// Id of the in-flight media acquisition, if any.
    pub acquisition: Option<u64>,
    pub muted: bool,
    pub camera_off: bool,
    timer: Option<JoinHandle<()>>,
    deadline: Option<JoinHandle<()>>,
}

/// Resources detached by [`CallSession::reset`] that still need async release.
#[derive(Default)]
pub struct Released {
    pub connection: Option<Arc<dyn PeerAdapter>>,
    pub stopped_tracks: usize,
}

impl Released {
    pub fn is_empty(&self) -> bool {
        self.connection.is_none() && self.stopped_tracks == 0
    }
}

impl CallSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counterparty_is(&self, id: &crate::types::call::UserId) -> bool {
        self.counterparty.as_ref().is_some_and(|c| &c.id == id)
    }

    /// Guard for commands that are only valid in some statuses.
    pub fn require(&self, allowed: &[CallStatus], attempted: &str) -> Result<(), InvalidTransition> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(InvalidTransition {
                current_state: format!("{:?}", self.status),
                attempted: attempted.to_string(),
            })
        }
    }

    /// Apply a state transition. Returns error if transition is invalid.
    pub fn apply_transition(&mut self, transition: CallTransition) -> Result<(), InvalidTransition> {
        match (self.status, transition) {
            (
                CallStatus::Idle,
                CallTransition::OutgoingStarted {
                    counterparty,
                    call_type,
                },
            ) => {
                self.counterparty = Some(counterparty);
                self.call_type = call_type;
                self.status = CallStatus::Outgoing;
            }
            (
                CallStatus::Idle,
                CallTransition::InviteReceived {
                    counterparty,
                    call_type,
                    offer,
                },
            ) => {
                self.counterparty = Some(counterparty);
                self.call_type = call_type;
                self.pending_remote_signal = Some(offer);
                self.status = CallStatus::Incoming;
            }
            (CallStatus::Outgoing, CallTransition::RemoteAccepted)
            | (CallStatus::Incoming, CallTransition::AnswerSent) => {
                self.pending_remote_signal = None;
                self.elapsed_seconds = 0;
                self.connected_at = Some(Utc::now());
                self.status = CallStatus::Connected;
            }
            (current, transition) => {
                return Err(InvalidTransition {
                    current_state: format!("{:?}", current),
                    attempted: format!("{:?}", transition),
                });
            }
        }
        Ok(())
    }

    pub fn set_timer(&mut self, timer: JoinHandle<()>) {
        if let Some(old) = self.timer.replace(timer) {
            old.abort();
        }
    }

    pub fn set_deadline(&mut self, deadline: JoinHandle<()>) {
        if let Some(old) = self.deadline.replace(deadline) {
            old.abort();
        }
    }

    pub fn has_deadline(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn clear_deadline(&mut self) -> bool {
        match self.deadline.take() {
            Some(deadline) => {
                deadline.abort();
                true
            }
            None => false,
        }
    }

    pub fn timer_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Apply the mute and camera flags to whatever local tracks exist.
    pub fn sync_track_flags(&self) {
        if let Some(media) = &self.local_media {
            for track in media.tracks_of(TrackKind::Audio) {
                track.set_enabled(!self.muted);
            }
            for track in media.tracks_of(TrackKind::Video) {
                track.set_enabled(!self.camera_off);
            }
        }
    }

    /// Return to idle. Stops the timer and every local track, detaches the
    /// connection, and clears all fields. Calling it again is a no-op apart
    /// from the generation bump.
    pub fn reset(&mut self) -> Released {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.clear_deadline();

        let stopped_tracks = self
            .local_media
            .take()
            .map(|media| media.stop_all())
            .unwrap_or(0);
        let connection = self.connection.take();

        self.status = CallStatus::Idle;
        self.call_type = CallType::default();
        self.counterparty = None;
        self.pending_remote_signal = None;
        self.remote_media = None;
        self.elapsed_seconds = 0;
        self.connected_at = None;
        self.phase = NegotiationPhase::default();
        self.pending_local_candidates.clear();
        self.pending_remote_candidates.clear();
        self.acquisition = None;
        self.muted = false;
        self.camera_off = false;
        self.generation += 1;

        Released {
            connection,
            stopped_tracks,
        }
    }

    pub fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            status: self.status,
            call_type: self.call_type,
            counterparty: self.counterparty.clone(),
            local_media: self.local_media.clone(),
            remote_media: self.remote_media.clone(),
            elapsed_seconds: self.elapsed_seconds,
            connected_at: self.connected_at,
            muted: self.muted,
            camera_off: self.camera_off,
        }
    }
}

impl std::fmt::Debug for CallSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSession")
            .field("status", &self.status)
            .field("call_type", &self.call_type)
            .field("counterparty", &self.counterparty)
            .field("has_connection", &self.connection.is_some())
            .field("phase", &self.phase)
            .field("generation", &self.generation)
            .finish()
    }
}

/// What the UI observes of the session.
#[derive(Debug, Clone, Default)]
pub struct CallSnapshot {
    pub status: CallStatus,
    pub call_type: CallType,
    pub counterparty: Option<Contact>,
    pub local_media: Option<Arc<MediaStream>>,
    pub remote_media: Option<Arc<RemoteMedia>>,
    pub elapsed_seconds: u64,
    pub connected_at: Option<DateTime<Utc>>,
    pub muted: bool,
    pub camera_off: bool,
}

fn same_arc<T>(a: &Option<Arc<T>>, b: &Option<Arc<T>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

impl PartialEq for CallSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.status == other.status
            && self.call_type == other.call_type
            && self.counterparty == other.counterparty
            && same_arc(&self.local_media, &other.local_media)
            && same_arc(&self.remote_media, &other.remote_media)
            && self.elapsed_seconds == other.elapsed_seconds
            && self.connected_at == other.connected_at
            && self.muted == other.muted
            && self.camera_off == other.camera_off
    }
}

#[derive(Debug, Clone)]
pub struct InvalidTransition {
    pub current_state: String,
    pub attempted: String,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid transition {} in state {}",
            self.attempted, self.current_state
        )
    }
}

impl std::error::Error for InvalidTransition {}
