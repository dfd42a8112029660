//! Local capture streams and their acquisition.
//!
//! # Architecture
//!
//! - [`MediaDevices`]: acquires a [`MediaStream`] for a call, or fails with [`DeviceError`]
//! - [`MediaStream`]: the local tracks published on the peer connection
//! - [`LocalTrack`]: one captured track; stopping it releases the device
//! - [`RemoteMedia`]: tracks received from the peer
//! - [`TrackDevices`]: device set backed by `webrtc` sample tracks
//! - [`webrtc`]: the production peer adapter

pub mod webrtc;

use async_trait::async_trait;
use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;
use ::webrtc::media::Sample;
use ::webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use ::webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use ::webrtc::track::track_remote::TrackRemote;

pub const MIME_TYPE_OPUS: &str = "audio/opus";
pub const MIME_TYPE_VP8: &str = "video/VP8";

/// Failure to obtain a capture stream.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    #[error("media capture is not supported on this platform")]
    Unsupported,
    #[error("permission to use the {0} device was denied")]
    PermissionDenied(TrackKind),
    #[error("no {0} device available")]
    NotFound(TrackKind),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Audio => f.write_str("audio"),
            Self::Video => f.write_str("video"),
        }
    }
}

/// Platform capture API.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Acquire audio, plus video when `video` is set. Allocates device
    /// handles that stay held until every track is stopped.
    async fn acquire(&self, video: bool) -> Result<MediaStream, DeviceError>;
}

/// A captured track. Samples written after `stop` are discarded.
pub struct LocalTrack {
    kind: TrackKind,
    enabled: AtomicBool,
    stopped: AtomicBool,
    rtc: Arc<TrackLocalStaticSample>,
}

impl LocalTrack {
    pub fn new(kind: TrackKind, stream_id: &str) -> Self {
        let (mime_type, clock_rate, channels, fmtp) = match kind {
            TrackKind::Audio => (MIME_TYPE_OPUS, 48000, 2, "minptime=10;useinbandfec=1"),
            TrackKind::Video => (MIME_TYPE_VP8, 90000, 0, ""),
        };
        let rtc = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: mime_type.to_owned(),
                clock_rate,
                channels,
                sdp_fmtp_line: fmtp.to_owned(),
                rtcp_feedback: vec![],
            },
            kind.to_string(),
            stream_id.to_owned(),
        ));
        Self {
            kind,
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            rtc,
        }
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Release the device. Returns `true` only for the call that stopped it.
    pub fn stop(&self) -> bool {
        let first = !self.stopped.swap(true, Ordering::SeqCst);
        if first {
            debug!("Stopped local {} track", self.kind);
        }
        first
    }

    /// The track handed to the peer connection.
    pub fn rtc_track(&self) -> Arc<TrackLocalStaticSample> {
        self.rtc.clone()
    }

    /// Feed one captured frame. Muted or stopped tracks drop it.
    pub async fn write_sample(&self, sample: &Sample) -> Result<(), ::webrtc::Error> {
        if self.is_stopped() || !self.is_enabled() {
            return Ok(());
        }
        self.rtc.write_sample(sample).await
    }
}

impl std::fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTrack")
            .field("kind", &self.kind)
            .field("enabled", &self.is_enabled())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// The local capture stream owned by the call session.
#[derive(Debug)]
pub struct MediaStream {
    id: String,
    tracks: Vec<Arc<LocalTrack>>,
}

impl MediaStream {
    pub fn new(id: impl Into<String>, tracks: Vec<Arc<LocalTrack>>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    /// Build a stream with an audio track and, optionally, a video track.
    pub fn capture(video: bool) -> Self {
        let id = random_stream_id();
        let mut tracks = vec![Arc::new(LocalTrack::new(TrackKind::Audio, &id))];
        if video {
            tracks.push(Arc::new(LocalTrack::new(TrackKind::Video, &id)));
        }
        Self { id, tracks }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[Arc<LocalTrack>] {
        &self.tracks
    }

    pub fn tracks_of(&self, kind: TrackKind) -> impl Iterator<Item = &Arc<LocalTrack>> {
        self.tracks.iter().filter(move |t| t.kind() == kind)
    }

    pub fn has_video(&self) -> bool {
        self.tracks_of(TrackKind::Video).next().is_some()
    }

    /// Stop every track. Returns how many were still live.
    pub fn stop_all(&self) -> usize {
        self.tracks.iter().filter(|t| t.stop()).count()
    }

    pub fn is_stopped(&self) -> bool {
        self.tracks.iter().all(|t| t.is_stopped())
    }
}

/// Inbound media reported by the peer adapter. Tracks are appended as
/// they arrive; the stream itself is announced once.
pub struct RemoteMedia {
    stream_id: String,
    tracks: RwLock<Vec<Arc<TrackRemote>>>,
}

impl RemoteMedia {
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            tracks: RwLock::new(Vec::new()),
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub async fn add_track(&self, track: Arc<TrackRemote>) {
        self.tracks.write().await.push(track);
    }

    pub async fn tracks(&self) -> Vec<Arc<TrackRemote>> {
        self.tracks.read().await.clone()
    }
}

impl std::fmt::Debug for RemoteMedia {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteMedia")
            .field("stream_id", &self.stream_id)
            .finish()
    }
}

pub(crate) fn random_stream_id() -> String {
    hex::encode(rand::random::<[u8; 8]>())
}

/// Which capture devices are present.
#[derive(Debug, Clone, Copy)]
pub struct DeviceSet {
    pub audio: bool,
    pub video: bool,
}

impl Default for DeviceSet {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

/// Devices backed by `webrtc` sample tracks. The host feeds encoded frames
/// into each [`LocalTrack`] with [`LocalTrack::write_sample`].
#[derive(Debug, Default, Clone)]
pub struct TrackDevices {
    devices: DeviceSet,
}

impl TrackDevices {
    pub fn new(devices: DeviceSet) -> Self {
        Self { devices }
    }
}

#[async_trait]
impl MediaDevices for TrackDevices {
    async fn acquire(&self, video: bool) -> Result<MediaStream, DeviceError> {
        if !self.devices.audio {
            return Err(DeviceError::NotFound(TrackKind::Audio));
        }
        if video && !self.devices.video {
            return Err(DeviceError::NotFound(TrackKind::Video));
        }
        let stream = MediaStream::capture(video);
        debug!(
            "Acquired local stream {} ({} tracks)",
            stream.id(),
            stream.tracks().len()
        );
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::webrtc::track::track_local::TrackLocal;

    #[test]
    fn test_stop_is_exactly_once() {
        let stream = MediaStream::capture(true);
        assert_eq!(stream.tracks().len(), 2);
        assert!(stream.has_video());

        assert_eq!(stream.stop_all(), 2);
        assert!(stream.is_stopped());
        assert_eq!(stream.stop_all(), 0);
    }

    #[test]
    fn test_track_enable_toggle() {
        let track = LocalTrack::new(TrackKind::Audio, "s1");
        assert!(track.is_enabled());
        track.set_enabled(false);
        assert!(!track.is_enabled());
        assert_eq!(track.rtc_track().stream_id(), "s1");
    }

    #[tokio::test]
    async fn test_track_devices_report_missing_camera() {
        let devices = TrackDevices::new(DeviceSet {
            audio: true,
            video: false,
        });

        let err = devices.acquire(true).await.unwrap_err();
        assert_eq!(err, DeviceError::NotFound(TrackKind::Video));

        let stream = devices.acquire(false).await.unwrap();
        assert!(!stream.has_video());
    }
}
