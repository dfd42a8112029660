use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::calls::{
    CallContext, CallError, CallHandle, CallManager, DeviceError, Envelope, EnvelopeType,
    Frame, LocalTrack, MediaDevices, MediaStream, PeerAdapter, PeerConnector, PeerEvent,
    PeerEventSink, PeerRole, SignalingChannel, SignalingTransport, Signal,
};
use crate::config::{CallConfig, IceServer};
use crate::presence::PresenceList;
use crate::types::call::{Contact, UserId};
use crate::types::events::{Notice, NoticeSink};

/// Records every frame sent to the relay.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingTransport {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn raw(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn envelopes(&self) -> Vec<Envelope> {
        self.raw()
            .iter()
            .map(|text| serde_json::from_str::<Frame>(text).unwrap().envelope)
            .collect()
    }

    pub fn envelopes_of(&self, kind: EnvelopeType) -> Vec<Envelope> {
        self.envelopes()
            .into_iter()
            .filter(|e| e.kind() == kind)
            .collect()
    }

    pub fn kinds(&self) -> Vec<EnvelopeType> {
        self.envelopes().iter().map(Envelope::kind).collect()
    }
}

#[async_trait]
impl SignalingTransport for RecordingTransport {
    async fn send_text(&self, text: String) -> Result<(), anyhow::Error> {
        if self.fail {
            return Err(anyhow::anyhow!("relay unavailable"));
        }
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn disconnect(&self) {}
}

/// Counts acquisitions and keeps every track it hands out.
#[derive(Default)]
pub struct FakeDevices {
    calls: AtomicUsize,
    failure: Option<DeviceError>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    tracks: Mutex<Vec<Arc<LocalTrack>>>,
}

impl FakeDevices {
    pub fn failing(error: DeviceError) -> Self {
        Self {
            failure: Some(error),
            ..Default::default()
        }
    }

    /// The first acquisition suspends until the returned sender fires.
    pub fn gated() -> (Self, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        let devices = Self {
            gate: Mutex::new(Some(rx)),
            ..Default::default()
        };
        (devices, tx)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn tracks(&self) -> Vec<Arc<LocalTrack>> {
        self.tracks.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaDevices for FakeDevices {
    async fn acquire(&self, video: bool) -> Result<MediaStream, DeviceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        let stream = MediaStream::capture(video);
        self.tracks
            .lock()
            .unwrap()
            .extend(stream.tracks().iter().cloned());
        Ok(stream)
    }
}

/// A scripted adapter. Tests drive it by emitting events through its sink.
pub struct FakePeer {
    pub role: PeerRole,
    sink: PeerEventSink,
    signals: Mutex<Vec<Signal>>,
    destroyed: AtomicUsize,
}

impl FakePeer {
    pub fn emit(&self, event: PeerEvent) {
        assert!(self.sink.emit(event), "call manager is gone");
    }

    pub fn signals(&self) -> Vec<Signal> {
        self.signals.lock().unwrap().clone()
    }

    pub fn destroy_count(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerAdapter for FakePeer {
    async fn apply_remote_signal(&self, signal: Signal) -> Result<(), CallError> {
        self.signals.lock().unwrap().push(signal);
        Ok(())
    }

    async fn destroy(&self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hands out [`FakePeer`]s and lets the test pick them up in order.
pub struct FakeConnector {
    fail: bool,
    connects: AtomicUsize,
    ice_servers: Mutex<Vec<IceServer>>,
    peers_tx: mpsc::UnboundedSender<Arc<FakePeer>>,
    peers_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Arc<FakePeer>>>,
}

impl Default for FakeConnector {
    fn default() -> Self {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        Self {
            fail: false,
            connects: AtomicUsize::new(0),
            ice_servers: Mutex::new(Vec::new()),
            peers_tx,
            peers_rx: tokio::sync::Mutex::new(peers_rx),
        }
    }
}

impl FakeConnector {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn ice_servers(&self) -> Vec<IceServer> {
        self.ice_servers.lock().unwrap().clone()
    }

    pub async fn next_peer(&self) -> Arc<FakePeer> {
        self.peers_rx
            .lock()
            .await
            .recv()
            .await
            .expect("connector dropped")
    }
}

#[async_trait]
impl PeerConnector for FakeConnector {
    async fn connect(
        &self,
        role: PeerRole,
        _media: &MediaStream,
        ice_servers: &[IceServer],
        sink: PeerEventSink,
    ) -> Result<Arc<dyn PeerAdapter>, CallError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        *self.ice_servers.lock().unwrap() = ice_servers.to_vec();
        if self.fail {
            return Err(CallError::Negotiation("no route".to_string()));
        }
        let peer = Arc::new(FakePeer {
            role,
            sink,
            signals: Mutex::new(Vec::new()),
            destroyed: AtomicUsize::new(0),
        });
        let _ = self.peers_tx.send(peer.clone());
        Ok(peer)
    }
}

#[derive(Default)]
pub struct RecordingNotices {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotices {
    pub fn messages(&self) -> Vec<String> {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.message.clone())
            .collect()
    }
}

impl NoticeSink for RecordingNotices {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

/// A call manager for "alice" wired to fakes. "bob" is online.
pub struct CallHarness {
    pub handle: CallHandle,
    pub channel: SignalingChannel,
    pub transport: Arc<RecordingTransport>,
    pub devices: Arc<FakeDevices>,
    pub connector: Arc<FakeConnector>,
    pub presence: Arc<PresenceList>,
    pub notices: Arc<RecordingNotices>,
}

impl CallHarness {
    pub fn new() -> Self {
        Self::with(FakeDevices::default(), FakeConnector::default())
    }

    pub fn with(devices: FakeDevices, connector: FakeConnector) -> Self {
        let transport = Arc::new(RecordingTransport::default());
        let channel = SignalingChannel::new(transport.clone());
        let devices = Arc::new(devices);
        let connector = Arc::new(connector);
        let presence = Arc::new(PresenceList::new());
        presence.set_online(UserId::new("bob"));
        let notices = Arc::new(RecordingNotices::default());

        let handle = CallManager::spawn(CallContext {
            local: Contact::new("alice", "Alice").with_avatar("/avatars/alice.png"),
            channel: channel.clone(),
            devices: devices.clone(),
            connector: connector.clone(),
            presence: presence.clone(),
            notices: notices.clone(),
            config: CallConfig::default(),
        });

        Self {
            handle,
            channel,
            transport,
            devices,
            connector,
            presence,
            notices,
        }
    }
}

/// Let spawned tasks run until they block.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
