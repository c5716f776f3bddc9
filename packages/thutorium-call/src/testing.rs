//! In-memory media and peer implementations.
//!
//! Used by the unit and integration tests, and handy for exercising the
//! signaling path without a camera or a WebRTC stack. The fake peer behaves
//! like a non-trickle WebRTC peer: the initiator emits one offer on creation,
//! the answerer emits one answer when given the offer, and both report a
//! remote stream once negotiation completes.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::call::media::{MediaConstraints, MediaDevices, MediaStream, MediaTrack, TrackKind};
use crate::call::peer::{PeerConnector, PeerEvent, PeerOptions, PeerTransport};
use crate::error::{Error, Result};
use crate::network::SignalData;

// ── Media ─────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct FakeTrack {
    id: String,
    kind: TrackKind,
    enabled: AtomicBool,
    stopped: AtomicBool,
}

impl FakeTrack {
    pub fn new(kind: TrackKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
        }
    }
}

impl MediaTrack for FakeTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// A stream with one video and one audio fake track.
pub fn fake_stream() -> MediaStream {
    let tracks: Vec<Arc<dyn MediaTrack>> = vec![
        Arc::new(FakeTrack::new(TrackKind::Video)),
        Arc::new(FakeTrack::new(TrackKind::Audio)),
    ];
    MediaStream::new(Uuid::new_v4().to_string(), tracks)
}

/// Hands out fake camera/microphone streams and remembers them.
#[derive(Debug, Default)]
pub struct FakeMediaDevices {
    failure: Option<String>,
    acquired: Mutex<Vec<MediaStream>>,
}

impl FakeMediaDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Devices that always refuse, e.g. permission denied.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            acquired: Mutex::new(Vec::new()),
        }
    }

    /// Every stream handed out so far.
    pub fn acquired(&self) -> Vec<MediaStream> {
        self.acquired.lock().clone()
    }

    /// Whether every track of every stream handed out has been stopped.
    pub fn all_released(&self) -> bool {
        self.acquired
            .lock()
            .iter()
            .flat_map(|stream| stream.tracks().iter())
            .all(|track| track.is_stopped())
    }
}

#[async_trait]
impl MediaDevices for FakeMediaDevices {
    async fn get_user_media(&self, constraints: &MediaConstraints) -> Result<MediaStream> {
        if let Some(reason) = &self.failure {
            return Err(Error::MediaAcquisition(reason.clone()));
        }

        let mut tracks: Vec<Arc<dyn MediaTrack>> = Vec::new();
        if constraints.video.is_some() {
            tracks.push(Arc::new(FakeTrack::new(TrackKind::Video)));
        }
        if constraints.audio {
            tracks.push(Arc::new(FakeTrack::new(TrackKind::Audio)));
        }

        let stream = MediaStream::new(Uuid::new_v4().to_string(), tracks);
        self.acquired.lock().push(stream.clone());
        Ok(stream)
    }
}

// ── Peer ──────────────────────────────────────────────────────────────────────

/// What a fake peer saw, shared with the test.
#[derive(Debug, Default)]
pub struct FakePeerRecord {
    pub initiator: bool,
    pub signals: Mutex<Vec<SignalData>>,
    destroyed: AtomicBool,
}

impl FakePeerRecord {
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

struct FakePeer {
    record: Arc<FakePeerRecord>,
    events: mpsc::UnboundedSender<PeerEvent>,
    fail_negotiation: Option<String>,
    serial: usize,
}

impl PeerTransport for FakePeer {
    fn signal(&mut self, data: SignalData) -> Result<()> {
        if self.record.is_destroyed() {
            return Err(Error::PeerTransport("peer destroyed".to_string()));
        }
        self.record.signals.lock().push(data);

        if let Some(reason) = &self.fail_negotiation {
            let _ = self.events.send(PeerEvent::Error(reason.clone()));
            return Ok(());
        }

        if !self.record.initiator {
            let answer = json!({"type": "answer", "sdp": format!("fake-answer-{}", self.serial)});
            let _ = self.events.send(PeerEvent::Signal(answer));
        }
        let _ = self.events.send(PeerEvent::Stream(fake_stream()));
        Ok(())
    }

    fn destroy(&mut self) {
        self.record.destroyed.store(true, Ordering::SeqCst);
    }
}

/// Creates fake peers and records them.
#[derive(Debug, Default)]
pub struct FakePeerConnector {
    peers: Mutex<Vec<Arc<FakePeerRecord>>>,
    fail_negotiation: Option<String>,
    fail_connect: Option<String>,
    serial: AtomicUsize,
}

impl FakePeerConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Peers whose negotiation reports an error once a remote signal lands.
    pub fn failing_negotiation(reason: impl Into<String>) -> Self {
        Self {
            fail_negotiation: Some(reason.into()),
            ..Self::default()
        }
    }

    /// A connector that cannot create peers at all.
    pub fn failing_connect(reason: impl Into<String>) -> Self {
        Self {
            fail_connect: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Every peer created so far.
    pub fn peers(&self) -> Vec<Arc<FakePeerRecord>> {
        self.peers.lock().clone()
    }
}

impl PeerConnector for FakePeerConnector {
    fn connect(
        &self,
        options: PeerOptions,
        local: &MediaStream,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Box<dyn PeerTransport>> {
        if let Some(reason) = &self.fail_connect {
            return Err(Error::PeerTransport(reason.clone()));
        }

        let serial = self.serial.fetch_add(1, Ordering::SeqCst);
        let record = Arc::new(FakePeerRecord {
            initiator: options.initiator,
            ..FakePeerRecord::default()
        });
        self.peers.lock().push(record.clone());

        tracing::debug!(
            initiator = options.initiator,
            local_stream = local.id(),
            "Fake peer created"
        );

        if options.initiator {
            let offer = json!({"type": "offer", "sdp": format!("fake-offer-{}", serial)});
            let _ = events.send(PeerEvent::Signal(offer));
        }

        Ok(Box::new(FakePeer {
            record,
            events,
            fail_negotiation: self.fail_negotiation.clone(),
            serial,
        }))
    }
}
