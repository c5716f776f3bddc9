//! # Call Agent
//!
//! The effectful shell around the pure call state machine. One agent per
//! client: it owns the relay connection, the local media stream and the peer
//! transport, and drives the session from a single task.
//!
//! ## Reactor
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          CALL AGENT                                     │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐                                                   │
//! │  │  UI commands    │──────┐                                            │
//! │  └─────────────────┘      │          ┌───────────────────────────┐     │
//! │  ┌─────────────────┐      │          │ tokio::select! {          │     │
//! │  │  Relay inbound  │──────┼─────────►│   command, relay,         │     │
//! │  └─────────────────┘      │          │   media, peer events      │     │
//! │  ┌─────────────────┐      │          │ }                         │     │
//! │  │  Media / peer   │──────┘          └─────────────┬─────────────┘     │
//! │  └─────────────────┘                               │                   │
//! │                                                    ▼                   │
//! │                                   transition(state, event)             │
//! │                                          │             │               │
//! │                                          ▼             ▼               │
//! │                                    watch<CallState>  effects           │
//! │                                                      (media, peer,     │
//! │                                                       relay sends)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Media acquisition is the only operation that awaits an external
//! completion; it runs on a spawned task and reports back through a oneshot
//! that is dropped on teardown, so a late stream is stopped instead of
//! leaking into the next session.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot, watch};

use crate::call::media::{MediaDevices, MediaStream};
use crate::call::peer::{PeerConnector, PeerEvent, PeerOptions, PeerTransport};
use crate::call::state::{self, CallEvent, CallState, CallTarget, Effect};
use crate::call::view::CallView;
use crate::config::CallConfig;
use crate::error::{Error, Result};
use crate::network::{
    RelayClient, RelaySender, RelayServerMessage, RelayStatus, SharedRelayStatus,
};

enum Command {
    Dispatch(CallEvent, oneshot::Sender<Result<()>>),
}

/// Handle to a running call agent.
///
/// Dropping the handle stops the agent, ends any live session locally and
/// closes the relay connection.
pub struct CallAgent {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<CallState>,
    last_outcome: Arc<RwLock<Option<CallState>>>,
    relay_status: SharedRelayStatus,
    connection_id: String,
    config: CallConfig,
}

impl CallAgent {
    /// Connect to the relay named in `config` and start the agent.
    pub async fn connect(
        config: CallConfig,
        devices: Arc<dyn MediaDevices>,
        connector: Arc<dyn PeerConnector>,
    ) -> Result<Self> {
        let client = RelayClient::connect(
            &config.relay_url,
            config.user_id.as_deref(),
            config.keepalive,
        )
        .await?;
        let (connection_id, sender, inbound, status) = client.into_parts();
        Ok(Self::start(
            config,
            connection_id,
            sender,
            inbound,
            status,
            devices,
            connector,
        ))
    }

    /// Start an agent over an already established relay channel pair.
    pub fn spawn(
        config: CallConfig,
        connection_id: String,
        relay: RelaySender,
        inbound: mpsc::UnboundedReceiver<RelayServerMessage>,
        devices: Arc<dyn MediaDevices>,
        connector: Arc<dyn PeerConnector>,
    ) -> Self {
        let status = Arc::new(RwLock::new(RelayStatus::Connected));
        Self::start(config, connection_id, relay, inbound, status, devices, connector)
    }

    fn start(
        config: CallConfig,
        connection_id: String,
        relay: RelaySender,
        inbound: mpsc::UnboundedReceiver<RelayServerMessage>,
        relay_status: SharedRelayStatus,
        devices: Arc<dyn MediaDevices>,
        connector: Arc<dyn PeerConnector>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(CallState::Idle);
        let last_outcome = Arc::new(RwLock::new(None));

        let reactor = Reactor {
            state: CallState::Idle,
            config: config.clone(),
            relay,
            devices,
            connector,
            local: None,
            remote: None,
            pending_remote: None,
            peer: None,
            peer_events: None,
            media_pending: None,
            state_tx,
            last_outcome: last_outcome.clone(),
            relay_status: relay_status.clone(),
        };
        tokio::spawn(reactor.run(command_rx, inbound));

        tracing::info!(
            connection_id = connection_id.as_str(),
            user_id = config.user_id.as_deref().unwrap_or("-"),
            "Call agent started"
        );

        Self {
            commands: command_tx,
            state: state_rx,
            last_outcome,
            relay_status,
            connection_id,
            config,
        }
    }

    // ── Commands ──────────────────────────────────────────────────────────

    /// Call `peer`: a user id when this client is logged in, otherwise a
    /// connection id shared out of band.
    pub async fn place_call(&self, peer: &str) -> Result<()> {
        let target = match self.config.user_id {
            Some(_) => CallTarget::User(peer.to_string()),
            None => CallTarget::Connection(peer.to_string()),
        };
        self.place_call_to(target).await
    }

    pub async fn place_call_to(&self, target: CallTarget) -> Result<()> {
        self.dispatch(CallEvent::PlaceCall {
            target,
            name: self.config.display_name.clone(),
            from: Some(self.my_id().to_string()),
        })
        .await
    }

    /// Accept the ringing call.
    pub async fn accept(&self) -> Result<()> {
        self.dispatch(CallEvent::Accept).await
    }

    /// Decline the ringing call.
    pub async fn reject(&self) -> Result<()> {
        self.dispatch(CallEvent::Reject).await
    }

    /// Hang up, cancel an outgoing call, or decline an incoming one.
    pub async fn hang_up(&self) -> Result<()> {
        self.dispatch(CallEvent::Hangup).await
    }

    pub async fn toggle_video(&self) -> Result<()> {
        self.dispatch(CallEvent::ToggleVideo).await
    }

    pub async fn toggle_audio(&self) -> Result<()> {
        self.dispatch(CallEvent::ToggleAudio).await
    }

    async fn dispatch(&self, event: CallEvent) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Dispatch(event, reply_tx))
            .map_err(|_| Error::NotConnected)?;
        reply_rx.await.map_err(|_| Error::NotConnected)?
    }

    // ── Queries ───────────────────────────────────────────────────────────

    /// The id other clients call this one by: the user id when logged in,
    /// otherwise the relay-assigned connection id.
    pub fn my_id(&self) -> &str {
        self.config
            .user_id
            .as_deref()
            .unwrap_or(&self.connection_id)
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Current session state. Terminal states stay visible until the next
    /// call starts.
    pub fn state(&self) -> CallState {
        self.state.borrow().clone()
    }

    /// The most recent terminal state reached, if any.
    pub fn last_outcome(&self) -> Option<CallState> {
        self.last_outcome.read().clone()
    }

    /// State of the underlying relay connection.
    pub fn relay_status(&self) -> RelayStatus {
        self.relay_status.read().clone()
    }

    /// Whether a new call may be placed or received.
    pub fn is_idle(&self) -> bool {
        self.state.borrow().is_vacant()
    }

    /// Render model of the current state.
    pub fn view(&self) -> CallView {
        CallView::project(&self.state.borrow())
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<CallState> {
        self.state.clone()
    }
}

// ── Reactor ───────────────────────────────────────────────────────────────────

struct Reactor {
    state: CallState,
    config: CallConfig,
    relay: RelaySender,
    devices: Arc<dyn MediaDevices>,
    connector: Arc<dyn PeerConnector>,

    /// Local stream, owned exclusively by the session.
    local: Option<MediaStream>,
    /// Remote stream currently rendered.
    remote: Option<MediaStream>,
    /// Remote stream reported by the transport, not yet attached.
    pending_remote: Option<MediaStream>,

    peer: Option<Box<dyn PeerTransport>>,
    peer_events: Option<mpsc::UnboundedReceiver<PeerEvent>>,
    media_pending: Option<oneshot::Receiver<Result<MediaStream>>>,

    state_tx: watch::Sender<CallState>,
    last_outcome: Arc<RwLock<Option<CallState>>>,
    relay_status: SharedRelayStatus,
}

impl Reactor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut inbound: mpsc::UnboundedReceiver<RelayServerMessage>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Dispatch(event, reply)) => {
                        let result = state::validate(&self.state, &event);
                        if result.is_ok() {
                            self.dispatch(event);
                        }
                        let _ = reply.send(result);
                    }
                    None => {
                        tracing::debug!("Agent handle dropped, stopping");
                        break;
                    }
                },

                message = inbound.recv() => match message {
                    Some(message) => self.on_relay_message(message),
                    None => {
                        tracing::warn!("Relay connection lost");
                        {
                            let mut status = self.relay_status.write();
                            if *status == RelayStatus::Connected {
                                *status = RelayStatus::Disconnected;
                            }
                        }
                        self.dispatch(CallEvent::RelayDisconnected);
                        break;
                    }
                },

                media = recv_media(&mut self.media_pending) => {
                    self.media_pending = None;
                    match media {
                        Ok(Ok(stream)) => {
                            self.local = Some(stream);
                            self.dispatch(CallEvent::MediaAcquired);
                        }
                        Ok(Err(e)) => {
                            tracing::warn!(error = %e, "Local media unavailable");
                            self.dispatch(CallEvent::MediaFailed(e.to_string()));
                        }
                        Err(_) => {
                            self.dispatch(CallEvent::MediaFailed("media task aborted".to_string()));
                        }
                    }
                },

                event = recv_peer(&mut self.peer_events) => match event {
                    Some(event) => self.on_peer_event(event),
                    None => self.peer_events = None,
                },
            }
        }

        self.release_all();
        tracing::info!("Call agent stopped");
    }

    fn on_relay_message(&mut self, message: RelayServerMessage) {
        match message {
            RelayServerMessage::CallUser { signal, from, name } => {
                self.dispatch(CallEvent::IncomingCall { from, name, signal });
            }
            RelayServerMessage::CallAccepted { signal } => {
                self.dispatch(CallEvent::CallAccepted(signal));
            }
            RelayServerMessage::CallEnded { from, reason } => {
                self.dispatch(CallEvent::CallEnded { from, reason });
            }
            RelayServerMessage::UserNotFound { user_id } => {
                self.dispatch(CallEvent::UserNotFound(user_id));
            }
            RelayServerMessage::Me { connection_id } => {
                tracing::debug!(connection_id = connection_id.as_str(), "Presence re-announced");
            }
            RelayServerMessage::Pong => {}
            RelayServerMessage::Error { message } => {
                tracing::warn!(message = message.as_str(), "Relay reported an error");
            }
        }
    }

    fn on_peer_event(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::Signal(signal) => self.dispatch(CallEvent::LocalSignal(signal)),
            PeerEvent::Stream(stream) => {
                self.pending_remote = Some(stream);
                self.dispatch(CallEvent::RemoteStream);
                if let Some(unused) = self.pending_remote.take() {
                    unused.stop();
                }
            }
            PeerEvent::Close => self.dispatch(CallEvent::PeerClosed),
            PeerEvent::Error(reason) => self.dispatch(CallEvent::PeerError(reason)),
        }
    }

    /// Run `event` and every follow-up event its effects produce.
    fn dispatch(&mut self, event: CallEvent) {
        let mut queue = VecDeque::from([event]);

        while let Some(event) = queue.pop_front() {
            let previous = std::mem::replace(&mut self.state, CallState::Idle);
            let was_terminal = previous.is_terminal();
            let from_name = previous.name();

            let (next, effects) = state::transition(previous, event);
            if next.name() != from_name {
                tracing::info!(from = from_name, to = next.name(), "Call state changed");
            }
            if next.is_terminal() && !was_terminal {
                *self.last_outcome.write() = Some(next.clone());
            }
            self.state = next;

            for effect in effects {
                if let Some(follow_up) = self.execute(effect) {
                    queue.push_back(follow_up);
                }
            }
        }

        self.state_tx.send_replace(self.state.clone());
    }

    fn execute(&mut self, effect: Effect) -> Option<CallEvent> {
        tracing::trace!("Executing effect: {:?}", effect);

        match effect {
            Effect::AcquireMedia => {
                let (tx, rx) = oneshot::channel();
                let devices = self.devices.clone();
                let constraints = self.config.media.clone();
                tokio::spawn(async move {
                    let result = devices.get_user_media(&constraints).await;
                    if let Err(Ok(late)) = tx.send(result) {
                        // Session already gone.
                        late.stop();
                    }
                });
                self.media_pending = Some(rx);
                None
            }

            Effect::CreatePeer { initiator } => {
                let Some(local) = self.local.as_ref() else {
                    return Some(CallEvent::PeerError("no local media".to_string()));
                };
                let options = if initiator {
                    PeerOptions::initiator()
                } else {
                    PeerOptions::answerer()
                };
                let (tx, rx) = mpsc::unbounded_channel();
                match self.connector.connect(options, local, tx) {
                    Ok(peer) => {
                        self.peer = Some(peer);
                        self.peer_events = Some(rx);
                        None
                    }
                    Err(e) => Some(CallEvent::PeerError(e.to_string())),
                }
            }

            Effect::ApplyRemoteSignal(signal) => match self.peer.as_mut() {
                Some(peer) => peer
                    .signal(signal)
                    .err()
                    .map(|e| CallEvent::PeerError(e.to_string())),
                None => Some(CallEvent::PeerError("no peer transport".to_string())),
            },

            Effect::Send(message) => match self.relay.send(message) {
                Ok(()) => None,
                Err(_) => Some(CallEvent::RelayDisconnected),
            },

            Effect::SetTrackEnabled { kind, enabled } => {
                if let Some(local) = &self.local {
                    local.set_enabled(kind, enabled);
                }
                None
            }

            Effect::AttachRemoteMedia => {
                self.remote = self.pending_remote.take();
                None
            }

            Effect::DestroyPeer => {
                if let Some(mut peer) = self.peer.take() {
                    peer.destroy();
                }
                self.peer_events = None;
                None
            }

            Effect::ReleaseMedia => {
                self.media_pending = None;
                for stream in [
                    self.local.take(),
                    self.remote.take(),
                    self.pending_remote.take(),
                ]
                .into_iter()
                .flatten()
                {
                    stream.stop();
                }
                None
            }
        }
    }

    /// Final teardown when the agent stops.
    fn release_all(&mut self) {
        self.execute(Effect::DestroyPeer);
        self.execute(Effect::ReleaseMedia);
    }
}

async fn recv_media(
    pending: &mut Option<oneshot::Receiver<Result<MediaStream>>>,
) -> std::result::Result<Result<MediaStream>, oneshot::error::RecvError> {
    match pending {
        Some(rx) => rx.await,
        None => std::future::pending().await,
    }
}

async fn recv_peer(events: &mut Option<mpsc::UnboundedReceiver<PeerEvent>>) -> Option<PeerEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
