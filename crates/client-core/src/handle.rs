//! Plugin handles and their negotiation state machine
//!
//! A [`Handle`] wraps one [`PluginHandle`] attached to a session and tracks
//! the offer/answer negotiation running over it:
//!
//! ```text
//! Idle ──create_offer──► OfferSent ──apply_remote──► Connected ──hangup──► HungUp
//!   └──offer_received──► AnswerPending ──create_answer──┘
//! ```
//!
//! `HungUp` ends a negotiation. Peer and publisher handles stay attached
//! after a hangup and may start a fresh negotiation with
//! [`Handle::begin_negotiation`]; subscriber handles never do, a new
//! subscription always attaches a new handle.
//!
//! Inbound callbacks are dispatched to a [`HandleListener`] by
//! [`route_event`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{ClientError, ClientResult};
use crate::gateway::{HandleEventKind, HandleId, Jsep, MediaConstraints, MediaStreamInfo, PluginHandle};

/// What a handle is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleRole {
    /// One-to-one call endpoint, caller or callee depending on the call
    Peer,
    /// Local participant publishing into a room
    Publisher,
    /// Receiver of one remote feed
    Subscriber,
}

impl fmt::Display for HandleRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleRole::Peer => write!(f, "peer"),
            HandleRole::Publisher => write!(f, "publisher"),
            HandleRole::Subscriber => write!(f, "subscriber"),
        }
    }
}

/// Offer/answer negotiation state of a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NegotiationState {
    Idle,
    OfferSent,
    AnswerPending,
    Connected,
    HungUp,
}

/// Inputs of the negotiation state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationStep {
    LocalOffer,
    RemoteOffer,
    LocalAnswer,
    RemoteAnswer,
    Hangup,
    Restart,
}

impl NegotiationState {
    /// Next state for `step`, or `None` if the step is not valid here
    pub fn next(self, step: NegotiationStep) -> Option<NegotiationState> {
        use NegotiationState::*;
        use NegotiationStep::*;

        match (self, step) {
            (Idle, LocalOffer) => Some(OfferSent),
            (Idle, RemoteOffer) => Some(AnswerPending),
            (AnswerPending, LocalAnswer) => Some(Connected),
            (OfferSent, RemoteAnswer) => Some(Connected),
            // Renegotiation on an established publisher (e.g. configure with a new offer)
            (Connected, LocalOffer) => Some(OfferSent),
            (_, Hangup) => Some(HungUp),
            (HungUp, Restart) => Some(Idle),
            _ => None,
        }
    }

    /// Whether an offer or answer is in flight
    pub fn is_negotiating(self) -> bool {
        matches!(self, NegotiationState::OfferSent | NegotiationState::AnswerPending)
    }
}

/// Remote participant bound to a handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteParticipant {
    pub id: String,
    pub display: Option<String>,
}

/// One negotiated channel attached to a session
pub struct Handle {
    inner: Arc<dyn PluginHandle>,
    role: HandleRole,
    state: NegotiationState,
    remote: Option<RemoteParticipant>,
    detached: bool,
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.inner.id())
            .field("plugin", &self.inner.plugin())
            .field("role", &self.role)
            .field("state", &self.state)
            .field("remote", &self.remote)
            .field("detached", &self.detached)
            .finish()
    }
}

impl Handle {
    pub fn new(inner: Arc<dyn PluginHandle>, role: HandleRole) -> Self {
        Self {
            inner,
            role,
            state: NegotiationState::Idle,
            remote: None,
            detached: false,
        }
    }

    pub fn id(&self) -> HandleId {
        self.inner.id()
    }

    pub fn role(&self) -> HandleRole {
        self.role
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn remote(&self) -> Option<&RemoteParticipant> {
        self.remote.as_ref()
    }

    pub fn set_remote(&mut self, id: impl Into<String>, display: Option<String>) {
        self.remote = Some(RemoteParticipant { id: id.into(), display });
    }

    pub fn clear_remote(&mut self) {
        self.remote = None;
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// Shared access to the underlying plugin handle (for periodic tasks)
    pub fn plugin_handle(&self) -> Arc<dyn PluginHandle> {
        Arc::clone(&self.inner)
    }

    fn ensure_attached(&self) -> ClientResult<()> {
        if self.detached {
            return Err(ClientError::HandleDetached { handle: self.id() });
        }
        Ok(())
    }

    fn advance(&mut self, step: NegotiationStep) -> ClientResult<NegotiationState> {
        match self.state.next(step) {
            Some(next) => {
                tracing::debug!("Handle {} ({}) negotiation {:?} -> {:?} on {:?}", self.id(), self.role, self.state, next, step);
                self.state = next;
                Ok(next)
            }
            None => Err(ClientError::invalid_transition(self.state, step)),
        }
    }

    /// Serialize `request` and send it, optionally with a description
    pub async fn send<R: Serialize + ?Sized>(&self, request: &R, jsep: Option<Jsep>) -> ClientResult<()> {
        self.ensure_attached()?;
        let message = serde_json::to_value(request)?;
        tracing::debug!("Handle {} sending {} (jsep: {})", self.id(), message, jsep.is_some());
        self.inner.send(message, jsep).await
    }

    /// Start a fresh negotiation on a handle whose previous one hung up
    ///
    /// Subscriber handles cannot be reused.
    pub fn begin_negotiation(&mut self) -> ClientResult<()> {
        self.ensure_attached()?;
        if self.role == HandleRole::Subscriber {
            return Err(ClientError::invalid_transition(self.state, NegotiationStep::Restart));
        }
        if self.state == NegotiationState::HungUp {
            self.advance(NegotiationStep::Restart)?;
            self.remote = None;
        }
        Ok(())
    }

    /// Generate a local offer; the state is restored if generation fails
    pub async fn create_offer(&mut self, media: MediaConstraints) -> ClientResult<Jsep> {
        self.ensure_attached()?;
        let previous = self.state;
        self.advance(NegotiationStep::LocalOffer)?;
        match self.inner.create_offer(media).await {
            Ok(jsep) => Ok(jsep),
            Err(e) => {
                self.state = previous;
                Err(e)
            }
        }
    }

    /// Record that a remote offer arrived and an answer is owed
    pub fn offer_received(&mut self) -> ClientResult<()> {
        self.ensure_attached()?;
        self.advance(NegotiationStep::RemoteOffer).map(|_| ())
    }

    /// Answer a previously received offer; the state is restored on failure
    pub async fn create_answer(&mut self, offer: &Jsep, media: MediaConstraints) -> ClientResult<Jsep> {
        self.ensure_attached()?;
        if self.state != NegotiationState::AnswerPending {
            return Err(ClientError::invalid_transition(self.state, NegotiationStep::LocalAnswer));
        }
        let jsep = self.inner.create_answer(offer, media).await?;
        self.advance(NegotiationStep::LocalAnswer)?;
        Ok(jsep)
    }

    /// Apply the remote answer to our offer
    pub async fn apply_remote(&mut self, jsep: &Jsep) -> ClientResult<()> {
        self.ensure_attached()?;
        if self.state != NegotiationState::OfferSent {
            return Err(ClientError::invalid_transition(self.state, NegotiationStep::RemoteAnswer));
        }
        self.inner.handle_remote_jsep(jsep).await?;
        self.advance(NegotiationStep::RemoteAnswer).map(|_| ())
    }

    /// Tear down the peer connection. Safe to call repeatedly.
    pub async fn hangup(&mut self) {
        if self.detached || self.state == NegotiationState::HungUp {
            return;
        }
        self.inner.hangup().await;
        self.state = NegotiationState::HungUp;
        tracing::debug!("Handle {} ({}) hung up", self.id(), self.role);
    }

    /// Hang up and detach. Safe to call repeatedly.
    pub async fn detach(&mut self) -> ClientResult<()> {
        if self.detached {
            return Ok(());
        }
        self.hangup().await;
        self.detached = true;
        self.inner.detach().await
    }

    pub async fn send_data(&self, text: &str) -> ClientResult<()> {
        self.ensure_attached()?;
        self.inner.send_data(text).await
    }

    pub fn bitrate(&self) -> Option<String> {
        self.inner.bitrate()
    }

    pub fn is_audio_muted(&self) -> bool {
        self.inner.is_audio_muted()
    }

    pub fn mute_audio(&self) {
        self.inner.mute_audio()
    }

    pub fn unmute_audio(&self) {
        self.inner.unmute_audio()
    }
}

/// Named callbacks for the events of one handle
///
/// Implemented once per role; [`route_event`] is the only dispatcher.
#[async_trait]
pub trait HandleListener: Send {
    /// Plugin message, with the description it carried if any
    async fn on_message(&mut self, message: serde_json::Value, jsep: Option<Jsep>) -> ClientResult<()>;

    async fn on_local_stream(&mut self, _stream: MediaStreamInfo) -> ClientResult<()> {
        Ok(())
    }

    async fn on_remote_stream(&mut self, _stream: MediaStreamInfo) -> ClientResult<()> {
        Ok(())
    }

    async fn on_data_open(&mut self) -> ClientResult<()> {
        Ok(())
    }

    async fn on_data(&mut self, _data: String) -> ClientResult<()> {
        Ok(())
    }

    async fn on_webrtc_state(&mut self, _up: bool) -> ClientResult<()> {
        Ok(())
    }

    async fn on_media_state(&mut self, medium: String, receiving: bool) -> ClientResult<()> {
        tracing::info!("Gateway {} receiving our {}", if receiving { "started" } else { "stopped" }, medium);
        Ok(())
    }

    async fn on_cleanup(&mut self) -> ClientResult<()> {
        Ok(())
    }
}

/// Dispatch one handle event to the matching listener callback
pub async fn route_event<L>(listener: &mut L, kind: HandleEventKind) -> ClientResult<()>
where
    L: HandleListener + ?Sized,
{
    match kind {
        HandleEventKind::Message { message, jsep } => listener.on_message(message, jsep).await,
        HandleEventKind::LocalStream(stream) => listener.on_local_stream(stream).await,
        HandleEventKind::RemoteStream(stream) => listener.on_remote_stream(stream).await,
        HandleEventKind::DataOpen => listener.on_data_open().await,
        HandleEventKind::Data(data) => listener.on_data(data).await,
        HandleEventKind::WebrtcState { up } => listener.on_webrtc_state(up).await,
        HandleEventKind::MediaState { medium, receiving } => listener.on_media_state(medium, receiving).await,
        HandleEventKind::Cleanup => listener.on_cleanup().await,
    }
}
