//! Gateway session client abstraction
//!
//! The coordinators in this crate never speak the gateway's transport
//! protocol themselves. They drive a *session client* through the traits in
//! this module:
//!
//! - [`SessionClient`] - opens a session against one server endpoint
//! - [`GatewaySession`] - attaches plugin handles and destroys the session
//! - [`PluginHandle`] - sends plugin requests and negotiates media
//!
//! Everything the session client wants to tell the application (plugin
//! messages, streams, data channel traffic, cleanup notifications) is pushed
//! as a [`GatewayEvent`] into the single unbounded channel handed over at
//! connect time. That channel is the serial event-delivery context: events of
//! one handle keep the order in which the gateway emitted them, events of
//! different handles may interleave.
//!
//! [`loopback::LoopbackGateway`] is an in-memory implementation emulating the
//! videocall and videoroom plugins.

pub mod loopback;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ClientResult;

/// Plugin package name of the one-to-one video call plugin
pub const VIDEOCALL_PLUGIN: &str = "janus.plugin.videocall";

/// Plugin package name of the SFU video room plugin
pub const VIDEOROOM_PLUGIN: &str = "janus.plugin.videoroom";

/// Gateway-assigned session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Gateway-assigned plugin handle identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandleId(pub u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of session description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// Session description exchanged with the gateway
///
/// Opaque to this crate apart from its type; the SDP body is passed through
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jsep {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl Jsep {
    /// Build an offer description
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self { sdp_type: SdpType::Offer, sdp: sdp.into() }
    }

    /// Build an answer description
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self { sdp_type: SdpType::Answer, sdp: sdp.into() }
    }

    /// Whether this is an offer
    pub fn is_offer(&self) -> bool {
        self.sdp_type == SdpType::Offer
    }
}

/// Media requested when generating an offer or an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub audio_send: bool,
    pub audio_recv: bool,
    pub video_send: bool,
    pub video_recv: bool,
    pub data: bool,
}

impl MediaConstraints {
    /// Send and receive audio and video, plus a data channel
    pub fn duplex_with_data() -> Self {
        Self { audio_send: true, audio_recv: true, video_send: true, video_recv: true, data: true }
    }

    /// Send-only publisher media; video always, audio on request
    pub fn publisher(use_audio: bool) -> Self {
        Self { audio_send: use_audio, audio_recv: false, video_send: true, video_recv: false, data: false }
    }

    /// Receive-only subscriber media
    pub fn subscriber() -> Self {
        Self { audio_send: false, audio_recv: true, video_send: false, video_recv: true, data: false }
    }

    /// Whether anything local is captured
    pub fn sends_media(&self) -> bool {
        self.audio_send || self.video_send
    }
}

/// Summary of a local or remote media stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MediaStreamInfo {
    pub audio_tracks: usize,
    pub video_tracks: usize,
    /// First video track is muted (no frames flowing)
    pub video_muted: bool,
}

impl MediaStreamInfo {
    /// Stream with live video available for rendering
    pub fn has_video(&self) -> bool {
        self.video_tracks > 0 && !self.video_muted
    }
}

/// Callback payloads delivered for a single handle
#[derive(Debug, Clone, PartialEq)]
pub enum HandleEventKind {
    /// Plugin message, optionally carrying a session description
    Message { message: serde_json::Value, jsep: Option<Jsep> },
    /// Local capture is available
    LocalStream(MediaStreamInfo),
    /// Remote media arrived
    RemoteStream(MediaStreamInfo),
    /// Data channel is open
    DataOpen,
    /// Text received on the data channel
    Data(String),
    /// Peer connection went up or down
    WebrtcState { up: bool },
    /// Gateway started or stopped receiving one of our media
    MediaState { medium: String, receiving: bool },
    /// The handle's peer connection was torn down
    Cleanup,
}

/// Event for one plugin handle
#[derive(Debug, Clone, PartialEq)]
pub struct HandleEvent {
    pub handle: HandleId,
    pub kind: HandleEventKind,
}

/// Everything a session client reports back to the application
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    Handle(HandleEvent),
    /// The session was destroyed by the gateway
    SessionDestroyed,
    /// The session hit an unrecoverable error
    SessionError(String),
}

/// Sending half of a session's event channel
pub type GatewayEventSender = mpsc::UnboundedSender<GatewayEvent>;

/// Receiving half of a session's event channel
pub type GatewayEventReceiver = mpsc::UnboundedReceiver<GatewayEvent>;

/// Opens gateway sessions
#[async_trait]
pub trait SessionClient: Send + Sync {
    /// Create a session on one server endpoint
    ///
    /// All events of the session and of every handle attached to it are
    /// delivered through `events`.
    async fn connect(&self, server: &str, events: GatewayEventSender) -> ClientResult<Arc<dyn GatewaySession>>;
}

/// One live gateway session
#[async_trait]
pub trait GatewaySession: Send + Sync {
    fn id(&self) -> SessionId;

    /// Attach a new handle to `plugin`
    async fn attach(&self, plugin: &str, opaque_id: &str) -> ClientResult<Arc<dyn PluginHandle>>;

    /// Destroy the session and every handle attached to it
    async fn destroy(&self) -> ClientResult<()>;
}

/// One plugin handle attached to a session
#[async_trait]
pub trait PluginHandle: Send + Sync {
    fn id(&self) -> HandleId;

    fn plugin(&self) -> &str;

    /// Send a plugin request, optionally with a session description
    async fn send(&self, message: serde_json::Value, jsep: Option<Jsep>) -> ClientResult<()>;

    /// Capture local media per `media` and produce an offer
    async fn create_offer(&self, media: MediaConstraints) -> ClientResult<Jsep>;

    /// Apply the remote `offer` and produce an answer
    async fn create_answer(&self, offer: &Jsep, media: MediaConstraints) -> ClientResult<Jsep>;

    /// Apply a remote description (answer to our offer)
    async fn handle_remote_jsep(&self, jsep: &Jsep) -> ClientResult<()>;

    /// Tear down the peer connection; the handle stays attached
    async fn hangup(&self);

    /// Detach the handle from the session
    async fn detach(&self) -> ClientResult<()>;

    /// Send text over the data channel
    async fn send_data(&self, text: &str) -> ClientResult<()>;

    /// Current receive bitrate as a display string, if measurable
    fn bitrate(&self) -> Option<String>;

    fn is_audio_muted(&self) -> bool;

    fn mute_audio(&self);

    fn unmute_audio(&self);
}

/// Opaque client identifier: `prefix` followed by 12 random alphanumerics
pub fn opaque_id(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    format!("{}{}", prefix, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jsep_wire_shape() {
        let jsep = Jsep::offer("v=0");
        let value = serde_json::to_value(&jsep).unwrap();
        assert_eq!(value, serde_json::json!({ "type": "offer", "sdp": "v=0" }));

        let back: Jsep = serde_json::from_value(serde_json::json!({ "type": "answer", "sdp": "v=0" })).unwrap();
        assert!(!back.is_offer());
    }

    #[test]
    fn test_opaque_id_shape() {
        let id = opaque_id("videocalltest-");
        assert!(id.starts_with("videocalltest-"));
        assert_eq!(id.len(), "videocalltest-".len() + 12);
        assert!(id["videocalltest-".len()..].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_media_presets() {
        assert!(MediaConstraints::duplex_with_data().data);
        let publisher = MediaConstraints::publisher(false);
        assert!(publisher.video_send && !publisher.audio_send && !publisher.video_recv);
        assert!(!MediaConstraints::subscriber().sends_media());
    }
}
