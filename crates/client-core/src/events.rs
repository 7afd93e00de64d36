//! Display instructions for the presentation layer
//!
//! Coordinators never touch a UI. Everything a user interface would show
//! (status changes, rosters, streams, feed slots, errors) is published as a
//! [`ClientEvent`] on a broadcast channel owned by an [`EventEmitter`]. Any
//! number of subscribers may listen; a coordinator never waits for them.
//!
//! # Examples
//!
//! ```rust
//! use trac_janus_client_core::events::{ClientEvent, EventEmitter, EventPriority};
//!
//! # tokio_test::block_on(async {
//! let emitter = EventEmitter::new(16);
//! let mut rx = emitter.subscribe();
//!
//! emitter.emit(ClientEvent::Registered { username: "alice".to_string() });
//!
//! let event = rx.recv().await.unwrap();
//! assert_eq!(event.priority(), EventPriority::High);
//! # });
//! ```

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::error::{ClientError, ErrorCategory};
use crate::feeds::{FeedId, FeedSlot};
use crate::gateway::MediaStreamInfo;
use crate::session::SessionState;
use crate::videocall::CallStatus;

/// Event priority, used by subscribers to filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventPriority {
    /// Periodic measurements
    Low,
    /// Media and roster updates
    Normal,
    /// Call and registration changes
    High,
    /// Errors and fatal conditions
    Critical,
}

/// Everything the coordinators ask the presentation layer to show
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Session lifecycle change
    SessionStateChanged { state: SessionState },

    /// Registration confirmed by the call plugin
    Registered { username: String },
    /// Registration refused; the user should pick another name
    RegistrationRejected { reason: String },
    /// Other registered peers, excluding ourselves
    RosterUpdated { peers: Vec<String> },

    /// Direct-call status moved
    CallStatusChanged {
        previous: CallStatus,
        current: CallStatus,
        timestamp: DateTime<Utc>,
    },
    /// Our outgoing call is ringing at the peer
    Ringing { peer: String },
    /// Someone is calling us
    IncomingCall { caller: String, comment: Option<String> },
    /// Call established
    CallAccepted { peer: Option<String> },
    /// Call ended
    CallHungUp { peer: Option<String>, reason: Option<String> },
    /// An incoming call was abandoned before we answered
    MissedCall { caller: String, comment: Option<String> },

    /// Local capture is ready for preview
    LocalStream { stream: MediaStreamInfo },
    /// Remote media for the peer (`slot` is `None`) or a room feed
    RemoteStream { slot: Option<FeedSlot>, stream: MediaStreamInfo },
    /// Media of the peer or a feed went away
    MediaCleared { slot: Option<FeedSlot> },
    /// Data channel is usable
    DataChannelOpen,
    /// Text received on the data channel
    DataReceived { data: String },
    /// Receive bitrate sample
    Bitrate { slot: Option<FeedSlot>, bitrate: String },

    /// Joined a room as publisher
    Joined { room: u64, id: u64, private_id: u64 },
    /// Our own feed is being published
    Published { audio: bool },
    /// Our own feed is no longer published
    Unpublished,
    /// Local audio mute toggled
    AudioMuted { muted: bool },
    /// A remote feed occupies a slot
    FeedAttached { slot: FeedSlot, feed: FeedId, display: Option<String> },
    /// A remote feed left its slot
    FeedDetached { slot: FeedSlot, feed: FeedId },
    /// The room is gone; only a restart recovers
    RoomDestroyed { room: u64 },

    /// Something failed; `message` is meant for the user as is
    Error { message: String, category: ErrorCategory },
}

impl ClientEvent {
    /// Build an error event from a [`ClientError`]
    pub fn error(error: &ClientError) -> Self {
        ClientEvent::Error { message: error.to_string(), category: error.category() }
    }

    pub fn priority(&self) -> EventPriority {
        match self {
            ClientEvent::Bitrate { .. } => EventPriority::Low,
            ClientEvent::RosterUpdated { .. }
            | ClientEvent::LocalStream { .. }
            | ClientEvent::RemoteStream { .. }
            | ClientEvent::MediaCleared { .. }
            | ClientEvent::DataChannelOpen
            | ClientEvent::DataReceived { .. }
            | ClientEvent::AudioMuted { .. }
            | ClientEvent::FeedAttached { .. }
            | ClientEvent::FeedDetached { .. } => EventPriority::Normal,
            ClientEvent::SessionStateChanged { .. }
            | ClientEvent::Registered { .. }
            | ClientEvent::RegistrationRejected { .. }
            | ClientEvent::CallStatusChanged { .. }
            | ClientEvent::Ringing { .. }
            | ClientEvent::IncomingCall { .. }
            | ClientEvent::CallAccepted { .. }
            | ClientEvent::CallHungUp { .. }
            | ClientEvent::MissedCall { .. }
            | ClientEvent::Joined { .. }
            | ClientEvent::Published { .. }
            | ClientEvent::Unpublished => EventPriority::High,
            ClientEvent::RoomDestroyed { .. } | ClientEvent::Error { .. } => EventPriority::Critical,
        }
    }
}

/// Fan-out of [`ClientEvent`]s to any number of subscribers
#[derive(Debug, Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<ClientEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.sender.subscribe()
    }

    /// Publish `event`; having no subscriber is not an error
    pub fn emit(&self, event: ClientEvent) {
        tracing::trace!("Emitting {:?}", event);
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_event_keeps_message_verbatim() {
        let err = ClientError::backend("Username 'alice' already taken", Some(476));
        match ClientEvent::error(&err) {
            ClientEvent::Error { message, category } => {
                assert_eq!(message, "Username 'alice' already taken");
                assert_eq!(category, ErrorCategory::Backend);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_emit_without_subscribers() {
        let emitter = EventEmitter::new(4);
        emitter.emit(ClientEvent::Unpublished);
        assert_eq!(emitter.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_event() {
        let emitter = EventEmitter::new(4);
        let mut first = emitter.subscribe();
        let mut second = emitter.subscribe();
        emitter.emit(ClientEvent::RoomDestroyed { room: 1234 });
        assert!(matches!(first.recv().await.unwrap(), ClientEvent::RoomDestroyed { room: 1234 }));
        assert_eq!(second.recv().await.unwrap().priority(), EventPriority::Critical);
    }
}
