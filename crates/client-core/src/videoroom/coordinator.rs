//! Room coordinator
//!
//! One session, one publisher handle for our own feed, and one subscriber
//! handle per remote feed. Subscribers live in a [`FeedRegistry`] keyed by
//! slot and by remote feed id.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};

use super::messages::{PublisherInfo, VideoRoomEvent, VideoRoomRequest, ERROR_NO_SUCH_ROOM};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::events::{ClientEvent, EventEmitter};
use crate::feeds::{FeedId, FeedRegistry, FeedSlot};
use crate::gateway::{
    opaque_id, GatewayEvent, GatewayEventReceiver, GatewayEventSender, HandleId, Jsep, MediaConstraints,
    MediaStreamInfo, SessionClient, VIDEOROOM_PLUGIN,
};
use crate::handle::{route_event, Handle, HandleListener, HandleRole, NegotiationState};
use crate::session::{Session, SessionState};
use crate::timer::PeriodicTask;
use crate::validation::validate_display_name;

/// Prefix of the opaque id of room sessions
pub const OPAQUE_ID_PREFIX: &str = "videoroomtest-";

/// Our own participant once joined
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalParticipant {
    pub room: u64,
    pub id: u64,
    pub private_id: u64,
    pub display: String,
}

/// A subscription to one remote feed
#[derive(Debug)]
struct Subscriber {
    handle: Handle,
    slot: FeedSlot,
    feed: FeedId,
    display: Option<String>,
    bitrate_timer: Option<PeriodicTask>,
}

impl Subscriber {
    fn stop_bitrate_timer(&mut self) {
        if let Some(mut timer) = self.bitrate_timer.take() {
            timer.cancel();
        }
    }
}

/// Coordinates a publish/subscribe video room scenario
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use trac_janus_client_core::{ClientConfig, RoomCoordinator};
/// use trac_janus_client_core::gateway::loopback::LoopbackGateway;
///
/// # tokio_test::block_on(async {
/// let gateway = Arc::new(LoopbackGateway::new().with_room(1234));
/// let mut room = RoomCoordinator::new(ClientConfig::default(), gateway).unwrap();
///
/// room.start(1234).await.unwrap();
/// room.join("alice").await.unwrap();
/// room.process_pending().await;
/// assert!(room.local().is_some());
///
/// room.teardown().await;
/// # });
/// ```
pub struct RoomCoordinator {
    config: ClientConfig,
    client: Arc<dyn SessionClient>,
    events: EventEmitter,
    gateway_tx: GatewayEventSender,
    gateway_rx: GatewayEventReceiver,
    session: Option<Session>,
    room: Option<u64>,
    publisher: Option<Handle>,
    pending_display: Option<String>,
    local: Option<LocalParticipant>,
    published: bool,
    publishing_audio: bool,
    subscribers: HashMap<HandleId, Subscriber>,
    feeds: FeedRegistry<HandleId>,
}

impl RoomCoordinator {
    pub fn new(config: ClientConfig, client: Arc<dyn SessionClient>) -> ClientResult<Self> {
        config.validate()?;
        let (gateway_tx, gateway_rx) = mpsc::unbounded_channel();
        Ok(Self {
            events: EventEmitter::new(config.event_channel_capacity),
            config,
            client,
            gateway_tx,
            gateway_rx,
            session: None,
            room: None,
            publisher: None,
            pending_display: None,
            local: None,
            published: false,
            publishing_audio: false,
            subscribers: HashMap::new(),
            feeds: FeedRegistry::new(),
        })
    }

    /// Receive display instructions
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn room(&self) -> Option<u64> {
        self.room
    }

    pub fn local(&self) -> Option<&LocalParticipant> {
        self.local.as_ref()
    }

    pub fn session_state(&self) -> Option<SessionState> {
        self.session.as_ref().map(Session::state)
    }

    pub fn is_published(&self) -> bool {
        self.published
    }

    /// Whether our published feed carries audio
    pub fn is_publishing_audio(&self) -> bool {
        self.published && self.publishing_audio
    }

    pub fn publisher(&self) -> Option<&Handle> {
        self.publisher.as_ref()
    }

    /// Slot showing `feed`
    pub fn slot_of_feed(&self, feed: FeedId) -> Option<FeedSlot> {
        self.feeds.find_by_remote_id(feed)
    }

    /// Active subscriptions as `(slot, feed, display)`, by ascending slot
    pub fn feeds(&self) -> Vec<(FeedSlot, FeedId, Option<String>)> {
        self.feeds
            .iter()
            .map(|(slot, feed, handle)| {
                let display = self.subscribers.get(handle).and_then(|s| s.display.clone());
                (slot, feed, display)
            })
            .collect()
    }

    /// Subscriber handle in `slot`
    pub fn subscriber(&self, slot: FeedSlot) -> Option<&Handle> {
        let (_, handle) = self.feeds.get(slot)?;
        self.subscribers.get(handle).map(|s| &s.handle)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_sampling_bitrate(&self, slot: FeedSlot) -> bool {
        self.feeds
            .get(slot)
            .and_then(|(_, handle)| self.subscribers.get(handle))
            .and_then(|s| s.bitrate_timer.as_ref())
            .is_some_and(PeriodicTask::is_running)
    }

    fn fail(&self, error: ClientError) -> ClientError {
        tracing::warn!("{}", error);
        self.events.emit(ClientEvent::error(&error));
        error
    }

    fn publisher_mut(&mut self) -> ClientResult<&mut Handle> {
        self.publisher.as_mut().ok_or(ClientError::NotStarted)
    }

    /// Create the session for `room` and attach the publisher handle
    pub async fn start(&mut self, room: u64) -> ClientResult<()> {
        if self.session.is_some() {
            return Err(ClientError::internal("room coordinator already started"));
        }
        // Events of a previous session must not reach this one
        let (gateway_tx, gateway_rx) = mpsc::unbounded_channel();
        self.gateway_tx = gateway_tx;
        self.gateway_rx = gateway_rx;
        let session = Session::connect(
            self.client.as_ref(),
            &self.config.servers,
            opaque_id(OPAQUE_ID_PREFIX),
            self.gateway_tx.clone(),
        )
        .await
        .map_err(|e| self.fail(e))?;
        self.events.emit(ClientEvent::SessionStateChanged { state: session.state() });

        let mut session = session;
        let attached = session.attach(VIDEOROOM_PLUGIN, HandleRole::Publisher).await;
        let publisher = match attached {
            Ok(handle) => handle,
            Err(e) => {
                let _ = session.destroy().await;
                return Err(self.fail(e));
            }
        };
        self.session = Some(session);
        self.publisher = Some(publisher);
        self.room = Some(room);
        Ok(())
    }

    /// Join the room as a publisher under `display`
    pub async fn join(&mut self, display: &str) -> ClientResult<()> {
        validate_display_name(display).map_err(|e| self.fail(e))?;
        let room = self.room.ok_or(ClientError::NotStarted)?;
        if self.local.is_some() {
            return Err(ClientError::internal("already joined"));
        }
        let publisher = self.publisher.as_ref().ok_or(ClientError::NotStarted)?;
        publisher.send(&VideoRoomRequest::join_publisher(room, display), None).await?;
        let display_name = display;
        tracing::info!("Joining room {} as {}", room, display_name);
        self.pending_display = Some(display.to_string());
        Ok(())
    }

    /// Offer our own feed; video always, audio if `use_audio`
    ///
    /// If the offer fails with audio it is retried once without.
    pub async fn publish_own_feed(&mut self, use_audio: bool) -> ClientResult<()> {
        if self.local.is_none() {
            return Err(ClientError::internal("cannot publish before joining"));
        }
        let handle = self.publisher_mut()?;
        handle.begin_negotiation()?;

        let (offer, audio) = match handle.create_offer(MediaConstraints::publisher(use_audio)).await {
            Ok(offer) => (offer, use_audio),
            Err(e) if use_audio => {
                tracing::warn!("WebRTC error: {}; publishing without audio", e);
                match handle.create_offer(MediaConstraints::publisher(false)).await {
                    Ok(offer) => (offer, false),
                    Err(e) => return Err(self.fail(e)),
                }
            }
            Err(e) => return Err(self.fail(e)),
        };

        handle.send(&VideoRoomRequest::publish(audio), Some(offer)).await?;
        tracing::info!("Publishing our feed (audio: {})", audio);
        self.publishing_audio = audio;
        Ok(())
    }

    /// Subscribe to a remote feed in the lowest free slot
    pub async fn subscribe_to_feed(&mut self, feed: FeedId, display: Option<String>) -> ClientResult<FeedSlot> {
        let (room, private_id) = match &self.local {
            Some(local) => (local.room, local.private_id),
            None => return Err(ClientError::internal("cannot subscribe before joining")),
        };
        self.feeds.check_admission(feed).map_err(|e| self.fail(e))?;

        let session = self.session.as_ref().ok_or(ClientError::NotStarted)?;
        let mut handle = match session.attach(VIDEOROOM_PLUGIN, HandleRole::Subscriber).await {
            Ok(handle) => handle,
            Err(e) => return Err(self.fail(e)),
        };
        let slot = self.feeds.acquire_slot(feed, handle.id())?;

        if let Err(e) = handle.send(&VideoRoomRequest::join_listener(room, feed, private_id), None).await {
            self.feeds.release_slot(slot);
            let _ = handle.detach().await;
            return Err(self.fail(e));
        }
        let display_name = display.as_deref().unwrap_or("unknown");
        tracing::info!(
            "Subscribing to feed {} ({}) in slot {}",
            feed,
            display_name,
            slot
        );
        handle.set_remote(feed.to_string(), display.clone());
        self.subscribers.insert(
            handle.id(),
            Subscriber { handle, slot, feed, display, bitrate_timer: None },
        );
        Ok(slot)
    }

    /// Stop publishing; the handle is torn down once the room confirms
    pub async fn unpublish(&mut self) -> ClientResult<()> {
        let publisher = self.publisher.as_ref().ok_or(ClientError::NotStarted)?;
        publisher.send(&VideoRoomRequest::Unpublish, None).await
    }

    /// Cap the bitrate of our published feed, in bits per second; 0 removes the cap
    pub async fn set_bitrate(&mut self, bitrate: u64) -> ClientResult<()> {
        let publisher = self.publisher.as_ref().ok_or(ClientError::NotStarted)?;
        publisher.send(&VideoRoomRequest::bitrate(bitrate), None).await
    }

    /// Mute or unmute our captured audio; returns whether it is now muted
    pub fn toggle_mute(&mut self) -> ClientResult<bool> {
        let publisher = self.publisher.as_ref().ok_or(ClientError::NotStarted)?;
        let muted = if publisher.is_audio_muted() {
            publisher.unmute_audio();
            false
        } else {
            publisher.mute_audio();
            true
        };
        tracing::info!("{} local audio", if muted { "Muted" } else { "Unmuted" });
        self.events.emit(ClientEvent::AudioMuted { muted });
        Ok(muted)
    }

    /// Detach the subscription showing `feed` and free its slot
    async fn remove_feed(&mut self, feed: FeedId) -> Option<FeedSlot> {
        let Some((slot, handle_id)) = self.feeds.release_by_remote_id(feed) else {
            tracing::debug!("Feed {} is not subscribed", feed);
            return None;
        };
        if let Some(mut subscriber) = self.subscribers.remove(&handle_id) {
            subscriber.stop_bitrate_timer();
            if let Err(e) = subscriber.handle.detach().await {
                tracing::warn!("Error detaching subscriber {}: {}", handle_id, e);
            }
        }
        tracing::info!("Feed {} left slot {}", feed, slot);
        self.events.emit(ClientEvent::FeedDetached { slot, feed });
        Some(slot)
    }

    /// Give up on a subscription the gateway rejected, freeing its slot
    async fn drop_subscriber(&mut self, handle_id: HandleId) {
        let Some(mut subscriber) = self.subscribers.remove(&handle_id) else {
            return;
        };
        self.feeds.release_slot(subscriber.slot);
        subscriber.stop_bitrate_timer();
        if let Err(e) = subscriber.handle.detach().await {
            tracing::warn!("Error detaching subscriber {}: {}", handle_id, e);
        }
        tracing::info!("Subscription to feed {} dropped from slot {}", subscriber.feed, subscriber.slot);
        self.events.emit(ClientEvent::FeedDetached { slot: subscriber.slot, feed: subscriber.feed });
    }

    /// Detach every handle, cancel every timer and destroy the session
    ///
    /// Safe to call repeatedly. [`start`](Self::start) may be called again
    /// afterwards.
    pub async fn teardown(&mut self) {
        for (slot, feed, handle_id) in self.feeds.drain() {
            if let Some(mut subscriber) = self.subscribers.remove(&handle_id) {
                subscriber.stop_bitrate_timer();
                if let Err(e) = subscriber.handle.detach().await {
                    tracing::warn!("Error detaching subscriber {}: {}", handle_id, e);
                }
            }
            self.events.emit(ClientEvent::FeedDetached { slot, feed });
        }
        for (handle_id, mut subscriber) in self.subscribers.drain() {
            subscriber.stop_bitrate_timer();
            if let Err(e) = subscriber.handle.detach().await {
                tracing::warn!("Error detaching subscriber {}: {}", handle_id, e);
            }
        }

        if let Some(mut publisher) = self.publisher.take() {
            if let Err(e) = publisher.detach().await {
                tracing::warn!("Error detaching publisher: {}", e);
            }
        }
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.destroy().await {
                tracing::warn!("Error destroying session: {}", e);
            }
            self.events.emit(ClientEvent::SessionStateChanged { state: SessionState::Destroyed });
        }

        self.room = None;
        self.pending_display = None;
        self.local = None;
        self.published = false;
        self.publishing_audio = false;
    }

    /// Handle one event from the gateway
    pub async fn handle_event(&mut self, event: GatewayEvent) -> ClientResult<()> {
        match event {
            GatewayEvent::Handle(event) => {
                if self.publisher.as_ref().is_some_and(|h| h.id() == event.handle) {
                    route_event(&mut PublisherRole { coordinator: self }, event.kind).await
                } else if self.subscribers.contains_key(&event.handle) {
                    let mut role = SubscriberRole { coordinator: self, handle: event.handle };
                    route_event(&mut role, event.kind).await
                } else {
                    tracing::debug!("Ignoring late event for handle {}", event.handle);
                    Ok(())
                }
            }
            GatewayEvent::SessionDestroyed => {
                self.session_lost(ClientError::SessionDestroyed).await;
                Err(ClientError::SessionDestroyed)
            }
            GatewayEvent::SessionError(reason) => {
                let error = ClientError::SessionFailed { reason };
                self.session_lost(error.clone()).await;
                Err(error)
            }
        }
    }

    async fn session_lost(&mut self, error: ClientError) {
        tracing::error!("Session lost: {}", error);
        if let Some(session) = self.session.as_mut() {
            session.mark_destroyed();
        }
        self.events.emit(ClientEvent::error(&error));
        self.teardown().await;
    }

    /// Handle every event already queued, without waiting
    pub async fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.gateway_rx.try_recv() {
            if let Err(e) = self.handle_event(event).await {
                tracing::debug!("Event handling failed: {}", e);
            }
            handled += 1;
        }
        handled
    }

    /// Handle events until the session is gone
    pub async fn run(&mut self) -> ClientResult<()> {
        while let Some(event) = self.gateway_rx.recv().await {
            match self.handle_event(event).await {
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => tracing::debug!("Event handling failed: {}", e),
                Ok(()) => {}
            }
            if self.session.is_none() {
                break;
            }
        }
        Ok(())
    }

    async fn on_joined(&mut self, room: u64, id: u64, private_id: u64, publishers: Vec<PublisherInfo>) {
        let display = self.pending_display.take().unwrap_or_default();
        tracing::info!("Successfully joined room {} with ID {}", room, id);
        self.local = Some(LocalParticipant { room, id, private_id, display });
        self.events.emit(ClientEvent::Joined { room, id, private_id });

        if self.config.auto_publish {
            if let Err(e) = self.publish_own_feed(true).await {
                tracing::warn!("Could not publish our feed: {}", e);
            }
        }
        self.subscribe_all(publishers).await;
    }

    async fn subscribe_all(&mut self, publishers: Vec<PublisherInfo>) {
        for publisher in publishers {
            tracing::debug!("  >> [{}] {:?}", publisher.id, publisher.display);
            if let Err(e) = self.subscribe_to_feed(publisher.id, publisher.display).await {
                tracing::warn!("Not subscribing to feed {}: {}", publisher.id, e);
            }
        }
    }

    async fn on_local_unpublished(&mut self) {
        if let Some(publisher) = self.publisher.as_mut() {
            publisher.hangup().await;
        }
        if self.published {
            self.published = false;
            self.events.emit(ClientEvent::Unpublished);
        }
    }

    async fn on_room_destroyed(&mut self, room: Option<u64>) -> ClientResult<()> {
        let room = room.or(self.room).unwrap_or_default();
        let error = ClientError::RoomDestroyed { room };
        tracing::error!("{}", error);
        self.events.emit(ClientEvent::RoomDestroyed { room });
        self.events.emit(ClientEvent::error(&error));
        self.teardown().await;
        Err(error)
    }

    fn start_feed_bitrate_sampling(&mut self, handle_id: HandleId) {
        let Some(subscriber) = self.subscribers.get_mut(&handle_id) else {
            return;
        };
        if subscriber.bitrate_timer.as_ref().is_some_and(PeriodicTask::is_running) {
            return;
        }
        let plugin = subscriber.handle.plugin_handle();
        let events = self.events.clone();
        let slot = subscriber.slot;
        subscriber.bitrate_timer = Some(PeriodicTask::spawn("feed-bitrate", self.config.bitrate_interval(), move || {
            let bitrate = plugin.bitrate();
            let events = events.clone();
            async move {
                if let Some(bitrate) = bitrate {
                    events.emit(ClientEvent::Bitrate { slot: Some(slot), bitrate });
                }
            }
        }));
    }
}

/// Callbacks of the publisher handle
struct PublisherRole<'a> {
    coordinator: &'a mut RoomCoordinator,
}

#[async_trait]
impl HandleListener for PublisherRole<'_> {
    async fn on_message(&mut self, message: Value, jsep: Option<Jsep>) -> ClientResult<()> {
        tracing::debug!(" ::: Got a message (publisher) ::: {}", message);
        let coordinator = &mut *self.coordinator;

        match VideoRoomEvent::parse(&message) {
            VideoRoomEvent::Joined { room, id, private_id, publishers } => {
                coordinator.on_joined(room, id, private_id, publishers).await;
            }
            VideoRoomEvent::Destroyed { room } => return coordinator.on_room_destroyed(room).await,
            VideoRoomEvent::Publishers(publishers) => {
                tracing::debug!("Got a list of available publishers/feeds");
                coordinator.subscribe_all(publishers).await;
            }
            VideoRoomEvent::Leaving(feed) => {
                tracing::info!("Publisher left: {}", feed);
                coordinator.remove_feed(feed).await;
            }
            VideoRoomEvent::UnpublishedSelf => coordinator.on_local_unpublished().await,
            VideoRoomEvent::Unpublished(feed) => {
                if coordinator.local.as_ref().is_some_and(|local| local.id == feed) {
                    coordinator.on_local_unpublished().await;
                } else {
                    tracing::info!("Publisher left: {}", feed);
                    coordinator.remove_feed(feed).await;
                }
            }
            VideoRoomEvent::Error { message, code } => {
                let error = match (code, coordinator.room) {
                    (Some(ERROR_NO_SUCH_ROOM), Some(room)) => ClientError::RoomNotFound { room },
                    _ => ClientError::backend(message, code),
                };
                return Err(coordinator.fail(error));
            }
            VideoRoomEvent::Configured | VideoRoomEvent::Started => {}
            VideoRoomEvent::Attached { .. } | VideoRoomEvent::Other(_) => {
                tracing::debug!("Unhandled publisher message: {}", message);
            }
        }

        if let Some(jsep) = jsep {
            tracing::debug!("Handling SDP as well...");
            let publisher = coordinator.publisher_mut()?;
            if publisher.state() != NegotiationState::OfferSent {
                tracing::warn!("Ignoring unexpected description on the publisher ({:?})", publisher.state());
                return Ok(());
            }
            if let Err(e) = publisher.apply_remote(&jsep).await {
                return Err(coordinator.fail(e));
            }
            coordinator.published = true;
            coordinator.events.emit(ClientEvent::Published { audio: coordinator.publishing_audio });
        }
        Ok(())
    }

    async fn on_local_stream(&mut self, stream: MediaStreamInfo) -> ClientResult<()> {
        tracing::debug!(" ::: Got a local stream ::: {:?}", stream);
        self.coordinator.events.emit(ClientEvent::LocalStream { stream });
        Ok(())
    }

    async fn on_webrtc_state(&mut self, up: bool) -> ClientResult<()> {
        tracing::info!("Gateway says our WebRTC PeerConnection is {} now", if up { "up" } else { "down" });
        Ok(())
    }

    async fn on_cleanup(&mut self) -> ClientResult<()> {
        tracing::info!(" ::: Got a cleanup notification: we are unpublished now :::");
        let coordinator = &mut *self.coordinator;
        if coordinator.published {
            coordinator.published = false;
            coordinator.events.emit(ClientEvent::Unpublished);
        }
        coordinator.events.emit(ClientEvent::MediaCleared { slot: None });
        Ok(())
    }
}

/// Callbacks of one subscriber handle
struct SubscriberRole<'a> {
    coordinator: &'a mut RoomCoordinator,
    handle: HandleId,
}

impl SubscriberRole<'_> {
    fn subscriber(&mut self) -> ClientResult<&mut Subscriber> {
        self.coordinator
            .subscribers
            .get_mut(&self.handle)
            .ok_or(ClientError::HandleNotFound { handle: self.handle })
    }

    async fn answer(&mut self, offer: Jsep) -> ClientResult<()> {
        let room = self.coordinator.room.ok_or(ClientError::NotStarted)?;
        let subscriber = self.subscriber()?;
        subscriber.handle.offer_received()?;
        let answer = subscriber
            .handle
            .create_answer(&offer, MediaConstraints::subscriber())
            .await?;
        subscriber.handle.send(&VideoRoomRequest::Start { room }, Some(answer)).await
    }
}

#[async_trait]
impl HandleListener for SubscriberRole<'_> {
    async fn on_message(&mut self, message: Value, jsep: Option<Jsep>) -> ClientResult<()> {
        tracing::debug!(" ::: Got a message (listener) ::: {}", message);

        match VideoRoomEvent::parse(&message) {
            VideoRoomEvent::Attached { room, id, display } => {
                let subscriber = self.subscriber()?;
                if display.is_some() {
                    subscriber.display = display.clone();
                }
                subscriber.handle.set_remote(id.to_string(), subscriber.display.clone());
                let (slot, feed) = (subscriber.slot, subscriber.feed);
                if feed != id {
                    tracing::warn!("Subscriber in slot {} attached to feed {} instead of {}", slot, id, feed);
                }
                let display_name = display.as_deref().unwrap_or("unknown");
                tracing::info!(
                    "Successfully attached to feed {} ({}) in room {}",
                    id,
                    display_name,
                    room
                );
                let display = self.subscriber()?.display.clone();
                self.coordinator.events.emit(ClientEvent::FeedAttached { slot, feed, display });
            }
            VideoRoomEvent::Error { message, code } => {
                let error = self.coordinator.fail(ClientError::backend(message, code));
                self.coordinator.drop_subscriber(self.handle).await;
                return Err(error);
            }
            VideoRoomEvent::Started => tracing::debug!("Subscriber {} started", self.handle),
            other => tracing::debug!("Unhandled listener message: {:?}", other),
        }

        if let Some(jsep) = jsep {
            if !jsep.is_offer() {
                tracing::warn!("Ignoring unexpected answer on subscriber {}", self.handle);
                return Ok(());
            }
            tracing::debug!("Handling SDP as well...");
            if let Err(e) = self.answer(jsep).await {
                let error = self.coordinator.fail(e);
                self.coordinator.drop_subscriber(self.handle).await;
                return Err(error);
            }
        }
        Ok(())
    }

    async fn on_remote_stream(&mut self, stream: MediaStreamInfo) -> ClientResult<()> {
        let slot = self.subscriber()?.slot;
        tracing::debug!("Remote feed in slot {}: {:?}", slot, stream);
        self.coordinator.events.emit(ClientEvent::RemoteStream { slot: Some(slot), stream });
        if stream.has_video() {
            self.coordinator.start_feed_bitrate_sampling(self.handle);
        }
        Ok(())
    }

    async fn on_webrtc_state(&mut self, up: bool) -> ClientResult<()> {
        tracing::debug!("Subscriber {} PeerConnection is {}", self.handle, if up { "up" } else { "down" });
        Ok(())
    }

    async fn on_cleanup(&mut self) -> ClientResult<()> {
        let subscriber = self.subscriber()?;
        let slot = subscriber.slot;
        tracing::info!(" ::: Got a cleanup notification (remote feed {}) :::", subscriber.feed);
        subscriber.stop_bitrate_timer();
        self.coordinator.events.emit(ClientEvent::MediaCleared { slot: Some(slot) });
        Ok(())
    }
}
