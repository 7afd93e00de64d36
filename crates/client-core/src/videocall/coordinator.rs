//! Direct-call coordinator
//!
//! Owns one session and one peer handle. The handle carries the
//! registration and stays attached for the coordinator's lifetime; every
//! call is a fresh negotiation on it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};

use super::messages::{VideoCallEvent, VideoCallRequest};
use super::status::{CallStatus, CallTransition};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::events::{ClientEvent, EventEmitter};
use crate::gateway::{
    opaque_id, GatewayEvent, GatewayEventReceiver, GatewayEventSender, Jsep, MediaConstraints, MediaStreamInfo,
    SessionClient, VIDEOCALL_PLUGIN,
};
use crate::handle::{route_event, Handle, HandleListener, HandleRole};
use crate::notify::{
    spawn_missed_call_report, HttpMissedCallReporter, MissedCallReporter, NoopMissedCallReporter, NoopNotifier,
    Notification, Notifier,
};
use crate::session::{Session, SessionState};
use crate::timer::PeriodicTask;
use crate::validation::{validate_peer, validate_username};

/// Prefix of the opaque id of direct-call sessions
pub const OPAQUE_ID_PREFIX: &str = "videocalltest-";

/// Call offered to us and not yet settled
#[derive(Debug, Clone)]
struct IncomingCall {
    caller: String,
    comment: Option<String>,
    offer: Jsep,
    accept_sent: bool,
}

/// Coordinates a one-to-one video call scenario
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use trac_janus_client_core::{CallStatus, ClientConfig, DirectCallCoordinator};
/// use trac_janus_client_core::gateway::loopback::LoopbackGateway;
///
/// # tokio_test::block_on(async {
/// let gateway = Arc::new(LoopbackGateway::new());
/// let mut alice = DirectCallCoordinator::new(ClientConfig::default(), gateway).unwrap();
///
/// alice.start().await.unwrap();
/// alice.register("alice").await.unwrap();
/// alice.process_pending().await;
/// assert_eq!(alice.status(), CallStatus::Waiting);
///
/// alice.teardown().await;
/// # });
/// ```
pub struct DirectCallCoordinator {
    config: ClientConfig,
    client: Arc<dyn SessionClient>,
    notifier: Arc<dyn Notifier>,
    reporter: Arc<dyn MissedCallReporter>,
    events: EventEmitter,
    gateway_tx: GatewayEventSender,
    gateway_rx: GatewayEventReceiver,
    session: Option<Session>,
    handle: Option<Handle>,
    status: CallStatus,
    username: Option<String>,
    peer: Option<String>,
    outgoing: Option<String>,
    incoming: Option<IncomingCall>,
    roster: Vec<String>,
    notification: Option<Box<dyn Notification>>,
    peer_list_timer: Option<PeriodicTask>,
    bitrate_timer: Option<PeriodicTask>,
}

impl DirectCallCoordinator {
    /// Build a coordinator; nothing is contacted until [`start`](Self::start)
    ///
    /// With an `event_uri` configured, missed calls are reported over HTTP.
    pub fn new(config: ClientConfig, client: Arc<dyn SessionClient>) -> ClientResult<Self> {
        config.validate()?;
        let reporter: Arc<dyn MissedCallReporter> = match &config.event_uri {
            Some(uri) => Arc::new(HttpMissedCallReporter::new(uri)?),
            None => Arc::new(NoopMissedCallReporter),
        };
        let (gateway_tx, gateway_rx) = mpsc::unbounded_channel();
        Ok(Self {
            events: EventEmitter::new(config.event_channel_capacity),
            config,
            client,
            notifier: Arc::new(NoopNotifier),
            reporter,
            gateway_tx,
            gateway_rx,
            session: None,
            handle: None,
            status: CallStatus::Initial,
            username: None,
            peer: None,
            outgoing: None,
            incoming: None,
            roster: Vec::new(),
            notification: None,
            peer_list_timer: None,
            bitrate_timer: None,
        })
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_missed_call_reporter(mut self, reporter: Arc<dyn MissedCallReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Receive display instructions
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> CallStatus {
        self.status
    }

    /// Confirmed registration name
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Peer of the established call
    pub fn peer(&self) -> Option<&str> {
        self.peer.as_deref()
    }

    /// Target of the outgoing call still ringing
    pub fn ringing(&self) -> Option<&str> {
        self.outgoing.as_deref()
    }

    /// Registered peers, excluding ourselves
    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    pub fn session_state(&self) -> Option<SessionState> {
        self.session.as_ref().map(Session::state)
    }

    pub fn handle(&self) -> Option<&Handle> {
        self.handle.as_ref()
    }

    pub fn is_polling_peers(&self) -> bool {
        self.peer_list_timer.as_ref().is_some_and(PeriodicTask::is_running)
    }

    pub fn is_sampling_bitrate(&self) -> bool {
        self.bitrate_timer.as_ref().is_some_and(PeriodicTask::is_running)
    }

    fn fail(&self, error: ClientError) -> ClientError {
        tracing::warn!("{}", error);
        self.events.emit(ClientEvent::error(&error));
        error
    }

    fn transition(&mut self, transition: CallTransition) -> ClientResult<()> {
        let previous = self.status;
        let current = previous.apply(transition)?;
        self.status = current;
        tracing::info!("Call status {} -> {} on {:?}", previous, current, transition);
        self.events.emit(ClientEvent::CallStatusChanged { previous, current, timestamp: Utc::now() });
        Ok(())
    }

    fn require_status(&self, expected: CallStatus) -> ClientResult<()> {
        if self.status != expected {
            return Err(ClientError::InvalidCallState {
                expected: expected.to_string(),
                actual: self.status.to_string(),
            });
        }
        Ok(())
    }

    fn handle_mut(&mut self) -> ClientResult<&mut Handle> {
        self.handle.as_mut().ok_or(ClientError::NotStarted)
    }

    fn close_notification(&mut self) {
        if let Some(mut notification) = self.notification.take() {
            notification.close();
        }
    }

    fn stop_bitrate_timer(&mut self) {
        if let Some(mut timer) = self.bitrate_timer.take() {
            timer.cancel();
        }
    }

    async fn send(&mut self, request: &VideoCallRequest, jsep: Option<Jsep>) -> ClientResult<()> {
        let handle = self.handle.as_ref().ok_or(ClientError::NotStarted)?;
        handle.send(request, jsep).await
    }

    /// Create the session and attach the call handle
    pub async fn start(&mut self) -> ClientResult<()> {
        self.require_status(CallStatus::Initial)?;
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
        let attached = session.attach(VIDEOCALL_PLUGIN, HandleRole::Peer).await;
        let handle = match attached {
            Ok(handle) => handle,
            Err(e) => {
                let _ = session.destroy().await;
                return Err(self.fail(e));
            }
        };
        self.session = Some(session);
        self.handle = Some(handle);
        self.transition(CallTransition::Start)
    }

    /// Register `username`; confirmed by the inbound `registered` event
    pub async fn register(&mut self, username: &str) -> ClientResult<()> {
        validate_username(username).map_err(|e| self.fail(e))?;
        self.require_status(CallStatus::Started)?;
        tracing::info!("Registering as {}", username);
        self.send(&VideoCallRequest::Register { username: username.to_string() }, None).await
    }

    /// Call `peer` without a comment
    pub async fn call(&mut self, peer: &str) -> ClientResult<()> {
        self.call_with_comment(peer, None).await
    }

    /// Call `peer`, attaching a free-form comment to the invitation
    pub async fn call_with_comment(&mut self, peer: &str, comment: Option<&str>) -> ClientResult<()> {
        validate_peer(peer).map_err(|e| self.fail(e))?;
        self.require_status(CallStatus::Waiting)?;
        if self.outgoing.is_some() {
            return Err(ClientError::InvalidCallState {
                expected: "no call ringing".to_string(),
                actual: format!("ringing {}", self.outgoing.as_deref().unwrap_or_default()),
            });
        }

        let handle = self.handle_mut()?;
        handle.begin_negotiation()?;
        let offer = match handle.create_offer(MediaConstraints::duplex_with_data()).await {
            Ok(offer) => offer,
            Err(e) => return Err(self.fail(e)),
        };
        let request = VideoCallRequest::Call {
            username: peer.to_string(),
            comment: comment.map(str::to_string),
        };
        self.send(&request, Some(offer)).await?;
        tracing::info!("Calling {}", peer);
        self.outgoing = Some(peer.to_string());
        Ok(())
    }

    /// Answer the pending incoming call
    pub async fn accept_incoming(&mut self) -> ClientResult<()> {
        self.require_status(CallStatus::Incoming)?;
        let incoming = match &self.incoming {
            Some(incoming) if !incoming.accept_sent => incoming.clone(),
            _ => return Err(ClientError::internal("no incoming call awaiting an answer")),
        };

        let handle = self.handle_mut()?;
        let answer = match handle.create_answer(&incoming.offer, MediaConstraints::duplex_with_data()).await {
            Ok(answer) => answer,
            Err(e) => return Err(self.fail(e)),
        };
        self.send(&VideoCallRequest::Accept, Some(answer)).await?;
        if let Some(pending) = self.incoming.as_mut() {
            pending.accept_sent = true;
        }
        self.close_notification();
        tracing::info!("Accepted call from {}", incoming.caller);
        Ok(())
    }

    /// Refuse the pending incoming call
    pub async fn decline_incoming(&mut self) -> ClientResult<()> {
        self.require_status(CallStatus::Incoming)?;
        if let Err(e) = self.send(&VideoCallRequest::Hangup, None).await {
            tracing::warn!("Failed to send hangup: {}", e);
        }
        self.close_notification();
        if let Some(handle) = self.handle.as_mut() {
            handle.hangup().await;
        }
        let caller = self.incoming.take().map(|incoming| incoming.caller);
        self.transition(CallTransition::Decline)?;
        self.events.emit(ClientEvent::CallHungUp { peer: caller, reason: Some("Declined".to_string()) });
        Ok(())
    }

    /// End whatever call is ringing or established; a no-op otherwise
    pub async fn hangup(&mut self) -> ClientResult<()> {
        match self.status {
            CallStatus::Incoming => self.decline_incoming().await,
            CallStatus::Taking => {
                if let Err(e) = self.send(&VideoCallRequest::Hangup, None).await {
                    tracing::warn!("Failed to send hangup: {}", e);
                }
                if let Some(handle) = self.handle.as_mut() {
                    handle.hangup().await;
                }
                self.stop_bitrate_timer();
                let peer = self.peer.take();
                self.transition(CallTransition::Hangup)?;
                self.events.emit(ClientEvent::CallHungUp { peer, reason: Some("Explicit hangup".to_string()) });
                Ok(())
            }
            CallStatus::Waiting if self.outgoing.is_some() => {
                if let Err(e) = self.send(&VideoCallRequest::Hangup, None).await {
                    tracing::warn!("Failed to send hangup: {}", e);
                }
                if let Some(handle) = self.handle.as_mut() {
                    handle.hangup().await;
                }
                let peer = self.outgoing.take();
                self.events.emit(ClientEvent::CallHungUp { peer, reason: Some("Explicit hangup".to_string()) });
                Ok(())
            }
            _ => {
                tracing::debug!("Hangup with no call in progress ({})", self.status);
                Ok(())
            }
        }
    }

    /// Ask the plugin to relay (or stop relaying) our audio
    pub async fn set_audio(&mut self, enabled: bool) -> ClientResult<()> {
        self.send(&VideoCallRequest::set_audio(enabled), None).await
    }

    /// Ask the plugin to relay (or stop relaying) our video
    pub async fn set_video(&mut self, enabled: bool) -> ClientResult<()> {
        self.send(&VideoCallRequest::set_video(enabled), None).await
    }

    /// Cap the bitrate the peer sends us, in bits per second; 0 removes the cap
    pub async fn set_bitrate(&mut self, bitrate: u64) -> ClientResult<()> {
        self.send(&VideoCallRequest::set_bitrate(bitrate), None).await
    }

    /// Send text over the data channel
    pub async fn send_data(&mut self, text: &str) -> ClientResult<()> {
        if text.is_empty() {
            return Err(self.fail(ClientError::invalid_input("Insert a message to send on the DataChannel")));
        }
        self.require_status(CallStatus::Taking)?;
        let handle = self.handle.as_ref().ok_or(ClientError::NotStarted)?;
        handle.send_data(text).await
    }

    /// Cancel timers, detach the handle and destroy the session
    ///
    /// Safe to call repeatedly. The coordinator returns to `INITIAL` and can
    /// be started again with a new session.
    pub async fn teardown(&mut self) {
        if let Some(mut timer) = self.peer_list_timer.take() {
            timer.cancel();
        }
        self.stop_bitrate_timer();
        self.close_notification();

        if let Some(mut handle) = self.handle.take() {
            if let Err(e) = handle.detach().await {
                tracing::warn!("Error detaching handle {}: {}", handle.id(), e);
            }
        }
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.destroy().await {
                tracing::warn!("Error destroying session: {}", e);
            }
            self.events.emit(ClientEvent::SessionStateChanged { state: SessionState::Destroyed });
        }

        self.status = CallStatus::Initial;
        self.username = None;
        self.peer = None;
        self.outgoing = None;
        self.incoming = None;
        self.roster.clear();
    }

    /// Handle one event from the gateway
    pub async fn handle_event(&mut self, event: GatewayEvent) -> ClientResult<()> {
        match event {
            GatewayEvent::Handle(event) => {
                let ours = self.handle.as_ref().is_some_and(|h| h.id() == event.handle);
                if !ours {
                    tracing::debug!("Ignoring late event for handle {}", event.handle);
                    return Ok(());
                }
                route_event(self, event.kind).await
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
    ///
    /// Returns the number of events handled. Failures are surfaced as
    /// events and logged.
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

    fn start_peer_list_poll(&mut self) -> ClientResult<()> {
        if self.is_polling_peers() {
            return Ok(());
        }
        let plugin = self.handle.as_ref().ok_or(ClientError::NotStarted)?.plugin_handle();
        let request = serde_json::to_value(VideoCallRequest::List)?;
        self.peer_list_timer = Some(PeriodicTask::spawn(
            "peer-list",
            self.config.peer_list_interval(),
            move || {
                let plugin = Arc::clone(&plugin);
                let request = request.clone();
                async move {
                    if let Err(e) = plugin.send(request, None).await {
                        tracing::debug!("Peer list request failed: {}", e);
                    }
                }
            },
        ));
        Ok(())
    }

    fn start_bitrate_sampling(&mut self) {
        if self.is_sampling_bitrate() {
            return;
        }
        let Some(handle) = self.handle.as_ref() else {
            return;
        };
        let plugin = handle.plugin_handle();
        let events = self.events.clone();
        self.bitrate_timer = Some(PeriodicTask::spawn("bitrate", self.config.bitrate_interval(), move || {
            let bitrate = plugin.bitrate();
            let events = events.clone();
            async move {
                if let Some(bitrate) = bitrate {
                    events.emit(ClientEvent::Bitrate { slot: None, bitrate });
                }
            }
        }));
    }

    async fn on_registered(&mut self, username: String) -> ClientResult<()> {
        self.transition(CallTransition::Registered)?;
        tracing::info!("Successfully registered as {}!", username);
        self.username = Some(username.clone());
        self.events.emit(ClientEvent::Registered { username });
        self.start_peer_list_poll()
    }

    async fn on_incoming_call(&mut self, caller: String, comment: Option<String>, jsep: Option<Jsep>) -> ClientResult<()> {
        let Some(offer) = jsep.filter(Jsep::is_offer) else {
            return Err(self.fail(ClientError::negotiation(format!("incoming call from {} carries no offer", caller))));
        };
        if let Err(e) = self.status.apply(CallTransition::Incoming) {
            tracing::warn!("Rejecting incoming call from {} while {}: {}", caller, self.status, e);
            return Ok(());
        }

        let handle = self.handle_mut()?;
        handle.begin_negotiation()?;
        handle.offer_received()?;
        handle.set_remote(caller.clone(), None);
        self.transition(CallTransition::Incoming)?;
        tracing::info!("Incoming call from {}!", caller);

        let icon = self.config.avatar_for(&caller);
        self.notification = self
            .notifier
            .notify("Incoming call", &format!("Incoming call from {}!", caller), icon.as_deref());
        self.incoming = Some(IncomingCall { caller: caller.clone(), comment: comment.clone(), offer, accept_sent: false });
        self.events.emit(ClientEvent::IncomingCall { caller, comment });
        Ok(())
    }

    async fn on_accepted(&mut self, username: Option<String>, jsep: Option<Jsep>) -> ClientResult<()> {
        match self.status {
            CallStatus::Waiting if self.outgoing.is_some() => {
                let Some(answer) = jsep else {
                    return Err(self.fail(ClientError::negotiation("call accepted without an answer")));
                };
                let handle = self.handle_mut()?;
                if let Err(e) = handle.apply_remote(&answer).await {
                    handle.hangup().await;
                    self.outgoing = None;
                    let _ = self.send(&VideoCallRequest::Hangup, None).await;
                    return Err(self.fail(e));
                }
                let peer = username.or_else(|| self.outgoing.take());
                self.outgoing = None;
                if let (Some(handle), Some(peer)) = (self.handle.as_mut(), peer.as_ref()) {
                    handle.set_remote(peer.clone(), None);
                }
                self.transition(CallTransition::Accepted)?;
                tracing::info!("{} accepted the call!", peer.as_deref().unwrap_or("Peer"));
                self.peer = peer.clone();
                self.events.emit(ClientEvent::CallAccepted { peer });
                Ok(())
            }
            CallStatus::Incoming if self.incoming.as_ref().is_some_and(|i| i.accept_sent) => {
                let peer = self.incoming.take().map(|incoming| incoming.caller);
                self.transition(CallTransition::Accepted)?;
                tracing::info!("Call with {} established", peer.as_deref().unwrap_or("peer"));
                self.peer = peer.clone();
                self.events.emit(ClientEvent::CallAccepted { peer });
                Ok(())
            }
            status => {
                tracing::warn!("Rejecting accepted event while {}", status);
                Ok(())
            }
        }
    }

    async fn on_remote_hangup(&mut self, username: Option<String>, reason: Option<String>) -> ClientResult<()> {
        tracing::info!(
            "Call hung up by {} ({})",
            username.as_deref().unwrap_or("peer"),
            reason.as_deref().unwrap_or("no reason")
        );
        match self.status {
            CallStatus::Incoming => {
                let incoming = self.incoming.take();
                if let Some(incoming) = incoming.as_ref().filter(|i| !i.accept_sent) {
                    spawn_missed_call_report(
                        Arc::clone(&self.reporter),
                        incoming.caller.clone(),
                        incoming.comment.clone(),
                    );
                    self.events.emit(ClientEvent::MissedCall {
                        caller: incoming.caller.clone(),
                        comment: incoming.comment.clone(),
                    });
                }
                self.close_notification();
                if let Some(handle) = self.handle.as_mut() {
                    handle.hangup().await;
                }
                self.transition(CallTransition::Hangup)?;
                let peer = incoming.map(|i| i.caller).or(username);
                self.events.emit(ClientEvent::CallHungUp { peer, reason });
            }
            CallStatus::Taking => {
                if let Some(handle) = self.handle.as_mut() {
                    handle.hangup().await;
                }
                self.stop_bitrate_timer();
                self.transition(CallTransition::Hangup)?;
                let peer = self.peer.take().or(username);
                self.events.emit(ClientEvent::CallHungUp { peer, reason });
            }
            CallStatus::Waiting if self.outgoing.is_some() => {
                if let Some(handle) = self.handle.as_mut() {
                    handle.hangup().await;
                }
                let peer = self.outgoing.take();
                self.events.emit(ClientEvent::CallHungUp { peer, reason });
            }
            status => tracing::debug!("Hangup event ignored while {}", status),
        }
        Ok(())
    }

    async fn on_backend_error(&mut self, message: String, code: Option<u32>) -> ClientResult<()> {
        let error = ClientError::backend(message, code);
        if error.is_name_taken() {
            tracing::warn!("Registration refused: {}", error);
            self.username = None;
            self.events.emit(ClientEvent::RegistrationRejected { reason: error.to_string() });
            self.events.emit(ClientEvent::error(&error));
            return Ok(());
        }

        if let Some(handle) = self.handle.as_mut() {
            handle.hangup().await;
        }
        self.stop_bitrate_timer();
        self.close_notification();
        self.outgoing = None;
        self.incoming = None;
        self.peer = None;
        if self.status.in_call() {
            self.transition(CallTransition::Failure)?;
        }
        self.fail(error);
        Ok(())
    }
}

#[async_trait]
impl HandleListener for DirectCallCoordinator {
    async fn on_message(&mut self, message: Value, jsep: Option<Jsep>) -> ClientResult<()> {
        tracing::debug!("Got a message: {}", message);
        match VideoCallEvent::parse(&message) {
            VideoCallEvent::PeerList(list) => {
                let me = self.username.as_deref();
                let peers: Vec<String> = list.into_iter().filter(|name| Some(name.as_str()) != me).collect();
                if peers != self.roster {
                    tracing::debug!("Got a list of registered peers: {:?}", peers);
                }
                self.roster = peers.clone();
                self.events.emit(ClientEvent::RosterUpdated { peers });
                Ok(())
            }
            VideoCallEvent::Registered { username } => {
                if let Err(e) = self.on_registered(username).await {
                    tracing::warn!("Rejected registered event: {}", e);
                }
                Ok(())
            }
            VideoCallEvent::Calling => {
                tracing::info!("Waiting for the peer to answer...");
                if let Some(peer) = self.outgoing.clone() {
                    self.events.emit(ClientEvent::Ringing { peer });
                }
                Ok(())
            }
            VideoCallEvent::IncomingCall { username, comment } => self.on_incoming_call(username, comment, jsep).await,
            VideoCallEvent::Accepted { username } => self.on_accepted(username, jsep).await,
            VideoCallEvent::Hangup { username, reason } => self.on_remote_hangup(username, reason).await,
            VideoCallEvent::Set => Ok(()),
            VideoCallEvent::Error { message, code } => self.on_backend_error(message, code).await,
            VideoCallEvent::Other(other) => {
                tracing::debug!("Unhandled videocall message: {}", other);
                Ok(())
            }
        }
    }

    async fn on_local_stream(&mut self, stream: MediaStreamInfo) -> ClientResult<()> {
        tracing::debug!("Got a local stream: {:?}", stream);
        self.events.emit(ClientEvent::LocalStream { stream });
        Ok(())
    }

    async fn on_remote_stream(&mut self, stream: MediaStreamInfo) -> ClientResult<()> {
        tracing::debug!("Got a remote stream: {:?}", stream);
        self.events.emit(ClientEvent::RemoteStream { slot: None, stream });
        if stream.has_video() {
            self.start_bitrate_sampling();
        }
        Ok(())
    }

    async fn on_data_open(&mut self) -> ClientResult<()> {
        tracing::info!("The DataChannel is available!");
        self.events.emit(ClientEvent::DataChannelOpen);
        Ok(())
    }

    async fn on_data(&mut self, data: String) -> ClientResult<()> {
        tracing::debug!("We got data from the DataChannel! {}", data);
        self.events.emit(ClientEvent::DataReceived { data });
        Ok(())
    }

    async fn on_webrtc_state(&mut self, up: bool) -> ClientResult<()> {
        tracing::info!("PeerConnection is {}", if up { "up" } else { "down" });
        Ok(())
    }

    async fn on_cleanup(&mut self) -> ClientResult<()> {
        tracing::info!("Got a cleanup notification");
        self.stop_bitrate_timer();
        self.events.emit(ClientEvent::MediaCleared { slot: None });
        Ok(())
    }
}
