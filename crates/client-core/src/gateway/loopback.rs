//! In-memory gateway emulating the videocall and videoroom plugins
//!
//! [`LoopbackGateway`] implements [`SessionClient`] without any transport.
//! Every session connected through the same gateway (or a clone of it)
//! shares one backend, so two coordinators can register, call each other or
//! meet in a room exactly as they would on a real gateway. Plugin answers are
//! pushed synchronously into the requesting session's event channel.
//!
//! Besides the plugin semantics the gateway can be scripted for tests:
//! unreachable servers, failing media capture, remote publishers without a
//! session, room destruction and session failures.
//!
//! # Examples
//!
//! ```rust
//! use trac_janus_client_core::gateway::loopback::LoopbackGateway;
//!
//! let gateway = LoopbackGateway::new()
//!     .with_room(1234)
//!     .with_unreachable("wss://localhost:8989")
//!     .with_failing_audio_capture();
//! assert!(gateway.has_room(1234));
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use serde_json::{json, Value};

use super::{
    GatewayEvent, GatewayEventSender, GatewaySession, HandleEvent, HandleEventKind, HandleId, Jsep,
    MediaConstraints, MediaStreamInfo, PluginHandle, SessionClient, SessionId, VIDEOCALL_PLUGIN,
    VIDEOROOM_PLUGIN,
};
use crate::error::{ClientError, ClientResult};

/// Receive bitrate reported for a connected handle without a cap
const DEFAULT_BITRATE: u64 = 256_000;

/// A request received by the loopback backend
#[derive(Debug, Clone, PartialEq)]
pub struct LoopbackRequest {
    pub handle: HandleId,
    pub plugin: String,
    pub message: Value,
    pub with_jsep: bool,
}

impl LoopbackRequest {
    /// Value of the `request` field
    pub fn request(&self) -> Option<&str> {
        self.message.get("request").and_then(Value::as_str)
    }
}

#[derive(Debug)]
struct SessionRecord {
    events: GatewayEventSender,
    handles: Vec<HandleId>,
    destroyed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Membership {
    Publisher { room: u64, feed: u64 },
    Listener { room: u64, feed: u64 },
}

#[derive(Debug)]
struct HandleRecord {
    session: SessionId,
    plugin: String,
    detached: bool,
    /// A local description exists
    pc_active: bool,
    connected: bool,
    audio_muted: bool,
    bitrate_cap: Option<u64>,
    username: Option<String>,
    peer: Option<HandleId>,
    membership: Option<Membership>,
}

#[derive(Debug)]
struct Participant {
    /// `None` for scripted remote publishers
    handle: Option<HandleId>,
    display: Option<String>,
    publishing: bool,
}

#[derive(Debug, Default)]
struct Room {
    participants: BTreeMap<u64, Participant>,
}

#[derive(Debug)]
struct Backend {
    next_session: u64,
    next_handle: u64,
    next_feed: u64,
    unreachable: HashSet<String>,
    fail_audio_capture: bool,
    fail_offers: bool,
    offer_attempts: usize,
    sessions: HashMap<SessionId, SessionRecord>,
    handles: HashMap<HandleId, HandleRecord>,
    users: HashMap<String, HandleId>,
    rooms: HashMap<u64, Room>,
    requests: Vec<LoopbackRequest>,
}

impl Default for Backend {
    fn default() -> Self {
        Self {
            next_session: 1,
            next_handle: 1,
            next_feed: 1,
            unreachable: HashSet::new(),
            fail_audio_capture: false,
            fail_offers: false,
            offer_attempts: 0,
            sessions: HashMap::new(),
            handles: HashMap::new(),
            users: HashMap::new(),
            rooms: HashMap::new(),
            requests: Vec::new(),
        }
    }
}

fn videocall_result(result: Value) -> Value {
    json!({ "videocall": "event", "result": result })
}

fn videocall_error(code: u32, error: impl Into<String>) -> Value {
    json!({ "videocall": "event", "error_code": code, "error": error.into() })
}

fn videoroom_error(code: u32, error: impl Into<String>) -> Value {
    json!({ "videoroom": "event", "error_code": code, "error": error.into() })
}

fn fake_sdp(handle: HandleId, kind: &str) -> String {
    format!("v=0\r\no=- {} 1 IN IP4 127.0.0.1\r\ns=loopback {}\r\nt=0 0\r\n", handle.0, kind)
}

fn full_stream() -> MediaStreamInfo {
    MediaStreamInfo { audio_tracks: 1, video_tracks: 1, video_muted: false }
}

impl Backend {
    fn emit(&self, handle: HandleId, kind: HandleEventKind) {
        let Some(record) = self.handles.get(&handle) else {
            return;
        };
        if record.detached {
            return;
        }
        if let Some(session) = self.sessions.get(&record.session) {
            if !session.destroyed {
                let _ = session.events.send(GatewayEvent::Handle(HandleEvent { handle, kind }));
            }
        }
    }

    fn reply(&self, handle: HandleId, message: Value, jsep: Option<Jsep>) {
        self.emit(handle, HandleEventKind::Message { message, jsep });
    }

    fn record(&self, handle: HandleId) -> ClientResult<&HandleRecord> {
        match self.handles.get(&handle) {
            Some(record) if !record.detached => Ok(record),
            _ => Err(ClientError::HandleNotFound { handle }),
        }
    }

    fn record_mut(&mut self, handle: HandleId) -> ClientResult<&mut HandleRecord> {
        match self.handles.get_mut(&handle) {
            Some(record) if !record.detached => Ok(record),
            _ => Err(ClientError::HandleNotFound { handle }),
        }
    }

    fn allocate_feed(&mut self) -> u64 {
        loop {
            let candidate = self.next_feed;
            self.next_feed += 1;
            if !self.rooms.values().any(|room| room.participants.contains_key(&candidate)) {
                return candidate;
            }
        }
    }

    fn dispatch(&mut self, from: HandleId, message: Value, jsep: Option<Jsep>) -> ClientResult<()> {
        let plugin = self.record(from)?.plugin.clone();
        self.requests.push(LoopbackRequest {
            handle: from,
            plugin: plugin.clone(),
            message: message.clone(),
            with_jsep: jsep.is_some(),
        });

        let request = message.get("request").and_then(Value::as_str).unwrap_or_default().to_string();
        match plugin.as_str() {
            VIDEOCALL_PLUGIN => self.videocall_request(from, &request, &message, jsep),
            VIDEOROOM_PLUGIN => self.videoroom_request(from, &request, &message, jsep),
            other => return Err(ClientError::internal(format!("loopback has no plugin {}", other))),
        }
        Ok(())
    }

    // ---- videocall -------------------------------------------------------

    fn videocall_request(&mut self, from: HandleId, request: &str, message: &Value, jsep: Option<Jsep>) {
        match request {
            "list" => {
                let mut list: Vec<&String> = self.users.keys().collect();
                list.sort();
                self.reply(from, videocall_result(json!({ "list": list })), None);
            }
            "register" => self.videocall_register(from, message),
            "call" => self.videocall_call(from, message, jsep),
            "accept" => self.videocall_accept(from, jsep),
            "hangup" => self.videocall_hangup(from, "Explicit hangup"),
            "set" => {
                if let Ok(record) = self.record_mut(from) {
                    if let Some(bitrate) = message.get("bitrate").and_then(Value::as_u64) {
                        record.bitrate_cap = (bitrate > 0).then_some(bitrate);
                    }
                }
                self.reply(from, videocall_result(json!({ "event": "set" })), None);
            }
            other => self.reply(from, videocall_error(470, format!("Unknown request ({})", other)), None),
        }
    }

    fn videocall_register(&mut self, from: HandleId, message: &Value) {
        let Some(username) = message.get("username").and_then(Value::as_str) else {
            self.reply(from, videocall_error(471, "Missing element (username)"), None);
            return;
        };
        if let Some(existing) = self.handles.get(&from).and_then(|r| r.username.clone()) {
            self.reply(from, videocall_error(477, format!("Already registered ({})", existing)), None);
            return;
        }
        if self.users.contains_key(username) {
            self.reply(from, videocall_error(476, format!("Username '{}' already taken", username)), None);
            return;
        }
        self.users.insert(username.to_string(), from);
        if let Some(record) = self.handles.get_mut(&from) {
            record.username = Some(username.to_string());
        }
        self.reply(from, videocall_result(json!({ "event": "registered", "username": username })), None);
    }

    fn videocall_call(&mut self, from: HandleId, message: &Value, jsep: Option<Jsep>) {
        let Some(caller) = self.handles.get(&from).and_then(|r| r.username.clone()) else {
            self.reply(from, videocall_error(473, "Register a username first"), None);
            return;
        };
        let Some(target) = message.get("username").and_then(Value::as_str) else {
            self.reply(from, videocall_error(471, "Missing element (username)"), None);
            return;
        };
        let Some(offer) = jsep.filter(Jsep::is_offer) else {
            self.reply(from, videocall_error(474, "Missing SDP"), None);
            return;
        };
        let Some(&callee) = self.users.get(target) else {
            self.reply(from, videocall_error(478, format!("Username '{}' doesn't exist", target)), None);
            return;
        };
        if callee == from {
            self.reply(from, videocall_error(479, "You can't call yourself... use the EchoTest for that"), None);
            return;
        }
        if self.handles.get(&callee).and_then(|r| r.peer).is_some() {
            let busy = json!({ "event": "hangup", "username": target, "reason": "User busy" });
            self.reply(from, videocall_result(busy), None);
            return;
        }

        if let Some(record) = self.handles.get_mut(&from) {
            record.peer = Some(callee);
        }
        if let Some(record) = self.handles.get_mut(&callee) {
            record.peer = Some(from);
        }
        self.reply(from, videocall_result(json!({ "event": "calling" })), None);

        let mut incoming = json!({ "event": "incomingcall", "username": caller });
        if let Some(comment) = message.get("comment").and_then(Value::as_str) {
            incoming["comment"] = Value::String(comment.to_string());
        }
        self.reply(callee, videocall_result(incoming), Some(offer));
    }

    fn videocall_accept(&mut self, from: HandleId, jsep: Option<Jsep>) {
        let Some(caller) = self.handles.get(&from).and_then(|r| r.peer) else {
            self.reply(from, videocall_error(475, "No incoming call to accept"), None);
            return;
        };
        let Some(answer) = jsep.filter(|j| !j.is_offer()) else {
            self.reply(from, videocall_error(474, "Missing SDP"), None);
            return;
        };
        let callee_name = self.handles.get(&from).and_then(|r| r.username.clone());

        self.reply(caller, videocall_result(json!({ "event": "accepted", "username": callee_name })), Some(answer));
        self.reply(from, videocall_result(json!({ "event": "accepted" })), None);

        for side in [caller, from] {
            if let Some(record) = self.handles.get_mut(&side) {
                record.connected = true;
            }
            self.emit(side, HandleEventKind::WebrtcState { up: true });
            self.emit(side, HandleEventKind::RemoteStream(full_stream()));
            self.emit(side, HandleEventKind::DataOpen);
        }
    }

    fn videocall_hangup(&mut self, from: HandleId, reason: &str) {
        let username = self.handles.get(&from).and_then(|r| r.username.clone());
        let peer = self.handles.get_mut(&from).and_then(|r| r.peer.take());
        let hangup = videocall_result(json!({ "event": "hangup", "username": username, "reason": reason }));
        self.reply(from, hangup.clone(), None);
        if let Some(peer) = peer {
            if let Some(record) = self.handles.get_mut(&peer) {
                record.peer = None;
            }
            self.reply(peer, hangup, None);
        }
    }

    // ---- videoroom -------------------------------------------------------

    fn videoroom_request(&mut self, from: HandleId, request: &str, message: &Value, jsep: Option<Jsep>) {
        match request {
            "join" => match message.get("ptype").and_then(Value::as_str) {
                Some("publisher") => self.videoroom_join_publisher(from, message),
                Some("listener") | Some("subscriber") => self.videoroom_join_listener(from, message),
                _ => self.reply(from, videoroom_error(425, "Invalid element (ptype)"), None),
            },
            "configure" => self.videoroom_configure(from, message, jsep),
            "start" => self.videoroom_start(from, jsep),
            "unpublish" => self.videoroom_unpublish(from),
            "leave" => {
                self.videoroom_leave(from);
                self.reply(from, json!({ "videoroom": "event", "leaving": "ok" }), None);
            }
            other => self.reply(from, videoroom_error(422, format!("Unknown request '{}'", other)), None),
        }
    }

    fn publishers_of(&self, room: u64, except: Option<u64>) -> Vec<Value> {
        self.rooms
            .get(&room)
            .map(|r| {
                r.participants
                    .iter()
                    .filter(|(id, p)| p.publishing && Some(**id) != except)
                    .map(|(id, p)| json!({ "id": id, "display": p.display }))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Send `message` to every participant of `room` with a handle, except `except`
    fn broadcast(&self, room: u64, except: Option<u64>, message: &Value) {
        let Some(r) = self.rooms.get(&room) else {
            return;
        };
        for (id, participant) in &r.participants {
            if Some(*id) == except {
                continue;
            }
            if let Some(handle) = participant.handle {
                self.reply(handle, message.clone(), None);
            }
        }
    }

    fn videoroom_join_publisher(&mut self, from: HandleId, message: &Value) {
        let Some(room) = message.get("room").and_then(Value::as_u64) else {
            self.reply(from, videoroom_error(423, "Missing element (room)"), None);
            return;
        };
        if !self.rooms.contains_key(&room) {
            self.reply(from, videoroom_error(426, format!("No such room ({})", room)), None);
            return;
        }
        if matches!(self.handles.get(&from).and_then(|r| r.membership), Some(Membership::Publisher { .. })) {
            self.reply(from, videoroom_error(425, "Already in as a publisher on this handle"), None);
            return;
        }

        let display = message.get("display").and_then(Value::as_str).map(str::to_string);
        let feed = self.allocate_feed();
        let private_id: u32 = rand::thread_rng().r#gen();
        let publishers = self.publishers_of(room, None);

        if let Some(r) = self.rooms.get_mut(&room) {
            r.participants.insert(feed, Participant { handle: Some(from), display, publishing: false });
        }
        if let Some(record) = self.handles.get_mut(&from) {
            record.membership = Some(Membership::Publisher { room, feed });
        }

        let joined = json!({
            "videoroom": "joined",
            "room": room,
            "description": format!("Room {}", room),
            "id": feed,
            "private_id": private_id,
            "publishers": publishers,
        });
        self.reply(from, joined, None);
    }

    fn videoroom_join_listener(&mut self, from: HandleId, message: &Value) {
        let room = message.get("room").and_then(Value::as_u64).unwrap_or_default();
        let feed = message.get("feed").and_then(Value::as_u64).unwrap_or_default();
        let Some(r) = self.rooms.get(&room) else {
            self.reply(from, videoroom_error(426, format!("No such room ({})", room)), None);
            return;
        };
        let display = match r.participants.get(&feed) {
            Some(p) if p.publishing => p.display.clone(),
            _ => {
                self.reply(from, videoroom_error(428, format!("No such feed ({})", feed)), None);
                return;
            }
        };

        if let Some(record) = self.handles.get_mut(&from) {
            record.membership = Some(Membership::Listener { room, feed });
        }
        let attached = json!({ "videoroom": "attached", "room": room, "id": feed, "display": display });
        self.reply(from, attached, Some(Jsep::offer(fake_sdp(from, "subscriber offer"))));
    }

    fn videoroom_configure(&mut self, from: HandleId, message: &Value, jsep: Option<Jsep>) {
        let Some(Membership::Publisher { room, feed }) = self.handles.get(&from).and_then(|r| r.membership) else {
            self.reply(from, videoroom_error(424, "Can't configure, not in a room as a publisher"), None);
            return;
        };
        if let Some(record) = self.handles.get_mut(&from) {
            if let Some(bitrate) = message.get("bitrate").and_then(Value::as_u64) {
                record.bitrate_cap = (bitrate > 0).then_some(bitrate);
            }
        }

        let configured = json!({ "videoroom": "event", "room": room, "configured": "ok" });
        let Some(offer) = jsep.filter(Jsep::is_offer) else {
            self.reply(from, configured, None);
            return;
        };

        let newly_published = self
            .rooms
            .get_mut(&room)
            .and_then(|r| r.participants.get_mut(&feed))
            .map(|p| !std::mem::replace(&mut p.publishing, true))
            .unwrap_or(false);

        self.reply(from, configured, Some(Jsep::answer(fake_sdp(from, &format!("answer to {}", offer.sdp.len())))));
        if let Some(record) = self.handles.get_mut(&from) {
            record.connected = true;
        }
        self.emit(from, HandleEventKind::WebrtcState { up: true });
        self.emit(from, HandleEventKind::MediaState { medium: "video".to_string(), receiving: true });

        if newly_published {
            let display = self
                .rooms
                .get(&room)
                .and_then(|r| r.participants.get(&feed))
                .and_then(|p| p.display.clone());
            let publishers = json!({
                "videoroom": "event",
                "room": room,
                "publishers": [{ "id": feed, "display": display }],
            });
            self.broadcast(room, Some(feed), &publishers);
        }
    }

    fn videoroom_start(&mut self, from: HandleId, jsep: Option<Jsep>) {
        let Some(Membership::Listener { room, .. }) = self.handles.get(&from).and_then(|r| r.membership) else {
            self.reply(from, videoroom_error(424, "Can't start, not a listener"), None);
            return;
        };
        if jsep.as_ref().is_none_or(Jsep::is_offer) {
            self.reply(from, videoroom_error(429, "Missing answer"), None);
            return;
        }
        self.reply(from, json!({ "videoroom": "event", "room": room, "started": "ok" }), None);
        if let Some(record) = self.handles.get_mut(&from) {
            record.connected = true;
        }
        self.emit(from, HandleEventKind::WebrtcState { up: true });
        self.emit(from, HandleEventKind::RemoteStream(full_stream()));
    }

    /// Stop publishing `feed` and tell everybody else
    fn stop_publishing(&mut self, room: u64, feed: u64) -> bool {
        let was_publishing = self
            .rooms
            .get_mut(&room)
            .and_then(|r| r.participants.get_mut(&feed))
            .map(|p| std::mem::replace(&mut p.publishing, false))
            .unwrap_or(false);
        if was_publishing {
            let unpublished = json!({ "videoroom": "event", "room": room, "unpublished": feed });
            self.broadcast(room, Some(feed), &unpublished);
        }
        was_publishing
    }

    fn videoroom_unpublish(&mut self, from: HandleId) {
        let Some(Membership::Publisher { room, feed }) = self.handles.get(&from).and_then(|r| r.membership) else {
            self.reply(from, videoroom_error(424, "Can't unpublish, not in a room as a publisher"), None);
            return;
        };
        if !self.stop_publishing(room, feed) {
            self.reply(from, videoroom_error(424, "Can't unpublish, not published"), None);
            return;
        }
        self.reply(from, json!({ "videoroom": "event", "room": room, "unpublished": "ok" }), None);
    }

    fn videoroom_leave(&mut self, from: HandleId) {
        let membership = self.handles.get_mut(&from).and_then(|r| r.membership.take());
        if let Some(Membership::Publisher { room, feed }) = membership {
            if let Some(r) = self.rooms.get_mut(&room) {
                r.participants.remove(&feed);
            }
            let leaving = json!({ "videoroom": "event", "room": room, "leaving": feed });
            self.broadcast(room, Some(feed), &leaving);
        }
    }

    // ---- peer connection -------------------------------------------------

    fn capture(&mut self, handle: HandleId, media: MediaConstraints) -> ClientResult<()> {
        if media.audio_send && self.fail_audio_capture {
            return Err(ClientError::negotiation("NotFoundError: no audio capture device"));
        }
        self.record_mut(handle)?.pc_active = true;
        if media.sends_media() {
            let local = MediaStreamInfo {
                audio_tracks: usize::from(media.audio_send),
                video_tracks: usize::from(media.video_send),
                video_muted: false,
            };
            self.emit(handle, HandleEventKind::LocalStream(local));
        }
        Ok(())
    }

    fn hangup_media(&mut self, handle: HandleId) {
        let Ok(record) = self.record_mut(handle) else {
            return;
        };
        let was_active = record.pc_active || record.connected;
        let was_connected = record.connected;
        let membership = record.membership;
        record.pc_active = false;
        record.connected = false;
        if !was_active {
            return;
        }
        if let Some(Membership::Publisher { room, feed }) = membership {
            self.stop_publishing(room, feed);
        }
        if was_connected {
            self.emit(handle, HandleEventKind::WebrtcState { up: false });
        }
        self.emit(handle, HandleEventKind::Cleanup);
    }

    fn detach(&mut self, handle: HandleId) -> ClientResult<()> {
        self.record(handle)?;
        self.hangup_media(handle);

        let (username, has_peer) = self
            .handles
            .get(&handle)
            .map(|r| (r.username.clone(), r.peer.is_some()))
            .unwrap_or((None, false));
        if has_peer {
            self.videocall_hangup(handle, "Remote hangup");
        }
        if let Some(username) = username {
            self.users.remove(&username);
        }
        self.videoroom_leave(handle);

        if let Some(record) = self.handles.get_mut(&handle) {
            record.detached = true;
        }
        tracing::debug!("Loopback handle {} detached", handle);
        Ok(())
    }
}

/// In-memory [`SessionClient`]
#[derive(Debug, Clone, Default)]
pub struct LoopbackGateway {
    backend: Arc<Mutex<Backend>>,
}

impl LoopbackGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse sessions on `server`
    pub fn with_unreachable(self, server: impl Into<String>) -> Self {
        self.backend.lock().unreachable.insert(server.into());
        self
    }

    /// Configure a video room
    pub fn with_room(self, room: u64) -> Self {
        self.backend.lock().rooms.entry(room).or_default();
        self
    }

    /// First participant id handed out by the video room
    pub fn with_first_feed_id(self, id: u64) -> Self {
        self.backend.lock().next_feed = id;
        self
    }

    /// Fail every offer or answer that captures audio
    pub fn with_failing_audio_capture(self) -> Self {
        self.backend.lock().fail_audio_capture = true;
        self
    }

    /// Fail every offer
    pub fn with_failing_offers(self) -> Self {
        self.backend.lock().fail_offers = true;
        self
    }

    pub fn has_room(&self, room: u64) -> bool {
        self.backend.lock().rooms.contains_key(&room)
    }

    /// Add a publisher that has no session of its own
    ///
    /// Participants already in the room are told about it.
    pub fn add_remote_publisher(&self, room: u64, id: u64, display: impl Into<String>) {
        let mut backend = self.backend.lock();
        let display = display.into();
        let Some(r) = backend.rooms.get_mut(&room) else {
            return;
        };
        r.participants.insert(id, Participant { handle: None, display: Some(display.clone()), publishing: true });
        let publishers = json!({
            "videoroom": "event",
            "room": room,
            "publishers": [{ "id": id, "display": display }],
        });
        backend.broadcast(room, Some(id), &publishers);
    }

    /// Remove a scripted publisher; everybody else sees it leave
    pub fn remove_remote_publisher(&self, room: u64, id: u64) {
        let mut backend = self.backend.lock();
        let removed = backend.rooms.get_mut(&room).and_then(|r| r.participants.remove(&id)).is_some();
        if removed {
            let leaving = json!({ "videoroom": "event", "room": room, "leaving": id });
            backend.broadcast(room, Some(id), &leaving);
        }
    }

    /// Destroy `room`; every participant receives `destroyed`
    pub fn destroy_room(&self, room: u64) {
        let mut backend = self.backend.lock();
        let Some(r) = backend.rooms.remove(&room) else {
            return;
        };
        let destroyed = json!({ "videoroom": "destroyed", "room": room });
        for participant in r.participants.values() {
            if let Some(handle) = participant.handle {
                backend.reply(handle, destroyed.clone(), None);
            }
        }
    }

    /// Report an unrecoverable error on every live session
    pub fn fail_sessions(&self, reason: &str) {
        let backend = self.backend.lock();
        for session in backend.sessions.values().filter(|s| !s.destroyed) {
            let _ = session.events.send(GatewayEvent::SessionError(reason.to_string()));
        }
    }

    /// Usernames currently registered with the videocall plugin
    pub fn registered_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.backend.lock().users.keys().cloned().collect();
        users.sort();
        users
    }

    /// Every plugin request received so far
    pub fn requests(&self) -> Vec<LoopbackRequest> {
        self.backend.lock().requests.clone()
    }

    /// Number of offers any handle tried to create, failed ones included
    pub fn offer_attempts(&self) -> usize {
        self.backend.lock().offer_attempts
    }

    /// Plugin requests received from `handle`
    pub fn requests_from(&self, handle: HandleId) -> Vec<LoopbackRequest> {
        self.backend
            .lock()
            .requests
            .iter()
            .filter(|r| r.handle == handle)
            .cloned()
            .collect()
    }

    /// Number of handles attached and not yet detached
    pub fn attached_handles(&self) -> usize {
        self.backend.lock().handles.values().filter(|h| !h.detached).count()
    }
}

#[async_trait]
impl SessionClient for LoopbackGateway {
    async fn connect(&self, server: &str, events: GatewayEventSender) -> ClientResult<Arc<dyn GatewaySession>> {
        let mut backend = self.backend.lock();
        if backend.unreachable.contains(server) {
            return Err(ClientError::ConnectFailed {
                server: server.to_string(),
                reason: "Lost connection to the server (is it down?)".to_string(),
            });
        }
        let id = SessionId(backend.next_session);
        backend.next_session += 1;
        backend.sessions.insert(id, SessionRecord { events, handles: Vec::new(), destroyed: false });
        tracing::debug!("Loopback session {} created on {}", id, server);
        Ok(Arc::new(LoopbackSession { id, backend: Arc::clone(&self.backend) }))
    }
}

struct LoopbackSession {
    id: SessionId,
    backend: Arc<Mutex<Backend>>,
}

#[async_trait]
impl GatewaySession for LoopbackSession {
    fn id(&self) -> SessionId {
        self.id
    }

    async fn attach(&self, plugin: &str, opaque_id: &str) -> ClientResult<Arc<dyn PluginHandle>> {
        if plugin != VIDEOCALL_PLUGIN && plugin != VIDEOROOM_PLUGIN {
            return Err(ClientError::attach(plugin, "No such plugin"));
        }
        let mut backend = self.backend.lock();
        let id = HandleId(backend.next_handle);
        backend.next_handle += 1;
        match backend.sessions.get_mut(&self.id) {
            Some(session) if !session.destroyed => session.handles.push(id),
            _ => return Err(ClientError::SessionDestroyed),
        }
        backend.handles.insert(
            id,
            HandleRecord {
                session: self.id,
                plugin: plugin.to_string(),
                detached: false,
                pc_active: false,
                connected: false,
                audio_muted: false,
                bitrate_cap: None,
                username: None,
                peer: None,
                membership: None,
            },
        );
        tracing::debug!("Loopback handle {} attached to {} ({})", id, plugin, opaque_id);
        Ok(Arc::new(LoopbackHandle {
            id,
            plugin: plugin.to_string(),
            backend: Arc::clone(&self.backend),
        }))
    }

    async fn destroy(&self) -> ClientResult<()> {
        let mut backend = self.backend.lock();
        let handles = match backend.sessions.get(&self.id) {
            Some(session) if !session.destroyed => session.handles.clone(),
            _ => return Ok(()),
        };
        for handle in handles {
            let _ = backend.detach(handle);
        }
        if let Some(session) = backend.sessions.get_mut(&self.id) {
            session.destroyed = true;
        }
        Ok(())
    }
}

struct LoopbackHandle {
    id: HandleId,
    plugin: String,
    backend: Arc<Mutex<Backend>>,
}

#[async_trait]
impl PluginHandle for LoopbackHandle {
    fn id(&self) -> HandleId {
        self.id
    }

    fn plugin(&self) -> &str {
        &self.plugin
    }

    async fn send(&self, message: Value, jsep: Option<Jsep>) -> ClientResult<()> {
        self.backend.lock().dispatch(self.id, message, jsep)
    }

    async fn create_offer(&self, media: MediaConstraints) -> ClientResult<Jsep> {
        let mut backend = self.backend.lock();
        backend.offer_attempts += 1;
        if backend.fail_offers {
            return Err(ClientError::negotiation("OverconstrainedError: offer generation failed"));
        }
        backend.capture(self.id, media)?;
        Ok(Jsep::offer(fake_sdp(self.id, "offer")))
    }

    async fn create_answer(&self, offer: &Jsep, media: MediaConstraints) -> ClientResult<Jsep> {
        if !offer.is_offer() {
            return Err(ClientError::negotiation("Cannot answer a description that is not an offer"));
        }
        let mut backend = self.backend.lock();
        backend.capture(self.id, media)?;
        Ok(Jsep::answer(fake_sdp(self.id, "answer")))
    }

    async fn handle_remote_jsep(&self, jsep: &Jsep) -> ClientResult<()> {
        if jsep.is_offer() {
            return Err(ClientError::negotiation("Expected an answer"));
        }
        let mut backend = self.backend.lock();
        backend.record_mut(self.id)?.pc_active = true;
        Ok(())
    }

    async fn hangup(&self) {
        self.backend.lock().hangup_media(self.id);
    }

    async fn detach(&self) -> ClientResult<()> {
        self.backend.lock().detach(self.id)
    }

    async fn send_data(&self, text: &str) -> ClientResult<()> {
        let backend = self.backend.lock();
        let record = backend.record(self.id)?;
        if !record.connected {
            return Err(ClientError::invalid_input("Data channel is not open"));
        }
        if let Some(peer) = record.peer {
            backend.emit(peer, HandleEventKind::Data(text.to_string()));
        }
        Ok(())
    }

    fn bitrate(&self) -> Option<String> {
        let backend = self.backend.lock();
        let record = backend.record(self.id).ok()?;
        if !record.connected {
            return None;
        }
        let bits = record.bitrate_cap.unwrap_or(DEFAULT_BITRATE);
        Some(format!("{} kbits/sec", bits / 1000))
    }

    fn is_audio_muted(&self) -> bool {
        self.backend.lock().handles.get(&self.id).map(|r| r.audio_muted).unwrap_or(false)
    }

    fn mute_audio(&self) {
        if let Some(record) = self.backend.lock().handles.get_mut(&self.id) {
            record.audio_muted = true;
        }
    }

    fn unmute_audio(&self) {
        if let Some(record) = self.backend.lock().handles.get_mut(&self.id) {
            record.audio_muted = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    async fn attach(
        gateway: &LoopbackGateway,
        plugin: &str,
    ) -> (Arc<dyn PluginHandle>, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = gateway.connect("ws://loopback", tx).await.unwrap();
        (session.attach(plugin, "test").await.unwrap(), rx)
    }

    fn next_message(rx: &mut mpsc::UnboundedReceiver<GatewayEvent>) -> (Value, Option<Jsep>) {
        loop {
            match rx.try_recv().expect("event expected") {
                GatewayEvent::Handle(HandleEvent { kind: HandleEventKind::Message { message, jsep }, .. }) => {
                    return (message, jsep);
                }
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_unreachable_server_is_refused() {
        let gateway = LoopbackGateway::new().with_unreachable("wss://down");
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(matches!(
            gateway.connect("wss://down", tx).await,
            Err(ClientError::ConnectFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_register_twice_is_taken() {
        let gateway = LoopbackGateway::new();
        let (alice, mut alice_rx) = attach(&gateway, VIDEOCALL_PLUGIN).await;
        let (other, mut other_rx) = attach(&gateway, VIDEOCALL_PLUGIN).await;

        alice.send(json!({ "request": "register", "username": "alice" }), None).await.unwrap();
        let (registered, _) = next_message(&mut alice_rx);
        assert_eq!(registered["result"]["event"], "registered");

        other.send(json!({ "request": "register", "username": "alice" }), None).await.unwrap();
        let (error, _) = next_message(&mut other_rx);
        assert_eq!(error["error"], "Username 'alice' already taken");
        assert_eq!(gateway.registered_users(), vec!["alice".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_room_reports_426() {
        let gateway = LoopbackGateway::new();
        let (handle, mut rx) = attach(&gateway, VIDEOROOM_PLUGIN).await;
        handle
            .send(json!({ "request": "join", "room": 99, "ptype": "publisher", "display": "x" }), None)
            .await
            .unwrap();
        let (error, _) = next_message(&mut rx);
        assert_eq!(error["error_code"], 426);
    }

    #[tokio::test]
    async fn test_remote_publisher_is_announced() {
        let gateway = LoopbackGateway::new().with_room(1234).with_first_feed_id(10);
        let (handle, mut rx) = attach(&gateway, VIDEOROOM_PLUGIN).await;
        handle
            .send(json!({ "request": "join", "room": 1234, "ptype": "publisher", "display": "alice" }), None)
            .await
            .unwrap();
        let (joined, _) = next_message(&mut rx);
        assert_eq!(joined["id"], 10);

        gateway.add_remote_publisher(1234, 11, "bob");
        let (event, _) = next_message(&mut rx);
        assert_eq!(event["publishers"][0]["id"], 11);

        gateway.remove_remote_publisher(1234, 11);
        let (event, _) = next_message(&mut rx);
        assert_eq!(event["leaving"], 11);
    }

    #[tokio::test]
    async fn test_audio_capture_failure() {
        let gateway = LoopbackGateway::new().with_failing_audio_capture();
        let (handle, _rx) = attach(&gateway, VIDEOROOM_PLUGIN).await;
        assert!(handle.create_offer(MediaConstraints::publisher(true)).await.is_err());
        assert!(handle.create_offer(MediaConstraints::publisher(false)).await.is_ok());
    }
}
