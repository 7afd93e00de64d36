//! Wire messages of the videoroom plugin

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a handle takes part in a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantType {
    Publisher,
    Listener,
}

/// Requests sent to the videoroom plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "request", rename_all = "lowercase")]
pub enum VideoRoomRequest {
    Join {
        room: u64,
        ptype: ParticipantType,
        #[serde(skip_serializing_if = "Option::is_none")]
        display: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        feed: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        private_id: Option<u64>,
    },
    /// Publisher media settings; carries the offer when publishing
    Configure {
        #[serde(skip_serializing_if = "Option::is_none")]
        audio: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        video: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        bitrate: Option<u64>,
    },
    Unpublish,
    /// Sent by a subscriber together with its answer
    Start {
        room: u64,
    },
}

impl VideoRoomRequest {
    pub fn join_publisher(room: u64, display: impl Into<String>) -> Self {
        VideoRoomRequest::Join {
            room,
            ptype: ParticipantType::Publisher,
            display: Some(display.into()),
            feed: None,
            private_id: None,
        }
    }

    /// `private_id` ties the subscription to our publisher
    pub fn join_listener(room: u64, feed: u64, private_id: u64) -> Self {
        VideoRoomRequest::Join {
            room,
            ptype: ParticipantType::Listener,
            display: None,
            feed: Some(feed),
            private_id: Some(private_id),
        }
    }

    /// Publish video, and audio if `audio` is set
    pub fn publish(audio: bool) -> Self {
        VideoRoomRequest::Configure { audio: Some(audio), video: Some(true), bitrate: None }
    }

    /// Cap our publishing bitrate in bits per second; 0 removes the cap
    pub fn bitrate(bitrate: u64) -> Self {
        VideoRoomRequest::Configure { audio: None, video: None, bitrate: Some(bitrate) }
    }
}

/// A participant publishing in the room
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PublisherInfo {
    pub id: u64,
    #[serde(default)]
    pub display: Option<String>,
}

/// Inbound videoroom plugin message
#[derive(Debug, Clone, PartialEq)]
pub enum VideoRoomEvent {
    Joined {
        room: u64,
        id: u64,
        private_id: u64,
        publishers: Vec<PublisherInfo>,
    },
    /// The room is gone
    Destroyed { room: Option<u64> },
    /// New publishers appeared
    Publishers(Vec<PublisherInfo>),
    /// A participant left the room
    Leaving(u64),
    /// A participant stopped publishing
    Unpublished(u64),
    /// Our own unpublish request succeeded
    UnpublishedSelf,
    Configured,
    /// A subscription was set up; an offer comes with it
    Attached {
        room: u64,
        id: u64,
        display: Option<String>,
    },
    Started,
    Error {
        message: String,
        code: Option<u32>,
    },
    Other(Value),
}

/// Error code for a room that does not exist
pub const ERROR_NO_SUCH_ROOM: u32 = 426;

fn u64_field(value: &Value, field: &str) -> Option<u64> {
    value.get(field).and_then(Value::as_u64)
}

fn publishers(value: &Value) -> Vec<PublisherInfo> {
    value
        .get("publishers")
        .cloned()
        .and_then(|list| serde_json::from_value(list).ok())
        .unwrap_or_default()
}

impl VideoRoomEvent {
    pub fn parse(message: &Value) -> Self {
        match message.get("videoroom").and_then(Value::as_str) {
            Some("joined") => match (u64_field(message, "id"), u64_field(message, "room")) {
                (Some(id), Some(room)) => VideoRoomEvent::Joined {
                    room,
                    id,
                    private_id: u64_field(message, "private_id").unwrap_or_default(),
                    publishers: publishers(message),
                },
                _ => VideoRoomEvent::Other(message.clone()),
            },
            Some("destroyed") => VideoRoomEvent::Destroyed { room: u64_field(message, "room") },
            Some("attached") => match (u64_field(message, "id"), u64_field(message, "room")) {
                (Some(id), Some(room)) => VideoRoomEvent::Attached {
                    room,
                    id,
                    display: message.get("display").and_then(Value::as_str).map(str::to_string),
                },
                _ => VideoRoomEvent::Other(message.clone()),
            },
            Some("event") => Self::parse_event(message),
            _ => VideoRoomEvent::Other(message.clone()),
        }
    }

    fn parse_event(message: &Value) -> Self {
        if message.get("publishers").is_some() {
            return VideoRoomEvent::Publishers(publishers(message));
        }
        if let Some(leaving) = u64_field(message, "leaving") {
            return VideoRoomEvent::Leaving(leaving);
        }
        if let Some(unpublished) = message.get("unpublished") {
            return match unpublished {
                Value::String(s) if s == "ok" => VideoRoomEvent::UnpublishedSelf,
                other => match other.as_u64() {
                    Some(id) => VideoRoomEvent::Unpublished(id),
                    None => VideoRoomEvent::Other(message.clone()),
                },
            };
        }
        if message.get("error").is_some() || message.get("error_code").is_some() {
            return VideoRoomEvent::Error {
                message: message
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown error")
                    .to_string(),
                code: u64_field(message, "error_code").and_then(|c| u32::try_from(c).ok()),
            };
        }
        if message.get("configured").is_some() {
            return VideoRoomEvent::Configured;
        }
        if message.get("started").is_some() {
            return VideoRoomEvent::Started;
        }
        VideoRoomEvent::Other(message.clone())
    }
}
