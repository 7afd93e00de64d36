//! Wire messages of the videocall plugin

use serde::Serialize;
use serde_json::Value;

/// Requests sent to the videocall plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "request", rename_all = "lowercase")]
pub enum VideoCallRequest {
    /// Ask for the registered usernames
    List,
    Register {
        username: String,
    },
    /// Sent together with our offer
    Call {
        username: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
    },
    /// Sent together with our answer
    Accept,
    Hangup,
    /// Adjust the media the plugin relays for us
    Set {
        #[serde(skip_serializing_if = "Option::is_none")]
        audio: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        video: Option<bool>,
        /// Bits per second, 0 removes the cap
        #[serde(skip_serializing_if = "Option::is_none")]
        bitrate: Option<u64>,
    },
}

impl VideoCallRequest {
    pub fn set_audio(enabled: bool) -> Self {
        VideoCallRequest::Set { audio: Some(enabled), video: None, bitrate: None }
    }

    pub fn set_video(enabled: bool) -> Self {
        VideoCallRequest::Set { audio: None, video: Some(enabled), bitrate: None }
    }

    pub fn set_bitrate(bitrate: u64) -> Self {
        VideoCallRequest::Set { audio: None, video: None, bitrate: Some(bitrate) }
    }
}

/// Inbound videocall plugin message
#[derive(Debug, Clone, PartialEq)]
pub enum VideoCallEvent {
    /// Registered usernames, ourselves included
    PeerList(Vec<String>),
    Registered { username: String },
    /// Our call is ringing at the callee
    Calling,
    IncomingCall { username: String, comment: Option<String> },
    /// Call established; carries the callee name on the caller side
    Accepted { username: Option<String> },
    Hangup { username: Option<String>, reason: Option<String> },
    /// Acknowledgement of a `set` request
    Set,
    /// Any message without a `result`
    Error { message: String, code: Option<u32> },
    Other(Value),
}

fn string_field(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(Value::as_str).map(str::to_string)
}

impl VideoCallEvent {
    pub fn parse(message: &Value) -> Self {
        let Some(result) = message.get("result").filter(|r| !r.is_null()) else {
            let error = string_field(message, "error").unwrap_or_else(|| "Unknown error".to_string());
            let code = message
                .get("error_code")
                .and_then(Value::as_u64)
                .and_then(|c| u32::try_from(c).ok());
            return VideoCallEvent::Error { message: error, code };
        };

        if let Some(list) = result.get("list").and_then(Value::as_array) {
            let peers = list.iter().filter_map(Value::as_str).map(str::to_string).collect();
            return VideoCallEvent::PeerList(peers);
        }

        match result.get("event").and_then(Value::as_str) {
            Some("registered") => match string_field(result, "username") {
                Some(username) => VideoCallEvent::Registered { username },
                None => VideoCallEvent::Other(message.clone()),
            },
            Some("calling") => VideoCallEvent::Calling,
            Some("incomingcall") => match string_field(result, "username") {
                Some(username) => VideoCallEvent::IncomingCall {
                    username,
                    comment: string_field(result, "comment"),
                },
                None => VideoCallEvent::Other(message.clone()),
            },
            Some("accepted") => VideoCallEvent::Accepted { username: string_field(result, "username") },
            Some("hangup") => VideoCallEvent::Hangup {
                username: string_field(result, "username"),
                reason: string_field(result, "reason"),
            },
            Some("set") => VideoCallEvent::Set,
            _ => VideoCallEvent::Other(message.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let call = VideoCallRequest::Call { username: "bob".into(), comment: None };
        assert_eq!(serde_json::to_value(&call).unwrap(), json!({ "request": "call", "username": "bob" }));
        assert_eq!(serde_json::to_value(VideoCallRequest::List).unwrap(), json!({ "request": "list" }));
        assert_eq!(
            serde_json::to_value(VideoCallRequest::set_bitrate(128_000)).unwrap(),
            json!({ "request": "set", "bitrate": 128_000 })
        );
    }

    #[test]
    fn test_message_without_result_is_error() {
        let event = VideoCallEvent::parse(&json!({
            "videocall": "event",
            "error_code": 476,
            "error": "Username 'alice' already taken"
        }));
        assert_eq!(
            event,
            VideoCallEvent::Error { message: "Username 'alice' already taken".into(), code: Some(476) }
        );
        assert!(matches!(VideoCallEvent::parse(&json!({})), VideoCallEvent::Error { code: None, .. }));
    }

    #[test]
    fn test_null_result_is_error() {
        let event = VideoCallEvent::parse(&json!({
            "videocall": "event",
            "result": null,
            "error_code": 476,
            "error": "Username 'x' already taken"
        }));
        assert_eq!(event, VideoCallEvent::Error { message: "Username 'x' already taken".into(), code: Some(476) });
    }

    #[test]
    fn test_result_events() {
        let list = VideoCallEvent::parse(&json!({ "result": { "list": ["alice", "bob"] } }));
        assert_eq!(list, VideoCallEvent::PeerList(vec!["alice".into(), "bob".into()]));

        let incoming = VideoCallEvent::parse(&json!({
            "result": { "event": "incomingcall", "username": "bob", "comment": "ticket #3" }
        }));
        assert_eq!(
            incoming,
            VideoCallEvent::IncomingCall { username: "bob".into(), comment: Some("ticket #3".into()) }
        );

        let accepted = VideoCallEvent::parse(&json!({ "result": { "event": "accepted" } }));
        assert_eq!(accepted, VideoCallEvent::Accepted { username: None });

        let odd = VideoCallEvent::parse(&json!({ "result": { "event": "slow_link" } }));
        assert!(matches!(odd, VideoCallEvent::Other(_)));
    }
}
