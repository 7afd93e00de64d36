use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::broadcast;

use super::*;
use crate::config::ClientConfig;
use crate::error::{ClientError, ErrorCategory};
use crate::events::ClientEvent;
use crate::feeds::FeedSlot;
use crate::gateway::loopback::LoopbackGateway;
use crate::gateway::{GatewayEvent, HandleEvent, HandleEventKind};
use crate::handle::NegotiationState;
use crate::session::SessionState;

const ROOM: u64 = 1234;

fn gateway() -> Arc<LoopbackGateway> {
    Arc::new(LoopbackGateway::new().with_room(ROOM).with_first_feed_id(10))
}

fn coordinator(gateway: &Arc<LoopbackGateway>) -> RoomCoordinator {
    RoomCoordinator::new(ClientConfig::default(), gateway.clone()).unwrap()
}

async fn joined(gateway: &Arc<LoopbackGateway>, display: &str) -> RoomCoordinator {
    let mut room = coordinator(gateway);
    room.start(ROOM).await.unwrap();
    room.join(display).await.unwrap();
    room.process_pending().await;
    assert!(room.local().is_some());
    room
}

fn drain(rx: &mut broadcast::Receiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn error_messages(events: &[ClientEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            ClientEvent::Error { message, .. } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_join_subscribes_existing_publishers() {
    let gateway = gateway();
    gateway.add_remote_publisher(ROOM, 11, "bob");

    let mut room = coordinator(&gateway);
    let mut rx = room.subscribe();
    room.start(ROOM).await.unwrap();
    room.join("alice").await.unwrap();
    room.process_pending().await;

    let local = room.local().unwrap();
    assert_eq!(local.id, 10);
    assert_eq!(local.display, "alice");
    assert!(room.is_published());
    assert!(room.is_publishing_audio());
    assert_eq!(room.slot_of_feed(11), Some(FeedSlot(1)));
    assert_eq!(room.feeds(), vec![(FeedSlot(1), 11, Some("bob".to_string()))]);
    assert!(room.is_sampling_bitrate(FeedSlot(1)));

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(e, ClientEvent::Joined { room: ROOM, id: 10, .. })));
    assert!(events.iter().any(|e| matches!(e, ClientEvent::Published { audio: true })));
    assert!(events.iter().any(|e| matches!(
        e,
        ClientEvent::FeedAttached { slot: FeedSlot(1), feed: 11, display: Some(d) } if d == "bob"
    )));
    assert!(events.iter().any(|e| matches!(e, ClientEvent::RemoteStream { slot: Some(FeedSlot(1)), .. })));

    let listener = room.subscriber(FeedSlot(1)).unwrap();
    let requests: Vec<_> = gateway
        .requests_from(listener.id())
        .iter()
        .map(|r| r.message.clone())
        .collect();
    assert_eq!(requests[0]["ptype"], "listener");
    assert_eq!(requests[0]["feed"], 11);
    assert_eq!(requests[0]["private_id"], local.private_id);
    assert_eq!(requests[1]["request"], "start");
}

#[tokio::test]
async fn test_invalid_display_name_sends_nothing() {
    let gateway = gateway();
    let mut room = coordinator(&gateway);
    room.start(ROOM).await.unwrap();

    let err = room.join("").await.unwrap_err();
    assert_eq!(err.to_string(), "Insert your display name (e.g., pippo)");
    let err = room.join("alice!").await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Validation);
    assert!(gateway.requests().is_empty());
}

#[tokio::test]
async fn test_leaving_feed_frees_slot_for_reuse() {
    let gateway = gateway();
    gateway.add_remote_publisher(ROOM, 11, "bob");
    let mut room = joined(&gateway, "alice").await;
    let mut rx = room.subscribe();

    gateway.add_remote_publisher(ROOM, 12, "carol");
    room.process_pending().await;
    assert_eq!(room.slot_of_feed(12), Some(FeedSlot(2)));

    gateway.remove_remote_publisher(ROOM, 11);
    room.process_pending().await;
    assert_eq!(room.slot_of_feed(11), None);
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, ClientEvent::FeedDetached { slot: FeedSlot(1), feed: 11 })));

    gateway.add_remote_publisher(ROOM, 13, "dave");
    room.process_pending().await;
    assert_eq!(room.slot_of_feed(13), Some(FeedSlot(1)));
    assert_eq!(room.subscriber_count(), 2);
}

#[tokio::test]
async fn test_leaving_unknown_feed_is_ignored() {
    let gateway = gateway();
    gateway.add_remote_publisher(ROOM, 11, "bob");
    let mut room = joined(&gateway, "alice").await;

    let publisher = room.publisher().unwrap().id();
    let leaving = GatewayEvent::Handle(HandleEvent {
        handle: publisher,
        kind: HandleEventKind::Message {
            message: json!({ "videoroom": "event", "room": ROOM, "leaving": 40 }),
            jsep: None,
        },
    });
    room.handle_event(leaving).await.unwrap();
    assert_eq!(room.feeds().len(), 1);
}

#[tokio::test]
async fn test_sixth_feed_is_rejected() {
    let gateway = gateway();
    for id in 11..=15 {
        gateway.add_remote_publisher(ROOM, id, format!("user{}", id));
    }
    let mut room = joined(&gateway, "alice").await;
    let mut rx = room.subscribe();
    assert_eq!(room.subscriber_count(), 5);
    assert_eq!(
        room.feeds().iter().map(|(slot, _, _)| slot.0).collect::<Vec<_>>(),
        vec![1, 2, 3, 4, 5]
    );

    gateway.add_remote_publisher(ROOM, 16, "user16");
    room.process_pending().await;

    assert_eq!(room.subscriber_count(), 5);
    assert_eq!(room.slot_of_feed(16), None);
    assert_eq!(gateway.attached_handles(), 6);
    assert_eq!(error_messages(&drain(&mut rx)), vec!["Feed registry is full (5 slots in use)".to_string()]);
}

#[tokio::test]
async fn test_duplicate_subscription_is_rejected() {
    let gateway = gateway();
    gateway.add_remote_publisher(ROOM, 11, "bob");
    let mut room = joined(&gateway, "alice").await;

    let err = room.subscribe_to_feed(11, Some("bob".into())).await.unwrap_err();
    assert!(matches!(err, ClientError::FeedAlreadySubscribed { feed: 11 }));
    assert_eq!(room.subscriber_count(), 1);
}

#[tokio::test]
async fn test_publish_falls_back_to_video_only() {
    let gateway = Arc::new(LoopbackGateway::new().with_room(ROOM).with_failing_audio_capture());
    let mut room = coordinator(&gateway);
    let mut rx = room.subscribe();
    room.start(ROOM).await.unwrap();
    room.join("alice").await.unwrap();
    room.process_pending().await;

    assert!(room.is_published());
    assert!(!room.is_publishing_audio());
    assert!(drain(&mut rx).iter().any(|e| matches!(e, ClientEvent::Published { audio: false })));

    let publisher = room.publisher().unwrap().id();
    let configure = gateway
        .requests_from(publisher)
        .into_iter()
        .find(|r| r.request() == Some("configure"))
        .unwrap();
    assert!(configure.with_jsep);
    assert_eq!(configure.message["audio"], false);
    assert_eq!(configure.message["video"], true);
}

#[tokio::test]
async fn test_publish_gives_up_when_offers_fail() {
    let gateway = Arc::new(LoopbackGateway::new().with_room(ROOM).with_failing_offers());
    let mut room =
        RoomCoordinator::new(ClientConfig::default().with_auto_publish(false), gateway.clone()).unwrap();
    let mut rx = room.subscribe();
    room.start(ROOM).await.unwrap();
    room.join("alice").await.unwrap();
    room.process_pending().await;
    drain(&mut rx);

    // With audio: one retry without audio, then give up
    let err = room.publish_own_feed(true).await.unwrap_err();
    assert!(matches!(err, ClientError::NegotiationFailed { .. }));
    assert_eq!(gateway.offer_attempts(), 2);
    assert_eq!(error_messages(&drain(&mut rx)).len(), 1);
    assert_eq!(room.publisher().unwrap().state(), NegotiationState::Idle);

    // Without audio there is nothing to fall back to
    room.publish_own_feed(false).await.unwrap_err();
    assert_eq!(gateway.offer_attempts(), 3);

    let publisher = room.publisher().unwrap().id();
    assert!(!gateway.requests_from(publisher).iter().any(|r| r.request() == Some("configure")));
    assert!(!room.is_published());
}

#[tokio::test]
async fn test_auto_publish_disabled() {
    let gateway = gateway();
    let mut room =
        RoomCoordinator::new(ClientConfig::default().with_auto_publish(false), gateway.clone()).unwrap();
    room.start(ROOM).await.unwrap();
    room.join("alice").await.unwrap();
    room.process_pending().await;
    assert!(!room.is_published());

    room.publish_own_feed(true).await.unwrap();
    room.process_pending().await;
    assert!(room.is_publishing_audio());
}

#[tokio::test]
async fn test_unknown_room() {
    let gateway = gateway();
    let mut room = coordinator(&gateway);
    let mut rx = room.subscribe();
    room.start(99).await.unwrap();
    room.join("alice").await.unwrap();
    room.process_pending().await;

    assert!(room.local().is_none());
    assert_eq!(error_messages(&drain(&mut rx)), vec!["Apparently room 99 does not exist".to_string()]);
}

#[tokio::test]
async fn test_destroyed_room_is_fatal() {
    let gateway = gateway();
    gateway.add_remote_publisher(ROOM, 11, "bob");
    let mut room = joined(&gateway, "alice").await;
    let mut rx = room.subscribe();

    gateway.destroy_room(ROOM);
    room.process_pending().await;

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(e, ClientEvent::RoomDestroyed { room: ROOM })));
    assert!(events.iter().any(|e| matches!(e, ClientEvent::Error { category: ErrorCategory::Fatal, .. })));
    assert_eq!(room.session_state(), None);
    assert!(room.feeds().is_empty());
    assert_eq!(gateway.attached_handles(), 0);
}

#[tokio::test]
async fn test_unpublish_own_feed() {
    let gateway = gateway();
    let mut room = joined(&gateway, "alice").await;
    let mut rx = room.subscribe();
    assert!(room.is_published());

    room.unpublish().await.unwrap();
    room.process_pending().await;

    assert!(!room.is_published());
    let events = drain(&mut rx);
    assert_eq!(events.iter().filter(|e| matches!(e, ClientEvent::Unpublished)).count(), 1);
    assert!(events.iter().any(|e| matches!(e, ClientEvent::MediaCleared { slot: None })));

    // Publishing again renegotiates on the same handle
    room.publish_own_feed(false).await.unwrap();
    room.process_pending().await;
    assert!(room.is_published());
}

#[tokio::test]
async fn test_set_bitrate() {
    let gateway = gateway();
    let mut room = joined(&gateway, "alice").await;
    room.set_bitrate(128_000).await.unwrap();

    let publisher = room.publisher().unwrap().id();
    let last = gateway.requests_from(publisher).pop().unwrap();
    assert_eq!(last.message["request"], "configure");
    assert_eq!(last.message["bitrate"], 128_000);
    assert!(!last.with_jsep);
}

#[tokio::test]
async fn test_toggle_mute() {
    let gateway = gateway();
    let mut room = coordinator(&gateway);
    assert!(matches!(room.toggle_mute(), Err(ClientError::NotStarted)));

    room.start(ROOM).await.unwrap();
    let mut rx = room.subscribe();
    assert!(room.toggle_mute().unwrap());
    assert!(room.publisher().unwrap().is_audio_muted());
    assert!(!room.toggle_mute().unwrap());

    let muted: Vec<bool> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            ClientEvent::AudioMuted { muted } => Some(muted),
            _ => None,
        })
        .collect();
    assert_eq!(muted, vec![true, false]);
}

#[tokio::test]
async fn test_teardown_detaches_everything() {
    let gateway = gateway();
    gateway.add_remote_publisher(ROOM, 11, "bob");
    gateway.add_remote_publisher(ROOM, 12, "carol");
    let mut room = joined(&gateway, "alice").await;
    assert_eq!(gateway.attached_handles(), 3);

    room.teardown().await;
    room.teardown().await;

    assert_eq!(gateway.attached_handles(), 0);
    assert!(room.feeds().is_empty());
    assert!(room.publisher().is_none());
    assert_eq!(room.session_state(), None);

    // A fresh start works after teardown
    room.start(ROOM).await.unwrap();
    room.join("alice").await.unwrap();
    room.process_pending().await;
    assert_eq!(room.feeds().len(), 2);
}

#[tokio::test]
async fn test_session_failure_tears_down() {
    let gateway = gateway();
    let mut room = joined(&gateway, "alice").await;

    gateway.fail_sessions("Lost connection to the server (is it down?)");
    let err = room.run().await.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(room.session_state(), None);
}

#[tokio::test(start_paused = true)]
async fn test_feed_bitrate_sampling() {
    let gateway = gateway();
    gateway.add_remote_publisher(ROOM, 11, "bob");
    let mut room = joined(&gateway, "alice").await;
    let mut rx = room.subscribe();

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let samples: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            ClientEvent::Bitrate { slot, bitrate } => Some((slot, bitrate)),
            _ => None,
        })
        .collect();
    assert!(!samples.is_empty());
    assert_eq!(samples[0], (Some(FeedSlot(1)), "256 kbits/sec".to_string()));

    gateway.remove_remote_publisher(ROOM, 11);
    room.process_pending().await;
    assert!(!room.is_sampling_bitrate(FeedSlot(1)));
}

#[tokio::test]
async fn test_rejected_subscription_frees_slot() {
    let gateway = gateway();
    let mut room = joined(&gateway, "alice").await;
    let mut rx = room.subscribe();
    let attached = gateway.attached_handles();

    let slot = room.subscribe_to_feed(99, Some("ghost".into())).await.unwrap();
    assert_eq!(slot, FeedSlot(1));
    room.process_pending().await;

    assert_eq!(room.slot_of_feed(99), None);
    assert_eq!(room.subscriber_count(), 0);
    assert_eq!(gateway.attached_handles(), attached);
    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(e, ClientEvent::FeedDetached { slot: FeedSlot(1), feed: 99 })));
    assert_eq!(error_messages(&events), vec!["No such feed (99)".to_string()]);

    // The freed slot is handed out again
    gateway.add_remote_publisher(ROOM, 11, "bob");
    room.process_pending().await;
    assert_eq!(room.slot_of_feed(11), Some(FeedSlot(1)));
}

#[tokio::test]
async fn test_restart_ignores_previous_session_events() {
    let gateway = gateway();
    let mut room = joined(&gateway, "alice").await;

    // Queued for the old session but never processed
    gateway.fail_sessions("Lost connection to the server (is it down?)");
    room.teardown().await;

    room.start(ROOM).await.unwrap();
    room.join("alice").await.unwrap();
    room.process_pending().await;

    assert_eq!(room.session_state(), Some(SessionState::Active));
    assert!(room.local().is_some());
    assert!(room.publisher().is_some());
}
