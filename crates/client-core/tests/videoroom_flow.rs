//! Two room coordinators publishing to and subscribing from each other

use std::sync::Arc;

use trac_janus_client_core::gateway::loopback::LoopbackGateway;
use trac_janus_client_core::{ClientConfig, ClientEvent, FeedSlot, RoomCoordinator};

const ROOM: u64 = 1234;

async fn joined(gateway: &Arc<LoopbackGateway>, display: &str) -> RoomCoordinator {
    let mut room = RoomCoordinator::new(ClientConfig::default(), gateway.clone()).unwrap();
    room.start(ROOM).await.unwrap();
    room.join(display).await.unwrap();
    room.process_pending().await;
    room
}

#[tokio::test]
async fn test_participants_see_each_other() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let gateway = Arc::new(LoopbackGateway::new().with_room(ROOM).with_first_feed_id(10));

    let mut alice = joined(&gateway, "alice").await;
    assert_eq!(alice.local().map(|l| l.id), Some(10));
    assert!(alice.feeds().is_empty());

    let mut bob = joined(&gateway, "bob").await;
    assert_eq!(bob.local().map(|l| l.id), Some(11));
    assert_eq!(bob.feeds(), vec![(FeedSlot(1), 10, Some("alice".to_string()))]);

    // bob's publish is announced to alice
    alice.process_pending().await;
    assert_eq!(alice.feeds(), vec![(FeedSlot(1), 11, Some("bob".to_string()))]);
    assert!(alice.is_sampling_bitrate(FeedSlot(1)));
}

#[tokio::test]
async fn test_unpublish_and_leave_free_slots() {
    let gateway = Arc::new(LoopbackGateway::new().with_room(ROOM));
    let mut alice = joined(&gateway, "alice").await;
    let mut bob = joined(&gateway, "bob").await;
    let mut carol = joined(&gateway, "carol").await;
    alice.process_pending().await;
    bob.process_pending().await;
    assert_eq!(alice.subscriber_count(), 2);

    let bob_id = bob.local().unwrap().id;
    let carol_id = carol.local().unwrap().id;
    let mut alice_events = alice.subscribe();

    bob.unpublish().await.unwrap();
    bob.process_pending().await;
    assert!(!bob.is_published());
    alice.process_pending().await;
    assert_eq!(alice.slot_of_feed(bob_id), None);
    assert!(alice.slot_of_feed(carol_id).is_some());

    carol.teardown().await;
    alice.process_pending().await;
    assert!(alice.feeds().is_empty());

    let detached: Vec<u64> = std::iter::from_fn(|| alice_events.try_recv().ok())
        .filter_map(|e| match e {
            ClientEvent::FeedDetached { feed, .. } => Some(feed),
            _ => None,
        })
        .collect();
    assert_eq!(detached, vec![bob_id, carol_id]);

    // bob's subscription to carol went away as well
    bob.process_pending().await;
    assert_eq!(bob.slot_of_feed(carol_id), None);

    alice.teardown().await;
    bob.teardown().await;
    assert_eq!(gateway.attached_handles(), 0);
}
