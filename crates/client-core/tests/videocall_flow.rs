//! End-to-end direct calls between two coordinators sharing a loopback gateway

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use trac_janus_client_core::gateway::loopback::LoopbackGateway;
use trac_janus_client_core::{CallStatus, ClientConfig, ClientError, ClientEvent, DirectCallCoordinator, SessionState};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("trac_janus_client_core=debug")
        .with_test_writer()
        .try_init();
}

async fn registered(gateway: &Arc<LoopbackGateway>, name: &str) -> DirectCallCoordinator {
    let mut coordinator = DirectCallCoordinator::new(ClientConfig::default(), gateway.clone()).unwrap();
    coordinator.start().await.unwrap();
    coordinator.register(name).await.unwrap();
    coordinator.process_pending().await;
    coordinator
}

fn statuses(rx: &mut broadcast::Receiver<ClientEvent>) -> Vec<CallStatus> {
    let mut statuses = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let ClientEvent::CallStatusChanged { current, .. } = event {
            statuses.push(current);
        }
    }
    statuses
}

#[tokio::test]
async fn test_call_answer_and_hangup() {
    init_logging();
    let gateway = Arc::new(LoopbackGateway::new());

    let mut alice = DirectCallCoordinator::new(ClientConfig::default(), gateway.clone()).unwrap();
    let mut alice_events = alice.subscribe();
    alice.start().await.unwrap();
    assert_eq!(alice.session_state(), Some(SessionState::Active));
    alice.register("alice").await.unwrap();
    alice.process_pending().await;

    let mut bob = registered(&gateway, "bob").await;
    let mut bob_events = bob.subscribe();
    assert_eq!(gateway.registered_users(), vec!["alice".to_string(), "bob".to_string()]);

    alice.call_with_comment("bob", Some("ticket #42")).await.unwrap();
    alice.process_pending().await;
    bob.process_pending().await;
    assert_eq!(alice.ringing(), Some("bob"));
    assert_eq!(bob.status(), CallStatus::Incoming);

    bob.accept_incoming().await.unwrap();
    alice.process_pending().await;
    bob.process_pending().await;
    assert_eq!(alice.peer(), Some("bob"));
    assert_eq!(bob.peer(), Some("alice"));

    alice.send_data("hello bob").await.unwrap();
    bob.hangup().await.unwrap();
    alice.process_pending().await;
    bob.process_pending().await;

    assert_eq!(alice.status(), CallStatus::Waiting);
    assert_eq!(bob.status(), CallStatus::Waiting);
    assert_eq!(
        statuses(&mut alice_events),
        vec![CallStatus::Started, CallStatus::Waiting, CallStatus::Taking, CallStatus::Waiting]
    );
    assert_eq!(statuses(&mut bob_events), vec![CallStatus::Incoming, CallStatus::Taking, CallStatus::Waiting]);

    // Both stay registered and can call again
    bob.call("alice").await.unwrap();
    alice.process_pending().await;
    assert_eq!(alice.status(), CallStatus::Incoming);

    alice.teardown().await;
    bob.process_pending().await;
    assert_eq!(bob.status(), CallStatus::Waiting);
    bob.teardown().await;
    assert_eq!(gateway.attached_handles(), 0);
    assert!(gateway.registered_users().is_empty());
}

#[tokio::test]
async fn test_data_channel_delivers_text() {
    let gateway = Arc::new(LoopbackGateway::new());
    let mut alice = registered(&gateway, "alice").await;
    let mut bob = registered(&gateway, "bob").await;

    alice.call("bob").await.unwrap();
    bob.process_pending().await;
    bob.accept_incoming().await.unwrap();
    alice.process_pending().await;
    bob.process_pending().await;

    let mut bob_events = bob.subscribe();
    alice.send_data("hello bob").await.unwrap();
    bob.process_pending().await;

    let received: Vec<String> = std::iter::from_fn(|| bob_events.try_recv().ok())
        .filter_map(|e| match e {
            ClientEvent::DataReceived { data } => Some(data),
            _ => None,
        })
        .collect();
    assert_eq!(received, vec!["hello bob".to_string()]);
}

#[tokio::test]
async fn test_failover_to_second_server() {
    let gateway = Arc::new(LoopbackGateway::new().with_unreachable("wss://down.example.org:8989"));
    let config = ClientConfig::default()
        .with_servers(vec!["wss://down.example.org:8989".into(), "https://up.example.org:8089/janus".into()]);
    let mut alice = DirectCallCoordinator::new(config, gateway.clone()).unwrap();
    alice.start().await.unwrap();
    assert_eq!(alice.status(), CallStatus::Started);
}

#[tokio::test]
async fn test_no_server_reachable() {
    let gateway = Arc::new(LoopbackGateway::new().with_unreachable("wss://down.example.org:8989"));
    let config = ClientConfig::default().with_servers(vec!["wss://down.example.org:8989".into()]);
    let mut alice = DirectCallCoordinator::new(config, gateway).unwrap();
    let err = alice.start().await.unwrap_err();
    assert!(matches!(err, ClientError::NoServerAvailable { attempted: 1, .. }));
    assert!(err.is_fatal());
    assert_eq!(alice.status(), CallStatus::Initial);
}

#[tokio::test(start_paused = true)]
async fn test_peer_list_is_polled() {
    let gateway = Arc::new(LoopbackGateway::new());
    let mut alice = registered(&gateway, "alice").await;
    let _bob = registered(&gateway, "bob").await;
    assert!(alice.is_polling_peers());

    tokio::time::sleep(Duration::from_millis(10_500)).await;
    let handle = alice.handle().unwrap().id();
    let lists = gateway
        .requests_from(handle)
        .iter()
        .filter(|r| r.request() == Some("list"))
        .count();
    assert!(lists >= 2, "expected at least two list requests, got {}", lists);

    alice.process_pending().await;
    assert_eq!(alice.roster(), ["bob".to_string()]);

    alice.teardown().await;
    assert!(!alice.is_polling_peers());
}
