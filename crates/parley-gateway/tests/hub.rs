//! Tests driving the hub task through its public handle, the way connection
//! tasks do, and reading what lands on each outbound queue.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use parley_gateway::config::GatewayConfig;
use parley_gateway::hub::{Frame, Hub};
use parley_types::events::{ClientEvent, ServerEvent};
use parley_types::models::ConnectionId;

async fn next_event(rx: &mut mpsc::Receiver<Frame>) -> ServerEvent {
    let frame = timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("outbound queue closed");
    serde_json::from_str(frame.as_str()).unwrap()
}

async fn assert_quiet(rx: &mut mpsc::Receiver<Frame>) {
    if let Ok(frame) = timeout(Duration::from_millis(100), rx.recv()).await {
        panic!("expected no frame, got {:?}", frame.map(|f| f.as_str().to_owned()));
    }
}

async fn assert_closed(rx: &mut mpsc::Receiver<Frame>) {
    let next = timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for the queue to close");
    assert!(next.is_none(), "expected closed queue, got a frame");
}

async fn join(hub: &Hub, name: &str) -> (ConnectionId, mpsc::Receiver<Frame>) {
    let id = ConnectionId::new();
    let mut rx = hub.connect(id).await.unwrap();
    hub.dispatch(id, ClientEvent::Join { username: name.into() })
        .await
        .unwrap();

    match next_event(&mut rx).await {
        ServerEvent::UserJoined(update) => assert_eq!(update.username, name),
        other => panic!("unexpected event: {:?}", other),
    }
    (id, rx)
}

fn roster(event: &ServerEvent) -> Vec<String> {
    match event {
        ServerEvent::UserJoined(update) | ServerEvent::UserLeft(update) => {
            assert_eq!(update.user_count, update.users.len());
            update.users.iter().map(|u| u.username.clone()).collect()
        }
        other => panic!("not a roster event: {:?}", other),
    }
}

#[tokio::test]
async fn peers_see_joins_and_messages() {
    let hub = Hub::spawn(GatewayConfig::default());
    let (alice, mut alice_rx) = join(&hub, "Alice").await;
    let (_bob, mut bob_rx) = join(&hub, "Bob").await;

    let joined = next_event(&mut alice_rx).await;
    assert_eq!(roster(&joined), ["Alice", "Bob"]);

    hub.dispatch(alice, ClientEvent::SendMessage { message: "hi".into() })
        .await
        .unwrap();

    for rx in [&mut alice_rx, &mut bob_rx] {
        match next_event(rx).await {
            ServerEvent::ReceiveMessage { username, message, .. } => {
                assert_eq!(username, "Alice");
                assert_eq!(message, "hi");
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_quiet(rx).await;
    }
}

#[tokio::test]
async fn unjoined_connections_still_receive_broadcasts() {
    let hub = Hub::spawn(GatewayConfig::default());
    let lurker = ConnectionId::new();
    let mut lurker_rx = hub.connect(lurker).await.unwrap();

    let (_alice, _alice_rx) = join(&hub, "Alice").await;
    assert_eq!(roster(&next_event(&mut lurker_rx).await), ["Alice"]);
}

#[tokio::test]
async fn typing_is_not_echoed_to_sender() {
    let hub = Hub::spawn(GatewayConfig::default());
    let (alice, mut alice_rx) = join(&hub, "Alice").await;
    let (_bob, mut bob_rx) = join(&hub, "Bob").await;
    next_event(&mut alice_rx).await;

    for is_typing in [true, false] {
        hub.dispatch(alice, ClientEvent::Typing { is_typing })
            .await
            .unwrap();
        assert_eq!(
            next_event(&mut bob_rx).await,
            ServerEvent::UserTyping { username: "Alice".into(), is_typing }
        );
    }
    assert_quiet(&mut alice_rx).await;
}

#[tokio::test]
async fn reactions_are_observed_by_everyone_in_order() {
    let hub = Hub::spawn(GatewayConfig::default());
    let (alice, mut alice_rx) = join(&hub, "Alice").await;
    let (bob, mut bob_rx) = join(&hub, "Bob").await;
    next_event(&mut alice_rx).await;

    hub.dispatch(alice, ClientEvent::SendMessage { message: "vote".into() })
        .await
        .unwrap();
    let id = match next_event(&mut alice_rx).await {
        ServerEvent::ReceiveMessage { id, .. } => id,
        other => panic!("unexpected event: {:?}", other),
    };
    next_event(&mut bob_rx).await;

    for from in [bob, alice, bob] {
        hub.dispatch(from, ClientEvent::AddReaction { id, emoji: "👍".into() })
            .await
            .unwrap();
    }

    for rx in [&mut alice_rx, &mut bob_rx] {
        for expected in 1..=3 {
            assert_eq!(
                next_event(rx).await,
                ServerEvent::ReactionAdded { id, emoji: "👍".into(), count: expected }
            );
        }
    }
}

#[tokio::test]
async fn disconnect_updates_roster_only_for_joined_connections() {
    let hub = Hub::spawn(GatewayConfig::default());
    let (_alice, mut alice_rx) = join(&hub, "Alice").await;

    let lurker = ConnectionId::new();
    let _lurker_rx = hub.connect(lurker).await.unwrap();
    hub.disconnect(lurker).await;
    assert_quiet(&mut alice_rx).await;

    let (bob, _bob_rx) = join(&hub, "Bob").await;
    next_event(&mut alice_rx).await;
    hub.disconnect(bob).await;

    match next_event(&mut alice_rx).await {
        event @ ServerEvent::UserLeft(_) => assert_eq!(roster(&event), ["Alice"]),
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn slow_consumer_is_evicted() {
    let hub = Hub::spawn(GatewayConfig {
        outbound_buffer: 2,
        ..GatewayConfig::default()
    });

    // Alice never reads past her own join, so her queue fills up.
    let alice = ConnectionId::new();
    let mut alice_rx = hub.connect(alice).await.unwrap();
    hub.dispatch(alice, ClientEvent::Join { username: "Alice".into() })
        .await
        .unwrap();

    let bob = ConnectionId::new();
    let mut bob_rx = hub.connect(bob).await.unwrap();

    hub.dispatch(alice, ClientEvent::SendMessage { message: "hi".into() })
        .await
        .unwrap();
    assert!(matches!(next_event(&mut bob_rx).await, ServerEvent::ReceiveMessage { .. }));

    hub.dispatch(bob, ClientEvent::Join { username: "Bob".into() })
        .await
        .unwrap();

    assert_eq!(roster(&next_event(&mut bob_rx).await), ["Alice", "Bob"]);
    match next_event(&mut bob_rx).await {
        event @ ServerEvent::UserLeft(_) => assert_eq!(roster(&event), ["Bob"]),
        other => panic!("unexpected event: {:?}", other),
    }

    assert!(matches!(next_event(&mut alice_rx).await, ServerEvent::UserJoined(_)));
    assert!(matches!(next_event(&mut alice_rx).await, ServerEvent::ReceiveMessage { .. }));
    assert_closed(&mut alice_rx).await;
}

#[tokio::test]
async fn duplicate_connection_is_forced_out() {
    let hub = Hub::spawn(GatewayConfig::default());
    let (_alice, mut alice_rx) = join(&hub, "Alice").await;
    let (mallory, mut first_rx) = join(&hub, "Mallory").await;
    next_event(&mut alice_rx).await;

    let mut second_rx = hub.connect(mallory).await.unwrap();

    match next_event(&mut alice_rx).await {
        ServerEvent::UserLeft(update) => assert_eq!(update.username, "Mallory"),
        other => panic!("unexpected event: {:?}", other),
    }
    assert_closed(&mut first_rx).await;
    assert_closed(&mut second_rx).await;
}
