//! Integration tests for room isolation.
//!
//! Joins, key announcements and encrypted messages in one room never reach
//! members of another room on the same relay.

use std::time::Duration;

use sealroom::chat::{ChatClient, ChatEvent};
use sealroom::config::NetConfig;

const TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait before concluding that nothing will arrive.
const QUIET: Duration = Duration::from_millis(300);

async fn start_relay() -> (String, tokio::task::JoinHandle<()>) {
    let (addr, handle) = sealroom_relay::relay::start_server("127.0.0.1:0")
        .await
        .expect("failed to start relay server");
    (format!("ws://{addr}/ws"), handle)
}

async fn connect(url: &str, username: &str, room: &str) -> ChatClient {
    let config = NetConfig {
        relay_url: url.to_string(),
        username: username.to_string(),
        room: room.to_string(),
        connect_timeout: TIMEOUT,
        channel_capacity: 64,
        max_message_size: 64 * 1024,
        announce_on_join: true,
    };
    let client = ChatClient::connect(&config).await.expect("connect failed");
    tokio::time::sleep(Duration::from_millis(50)).await;
    client
}

async fn next(client: &mut ChatClient) -> ChatEvent {
    tokio::time::timeout(TIMEOUT, client.next_event())
        .await
        .expect("next_event timed out")
        .expect("relay connection lost")
}

async fn assert_quiet(client: &mut ChatClient) {
    let result = tokio::time::timeout(QUIET, client.next_event()).await;
    assert!(result.is_err(), "unexpected event: {result:?}");
}

#[tokio::test]
async fn other_room_sees_no_traffic() {
    let (url, _handle) = start_relay().await;
    let mut carol = connect(&url, "carol", "room2").await;
    let mut alice = connect(&url, "alice", "room1").await;
    let mut bob = connect(&url, "bob", "room1").await;

    assert!(matches!(next(&mut alice).await, ChatEvent::PeerJoined { .. }));
    assert!(matches!(next(&mut alice).await, ChatEvent::KeyEstablished { .. }));
    assert!(matches!(next(&mut bob).await, ChatEvent::KeyEstablished { .. }));

    alice.send_text("room1 only").await.unwrap();
    assert!(matches!(
        next(&mut bob).await,
        ChatEvent::Message { ref text, .. } if text == "room1 only"
    ));

    assert_quiet(&mut carol).await;
    assert!(carol.session().peer().is_none());
}

#[tokio::test]
async fn same_names_in_different_rooms_do_not_pair() {
    let (url, _handle) = start_relay().await;
    let mut alice1 = connect(&url, "alice", "room1").await;
    let mut alice2 = connect(&url, "alice", "room2").await;

    assert_quiet(&mut alice1).await;
    assert_quiet(&mut alice2).await;
    assert!(alice1.session().shared_key().is_none());
    assert!(alice2.session().shared_key().is_none());
}

#[tokio::test]
async fn blank_room_joins_default_room() {
    let (url, _handle) = start_relay().await;
    let mut alice = connect(&url, "alice", "room1").await;
    let bob = connect(&url, "bob", "   ").await;

    assert_eq!(bob.session().room(), "room1");
    assert_eq!(
        next(&mut alice).await,
        ChatEvent::PeerJoined {
            id: bob.endpoint_id().to_string()
        }
    );
}
