//! Integration tests for key exchange and encrypted delivery through an
//! in-process relay.
//!
//! - Two members of a room derive the same key and exchange a message
//! - Sending before a key exists is refused locally
//! - Ciphertext that arrives before key exchange is reported, not fatal
//! - A late joiner receives the earlier member's key without any manual
//!   re-announcement
//! - Messages too large for the relay are refused without losing the
//!   connection

use std::time::Duration;

use sealroom::chat::session::{SessionError, SessionState};
use sealroom::chat::{ChatClient, ChatError, ChatEvent};
use sealroom::config::NetConfig;
use sealroom::transport::relay::RelayClient;
use sealroom_proto::event::ClientEvent;
use serde_json::json;

const TIMEOUT: Duration = Duration::from_secs(5);

/// Start the relay server in-process and return a ws:// URL.
async fn start_relay() -> (String, tokio::task::JoinHandle<()>) {
    let (addr, handle) = sealroom_relay::relay::start_server("127.0.0.1:0")
        .await
        .expect("failed to start relay server");
    (format!("ws://{addr}/ws"), handle)
}

fn net_config(url: &str, username: &str, room: &str) -> NetConfig {
    NetConfig {
        relay_url: url.to_string(),
        username: username.to_string(),
        room: room.to_string(),
        connect_timeout: TIMEOUT,
        channel_capacity: 64,
        max_message_size: 64 * 1024,
        announce_on_join: true,
    }
}

async fn connect(url: &str, username: &str, room: &str) -> ChatClient {
    connect_with(&net_config(url, username, room)).await
}

async fn connect_with(config: &NetConfig) -> ChatClient {
    let client = ChatClient::connect(config).await.expect("connect failed");
    // Let the relay register the join before anyone else arrives.
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
    let result = tokio::time::timeout(Duration::from_millis(300), client.next_event()).await;
    assert!(result.is_err(), "unexpected event: {result:?}");
}

/// Drives both clients through key exchange, `first` having joined the
/// room before `second`. `first` answers the join with its key by itself.
async fn exchange_keys(first: &mut ChatClient, second: &mut ChatClient) {
    assert_eq!(
        next(first).await,
        ChatEvent::PeerJoined {
            id: second.endpoint_id().to_string()
        }
    );

    assert!(matches!(next(first).await, ChatEvent::KeyEstablished { .. }));
    assert!(matches!(next(second).await, ChatEvent::KeyEstablished { .. }));
}

#[tokio::test]
async fn two_members_derive_same_key_and_exchange_hello() {
    let (url, _handle) = start_relay().await;
    let mut alice = connect(&url, "alice", "room1").await;
    let mut bob = connect(&url, "bob", "room1").await;

    exchange_keys(&mut alice, &mut bob).await;

    assert_eq!(alice.session().state(), SessionState::SharedKeyDerived);
    assert_eq!(bob.session().state(), SessionState::SharedKeyDerived);
    assert_eq!(alice.session().shared_key(), bob.session().shared_key());

    alice.send_text("hello").await.unwrap();
    assert_eq!(
        next(&mut bob).await,
        ChatEvent::Message {
            from: alice.endpoint_id().to_string(),
            username: "alice".to_string(),
            text: "hello".to_string(),
        }
    );

    bob.send_text("hi alice").await.unwrap();
    match next(&mut alice).await {
        ChatEvent::Message { username, text, .. } => {
            assert_eq!(username, "bob");
            assert_eq!(text, "hi alice");
        }
        other => panic!("expected message, got {other:?}"),
    }
}

#[tokio::test]
async fn peers_learn_each_others_names() {
    let (url, _handle) = start_relay().await;
    let mut alice = connect(&url, "alice", "room1").await;
    let mut bob = connect(&url, "", "room1").await;

    exchange_keys(&mut alice, &mut bob).await;

    assert_eq!(alice.session().peer().unwrap().username, "Anon");
    assert_eq!(bob.session().peer().unwrap().username, "alice");
    assert_eq!(
        bob.session().peer().unwrap().id,
        alice.endpoint_id().to_string()
    );
}

#[tokio::test]
async fn send_before_key_exchange_is_refused() {
    let (url, _handle) = start_relay().await;
    let alice = connect(&url, "alice", "room1").await;

    let result = alice.send_text("anyone?").await;
    assert!(matches!(
        result,
        Err(ChatError::Session(SessionError::NoSharedKey))
    ));
}

#[tokio::test]
async fn ciphertext_before_key_exchange_is_reported() {
    let (url, _handle) = start_relay().await;
    let mut bob = connect(&url, "bob", "room1").await;

    // A bare relay client that never announces a key.
    let raw = RelayClient::connect(&url, TIMEOUT, 16).await.unwrap();
    raw.send(&ClientEvent::Join("room1".into())).await.unwrap();
    assert!(matches!(next(&mut bob).await, ChatEvent::PeerJoined { .. }));

    raw.send(&ClientEvent::EncryptedMessage {
        room: "room1".into(),
        payload: json!({"iv": "AAAAAAAAAAAAAAAA", "cipher": "AAAA", "fromUsername": "raw"}),
    })
    .await
    .unwrap();

    assert_eq!(
        next(&mut bob).await,
        ChatEvent::NoSharedKey {
            from: raw.endpoint_id().to_string()
        }
    );
    assert_eq!(bob.session().state(), SessionState::KeyGenerated);
}

#[tokio::test]
async fn garbage_ciphertext_after_key_exchange_is_discarded() {
    let (url, _handle) = start_relay().await;
    let mut alice = connect(&url, "alice", "room1").await;
    let mut bob = connect(&url, "bob", "room1").await;
    exchange_keys(&mut alice, &mut bob).await;

    let raw = RelayClient::connect(&url, TIMEOUT, 16).await.unwrap();
    raw.send(&ClientEvent::EncryptedMessage {
        room: "room1".into(),
        payload: json!({"iv": "AAAAAAAAAAAAAAAA", "cipher": "AAAAAAAAAAAAAAAAAAAAAA==", "fromUsername": "x"}),
    })
    .await
    .unwrap();

    assert!(matches!(next(&mut bob).await, ChatEvent::DecryptionFailed { .. }));

    // The session survives and still decrypts real traffic.
    alice.send_text("still here").await.unwrap();
    assert!(matches!(
        next(&mut bob).await,
        ChatEvent::Message { ref text, .. } if text == "still here"
    ));
}

#[tokio::test]
async fn late_joiner_gets_key_without_manual_announce() {
    let (url, _handle) = start_relay().await;
    let mut alice = connect(&url, "alice", "room1").await;
    let mut bob = connect(&url, "bob", "room1").await;

    // Alice's join-time announcement reached nobody; only her reaction to
    // bob's arrival can give bob her key.
    assert!(matches!(next(&mut alice).await, ChatEvent::PeerJoined { .. }));
    assert_eq!(
        next(&mut alice).await,
        ChatEvent::KeyEstablished {
            from: bob.endpoint_id().to_string(),
            username: "bob".to_string(),
        }
    );
    assert_eq!(
        next(&mut bob).await,
        ChatEvent::KeyEstablished {
            from: alice.endpoint_id().to_string(),
            username: "alice".to_string(),
        }
    );
    assert_eq!(alice.session().shared_key(), bob.session().shared_key());
}

#[tokio::test]
async fn disabled_announce_on_join_leaves_late_joiner_keyless() {
    let (url, _handle) = start_relay().await;
    let mut alice = connect_with(&NetConfig {
        announce_on_join: false,
        ..net_config(&url, "alice", "room1")
    })
    .await;
    let mut bob = connect(&url, "bob", "room1").await;

    assert!(matches!(next(&mut alice).await, ChatEvent::PeerJoined { .. }));
    assert!(matches!(next(&mut alice).await, ChatEvent::KeyEstablished { .. }));
    assert_quiet(&mut bob).await;
    assert_eq!(bob.session().state(), SessionState::KeyGenerated);
}

#[tokio::test]
async fn oversized_message_is_refused_and_connection_survives() {
    let (url, _handle) = start_relay().await;
    let mut alice = connect(&url, "alice", "room1").await;
    let mut bob = connect(&url, "bob", "room1").await;
    exchange_keys(&mut alice, &mut bob).await;

    let result = alice.send_text(&"x".repeat(60_000)).await;
    assert!(matches!(
        result,
        Err(ChatError::Session(SessionError::MessageTooLarge { max: 65_536, .. }))
    ));

    // Nothing reached the relay, so both connections are still usable.
    alice.send_text("hello").await.unwrap();
    assert!(matches!(
        next(&mut bob).await,
        ChatEvent::Message { ref text, .. } if text == "hello"
    ));
}
