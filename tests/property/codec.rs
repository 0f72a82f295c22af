//! Property tests for the `SealRoom` event codec.
//!
//! 1. Arbitrary text never panics the decoders.
//! 2. Room names, usernames and envelope fields survive a client event
//!    encode → decode unchanged, whatever characters they contain.

use proptest::prelude::*;
use sealroom_proto::codec;
use sealroom_proto::event::{ClientEvent, EncryptedEnvelope};

proptest! {
    #[test]
    fn decoders_never_panic(text in ".*") {
        let _ = codec::decode_client(&text);
        let _ = codec::decode_server(&text);
    }

    #[test]
    fn encrypted_message_preserves_strings(
        room in ".{0,64}",
        iv in "[A-Za-z0-9+/=]{0,24}",
        cipher in "[A-Za-z0-9+/=]{0,256}",
        from_username in ".{0,32}",
    ) {
        let envelope = EncryptedEnvelope { iv, cipher, from_username };
        let event = ClientEvent::EncryptedMessage {
            room: room.clone(),
            payload: envelope.to_value().unwrap(),
        };
        let frame = codec::encode(&event).unwrap();
        let decoded = codec::decode_client(&frame).unwrap();
        let ClientEvent::EncryptedMessage { room: decoded_room, payload } = decoded else {
            panic!("expected EncryptedMessage");
        };
        prop_assert_eq!(decoded_room, room);
        prop_assert_eq!(EncryptedEnvelope::from_value(payload).unwrap(), envelope);
    }
}
