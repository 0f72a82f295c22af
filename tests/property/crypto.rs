//! Property-based tests for key agreement and message sealing.

use proptest::prelude::*;
use sealroom::crypto::cipher::SharedKey;
use sealroom::crypto::keys::{EphemeralKeyPair, parse_public_key};

fn agreed_keys() -> (SharedKey, SharedKey) {
    let alice = EphemeralKeyPair::generate();
    let bob = EphemeralKeyPair::generate();
    (
        alice.derive_shared_key(bob.public_key()),
        bob.derive_shared_key(alice.public_key()),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn sealed_text_opens_to_the_same_text(text in any::<String>(), name in "[a-z]{0,12}") {
        let (k_alice, k_bob) = agreed_keys();
        let envelope = k_alice.seal(&text, &name).unwrap();
        prop_assert_eq!(k_bob.open(&envelope).unwrap(), text);
        prop_assert_eq!(envelope.from_username, name);
    }

    #[test]
    fn ecdh_agreement_holds_through_jwk_export(_seed in any::<u8>()) {
        let alice = EphemeralKeyPair::generate();
        let bob = EphemeralKeyPair::generate();

        let bob_imported = parse_public_key(&bob.public_key_value().unwrap()).unwrap();
        let alice_imported = parse_public_key(&alice.public_key_value().unwrap()).unwrap();

        prop_assert_eq!(
            alice.derive_shared_key(&bob_imported),
            bob.derive_shared_key(&alice_imported)
        );
    }

    #[test]
    fn foreign_key_never_opens(text in ".{0,64}") {
        let (k_alice, _) = agreed_keys();
        let (k_other, _) = agreed_keys();
        let envelope = k_alice.seal(&text, "a").unwrap();
        prop_assert!(k_other.open(&envelope).is_err());
    }

    #[test]
    fn single_bit_flip_is_detected(text in ".{1,64}", bit in 0usize..128) {
        use base64::Engine;
        use base64::engine::general_purpose::STANDARD;

        let (key, _) = agreed_keys();
        let mut envelope = key.seal(&text, "a").unwrap();
        let mut raw = STANDARD.decode(&envelope.cipher).unwrap();
        let idx = (bit / 8) % raw.len();
        raw[idx] ^= 1 << (bit % 8);
        envelope.cipher = STANDARD.encode(raw);
        prop_assert!(key.open(&envelope).is_err());
    }
}
