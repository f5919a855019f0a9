//! # Protocol Properties
//!
//! Envelope integrity, key agreement, candidate promotion, cache sharing and
//! message attribution, checked across crate boundaries.

use super::fixtures::{item, marketplace, other_marketplace, WAIT};
use parking_lot::Mutex;
use pm_01_signed_envelope::{
    create_signed_payload, decode_signed_payload, verify_payload, JsonCodec, LocalKeySigner,
    PayloadCodec, SignedEnvelope,
};
use pm_02_event_cache::{CacheSink, CacheSource, EventCache, Teardown};
use pm_03_messaging::domain::chat::{receive, seal};
use pm_03_messaging::{
    ChatKeyring, ChatMessage, ChatState, ConversationId, ConversationKeyMaterial,
    FormattedChatKeys, KeyKind, KeyMaterialStore, MarketplaceInfo, Promotion, SelectProvider,
    Sender,
};
use shared_crypto::{Secp256k1KeyPair, SecretKey};
use shared_types::{Address, U256};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::timeout;

// =============================================================================
// TEST FIXTURES
// =============================================================================

fn keyring(seed: u8) -> ChatKeyring {
    ChatKeyring::new(SecretKey::from_bytes([seed; 32]))
}

fn provider() -> Address {
    Address::from_bytes([0xbb; 20])
}

async fn signed_selection(
    signer: &LocalKeySigner,
    info: &MarketplaceInfo,
) -> SignedEnvelope<SelectProvider> {
    let key_exchange = keyring(9).key_exchange(&info.address, &item()).unwrap();
    create_signed_payload(
        &info.domain(),
        |seeker| SelectProvider {
            seeker,
            provider: provider(),
            item: item(),
            marketplace: info.address,
            key_exchange,
        },
        signer,
    )
    .await
    .unwrap()
}

/// Chat keys of `me` in a conversation where `them` is confirmed.
fn chat_keys(me: &ChatKeyring, them: &ChatKeyring) -> FormattedChatKeys {
    let (m, i) = (marketplace().address, item());
    let mut material = ConversationKeyMaterial::default();
    material.confirm(them.key_exchange(&m, &i).unwrap());
    me.format_chat_keys(&m, &i, &material).unwrap().unwrap()
}

fn wire(keys: &FormattedChatKeys, text: &str) -> Vec<u8> {
    let message = ChatMessage {
        text: text.into(),
        sent_at: 1,
    };
    JsonCodec.encode(&seal(keys, &message).unwrap()).unwrap()
}

// =============================================================================
// SIGNED ENVELOPES
// =============================================================================

#[tokio::test]
async fn test_envelope_survives_the_wire() {
    let signer = LocalKeySigner::random();
    let info = marketplace();
    let envelope = signed_selection(&signer, &info).await;

    let bytes = JsonCodec.encode(&envelope).unwrap();
    let decoded: SignedEnvelope<SelectProvider> =
        decode_signed_payload(&info.domain(), &JsonCodec, &bytes).unwrap();

    assert_eq!(decoded, envelope);
    assert_eq!(decoded.payload.seeker, signer.account());
    assert!(verify_payload(&info.domain(), &decoded));
}

#[tokio::test]
async fn test_any_flipped_field_bit_breaks_verification() {
    let signer = LocalKeySigner::random();
    let info = marketplace();
    let domain = info.domain();
    let envelope = signed_selection(&signer, &info).await;

    for bit in 0..256usize {
        let mut tampered = envelope.clone();
        tampered.payload.item = tampered.payload.item ^ (U256::one() << bit);
        assert!(!verify_payload(&domain, &tampered), "item bit {bit}");
    }

    for byte in 0..20 {
        for bit in 0..8 {
            let mut raw = *envelope.payload.provider.as_bytes();
            raw[byte] ^= 1 << bit;
            let mut tampered = envelope.clone();
            tampered.payload.provider = Address::from_bytes(raw);
            assert!(!verify_payload(&domain, &tampered), "provider byte {byte} bit {bit}");

            let mut raw = *envelope.payload.marketplace.as_bytes();
            raw[byte] ^= 1 << bit;
            let mut tampered = envelope.clone();
            tampered.payload.marketplace = Address::from_bytes(raw);
            assert!(!verify_payload(&domain, &tampered), "marketplace byte {byte} bit {bit}");
        }
    }

    let mut swapped_keys = envelope.clone();
    swapped_keys.payload.key_exchange = keyring(10).key_exchange(&info.address, &item()).unwrap();
    assert!(!verify_payload(&domain, &swapped_keys));
}

#[tokio::test]
async fn test_selection_does_not_verify_in_another_marketplace() {
    let signer = LocalKeySigner::random();
    let envelope = signed_selection(&signer, &marketplace()).await;
    let bytes = JsonCodec.encode(&envelope).unwrap();

    let other_contract = other_marketplace();
    let other_chain = MarketplaceInfo {
        chain_id: 5,
        ..marketplace()
    };
    for info in [other_contract, other_chain] {
        assert!(!verify_payload(&info.domain(), &envelope));
        assert!(decode_signed_payload::<SelectProvider, _>(&info.domain(), &JsonCodec, &bytes).is_none());
    }
}

// =============================================================================
// KEY DERIVATION AND AGREEMENT
// =============================================================================

#[test]
fn test_chat_keys_are_deterministic_and_separated() {
    let (m, i) = (marketplace().address, item());
    let k = keyring(1);

    let ecdh = k.derive(&m, &i, KeyKind::Ecdh).unwrap();
    assert_eq!(ecdh.as_bytes(), k.derive(&m, &i, KeyKind::Ecdh).unwrap().as_bytes());

    let variants = [
        k.derive(&other_marketplace().address, &i, KeyKind::Ecdh).unwrap(),
        k.derive(&m, &(i + U256::one()), KeyKind::Ecdh).unwrap(),
        k.derive(&m, &i, KeyKind::Ecdsa).unwrap(),
    ];
    for variant in &variants {
        assert_ne!(ecdh.as_bytes(), variant.as_bytes());
    }
}

#[test]
fn test_both_sides_agree_on_the_symmetric_key() {
    let (alice, bob, carol) = (keyring(1), keyring(2), keyring(3));

    let alice_keys = chat_keys(&alice, &bob);
    let bob_keys = chat_keys(&bob, &alice);
    assert_eq!(alice_keys.sym_key.as_bytes(), bob_keys.sym_key.as_bytes());
    assert_eq!(alice_keys.their_sig_pub_key, bob_keys.my_sig_pub_key);
    assert_eq!(bob_keys.their_sig_pub_key, alice_keys.my_sig_pub_key);

    let carol_keys = chat_keys(&carol, &bob);
    assert_ne!(carol_keys.sym_key.as_bytes(), alice_keys.sym_key.as_bytes());
}

// =============================================================================
// CANDIDATE PROMOTION
// =============================================================================

#[test]
fn test_promotion_never_overrides_confirmed_keys() {
    let (m, i) = (marketplace().address, item());
    let confirmed_keys = keyring(3).key_exchange(&m, &i).unwrap();
    let other_keys = keyring(4).key_exchange(&m, &i).unwrap();
    let x = Address::from_bytes([0x0a; 20]);

    // Persisted state where a stale candidate outlived the confirmation.
    let mut confirmed = ConversationKeyMaterial::default();
    confirmed.confirm(confirmed_keys);
    let mut buffered = ConversationKeyMaterial::default();
    buffered.add_candidate(x, other_keys);
    let mut json = serde_json::to_value(&confirmed).unwrap();
    json["temp"] = serde_json::to_value(&buffered).unwrap()["temp"].clone();
    let mut material: ConversationKeyMaterial = serde_json::from_value(json).unwrap();
    assert_eq!(material.candidate(&x), Some(&other_keys));

    assert_eq!(material.select_temp(&x), Promotion::AlreadyConfirmed);
    assert_eq!(material.confirmed(), Some(confirmed_keys));
}

#[test]
fn test_promotion_takes_exactly_the_chosen_candidate() {
    let (m, i) = (marketplace().address, item());
    let id = ConversationId::new(m, i);
    let store = KeyMaterialStore::in_memory();
    let (x, y) = (Address::from_bytes([0x0a; 20]), Address::from_bytes([0x0b; 20]));
    let x_keys = keyring(5).key_exchange(&m, &i).unwrap();
    let y_keys = keyring(6).key_exchange(&m, &i).unwrap();

    store.add_candidate(&id, x, x_keys).unwrap();
    store.add_candidate(&id, y, y_keys).unwrap();
    assert_eq!(store.get(&id).candidate_count(), 2);

    assert_eq!(store.select_temp_chat_key(&id, &x).unwrap(), Promotion::Promoted);
    let material = store.get(&id);
    assert_eq!(material.confirmed(), Some(x_keys));
    assert_eq!(material.candidate_count(), 0);

    assert_eq!(store.select_temp_chat_key(&id, &y).unwrap(), Promotion::AlreadyConfirmed);
    assert_eq!(store.get(&id).confirmed(), Some(x_keys));
}

// =============================================================================
// EVENT CACHE
// =============================================================================

#[derive(Default)]
struct CountingSource {
    subscribes: AtomicUsize,
    sinks: Mutex<Vec<CacheSink<String>>>,
}

impl CacheSource<String, String> for CountingSource {
    fn subscribe(&self, _key: &String, sink: CacheSink<String>) -> Teardown {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        self.sinks.lock().push(sink);
        Teardown::noop()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 3)]
async fn test_concurrent_readers_share_one_subscription() {
    let source = Arc::new(CountingSource::default());
    let cache: EventCache<String, String> = EventCache::new(source.clone());

    let tasks: Vec<_> = (0..3)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get("k".to_string()) })
        })
        .collect();
    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.unwrap());
    }
    assert_eq!(source.subscribes.load(Ordering::SeqCst), 1);

    let sink = source.sinks.lock()[0].clone();
    sink.emit("pushed".to_string());
    for handle in &mut handles {
        let value = timeout(WAIT, handle.recv()).await.unwrap();
        assert_eq!(value.as_deref(), Some("pushed"));
    }
}

// =============================================================================
// MESSAGE ATTRIBUTION
// =============================================================================

#[test]
fn test_messages_are_attributed_or_dropped() {
    let (alice, bob) = (keyring(1), keyring(2));
    let alice_keys = chat_keys(&alice, &bob);
    let bob_keys = chat_keys(&bob, &alice);

    // Holds the shared key but signs with neither participant's key.
    let intruder = Secp256k1KeyPair::generate();
    let mallory_keys = FormattedChatKeys {
        sym_key: SecretKey::from_bytes(*alice_keys.sym_key.as_bytes()),
        my_sig_pub_key: intruder.public_key(),
        my_sig_key: intruder,
        their_sig_pub_key: alice_keys.my_sig_pub_key,
    };

    let deliveries = [
        wire(&alice_keys, "from alice"),
        wire(&mallory_keys, "forged"),
        wire(&bob_keys, "from bob"),
    ];

    for (reader, expected) in [
        (&alice_keys, [("from alice", Sender::Me), ("from bob", Sender::Them)]),
        (&bob_keys, [("from alice", Sender::Them), ("from bob", Sender::Me)]),
    ] {
        let mut state = ChatState::open();
        for payload in &deliveries {
            if let Some(entry) = receive(reader, payload) {
                state.append(entry);
            }
        }
        let seen: Vec<_> = state
            .messages()
            .iter()
            .map(|e| (e.text.as_str(), e.from))
            .collect();
        assert_eq!(seen, expected);
    }
}
