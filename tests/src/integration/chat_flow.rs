//! # Reply → Selection → Chat
//!
//! ```text
//! Bob (provider)                         Alice (seeker, listing owner)
//!   learns owner from chain state         learns ownership from chain state
//!   publish_reply(key exchange) ───────►  candidate buffered
//!                                         create_select_provider(Bob)
//!   selection listener confirms  ◄──────  candidate promoted
//!   post_chat_message("hello")   ───────►  chat shows {hello, them}
//! ```

use super::fixtures::{
    assert_quiet, conversation, item, marketplace, other_marketplace, wait_for, wait_until,
    Participant, ScriptedChain,
};
use pm_01_signed_envelope::{JsonCodec, LocalKeySigner, PayloadCodec};
use pm_03_messaging::{
    ChatError, ChatState, ConversationId, HandshakeOutcome, LocalWallet, MarketError, Sender,
    WalletError,
};
use pm_03_messaging::service::handshake::apply_selection;
use shared_bus::{ContentTopic, InMemoryNetwork, Transport};
use std::sync::Arc;
use std::time::Duration;

/// Bob replies, Alice buffers him as a candidate and selects him, Bob confirms.
///
/// Both learn from the chain that Alice owns the listing.
async fn handshake(alice: &Participant, bob: &Participant) {
    let (m, i) = (marketplace().address, item());
    let chain = ScriptedChain::listing(alice.account());
    alice.learn_listings(&chain).await;
    bob.learn_listings(&chain).await;

    let mut alice_replies = alice.items.replies(m, i);
    let mut bob_selection = bob.selections.selection(m, i);

    bob.items
        .publish_reply(&bob.signer, m, i, "I can do it")
        .await
        .unwrap();
    wait_for(&mut alice_replies, |replies| {
        replies.iter().any(|r| r.replier == bob.account())
    })
    .await;
    assert_eq!(
        alice.ctx.keys.get(&conversation()).candidate(&bob.account()).copied(),
        Some(bob.ctx.keyring.key_exchange(&m, &i).unwrap())
    );

    alice
        .selections
        .create_select_provider(&alice.signer, m, bob.account(), i)
        .await
        .unwrap();
    assert!(alice.ctx.keys.get(&conversation()).is_confirmed());

    let selection = wait_for(&mut bob_selection, |s| s.seeker == alice.account()).await;
    assert_eq!(selection.provider, bob.account());
    assert_eq!(
        bob.ctx.keys.get(&conversation()).confirmed(),
        Some(alice.ctx.keyring.key_exchange(&m, &i).unwrap())
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_hello_reaches_the_seeker() {
    let network = Arc::new(InMemoryNetwork::new());
    let alice = Participant::new(&network, 1);
    let bob = Participant::new(&network, 2);
    let (m, i) = (marketplace().address, item());

    handshake(&alice, &bob).await;

    let mut alice_chat = alice.chat.messages(m, i);
    let mut bob_chat = bob.chat.messages(m, i);
    bob.chat.post_chat_message(m, i, "hello").await.unwrap();

    let alice_view = wait_for(&mut alice_chat, |s| !s.messages().is_empty()).await;
    let bob_view = wait_for(&mut bob_chat, |s| !s.messages().is_empty()).await;

    assert_eq!(alice_view.messages().len(), 1);
    assert_eq!(alice_view.messages()[0].text, "hello");
    assert_eq!(alice_view.messages()[0].from, Sender::Them);
    assert_eq!(bob_view.messages().len(), 1);
    assert_eq!(bob_view.messages()[0].text, "hello");
    assert_eq!(bob_view.messages()[0].from, Sender::Me);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_conversation_keeps_arrival_order_without_duplicates() {
    let network = Arc::new(InMemoryNetwork::new());
    let alice = Participant::new(&network, 1);
    let bob = Participant::new(&network, 2);
    let (m, i) = (marketplace().address, item());
    handshake(&alice, &bob).await;

    // Sent before anyone follows the chat: delivered from history.
    bob.chat.post_chat_message(m, i, "hello").await.unwrap();

    let mut alice_chat = alice.chat.messages(m, i);
    wait_for(&mut alice_chat, |s| s.messages().len() == 1).await;

    alice.chat.post_chat_message(m, i, "hi bob").await.unwrap();
    bob.chat.post_chat_message(m, i, "when works?").await.unwrap();
    let view = wait_for(&mut alice_chat, |s| s.messages().len() == 3).await;

    let lines: Vec<_> = view
        .messages()
        .iter()
        .map(|e| (e.text.as_str(), e.from))
        .collect();
    assert_eq!(
        lines,
        [
            ("hello", Sender::Them),
            ("hi bob", Sender::Me),
            ("when works?", Sender::Them),
        ]
    );
    assert_quiet(&mut alice_chat, Duration::from_millis(200)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_confirmed_keys_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let network = Arc::new(InMemoryNetwork::new());
    let alice = Participant::durable(&network, 1, dir.path());
    let bob = Participant::new(&network, 2);
    let (m, i) = (marketplace().address, item());
    handshake(&alice, &bob).await;
    drop(alice);

    let alice = Participant::durable(&network, 1, dir.path());
    assert!(alice.ctx.keys.get(&conversation()).is_confirmed());

    let mut alice_chat = alice.chat.messages(m, i);
    bob.chat.post_chat_message(m, i, "still there?").await.unwrap();
    let view = wait_for(&mut alice_chat, |s| !s.messages().is_empty()).await;
    assert_eq!(view.messages()[0].text, "still there?");
    assert_eq!(view.messages()[0].from, Sender::Them);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_chat_waits_for_peer_then_opens() {
    let network = Arc::new(InMemoryNetwork::new());
    let alice = Participant::new(&network, 1);
    let bob = Participant::new(&network, 2);
    let (m, i) = (marketplace().address, item());

    let mut bob_chat = bob.chat.messages(m, i);
    wait_for(&mut bob_chat, |s| *s == ChatState::WaitingForPeer).await;
    assert!(matches!(
        bob.chat.post_chat_message(m, i, "too early").await,
        Err(ChatError::NoSymmetricKey)
    ));

    handshake(&alice, &bob).await;
    let opened = wait_for(&mut bob_chat, ChatState::is_open).await;
    assert!(opened.messages().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unselected_provider_stays_locked_out() {
    let network = Arc::new(InMemoryNetwork::new());
    let alice = Participant::new(&network, 1);
    let bob = Participant::new(&network, 2);
    let carol = Participant::new(&network, 3);
    let (m, i) = (marketplace().address, item());

    let mut carol_selection = carol.selections.selection(m, i);
    carol
        .items
        .publish_reply(&carol.signer, m, i, "pick me")
        .await
        .unwrap();
    handshake(&alice, &bob).await;

    wait_for(&mut carol_selection, |s| s.provider == bob.account()).await;
    assert!(!carol.ctx.keys.get(&conversation()).is_confirmed());
    assert!(carol.chat.chat_keys(&m, &i).unwrap().is_none());

    // Alice's candidate buffer was consumed by the promotion.
    let material = alice.ctx.keys.get(&conversation());
    assert_eq!(material.candidate_count(), 0);
    assert_eq!(
        material.confirmed(),
        Some(bob.ctx.keyring.key_exchange(&m, &i).unwrap())
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_selection_by_non_owner_cannot_claim_the_provider() {
    let network = Arc::new(InMemoryNetwork::new());
    let alice = Participant::new(&network, 1);
    let bob = Participant::new(&network, 2);
    let mallory = Participant::new(&network, 4);
    let (m, i) = (marketplace().address, item());

    // Validly signed by Mallory, naming herself as seeker of Alice's listing.
    // It sits on the topic before Alice's real selection.
    let forged = mallory
        .selections
        .create_select_provider(&mallory.signer, m, bob.account(), i)
        .await
        .unwrap();

    handshake(&alice, &bob).await;

    let alice_keys = alice.ctx.keyring.key_exchange(&m, &i).unwrap();
    assert_eq!(bob.ctx.keys.get(&conversation()).confirmed(), Some(alice_keys));
    assert_eq!(
        apply_selection(&bob.ctx, &forged.payload).unwrap(),
        HandshakeOutcome::NotListingOwner
    );
    assert_eq!(bob.ctx.keys.get(&conversation()).confirmed(), Some(alice_keys));

    let alice_chat = alice.chat.chat_keys(&m, &i).unwrap().unwrap();
    let bob_chat = bob.chat.chat_keys(&m, &i).unwrap().unwrap();
    assert_eq!(alice_chat.sym_key.as_bytes(), bob_chat.sym_key.as_bytes());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropping_last_handle_releases_transport_subscriptions() {
    let network = Arc::new(InMemoryNetwork::new());
    let alice = Participant::new(&network, 1);
    let bob = Participant::new(&network, 2);
    let (m, i) = (marketplace().address, item());
    let chat_topics = vec![alice.ctx.topics.chat(&m, &i)];
    let selection_topics = vec![alice.ctx.topics.select_provider(&m, &i)];
    let reply_topics = vec![alice.ctx.topics.item_reply(&m, &i)];
    let live = |topics: &[ContentTopic]| network.topic_subscriptions(topics);

    handshake(&alice, &bob).await;
    wait_until(|| live(&selection_topics) == 0 && live(&reply_topics) == 0).await;

    let chat = alice.chat.messages(m, i);
    let chat_again = alice.chat.messages(m, i);
    let selection = alice.selections.selection(m, i);
    let replies = alice.items.replies(m, i);
    wait_until(|| {
        live(&chat_topics) == 1 && live(&selection_topics) == 1 && live(&reply_topics) == 1
    })
    .await;

    // One chat handle is still held.
    drop(chat);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(live(&chat_topics), 1);

    drop(chat_again);
    drop(selection);
    drop(replies);
    wait_until(|| {
        live(&chat_topics) == 0 && live(&selection_topics) == 0 && live(&reply_topics) == 0
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_selection_replayed_into_another_marketplace_is_rejected() {
    let network = Arc::new(InMemoryNetwork::new());
    let alice = Participant::new(&network, 1);
    let bob = Participant::new(&network, 2);
    let (m, i) = (marketplace().address, item());
    let other = other_marketplace().address;
    let other_id = ConversationId::new(other, i);

    let mut bob_other_selection = bob.selections.selection(other, i);
    let envelope = alice
        .selections
        .create_select_provider(&alice.signer, m, bob.account(), i)
        .await
        .unwrap();

    // Same signature, relabelled for the other marketplace's topic.
    let mut replayed = envelope.clone();
    replayed.payload.marketplace = other;
    network
        .publish(
            &alice.ctx.topics.select_provider(&other, &i),
            JsonCodec.encode(&replayed).unwrap(),
        )
        .await
        .unwrap();
    // Untouched copy on the wrong topic names the wrong listing.
    network
        .publish(
            &alice.ctx.topics.select_provider(&other, &i),
            JsonCodec.encode(&envelope).unwrap(),
        )
        .await
        .unwrap();

    assert_quiet(&mut bob_other_selection, Duration::from_millis(300)).await;
    assert!(bob_other_selection.current().is_none());
    assert!(!bob.ctx.keys.get(&other_id).is_confirmed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_repeated_selection_is_idempotent() {
    let network = Arc::new(InMemoryNetwork::new());
    let alice = Participant::new(&network, 1);
    let bob = Participant::new(&network, 2);
    let (m, i) = (marketplace().address, item());
    handshake(&alice, &bob).await;

    let before = alice.ctx.keys.get(&conversation());
    let again = alice
        .selections
        .create_select_provider(&alice.signer, m, bob.account(), i)
        .await
        .unwrap();
    let outcome = apply_selection(&alice.ctx, &again.payload).unwrap();
    assert_eq!(outcome, HandshakeOutcome::AlreadyConfirmed);
    assert_eq!(alice.ctx.keys.get(&conversation()), before);
}

#[tokio::test]
async fn test_selection_needs_a_connected_wallet() {
    let network = Arc::new(InMemoryNetwork::new());
    let alice = Participant::new(&network, 1);
    let bob = Participant::new(&network, 2);
    let (m, i) = (marketplace().address, item());

    let wallet = LocalWallet::disconnected();
    let result = alice
        .selections
        .select_provider_with(&wallet, m, bob.account(), i)
        .await;
    assert_eq!(
        result,
        Err(MarketError::Wallet(WalletError::NoConnectorAvailable))
    );
    assert_eq!(network.messages_published(), 0);

    wallet.connect(Arc::new(LocalKeySigner::from_secret([1; 32]).unwrap()));
    let envelope = alice
        .selections
        .select_provider_with(&wallet, m, bob.account(), i)
        .await
        .unwrap();
    assert_eq!(envelope.payload.seeker, alice.account());
    assert_eq!(network.messages_published(), 1);
}
