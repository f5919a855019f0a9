//! # Messaging Context
//!
//! Everything a flow needs to know about the local participant and its
//! collaborators.

use crate::adapters::KeyMaterialStore;
use crate::config::{MarketplaceInfo, MessagingConfig};
use crate::domain::errors::{MarketError, StoreError};
use crate::domain::key_material::ConversationId;
use crate::domain::keys::ChatKeyring;
use crate::topics::TopicNamer;
use parking_lot::RwLock;
use shared_bus::{Capability, ContentTopic, Transport, TransportError};
use shared_types::Address;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Shared state of one local participant.
pub struct MessagingContext {
    /// Loaded configuration.
    pub config: MessagingConfig,
    /// Topic namer for `config.app_name`.
    pub topics: TopicNamer,
    /// Pub/sub transport.
    pub transport: Arc<dyn Transport>,
    /// Conversation key material.
    pub keys: Arc<KeyMaterialStore>,
    /// Derivation from the local root secret.
    pub keyring: ChatKeyring,
    /// Local account.
    pub account: Address,
    /// Listing owners learned from chain state.
    owners: RwLock<HashMap<ConversationId, Address>>,
}

impl MessagingContext {
    /// Bundle the participant's collaborators.
    pub fn new(
        config: MessagingConfig,
        transport: Arc<dyn Transport>,
        keys: Arc<KeyMaterialStore>,
        keyring: ChatKeyring,
        account: Address,
    ) -> Self {
        let topics = config.topics();
        Self {
            config,
            topics,
            transport,
            keys,
            keyring,
            account,
            owners: RwLock::new(HashMap::new()),
        }
    }

    /// Configured marketplace `address`.
    pub fn marketplace(&self, address: &Address) -> Result<&MarketplaceInfo, MarketError> {
        self.config
            .marketplace(address)
            .ok_or(MarketError::UnknownMarketplace(*address))
    }

    /// Owner of the listing `id`, once known.
    #[must_use]
    pub fn listing_owner(&self, id: &ConversationId) -> Option<Address> {
        self.owners.read().get(id).copied()
    }

    /// Record that `owner` listed `id`.
    ///
    /// Only the owner's selection may confirm a provider's counterparty, so
    /// a selection from `owner` buffered while the owner was unknown is
    /// promoted here.
    pub fn record_listing_owner(&self, id: ConversationId, owner: Address) -> Result<(), StoreError> {
        let previous = self.owners.write().insert(id, owner);
        match previous {
            Some(known) if known == owner => return Ok(()),
            Some(known) => {
                warn!(conversation = %id, %known, %owner, "Listing owner changed on-chain");
            }
            None => debug!(conversation = %id, %owner, "Listing owner learned"),
        }

        if owner != self.account {
            self.keys.select_temp_chat_key(&id, &owner)?;
        }
        Ok(())
    }

    /// Wait for a push-capable peer, then publish.
    pub async fn publish(&self, topic: &ContentTopic, payload: Vec<u8>) -> Result<(), TransportError> {
        self.transport
            .wait_for_capability(Capability::LightPush, self.config.peer_timeout)
            .await?;
        let len = payload.len();
        self.transport.publish(topic, payload).await?;
        debug!(topic = %topic, len, "Published");
        Ok(())
    }
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
