//! # Topic Naming
//!
//! Content topics follow `/{app}/{version}/{name}/proto`. Each kind of
//! traffic owns a distinct name prefix, and addresses are interpolated in
//! lower-case hex so every participant computes byte-identical topics.

use shared_bus::ContentTopic;
use shared_types::{Address, Hash, ItemId};

/// Builds content topics for one application namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicNamer {
    app: String,
    version: u32,
}

impl TopicNamer {
    /// Namer for `app` at protocol `version`.
    pub fn new(app: impl Into<String>, version: u32) -> Self {
        Self {
            app: app.into(),
            version,
        }
    }

    fn topic(&self, name: &str) -> ContentTopic {
        ContentTopic::new(format!("/{}/{}/{}/proto", self.app, self.version, name))
    }

    /// Replies to one listing.
    #[must_use]
    pub fn item_reply(&self, marketplace: &Address, item: &ItemId) -> ContentTopic {
        self.topic(&format!("item-reply-{}-{}", marketplace.to_lower_hex(), item))
    }

    /// Provider selections for one listing.
    #[must_use]
    pub fn select_provider(&self, marketplace: &Address, item: &ItemId) -> ContentTopic {
        self.topic(&format!(
            "select-provider-{}-{}",
            marketplace.to_lower_hex(),
            item
        ))
    }

    /// Encrypted chat for one listing's conversation.
    ///
    /// Depends only on the listing, so seeker and provider agree on it.
    #[must_use]
    pub fn chat(&self, marketplace: &Address, item: &ItemId) -> ContentTopic {
        self.topic(&format!("chat-{}-{}", marketplace.to_lower_hex(), item))
    }

    /// Public profile announcements of one account.
    #[must_use]
    pub fn profile(&self, account: &Address) -> ContentTopic {
        self.topic(&format!("profile-{}", account.to_lower_hex()))
    }

    /// Item metadata document, addressed by its content hash.
    #[must_use]
    pub fn item_metadata(&self, hash: &Hash) -> ContentTopic {
        self.topic(&format!("item-metadata-0x{}", hex::encode(hash)))
    }
}
