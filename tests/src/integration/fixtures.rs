//! Participants and helpers shared by the integration scenarios.

use async_trait::async_trait;
use market_telemetry::{init_logging, TelemetryConfig};
use parking_lot::Mutex;
use pm_01_signed_envelope::LocalKeySigner;
use pm_02_event_cache::CacheHandle;
use pm_03_messaging::{
    ChainError, ChainGateway, ChatKeyring, ChatService, ContractCall, ConversationId,
    InMemoryRepository, ItemService, ItemStatus, KeyMaterialStore, MarketplaceInfo,
    MessagingConfig, MessagingContext, OnChainItem, Profile, ProfileSync, Repository,
    SelectProviderService, TxReceipt,
};
use shared_bus::{InMemoryNetwork, Transport};
use shared_crypto::SecretKey;
use shared_types::{Address, ItemId, U256};
use std::fmt::Debug;
use std::collections::BTreeMap;
use std::hash::Hash;
use std::path::Path;
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::time::timeout;

/// How long a scenario waits for a value to propagate.
pub const WAIT: Duration = Duration::from_secs(5);

static LOGGING: Once = Once::new();

/// Install a log subscriber once per test binary.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let _ = init_logging(&TelemetryConfig::for_component("pm-tests"));
    });
}

/// Marketplace most scenarios run in.
pub fn marketplace() -> MarketplaceInfo {
    MarketplaceInfo {
        address: "0xABC0000000000000000000000000000000000001"
            .parse()
            .expect("valid address"),
        name: "Peer Market".into(),
        chain_id: 1,
    }
}

/// A second marketplace with the same contract interface on another chain.
pub fn other_marketplace() -> MarketplaceInfo {
    MarketplaceInfo {
        address: "0xDEF0000000000000000000000000000000000002"
            .parse()
            .expect("valid address"),
        name: "Peer Market".into(),
        chain_id: 137,
    }
}

/// Listing most scenarios talk about.
pub fn item() -> ItemId {
    U256::from(42u64)
}

/// Configuration shared by every participant.
pub fn config() -> MessagingConfig {
    MessagingConfig {
        marketplaces: vec![marketplace(), other_marketplace()],
        peer_timeout: Duration::from_secs(2),
        ..MessagingConfig::default()
    }
}

/// One local participant: wallet, key material and services.
pub struct Participant {
    pub signer: LocalKeySigner,
    pub ctx: Arc<MessagingContext>,
    pub chat: ChatService,
    pub selections: SelectProviderService,
    pub items: ItemService,
}

impl Participant {
    /// Participant whose wallet and chat root secret are derived from `seed`.
    pub fn new(network: &Arc<InMemoryNetwork>, seed: u8) -> Self {
        Self::build(network, seed, config(), Arc::new(KeyMaterialStore::in_memory()))
    }

    /// Like `new`, with key material persisted under `data_dir`.
    pub fn durable(network: &Arc<InMemoryNetwork>, seed: u8, data_dir: &Path) -> Self {
        let config = MessagingConfig {
            data_dir: data_dir.to_path_buf(),
            ..config()
        };
        let keys = KeyMaterialStore::open_file(config.key_store_path()).expect("key store opens");
        Self::build(network, seed, config, Arc::new(keys))
    }

    fn build(
        network: &Arc<InMemoryNetwork>,
        seed: u8,
        config: MessagingConfig,
        keys: Arc<KeyMaterialStore>,
    ) -> Self {
        init_test_logging();
        let signer = LocalKeySigner::from_secret([seed; 32]).expect("valid secret");
        let ctx = Arc::new(MessagingContext::new(
            config,
            network.clone() as Arc<dyn Transport>,
            keys,
            ChatKeyring::new(SecretKey::from_bytes([seed.wrapping_add(100); 32])),
            signer.account(),
        ));
        Self {
            signer,
            chat: ChatService::new(ctx.clone()),
            selections: SelectProviderService::new(ctx.clone()),
            items: ItemService::new(ctx.clone()),
            ctx,
        }
    }

    pub fn account(&self) -> Address {
        self.signer.account()
    }

    /// Reconcile `marketplace()` against `chain`, learning listing owners.
    pub async fn learn_listings(&self, chain: &ScriptedChain) {
        let mut local = BTreeMap::new();
        self.items
            .reconcile(chain, marketplace().address, &mut local)
            .await
            .expect("reconcile succeeds");
    }

    /// Profile sync actor over an in-memory profile record.
    pub fn profile_sync(&self, profile: Option<Profile>) -> (ProfileSync, Arc<dyn Repository<Profile>>) {
        let repo: Arc<dyn Repository<Profile>> = Arc::new(match profile {
            Some(p) => InMemoryRepository::with_value(p),
            None => InMemoryRepository::new(),
        });
        (ProfileSync::new(self.ctx.clone(), repo.clone()), repo)
    }
}

/// Chain whose next submission result is scripted.
pub struct ScriptedChain {
    pub submissions: Mutex<Vec<ContractCall>>,
    outcome: Result<TxReceipt, ChainError>,
    items: Vec<OnChainItem>,
}

impl ScriptedChain {
    pub fn succeeding() -> Self {
        Self {
            submissions: Mutex::new(Vec::new()),
            outcome: Ok(TxReceipt {
                tx_hash: [0x11; 32],
                block_number: 7,
            }),
            items: Vec::new(),
        }
    }

    pub fn reverting() -> Self {
        Self {
            outcome: Err(ChainError::TransactionReverted {
                tx_hash: [0x22; 32],
                reason: "insufficient allowance".into(),
            }),
            ..Self::succeeding()
        }
    }

    pub fn with_items(items: Vec<OnChainItem>) -> Self {
        Self {
            items,
            ..Self::succeeding()
        }
    }

    /// Chain on which `owner` listed `item()` in `marketplace()`.
    pub fn listing(owner: Address) -> Self {
        Self::with_items(vec![OnChainItem {
            id: item(),
            owner,
            price: U256::from(100u64),
            metadata_hash: [0x42; 32],
            status: ItemStatus::Open,
        }])
    }
}

#[async_trait]
impl ChainGateway for ScriptedChain {
    async fn submit(&self, call: ContractCall) -> Result<TxReceipt, ChainError> {
        self.submissions.lock().push(call);
        self.outcome.clone()
    }

    async fn item_states(&self, _marketplace: Address) -> Result<Vec<OnChainItem>, ChainError> {
        Ok(self.items.clone())
    }
}

/// Conversation id of `item()` in `marketplace()`.
pub fn conversation() -> ConversationId {
    ConversationId::new(marketplace().address, item())
}

/// Wait until `handle` holds a value matching `pred`, returning it.
///
/// Panics after `WAIT`.
pub async fn wait_for<K, V>(handle: &mut CacheHandle<K, V>, mut pred: impl FnMut(&V) -> bool) -> V
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    let found = timeout(WAIT, async {
        if let Some(value) = handle.current() {
            if pred(&value) {
                return value;
            }
        }
        loop {
            match handle.recv().await {
                Some(value) if pred(&value) => return value,
                Some(_) => {}
                None => panic!("cache entry closed while waiting"),
            }
        }
    })
    .await;
    found.expect("timed out waiting for cache value")
}

/// Poll `cond` until it holds.
///
/// Panics after `WAIT`.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    let held = timeout(WAIT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    held.expect("timed out waiting for condition");
}

/// Assert nothing new arrives on `handle` within `window`.
pub async fn assert_quiet<K, V>(handle: &mut CacheHandle<K, V>, window: Duration)
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + Debug + 'static,
{
    if let Ok(Some(value)) = timeout(window, handle.recv()).await {
        panic!("unexpected cache value: {value:?}");
    }
}
