//! # Messaging Configuration
//!
//! Loaded from TOML, then adjusted from the environment.
//!
//! ## Config File Format
//!
//! ```toml
//! [network]
//! app_name = "peer-market"
//! topic_version = 1
//! peer_timeout_secs = 10
//! page_size = 20
//!
//! [cache]
//! capacity = 64
//!
//! [storage]
//! data_dir = "./data"
//!
//! [[marketplaces]]
//! address = "0xAbC0000000000000000000000000000000000001"
//! name = "Peer Market"
//! chain_id = 1
//! ```
//!
//! ## Environment Overrides
//!
//! - `PM_APP_NAME`
//! - `PM_DATA_DIR`
//! - `PM_PEER_TIMEOUT_SECS`

use crate::domain::errors::ConfigError;
use crate::topics::TopicNamer;
use pm_01_signed_envelope::Eip712Domain;
use serde::Deserialize;
use shared_types::Address;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default topic namespace.
pub const DEFAULT_APP_NAME: &str = "peer-market";

/// A marketplace contract this node talks to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MarketplaceInfo {
    /// Contract address.
    pub address: Address,
    /// EIP-712 domain name the contract signs under.
    pub name: String,
    /// Chain the contract lives on.
    pub chain_id: u64,
}

impl MarketplaceInfo {
    /// Signing domain bound to this marketplace contract.
    #[must_use]
    pub fn domain(&self) -> Eip712Domain {
        Eip712Domain::new(self.name.clone(), "1")
            .with_chain_id(self.chain_id)
            .with_verifying_contract(self.address)
    }
}

/// Runtime configuration for the messaging layer.
#[derive(Debug, Clone, PartialEq)]
pub struct MessagingConfig {
    /// Topic namespace.
    pub app_name: String,
    /// Topic protocol version.
    pub topic_version: u32,
    /// Known marketplaces.
    pub marketplaces: Vec<MarketplaceInfo>,
    /// How long to wait for a peer before publishing fails.
    pub peer_timeout: Duration,
    /// Broadcast buffer per cache entry.
    pub cache_capacity: usize,
    /// History query page size.
    pub page_size: usize,
    /// Directory for JSON stores.
    pub data_dir: PathBuf,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            topic_version: 1,
            marketplaces: Vec::new(),
            peer_timeout: Duration::from_secs(10),
            cache_capacity: pm_02_event_cache::DEFAULT_ENTRY_CAPACITY,
            page_size: shared_bus::DEFAULT_PAGE_SIZE,
            data_dir: PathBuf::from("./data"),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    network: NetworkSection,
    #[serde(default)]
    cache: CacheSection,
    #[serde(default)]
    storage: StorageSection,
    #[serde(default)]
    marketplaces: Vec<MarketplaceInfo>,
}

#[derive(Debug, Deserialize, Default)]
struct NetworkSection {
    app_name: Option<String>,
    topic_version: Option<u32>,
    peer_timeout_secs: Option<u64>,
    page_size: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct CacheSection {
    capacity: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct StorageSection {
    data_dir: Option<PathBuf>,
}

impl MessagingConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, parsed, or validated.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string. Missing keys take defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let defaults = Self::default();

        let config = Self {
            app_name: file.network.app_name.unwrap_or(defaults.app_name),
            topic_version: file.network.topic_version.unwrap_or(defaults.topic_version),
            marketplaces: file.marketplaces,
            peer_timeout: file
                .network
                .peer_timeout_secs
                .map_or(defaults.peer_timeout, Duration::from_secs),
            cache_capacity: file.cache.capacity.unwrap_or(defaults.cache_capacity),
            page_size: file.network.page_size.unwrap_or(defaults.page_size),
            data_dir: file.storage.data_dir.unwrap_or(defaults.data_dir),
        };
        config.validate()?;
        Ok(config)
    }

    /// Apply `PM_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply `PM_*` overrides from `lookup`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(app_name) = lookup("PM_APP_NAME") {
            self.app_name = app_name;
        }
        if let Some(dir) = lookup("PM_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(secs) = lookup("PM_PEER_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| ConfigError::Invalid {
                field: "PM_PEER_TIMEOUT_SECS",
                reason: format!("not a number: {secs}"),
            })?;
            self.peer_timeout = Duration::from_secs(secs);
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.app_name.is_empty() || self.app_name.contains('/') {
            return Err(ConfigError::Invalid {
                field: "app_name",
                reason: format!("must be a non-empty path segment, got {:?}", self.app_name),
            });
        }
        if self.peer_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "peer_timeout_secs",
                reason: "must be greater than zero".into(),
            });
        }
        if self.page_size == 0 {
            return Err(ConfigError::Invalid {
                field: "page_size",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// Look up a configured marketplace.
    #[must_use]
    pub fn marketplace(&self, address: &Address) -> Option<&MarketplaceInfo> {
        self.marketplaces.iter().find(|m| m.address == *address)
    }

    /// Topic namer for this namespace.
    #[must_use]
    pub fn topics(&self) -> TopicNamer {
        TopicNamer::new(self.app_name.clone(), self.topic_version)
    }

    /// File holding conversation key material.
    #[must_use]
    pub fn key_store_path(&self) -> PathBuf {
        self.data_dir.join("chat-keys.json")
    }

    /// File holding the local profile.
    #[must_use]
    pub fn profile_path(&self) -> PathBuf {
        self.data_dir.join("profile.json")
    }
}
