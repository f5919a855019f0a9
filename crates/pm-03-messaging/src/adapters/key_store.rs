//! # Conversation Key Store
//!
//! Holds every conversation's key material in memory, persists the whole
//! map through a `Repository` keyed by `"<marketplace>:<item>"`, and
//! announces changes so open chat streams can react to a confirmation.

use crate::adapters::repository::{InMemoryRepository, JsonFileRepository};
use crate::domain::errors::StoreError;
use crate::domain::key_material::{ConversationId, ConversationKeyMaterial, Promotion};
use crate::domain::keys::KeyExchange;
use crate::ports::Repository;
use parking_lot::Mutex;
use shared_types::Address;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Persisted layout.
pub type KeyMaterialMap = BTreeMap<String, ConversationKeyMaterial>;

const CHANGE_CAPACITY: usize = 256;

/// Shared, persisted conversation key material.
pub struct KeyMaterialStore {
    repo: Arc<dyn Repository<KeyMaterialMap>>,
    entries: Mutex<BTreeMap<ConversationId, ConversationKeyMaterial>>,
    changes: broadcast::Sender<ConversationId>,
}

impl KeyMaterialStore {
    /// Load the store from `repo`.
    ///
    /// Entries with malformed keys are skipped.
    pub fn open(repo: Arc<dyn Repository<KeyMaterialMap>>) -> Result<Self, StoreError> {
        let stored = repo.load()?.unwrap_or_default();
        let mut entries = BTreeMap::new();
        for (key, material) in stored {
            match key.parse::<ConversationId>() {
                Ok(id) => {
                    entries.insert(id, material);
                }
                Err(e) => warn!(error = %e, "Skipping stored key material"),
            }
        }
        debug!(conversations = entries.len(), "Key material loaded");

        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Ok(Self {
            repo,
            entries: Mutex::new(entries),
            changes,
        })
    }

    /// Load the store persisted as JSON at `path`.
    pub fn open_file(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::open(Arc::new(JsonFileRepository::<KeyMaterialMap>::new(path)))
    }

    /// Store that lives only in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            repo: Arc::new(InMemoryRepository::new()),
            entries: Mutex::new(BTreeMap::new()),
            changes,
        }
    }

    /// Key material of `id` (empty if unknown).
    #[must_use]
    pub fn get(&self, id: &ConversationId) -> ConversationKeyMaterial {
        self.entries.lock().get(id).cloned().unwrap_or_default()
    }

    /// Notified with the id of every conversation whose material changes.
    #[must_use]
    pub fn subscribe_changes(&self) -> broadcast::Receiver<ConversationId> {
        self.changes.subscribe()
    }

    /// Apply `f` to the material of `id`, persisting if it changed.
    ///
    /// A failed save rolls the in-memory change back.
    pub fn update<R, F>(&self, id: &ConversationId, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut ConversationKeyMaterial) -> R,
    {
        let mut entries = self.entries.lock();
        let before = entries.get(id).cloned();
        let after = entries.entry(*id).or_default();
        let result = f(after);

        let unchanged = match &before {
            Some(previous) => previous == after,
            None => *after == ConversationKeyMaterial::default(),
        };
        if unchanged {
            if before.is_none() {
                entries.remove(id);
            }
            return Ok(result);
        }

        let snapshot: KeyMaterialMap = entries
            .iter()
            .map(|(id, material)| (id.to_string(), material.clone()))
            .collect();
        if let Err(e) = self.repo.save(&snapshot) {
            match before {
                Some(previous) => entries.insert(*id, previous),
                None => entries.remove(id),
            };
            return Err(e);
        }
        drop(entries);

        let _ = self.changes.send(*id);
        Ok(result)
    }

    /// Buffer a candidate counterparty for `id`.
    pub fn add_candidate(
        &self,
        id: &ConversationId,
        candidate: Address,
        keys: KeyExchange,
    ) -> Result<bool, StoreError> {
        let added = self.update(id, |m| m.add_candidate(candidate, keys))?;
        if added {
            debug!(conversation = %id, candidate = %candidate, "Buffered candidate keys");
        }
        Ok(added)
    }

    /// Confirm `keys` as the counterparty of `id`.
    pub fn confirm(&self, id: &ConversationId, keys: KeyExchange) -> Result<bool, StoreError> {
        let confirmed = self.update(id, |m| m.confirm(keys))?;
        if confirmed {
            info!(conversation = %id, "Counterparty keys confirmed");
        }
        Ok(confirmed)
    }

    /// Promote the candidate buffered for `address` in `id`.
    pub fn select_temp_chat_key(
        &self,
        id: &ConversationId,
        address: &Address,
    ) -> Result<Promotion, StoreError> {
        let promotion = self.update(id, |m| m.select_temp(address))?;
        match promotion {
            Promotion::Promoted => {
                info!(conversation = %id, counterparty = %address, "Candidate keys promoted")
            }
            Promotion::NoCandidate => {
                debug!(conversation = %id, counterparty = %address, "No candidate keys to promote")
            }
            Promotion::AlreadyConfirmed => {}
        }
        Ok(promotion)
    }
}
