//! # Profile Sync
//!
//! Reconciles the persisted local profile with the newest signed
//! announcement on the account's profile topic.
//!
//! ## Lifecycle
//!
//! ```text
//! Idle ──sync()──► Syncing ──(done or failed)──► Idle
//! ```
//!
//! A `sync` started while another is in flight returns
//! `SyncOutcome::AlreadySyncing` without touching the network.

use crate::domain::errors::ProfileError;
use crate::domain::profile::{profile_domain, Profile, PublicProfile};
use crate::ports::Repository;
use crate::service::context::{now_ms, MessagingContext};
use parking_lot::Mutex;
use pm_01_signed_envelope::{
    create_signed_payload, decode_signed_payload, JsonCodec, PayloadCodec, TypedDataSigner,
};
use shared_bus::{Capability, QueryOptions};
use shared_types::Address;
use std::ops::ControlFlow;
use std::sync::Arc;
use tracing::{debug, info};

/// Whether a sync is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Nothing running.
    Idle,
    /// A sync holds the profile.
    Syncing,
}

/// What a sync did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A newer announcement was merged into the local profile.
    Pulled(PublicProfile),
    /// The local profile was announced.
    Pushed,
    /// The network already carries the local profile.
    UpToDate,
    /// No local profile is stored.
    NoProfile,
    /// Another sync is running.
    AlreadySyncing,
}

/// Resets the state to `Idle` when the sync ends, however it ends.
struct SyncGuard<'a> {
    state: &'a Mutex<SyncState>,
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        *self.state.lock() = SyncState::Idle;
    }
}

/// Profile sync actor for the local account.
pub struct ProfileSync {
    ctx: Arc<MessagingContext>,
    repo: Arc<dyn Repository<Profile>>,
    state: Mutex<SyncState>,
}

impl ProfileSync {
    /// Actor over `repo`, idle.
    pub fn new(ctx: Arc<MessagingContext>, repo: Arc<dyn Repository<Profile>>) -> Self {
        Self {
            ctx,
            repo,
            state: Mutex::new(SyncState::Idle),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SyncState {
        *self.state.lock()
    }

    fn begin(&self) -> Option<SyncGuard<'_>> {
        let mut state = self.state.lock();
        if *state == SyncState::Syncing {
            return None;
        }
        *state = SyncState::Syncing;
        Some(SyncGuard { state: &self.state })
    }

    /// Pull a newer announcement or push the local profile.
    ///
    /// The newest `last_update` wins. `last_sync` is stamped on success.
    ///
    /// # Errors
    ///
    /// Store, signing and transport failures. The actor is idle again
    /// afterwards either way.
    pub async fn sync(&self, signer: &dyn TypedDataSigner) -> Result<SyncOutcome, ProfileError> {
        let Some(_guard) = self.begin() else {
            debug!("Profile sync already running");
            return Ok(SyncOutcome::AlreadySyncing);
        };
        let Some(mut local) = self.repo.load()? else {
            return Ok(SyncOutcome::NoProfile);
        };

        let outcome = match self.latest_announcement(&local.address).await? {
            Some(remote) if remote.last_update > local.last_update => {
                local.merge_public(&remote);
                info!(account = %local.address, last_update = remote.last_update, "Pulled profile");
                SyncOutcome::Pulled(remote)
            }
            Some(remote) if remote == local.public() => SyncOutcome::UpToDate,
            _ => {
                self.announce(&local, signer).await?;
                info!(account = %local.address, last_update = local.last_update, "Pushed profile");
                SyncOutcome::Pushed
            }
        };

        local.last_sync = Some(now_ms());
        self.repo.save(&local)?;
        Ok(outcome)
    }

    /// Newest valid announcement for `account`.
    async fn latest_announcement(
        &self,
        account: &Address,
    ) -> Result<Option<PublicProfile>, ProfileError> {
        let transport = &self.ctx.transport;
        transport
            .wait_for_capability(Capability::Store, self.ctx.config.peer_timeout)
            .await?;

        let domain = profile_domain(&self.ctx.config.app_name);
        let topic = self.ctx.topics.profile(account);
        let options = QueryOptions {
            page_size: self.ctx.config.page_size,
            ..QueryOptions::default()
        };

        let mut newest: Option<PublicProfile> = None;
        transport
            .query_history(&[topic], options, &mut |page| {
                for message in page {
                    let Some(envelope) =
                        decode_signed_payload::<PublicProfile, _>(&domain, &JsonCodec, &message.payload)
                    else {
                        continue;
                    };
                    if envelope.payload.address != *account {
                        continue;
                    }
                    if newest
                        .as_ref()
                        .map_or(true, |n| envelope.payload.last_update > n.last_update)
                    {
                        newest = Some(envelope.payload);
                    }
                }
                ControlFlow::Continue(())
            })
            .await?;
        Ok(newest)
    }

    async fn announce(&self, local: &Profile, signer: &dyn TypedDataSigner) -> Result<(), ProfileError> {
        let domain = profile_domain(&self.ctx.config.app_name);
        let envelope = create_signed_payload(&domain, |_| local.public(), signer).await?;
        let bytes = JsonCodec.encode(&envelope)?;
        self.ctx
            .publish(&self.ctx.topics.profile(&local.address), bytes)
            .await?;
        Ok(())
    }
}
