// This is the infra layer - it implements the traits defined in core.
// This file provides an IN-MEMORY implementation of the config and state
// stores.
//
// **Why have an in-memory store at all?**
// - Easier to test the core without setting up a database
// - Good enough for hosts that already persist settings elsewhere and just
//   hydrate a store at startup
// - Follows the same patterns as the SQLite implementation

use async_trait::async_trait;
use dashmap::DashMap;

use crate::core::automod::{IgnoreSet, ScopeConfigStore, ScopeSettings, StoreError};
use crate::core::scheduler::{ModerationStateStore, SlowmodeRestriction, TempMute};

/// In-memory implementation of `ScopeConfigStore` and `ModerationStateStore`.
///
/// **DashMap:**
/// A concurrent HashMap that's safe to use across multiple async tasks.
/// Event handling and the expiry sweeps touch these maps at the same time.
#[derive(Default)]
pub struct InMemoryModStore {
    settings: DashMap<u64, ScopeSettings>,
    temp_mutes: DashMap<u64, Vec<TempMute>>,
    restrictions: DashMap<u64, Vec<SlowmodeRestriction>>,
}

impl InMemoryModStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScopeConfigStore for InMemoryModStore {
    async fn get_scope_settings(&self, scope_id: u64) -> Result<ScopeSettings, StoreError> {
        // Unknown scopes get the defaults, where everything is disabled.
        Ok(self
            .settings
            .get(&scope_id)
            .map(|entry| entry.clone())
            .unwrap_or_default())
    }

    async fn get_ignore_set(&self, scope_id: u64) -> Result<IgnoreSet, StoreError> {
        Ok(self
            .settings
            .get(&scope_id)
            .map(|entry| entry.ignored.clone())
            .unwrap_or_default())
    }

    async fn set_scope_settings(
        &self,
        scope_id: u64,
        settings: ScopeSettings,
    ) -> Result<(), StoreError> {
        self.settings.insert(scope_id, settings);
        Ok(())
    }
}

#[async_trait]
impl ModerationStateStore for InMemoryModStore {
    async fn list_scopes(&self) -> Result<Vec<u64>, StoreError> {
        let mut scopes: Vec<u64> = self
            .temp_mutes
            .iter()
            .map(|entry| *entry.key())
            .chain(self.restrictions.iter().map(|entry| *entry.key()))
            .collect();
        scopes.sort_unstable();
        scopes.dedup();
        Ok(scopes)
    }

    async fn temp_mutes(&self, scope_id: u64) -> Result<Vec<TempMute>, StoreError> {
        Ok(self
            .temp_mutes
            .get(&scope_id)
            .map(|entry| entry.clone())
            .unwrap_or_default())
    }

    async fn set_temp_mute(&self, scope_id: u64, mute: TempMute) -> Result<(), StoreError> {
        let mut mutes = self.temp_mutes.entry(scope_id).or_default();
        // One record per actor; a re-mute replaces the old deadline.
        mutes.retain(|existing| existing.actor_id != mute.actor_id);
        mutes.push(mute);
        Ok(())
    }

    async fn clear_temp_mute(&self, scope_id: u64, actor_id: u64) -> Result<(), StoreError> {
        if let Some(mut mutes) = self.temp_mutes.get_mut(&scope_id) {
            mutes.retain(|existing| existing.actor_id != actor_id);
        }
        Ok(())
    }

    async fn restrictions(&self, scope_id: u64) -> Result<Vec<SlowmodeRestriction>, StoreError> {
        Ok(self
            .restrictions
            .get(&scope_id)
            .map(|entry| entry.clone())
            .unwrap_or_default())
    }

    async fn set_restriction(
        &self,
        scope_id: u64,
        restriction: SlowmodeRestriction,
    ) -> Result<(), StoreError> {
        let mut restrictions = self.restrictions.entry(scope_id).or_default();
        restrictions.retain(|existing| {
            !(existing.channel_id == restriction.channel_id
                && existing.actor_id == restriction.actor_id)
        });
        restrictions.push(restriction);
        Ok(())
    }

    async fn clear_restriction(
        &self,
        scope_id: u64,
        channel_id: u64,
        actor_id: u64,
    ) -> Result<(), StoreError> {
        if let Some(mut restrictions) = self.restrictions.get_mut(&scope_id) {
            restrictions
                .retain(|existing| !(existing.channel_id == channel_id && existing.actor_id == actor_id));
        }
        Ok(())
    }
}
