//! In-memory storage backend.
//!
//! The reference implementation of the storage ports, used in tests and
//! single-process deployments. State lives in `RwLock`-guarded maps shared
//! across clones, so one store instance per service gives every worker the
//! same view.

use alloy_primitives::B256;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use nuwa_types::timestamp::UnixMillis;

use super::{
    ChannelFilter, ChannelInfo, ChannelStore, Pagination, PendingRavStore, PendingSubRav, RavStore,
    SubChannelState,
};
use nuwa_types::subrav::SignedSubRav;

/// Errors from the in-memory backend. The maps themselves cannot fail, so
/// the only failure is a poisoned lock from a panicked writer.
#[derive(Debug, thiserror::Error)]
pub enum MemoryStoreError {
    #[error("store lock poisoned")]
    Poisoned,
}

type SubChannelKey = (B256, String);

#[derive(Default)]
struct MemoryState {
    channels: HashMap<B256, ChannelInfo>,
    sub_channels: HashMap<SubChannelKey, SubChannelState>,
    ravs: HashMap<SubChannelKey, SignedSubRav>,
    pending: HashMap<(B256, String, u64), PendingSubRav>,
}

/// An in-memory implementation of all three storage ports.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MemoryState>, MemoryStoreError> {
        self.state.read().map_err(|_| MemoryStoreError::Poisoned)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, MemoryState>, MemoryStoreError> {
        self.state.write().map_err(|_| MemoryStoreError::Poisoned)
    }
}

#[async_trait]
impl ChannelStore for MemoryStore {
    type Error = MemoryStoreError;

    async fn channel(&self, channel_id: &B256) -> Result<Option<ChannelInfo>, Self::Error> {
        Ok(self.read()?.channels.get(channel_id).cloned())
    }

    async fn upsert_channel(&self, info: ChannelInfo) -> Result<(), Self::Error> {
        self.write()?.channels.insert(info.channel_id, info);
        Ok(())
    }

    async fn list_channels(
        &self,
        filter: &ChannelFilter,
        page: &Pagination,
    ) -> Result<Vec<ChannelInfo>, Self::Error> {
        let state = self.read()?;
        let mut channels: Vec<ChannelInfo> = state
            .channels
            .values()
            .filter(|info| filter.matches(info))
            .cloned()
            .collect();
        channels.sort_by_key(|info| info.channel_id);
        let channels = channels
            .into_iter()
            .skip(page.offset)
            .take(page.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(channels)
    }

    async fn remove_channel(&self, channel_id: &B256) -> Result<(), Self::Error> {
        let mut state = self.write()?;
        state.channels.remove(channel_id);
        state.sub_channels.retain(|(id, _), _| id != channel_id);
        Ok(())
    }

    async fn sub_channel(
        &self,
        channel_id: &B256,
        vm_id_fragment: &str,
    ) -> Result<Option<SubChannelState>, Self::Error> {
        let key = (*channel_id, vm_id_fragment.to_string());
        Ok(self.read()?.sub_channels.get(&key).cloned())
    }

    async fn update_sub_channel(
        &self,
        channel_id: &B256,
        vm_id_fragment: &str,
        state: SubChannelState,
    ) -> Result<(), Self::Error> {
        let key = (*channel_id, vm_id_fragment.to_string());
        self.write()?.sub_channels.insert(key, state);
        Ok(())
    }

    async fn list_sub_channels(
        &self,
        channel_id: &B256,
    ) -> Result<Vec<(String, SubChannelState)>, Self::Error> {
        let state = self.read()?;
        let mut entries: Vec<(String, SubChannelState)> = state
            .sub_channels
            .iter()
            .filter(|((id, _), _)| id == channel_id)
            .map(|((_, fragment), sub)| (fragment.clone(), sub.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    async fn remove_sub_channel(
        &self,
        channel_id: &B256,
        vm_id_fragment: &str,
    ) -> Result<(), Self::Error> {
        let key = (*channel_id, vm_id_fragment.to_string());
        self.write()?.sub_channels.remove(&key);
        Ok(())
    }
}

#[async_trait]
impl RavStore for MemoryStore {
    type Error = MemoryStoreError;

    async fn save_rav(&self, rav: SignedSubRav) -> Result<(), Self::Error> {
        let key = (rav.sub_rav.channel_id, rav.sub_rav.vm_id_fragment.clone());
        self.write()?.ravs.insert(key, rav);
        Ok(())
    }

    async fn latest_rav(
        &self,
        channel_id: &B256,
        vm_id_fragment: &str,
    ) -> Result<Option<SignedSubRav>, Self::Error> {
        let key = (*channel_id, vm_id_fragment.to_string());
        Ok(self.read()?.ravs.get(&key).cloned())
    }
}

#[async_trait]
impl PendingRavStore for MemoryStore {
    type Error = MemoryStoreError;

    async fn save_pending(&self, pending: PendingSubRav) -> Result<(), Self::Error> {
        let key = (
            pending.sub_rav.channel_id,
            pending.sub_rav.vm_id_fragment.clone(),
            pending.sub_rav.nonce,
        );
        self.write()?.pending.insert(key, pending);
        Ok(())
    }

    async fn find_pending(
        &self,
        channel_id: &B256,
        vm_id_fragment: &str,
        nonce: u64,
    ) -> Result<Option<PendingSubRav>, Self::Error> {
        let key = (*channel_id, vm_id_fragment.to_string(), nonce);
        Ok(self.read()?.pending.get(&key).cloned())
    }

    async fn find_latest_pending(
        &self,
        channel_id: &B256,
        vm_id_fragment: &str,
    ) -> Result<Option<PendingSubRav>, Self::Error> {
        let state = self.read()?;
        Ok(state
            .pending
            .iter()
            .filter(|((id, fragment, _), _)| id == channel_id && fragment == vm_id_fragment)
            .max_by_key(|((_, _, nonce), _)| *nonce)
            .map(|(_, pending)| pending.clone()))
    }

    async fn remove_pending(
        &self,
        channel_id: &B256,
        vm_id_fragment: &str,
        nonce: u64,
    ) -> Result<(), Self::Error> {
        let key = (*channel_id, vm_id_fragment.to_string(), nonce);
        self.write()?.pending.remove(&key);
        Ok(())
    }

    async fn cleanup_pending(&self, max_age_ms: u64) -> Result<usize, Self::Error> {
        let now = UnixMillis::now_or_epoch();
        let mut state = self.write()?;
        let before = state.pending.len();
        state
            .pending
            .retain(|_, pending| now - pending.created_at <= max_age_ms);
        Ok(before - state.pending.len())
    }
}
