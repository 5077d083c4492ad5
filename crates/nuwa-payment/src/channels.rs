//! Channel lifecycle administration.
//!
//! The payee side owns channel metadata: opening a channel for a payer,
//! authorizing sub-channels for verification methods, and walking the
//! open → closing → closed lifecycle. A reset bumps the epoch and discards
//! sub-channel accounting, which invalidates every outstanding SubRAV built
//! for the previous epoch.

use alloy_primitives::B256;

use nuwa_types::chain::derive_channel_id;
use nuwa_types::did::Did;

use crate::store::{ChannelInfo, ChannelStatus, ChannelStore, SubChannelState};

/// Lifecycle violations and storage failures.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("unknown channel {0}")]
    Unknown(B256),

    #[error("channel {channel_id} is {status:?}, expected {expected:?}")]
    WrongStatus {
        channel_id: B256,
        status: ChannelStatus,
        expected: ChannelStatus,
    },

    #[error("storage failure: {0}")]
    Store(#[source] anyhow::Error),
}

/// Administers channel metadata over a [`ChannelStore`].
pub struct ChannelManager<S> {
    store: S,
}

impl<S> ChannelManager<S>
where
    S: ChannelStore,
{
    pub fn new(store: S) -> Self {
        ChannelManager { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Opens (or returns the already-open) channel for
    /// `(payer, payee, asset)`. The channel id is the deterministic
    /// derivation both sides can compute offline.
    pub async fn open_channel(
        &self,
        payer_did: Did,
        payee_did: Did,
        asset_id: impl Into<String>,
    ) -> Result<ChannelInfo, ChannelError> {
        let asset_id = asset_id.into();
        let channel_id = derive_channel_id(&payer_did, &payee_did, &asset_id);
        if let Some(existing) = self.store.channel(&channel_id).await.map_err(store_err)? {
            if existing.status == ChannelStatus::Open {
                return Ok(existing);
            }
            return Err(ChannelError::WrongStatus {
                channel_id,
                status: existing.status,
                expected: ChannelStatus::Open,
            });
        }
        let info = ChannelInfo {
            channel_id,
            payer_did,
            payee_did,
            asset_id,
            status: ChannelStatus::Open,
            epoch: 0,
        };
        self.store.upsert_channel(info.clone()).await.map_err(store_err)?;
        Ok(info)
    }

    /// Pre-authorizes a sub-channel for a verification method fragment at
    /// the channel's current epoch.
    pub async fn authorize_sub_channel(
        &self,
        channel_id: &B256,
        vm_id_fragment: &str,
    ) -> Result<SubChannelState, ChannelError> {
        let channel = self.require(channel_id, ChannelStatus::Open).await?;
        let state = SubChannelState::fresh(channel.epoch);
        self.store
            .update_sub_channel(channel_id, vm_id_fragment, state.clone())
            .await
            .map_err(store_err)?;
        Ok(state)
    }

    /// Starts cooperative close: no new sub-channels, existing accounting
    /// stands until the close finalizes on-chain.
    pub async fn initiate_close(&self, channel_id: &B256) -> Result<ChannelInfo, ChannelError> {
        let mut channel = self.require(channel_id, ChannelStatus::Open).await?;
        channel.status = ChannelStatus::Closing;
        self.store.upsert_channel(channel.clone()).await.map_err(store_err)?;
        Ok(channel)
    }

    /// Marks the channel closed after the on-chain close settles.
    pub async fn finalize_close(&self, channel_id: &B256) -> Result<ChannelInfo, ChannelError> {
        let mut channel = self.require(channel_id, ChannelStatus::Closing).await?;
        channel.status = ChannelStatus::Closed;
        self.store.upsert_channel(channel.clone()).await.map_err(store_err)?;
        Ok(channel)
    }

    /// Reopens a closed channel under the next epoch. Sub-channel state from
    /// the previous epoch is discarded; outstanding SubRAVs for the old
    /// epoch no longer verify.
    pub async fn reset_channel(&self, channel_id: &B256) -> Result<ChannelInfo, ChannelError> {
        let mut channel = self.require(channel_id, ChannelStatus::Closed).await?;
        channel.epoch += 1;
        channel.status = ChannelStatus::Open;
        self.store.upsert_channel(channel.clone()).await.map_err(store_err)?;
        for (fragment, _) in self
            .store
            .list_sub_channels(channel_id)
            .await
            .map_err(store_err)?
        {
            self.store
                .remove_sub_channel(channel_id, &fragment)
                .await
                .map_err(store_err)?;
        }
        Ok(channel)
    }

    async fn require(
        &self,
        channel_id: &B256,
        expected: ChannelStatus,
    ) -> Result<ChannelInfo, ChannelError> {
        let channel = self
            .store
            .channel(channel_id)
            .await
            .map_err(store_err)?
            .ok_or(ChannelError::Unknown(*channel_id))?;
        if channel.status != expected {
            return Err(ChannelError::WrongStatus {
                channel_id: *channel_id,
                status: channel.status,
                expected,
            });
        }
        Ok(channel)
    }
}

fn store_err<E: std::error::Error + Send + Sync + 'static>(error: E) -> ChannelError {
    ChannelError::Store(anyhow::Error::new(error))
}
