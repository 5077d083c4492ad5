//! Storage ports for channels, signed RAVs, and pending proposals.
//!
//! Each port is an adapter trait with its own error type; backends range
//! from the in-memory [`memory::MemoryStore`] to SQL. Implementations must
//! be atomic per operation and read-your-writes within a sub-channel: a
//! `save` followed by `find_latest` from the same writer observes the save.

pub mod memory;

use alloy_primitives::B256;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use nuwa_types::amount::Amount;
use nuwa_types::did::Did;
use nuwa_types::subrav::{SignedSubRav, SubRav};
use nuwa_types::timestamp::UnixMillis;

/// Lifecycle of a payment channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    Open,
    Closing,
    Closed,
}

/// Channel metadata, keyed by the deterministic channel id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelInfo {
    pub channel_id: B256,
    pub payer_did: Did,
    pub payee_did: Did,
    pub asset_id: String,
    pub status: ChannelStatus,
    /// Monotonic on channel reset.
    pub epoch: u64,
}

/// Per-sub-channel accounting state, keyed by `(channel_id, vm_id_fragment)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubChannelState {
    pub epoch: u64,
    pub last_confirmed_nonce: u64,
    /// Cumulative asset units already claimed on-chain.
    pub last_claimed_amount: Amount,
    pub last_updated: UnixMillis,
}

impl SubChannelState {
    /// A fresh sub-channel at the given epoch.
    pub fn fresh(epoch: u64) -> Self {
        SubChannelState {
            epoch,
            last_confirmed_nonce: 0,
            last_claimed_amount: Amount::ZERO,
            last_updated: UnixMillis::now_or_epoch(),
        }
    }
}

/// Filter for channel listings; `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ChannelFilter {
    pub payer_did: Option<Did>,
    pub payee_did: Option<Did>,
    pub status: Option<ChannelStatus>,
}

impl ChannelFilter {
    pub fn matches(&self, info: &ChannelInfo) -> bool {
        self.payer_did.as_ref().is_none_or(|d| d == &info.payer_did)
            && self.payee_did.as_ref().is_none_or(|d| d == &info.payee_did)
            && self.status.is_none_or(|s| s == info.status)
    }
}

/// Offset/limit pagination for listings.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pagination {
    pub offset: usize,
    pub limit: Option<usize>,
}

/// A server-generated unsigned SubRAV awaiting the client's signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSubRav {
    pub sub_rav: SubRav,
    pub created_at: UnixMillis,
}

/// Channel and sub-channel metadata repository.
#[async_trait]
pub trait ChannelStore: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn channel(&self, channel_id: &B256) -> Result<Option<ChannelInfo>, Self::Error>;

    async fn upsert_channel(&self, info: ChannelInfo) -> Result<(), Self::Error>;

    /// Lists channels matching `filter`, ordered by channel id bytes.
    async fn list_channels(
        &self,
        filter: &ChannelFilter,
        page: &Pagination,
    ) -> Result<Vec<ChannelInfo>, Self::Error>;

    async fn remove_channel(&self, channel_id: &B256) -> Result<(), Self::Error>;

    async fn sub_channel(
        &self,
        channel_id: &B256,
        vm_id_fragment: &str,
    ) -> Result<Option<SubChannelState>, Self::Error>;

    async fn update_sub_channel(
        &self,
        channel_id: &B256,
        vm_id_fragment: &str,
        state: SubChannelState,
    ) -> Result<(), Self::Error>;

    async fn list_sub_channels(
        &self,
        channel_id: &B256,
    ) -> Result<Vec<(String, SubChannelState)>, Self::Error>;

    async fn remove_sub_channel(
        &self,
        channel_id: &B256,
        vm_id_fragment: &str,
    ) -> Result<(), Self::Error>;
}

/// Latest signed RAV per sub-channel.
#[async_trait]
pub trait RavStore: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Replaces the stored RAV for the sub-channel the record belongs to.
    async fn save_rav(&self, rav: SignedSubRav) -> Result<(), Self::Error>;

    async fn latest_rav(
        &self,
        channel_id: &B256,
        vm_id_fragment: &str,
    ) -> Result<Option<SignedSubRav>, Self::Error>;
}

/// Pending (unsigned) proposal repository.
#[async_trait]
pub trait PendingRavStore: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Saves a proposal. Idempotent under
    /// `(channel_id, vm_id_fragment, nonce)`.
    async fn save_pending(&self, pending: PendingSubRav) -> Result<(), Self::Error>;

    async fn find_pending(
        &self,
        channel_id: &B256,
        vm_id_fragment: &str,
        nonce: u64,
    ) -> Result<Option<PendingSubRav>, Self::Error>;

    /// The highest-nonce proposal for the sub-channel.
    async fn find_latest_pending(
        &self,
        channel_id: &B256,
        vm_id_fragment: &str,
    ) -> Result<Option<PendingSubRav>, Self::Error>;

    async fn remove_pending(
        &self,
        channel_id: &B256,
        vm_id_fragment: &str,
        nonce: u64,
    ) -> Result<(), Self::Error>;

    /// Sweeps proposals older than `max_age_ms`, returning how many were
    /// removed.
    async fn cleanup_pending(&self, max_age_ms: u64) -> Result<usize, Self::Error>;
}
