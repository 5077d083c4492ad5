//! The claim-trigger hand-off port.
//!
//! After a signed RAV is accepted, the processor notifies an external claim
//! dispatcher that the sub-channel has fresh claimable value. Scheduling and
//! on-chain settlement live entirely behind this port; trigger failures are
//! logged and never fail the request.

use alloy_primitives::B256;
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
#[error("claim trigger failed: {0}")]
pub struct ClaimError(pub String);

/// Receives accepted-RAV notifications.
#[async_trait]
pub trait ClaimTrigger: Send + Sync {
    async fn trigger(&self, channel_id: &B256, vm_id_fragment: &str) -> Result<(), ClaimError>;
}

/// Discards every notification. The default when no dispatcher is wired.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopClaimTrigger;

#[async_trait]
impl ClaimTrigger for NoopClaimTrigger {
    async fn trigger(&self, _channel_id: &B256, _vm_id_fragment: &str) -> Result<(), ClaimError> {
        Ok(())
    }
}
