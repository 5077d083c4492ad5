//! The `nuwa.*` built-in operations.
//!
//! Free and public: `nuwa.discovery`, `nuwa.health`. Free and
//! auth-required: `nuwa.recovery` (latest pending proposal for the caller's
//! sub-channel), `nuwa.commit` (out-of-band signed SubRAV ingestion),
//! `nuwa.subrav.query`. Free and admin-only: `nuwa.admin.status`,
//! `nuwa.admin.claimTrigger`.

use serde_json::{Value, json};
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

use alloy_primitives::B256;
use nuwa_payment::billing::BillingRule;
use nuwa_payment::processor::PaymentRequest;
use nuwa_payment::store::{ChannelStore, PendingRavStore, RavStore};
use nuwa_types::subrav::SignedSubRav;

use crate::handler::{HandlerError, OperationOutput};
use crate::kit::{ServiceKit, ServiceRequest};

impl<S> ServiceKit<S>
where
    S: ChannelStore + RavStore + PendingRavStore,
{
    /// Dispatches built-in operations; `None` means the operation is not a
    /// built-in and the registered handler should run instead.
    pub(crate) async fn try_builtin(
        &self,
        request: &ServiceRequest,
        cancel: &CancellationToken,
    ) -> Option<Result<OperationOutput, HandlerError>> {
        match request.operation.as_str() {
            "nuwa.discovery" => Some(Ok(json!({
                "serviceId": self.service_id,
                "serviceDid": self.service_did,
                "defaultAssetId": self.processor.config().default_asset_id,
            })
            .into())),
            "nuwa.health" => Some(Ok(json!({
                "status": "healthy",
                "service": self.service_did,
            })
            .into())),
            "nuwa.recovery" => Some(self.builtin_recovery(request).await),
            "nuwa.commit" => Some(self.builtin_commit(request, cancel).await),
            "nuwa.subrav.query" => Some(self.builtin_subrav_query(request).await),
            "nuwa.admin.status" => Some(self.builtin_admin_status(request).await),
            "nuwa.admin.claimTrigger" => Some(self.builtin_claim_trigger(request).await),
            _ => None,
        }
    }

    /// `nuwa.recovery`: the latest pending proposal for the caller's
    /// sub-channel, so a client that lost the in-band proposal can resume.
    async fn builtin_recovery(
        &self,
        request: &ServiceRequest,
    ) -> Result<OperationOutput, HandlerError> {
        let (channel_id, fragment) = sub_channel_ref(request)?;
        let channel = self
            .processor
            .store()
            .channel(&channel_id)
            .await
            .map_err(store_failure)?
            .ok_or_else(|| HandlerError::new("unknown payment channel"))?;
        if request.caller_did.as_ref() != Some(&channel.payer_did) {
            return Err(HandlerError::new("caller is not the channel payer"));
        }
        let pending = self
            .processor
            .latest_pending(&channel_id, &fragment)
            .await
            .map_err(internal)?;
        Ok(json!({
            "pending": pending.as_ref().map(|p| &p.sub_rav),
            "channelId": channel_id,
            "vmIdFragment": fragment,
        })
        .into())
    }

    /// `nuwa.commit`: ingest a signed SubRAV out-of-band. Runs the same
    /// acceptance path as an in-band RAV and reports the outcome.
    async fn builtin_commit(
        &self,
        request: &ServiceRequest,
        cancel: &CancellationToken,
    ) -> Result<OperationOutput, HandlerError> {
        let signed: SignedSubRav = match request.params.get("signedSubRav") {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| HandlerError::new(format!("malformed signedSubRav: {e}")))?,
            None => request
                .signed_sub_rav
                .clone()
                .ok_or_else(|| HandlerError::new("signedSubRav parameter required"))?,
        };
        let payment_request = PaymentRequest {
            operation: "nuwa.commit".into(),
            client_tx_ref: Some(
                request
                    .client_tx_ref
                    .clone()
                    .unwrap_or_else(|| "out-of-band".into()),
            ),
            signed_sub_rav: Some(signed),
            ..Default::default()
        };
        let rule = BillingRule::free("builtin-commit", "nuwa.commit").with_auth_required();
        let state = self
            .processor
            .pre_process(payment_request, rule, cancel)
            .await
            .map_err(internal)?;
        match state.error() {
            None => Ok(json!({ "accepted": true }).into()),
            Some((code, message)) => Ok(json!({
                "accepted": false,
                "error": { "code": code, "message": message },
            })
            .into()),
        }
    }

    /// `nuwa.subrav.query`: look up a pending proposal by exact nonce.
    async fn builtin_subrav_query(
        &self,
        request: &ServiceRequest,
    ) -> Result<OperationOutput, HandlerError> {
        let (channel_id, fragment) = sub_channel_ref(request)?;
        let nonce = request
            .params
            .get("nonce")
            .and_then(Value::as_u64)
            .ok_or_else(|| HandlerError::new("nonce parameter required"))?;
        let pending = self
            .processor
            .store()
            .find_pending(&channel_id, &fragment, nonce)
            .await
            .map_err(store_failure)?;
        Ok(json!({ "pending": pending.as_ref().map(|p| &p.sub_rav) }).into())
    }

    /// `nuwa.admin.status`: processor counters, optionally sweeping expired
    /// proposals when `sweepMaxAgeMs` is supplied.
    async fn builtin_admin_status(
        &self,
        request: &ServiceRequest,
    ) -> Result<OperationOutput, HandlerError> {
        let swept = match request.params.get("sweepMaxAgeMs").and_then(Value::as_u64) {
            Some(max_age_ms) => Some(
                self.processor
                    .cleanup_pending(max_age_ms)
                    .await
                    .map_err(internal)?,
            ),
            None => None,
        };
        Ok(json!({
            "serviceId": self.service_id,
            "serviceDid": self.service_did,
            "status": self.processor.status(),
            "sweptPending": swept,
        })
        .into())
    }

    /// `nuwa.admin.claimTrigger`: fire the claim trigger for a sub-channel.
    async fn builtin_claim_trigger(
        &self,
        request: &ServiceRequest,
    ) -> Result<OperationOutput, HandlerError> {
        let (channel_id, fragment) = sub_channel_ref(request)?;
        let triggered = self.processor.trigger_claim(&channel_id, &fragment).await;
        Ok(json!({ "triggered": triggered }).into())
    }
}

/// Extracts the sub-channel reference from request fields or params.
fn sub_channel_ref(request: &ServiceRequest) -> Result<(B256, String), HandlerError> {
    if let (Some(channel_id), Some(fragment)) = (&request.channel_id, &request.vm_id_fragment) {
        return Ok((*channel_id, fragment.clone()));
    }
    let channel_id = request
        .params
        .get("channelId")
        .and_then(Value::as_str)
        .ok_or_else(|| HandlerError::new("channelId parameter required"))?;
    let channel_id = B256::from_str(channel_id)
        .map_err(|_| HandlerError::new("channelId must be a 32-byte hex string"))?;
    let fragment = request
        .params
        .get("vmIdFragment")
        .and_then(Value::as_str)
        .ok_or_else(|| HandlerError::new("vmIdFragment parameter required"))?;
    Ok((channel_id, fragment.to_string()))
}

fn internal(error: nuwa_payment::error::PaymentError) -> HandlerError {
    HandlerError::new(error.to_string())
}

fn store_failure<E: std::error::Error>(error: E) -> HandlerError {
    HandlerError::new(format!("storage failure: {error}"))
}
