//! The four-stage payment processor.
//!
//! A billable request flows through `pre_process` (verify whatever the
//! client sent and prefetch the rate), the handler (outside this crate),
//! `settle` (price the request and build the next proposal), and `persist`
//! (make the proposal visible before the response leaves). Request-level
//! problems are recorded in the request state and turned into error
//! envelopes by `settle`; only cancellation and storage failures abort the
//! flow.
//!
//! Requests on distinct sub-channels run fully in parallel; the caller
//! serializes writers per `(channel_id, vm_id_fragment)`.

use alloy_primitives::B256;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use nuwa_types::amount::{Amount, PicoUsd};
use nuwa_types::did::DidDocument;
use nuwa_types::envelope::{PaymentEnvelope, service_tx_ref};
use nuwa_types::error::ErrorCode;
use nuwa_types::resolver::DidResolver;
use nuwa_types::subrav::{SignedSubRav, SubRav};
use nuwa_types::timestamp::UnixMillis;

use crate::billing::BillingRule;
use crate::claim::ClaimTrigger;
use crate::error::PaymentError;
use crate::rate::RateProvider;
use crate::store::{
    ChannelInfo, ChannelStore, PendingRavStore, PendingSubRav, RavStore, SubChannelState,
};
use crate::verifier::{self, Decision, VerificationOutcome, VerifyInput};

/// Static processor configuration.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Chain id stamped into proposals.
    pub chain_id: u64,
    /// Asset used when neither the request nor the channel names one.
    pub default_asset_id: String,
    /// Optional ceiling on a single request's asset cost.
    pub max_amount: Option<Amount>,
}

impl ProcessorConfig {
    pub fn new(chain_id: u64, default_asset_id: impl Into<String>) -> Self {
        ProcessorConfig {
            chain_id,
            default_asset_id: default_asset_id.into(),
            max_amount: None,
        }
    }

    pub fn with_max_amount(mut self, max_amount: Amount) -> Self {
        self.max_amount = Some(max_amount);
        self
    }
}

/// What the transport extracted from one request.
#[derive(Debug, Clone, Default)]
pub struct PaymentRequest {
    /// Normalized operation name, e.g. `tool/analyze`.
    pub operation: String,
    /// Client-generated correlation id, echoed in the envelope.
    pub client_tx_ref: Option<String>,
    /// Sub-channel reference when no signed RAV carries it.
    pub channel_id: Option<B256>,
    pub vm_id_fragment: Option<String>,
    /// The client's signed RAV, if any.
    pub signed_sub_rav: Option<SignedSubRav>,
    /// Overrides the channel's asset for cost conversion.
    pub asset_id: Option<String>,
}

/// Mutable per-request state threaded through the stages.
pub struct RequestState {
    pub request: PaymentRequest,
    pub rule: BillingRule,
    pub channel: Option<ChannelInfo>,
    pub sub_channel: Option<SubChannelState>,
    pub payer_document: Option<DidDocument>,
    pub outcome: Option<VerificationOutcome>,
    rate: Option<PicoUsd>,
    baseline: Option<SubRav>,
    proposal: Option<SubRav>,
    error: Option<(ErrorCode, String)>,
    persisted: bool,
}

impl RequestState {
    fn new(request: PaymentRequest, rule: BillingRule) -> Self {
        RequestState {
            request,
            rule,
            channel: None,
            sub_channel: None,
            payer_document: None,
            outcome: None,
            rate: None,
            baseline: None,
            proposal: None,
            error: None,
            persisted: false,
        }
    }

    fn set_error(&mut self, code: ErrorCode, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some((code, message.into()));
        }
    }

    pub fn error(&self) -> Option<&(ErrorCode, String)> {
        self.error.as_ref()
    }

    pub fn signed_verified(&self) -> bool {
        self.outcome.as_ref().is_some_and(|o| o.signed_verified)
    }

    pub fn pending_matched(&self) -> bool {
        self.outcome.as_ref().is_some_and(|o| o.pending_matched)
    }

    /// The proposal built by `settle`, if the request produced one.
    pub fn proposal(&self) -> Option<&SubRav> {
        self.proposal.as_ref()
    }

    fn sub_channel_ref(&self) -> Option<(B256, String)> {
        if let Some(signed) = &self.request.signed_sub_rav {
            return Some((signed.sub_rav.channel_id, signed.sub_rav.vm_id_fragment.clone()));
        }
        match (&self.request.channel_id, &self.request.vm_id_fragment) {
            (Some(channel_id), Some(fragment)) => Some((*channel_id, fragment.clone())),
            _ => None,
        }
    }
}

/// Operational counters exposed through the admin surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorStatus {
    pub requests: u64,
    pub envelopes: u64,
    pub conflicts: u64,
    pub payment_required: u64,
    pub errors: u64,
}

#[derive(Default)]
struct Counters {
    requests: AtomicU64,
    envelopes: AtomicU64,
    conflicts: AtomicU64,
    payment_required: AtomicU64,
    errors: AtomicU64,
}

/// The payment processor.
///
/// Generic over the storage backend `S`, which provides all three storage
/// ports. Shared collaborators (resolver, rate provider, claim trigger) are
/// `Arc`s safe for concurrent use.
pub struct PaymentProcessor<S> {
    store: S,
    resolver: Arc<dyn DidResolver>,
    rate_provider: Arc<dyn RateProvider>,
    claim_trigger: Arc<dyn ClaimTrigger>,
    config: ProcessorConfig,
    counters: Counters,
}

impl<S> PaymentProcessor<S>
where
    S: ChannelStore + RavStore + PendingRavStore,
{
    pub fn new(
        store: S,
        resolver: Arc<dyn DidResolver>,
        rate_provider: Arc<dyn RateProvider>,
        claim_trigger: Arc<dyn ClaimTrigger>,
        config: ProcessorConfig,
    ) -> Self {
        PaymentProcessor {
            store,
            resolver,
            rate_provider,
            claim_trigger,
            config,
            counters: Counters::default(),
        }
    }

    /// The storage backend, for channel administration and recovery reads.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn status(&self) -> ProcessorStatus {
        ProcessorStatus {
            requests: self.counters.requests.load(Ordering::Relaxed),
            envelopes: self.counters.envelopes.load(Ordering::Relaxed),
            conflicts: self.counters.conflicts.load(Ordering::Relaxed),
            payment_required: self.counters.payment_required.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }

    /// Stage 1: verify the supplied RAV against recorded state and prefetch
    /// the rate. Request-level failures land in the returned state, never as
    /// errors.
    #[instrument(skip_all, fields(operation = %request.operation))]
    pub async fn pre_process(
        &self,
        request: PaymentRequest,
        rule: BillingRule,
        cancel: &CancellationToken,
    ) -> Result<RequestState, PaymentError> {
        self.counters.requests.fetch_add(1, Ordering::Relaxed);
        if cancel.is_cancelled() {
            return Err(PaymentError::Cancelled);
        }

        let mut state = RequestState::new(request, rule);
        if state.request.client_tx_ref.as_deref().unwrap_or("").is_empty() {
            state.set_error(ErrorCode::ClientTxRefMissing, "request carries no clientTxRef");
            return Ok(state);
        }

        let Some((channel_id, fragment)) = state.sub_channel_ref() else {
            if state.rule.payment_required {
                state.set_error(
                    ErrorCode::ChannelNotFound,
                    "paid operation without a sub-channel reference",
                );
            }
            return Ok(state);
        };

        state.channel = self.store.channel(&channel_id).await.map_err(store_err)?;
        state.sub_channel = self
            .store
            .sub_channel(&channel_id, &fragment)
            .await
            .map_err(store_err)?;
        let pending = self
            .store
            .find_latest_pending(&channel_id, &fragment)
            .await
            .map_err(store_err)?;
        let latest_signed = self
            .store
            .latest_rav(&channel_id, &fragment)
            .await
            .map_err(store_err)?;

        if let Some(channel) = &state.channel {
            match self.resolver.resolve(&channel.payer_did).await {
                Ok(document) => state.payer_document = document,
                Err(e) => {
                    state.set_error(e.code, e.message);
                    return Ok(state);
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(PaymentError::Cancelled);
        }

        let outcome = verifier::evaluate(VerifyInput {
            channel: state.channel.as_ref(),
            sub_channel: state.sub_channel.as_ref(),
            rule_paid: state.rule.payment_required,
            payer_document: state.payer_document.as_ref(),
            signed: state.request.signed_sub_rav.as_ref(),
            pending: pending.as_ref().map(|p| &p.sub_rav),
            latest_signed: latest_signed.as_ref(),
        });

        match outcome.decision {
            Decision::Allow => {
                if let Some(signed) = state.request.signed_sub_rav.clone() {
                    self.accept_signed(&mut state, signed, outcome.pending_matched)
                        .await?;
                } else {
                    state.baseline = latest_signed.map(|rav| rav.sub_rav);
                }
            }
            Decision::RequireSignature402 => {
                self.counters.payment_required.fetch_add(1, Ordering::Relaxed);
                let (code, message) = outcome.error.clone().unwrap_or((
                    ErrorCode::PaymentRequired,
                    "signature required".into(),
                ));
                state.set_error(code, message);
            }
            Decision::Conflict => {
                self.counters.conflicts.fetch_add(1, Ordering::Relaxed);
                let (code, message) = outcome
                    .error
                    .clone()
                    .unwrap_or((ErrorCode::RavConflict, "conflicting RAV".into()));
                state.set_error(code, message);
            }
            Decision::ChannelNotFound => {
                state.set_error(ErrorCode::ChannelNotFound, "unknown payment channel");
            }
        }
        state.outcome = Some(outcome);

        // Rate prefetch so settlement stays synchronous.
        if state.rule.payment_required && state.error.is_none() {
            let asset_id = state
                .request
                .asset_id
                .clone()
                .or_else(|| state.channel.as_ref().map(|c| c.asset_id.clone()))
                .unwrap_or_else(|| self.config.default_asset_id.clone());
            match self.rate_provider.rate(&asset_id).await {
                Ok(rate) => state.rate = Some(rate),
                Err(e) => state.set_error(ErrorCode::RateNotAvailable, e.to_string()),
            }
        }

        Ok(state)
    }

    /// Records an accepted signed RAV: persists it, clears a matched
    /// proposal, advances the sub-channel state, and hands off to the claim
    /// trigger.
    async fn accept_signed(
        &self,
        state: &mut RequestState,
        signed: SignedSubRav,
        pending_matched: bool,
    ) -> Result<(), PaymentError> {
        let channel_id = signed.sub_rav.channel_id;
        let fragment = signed.sub_rav.vm_id_fragment.clone();
        let nonce = signed.sub_rav.nonce;

        self.store.save_rav(signed.clone()).await.map_err(store_err)?;
        if pending_matched {
            self.store
                .remove_pending(&channel_id, &fragment, nonce)
                .await
                .map_err(store_err)?;
        }

        let epoch = state.channel.as_ref().map(|c| c.epoch).unwrap_or_default();
        let mut sub = state
            .sub_channel
            .clone()
            .unwrap_or_else(|| SubChannelState::fresh(epoch));
        sub.last_confirmed_nonce = nonce;
        sub.last_updated = UnixMillis::now_or_epoch();
        self.store
            .update_sub_channel(&channel_id, &fragment, sub.clone())
            .await
            .map_err(store_err)?;
        state.sub_channel = Some(sub);

        if let Err(e) = self.claim_trigger.trigger(&channel_id, &fragment).await {
            warn!(%channel_id, fragment, error = %e, "claim trigger failed");
        }

        state.baseline = Some(signed.sub_rav);
        Ok(())
    }

    /// Stage 3: price the request and build the response envelope. `units`
    /// is the usage count reported by the handler for per-unit rules.
    #[instrument(skip_all, fields(operation = %state.request.operation, units))]
    pub async fn settle(
        &self,
        state: &mut RequestState,
        units: u64,
        cancel: &CancellationToken,
    ) -> Result<PaymentEnvelope, PaymentError> {
        if cancel.is_cancelled() {
            return Err(PaymentError::Cancelled);
        }
        let client_tx_ref = state.request.client_tx_ref.clone().unwrap_or_default();
        let service_ref = service_tx_ref();

        if let Some((code, message)) = state.error.clone() {
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
            return Ok(PaymentEnvelope::failed(client_tx_ref, service_ref, code, message));
        }

        let usd = state.rule.strategy.cost(units);
        if !state.rule.payment_required {
            if !usd.is_zero() {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                return Ok(PaymentEnvelope::failed(
                    client_tx_ref,
                    service_ref,
                    ErrorCode::BillingConfigError,
                    format!("free rule {} produced a nonzero cost", state.rule.id),
                ));
            }
            // Free route: no proposal, zero cost.
            self.counters.envelopes.fetch_add(1, Ordering::Relaxed);
            return Ok(PaymentEnvelope::settled(
                client_tx_ref,
                service_ref,
                None,
                Amount::ZERO,
                None,
            ));
        }

        let Some(asset_cost) = state.rate.and_then(|rate| usd.to_asset_units(rate)) else {
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
            return Ok(PaymentEnvelope::failed(
                client_tx_ref,
                service_ref,
                ErrorCode::RateNotAvailable,
                "no asset rate was prefetched",
            ));
        };

        if let Some(max_amount) = self.config.max_amount {
            if asset_cost > max_amount {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                return Ok(PaymentEnvelope::failed(
                    client_tx_ref,
                    service_ref,
                    ErrorCode::MaxAmountExceeded,
                    format!("cost {asset_cost} exceeds ceiling {max_amount}"),
                ));
            }
        }

        let Some(baseline) = state.baseline.clone() else {
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
            return Ok(PaymentEnvelope::failed(
                client_tx_ref,
                service_ref,
                ErrorCode::PaymentRequired,
                "no accounting baseline; open the sub-channel with a handshake",
            ));
        };

        let proposal = baseline.successor(asset_cost);
        state.proposal = Some(proposal.clone());
        self.counters.envelopes.fetch_add(1, Ordering::Relaxed);
        Ok(PaymentEnvelope::settled(
            client_tx_ref,
            service_ref,
            Some(proposal),
            asset_cost,
            Some(usd.to_usd_string()),
        ))
    }

    /// Stage 4: make the proposal visible before the response is emitted.
    ///
    /// Cancellation is honored only before the write; once the proposal is
    /// persisted the response must still go out, because the next request
    /// can already observe it.
    pub async fn persist(
        &self,
        state: &mut RequestState,
        cancel: &CancellationToken,
    ) -> Result<(), PaymentError> {
        if state.persisted {
            return Ok(());
        }
        if cancel.is_cancelled() {
            return Err(PaymentError::Cancelled);
        }
        if let Some(proposal) = state.proposal.clone() {
            self.store
                .save_pending(PendingSubRav {
                    sub_rav: proposal,
                    created_at: UnixMillis::now_or_epoch(),
                })
                .await
                .map_err(store_err)?;
        }
        state.persisted = true;
        Ok(())
    }

    /// The latest pending proposal for a sub-channel (recovery surface).
    pub async fn latest_pending(
        &self,
        channel_id: &B256,
        vm_id_fragment: &str,
    ) -> Result<Option<PendingSubRav>, PaymentError> {
        self.store
            .find_latest_pending(channel_id, vm_id_fragment)
            .await
            .map_err(store_err)
    }

    /// Sweeps pending proposals older than `max_age_ms`.
    pub async fn cleanup_pending(&self, max_age_ms: u64) -> Result<usize, PaymentError> {
        self.store.cleanup_pending(max_age_ms).await.map_err(store_err)
    }

    /// Fires the claim trigger manually (admin surface). Failures are
    /// logged, never returned.
    pub async fn trigger_claim(&self, channel_id: &B256, vm_id_fragment: &str) -> bool {
        match self.claim_trigger.trigger(channel_id, vm_id_fragment).await {
            Ok(()) => true,
            Err(e) => {
                warn!(%channel_id, vm_id_fragment, error = %e, "manual claim trigger failed");
                false
            }
        }
    }
}

fn store_err<E: std::error::Error + Send + Sync + 'static>(error: E) -> PaymentError {
    PaymentError::Store(anyhow::Error::new(error))
}
