//! End-to-end processor tests: handshake, deferred settlement, 402 gating,
//! conflicts, and the protocol-failure paths.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use alloy_primitives::B256;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use nuwa_crypto::local::LocalSigner;
use nuwa_payment::billing::{BillingRule, RuleMatcher};
use nuwa_payment::claim::{ClaimError, ClaimTrigger};
use nuwa_payment::error::PaymentError;
use nuwa_payment::processor::{PaymentProcessor, PaymentRequest, ProcessorConfig};
use nuwa_payment::rate::FixedRateProvider;
use nuwa_payment::rav;
use nuwa_payment::store::{
    ChannelInfo, ChannelStatus, ChannelStore, PendingRavStore, RavStore, memory::MemoryStore,
};
use nuwa_types::amount::{Amount, PicoUsd};
use nuwa_types::did::{Did, DidDocument, KeyType, VerificationMethod, VerificationRelationship};
use nuwa_types::error::ErrorCode;
use nuwa_types::resolver::{DidResolver, ResolverError};
use nuwa_types::subrav::{SignedSubRav, SubRav};

const ASSET: &str = "0x3::gas_coin::RGas";
const FRAGMENT: &str = "account-key";
const CHAIN_ID: u64 = 2;
/// 10 pico-USD per base unit: a 100 pico-USD request costs 10 units.
const RATE: PicoUsd = PicoUsd(10);
const PRICE: PicoUsd = PicoUsd(100);
const COST_UNITS: u64 = 10;

struct StaticResolver(HashMap<Did, DidDocument>);

#[async_trait]
impl DidResolver for StaticResolver {
    async fn resolve(&self, did: &Did) -> Result<Option<DidDocument>, ResolverError> {
        Ok(self.0.get(did).cloned())
    }
}

#[derive(Default)]
struct CountingClaimTrigger {
    fired: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl ClaimTrigger for CountingClaimTrigger {
    async fn trigger(&self, _channel_id: &B256, _vm_id_fragment: &str) -> Result<(), ClaimError> {
        self.fired.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ClaimError("dispatcher offline".into()));
        }
        Ok(())
    }
}

struct Fixture {
    store: MemoryStore,
    processor: PaymentProcessor<MemoryStore>,
    signer: LocalSigner,
    key_id: String,
    channel_id: B256,
    claims: Arc<CountingClaimTrigger>,
}

async fn fixture_with(claim_fail: bool, max_amount: Option<Amount>) -> Fixture {
    let payer = Did::rooch("0x42");
    let key_id = payer.with_fragment(FRAGMENT);
    let signer = LocalSigner::new("0x42").with_did(payer.clone());
    let public_key_multibase = signer.generate_key(&key_id, KeyType::Ed25519);

    let mut document = DidDocument::new(payer.clone());
    document.verification_method.push(VerificationMethod {
        id: key_id.clone(),
        key_type: KeyType::Ed25519,
        controller: payer.clone(),
        public_key_multibase,
    });
    document.authentication.push(key_id.clone());
    document
        .relationship_mut(VerificationRelationship::CapabilityInvocation)
        .push(key_id.clone());

    let channel_id = B256::repeat_byte(0x11);
    let store = MemoryStore::new();
    store
        .upsert_channel(ChannelInfo {
            channel_id,
            payer_did: payer.clone(),
            payee_did: Did::rooch("0x43"),
            asset_id: ASSET.into(),
            status: ChannelStatus::Open,
            epoch: 0,
        })
        .await
        .unwrap();

    let resolver = StaticResolver([(payer, document)].into());
    let rates = FixedRateProvider::new().with_rate(ASSET, RATE);
    let claims = Arc::new(CountingClaimTrigger {
        fired: AtomicUsize::new(0),
        fail: claim_fail,
    });
    let mut config = ProcessorConfig::new(CHAIN_ID, ASSET);
    if let Some(max_amount) = max_amount {
        config = config.with_max_amount(max_amount);
    }
    let processor = PaymentProcessor::new(
        store.clone(),
        Arc::new(resolver),
        Arc::new(rates),
        claims.clone(),
        config,
    );
    Fixture {
        store,
        processor,
        signer,
        key_id,
        channel_id,
        claims,
    }
}

async fn fixture() -> Fixture {
    fixture_with(false, None).await
}

fn paid_rule() -> BillingRule {
    BillingRule::per_request("analyze", "tool/analyze", PRICE)
}

fn request(fixture: &Fixture, tx_ref: &str, signed: Option<SignedSubRav>) -> PaymentRequest {
    PaymentRequest {
        operation: "tool/analyze".into(),
        client_tx_ref: Some(tx_ref.into()),
        channel_id: Some(fixture.channel_id),
        vm_id_fragment: Some(FRAGMENT.into()),
        signed_sub_rav: signed,
        asset_id: None,
    }
}

async fn signed(fixture: &Fixture, rav_record: SubRav) -> SignedSubRav {
    rav::sign(rav_record, &fixture.signer, &fixture.key_id)
        .await
        .unwrap()
}

fn handshake(fixture: &Fixture) -> SubRav {
    SubRav::handshake(CHAIN_ID, fixture.channel_id, 0, FRAGMENT)
}

/// Runs one full request through the processor and returns the envelope.
async fn run_request(
    fixture: &Fixture,
    tx_ref: &str,
    signed_rav: Option<SignedSubRav>,
) -> nuwa_types::envelope::PaymentEnvelope {
    let cancel = CancellationToken::new();
    let mut state = fixture
        .processor
        .pre_process(request(fixture, tx_ref, signed_rav), paid_rule(), &cancel)
        .await
        .unwrap();
    let envelope = fixture.processor.settle(&mut state, 0, &cancel).await.unwrap();
    fixture.processor.persist(&mut state, &cancel).await.unwrap();
    envelope
}

#[tokio::test]
async fn test_handshake_opens_and_proposes_nonce_one() {
    let fixture = fixture().await;
    let hs = signed(&fixture, handshake(&fixture)).await;
    let envelope = run_request(&fixture, "client-1", Some(hs)).await;

    assert!(!envelope.is_error());
    let proposal = envelope.sub_rav.unwrap();
    assert_eq!(proposal.nonce, 1);
    assert_eq!(proposal.accumulated_amount, Amount::from_u64(COST_UNITS));
    assert_eq!(envelope.cost, Some(Amount::from_u64(COST_UNITS)));
    assert_eq!(envelope.client_tx_ref, "client-1");
    assert!(envelope.service_tx_ref.starts_with("srv-"));

    // The proposal is visible to the next request, the handshake is on
    // record, and the claim trigger fired once.
    let pending = fixture
        .store
        .find_latest_pending(&fixture.channel_id, FRAGMENT)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pending.sub_rav.nonce, 1);
    let latest = fixture
        .store
        .latest_rav(&fixture.channel_id, FRAGMENT)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.sub_rav.nonce, 0);
    assert_eq!(fixture.claims.fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_deferred_settlement_happy_path() {
    let fixture = fixture().await;
    let hs = signed(&fixture, handshake(&fixture)).await;
    let first = run_request(&fixture, "client-1", Some(hs)).await;
    let proposal = first.sub_rav.unwrap();

    // Second request signs the pending proposal exactly.
    let countersigned = signed(&fixture, proposal.clone()).await;
    let second = run_request(&fixture, "client-2", Some(countersigned)).await;

    assert!(!second.is_error());
    let next = second.sub_rav.unwrap();
    assert_eq!(next.nonce, 2);
    assert_eq!(next.accumulated_amount, Amount::from_u64(2 * COST_UNITS));

    // The matched proposal was consumed; the new one replaced it.
    let pending = fixture
        .store
        .find_latest_pending(&fixture.channel_id, FRAGMENT)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pending.sub_rav.nonce, 2);
    assert!(fixture
        .store
        .find_pending(&fixture.channel_id, FRAGMENT, 1)
        .await
        .unwrap()
        .is_none());
    let latest = fixture
        .store
        .latest_rav(&fixture.channel_id, FRAGMENT)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.sub_rav, proposal);
}

#[tokio::test]
async fn test_402_when_pending_unsigned() {
    let fixture = fixture().await;
    let hs = signed(&fixture, handshake(&fixture)).await;
    run_request(&fixture, "client-1", Some(hs)).await;

    // Second paid request arrives with no signed RAV.
    let envelope = run_request(&fixture, "client-2", None).await;
    let error = envelope.error.unwrap();
    assert_eq!(error.code, ErrorCode::PaymentRequired);
    assert!(error.message.contains("nonce 1"));
    assert_eq!(envelope.client_tx_ref, "client-2");
    assert!(envelope.sub_rav.is_none());

    // No new pending proposal was created.
    let pending = fixture
        .store
        .find_latest_pending(&fixture.channel_id, FRAGMENT)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pending.sub_rav.nonce, 1);
}

#[tokio::test]
async fn test_conflicting_signature_leaves_pending_untouched() {
    let fixture = fixture().await;
    let hs = signed(&fixture, handshake(&fixture)).await;
    run_request(&fixture, "client-1", Some(hs)).await;

    // Sign a record that disagrees with the pending proposal's amount.
    let mut wrong = handshake(&fixture).successor(Amount::from_u64(COST_UNITS + 1));
    wrong.nonce = 1;
    let conflicting = signed(&fixture, wrong).await;
    let envelope = run_request(&fixture, "client-2", Some(conflicting)).await;

    assert_eq!(envelope.error.unwrap().code, ErrorCode::RavConflict);
    let pending = fixture
        .store
        .find_latest_pending(&fixture.channel_id, FRAGMENT)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pending.sub_rav.nonce, 1);
    assert_eq!(pending.sub_rav.accumulated_amount, Amount::from_u64(COST_UNITS));
}

#[tokio::test]
async fn test_free_route_emits_no_proposal() {
    let fixture = fixture().await;
    let cancel = CancellationToken::new();
    let mut state = fixture
        .processor
        .pre_process(
            request(&fixture, "client-1", None),
            BillingRule::free("health", "nuwa.health"),
            &cancel,
        )
        .await
        .unwrap();
    let envelope = fixture.processor.settle(&mut state, 0, &cancel).await.unwrap();
    fixture.processor.persist(&mut state, &cancel).await.unwrap();

    assert!(!envelope.is_error());
    assert!(envelope.sub_rav.is_none());
    assert_eq!(envelope.cost, Some(Amount::ZERO));
    assert!(fixture
        .store
        .find_latest_pending(&fixture.channel_id, FRAGMENT)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_missing_client_tx_ref() {
    let fixture = fixture().await;
    let cancel = CancellationToken::new();
    let mut payment_request = request(&fixture, "x", None);
    payment_request.client_tx_ref = None;
    let mut state = fixture
        .processor
        .pre_process(payment_request, paid_rule(), &cancel)
        .await
        .unwrap();
    let envelope = fixture.processor.settle(&mut state, 0, &cancel).await.unwrap();
    assert_eq!(envelope.error.unwrap().code, ErrorCode::ClientTxRefMissing);
    assert_eq!(envelope.client_tx_ref, "");
}

#[tokio::test]
async fn test_unknown_channel() {
    let fixture = fixture().await;
    let cancel = CancellationToken::new();
    let mut payment_request = request(&fixture, "client-1", None);
    payment_request.channel_id = Some(B256::repeat_byte(0x99));
    let mut state = fixture
        .processor
        .pre_process(payment_request, paid_rule(), &cancel)
        .await
        .unwrap();
    let envelope = fixture.processor.settle(&mut state, 0, &cancel).await.unwrap();
    assert_eq!(envelope.error.unwrap().code, ErrorCode::ChannelNotFound);
}

#[tokio::test]
async fn test_rate_unavailable() {
    let fixture = fixture().await;
    let cancel = CancellationToken::new();
    let mut payment_request = request(&fixture, "client-1", None);
    payment_request.asset_id = Some("0x3::gas_coin::Unknown".into());
    let hs = signed(&fixture, handshake(&fixture)).await;
    payment_request.signed_sub_rav = Some(hs);
    let mut state = fixture
        .processor
        .pre_process(payment_request, paid_rule(), &cancel)
        .await
        .unwrap();
    let envelope = fixture.processor.settle(&mut state, 0, &cancel).await.unwrap();
    assert_eq!(envelope.error.unwrap().code, ErrorCode::RateNotAvailable);
}

#[tokio::test]
async fn test_max_amount_ceiling() {
    let fixture = fixture_with(false, Some(Amount::from_u64(COST_UNITS - 1))).await;
    let hs = signed(&fixture, handshake(&fixture)).await;
    let envelope = run_request(&fixture, "client-1", Some(hs)).await;
    assert_eq!(envelope.error.unwrap().code, ErrorCode::MaxAmountExceeded);
    // No proposal was persisted for a failed settlement.
    assert!(fixture
        .store
        .find_latest_pending(&fixture.channel_id, FRAGMENT)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_billing_config_error_on_priced_free_rule() {
    let fixture = fixture().await;
    let cancel = CancellationToken::new();
    let mut rule = BillingRule::per_request("bad", "tool/analyze", PRICE);
    rule.payment_required = false;
    let mut state = fixture
        .processor
        .pre_process(request(&fixture, "client-1", None), rule, &cancel)
        .await
        .unwrap();
    let envelope = fixture.processor.settle(&mut state, 0, &cancel).await.unwrap();
    assert_eq!(envelope.error.unwrap().code, ErrorCode::BillingConfigError);
}

#[tokio::test]
async fn test_per_unit_pricing_uses_handler_units() {
    let fixture = fixture().await;
    let cancel = CancellationToken::new();
    let hs = signed(&fixture, handshake(&fixture)).await;
    let rule = BillingRule::per_unit("tokens", "tool/analyze", PicoUsd(30));
    let mut state = fixture
        .processor
        .pre_process(request(&fixture, "client-1", Some(hs)), rule, &cancel)
        .await
        .unwrap();
    // 7 units at 30 pico-USD = 210 pico-USD = 21 asset units at rate 10.
    let envelope = fixture.processor.settle(&mut state, 7, &cancel).await.unwrap();
    assert_eq!(envelope.cost, Some(Amount::from_u64(21)));
    assert_eq!(envelope.cost_usd.as_deref(), Some("0.00000000021"));
}

#[tokio::test]
async fn test_cancellation_before_persist() {
    let fixture = fixture().await;
    let cancel = CancellationToken::new();
    let hs = signed(&fixture, handshake(&fixture)).await;
    let mut state = fixture
        .processor
        .pre_process(request(&fixture, "client-1", Some(hs)), paid_rule(), &cancel)
        .await
        .unwrap();
    let _envelope = fixture.processor.settle(&mut state, 0, &cancel).await.unwrap();

    cancel.cancel();
    let result = fixture.processor.persist(&mut state, &cancel).await;
    assert!(matches!(result, Err(PaymentError::Cancelled)));
    assert!(fixture
        .store
        .find_latest_pending(&fixture.channel_id, FRAGMENT)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_cancellation_after_persist_is_ignored() {
    let fixture = fixture().await;
    let cancel = CancellationToken::new();
    let hs = signed(&fixture, handshake(&fixture)).await;
    let mut state = fixture
        .processor
        .pre_process(request(&fixture, "client-1", Some(hs)), paid_rule(), &cancel)
        .await
        .unwrap();
    let _envelope = fixture.processor.settle(&mut state, 0, &cancel).await.unwrap();
    fixture.processor.persist(&mut state, &cancel).await.unwrap();

    // A late deadline must not undo or fail the already-visible proposal.
    cancel.cancel();
    fixture.processor.persist(&mut state, &cancel).await.unwrap();
    assert!(fixture
        .store
        .find_latest_pending(&fixture.channel_id, FRAGMENT)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_claim_trigger_failure_never_fails_request() {
    let fixture = fixture_with(true, None).await;
    let hs = signed(&fixture, handshake(&fixture)).await;
    let envelope = run_request(&fixture, "client-1", Some(hs)).await;
    assert!(!envelope.is_error());
    assert_eq!(fixture.claims.fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_parallel_requests_across_sub_channels() {
    let fixture = Arc::new(fixture().await);

    // Two independent channels for the same payer; requests on them must
    // not serialize against each other.
    let other_channel = B256::repeat_byte(0x22);
    fixture
        .store
        .upsert_channel(ChannelInfo {
            channel_id: other_channel,
            payer_did: Did::rooch("0x42"),
            payee_did: Did::rooch("0x43"),
            asset_id: ASSET.into(),
            status: ChannelStatus::Open,
            epoch: 0,
        })
        .await
        .unwrap();

    let hs_one = signed(&fixture, handshake(&fixture)).await;
    let hs_two = signed(
        &fixture,
        SubRav::handshake(CHAIN_ID, other_channel, 0, FRAGMENT),
    )
    .await;

    let first = {
        let fixture = fixture.clone();
        tokio::spawn(async move { run_request(&fixture, "client-a", Some(hs_one)).await })
    };
    let second = {
        let fixture = fixture.clone();
        let mut payment_request = request(&fixture, "client-b", Some(hs_two));
        payment_request.channel_id = Some(other_channel);
        tokio::spawn(async move {
            let cancel = CancellationToken::new();
            let mut state = fixture
                .processor
                .pre_process(payment_request, paid_rule(), &cancel)
                .await
                .unwrap();
            let envelope = fixture.processor.settle(&mut state, 0, &cancel).await.unwrap();
            fixture.processor.persist(&mut state, &cancel).await.unwrap();
            envelope
        })
    };

    let (first, second) = (first.await.unwrap(), second.await.unwrap());
    assert!(!first.is_error());
    assert!(!second.is_error());
    assert_eq!(
        fixture
            .store
            .find_latest_pending(&fixture.channel_id, FRAGMENT)
            .await
            .unwrap()
            .unwrap()
            .sub_rav
            .nonce,
        1
    );
    assert_eq!(
        fixture
            .store
            .find_latest_pending(&other_channel, FRAGMENT)
            .await
            .unwrap()
            .unwrap()
            .sub_rav
            .nonce,
        1
    );
}

#[tokio::test]
async fn test_single_successor_uniqueness() {
    let fixture = fixture().await;
    let hs = signed(&fixture, handshake(&fixture)).await;
    let first = run_request(&fixture, "client-1", Some(hs)).await;
    let proposal = first.sub_rav.unwrap();

    // The matching successor is accepted once...
    let good = signed(&fixture, proposal.clone()).await;
    let second = run_request(&fixture, "client-2", Some(good)).await;
    assert!(!second.is_error());

    // ...and any second distinct candidate for the same proposal conflicts.
    let mut distinct = proposal.clone();
    distinct.accumulated_amount = Amount::from_u64(999);
    let bad = signed(&fixture, distinct).await;
    let third = run_request(&fixture, "client-3", Some(bad)).await;
    assert_eq!(third.error.unwrap().code, ErrorCode::RavConflict);
}

#[tokio::test]
async fn test_status_counters_track_outcomes() {
    let fixture = fixture().await;
    let hs = signed(&fixture, handshake(&fixture)).await;
    run_request(&fixture, "client-1", Some(hs)).await;
    run_request(&fixture, "client-2", None).await; // 402

    let status = fixture.processor.status();
    assert_eq!(status.requests, 2);
    assert_eq!(status.envelopes, 1);
    assert_eq!(status.payment_required, 1);
    assert_eq!(status.errors, 1);
}

#[tokio::test]
async fn test_rule_matcher_integration() {
    // The matcher is consulted by the kit; sanity-check the wiring shape
    // the processor expects: built-ins free, custom rules paid.
    let matcher = RuleMatcher::with_builtins()
        .and_rule(BillingRule::per_request("analyze", "tool/analyze", PRICE));
    assert!(!matcher.match_rule("nuwa.discovery").unwrap().payment_required);
    assert!(matcher.match_rule("tool/analyze").unwrap().payment_required);
}
