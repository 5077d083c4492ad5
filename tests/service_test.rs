//! Full-stack test: CADOP onboarding through the registry, then a payment
//! flow against the onboarded identity.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use nuwa_rs::config::ServiceConfig;
use nuwa_rs::crypto::local::LocalSigner;
use nuwa_rs::crypto::multibase;
use nuwa_rs::kit::handler::handler_fn;
use nuwa_rs::kit::{ServiceKit, ServiceRequest};
use nuwa_rs::method_key::KeyVdr;
use nuwa_rs::method_rooch::RoochVdr;
use nuwa_rs::method_rooch::mock::MockChainClient;
use nuwa_rs::payment::billing::BillingRule;
use nuwa_rs::payment::claim::NoopClaimTrigger;
use nuwa_rs::payment::processor::{PaymentProcessor, ProcessorConfig};
use nuwa_rs::payment::rate::FixedRateProvider;
use nuwa_rs::payment::rav;
use nuwa_rs::payment::store::memory::MemoryStore;
use nuwa_rs::payment::store::{ChannelInfo, ChannelStatus, ChannelStore};
use nuwa_rs::types::amount::{Amount, PicoUsd};
use nuwa_rs::types::chain::derive_channel_id;
use nuwa_rs::types::did::{Did, DidDocument, KeyType, ServiceEndpoint};
use nuwa_rs::types::subrav::SubRav;
use nuwa_rs::vdr::cadop::CadopCoordinator;
use nuwa_rs::vdr::registry::VdrRegistry;
use serde_json::json;

const ASSET: &str = "0x3::gas_coin::RGas";

/// Onboards a user via CADOP, opens a payment channel for the new DID, and
/// runs the deferred-settlement loop against a kit-fronted service.
#[tokio::test]
async fn test_cadop_onboarding_then_payment_flow() {
    let chain = MockChainClient::new();

    // The custodian's own service document, with a catalog-valid custodian
    // service entry.
    let custodian_did = Did::rooch("0xcustodian");
    let custodian_signer = Arc::new(
        LocalSigner::new("0xcustodian").with_did(custodian_did.clone()),
    );
    let custodian_service_key =
        multibase::encode_public_key(KeyType::Ed25519, &[0x33; 32]);
    let mut custodian_document = DidDocument::new(custodian_did.clone());
    custodian_document.service.push(ServiceEndpoint {
        id: custodian_did.with_fragment("cadop"),
        service_type: "CadopCustodianService".into(),
        service_endpoint: "https://custodian.example.com".into(),
        properties: [
            ("custodianPublicKey".to_string(), custodian_service_key),
            (
                "custodianServiceVMType".to_string(),
                "Ed25519VerificationKey2020".to_string(),
            ),
        ]
        .into(),
    });
    chain.insert_document(custodian_document);

    let registry = Arc::new(
        VdrRegistry::builder()
            .and_register(Arc::new(KeyVdr::new()))
            .and_register(Arc::new(
                RoochVdr::new(Arc::new(chain.clone()))
                    .with_default_signer(custodian_signer.clone()),
            ))
            .build(),
    );

    // The user holds only a did:key; the custodian creates the rooch DID.
    let user_private = vec![0x77u8; 32];
    let user_public =
        nuwa_rs::crypto::keys::public_key(&user_private, KeyType::Ed25519).unwrap();
    let user_key = multibase::encode_public_key(KeyType::Ed25519, &user_public);
    let user_did_key = Did::key(&user_key);

    let coordinator =
        CadopCoordinator::new(registry.clone(), custodian_did, custodian_signer);
    let created = coordinator
        .create_did("rooch", &user_did_key)
        .await
        .unwrap();
    assert!(created.did.to_string().starts_with("did:rooch:"));
    assert!(created.warning.is_none());

    let payer_document = registry.resolve(&created.did).await.unwrap().unwrap();
    assert!(payer_document.controller.contains(&user_did_key));

    // The payer signs SubRAVs with the key the chain registered for them:
    // the did:key material, now living under the rooch document's primary
    // verification method.
    let fragment = "account-key";
    let key_id = created.did.with_fragment(fragment);
    let payer_signer = LocalSigner::new(&user_key)
        .with_did(created.did.clone())
        .with_key(key_id.clone(), KeyType::Ed25519, user_private);

    // Service side: channel metadata, processor, kit.
    let config = ServiceConfig::from_lookup(|_| None).unwrap();
    let service_did = Did::rooch("0xservice");
    let channel_id = derive_channel_id(&created.did, &service_did, ASSET);
    let store = MemoryStore::new();
    store
        .upsert_channel(ChannelInfo {
            channel_id,
            payer_did: created.did.clone(),
            payee_did: service_did.clone(),
            asset_id: ASSET.into(),
            status: ChannelStatus::Open,
            epoch: 0,
        })
        .await
        .unwrap();

    let processor = PaymentProcessor::new(
        store,
        registry.clone(),
        Arc::new(FixedRateProvider::new().with_rate(ASSET, PicoUsd(10))),
        Arc::new(NoopClaimTrigger),
        ProcessorConfig::new(config.network.chain_id(), ASSET),
    );
    let kit = ServiceKit::builder("gateway", service_did, Arc::new(processor))
        .with_paid_operation(
            "tool/analyze",
            BillingRule::per_request("analyze", "tool/analyze", PicoUsd(100)),
            handler_fn(|_ctx| async move { Ok(json!({ "ok": true }).into()) }),
        )
        .build();

    // Handshake, then one deferred settlement round.
    let cancel = CancellationToken::new();
    let handshake = rav::sign(
        SubRav::handshake(config.network.chain_id(), channel_id, 0, fragment),
        &payer_signer,
        &key_id,
    )
    .await
    .unwrap();

    let response = kit
        .dispatch(
            ServiceRequest::new("tool/analyze", json!({}))
                .with_caller(created.did.clone())
                .with_client_tx_ref("c-1")
                .with_signed_sub_rav(handshake),
            &cancel,
        )
        .await;
    assert!(response.error.is_none(), "handshake round failed: {:?}", response.error);
    let proposal = response.payment.unwrap().sub_rav.unwrap();
    assert_eq!(proposal.nonce, 1);
    assert_eq!(proposal.accumulated_amount, Amount::from_u64(10));

    let countersigned = rav::sign(proposal, &payer_signer, &key_id).await.unwrap();
    let response = kit
        .dispatch(
            ServiceRequest::new("tool/analyze", json!({}))
                .with_caller(created.did.clone())
                .with_client_tx_ref("c-2")
                .with_signed_sub_rav(countersigned),
            &cancel,
        )
        .await;
    assert!(response.error.is_none());
    assert_eq!(response.payment.unwrap().sub_rav.unwrap().nonce, 2);
}

/// The payer-side client drives the deferred loop, loses its state, and
/// resumes through `nuwa.recovery`.
#[tokio::test]
async fn test_client_loop_with_recovery() {
    use nuwa_rs::payment::client::{ClientError, PaymentChannelClient};
    use nuwa_rs::types::error::ErrorCode;

    // A did:key payer resolves without any chain; the document's single
    // verification method is the identifier itself.
    let private = vec![0x55u8; 32];
    let public = nuwa_rs::crypto::keys::public_key(&private, KeyType::Ed25519).unwrap();
    let user_key = multibase::encode_public_key(KeyType::Ed25519, &public);
    let payer_did = Did::key(&user_key);
    let fragment = user_key.clone();
    let key_id = payer_did.with_fragment(&fragment);
    let payer_signer = Arc::new(
        LocalSigner::new(&user_key)
            .with_did(payer_did.clone())
            .with_key(key_id.clone(), KeyType::Ed25519, private),
    );

    let registry = Arc::new(
        VdrRegistry::builder()
            .and_register(Arc::new(KeyVdr::new()))
            .build(),
    );

    let service_did = Did::rooch("0xservice");
    let channel_id = derive_channel_id(&payer_did, &service_did, ASSET);
    let store = MemoryStore::new();
    store
        .upsert_channel(ChannelInfo {
            channel_id,
            payer_did: payer_did.clone(),
            payee_did: service_did.clone(),
            asset_id: ASSET.into(),
            status: ChannelStatus::Open,
            epoch: 0,
        })
        .await
        .unwrap();

    let processor = PaymentProcessor::new(
        store,
        registry,
        Arc::new(FixedRateProvider::new().with_rate(ASSET, PicoUsd(10))),
        Arc::new(NoopClaimTrigger),
        ProcessorConfig::new(3, ASSET),
    );
    let kit = ServiceKit::builder("gateway", service_did, Arc::new(processor))
        .with_paid_operation(
            "tool/analyze",
            BillingRule::per_request("analyze", "tool/analyze", PicoUsd(100)),
            handler_fn(|_ctx| async move { Ok(json!({ "ok": true }).into()) }),
        )
        .build();

    let cancel = CancellationToken::new();
    let client = PaymentChannelClient::new(
        payer_signer,
        key_id,
        3,
        channel_id,
        0,
        fragment.clone(),
    );

    let make_request = |signed| {
        let mut request = ServiceRequest::new("tool/analyze", json!({}))
            .with_caller(payer_did.clone())
            .with_client_tx_ref("c-loop")
            .with_sub_channel(channel_id, fragment.clone());
        if let Some(signed) = signed {
            request = request.with_signed_sub_rav(signed);
        }
        request
    };

    // Two full rounds through the client.
    for expected_nonce in 1..=2u64 {
        let signed = client.next_signed().await.unwrap();
        let response = kit.dispatch(make_request(signed), &cancel).await;
        let envelope = response.payment.unwrap();
        client.observe_envelope(&envelope).unwrap();
        assert_eq!(envelope.sub_rav.unwrap().nonce, expected_nonce);
    }

    // Client restarts and has lost the outstanding proposal.
    client.reset();
    let signed = client.next_signed().await.unwrap();
    // A fresh client would handshake, which conflicts with history.
    let response = kit.dispatch(make_request(signed), &cancel).await;
    let envelope = response.payment.unwrap();
    let rejection = client.observe_envelope(&envelope).unwrap_err();
    assert!(matches!(
        rejection,
        ClientError::Rejected { code: ErrorCode::RavConflict, .. }
    ));

    // Recovery returns the pending proposal; the loop resumes.
    let recovery = kit
        .dispatch(
            ServiceRequest::new("nuwa.recovery", json!({}))
                .with_caller(payer_did.clone())
                .with_sub_channel(channel_id, fragment.clone()),
            &cancel,
        )
        .await;
    let pending: nuwa_rs::types::subrav::SubRav =
        serde_json::from_value(recovery.result.unwrap()["pending"].clone()).unwrap();
    assert_eq!(pending.nonce, 2);
    client.adopt_proposal(pending);

    let signed = client.next_signed().await.unwrap();
    let response = kit.dispatch(make_request(signed), &cancel).await;
    let envelope = response.payment.unwrap();
    assert!(envelope.error.is_none());
    client.observe_envelope(&envelope).unwrap();
}
