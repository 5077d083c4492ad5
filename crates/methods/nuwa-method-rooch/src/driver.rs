//! The `did:rooch` VDR driver.
//!
//! Writes require a signer (per-operation override or constructor default);
//! reads go through view functions. Before every mutation the driver
//! resolves the current document and refuses locally when the signer cannot
//! be matched to a controller or to a verification method carrying the
//! required relationship. Authoritative authorization stays on-chain; the
//! pre-check only avoids burning gas on transactions that would abort.

use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use tracing::{debug, instrument, warn};

use nuwa_types::chain::{CallArg, ChainClient, ChainError, ExecutionStatus, TxPayload, TxResult};
use nuwa_types::did::{Did, DidDocument, VerificationRelationship};
use nuwa_types::error::ErrorCode;
use nuwa_types::signer::Signer;
use nuwa_vdr::error::VdrError;
use nuwa_vdr::registry::VdrDriver;
use nuwa_vdr::types::{
    CadopCreateRequest, CreateDidRequest, CreationResult, OperationOptions, ServiceInput,
    VerificationMethodInput,
};

use crate::entry;
use crate::event;

/// Placeholder identifier returned when a creation event defeats both the
/// structured parser and the string fallback.
const UNPARSED_DID_PLACEHOLDER: &str = "unparsed";

/// The `did:rooch` driver.
///
/// Stateless apart from a per-instance cache of the last created DID, kept
/// for caller convenience only.
pub struct RoochVdr {
    chain: Arc<dyn ChainClient>,
    default_signer: Option<Arc<dyn Signer>>,
    last_created: RwLock<Option<Did>>,
}

impl RoochVdr {
    pub fn new(chain: Arc<dyn ChainClient>) -> Self {
        RoochVdr {
            chain,
            default_signer: None,
            last_created: RwLock::new(None),
        }
    }

    pub fn with_default_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.default_signer = Some(signer);
        self
    }

    /// The DID created most recently through this instance, if any.
    pub fn last_created_did(&self) -> Option<Did> {
        self.last_created.read().expect("last_created poisoned").clone()
    }

    fn signer<'a>(
        &'a self,
        options: &'a OperationOptions,
        operation: &'static str,
    ) -> Result<&'a Arc<dyn Signer>, VdrError> {
        options
            .signer
            .as_ref()
            .or(self.default_signer.as_ref())
            .ok_or(VdrError::NoSigner(operation))
    }

    async fn submit(&self, tx: TxPayload, signer: &Arc<dyn Signer>) -> Result<TxResult, VdrError> {
        let result = self.chain.send_tx(tx, signer.as_ref()).await?;
        if result.status == ExecutionStatus::Failed {
            return Err(VdrError::Chain(ChainError::TxRejected {
                status: format!("{:?}", result.status),
            }));
        }
        Ok(result)
    }

    /// Recovers the created DID from the transaction events: structured
    /// parse first, string fallback second, placeholder with a warning last.
    fn did_from_events(&self, result: &TxResult) -> CreationResult {
        let Some(raw) = result.event(entry::DID_CREATED_EVENT) else {
            warn!("transaction emitted no DIDCreatedEvent");
            return CreationResult::new(Did::rooch(UNPARSED_DID_PLACEHOLDER)).with_warning(
                ErrorCode::EventUnparseable,
                "transaction emitted no DIDCreatedEvent",
            );
        };
        match event::parse_did_created_event(&raw.data) {
            Ok(parsed) => CreationResult::new(parsed.did),
            Err(parse_error) => match event::extract_did_fallback(&raw.data) {
                Some(did) => {
                    debug!(%parse_error, "DIDCreatedEvent schema drift, recovered via string fallback");
                    CreationResult::new(did)
                }
                None => {
                    warn!(%parse_error, "DIDCreatedEvent unparseable, returning placeholder DID");
                    CreationResult::new(Did::rooch(UNPARSED_DID_PLACEHOLDER)).with_warning(
                        ErrorCode::EventUnparseable,
                        parse_error.to_string(),
                    )
                }
            },
        }
    }

    fn remember_created(&self, did: &Did) {
        *self.last_created.write().expect("last_created poisoned") = Some(did.clone());
    }

    /// Whether the signer is matched to a controller or to a verification
    /// method carrying `required`.
    fn signer_may_mutate(
        document: &DidDocument,
        required: VerificationRelationship,
        signer: &Arc<dyn Signer>,
    ) -> bool {
        let address = signer.address();
        let signer_did = signer.did();
        let matches_did = |did: &Did| {
            did.identifier() == address || signer_did.as_ref().is_some_and(|s| s == did)
        };
        if document.controller.iter().any(matches_did) {
            return true;
        }
        document.verification_method.iter().any(|vm| {
            document.has_relationship(required, vm.fragment()) && matches_did(&vm.controller)
        })
    }

    /// Resolves the target document and runs the client-side permission
    /// pre-check. Failures return [`VdrError::PermissionDenied`] without a
    /// transaction being sent.
    async fn pre_check(
        &self,
        did: &Did,
        required: VerificationRelationship,
        signer: &Arc<dyn Signer>,
    ) -> Result<DidDocument, VdrError> {
        let document = VdrDriver::resolve(self, did)
            .await?
            .ok_or_else(|| VdrError::UnknownDid(did.to_string()))?;
        if !Self::signer_may_mutate(&document, required, signer) {
            return Err(VdrError::PermissionDenied(format!(
                "signer {} does not control {} on {}",
                signer.address(),
                required,
                did
            )));
        }
        Ok(document)
    }
}

#[async_trait]
impl VdrDriver for RoochVdr {
    fn method(&self) -> &'static str {
        "rooch"
    }

    #[instrument(skip_all, fields(did = %did))]
    async fn resolve(&self, did: &Did) -> Result<Option<DidDocument>, VdrError> {
        if did.method() != "rooch" {
            return Ok(None);
        }
        let result = self
            .chain
            .call_view(
                entry::GET_DID_DOCUMENT,
                vec![CallArg::Address(did.identifier().into())],
            )
            .await?;
        if result.status == ExecutionStatus::Failed {
            return Ok(None);
        }
        let Some(raw) = result.return_values.first() else {
            return Ok(None);
        };
        let document: DidDocument = serde_json::from_slice(raw).map_err(|e| {
            VdrError::Chain(ChainError::EventSchemaMismatch {
                event_type: entry::GET_DID_DOCUMENT.into(),
                reason: e.to_string(),
            })
        })?;
        Ok(Some(document))
    }

    async fn exists(&self, did: &Did) -> Result<bool, VdrError> {
        if did.method() != "rooch" {
            return Ok(false);
        }
        let result = self
            .chain
            .call_view(
                entry::EXISTS_DID_FOR_ADDRESS,
                vec![CallArg::Address(did.identifier().into())],
            )
            .await?;
        if result.status == ExecutionStatus::Failed {
            return Ok(false);
        }
        Ok(result
            .return_values
            .first()
            .is_some_and(|value| value.first() == Some(&1)))
    }

    #[instrument(skip_all)]
    async fn create(
        &self,
        request: &CreateDidRequest,
        options: &OperationOptions,
    ) -> Result<CreationResult, VdrError> {
        let signer = self.signer(options, "create")?.clone();
        // Chain-allocated identifiers: a preferred DID is advisory only.
        if let Some(preferred) = &request.preferred_did {
            debug!(%preferred, "preferred DID ignored; the chain allocates the address");
        }
        let tx = entry::create_did_for_self(&request.public_key_multibase);
        let result = self.submit(tx, &signer).await?;
        let creation = self.did_from_events(&result);
        self.remember_created(&creation.did);
        Ok(creation)
    }

    #[instrument(skip_all, fields(user = %request.user_did_key))]
    async fn create_via_cadop(
        &self,
        request: &CadopCreateRequest,
        options: &OperationOptions,
    ) -> Result<CreationResult, VdrError> {
        let signer = self.signer(options, "create_via_cadop")?.clone();
        let tx = entry::create_did_via_cadop(
            &request.user_did_key.to_string(),
            &request.custodian_service_public_key,
            &request.custodian_service_vm_type.to_string(),
        );
        let result = self.submit(tx, &signer).await?;
        let creation = self.did_from_events(&result);
        self.remember_created(&creation.did);
        Ok(creation)
    }

    async fn add_verification_method(
        &self,
        did: &Did,
        method: &VerificationMethodInput,
        relationships: &[VerificationRelationship],
        options: &OperationOptions,
    ) -> Result<(), VdrError> {
        let signer = self.signer(options, "add_verification_method")?.clone();
        self.pre_check(did, VerificationRelationship::CapabilityDelegation, &signer)
            .await?;
        let tx = entry::add_verification_method(
            &method.fragment,
            &method.key_type.to_string(),
            &method.public_key_multibase,
            relationships,
        );
        self.submit(tx, &signer).await?;
        Ok(())
    }

    async fn remove_verification_method(
        &self,
        did: &Did,
        fragment: &str,
        options: &OperationOptions,
    ) -> Result<(), VdrError> {
        let signer = self.signer(options, "remove_verification_method")?.clone();
        let document = self
            .pre_check(did, VerificationRelationship::CapabilityDelegation, &signer)
            .await?;
        if document.verification_method(fragment).is_none() {
            return Err(VdrError::NotFound(format!("verification method {fragment}")));
        }
        self.submit(entry::remove_verification_method(fragment), &signer).await?;
        Ok(())
    }

    async fn add_service(
        &self,
        did: &Did,
        service: &ServiceInput,
        options: &OperationOptions,
    ) -> Result<(), VdrError> {
        let signer = self.signer(options, "add_service")?.clone();
        self.pre_check(did, VerificationRelationship::CapabilityInvocation, &signer)
            .await?;
        let tx = if service.properties.is_empty() {
            entry::add_service(&service.fragment, &service.service_type, &service.service_endpoint)
        } else {
            let (keys, values) = service
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .unzip();
            entry::add_service_with_properties(
                &service.fragment,
                &service.service_type,
                &service.service_endpoint,
                keys,
                values,
            )
        };
        self.submit(tx, &signer).await?;
        Ok(())
    }

    async fn remove_service(
        &self,
        did: &Did,
        fragment: &str,
        options: &OperationOptions,
    ) -> Result<(), VdrError> {
        let signer = self.signer(options, "remove_service")?.clone();
        let document = self
            .pre_check(did, VerificationRelationship::CapabilityInvocation, &signer)
            .await?;
        if document.service(fragment).is_none() {
            return Err(VdrError::NotFound(format!("service {fragment}")));
        }
        self.submit(entry::remove_service(fragment), &signer).await?;
        Ok(())
    }

    async fn update_relationships(
        &self,
        did: &Did,
        fragment: &str,
        add: &[VerificationRelationship],
        remove: &[VerificationRelationship],
        options: &OperationOptions,
    ) -> Result<(), VdrError> {
        let signer = self.signer(options, "update_relationships")?.clone();
        let document = self
            .pre_check(did, VerificationRelationship::CapabilityDelegation, &signer)
            .await?;
        if document.verification_method(fragment).is_none() {
            return Err(VdrError::NotFound(format!("verification method {fragment}")));
        }
        for relationship in add {
            self.submit(entry::add_to_relationship(fragment, *relationship), &signer)
                .await?;
        }
        for relationship in remove {
            self.submit(entry::remove_from_relationship(fragment, *relationship), &signer)
                .await?;
        }
        Ok(())
    }
}
