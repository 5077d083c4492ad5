//! `did:key` method driver.
//!
//! A `did:key` DID is self-resolving: the identifier *is* the multibase
//! public key, and the document is derived from it with one verification
//! method present in all five relationships. The driver keeps a guarded
//! in-memory map of mutated documents so that simulated mutations (added
//! keys, services, relationship edits) persist between calls within one
//! process; [`KeyVdr::reset`] clears it, and tests call it in setup.
//!
//! Mutations are permission-checked the way the chain would: verification
//! method changes require the signer to control the capabilityDelegation
//! relationship, service changes require capabilityInvocation. The first
//! verification method is primary and cannot be removed.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use nuwa_crypto::multibase;
use nuwa_types::did::{
    Did, DidDocument, ServiceEndpoint, VerificationMethod, VerificationRelationship,
};
use nuwa_vdr::error::VdrError;
use nuwa_vdr::registry::VdrDriver;
use nuwa_vdr::types::{
    CadopCreateRequest, CreateDidRequest, CreationResult, OperationOptions, ServiceInput,
    VerificationMethodInput,
};

/// The `did:key` driver.
///
/// Cloning shares the underlying document map, so one driver instance per
/// process gives process-wide mutation visibility. Consumers that need
/// isolation construct a fresh driver per test boundary.
#[derive(Clone, Default)]
pub struct KeyVdr {
    documents: Arc<RwLock<HashMap<String, DidDocument>>>,
}

impl KeyVdr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears all simulated mutations. Tests call this in setup.
    pub fn reset(&self) {
        self.documents.write().expect("document map poisoned").clear();
    }

    /// Derives the self-contained document for a `did:key` identifier.
    ///
    /// The single verification method uses the identifier itself as its
    /// fragment and appears in all five relationships.
    pub fn derive_document(did: &Did) -> Result<DidDocument, VdrError> {
        let (key_type, _) = multibase::decode_public_key(did.identifier())?;
        let vm_id = did.with_fragment(did.identifier());
        let mut document = DidDocument::new(did.clone());
        document.verification_method.push(VerificationMethod {
            id: vm_id.clone(),
            key_type,
            controller: did.clone(),
            public_key_multibase: did.identifier().into(),
        });
        for relationship in VerificationRelationship::ALL {
            document.relationship_mut(relationship).push(vm_id.clone());
        }
        Ok(document)
    }

    fn current_document(&self, did: &Did) -> Result<DidDocument, VdrError> {
        let documents = self.documents.read().expect("document map poisoned");
        match documents.get(did.identifier()) {
            Some(document) => Ok(document.clone()),
            None => Self::derive_document(did),
        }
    }

    fn store_document(&self, did: &Did, document: DidDocument) {
        self.documents
            .write()
            .expect("document map poisoned")
            .insert(did.identifier().into(), document);
    }

    /// The permission pre-check mirrored from the chain: the signer must act
    /// as the document's DID and the required relationship must be populated.
    fn check_permission(
        document: &DidDocument,
        required: VerificationRelationship,
        options: &OperationOptions,
    ) -> Result<(), VdrError> {
        let signer = options
            .signer
            .as_ref()
            .ok_or(VdrError::NoSigner("did:key mutation"))?;
        let acts_as_document = signer.did().is_some_and(|did| did == document.id)
            || signer.address() == document.id.identifier();
        if !acts_as_document {
            return Err(VdrError::PermissionDenied(format!(
                "signer {} does not control {}",
                signer.address(),
                document.id
            )));
        }
        if document.relationship(required).is_empty() {
            return Err(VdrError::PermissionDenied(format!(
                "document {} has no {} verification method",
                document.id, required
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl VdrDriver for KeyVdr {
    fn method(&self) -> &'static str {
        "key"
    }

    async fn resolve(&self, did: &Did) -> Result<Option<DidDocument>, VdrError> {
        if did.method() != "key" {
            return Ok(None);
        }
        match self.current_document(did) {
            Ok(document) => Ok(Some(document)),
            // A did:key that does not decode resolves to nothing.
            Err(VdrError::Multibase(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create(
        &self,
        request: &CreateDidRequest,
        _options: &OperationOptions,
    ) -> Result<CreationResult, VdrError> {
        // The DID is fully determined by the key; preferred DIDs are moot.
        let (key_type, _) = multibase::decode_public_key(&request.public_key_multibase)?;
        if key_type != request.key_type {
            return Err(VdrError::InvalidRequest(format!(
                "declared key type {} does not match encoded key {}",
                request.key_type, key_type
            )));
        }
        let did = Did::key(request.public_key_multibase.clone());
        let document = Self::derive_document(&did)?;
        Ok(CreationResult::new(did).with_document(document))
    }

    async fn create_via_cadop(
        &self,
        _request: &CadopCreateRequest,
        _options: &OperationOptions,
    ) -> Result<CreationResult, VdrError> {
        // Custodial onboarding targets chain-backed methods.
        Err(VdrError::MethodUnsupported("key (create_via_cadop)".into()))
    }

    async fn add_verification_method(
        &self,
        did: &Did,
        method: &VerificationMethodInput,
        relationships: &[VerificationRelationship],
        options: &OperationOptions,
    ) -> Result<(), VdrError> {
        let mut document = self.current_document(did)?;
        Self::check_permission(&document, VerificationRelationship::CapabilityDelegation, options)?;
        multibase::decode_public_key(&method.public_key_multibase)?;
        if document.verification_method(&method.fragment).is_some() {
            return Err(VdrError::InvalidRequest(format!(
                "fragment {} already exists",
                method.fragment
            )));
        }
        let vm_id = did.with_fragment(&method.fragment);
        document.verification_method.push(VerificationMethod {
            id: vm_id.clone(),
            key_type: method.key_type,
            controller: did.clone(),
            public_key_multibase: method.public_key_multibase.clone(),
        });
        for relationship in relationships {
            document.relationship_mut(*relationship).push(vm_id.clone());
        }
        document.validate()?;
        self.store_document(did, document);
        Ok(())
    }

    async fn remove_verification_method(
        &self,
        did: &Did,
        fragment: &str,
        options: &OperationOptions,
    ) -> Result<(), VdrError> {
        let mut document = self.current_document(did)?;
        Self::check_permission(&document, VerificationRelationship::CapabilityDelegation, options)?;
        let index = document
            .verification_method
            .iter()
            .position(|vm| vm.fragment() == fragment)
            .ok_or_else(|| VdrError::NotFound(format!("verification method {fragment}")))?;
        if index == 0 {
            return Err(VdrError::PermissionDenied(
                "the primary verification method cannot be removed".into(),
            ));
        }
        let vm_id = document.verification_method.remove(index).id;
        for relationship in VerificationRelationship::ALL {
            document.relationship_mut(relationship).retain(|entry| entry != &vm_id);
        }
        self.store_document(did, document);
        Ok(())
    }

    async fn add_service(
        &self,
        did: &Did,
        service: &ServiceInput,
        options: &OperationOptions,
    ) -> Result<(), VdrError> {
        let mut document = self.current_document(did)?;
        Self::check_permission(&document, VerificationRelationship::CapabilityInvocation, options)?;
        if document.service(&service.fragment).is_some() {
            return Err(VdrError::InvalidRequest(format!(
                "service {} already exists",
                service.fragment
            )));
        }
        document.service.push(ServiceEndpoint {
            id: did.with_fragment(&service.fragment),
            service_type: service.service_type.clone(),
            service_endpoint: service.service_endpoint.clone(),
            properties: service.properties.clone(),
        });
        document.validate()?;
        self.store_document(did, document);
        Ok(())
    }

    async fn remove_service(
        &self,
        did: &Did,
        fragment: &str,
        options: &OperationOptions,
    ) -> Result<(), VdrError> {
        let mut document = self.current_document(did)?;
        Self::check_permission(&document, VerificationRelationship::CapabilityInvocation, options)?;
        let before = document.service.len();
        document.service.retain(|s| s.fragment() != fragment);
        if document.service.len() == before {
            return Err(VdrError::NotFound(format!("service {fragment}")));
        }
        self.store_document(did, document);
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
        let mut document = self.current_document(did)?;
        Self::check_permission(&document, VerificationRelationship::CapabilityDelegation, options)?;
        let vm_id = document
            .verification_method(fragment)
            .map(|vm| vm.id.clone())
            .ok_or_else(|| VdrError::NotFound(format!("verification method {fragment}")))?;
        for relationship in add {
            let entries = document.relationship_mut(*relationship);
            if !entries.contains(&vm_id) {
                entries.push(vm_id.clone());
            }
        }
        for relationship in remove {
            document.relationship_mut(*relationship).retain(|entry| entry != &vm_id);
        }
        self.store_document(did, document);
        Ok(())
    }
}
