//! Custodian-Assisted DID Onboarding (CADOP).
//!
//! A custodian's signer creates DIDs on behalf of users who only hold a
//! `did:key`. The coordinator validates the custodian's own service document
//! against a closed catalog of three service types and delegates creation to
//! the VDR registry.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use url::Url;

use nuwa_crypto::multibase;
use nuwa_types::did::{Did, DidDocument, KeyType, ServiceEndpoint};
use nuwa_types::signer::Signer;

use crate::error::VdrError;
use crate::registry::VdrRegistry;
use crate::types::{CadopCreateRequest, CreationResult, OperationOptions, ServiceInput};

/// The closed catalog of CADOP service types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CadopServiceType {
    Custodian,
    IdentityProvider,
    Web2Proof,
}

impl CadopServiceType {
    /// The service `type` string carried in DID documents.
    pub fn type_name(&self) -> &'static str {
        match self {
            CadopServiceType::Custodian => "CadopCustodianService",
            CadopServiceType::IdentityProvider => "CadopIdPService",
            CadopServiceType::Web2Proof => "CadopWeb2ProofService",
        }
    }

    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "CadopCustodianService" => Some(CadopServiceType::Custodian),
            "CadopIdPService" => Some(CadopServiceType::IdentityProvider),
            "CadopWeb2ProofService" => Some(CadopServiceType::Web2Proof),
            _ => None,
        }
    }

    fn properties(&self) -> &'static [PropertySpec] {
        const CUSTODIAN_PROPS: [PropertySpec; 3] = [
            PropertySpec::required("custodianPublicKey", PropertyValidator::Multibase),
            PropertySpec::required("custodianServiceVMType", PropertyValidator::KeyType),
            PropertySpec::optional("description", PropertyValidator::Any),
        ];
        const IDENTITY_PROVIDER_PROPS: [PropertySpec; 3] = [
            PropertySpec::required("supportedCredentials", PropertyValidator::NonEmptyList),
            PropertySpec::optional("jwksUri", PropertyValidator::Url),
            PropertySpec::optional("description", PropertyValidator::Any),
        ];
        const WEB2_PROOF_PROPS: [PropertySpec; 2] = [
            PropertySpec::required("supportedPlatforms", PropertyValidator::NonEmptyList),
            PropertySpec::optional("description", PropertyValidator::Any),
        ];
        match self {
            CadopServiceType::Custodian => &CUSTODIAN_PROPS,
            CadopServiceType::IdentityProvider => &IDENTITY_PROVIDER_PROPS,
            CadopServiceType::Web2Proof => &WEB2_PROOF_PROPS,
        }
    }
}

/// A property the catalog knows about, with its validator.
struct PropertySpec {
    name: &'static str,
    required: bool,
    validator: PropertyValidator,
}

impl PropertySpec {
    const fn required(name: &'static str, validator: PropertyValidator) -> Self {
        PropertySpec {
            name,
            required: true,
            validator,
        }
    }

    const fn optional(name: &'static str, validator: PropertyValidator) -> Self {
        PropertySpec {
            name,
            required: false,
            validator,
        }
    }
}

enum PropertyValidator {
    /// A multibase-encoded public key.
    Multibase,
    /// A known verification key type name.
    KeyType,
    /// A non-empty comma-separated sequence with non-empty entries.
    NonEmptyList,
    /// A parseable URL.
    Url,
    /// Any string.
    Any,
}

impl PropertyValidator {
    fn check(&self, name: &str, value: &str) -> Result<(), VdrError> {
        match self {
            PropertyValidator::Multibase => {
                multibase::decode_public_key(value)
                    .map_err(|e| VdrError::InvalidService(format!("{name}: {e}")))?;
            }
            PropertyValidator::KeyType => {
                KeyType::from_str(value)
                    .map_err(|e| VdrError::InvalidService(format!("{name}: {e}")))?;
            }
            PropertyValidator::NonEmptyList => {
                let entries: Vec<&str> = value.split(',').map(str::trim).collect();
                if entries.is_empty() || entries.iter().any(|e| e.is_empty()) {
                    return Err(VdrError::InvalidService(format!(
                        "{name} must be a non-empty list"
                    )));
                }
            }
            PropertyValidator::Url => {
                Url::parse(value)
                    .map_err(|e| VdrError::InvalidService(format!("{name}: {e}")))?;
            }
            PropertyValidator::Any => {}
        }
        Ok(())
    }
}

/// Validates a service definition against the catalog.
///
/// Rejects unknown service types, missing required properties, property
/// values that fail their validator, and unknown properties.
pub fn validate_service(
    service_type: &str,
    properties: &BTreeMap<String, String>,
) -> Result<CadopServiceType, VdrError> {
    let catalog_type = CadopServiceType::from_type_name(service_type)
        .ok_or_else(|| VdrError::InvalidService(format!("unknown service type {service_type}")))?;

    let specs = catalog_type.properties();
    for spec in specs {
        match properties.get(spec.name) {
            Some(value) => spec.validator.check(spec.name, value)?,
            None if spec.required => {
                return Err(VdrError::InvalidService(format!(
                    "missing required property {}",
                    spec.name
                )));
            }
            None => {}
        }
    }
    for name in properties.keys() {
        if !specs.iter().any(|spec| spec.name == name) {
            return Err(VdrError::InvalidService(format!("unknown property {name}")));
        }
    }
    Ok(catalog_type)
}

/// Coordinates custodian-assisted DID creation against a VDR registry.
///
/// Holds the custodian service's own DID (resolved through the registry on
/// each use, so service rotations take effect without restarts) and the
/// single custodian signer used for all writes.
pub struct CadopCoordinator {
    registry: Arc<VdrRegistry>,
    service_did: Did,
    custodian_signer: Arc<dyn Signer>,
}

impl CadopCoordinator {
    pub fn new(registry: Arc<VdrRegistry>, service_did: Did, custodian_signer: Arc<dyn Signer>) -> Self {
        CadopCoordinator {
            registry,
            service_did,
            custodian_signer,
        }
    }

    pub fn service_did(&self) -> &Did {
        &self.service_did
    }

    async fn service_document(&self) -> Result<DidDocument, VdrError> {
        self.registry
            .resolve(&self.service_did)
            .await?
            .ok_or_else(|| VdrError::UnknownDid(self.service_did.to_string()))
    }

    fn custodian_service(document: &DidDocument) -> Result<&ServiceEndpoint, VdrError> {
        document
            .service_by_type(CadopServiceType::Custodian.type_name())
            .ok_or_else(|| VdrError::NotFound("CadopCustodianService".into()))
    }

    /// Creates a DID for `user_did_key` with the given method, signed by the
    /// custodian. The custodian's service key comes from its own document.
    pub async fn create_did(&self, method: &str, user_did_key: &Did) -> Result<CreationResult, VdrError> {
        let document = self.service_document().await?;
        let service = Self::custodian_service(&document)?;
        validate_service(&service.service_type, &service.properties)?;

        let custodian_service_public_key = service
            .properties
            .get("custodianPublicKey")
            .cloned()
            .ok_or_else(|| VdrError::InvalidService("missing custodianPublicKey".into()))?;
        let custodian_service_vm_type = service
            .properties
            .get("custodianServiceVMType")
            .map(|v| KeyType::from_str(v))
            .transpose()
            .map_err(|e| VdrError::InvalidService(e.to_string()))?
            .ok_or_else(|| VdrError::InvalidService("missing custodianServiceVMType".into()))?;

        let request = CadopCreateRequest {
            user_did_key: user_did_key.clone(),
            custodian_service_public_key,
            custodian_service_vm_type,
        };
        let options = OperationOptions::with_signer(self.custodian_signer.clone());
        self.registry.create_via_cadop(method, &request, &options).await
    }

    /// Adds a catalog service to the custodian's document, pre-validated.
    pub async fn add_service(&self, service: &ServiceInput) -> Result<(), VdrError> {
        validate_service(&service.service_type, &service.properties)?;
        let options = OperationOptions::with_signer(self.custodian_signer.clone());
        self.registry
            .add_service(&self.service_did, service, &options)
            .await
    }

    /// Removes a service from the custodian's document.
    pub async fn remove_service(&self, fragment: &str) -> Result<(), VdrError> {
        let options = OperationOptions::with_signer(self.custodian_signer.clone());
        self.registry
            .remove_service(&self.service_did, fragment, &options)
            .await
    }
}
