//! Creation and mutation request/result types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use nuwa_types::did::{Did, DidDocument, KeyType};
use nuwa_types::error::ErrorCode;
use nuwa_types::signer::Signer;

/// Request to create a DID with a primary verification method.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDidRequest {
    /// Multibase public key of the primary verification method.
    pub public_key_multibase: String,
    /// Key type of the primary verification method.
    pub key_type: KeyType,
    /// Advisory only: drivers with chain-allocated identifiers ignore it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_did: Option<Did>,
}

/// Request to create a DID on behalf of a user through a custodian.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CadopCreateRequest {
    /// The user's self-sovereign `did:key`.
    pub user_did_key: Did,
    /// The custodian's service public key (multibase).
    pub custodian_service_public_key: String,
    /// Key type of the custodian's service key.
    pub custodian_service_vm_type: KeyType,
}

/// A non-fatal problem attached to an otherwise successful creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreationWarning {
    pub code: ErrorCode,
    pub message: String,
}

/// Result of a successful DID creation.
///
/// `did` is authoritative: for chain-backed methods it is recovered from the
/// creation event, not echoed from the request. A `warning` is present when
/// the event could not be parsed and the DID is a synthetic placeholder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationResult {
    pub did: Did,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<DidDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<CreationWarning>,
}

impl CreationResult {
    pub fn new(did: Did) -> Self {
        CreationResult {
            did,
            document: None,
            warning: None,
        }
    }

    pub fn with_document(mut self, document: DidDocument) -> Self {
        self.document = Some(document);
        self
    }

    pub fn with_warning(mut self, code: ErrorCode, message: impl Into<String>) -> Self {
        self.warning = Some(CreationWarning {
            code,
            message: message.into(),
        });
        self
    }
}

/// A verification method to add to an existing document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethodInput {
    pub fragment: String,
    pub key_type: KeyType,
    pub public_key_multibase: String,
}

/// A service to add to an existing document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInput {
    pub fragment: String,
    #[serde(rename = "type")]
    pub service_type: String,
    pub service_endpoint: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

/// Per-operation options; currently just the signer.
///
/// Drivers fall back to their constructor-default signer when none is set.
#[derive(Clone, Default)]
pub struct OperationOptions {
    pub signer: Option<Arc<dyn Signer>>,
}

impl OperationOptions {
    pub fn with_signer(signer: Arc<dyn Signer>) -> Self {
        OperationOptions {
            signer: Some(signer),
        }
    }
}

impl std::fmt::Debug for OperationOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationOptions")
            .field("signer", &self.signer.as_ref().map(|s| s.address()))
            .finish()
    }
}
