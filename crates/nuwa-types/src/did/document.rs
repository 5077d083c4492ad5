use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt::{self, Display};
use std::str::FromStr;

use super::Did;

/// Verification key types supported by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    #[serde(rename = "Ed25519VerificationKey2020")]
    Ed25519,
    #[serde(rename = "EcdsaSecp256k1VerificationKey2019")]
    Secp256k1,
}

impl Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            KeyType::Ed25519 => "Ed25519VerificationKey2020",
            KeyType::Secp256k1 => "EcdsaSecp256k1VerificationKey2019",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown verification key type {0}")]
pub struct KeyTypeError(String);

impl FromStr for KeyType {
    type Err = KeyTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Ed25519VerificationKey2020" => Ok(KeyType::Ed25519),
            "EcdsaSecp256k1VerificationKey2019" => Ok(KeyType::Secp256k1),
            other => Err(KeyTypeError(other.into())),
        }
    }
}

/// The five verification relationships of a DID document.
///
/// Each variant maps to a stable numeric tag used in on-chain calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerificationRelationship {
    #[serde(rename = "authentication")]
    Authentication,
    #[serde(rename = "assertionMethod")]
    AssertionMethod,
    #[serde(rename = "capabilityInvocation")]
    CapabilityInvocation,
    #[serde(rename = "capabilityDelegation")]
    CapabilityDelegation,
    #[serde(rename = "keyAgreement")]
    KeyAgreement,
}

impl VerificationRelationship {
    pub const ALL: [VerificationRelationship; 5] = [
        VerificationRelationship::Authentication,
        VerificationRelationship::AssertionMethod,
        VerificationRelationship::CapabilityInvocation,
        VerificationRelationship::CapabilityDelegation,
        VerificationRelationship::KeyAgreement,
    ];

    /// The numeric tag used by chain entry functions.
    pub fn tag(&self) -> u8 {
        match self {
            VerificationRelationship::Authentication => 0,
            VerificationRelationship::AssertionMethod => 1,
            VerificationRelationship::CapabilityInvocation => 2,
            VerificationRelationship::CapabilityDelegation => 3,
            VerificationRelationship::KeyAgreement => 4,
        }
    }
}

impl Display for VerificationRelationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        write!(f, "{}", json.trim_matches('"'))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown verification relationship tag {0}")]
pub struct RelationshipTagError(u8);

impl TryFrom<u8> for VerificationRelationship {
    type Error = RelationshipTagError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(VerificationRelationship::Authentication),
            1 => Ok(VerificationRelationship::AssertionMethod),
            2 => Ok(VerificationRelationship::CapabilityInvocation),
            3 => Ok(VerificationRelationship::CapabilityDelegation),
            4 => Ok(VerificationRelationship::KeyAgreement),
            other => Err(RelationshipTagError(other)),
        }
    }
}

/// A verification method entry of a DID document.
///
/// The `id` is always `"<document id>#<fragment>"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub key_type: KeyType,
    pub controller: Did,
    pub public_key_multibase: String,
}

impl VerificationMethod {
    /// The fragment part of the method id, without the leading `#`.
    pub fn fragment(&self) -> &str {
        self.id.rsplit_once('#').map(|(_, f)| f).unwrap_or(&self.id)
    }
}

/// A service entry of a DID document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEndpoint {
    pub id: String,
    #[serde(rename = "type")]
    pub service_type: String,
    pub service_endpoint: String,
    /// Additional string-valued properties beyond id/type/endpoint.
    #[serde(flatten)]
    pub properties: BTreeMap<String, String>,
}

impl ServiceEndpoint {
    pub fn fragment(&self) -> &str {
        self.id.rsplit_once('#').map(|(_, f)| f).unwrap_or(&self.id)
    }
}

/// Violations of the document invariants checked by [`DidDocument::validate`].
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("verification method id {0} does not belong to document {1}")]
    ForeignMethodId(String, Did),
    #[error("duplicate verification method fragment {0}")]
    DuplicateFragment(String),
    #[error("duplicate service id {0}")]
    DuplicateService(String),
    #[error("{relationship} entry {entry} references no verification method")]
    DanglingRelationship {
        relationship: VerificationRelationship,
        entry: String,
    },
}

/// A DID document: controllers, verification methods, the five relationship
/// lists, and service endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    pub id: Did,
    #[serde(default)]
    pub controller: Vec<Did>,
    #[serde(default)]
    pub verification_method: Vec<VerificationMethod>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authentication: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assertion_method: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capability_invocation: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capability_delegation: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_agreement: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service: Vec<ServiceEndpoint>,
}

impl DidDocument {
    /// An empty document for `id` with no keys or services.
    pub fn new(id: Did) -> Self {
        DidDocument {
            controller: vec![id.clone()],
            id,
            verification_method: Vec::new(),
            authentication: Vec::new(),
            assertion_method: Vec::new(),
            capability_invocation: Vec::new(),
            capability_delegation: Vec::new(),
            key_agreement: Vec::new(),
            service: Vec::new(),
        }
    }

    /// Looks up a verification method by fragment or full id.
    pub fn verification_method(&self, fragment: &str) -> Option<&VerificationMethod> {
        let fragment = fragment.rsplit_once('#').map(|(_, f)| f).unwrap_or(fragment);
        self.verification_method
            .iter()
            .find(|vm| vm.fragment() == fragment)
    }

    /// Looks up a service by fragment or full id.
    pub fn service(&self, fragment: &str) -> Option<&ServiceEndpoint> {
        let fragment = fragment.rsplit_once('#').map(|(_, f)| f).unwrap_or(fragment);
        self.service.iter().find(|s| s.fragment() == fragment)
    }

    /// Finds the first service of the given type.
    pub fn service_by_type(&self, service_type: &str) -> Option<&ServiceEndpoint> {
        self.service.iter().find(|s| s.service_type == service_type)
    }

    pub fn relationship(&self, relationship: VerificationRelationship) -> &Vec<String> {
        match relationship {
            VerificationRelationship::Authentication => &self.authentication,
            VerificationRelationship::AssertionMethod => &self.assertion_method,
            VerificationRelationship::CapabilityInvocation => &self.capability_invocation,
            VerificationRelationship::CapabilityDelegation => &self.capability_delegation,
            VerificationRelationship::KeyAgreement => &self.key_agreement,
        }
    }

    pub fn relationship_mut(&mut self, relationship: VerificationRelationship) -> &mut Vec<String> {
        match relationship {
            VerificationRelationship::Authentication => &mut self.authentication,
            VerificationRelationship::AssertionMethod => &mut self.assertion_method,
            VerificationRelationship::CapabilityInvocation => &mut self.capability_invocation,
            VerificationRelationship::CapabilityDelegation => &mut self.capability_delegation,
            VerificationRelationship::KeyAgreement => &mut self.key_agreement,
        }
    }

    /// Whether the verification method with `fragment` is present in the
    /// given relationship list.
    pub fn has_relationship(&self, relationship: VerificationRelationship, fragment: &str) -> bool {
        let fragment = fragment.rsplit_once('#').map(|(_, f)| f).unwrap_or(fragment);
        self.relationship(relationship)
            .iter()
            .any(|entry| entry.rsplit_once('#').map(|(_, f)| f).unwrap_or(entry) == fragment)
    }

    /// Whether `did` appears in the controller list.
    pub fn is_controlled_by(&self, did: &Did) -> bool {
        self.controller.iter().any(|c| c == did)
    }

    /// Checks the structural invariants: method ids belong to this document,
    /// fragments and service ids are unique, and every relationship entry
    /// references an existing verification method.
    pub fn validate(&self) -> Result<(), DocumentError> {
        let prefix = format!("{}#", self.id);
        let mut fragments = HashSet::new();
        for vm in &self.verification_method {
            if !vm.id.starts_with(&prefix) {
                return Err(DocumentError::ForeignMethodId(vm.id.clone(), self.id.clone()));
            }
            if !fragments.insert(vm.fragment()) {
                return Err(DocumentError::DuplicateFragment(vm.fragment().into()));
            }
        }

        let mut service_ids = HashSet::new();
        for service in &self.service {
            if !service_ids.insert(service.id.as_str()) {
                return Err(DocumentError::DuplicateService(service.id.clone()));
            }
        }

        for relationship in VerificationRelationship::ALL {
            for entry in self.relationship(relationship) {
                let fragment = entry.rsplit_once('#').map(|(_, f)| f).unwrap_or(entry);
                if !fragments.contains(fragment) {
                    return Err(DocumentError::DanglingRelationship {
                        relationship,
                        entry: entry.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
